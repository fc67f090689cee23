//! VVC slice_header() (7.3.7.1) 与 POC 推导.
//!
//! 条带头依赖同一图像的图像头: 图像头或在前面的 PH_NUT 中, 或嵌入在
//! 当前条带头里. 条带覆盖的 CTU 由 PPS 的划分与 sh_slice_address 推导,
//! 入口点个数由此计算.

use log::debug;
use nalscope_core::{ParseError, ParseResult, ReadOptions, SymbolTable, SyntaxReader};

use super::nal::{NalHeader, NalUnitType};
use super::parser::VvcParameterSets;
use super::ph::{AlfInfo, DeblockingParams, PictureHeader};
use super::poc::{PicOrderCount, PocInput, PocState, derive_poc};
use super::pps::Pps;
use super::pred_weight::{PredWeightTable, WeightCounts};
use super::rpl::RefPicLists;
use super::sps::Sps;
use crate::avc::ceil_log2;
use crate::hevc::slice::SliceType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceHeader {
    pub sh_picture_header_in_slice_header_flag: bool,
    /// 嵌入条带头的图像头
    pub picture_header: Option<Box<PictureHeader>>,
    pub sh_subpic_id: Option<u32>,
    pub sh_slice_address: u32,
    pub sh_extra_bit: Vec<bool>,
    pub sh_num_tiles_in_slice_minus1: u32,
    pub slice_type: SliceType,
    pub sh_no_output_of_prior_pics_flag: Option<bool>,
    /// pps_alf_info_in_ph_flag=0 时存在
    pub alf: Option<AlfInfo>,
    pub sh_lmcs_used_flag: bool,
    pub sh_explicit_scaling_list_used_flag: bool,
    /// 条带头中给出的列表; 取自图像头时为 None
    pub ref_pic_lists: Option<RefPicLists>,
    pub sh_num_ref_idx_active_override_flag: bool,
    /// NumRefIdxActive
    pub num_ref_idx_active: [u32; 2],
    pub sh_cabac_init_flag: bool,
    pub sh_collocated_from_l0_flag: bool,
    pub sh_collocated_ref_idx: u32,
    pub pred_weight_table: Option<PredWeightTable>,
    pub sh_qp_delta: i32,
    /// SliceQpY
    pub slice_qp_y: i32,
    pub sh_cb_qp_offset: i32,
    pub sh_cr_qp_offset: i32,
    pub sh_joint_cbcr_qp_offset: i32,
    pub sh_cu_chroma_qp_offset_enabled_flag: bool,
    pub sh_sao_luma_used_flag: bool,
    pub sh_sao_chroma_used_flag: bool,
    pub deblocking: DeblockingParams,
    pub sh_dep_quant_used_flag: bool,
    pub sh_sign_data_hiding_used_flag: bool,
    pub sh_ts_residual_coding_disabled_flag: bool,
    pub sh_slice_header_extension_data_byte: Vec<u8>,
    pub sh_entry_offset_len_minus1: Option<u32>,
    pub sh_entry_point_offset_minus1: Vec<u32>,
    /// CurrSubpicIdx
    pub curr_subpic_idx: usize,
    /// CtbAddrInCurrSlice 的首个地址与个数
    pub first_ctb_addr: u32,
    pub num_ctus_in_slice: u32,
    pub num_entry_points: u32,
    pub ph_pic_parameter_set_id: u32,
    pub poc: PicOrderCount,
}

/// 条带头解析所需的跨 NAL 状态
#[derive(Debug, Clone, Copy)]
pub struct SliceContext<'a> {
    /// 当前图像已收到的 PH_NUT
    pub picture_header: Option<&'a PictureHeader>,
    pub poc_state: &'a PocState,
    pub first_picture_in_sequence: bool,
    /// 当前图像已推导的 POC; 图像的首个条带为 None
    pub picture_poc: Option<PicOrderCount>,
}

impl SliceHeader {
    pub fn parse(
        r: &mut SyntaxReader<'_>,
        nal: &NalHeader,
        sets: &VvcParameterSets,
        ctx: &SliceContext<'_>,
    ) -> ParseResult<Self> {
        let header = r.sub_level("slice_header()", |r| {
            let embedded = if r.flag("sh_picture_header_in_slice_header_flag")? {
                Some(PictureHeader::parse(r, sets)?)
            } else {
                None
            };
            let Some(ph) = embedded.as_ref().or(ctx.picture_header) else {
                return Err(ParseError::structural("VVC: 条带之前缺少图像头"));
            };
            let mut header = parse_body(r, nal, sets, ph, embedded.is_some(), ctx)?;
            header.sh_picture_header_in_slice_header_flag = embedded.is_some();
            header.picture_header = embedded.map(Box::new);
            Ok(header)
        })?;
        r.byte_alignment()?;
        debug!(
            "VVC: 条带 type={}, addr={}, ctus={}, POC={}",
            header.slice_type.as_str(),
            header.sh_slice_address,
            header.num_ctus_in_slice,
            header.poc.pic_order_cnt_val
        );
        Ok(header)
    }

    pub fn is_intra(&self) -> bool {
        self.slice_type == SliceType::I
    }
}

fn parse_body(
    r: &mut SyntaxReader<'_>,
    nal: &NalHeader,
    sets: &VvcParameterSets,
    ph: &PictureHeader,
    embedded: bool,
    ctx: &SliceContext<'_>,
) -> ParseResult<SliceHeader> {
    let nal_type = nal.nal_unit_type;
    let pps = sets.pps.get(ph.ph_pic_parameter_set_id)?;
    let sps = sets.sps.get(pps.pps_seq_parameter_set_id)?;
    check_nal_type_against_ph(nal_type, ph)?;

    let mut sh = SliceHeader {
        sh_picture_header_in_slice_header_flag: false,
        picture_header: None,
        sh_subpic_id: None,
        sh_slice_address: 0,
        sh_extra_bit: Vec::new(),
        sh_num_tiles_in_slice_minus1: 0,
        slice_type: SliceType::I,
        sh_no_output_of_prior_pics_flag: None,
        alf: None,
        sh_lmcs_used_flag: false,
        sh_explicit_scaling_list_used_flag: false,
        ref_pic_lists: None,
        sh_num_ref_idx_active_override_flag: true,
        num_ref_idx_active: [0, 0],
        sh_cabac_init_flag: false,
        sh_collocated_from_l0_flag: true,
        sh_collocated_ref_idx: 0,
        pred_weight_table: None,
        sh_qp_delta: 0,
        slice_qp_y: 0,
        sh_cb_qp_offset: 0,
        sh_cr_qp_offset: 0,
        sh_joint_cbcr_qp_offset: 0,
        sh_cu_chroma_qp_offset_enabled_flag: false,
        sh_sao_luma_used_flag: ph.ph_sao_luma_enabled_flag,
        sh_sao_chroma_used_flag: ph.ph_sao_chroma_enabled_flag,
        deblocking: ph.deblocking,
        sh_dep_quant_used_flag: false,
        sh_sign_data_hiding_used_flag: false,
        sh_ts_residual_coding_disabled_flag: false,
        sh_slice_header_extension_data_byte: Vec::new(),
        sh_entry_offset_len_minus1: None,
        sh_entry_point_offset_minus1: Vec::new(),
        curr_subpic_idx: 0,
        first_ctb_addr: 0,
        num_ctus_in_slice: 0,
        num_entry_points: 0,
        ph_pic_parameter_set_id: ph.ph_pic_parameter_set_id,
        poc: PicOrderCount::default(),
    };

    let ctb_addrs = parse_address(r, &mut sh, sps, pps)?;
    for i in 0..sps.derived.num_extra_sh_bits {
        sh.sh_extra_bit.push(r.flag(&format!("sh_extra_bit[{i}]"))?);
    }
    let ctb_addrs = match ctb_addrs {
        Some(addrs) => addrs,
        None => parse_raster_tiles(r, &mut sh, pps)?,
    };
    sh.first_ctb_addr = ctb_addrs.first().copied().unwrap_or(0);
    sh.num_ctus_in_slice = ctb_addrs.len() as u32;
    r.log_calculated("CurrSubpicIdx", sh.curr_subpic_idx);
    r.log_calculated("NumCtusInCurrSlice", sh.num_ctus_in_slice);

    if ph.ph_inter_slice_allowed_flag {
        let code = r.read_ue(
            "sh_slice_type",
            ReadOptions::new().check_range(0, 2).meaning_map::<SliceType>(),
        )?;
        sh.slice_type = SliceType::from_code(code)
            .ok_or_else(|| ParseError::constraint(format!("VVC: sh_slice_type 非法, value={code}")))?;
    }
    if !ph.ph_intra_slice_allowed_flag && sh.slice_type == SliceType::I {
        return Err(ParseError::constraint("VVC: ph_intra_slice_allowed_flag=0 时不能出现 I 条带"));
    }
    if nal_type.is_irap() && sh.slice_type != SliceType::I && !sps.sps_inter_layer_prediction_enabled_flag {
        return Err(ParseError::constraint(format!(
            "VVC: 独立层 IRAP 图像的 sh_slice_type 必须为 I, nal_unit_type={}, sh_slice_type={}",
            nal_type.code(),
            sh.slice_type.as_str()
        )));
    }
    if (NalUnitType::IdrWRadl.code()..=NalUnitType::GdrNut.code()).contains(&nal_type.code()) {
        sh.sh_no_output_of_prior_pics_flag = Some(r.flag("sh_no_output_of_prior_pics_flag")?);
    }
    if sps.sps_alf_enabled_flag && !pps.pps_alf_info_in_ph_flag {
        sh.alf = Some(AlfInfo::parse(r, "sh", sps)?);
    }
    if ph.lmcs.is_some() && !embedded {
        sh.sh_lmcs_used_flag = r.flag("sh_lmcs_used_flag")?;
    } else {
        sh.sh_lmcs_used_flag = ph.lmcs.is_some();
    }
    if ph.ph_scaling_list_aps_id.is_some() && !embedded {
        sh.sh_explicit_scaling_list_used_flag = r.flag("sh_explicit_scaling_list_used_flag")?;
    } else {
        sh.sh_explicit_scaling_list_used_flag = ph.ph_scaling_list_aps_id.is_some();
    }

    parse_ref_idx(r, &mut sh, nal_type, sps, pps, ph)?;
    let entries = active_num_ref_entries(&sh, ph);
    if sh.slice_type != SliceType::I {
        if pps.pps_cabac_init_present_flag {
            sh.sh_cabac_init_flag = r.flag("sh_cabac_init_flag")?;
        }
        sh.sh_collocated_from_l0_flag = if sh.slice_type == SliceType::B {
            ph.ph_collocated_from_l0_flag
        } else {
            true
        };
        sh.sh_collocated_ref_idx = if pps.pps_rpl_info_in_ph_flag { ph.ph_collocated_ref_idx } else { 0 };
        if ph.ph_temporal_mvp_enabled_flag && !pps.pps_rpl_info_in_ph_flag {
            if sh.slice_type == SliceType::B {
                sh.sh_collocated_from_l0_flag = r.flag("sh_collocated_from_l0_flag")?;
            }
            let list = if sh.sh_collocated_from_l0_flag { 0 } else { 1 };
            if sh.num_ref_idx_active[list] > 1 {
                sh.sh_collocated_ref_idx = r.read_ue(
                    "sh_collocated_ref_idx",
                    ReadOptions::new().check_range(0, i64::from(sh.num_ref_idx_active[list]) - 1),
                )?;
            }
        }
        let weighted = (pps.pps_weighted_pred_flag && sh.slice_type == SliceType::P)
            || (pps.pps_weighted_bipred_flag && sh.slice_type == SliceType::B);
        if !pps.pps_wp_info_in_ph_flag && weighted {
            sh.pred_weight_table = Some(PredWeightTable::parse(
                r,
                &WeightCounts {
                    chroma_array_type: sps.sps_chroma_format_idc,
                    pps_wp_info_in_ph_flag: false,
                    pps_weighted_bipred_flag: pps.pps_weighted_bipred_flag,
                    num_ref_entries: entries,
                    num_ref_idx_active: sh.num_ref_idx_active,
                },
            )?);
        }
    }

    parse_qp_and_filters(r, &mut sh, sps, pps, ph)?;

    if pps.pps_slice_header_extension_present_flag {
        let len = r.read_ue("sh_slice_header_extension_length", ReadOptions::new().check_range(0, 256))?;
        for i in 0..len {
            sh.sh_slice_header_extension_data_byte
                .push(r.bits(&format!("sh_slice_header_extension_data_byte[{i}]"), 8)? as u8);
        }
    }
    if sps.sps_entry_point_offsets_present_flag {
        sh.num_entry_points = pps
            .layout
            .count_entry_points(&ctb_addrs, sps.sps_entropy_coding_sync_enabled_flag);
    }
    r.log_calculated("NumEntryPoints", sh.num_entry_points);
    if sh.num_entry_points > 0 {
        let len_minus1 = r.read_ue("sh_entry_offset_len_minus1", ReadOptions::new().check_range(0, 31))?;
        sh.sh_entry_offset_len_minus1 = Some(len_minus1);
        for i in 0..sh.num_entry_points {
            sh.sh_entry_point_offset_minus1
                .push(r.bits(&format!("sh_entry_point_offset_minus1[{i}]"), len_minus1 + 1)?);
        }
    }

    sh.poc = match ctx.picture_poc {
        Some(poc) => poc,
        None => {
            let input = poc_input(nal, ph, ctx.first_picture_in_sequence);
            let poc = derive_poc(sps.derived.max_pic_order_cnt_lsb, &input, ctx.poc_state);
            log_poc(r, &poc);
            poc
        }
    };
    Ok(sh)
}

/// 由条带 NAL 头部与图像头组成 POC 推导输入
pub fn poc_input(nal: &NalHeader, ph: &PictureHeader, first_picture_in_sequence: bool) -> PocInput {
    PocInput {
        nal_unit_type: nal.nal_unit_type,
        temporal_id: nal.temporal_id(),
        ph_non_ref_pic_flag: ph.ph_non_ref_pic_flag,
        ph_pic_order_cnt_lsb: ph.ph_pic_order_cnt_lsb,
        ph_poc_msb_cycle_val: ph.ph_poc_msb_cycle_val,
        first_picture_in_sequence,
    }
}

/// 图像头的 IRAP/GDR 标志须与条带的 NAL 类型一致
fn check_nal_type_against_ph(nal_type: NalUnitType, ph: &PictureHeader) -> ParseResult<()> {
    let irap_or_gdr = nal_type.is_irap() || nal_type == NalUnitType::GdrNut;
    if irap_or_gdr && !ph.ph_gdr_or_irap_pic_flag {
        return Err(ParseError::constraint(format!(
            "VVC: {} 条带所在图像的 ph_gdr_or_irap_pic_flag 必须为 1",
            nal_type.name()
        )));
    }
    if nal_type == NalUnitType::GdrNut && !ph.ph_gdr_pic_flag {
        return Err(ParseError::constraint("VVC: GDR_NUT 条带所在图像的 ph_gdr_pic_flag 必须为 1"));
    }
    Ok(())
}

/// 读取 sh_subpic_id 与矩形条带的 sh_slice_address; 光栅扫描条带返回 None
fn parse_address(
    r: &mut SyntaxReader<'_>,
    sh: &mut SliceHeader,
    sps: &Sps,
    pps: &Pps,
) -> ParseResult<Option<Vec<u32>>> {
    if sps.subpic_info.sps_subpic_info_present_flag {
        let id = r.bits("sh_subpic_id", sps.subpic_info.sps_subpic_id_len_minus1 + 1)?;
        sh.sh_subpic_id = Some(id);
        sh.curr_subpic_idx = pps
            .subpic_idx_of(id)
            .ok_or_else(|| ParseError::structural(format!("VVC: sh_subpic_id={id} 不在 SubpicIdVal 中")))?;
    }
    if !pps.rect_slice_flag() {
        let num_tiles = pps.num_tiles();
        if num_tiles > 1 {
            sh.sh_slice_address = r.read_bits(
                "sh_slice_address",
                ceil_log2(num_tiles),
                ReadOptions::new().check_range(0, i64::from(num_tiles) - 1),
            )?;
        }
        return Ok(None);
    }
    let num_slices = pps.layout.num_slices_in_subpic(sh.curr_subpic_idx);
    if num_slices > 1 {
        sh.sh_slice_address = r.read_bits(
            "sh_slice_address",
            ceil_log2(num_slices),
            ReadOptions::new().check_range(0, i64::from(num_slices) - 1),
        )?;
    }
    let slice = pps
        .layout
        .subpic_slices
        .get(sh.curr_subpic_idx)
        .and_then(|s| s.get(sh.sh_slice_address as usize))
        .and_then(|&idx| pps.layout.slices.get(idx))
        .ok_or_else(|| {
            ParseError::structural(format!(
                "VVC: 子图像 {} 中没有第 {} 个条带",
                sh.curr_subpic_idx, sh.sh_slice_address
            ))
        })?;
    Ok(Some(slice.ctb_addrs.clone()))
}

/// 光栅扫描条带覆盖从 sh_slice_address 起的若干个完整 tile
fn parse_raster_tiles(r: &mut SyntaxReader<'_>, sh: &mut SliceHeader, pps: &Pps) -> ParseResult<Vec<u32>> {
    let num_tiles = pps.num_tiles();
    if num_tiles - sh.sh_slice_address > 1 {
        sh.sh_num_tiles_in_slice_minus1 = r.read_ue(
            "sh_num_tiles_in_slice_minus1",
            ReadOptions::new().check_range(0, i64::from(num_tiles - sh.sh_slice_address) - 1),
        )?;
    }
    let last = sh.sh_slice_address + sh.sh_num_tiles_in_slice_minus1;
    Ok((sh.sh_slice_address..=last).flat_map(|t| pps.layout.tile_ctbs(t)).collect())
}

fn parse_ref_idx(
    r: &mut SyntaxReader<'_>,
    sh: &mut SliceHeader,
    nal_type: NalUnitType,
    sps: &Sps,
    pps: &Pps,
    ph: &PictureHeader,
) -> ParseResult<()> {
    if !pps.pps_rpl_info_in_ph_flag && (!nal_type.is_idr() || sps.sps_idr_rpl_present_flag) {
        sh.ref_pic_lists = Some(RefPicLists::parse(
            r,
            &sps.rpl_context(),
            &sps.ref_pic_list_structs,
            pps.pps_rpl1_idx_present_flag,
        )?);
    }
    let entries = active_num_ref_entries(sh, ph);
    let is_b = sh.slice_type == SliceType::B;
    let mut minus1 = [0u32; 2];
    if (sh.slice_type != SliceType::I && entries[0] > 1) || (is_b && entries[1] > 1) {
        sh.sh_num_ref_idx_active_override_flag = r.flag("sh_num_ref_idx_active_override_flag")?;
        if sh.sh_num_ref_idx_active_override_flag {
            let lists = if is_b { 2 } else { 1 };
            for i in 0..lists {
                if entries[i] > 1 {
                    minus1[i] = r.read_ue(
                        &format!("sh_num_ref_idx_active_minus1[{i}]"),
                        ReadOptions::new().check_range(0, 14),
                    )?;
                }
            }
        }
    }
    for i in 0..2 {
        sh.num_ref_idx_active[i] = if is_b || (sh.slice_type == SliceType::P && i == 0) {
            if sh.sh_num_ref_idx_active_override_flag {
                minus1[i] + 1
            } else {
                let default = pps.pps_num_ref_idx_default_active_minus1[i] + 1;
                if entries[i] >= default { default } else { entries[i] }
            }
        } else {
            0
        };
        r.log_calculated(&format!("NumRefIdxActive[{i}]"), sh.num_ref_idx_active[i]);
        if sh.num_ref_idx_active[i] > entries[i] {
            return Err(ParseError::structural(format!(
                "VVC: NumRefIdxActive[{i}]={} 超出参考图像列表条目数 {}",
                sh.num_ref_idx_active[i], entries[i]
            )));
        }
    }
    if sh.slice_type != SliceType::I && sh.num_ref_idx_active[0] == 0 {
        return Err(ParseError::structural(format!(
            "VVC: {} 条带的参考图像列表 0 为空",
            sh.slice_type.as_str()
        )));
    }
    Ok(())
}

/// 生效列表的 num_ref_entries: 条带头给出时取条带头, 否则取图像头
fn active_num_ref_entries(sh: &SliceHeader, ph: &PictureHeader) -> [u32; 2] {
    match &sh.ref_pic_lists {
        Some(lists) => [lists.num_ref_entries(0), lists.num_ref_entries(1)],
        None => [ph.num_ref_entries(0), ph.num_ref_entries(1)],
    }
}

fn parse_qp_and_filters(
    r: &mut SyntaxReader<'_>,
    sh: &mut SliceHeader,
    sps: &Sps,
    pps: &Pps,
    ph: &PictureHeader,
) -> ParseResult<()> {
    let qp_bd_offset = i64::from(sps.derived.qp_bd_offset);
    let init_qp = 26 + i64::from(pps.pps_init_qp_minus26);
    if !pps.pps_qp_delta_info_in_ph_flag {
        sh.sh_qp_delta = r.read_se(
            "sh_qp_delta",
            ReadOptions::new().check_range(-qp_bd_offset - init_qp, 63 - init_qp),
        )?;
    }
    let delta = if pps.pps_qp_delta_info_in_ph_flag { ph.ph_qp_delta } else { sh.sh_qp_delta };
    sh.slice_qp_y = init_qp as i32 + delta;
    r.log_calculated("SliceQpY", sh.slice_qp_y);

    if pps.chroma_qp_offsets_in_slice() {
        let offsets = pps.chroma_tool_offsets.clone().unwrap_or_default();
        sh.sh_cb_qp_offset = read_chroma_qp_offset(r, "sh_cb_qp_offset", offsets.pps_cb_qp_offset)?;
        sh.sh_cr_qp_offset = read_chroma_qp_offset(r, "sh_cr_qp_offset", offsets.pps_cr_qp_offset)?;
        if sps.sps_joint_cbcr_enabled_flag {
            sh.sh_joint_cbcr_qp_offset =
                read_chroma_qp_offset(r, "sh_joint_cbcr_qp_offset", offsets.pps_joint_cbcr_qp_offset_value)?;
        }
    }
    if pps
        .chroma_tool_offsets
        .as_ref()
        .is_some_and(|c| c.pps_cu_chroma_qp_offset_list_enabled_flag)
    {
        sh.sh_cu_chroma_qp_offset_enabled_flag = r.flag("sh_cu_chroma_qp_offset_enabled_flag")?;
    }
    if sps.sps_sao_enabled_flag && !pps.pps_sao_info_in_ph_flag {
        sh.sh_sao_luma_used_flag = r.flag("sh_sao_luma_used_flag")?;
        sh.sh_sao_chroma_used_flag = sps.sps_chroma_format_idc != 0 && r.flag("sh_sao_chroma_used_flag")?;
    }
    if pps.deblocking_override_enabled() && !pps.dbf_info_in_ph() {
        sh.deblocking = DeblockingParams::parse(r, "sh", pps, ph.deblocking)?;
    }
    if sps.sps_dep_quant_enabled_flag {
        sh.sh_dep_quant_used_flag = r.flag("sh_dep_quant_used_flag")?;
    }
    if sps.sps_sign_data_hiding_enabled_flag && !sh.sh_dep_quant_used_flag {
        sh.sh_sign_data_hiding_used_flag = r.flag("sh_sign_data_hiding_used_flag")?;
    }
    if sps.sps_transform_skip_enabled_flag && !sh.sh_dep_quant_used_flag && !sh.sh_sign_data_hiding_used_flag {
        sh.sh_ts_residual_coding_disabled_flag = r.flag("sh_ts_residual_coding_disabled_flag")?;
    }
    Ok(())
}

fn read_chroma_qp_offset(r: &mut SyntaxReader<'_>, name: &str, pps_offset: i32) -> ParseResult<i32> {
    let v = r.read_se(name, ReadOptions::new().check_range(-12, 12))?;
    let sum = pps_offset + v;
    if !(-12..=12).contains(&sum) {
        return Err(ParseError::constraint(format!(
            "VVC: PPS 与条带的色度 QP 偏移之和超出 [-12, 12], {name}={v}, pps={pps_offset}"
        )));
    }
    Ok(v)
}

fn log_poc(r: &mut SyntaxReader<'_>, poc: &PicOrderCount) {
    r.log_calculated("NoOutputBeforeRecoveryFlag", poc.no_output_before_recovery_flag);
    r.log_calculated("prevPicOrderCntLsb", poc.prev_pic_order_cnt_lsb);
    r.log_calculated("prevPicOrderCntMsb", poc.prev_pic_order_cnt_msb);
    r.log_calculated("PicOrderCntMsb", poc.pic_order_cnt_msb);
    r.log_calculated("PicOrderCntVal", poc.pic_order_cnt_val);
}
