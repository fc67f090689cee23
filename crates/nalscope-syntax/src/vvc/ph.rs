//! VVC 图像头 (picture_header_structure, 7.3.2.8).
//!
//! 图像头可以独立成 PH_NUT, 也可以嵌在条带头中
//! (sh_picture_header_in_slice_header_flag=1). ALF、去块与 SAO 的语法
//! 在图像头与条带头中结构相同, 由本模块的辅助类型共用.

use log::debug;
use nalscope_core::{ParseError, ParseResult, ReadOptions, SyntaxReader};

use super::parser::VvcParameterSets;
use super::pps::Pps;
use super::pred_weight::{PredWeightTable, WeightCounts};
use super::rpl::RefPicLists;
use super::sps::{PartitionParams, Sps, VirtualBoundaries};

/// 图像头或条带头中的 ALF 参数
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AlfInfo {
    pub alf_enabled_flag: bool,
    pub alf_aps_id_luma: Vec<u32>,
    pub alf_cb_enabled_flag: bool,
    pub alf_cr_enabled_flag: bool,
    pub alf_aps_id_chroma: Option<u32>,
    pub alf_cc_cb_aps_id: Option<u32>,
    pub alf_cc_cr_aps_id: Option<u32>,
}

impl AlfInfo {
    /// `prefix` 为 ph 或 sh
    pub(crate) fn parse(r: &mut SyntaxReader<'_>, prefix: &str, sps: &Sps) -> ParseResult<Self> {
        let mut alf = Self {
            alf_enabled_flag: r.flag(&format!("{prefix}_alf_enabled_flag"))?,
            ..Default::default()
        };
        if !alf.alf_enabled_flag {
            return Ok(alf);
        }
        let num_luma = r.bits(&format!("{prefix}_num_alf_aps_ids_luma"), 3)?;
        for i in 0..num_luma {
            alf.alf_aps_id_luma
                .push(r.bits(&format!("{prefix}_alf_aps_id_luma[{i}]"), 3)?);
        }
        if sps.sps_chroma_format_idc != 0 {
            alf.alf_cb_enabled_flag = r.flag(&format!("{prefix}_alf_cb_enabled_flag"))?;
            alf.alf_cr_enabled_flag = r.flag(&format!("{prefix}_alf_cr_enabled_flag"))?;
        }
        if alf.alf_cb_enabled_flag || alf.alf_cr_enabled_flag {
            alf.alf_aps_id_chroma = Some(r.bits(&format!("{prefix}_alf_aps_id_chroma"), 3)?);
        }
        if sps.sps_ccalf_enabled_flag {
            if r.flag(&format!("{prefix}_alf_cc_cb_enabled_flag"))? {
                alf.alf_cc_cb_aps_id = Some(r.bits(&format!("{prefix}_alf_cc_cb_aps_id"), 3)?);
            }
            if r.flag(&format!("{prefix}_alf_cc_cr_enabled_flag"))? {
                alf.alf_cc_cr_aps_id = Some(r.bits(&format!("{prefix}_alf_cc_cr_aps_id"), 3)?);
            }
        }
        Ok(alf)
    }
}

/// 去块滤波参数, 未覆盖的值取自上一层
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeblockingParams {
    pub deblocking_params_present_flag: bool,
    pub deblocking_filter_disabled_flag: bool,
    pub luma_beta_offset_div2: i32,
    pub luma_tc_offset_div2: i32,
    pub cb_beta_offset_div2: i32,
    pub cb_tc_offset_div2: i32,
    pub cr_beta_offset_div2: i32,
    pub cr_tc_offset_div2: i32,
}

impl DeblockingParams {
    /// PPS 给出的默认值
    pub fn from_pps(pps: &Pps) -> Self {
        let d = pps.deblocking.unwrap_or_default();
        Self {
            deblocking_params_present_flag: false,
            deblocking_filter_disabled_flag: d.pps_deblocking_filter_disabled_flag,
            luma_beta_offset_div2: d.pps_luma_beta_offset_div2,
            luma_tc_offset_div2: d.pps_luma_tc_offset_div2,
            cb_beta_offset_div2: d.pps_cb_beta_offset_div2,
            cb_tc_offset_div2: d.pps_cb_tc_offset_div2,
            cr_beta_offset_div2: d.pps_cr_beta_offset_div2,
            cr_tc_offset_div2: d.pps_cr_tc_offset_div2,
        }
    }

    /// 读取 `{prefix}_deblocking_params_present_flag` 及其后的覆盖值
    pub(crate) fn parse(r: &mut SyntaxReader<'_>, prefix: &str, pps: &Pps, inherited: Self) -> ParseResult<Self> {
        let present = r.flag(&format!("{prefix}_deblocking_params_present_flag"))?;
        if !present {
            return Ok(Self {
                deblocking_params_present_flag: false,
                ..inherited
            });
        }
        let pps_disabled = pps.deblocking_disabled();
        let mut d = Self {
            deblocking_params_present_flag: true,
            ..inherited
        };
        d.deblocking_filter_disabled_flag = if !pps_disabled {
            r.flag(&format!("{prefix}_deblocking_filter_disabled_flag"))?
        } else {
            false
        };
        if !d.deblocking_filter_disabled_flag {
            let offset = || ReadOptions::new().check_range(-12, 12);
            d.luma_beta_offset_div2 = r.read_se(&format!("{prefix}_luma_beta_offset_div2"), offset())?;
            d.luma_tc_offset_div2 = r.read_se(&format!("{prefix}_luma_tc_offset_div2"), offset())?;
            if pps.chroma_tool_offsets.is_some() {
                d.cb_beta_offset_div2 = r.read_se(&format!("{prefix}_cb_beta_offset_div2"), offset())?;
                d.cb_tc_offset_div2 = r.read_se(&format!("{prefix}_cb_tc_offset_div2"), offset())?;
                d.cr_beta_offset_div2 = r.read_se(&format!("{prefix}_cr_beta_offset_div2"), offset())?;
                d.cr_tc_offset_div2 = r.read_se(&format!("{prefix}_cr_tc_offset_div2"), offset())?;
            } else {
                d.cb_beta_offset_div2 = d.luma_beta_offset_div2;
                d.cb_tc_offset_div2 = d.luma_tc_offset_div2;
                d.cr_beta_offset_div2 = d.luma_beta_offset_div2;
                d.cr_tc_offset_div2 = d.luma_tc_offset_div2;
            }
        }
        Ok(d)
    }
}

/// picture_header_structure()
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PictureHeader {
    pub ph_gdr_or_irap_pic_flag: bool,
    pub ph_non_ref_pic_flag: bool,
    pub ph_gdr_pic_flag: bool,
    pub ph_inter_slice_allowed_flag: bool,
    pub ph_intra_slice_allowed_flag: bool,
    pub ph_pic_parameter_set_id: u32,
    pub ph_pic_order_cnt_lsb: u32,
    pub ph_recovery_poc_cnt: Option<u32>,
    pub ph_extra_bit: Vec<bool>,
    pub ph_poc_msb_cycle_val: Option<u32>,
    /// pps_alf_info_in_ph_flag=1 时存在
    pub alf: Option<AlfInfo>,
    /// ph_lmcs_enabled_flag=1 时的 (ph_lmcs_aps_id, ph_chroma_residual_scale_flag)
    pub lmcs: Option<(u32, bool)>,
    pub ph_scaling_list_aps_id: Option<u32>,
    pub virtual_boundaries: Option<VirtualBoundaries>,
    pub ph_pic_output_flag: bool,
    /// pps_rpl_info_in_ph_flag=1 时存在
    pub ref_pic_lists: Option<RefPicLists>,
    pub ph_partition_constraints_override_flag: bool,
    pub intra_luma_partition: Option<PartitionParams>,
    pub intra_chroma_partition: Option<PartitionParams>,
    pub inter_partition: Option<PartitionParams>,
    pub ph_cu_qp_delta_subdiv_intra_slice: u32,
    pub ph_cu_chroma_qp_offset_subdiv_intra_slice: u32,
    pub ph_cu_qp_delta_subdiv_inter_slice: u32,
    pub ph_cu_chroma_qp_offset_subdiv_inter_slice: u32,
    pub ph_temporal_mvp_enabled_flag: bool,
    pub ph_collocated_from_l0_flag: bool,
    pub ph_collocated_ref_idx: u32,
    pub ph_mmvd_fullpel_only_flag: bool,
    pub ph_mvd_l1_zero_flag: bool,
    pub ph_bdof_disabled_flag: bool,
    pub ph_dmvr_disabled_flag: bool,
    pub ph_prof_disabled_flag: bool,
    pub pred_weight_table: Option<PredWeightTable>,
    pub ph_qp_delta: i32,
    pub ph_joint_cbcr_sign_flag: bool,
    pub ph_sao_luma_enabled_flag: bool,
    pub ph_sao_chroma_enabled_flag: bool,
    pub deblocking: DeblockingParams,
    pub ph_extension_data_byte: Vec<u8>,
}

impl PictureHeader {
    /// 解析 picture_header_structure(), 引用的 PPS 及其 SPS 必须已就绪
    pub fn parse(r: &mut SyntaxReader<'_>, sets: &VvcParameterSets) -> ParseResult<Self> {
        let ph = r.sub_level("picture_header_structure()", |r| parse_body(r, sets))?;
        debug!(
            "VVC: 图像头 pps={}, poc_lsb={}, intra={}, inter={}",
            ph.ph_pic_parameter_set_id,
            ph.ph_pic_order_cnt_lsb,
            ph.ph_intra_slice_allowed_flag,
            ph.ph_inter_slice_allowed_flag
        );
        Ok(ph)
    }

    /// 图像头中 ref_pic_lists() 的 num_ref_entries, 未在图像头中给出时为 0
    pub fn num_ref_entries(&self, list_idx: usize) -> u32 {
        self.ref_pic_lists
            .as_ref()
            .map_or(0, |l| l.num_ref_entries(list_idx))
    }
}

fn parse_body(r: &mut SyntaxReader<'_>, sets: &VvcParameterSets) -> ParseResult<PictureHeader> {
    let mut ph = PictureHeader {
        ph_gdr_or_irap_pic_flag: r.flag("ph_gdr_or_irap_pic_flag")?,
        ph_non_ref_pic_flag: r.flag("ph_non_ref_pic_flag")?,
        ph_pic_output_flag: true,
        ph_intra_slice_allowed_flag: true,
        ph_collocated_from_l0_flag: true,
        ..Default::default()
    };
    if ph.ph_gdr_or_irap_pic_flag {
        ph.ph_gdr_pic_flag = r.flag("ph_gdr_pic_flag")?;
    }
    ph.ph_inter_slice_allowed_flag = r.flag("ph_inter_slice_allowed_flag")?;
    if ph.ph_inter_slice_allowed_flag {
        ph.ph_intra_slice_allowed_flag = r.flag("ph_intra_slice_allowed_flag")?;
    }
    ph.ph_pic_parameter_set_id = r.read_ue("ph_pic_parameter_set_id", ReadOptions::new().check_range(0, 63))?;
    let pps = sets.pps.get(ph.ph_pic_parameter_set_id)?;
    let sps = sets.sps.get(pps.pps_seq_parameter_set_id)?;
    if ph.ph_gdr_pic_flag && !sps.sps_gdr_enabled_flag {
        return Err(ParseError::constraint("VVC: sps_gdr_enabled_flag=0 时 ph_gdr_pic_flag 必须为 0"));
    }

    let log2_max_lsb = sps.sps_log2_max_pic_order_cnt_lsb_minus4 + 4;
    ph.ph_pic_order_cnt_lsb = r.bits("ph_pic_order_cnt_lsb", log2_max_lsb)?;
    if ph.ph_gdr_pic_flag {
        ph.ph_recovery_poc_cnt = Some(r.read_ue(
            "ph_recovery_poc_cnt",
            ReadOptions::new().check_range(0, i64::from(sps.derived.max_pic_order_cnt_lsb)),
        )?);
    }
    for i in 0..sps.derived.num_extra_ph_bits {
        ph.ph_extra_bit.push(r.flag(&format!("ph_extra_bit[{i}]"))?);
    }
    if sps.sps_poc_msb_cycle_flag && r.flag("ph_poc_msb_cycle_present_flag")? {
        ph.ph_poc_msb_cycle_val = Some(r.bits("ph_poc_msb_cycle_val", sps.sps_poc_msb_cycle_len_minus1 + 1)?);
    }
    if sps.sps_alf_enabled_flag && pps.pps_alf_info_in_ph_flag {
        ph.alf = Some(AlfInfo::parse(r, "ph", sps)?);
    }
    if sps.sps_lmcs_enabled_flag && r.flag("ph_lmcs_enabled_flag")? {
        let aps_id = r.bits("ph_lmcs_aps_id", 2)?;
        let chroma_residual_scale = sps.sps_chroma_format_idc != 0 && r.flag("ph_chroma_residual_scale_flag")?;
        ph.lmcs = Some((aps_id, chroma_residual_scale));
    }
    if sps.sps_explicit_scaling_list_enabled_flag && r.flag("ph_explicit_scaling_list_enabled_flag")? {
        ph.ph_scaling_list_aps_id = Some(r.bits("ph_scaling_list_aps_id", 3)?);
    }
    if sps.sps_virtual_boundaries_enabled_flag
        && sps.virtual_boundaries.is_none()
        && r.flag("ph_virtual_boundaries_present_flag")?
    {
        ph.virtual_boundaries = Some(VirtualBoundaries::parse(r, "ph")?);
    }
    if pps.pps_output_flag_present_flag && !ph.ph_non_ref_pic_flag {
        ph.ph_pic_output_flag = r.flag("ph_pic_output_flag")?;
    }
    if pps.pps_rpl_info_in_ph_flag {
        ph.ref_pic_lists = Some(RefPicLists::parse(
            r,
            &sps.rpl_context(),
            &sps.ref_pic_list_structs,
            pps.pps_rpl1_idx_present_flag,
        )?);
    }
    if sps.sps_partition_constraints_override_enabled_flag {
        ph.ph_partition_constraints_override_flag = r.flag("ph_partition_constraints_override_flag")?;
    }
    let cu_chroma_qp_offset_list = pps
        .chroma_tool_offsets
        .as_ref()
        .is_some_and(|c| c.pps_cu_chroma_qp_offset_list_enabled_flag);
    if ph.ph_intra_slice_allowed_flag {
        if ph.ph_partition_constraints_override_flag {
            ph.intra_luma_partition = Some(PartitionParams::parse(r, "ph", "intra_slice_luma", "intra_slice_luma")?);
            if sps.sps_qtbtt_dual_tree_intra_flag {
                ph.intra_chroma_partition =
                    Some(PartitionParams::parse(r, "ph", "intra_slice_chroma", "intra_slice_chroma")?);
            }
        }
        if pps.pps_cu_qp_delta_enabled_flag {
            ph.ph_cu_qp_delta_subdiv_intra_slice = r.ue("ph_cu_qp_delta_subdiv_intra_slice")?;
        }
        if cu_chroma_qp_offset_list {
            ph.ph_cu_chroma_qp_offset_subdiv_intra_slice = r.ue("ph_cu_chroma_qp_offset_subdiv_intra_slice")?;
        }
    }
    if ph.ph_inter_slice_allowed_flag {
        parse_inter_fields(r, &mut ph, sps, pps, cu_chroma_qp_offset_list)?;
    }
    if pps.pps_qp_delta_info_in_ph_flag {
        let qp_bd_offset = i64::from(sps.derived.qp_bd_offset);
        let init_qp = 26 + i64::from(pps.pps_init_qp_minus26);
        ph.ph_qp_delta = r.read_se(
            "ph_qp_delta",
            ReadOptions::new().check_range(-qp_bd_offset - init_qp, 63 - init_qp),
        )?;
    }
    if sps.sps_joint_cbcr_enabled_flag {
        ph.ph_joint_cbcr_sign_flag = r.flag("ph_joint_cbcr_sign_flag")?;
    }
    if sps.sps_sao_enabled_flag && pps.pps_sao_info_in_ph_flag {
        ph.ph_sao_luma_enabled_flag = r.flag("ph_sao_luma_enabled_flag")?;
        if sps.sps_chroma_format_idc != 0 {
            ph.ph_sao_chroma_enabled_flag = r.flag("ph_sao_chroma_enabled_flag")?;
        }
    }
    ph.deblocking = DeblockingParams::from_pps(pps);
    if pps.dbf_info_in_ph() {
        ph.deblocking = DeblockingParams::parse(r, "ph", pps, ph.deblocking)?;
    }
    if pps.pps_picture_header_extension_present_flag {
        let len = r.read_ue("ph_extension_length", ReadOptions::new().check_range(0, 256))?;
        for i in 0..len {
            ph.ph_extension_data_byte
                .push(r.bits(&format!("ph_extension_data_byte[{i}]"), 8)? as u8);
        }
    }
    Ok(ph)
}

fn parse_inter_fields(
    r: &mut SyntaxReader<'_>,
    ph: &mut PictureHeader,
    sps: &Sps,
    pps: &Pps,
    cu_chroma_qp_offset_list: bool,
) -> ParseResult<()> {
    if ph.ph_partition_constraints_override_flag {
        ph.inter_partition = Some(PartitionParams::parse(r, "ph", "inter_slice", "inter_slice")?);
    }
    if pps.pps_cu_qp_delta_enabled_flag {
        ph.ph_cu_qp_delta_subdiv_inter_slice = r.ue("ph_cu_qp_delta_subdiv_inter_slice")?;
    }
    if cu_chroma_qp_offset_list {
        ph.ph_cu_chroma_qp_offset_subdiv_inter_slice = r.ue("ph_cu_chroma_qp_offset_subdiv_inter_slice")?;
    }
    let entries = [ph.num_ref_entries(0), ph.num_ref_entries(1)];
    if sps.sps_temporal_mvp_enabled_flag {
        ph.ph_temporal_mvp_enabled_flag = r.flag("ph_temporal_mvp_enabled_flag")?;
        if ph.ph_temporal_mvp_enabled_flag && pps.pps_rpl_info_in_ph_flag {
            if entries[1] > 0 {
                ph.ph_collocated_from_l0_flag = r.flag("ph_collocated_from_l0_flag")?;
            }
            let list = if ph.ph_collocated_from_l0_flag { 0 } else { 1 };
            if entries[list] > 1 {
                ph.ph_collocated_ref_idx = r.read_ue(
                    "ph_collocated_ref_idx",
                    ReadOptions::new().check_range(0, i64::from(entries[list]) - 1),
                )?;
            }
        }
    }
    if sps.sps_mmvd_fullpel_only_enabled_flag {
        ph.ph_mmvd_fullpel_only_flag = r.flag("ph_mmvd_fullpel_only_flag")?;
    }
    let presence = !pps.pps_rpl_info_in_ph_flag || entries[1] > 0;
    ph.ph_mvd_l1_zero_flag = !presence || r.flag("ph_mvd_l1_zero_flag")?;
    ph.ph_bdof_disabled_flag = if !sps.sps_bdof_control_present_in_ph_flag {
        !sps.sps_bdof_enabled_flag
    } else {
        !presence || r.flag("ph_bdof_disabled_flag")?
    };
    ph.ph_dmvr_disabled_flag = if !sps.sps_dmvr_control_present_in_ph_flag {
        !sps.sps_dmvr_enabled_flag
    } else {
        !presence || r.flag("ph_dmvr_disabled_flag")?
    };
    ph.ph_prof_disabled_flag = if sps.sps_prof_control_present_in_ph_flag {
        r.flag("ph_prof_disabled_flag")?
    } else {
        !sps.sps_affine_prof_enabled_flag
    };
    if (pps.pps_weighted_pred_flag || pps.pps_weighted_bipred_flag) && pps.pps_wp_info_in_ph_flag {
        ph.pred_weight_table = Some(PredWeightTable::parse(
            r,
            &WeightCounts {
                chroma_array_type: sps.sps_chroma_format_idc,
                pps_wp_info_in_ph_flag: true,
                pps_weighted_bipred_flag: pps.pps_weighted_bipred_flag,
                num_ref_entries: entries,
                num_ref_idx_active: [0, 0],
            },
        )?);
    }
    Ok(())
}
