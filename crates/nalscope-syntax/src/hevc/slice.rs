//! HEVC slice_segment_header() (7.3.6.1) 与 POC 推导.
//!
//! 依赖条带片段 (dependent_slice_segment_flag=1) 只携带地址与入口点,
//! 其余字段继承自同一图像中最近的独立条带片段.

use log::debug;
use nalscope_core::{ParseError, ParseResult, ReadOptions, SymbolTable, SyntaxReader, symbol_table};

use super::nal::NalHeader;
use super::parser::HevcParameterSets;
use super::poc::{PicOrderCount, PocInput, PocState, derive_poc};
use super::pps::Pps;
use super::pred_weight::{PredWeightTable, WeightContext};
use super::rps::ShortTermRps;
use super::sps::Sps;
use crate::avc::ceil_log2;

symbol_table! {
    /// slice_type (表 7-7)
    pub enum SliceType {
        B = 0 => "B-Slice",
        P = 1 => "P-Slice",
        I = 2 => "I-Slice",
    }
}

impl SliceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::B => "B",
            Self::P => "P",
            Self::I => "I",
        }
    }
}

/// 条带头中的一个长期参考图像条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LongTermRef {
    /// 取自 SPS 候选列表时的下标
    pub lt_idx_sps: Option<u32>,
    /// PocLsbLt
    pub poc_lsb_lt: u32,
    /// UsedByCurrPicLt
    pub used_by_curr_pic_lt: bool,
    pub delta_poc_msb_present_flag: bool,
    /// DeltaPocMsbCycleLt (7-52), 已累加
    pub delta_poc_msb_cycle_lt: u32,
}

/// ref_pic_lists_modification() (7.3.6.2)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RefPicListsModification {
    /// ref_pic_list_modification_flag_l0=1 时的 list_entry_l0
    pub list_entry_l0: Option<Vec<u32>>,
    pub list_entry_l1: Option<Vec<u32>>,
}

/// 条带级去块滤波参数, 未覆盖时继承 PPS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SliceDeblocking {
    pub deblocking_filter_override_flag: bool,
    pub slice_deblocking_filter_disabled_flag: bool,
    pub slice_beta_offset_div2: i32,
    pub slice_tc_offset_div2: i32,
}

/// 条带片段头
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceSegmentHeader {
    pub first_slice_segment_in_pic_flag: bool,
    /// 仅 IRAP
    pub no_output_of_prior_pics_flag: Option<bool>,
    pub slice_pic_parameter_set_id: u32,
    pub pps_seq_parameter_set_id: u32,
    pub dependent_slice_segment_flag: bool,
    pub slice_segment_address: u32,
    pub discardable_flag: Option<bool>,
    pub cross_layer_bla_flag: Option<bool>,
    pub slice_reserved_flag: Vec<bool>,
    pub slice_type: SliceType,
    /// 未出现时为 1
    pub pic_output_flag: bool,
    pub colour_plane_id: Option<u32>,
    /// IDR 时为 0
    pub slice_pic_order_cnt_lsb: u32,
    pub short_term_ref_pic_set_sps_flag: bool,
    pub short_term_ref_pic_set_idx: u32,
    /// 生效的短期 RPS (条带头内显式给出或取自 SPS), IDR 时为空
    pub short_term_ref_pic_set: Option<ShortTermRps>,
    pub num_long_term_sps: u32,
    pub num_long_term_pics: u32,
    pub long_term_refs: Vec<LongTermRef>,
    pub slice_temporal_mvp_enabled_flag: bool,
    pub slice_sao_luma_flag: bool,
    pub slice_sao_chroma_flag: bool,
    pub num_ref_idx_active_override_flag: bool,
    /// I 条带时无意义, 保持 PPS 默认值
    pub num_ref_idx_l0_active_minus1: u32,
    pub num_ref_idx_l1_active_minus1: u32,
    /// NumPicTotalCurr (7-55)
    pub num_pic_total_curr: u32,
    pub ref_pic_lists_modification: Option<RefPicListsModification>,
    pub mvd_l1_zero_flag: bool,
    pub cabac_init_flag: bool,
    /// 未出现时为 1
    pub collocated_from_l0_flag: bool,
    pub collocated_ref_idx: u32,
    pub pred_weight_table: Option<PredWeightTable>,
    pub five_minus_max_num_merge_cand: Option<u32>,
    pub slice_qp_delta: i32,
    /// SliceQpY = 26 + init_qp_minus26 + slice_qp_delta
    pub slice_qp_y: i32,
    pub slice_cb_qp_offset: i32,
    pub slice_cr_qp_offset: i32,
    pub cu_chroma_qp_offset_enabled_flag: bool,
    pub deblocking: SliceDeblocking,
    pub slice_loop_filter_across_slices_enabled_flag: bool,
    pub num_entry_point_offsets: u32,
    pub offset_len_minus1: Option<u32>,
    pub entry_point_offset_minus1: Vec<u32>,
    pub slice_segment_header_extension_data_byte: Vec<u8>,
    pub poc: PicOrderCount,
}

/// 条带头解析所需的跨 NAL 状态
#[derive(Debug, Clone, Copy)]
pub struct SliceContext<'a> {
    pub poc_state: &'a PocState,
    pub first_picture_in_sequence: bool,
    /// 当前图像中最近的独立条带片段
    pub previous_independent: Option<&'a SliceSegmentHeader>,
}

impl SliceSegmentHeader {
    pub fn parse(
        r: &mut SyntaxReader<'_>,
        nal: &NalHeader,
        sets: &HevcParameterSets,
        ctx: &SliceContext<'_>,
    ) -> ParseResult<Self> {
        let header = r.sub_level("slice_segment_header()", |r| parse_body(r, nal, sets, ctx))?;
        r.byte_alignment()?;
        debug!(
            "HEVC: 条带 type={}, addr={}, dependent={}, POC={}",
            header.slice_type.as_str(),
            header.slice_segment_address,
            header.dependent_slice_segment_flag,
            header.poc.pic_order_cnt_val
        );
        Ok(header)
    }

    /// POC 推导所用的输入
    pub fn poc_input(&self, nal: &NalHeader, first_picture_in_sequence: bool) -> PocInput {
        PocInput {
            nal_unit_type: nal.nal_unit_type,
            temporal_id: nal.temporal_id(),
            slice_pic_order_cnt_lsb: self.slice_pic_order_cnt_lsb,
            first_picture_in_sequence,
        }
    }

    pub fn is_intra(&self) -> bool {
        self.slice_type == SliceType::I
    }
}

fn parse_body(
    r: &mut SyntaxReader<'_>,
    nal: &NalHeader,
    sets: &HevcParameterSets,
    ctx: &SliceContext<'_>,
) -> ParseResult<SliceSegmentHeader> {
    let nal_type = nal.nal_unit_type;
    let first_slice_segment_in_pic_flag = r.flag("first_slice_segment_in_pic_flag")?;
    let no_output_of_prior_pics_flag = if nal_type.is_irap() {
        Some(r.flag("no_output_of_prior_pics_flag")?)
    } else {
        None
    };
    let slice_pic_parameter_set_id =
        r.read_ue("slice_pic_parameter_set_id", ReadOptions::new().check_range(0, 63))?;
    let pps = sets.pps.get(slice_pic_parameter_set_id)?;
    let sps = sets.sps.get(pps.pps_seq_parameter_set_id)?;

    let mut dependent_slice_segment_flag = false;
    let mut slice_segment_address = 0;
    if !first_slice_segment_in_pic_flag {
        if pps.dependent_slice_segments_enabled_flag {
            dependent_slice_segment_flag = r.flag("dependent_slice_segment_flag")?;
        }
        let pic_size = sps.derived.pic_size_in_ctbs_y;
        slice_segment_address = r.read_bits(
            "slice_segment_address",
            ceil_log2(pic_size),
            ReadOptions::new().check_range(0, i64::from(pic_size) - 1),
        )?;
    }

    if dependent_slice_segment_flag {
        let Some(previous) = ctx.previous_independent else {
            return Err(ParseError::structural(
                "HEVC: 依赖条带片段之前没有同一图像的独立条带片段",
            ));
        };
        r.log_note("依赖条带片段: 条带头字段继承自前一个独立条带片段");
        let (num_entry_point_offsets, offset_len_minus1, entry_point_offset_minus1) =
            parse_entry_points(r, pps, sps)?;
        let slice_segment_header_extension_data_byte = parse_header_extension(r, pps)?;
        return Ok(SliceSegmentHeader {
            first_slice_segment_in_pic_flag,
            no_output_of_prior_pics_flag,
            slice_pic_parameter_set_id,
            dependent_slice_segment_flag,
            slice_segment_address,
            num_entry_point_offsets,
            offset_len_minus1,
            entry_point_offset_minus1,
            slice_segment_header_extension_data_byte,
            ..previous.clone()
        });
    }

    let mut extra = 0;
    let discardable_flag = if pps.num_extra_slice_header_bits > extra {
        extra += 1;
        Some(r.flag("discardable_flag")?)
    } else {
        None
    };
    let cross_layer_bla_flag = if pps.num_extra_slice_header_bits > extra {
        extra += 1;
        Some(r.flag("cross_layer_bla_flag")?)
    } else {
        None
    };
    let slice_reserved_flag = (extra..pps.num_extra_slice_header_bits)
        .map(|i| r.flag(&format!("slice_reserved_flag[{i}]")))
        .collect::<ParseResult<Vec<_>>>()?;

    let slice_type_code = r.read_ue(
        "slice_type",
        ReadOptions::new()
            .check_range(0, 2)
            .meaning_map::<SliceType>(),
    )?;
    let slice_type = SliceType::from_code(slice_type_code).ok_or_else(|| {
        ParseError::constraint(format!("HEVC: slice_type 非法, value={slice_type_code}"))
    })?;
    if nal_type.is_irap() && slice_type != SliceType::I {
        return Err(ParseError::constraint(format!(
            "HEVC: IRAP 图像的 slice_type 必须为 I, nal_unit_type={}, slice_type={}",
            nal_type.code(),
            slice_type.as_str()
        )));
    }
    let pic_output_flag = if pps.output_flag_present_flag {
        r.flag("pic_output_flag")?
    } else {
        true
    };
    let colour_plane_id = if sps.separate_colour_plane_flag {
        Some(r.read_bits("colour_plane_id", 2, ReadOptions::new().check_range(0, 2))?)
    } else {
        None
    };

    let mut slice_pic_order_cnt_lsb = 0;
    let mut short_term_ref_pic_set_sps_flag = false;
    let mut short_term_ref_pic_set_idx = 0;
    let mut short_term_ref_pic_set = None;
    let mut long_term = LongTermRefs::default();
    let mut slice_temporal_mvp_enabled_flag = false;
    if !nal_type.is_idr() {
        slice_pic_order_cnt_lsb =
            r.bits("slice_pic_order_cnt_lsb", sps.log2_max_pic_order_cnt_lsb_minus4 + 4)?;
        short_term_ref_pic_set_sps_flag = r.flag("short_term_ref_pic_set_sps_flag")?;
        let num_sets = sps.short_term_ref_pic_sets.len();
        let rps = if !short_term_ref_pic_set_sps_flag {
            short_term_ref_pic_set_idx = num_sets as u32;
            ShortTermRps::parse(
                r,
                num_sets,
                num_sets,
                &sps.short_term_ref_pic_sets,
                sps.max_dec_pic_buffering_minus1(),
            )?
        } else {
            if num_sets == 0 {
                return Err(ParseError::constraint(
                    "HEVC: SPS 中没有短期 RPS 时 short_term_ref_pic_set_sps_flag 必须为 0",
                ));
            }
            if num_sets > 1 {
                short_term_ref_pic_set_idx = r.read_bits(
                    "short_term_ref_pic_set_idx",
                    ceil_log2(num_sets as u32),
                    ReadOptions::new().check_range(0, num_sets as i64 - 1),
                )?;
            }
            sps.short_term_ref_pic_sets
                .get(short_term_ref_pic_set_idx as usize)
                .cloned()
                .unwrap_or_default()
        };
        r.log_calculated("CurrRpsIdx", short_term_ref_pic_set_idx);
        if sps.long_term_ref_pics_present_flag {
            long_term = parse_long_term_refs(r, sps, &rps)?;
        }
        short_term_ref_pic_set = Some(rps);
        if sps.sps_temporal_mvp_enabled_flag {
            slice_temporal_mvp_enabled_flag = r.flag("slice_temporal_mvp_enabled_flag")?;
        }
    }
    if nal.nuh_layer_id > 0 {
        r.log_note("nuh_layer_id > 0 的层间参考字段未解析");
    }

    let mut slice_sao_luma_flag = false;
    let mut slice_sao_chroma_flag = false;
    if sps.sample_adaptive_offset_enabled_flag {
        slice_sao_luma_flag = r.flag("slice_sao_luma_flag")?;
        if sps.derived.chroma_array_type != 0 {
            slice_sao_chroma_flag = r.flag("slice_sao_chroma_flag")?;
        }
    }

    // (7-55)
    let num_pic_total_curr = short_term_ref_pic_set
        .as_ref()
        .map_or(0, ShortTermRps::num_used_by_curr)
        + long_term.refs.iter().filter(|l| l.used_by_curr_pic_lt).count();
    let num_pic_total_curr = num_pic_total_curr as u32;
    r.log_calculated("NumPicTotalCurr", num_pic_total_curr);

    let mut num_ref_idx_active_override_flag = false;
    let mut num_ref_idx_l0_active_minus1 = pps.num_ref_idx_l0_default_active_minus1;
    let mut num_ref_idx_l1_active_minus1 = pps.num_ref_idx_l1_default_active_minus1;
    let mut ref_pic_lists_modification = None;
    let mut mvd_l1_zero_flag = false;
    let mut cabac_init_flag = false;
    let mut collocated_from_l0_flag = true;
    let mut collocated_ref_idx = 0;
    let mut pred_weight_table = None;
    let mut five_minus_max_num_merge_cand = None;
    if slice_type != SliceType::I {
        let is_b = slice_type == SliceType::B;
        if num_pic_total_curr == 0 {
            return Err(ParseError::structural(format!(
                "HEVC: {} 条带的 NumPicTotalCurr 为 0",
                slice_type.as_str()
            )));
        }
        num_ref_idx_active_override_flag = r.flag("num_ref_idx_active_override_flag")?;
        if num_ref_idx_active_override_flag {
            num_ref_idx_l0_active_minus1 = r.read_ue(
                "num_ref_idx_l0_active_minus1",
                ReadOptions::new().check_range(0, 14),
            )?;
            if is_b {
                num_ref_idx_l1_active_minus1 = r.read_ue(
                    "num_ref_idx_l1_active_minus1",
                    ReadOptions::new().check_range(0, 14),
                )?;
            }
        }
        if pps.lists_modification_present_flag && num_pic_total_curr > 1 {
            ref_pic_lists_modification = Some(parse_lists_modification(
                r,
                is_b,
                num_pic_total_curr,
                num_ref_idx_l0_active_minus1,
                num_ref_idx_l1_active_minus1,
            )?);
        }
        if is_b {
            mvd_l1_zero_flag = r.flag("mvd_l1_zero_flag")?;
        }
        if pps.cabac_init_present_flag {
            cabac_init_flag = r.flag("cabac_init_flag")?;
        }
        if slice_temporal_mvp_enabled_flag {
            if is_b {
                collocated_from_l0_flag = r.flag("collocated_from_l0_flag")?;
            }
            let max = if collocated_from_l0_flag {
                num_ref_idx_l0_active_minus1
            } else {
                num_ref_idx_l1_active_minus1
            };
            if max > 0 {
                collocated_ref_idx = r.read_ue(
                    "collocated_ref_idx",
                    ReadOptions::new().check_range(0, i64::from(max)),
                )?;
            }
        }
        if (pps.weighted_pred_flag && slice_type == SliceType::P)
            || (pps.weighted_bipred_flag && is_b)
        {
            let weight_ctx = WeightContext {
                chroma_array_type: sps.derived.chroma_array_type,
                bit_depth_luma: sps.derived.bit_depth_luma,
                bit_depth_chroma: sps.derived.bit_depth_chroma,
                high_precision_offsets_enabled_flag: sps
                    .range_extension
                    .is_some_and(|e| e.high_precision_offsets_enabled_flag),
            };
            pred_weight_table = Some(PredWeightTable::parse(
                r,
                &weight_ctx,
                num_ref_idx_l0_active_minus1 + 1,
                is_b.then_some(num_ref_idx_l1_active_minus1 + 1),
            )?);
        }
        five_minus_max_num_merge_cand = Some(r.read_ue(
            "five_minus_max_num_merge_cand",
            ReadOptions::new().check_range(0, 4),
        )?);
    }

    let qp_bd_offset = i64::from(sps.derived.qp_bd_offset_luma);
    let init_qp = 26 + i64::from(pps.init_qp_minus26);
    let slice_qp_delta = r.read_se(
        "slice_qp_delta",
        ReadOptions::new().check_range(-qp_bd_offset - init_qp, 51 - init_qp),
    )?;
    let slice_qp_y = (init_qp + i64::from(slice_qp_delta)) as i32;
    r.log_calculated("SliceQpY", slice_qp_y);

    let mut slice_cb_qp_offset = 0;
    let mut slice_cr_qp_offset = 0;
    if pps.pps_slice_chroma_qp_offsets_present_flag {
        slice_cb_qp_offset = read_chroma_qp_offset(r, "slice_cb_qp_offset", pps.pps_cb_qp_offset)?;
        slice_cr_qp_offset = read_chroma_qp_offset(r, "slice_cr_qp_offset", pps.pps_cr_qp_offset)?;
    }
    let cu_chroma_qp_offset_enabled_flag = if pps.chroma_qp_offset_list_enabled_flag() {
        r.flag("cu_chroma_qp_offset_enabled_flag")?
    } else {
        false
    };

    let mut deblocking = SliceDeblocking {
        slice_deblocking_filter_disabled_flag: pps.pps_deblocking_filter_disabled_flag(),
        slice_beta_offset_div2: pps.deblocking.map_or(0, |d| d.pps_beta_offset_div2),
        slice_tc_offset_div2: pps.deblocking.map_or(0, |d| d.pps_tc_offset_div2),
        ..Default::default()
    };
    if pps.deblocking_filter_override_enabled_flag() {
        deblocking.deblocking_filter_override_flag = r.flag("deblocking_filter_override_flag")?;
    }
    if deblocking.deblocking_filter_override_flag {
        deblocking.slice_deblocking_filter_disabled_flag =
            r.flag("slice_deblocking_filter_disabled_flag")?;
        if !deblocking.slice_deblocking_filter_disabled_flag {
            deblocking.slice_beta_offset_div2 =
                r.read_se("slice_beta_offset_div2", ReadOptions::new().check_range(-6, 6))?;
            deblocking.slice_tc_offset_div2 =
                r.read_se("slice_tc_offset_div2", ReadOptions::new().check_range(-6, 6))?;
        }
    }
    let slice_loop_filter_across_slices_enabled_flag = if pps
        .pps_loop_filter_across_slices_enabled_flag
        && (slice_sao_luma_flag
            || slice_sao_chroma_flag
            || !deblocking.slice_deblocking_filter_disabled_flag)
    {
        r.flag("slice_loop_filter_across_slices_enabled_flag")?
    } else {
        pps.pps_loop_filter_across_slices_enabled_flag
    };

    let (num_entry_point_offsets, offset_len_minus1, entry_point_offset_minus1) =
        parse_entry_points(r, pps, sps)?;
    let slice_segment_header_extension_data_byte = parse_header_extension(r, pps)?;

    let mut header = SliceSegmentHeader {
        first_slice_segment_in_pic_flag,
        no_output_of_prior_pics_flag,
        slice_pic_parameter_set_id,
        pps_seq_parameter_set_id: pps.pps_seq_parameter_set_id,
        dependent_slice_segment_flag,
        slice_segment_address,
        discardable_flag,
        cross_layer_bla_flag,
        slice_reserved_flag,
        slice_type,
        pic_output_flag,
        colour_plane_id,
        slice_pic_order_cnt_lsb,
        short_term_ref_pic_set_sps_flag,
        short_term_ref_pic_set_idx,
        short_term_ref_pic_set,
        num_long_term_sps: long_term.num_long_term_sps,
        num_long_term_pics: long_term.num_long_term_pics,
        long_term_refs: long_term.refs,
        slice_temporal_mvp_enabled_flag,
        slice_sao_luma_flag,
        slice_sao_chroma_flag,
        num_ref_idx_active_override_flag,
        num_ref_idx_l0_active_minus1,
        num_ref_idx_l1_active_minus1,
        num_pic_total_curr,
        ref_pic_lists_modification,
        mvd_l1_zero_flag,
        cabac_init_flag,
        collocated_from_l0_flag,
        collocated_ref_idx,
        pred_weight_table,
        five_minus_max_num_merge_cand,
        slice_qp_delta,
        slice_qp_y,
        slice_cb_qp_offset,
        slice_cr_qp_offset,
        cu_chroma_qp_offset_enabled_flag,
        deblocking,
        slice_loop_filter_across_slices_enabled_flag,
        num_entry_point_offsets,
        offset_len_minus1,
        entry_point_offset_minus1,
        slice_segment_header_extension_data_byte,
        poc: PicOrderCount::default(),
    };

    header.poc = match ctx.previous_independent {
        Some(previous) if !first_slice_segment_in_pic_flag => {
            if previous.slice_pic_order_cnt_lsb != slice_pic_order_cnt_lsb {
                r.log_note(format!(
                    "同一图像内 slice_pic_order_cnt_lsb 不一致, first={}, current={}",
                    previous.slice_pic_order_cnt_lsb, slice_pic_order_cnt_lsb
                ));
            }
            previous.poc
        }
        _ => {
            let input = header.poc_input(nal, ctx.first_picture_in_sequence);
            derive_poc(sps.derived.max_pic_order_cnt_lsb, &input, ctx.poc_state)
        }
    };
    log_poc(r, &header.poc);
    Ok(header)
}

#[derive(Debug, Default)]
struct LongTermRefs {
    num_long_term_sps: u32,
    num_long_term_pics: u32,
    refs: Vec<LongTermRef>,
}

fn parse_long_term_refs(
    r: &mut SyntaxReader<'_>,
    sps: &Sps,
    rps: &ShortTermRps,
) -> ParseResult<LongTermRefs> {
    let candidates = sps.long_term_ref_pics.len() as u32;
    let num_long_term_sps = if candidates > 0 {
        r.read_ue(
            "num_long_term_sps",
            ReadOptions::new().check_range(0, i64::from(candidates)),
        )?
    } else {
        0
    };
    let room = i64::from(sps.max_dec_pic_buffering_minus1())
        - rps.num_delta_pocs() as i64
        - i64::from(num_long_term_sps);
    let num_long_term_pics =
        r.read_ue("num_long_term_pics", ReadOptions::new().check_range(0, room.max(0)))?;

    let poc_lsb_bits = sps.log2_max_pic_order_cnt_lsb_minus4 + 4;
    let mut refs = Vec::with_capacity((num_long_term_sps + num_long_term_pics) as usize);
    for i in 0..num_long_term_sps + num_long_term_pics {
        let (lt_idx_sps, poc_lsb_lt, used_by_curr_pic_lt) = if i < num_long_term_sps {
            let idx = if candidates > 1 {
                r.read_bits(
                    &format!("lt_idx_sps[{i}]"),
                    ceil_log2(candidates),
                    ReadOptions::new().check_range(0, i64::from(candidates) - 1),
                )?
            } else {
                0
            };
            let candidate = sps.long_term_ref_pics.get(idx as usize).ok_or_else(|| {
                ParseError::constraint(format!("HEVC: lt_idx_sps[{i}] 越界, value={idx}"))
            })?;
            (
                Some(idx),
                candidate.lt_ref_pic_poc_lsb_sps,
                candidate.used_by_curr_pic_lt_sps_flag,
            )
        } else {
            let lsb = r.bits(&format!("poc_lsb_lt[{i}]"), poc_lsb_bits)?;
            let used = r.flag(&format!("used_by_curr_pic_lt_flag[{i}]"))?;
            (None, lsb, used)
        };
        let delta_poc_msb_present_flag = r.flag(&format!("delta_poc_msb_present_flag[{i}]"))?;
        let cycle = if delta_poc_msb_present_flag {
            r.ue(&format!("delta_poc_msb_cycle_lt[{i}]"))?
        } else {
            0
        };
        // (7-52): 每组 (SPS 候选 / 显式) 的首项之后按前一项累加
        let delta_poc_msb_cycle_lt = if i == 0 || i == num_long_term_sps {
            cycle
        } else {
            refs.last()
                .map_or(0, |prev: &LongTermRef| prev.delta_poc_msb_cycle_lt)
                .saturating_add(cycle)
        };
        refs.push(LongTermRef {
            lt_idx_sps,
            poc_lsb_lt,
            used_by_curr_pic_lt,
            delta_poc_msb_present_flag,
            delta_poc_msb_cycle_lt,
        });
    }
    Ok(LongTermRefs {
        num_long_term_sps,
        num_long_term_pics,
        refs,
    })
}

fn parse_lists_modification(
    r: &mut SyntaxReader<'_>,
    is_b: bool,
    num_pic_total_curr: u32,
    num_ref_idx_l0_active_minus1: u32,
    num_ref_idx_l1_active_minus1: u32,
) -> ParseResult<RefPicListsModification> {
    r.sub_level("ref_pic_lists_modification()", |r| {
        let list_entry_l0 =
            read_list_entries(r, "l0", num_ref_idx_l0_active_minus1, num_pic_total_curr)?;
        let list_entry_l1 = if is_b {
            read_list_entries(r, "l1", num_ref_idx_l1_active_minus1, num_pic_total_curr)?
        } else {
            None
        };
        Ok(RefPicListsModification {
            list_entry_l0,
            list_entry_l1,
        })
    })
}

fn read_list_entries(
    r: &mut SyntaxReader<'_>,
    list: &str,
    num_ref_idx_active_minus1: u32,
    num_pic_total_curr: u32,
) -> ParseResult<Option<Vec<u32>>> {
    if !r.flag(&format!("ref_pic_list_modification_flag_{list}"))? {
        return Ok(None);
    }
    let width = ceil_log2(num_pic_total_curr);
    let max = i64::from(num_pic_total_curr) - 1;
    (0..=num_ref_idx_active_minus1)
        .map(|i| {
            r.read_bits(
                &format!("list_entry_{list}[{i}]"),
                width,
                ReadOptions::new().check_range(0, max),
            )
        })
        .collect::<ParseResult<Vec<_>>>()
        .map(Some)
}

fn read_chroma_qp_offset(r: &mut SyntaxReader<'_>, name: &str, pps_offset: i32) -> ParseResult<i32> {
    let v = r.read_se(name, ReadOptions::new().check_range(-12, 12))?;
    let sum = pps_offset + v;
    if !(-12..=12).contains(&sum) {
        return Err(ParseError::constraint(format!(
            "HEVC: PPS 与条带的色度 QP 偏移之和超出 [-12, 12], {name}={v}, pps={pps_offset}"
        )));
    }
    Ok(v)
}

/// num_entry_point_offsets 与各入口偏移, 上限由 tile/WPP 组合决定 (7.4.7.1)
fn parse_entry_points(
    r: &mut SyntaxReader<'_>,
    pps: &Pps,
    sps: &Sps,
) -> ParseResult<(u32, Option<u32>, Vec<u32>)> {
    if !pps.tiles_enabled_flag() && !pps.entropy_coding_sync_enabled_flag {
        return Ok((0, None, Vec::new()));
    }
    let layout = pps.tile_layout(sps)?;
    let height = i64::from(sps.derived.pic_height_in_ctbs_y);
    let cols = layout.column_widths.len() as i64;
    let max = match (pps.tiles_enabled_flag(), pps.entropy_coding_sync_enabled_flag) {
        (false, _) => height - 1,
        (true, false) => layout.num_tiles() as i64 - 1,
        (true, true) => cols * height - 1,
    };
    let num_entry_point_offsets =
        r.read_ue("num_entry_point_offsets", ReadOptions::new().check_range(0, max))?;
    if num_entry_point_offsets == 0 {
        return Ok((0, None, Vec::new()));
    }
    let offset_len_minus1 =
        r.read_ue("offset_len_minus1", ReadOptions::new().check_range(0, 31))?;
    let offsets = (0..num_entry_point_offsets)
        .map(|i| r.bits(&format!("entry_point_offset_minus1[{i}]"), offset_len_minus1 + 1))
        .collect::<ParseResult<Vec<_>>>()?;
    Ok((num_entry_point_offsets, Some(offset_len_minus1), offsets))
}

fn parse_header_extension(r: &mut SyntaxReader<'_>, pps: &Pps) -> ParseResult<Vec<u8>> {
    if !pps.slice_segment_header_extension_present_flag {
        return Ok(Vec::new());
    }
    let len = r.read_ue(
        "slice_segment_header_extension_length",
        ReadOptions::new().check_range(0, 256),
    )?;
    (0..len)
        .map(|i| {
            r.bits(&format!("slice_segment_header_extension_data_byte[{i}]"), 8)
                .map(|b| b as u8)
        })
        .collect()
}

fn log_poc(r: &mut SyntaxReader<'_>, poc: &PicOrderCount) {
    r.log_calculated("NoRaslOutputFlag", poc.no_rasl_output_flag);
    r.log_calculated("prevPicOrderCntLsb", poc.prev_pic_order_cnt_lsb);
    r.log_calculated("prevPicOrderCntMsb", poc.prev_pic_order_cnt_msb);
    r.log_calculated("PicOrderCntMsb", poc.pic_order_cnt_msb);
    r.log_calculated("PicOrderCntVal", poc.pic_order_cnt_val);
}
