//! slice_header() (7.3.3) 与 POC 推导.

use log::debug;
use nalscope_core::{ParseError, ParseResult, ReadOptions, SyntaxReader};

use super::SliceDecodingContext;
use super::marking::DecRefPicMarking;
use super::pred_weight::PredWeightTable;
use super::ref_pic_list::RefPicListModification;
use crate::avc::nal::{HeaderExtension, NalHeader, NalUnitType};
use crate::avc::parser::AvcParameterSets;
use crate::avc::poc::{PicOrderCount, PocDiagnostic, PocInput, PocState, derive_poc};
use crate::avc::sps::PicOrderCntInfo;
use crate::avc::tables::{SliceType, SliceTypeCode};

/// 去块滤波控制字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeblockingFilter {
    pub disable_deblocking_filter_idc: u32,
    pub slice_alpha_c0_offset_div2: i32,
    pub slice_beta_offset_div2: i32,
}

/// 条带头
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceHeader {
    pub nal_ref_idc: u32,
    pub nal_unit_type: NalUnitType,
    /// IdrPicFlag
    pub idr: bool,
    pub first_mb_in_slice: u32,
    /// 原始 slice_type (0..=9)
    pub slice_type_code: u32,
    pub slice_type: SliceType,
    pub pic_parameter_set_id: u32,
    pub seq_parameter_set_id: u32,
    pub colour_plane_id: Option<u32>,
    pub frame_num: u32,
    pub field_pic_flag: bool,
    pub bottom_field_flag: bool,
    pub idr_pic_id: Option<u32>,
    pub pic_order_cnt_lsb: Option<u32>,
    pub delta_pic_order_cnt_bottom: i32,
    pub delta_pic_order_cnt: [i32; 2],
    pub redundant_pic_cnt: Option<u32>,
    pub direct_spatial_mv_pred_flag: Option<bool>,
    pub num_ref_idx_active_override_flag: bool,
    pub num_ref_idx_l0_active_minus1: u32,
    pub num_ref_idx_l1_active_minus1: u32,
    pub ref_pic_list_modification: RefPicListModification,
    pub pred_weight_table: Option<PredWeightTable>,
    /// nal_ref_idc 为 0 时不存在
    pub dec_ref_pic_marking: Option<DecRefPicMarking>,
    pub cabac_init_idc: Option<u32>,
    pub slice_qp_delta: i32,
    /// SliceQPY = 26 + pic_init_qp_minus26 + slice_qp_delta
    pub slice_qp: i32,
    pub sp_for_switch_flag: Option<bool>,
    pub slice_qs_delta: Option<i32>,
    pub deblocking: Option<DeblockingFilter>,
    pub slice_group_change_cycle: Option<u32>,
    pub context: SliceDecodingContext,
    pub poc: PicOrderCount,
    pub poc_diagnostic: Option<PocDiagnostic>,
}

impl SliceHeader {
    /// 解析条带头并推导 POC
    ///
    /// `prev` 为上一图像的 POC 状态 (由调用方维护).
    pub fn parse(
        r: &mut SyntaxReader<'_>,
        nal: &NalHeader,
        sets: &AvcParameterSets,
        prev: Option<&PocState>,
    ) -> ParseResult<Self> {
        match nal.extension {
            Some(HeaderExtension::Svc(_)) => {
                return Err(ParseError::Unsupported(
                    "AVC: slice_header_in_scalable_extension()".into(),
                ));
            }
            Some(HeaderExtension::Avc3d) => {
                return Err(ParseError::Unsupported(
                    "AVC: slice_header_in_3davc_extension()".into(),
                ));
            }
            _ => {}
        }
        r.sub_level("slice_header()", |r| parse_body(r, nal, sets, prev))
    }

    /// 转为供下一图像使用的 POC 状态
    pub fn poc_state(&self) -> PocState {
        PocState::new(&self.poc_input(), &self.poc)
    }

    pub fn poc_input(&self) -> PocInput {
        PocInput {
            idr: self.idr,
            slice_type: self.slice_type,
            nal_ref_idc: self.nal_ref_idc,
            first_mb_in_slice: self.first_mb_in_slice,
            frame_num: self.frame_num,
            field_pic_flag: self.field_pic_flag,
            bottom_field_flag: self.bottom_field_flag,
            pic_order_cnt_lsb: self.pic_order_cnt_lsb.unwrap_or(0),
            delta_pic_order_cnt_bottom: self.delta_pic_order_cnt_bottom,
            delta_pic_order_cnt: self.delta_pic_order_cnt,
            has_mmco5: self
                .dec_ref_pic_marking
                .as_ref()
                .is_some_and(DecRefPicMarking::has_mmco5),
        }
    }

    /// PicOrderCnt(CurrPic)
    pub fn pic_order_cnt(&self) -> i64 {
        self.poc.pic_order_cnt(&self.poc_input())
    }
}

fn parse_body(
    r: &mut SyntaxReader<'_>,
    nal: &NalHeader,
    sets: &AvcParameterSets,
    prev: Option<&PocState>,
) -> ParseResult<SliceHeader> {
    let extension_slice = matches!(nal.extension, Some(HeaderExtension::Mvc(_)));
    let idr = nal.idr_pic_flag();

    let first_mb_in_slice = r.ue("first_mb_in_slice")?;
    let slice_type_code = r.read_ue(
        "slice_type",
        ReadOptions::new()
            .check_range(0, 9)
            .meaning_map::<SliceTypeCode>(),
    )?;
    let slice_type = SliceType::from_code(slice_type_code).ok_or_else(|| {
        ParseError::constraint(format!("AVC: slice_type 非法, value={slice_type_code}"))
    })?;
    if idr && !slice_type.is_intra() {
        return Err(ParseError::constraint(format!(
            "AVC: IDR 图像的 slice_type 必须为 I/SI, slice_type={slice_type_code}"
        )));
    }

    let pic_parameter_set_id =
        r.read_ue("pic_parameter_set_id", ReadOptions::new().check_range(0, 255))?;
    let pps = sets.pps.get(pic_parameter_set_id)?;
    let sps = sets.sps_for_slice(pps.seq_parameter_set_id, extension_slice)?;

    let colour_plane_id = if sps.separate_colour_plane_flag {
        Some(r.read_bits("colour_plane_id", 2, ReadOptions::new().check_range(0, 2))?)
    } else {
        None
    };
    let frame_num = r.bits("frame_num", sps.log2_max_frame_num_minus4 + 4)?;
    if idr && frame_num != 0 {
        return Err(ParseError::constraint(format!(
            "AVC: IDR 图像的 frame_num 必须为 0, frame_num={frame_num}"
        )));
    }

    let mut field_pic_flag = false;
    let mut bottom_field_flag = false;
    if !sps.frame_mbs_only_flag {
        field_pic_flag = r.flag("field_pic_flag")?;
        if field_pic_flag {
            bottom_field_flag = r.flag("bottom_field_flag")?;
        }
    }

    let context = SliceDecodingContext::new(sps, field_pic_flag);
    r.log_calculated("MbaffFrameFlag", context.mbaff_frame_flag);
    r.log_calculated("PicHeightInMbs", context.pic_height_in_mbs);
    r.log_calculated("PicSizeInMbs", context.pic_size_in_mbs);
    r.log_calculated("MaxPicNum", context.max_pic_num);

    let max_first_mb = if context.mbaff_frame_flag {
        context.pic_size_in_mbs / 2
    } else {
        context.pic_size_in_mbs
    };
    if first_mb_in_slice >= max_first_mb {
        return Err(ParseError::constraint(format!(
            "AVC: first_mb_in_slice 超出范围, value={first_mb_in_slice}, PicSizeInMbs={}",
            context.pic_size_in_mbs
        )));
    }

    let idr_pic_id = if idr {
        Some(r.read_ue("idr_pic_id", ReadOptions::new().check_range(0, 65535))?)
    } else {
        None
    };

    let mut pic_order_cnt_lsb = None;
    let mut delta_pic_order_cnt_bottom = 0;
    let mut delta_pic_order_cnt = [0; 2];
    let bottom_present = pps.bottom_field_pic_order_in_frame_present_flag && !field_pic_flag;
    match &sps.pic_order_cnt {
        PicOrderCntInfo::Type0 {
            log2_max_pic_order_cnt_lsb_minus4,
        } => {
            pic_order_cnt_lsb = Some(r.read_bits(
                "pic_order_cnt_lsb",
                log2_max_pic_order_cnt_lsb_minus4 + 4,
                ReadOptions::new()
                    .check_range(0, i64::from(sps.derived.max_pic_order_cnt_lsb) - 1),
            )?);
            if bottom_present {
                delta_pic_order_cnt_bottom = r.se("delta_pic_order_cnt_bottom")?;
            }
        }
        PicOrderCntInfo::Type1 {
            delta_pic_order_always_zero_flag: false,
            ..
        } => {
            delta_pic_order_cnt[0] = r.se("delta_pic_order_cnt[0]")?;
            if bottom_present {
                delta_pic_order_cnt[1] = r.se("delta_pic_order_cnt[1]")?;
            }
        }
        _ => {}
    }

    let redundant_pic_cnt = if pps.redundant_pic_cnt_present_flag {
        Some(r.read_ue("redundant_pic_cnt", ReadOptions::new().check_range(0, 127))?)
    } else {
        None
    };

    let direct_spatial_mv_pred_flag = if slice_type == SliceType::B {
        Some(r.flag("direct_spatial_mv_pred_flag")?)
    } else {
        None
    };

    let mut num_ref_idx_active_override_flag = false;
    let mut num_ref_idx_l0_active_minus1 = pps.num_ref_idx_l0_default_active_minus1;
    let mut num_ref_idx_l1_active_minus1 = pps.num_ref_idx_l1_default_active_minus1;
    if matches!(slice_type, SliceType::P | SliceType::Sp | SliceType::B) {
        num_ref_idx_active_override_flag = r.flag("num_ref_idx_active_override_flag")?;
        if num_ref_idx_active_override_flag {
            let max = if field_pic_flag { 31 } else { 15 };
            num_ref_idx_l0_active_minus1 = r.read_ue(
                "num_ref_idx_l0_active_minus1",
                ReadOptions::new().check_range(0, max),
            )?;
            if slice_type == SliceType::B {
                num_ref_idx_l1_active_minus1 = r.read_ue(
                    "num_ref_idx_l1_active_minus1",
                    ReadOptions::new().check_range(0, max),
                )?;
            }
        }
    }

    let ref_pic_list_modification =
        RefPicListModification::parse(r, slice_type, extension_slice, context.max_pic_num)?;

    let weighted = (pps.weighted_pred_flag && matches!(slice_type, SliceType::P | SliceType::Sp))
        || (pps.weighted_bipred_idc == 1 && slice_type == SliceType::B);
    let pred_weight_table = if weighted {
        Some(PredWeightTable::parse(
            r,
            sps.derived.chroma_array_type,
            num_ref_idx_l0_active_minus1 + 1,
            (slice_type == SliceType::B).then_some(num_ref_idx_l1_active_minus1 + 1),
        )?)
    } else {
        None
    };

    let dec_ref_pic_marking = if nal.nal_ref_idc != 0 {
        Some(DecRefPicMarking::parse(
            r,
            idr,
            context.max_pic_num,
            sps.max_num_ref_frames,
        )?)
    } else {
        None
    };

    let cabac_init_idc = if pps.entropy_coding_mode_flag && !slice_type.is_intra() {
        Some(r.read_ue("cabac_init_idc", ReadOptions::new().check_range(0, 2))?)
    } else {
        None
    };

    let qp_bd_offset = i64::from(sps.derived.qp_bd_offset_luma);
    let slice_qp_delta = r.se("slice_qp_delta")?;
    let slice_qp = 26 + pps.pic_init_qp_minus26 + slice_qp_delta;
    if !(-qp_bd_offset..=51).contains(&i64::from(slice_qp)) {
        return Err(ParseError::constraint(format!(
            "AVC: slice_qp_delta 使 SliceQPY 超出范围, SliceQPY={slice_qp}, min={}",
            -qp_bd_offset
        )));
    }
    r.log_calculated("SliceQPY", slice_qp);

    let mut sp_for_switch_flag = None;
    let mut slice_qs_delta = None;
    if matches!(slice_type, SliceType::Sp | SliceType::Si) {
        if slice_type == SliceType::Sp {
            sp_for_switch_flag = Some(r.flag("sp_for_switch_flag")?);
        }
        let qs_min = -26 - i64::from(pps.pic_init_qs_minus26);
        slice_qs_delta = Some(r.read_se(
            "slice_qs_delta",
            ReadOptions::new().check_range(qs_min, qs_min + 51),
        )?);
    }

    let deblocking = if pps.deblocking_filter_control_present_flag {
        let disable_deblocking_filter_idc = r.read_ue(
            "disable_deblocking_filter_idc",
            ReadOptions::new().check_range(0, 2),
        )?;
        let mut filter = DeblockingFilter {
            disable_deblocking_filter_idc,
            ..Default::default()
        };
        if disable_deblocking_filter_idc != 1 {
            filter.slice_alpha_c0_offset_div2 = r.read_se(
                "slice_alpha_c0_offset_div2",
                ReadOptions::new().check_range(-6, 6),
            )?;
            filter.slice_beta_offset_div2 =
                r.read_se("slice_beta_offset_div2", ReadOptions::new().check_range(-6, 6))?;
        }
        Some(filter)
    } else {
        None
    };

    let slice_group_change_cycle = match pps.slice_group_change_rate() {
        Some(rate) => {
            let map_units = u64::from(sps.derived.pic_size_in_map_units);
            let rate = u64::from(rate);
            let width = slice_group_change_cycle_bits(map_units, rate);
            let max = map_units.div_ceil(rate);
            Some(r.read_bits(
                "slice_group_change_cycle",
                width,
                ReadOptions::new().check_range(0, max as i64),
            )?)
        }
        None => None,
    };

    let mut header = SliceHeader {
        nal_ref_idc: nal.nal_ref_idc,
        nal_unit_type: nal.nal_unit_type,
        idr,
        first_mb_in_slice,
        slice_type_code,
        slice_type,
        pic_parameter_set_id,
        seq_parameter_set_id: sps.seq_parameter_set_id,
        colour_plane_id,
        frame_num,
        field_pic_flag,
        bottom_field_flag,
        idr_pic_id,
        pic_order_cnt_lsb,
        delta_pic_order_cnt_bottom,
        delta_pic_order_cnt,
        redundant_pic_cnt,
        direct_spatial_mv_pred_flag,
        num_ref_idx_active_override_flag,
        num_ref_idx_l0_active_minus1,
        num_ref_idx_l1_active_minus1,
        ref_pic_list_modification,
        pred_weight_table,
        dec_ref_pic_marking,
        cabac_init_idc,
        slice_qp_delta,
        slice_qp,
        sp_for_switch_flag,
        slice_qs_delta,
        deblocking,
        slice_group_change_cycle,
        context,
        poc: PicOrderCount::default(),
        poc_diagnostic: None,
    };

    let (poc, diagnostic) = derive_poc(sps, &header.poc_input(), prev);
    header.poc = poc;
    header.poc_diagnostic = diagnostic;
    match diagnostic {
        Some(d) => r.log_note(d.to_string()),
        None => log_poc(r, &sps.pic_order_cnt, &poc),
    }

    debug!(
        "AVC: slice type={}, frame_num={}, first_mb={}, top_poc={}, global_poc={}",
        slice_type.as_str(),
        frame_num,
        first_mb_in_slice,
        poc.top_field_order_cnt,
        poc.global.value
    );
    Ok(header)
}

fn log_poc(r: &mut SyntaxReader<'_>, info: &PicOrderCntInfo, poc: &PicOrderCount) {
    match info {
        PicOrderCntInfo::Type0 { .. } => {
            r.log_calculated("prevPicOrderCntMsb", poc.prev_pic_order_cnt_msb);
            r.log_calculated("prevPicOrderCntLsb", poc.prev_pic_order_cnt_lsb);
            r.log_calculated("PicOrderCntMsb", poc.pic_order_cnt_msb);
        }
        _ => r.log_calculated("FrameNumOffset", poc.frame_num_offset),
    }
    r.log_calculated("TopFieldOrderCnt", poc.top_field_order_cnt);
    r.log_calculated("BottomFieldOrderCnt", poc.bottom_field_order_cnt);
    r.log_calculated("GlobalPOC", poc.global.value);
}

/// Ceil(Log2(PicSizeInMapUnits ÷ SliceGroupChangeRate + 1)), ÷ 为精确除法
fn slice_group_change_cycle_bits(pic_size_in_map_units: u64, rate: u64) -> u32 {
    let target = pic_size_in_map_units + rate;
    let mut bits = 0;
    while (rate << bits) < target {
        bits += 1;
    }
    bits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_group_change_cycle_bits() {
        // 99 ÷ 1 + 1 = 100 → 7 位
        assert_eq!(slice_group_change_cycle_bits(99, 1), 7);
        // 300 ÷ 2 + 1 = 151 → 8 位
        assert_eq!(slice_group_change_cycle_bits(300, 2), 8);
        // 300 ÷ 300 + 1 = 2 → 1 位
        assert_eq!(slice_group_change_cycle_bits(300, 300), 1);
        // 10 ÷ 3 + 1 = 4.33 → 3 位
        assert_eq!(slice_group_change_cycle_bits(10, 3), 3);
    }
}
