//! AVC SEI 负载 (附录 D).
//!
//! 解析 buffering_period、pic_timing、user_data_unregistered 与 recovery_point,
//! 其余类型只记录类型与长度. pic_timing 依赖生效 SPS 的 VUI/HRD, SPS 未就绪时
//! 负载以原始字节保留为 [`SeiPayload::Pending`].

use nalscope_core::{ParameterSetStore, ParseResult, ReadOptions, SyntaxReader};

use super::hrd::HrdParameters;
use super::sps::Sps;
use crate::sei::{SeiMessage, UserDataUnregistered, pic_struct_meaning, read_sei_rbsp};

/// payloadType 名称 (表 D-1 所列类型)
pub fn payload_type_name(payload_type: u32) -> Option<&'static str> {
    Some(match payload_type {
        0 => "buffering_period",
        1 => "pic_timing",
        2 => "pan_scan_rect",
        3 => "filler_payload",
        4 => "user_data_registered_itu_t_t35",
        5 => "user_data_unregistered",
        6 => "recovery_point",
        7 => "dec_ref_pic_marking_repetition",
        8 => "spare_pic",
        9 => "scene_info",
        10 => "sub_seq_info",
        11 => "sub_seq_layer_characteristics",
        12 => "sub_seq_characteristics",
        13 => "full_frame_freeze",
        14 => "full_frame_freeze_release",
        15 => "full_frame_snapshot",
        16 => "progressive_refinement_segment_start",
        17 => "progressive_refinement_segment_end",
        18 => "motion_constrained_slice_group_set",
        19 => "film_grain_characteristics",
        20 => "deblocking_filter_display_preference",
        21 => "stereo_video_info",
        22 => "post_filter_hint",
        23 => "tone_mapping_info",
        24 => "scalability_info",
        25 => "sub_pic_scalable_layer",
        26 => "non_required_layer_rep",
        27 => "priority_layer_info",
        28 => "layers_not_present",
        29 => "layer_dependency_change",
        30 => "scalable_nesting",
        31 => "base_layer_temporal_hrd",
        32 => "quality_layer_integrity_check",
        33 => "redundant_pic_property",
        34 => "tl0_dep_rep_index",
        35 => "tl_switching_point",
        36 => "parallel_decoding_info",
        37 => "mvc_scalable_nesting",
        38 => "view_scalability_info",
        39 => "multiview_scene_info",
        40 => "multiview_acquisition_info",
        41 => "non_required_view_component",
        42 => "view_dependency_change",
        43 => "operation_points_not_present",
        44 => "base_view_temporal_hrd",
        45 => "frame_packing_arrangement",
        46 => "multiview_view_position",
        47 => "display_orientation",
        48 => "mvcd_scalable_nesting",
        49 => "mvcd_view_scalability_info",
        50 => "depth_representation_info",
        51 => "three_dimensional_reference_displays_info",
        52 => "depth_timing",
        53 => "depth_sampling_info",
        54 => "constrained_depth_parameter_set_identifier",
        _ => return None,
    })
}

/// 一个调度的初始 CPB 移除延迟
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitialCpbRemoval {
    pub initial_cpb_removal_delay: u32,
    pub initial_cpb_removal_delay_offset: u32,
}

/// buffering_period() (D.1.2)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferingPeriod {
    pub seq_parameter_set_id: u32,
    pub nal: Vec<InitialCpbRemoval>,
    pub vcl: Vec<InitialCpbRemoval>,
}

/// clock_timestamp 的一项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClockTimestamp {
    pub ct_type: u32,
    pub nuit_field_based_flag: bool,
    pub counting_type: u32,
    pub full_timestamp_flag: bool,
    pub discontinuity_flag: bool,
    pub cnt_dropped_flag: bool,
    pub n_frames: u32,
    pub seconds_value: Option<u32>,
    pub minutes_value: Option<u32>,
    pub hours_value: Option<u32>,
    pub time_offset: Option<i32>,
}

/// pic_timing() (D.1.3)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PicTiming {
    pub cpb_removal_delay: Option<u32>,
    pub dpb_output_delay: Option<u32>,
    pub pic_struct: Option<u32>,
    /// 长度为 NumClockTS, clock_timestamp_flag=0 的项为 None
    pub clock_timestamps: Vec<Option<ClockTimestamp>>,
}

/// recovery_point() (D.1.8)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPoint {
    pub recovery_frame_cnt: u32,
    pub exact_match_flag: bool,
    pub broken_link_flag: bool,
    pub changing_slice_group_idc: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeiPayload {
    BufferingPeriod(BufferingPeriod),
    PicTiming(PicTiming),
    UserDataUnregistered(UserDataUnregistered),
    RecoveryPoint(RecoveryPoint),
    /// 所需参数集缺失, 保留原始负载
    Pending { reason: String, raw: Vec<u8> },
    /// 未解析的类型
    Unparsed,
}

/// 解析 sei_rbsp(). `active_sps` 为当前图像生效的 SPS
pub fn parse_sei(
    r: &mut SyntaxReader<'_>,
    sps_store: &ParameterSetStore<Sps>,
    active_sps: Option<&Sps>,
) -> ParseResult<Vec<SeiMessage<SeiPayload>>> {
    r.sub_level("sei_rbsp()", |r| {
        read_sei_rbsp(r, payload_type_name, |r, payload_type, bounds| {
            let raw = bounds.raw(r);
            let payload = match payload_type {
                0 => {
                    let id = r.read_ue(
                        "seq_parameter_set_id",
                        ReadOptions::new().check_range(0, 31),
                    )?;
                    match sps_store.get(id) {
                        Ok(sps) => SeiPayload::BufferingPeriod(parse_buffering_period(r, id, sps)?),
                        Err(err) => pending(r, err.to_string(), raw),
                    }
                }
                1 => match active_sps {
                    Some(sps) => SeiPayload::PicTiming(parse_pic_timing(r, sps)?),
                    None => pending(r, "pic_timing 需要生效的 SPS".to_string(), raw),
                },
                5 => SeiPayload::UserDataUnregistered(UserDataUnregistered::parse(r, bounds)?),
                6 => SeiPayload::RecoveryPoint(parse_recovery_point(r)?),
                _ => SeiPayload::Unparsed,
            };
            Ok(payload)
        })
    })
}

fn pending(r: &mut SyntaxReader<'_>, reason: String, raw: Vec<u8>) -> SeiPayload {
    r.log_note(format!("SEI 负载暂不解析: {reason}"));
    SeiPayload::Pending { reason, raw }
}

fn parse_buffering_period(r: &mut SyntaxReader<'_>, id: u32, sps: &Sps) -> ParseResult<BufferingPeriod> {
    r.sub_level("buffering_period()", |r| {
        let vui = sps.vui.as_ref();
        let nal = match vui.and_then(|v| v.nal_hrd.as_ref()) {
            Some(hrd) => read_initial_removals(r, "nal", hrd)?,
            None => Vec::new(),
        };
        let vcl = match vui.and_then(|v| v.vcl_hrd.as_ref()) {
            Some(hrd) => read_initial_removals(r, "vcl", hrd)?,
            None => Vec::new(),
        };
        Ok(BufferingPeriod {
            seq_parameter_set_id: id,
            nal,
            vcl,
        })
    })
}

fn read_initial_removals(
    r: &mut SyntaxReader<'_>,
    prefix: &str,
    hrd: &HrdParameters,
) -> ParseResult<Vec<InitialCpbRemoval>> {
    let width = hrd.initial_cpb_removal_delay_length_minus1 + 1;
    (0..=hrd.cpb_cnt_minus1)
        .map(|i| {
            Ok(InitialCpbRemoval {
                initial_cpb_removal_delay: r.read_bits(
                    &format!("{prefix}_initial_cpb_removal_delay[{i}]"),
                    width,
                    ReadOptions::new().check_greater(0),
                )?,
                initial_cpb_removal_delay_offset: r
                    .bits(&format!("{prefix}_initial_cpb_removal_delay_offset[{i}]"), width)?,
            })
        })
        .collect()
}

/// NumClockTS (表 D-1)
fn num_clock_ts(pic_struct: u32) -> u32 {
    match pic_struct {
        0..=2 => 1,
        3 | 4 | 7 => 2,
        5 | 6 | 8 => 3,
        _ => 0,
    }
}

fn parse_pic_timing(r: &mut SyntaxReader<'_>, sps: &Sps) -> ParseResult<PicTiming> {
    r.sub_level("pic_timing()", |r| {
        let mut timing = PicTiming::default();
        let Some(vui) = sps.vui.as_ref() else {
            r.log_note("生效的 SPS 没有 VUI, pic_timing 无可解析字段");
            return Ok(timing);
        };
        // CpbDpbDelaysPresentFlag
        if let Some(hrd) = vui.nal_hrd.as_ref().or(vui.vcl_hrd.as_ref()) {
            timing.cpb_removal_delay =
                Some(r.bits("cpb_removal_delay", hrd.cpb_removal_delay_length_minus1 + 1)?);
            timing.dpb_output_delay =
                Some(r.bits("dpb_output_delay", hrd.dpb_output_delay_length_minus1 + 1)?);
        }
        if vui.pic_struct_present_flag {
            let meaning = pic_struct_meaning(r.peek_bits(4)?);
            let pic_struct = r.read_bits("pic_struct", 4, ReadOptions::new().meaning(meaning))?;
            if pic_struct > 8 {
                r.log_note(format!("pic_struct={pic_struct} 为保留值"));
            }
            let time_offset_length = vui
                .nal_hrd
                .as_ref()
                .or(vui.vcl_hrd.as_ref())
                .map_or(0, |h| h.time_offset_length);
            for i in 0..num_clock_ts(pic_struct) {
                let ts = if r.flag(&format!("clock_timestamp_flag[{i}]"))? {
                    Some(parse_clock_timestamp(r, i, time_offset_length)?)
                } else {
                    None
                };
                timing.clock_timestamps.push(ts);
            }
            timing.pic_struct = Some(pic_struct);
        }
        Ok(timing)
    })
}

fn parse_clock_timestamp(
    r: &mut SyntaxReader<'_>,
    i: u32,
    time_offset_length: u32,
) -> ParseResult<ClockTimestamp> {
    let minute_range = ReadOptions::new().check_range(0, 59);
    let mut ts = ClockTimestamp {
        ct_type: r.read_bits(
            &format!("ct_type[{i}]"),
            2,
            ReadOptions::new().check_range(0, 2),
        )?,
        nuit_field_based_flag: r.flag(&format!("nuit_field_based_flag[{i}]"))?,
        counting_type: r.read_bits(
            &format!("counting_type[{i}]"),
            5,
            ReadOptions::new().check_range(0, 6),
        )?,
        full_timestamp_flag: r.flag(&format!("full_timestamp_flag[{i}]"))?,
        discontinuity_flag: r.flag(&format!("discontinuity_flag[{i}]"))?,
        cnt_dropped_flag: r.flag(&format!("cnt_dropped_flag[{i}]"))?,
        n_frames: r.bits(&format!("n_frames[{i}]"), 8)?,
        ..Default::default()
    };
    if ts.full_timestamp_flag {
        ts.seconds_value = Some(r.read_bits(&format!("seconds_value[{i}]"), 6, minute_range.clone())?);
        ts.minutes_value = Some(r.read_bits(&format!("minutes_value[{i}]"), 6, minute_range)?);
        ts.hours_value = Some(r.read_bits(
            &format!("hours_value[{i}]"),
            5,
            ReadOptions::new().check_range(0, 23),
        )?);
    } else if r.flag(&format!("seconds_flag[{i}]"))? {
        ts.seconds_value = Some(r.read_bits(&format!("seconds_value[{i}]"), 6, minute_range.clone())?);
        if r.flag(&format!("minutes_flag[{i}]"))? {
            ts.minutes_value = Some(r.read_bits(&format!("minutes_value[{i}]"), 6, minute_range)?);
            if r.flag(&format!("hours_flag[{i}]"))? {
                ts.hours_value = Some(r.read_bits(
                    &format!("hours_value[{i}]"),
                    5,
                    ReadOptions::new().check_range(0, 23),
                )?);
            }
        }
    }
    if time_offset_length > 0 {
        let v = r.bits(&format!("time_offset[{i}]"), time_offset_length)?;
        // i(v): 二进制补码
        let shift = 32 - time_offset_length;
        ts.time_offset = Some(((v << shift) as i32) >> shift);
    }
    Ok(ts)
}

fn parse_recovery_point(r: &mut SyntaxReader<'_>) -> ParseResult<RecoveryPoint> {
    r.sub_level("recovery_point()", |r| {
        Ok(RecoveryPoint {
            recovery_frame_cnt: r.ue("recovery_frame_cnt")?,
            exact_match_flag: r.flag("exact_match_flag")?,
            broken_link_flag: r.flag("broken_link_flag")?,
            changing_slice_group_idc: r.bits("changing_slice_group_idc", 2)?,
        })
    })
}
