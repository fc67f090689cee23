//! HEVC SEI 负载 (附录 D).
//!
//! 前缀 SEI 与后缀 SEI 使用不同的 payloadType 名称表. buffering_period 与 pic_timing
//! 依赖 SPS (及其 VPS) 中的 HRD 参数, 参数集未就绪时负载保留为 [`SeiPayload::Pending`].

use nalscope_core::{ParseResult, ReadOptions, SyntaxReader};

use super::hrd::HrdParameters;
use super::nal::NalUnitType;
use super::parser::HevcParameterSets;
use super::sps::Sps;
use super::vps::Vps;
use crate::sei::{
    ContentLightLevel, MasteringDisplayColourVolume, PayloadBounds, SeiMessage,
    UserDataUnregistered, pic_struct_meaning, read_sei_rbsp,
};

/// 前缀 SEI 的 payloadType 名称
pub fn prefix_payload_type_name(payload_type: u32) -> Option<&'static str> {
    Some(match payload_type {
        0 => "buffering_period",
        1 => "pic_timing",
        2 => "pan_scan_rect",
        3 => "filler_payload",
        4 => "user_data_registered_itu_t_t35",
        5 => "user_data_unregistered",
        6 => "recovery_point",
        9 => "scene_info",
        15 => "picture_snapshot",
        16 => "progressive_refinement_segment_start",
        17 => "progressive_refinement_segment_end",
        19 => "film_grain_characteristics",
        22 => "post_filter_hint",
        23 => "tone_mapping_info",
        45 => "frame_packing_arrangement",
        47 => "display_orientation",
        56 => "green_metadata",
        128 => "structure_of_pictures_info",
        129 => "active_parameter_sets",
        130 => "decoding_unit_info",
        131 => "temporal_sub_layer_zero_index",
        133 => "scalable_nesting",
        134 => "region_refresh_info",
        135 => "no_display",
        136 => "time_code",
        137 => "mastering_display_colour_volume",
        138 => "segmented_rect_frame_packing_arrangement",
        139 => "temporal_motion_constrained_tile_sets",
        140 => "chroma_resampling_filter_hint",
        141 => "knee_function_info",
        142 => "colour_remapping_info",
        143 => "deinterlaced_field_identification",
        144 => "content_light_level_info",
        145 => "dependent_rap_indication",
        146 => "coded_region_completion",
        147 => "alternative_transfer_characteristics",
        148 => "ambient_viewing_environment",
        160 => "layers_not_present",
        161 => "inter_layer_constrained_tile_sets",
        162 => "bsp_nesting",
        163 => "bsp_initial_arrival_time",
        164 => "sub_bitstream_property",
        165 => "alpha_channel_info",
        166 => "overlay_info",
        167 => "temporal_mv_prediction_constraints",
        168 => "frame_field_info",
        176 => "three_dimensional_reference_displays_info",
        177 => "depth_representation_info",
        178 => "multiview_scene_info",
        179 => "multiview_acquisition_info",
        180 => "multiview_view_position",
        181 => "alternative_depth_info",
        _ => return None,
    })
}

/// 后缀 SEI 的 payloadType 名称
pub fn suffix_payload_type_name(payload_type: u32) -> Option<&'static str> {
    Some(match payload_type {
        3 => "filler_payload",
        4 => "user_data_registered_itu_t_t35",
        5 => "user_data_unregistered",
        17 => "progressive_refinement_segment_end",
        22 => "post_filter_hint",
        132 => "decoded_picture_hash",
        146 => "coded_region_completion",
        _ => return None,
    })
}

/// 一个调度的初始 CPB 移除延迟与偏移
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InitialCpbRemoval {
    pub initial_cpb_removal_delay: u32,
    pub initial_cpb_removal_offset: u32,
    /// sub_pic_hrd_params_present_flag 或 irap_cpb_params_present_flag 为 1 时存在
    pub initial_alt_cpb_removal: Option<(u32, u32)>,
}

/// buffering_period() (D.2.2)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BufferingPeriod {
    pub bp_seq_parameter_set_id: u32,
    pub irap_cpb_params_present_flag: bool,
    /// (cpb_delay_offset, dpb_delay_offset)
    pub delay_offsets: Option<(u32, u32)>,
    pub concatenation_flag: bool,
    pub au_cpb_removal_delay_delta_minus1: u32,
    pub nal: Vec<InitialCpbRemoval>,
    pub vcl: Vec<InitialCpbRemoval>,
    pub use_alt_cpb_params_flag: Option<bool>,
}

/// 子图像 HRD 的解码单元信息
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecodingUnits {
    pub num_decoding_units_minus1: u32,
    pub du_common_cpb_removal_delay_increment_minus1: Option<u32>,
    pub num_nalus_in_du_minus1: Vec<u32>,
    pub du_cpb_removal_delay_increment_minus1: Vec<u32>,
}

/// pic_timing() (D.2.3)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PicTiming {
    pub pic_struct: Option<u32>,
    pub source_scan_type: Option<u32>,
    pub duplicate_flag: Option<bool>,
    pub au_cpb_removal_delay_minus1: Option<u32>,
    pub pic_dpb_output_delay: Option<u32>,
    pub pic_dpb_output_du_delay: Option<u32>,
    pub decoding_units: Option<DecodingUnits>,
}

/// recovery_point() (D.2.8)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPoint {
    pub recovery_poc_cnt: i32,
    pub exact_match_flag: bool,
    pub broken_link_flag: bool,
}

/// active_parameter_sets() (D.2.21)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveParameterSets {
    pub active_video_parameter_set_id: u32,
    pub self_contained_cvs_flag: bool,
    pub no_parameter_set_update_flag: bool,
    pub active_seq_parameter_set_id: Vec<u32>,
    /// 按层的 SPS 下标, VPS 缺失时为空
    pub layer_sps_idx: Vec<u32>,
}

/// decoded_picture_hash() (D.3.19)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedPictureHash {
    Md5(Vec<[u8; 16]>),
    Crc(Vec<u32>),
    Checksum(Vec<u32>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeiPayload {
    BufferingPeriod(BufferingPeriod),
    PicTiming(PicTiming),
    UserDataUnregistered(UserDataUnregistered),
    RecoveryPoint(RecoveryPoint),
    ActiveParameterSets(ActiveParameterSets),
    MasteringDisplayColourVolume(MasteringDisplayColourVolume),
    ContentLightLevel(ContentLightLevel),
    AlternativeTransferCharacteristics { preferred_transfer_characteristics: u32 },
    DecodedPictureHash(DecodedPictureHash),
    /// 所需参数集缺失, 保留原始负载
    Pending { reason: String, raw: Vec<u8> },
    Unparsed,
}

/// 解析前缀或后缀 sei_rbsp(). `active_sps` 为当前图像生效的 SPS
pub fn parse_sei(
    r: &mut SyntaxReader<'_>,
    nal_unit_type: NalUnitType,
    sets: &HevcParameterSets,
    active_sps: Option<&Sps>,
) -> ParseResult<Vec<SeiMessage<SeiPayload>>> {
    let prefix = nal_unit_type == NalUnitType::PrefixSeiNut;
    let name_of: fn(u32) -> Option<&'static str> = if prefix {
        prefix_payload_type_name
    } else {
        suffix_payload_type_name
    };
    r.sub_level("sei_rbsp()", |r| {
        read_sei_rbsp(r, name_of, |r, payload_type, bounds| {
            if prefix {
                parse_prefix_payload(r, payload_type, bounds, sets, active_sps)
            } else {
                parse_suffix_payload(r, payload_type, bounds, active_sps)
            }
        })
    })
}

fn parse_prefix_payload(
    r: &mut SyntaxReader<'_>,
    payload_type: u32,
    bounds: &PayloadBounds,
    sets: &HevcParameterSets,
    active_sps: Option<&Sps>,
) -> ParseResult<SeiPayload> {
    let raw = bounds.raw(r);
    Ok(match payload_type {
        0 => {
            let id = r.read_ue(
                "bp_seq_parameter_set_id",
                ReadOptions::new().check_range(0, 15),
            )?;
            let Ok(sps) = sets.sps.get(id) else {
                return Ok(pending(r, format!("buffering_period 引用的 SPS {id} 未就绪"), raw));
            };
            match select_hrd(sps, sets.vps.get(sps.sps_video_parameter_set_id).ok()) {
                Some(hrd) => {
                    SeiPayload::BufferingPeriod(parse_buffering_period(r, id, hrd, bounds)?)
                }
                None => pending(r, "SPS 与 VPS 中都没有 HRD 参数".to_string(), raw),
            }
        }
        1 => match active_sps {
            Some(sps) => {
                let vps = sets.vps.get(sps.sps_video_parameter_set_id).ok();
                SeiPayload::PicTiming(parse_pic_timing(r, sps, select_hrd(sps, vps))?)
            }
            None => pending(r, "pic_timing 需要生效的 SPS".to_string(), raw),
        },
        5 => SeiPayload::UserDataUnregistered(UserDataUnregistered::parse(r, bounds)?),
        6 => SeiPayload::RecoveryPoint(r.sub_level("recovery_point()", |r| {
            Ok(RecoveryPoint {
                recovery_poc_cnt: r.se("recovery_poc_cnt")?,
                exact_match_flag: r.flag("exact_match_flag")?,
                broken_link_flag: r.flag("broken_link_flag")?,
            })
        })?),
        129 => SeiPayload::ActiveParameterSets(parse_active_parameter_sets(r, sets)?),
        137 => SeiPayload::MasteringDisplayColourVolume(MasteringDisplayColourVolume::parse(r)?),
        144 => SeiPayload::ContentLightLevel(ContentLightLevel::parse(r)?),
        147 => SeiPayload::AlternativeTransferCharacteristics {
            preferred_transfer_characteristics: r.sub_level(
                "alternative_transfer_characteristics()",
                |r| r.bits("preferred_transfer_characteristics", 8),
            )?,
        },
        _ => SeiPayload::Unparsed,
    })
}

fn parse_suffix_payload(
    r: &mut SyntaxReader<'_>,
    payload_type: u32,
    bounds: &PayloadBounds,
    active_sps: Option<&Sps>,
) -> ParseResult<SeiPayload> {
    let raw = bounds.raw(r);
    Ok(match payload_type {
        5 => SeiPayload::UserDataUnregistered(UserDataUnregistered::parse(r, bounds)?),
        132 => match active_sps {
            Some(sps) => SeiPayload::DecodedPictureHash(parse_decoded_picture_hash(r, sps)?),
            None => pending(r, "decoded_picture_hash 需要生效的 SPS".to_string(), raw),
        },
        _ => SeiPayload::Unparsed,
    })
}

fn pending(r: &mut SyntaxReader<'_>, reason: String, raw: Vec<u8>) -> SeiPayload {
    r.log_note(format!("SEI 负载暂不解析: {reason}"));
    SeiPayload::Pending { reason, raw }
}

/// 优先取 SPS VUI 中的 HRD, 否则取 VPS 的第一组
fn select_hrd<'s>(sps: &'s Sps, vps: Option<&'s Vps>) -> Option<&'s HrdParameters> {
    sps.vui
        .as_ref()
        .and_then(|v| v.timing.as_ref())
        .and_then(|t| t.hrd.as_ref())
        .or_else(|| {
            vps.and_then(|v| v.timing.as_ref())
                .and_then(|t| t.hrd.first())
                .map(|h| &h.parameters)
        })
}

/// CpbCnt, 取最高子层的 cpb_cnt_minus1
fn cpb_cnt(hrd: &HrdParameters) -> u32 {
    hrd.sub_layers.last().map_or(0, |s| s.cpb_cnt_minus1) + 1
}

fn parse_buffering_period(
    r: &mut SyntaxReader<'_>,
    id: u32,
    hrd: &HrdParameters,
    bounds: &PayloadBounds,
) -> ParseResult<BufferingPeriod> {
    r.sub_level("buffering_period()", |r| {
        let common = &hrd.common;
        let mut bp = BufferingPeriod {
            bp_seq_parameter_set_id: id,
            ..Default::default()
        };
        if !common.sub_pic_hrd_params_present_flag {
            bp.irap_cpb_params_present_flag = r.flag("irap_cpb_params_present_flag")?;
        }
        let au_delay_bits = common.au_cpb_removal_delay_length_minus1 + 1;
        if bp.irap_cpb_params_present_flag {
            bp.delay_offsets = Some((
                r.bits("cpb_delay_offset", au_delay_bits)?,
                r.bits("dpb_delay_offset", common.dpb_output_delay_length_minus1 + 1)?,
            ));
        }
        bp.concatenation_flag = r.flag("concatenation_flag")?;
        bp.au_cpb_removal_delay_delta_minus1 =
            r.bits("au_cpb_removal_delay_delta_minus1", au_delay_bits)?;

        let alt = common.sub_pic_hrd_params_present_flag || bp.irap_cpb_params_present_flag;
        let count = cpb_cnt(hrd);
        if common.nal_hrd_parameters_present_flag {
            bp.nal = read_initial_removals(r, "nal", count, hrd, alt)?;
        }
        if common.vcl_hrd_parameters_present_flag {
            bp.vcl = read_initial_removals(r, "vcl", count, hrd, alt)?;
        }
        if bounds.extension_present(r) {
            bp.use_alt_cpb_params_flag = Some(r.flag("use_alt_cpb_params_flag")?);
        }
        Ok(bp)
    })
}

fn read_initial_removals(
    r: &mut SyntaxReader<'_>,
    prefix: &str,
    count: u32,
    hrd: &HrdParameters,
    alt: bool,
) -> ParseResult<Vec<InitialCpbRemoval>> {
    let width = hrd.common.initial_cpb_removal_delay_length_minus1 + 1;
    let mut out = Vec::with_capacity(count as usize);
    for i in 0..count {
        let mut item = InitialCpbRemoval {
            initial_cpb_removal_delay: r.bits(&format!("{prefix}_initial_cpb_removal_delay[{i}]"), width)?,
            initial_cpb_removal_offset: r
                .bits(&format!("{prefix}_initial_cpb_removal_offset[{i}]"), width)?,
            initial_alt_cpb_removal: None,
        };
        if alt {
            item.initial_alt_cpb_removal = Some((
                r.bits(&format!("{prefix}_initial_alt_cpb_removal_delay[{i}]"), width)?,
                r.bits(&format!("{prefix}_initial_alt_cpb_removal_offset[{i}]"), width)?,
            ));
        }
        out.push(item);
    }
    Ok(out)
}

fn parse_pic_timing(
    r: &mut SyntaxReader<'_>,
    sps: &Sps,
    hrd: Option<&HrdParameters>,
) -> ParseResult<PicTiming> {
    r.sub_level("pic_timing()", |r| {
        let mut timing = PicTiming::default();
        if sps.vui.as_ref().is_some_and(|v| v.frame_field_info_present_flag) {
            let meaning = pic_struct_meaning(r.peek_bits(4)?);
            timing.pic_struct = Some(r.read_bits("pic_struct", 4, ReadOptions::new().meaning(meaning))?);
            timing.source_scan_type = Some(r.read_bits(
                "source_scan_type",
                2,
                ReadOptions::new().check_range(0, 2),
            )?);
            timing.duplicate_flag = Some(r.flag("duplicate_flag")?);
        }

        let Some(hrd) = hrd else {
            return Ok(timing);
        };
        let common = &hrd.common;
        // CpbDpbDelaysPresentFlag
        if !common.nal_hrd_parameters_present_flag && !common.vcl_hrd_parameters_present_flag {
            return Ok(timing);
        }
        timing.au_cpb_removal_delay_minus1 = Some(r.bits(
            "au_cpb_removal_delay_minus1",
            common.au_cpb_removal_delay_length_minus1 + 1,
        )?);
        timing.pic_dpb_output_delay = Some(r.bits(
            "pic_dpb_output_delay",
            common.dpb_output_delay_length_minus1 + 1,
        )?);
        if common.sub_pic_hrd_params_present_flag {
            timing.pic_dpb_output_du_delay = Some(r.bits(
                "pic_dpb_output_du_delay",
                common.dpb_output_delay_du_length_minus1 + 1,
            )?);
            if common.sub_pic_cpb_params_in_pic_timing_sei_flag {
                timing.decoding_units = Some(parse_decoding_units(r, sps, hrd)?);
            }
        }
        Ok(timing)
    })
}

fn parse_decoding_units(
    r: &mut SyntaxReader<'_>,
    sps: &Sps,
    hrd: &HrdParameters,
) -> ParseResult<DecodingUnits> {
    let increment_bits = hrd.common.du_cpb_removal_delay_increment_length_minus1 + 1;
    let num_decoding_units_minus1 = r.read_ue(
        "num_decoding_units_minus1",
        ReadOptions::new().check_range(0, i64::from(sps.derived.pic_size_in_ctbs_y) - 1),
    )?;
    let mut du = DecodingUnits {
        num_decoding_units_minus1,
        ..Default::default()
    };
    let common_flag = r.flag("du_common_cpb_removal_delay_flag")?;
    if common_flag {
        du.du_common_cpb_removal_delay_increment_minus1 =
            Some(r.bits("du_common_cpb_removal_delay_increment_minus1", increment_bits)?);
    }
    for i in 0..=num_decoding_units_minus1 {
        du.num_nalus_in_du_minus1
            .push(r.ue(&format!("num_nalus_in_du_minus1[{i}]"))?);
        if !common_flag && i < num_decoding_units_minus1 {
            du.du_cpb_removal_delay_increment_minus1.push(r.bits(
                &format!("du_cpb_removal_delay_increment_minus1[{i}]"),
                increment_bits,
            )?);
        }
    }
    Ok(du)
}

fn parse_active_parameter_sets(
    r: &mut SyntaxReader<'_>,
    sets: &HevcParameterSets,
) -> ParseResult<ActiveParameterSets> {
    r.sub_level("active_parameter_sets()", |r| {
        let active_video_parameter_set_id = r.bits("active_video_parameter_set_id", 4)?;
        let self_contained_cvs_flag = r.flag("self_contained_cvs_flag")?;
        let no_parameter_set_update_flag = r.flag("no_parameter_set_update_flag")?;
        let num_sps_ids_minus1 =
            r.read_ue("num_sps_ids_minus1", ReadOptions::new().check_range(0, 15))?;
        let active_seq_parameter_set_id = (0..=num_sps_ids_minus1)
            .map(|i| {
                r.read_ue(
                    &format!("active_seq_parameter_set_id[{i}]"),
                    ReadOptions::new().check_range(0, 15),
                )
            })
            .collect::<ParseResult<Vec<_>>>()?;

        let mut layer_sps_idx = Vec::new();
        match sets.vps.get(active_video_parameter_set_id) {
            Ok(vps) => {
                let first = u32::from(vps.vps_base_layer_internal_flag);
                let max_layers_minus1 = vps.vps_max_layers_minus1.min(62);
                for i in first..=max_layers_minus1 {
                    layer_sps_idx.push(r.read_ue(
                        &format!("layer_sps_idx[{i}]"),
                        ReadOptions::new().check_range(0, i64::from(num_sps_ids_minus1)),
                    )?);
                }
            }
            Err(_) => r.log_note(format!(
                "VPS {active_video_parameter_set_id} 未就绪, layer_sps_idx 未解析"
            )),
        }
        Ok(ActiveParameterSets {
            active_video_parameter_set_id,
            self_contained_cvs_flag,
            no_parameter_set_update_flag,
            active_seq_parameter_set_id,
            layer_sps_idx,
        })
    })
}

fn parse_decoded_picture_hash(r: &mut SyntaxReader<'_>, sps: &Sps) -> ParseResult<DecodedPictureHash> {
    r.sub_level("decoded_picture_hash()", |r| {
        let meaning = ["MD5", "CRC", "checksum"]
            .get(r.peek_bits(8)? as usize)
            .copied()
            .unwrap_or("reserved");
        let hash_type = r.read_bits(
            "hash_type",
            8,
            ReadOptions::new().check_range(0, 2).meaning(meaning),
        )?;
        let components = if sps.chroma_format_idc == 0 { 1 } else { 3 };
        Ok(match hash_type {
            0 => {
                let mut hashes = Vec::with_capacity(components);
                for c in 0..components {
                    let mut md5 = [0u8; 16];
                    for (i, byte) in md5.iter_mut().enumerate() {
                        *byte = r.bits(&format!("picture_md5[{c}][{i}]"), 8)? as u8;
                    }
                    hashes.push(md5);
                }
                DecodedPictureHash::Md5(hashes)
            }
            1 => DecodedPictureHash::Crc(
                (0..components)
                    .map(|c| r.bits(&format!("picture_crc[{c}]"), 16))
                    .collect::<ParseResult<_>>()?,
            ),
            _ => DecodedPictureHash::Checksum(
                (0..components)
                    .map(|c| r.bits(&format!("picture_checksum[{c}]"), 32))
                    .collect::<ParseResult<_>>()?,
            ),
        })
    })
}
