//! HEVC vui_parameters() (E.2.1).
//!
//! 颜色描述与宽高比的码表与 AVC 相同, 直接复用 [`crate::avc::tables`].

use log::debug;
use nalscope_core::{ParseResult, Rational, ReadOptions, SymbolTable, SyntaxReader};

use super::hrd::HrdParameters;
use crate::avc::tables::{
    AspectRatioIdc, ColourPrimaries, MatrixCoefficients, TransferCharacteristics, VideoFormat,
};
use crate::avc::vui::{ChromaLocation, ColourDescription, VideoSignalType};

/// 默认显示窗口偏移 (以色度采样为单位)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplayWindow {
    pub left_offset: u32,
    pub right_offset: u32,
    pub top_offset: u32,
    pub bottom_offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VuiTiming {
    pub num_units_in_tick: u32,
    pub time_scale: u32,
    pub num_ticks_poc_diff_one_minus1: Option<u32>,
    /// time_scale / num_units_in_tick, 已约分
    pub frame_rate: Rational,
    pub hrd: Option<HrdParameters>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitstreamRestriction {
    pub tiles_fixed_structure_flag: bool,
    pub motion_vectors_over_pic_boundaries_flag: bool,
    pub restricted_ref_pic_lists_flag: bool,
    pub min_spatial_segmentation_idc: u32,
    pub max_bytes_per_pic_denom: u32,
    pub max_bits_per_min_cu_denom: u32,
    pub log2_max_mv_length_horizontal: u32,
    pub log2_max_mv_length_vertical: u32,
}

/// vui_parameters()
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VuiParameters {
    pub aspect_ratio_idc: Option<u32>,
    pub sample_aspect_ratio: Option<(u32, u32)>,
    pub overscan_appropriate_flag: Option<bool>,
    pub video_signal: Option<VideoSignalType>,
    pub chroma_location: Option<ChromaLocation>,
    pub neutral_chroma_indication_flag: bool,
    pub field_seq_flag: bool,
    pub frame_field_info_present_flag: bool,
    pub default_display_window: Option<DisplayWindow>,
    pub timing: Option<VuiTiming>,
    pub bitstream_restriction: Option<BitstreamRestriction>,
}

impl VuiParameters {
    pub fn parse(r: &mut SyntaxReader<'_>, sps_max_sub_layers_minus1: u32) -> ParseResult<Self> {
        r.sub_level("vui_parameters()", |r| {
            let mut vui = Self::default();

            if r.flag("aspect_ratio_info_present_flag")? {
                let idc = r.read_bits(
                    "aspect_ratio_idc",
                    8,
                    ReadOptions::new().meaning_map::<AspectRatioIdc>(),
                )?;
                vui.aspect_ratio_idc = Some(idc);
                vui.sample_aspect_ratio = match AspectRatioIdc::from_code(idc) {
                    Some(AspectRatioIdc::ExtendedSar) => {
                        Some((r.bits("sar_width", 16)?, r.bits("sar_height", 16)?))
                    }
                    Some(known) => known.sample_aspect_ratio(),
                    None => None,
                };
            }

            if r.flag("overscan_info_present_flag")? {
                vui.overscan_appropriate_flag = Some(r.flag("overscan_appropriate_flag")?);
            }

            if r.flag("video_signal_type_present_flag")? {
                let video_format = r.read_bits(
                    "video_format",
                    3,
                    ReadOptions::new().meaning_map::<VideoFormat>(),
                )?;
                let video_full_range_flag = r.flag("video_full_range_flag")?;
                let colour_description = if r.flag("colour_description_present_flag")? {
                    Some(ColourDescription {
                        colour_primaries: r.read_bits(
                            "colour_primaries",
                            8,
                            ReadOptions::new().meaning_map::<ColourPrimaries>(),
                        )?,
                        transfer_characteristics: r.read_bits(
                            "transfer_characteristics",
                            8,
                            ReadOptions::new().meaning_map::<TransferCharacteristics>(),
                        )?,
                        matrix_coefficients: r.read_bits(
                            "matrix_coeffs",
                            8,
                            ReadOptions::new().meaning_map::<MatrixCoefficients>(),
                        )?,
                    })
                } else {
                    None
                };
                vui.video_signal = Some(VideoSignalType {
                    video_format,
                    video_full_range_flag,
                    colour_description,
                });
            }

            if r.flag("chroma_loc_info_present_flag")? {
                vui.chroma_location = Some(ChromaLocation {
                    top_field: r.read_ue(
                        "chroma_sample_loc_type_top_field",
                        ReadOptions::new().check_range(0, 5),
                    )?,
                    bottom_field: r.read_ue(
                        "chroma_sample_loc_type_bottom_field",
                        ReadOptions::new().check_range(0, 5),
                    )?,
                });
            }

            vui.neutral_chroma_indication_flag = r.flag("neutral_chroma_indication_flag")?;
            vui.field_seq_flag = r.flag("field_seq_flag")?;
            vui.frame_field_info_present_flag = r.flag("frame_field_info_present_flag")?;
            if r.flag("default_display_window_flag")? {
                vui.default_display_window = Some(DisplayWindow {
                    left_offset: r.ue("def_disp_win_left_offset")?,
                    right_offset: r.ue("def_disp_win_right_offset")?,
                    top_offset: r.ue("def_disp_win_top_offset")?,
                    bottom_offset: r.ue("def_disp_win_bottom_offset")?,
                });
            }

            if r.flag("vui_timing_info_present_flag")? {
                vui.timing = Some(parse_timing(r, sps_max_sub_layers_minus1)?);
            }

            if r.flag("bitstream_restriction_flag")? {
                vui.bitstream_restriction = Some(BitstreamRestriction {
                    tiles_fixed_structure_flag: r.flag("tiles_fixed_structure_flag")?,
                    motion_vectors_over_pic_boundaries_flag: r
                        .flag("motion_vectors_over_pic_boundaries_flag")?,
                    restricted_ref_pic_lists_flag: r.flag("restricted_ref_pic_lists_flag")?,
                    min_spatial_segmentation_idc: r.read_ue(
                        "min_spatial_segmentation_idc",
                        ReadOptions::new().check_range(0, 4095),
                    )?,
                    max_bytes_per_pic_denom: r
                        .read_ue("max_bytes_per_pic_denom", ReadOptions::new().check_range(0, 16))?,
                    max_bits_per_min_cu_denom: r.read_ue(
                        "max_bits_per_min_cu_denom",
                        ReadOptions::new().check_range(0, 16),
                    )?,
                    log2_max_mv_length_horizontal: r.read_ue(
                        "log2_max_mv_length_horizontal",
                        ReadOptions::new().check_range(0, 15),
                    )?,
                    log2_max_mv_length_vertical: r.read_ue(
                        "log2_max_mv_length_vertical",
                        ReadOptions::new().check_range(0, 15),
                    )?,
                });
            }

            debug!(
                "HEVC: VUI 解析完成, timing={}, restriction={}",
                vui.timing.is_some(),
                vui.bitstream_restriction.is_some()
            );
            Ok(vui)
        })
    }
}

fn parse_timing(r: &mut SyntaxReader<'_>, sps_max_sub_layers_minus1: u32) -> ParseResult<VuiTiming> {
    let num_units_in_tick =
        r.read_bits("vui_num_units_in_tick", 32, ReadOptions::new().check_greater(0))?;
    let time_scale = r.read_bits("vui_time_scale", 32, ReadOptions::new().check_greater(0))?;
    let frame_rate = Rational::new(u64::from(time_scale), u64::from(num_units_in_tick)).reduce();
    r.log_calculated("FrameRate", format!("{} ({:.3} fps)", frame_rate, frame_rate.to_f64()));

    let num_ticks_poc_diff_one_minus1 = if r.flag("vui_poc_proportional_to_timing_flag")? {
        Some(r.read_ue(
            "vui_num_ticks_poc_diff_one_minus1",
            ReadOptions::new().check_range(0, i64::from(u32::MAX) - 1),
        )?)
    } else {
        None
    };
    let hrd = if r.flag("vui_hrd_parameters_present_flag")? {
        Some(HrdParameters::parse(r, true, sps_max_sub_layers_minus1, None)?)
    } else {
        None
    };

    Ok(VuiTiming {
        num_units_in_tick,
        time_scale,
        num_ticks_poc_diff_one_minus1,
        frame_rate,
        hrd,
    })
}

#[cfg(test)]
mod tests {
    use nalscope_core::BitWriter;

    use super::*;

    #[test]
    fn test_vui_sar_and_timing() {
        let mut bw = BitWriter::new();
        bw.write_flag(true);
        bw.write_bits(255, 8); // Extended_SAR
        bw.write_bits(4, 16);
        bw.write_bits(3, 16);
        bw.write_flag(false); // overscan
        bw.write_flag(false); // video_signal
        bw.write_flag(false); // chroma_loc
        bw.write_flag(false);
        bw.write_flag(false);
        bw.write_flag(false);
        bw.write_flag(false); // default_display_window
        bw.write_flag(true); // timing
        bw.write_bits(1001, 32);
        bw.write_bits(60000, 32);
        bw.write_flag(false);
        bw.write_flag(false);
        bw.write_flag(false); // bitstream_restriction
        let data = bw.finish();

        let mut r = SyntaxReader::new(&data);
        let vui = VuiParameters::parse(&mut r, 0).unwrap();
        assert_eq!(vui.sample_aspect_ratio, Some((4, 3)));
        let timing = vui.timing.expect("应包含 timing");
        assert_eq!(timing.frame_rate, Rational::new(60000, 1001));
        assert!(timing.hrd.is_none());
    }

    #[test]
    fn test_vui_reject_zero_time_scale() {
        let mut bw = BitWriter::new();
        for _ in 0..8 {
            bw.write_flag(false);
        }
        bw.write_flag(true);
        bw.write_bits(1, 32);
        bw.write_bits(0, 32);
        let data = bw.finish();

        let mut r = SyntaxReader::new(&data);
        let err = VuiParameters::parse(&mut r, 0).expect_err("vui_time_scale=0 应失败");
        assert!(format!("{err}").contains("vui_time_scale"));
    }
}
