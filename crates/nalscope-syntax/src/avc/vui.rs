//! AVC vui_parameters() (E.1.1).

use log::debug;
use nalscope_core::{ParseError, ParseResult, Rational, ReadOptions, SymbolTable, SyntaxReader};

use super::hrd::HrdParameters;
use super::tables::{
    AspectRatioIdc, ColourPrimaries, MatrixCoefficients, TransferCharacteristics, VideoFormat,
};

/// 读取 VUI 时需要的 SPS 字段
#[derive(Debug, Clone, Copy)]
pub(crate) struct VuiContext {
    pub chroma_format_idc: u32,
    pub bit_depth_luma: u32,
    pub bit_depth_chroma: u32,
}

/// colour_description_present_flag 为 1 时的三个字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColourDescription {
    pub colour_primaries: u32,
    pub transfer_characteristics: u32,
    pub matrix_coefficients: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoSignalType {
    pub video_format: u32,
    pub video_full_range_flag: bool,
    pub colour_description: Option<ColourDescription>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChromaLocation {
    pub top_field: u32,
    pub bottom_field: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingInfo {
    pub num_units_in_tick: u32,
    pub time_scale: u32,
    pub fixed_frame_rate_flag: bool,
    /// time_scale / (2 * num_units_in_tick), 已约分
    pub frame_rate: Rational,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitstreamRestriction {
    pub motion_vectors_over_pic_boundaries_flag: bool,
    pub max_bytes_per_pic_denom: u32,
    pub max_bits_per_mb_denom: u32,
    pub log2_max_mv_length_horizontal: u32,
    pub log2_max_mv_length_vertical: u32,
    pub max_num_reorder_frames: u32,
    pub max_dec_frame_buffering: u32,
}

/// vui_parameters()
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VuiParameters {
    pub aspect_ratio_idc: Option<u32>,
    /// (sar_width, sar_height), 预定义或 Extended_SAR 显式给出
    pub sample_aspect_ratio: Option<(u32, u32)>,
    pub overscan_appropriate_flag: Option<bool>,
    pub video_signal: Option<VideoSignalType>,
    pub chroma_location: Option<ChromaLocation>,
    pub timing: Option<TimingInfo>,
    pub nal_hrd: Option<HrdParameters>,
    pub vcl_hrd: Option<HrdParameters>,
    pub low_delay_hrd_flag: Option<bool>,
    pub pic_struct_present_flag: bool,
    pub bitstream_restriction: Option<BitstreamRestriction>,
}

impl VuiParameters {
    pub(crate) fn parse(r: &mut SyntaxReader<'_>, ctx: VuiContext) -> ParseResult<Self> {
        r.sub_level("vui_parameters()", |r| Self::parse_body(r, ctx))
    }

    fn parse_body(r: &mut SyntaxReader<'_>, ctx: VuiContext) -> ParseResult<Self> {
        let mut vui = Self::default();

        if r.flag("aspect_ratio_info_present_flag")? {
            let idc = r.read_bits(
                "aspect_ratio_idc",
                8,
                ReadOptions::new().meaning_map::<AspectRatioIdc>(),
            )?;
            vui.aspect_ratio_idc = Some(idc);
            match AspectRatioIdc::from_code(idc) {
                Some(AspectRatioIdc::ExtendedSar) => {
                    let w = r.bits("sar_width", 16)?;
                    let h = r.bits("sar_height", 16)?;
                    vui.sample_aspect_ratio = Some((w, h));
                }
                Some(known) => vui.sample_aspect_ratio = known.sample_aspect_ratio(),
                None => {
                    // 17..=254 为保留值
                    r.log_note(format!("aspect_ratio_idc={idc} 为保留值"));
                }
            }
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
                Some(parse_colour_description(r, ctx)?)
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

        if r.flag("timing_info_present_flag")? {
            let num_units_in_tick =
                r.read_bits("num_units_in_tick", 32, ReadOptions::new().check_greater(0))?;
            let time_scale = r.read_bits("time_scale", 32, ReadOptions::new().check_greater(0))?;
            let fixed_frame_rate_flag = r.flag("fixed_frame_rate_flag")?;
            let frame_rate =
                Rational::new(u64::from(time_scale), 2 * u64::from(num_units_in_tick)).reduce();
            r.log_calculated("FrameRate", format!("{} ({:.3} fps)", frame_rate, frame_rate.to_f64()));
            vui.timing = Some(TimingInfo {
                num_units_in_tick,
                time_scale,
                fixed_frame_rate_flag,
                frame_rate,
            });
        }

        if r.flag("nal_hrd_parameters_present_flag")? {
            vui.nal_hrd = Some(HrdParameters::parse(r, "nal_hrd_parameters()")?);
        }
        if r.flag("vcl_hrd_parameters_present_flag")? {
            vui.vcl_hrd = Some(HrdParameters::parse(r, "vcl_hrd_parameters()")?);
        }
        if let (Some(nal), Some(vcl)) = (&vui.nal_hrd, &vui.vcl_hrd) {
            nal.check_consistent_with(vcl)?;
        }
        if vui.nal_hrd.is_some() || vui.vcl_hrd.is_some() {
            vui.low_delay_hrd_flag = Some(r.flag("low_delay_hrd_flag")?);
        }

        vui.pic_struct_present_flag = r.flag("pic_struct_present_flag")?;

        if r.flag("bitstream_restriction_flag")? {
            vui.bitstream_restriction = Some(parse_bitstream_restriction(r)?);
        }

        debug!(
            "AVC: VUI 解析完成, timing={}, hrd={}",
            vui.timing.is_some(),
            vui.nal_hrd.is_some() || vui.vcl_hrd.is_some()
        );
        Ok(vui)
    }
}

fn parse_colour_description(
    r: &mut SyntaxReader<'_>,
    ctx: VuiContext,
) -> ParseResult<ColourDescription> {
    let colour_primaries = r.read_bits(
        "colour_primaries",
        8,
        ReadOptions::new().meaning_map::<ColourPrimaries>(),
    )?;
    let transfer_characteristics = r.read_bits(
        "transfer_characteristics",
        8,
        ReadOptions::new().meaning_map::<TransferCharacteristics>(),
    )?;
    let matrix_coefficients = r.read_bits(
        "matrix_coefficients",
        8,
        ReadOptions::new().meaning_map::<MatrixCoefficients>(),
    )?;

    // 仅 4:4:4 且亮度/色度位深相同时允许 RGB 矩阵
    if matrix_coefficients == 0
        && (ctx.chroma_format_idc != 3 || ctx.bit_depth_luma != ctx.bit_depth_chroma)
    {
        return Err(ParseError::constraint(format!(
            "AVC: matrix_coefficients=0 要求 chroma_format_idc=3 且位深相同, chroma_format_idc={}, BitDepthY={}, BitDepthC={}",
            ctx.chroma_format_idc, ctx.bit_depth_luma, ctx.bit_depth_chroma
        )));
    }

    Ok(ColourDescription {
        colour_primaries,
        transfer_characteristics,
        matrix_coefficients,
    })
}

fn parse_bitstream_restriction(r: &mut SyntaxReader<'_>) -> ParseResult<BitstreamRestriction> {
    r.sub_level("bitstream_restriction", |r| {
        let restriction = BitstreamRestriction {
            motion_vectors_over_pic_boundaries_flag: r
                .flag("motion_vectors_over_pic_boundaries_flag")?,
            max_bytes_per_pic_denom: r
                .read_ue("max_bytes_per_pic_denom", ReadOptions::new().check_range(0, 16))?,
            max_bits_per_mb_denom: r
                .read_ue("max_bits_per_mb_denom", ReadOptions::new().check_range(0, 16))?,
            log2_max_mv_length_horizontal: r.read_ue(
                "log2_max_mv_length_horizontal",
                ReadOptions::new().check_range(0, 15),
            )?,
            log2_max_mv_length_vertical: r.read_ue(
                "log2_max_mv_length_vertical",
                ReadOptions::new().check_range(0, 15),
            )?,
            max_num_reorder_frames: r.ue("max_num_reorder_frames")?,
            max_dec_frame_buffering: r.ue("max_dec_frame_buffering")?,
        };
        if restriction.max_dec_frame_buffering < restriction.max_num_reorder_frames {
            return Err(ParseError::constraint(format!(
                "AVC: max_dec_frame_buffering 应不小于 max_num_reorder_frames, max_dec_frame_buffering={}, max_num_reorder_frames={}",
                restriction.max_dec_frame_buffering, restriction.max_num_reorder_frames
            )));
        }
        Ok(restriction)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalscope_core::BitWriter;

    const CTX_420: VuiContext = VuiContext {
        chroma_format_idc: 1,
        bit_depth_luma: 8,
        bit_depth_chroma: 8,
    };

    fn write_hrd(bw: &mut BitWriter, cpb_removal_len_minus1: u32) {
        bw.write_ue(0); // cpb_cnt_minus1
        bw.write_bits(4, 4); // bit_rate_scale
        bw.write_bits(3, 4); // cpb_size_scale
        bw.write_ue(999); // bit_rate_value_minus1[0]
        bw.write_ue(499); // cpb_size_value_minus1[0]
        bw.write_flag(false);
        bw.write_bits(23, 5);
        bw.write_bits(cpb_removal_len_minus1, 5);
        bw.write_bits(23, 5);
        bw.write_bits(24, 5);
    }

    fn parse(data: &[u8]) -> ParseResult<VuiParameters> {
        let mut r = SyntaxReader::new(data);
        VuiParameters::parse(&mut r, CTX_420)
    }

    #[test]
    fn test_vui_timing_and_sar() {
        let mut bw = BitWriter::new();
        bw.write_flag(true);
        bw.write_bits(1, 8); // aspect_ratio_idc = 1:1
        bw.write_flag(false); // overscan
        bw.write_flag(false); // video_signal
        bw.write_flag(false); // chroma_loc
        bw.write_flag(true); // timing
        bw.write_bits(1001, 32);
        bw.write_bits(60000, 32);
        bw.write_flag(true);
        bw.write_flag(false);
        bw.write_flag(false);
        bw.write_flag(false); // pic_struct_present_flag
        bw.write_flag(false); // bitstream_restriction_flag
        let vui = parse(&bw.finish()).unwrap();

        assert_eq!(vui.sample_aspect_ratio, Some((1, 1)));
        let timing = vui.timing.expect("应有 timing 信息");
        assert_eq!(timing.frame_rate, Rational::new(30000, 1001));
        assert!(vui.low_delay_hrd_flag.is_none(), "无 HRD 时不读取 low_delay_hrd_flag");
    }

    #[test]
    fn test_vui_reject_zero_time_scale() {
        let mut bw = BitWriter::new();
        bw.write_flag(false);
        bw.write_flag(false);
        bw.write_flag(false);
        bw.write_flag(false);
        bw.write_flag(true);
        bw.write_bits(1001, 32);
        bw.write_bits(0, 32);
        bw.write_flag(false);
        let err = parse(&bw.finish()).expect_err("time_scale=0 应失败");
        let msg = format!("{err}");
        assert!(msg.contains("time_scale"), "错误信息应包含 time_scale, actual={}", msg);
    }

    #[test]
    fn test_vui_hrd_cross_check_mismatch() {
        let mut bw = BitWriter::new();
        for _ in 0..5 {
            bw.write_flag(false);
        }
        bw.write_flag(true);
        write_hrd(&mut bw, 23);
        bw.write_flag(true);
        write_hrd(&mut bw, 22);
        bw.write_flag(false);
        bw.write_flag(false);
        bw.write_flag(false);
        let err = parse(&bw.finish()).expect_err("NAL/VCL HRD 长度不一致应失败");
        assert!(matches!(err, ParseError::StructuralConstraintViolation(_)));
        assert!(format!("{err}").contains("cpb_removal_delay_length_minus1"));
    }

    #[test]
    fn test_vui_hrd_derived_rates() {
        let mut bw = BitWriter::new();
        for _ in 0..5 {
            bw.write_flag(false);
        }
        bw.write_flag(true);
        write_hrd(&mut bw, 23);
        bw.write_flag(false);
        bw.write_flag(true); // low_delay_hrd_flag
        bw.write_flag(false);
        bw.write_flag(false);
        let vui = parse(&bw.finish()).unwrap();
        let hrd = vui.nal_hrd.expect("应有 NAL HRD");
        assert_eq!(hrd.schedules[0].bit_rate, 1000 << 10);
        assert_eq!(hrd.schedules[0].cpb_size, 500 << 7);
        assert_eq!(vui.low_delay_hrd_flag, Some(true));
    }

    #[test]
    fn test_vui_reject_reorder_exceeds_buffering() {
        let mut bw = BitWriter::new();
        for _ in 0..8 {
            bw.write_flag(false);
        }
        bw.write_flag(true); // bitstream_restriction_flag
        bw.write_flag(true);
        bw.write_ue(2);
        bw.write_ue(1);
        bw.write_ue(16);
        bw.write_ue(16);
        bw.write_ue(4); // max_num_reorder_frames
        bw.write_ue(2); // max_dec_frame_buffering
        let err = parse(&bw.finish()).expect_err("max_dec_frame_buffering 过小应失败");
        assert!(format!("{err}").contains("max_dec_frame_buffering"));
    }

    #[test]
    fn test_vui_reserved_aspect_ratio_logged() {
        let mut bw = BitWriter::new();
        bw.write_flag(true);
        bw.write_bits(100, 8);
        for _ in 0..8 {
            bw.write_flag(false);
        }
        let data = bw.finish();
        let mut r = SyntaxReader::new(&data);
        let vui = VuiParameters::parse(&mut r, CTX_420).unwrap();
        assert_eq!(vui.aspect_ratio_idc, Some(100));
        assert_eq!(vui.sample_aspect_ratio, None);
        assert_eq!(r.log().notes().count(), 1, "保留值应记录一条诊断");
    }
}
