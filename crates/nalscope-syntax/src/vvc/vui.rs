//! VVC SPS 中的 vui_payload() (7.3.2.21), 内容为 H.274 的 vui_parameters().

use nalscope_core::{ParseError, ParseResult, ReadOptions, SymbolTable, SyntaxReader};

use crate::avc::tables::{AspectRatioIdc, ColourPrimaries, MatrixCoefficients, TransferCharacteristics};
use crate::avc::vui::{ChromaLocation, ColourDescription};

/// vui_parameters()
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VuiParameters {
    pub vui_progressive_source_flag: bool,
    pub vui_interlaced_source_flag: bool,
    pub vui_non_packed_constraint_flag: bool,
    pub vui_non_projected_constraint_flag: bool,
    pub vui_aspect_ratio_constant_flag: bool,
    pub aspect_ratio_idc: Option<u32>,
    pub sample_aspect_ratio: Option<(u32, u32)>,
    pub overscan_appropriate_flag: Option<bool>,
    pub colour_description: Option<ColourDescription>,
    pub vui_full_range_flag: bool,
    /// 逐行源时只有 vui_chroma_sample_loc_type_frame
    pub chroma_sample_loc_type_frame: Option<u32>,
    pub chroma_location: Option<ChromaLocation>,
}

impl VuiParameters {
    /// 解析 `payload_size` 字节的 vui_payload(), 未知的扩展位被跳过
    pub fn parse_payload(r: &mut SyntaxReader<'_>, payload_size: u32) -> ParseResult<Self> {
        r.sub_level("vui_payload()", |r| {
            let payload_bits = payload_size as usize * 8;
            if payload_bits > r.bits_left() {
                return Err(ParseError::TruncatedStream {
                    needed: payload_bits,
                    remaining: r.bits_left(),
                });
            }
            let start = r.bits_read();
            let vui = Self::parse_body(r)?;
            let used = r.bits_read() - start;
            if used > payload_bits {
                return Err(ParseError::structural(format!(
                    "VVC: vui_parameters() 超出 vui_payload 长度, used={used}, payload_bits={payload_bits}"
                )));
            }
            let rest = payload_bits - used;
            if rest > 0 && rest <= 8 {
                r.read_flag("vui_payload_bit_equal_to_one", ReadOptions::new().check_equal_to(1))?;
                while !r.byte_aligned() {
                    r.read_flag("vui_payload_bit_equal_to_zero", ReadOptions::new().check_equal_to(0))?;
                }
            } else if rest > 8 {
                r.log_note(format!("vui_payload 扩展数据 {rest} 位未解析"));
                r.skip("vui_reserved_payload_extension_data", rest)?;
            }
            Ok(vui)
        })
    }

    fn parse_body(r: &mut SyntaxReader<'_>) -> ParseResult<Self> {
        r.sub_level("vui_parameters()", |r| {
            let mut vui = Self {
                vui_progressive_source_flag: r.flag("vui_progressive_source_flag")?,
                vui_interlaced_source_flag: r.flag("vui_interlaced_source_flag")?,
                vui_non_packed_constraint_flag: r.flag("vui_non_packed_constraint_flag")?,
                vui_non_projected_constraint_flag: r.flag("vui_non_projected_constraint_flag")?,
                ..Default::default()
            };
            if r.flag("vui_aspect_ratio_info_present_flag")? {
                vui.vui_aspect_ratio_constant_flag = r.flag("vui_aspect_ratio_constant_flag")?;
                let idc = r.read_bits(
                    "vui_aspect_ratio_idc",
                    8,
                    ReadOptions::new().meaning_map::<AspectRatioIdc>(),
                )?;
                vui.aspect_ratio_idc = Some(idc);
                match AspectRatioIdc::from_code(idc) {
                    Some(AspectRatioIdc::ExtendedSar) => {
                        let w = r.bits("vui_sar_width", 16)?;
                        let h = r.bits("vui_sar_height", 16)?;
                        vui.sample_aspect_ratio = Some((w, h));
                    }
                    Some(known) => vui.sample_aspect_ratio = known.sample_aspect_ratio(),
                    None => r.log_note(format!("vui_aspect_ratio_idc={idc} 为保留值")),
                }
            }
            if r.flag("vui_overscan_info_present_flag")? {
                vui.overscan_appropriate_flag = Some(r.flag("vui_overscan_appropriate_flag")?);
            }
            if r.flag("vui_colour_description_present_flag")? {
                vui.colour_description = Some(ColourDescription {
                    colour_primaries: r.read_bits(
                        "vui_colour_primaries",
                        8,
                        ReadOptions::new().meaning_map::<ColourPrimaries>(),
                    )?,
                    transfer_characteristics: r.read_bits(
                        "vui_transfer_characteristics",
                        8,
                        ReadOptions::new().meaning_map::<TransferCharacteristics>(),
                    )?,
                    matrix_coefficients: r.read_bits(
                        "vui_matrix_coeffs",
                        8,
                        ReadOptions::new().meaning_map::<MatrixCoefficients>(),
                    )?,
                });
                vui.vui_full_range_flag = r.flag("vui_full_range_flag")?;
            }
            if r.flag("vui_chroma_loc_info_present_flag")? {
                if vui.vui_progressive_source_flag && !vui.vui_interlaced_source_flag {
                    vui.chroma_sample_loc_type_frame = Some(r.read_ue(
                        "vui_chroma_sample_loc_type_frame",
                        ReadOptions::new().check_range(0, 6),
                    )?);
                } else {
                    vui.chroma_location = Some(ChromaLocation {
                        top_field: r.read_ue(
                            "vui_chroma_sample_loc_type_top_field",
                            ReadOptions::new().check_range(0, 6),
                        )?,
                        bottom_field: r.read_ue(
                            "vui_chroma_sample_loc_type_bottom_field",
                            ReadOptions::new().check_range(0, 6),
                        )?,
                    });
                }
            }
            Ok(vui)
        })
    }
}

#[cfg(test)]
mod tests {
    use nalscope_core::BitWriter;

    use super::*;

    #[test]
    fn test_vui_payload_with_colour_description() {
        let mut bw = BitWriter::new();
        bw.write_flag(true); // progressive
        bw.write_flag(false);
        bw.write_flag(false);
        bw.write_flag(false);
        bw.write_flag(true); // aspect_ratio_info
        bw.write_flag(false);
        bw.write_bits(1, 8); // 1:1
        bw.write_flag(false); // overscan
        bw.write_flag(true); // colour_description
        bw.write_bits(9, 8);
        bw.write_bits(16, 8);
        bw.write_bits(9, 8);
        bw.write_flag(true); // full_range
        bw.write_flag(true); // chroma_loc
        bw.write_ue(2); // frame
        // 45 位, 补 vui_payload_bit_equal_to_one 与 0 到 6 字节
        bw.write_trailing_bits();
        let data = bw.finish();
        assert_eq!(data.len(), 6);

        let mut r = SyntaxReader::new(&data);
        let vui = VuiParameters::parse_payload(&mut r, 6).expect("VUI 应可解析");
        assert_eq!(vui.sample_aspect_ratio, Some((1, 1)));
        assert_eq!(
            vui.colour_description,
            Some(ColourDescription {
                colour_primaries: 9,
                transfer_characteristics: 16,
                matrix_coefficients: 9,
            })
        );
        assert!(vui.vui_full_range_flag);
        assert_eq!(vui.chroma_sample_loc_type_frame, Some(2));
        assert!(vui.chroma_location.is_none());
        assert_eq!(r.bits_read(), 48);
    }

    #[test]
    fn test_vui_payload_extension_is_skipped() {
        let mut data = vec![0u8; 4];
        data[0] = 0x80; // 只有 progressive, 其余标志为 0
        let mut r = SyntaxReader::new(&data);
        let vui = VuiParameters::parse_payload(&mut r, 4).expect("VUI 应可解析");
        assert!(vui.vui_progressive_source_flag);
        assert_eq!(r.bits_read(), 32);
        assert!(r.log().notes().any(|n| n.name.contains("扩展数据")), "应提示扩展数据未解析");
    }
}
