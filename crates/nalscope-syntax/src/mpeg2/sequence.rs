//! sequence_header() (ISO/IEC 13818-2 6.2.2.1).

use log::debug;
use nalscope_core::{ParseResult, Rational, ReadOptions, SymbolTable, SyntaxReader, symbol_table};

use super::extension::SequenceExtension;

symbol_table! {
    /// aspect_ratio_information (表 6-3)
    pub enum AspectRatio {
        Square = 1 => "SAR 1.0 (square samples)",
        Dar4x3 = 2 => "DAR 3:4",
        Dar16x9 = 3 => "DAR 9:16",
        Dar221x100 = 4 => "DAR 1:2.21",
    }
}

impl AspectRatio {
    /// 显示宽高比 (宽/高), 方形采样时为 `None`
    pub fn display_aspect_ratio(self) -> Option<Rational> {
        match self {
            Self::Square => None,
            Self::Dar4x3 => Some(Rational::new(4, 3)),
            Self::Dar16x9 => Some(Rational::new(16, 9)),
            Self::Dar221x100 => Some(Rational::new(221, 100)),
        }
    }
}

symbol_table! {
    /// frame_rate_code (表 6-4)
    pub enum FrameRateCode {
        Fps23_976 = 1 => "24000/1001 (23.976...)",
        Fps24 = 2 => "24",
        Fps25 = 3 => "25",
        Fps29_97 = 4 => "30000/1001 (29.97...)",
        Fps30 = 5 => "30",
        Fps50 = 6 => "50",
        Fps59_94 = 7 => "60000/1001 (59.94...)",
        Fps60 = 8 => "60",
    }
}

impl FrameRateCode {
    pub fn frame_rate(self) -> Rational {
        match self {
            Self::Fps23_976 => Rational::new(24000, 1001),
            Self::Fps24 => Rational::new(24, 1),
            Self::Fps25 => Rational::new(25, 1),
            Self::Fps29_97 => Rational::new(30000, 1001),
            Self::Fps30 => Rational::new(30, 1),
            Self::Fps50 => Rational::new(50, 1),
            Self::Fps59_94 => Rational::new(60000, 1001),
            Self::Fps60 => Rational::new(60, 1),
        }
    }
}

/// sequence_header()
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceHeader {
    pub horizontal_size_value: u32,
    pub vertical_size_value: u32,
    pub aspect_ratio_information: u32,
    pub frame_rate_code: u32,
    /// 单位 400 bit/s
    pub bit_rate_value: u32,
    /// 单位 16 * 1024 位
    pub vbv_buffer_size_value: u32,
    pub constrained_parameters_flag: bool,
    pub load_intra_quantiser_matrix: bool,
    pub load_non_intra_quantiser_matrix: bool,
}

impl SequenceHeader {
    /// 解析起始码之后的负载
    pub fn parse(r: &mut SyntaxReader) -> ParseResult<Self> {
        r.sub_level("sequence_header()", |r| {
            let horizontal_size_value = r.read_bits(
                "horizontal_size_value",
                12,
                ReadOptions::new().check_greater(0),
            )?;
            let vertical_size_value = r.read_bits(
                "vertical_size_value",
                12,
                ReadOptions::new().check_greater(0),
            )?;
            let aspect_ratio_information = r.read_bits(
                "aspect_ratio_information",
                4,
                ReadOptions::new()
                    .check_greater(0)
                    .meaning_map::<AspectRatio>(),
            )?;
            let frame_rate_code = r.read_bits(
                "frame_rate_code",
                4,
                ReadOptions::new()
                    .check_greater(0)
                    .meaning_map::<FrameRateCode>(),
            )?;
            if FrameRateCode::from_code(frame_rate_code).is_none() {
                r.log_note(format!("frame_rate_code={frame_rate_code} 为保留值"));
            }
            let bit_rate_value = r.read_bits(
                "bit_rate_value",
                18,
                ReadOptions::new().meaning("单位 400 bit/s"),
            )?;
            r.read_flag("marker_bit", ReadOptions::new().check_equal_to(1))?;
            let vbv_buffer_size_value = r.bits("vbv_buffer_size_value", 10)?;
            let constrained_parameters_flag = r.flag("constrained_parameters_flag")?;

            let load_intra_quantiser_matrix = r.flag("load_intra_quantiser_matrix")?;
            if load_intra_quantiser_matrix {
                r.skip("intra_quantiser_matrix", 64 * 8)?;
            }
            let load_non_intra_quantiser_matrix = r.flag("load_non_intra_quantiser_matrix")?;
            if load_non_intra_quantiser_matrix {
                r.skip("non_intra_quantiser_matrix", 64 * 8)?;
            }

            debug!(
                "MPEG-2: sequence_header {}x{}, frame_rate_code={}",
                horizontal_size_value, vertical_size_value, frame_rate_code
            );
            Ok(Self {
                horizontal_size_value,
                vertical_size_value,
                aspect_ratio_information,
                frame_rate_code,
                bit_rate_value,
                vbv_buffer_size_value,
                constrained_parameters_flag,
                load_intra_quantiser_matrix,
                load_non_intra_quantiser_matrix,
            })
        })
    }

    pub fn aspect_ratio(&self) -> Option<AspectRatio> {
        AspectRatio::from_code(self.aspect_ratio_information)
    }

    /// 亮度宽高, 序列扩展提供高 2 位
    pub fn size(&self, ext: Option<&SequenceExtension>) -> (u32, u32) {
        match ext {
            Some(ext) => (
                self.horizontal_size_value | ext.horizontal_size_extension << 12,
                self.vertical_size_value | ext.vertical_size_extension << 12,
            ),
            None => (self.horizontal_size_value, self.vertical_size_value),
        }
    }

    /// frame_rate_value * (frame_rate_extension_n + 1) / (frame_rate_extension_d + 1)
    pub fn frame_rate(&self, ext: Option<&SequenceExtension>) -> Option<Rational> {
        let base = FrameRateCode::from_code(self.frame_rate_code)?.frame_rate();
        let Some(ext) = ext else {
            return Some(base);
        };
        let num = base.num * (u64::from(ext.frame_rate_extension_n) + 1);
        let den = base.den * (u64::from(ext.frame_rate_extension_d) + 1);
        Some(Rational::new(num, den).reduce())
    }

    /// 码率 (bit/s)
    pub fn bit_rate(&self, ext: Option<&SequenceExtension>) -> u64 {
        let high = ext.map_or(0, |e| u64::from(e.bit_rate_extension));
        (u64::from(self.bit_rate_value) | high << 18) * 400
    }

    /// VBV 缓冲大小 (位)
    pub fn vbv_buffer_size(&self, ext: Option<&SequenceExtension>) -> u64 {
        let high = ext.map_or(0, |e| u64::from(e.vbv_buffer_size_extension));
        (u64::from(self.vbv_buffer_size_value) | high << 10) * 16 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalscope_core::{BitWriter, ParseError};

    fn build(frame_rate_code: u32, load_intra: bool) -> Vec<u8> {
        let mut bw = BitWriter::new();
        bw.write_bits(720, 12);
        bw.write_bits(576, 12);
        bw.write_bits(2, 4);
        bw.write_bits(frame_rate_code, 4);
        bw.write_bits(15000, 18);
        bw.write_flag(true);
        bw.write_bits(112, 10);
        bw.write_flag(false);
        bw.write_flag(load_intra);
        if load_intra {
            for i in 0..64 {
                bw.write_bits(8 + i, 8);
            }
        }
        bw.write_flag(false);
        bw.finish()
    }

    #[test]
    fn test_sequence_header_basic_fields() {
        let data = build(3, false);
        let mut r = SyntaxReader::new(&data);
        let seq = SequenceHeader::parse(&mut r).expect("sequence_header 应可解析");
        assert_eq!(seq.size(None), (720, 576));
        assert_eq!(seq.aspect_ratio(), Some(AspectRatio::Dar4x3));
        assert_eq!(
            seq.aspect_ratio().and_then(AspectRatio::display_aspect_ratio),
            Some(Rational::new(4, 3))
        );
        assert_eq!(seq.frame_rate(None), Some(Rational::new(25, 1)));
        assert_eq!(seq.bit_rate(None), 6_000_000);
        assert_eq!(seq.vbv_buffer_size(None), 112 * 16 * 1024);
        assert_eq!(
            r.log().find("frame_rate_code").and_then(|a| a.meaning.as_deref()),
            Some("25")
        );
    }

    #[test]
    fn test_sequence_header_skips_quantiser_matrix() {
        let data = build(4, true);
        let mut r = SyntaxReader::new(&data);
        let seq = SequenceHeader::parse(&mut r).expect("带量化矩阵的 sequence_header 应可解析");
        assert!(seq.load_intra_quantiser_matrix);
        assert!(!seq.load_non_intra_quantiser_matrix);
        assert_eq!(r.bits_read(), 64 + 512);
        assert_eq!(seq.frame_rate(None), Some(Rational::new(30000, 1001)));
    }

    #[test]
    fn test_sequence_header_reserved_frame_rate() {
        let data = build(9, false);
        let mut r = SyntaxReader::new(&data);
        let seq = SequenceHeader::parse(&mut r).expect("保留的 frame_rate_code 仍应可解析");
        assert_eq!(seq.frame_rate(None), None);
        assert_eq!(r.log().notes().count(), 1);
    }

    #[test]
    fn test_sequence_header_reject_forbidden_frame_rate() {
        let data = build(0, false);
        let mut r = SyntaxReader::new(&data);
        let err = SequenceHeader::parse(&mut r).expect_err("frame_rate_code=0 应失败");
        assert!(matches!(err, ParseError::ConstraintViolation(_)), "actual={err:?}");
        assert!(format!("{err}").contains("frame_rate_code"));
    }
}
