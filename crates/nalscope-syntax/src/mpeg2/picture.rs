//! picture_header() (ISO/IEC 13818-2 6.2.3) 与 group_of_pictures_header() (6.2.2.6).

use nalscope_core::{ParseError, ParseResult, ReadOptions, SymbolTable, SyntaxReader, symbol_table};

symbol_table! {
    /// picture_coding_type (表 6-12)
    pub enum PictureCodingType {
        Intra = 1 => "intra-coded (I)",
        Predictive = 2 => "predictive-coded (P)",
        Bidirectional = 3 => "bidirectionally-predictive-coded (B)",
        DcIntra = 4 => "dc intra-coded (D), MPEG-1 only",
    }
}

impl PictureCodingType {
    /// 单字母简称
    pub fn short_name(self) -> &'static str {
        match self {
            Self::Intra => "I",
            Self::Predictive => "P",
            Self::Bidirectional => "B",
            Self::DcIntra => "D",
        }
    }
}

/// P/B 图像头部中的 full_pel 与 f_code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionVectorRange {
    pub full_pel_vector: bool,
    pub f_code: u32,
}

/// picture_header()
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureHeader {
    pub temporal_reference: u32,
    pub picture_coding_type: PictureCodingType,
    pub vbv_delay: u32,
    pub forward: Option<MotionVectorRange>,
    pub backward: Option<MotionVectorRange>,
    pub extra_information_picture: Vec<u8>,
}

impl PictureHeader {
    pub fn parse(r: &mut SyntaxReader) -> ParseResult<Self> {
        r.sub_level("picture_header()", |r| {
            let temporal_reference = r.bits("temporal_reference", 10)?;
            let code = r.read_bits(
                "picture_coding_type",
                3,
                ReadOptions::new()
                    .check_range(1, 4)
                    .meaning_map::<PictureCodingType>(),
            )?;
            let picture_coding_type = PictureCodingType::from_code(code).ok_or_else(|| {
                ParseError::constraint(format!("MPEG-2: picture_coding_type={code} 未定义"))
            })?;
            let vbv_delay = r.bits("vbv_delay", 16)?;

            let mut forward = None;
            let mut backward = None;
            if matches!(
                picture_coding_type,
                PictureCodingType::Predictive | PictureCodingType::Bidirectional
            ) {
                forward = Some(MotionVectorRange {
                    full_pel_vector: r.flag("full_pel_forward_vector")?,
                    f_code: r.read_bits("forward_f_code", 3, ReadOptions::new().check_greater(0))?,
                });
            }
            if picture_coding_type == PictureCodingType::Bidirectional {
                backward = Some(MotionVectorRange {
                    full_pel_vector: r.flag("full_pel_backward_vector")?,
                    f_code: r.read_bits("backward_f_code", 3, ReadOptions::new().check_greater(0))?,
                });
            }

            // 码流在对齐填充处结束时视为 extra_bit_picture=0
            let mut extra_information_picture = Vec::new();
            while r.bits_left() > 0 && r.flag("extra_bit_picture")? {
                extra_information_picture.push(r.bits("extra_information_picture", 8)? as u8);
            }

            Ok(Self {
                temporal_reference,
                picture_coding_type,
                vbv_delay,
                forward,
                backward,
                extra_information_picture,
            })
        })
    }

    pub fn is_intra(&self) -> bool {
        matches!(
            self.picture_coding_type,
            PictureCodingType::Intra | PictureCodingType::DcIntra
        )
    }
}

/// group_of_pictures_header() 中的 time_code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeCode {
    pub drop_frame_flag: bool,
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    pub pictures: u32,
}

/// group_of_pictures_header()
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupOfPicturesHeader {
    pub time_code: TimeCode,
    pub closed_gop: bool,
    pub broken_link: bool,
}

impl GroupOfPicturesHeader {
    pub fn parse(r: &mut SyntaxReader) -> ParseResult<Self> {
        r.sub_level("group_of_pictures_header()", |r| {
            let drop_frame_flag = r.flag("drop_frame_flag")?;
            let hours = r.read_bits("time_code_hours", 5, ReadOptions::new().check_range(0, 23))?;
            let minutes = r.read_bits("time_code_minutes", 6, ReadOptions::new().check_range(0, 59))?;
            r.read_flag("marker_bit", ReadOptions::new().check_equal_to(1))?;
            let seconds = r.read_bits("time_code_seconds", 6, ReadOptions::new().check_range(0, 59))?;
            let pictures = r.read_bits("time_code_pictures", 6, ReadOptions::new().check_range(0, 59))?;
            let closed_gop = r.flag("closed_gop")?;
            let broken_link = r.flag("broken_link")?;
            Ok(Self {
                time_code: TimeCode {
                    drop_frame_flag,
                    hours,
                    minutes,
                    seconds,
                    pictures,
                },
                closed_gop,
                broken_link,
            })
        })
    }
}

impl std::fmt::Display for TimeCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sep = if self.drop_frame_flag { ';' } else { ':' };
        write!(
            f,
            "{:02}:{:02}:{:02}{sep}{:02}",
            self.hours, self.minutes, self.seconds, self.pictures
        )
    }
}
