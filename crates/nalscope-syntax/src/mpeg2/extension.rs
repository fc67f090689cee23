//! extension_start_code 之后的扩展结构 (ISO/IEC 13818-2 6.2.2.3, 6.2.3.1).
//!
//! 按 4 位 extension_start_code_identifier 分发, 目前解析 sequence_extension()
//! 与 picture_coding_extension(), 其余扩展只识别类型.

use log::debug;
use nalscope_core::{ParseResult, ReadOptions, SymbolTable, SyntaxReader, symbol_table};

symbol_table! {
    /// extension_start_code_identifier (表 6-2)
    pub enum ExtensionId {
        Sequence = 1 => "Sequence Extension ID",
        SequenceDisplay = 2 => "Sequence Display Extension ID",
        QuantMatrix = 3 => "Quant Matrix Extension ID",
        Copyright = 4 => "Copyright Extension ID",
        SequenceScalable = 5 => "Sequence Scalable Extension ID",
        PictureDisplay = 7 => "Picture Display Extension ID",
        PictureCoding = 8 => "Picture Coding Extension ID",
        PictureSpatialScalable = 9 => "Picture Spatial Scalable Extension ID",
        PictureTemporalScalable = 10 => "Picture Temporal Scalable Extension ID",
    }
}

impl ExtensionId {
    /// 对应的语法结构名
    pub fn syntax_name(self) -> &'static str {
        match self {
            Self::Sequence => "sequence_extension()",
            Self::SequenceDisplay => "sequence_display_extension()",
            Self::QuantMatrix => "quant_matrix_extension()",
            Self::Copyright => "copyright_extension()",
            Self::SequenceScalable => "sequence_scalable_extension()",
            Self::PictureDisplay => "picture_display_extension()",
            Self::PictureCoding => "picture_coding_extension()",
            Self::PictureSpatialScalable => "picture_spatial_scalable_extension()",
            Self::PictureTemporalScalable => "picture_temporal_scalable_extension()",
        }
    }
}

symbol_table! {
    /// profile_and_level_indication 的 profile 部分 (表 8-2)
    pub enum Profile {
        High = 1 => "High",
        SpatiallyScalable = 2 => "Spatially Scalable",
        SnrScalable = 3 => "SNR Scalable",
        Main = 4 => "Main",
        Simple = 5 => "Simple",
    }
}

symbol_table! {
    /// profile_and_level_indication 的 level 部分 (表 8-3)
    pub enum Level {
        High = 4 => "High",
        High1440 = 6 => "High 1440",
        Main = 8 => "Main",
        Low = 10 => "Low",
    }
}

symbol_table! {
    /// chroma_format (表 6-5)
    pub enum ChromaFormat {
        Yuv420 = 1 => "4:2:0",
        Yuv422 = 2 => "4:2:2",
        Yuv444 = 3 => "4:4:4",
    }
}

/// sequence_extension()
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceExtension {
    pub profile_and_level_indication: u32,
    pub progressive_sequence: bool,
    pub chroma_format: u32,
    pub horizontal_size_extension: u32,
    pub vertical_size_extension: u32,
    pub bit_rate_extension: u32,
    pub vbv_buffer_size_extension: u32,
    pub low_delay: bool,
    pub frame_rate_extension_n: u32,
    pub frame_rate_extension_d: u32,
}

impl SequenceExtension {
    fn parse(r: &mut SyntaxReader) -> ParseResult<Self> {
        let profile_and_level_indication = r.bits("profile_and_level_indication", 8)?;
        let escape = profile_and_level_indication >> 7 == 1;
        r.log_calculated("escape_bit", escape);
        r.log_calculated_with(
            "profile_identification",
            (profile_and_level_indication >> 4) & 0x07,
            Profile::meaning_of((profile_and_level_indication >> 4) & 0x07),
        );
        r.log_calculated_with(
            "level_identification",
            profile_and_level_indication & 0x0F,
            Level::meaning_of(profile_and_level_indication & 0x0F),
        );

        let progressive_sequence = r.flag("progressive_sequence")?;
        let chroma_format = r.read_bits(
            "chroma_format",
            2,
            ReadOptions::new()
                .check_range(1, 3)
                .meaning_map::<ChromaFormat>(),
        )?;
        let horizontal_size_extension = r.bits("horizontal_size_extension", 2)?;
        let vertical_size_extension = r.bits("vertical_size_extension", 2)?;
        let bit_rate_extension = r.bits("bit_rate_extension", 12)?;
        r.read_flag("marker_bit", ReadOptions::new().check_equal_to(1))?;
        let vbv_buffer_size_extension = r.bits("vbv_buffer_size_extension", 8)?;
        let low_delay = r.flag("low_delay")?;
        let frame_rate_extension_n = r.bits("frame_rate_extension_n", 2)?;
        let frame_rate_extension_d = r.bits("frame_rate_extension_d", 5)?;

        Ok(Self {
            profile_and_level_indication,
            progressive_sequence,
            chroma_format,
            horizontal_size_extension,
            vertical_size_extension,
            bit_rate_extension,
            vbv_buffer_size_extension,
            low_delay,
            frame_rate_extension_n,
            frame_rate_extension_d,
        })
    }

    /// escape_bit 置位时 profile/level 含义由具体 profile 定义
    pub fn escape_bit(&self) -> bool {
        self.profile_and_level_indication >> 7 == 1
    }

    pub fn profile(&self) -> Option<Profile> {
        if self.escape_bit() {
            return None;
        }
        Profile::from_code((self.profile_and_level_indication >> 4) & 0x07)
    }

    pub fn level(&self) -> Option<Level> {
        if self.escape_bit() {
            return None;
        }
        Level::from_code(self.profile_and_level_indication & 0x0F)
    }

    /// 如 "Main@High 1440"
    pub fn profile_name(&self) -> String {
        match (self.profile(), self.level()) {
            (Some(p), Some(l)) => format!("{}@{}", p.meaning(), l.meaning()),
            (Some(p), None) => p.meaning().to_string(),
            _ => format!("profile_and_level_indication=0x{:02X}", self.profile_and_level_indication),
        }
    }

    pub fn chroma_format_name(&self) -> &'static str {
        ChromaFormat::from_code(self.chroma_format).map_or("", ChromaFormat::meaning)
    }
}

/// picture_structure (表 6-14)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureStructure {
    TopField,
    BottomField,
    Frame,
}

/// composite_display_flag=1 时的附加字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositeDisplay {
    pub v_axis: bool,
    pub field_sequence: u32,
    pub sub_carrier: bool,
    pub burst_amplitude: u32,
    pub sub_carrier_phase: u32,
}

/// picture_coding_extension()
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureCodingExtension {
    /// `f_code[s][t]`: s=0 前向, s=1 后向; t=0 水平, t=1 垂直
    pub f_code: [[u32; 2]; 2],
    pub intra_dc_precision: u32,
    pub picture_structure: PictureStructure,
    pub top_field_first: bool,
    pub frame_pred_frame_dct: bool,
    pub concealment_motion_vectors: bool,
    pub q_scale_type: bool,
    pub intra_vlc_format: bool,
    pub alternate_scan: bool,
    pub repeat_first_field: bool,
    pub chroma_420_type: bool,
    pub progressive_frame: bool,
    pub composite_display: Option<CompositeDisplay>,
}

impl PictureCodingExtension {
    fn parse(r: &mut SyntaxReader) -> ParseResult<Self> {
        let mut f_code = [[0; 2]; 2];
        for (s, dir) in ["forward", "backward"].iter().enumerate() {
            for (t, axis) in ["horizontal", "vertical"].iter().enumerate() {
                // 1..=9 有效, 15 表示未使用
                let v = r.read_bits(
                    &format!("f_code[{s}][{t}]"),
                    4,
                    ReadOptions::new().check_greater(0),
                )?;
                if v > 9 && v != 15 {
                    r.log_note(format!("f_code[{s}][{t}]={v} ({dir} {axis}) 为保留值"));
                }
                f_code[s][t] = v;
            }
        }
        let intra_dc_precision = r.read_bits(
            "intra_dc_precision",
            2,
            ReadOptions::new().meaning("0..3 对应 8..11 位精度"),
        )?;
        let picture_structure = match r.read_bits(
            "picture_structure",
            2,
            ReadOptions::new().check_range(1, 3),
        )? {
            1 => PictureStructure::TopField,
            2 => PictureStructure::BottomField,
            _ => PictureStructure::Frame,
        };
        let top_field_first = r.flag("top_field_first")?;
        let frame_pred_frame_dct = r.flag("frame_pred_frame_dct")?;
        let concealment_motion_vectors = r.flag("concealment_motion_vectors")?;
        let q_scale_type = r.flag("q_scale_type")?;
        let intra_vlc_format = r.flag("intra_vlc_format")?;
        let alternate_scan = r.flag("alternate_scan")?;
        let repeat_first_field = r.flag("repeat_first_field")?;
        let chroma_420_type = r.flag("chroma_420_type")?;
        let progressive_frame = r.flag("progressive_frame")?;
        let composite_display = if r.flag("composite_display_flag")? {
            Some(CompositeDisplay {
                v_axis: r.flag("v_axis")?,
                field_sequence: r.bits("field_sequence", 3)?,
                sub_carrier: r.flag("sub_carrier")?,
                burst_amplitude: r.bits("burst_amplitude", 7)?,
                sub_carrier_phase: r.bits("sub_carrier_phase", 8)?,
            })
        } else {
            None
        };

        Ok(Self {
            f_code,
            intra_dc_precision,
            picture_structure,
            top_field_first,
            frame_pred_frame_dct,
            concealment_motion_vectors,
            q_scale_type,
            intra_vlc_format,
            alternate_scan,
            repeat_first_field,
            chroma_420_type,
            progressive_frame,
            composite_display,
        })
    }

    /// intra DC 系数精度 (位)
    pub fn intra_dc_bits(&self) -> u32 {
        8 + self.intra_dc_precision
    }
}

/// 解析后的扩展
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extension {
    Sequence(SequenceExtension),
    PictureCoding(PictureCodingExtension),
    /// 已识别但不解析的扩展
    Other(ExtensionId),
    /// 保留的标识值
    Reserved(u32),
}

impl Extension {
    /// 解析 extension_start_code 之后的负载
    pub fn parse(r: &mut SyntaxReader) -> ParseResult<Self> {
        let id_code = r.read_bits(
            "extension_start_code_identifier",
            4,
            ReadOptions::new().meaning_map::<ExtensionId>(),
        )?;
        let Some(id) = ExtensionId::from_code(id_code) else {
            r.log_note(format!("extension_start_code_identifier={id_code} 为保留值"));
            return Ok(Self::Reserved(id_code));
        };
        match id {
            ExtensionId::Sequence => {
                let ext = r.sub_level(id.syntax_name(), SequenceExtension::parse)?;
                debug!("MPEG-2: sequence_extension {}", ext.profile_name());
                Ok(Self::Sequence(ext))
            }
            ExtensionId::PictureCoding => Ok(Self::PictureCoding(
                r.sub_level(id.syntax_name(), PictureCodingExtension::parse)?,
            )),
            other => {
                debug!("MPEG-2: 扩展负载未解析, id={}", other.name());
                Ok(Self::Other(other))
            }
        }
    }

    /// 扩展标识, 保留值为 `None`
    pub fn id(&self) -> Option<ExtensionId> {
        match self {
            Self::Sequence(_) => Some(ExtensionId::Sequence),
            Self::PictureCoding(_) => Some(ExtensionId::PictureCoding),
            Self::Other(id) => Some(*id),
            Self::Reserved(_) => None,
        }
    }
}
