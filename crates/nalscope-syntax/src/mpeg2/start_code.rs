//! MPEG-2 视频起始码 (ISO/IEC 13818-2 表 6-1).
//!
//! 分帧后每个单元的首字节即起始码值 (`00 00 01` 之后的字节).

use std::fmt;

/// 起始码分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StartCode {
    /// 0x00
    Picture,
    /// 0x01..=0xAF, 携带 slice_vertical_position
    Slice(u8),
    /// 0xB0, 0xB1, 0xB6
    Reserved(u8),
    /// 0xB2
    UserData,
    /// 0xB3
    SequenceHeader,
    /// 0xB4
    SequenceError,
    /// 0xB5
    Extension,
    /// 0xB7
    SequenceEnd,
    /// 0xB8
    GroupStart,
    /// 0xB9..=0xFF
    System(u8),
}

impl StartCode {
    pub fn from_value(value: u8) -> Self {
        match value {
            0x00 => Self::Picture,
            0x01..=0xAF => Self::Slice(value),
            0xB2 => Self::UserData,
            0xB3 => Self::SequenceHeader,
            0xB4 => Self::SequenceError,
            0xB5 => Self::Extension,
            0xB7 => Self::SequenceEnd,
            0xB8 => Self::GroupStart,
            0xB0 | 0xB1 | 0xB6 => Self::Reserved(value),
            _ => Self::System(value),
        }
    }

    /// 起始码值
    pub fn value(self) -> u8 {
        match self {
            Self::Picture => 0x00,
            Self::Slice(v) | Self::Reserved(v) | Self::System(v) => v,
            Self::UserData => 0xB2,
            Self::SequenceHeader => 0xB3,
            Self::SequenceError => 0xB4,
            Self::Extension => 0xB5,
            Self::SequenceEnd => 0xB7,
            Self::GroupStart => 0xB8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Picture => "Picture",
            Self::Slice(_) => "Slice",
            Self::Reserved(_) => "Reserved",
            Self::UserData => "UserData",
            Self::SequenceHeader => "SequenceHeader",
            Self::SequenceError => "SequenceError",
            Self::Extension => "Extension",
            Self::SequenceEnd => "SequenceEnd",
            Self::GroupStart => "GroupStart",
            Self::System(_) => "System",
        }
    }

    pub fn meaning(self) -> &'static str {
        match self {
            Self::Picture => "picture_start_code",
            Self::Slice(_) => "slice_start_code",
            Self::Reserved(_) => "reserved",
            Self::UserData => "user_data_start_code",
            Self::SequenceHeader => "sequence_header_code",
            Self::SequenceError => "sequence_error_code",
            Self::Extension => "extension_start_code",
            Self::SequenceEnd => "sequence_end_code",
            Self::GroupStart => "group_start_code",
            Self::System(_) => "system start code",
        }
    }

    pub fn is_slice(self) -> bool {
        matches!(self, Self::Slice(_))
    }
}

impl fmt::Display for StartCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.meaning(), self.value())
    }
}
