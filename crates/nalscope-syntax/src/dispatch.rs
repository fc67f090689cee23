//! 多编解码器分发.
//!
//! 每种编解码器实现 [`ElementaryStreamParser`], 由 [`create_parser`] 按 [`Codec`] 创建.
//! 调用方负责分帧 ([`split_units`]), 然后逐个单元调用 `parse_unit`.
//! 每个流独占一个解析器实例, 参数集存储与 POC 状态都在实例内部.

use std::fmt;

use bytes::Bytes;
use nalscope_core::{AnnotationLog, ParseResult, Rational};

use crate::annexb::{NalUnit, split_annex_b, split_start_code_units};
use crate::avc::{AvcParser, AvcParserConfig};
use crate::hevc::{HevcParser, HevcParserConfig};
use crate::mpeg2::Mpeg2Parser;
use crate::vvc::{VvcParser, VvcParserConfig};

/// 支持的码流标准
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    Avc,
    Hevc,
    Vvc,
    Mpeg2,
}

impl Codec {
    pub const ALL: [Codec; 4] = [Self::Avc, Self::Hevc, Self::Vvc, Self::Mpeg2];

    /// 按文件扩展名识别 (不区分大小写)
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "264" | "h264" | "avc" | "jsv" | "jvt" | "26l" => Some(Self::Avc),
            "265" | "h265" | "hevc" | "bit" => Some(Self::Hevc),
            "266" | "h266" | "vvc" => Some(Self::Vvc),
            "m2v" | "mpg" | "mpeg" | "m1v" | "mpv" => Some(Self::Mpeg2),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Avc => "AVC",
            Self::Hevc => "HEVC",
            Self::Vvc => "VVC",
            Self::Mpeg2 => "MPEG-2",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 由首个序列级参数集得到的流概要
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    pub codec: Codec,
    /// 显示宽度 (裁剪后)
    pub width: u32,
    pub height: u32,
    pub frame_rate: Option<Rational>,
    /// 如 "4:2:0"
    pub chroma_format: &'static str,
    pub bit_depth: u32,
    pub profile: String,
}

/// 单个单元的解析结果概要
#[derive(Debug, Clone)]
pub struct UnitReport {
    /// 单元类型码值
    pub type_code: u32,
    /// 单元类型名称
    pub type_name: &'static str,
    /// 一行可读描述
    pub description: String,
    pub annotations: AnnotationLog,
}

/// 基本流解析器
pub trait ElementaryStreamParser: Send {
    fn codec(&self) -> Codec;

    /// 解析一个单元 (含头部, 含防竞争字节)
    fn parse_unit(&mut self, data: &[u8]) -> ParseResult<UnitReport>;

    /// 流概要, 尚未见到序列级参数集时为 `None`
    fn summary(&self) -> Option<StreamSummary>;
}

/// 创建指定编解码器的解析器
pub fn create_parser(codec: Codec, keep_annotations: bool) -> Box<dyn ElementaryStreamParser> {
    match codec {
        Codec::Avc => Box::new(AvcParser::new(AvcParserConfig {
            keep_annotations,
            ..Default::default()
        })),
        Codec::Hevc => Box::new(HevcParser::new(HevcParserConfig {
            keep_annotations,
            ..Default::default()
        })),
        Codec::Vvc => Box::new(VvcParser::new(VvcParserConfig { keep_annotations })),
        Codec::Mpeg2 => Box::new(Mpeg2Parser::new(keep_annotations)),
    }
}

/// 按编解码器切分原始基本流, 四种标准都使用起始码分隔
pub fn split_units(data: &Bytes, codec: Codec) -> Vec<NalUnit> {
    match codec {
        Codec::Avc | Codec::Hevc | Codec::Vvc => split_annex_b(data),
        Codec::Mpeg2 => split_start_code_units(data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_from_extension() {
        assert_eq!(Codec::from_extension("H264"), Some(Codec::Avc));
        assert_eq!(Codec::from_extension("hevc"), Some(Codec::Hevc));
        assert_eq!(Codec::from_extension("266"), Some(Codec::Vvc));
        assert_eq!(Codec::from_extension("m2v"), Some(Codec::Mpeg2));
        assert_eq!(Codec::from_extension("mp4"), None);
    }

    #[test]
    fn test_create_parser_codec() {
        for codec in Codec::ALL {
            let parser = create_parser(codec, false);
            assert_eq!(parser.codec(), codec);
            assert!(parser.summary().is_none(), "新解析器不应有流概要");
        }
    }
}
