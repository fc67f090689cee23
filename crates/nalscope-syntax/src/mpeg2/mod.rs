//! MPEG-2 视频 (ISO/IEC 13818-2) 起始码单元解析.
//!
//! - 起始码分类 ([`StartCode`])
//! - sequence_header / sequence_extension / picture_coding_extension
//! - picture_header 与 group_of_pictures_header, 以及由 temporal_reference 推导的 POC
//!
//! 条带与用户数据只识别类型. MPEG-2 没有防竞争字节, 单元负载即原始字节.

pub mod extension;
pub mod picture;
pub mod sequence;
pub mod start_code;

use log::{debug, warn};
use nalscope_core::{AnnotationLog, ParseResult, SyntaxReader};

pub use extension::{ChromaFormat, Extension, ExtensionId, PictureCodingExtension, SequenceExtension};
pub use picture::{GroupOfPicturesHeader, PictureCodingType, PictureHeader, TimeCode};
pub use sequence::{AspectRatio, FrameRateCode, SequenceHeader};
pub use start_code::StartCode;

use crate::dispatch::{Codec, ElementaryStreamParser, StreamSummary, UnitReport};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mpeg2Payload {
    SequenceHeader(Box<SequenceHeader>),
    Picture(PictureHeader),
    GroupOfPictures(GroupOfPicturesHeader),
    Extension(Extension),
    /// 用户数据字节数
    UserData(usize),
    /// slice_vertical_position
    Slice(u8),
    Other,
}

/// 一个起始码单元的解析结果
#[derive(Debug, Clone)]
pub struct Mpeg2Unit {
    pub start_code: StartCode,
    pub payload: Mpeg2Payload,
    /// 图像头部单元的 POC
    pub picture_order_count: Option<i64>,
    pub annotations: AnnotationLog,
}

/// 由 temporal_reference 推导显示顺序
///
/// temporal_reference 在每个 GOP 内从 0 重新计数. 新的 GOP 以已见最大 POC + 1 为偏移;
/// 没有 GOP 头部的码流以 temporal_reference=0 作为分组边界.
#[derive(Debug, Clone, Default)]
struct PocTracker {
    offset: i64,
    max_poc: Option<i64>,
    gop_headers_seen: bool,
    group_pending: bool,
}

impl PocTracker {
    fn start_group(&mut self) {
        self.gop_headers_seen = true;
        self.group_pending = true;
    }

    fn next(&mut self, temporal_reference: u32) -> i64 {
        let new_group = if self.gop_headers_seen {
            self.group_pending
        } else {
            temporal_reference == 0
        };
        if new_group {
            if let Some(max) = self.max_poc {
                self.offset = max + 1;
            }
            self.group_pending = false;
        }
        let poc = self.offset + i64::from(temporal_reference);
        self.max_poc = Some(self.max_poc.map_or(poc, |m| m.max(poc)));
        poc
    }
}

/// MPEG-2 流解析器
#[derive(Debug, Clone, Default)]
pub struct Mpeg2Parser {
    keep_annotations: bool,
    sequence_header: Option<SequenceHeader>,
    sequence_extension: Option<SequenceExtension>,
    poc: PocTracker,
    last_picture: Option<PictureHeader>,
}

impl Mpeg2Parser {
    pub fn new(keep_annotations: bool) -> Self {
        Self {
            keep_annotations,
            ..Default::default()
        }
    }

    /// 首个 sequence_header
    pub fn sequence_header(&self) -> Option<&SequenceHeader> {
        self.sequence_header.as_ref()
    }

    /// 首个 sequence_extension
    pub fn sequence_extension(&self) -> Option<&SequenceExtension> {
        self.sequence_extension.as_ref()
    }

    pub fn last_picture(&self) -> Option<&PictureHeader> {
        self.last_picture.as_ref()
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.keep_annotations);
    }

    /// 解析一个单元, 首字节为起始码值
    pub fn parse_start_code_unit(&mut self, data: &[u8]) -> ParseResult<Mpeg2Unit> {
        let mut r = SyntaxReader::with_log(data, AnnotationLog::new(self.keep_annotations));
        let value = r.bits("start_code_value", 8)? as u8;
        let start_code = StartCode::from_value(value);
        r.log_calculated("start_code", start_code.meaning());

        let mut picture_order_count = None;
        let payload = match start_code {
            StartCode::SequenceHeader => {
                let seq = SequenceHeader::parse(&mut r)?;
                if self.sequence_header.is_none() {
                    self.sequence_header = Some(seq.clone());
                }
                Mpeg2Payload::SequenceHeader(Box::new(seq))
            }
            StartCode::Picture => {
                let pic = PictureHeader::parse(&mut r)?;
                let poc = self.poc.next(pic.temporal_reference);
                r.log_calculated("PicOrderCnt", poc);
                picture_order_count = Some(poc);
                self.last_picture = Some(pic.clone());
                Mpeg2Payload::Picture(pic)
            }
            StartCode::GroupStart => {
                let gop = GroupOfPicturesHeader::parse(&mut r)?;
                self.poc.start_group();
                Mpeg2Payload::GroupOfPictures(gop)
            }
            StartCode::Extension => {
                let ext = Extension::parse(&mut r)?;
                if let Extension::Sequence(seq_ext) = &ext
                    && self.sequence_extension.is_none()
                {
                    self.sequence_extension = Some(seq_ext.clone());
                }
                Mpeg2Payload::Extension(ext)
            }
            StartCode::UserData => Mpeg2Payload::UserData(data.len() - 1),
            StartCode::Slice(row) => {
                r.log_calculated("slice_vertical_position", u32::from(row));
                Mpeg2Payload::Slice(row)
            }
            other => {
                debug!("MPEG-2: 跳过单元负载, start_code=0x{:02X}", other.value());
                Mpeg2Payload::Other
            }
        };

        Ok(Mpeg2Unit {
            start_code,
            payload,
            picture_order_count,
            annotations: r.into_log(),
        })
    }
}

impl ElementaryStreamParser for Mpeg2Parser {
    fn codec(&self) -> Codec {
        Codec::Mpeg2
    }

    fn parse_unit(&mut self, data: &[u8]) -> ParseResult<UnitReport> {
        let unit = self.parse_start_code_unit(data).inspect_err(|err| {
            warn!("MPEG-2: 单元解析失败, err={}", err);
        })?;
        let ext = self.sequence_extension.as_ref();
        let description = match &unit.payload {
            Mpeg2Payload::SequenceHeader(seq) => {
                let (w, h) = seq.size(ext);
                match seq.frame_rate(ext) {
                    Some(rate) => format!("{w}x{h} {:.3} fps", rate.to_f64()),
                    None => format!("{w}x{h}"),
                }
            }
            Mpeg2Payload::Picture(pic) => format!(
                "{} tr={} poc={}",
                pic.picture_coding_type.short_name(),
                pic.temporal_reference,
                unit.picture_order_count.unwrap_or_default()
            ),
            Mpeg2Payload::GroupOfPictures(gop) => format!(
                "{}{}{}",
                gop.time_code,
                if gop.closed_gop { " closed" } else { "" },
                if gop.broken_link { " broken_link" } else { "" }
            ),
            Mpeg2Payload::Extension(ext) => match ext.id() {
                Some(id) => id.syntax_name().to_string(),
                None => "reserved extension".to_string(),
            },
            Mpeg2Payload::UserData(len) => format!("len={len}"),
            Mpeg2Payload::Slice(row) => format!("row={row}"),
            Mpeg2Payload::Other => unit.start_code.meaning().to_string(),
        };
        Ok(UnitReport {
            type_code: u32::from(unit.start_code.value()),
            type_name: unit.start_code.name(),
            description,
            annotations: unit.annotations,
        })
    }

    fn summary(&self) -> Option<StreamSummary> {
        let seq = self.sequence_header.as_ref()?;
        let ext = self.sequence_extension.as_ref();
        let (width, height) = seq.size(ext);
        Some(StreamSummary {
            codec: Codec::Mpeg2,
            width,
            height,
            frame_rate: seq.frame_rate(ext),
            // MPEG-1 码流没有序列扩展, 固定 4:2:0
            chroma_format: ext.map_or("4:2:0", SequenceExtension::chroma_format_name),
            bit_depth: 8,
            profile: ext.map_or_else(|| "MPEG-1".to_string(), SequenceExtension::profile_name),
        })
    }
}
