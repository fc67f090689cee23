//! AVC 逐 NAL 单元解析与参数集存储.

use log::{debug, warn};
use nalscope_core::{
    AnnotationLog, ParseError, ParseResult, ParameterSetStore, ReadOptions, SymbolTable,
    SyntaxReader,
};

use super::nal::{NalHeader, NalUnitType};
use super::poc::{PocDiagnostic, PocState};
use super::pps::Pps;
use super::sei::{SeiPayload, parse_sei, payload_type_name};
use super::slice::SliceHeader;
use super::sps::Sps;
use super::tables::{ChromaFormat, ProfileIdc};
use crate::annexb::remove_emulation_prevention;
use crate::dispatch::{Codec, ElementaryStreamParser, StreamSummary, UnitReport};
use crate::sei::{SeiMessage, describe_sei};

/// 一个 AVC 流的全部参数集存储
#[derive(Debug, Clone, Default)]
pub struct AvcParameterSets {
    pub sps: ParameterSetStore<Sps>,
    /// subset_seq_parameter_set (类型 15) 单独存放
    pub subset_sps: ParameterSetStore<Sps>,
    pub pps: ParameterSetStore<Pps>,
}

impl AvcParameterSets {
    pub fn new() -> Self {
        Self::default()
    }

    /// 条带引用的 SPS, 扩展条带 (类型 20/21) 优先查找 subset SPS
    pub fn sps_for_slice(&self, id: u32, extension: bool) -> ParseResult<&Sps> {
        if extension && let Ok(sps) = self.subset_sps.get(id) {
            return Ok(sps);
        }
        self.sps.get(id)
    }

    /// PPS 引用的 SPS, 普通 SPS 缺失时回退到 subset SPS
    pub fn sps_for_pps(&self, id: u32) -> ParseResult<&Sps> {
        self.sps.get(id).or_else(|err| self.subset_sps.get(id).map_err(|_| err))
    }
}

/// AVC 解析配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvcParserConfig {
    /// 将 MissingPOCContext 视为错误
    pub strict_poc: bool,
    /// 保留全部注释 (关闭时只保留诊断)
    pub keep_annotations: bool,
}

impl Default for AvcParserConfig {
    fn default() -> Self {
        Self {
            strict_poc: false,
            keep_annotations: true,
        }
    }
}

/// 单元负载
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AvcPayload {
    Sps(Box<Sps>),
    SubsetSps(Box<Sps>),
    Pps(Box<Pps>),
    Slice(Box<SliceHeader>),
    PartitionA {
        header: Box<SliceHeader>,
        slice_id: u32,
    },
    /// 数据分区 B/C 只解析 slice_id
    PartitionB { slice_id: u32 },
    PartitionC { slice_id: u32 },
    Sei(Vec<SeiMessage<SeiPayload>>),
    /// 识别但不解析负载的单元 (AUD、填充等)
    Other,
}

/// 一个 NAL 单元的解析结果
#[derive(Debug, Clone)]
pub struct AvcUnit {
    pub header: NalHeader,
    pub payload: AvcPayload,
    pub annotations: AnnotationLog,
}

/// AVC 流解析器
///
/// 按码流顺序逐个喂入 NAL 单元. 解析失败的单元不会修改任何存储.
#[derive(Debug, Clone, Default)]
pub struct AvcParser {
    config: AvcParserConfig,
    sets: AvcParameterSets,
    /// 最近一幅图像首个条带的 POC 状态
    last_picture: Option<PocState>,
    /// 最近一个条带引用的 SPS, 供 pic_timing 使用
    active_sps_id: Option<u32>,
    summary: Option<StreamSummary>,
}

impl AvcParser {
    pub fn new(config: AvcParserConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &AvcParserConfig {
        &self.config
    }

    pub fn parameter_sets(&self) -> &AvcParameterSets {
        &self.sets
    }

    /// 供下一图像使用的 POC 状态
    pub fn poc_state(&self) -> Option<&PocState> {
        self.last_picture.as_ref()
    }

    pub fn stream_summary(&self) -> Option<&StreamSummary> {
        self.summary.as_ref()
    }

    /// 清空参数集与 POC 状态
    pub fn reset(&mut self) {
        self.sets = AvcParameterSets::new();
        self.last_picture = None;
        self.active_sps_id = None;
        self.summary = None;
    }

    /// 解析一个 NAL 单元 (含头部字节, 含防竞争字节)
    pub fn parse_nal(&mut self, data: &[u8]) -> ParseResult<AvcUnit> {
        let mut r = SyntaxReader::with_log(data, AnnotationLog::new(self.config.keep_annotations));
        let header = NalHeader::parse(&mut r)?;
        let log = r.into_log();

        let rbsp = remove_emulation_prevention(data.get(header.header_len()..).unwrap_or(&[]));
        let mut r = SyntaxReader::with_log(&rbsp, log);
        let payload = self.parse_payload(&mut r, &header)?;

        Ok(AvcUnit {
            header,
            payload,
            annotations: r.into_log(),
        })
    }

    fn parse_payload(&mut self, r: &mut SyntaxReader<'_>, nal: &NalHeader) -> ParseResult<AvcPayload> {
        match nal.nal_unit_type {
            NalUnitType::Sps => {
                let sps = Sps::parse(r)?;
                if self.summary.is_none() {
                    self.summary = Some(summarize(&sps));
                }
                self.sets.sps.insert(sps.seq_parameter_set_id, sps.clone());
                Ok(AvcPayload::Sps(Box::new(sps)))
            }
            NalUnitType::SubsetSps => {
                let sps = r.sub_level("subset_seq_parameter_set_rbsp()", |r| {
                    let sps = r.sub_level("seq_parameter_set_data()", Sps::parse_data)?;
                    r.log_note("subset SPS 扩展部分未解析");
                    Ok(sps)
                })?;
                self.sets
                    .subset_sps
                    .insert(sps.seq_parameter_set_id, sps.clone());
                Ok(AvcPayload::SubsetSps(Box::new(sps)))
            }
            NalUnitType::Pps => {
                let sets = &self.sets;
                let pps = Pps::parse(r, |id| sets.sps_for_pps(id))?;
                self.sets.pps.insert(pps.pic_parameter_set_id, pps.clone());
                Ok(AvcPayload::Pps(Box::new(pps)))
            }
            NalUnitType::CodedSliceNonIdr
            | NalUnitType::CodedSliceIdr
            | NalUnitType::CodedSliceExtension
            | NalUnitType::CodedSliceExtensionDepth => {
                let header = self.parse_slice(r, nal)?;
                Ok(AvcPayload::Slice(Box::new(header)))
            }
            NalUnitType::CodedSliceDataPartitionA => {
                let header = self.parse_slice(r, nal)?;
                let slice_id = r.ue("slice_id")?;
                Ok(AvcPayload::PartitionA {
                    header: Box::new(header),
                    slice_id,
                })
            }
            NalUnitType::Sei => {
                let messages = parse_sei(r, &self.sets.sps, self.active_sps())?;
                Ok(AvcPayload::Sei(messages))
            }
            NalUnitType::CodedSliceDataPartitionB => Ok(AvcPayload::PartitionB {
                slice_id: r.read_ue("slice_id", ReadOptions::new())?,
            }),
            NalUnitType::CodedSliceDataPartitionC => Ok(AvcPayload::PartitionC {
                slice_id: r.read_ue("slice_id", ReadOptions::new())?,
            }),
            other => {
                debug!("AVC: 跳过 NAL 负载, type={}", other.code());
                Ok(AvcPayload::Other)
            }
        }
    }

    /// 生效的 SPS: 最近条带引用的 SPS, 尚无条带时取唯一已存储的 SPS
    fn active_sps(&self) -> Option<&Sps> {
        match self.active_sps_id {
            Some(id) => self.sets.sps.get(id).ok(),
            None if self.sets.sps.len() == 1 => self.sets.sps.iter().next().map(|(_, sps)| sps),
            None => None,
        }
    }

    fn parse_slice(&mut self, r: &mut SyntaxReader<'_>, nal: &NalHeader) -> ParseResult<SliceHeader> {
        let header = SliceHeader::parse(r, nal, &self.sets, self.last_picture.as_ref())?;
        if let Some(PocDiagnostic::MissingPocContext) = header.poc_diagnostic
            && self.config.strict_poc
        {
            return Err(ParseError::constraint(format!(
                "AVC: MissingPOCContext, frame_num={}",
                header.frame_num
            )));
        }

        let top_changed = self
            .last_picture
            .as_ref()
            .is_none_or(|prev| prev.top_field_order_cnt != header.poc.top_field_order_cnt);
        if !header.bottom_field_flag
            && header.first_mb_in_slice == 0
            && (top_changed || header.idr)
        {
            self.last_picture = Some(header.poc_state());
        }
        self.active_sps_id = Some(header.seq_parameter_set_id);
        Ok(header)
    }
}

fn summarize(sps: &Sps) -> StreamSummary {
    let (width, height) = sps.display_size();
    StreamSummary {
        codec: Codec::Avc,
        width,
        height,
        frame_rate: sps.frame_rate(),
        chroma_format: ChromaFormat::from_code(sps.chroma_format_idc).map_or("", |c| c.meaning()),
        bit_depth: sps.derived.bit_depth_luma,
        profile: ProfileIdc::from_code(sps.profile_idc)
            .map_or_else(|| format!("profile_idc={}", sps.profile_idc), |p| p.meaning().to_string()),
    }
}

impl ElementaryStreamParser for AvcParser {
    fn codec(&self) -> Codec {
        Codec::Avc
    }

    fn parse_unit(&mut self, data: &[u8]) -> ParseResult<UnitReport> {
        let unit = self.parse_nal(data).inspect_err(|err| {
            warn!("AVC: NAL 解析失败, err={}", err);
        })?;
        let description = match &unit.payload {
            AvcPayload::Sps(sps) | AvcPayload::SubsetSps(sps) => {
                let (w, h) = sps.display_size();
                format!(
                    "id={} profile={} level={} {}x{}",
                    sps.seq_parameter_set_id, sps.profile_idc, sps.level_idc, w, h
                )
            }
            AvcPayload::Pps(pps) => format!(
                "id={} sps_id={} {}",
                pps.pic_parameter_set_id,
                pps.seq_parameter_set_id,
                if pps.entropy_coding_mode_flag { "CABAC" } else { "CAVLC" }
            ),
            AvcPayload::Slice(h) | AvcPayload::PartitionA { header: h, .. } => {
                let mut text = format!(
                    "{} frame_num={} first_mb={} poc={}",
                    h.slice_type.as_str(),
                    h.frame_num,
                    h.first_mb_in_slice,
                    h.poc.global.value
                );
                if let Some(d) = h.poc_diagnostic {
                    text.push_str(&format!(" [{d}]"));
                }
                text
            }
            AvcPayload::PartitionB { slice_id } | AvcPayload::PartitionC { slice_id } => {
                format!("slice_id={slice_id}")
            }
            AvcPayload::Sei(messages) => describe_sei(messages, payload_type_name),
            AvcPayload::Other => String::new(),
        };
        Ok(UnitReport {
            type_code: unit.header.nal_unit_type.code(),
            type_name: unit.header.nal_unit_type.name(),
            description,
            annotations: unit.annotations,
        })
    }

    fn summary(&self) -> Option<StreamSummary> {
        self.summary.clone()
    }
}
