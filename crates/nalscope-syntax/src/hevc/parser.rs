//! HEVC 逐 NAL 单元解析与参数集存储.

use log::{debug, warn};
use nalscope_core::{AnnotationLog, ParseResult, ParameterSetStore, SymbolTable, SyntaxReader};

use super::nal::{NalHeader, NalUnitType};
use super::poc::PocState;
use super::pps::Pps;
use super::sei::{SeiPayload, parse_sei, prefix_payload_type_name, suffix_payload_type_name};
use super::slice::{SliceContext, SliceSegmentHeader};
use super::sps::Sps;
use super::vps::Vps;
use crate::annexb::remove_emulation_prevention;
use crate::avc::tables::ChromaFormat;
use crate::dispatch::{Codec, ElementaryStreamParser, StreamSummary, UnitReport};
use crate::sei::{SeiMessage, describe_sei};

#[derive(Debug, Clone, Default)]
pub struct HevcParameterSets {
    pub vps: ParameterSetStore<Vps>,
    pub sps: ParameterSetStore<Sps>,
    pub pps: ParameterSetStore<Pps>,
}

impl HevcParameterSets {
    pub fn new() -> Self {
        Self::default()
    }
}

/// HEVC 解析配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HevcParserConfig {
    /// 保留全部注释
    pub keep_annotations: bool,
    /// SPS 引用的 VPS 必须已存在
    pub require_vps: bool,
}

impl Default for HevcParserConfig {
    fn default() -> Self {
        Self {
            keep_annotations: true,
            require_vps: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HevcPayload {
    Vps(Box<Vps>),
    Sps(Box<Sps>),
    Pps(Box<Pps>),
    Slice(Box<SliceSegmentHeader>),
    Sei(Vec<SeiMessage<SeiPayload>>),
    /// AUD、EOS、填充等只识别类型
    Other,
}

/// 一个 NAL 单元的解析结果
#[derive(Debug, Clone)]
pub struct HevcUnit {
    pub header: NalHeader,
    pub payload: HevcPayload,
    pub annotations: AnnotationLog,
}

/// HEVC 流解析器, 解析失败的单元不会修改存储与 POC 状态
#[derive(Debug, Clone, Default)]
pub struct HevcParser {
    config: HevcParserConfig,
    sets: HevcParameterSets,
    poc: PocState,
    /// 已解析过序列首幅图像; 码流开始与 EOS 之后为 false
    sequence_started: bool,
    /// 当前图像最近的独立条带片段
    current_picture: Option<SliceSegmentHeader>,
    summary: Option<StreamSummary>,
}

impl HevcParser {
    pub fn new(config: HevcParserConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &HevcParserConfig {
        &self.config
    }

    pub fn parameter_sets(&self) -> &HevcParameterSets {
        &self.sets
    }

    pub fn stream_summary(&self) -> Option<&StreamSummary> {
        self.summary.as_ref()
    }

    /// 供下一图像使用的 POC 状态
    pub fn poc_state(&self) -> &PocState {
        &self.poc
    }

    /// 清空参数集与 POC 状态
    pub fn reset(&mut self) {
        self.sets = HevcParameterSets::new();
        self.poc = PocState::default();
        self.sequence_started = false;
        self.current_picture = None;
        self.summary = None;
    }

    /// 生效的 SPS: 当前图像引用的 SPS, 尚无条带时取唯一已存储的 SPS
    fn active_sps(&self) -> Option<&Sps> {
        match &self.current_picture {
            Some(header) => self.sets.sps.get(header.pps_seq_parameter_set_id).ok(),
            None if self.sets.sps.len() == 1 => self.sets.sps.iter().next().map(|(_, sps)| sps),
            None => None,
        }
    }

    /// 解析一个 NAL 单元 (含两字节头部, 含防竞争字节)
    pub fn parse_nal(&mut self, data: &[u8]) -> ParseResult<HevcUnit> {
        let mut r = SyntaxReader::with_log(data, AnnotationLog::new(self.config.keep_annotations));
        let header = NalHeader::parse(&mut r)?;
        let log = r.into_log();

        let rbsp = remove_emulation_prevention(data.get(NalHeader::LEN..).unwrap_or(&[]));
        let mut r = SyntaxReader::with_log(&rbsp, log);
        let payload = self.parse_payload(&mut r, &header)?;

        Ok(HevcUnit {
            header,
            payload,
            annotations: r.into_log(),
        })
    }

    fn parse_payload(&mut self, r: &mut SyntaxReader<'_>, nal: &NalHeader) -> ParseResult<HevcPayload> {
        match nal.nal_unit_type {
            NalUnitType::VpsNut => {
                let vps = Vps::parse(r)?;
                self.sets.vps.insert(vps.vps_video_parameter_set_id, vps.clone());
                Ok(HevcPayload::Vps(Box::new(vps)))
            }
            NalUnitType::SpsNut => {
                let sps = Sps::parse(r, nal.nuh_layer_id)?;
                let vps = match self.sets.vps.get(sps.sps_video_parameter_set_id) {
                    Ok(vps) => Some(vps),
                    Err(err) if self.config.require_vps => return Err(err),
                    Err(_) => None,
                };
                if self.summary.is_none() {
                    self.summary = Some(summarize(&sps, vps));
                }
                self.sets.sps.insert(sps.sps_seq_parameter_set_id, sps.clone());
                Ok(HevcPayload::Sps(Box::new(sps)))
            }
            NalUnitType::PpsNut => {
                let sets = &self.sets;
                let pps = Pps::parse(r, |id| sets.sps.get(id).ok())?;
                self.sets.pps.insert(pps.pps_pic_parameter_set_id, pps.clone());
                Ok(HevcPayload::Pps(Box::new(pps)))
            }
            NalUnitType::PrefixSeiNut | NalUnitType::SuffixSeiNut => {
                let messages = parse_sei(r, nal.nal_unit_type, &self.sets, self.active_sps())?;
                Ok(HevcPayload::Sei(messages))
            }
            NalUnitType::EosNut => {
                self.sequence_started = false;
                Ok(HevcPayload::Other)
            }
            t if t.is_slice() => {
                let header = self.parse_slice(r, nal)?;
                Ok(HevcPayload::Slice(Box::new(header)))
            }
            other => {
                debug!("HEVC: 跳过 NAL 负载, type={}", other.code());
                Ok(HevcPayload::Other)
            }
        }
    }

    fn parse_slice(&mut self, r: &mut SyntaxReader<'_>, nal: &NalHeader) -> ParseResult<SliceSegmentHeader> {
        let first_picture_in_sequence = !self.sequence_started;
        let ctx = SliceContext {
            poc_state: &self.poc,
            first_picture_in_sequence,
            previous_independent: self.current_picture.as_ref(),
        };
        let header = SliceSegmentHeader::parse(r, nal, &self.sets, &ctx)?;
        if header.first_slice_segment_in_pic_flag {
            let input = header.poc_input(nal, first_picture_in_sequence);
            self.poc = self.poc.advance(&input, &header.poc);
            self.sequence_started = true;
        }
        if !header.dependent_slice_segment_flag {
            self.current_picture = Some(header.clone());
        }
        Ok(header)
    }
}

fn summarize(sps: &Sps, vps: Option<&Vps>) -> StreamSummary {
    let (width, height) = sps.display_size();
    StreamSummary {
        codec: Codec::Hevc,
        width,
        height,
        frame_rate: sps.frame_rate().or_else(|| vps.and_then(Vps::frame_rate)),
        chroma_format: ChromaFormat::from_code(sps.chroma_format_idc).map_or("", |c| c.meaning()),
        bit_depth: sps.derived.bit_depth_luma,
        profile: sps.profile_tier_level.profile_name(),
    }
}

impl ElementaryStreamParser for HevcParser {
    fn codec(&self) -> Codec {
        Codec::Hevc
    }

    fn parse_unit(&mut self, data: &[u8]) -> ParseResult<UnitReport> {
        let unit = self.parse_nal(data).inspect_err(|err| {
            warn!("HEVC: NAL 解析失败, err={}", err);
        })?;
        let description = match &unit.payload {
            HevcPayload::Vps(vps) => format!(
                "id={} max_layers={} layer_sets={}{}",
                vps.vps_video_parameter_set_id,
                vps.vps_max_layers_minus1 + 1,
                vps.layer_sets.len(),
                if vps.extension.is_some() { " +ext" } else { "" }
            ),
            HevcPayload::Sps(sps) => {
                let (w, h) = sps.display_size();
                format!(
                    "id={} vps_id={} {} {} {}x{}",
                    sps.sps_seq_parameter_set_id,
                    sps.sps_video_parameter_set_id,
                    sps.profile_tier_level.profile_name(),
                    sps.profile_tier_level.level_name(),
                    w,
                    h
                )
            }
            HevcPayload::Pps(pps) => format!(
                "id={} sps_id={} {}",
                pps.pps_pic_parameter_set_id,
                pps.pps_seq_parameter_set_id,
                pps.parallelism().as_str()
            ),
            HevcPayload::Slice(h) => format!(
                "{} addr={} POC={}{}",
                h.slice_type.as_str(),
                h.slice_segment_address,
                h.poc.pic_order_cnt_val,
                if h.dependent_slice_segment_flag { " dependent" } else { "" }
            ),
            HevcPayload::Sei(messages) => {
                if unit.header.nal_unit_type == NalUnitType::PrefixSeiNut {
                    describe_sei(messages, prefix_payload_type_name)
                } else {
                    describe_sei(messages, suffix_payload_type_name)
                }
            }
            HevcPayload::Other => format!(
                "layer={} tid={}",
                unit.header.nuh_layer_id,
                unit.header.temporal_id()
            ),
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
