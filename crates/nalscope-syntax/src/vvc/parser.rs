//! VVC 逐 NAL 单元解析与参数集存储.

use log::{debug, warn};
use nalscope_core::{AnnotationLog, ParameterSetStore, ParseResult, SymbolTable, SyntaxReader};

use super::nal::{NalHeader, NalUnitType};
use super::ph::PictureHeader;
use super::poc::{PicOrderCount, PocState};
use super::pps::Pps;
use super::slice::{SliceContext, SliceHeader, poc_input};
use super::sps::Sps;
use super::vps::Vps;
use crate::annexb::remove_emulation_prevention;
use crate::avc::sps::read_trailing_bits;
use crate::dispatch::{Codec, ElementaryStreamParser, StreamSummary, UnitReport};

#[derive(Debug, Clone, Default)]
pub struct VvcParameterSets {
    pub vps: ParameterSetStore<Vps>,
    pub sps: ParameterSetStore<Sps>,
    pub pps: ParameterSetStore<Pps>,
}

impl VvcParameterSets {
    pub fn new() -> Self {
        Self::default()
    }
}

/// VVC 解析配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VvcParserConfig {
    /// 保留全部注释
    pub keep_annotations: bool,
}

impl Default for VvcParserConfig {
    fn default() -> Self {
        Self { keep_annotations: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VvcPayload {
    Vps(Box<Vps>),
    Sps(Box<Sps>),
    Pps(Box<Pps>),
    PictureHeader(Box<PictureHeader>),
    Slice(Box<SliceHeader>),
    /// APS、SEI、AUD、EOS 等只识别类型
    Other,
}

/// 一个 NAL 单元的解析结果
#[derive(Debug, Clone)]
pub struct VvcUnit {
    pub header: NalHeader,
    pub payload: VvcPayload,
    pub annotations: AnnotationLog,
}

/// VVC 流解析器, 解析失败的单元不会修改存储、图像头与 POC 状态
#[derive(Debug, Clone, Default)]
pub struct VvcParser {
    config: VvcParserConfig,
    sets: VvcParameterSets,
    poc: PocState,
    sequence_started: bool,
    /// 最近的 PH_NUT
    picture_header: Option<PictureHeader>,
    /// 当前图像首个条带推导出的 POC
    picture_poc: Option<PicOrderCount>,
    /// 最近一幅图像引用的 PPS
    active_pps_id: Option<u32>,
    summary: Option<StreamSummary>,
}

impl VvcParser {
    pub fn new(config: VvcParserConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &VvcParserConfig {
        &self.config
    }

    pub fn parameter_sets(&self) -> &VvcParameterSets {
        &self.sets
    }

    pub fn stream_summary(&self) -> Option<&StreamSummary> {
        self.summary.as_ref()
    }

    pub fn poc_state(&self) -> &PocState {
        &self.poc
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.config);
    }

    /// 生效的 SPS: 最近图像引用的 SPS, 尚无图像时取唯一已存储的 SPS
    pub fn active_sps(&self) -> Option<&Sps> {
        match self.active_pps_id {
            Some(id) => {
                let pps = self.sets.pps.get(id).ok()?;
                self.sets.sps.get(pps.pps_seq_parameter_set_id).ok()
            }
            None if self.sets.sps.len() == 1 => self.sets.sps.iter().next().map(|(_, sps)| sps),
            None => None,
        }
    }

    /// 解析一个 NAL 单元 (含两字节头部, 含防竞争字节)
    pub fn parse_nal(&mut self, data: &[u8]) -> ParseResult<VvcUnit> {
        let mut r = SyntaxReader::with_log(data, AnnotationLog::new(self.config.keep_annotations));
        let header = NalHeader::parse(&mut r)?;
        let log = r.into_log();

        let rbsp = remove_emulation_prevention(data.get(NalHeader::LEN..).unwrap_or(&[]));
        let mut r = SyntaxReader::with_log(&rbsp, log);
        let payload = self.parse_payload(&mut r, &header)?;

        Ok(VvcUnit {
            header,
            payload,
            annotations: r.into_log(),
        })
    }

    fn parse_payload(&mut self, r: &mut SyntaxReader<'_>, nal: &NalHeader) -> ParseResult<VvcPayload> {
        match nal.nal_unit_type {
            NalUnitType::VpsNut => {
                let vps = Vps::parse(r)?;
                self.sets.vps.insert(vps.vps_video_parameter_set_id, vps.clone());
                Ok(VvcPayload::Vps(Box::new(vps)))
            }
            NalUnitType::SpsNut => {
                let sps = Sps::parse(r)?;
                if self.summary.is_none() {
                    self.summary = Some(summarize(&sps));
                }
                self.sets.sps.insert(sps.sps_seq_parameter_set_id, sps.clone());
                Ok(VvcPayload::Sps(Box::new(sps)))
            }
            NalUnitType::PpsNut => {
                let pps = Pps::parse(r, &self.sets.sps)?;
                self.sets.pps.insert(pps.pps_pic_parameter_set_id, pps.clone());
                Ok(VvcPayload::Pps(Box::new(pps)))
            }
            NalUnitType::PhNut => {
                let ph = PictureHeader::parse(r, &self.sets)?;
                read_trailing_bits(r)?;
                self.active_pps_id = Some(ph.ph_pic_parameter_set_id);
                self.picture_header = Some(ph.clone());
                self.picture_poc = None;
                Ok(VvcPayload::PictureHeader(Box::new(ph)))
            }
            NalUnitType::EosNut => {
                self.sequence_started = false;
                Ok(VvcPayload::Other)
            }
            t if t.is_slice() => {
                let header = self.parse_slice(r, nal)?;
                Ok(VvcPayload::Slice(Box::new(header)))
            }
            other => {
                debug!("VVC: 跳过 NAL 负载, type={}", other.code());
                Ok(VvcPayload::Other)
            }
        }
    }

    fn parse_slice(&mut self, r: &mut SyntaxReader<'_>, nal: &NalHeader) -> ParseResult<SliceHeader> {
        let first_picture_in_sequence = !self.sequence_started;
        let ctx = SliceContext {
            picture_header: self.picture_header.as_ref(),
            poc_state: &self.poc,
            first_picture_in_sequence,
            picture_poc: self.picture_poc,
        };
        let header = SliceHeader::parse(r, nal, &self.sets, &ctx)?;

        if self.picture_poc.is_none() || header.picture_header.is_some() {
            let ph = match (&header.picture_header, &self.picture_header) {
                (Some(ph), _) => Some(ph.as_ref()),
                (None, ph) => ph.as_ref(),
            };
            if let Some(ph) = ph {
                let input = poc_input(nal, ph, first_picture_in_sequence);
                self.poc = self.poc.advance(&input, &header.poc);
            }
            self.sequence_started = true;
        }
        if header.picture_header.is_some() {
            // 图像头在条带头中时每幅图像只有一个条带
            self.picture_header = None;
            self.picture_poc = None;
        } else {
            self.picture_poc = Some(header.poc);
        }
        self.active_pps_id = Some(header.ph_pic_parameter_set_id);
        Ok(header)
    }
}

fn summarize(sps: &Sps) -> StreamSummary {
    let (width, height) = sps.display_size();
    StreamSummary {
        codec: Codec::Vvc,
        width,
        height,
        frame_rate: sps.frame_rate(),
        chroma_format: sps.chroma_format_name(),
        bit_depth: sps.derived.bit_depth,
        profile: sps.profile_name(),
    }
}

impl ElementaryStreamParser for VvcParser {
    fn codec(&self) -> Codec {
        Codec::Vvc
    }

    fn parse_unit(&mut self, data: &[u8]) -> ParseResult<UnitReport> {
        let unit = self.parse_nal(data).inspect_err(|err| {
            warn!("VVC: NAL 解析失败, err={}", err);
        })?;
        let description = match &unit.payload {
            VvcPayload::Vps(vps) => format!(
                "id={} max_layers={} olss={}",
                vps.vps_video_parameter_set_id,
                vps.vps_max_layers_minus1 + 1,
                vps.output_layer_sets.len()
            ),
            VvcPayload::Sps(sps) => {
                let (w, h) = sps.display_size();
                format!(
                    "id={} vps_id={} {} {}x{}",
                    sps.sps_seq_parameter_set_id,
                    sps.sps_video_parameter_set_id,
                    sps.profile_name(),
                    w,
                    h
                )
            }
            VvcPayload::Pps(pps) => format!(
                "id={} sps_id={} {} tiles={} slices={}",
                pps.pps_pic_parameter_set_id,
                pps.pps_seq_parameter_set_id,
                pps.parallelism().as_str(),
                pps.num_tiles(),
                pps.layout.slices.len()
            ),
            VvcPayload::PictureHeader(ph) => format!(
                "pps_id={} poc_lsb={}{}",
                ph.ph_pic_parameter_set_id,
                ph.ph_pic_order_cnt_lsb,
                if ph.ph_gdr_or_irap_pic_flag { " IRAP/GDR" } else { "" }
            ),
            VvcPayload::Slice(h) => format!(
                "{} addr={} ctus={} POC={}{}",
                h.slice_type.as_str(),
                h.sh_slice_address,
                h.num_ctus_in_slice,
                h.poc.pic_order_cnt_val,
                if h.picture_header.is_some() { " +ph" } else { "" }
            ),
            VvcPayload::Other => format!(
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
