//! HEVC 视频参数集 (video_parameter_set_rbsp, 7.3.2.1).

use log::debug;
use nalscope_core::{ParameterSet, ParseError, ParseResult, Rational, ReadOptions, SyntaxReader};

use super::hrd::HrdParameters;
use super::ptl::ProfileTierLevel;
use super::vps_extension::{ExtensionContext, VpsExtension};
use crate::avc::sps::read_trailing_bits;

/// nuh_layer_id 取值个数, 层依赖图数组的上限
pub const MAX_LAYERS: usize = 64;

/// 固定容量的 nuh_layer_id 列表
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct LayerIdList {
    ids: [u8; MAX_LAYERS],
    len: usize,
}

impl LayerIdList {
    pub const fn new() -> Self {
        Self {
            ids: [0; MAX_LAYERS],
            len: 0,
        }
    }

    /// 追加一个 nuh_layer_id, 超出 64 项或取值越界时报错
    pub fn push(&mut self, layer_id: u32, name: &str) -> ParseResult<()> {
        if layer_id >= MAX_LAYERS as u32 {
            return Err(ParseError::constraint(format!(
                "HEVC: {name} 中的 nuh_layer_id 超出范围, value={layer_id}"
            )));
        }
        if self.len == MAX_LAYERS {
            return Err(ParseError::constraint(format!(
                "HEVC: {name} 超过 {MAX_LAYERS} 项"
            )));
        }
        self.ids[self.len] = layer_id as u8;
        self.len += 1;
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.ids[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, layer_id: u8) -> bool {
        self.as_slice().contains(&layer_id)
    }

    pub fn max(&self) -> Option<u8> {
        self.as_slice().iter().copied().max()
    }
}

impl Default for LayerIdList {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LayerIdList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

/// 一个子层的 DPB 排序信息, VPS 与 SPS 共用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubLayerOrdering {
    pub max_dec_pic_buffering_minus1: u32,
    pub max_num_reorder_pics: u32,
    pub max_latency_increase_plus1: u32,
}

/// 读取 `{prefix}_max_dec_pic_buffering_minus1[i]` 等字段
///
/// `info_present_flag` 为 0 时只读取最高子层, 较低子层沿用其值.
/// 返回长度为 `max_sub_layers_minus1 + 1`.
pub(crate) fn parse_sub_layer_ordering(
    r: &mut SyntaxReader<'_>,
    prefix: &str,
    info_present_flag: bool,
    max_sub_layers_minus1: u32,
) -> ParseResult<Vec<SubLayerOrdering>> {
    let first = if info_present_flag { 0 } else { max_sub_layers_minus1 };
    let mut coded: Vec<SubLayerOrdering> = Vec::with_capacity(max_sub_layers_minus1 as usize + 1);
    for i in first..=max_sub_layers_minus1 {
        let ordering = SubLayerOrdering {
            max_dec_pic_buffering_minus1: r.read_ue(
                &format!("{prefix}_max_dec_pic_buffering_minus1[{i}]"),
                ReadOptions::new().check_range(0, 15),
            )?,
            max_num_reorder_pics: r.ue(&format!("{prefix}_max_num_reorder_pics[{i}]"))?,
            max_latency_increase_plus1: r.ue(&format!("{prefix}_max_latency_increase_plus1[{i}]"))?,
        };
        if ordering.max_num_reorder_pics > ordering.max_dec_pic_buffering_minus1 {
            return Err(ParseError::constraint(format!(
                "HEVC: {prefix}_max_num_reorder_pics[{i}] 应不大于 {prefix}_max_dec_pic_buffering_minus1[{i}], reorder={}, dec_pic_buffering_minus1={}",
                ordering.max_num_reorder_pics, ordering.max_dec_pic_buffering_minus1
            )));
        }
        if let Some(prev) = coded.last().copied()
            && (ordering.max_dec_pic_buffering_minus1 < prev.max_dec_pic_buffering_minus1
                || ordering.max_num_reorder_pics < prev.max_num_reorder_pics)
        {
            return Err(ParseError::constraint(format!(
                "HEVC: {prefix} 子层 {i} 的 DPB 参数不应小于子层 {}",
                i - 1
            )));
        }
        coded.push(ordering);
    }

    // 未出现的较低子层推断为最高子层的值
    let Some(&highest) = coded.last() else {
        return Ok(coded);
    };
    let mut all = vec![highest; first as usize];
    all.extend(coded);
    Ok(all)
}

/// vps_timing_info_present_flag 为 1 时的字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpsTiming {
    pub num_units_in_tick: u32,
    pub time_scale: u32,
    pub num_ticks_poc_diff_one_minus1: Option<u32>,
    /// time_scale / num_units_in_tick, 已约分
    pub frame_rate: Rational,
    /// (hrd_layer_set_idx, cprms_present_flag, hrd_parameters)
    pub hrd: Vec<VpsHrd>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpsHrd {
    pub hrd_layer_set_idx: u32,
    pub cprms_present_flag: bool,
    pub parameters: HrdParameters,
}

/// 视频参数集
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vps {
    pub vps_video_parameter_set_id: u32,
    pub vps_base_layer_internal_flag: bool,
    pub vps_base_layer_available_flag: bool,
    pub vps_max_layers_minus1: u32,
    pub vps_max_sub_layers_minus1: u32,
    pub vps_temporal_id_nesting_flag: bool,
    pub profile_tier_level: ProfileTierLevel,
    pub vps_sub_layer_ordering_info_present_flag: bool,
    /// 已填满全部子层
    pub sub_layer_ordering: Vec<SubLayerOrdering>,
    pub vps_max_layer_id: u32,
    pub vps_num_layer_sets_minus1: u32,
    /// LayerSetLayerIdList, 层集合 0 固定为 [0]
    pub layer_sets: Vec<LayerIdList>,
    pub timing: Option<VpsTiming>,
    pub extension: Option<Box<VpsExtension>>,
}

impl ParameterSet for Vps {
    const KIND: &'static str = "VPS";
}

impl Vps {
    pub fn parse(r: &mut SyntaxReader<'_>) -> ParseResult<Self> {
        r.sub_level("video_parameter_set_rbsp()", |r| {
            let vps_video_parameter_set_id = r.bits("vps_video_parameter_set_id", 4)?;
            let vps_base_layer_internal_flag = r.flag("vps_base_layer_internal_flag")?;
            let vps_base_layer_available_flag = r.flag("vps_base_layer_available_flag")?;
            let vps_max_layers_minus1 =
                r.read_bits("vps_max_layers_minus1", 6, ReadOptions::new().check_range(0, 62))?;
            let vps_max_sub_layers_minus1 =
                r.read_bits("vps_max_sub_layers_minus1", 3, ReadOptions::new().check_range(0, 6))?;
            let vps_temporal_id_nesting_flag = r.flag("vps_temporal_id_nesting_flag")?;
            if vps_max_sub_layers_minus1 == 0 && !vps_temporal_id_nesting_flag {
                return Err(ParseError::constraint(
                    "HEVC: vps_max_sub_layers_minus1=0 时 vps_temporal_id_nesting_flag 必须为 1",
                ));
            }
            r.read_bits(
                "vps_reserved_0xffff_16bits",
                16,
                ReadOptions::new().check_equal_to(0xFFFF),
            )?;

            let profile_tier_level = ProfileTierLevel::parse(r, true, vps_max_sub_layers_minus1)?;

            let vps_sub_layer_ordering_info_present_flag =
                r.flag("vps_sub_layer_ordering_info_present_flag")?;
            let sub_layer_ordering = parse_sub_layer_ordering(
                r,
                "vps",
                vps_sub_layer_ordering_info_present_flag,
                vps_max_sub_layers_minus1,
            )?;

            let vps_max_layer_id =
                r.read_bits("vps_max_layer_id", 6, ReadOptions::new().check_range(0, 62))?;
            let vps_num_layer_sets_minus1 = r.read_ue(
                "vps_num_layer_sets_minus1",
                ReadOptions::new().check_range(0, 1023),
            )?;

            let mut layer_sets = Vec::with_capacity(vps_num_layer_sets_minus1 as usize + 1);
            let mut base_set = LayerIdList::new();
            base_set.push(0, "LayerSetLayerIdList[0]")?;
            layer_sets.push(base_set);
            for i in 1..=vps_num_layer_sets_minus1 {
                let mut set = LayerIdList::new();
                for j in 0..=vps_max_layer_id {
                    if r.flag(&format!("layer_id_included_flag[{i}][{j}]"))? {
                        set.push(j, "LayerSetLayerIdList")?;
                    }
                }
                layer_sets.push(set);
            }

            let timing = if r.flag("vps_timing_info_present_flag")? {
                Some(parse_timing(
                    r,
                    vps_base_layer_internal_flag,
                    vps_max_sub_layers_minus1,
                    vps_num_layer_sets_minus1,
                )?)
            } else {
                None
            };

            let mut vps = Self {
                vps_video_parameter_set_id,
                vps_base_layer_internal_flag,
                vps_base_layer_available_flag,
                vps_max_layers_minus1,
                vps_max_sub_layers_minus1,
                vps_temporal_id_nesting_flag,
                profile_tier_level,
                vps_sub_layer_ordering_info_present_flag,
                sub_layer_ordering,
                vps_max_layer_id,
                vps_num_layer_sets_minus1,
                layer_sets,
                timing,
                extension: None,
            };

            if !r.flag("vps_extension_flag")? {
                read_trailing_bits(r)?;
                debug!(
                    "HEVC: VPS 解析完成, id={}, layer_sets={}",
                    vps.vps_video_parameter_set_id,
                    vps.layer_sets.len()
                );
                return Ok(vps);
            }

            while !r.byte_aligned() {
                r.read_flag(
                    "vps_extension_alignment_bit_equal_to_one",
                    ReadOptions::new().check_equal_to(1),
                )?;
            }
            let ctx = ExtensionContext {
                vps_base_layer_internal_flag,
                vps_max_layers_minus1,
                vps_max_sub_layers_minus1,
                vps_num_layer_sets_minus1,
                layer_sets: &vps.layer_sets,
                vps_num_hrd_parameters: vps.timing.as_ref().map_or(0, |t| t.hrd.len() as u32),
                last_hrd_common: vps
                    .timing
                    .as_ref()
                    .and_then(|t| t.hrd.last())
                    .map(|h| h.parameters.common),
            };
            vps.extension = Some(VpsExtension::parse(r, &ctx)?);

            if r.flag("vps_extension2_flag")? {
                while r.more_rbsp_data() {
                    r.flag("vps_extension_data_flag")?;
                }
            }
            read_trailing_bits(r)?;
            debug!(
                "HEVC: VPS 解析完成 (含扩展), id={}, max_layers_minus1={}",
                vps.vps_video_parameter_set_id, vps.vps_max_layers_minus1
            );
            Ok(vps)
        })
    }

    /// 帧率, 仅当 VPS 带 timing 信息时存在
    pub fn frame_rate(&self) -> Option<Rational> {
        self.timing.as_ref().map(|t| t.frame_rate)
    }
}

fn parse_timing(
    r: &mut SyntaxReader<'_>,
    vps_base_layer_internal_flag: bool,
    vps_max_sub_layers_minus1: u32,
    vps_num_layer_sets_minus1: u32,
) -> ParseResult<VpsTiming> {
    let num_units_in_tick =
        r.read_bits("vps_num_units_in_tick", 32, ReadOptions::new().check_greater(0))?;
    let time_scale = r.read_bits("vps_time_scale", 32, ReadOptions::new().check_greater(0))?;
    let frame_rate = Rational::new(u64::from(time_scale), u64::from(num_units_in_tick)).reduce();
    r.log_calculated("FrameRate", format!("{} ({:.3} fps)", frame_rate, frame_rate.to_f64()));

    let num_ticks_poc_diff_one_minus1 = if r.flag("vps_poc_proportional_to_timing_flag")? {
        Some(r.read_ue(
            "vps_num_ticks_poc_diff_one_minus1",
            ReadOptions::new().check_range(0, i64::from(u32::MAX) - 1),
        )?)
    } else {
        None
    };

    let num_hrd = r.read_ue(
        "vps_num_hrd_parameters",
        ReadOptions::new().check_range(0, i64::from(vps_num_layer_sets_minus1) + 1),
    )?;
    let min_set_idx = if vps_base_layer_internal_flag { 0 } else { 1 };
    let mut hrd: Vec<VpsHrd> = Vec::with_capacity(num_hrd as usize);
    for i in 0..num_hrd {
        let hrd_layer_set_idx = r.read_ue(
            &format!("hrd_layer_set_idx[{i}]"),
            ReadOptions::new().check_range(min_set_idx, i64::from(vps_num_layer_sets_minus1)),
        )?;
        let cprms_present_flag = i == 0 || r.flag(&format!("cprms_present_flag[{i}]"))?;
        let inherited = hrd.last().map(|h| h.parameters.common);
        let parameters = HrdParameters::parse(
            r,
            cprms_present_flag,
            vps_max_sub_layers_minus1,
            inherited.as_ref(),
        )?;
        hrd.push(VpsHrd {
            hrd_layer_set_idx,
            cprms_present_flag,
            parameters,
        });
    }

    Ok(VpsTiming {
        num_units_in_tick,
        time_scale,
        num_ticks_poc_diff_one_minus1,
        frame_rate,
        hrd,
    })
}
