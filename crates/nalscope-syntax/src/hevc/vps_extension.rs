//! HEVC 多层 VPS 扩展 vps_extension() (F.7.3.2.1.1).
//!
//! 层依赖图使用固定 64 项数组, 推导顺序:
//! 1. ScalabilityId 及 DepthLayerFlag / ViewOrderIdx / DependencyId / AuxId / NumViews (F-3)
//! 2. DependencyFlag 传递闭包 (F-4)
//! 3. IdDirectRefLayer / IdRefLayer / IdPredictedLayer (F-5)
//! 4. 独立层树划分 (F-6)
//! 5. 追加层集合 (F-9) 与 MaxSubLayersInLayerSetMinus1 (F-10)
//! 6. 每个输出层集合的 OutputLayerFlag 与 NecessaryLayerFlag (F-12, F-13)
//!
//! 推导结果供 dpb_size() 与 [`VpsVui`] 中的码流分区 HRD 使用.

use bitflags::bitflags;
use log::debug;
use nalscope_core::{ParseError, ParseResult, ReadOptions, SyntaxReader};

use super::hrd::HrdCommonInfo;
use super::ptl::ProfileTierLevel;
use super::sps::ConformanceWindow;
use super::vps::{LayerIdList, MAX_LAYERS};
use super::vps_vui::VpsVui;
use crate::avc::ceil_log2;

bitflags! {
    /// scalability_mask_flag[i] 对应第 i 位
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ScalabilityMask: u16 {
        /// 深度 (3D-HEVC)
        const DEPTH = 1 << 0;
        const MULTIVIEW = 1 << 1;
        /// 空域/质量可分级 (SHVC)
        const SPATIAL_QUALITY = 1 << 2;
        const AUXILIARY = 1 << 3;
    }
}

/// 解析 vps_extension() 需要的基础 VPS 字段
#[derive(Debug, Clone, Copy)]
pub(crate) struct ExtensionContext<'a> {
    pub vps_base_layer_internal_flag: bool,
    pub vps_max_layers_minus1: u32,
    pub vps_max_sub_layers_minus1: u32,
    pub vps_num_layer_sets_minus1: u32,
    /// 基础 VPS 中的 LayerSetLayerIdList
    pub layer_sets: &'a [LayerIdList],
    pub vps_num_hrd_parameters: u32,
    /// 基础 VPS 最后一个 hrd_parameters() 的公共字段
    pub last_hrd_common: Option<HrdCommonInfo>,
}

/// rep_format() (F.7.3.2.1.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepFormat {
    pub pic_width_vps_in_luma_samples: u32,
    pub pic_height_vps_in_luma_samples: u32,
    pub chroma_and_bit_depth_vps_present_flag: bool,
    /// 未出现时沿用前一个 rep_format()
    pub chroma_format_vps_idc: u32,
    pub separate_colour_plane_vps_flag: bool,
    pub bit_depth_vps_luma_minus8: u32,
    pub bit_depth_vps_chroma_minus8: u32,
    pub conformance_window: Option<ConformanceWindow>,
}

impl RepFormat {
    fn parse(r: &mut SyntaxReader<'_>, prev: Option<&RepFormat>) -> ParseResult<Self> {
        r.sub_level("rep_format()", |r| {
            let pic_width_vps_in_luma_samples = r.bits("pic_width_vps_in_luma_samples", 16)?;
            let pic_height_vps_in_luma_samples = r.bits("pic_height_vps_in_luma_samples", 16)?;
            let chroma_and_bit_depth_vps_present_flag =
                r.flag("chroma_and_bit_depth_vps_present_flag")?;

            let mut format = match (chroma_and_bit_depth_vps_present_flag, prev) {
                (true, _) => {
                    let chroma_format_vps_idc = r.bits("chroma_format_vps_idc", 2)?;
                    let separate_colour_plane_vps_flag = chroma_format_vps_idc == 3
                        && r.flag("separate_colour_plane_vps_flag")?;
                    Self {
                        pic_width_vps_in_luma_samples,
                        pic_height_vps_in_luma_samples,
                        chroma_and_bit_depth_vps_present_flag,
                        chroma_format_vps_idc,
                        separate_colour_plane_vps_flag,
                        bit_depth_vps_luma_minus8: r.read_bits(
                            "bit_depth_vps_luma_minus8",
                            4,
                            ReadOptions::new().check_range(0, 8),
                        )?,
                        bit_depth_vps_chroma_minus8: r.read_bits(
                            "bit_depth_vps_chroma_minus8",
                            4,
                            ReadOptions::new().check_range(0, 8),
                        )?,
                        conformance_window: None,
                    }
                }
                (false, Some(prev)) => Self {
                    pic_width_vps_in_luma_samples,
                    pic_height_vps_in_luma_samples,
                    chroma_and_bit_depth_vps_present_flag,
                    conformance_window: None,
                    ..*prev
                },
                (false, None) => {
                    return Err(ParseError::constraint(
                        "HEVC: 首个 rep_format() 的 chroma_and_bit_depth_vps_present_flag 必须为 1",
                    ));
                }
            };

            if r.flag("conformance_window_vps_flag")? {
                format.conformance_window = Some(ConformanceWindow {
                    left_offset: r.ue("conf_win_vps_left_offset")?,
                    right_offset: r.ue("conf_win_vps_right_offset")?,
                    top_offset: r.ue("conf_win_vps_top_offset")?,
                    bottom_offset: r.ue("conf_win_vps_bottom_offset")?,
                });
            }
            Ok(format)
        })
    }
}

/// vps_extension 中 profile_tier_level() 列表的一项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpsPtlEntry {
    /// 在 profile_tier_level 列表中的下标
    pub index: u32,
    pub profile_present_flag: bool,
    pub ptl: ProfileTierLevel,
}

/// dpb_size() 中一个子层的信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubLayerDpbInfo {
    /// sub_layer_dpb_info_present_flag, 为 0 时其余字段沿用前一子层
    pub present: bool,
    /// 按层集合内下标; 非必需层 (或外部基础层) 为 `None`
    pub max_vps_dec_pic_buffering_minus1: Vec<Option<u32>>,
    pub max_vps_num_reorder_pics: u32,
    pub max_vps_latency_increase_plus1: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OlsDpbSize {
    pub sub_layer_flag_info_present_flag: bool,
    pub sub_layers: Vec<SubLayerDpbInfo>,
}

/// 一个输出层集合 (OLS)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayerSet {
    /// OlsIdxToLsIdx
    pub layer_set_idx: usize,
    /// OutputLayerFlag, 按层集合内下标
    pub output_layer_flag: Vec<bool>,
    pub necessary_layer_flag: Vec<bool>,
    pub num_output_layers: usize,
    pub num_necessary_layers: usize,
    /// OlsHighestOutputLayerId
    pub highest_output_layer_id: Option<u8>,
    pub profile_tier_level_idx: Vec<Option<u32>>,
    pub alt_output_layer_flag: bool,
    /// OLS 0 没有 dpb_size 信息
    pub dpb_size: Option<OlsDpbSize>,
}

impl OutputLayerSet {
    fn new(layer_set_idx: usize, output_layer_flag: Vec<bool>) -> Self {
        let n = output_layer_flag.len();
        Self {
            layer_set_idx,
            necessary_layer_flag: vec![false; n],
            num_output_layers: 0,
            num_necessary_layers: 0,
            highest_output_layer_id: None,
            profile_tier_level_idx: vec![None; n],
            alt_output_layer_flag: false,
            dpb_size: None,
            output_layer_flag,
        }
    }
}

/// vps_extension()
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpsExtension {
    /// vps_max_layers_minus1 > 0 且基础层在码流内时的 profile_tier_level(0, ...)
    pub base_layer_ptl: Option<ProfileTierLevel>,
    pub splitting_flag: bool,
    pub scalability_mask: ScalabilityMask,
    pub num_scalability_types: usize,
    /// 含 splitting_flag=1 时推断的最后一项
    pub dimension_id_len_minus1: Vec<u32>,
    pub vps_nuh_layer_id_present_flag: bool,
    /// Min(62, vps_max_layers_minus1)
    pub max_layers_minus1: usize,
    /// 按层下标
    pub layer_id_in_nuh: [u8; MAX_LAYERS],
    /// 按 nuh_layer_id
    pub layer_idx_in_vps: [Option<u8>; MAX_LAYERS],
    /// ScalabilityId[i][smIdx], 按层下标
    pub scalability_id: [[u8; 16]; MAX_LAYERS],
    /// 以下四项按 nuh_layer_id
    pub depth_layer_flag: [bool; MAX_LAYERS],
    pub view_order_idx: [u8; MAX_LAYERS],
    pub dependency_id: [u8; MAX_LAYERS],
    pub aux_id: [u8; MAX_LAYERS],
    pub num_views: u32,
    pub view_id_len: u32,
    pub view_id_val: Vec<u32>,
    /// direct_dependency_flag[i][j], 按层下标
    pub direct_dependency_flag: [[bool; MAX_LAYERS]; MAX_LAYERS],
    /// DependencyFlag[i][j], 按层下标
    pub dependency_flag: [[bool; MAX_LAYERS]; MAX_LAYERS],
    /// 以下三项按 nuh_layer_id, 列表长度即 NumDirectRefLayers 等计数
    pub id_direct_ref_layer: [LayerIdList; MAX_LAYERS],
    pub id_ref_layer: [LayerIdList; MAX_LAYERS],
    pub id_predicted_layer: [LayerIdList; MAX_LAYERS],
    /// TreePartitionLayerIdList, 长度为 NumIndependentLayers
    pub tree_partitions: Vec<LayerIdList>,
    pub num_add_layer_sets: u32,
    pub highest_layer_idx_plus1: Vec<Vec<u32>>,
    /// 全部 NumLayerSets 个层集合 (基础 VPS 的在前)
    pub layer_sets: Vec<LayerIdList>,
    /// 按层下标, 未出现时推断为 vps_max_sub_layers_minus1
    pub sub_layers_vps_max_minus1: [u8; MAX_LAYERS],
    pub max_sub_layers_in_layer_set_minus1: Vec<u32>,
    /// [i][j], 默认 7
    pub max_tid_il_ref_pics_plus1: [[u8; MAX_LAYERS]; MAX_LAYERS],
    pub default_ref_layers_active_flag: bool,
    pub vps_num_profile_tier_level_minus1: u32,
    pub profile_tier_levels: Vec<VpsPtlEntry>,
    pub num_add_olss: u32,
    pub default_output_layer_idc: u32,
    pub output_layer_sets: Vec<OutputLayerSet>,
    pub rep_formats: Vec<RepFormat>,
    pub rep_format_idx_present_flag: bool,
    /// 按层下标
    pub vps_rep_format_idx: Vec<u32>,
    pub max_one_active_ref_layer_flag: bool,
    pub vps_poc_lsb_aligned_flag: bool,
    pub poc_lsb_not_present_flag: [bool; MAX_LAYERS],
    pub direct_dep_type_len_minus2: u32,
    pub direct_dependency_all_layers_type: Option<u32>,
    pub direct_dependency_type: [[u32; MAX_LAYERS]; MAX_LAYERS],
    pub vps_non_vui_extension_length: u32,
    pub vps_vui_present_flag: bool,
    pub vps_vui: Option<VpsVui>,
}

impl VpsExtension {
    fn empty() -> Self {
        Self {
            base_layer_ptl: None,
            splitting_flag: false,
            scalability_mask: ScalabilityMask::empty(),
            num_scalability_types: 0,
            dimension_id_len_minus1: Vec::new(),
            vps_nuh_layer_id_present_flag: false,
            max_layers_minus1: 0,
            layer_id_in_nuh: [0; MAX_LAYERS],
            layer_idx_in_vps: [None; MAX_LAYERS],
            scalability_id: [[0; 16]; MAX_LAYERS],
            depth_layer_flag: [false; MAX_LAYERS],
            view_order_idx: [0; MAX_LAYERS],
            dependency_id: [0; MAX_LAYERS],
            aux_id: [0; MAX_LAYERS],
            num_views: 1,
            view_id_len: 0,
            view_id_val: Vec::new(),
            direct_dependency_flag: [[false; MAX_LAYERS]; MAX_LAYERS],
            dependency_flag: [[false; MAX_LAYERS]; MAX_LAYERS],
            id_direct_ref_layer: [LayerIdList::new(); MAX_LAYERS],
            id_ref_layer: [LayerIdList::new(); MAX_LAYERS],
            id_predicted_layer: [LayerIdList::new(); MAX_LAYERS],
            tree_partitions: Vec::new(),
            num_add_layer_sets: 0,
            highest_layer_idx_plus1: Vec::new(),
            layer_sets: Vec::new(),
            sub_layers_vps_max_minus1: [0; MAX_LAYERS],
            max_sub_layers_in_layer_set_minus1: Vec::new(),
            max_tid_il_ref_pics_plus1: [[7; MAX_LAYERS]; MAX_LAYERS],
            default_ref_layers_active_flag: false,
            vps_num_profile_tier_level_minus1: 0,
            profile_tier_levels: Vec::new(),
            num_add_olss: 0,
            default_output_layer_idc: 0,
            output_layer_sets: Vec::new(),
            rep_formats: Vec::new(),
            rep_format_idx_present_flag: false,
            vps_rep_format_idx: Vec::new(),
            max_one_active_ref_layer_flag: false,
            vps_poc_lsb_aligned_flag: false,
            poc_lsb_not_present_flag: [false; MAX_LAYERS],
            direct_dep_type_len_minus2: 0,
            direct_dependency_all_layers_type: None,
            direct_dependency_type: [[0; MAX_LAYERS]; MAX_LAYERS],
            vps_non_vui_extension_length: 0,
            vps_vui_present_flag: false,
            vps_vui: None,
        }
    }

    /// NumDirectRefLayers[nuh_layer_id]
    pub fn num_direct_ref_layers(&self, nuh_layer_id: u8) -> usize {
        self.id_direct_ref_layer
            .get(usize::from(nuh_layer_id))
            .map_or(0, LayerIdList::len)
    }

    pub fn num_independent_layers(&self) -> usize {
        self.tree_partitions.len()
    }

    pub fn num_layer_sets(&self) -> usize {
        self.layer_sets.len()
    }

    pub fn num_output_layer_sets(&self) -> usize {
        self.output_layer_sets.len()
    }

    /// 两个 nuh_layer_id 之间是否存在 (直接或间接) 依赖
    pub fn depends_on(&self, layer_id: u8, ref_layer_id: u8) -> bool {
        match (self.layer_idx(layer_id), self.layer_idx(ref_layer_id)) {
            (Some(i), Some(j)) => self.dependency_flag[i][j],
            _ => false,
        }
    }

    /// LayerIdxInVps[nuh_layer_id]
    pub(crate) fn layer_idx(&self, nuh_layer_id: u8) -> Option<usize> {
        self.layer_idx_in_vps
            .get(usize::from(nuh_layer_id))
            .copied()
            .flatten()
            .map(usize::from)
    }

    pub(crate) fn parse(
        r: &mut SyntaxReader<'_>,
        ctx: &ExtensionContext<'_>,
    ) -> ParseResult<Box<Self>> {
        r.sub_level("vps_extension()", |r| {
            let mut ext = Box::new(Self::empty());
            ext.parse_layers(r, ctx)?;
            ext.parse_dependencies(r)?;
            ext.parse_layer_sets(r, ctx)?;
            ext.parse_profile_tier_levels(r, ctx)?;
            ext.parse_output_layer_sets(r, ctx)?;
            ext.parse_rep_formats(r, ctx)?;
            ext.parse_dpb_size(r, ctx)?;
            ext.parse_dependency_types(r, ctx)?;

            ext.vps_non_vui_extension_length = r.read_ue(
                "vps_non_vui_extension_length",
                ReadOptions::new().check_range(0, 4096),
            )?;
            if ext.vps_non_vui_extension_length > 0 {
                r.skip(
                    "vps_non_vui_extension_data_byte",
                    ext.vps_non_vui_extension_length as usize * 8,
                )?;
            }
            ext.vps_vui_present_flag = r.flag("vps_vui_present_flag")?;
            if ext.vps_vui_present_flag {
                while !r.byte_aligned() {
                    r.read_flag(
                        "vps_vui_alignment_bit_equal_to_one",
                        ReadOptions::new().check_equal_to(1),
                    )?;
                }
                ext.vps_vui = Some(VpsVui::parse(r, &ext, ctx)?);
            }

            debug!(
                "HEVC: VPS 扩展解析完成, layers={}, independent={}, layer_sets={}, ols={}",
                ext.max_layers_minus1 + 1,
                ext.num_independent_layers(),
                ext.num_layer_sets(),
                ext.num_output_layer_sets()
            );
            Ok(ext)
        })
    }

    /// 层标识、可分级维度与 F-3 推导
    fn parse_layers(&mut self, r: &mut SyntaxReader<'_>, ctx: &ExtensionContext<'_>) -> ParseResult<()> {
        if ctx.vps_max_layers_minus1 > 0 && ctx.vps_base_layer_internal_flag {
            self.base_layer_ptl = Some(ProfileTierLevel::parse(
                r,
                false,
                ctx.vps_max_sub_layers_minus1,
            )?);
        }
        self.splitting_flag = r.flag("splitting_flag")?;

        let mut mask = 0u16;
        for i in 0..16 {
            if r.flag(&format!("scalability_mask_flag[{i}]"))? {
                mask |= 1 << i;
            }
        }
        self.scalability_mask = ScalabilityMask::from_bits_retain(mask);
        self.num_scalability_types = mask.count_ones() as usize;
        r.log_calculated("NumScalabilityTypes", self.num_scalability_types);

        let coded_lens = self
            .num_scalability_types
            .saturating_sub(usize::from(self.splitting_flag));
        for j in 0..coded_lens {
            let len = r.bits(&format!("dimension_id_len_minus1[{j}]"), 3)?;
            self.dimension_id_len_minus1.push(len);
        }
        if self.splitting_flag && self.num_scalability_types > 0 {
            let offset: u32 = self.dimension_id_len_minus1.iter().map(|l| l + 1).sum();
            if offset > 5 {
                return Err(ParseError::constraint(format!(
                    "HEVC: splitting_flag=1 时 dimension_id 总位宽超出 nuh_layer_id, dimBitOffset={offset}"
                )));
            }
            let last = 5 - offset;
            r.log_calculated(
                &format!("dimension_id_len_minus1[{}]", self.num_scalability_types - 1),
                last,
            );
            self.dimension_id_len_minus1.push(last);
        }

        self.vps_nuh_layer_id_present_flag = r.flag("vps_nuh_layer_id_present_flag")?;
        self.max_layers_minus1 = ctx.vps_max_layers_minus1.min(62) as usize;
        r.log_calculated("MaxLayersMinus1", self.max_layers_minus1);

        let mut dimension_id = [[0u8; 16]; MAX_LAYERS];
        self.layer_idx_in_vps[0] = Some(0);
        for i in 1..=self.max_layers_minus1 {
            let layer_id = if self.vps_nuh_layer_id_present_flag {
                let prev = i64::from(self.layer_id_in_nuh[i - 1]);
                r.read_bits(
                    &format!("layer_id_in_nuh[{i}]"),
                    6,
                    ReadOptions::new().check_greater(prev),
                )?
            } else {
                i as u32
            };
            self.layer_id_in_nuh[i] = layer_id as u8;
            self.layer_idx_in_vps[layer_id as usize] = Some(i as u8);

            if self.splitting_flag {
                let mut offset = 0;
                for j in 0..self.num_scalability_types {
                    let len = self.dimension_id_len_minus1[j] + 1;
                    dimension_id[i][j] = ((layer_id >> offset) & ((1 << len) - 1)) as u8;
                    offset += len;
                }
            } else {
                for j in 0..self.num_scalability_types {
                    let len = self.dimension_id_len_minus1[j] + 1;
                    dimension_id[i][j] = r.bits(&format!("dimension_id[{i}][{j}]"), len)? as u8;
                }
            }
        }

        self.derive_scalability_ids(&dimension_id);
        r.log_calculated("NumViews", self.num_views);

        self.view_id_len = r.bits("view_id_len", 4)?;
        if self.view_id_len > 0 {
            for i in 0..self.num_views {
                let v = r.bits(&format!("view_id_val[{i}]"), self.view_id_len)?;
                self.view_id_val.push(v);
            }
        }
        Ok(())
    }

    /// F-3
    fn derive_scalability_ids(&mut self, dimension_id: &[[u8; 16]; MAX_LAYERS]) {
        self.num_views = 1;
        for i in 0..=self.max_layers_minus1 {
            let lid = usize::from(self.layer_id_in_nuh[i]);
            let mut j = 0;
            for sm_idx in 0..16 {
                if self.scalability_mask.bits() & (1 << sm_idx) != 0 {
                    self.scalability_id[i][sm_idx] = dimension_id[i][j];
                    j += 1;
                }
            }
            self.depth_layer_flag[lid] = self.scalability_id[i][0] != 0;
            self.view_order_idx[lid] = self.scalability_id[i][1];
            self.dependency_id[lid] = self.scalability_id[i][2];
            self.aux_id[lid] = self.scalability_id[i][3];

            if i > 0 {
                let new_view = (0..i).all(|k| {
                    self.view_order_idx[usize::from(self.layer_id_in_nuh[k])]
                        != self.view_order_idx[lid]
                });
                if new_view {
                    self.num_views += 1;
                }
            }
        }
    }

    /// direct_dependency_flag 及 F-4, F-5, F-6
    fn parse_dependencies(&mut self, r: &mut SyntaxReader<'_>) -> ParseResult<()> {
        let max = self.max_layers_minus1;
        for i in 1..=max {
            for j in 0..i {
                self.direct_dependency_flag[i][j] =
                    r.flag(&format!("direct_dependency_flag[{i}][{j}]"))?;
            }
        }

        for i in 0..=max {
            for j in 0..=max {
                let mut flag = self.direct_dependency_flag[i][j];
                for k in 0..i {
                    if self.direct_dependency_flag[i][k] && self.dependency_flag[k][j] {
                        flag = true;
                    }
                }
                self.dependency_flag[i][j] = flag;
            }
        }

        for i in 0..=max {
            let i_nuh = usize::from(self.layer_id_in_nuh[i]);
            for j in 0..=max {
                let j_nuh = u32::from(self.layer_id_in_nuh[j]);
                if self.direct_dependency_flag[i][j] {
                    self.id_direct_ref_layer[i_nuh].push(j_nuh, "IdDirectRefLayer")?;
                }
                if self.dependency_flag[i][j] {
                    self.id_ref_layer[i_nuh].push(j_nuh, "IdRefLayer")?;
                }
                if self.dependency_flag[j][i] {
                    self.id_predicted_layer[i_nuh].push(j_nuh, "IdPredictedLayer")?;
                }
            }
        }

        let mut in_list = [false; MAX_LAYERS];
        for i in 0..=max {
            let i_nuh = self.layer_id_in_nuh[i];
            if self.num_direct_ref_layers(i_nuh) != 0 {
                continue;
            }
            let mut tree = LayerIdList::new();
            tree.push(u32::from(i_nuh), "TreePartitionLayerIdList")?;
            for &pred in self.id_predicted_layer[usize::from(i_nuh)].as_slice() {
                if !in_list[usize::from(pred)] {
                    tree.push(u32::from(pred), "TreePartitionLayerIdList")?;
                    in_list[usize::from(pred)] = true;
                }
            }
            self.tree_partitions.push(tree);
        }
        r.log_calculated("NumIndependentLayers", self.num_independent_layers());
        Ok(())
    }

    /// 追加层集合 (F-9)、子层数 (F-10) 与 max_tid_il_ref_pics_plus1
    fn parse_layer_sets(&mut self, r: &mut SyntaxReader<'_>, ctx: &ExtensionContext<'_>) -> ParseResult<()> {
        self.layer_sets = ctx.layer_sets.to_vec();
        let num_independent = self.num_independent_layers();
        if num_independent > 1 {
            self.num_add_layer_sets =
                r.read_ue("num_add_layer_sets", ReadOptions::new().check_range(0, 1023))?;
        }
        for i in 0..self.num_add_layer_sets {
            let mut highest = Vec::with_capacity(num_independent.saturating_sub(1));
            let mut list = LayerIdList::new();
            for j in 1..num_independent {
                let tree = self.tree_partitions[j];
                let width = ceil_log2(tree.len() as u32 + 1);
                let v = r.read_bits(
                    &format!("highest_layer_idx_plus1[{i}][{j}]"),
                    width,
                    ReadOptions::new().check_range(0, tree.len() as i64),
                )?;
                for &id in &tree.as_slice()[..v as usize] {
                    list.push(u32::from(id), "LayerSetLayerIdList")?;
                }
                highest.push(v);
            }
            self.highest_layer_idx_plus1.push(highest);
            self.layer_sets.push(list);
        }
        r.log_calculated("NumLayerSets", self.num_layer_sets());

        let max_sub = ctx.vps_max_sub_layers_minus1;
        if r.flag("vps_sub_layers_max_minus1_present_flag")? {
            for i in 0..=self.max_layers_minus1 {
                self.sub_layers_vps_max_minus1[i] = r.read_bits(
                    &format!("sub_layers_vps_max_minus1[{i}]"),
                    3,
                    ReadOptions::new().check_range(0, i64::from(max_sub)),
                )? as u8;
            }
        } else {
            for i in 0..=self.max_layers_minus1 {
                self.sub_layers_vps_max_minus1[i] = max_sub as u8;
            }
        }
        self.max_sub_layers_in_layer_set_minus1 = self
            .layer_sets
            .iter()
            .map(|set| {
                set.as_slice()
                    .iter()
                    .filter_map(|&lid| self.layer_idx(lid))
                    .map(|idx| u32::from(self.sub_layers_vps_max_minus1[idx]))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        if r.flag("max_tid_ref_present_flag")? {
            for i in 0..self.max_layers_minus1 {
                for j in (i + 1)..=self.max_layers_minus1 {
                    if self.direct_dependency_flag[j][i] {
                        self.max_tid_il_ref_pics_plus1[i][j] =
                            r.bits(&format!("max_tid_il_ref_pics_plus1[{i}][{j}]"), 3)? as u8;
                    }
                }
            }
        }
        self.default_ref_layers_active_flag = r.flag("default_ref_layers_active_flag")?;
        Ok(())
    }

    fn parse_profile_tier_levels(
        &mut self,
        r: &mut SyntaxReader<'_>,
        ctx: &ExtensionContext<'_>,
    ) -> ParseResult<()> {
        self.vps_num_profile_tier_level_minus1 = r.read_ue(
            "vps_num_profile_tier_level_minus1",
            ReadOptions::new().check_range(0, 63),
        )?;
        let start = if ctx.vps_base_layer_internal_flag { 2 } else { 1 };
        for i in start..=self.vps_num_profile_tier_level_minus1 {
            let profile_present_flag = r.flag(&format!("vps_profile_present_flag[{i}]"))?;
            let ptl = ProfileTierLevel::parse(r, profile_present_flag, ctx.vps_max_sub_layers_minus1)?;
            self.profile_tier_levels.push(VpsPtlEntry {
                index: i,
                profile_present_flag,
                ptl,
            });
        }
        Ok(())
    }

    /// 输出层集合, 含 F-11, F-12, F-13
    fn parse_output_layer_sets(
        &mut self,
        r: &mut SyntaxReader<'_>,
        ctx: &ExtensionContext<'_>,
    ) -> ParseResult<()> {
        let num_layer_sets = self.num_layer_sets();
        if num_layer_sets > 1 {
            self.num_add_olss = r.read_ue("num_add_olss", ReadOptions::new().check_range(0, 1023))?;
            self.default_output_layer_idc = r.read_bits(
                "default_output_layer_idc",
                2,
                ReadOptions::new().check_range(0, 2),
            )?;
        }

        // OLS 0 只包含基础层且基础层为输出层
        let base_len = self.layer_sets.first().map_or(1, LayerIdList::len);
        let mut ols0 = OutputLayerSet::new(0, vec![true; base_len]);
        self.derive_output_counts(&mut ols0);
        self.output_layer_sets.push(ols0);

        let num_ols = num_layer_sets + self.num_add_olss as usize;
        for i in 1..num_ols {
            let layer_set_idx = if i < num_layer_sets {
                i
            } else if num_layer_sets > 2 {
                let width = ceil_log2(num_layer_sets as u32 - 1);
                r.read_bits(
                    &format!("layer_set_idx_for_ols_minus1[{i}]"),
                    width,
                    ReadOptions::new().check_range(0, num_layer_sets as i64 - 2),
                )? as usize
                    + 1
            } else {
                1
            };
            let list = self.layer_sets[layer_set_idx];

            let explicit = i > ctx.vps_num_layer_sets_minus1 as usize
                || self.default_output_layer_idc == 2;
            let output_layer_flag = if explicit {
                (0..list.len())
                    .map(|j| r.flag(&format!("output_layer_flag[{i}][{j}]")))
                    .collect::<ParseResult<Vec<_>>>()?
            } else if self.default_output_layer_idc == 0 {
                vec![true; list.len()]
            } else {
                let highest = list.max();
                list.as_slice().iter().map(|&id| Some(id) == highest).collect()
            };

            let mut ols = OutputLayerSet::new(layer_set_idx, output_layer_flag);
            self.derive_output_counts(&mut ols);

            if self.vps_num_profile_tier_level_minus1 > 0 {
                let width = ceil_log2(self.vps_num_profile_tier_level_minus1 + 1);
                for j in 0..list.len() {
                    if ols.necessary_layer_flag[j] {
                        ols.profile_tier_level_idx[j] = Some(r.read_bits(
                            &format!("profile_tier_level_idx[{i}][{j}]"),
                            width,
                            ReadOptions::new()
                                .check_range(0, i64::from(self.vps_num_profile_tier_level_minus1)),
                        )?);
                    }
                }
            }

            if ols.num_output_layers == 1
                && let Some(highest) = ols.highest_output_layer_id
                && self.num_direct_ref_layers(highest) > 0
            {
                ols.alt_output_layer_flag = r.flag(&format!("alt_output_layer_flag[{i}]"))?;
            }
            self.output_layer_sets.push(ols);
        }
        r.log_calculated("NumOutputLayerSets", self.num_output_layer_sets());
        Ok(())
    }

    /// F-12 与 F-13
    fn derive_output_counts(&self, ols: &mut OutputLayerSet) {
        let Some(list) = self.layer_sets.get(ols.layer_set_idx) else {
            return;
        };
        let ids = list.as_slice();
        ols.num_output_layers = 0;
        ols.highest_output_layer_id = None;
        for (j, &output) in ols.output_layer_flag.iter().enumerate() {
            if output {
                ols.num_output_layers += 1;
                ols.highest_output_layer_id = Some(ids[j]);
            }
        }

        ols.necessary_layer_flag.iter_mut().for_each(|f| *f = false);
        for k in 0..ids.len() {
            if !ols.output_layer_flag[k] {
                continue;
            }
            ols.necessary_layer_flag[k] = true;
            for ref_idx in 0..k {
                if self.depends_on(ids[k], ids[ref_idx]) {
                    ols.necessary_layer_flag[ref_idx] = true;
                }
            }
        }
        ols.num_necessary_layers = ols.necessary_layer_flag.iter().filter(|f| **f).count();
    }

    fn parse_rep_formats(&mut self, r: &mut SyntaxReader<'_>, ctx: &ExtensionContext<'_>) -> ParseResult<()> {
        let n = r.read_ue(
            "vps_num_rep_formats_minus1",
            ReadOptions::new().check_range(0, 255),
        )?;
        for _ in 0..=n {
            let format = RepFormat::parse(r, self.rep_formats.last())?;
            self.rep_formats.push(format);
        }
        if n > 0 {
            self.rep_format_idx_present_flag = r.flag("rep_format_idx_present_flag")?;
        }

        let first = if ctx.vps_base_layer_internal_flag { 1 } else { 0 };
        let width = ceil_log2(n + 1);
        for i in 0..=self.max_layers_minus1 {
            let idx = if self.rep_format_idx_present_flag && i >= first {
                r.read_bits(
                    &format!("vps_rep_format_idx[{i}]"),
                    width,
                    ReadOptions::new().check_range(0, i64::from(n)),
                )?
            } else {
                (i as u32).min(n)
            };
            self.vps_rep_format_idx.push(idx);
        }

        self.max_one_active_ref_layer_flag = r.flag("max_one_active_ref_layer_flag")?;
        self.vps_poc_lsb_aligned_flag = r.flag("vps_poc_lsb_aligned_flag")?;
        for i in 1..=self.max_layers_minus1 {
            if self.num_direct_ref_layers(self.layer_id_in_nuh[i]) == 0 {
                self.poc_lsb_not_present_flag[i] =
                    r.flag(&format!("poc_lsb_not_present_flag[{i}]"))?;
            }
        }
        Ok(())
    }

    /// dpb_size() (F.7.3.2.1.3)
    fn parse_dpb_size(&mut self, r: &mut SyntaxReader<'_>, ctx: &ExtensionContext<'_>) -> ParseResult<()> {
        r.sub_level("dpb_size()", |r| {
            for i in 1..self.output_layer_sets.len() {
                let ls_idx = self.output_layer_sets[i].layer_set_idx;
                let ids = self.layer_sets[ls_idx];
                let max_sub = self.max_sub_layers_in_layer_set_minus1[ls_idx];
                let flag_info = r.flag(&format!("sub_layer_flag_info_present_flag[{i}]"))?;

                let mut sub_layers: Vec<SubLayerDpbInfo> = Vec::with_capacity(max_sub as usize + 1);
                for j in 0..=max_sub {
                    let present = if j == 0 {
                        true
                    } else if flag_info {
                        r.flag(&format!("sub_layer_dpb_info_present_flag[{i}][{j}]"))?
                    } else {
                        false
                    };
                    if !present && let Some(prev) = sub_layers.last() {
                        let mut inferred = prev.clone();
                        inferred.present = false;
                        sub_layers.push(inferred);
                        continue;
                    }

                    let necessary = &self.output_layer_sets[i].necessary_layer_flag;
                    let mut dec_pic_buffering = Vec::with_capacity(ids.len());
                    for (k, &layer_id) in ids.as_slice().iter().enumerate() {
                        let coded = necessary[k] && (ctx.vps_base_layer_internal_flag || layer_id != 0);
                        dec_pic_buffering.push(if coded {
                            Some(r.ue(&format!("max_vps_dec_pic_buffering_minus1[{i}][{k}][{j}]"))?)
                        } else {
                            None
                        });
                    }
                    sub_layers.push(SubLayerDpbInfo {
                        present: true,
                        max_vps_dec_pic_buffering_minus1: dec_pic_buffering,
                        max_vps_num_reorder_pics: r.ue(&format!("max_vps_num_reorder_pics[{i}][{j}]"))?,
                        max_vps_latency_increase_plus1: r
                            .ue(&format!("max_vps_latency_increase_plus1[{i}][{j}]"))?,
                    });
                }

                self.output_layer_sets[i].dpb_size = Some(OlsDpbSize {
                    sub_layer_flag_info_present_flag: flag_info,
                    sub_layers,
                });
            }
            Ok(())
        })
    }

    fn parse_dependency_types(
        &mut self,
        r: &mut SyntaxReader<'_>,
        ctx: &ExtensionContext<'_>,
    ) -> ParseResult<()> {
        self.direct_dep_type_len_minus2 = r.read_ue(
            "direct_dep_type_len_minus2",
            ReadOptions::new().check_range(0, 30),
        )?;
        let width = self.direct_dep_type_len_minus2 + 2;
        let max = self.max_layers_minus1;
        if r.flag("direct_dependency_all_layers_flag")? {
            let all = r.bits("direct_dependency_all_layers_type", width)?;
            self.direct_dependency_all_layers_type = Some(all);
            for i in 1..=max {
                for j in 0..i {
                    if self.direct_dependency_flag[i][j] {
                        self.direct_dependency_type[i][j] = all;
                    }
                }
            }
        } else {
            let (first_i, first_j) = if ctx.vps_base_layer_internal_flag { (1, 0) } else { (2, 1) };
            for i in first_i..=max {
                for j in first_j..i {
                    if self.direct_dependency_flag[i][j] {
                        self.direct_dependency_type[i][j] =
                            r.bits(&format!("direct_dependency_type[{i}][{j}]"), width)?;
                    }
                }
            }
        }
        Ok(())
    }
}
