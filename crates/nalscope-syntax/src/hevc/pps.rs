//! HEVC 图像参数集 (pic_parameter_set_rbsp, 7.3.2.3).
//!
//! PPS 可以先于其引用的 SPS 到达. SPS 已就绪时按其推导变量做范围检查,
//! 否则只做与 SPS 无关的检查; 条带头解析时再按生效的 SPS 计算 tile 划分.

use log::debug;
use nalscope_core::{ParameterSet, ParseError, ParseResult, ReadOptions, SyntaxReader};

use super::scaling::ScalingListData;
use super::sps::Sps;
use crate::avc::sps::read_trailing_bits;

/// tiles_enabled_flag=1 时的 tile 描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileInfo {
    pub num_tile_columns_minus1: u32,
    pub num_tile_rows_minus1: u32,
    pub uniform_spacing_flag: bool,
    /// 仅非均匀划分时存在, 最后一列不显式给出
    pub column_width_minus1: Vec<u32>,
    pub row_height_minus1: Vec<u32>,
    pub loop_filter_across_tiles_enabled_flag: bool,
}

/// 以 CTB 为单位的 tile 列宽与行高 (6-3, 6-4)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileLayout {
    pub column_widths: Vec<u32>,
    pub row_heights: Vec<u32>,
}

impl TileLayout {
    pub fn num_tiles(&self) -> usize {
        self.column_widths.len() * self.row_heights.len()
    }
}

/// 去块滤波控制
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PpsDeblocking {
    pub deblocking_filter_override_enabled_flag: bool,
    pub pps_deblocking_filter_disabled_flag: bool,
    pub pps_beta_offset_div2: i32,
    pub pps_tc_offset_div2: i32,
}

/// pps_range_extension() (7.3.2.3.2)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PpsRangeExtension {
    pub log2_max_transform_skip_block_size_minus2: Option<u32>,
    pub cross_component_prediction_enabled_flag: bool,
    pub chroma_qp_offset_list_enabled_flag: bool,
    pub diff_cu_chroma_qp_offset_depth: u32,
    /// (cb_qp_offset_list, cr_qp_offset_list)
    pub chroma_qp_offset_list: Vec<(i32, i32)>,
    pub log2_sao_offset_scale_luma: u32,
    pub log2_sao_offset_scale_chroma: u32,
}

/// pps_extension_present_flag 之后的扩展标志
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PpsExtensionFlags {
    pub pps_range_extension_flag: bool,
    pub pps_multilayer_extension_flag: bool,
    pub pps_3d_extension_flag: bool,
    pub pps_scc_extension_flag: bool,
    pub pps_extension_4bits: u32,
}

/// 并行工具组合
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parallelism {
    Slice,
    Tile,
    Wavefront,
    /// tile 与 WPP 同时开启
    Mixed,
}

impl Parallelism {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Slice => "Slice",
            Self::Tile => "Tile",
            Self::Wavefront => "Wavefront",
            Self::Mixed => "Mixed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pps {
    pub pps_pic_parameter_set_id: u32,
    pub pps_seq_parameter_set_id: u32,
    pub dependent_slice_segments_enabled_flag: bool,
    pub output_flag_present_flag: bool,
    pub num_extra_slice_header_bits: u32,
    pub sign_data_hiding_enabled_flag: bool,
    pub cabac_init_present_flag: bool,
    pub num_ref_idx_l0_default_active_minus1: u32,
    pub num_ref_idx_l1_default_active_minus1: u32,
    pub init_qp_minus26: i32,
    pub constrained_intra_pred_flag: bool,
    pub transform_skip_enabled_flag: bool,
    pub cu_qp_delta_enabled_flag: bool,
    pub diff_cu_qp_delta_depth: u32,
    pub pps_cb_qp_offset: i32,
    pub pps_cr_qp_offset: i32,
    pub pps_slice_chroma_qp_offsets_present_flag: bool,
    pub weighted_pred_flag: bool,
    pub weighted_bipred_flag: bool,
    pub transquant_bypass_enabled_flag: bool,
    pub entropy_coding_sync_enabled_flag: bool,
    pub tiles: Option<TileInfo>,
    pub pps_loop_filter_across_slices_enabled_flag: bool,
    /// deblocking_filter_control_present_flag=1 时存在
    pub deblocking: Option<PpsDeblocking>,
    pub scaling_list: Option<ScalingListData>,
    pub lists_modification_present_flag: bool,
    pub log2_parallel_merge_level_minus2: u32,
    pub slice_segment_header_extension_present_flag: bool,
    pub extension_flags: PpsExtensionFlags,
    pub range_extension: Option<PpsRangeExtension>,
}

impl ParameterSet for Pps {
    const KIND: &'static str = "PPS";
}

impl Pps {
    /// 解析 PPS, `lookup_sps` 返回已存储的 SPS (可能尚未到达)
    pub fn parse<'s>(
        r: &mut SyntaxReader<'_>,
        lookup_sps: impl FnOnce(u32) -> Option<&'s Sps>,
    ) -> ParseResult<Self> {
        let pps = r.sub_level("pic_parameter_set_rbsp()", |r| {
            let pps_pic_parameter_set_id =
                r.read_ue("pps_pic_parameter_set_id", ReadOptions::new().check_range(0, 63))?;
            let pps_seq_parameter_set_id =
                r.read_ue("pps_seq_parameter_set_id", ReadOptions::new().check_range(0, 15))?;
            let sps = lookup_sps(pps_seq_parameter_set_id);
            if sps.is_none() {
                r.log_note(format!(
                    "SPS {pps_seq_parameter_set_id} 尚未出现, 依赖 SPS 的范围检查省略"
                ));
            }
            Self::parse_body(r, sps, pps_pic_parameter_set_id, pps_seq_parameter_set_id)
        })?;

        debug!(
            "HEVC: PPS id={}, sps_id={}, parallelism={}",
            pps.pps_pic_parameter_set_id,
            pps.pps_seq_parameter_set_id,
            pps.parallelism().as_str()
        );
        Ok(pps)
    }

    fn parse_body(
        r: &mut SyntaxReader<'_>,
        sps: Option<&Sps>,
        pps_pic_parameter_set_id: u32,
        pps_seq_parameter_set_id: u32,
    ) -> ParseResult<Self> {
        let dependent_slice_segments_enabled_flag =
            r.flag("dependent_slice_segments_enabled_flag")?;
        let output_flag_present_flag = r.flag("output_flag_present_flag")?;
        let num_extra_slice_header_bits = r.bits("num_extra_slice_header_bits", 3)?;
        let sign_data_hiding_enabled_flag = r.flag("sign_data_hiding_enabled_flag")?;
        let cabac_init_present_flag = r.flag("cabac_init_present_flag")?;
        let num_ref_idx_l0_default_active_minus1 = r.read_ue(
            "num_ref_idx_l0_default_active_minus1",
            ReadOptions::new().check_range(0, 14),
        )?;
        let num_ref_idx_l1_default_active_minus1 = r.read_ue(
            "num_ref_idx_l1_default_active_minus1",
            ReadOptions::new().check_range(0, 14),
        )?;
        // QpBdOffsetY 最大为 48 (14 位)
        let qp_bd_offset = sps.map_or(48, |s| i64::from(s.derived.qp_bd_offset_luma));
        let init_qp_minus26 = r.read_se(
            "init_qp_minus26",
            ReadOptions::new().check_range(-(26 + qp_bd_offset), 25),
        )?;
        let constrained_intra_pred_flag = r.flag("constrained_intra_pred_flag")?;
        let transform_skip_enabled_flag = r.flag("transform_skip_enabled_flag")?;
        let cu_qp_delta_enabled_flag = r.flag("cu_qp_delta_enabled_flag")?;
        let diff_cu_qp_delta_depth = if cu_qp_delta_enabled_flag {
            let max = sps.map_or(3, |s| i64::from(s.log2_diff_max_min_luma_coding_block_size));
            r.read_ue("diff_cu_qp_delta_depth", ReadOptions::new().check_range(0, max))?
        } else {
            0
        };
        let pps_cb_qp_offset =
            r.read_se("pps_cb_qp_offset", ReadOptions::new().check_range(-12, 12))?;
        let pps_cr_qp_offset =
            r.read_se("pps_cr_qp_offset", ReadOptions::new().check_range(-12, 12))?;
        let pps_slice_chroma_qp_offsets_present_flag =
            r.flag("pps_slice_chroma_qp_offsets_present_flag")?;
        let weighted_pred_flag = r.flag("weighted_pred_flag")?;
        let weighted_bipred_flag = r.flag("weighted_bipred_flag")?;
        let transquant_bypass_enabled_flag = r.flag("transquant_bypass_enabled_flag")?;
        let tiles_enabled_flag = r.flag("tiles_enabled_flag")?;
        let entropy_coding_sync_enabled_flag = r.flag("entropy_coding_sync_enabled_flag")?;
        let tiles = if tiles_enabled_flag {
            Some(parse_tiles(r, sps)?)
        } else {
            None
        };
        let pps_loop_filter_across_slices_enabled_flag =
            r.flag("pps_loop_filter_across_slices_enabled_flag")?;

        let deblocking = if r.flag("deblocking_filter_control_present_flag")? {
            let deblocking_filter_override_enabled_flag =
                r.flag("deblocking_filter_override_enabled_flag")?;
            let pps_deblocking_filter_disabled_flag =
                r.flag("pps_deblocking_filter_disabled_flag")?;
            let mut d = PpsDeblocking {
                deblocking_filter_override_enabled_flag,
                pps_deblocking_filter_disabled_flag,
                ..Default::default()
            };
            if !pps_deblocking_filter_disabled_flag {
                d.pps_beta_offset_div2 =
                    r.read_se("pps_beta_offset_div2", ReadOptions::new().check_range(-6, 6))?;
                d.pps_tc_offset_div2 =
                    r.read_se("pps_tc_offset_div2", ReadOptions::new().check_range(-6, 6))?;
            }
            Some(d)
        } else {
            None
        };

        let scaling_list = if r.flag("pps_scaling_list_data_present_flag")? {
            Some(ScalingListData::parse(r)?)
        } else {
            None
        };
        let lists_modification_present_flag = r.flag("lists_modification_present_flag")?;
        let max_merge = sps.map_or(4, |s| i64::from(s.derived.ctb_log2_size_y) - 2);
        let log2_parallel_merge_level_minus2 = r.read_ue(
            "log2_parallel_merge_level_minus2",
            ReadOptions::new().check_range(0, max_merge),
        )?;
        let slice_segment_header_extension_present_flag =
            r.flag("slice_segment_header_extension_present_flag")?;

        let mut extension_flags = PpsExtensionFlags::default();
        if r.flag("pps_extension_present_flag")? {
            extension_flags = PpsExtensionFlags {
                pps_range_extension_flag: r.flag("pps_range_extension_flag")?,
                pps_multilayer_extension_flag: r.flag("pps_multilayer_extension_flag")?,
                pps_3d_extension_flag: r.flag("pps_3d_extension_flag")?,
                pps_scc_extension_flag: r.flag("pps_scc_extension_flag")?,
                pps_extension_4bits: r.bits("pps_extension_4bits", 4)?,
            };
        }
        let range_extension = if extension_flags.pps_range_extension_flag {
            Some(parse_range_extension(r, sps, transform_skip_enabled_flag)?)
        } else {
            None
        };
        if extension_flags.pps_multilayer_extension_flag
            || extension_flags.pps_3d_extension_flag
            || extension_flags.pps_scc_extension_flag
            || extension_flags.pps_extension_4bits != 0
        {
            r.log_note("pps_multilayer_extension() / pps_3d_extension() / pps_scc_extension() / pps_extension_data_flag 未解析");
        } else {
            read_trailing_bits(r)?;
        }

        let pps = Self {
            pps_pic_parameter_set_id,
            pps_seq_parameter_set_id,
            dependent_slice_segments_enabled_flag,
            output_flag_present_flag,
            num_extra_slice_header_bits,
            sign_data_hiding_enabled_flag,
            cabac_init_present_flag,
            num_ref_idx_l0_default_active_minus1,
            num_ref_idx_l1_default_active_minus1,
            init_qp_minus26,
            constrained_intra_pred_flag,
            transform_skip_enabled_flag,
            cu_qp_delta_enabled_flag,
            diff_cu_qp_delta_depth,
            pps_cb_qp_offset,
            pps_cr_qp_offset,
            pps_slice_chroma_qp_offsets_present_flag,
            weighted_pred_flag,
            weighted_bipred_flag,
            transquant_bypass_enabled_flag,
            entropy_coding_sync_enabled_flag,
            tiles,
            pps_loop_filter_across_slices_enabled_flag,
            deblocking,
            scaling_list,
            lists_modification_present_flag,
            log2_parallel_merge_level_minus2,
            slice_segment_header_extension_present_flag,
            extension_flags,
            range_extension,
        };
        r.log_calculated("Parallelism", pps.parallelism().as_str());
        if let Some(sps) = sps {
            let layout = pps.tile_layout(sps)?;
            r.log_calculated("NumTilesInPic", layout.num_tiles());
        }
        Ok(pps)
    }

    pub fn tiles_enabled_flag(&self) -> bool {
        self.tiles.is_some()
    }

    pub fn parallelism(&self) -> Parallelism {
        match (self.tiles_enabled_flag(), self.entropy_coding_sync_enabled_flag) {
            (true, true) => Parallelism::Mixed,
            (false, true) => Parallelism::Wavefront,
            (true, false) => Parallelism::Tile,
            (false, false) => Parallelism::Slice,
        }
    }

    pub fn deblocking_filter_override_enabled_flag(&self) -> bool {
        self.deblocking
            .is_some_and(|d| d.deblocking_filter_override_enabled_flag)
    }

    pub fn pps_deblocking_filter_disabled_flag(&self) -> bool {
        self.deblocking
            .is_some_and(|d| d.pps_deblocking_filter_disabled_flag)
    }

    pub fn chroma_qp_offset_list_enabled_flag(&self) -> bool {
        self.range_extension
            .as_ref()
            .is_some_and(|e| e.chroma_qp_offset_list_enabled_flag)
    }

    /// 按 `sps` 计算 tile 列宽与行高, 未启用 tile 时为整幅图像
    ///
    /// 显式列宽 (或行高) 之和不小于图像宽 (或高) 时报错.
    pub fn tile_layout(&self, sps: &Sps) -> ParseResult<TileLayout> {
        let width = sps.derived.pic_width_in_ctbs_y;
        let height = sps.derived.pic_height_in_ctbs_y;
        let Some(tiles) = &self.tiles else {
            return Ok(TileLayout {
                column_widths: vec![width],
                row_heights: vec![height],
            });
        };
        Ok(TileLayout {
            column_widths: split_ctbs(
                "column_width_minus1",
                width,
                tiles.num_tile_columns_minus1 + 1,
                tiles.uniform_spacing_flag,
                &tiles.column_width_minus1,
            )?,
            row_heights: split_ctbs(
                "row_height_minus1",
                height,
                tiles.num_tile_rows_minus1 + 1,
                tiles.uniform_spacing_flag,
                &tiles.row_height_minus1,
            )?,
        })
    }
}

fn parse_tiles(r: &mut SyntaxReader<'_>, sps: Option<&Sps>) -> ParseResult<TileInfo> {
    let max_cols = sps.map_or(i64::from(u16::MAX), |s| {
        i64::from(s.derived.pic_width_in_ctbs_y) - 1
    });
    let max_rows = sps.map_or(i64::from(u16::MAX), |s| {
        i64::from(s.derived.pic_height_in_ctbs_y) - 1
    });
    let num_tile_columns_minus1 =
        r.read_ue("num_tile_columns_minus1", ReadOptions::new().check_range(0, max_cols))?;
    let num_tile_rows_minus1 =
        r.read_ue("num_tile_rows_minus1", ReadOptions::new().check_range(0, max_rows))?;
    if num_tile_columns_minus1 == 0 && num_tile_rows_minus1 == 0 {
        return Err(ParseError::structural(
            "HEVC: tiles_enabled_flag=1 时 num_tile_columns_minus1 与 num_tile_rows_minus1 不能同时为 0",
        ));
    }
    let uniform_spacing_flag = r.flag("uniform_spacing_flag")?;
    let mut column_width_minus1 = Vec::new();
    let mut row_height_minus1 = Vec::new();
    if !uniform_spacing_flag {
        for i in 0..num_tile_columns_minus1 {
            column_width_minus1.push(r.ue(&format!("column_width_minus1[{i}]"))?);
        }
        for i in 0..num_tile_rows_minus1 {
            row_height_minus1.push(r.ue(&format!("row_height_minus1[{i}]"))?);
        }
    }
    Ok(TileInfo {
        num_tile_columns_minus1,
        num_tile_rows_minus1,
        uniform_spacing_flag,
        column_width_minus1,
        row_height_minus1,
        loop_filter_across_tiles_enabled_flag: r.flag("loop_filter_across_tiles_enabled_flag")?,
    })
}

/// 将 `total` 个 CTB 划分为 `count` 段 (6-3 / 6-4)
fn split_ctbs(
    name: &str,
    total: u32,
    count: u32,
    uniform: bool,
    explicit_minus1: &[u32],
) -> ParseResult<Vec<u32>> {
    if uniform {
        let total = u64::from(total);
        let count = u64::from(count);
        return Ok((0..count)
            .map(|i| (((i + 1) * total) / count - (i * total) / count) as u32)
            .collect());
    }
    let mut sizes: Vec<u32> = explicit_minus1.iter().map(|v| v + 1).collect();
    let used: u64 = sizes.iter().map(|&v| u64::from(v)).sum();
    if used >= u64::from(total) {
        return Err(ParseError::constraint(format!(
            "HEVC: {name} 之和超出图像范围, sum={used}, total={total}"
        )));
    }
    sizes.push(total - used as u32);
    Ok(sizes)
}

fn parse_range_extension(
    r: &mut SyntaxReader<'_>,
    sps: Option<&Sps>,
    transform_skip_enabled_flag: bool,
) -> ParseResult<PpsRangeExtension> {
    r.sub_level("pps_range_extension()", |r| {
        let mut ext = PpsRangeExtension::default();
        if transform_skip_enabled_flag {
            ext.log2_max_transform_skip_block_size_minus2 =
                Some(r.ue("log2_max_transform_skip_block_size_minus2")?);
        }
        ext.cross_component_prediction_enabled_flag =
            r.flag("cross_component_prediction_enabled_flag")?;
        ext.chroma_qp_offset_list_enabled_flag = r.flag("chroma_qp_offset_list_enabled_flag")?;
        if ext.chroma_qp_offset_list_enabled_flag {
            ext.diff_cu_chroma_qp_offset_depth = r.ue("diff_cu_chroma_qp_offset_depth")?;
            let len_minus1 = r.read_ue(
                "chroma_qp_offset_list_len_minus1",
                ReadOptions::new().check_range(0, 5),
            )?;
            for i in 0..=len_minus1 {
                let cb = r.read_se(
                    &format!("cb_qp_offset_list[{i}]"),
                    ReadOptions::new().check_range(-12, 12),
                )?;
                let cr = r.read_se(
                    &format!("cr_qp_offset_list[{i}]"),
                    ReadOptions::new().check_range(-12, 12),
                )?;
                ext.chroma_qp_offset_list.push((cb, cr));
            }
        }
        let max_luma = sps.map_or(6, |s| i64::from(s.derived.bit_depth_luma).saturating_sub(10).max(0));
        let max_chroma = sps.map_or(6, |s| {
            i64::from(s.derived.bit_depth_chroma).saturating_sub(10).max(0)
        });
        ext.log2_sao_offset_scale_luma = r.read_ue(
            "log2_sao_offset_scale_luma",
            ReadOptions::new().check_range(0, max_luma),
        )?;
        ext.log2_sao_offset_scale_chroma = r.read_ue(
            "log2_sao_offset_scale_chroma",
            ReadOptions::new().check_range(0, max_chroma),
        )?;
        Ok(ext)
    })
}
