//! HEVC vps_vui() 与 vps_vui_bsp_hrd_params() (F.7.3.2.1.4, F.7.3.2.1.6).
//!
//! 两者的循环边界全部来自 [`VpsExtension`] 的推导结果: 层集合个数、
//! MaxSubLayersInLayerSetMinus1、直接参考层列表与输出层集合.

use log::debug;
use nalscope_core::{ParseError, ParseResult, ReadOptions, SyntaxReader};

use super::hrd::{HrdCommonInfo, HrdParameters};
use super::vps_extension::{ExtensionContext, VpsExtension};
use crate::avc::ceil_log2;
use crate::avc::tables::{ColourPrimaries, MatrixCoefficients, TransferCharacteristics, VideoFormat};

/// 每个子层的码率/帧率信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubLayerRate {
    pub bit_rate_present_flag: bool,
    pub pic_rate_present_flag: bool,
    pub avg_bit_rate: u32,
    pub max_bit_rate: u32,
    pub constant_pic_rate_idc: u32,
    pub avg_pic_rate: u32,
}

/// video_signal_info()
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoSignalInfo {
    pub video_vps_format: u32,
    pub video_full_range_vps_flag: bool,
    pub colour_primaries_vps: u32,
    pub transfer_characteristics_vps: u32,
    pub matrix_coeffs_vps: u32,
}

impl VideoSignalInfo {
    fn parse(r: &mut SyntaxReader<'_>) -> ParseResult<Self> {
        r.sub_level("video_signal_info()", |r| {
            Ok(Self {
                video_vps_format: r.read_bits(
                    "video_vps_format",
                    3,
                    ReadOptions::new().meaning_map::<VideoFormat>(),
                )?,
                video_full_range_vps_flag: r.flag("video_full_range_vps_flag")?,
                colour_primaries_vps: r.read_bits(
                    "colour_primaries_vps",
                    8,
                    ReadOptions::new().meaning_map::<ColourPrimaries>(),
                )?,
                transfer_characteristics_vps: r.read_bits(
                    "transfer_characteristics_vps",
                    8,
                    ReadOptions::new().meaning_map::<TransferCharacteristics>(),
                )?,
                matrix_coeffs_vps: r.read_bits(
                    "matrix_coeffs_vps",
                    8,
                    ReadOptions::new().meaning_map::<MatrixCoefficients>(),
                )?,
            })
        })
    }
}

/// 层间预测的空间片段限制
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IlpRestriction {
    pub min_spatial_segment_offset_plus1: u32,
    pub ctu_based_offset_enabled_flag: bool,
    pub min_horizontal_ctu_offset_plus1: Option<u32>,
}

/// vps_vui_bsp_hrd_params() 中追加的一个 hrd_parameters()
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdditionalHrd {
    pub cprms_add_present_flag: bool,
    pub num_sub_layer_hrd_minus1: u32,
    pub parameters: HrdParameters,
}

/// 一个调度中某个分区使用的 HRD 与调度下标
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BspPartitionHrd {
    /// 全部 hrd_parameters() (基础 VPS 中的在前) 中的下标
    pub bsp_hrd_idx: u32,
    pub bsp_sched_idx: u32,
}

/// 一个分区方案
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitioningScheme {
    pub num_partitions_in_scheme_minus1: u32,
    /// layer_included_in_partition_flag[k][r]
    pub layer_included_in_partition_flag: Vec<Vec<bool>>,
    /// [t][j][k]: 子层 t 的第 j 个调度中分区 k 的 HRD
    pub schedules: Vec<Vec<Vec<BspPartitionHrd>>>,
}

/// 一个输出层集合的码流分区信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OlsBspInfo {
    pub ols_idx: usize,
    pub num_signalled_partitioning_schemes: u32,
    /// 方案 0 为推断的 "每层一个分区", 之后是显式传输的方案
    pub schemes: Vec<PartitioningScheme>,
}

/// vps_vui_bsp_hrd_params()
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BspHrdParams {
    pub vps_num_add_hrd_params: u32,
    pub additional_hrd: Vec<AdditionalHrd>,
    /// OLS 1..NumOutputLayerSets, 无任何 hrd_parameters() 时为空
    pub output_layer_sets: Vec<OlsBspInfo>,
}

/// vps_vui()
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpsVui {
    pub cross_layer_pic_type_aligned_flag: bool,
    pub cross_layer_irap_aligned_flag: bool,
    pub all_layers_idr_aligned_flag: bool,
    pub bit_rate_present_vps_flag: bool,
    pub pic_rate_present_vps_flag: bool,
    /// 按层集合下标; 外部基础层时层集合 0 为空
    pub layer_set_rates: Vec<Vec<SubLayerRate>>,
    pub video_signal_info_idx_present_flag: bool,
    pub vps_num_video_signal_info_minus1: u32,
    pub video_signal_info: Vec<VideoSignalInfo>,
    /// 按层下标
    pub vps_video_signal_info_idx: Vec<u32>,
    pub tiles_not_in_use_flag: bool,
    pub tiles_in_use_flag: Vec<bool>,
    pub loop_filter_not_across_tiles_flag: Vec<bool>,
    /// [i][j], j 为直接参考层序号
    pub tile_boundaries_aligned_flag: Vec<Vec<bool>>,
    pub wpp_not_in_use_flag: bool,
    pub wpp_in_use_flag: Vec<bool>,
    pub single_layer_for_non_irap_flag: bool,
    pub higher_layer_irap_skip_flag: bool,
    pub ilp_restricted_ref_layers_flag: bool,
    /// [i][j], j 为直接参考层序号
    pub ilp_restrictions: Vec<Vec<Option<IlpRestriction>>>,
    pub bsp_hrd: Option<BspHrdParams>,
    pub base_layer_parameter_set_compatibility_flag: Vec<bool>,
}

impl VpsVui {
    pub(crate) fn parse(
        r: &mut SyntaxReader<'_>,
        ext: &VpsExtension,
        ctx: &ExtensionContext<'_>,
    ) -> ParseResult<Self> {
        r.sub_level("vps_vui()", |r| {
            let base_internal = ctx.vps_base_layer_internal_flag;
            let first_layer = usize::from(!base_internal);
            let max = ext.max_layers_minus1;

            let cross_layer_pic_type_aligned_flag = r.flag("cross_layer_pic_type_aligned_flag")?;
            // 未出现时等于 vps_vui_present_flag
            let cross_layer_irap_aligned_flag =
                cross_layer_pic_type_aligned_flag || r.flag("cross_layer_irap_aligned_flag")?;
            let all_layers_idr_aligned_flag =
                cross_layer_irap_aligned_flag && r.flag("all_layers_idr_aligned_flag")?;

            let bit_rate_present_vps_flag = r.flag("bit_rate_present_vps_flag")?;
            let pic_rate_present_vps_flag = r.flag("pic_rate_present_vps_flag")?;
            let mut layer_set_rates = vec![Vec::new(); ext.num_layer_sets()];
            if bit_rate_present_vps_flag || pic_rate_present_vps_flag {
                for (i, rates) in layer_set_rates.iter_mut().enumerate().skip(first_layer) {
                    for j in 0..=ext.max_sub_layers_in_layer_set_minus1[i] {
                        rates.push(parse_sub_layer_rate(
                            r,
                            i,
                            j,
                            bit_rate_present_vps_flag,
                            pic_rate_present_vps_flag,
                        )?);
                    }
                }
            }

            let video_signal_info_idx_present_flag = r.flag("video_signal_info_idx_present_flag")?;
            let vps_num_video_signal_info_minus1 = if video_signal_info_idx_present_flag {
                r.bits("vps_num_video_signal_info_minus1", 4)?
            } else {
                let inferred = max.saturating_sub(first_layer) as u32;
                r.log_calculated("vps_num_video_signal_info_minus1", inferred);
                inferred
            };
            let video_signal_info = (0..=vps_num_video_signal_info_minus1)
                .map(|_| VideoSignalInfo::parse(r))
                .collect::<ParseResult<Vec<_>>>()?;

            let mut vps_video_signal_info_idx = vec![0; max + 1];
            for (i, idx) in vps_video_signal_info_idx.iter_mut().enumerate().skip(first_layer) {
                *idx = if !video_signal_info_idx_present_flag {
                    (i - first_layer) as u32
                } else if vps_num_video_signal_info_minus1 > 0 {
                    r.read_bits(
                        &format!("vps_video_signal_info_idx[{i}]"),
                        4,
                        ReadOptions::new().check_range(0, i64::from(vps_num_video_signal_info_minus1)),
                    )?
                } else {
                    0
                };
            }

            let mut tiles_in_use_flag = vec![false; max + 1];
            let mut loop_filter_not_across_tiles_flag = vec![false; max + 1];
            let mut tile_boundaries_aligned_flag = vec![Vec::new(); max + 1];
            let tiles_not_in_use_flag = r.flag("tiles_not_in_use_flag")?;
            if !tiles_not_in_use_flag {
                for i in first_layer..=max {
                    tiles_in_use_flag[i] = r.flag(&format!("tiles_in_use_flag[{i}]"))?;
                    if tiles_in_use_flag[i] {
                        loop_filter_not_across_tiles_flag[i] =
                            r.flag(&format!("loop_filter_not_across_tiles_flag[{i}]"))?;
                    }
                }
                for i in (first_layer + 1)..=max {
                    let refs = ext.id_direct_ref_layer[usize::from(ext.layer_id_in_nuh[i])];
                    for (j, &ref_id) in refs.as_slice().iter().enumerate() {
                        let ref_idx = ext.layer_idx(ref_id);
                        let coded = tiles_in_use_flag[i]
                            && ref_idx.is_some_and(|k| tiles_in_use_flag[k]);
                        let aligned = coded
                            && r.flag(&format!("tile_boundaries_aligned_flag[{i}][{j}]"))?;
                        tile_boundaries_aligned_flag[i].push(aligned);
                    }
                }
            }

            let mut wpp_in_use_flag = vec![false; max + 1];
            let wpp_not_in_use_flag = r.flag("wpp_not_in_use_flag")?;
            if !wpp_not_in_use_flag {
                for (i, flag) in wpp_in_use_flag.iter_mut().enumerate().skip(first_layer) {
                    *flag = r.flag(&format!("wpp_in_use_flag[{i}]"))?;
                }
            }

            let single_layer_for_non_irap_flag = r.flag("single_layer_for_non_irap_flag")?;
            let higher_layer_irap_skip_flag = r.flag("higher_layer_irap_skip_flag")?;
            let ilp_restricted_ref_layers_flag = r.flag("ilp_restricted_ref_layers_flag")?;
            let mut ilp_restrictions = vec![Vec::new(); max + 1];
            if ilp_restricted_ref_layers_flag {
                for (i, row) in ilp_restrictions.iter_mut().enumerate().skip(1) {
                    let refs = ext.id_direct_ref_layer[usize::from(ext.layer_id_in_nuh[i])];
                    for (j, &ref_id) in refs.as_slice().iter().enumerate() {
                        let entry = if base_internal || ref_id > 0 {
                            Some(parse_ilp_restriction(r, i, j)?)
                        } else {
                            None
                        };
                        row.push(entry);
                    }
                }
            }

            let bsp_hrd = if r.flag("vps_vui_bsp_hrd_present_flag")? {
                Some(BspHrdParams::parse(r, ext, ctx)?)
            } else {
                None
            };

            let mut base_layer_parameter_set_compatibility_flag = vec![false; max + 1];
            for (i, flag) in base_layer_parameter_set_compatibility_flag
                .iter_mut()
                .enumerate()
                .skip(1)
            {
                if ext.num_direct_ref_layers(ext.layer_id_in_nuh[i]) == 0 {
                    *flag = r.flag(&format!("base_layer_parameter_set_compatibility_flag[{i}]"))?;
                }
            }

            debug!(
                "HEVC: vps_vui 解析完成, video_signal_info={}, bsp_hrd={}",
                video_signal_info.len(),
                bsp_hrd.is_some()
            );
            Ok(Self {
                cross_layer_pic_type_aligned_flag,
                cross_layer_irap_aligned_flag,
                all_layers_idr_aligned_flag,
                bit_rate_present_vps_flag,
                pic_rate_present_vps_flag,
                layer_set_rates,
                video_signal_info_idx_present_flag,
                vps_num_video_signal_info_minus1,
                video_signal_info,
                vps_video_signal_info_idx,
                tiles_not_in_use_flag,
                tiles_in_use_flag,
                loop_filter_not_across_tiles_flag,
                tile_boundaries_aligned_flag,
                wpp_not_in_use_flag,
                wpp_in_use_flag,
                single_layer_for_non_irap_flag,
                higher_layer_irap_skip_flag,
                ilp_restricted_ref_layers_flag,
                ilp_restrictions,
                bsp_hrd,
                base_layer_parameter_set_compatibility_flag,
            })
        })
    }
}

fn parse_sub_layer_rate(
    r: &mut SyntaxReader<'_>,
    i: usize,
    j: u32,
    bit_rate_present_vps_flag: bool,
    pic_rate_present_vps_flag: bool,
) -> ParseResult<SubLayerRate> {
    let mut rate = SubLayerRate {
        bit_rate_present_flag: bit_rate_present_vps_flag
            && r.flag(&format!("bit_rate_present_flag[{i}][{j}]"))?,
        pic_rate_present_flag: pic_rate_present_vps_flag
            && r.flag(&format!("pic_rate_present_flag[{i}][{j}]"))?,
        ..SubLayerRate::default()
    };
    if rate.bit_rate_present_flag {
        rate.avg_bit_rate = r.bits(&format!("avg_bit_rate[{i}][{j}]"), 16)?;
        rate.max_bit_rate = r.bits(&format!("max_bit_rate[{i}][{j}]"), 16)?;
    }
    if rate.pic_rate_present_flag {
        rate.constant_pic_rate_idc = r.read_bits(
            &format!("constant_pic_rate_idc[{i}][{j}]"),
            2,
            ReadOptions::new().check_range(0, 2),
        )?;
        rate.avg_pic_rate = r.bits(&format!("avg_pic_rate[{i}][{j}]"), 16)?;
    }
    Ok(rate)
}

fn parse_ilp_restriction(r: &mut SyntaxReader<'_>, i: usize, j: usize) -> ParseResult<IlpRestriction> {
    let min_spatial_segment_offset_plus1 =
        r.ue(&format!("min_spatial_segment_offset_plus1[{i}][{j}]"))?;
    let mut restriction = IlpRestriction {
        min_spatial_segment_offset_plus1,
        ctu_based_offset_enabled_flag: false,
        min_horizontal_ctu_offset_plus1: None,
    };
    if min_spatial_segment_offset_plus1 > 0 {
        restriction.ctu_based_offset_enabled_flag =
            r.flag(&format!("ctu_based_offset_enabled_flag[{i}][{j}]"))?;
        if restriction.ctu_based_offset_enabled_flag {
            restriction.min_horizontal_ctu_offset_plus1 =
                Some(r.ue(&format!("min_horizontal_ctu_offset_plus1[{i}][{j}]"))?);
        }
    }
    Ok(restriction)
}

impl BspHrdParams {
    fn parse(
        r: &mut SyntaxReader<'_>,
        ext: &VpsExtension,
        ctx: &ExtensionContext<'_>,
    ) -> ParseResult<Self> {
        r.sub_level("vps_vui_bsp_hrd_params()", |r| {
            let base_hrd = ctx.vps_num_hrd_parameters;
            let vps_num_add_hrd_params = r.read_ue(
                "vps_num_add_hrd_params",
                ReadOptions::new().check_range(0, 1024 - i64::from(base_hrd)),
            )?;

            let mut additional_hrd: Vec<AdditionalHrd> = Vec::with_capacity(vps_num_add_hrd_params as usize);
            let mut common: Option<HrdCommonInfo> = ctx.last_hrd_common;
            for i in base_hrd..base_hrd + vps_num_add_hrd_params {
                let cprms_add_present_flag = i == 0 || r.flag(&format!("cprms_add_present_flag[{i}]"))?;
                let num_sub_layer_hrd_minus1 = r.read_ue(
                    &format!("num_sub_layer_hrd_minus1[{i}]"),
                    ReadOptions::new().check_range(0, i64::from(ctx.vps_max_sub_layers_minus1)),
                )?;
                let parameters = HrdParameters::parse(
                    r,
                    cprms_add_present_flag,
                    num_sub_layer_hrd_minus1,
                    common.as_ref(),
                )?;
                common = Some(parameters.common);
                additional_hrd.push(AdditionalHrd {
                    cprms_add_present_flag,
                    num_sub_layer_hrd_minus1,
                    parameters,
                });
            }

            let total_hrd = base_hrd + vps_num_add_hrd_params;
            let mut output_layer_sets = Vec::new();
            if total_hrd > 0 {
                for h in 1..ext.num_output_layer_sets() {
                    output_layer_sets.push(parse_ols_bsp(r, ext, h, total_hrd)?);
                }
            }

            Ok(Self {
                vps_num_add_hrd_params,
                additional_hrd,
                output_layer_sets,
            })
        })
    }
}

/// 一个输出层集合的分区方案与调度
fn parse_ols_bsp(
    r: &mut SyntaxReader<'_>,
    ext: &VpsExtension,
    h: usize,
    total_hrd: u32,
) -> ParseResult<OlsBspInfo> {
    let ls_idx = ext.output_layer_sets[h].layer_set_idx;
    let num_layers = ext.layer_sets[ls_idx].len();
    let max_sub = ext.max_sub_layers_in_layer_set_minus1[ls_idx];

    let num_signalled_partitioning_schemes = r.read_ue(
        &format!("num_signalled_partitioning_schemes[{h}]"),
        ReadOptions::new().check_range(0, 16),
    )?;

    // 方案 0: 每层单独成一个分区
    let mut schemes = Vec::with_capacity(num_signalled_partitioning_schemes as usize + 1);
    schemes.push(PartitioningScheme {
        num_partitions_in_scheme_minus1: num_layers.saturating_sub(1) as u32,
        layer_included_in_partition_flag: (0..num_layers)
            .map(|k| (0..num_layers).map(|l| k == l).collect())
            .collect(),
        schedules: Vec::new(),
    });
    for j in 1..=num_signalled_partitioning_schemes {
        let num_partitions_in_scheme_minus1 = r.read_ue(
            &format!("num_partitions_in_scheme_minus1[{h}][{j}]"),
            ReadOptions::new().check_range(0, num_layers as i64 - 1),
        )?;
        let mut included = Vec::with_capacity(num_partitions_in_scheme_minus1 as usize + 1);
        for k in 0..=num_partitions_in_scheme_minus1 {
            let row = (0..num_layers)
                .map(|l| r.flag(&format!("layer_included_in_partition_flag[{h}][{j}][{k}][{l}]")))
                .collect::<ParseResult<Vec<_>>>()?;
            included.push(row);
        }
        for l in 0..num_layers {
            let owners = included.iter().filter(|row| row[l]).count();
            if owners != 1 {
                return Err(ParseError::structural(format!(
                    "HEVC: OLS {h} 分区方案 {j} 中层 {l} 应恰好属于一个分区, 实际 {owners} 个"
                )));
            }
        }
        schemes.push(PartitioningScheme {
            num_partitions_in_scheme_minus1,
            layer_included_in_partition_flag: included,
            schedules: Vec::new(),
        });
    }

    let hrd_idx_width = if total_hrd > 1 { ceil_log2(total_hrd) } else { 0 };
    for (i, scheme) in schemes.iter_mut().enumerate() {
        for t in 0..=max_sub {
            let num_bsp_schedules_minus1 = r.read_ue(
                &format!("num_bsp_schedules_minus1[{h}][{i}][{t}]"),
                ReadOptions::new().check_range(0, 31),
            )?;
            let mut schedules = Vec::with_capacity(num_bsp_schedules_minus1 as usize + 1);
            for j in 0..=num_bsp_schedules_minus1 {
                let mut partitions = Vec::with_capacity(scheme.num_partitions_in_scheme_minus1 as usize + 1);
                for k in 0..=scheme.num_partitions_in_scheme_minus1 {
                    let bsp_hrd_idx = if hrd_idx_width > 0 {
                        r.read_bits(
                            &format!("bsp_hrd_idx[{h}][{i}][{t}][{j}][{k}]"),
                            hrd_idx_width,
                            ReadOptions::new().check_range(0, i64::from(total_hrd) - 1),
                        )?
                    } else {
                        0
                    };
                    let bsp_sched_idx = r.read_ue(
                        &format!("bsp_sched_idx[{h}][{i}][{t}][{j}][{k}]"),
                        ReadOptions::new().check_range(0, 31),
                    )?;
                    partitions.push(BspPartitionHrd {
                        bsp_hrd_idx,
                        bsp_sched_idx,
                    });
                }
                schedules.push(partitions);
            }
            scheme.schedules.push(schedules);
        }
    }

    Ok(OlsBspInfo {
        ols_idx: h,
        num_signalled_partitioning_schemes,
        schemes,
    })
}
