//! AVC 图像参数集 (pic_parameter_set_rbsp, 7.3.2.2).

use log::debug;
use nalscope_core::{ParameterSet, ParseResult, ReadOptions, SyntaxReader};

use super::ceil_log2;
use super::scaling::ScalingMatrices;
use super::sps::{Sps, read_trailing_bits};

/// slice_group_map_type 0..=6 各自的几何描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SliceGroupMap {
    /// 0: 交织
    Interleaved { run_length_minus1: Vec<u32> },
    /// 1: 分散
    Dispersed,
    /// 2: 前景 + 背景
    Foreground {
        top_left: Vec<u32>,
        bottom_right: Vec<u32>,
    },
    /// 3 (box-out), 4 (raster scan), 5 (wipe)
    Evolving {
        map_type: u32,
        slice_group_change_direction_flag: bool,
        slice_group_change_rate_minus1: u32,
    },
    /// 6: 显式指定每个映射单元所属的条带组
    Explicit {
        pic_size_in_map_units_minus1: u32,
        slice_group_id: Vec<u32>,
    },
}

impl SliceGroupMap {
    pub fn map_type(&self) -> u32 {
        match self {
            Self::Interleaved { .. } => 0,
            Self::Dispersed => 1,
            Self::Foreground { .. } => 2,
            Self::Evolving { map_type, .. } => *map_type,
            Self::Explicit { .. } => 6,
        }
    }

    /// SliceGroupChangeRate, 仅类型 3..=5 存在
    pub fn slice_group_change_rate(&self) -> Option<u32> {
        match self {
            Self::Evolving {
                slice_group_change_rate_minus1,
                ..
            } => Some(slice_group_change_rate_minus1 + 1),
            _ => None,
        }
    }
}

/// more_rbsp_data() 为真时的扩展字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PpsRangeExtension {
    pub transform_8x8_mode_flag: bool,
    pub pic_scaling_matrix_present_flag: bool,
    pub second_chroma_qp_index_offset: i32,
}

/// 图像参数集
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pps {
    pub pic_parameter_set_id: u32,
    pub seq_parameter_set_id: u32,
    /// false: CAVLC, true: CABAC
    pub entropy_coding_mode_flag: bool,
    pub bottom_field_pic_order_in_frame_present_flag: bool,
    pub num_slice_groups_minus1: u32,
    /// num_slice_groups_minus1 > 0 时存在
    pub slice_group_map: Option<SliceGroupMap>,
    pub num_ref_idx_l0_default_active_minus1: u32,
    pub num_ref_idx_l1_default_active_minus1: u32,
    pub weighted_pred_flag: bool,
    pub weighted_bipred_idc: u32,
    pub pic_init_qp_minus26: i32,
    pub pic_init_qs_minus26: i32,
    pub chroma_qp_index_offset: i32,
    pub deblocking_filter_control_present_flag: bool,
    pub constrained_intra_pred_flag: bool,
    pub redundant_pic_cnt_present_flag: bool,
    pub extension: Option<PpsRangeExtension>,
    /// 生效的量化矩阵: PPS 显式给出, 否则继承 SPS
    pub scaling_matrices: ScalingMatrices,
}

impl ParameterSet for Pps {
    const KIND: &'static str = "PPS";
}

impl Pps {
    /// 解析 PPS, `lookup_sps` 按 ID 查找已存储的 SPS
    pub fn parse<'s>(
        r: &mut SyntaxReader<'_>,
        lookup_sps: impl FnOnce(u32) -> ParseResult<&'s Sps>,
    ) -> ParseResult<Self> {
        let pps = r.sub_level("pic_parameter_set_rbsp()", |r| {
            let pic_parameter_set_id =
                r.read_ue("pic_parameter_set_id", ReadOptions::new().check_range(0, 255))?;
            let seq_parameter_set_id =
                r.read_ue("seq_parameter_set_id", ReadOptions::new().check_range(0, 31))?;
            let sps = lookup_sps(seq_parameter_set_id)?;
            Self::parse_body(r, sps, pic_parameter_set_id)
        })?;
        read_trailing_bits(r)?;

        debug!(
            "AVC: PPS id={}, sps_id={}, cabac={}, slice_groups={}",
            pps.pic_parameter_set_id,
            pps.seq_parameter_set_id,
            pps.entropy_coding_mode_flag,
            pps.num_slice_groups_minus1 + 1
        );
        Ok(pps)
    }

    fn parse_body(
        r: &mut SyntaxReader<'_>,
        sps: &Sps,
        pic_parameter_set_id: u32,
    ) -> ParseResult<Self> {
        let entropy_coding_mode_flag = r.flag("entropy_coding_mode_flag")?;
        r.log_calculated(
            "entropy_coding_mode",
            if entropy_coding_mode_flag { "CABAC" } else { "CAVLC" },
        );
        let bottom_field_pic_order_in_frame_present_flag =
            r.flag("bottom_field_pic_order_in_frame_present_flag")?;

        let num_slice_groups_minus1 =
            r.read_ue("num_slice_groups_minus1", ReadOptions::new().check_range(0, 7))?;
        let slice_group_map = if num_slice_groups_minus1 > 0 {
            Some(parse_slice_group_map(r, sps, num_slice_groups_minus1)?)
        } else {
            None
        };

        let num_ref_idx_l0_default_active_minus1 = r.read_ue(
            "num_ref_idx_l0_default_active_minus1",
            ReadOptions::new().check_range(0, 31),
        )?;
        let num_ref_idx_l1_default_active_minus1 = r.read_ue(
            "num_ref_idx_l1_default_active_minus1",
            ReadOptions::new().check_range(0, 31),
        )?;
        let weighted_pred_flag = r.flag("weighted_pred_flag")?;
        let weighted_bipred_idc =
            r.read_bits("weighted_bipred_idc", 2, ReadOptions::new().check_range(0, 2))?;
        let qp_bd_offset = i64::from(sps.derived.qp_bd_offset_luma);
        let pic_init_qp_minus26 = r.read_se(
            "pic_init_qp_minus26",
            ReadOptions::new().check_range(-(26 + qp_bd_offset), 25),
        )?;
        let pic_init_qs_minus26 =
            r.read_se("pic_init_qs_minus26", ReadOptions::new().check_range(-26, 25))?;
        let chroma_qp_index_offset =
            r.read_se("chroma_qp_index_offset", ReadOptions::new().check_range(-12, 12))?;
        let deblocking_filter_control_present_flag =
            r.flag("deblocking_filter_control_present_flag")?;
        let constrained_intra_pred_flag = r.flag("constrained_intra_pred_flag")?;
        let redundant_pic_cnt_present_flag = r.flag("redundant_pic_cnt_present_flag")?;

        let mut scaling_matrices = sps.scaling_matrices.clone();
        let extension = if r.more_rbsp_data() {
            let transform_8x8_mode_flag = r.flag("transform_8x8_mode_flag")?;
            let pic_scaling_matrix_present_flag = r.flag("pic_scaling_matrix_present_flag")?;
            if pic_scaling_matrix_present_flag {
                let num_8x8 = match (transform_8x8_mode_flag, sps.chroma_format_idc) {
                    (false, _) => 0,
                    (true, 3) => 6,
                    (true, _) => 2,
                };
                let base = sps
                    .seq_scaling_matrix_present_flag
                    .then_some(&sps.scaling_matrices);
                scaling_matrices = ScalingMatrices::read(r, "pic", num_8x8, base)?;
            }
            let second_chroma_qp_index_offset = r.read_se(
                "second_chroma_qp_index_offset",
                ReadOptions::new().check_range(-12, 12),
            )?;
            Some(PpsRangeExtension {
                transform_8x8_mode_flag,
                pic_scaling_matrix_present_flag,
                second_chroma_qp_index_offset,
            })
        } else {
            None
        };

        Ok(Self {
            pic_parameter_set_id,
            seq_parameter_set_id: sps.seq_parameter_set_id,
            entropy_coding_mode_flag,
            bottom_field_pic_order_in_frame_present_flag,
            num_slice_groups_minus1,
            slice_group_map,
            num_ref_idx_l0_default_active_minus1,
            num_ref_idx_l1_default_active_minus1,
            weighted_pred_flag,
            weighted_bipred_idc,
            pic_init_qp_minus26,
            pic_init_qs_minus26,
            chroma_qp_index_offset,
            deblocking_filter_control_present_flag,
            constrained_intra_pred_flag,
            redundant_pic_cnt_present_flag,
            extension,
            scaling_matrices,
        })
    }

    pub fn transform_8x8_mode_flag(&self) -> bool {
        self.extension.is_some_and(|e| e.transform_8x8_mode_flag)
    }

    /// 未出现时等于 chroma_qp_index_offset
    pub fn second_chroma_qp_index_offset(&self) -> i32 {
        self.extension
            .map_or(self.chroma_qp_index_offset, |e| e.second_chroma_qp_index_offset)
    }

    pub fn slice_group_change_rate(&self) -> Option<u32> {
        self.slice_group_map
            .as_ref()
            .and_then(SliceGroupMap::slice_group_change_rate)
    }
}

fn parse_slice_group_map(
    r: &mut SyntaxReader<'_>,
    sps: &Sps,
    num_slice_groups_minus1: u32,
) -> ParseResult<SliceGroupMap> {
    let map_type = r.read_ue("slice_group_map_type", ReadOptions::new().check_range(0, 6))?;
    let pic_size_in_map_units = i64::from(sps.derived.pic_size_in_map_units);

    r.sub_level("slice_group_map", |r| match map_type {
        0 => {
            let run_length_minus1 = (0..=num_slice_groups_minus1)
                .map(|i| {
                    r.read_ue(
                        &format!("run_length_minus1[{i}]"),
                        ReadOptions::new().check_range(0, pic_size_in_map_units - 1),
                    )
                })
                .collect::<ParseResult<Vec<_>>>()?;
            Ok(SliceGroupMap::Interleaved { run_length_minus1 })
        }
        1 => Ok(SliceGroupMap::Dispersed),
        2 => {
            let mut top_left = Vec::with_capacity(num_slice_groups_minus1 as usize);
            let mut bottom_right = Vec::with_capacity(num_slice_groups_minus1 as usize);
            for i in 0..num_slice_groups_minus1 {
                let tl = r.read_ue(
                    &format!("top_left[{i}]"),
                    ReadOptions::new().check_range(0, pic_size_in_map_units - 1),
                )?;
                let br = r.read_ue(
                    &format!("bottom_right[{i}]"),
                    ReadOptions::new().check_range(i64::from(tl), pic_size_in_map_units - 1),
                )?;
                top_left.push(tl);
                bottom_right.push(br);
            }
            Ok(SliceGroupMap::Foreground {
                top_left,
                bottom_right,
            })
        }
        3..=5 => {
            let slice_group_change_direction_flag = r.flag("slice_group_change_direction_flag")?;
            let slice_group_change_rate_minus1 = r.read_ue(
                "slice_group_change_rate_minus1",
                ReadOptions::new().check_range(0, pic_size_in_map_units - 1),
            )?;
            r.log_calculated("SliceGroupChangeRate", slice_group_change_rate_minus1 + 1);
            Ok(SliceGroupMap::Evolving {
                map_type,
                slice_group_change_direction_flag,
                slice_group_change_rate_minus1,
            })
        }
        _ => {
            let pic_size_in_map_units_minus1 = r.read_ue(
                "pic_size_in_map_units_minus1",
                ReadOptions::new().check_equal_to(pic_size_in_map_units - 1),
            )?;
            let width = ceil_log2(num_slice_groups_minus1 + 1);
            let slice_group_id = (0..=pic_size_in_map_units_minus1)
                .map(|i| {
                    r.read_bits(
                        &format!("slice_group_id[{i}]"),
                        width,
                        ReadOptions::new().check_range(0, i64::from(num_slice_groups_minus1)),
                    )
                })
                .collect::<ParseResult<Vec<_>>>()?;
            Ok(SliceGroupMap::Explicit {
                pic_size_in_map_units_minus1,
                slice_group_id,
            })
        }
    })
}
