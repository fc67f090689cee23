//! AVC 序列参数集 (seq_parameter_set_rbsp, 7.3.2.1).
//!
//! 解析编码字段后立即计算全部推导变量 (位深、宏块尺寸、裁剪矩形等),
//! 推导变量只依赖编码字段, 解析完成后不再修改.

use log::debug;
use nalscope_core::{ParameterSet, ParseError, ParseResult, ReadOptions, SyntaxReader};

use super::scaling::ScalingMatrices;
use super::tables::{ChromaFormat, ProfileIdc};
use super::vui::{VuiContext, VuiParameters};

/// pic_order_cnt_type 相关字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PicOrderCntInfo {
    Type0 {
        log2_max_pic_order_cnt_lsb_minus4: u32,
    },
    Type1 {
        delta_pic_order_always_zero_flag: bool,
        offset_for_non_ref_pic: i32,
        offset_for_top_to_bottom_field: i32,
        offset_for_ref_frame: Vec<i32>,
    },
    Type2,
}

impl PicOrderCntInfo {
    pub fn type_code(&self) -> u32 {
        match self {
            Self::Type0 { .. } => 0,
            Self::Type1 { .. } => 1,
            Self::Type2 => 2,
        }
    }
}

/// frame_cropping_flag 为 1 时的四个偏移
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameCropping {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

/// 裁剪后的显示矩形 (亮度采样单位)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// SPS 推导变量
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpsDerived {
    pub bit_depth_luma: u32,
    pub bit_depth_chroma: u32,
    pub qp_bd_offset_luma: u32,
    pub qp_bd_offset_chroma: u32,
    pub chroma_array_type: u32,
    /// 单色或独立色彩平面时为 0
    pub sub_width_c: u32,
    pub sub_height_c: u32,
    pub mb_width_c: u32,
    pub mb_height_c: u32,
    pub pic_width_in_mbs: u32,
    pub pic_height_in_map_units: u32,
    pub pic_size_in_map_units: u32,
    pub frame_height_in_mbs: u32,
    /// 帧图像 (field_pic_flag=0) 的 PicHeightInMbs
    pub pic_height_in_mbs: u32,
    /// 帧图像 (field_pic_flag=0) 的 PicSizeInMbs
    pub pic_size_in_mbs: u32,
    pub pic_width_in_samples_luma: u32,
    pub pic_width_in_samples_chroma: u32,
    pub crop_unit_x: u32,
    pub crop_unit_y: u32,
    pub crop: CropRect,
    pub max_frame_num: u32,
    /// 仅 pic_order_cnt_type=0 时非 0
    pub max_pic_order_cnt_lsb: u32,
    /// 仅 pic_order_cnt_type=1 时非 0
    pub expected_delta_per_pic_order_cnt_cycle: i64,
}

/// 序列参数集
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sps {
    pub profile_idc: u32,
    /// constraint_set0_flag..constraint_set5_flag
    pub constraint_set_flags: [bool; 6],
    pub level_idc: u32,
    pub seq_parameter_set_id: u32,
    pub chroma_format_idc: u32,
    pub separate_colour_plane_flag: bool,
    pub bit_depth_luma_minus8: u32,
    pub bit_depth_chroma_minus8: u32,
    pub qpprime_y_zero_transform_bypass_flag: bool,
    pub seq_scaling_matrix_present_flag: bool,
    /// 已应用回退规则; 未出现时为 Flat_16
    pub scaling_matrices: ScalingMatrices,
    pub log2_max_frame_num_minus4: u32,
    pub pic_order_cnt: PicOrderCntInfo,
    pub max_num_ref_frames: u32,
    pub gaps_in_frame_num_value_allowed_flag: bool,
    pub pic_width_in_mbs_minus1: u32,
    pub pic_height_in_map_units_minus1: u32,
    pub frame_mbs_only_flag: bool,
    pub mb_adaptive_frame_field_flag: bool,
    pub direct_8x8_inference_flag: bool,
    pub frame_cropping: Option<FrameCropping>,
    pub vui: Option<VuiParameters>,
    pub derived: SpsDerived,
}

impl ParameterSet for Sps {
    const KIND: &'static str = "SPS";
}

impl Sps {
    /// 解析完整的 seq_parameter_set_rbsp(), 包括 rbsp_trailing_bits
    pub fn parse(r: &mut SyntaxReader<'_>) -> ParseResult<Self> {
        let sps = r.sub_level("seq_parameter_set_data()", Self::parse_data)?;
        read_trailing_bits(r)?;
        Ok(sps)
    }

    /// 解析 seq_parameter_set_data(), subset SPS 同样以此开头
    pub fn parse_data(r: &mut SyntaxReader<'_>) -> ParseResult<Self> {
        let profile_idc = r.read_bits(
            "profile_idc",
            8,
            ReadOptions::new().meaning_map::<ProfileIdc>(),
        )?;
        let mut constraint_set_flags = [false; 6];
        for (i, flag) in constraint_set_flags.iter_mut().enumerate() {
            *flag = r.flag(&format!("constraint_set{i}_flag"))?;
        }
        r.read_bits("reserved_zero_2bits", 2, ReadOptions::new().check_equal_to(0))?;
        let level_idc = r.bits("level_idc", 8)?;
        let seq_parameter_set_id =
            r.read_ue("seq_parameter_set_id", ReadOptions::new().check_range(0, 31))?;

        let mut chroma_format_idc = 1;
        let mut separate_colour_plane_flag = false;
        let mut bit_depth_luma_minus8 = 0;
        let mut bit_depth_chroma_minus8 = 0;
        let mut qpprime_y_zero_transform_bypass_flag = false;
        let mut seq_scaling_matrix_present_flag = false;
        let mut scaling_matrices = ScalingMatrices::flat(2);

        if ProfileIdc::has_chroma_info(profile_idc) {
            chroma_format_idc = r.read_ue(
                "chroma_format_idc",
                ReadOptions::new()
                    .check_range(0, 3)
                    .meaning_map::<ChromaFormat>(),
            )?;
            if chroma_format_idc == 3 {
                separate_colour_plane_flag = r.flag("separate_colour_plane_flag")?;
            }
            bit_depth_luma_minus8 =
                r.read_ue("bit_depth_luma_minus8", ReadOptions::new().check_range(0, 6))?;
            bit_depth_chroma_minus8 =
                r.read_ue("bit_depth_chroma_minus8", ReadOptions::new().check_range(0, 6))?;
            qpprime_y_zero_transform_bypass_flag =
                r.flag("qpprime_y_zero_transform_bypass_flag")?;
            seq_scaling_matrix_present_flag = r.flag("seq_scaling_matrix_present_flag")?;

            let num_8x8 = if chroma_format_idc == 3 { 6 } else { 2 };
            scaling_matrices = if seq_scaling_matrix_present_flag {
                ScalingMatrices::read(r, "seq", num_8x8, None)?
            } else {
                ScalingMatrices::flat(num_8x8)
            };
        }

        let log2_max_frame_num_minus4 =
            r.read_ue("log2_max_frame_num_minus4", ReadOptions::new().check_range(0, 12))?;
        let pic_order_cnt_type =
            r.read_ue("pic_order_cnt_type", ReadOptions::new().check_range(0, 2))?;
        let pic_order_cnt = match pic_order_cnt_type {
            0 => PicOrderCntInfo::Type0 {
                log2_max_pic_order_cnt_lsb_minus4: r.read_ue(
                    "log2_max_pic_order_cnt_lsb_minus4",
                    ReadOptions::new().check_range(0, 12),
                )?,
            },
            1 => {
                let delta_pic_order_always_zero_flag =
                    r.flag("delta_pic_order_always_zero_flag")?;
                let offset_for_non_ref_pic = r.se("offset_for_non_ref_pic")?;
                let offset_for_top_to_bottom_field = r.se("offset_for_top_to_bottom_field")?;
                let cycle_len = r.read_ue(
                    "num_ref_frames_in_pic_order_cnt_cycle",
                    ReadOptions::new().check_range(0, 255),
                )?;
                let offset_for_ref_frame = (0..cycle_len)
                    .map(|i| r.se(&format!("offset_for_ref_frame[{i}]")))
                    .collect::<ParseResult<Vec<_>>>()?;
                PicOrderCntInfo::Type1 {
                    delta_pic_order_always_zero_flag,
                    offset_for_non_ref_pic,
                    offset_for_top_to_bottom_field,
                    offset_for_ref_frame,
                }
            }
            _ => PicOrderCntInfo::Type2,
        };

        let max_num_ref_frames =
            r.read_ue("max_num_ref_frames", ReadOptions::new().check_range(0, 16))?;
        let gaps_in_frame_num_value_allowed_flag =
            r.flag("gaps_in_frame_num_value_allowed_flag")?;
        let pic_width_in_mbs_minus1 = r.ue("pic_width_in_mbs_minus1")?;
        let pic_height_in_map_units_minus1 = r.ue("pic_height_in_map_units_minus1")?;
        let frame_mbs_only_flag = r.flag("frame_mbs_only_flag")?;
        let mb_adaptive_frame_field_flag = if frame_mbs_only_flag {
            false
        } else {
            r.flag("mb_adaptive_frame_field_flag")?
        };
        let direct_8x8_inference_flag = r.flag("direct_8x8_inference_flag")?;
        if !frame_mbs_only_flag && !direct_8x8_inference_flag {
            return Err(ParseError::structural(
                "AVC: frame_mbs_only_flag=0 时 direct_8x8_inference_flag 必须为 1",
            ));
        }

        let frame_cropping = if r.flag("frame_cropping_flag")? {
            Some(FrameCropping {
                left: r.ue("frame_crop_left_offset")?,
                right: r.ue("frame_crop_right_offset")?,
                top: r.ue("frame_crop_top_offset")?,
                bottom: r.ue("frame_crop_bottom_offset")?,
            })
        } else {
            None
        };

        let vui_parameters_present_flag = r.flag("vui_parameters_present_flag")?;
        let vui = if vui_parameters_present_flag {
            Some(VuiParameters::parse(
                r,
                VuiContext {
                    chroma_format_idc,
                    bit_depth_luma: bit_depth_luma_minus8 + 8,
                    bit_depth_chroma: bit_depth_chroma_minus8 + 8,
                },
            )?)
        } else {
            None
        };

        let mut sps = Self {
            profile_idc,
            constraint_set_flags,
            level_idc,
            seq_parameter_set_id,
            chroma_format_idc,
            separate_colour_plane_flag,
            bit_depth_luma_minus8,
            bit_depth_chroma_minus8,
            qpprime_y_zero_transform_bypass_flag,
            seq_scaling_matrix_present_flag,
            scaling_matrices,
            log2_max_frame_num_minus4,
            pic_order_cnt,
            max_num_ref_frames,
            gaps_in_frame_num_value_allowed_flag,
            pic_width_in_mbs_minus1,
            pic_height_in_map_units_minus1,
            frame_mbs_only_flag,
            mb_adaptive_frame_field_flag,
            direct_8x8_inference_flag,
            frame_cropping,
            vui,
            derived: SpsDerived::default(),
        };
        sps.derived = derive(&sps)?;
        log_derived(r, &sps.derived);

        debug!(
            "AVC: SPS id={}, profile={}, level={}, {}x{}, poc_type={}",
            sps.seq_parameter_set_id,
            sps.profile_idc,
            sps.level_idc,
            sps.derived.crop.width,
            sps.derived.crop.height,
            sps.pic_order_cnt.type_code()
        );
        Ok(sps)
    }

    /// 显示尺寸 (裁剪后)
    pub fn display_size(&self) -> (u32, u32) {
        (self.derived.crop.width, self.derived.crop.height)
    }

    pub fn pic_order_cnt_type(&self) -> u32 {
        self.pic_order_cnt.type_code()
    }

    /// 帧率, 仅当 VUI 中有 timing 信息时存在
    pub fn frame_rate(&self) -> Option<nalscope_core::Rational> {
        self.vui.as_ref()?.timing.map(|t| t.frame_rate)
    }
}

/// (SubWidthC, SubHeightC), 表 6-1
fn chroma_subsampling(chroma_format_idc: u32, separate_colour_plane_flag: bool) -> (u32, u32) {
    if separate_colour_plane_flag {
        return (0, 0);
    }
    match chroma_format_idc {
        1 => (2, 2),
        2 => (2, 1),
        3 => (1, 1),
        _ => (0, 0),
    }
}

/// 计算裁剪单位 (CropUnitX, CropUnitY)
fn cropping_unit(chroma_array_type: u32, sub: (u32, u32), frame_mbs_only: bool) -> (u32, u32) {
    let field_factor = if frame_mbs_only { 1 } else { 2 };
    if chroma_array_type == 0 {
        (1, field_factor)
    } else {
        (sub.0, sub.1 * field_factor)
    }
}

fn derive(sps: &Sps) -> ParseResult<SpsDerived> {
    let overflow = |what: &str| ParseError::constraint(format!("AVC: 计算 {what} 时发生溢出"));

    let bit_depth_luma = sps.bit_depth_luma_minus8 + 8;
    let bit_depth_chroma = sps.bit_depth_chroma_minus8 + 8;
    let chroma_array_type = if sps.separate_colour_plane_flag {
        0
    } else {
        sps.chroma_format_idc
    };
    let (sub_width_c, sub_height_c) =
        chroma_subsampling(sps.chroma_format_idc, sps.separate_colour_plane_flag);
    let (mb_width_c, mb_height_c) = if sub_width_c == 0 {
        (0, 0)
    } else {
        (16 / sub_width_c, 16 / sub_height_c)
    };

    let pic_width_in_mbs = sps
        .pic_width_in_mbs_minus1
        .checked_add(1)
        .ok_or_else(|| overflow("PicWidthInMbs"))?;
    let pic_height_in_map_units = sps
        .pic_height_in_map_units_minus1
        .checked_add(1)
        .ok_or_else(|| overflow("PicHeightInMapUnits"))?;
    let pic_size_in_map_units = pic_width_in_mbs
        .checked_mul(pic_height_in_map_units)
        .ok_or_else(|| overflow("PicSizeInMapUnits"))?;
    let frame_height_in_mbs = pic_height_in_map_units
        .checked_mul(if sps.frame_mbs_only_flag { 1 } else { 2 })
        .ok_or_else(|| overflow("FrameHeightInMbs"))?;
    let pic_size_in_mbs = pic_width_in_mbs
        .checked_mul(frame_height_in_mbs)
        .ok_or_else(|| overflow("PicSizeInMbs"))?;
    let pic_width_in_samples_luma = pic_width_in_mbs
        .checked_mul(16)
        .ok_or_else(|| overflow("PicWidthInSamplesL"))?;
    let frame_height_in_samples = frame_height_in_mbs
        .checked_mul(16)
        .ok_or_else(|| overflow("FrameHeightInSamples"))?;

    let (crop_unit_x, crop_unit_y) = cropping_unit(
        chroma_array_type,
        (sub_width_c, sub_height_c),
        sps.frame_mbs_only_flag,
    );
    let c = sps.frame_cropping.unwrap_or_default();
    let crop_x = c
        .left
        .checked_add(c.right)
        .and_then(|v| v.checked_mul(crop_unit_x))
        .ok_or_else(|| overflow("水平裁剪"))?;
    let crop_y = c
        .top
        .checked_add(c.bottom)
        .and_then(|v| v.checked_mul(crop_unit_y))
        .ok_or_else(|| overflow("垂直裁剪"))?;
    if crop_x >= pic_width_in_samples_luma || crop_y >= frame_height_in_samples {
        return Err(ParseError::constraint(format!(
            "AVC: frame_crop 偏移使图像为空, raw={}x{}, crop_x={}, crop_y={}",
            pic_width_in_samples_luma, frame_height_in_samples, crop_x, crop_y
        )));
    }
    let crop = CropRect {
        x: crop_unit_x * c.left,
        y: crop_unit_y * c.top,
        width: pic_width_in_samples_luma - crop_x,
        height: frame_height_in_samples - crop_y,
    };

    let (max_pic_order_cnt_lsb, expected_delta) = match &sps.pic_order_cnt {
        PicOrderCntInfo::Type0 {
            log2_max_pic_order_cnt_lsb_minus4,
        } => (1u32 << (log2_max_pic_order_cnt_lsb_minus4 + 4), 0),
        PicOrderCntInfo::Type1 {
            offset_for_ref_frame,
            ..
        } => (
            0,
            offset_for_ref_frame.iter().map(|&v| i64::from(v)).sum::<i64>(),
        ),
        PicOrderCntInfo::Type2 => (0, 0),
    };

    Ok(SpsDerived {
        bit_depth_luma,
        bit_depth_chroma,
        qp_bd_offset_luma: 6 * sps.bit_depth_luma_minus8,
        qp_bd_offset_chroma: 6 * sps.bit_depth_chroma_minus8,
        chroma_array_type,
        sub_width_c,
        sub_height_c,
        mb_width_c,
        mb_height_c,
        pic_width_in_mbs,
        pic_height_in_map_units,
        pic_size_in_map_units,
        frame_height_in_mbs,
        pic_height_in_mbs: frame_height_in_mbs,
        pic_size_in_mbs,
        pic_width_in_samples_luma,
        pic_width_in_samples_chroma: pic_width_in_mbs * mb_width_c,
        crop_unit_x,
        crop_unit_y,
        crop,
        max_frame_num: 1 << (sps.log2_max_frame_num_minus4 + 4),
        max_pic_order_cnt_lsb,
        expected_delta_per_pic_order_cnt_cycle: expected_delta,
    })
}

fn log_derived(r: &mut SyntaxReader<'_>, d: &SpsDerived) {
    r.log_calculated("BitDepthY", d.bit_depth_luma);
    r.log_calculated("BitDepthC", d.bit_depth_chroma);
    r.log_calculated("QpBdOffsetY", d.qp_bd_offset_luma);
    r.log_calculated("QpBdOffsetC", d.qp_bd_offset_chroma);
    r.log_calculated("ChromaArrayType", d.chroma_array_type);
    r.log_calculated("SubWidthC", d.sub_width_c);
    r.log_calculated("SubHeightC", d.sub_height_c);
    r.log_calculated("MbWidthC", d.mb_width_c);
    r.log_calculated("MbHeightC", d.mb_height_c);
    r.log_calculated("PicWidthInMbs", d.pic_width_in_mbs);
    r.log_calculated("PicHeightInMapUnits", d.pic_height_in_map_units);
    r.log_calculated("PicSizeInMapUnits", d.pic_size_in_map_units);
    r.log_calculated("FrameHeightInMbs", d.frame_height_in_mbs);
    r.log_calculated("PicWidthInSamplesL", d.pic_width_in_samples_luma);
    r.log_calculated("PicWidthInSamplesC", d.pic_width_in_samples_chroma);
    r.log_calculated("CropUnitX", d.crop_unit_x);
    r.log_calculated("CropUnitY", d.crop_unit_y);
    r.log_calculated_with(
        "DisplaySize",
        format!("{}x{}", d.crop.width, d.crop.height),
        Some("裁剪后尺寸"),
    );
    r.log_calculated("MaxFrameNum", d.max_frame_num);
    if d.max_pic_order_cnt_lsb > 0 {
        r.log_calculated("MaxPicOrderCntLsb", d.max_pic_order_cnt_lsb);
    }
}

/// rbsp_trailing_bits()
///
/// 停止位之后的字节不报错: 全 0 (cabac_zero_word 或填充) 与其他多余数据都只记一条注释.
pub(crate) fn read_trailing_bits(r: &mut SyntaxReader<'_>) -> ParseResult<()> {
    r.read_flag("rbsp_stop_one_bit", ReadOptions::new().check_equal_to(1))?;
    while !r.byte_aligned() {
        r.read_flag("rbsp_alignment_zero_bit", ReadOptions::new().check_equal_to(0))?;
    }
    let rest = r.remaining_bytes();
    if rest.is_empty() {
        return Ok(());
    }
    let len = rest.len();
    if rest.iter().all(|&b| b == 0) {
        r.log_note(format!("rbsp_trailing_bits 之后有 {len} 字节 0 填充"));
    } else {
        debug!("rbsp_trailing_bits 之后有多余数据, len={len}");
        r.log_note(format!("rbsp_trailing_bits 之后有 {len} 字节多余数据, 已忽略"));
    }
    Ok(())
}
