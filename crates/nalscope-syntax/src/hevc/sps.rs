//! HEVC 序列参数集 (seq_parameter_set_rbsp, 7.3.2.2).
//!
//! 短期 RPS 列表保存在各自的 SPS 内, 帧间 RPS 预测只引用同一 SPS 中的集合.

use log::debug;
use nalscope_core::{
    ParameterSet, ParseError, ParseResult, Rational, ReadOptions, SyntaxReader,
};

use super::ptl::ProfileTierLevel;
use super::rps::ShortTermRps;
use super::scaling::ScalingListData;
use super::vps::{SubLayerOrdering, parse_sub_layer_ordering};
use super::vui::VuiParameters;
use crate::avc::sps::read_trailing_bits;
use crate::avc::tables::ChromaFormat;

/// 一致性窗口偏移 (以色度采样为单位)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConformanceWindow {
    pub left_offset: u32,
    pub right_offset: u32,
    pub top_offset: u32,
    pub bottom_offset: u32,
}

/// 裁剪后的显示矩形 (亮度采样单位)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmParameters {
    pub pcm_sample_bit_depth_luma_minus1: u32,
    pub pcm_sample_bit_depth_chroma_minus1: u32,
    pub log2_min_pcm_luma_coding_block_size_minus3: u32,
    pub log2_diff_max_min_pcm_luma_coding_block_size: u32,
    pub pcm_loop_filter_disabled_flag: bool,
}

/// SPS 中的长期参考图像候选
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LongTermRefPic {
    pub lt_ref_pic_poc_lsb_sps: u32,
    pub used_by_curr_pic_lt_sps_flag: bool,
}

/// sps_range_extension() (7.3.2.2.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpsRangeExtension {
    pub transform_skip_rotation_enabled_flag: bool,
    pub transform_skip_context_enabled_flag: bool,
    pub implicit_rdpcm_enabled_flag: bool,
    pub explicit_rdpcm_enabled_flag: bool,
    pub extended_precision_processing_flag: bool,
    pub intra_smoothing_disabled_flag: bool,
    pub high_precision_offsets_enabled_flag: bool,
    pub persistent_rice_adaptation_enabled_flag: bool,
    pub cabac_bypass_alignment_enabled_flag: bool,
}

/// sps_extension_present_flag 之后的扩展标志
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpsExtensionFlags {
    pub sps_range_extension_flag: bool,
    pub sps_multilayer_extension_flag: bool,
    pub sps_3d_extension_flag: bool,
    pub sps_scc_extension_flag: bool,
    pub sps_extension_4bits: u32,
}

/// SPS 推导变量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpsDerived {
    pub chroma_array_type: u32,
    pub sub_width_c: u32,
    pub sub_height_c: u32,
    pub bit_depth_luma: u32,
    pub bit_depth_chroma: u32,
    pub qp_bd_offset_luma: u32,
    pub qp_bd_offset_chroma: u32,
    pub max_pic_order_cnt_lsb: u32,
    pub min_cb_log2_size_y: u32,
    pub min_cb_size_y: u32,
    pub ctb_log2_size_y: u32,
    pub ctb_size_y: u32,
    pub min_tb_log2_size_y: u32,
    pub max_tb_log2_size_y: u32,
    pub pic_width_in_min_cbs_y: u32,
    pub pic_height_in_min_cbs_y: u32,
    pub pic_width_in_ctbs_y: u32,
    pub pic_height_in_ctbs_y: u32,
    pub pic_size_in_ctbs_y: u32,
    pub crop: CropRect,
}

/// 序列参数集
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sps {
    pub sps_video_parameter_set_id: u32,
    pub sps_max_sub_layers_minus1: u32,
    pub sps_temporal_id_nesting_flag: bool,
    pub profile_tier_level: ProfileTierLevel,
    pub sps_seq_parameter_set_id: u32,
    pub chroma_format_idc: u32,
    pub separate_colour_plane_flag: bool,
    pub pic_width_in_luma_samples: u32,
    pub pic_height_in_luma_samples: u32,
    pub conformance_window: Option<ConformanceWindow>,
    pub bit_depth_luma_minus8: u32,
    pub bit_depth_chroma_minus8: u32,
    pub log2_max_pic_order_cnt_lsb_minus4: u32,
    pub sps_sub_layer_ordering_info_present_flag: bool,
    /// 已填满全部子层
    pub sub_layer_ordering: Vec<SubLayerOrdering>,
    pub log2_min_luma_coding_block_size_minus3: u32,
    pub log2_diff_max_min_luma_coding_block_size: u32,
    pub log2_min_luma_transform_block_size_minus2: u32,
    pub log2_diff_max_min_luma_transform_block_size: u32,
    pub max_transform_hierarchy_depth_inter: u32,
    pub max_transform_hierarchy_depth_intra: u32,
    pub scaling_list_enabled_flag: bool,
    pub sps_scaling_list_data_present_flag: bool,
    /// scaling_list_enabled_flag=1 时有效; 无显式数据时为默认矩阵
    pub scaling_list: Option<ScalingListData>,
    pub amp_enabled_flag: bool,
    pub sample_adaptive_offset_enabled_flag: bool,
    pub pcm: Option<PcmParameters>,
    pub short_term_ref_pic_sets: Vec<ShortTermRps>,
    pub long_term_ref_pics_present_flag: bool,
    pub long_term_ref_pics: Vec<LongTermRefPic>,
    pub sps_temporal_mvp_enabled_flag: bool,
    pub strong_intra_smoothing_enabled_flag: bool,
    pub vui: Option<VuiParameters>,
    pub extension_flags: SpsExtensionFlags,
    pub range_extension: Option<SpsRangeExtension>,
    /// sps_multilayer_extension() 的 inter_view_mv_vert_constraint_flag
    pub inter_view_mv_vert_constraint_flag: Option<bool>,
    pub derived: SpsDerived,
}

impl ParameterSet for Sps {
    const KIND: &'static str = "SPS";
}

impl Sps {
    /// 解析 seq_parameter_set_rbsp(), `nuh_layer_id` 取自 NAL 头部
    pub fn parse(r: &mut SyntaxReader<'_>, nuh_layer_id: u32) -> ParseResult<Self> {
        r.sub_level("seq_parameter_set_rbsp()", |r| Self::parse_body(r, nuh_layer_id))
    }

    fn parse_body(r: &mut SyntaxReader<'_>, nuh_layer_id: u32) -> ParseResult<Self> {
        let sps_video_parameter_set_id = r.bits("sps_video_parameter_set_id", 4)?;
        let sps_max_sub_layers_minus1 = if nuh_layer_id == 0 {
            r.read_bits("sps_max_sub_layers_minus1", 3, ReadOptions::new().check_range(0, 6))?
        } else {
            let v = r.bits("sps_ext_or_max_sub_layers_minus1", 3)?;
            if v == 7 {
                return Err(ParseError::Unsupported(format!(
                    "HEVC: 多层扩展 SPS (MultiLayerExtSpsFlag=1) 未支持, nuh_layer_id={nuh_layer_id}"
                )));
            }
            v
        };
        let sps_temporal_id_nesting_flag = r.flag("sps_temporal_id_nesting_flag")?;
        let profile_tier_level = ProfileTierLevel::parse(r, true, sps_max_sub_layers_minus1)?;

        let sps_seq_parameter_set_id =
            r.read_ue("sps_seq_parameter_set_id", ReadOptions::new().check_range(0, 15))?;
        let chroma_format_idc = r.read_ue(
            "chroma_format_idc",
            ReadOptions::new()
                .check_range(0, 3)
                .meaning_map::<ChromaFormat>(),
        )?;
        let separate_colour_plane_flag =
            chroma_format_idc == 3 && r.flag("separate_colour_plane_flag")?;
        let pic_width_in_luma_samples =
            r.read_ue("pic_width_in_luma_samples", ReadOptions::new().check_greater(0))?;
        let pic_height_in_luma_samples =
            r.read_ue("pic_height_in_luma_samples", ReadOptions::new().check_greater(0))?;
        let conformance_window = if r.flag("conformance_window_flag")? {
            Some(ConformanceWindow {
                left_offset: r.ue("conf_win_left_offset")?,
                right_offset: r.ue("conf_win_right_offset")?,
                top_offset: r.ue("conf_win_top_offset")?,
                bottom_offset: r.ue("conf_win_bottom_offset")?,
            })
        } else {
            None
        };
        let bit_depth_luma_minus8 =
            r.read_ue("bit_depth_luma_minus8", ReadOptions::new().check_range(0, 8))?;
        let bit_depth_chroma_minus8 =
            r.read_ue("bit_depth_chroma_minus8", ReadOptions::new().check_range(0, 8))?;
        let log2_max_pic_order_cnt_lsb_minus4 = r.read_ue(
            "log2_max_pic_order_cnt_lsb_minus4",
            ReadOptions::new().check_range(0, 12),
        )?;

        let sps_sub_layer_ordering_info_present_flag =
            r.flag("sps_sub_layer_ordering_info_present_flag")?;
        let sub_layer_ordering = parse_sub_layer_ordering(
            r,
            "sps",
            sps_sub_layer_ordering_info_present_flag,
            sps_max_sub_layers_minus1,
        )?;

        let log2_min_luma_coding_block_size_minus3 = r.read_ue(
            "log2_min_luma_coding_block_size_minus3",
            ReadOptions::new().check_range(0, 3),
        )?;
        let log2_diff_max_min_luma_coding_block_size = r.read_ue(
            "log2_diff_max_min_luma_coding_block_size",
            ReadOptions::new().check_range(0, 3),
        )?;
        let min_cb_log2_size_y = log2_min_luma_coding_block_size_minus3 + 3;
        let ctb_log2_size_y = min_cb_log2_size_y + log2_diff_max_min_luma_coding_block_size;
        if !(4..=6).contains(&ctb_log2_size_y) {
            return Err(ParseError::constraint(format!(
                "HEVC: CtbLog2SizeY 超出范围 [4, 6], value={ctb_log2_size_y}"
            )));
        }
        let min_cb_size_y = 1 << min_cb_log2_size_y;
        for (name, value) in [
            ("pic_width_in_luma_samples", pic_width_in_luma_samples),
            ("pic_height_in_luma_samples", pic_height_in_luma_samples),
        ] {
            if value % min_cb_size_y != 0 {
                return Err(ParseError::constraint(format!(
                    "HEVC: {name} 必须是 MinCbSizeY 的整数倍, value={value}, MinCbSizeY={min_cb_size_y}"
                )));
            }
        }

        let log2_min_luma_transform_block_size_minus2 = r.read_ue(
            "log2_min_luma_transform_block_size_minus2",
            ReadOptions::new().check_range(0, i64::from(min_cb_log2_size_y) - 3),
        )?;
        let min_tb_log2_size_y = log2_min_luma_transform_block_size_minus2 + 2;
        let log2_diff_max_min_luma_transform_block_size = r.read_ue(
            "log2_diff_max_min_luma_transform_block_size",
            ReadOptions::new().check_range(
                0,
                i64::from(ctb_log2_size_y.min(5)) - i64::from(min_tb_log2_size_y),
            ),
        )?;
        let max_tb_log2_size_y = min_tb_log2_size_y + log2_diff_max_min_luma_transform_block_size;
        let max_depth = i64::from(ctb_log2_size_y - min_tb_log2_size_y);
        let max_transform_hierarchy_depth_inter = r.read_ue(
            "max_transform_hierarchy_depth_inter",
            ReadOptions::new().check_range(0, max_depth),
        )?;
        let max_transform_hierarchy_depth_intra = r.read_ue(
            "max_transform_hierarchy_depth_intra",
            ReadOptions::new().check_range(0, max_depth),
        )?;

        let scaling_list_enabled_flag = r.flag("scaling_list_enabled_flag")?;
        let mut sps_scaling_list_data_present_flag = false;
        let scaling_list = if scaling_list_enabled_flag {
            sps_scaling_list_data_present_flag = r.flag("sps_scaling_list_data_present_flag")?;
            if sps_scaling_list_data_present_flag {
                Some(ScalingListData::parse(r)?)
            } else {
                Some(ScalingListData::default())
            }
        } else {
            None
        };

        let amp_enabled_flag = r.flag("amp_enabled_flag")?;
        let sample_adaptive_offset_enabled_flag = r.flag("sample_adaptive_offset_enabled_flag")?;
        let bit_depth_luma = bit_depth_luma_minus8 + 8;
        let bit_depth_chroma = bit_depth_chroma_minus8 + 8;
        let pcm = if r.flag("pcm_enabled_flag")? {
            Some(parse_pcm(r, bit_depth_luma, bit_depth_chroma, ctb_log2_size_y)?)
        } else {
            None
        };

        let num_short_term_ref_pic_sets = r.read_ue(
            "num_short_term_ref_pic_sets",
            ReadOptions::new().check_range(0, 64),
        )? as usize;
        let max_dec_pic_buffering_minus1 = sub_layer_ordering
            .last()
            .map_or(0, |o| o.max_dec_pic_buffering_minus1);
        let mut short_term_ref_pic_sets = Vec::with_capacity(num_short_term_ref_pic_sets);
        for i in 0..num_short_term_ref_pic_sets {
            let rps = ShortTermRps::parse(
                r,
                i,
                num_short_term_ref_pic_sets,
                &short_term_ref_pic_sets,
                max_dec_pic_buffering_minus1,
            )?;
            short_term_ref_pic_sets.push(rps);
        }

        let long_term_ref_pics_present_flag = r.flag("long_term_ref_pics_present_flag")?;
        let mut long_term_ref_pics = Vec::new();
        if long_term_ref_pics_present_flag {
            let n = r.read_ue("num_long_term_ref_pics_sps", ReadOptions::new().check_range(0, 32))?;
            let width = log2_max_pic_order_cnt_lsb_minus4 + 4;
            for i in 0..n {
                long_term_ref_pics.push(LongTermRefPic {
                    lt_ref_pic_poc_lsb_sps: r.bits(&format!("lt_ref_pic_poc_lsb_sps[{i}]"), width)?,
                    used_by_curr_pic_lt_sps_flag: r
                        .flag(&format!("used_by_curr_pic_lt_sps_flag[{i}]"))?,
                });
            }
        }

        let sps_temporal_mvp_enabled_flag = r.flag("sps_temporal_mvp_enabled_flag")?;
        let strong_intra_smoothing_enabled_flag = r.flag("strong_intra_smoothing_enabled_flag")?;
        let vui = if r.flag("vui_parameters_present_flag")? {
            Some(VuiParameters::parse(r, sps_max_sub_layers_minus1)?)
        } else {
            None
        };

        let mut extension_flags = SpsExtensionFlags::default();
        if r.flag("sps_extension_present_flag")? {
            extension_flags = SpsExtensionFlags {
                sps_range_extension_flag: r.flag("sps_range_extension_flag")?,
                sps_multilayer_extension_flag: r.flag("sps_multilayer_extension_flag")?,
                sps_3d_extension_flag: r.flag("sps_3d_extension_flag")?,
                sps_scc_extension_flag: r.flag("sps_scc_extension_flag")?,
                sps_extension_4bits: r.bits("sps_extension_4bits", 4)?,
            };
        }
        let range_extension = if extension_flags.sps_range_extension_flag {
            Some(parse_range_extension(r)?)
        } else {
            None
        };
        let inter_view_mv_vert_constraint_flag = if extension_flags.sps_multilayer_extension_flag {
            Some(r.sub_level("sps_multilayer_extension()", |r| {
                r.flag("inter_view_mv_vert_constraint_flag")
            })?)
        } else {
            None
        };
        if extension_flags.sps_3d_extension_flag
            || extension_flags.sps_scc_extension_flag
            || extension_flags.sps_extension_4bits != 0
        {
            r.log_note("sps_3d_extension() / sps_scc_extension() / sps_extension_data_flag 未解析");
        } else {
            read_trailing_bits(r)?;
        }

        let mut sps = Self {
            sps_video_parameter_set_id,
            sps_max_sub_layers_minus1,
            sps_temporal_id_nesting_flag,
            profile_tier_level,
            sps_seq_parameter_set_id,
            chroma_format_idc,
            separate_colour_plane_flag,
            pic_width_in_luma_samples,
            pic_height_in_luma_samples,
            conformance_window,
            bit_depth_luma_minus8,
            bit_depth_chroma_minus8,
            log2_max_pic_order_cnt_lsb_minus4,
            sps_sub_layer_ordering_info_present_flag,
            sub_layer_ordering,
            log2_min_luma_coding_block_size_minus3,
            log2_diff_max_min_luma_coding_block_size,
            log2_min_luma_transform_block_size_minus2,
            log2_diff_max_min_luma_transform_block_size,
            max_transform_hierarchy_depth_inter,
            max_transform_hierarchy_depth_intra,
            scaling_list_enabled_flag,
            sps_scaling_list_data_present_flag,
            scaling_list,
            amp_enabled_flag,
            sample_adaptive_offset_enabled_flag,
            pcm,
            short_term_ref_pic_sets,
            long_term_ref_pics_present_flag,
            long_term_ref_pics,
            sps_temporal_mvp_enabled_flag,
            strong_intra_smoothing_enabled_flag,
            vui,
            extension_flags,
            range_extension,
            inter_view_mv_vert_constraint_flag,
            derived: SpsDerived {
                min_tb_log2_size_y,
                max_tb_log2_size_y,
                ..Default::default()
            },
        };
        sps.derived = sps.derive()?;
        log_derived(r, &sps.derived);
        debug!(
            "HEVC: SPS 解析完成, id={}, {}x{}, ctb={}",
            sps.sps_seq_parameter_set_id,
            sps.derived.crop.width,
            sps.derived.crop.height,
            sps.derived.ctb_size_y
        );
        Ok(sps)
    }

    /// 计算推导变量, 裁剪后为空时报错
    fn derive(&self) -> ParseResult<SpsDerived> {
        let chroma_array_type = if self.separate_colour_plane_flag {
            0
        } else {
            self.chroma_format_idc
        };
        // 表 6-1, 单色与独立色彩平面均为 (1, 1)
        let (sub_width_c, sub_height_c) = match (self.chroma_format_idc, self.separate_colour_plane_flag) {
            (1, _) => (2, 2),
            (2, _) => (2, 1),
            _ => (1, 1),
        };
        let min_cb_log2_size_y = self.log2_min_luma_coding_block_size_minus3 + 3;
        let ctb_log2_size_y = min_cb_log2_size_y + self.log2_diff_max_min_luma_coding_block_size;
        let min_cb_size_y = 1 << min_cb_log2_size_y;
        let ctb_size_y = 1 << ctb_log2_size_y;
        let w = self.pic_width_in_luma_samples;
        let h = self.pic_height_in_luma_samples;
        let pic_width_in_ctbs_y = w.div_ceil(ctb_size_y);
        let pic_height_in_ctbs_y = h.div_ceil(ctb_size_y);

        let window = self.conformance_window.unwrap_or_default();
        let crop_x = sub_width_c * (window.left_offset + window.right_offset);
        let crop_y = sub_height_c * (window.top_offset + window.bottom_offset);
        if crop_x >= w || crop_y >= h {
            return Err(ParseError::constraint(format!(
                "HEVC: 一致性窗口裁剪后图像为空, width={w}, height={h}, conf_win=({}, {}, {}, {})",
                window.left_offset, window.right_offset, window.top_offset, window.bottom_offset
            )));
        }

        Ok(SpsDerived {
            chroma_array_type,
            sub_width_c,
            sub_height_c,
            bit_depth_luma: self.bit_depth_luma_minus8 + 8,
            bit_depth_chroma: self.bit_depth_chroma_minus8 + 8,
            qp_bd_offset_luma: 6 * self.bit_depth_luma_minus8,
            qp_bd_offset_chroma: 6 * self.bit_depth_chroma_minus8,
            max_pic_order_cnt_lsb: 1 << (self.log2_max_pic_order_cnt_lsb_minus4 + 4),
            min_cb_log2_size_y,
            min_cb_size_y,
            ctb_log2_size_y,
            ctb_size_y,
            min_tb_log2_size_y: self.derived.min_tb_log2_size_y,
            max_tb_log2_size_y: self.derived.max_tb_log2_size_y,
            pic_width_in_min_cbs_y: w / min_cb_size_y,
            pic_height_in_min_cbs_y: h / min_cb_size_y,
            pic_width_in_ctbs_y,
            pic_height_in_ctbs_y,
            pic_size_in_ctbs_y: pic_width_in_ctbs_y * pic_height_in_ctbs_y,
            crop: CropRect {
                x: sub_width_c * window.left_offset,
                y: sub_height_c * window.top_offset,
                width: w - crop_x,
                height: h - crop_y,
            },
        })
    }

    /// 最高子层的 sps_max_dec_pic_buffering_minus1
    pub fn max_dec_pic_buffering_minus1(&self) -> u32 {
        self.sub_layer_ordering
            .last()
            .map_or(0, |o| o.max_dec_pic_buffering_minus1)
    }

    /// 裁剪后的显示尺寸
    pub fn display_size(&self) -> (u32, u32) {
        (self.derived.crop.width, self.derived.crop.height)
    }

    /// 帧率, 仅当 VUI 中有 timing 信息时存在
    pub fn frame_rate(&self) -> Option<Rational> {
        self.vui.as_ref()?.timing.as_ref().map(|t| t.frame_rate)
    }
}

fn parse_pcm(
    r: &mut SyntaxReader<'_>,
    bit_depth_luma: u32,
    bit_depth_chroma: u32,
    ctb_log2_size_y: u32,
) -> ParseResult<PcmParameters> {
    let pcm_sample_bit_depth_luma_minus1 = r.read_bits(
        "pcm_sample_bit_depth_luma_minus1",
        4,
        ReadOptions::new().check_range(0, i64::from(bit_depth_luma) - 1),
    )?;
    let pcm_sample_bit_depth_chroma_minus1 = r.read_bits(
        "pcm_sample_bit_depth_chroma_minus1",
        4,
        ReadOptions::new().check_range(0, i64::from(bit_depth_chroma) - 1),
    )?;
    let log2_min_pcm_luma_coding_block_size_minus3 = r.read_ue(
        "log2_min_pcm_luma_coding_block_size_minus3",
        ReadOptions::new().check_range(0, 2),
    )?;
    let max_log2 = i64::from(ctb_log2_size_y.min(5));
    let log2_diff_max_min_pcm_luma_coding_block_size = r.read_ue(
        "log2_diff_max_min_pcm_luma_coding_block_size",
        ReadOptions::new().check_range(
            0,
            (max_log2 - i64::from(log2_min_pcm_luma_coding_block_size_minus3) - 3).max(0),
        ),
    )?;
    Ok(PcmParameters {
        pcm_sample_bit_depth_luma_minus1,
        pcm_sample_bit_depth_chroma_minus1,
        log2_min_pcm_luma_coding_block_size_minus3,
        log2_diff_max_min_pcm_luma_coding_block_size,
        pcm_loop_filter_disabled_flag: r.flag("pcm_loop_filter_disabled_flag")?,
    })
}

fn parse_range_extension(r: &mut SyntaxReader<'_>) -> ParseResult<SpsRangeExtension> {
    r.sub_level("sps_range_extension()", |r| {
        Ok(SpsRangeExtension {
            transform_skip_rotation_enabled_flag: r.flag("transform_skip_rotation_enabled_flag")?,
            transform_skip_context_enabled_flag: r.flag("transform_skip_context_enabled_flag")?,
            implicit_rdpcm_enabled_flag: r.flag("implicit_rdpcm_enabled_flag")?,
            explicit_rdpcm_enabled_flag: r.flag("explicit_rdpcm_enabled_flag")?,
            extended_precision_processing_flag: r.flag("extended_precision_processing_flag")?,
            intra_smoothing_disabled_flag: r.flag("intra_smoothing_disabled_flag")?,
            high_precision_offsets_enabled_flag: r.flag("high_precision_offsets_enabled_flag")?,
            persistent_rice_adaptation_enabled_flag: r
                .flag("persistent_rice_adaptation_enabled_flag")?,
            cabac_bypass_alignment_enabled_flag: r.flag("cabac_bypass_alignment_enabled_flag")?,
        })
    })
}

fn log_derived(r: &mut SyntaxReader<'_>, d: &SpsDerived) {
    r.log_calculated("ChromaArrayType", d.chroma_array_type);
    r.log_calculated("SubWidthC", d.sub_width_c);
    r.log_calculated("SubHeightC", d.sub_height_c);
    r.log_calculated("MinCbLog2SizeY", d.min_cb_log2_size_y);
    r.log_calculated("CtbLog2SizeY", d.ctb_log2_size_y);
    r.log_calculated("CtbSizeY", d.ctb_size_y);
    r.log_calculated("PicWidthInCtbsY", d.pic_width_in_ctbs_y);
    r.log_calculated("PicHeightInCtbsY", d.pic_height_in_ctbs_y);
    r.log_calculated("PicSizeInCtbsY", d.pic_size_in_ctbs_y);
    r.log_calculated("MaxPicOrderCntLsb", d.max_pic_order_cnt_lsb);
}
