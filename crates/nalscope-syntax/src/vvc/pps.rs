//! VVC 图像参数集 (pic_parameter_set_rbsp, 7.3.2.5).
//!
//! 与 HEVC 不同, VVC PPS 自带图像尺寸与 tile/条带划分, 划分推导需要
//! 所引用 SPS 的 CTU 尺寸与子图像信息, 因此 SPS 必须先到达.

use log::debug;
use nalscope_core::{ParameterSet, ParameterSetStore, ParseError, ParseResult, ReadOptions, SyntaxReader};

use super::layout::PictureLayout;
use super::sps::Sps;
use crate::avc::sps::read_trailing_bits;
use crate::hevc::pps::Parallelism;
use crate::hevc::sps::ConformanceWindow;

/// 缩放窗口偏移 (有符号)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScalingWindow {
    pub left_offset: i32,
    pub right_offset: i32,
    pub top_offset: i32,
    pub bottom_offset: i32,
}

/// 矩形条带的语法元素, 不存在的元素按推导值记录
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RectSliceSyntax {
    pub pps_slice_width_in_tiles_minus1: u32,
    pub pps_slice_height_in_tiles_minus1: u32,
    pub pps_num_exp_slices_in_tile: u32,
    pub pps_exp_slice_height_in_ctus_minus1: Vec<u32>,
    pub pps_tile_idx_delta_val: Option<i32>,
}

/// pps_no_pic_partition_flag=0 时的划分语法
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PicPartition {
    pub pps_log2_ctu_size_minus5: u32,
    pub pps_tile_column_width_minus1: Vec<u32>,
    pub pps_tile_row_height_minus1: Vec<u32>,
    pub pps_loop_filter_across_tiles_enabled_flag: bool,
    pub pps_rect_slice_flag: bool,
    pub pps_single_slice_per_subpic_flag: bool,
    pub pps_num_slices_in_pic_minus1: u32,
    pub pps_tile_idx_delta_present_flag: bool,
    pub rect_slices: Vec<RectSliceSyntax>,
    pub pps_loop_filter_across_slices_enabled_flag: bool,
}

/// pps_chroma_tool_offsets_present_flag=1 时的色度 QP 偏移
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChromaToolOffsets {
    pub pps_cb_qp_offset: i32,
    pub pps_cr_qp_offset: i32,
    pub pps_joint_cbcr_qp_offset_present_flag: bool,
    pub pps_joint_cbcr_qp_offset_value: i32,
    pub pps_slice_chroma_qp_offsets_present_flag: bool,
    pub pps_cu_chroma_qp_offset_list_enabled_flag: bool,
    /// (cb, cr, joint_cbcr)
    pub qp_offset_list: Vec<(i32, i32, i32)>,
}

/// 去块滤波控制
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PpsDeblocking {
    pub pps_deblocking_filter_override_enabled_flag: bool,
    pub pps_deblocking_filter_disabled_flag: bool,
    pub pps_dbf_info_in_ph_flag: bool,
    pub pps_luma_beta_offset_div2: i32,
    pub pps_luma_tc_offset_div2: i32,
    pub pps_cb_beta_offset_div2: i32,
    pub pps_cb_tc_offset_div2: i32,
    pub pps_cr_beta_offset_div2: i32,
    pub pps_cr_tc_offset_div2: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pps {
    pub pps_pic_parameter_set_id: u32,
    pub pps_seq_parameter_set_id: u32,
    pub pps_mixed_nalu_types_in_pic_flag: bool,
    pub pps_pic_width_in_luma_samples: u32,
    pub pps_pic_height_in_luma_samples: u32,
    pub conformance_window: Option<ConformanceWindow>,
    pub scaling_window: Option<ScalingWindow>,
    pub pps_output_flag_present_flag: bool,
    pub pps_no_pic_partition_flag: bool,
    pub pps_subpic_id_mapping_present_flag: bool,
    pub pps_num_subpics_minus1: u32,
    pub pps_subpic_id_len_minus1: u32,
    pub pps_subpic_id: Vec<u32>,
    pub partition: Option<PicPartition>,
    pub pps_cabac_init_present_flag: bool,
    pub pps_num_ref_idx_default_active_minus1: [u32; 2],
    pub pps_rpl1_idx_present_flag: bool,
    pub pps_weighted_pred_flag: bool,
    pub pps_weighted_bipred_flag: bool,
    pub pps_ref_wraparound_enabled_flag: bool,
    pub pps_pic_width_minus_wraparound_offset: u32,
    pub pps_init_qp_minus26: i32,
    pub pps_cu_qp_delta_enabled_flag: bool,
    pub chroma_tool_offsets: Option<ChromaToolOffsets>,
    pub deblocking: Option<PpsDeblocking>,
    pub pps_rpl_info_in_ph_flag: bool,
    pub pps_sao_info_in_ph_flag: bool,
    pub pps_alf_info_in_ph_flag: bool,
    pub pps_wp_info_in_ph_flag: bool,
    pub pps_qp_delta_info_in_ph_flag: bool,
    pub pps_picture_header_extension_present_flag: bool,
    pub pps_slice_header_extension_present_flag: bool,
    pub pps_extension_flag: bool,
    /// tile 与条带划分
    pub layout: PictureLayout,
    /// SubpicIdVal
    pub subpic_id_val: Vec<u32>,
    /// 引用 SPS 的 sps_entropy_coding_sync_enabled_flag
    pub entropy_coding_sync: bool,
}

impl ParameterSet for Pps {
    const KIND: &'static str = "PPS";
}

impl Pps {
    pub fn parse(r: &mut SyntaxReader<'_>, sps_store: &ParameterSetStore<Sps>) -> ParseResult<Self> {
        let pps = r.sub_level("pic_parameter_set_rbsp()", |r| {
            let pps_pic_parameter_set_id = r.bits("pps_pic_parameter_set_id", 6)?;
            let pps_seq_parameter_set_id = r.bits("pps_seq_parameter_set_id", 4)?;
            let sps = sps_store.get(pps_seq_parameter_set_id)?;
            Self::parse_body(r, sps, pps_pic_parameter_set_id, pps_seq_parameter_set_id)
        })?;
        debug!(
            "VVC: PPS id={}, sps_id={}, {}x{}, tiles={}, slices={}, parallelism={}",
            pps.pps_pic_parameter_set_id,
            pps.pps_seq_parameter_set_id,
            pps.pps_pic_width_in_luma_samples,
            pps.pps_pic_height_in_luma_samples,
            pps.num_tiles(),
            pps.layout.slices.len(),
            pps.parallelism().as_str()
        );
        Ok(pps)
    }

    fn parse_body(
        r: &mut SyntaxReader<'_>,
        sps: &Sps,
        pps_pic_parameter_set_id: u32,
        pps_seq_parameter_set_id: u32,
    ) -> ParseResult<Self> {
        let mut pps = Self {
            pps_pic_parameter_set_id,
            pps_seq_parameter_set_id,
            pps_mixed_nalu_types_in_pic_flag: r.flag("pps_mixed_nalu_types_in_pic_flag")?,
            entropy_coding_sync: sps.sps_entropy_coding_sync_enabled_flag,
            ..Default::default()
        };
        pps.parse_picture_size(r, sps)?;
        pps.pps_output_flag_present_flag = r.flag("pps_output_flag_present_flag")?;
        pps.pps_no_pic_partition_flag = r.flag("pps_no_pic_partition_flag")?;
        if pps.pps_no_pic_partition_flag && sps.num_subpics() > 1 {
            return Err(ParseError::constraint(format!(
                "VVC: 存在 {} 个子图像时 pps_no_pic_partition_flag 必须为 0",
                sps.num_subpics()
            )));
        }
        pps.parse_subpic_ids(r, sps)?;

        let d = &sps.derived;
        let pic_width_in_ctbs_y = pps.pps_pic_width_in_luma_samples.div_ceil(d.ctb_size_y);
        let pic_height_in_ctbs_y = pps.pps_pic_height_in_luma_samples.div_ceil(d.ctb_size_y);
        if pps.pps_no_pic_partition_flag {
            let mut layout = PictureLayout::single_tile(pic_width_in_ctbs_y, pic_height_in_ctbs_y);
            layout.push_tile_rect(0, 0, 1, 1)?;
            pps.layout = layout;
        } else {
            pps.parse_partition(r, sps, pic_width_in_ctbs_y, pic_height_in_ctbs_y)?;
        }
        if pps.rect_slice_flag() {
            pps.layout.assign_subpics(&sps.subpic_info.subpics)?;
        }

        pps.pps_cabac_init_present_flag = r.flag("pps_cabac_init_present_flag")?;
        for i in 0..2 {
            pps.pps_num_ref_idx_default_active_minus1[i] = r.read_ue(
                &format!("pps_num_ref_idx_default_active_minus1[{i}]"),
                ReadOptions::new().check_range(0, 14),
            )?;
        }
        pps.pps_rpl1_idx_present_flag = r.flag("pps_rpl1_idx_present_flag")?;
        pps.pps_weighted_pred_flag = r.flag("pps_weighted_pred_flag")?;
        pps.pps_weighted_bipred_flag = r.flag("pps_weighted_bipred_flag")?;
        if (pps.pps_weighted_pred_flag && !sps.sps_weighted_pred_flag)
            || (pps.pps_weighted_bipred_flag && !sps.sps_weighted_bipred_flag)
        {
            return Err(ParseError::constraint(
                "VVC: SPS 未开启加权预测时 pps_weighted_pred_flag / pps_weighted_bipred_flag 必须为 0",
            ));
        }
        pps.pps_ref_wraparound_enabled_flag = r.flag("pps_ref_wraparound_enabled_flag")?;
        if pps.pps_ref_wraparound_enabled_flag {
            let min_cb = 1u32 << d.min_cb_log2_size_y;
            let max = i64::from(pps.pps_pic_width_in_luma_samples / min_cb)
                - i64::from(d.ctb_size_y / min_cb)
                - 2;
            pps.pps_pic_width_minus_wraparound_offset = r.read_ue(
                "pps_pic_width_minus_wraparound_offset",
                ReadOptions::new().check_range(0, max.max(0)),
            )?;
        }
        pps.pps_init_qp_minus26 = r.read_se(
            "pps_init_qp_minus26",
            ReadOptions::new().check_range(-(26 + i64::from(d.qp_bd_offset)), 37),
        )?;
        pps.pps_cu_qp_delta_enabled_flag = r.flag("pps_cu_qp_delta_enabled_flag")?;
        if r.flag("pps_chroma_tool_offsets_present_flag")? {
            pps.chroma_tool_offsets = Some(parse_chroma_tool_offsets(r)?);
        } else if sps.sps_chroma_format_idc != 0 {
            r.log_note("色度 QP 偏移未给出, 全部推断为 0");
        }
        pps.parse_deblocking(r)?;
        if !pps.pps_no_pic_partition_flag {
            pps.pps_rpl_info_in_ph_flag = r.flag("pps_rpl_info_in_ph_flag")?;
            pps.pps_sao_info_in_ph_flag = r.flag("pps_sao_info_in_ph_flag")?;
            pps.pps_alf_info_in_ph_flag = r.flag("pps_alf_info_in_ph_flag")?;
            if (pps.pps_weighted_pred_flag || pps.pps_weighted_bipred_flag) && pps.pps_rpl_info_in_ph_flag {
                pps.pps_wp_info_in_ph_flag = r.flag("pps_wp_info_in_ph_flag")?;
            }
            pps.pps_qp_delta_info_in_ph_flag = r.flag("pps_qp_delta_info_in_ph_flag")?;
        }
        pps.pps_picture_header_extension_present_flag = r.flag("pps_picture_header_extension_present_flag")?;
        pps.pps_slice_header_extension_present_flag = r.flag("pps_slice_header_extension_present_flag")?;
        pps.pps_extension_flag = r.flag("pps_extension_flag")?;
        if pps.pps_extension_flag {
            r.log_note("pps_extension_data_flag 未解析");
        } else {
            read_trailing_bits(r)?;
        }

        r.log_calculated("PicWidthInCtbsY", pic_width_in_ctbs_y);
        r.log_calculated("PicHeightInCtbsY", pic_height_in_ctbs_y);
        r.log_calculated("NumTilesInPic", pps.num_tiles());
        if pps.rect_slice_flag() {
            r.log_calculated("NumSlicesInPic", pps.layout.slices.len());
        }
        r.log_calculated("Parallelism", pps.parallelism().as_str());
        Ok(pps)
    }

    fn parse_picture_size(&mut self, r: &mut SyntaxReader<'_>, sps: &Sps) -> ParseResult<()> {
        let min_cb = 1i64 << sps.derived.min_cb_log2_size_y;
        let align = min_cb.max(8);
        let max_w = i64::from(sps.sps_pic_width_max_in_luma_samples);
        let max_h = i64::from(sps.sps_pic_height_max_in_luma_samples);
        let (w_opts, h_opts) = if sps.sps_res_change_in_clvs_allowed_flag {
            (ReadOptions::new().check_range(1, max_w), ReadOptions::new().check_range(1, max_h))
        } else {
            (ReadOptions::new().check_equal_to(max_w), ReadOptions::new().check_equal_to(max_h))
        };
        self.pps_pic_width_in_luma_samples = r.read_ue("pps_pic_width_in_luma_samples", w_opts)?;
        self.pps_pic_height_in_luma_samples = r.read_ue("pps_pic_height_in_luma_samples", h_opts)?;
        let (w, h) = (
            i64::from(self.pps_pic_width_in_luma_samples),
            i64::from(self.pps_pic_height_in_luma_samples),
        );
        if w % align != 0 || h % align != 0 {
            return Err(ParseError::constraint(format!(
                "VVC: 图像尺寸须为 {align} 的整数倍, {w}x{h}"
            )));
        }
        if r.flag("pps_conformance_window_flag")? {
            let window = ConformanceWindow {
                left_offset: r.ue("pps_conf_win_left_offset")?,
                right_offset: r.ue("pps_conf_win_right_offset")?,
                top_offset: r.ue("pps_conf_win_top_offset")?,
                bottom_offset: r.ue("pps_conf_win_bottom_offset")?,
            };
            let d = &sps.derived;
            if d.sub_width_c * (window.left_offset + window.right_offset) >= self.pps_pic_width_in_luma_samples
                || d.sub_height_c * (window.top_offset + window.bottom_offset)
                    >= self.pps_pic_height_in_luma_samples
            {
                return Err(ParseError::constraint("VVC: PPS 一致性窗口裁剪后图像为空"));
            }
            self.conformance_window = Some(window);
        } else if w == max_w && h == max_h {
            self.conformance_window = sps.conformance_window;
        }
        if r.flag("pps_scaling_window_explicit_signalling_flag")? {
            if !sps.sps_ref_pic_resampling_enabled_flag {
                return Err(ParseError::constraint(
                    "VVC: sps_ref_pic_resampling_enabled_flag=0 时不能显式给出缩放窗口",
                ));
            }
            self.scaling_window = Some(ScalingWindow {
                left_offset: r.se("pps_scaling_win_left_offset")?,
                right_offset: r.se("pps_scaling_win_right_offset")?,
                top_offset: r.se("pps_scaling_win_top_offset")?,
                bottom_offset: r.se("pps_scaling_win_bottom_offset")?,
            });
        }
        Ok(())
    }

    fn parse_subpic_ids(&mut self, r: &mut SyntaxReader<'_>, sps: &Sps) -> ParseResult<()> {
        let info = &sps.subpic_info;
        let num_subpics_minus1 = sps.num_subpics().saturating_sub(1) as i64;
        self.pps_subpic_id_mapping_present_flag = r.flag("pps_subpic_id_mapping_present_flag")?;
        if self.pps_subpic_id_mapping_present_flag {
            if !info.sps_subpic_id_mapping_explicitly_signalled_flag || info.sps_subpic_id_mapping_present_flag {
                return Err(ParseError::constraint(
                    "VVC: 子图像 ID 映射只能在 SPS 显式要求且未给出时出现在 PPS",
                ));
            }
            if !self.pps_no_pic_partition_flag {
                self.pps_num_subpics_minus1 = r.read_ue(
                    "pps_num_subpics_minus1",
                    ReadOptions::new().check_equal_to(num_subpics_minus1),
                )?;
            }
            self.pps_subpic_id_len_minus1 = r.read_ue(
                "pps_subpic_id_len_minus1",
                ReadOptions::new().check_equal_to(i64::from(info.sps_subpic_id_len_minus1)),
            )?;
            for i in 0..=self.pps_num_subpics_minus1 {
                self.pps_subpic_id
                    .push(r.bits(&format!("pps_subpic_id[{i}]"), self.pps_subpic_id_len_minus1 + 1)?);
            }
        } else if info.sps_subpic_id_mapping_explicitly_signalled_flag && !info.sps_subpic_id_mapping_present_flag {
            return Err(ParseError::constraint(
                "VVC: SPS 要求显式子图像 ID 映射但 SPS 与 PPS 均未给出",
            ));
        }

        self.subpic_id_val = (0..sps.num_subpics())
            .map(|i| {
                if !info.sps_subpic_id_mapping_explicitly_signalled_flag {
                    i as u32
                } else if self.pps_subpic_id_mapping_present_flag {
                    self.pps_subpic_id.get(i).copied().unwrap_or(i as u32)
                } else {
                    info.sps_subpic_id.get(i).copied().unwrap_or(i as u32)
                }
            })
            .collect();
        let mut sorted = self.subpic_id_val.clone();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() != self.subpic_id_val.len() {
            return Err(ParseError::constraint(format!(
                "VVC: SubpicIdVal 存在重复值, {:?}",
                self.subpic_id_val
            )));
        }
        Ok(())
    }

    fn parse_partition(
        &mut self,
        r: &mut SyntaxReader<'_>,
        sps: &Sps,
        pic_width_in_ctbs_y: u32,
        pic_height_in_ctbs_y: u32,
    ) -> ParseResult<()> {
        let mut p = PicPartition {
            pps_log2_ctu_size_minus5: r.read_bits(
                "pps_log2_ctu_size_minus5",
                2,
                ReadOptions::new().check_equal_to(i64::from(sps.sps_log2_ctu_size_minus5)),
            )?,
            pps_rect_slice_flag: true,
            ..Default::default()
        };
        let num_exp_columns_minus1 = r.read_ue(
            "pps_num_exp_tile_columns_minus1",
            ReadOptions::new().check_range(0, i64::from(pic_width_in_ctbs_y) - 1),
        )?;
        let num_exp_rows_minus1 = r.read_ue(
            "pps_num_exp_tile_rows_minus1",
            ReadOptions::new().check_range(0, i64::from(pic_height_in_ctbs_y) - 1),
        )?;
        for i in 0..=num_exp_columns_minus1 {
            p.pps_tile_column_width_minus1.push(r.read_ue(
                &format!("pps_tile_column_width_minus1[{i}]"),
                ReadOptions::new().check_range(0, i64::from(pic_width_in_ctbs_y) - 1),
            )?);
        }
        for i in 0..=num_exp_rows_minus1 {
            p.pps_tile_row_height_minus1.push(r.read_ue(
                &format!("pps_tile_row_height_minus1[{i}]"),
                ReadOptions::new().check_range(0, i64::from(pic_height_in_ctbs_y) - 1),
            )?);
        }
        let mut layout = PictureLayout::from_explicit(
            pic_width_in_ctbs_y,
            pic_height_in_ctbs_y,
            &p.pps_tile_column_width_minus1,
            &p.pps_tile_row_height_minus1,
        )?;
        if layout.num_tiles() > 1 {
            p.pps_loop_filter_across_tiles_enabled_flag = r.flag("pps_loop_filter_across_tiles_enabled_flag")?;
            p.pps_rect_slice_flag = r.flag("pps_rect_slice_flag")?;
        }
        if !p.pps_rect_slice_flag && sps.subpic_info.sps_subpic_info_present_flag {
            return Err(ParseError::constraint(
                "VVC: sps_subpic_info_present_flag=1 时 pps_rect_slice_flag 必须为 1",
            ));
        }
        if p.pps_rect_slice_flag {
            p.pps_single_slice_per_subpic_flag = r.flag("pps_single_slice_per_subpic_flag")?;
        }
        if p.pps_rect_slice_flag && !p.pps_single_slice_per_subpic_flag {
            p.pps_num_slices_in_pic_minus1 = r.read_ue(
                "pps_num_slices_in_pic_minus1",
                ReadOptions::new().check_range(0, i64::from(layout.pic_size_in_ctbs_y()) - 1),
            )?;
            if p.pps_num_slices_in_pic_minus1 > 1 {
                p.pps_tile_idx_delta_present_flag = r.flag("pps_tile_idx_delta_present_flag")?;
            }
            p.rect_slices = parse_rect_slices(
                r,
                &mut layout,
                p.pps_num_slices_in_pic_minus1,
                p.pps_tile_idx_delta_present_flag,
            )?;
        } else if p.pps_single_slice_per_subpic_flag {
            layout.push_subpic_slices(&sps.subpic_info.subpics);
        }
        if !p.pps_rect_slice_flag || p.pps_single_slice_per_subpic_flag || p.pps_num_slices_in_pic_minus1 > 0 {
            p.pps_loop_filter_across_slices_enabled_flag = r.flag("pps_loop_filter_across_slices_enabled_flag")?;
        }
        self.layout = layout;
        self.partition = Some(p);
        Ok(())
    }

    fn parse_deblocking(&mut self, r: &mut SyntaxReader<'_>) -> ParseResult<()> {
        if !r.flag("pps_deblocking_filter_control_present_flag")? {
            return Ok(());
        }
        let offset = || ReadOptions::new().check_range(-12, 12);
        let mut d = PpsDeblocking {
            pps_deblocking_filter_override_enabled_flag: r.flag("pps_deblocking_filter_override_enabled_flag")?,
            pps_deblocking_filter_disabled_flag: r.flag("pps_deblocking_filter_disabled_flag")?,
            ..Default::default()
        };
        if !self.pps_no_pic_partition_flag && d.pps_deblocking_filter_override_enabled_flag {
            d.pps_dbf_info_in_ph_flag = r.flag("pps_dbf_info_in_ph_flag")?;
        }
        if !d.pps_deblocking_filter_disabled_flag {
            d.pps_luma_beta_offset_div2 = r.read_se("pps_luma_beta_offset_div2", offset())?;
            d.pps_luma_tc_offset_div2 = r.read_se("pps_luma_tc_offset_div2", offset())?;
            if self.chroma_tool_offsets.is_some() {
                d.pps_cb_beta_offset_div2 = r.read_se("pps_cb_beta_offset_div2", offset())?;
                d.pps_cb_tc_offset_div2 = r.read_se("pps_cb_tc_offset_div2", offset())?;
                d.pps_cr_beta_offset_div2 = r.read_se("pps_cr_beta_offset_div2", offset())?;
                d.pps_cr_tc_offset_div2 = r.read_se("pps_cr_tc_offset_div2", offset())?;
            } else {
                d.pps_cb_beta_offset_div2 = d.pps_luma_beta_offset_div2;
                d.pps_cb_tc_offset_div2 = d.pps_luma_tc_offset_div2;
                d.pps_cr_beta_offset_div2 = d.pps_luma_beta_offset_div2;
                d.pps_cr_tc_offset_div2 = d.pps_luma_tc_offset_div2;
            }
        }
        self.deblocking = Some(d);
        Ok(())
    }

    /// pps_rect_slice_flag, 未出现时推断为 1
    pub fn rect_slice_flag(&self) -> bool {
        self.partition.as_ref().is_none_or(|p| p.pps_rect_slice_flag)
    }

    pub fn single_slice_per_subpic_flag(&self) -> bool {
        self.partition
            .as_ref()
            .is_some_and(|p| p.pps_single_slice_per_subpic_flag)
    }

    pub fn num_tiles(&self) -> u32 {
        self.layout.num_tiles()
    }

    pub fn parallelism(&self) -> Parallelism {
        match (self.num_tiles() > 1, self.entropy_coding_sync) {
            (true, true) => Parallelism::Mixed,
            (false, true) => Parallelism::Wavefront,
            (true, false) => Parallelism::Tile,
            (false, false) => Parallelism::Slice,
        }
    }

    pub fn chroma_qp_offsets_in_slice(&self) -> bool {
        self.chroma_tool_offsets
            .as_ref()
            .is_some_and(|c| c.pps_slice_chroma_qp_offsets_present_flag)
    }

    pub fn deblocking_override_enabled(&self) -> bool {
        self.deblocking
            .is_some_and(|d| d.pps_deblocking_filter_override_enabled_flag)
    }

    pub fn dbf_info_in_ph(&self) -> bool {
        self.deblocking.is_some_and(|d| d.pps_dbf_info_in_ph_flag)
    }

    pub fn deblocking_disabled(&self) -> bool {
        self.deblocking.is_some_and(|d| d.pps_deblocking_filter_disabled_flag)
    }

    /// 由 SubpicIdVal 查找子图像序号
    pub fn subpic_idx_of(&self, subpic_id: u32) -> Option<usize> {
        self.subpic_id_val.iter().position(|&v| v == subpic_id)
    }
}

fn parse_chroma_tool_offsets(r: &mut SyntaxReader<'_>) -> ParseResult<ChromaToolOffsets> {
    let offset = || ReadOptions::new().check_range(-12, 12);
    let mut c = ChromaToolOffsets {
        pps_cb_qp_offset: r.read_se("pps_cb_qp_offset", offset())?,
        pps_cr_qp_offset: r.read_se("pps_cr_qp_offset", offset())?,
        pps_joint_cbcr_qp_offset_present_flag: r.flag("pps_joint_cbcr_qp_offset_present_flag")?,
        ..Default::default()
    };
    if c.pps_joint_cbcr_qp_offset_present_flag {
        c.pps_joint_cbcr_qp_offset_value = r.read_se("pps_joint_cbcr_qp_offset_value", offset())?;
    }
    c.pps_slice_chroma_qp_offsets_present_flag = r.flag("pps_slice_chroma_qp_offsets_present_flag")?;
    c.pps_cu_chroma_qp_offset_list_enabled_flag = r.flag("pps_cu_chroma_qp_offset_list_enabled_flag")?;
    if c.pps_cu_chroma_qp_offset_list_enabled_flag {
        let len_minus1 = r.read_ue("pps_chroma_qp_offset_list_len_minus1", ReadOptions::new().check_range(0, 5))?;
        for i in 0..=len_minus1 {
            let cb = r.read_se(&format!("pps_cb_qp_offset_list[{i}]"), offset())?;
            let cr = r.read_se(&format!("pps_cr_qp_offset_list[{i}]"), offset())?;
            let joint = if c.pps_joint_cbcr_qp_offset_present_flag {
                r.read_se(&format!("pps_joint_cbcr_qp_offset_list[{i}]"), offset())?
            } else {
                0
            };
            c.qp_offset_list.push((cb, cr, joint));
        }
    }
    Ok(c)
}

/// 矩形条带循环 (7.3.2.5), 同时按 6.5.1 推导各条带覆盖的 CTU
fn parse_rect_slices(
    r: &mut SyntaxReader<'_>,
    layout: &mut PictureLayout,
    num_slices_minus1: u32,
    tile_idx_delta_present: bool,
) -> ParseResult<Vec<RectSliceSyntax>> {
    let cols = layout.num_tile_columns();
    let rows = layout.num_tile_rows();
    let num_tiles = i64::from(layout.num_tiles());
    let mut out = Vec::new();
    let mut tile_idx: i64 = 0;
    let mut prev_height_minus1 = 0;
    let mut i = 0;
    while i <= num_slices_minus1 {
        if !(0..num_tiles).contains(&tile_idx) {
            return Err(ParseError::structural(format!(
                "VVC: 条带 {i} 的左上 tile 越界, SliceTopLeftTileIdx={tile_idx}, NumTilesInPic={num_tiles}"
            )));
        }
        let tile_x = tile_idx as u32 % cols;
        let tile_y = tile_idx as u32 / cols;
        let mut s = RectSliceSyntax::default();
        let last = i == num_slices_minus1;
        let (w, h) = if last {
            (cols - tile_x, rows - tile_y)
        } else {
            if tile_x != cols - 1 {
                s.pps_slice_width_in_tiles_minus1 = r.read_ue(
                    &format!("pps_slice_width_in_tiles_minus1[{i}]"),
                    ReadOptions::new().check_range(0, i64::from(cols - 1 - tile_x)),
                )?;
            }
            if tile_y != rows - 1 && (tile_idx_delta_present || tile_x == 0) {
                s.pps_slice_height_in_tiles_minus1 = r.read_ue(
                    &format!("pps_slice_height_in_tiles_minus1[{i}]"),
                    ReadOptions::new().check_range(0, i64::from(rows - 1 - tile_y)),
                )?;
            } else if tile_y != rows - 1 {
                s.pps_slice_height_in_tiles_minus1 = prev_height_minus1;
            }
            prev_height_minus1 = s.pps_slice_height_in_tiles_minus1;
            (s.pps_slice_width_in_tiles_minus1 + 1, s.pps_slice_height_in_tiles_minus1 + 1)
        };

        let row_height = layout.row_heights[tile_y as usize];
        if !last && w == 1 && h == 1 && row_height > 1 {
            s.pps_num_exp_slices_in_tile = r.read_ue(
                &format!("pps_num_exp_slices_in_tile[{i}]"),
                ReadOptions::new().check_range(0, i64::from(row_height) - 1),
            )?;
            for j in 0..s.pps_num_exp_slices_in_tile {
                s.pps_exp_slice_height_in_ctus_minus1.push(r.read_ue(
                    &format!("pps_exp_slice_height_in_ctus_minus1[{i}][{j}]"),
                    ReadOptions::new().check_range(0, i64::from(row_height) - 1),
                )?);
            }
            let slices_in_tile = split_tile_into_slices(layout, tile_x, tile_y, &s.pps_exp_slice_height_in_ctus_minus1)?;
            i += slices_in_tile - 1;
            if i > num_slices_minus1 {
                return Err(ParseError::structural(format!(
                    "VVC: tile 内条带数超出 pps_num_slices_in_pic_minus1, slices_in_tile={slices_in_tile}, num_slices_minus1={num_slices_minus1}"
                )));
            }
        } else {
            layout.push_tile_rect(tile_x, tile_y, w, h)?;
        }

        if tile_idx_delta_present && i < num_slices_minus1 {
            let delta = r.read_se(
                &format!("pps_tile_idx_delta_val[{i}]"),
                ReadOptions::new().check_range(1 - num_tiles, num_tiles - 1),
            )?;
            if delta == 0 {
                return Err(ParseError::constraint(format!("VVC: pps_tile_idx_delta_val[{i}] 不能为 0")));
            }
            s.pps_tile_idx_delta_val = Some(delta);
            tile_idx += i64::from(delta);
        } else if i < num_slices_minus1 {
            tile_idx += i64::from(w);
            if tile_idx % i64::from(cols) == 0 {
                tile_idx += i64::from(h - 1) * i64::from(cols);
            }
        }
        out.push(s);
        i += 1;
    }

    let covered: usize = layout.slices.iter().map(|s| s.ctb_addrs.len()).sum();
    if covered != layout.pic_size_in_ctbs_y() as usize {
        return Err(ParseError::structural(format!(
            "VVC: 矩形条带未恰好覆盖图像, covered={covered}, PicSizeInCtbsY={}",
            layout.pic_size_in_ctbs_y()
        )));
    }
    Ok(out)
}

/// 把 tile 按 CTU 行划分成多个条带, 返回 NumSlicesInTile
fn split_tile_into_slices(
    layout: &mut PictureLayout,
    tile_x: u32,
    tile_y: u32,
    exp_heights_minus1: &[u32],
) -> ParseResult<u32> {
    let row_height = layout.row_heights[tile_y as usize];
    let mut heights = Vec::new();
    let mut remaining = row_height;
    for &hm1 in exp_heights_minus1 {
        let height = hm1 + 1;
        if height > remaining {
            return Err(ParseError::structural(format!(
                "VVC: tile 内条带高度之和超出 tile, height={height}, remaining={remaining}"
            )));
        }
        heights.push(height);
        remaining -= height;
    }
    let uniform = exp_heights_minus1.last().map_or(row_height, |v| v + 1);
    while remaining >= uniform {
        heights.push(uniform);
        remaining -= uniform;
    }
    if remaining > 0 {
        heights.push(remaining);
    }

    let mut ctb_y = layout.row_start(tile_y);
    for &height in &heights {
        layout.push_tile_rows(tile_x, tile_y, ctb_y, height);
        ctb_y += height;
    }
    Ok(heights.len() as u32)
}
