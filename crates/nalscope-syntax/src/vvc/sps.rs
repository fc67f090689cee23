//! VVC 序列参数集 (seq_parameter_set_rbsp, 7.3.2.4).
//!
//! 除语法元素外还推导 CTU 网格、子图像布局、MaxNumMergeCand 与额外头部位数,
//! 供 PPS、图像头与条带头使用.

use log::debug;
use nalscope_core::{ParameterSet, ParseError, ParseResult, Rational, ReadOptions, SymbolTable, SyntaxReader};

use super::hrd::{DpbParameters, GeneralTimingHrd, OlsTimingHrd};
use super::ptl::ProfileTierLevel;
use super::rpl::{RefPicListStruct, RplContext};
use super::vui::VuiParameters;
use crate::avc::ceil_log2;
use crate::avc::sps::read_trailing_bits;
use crate::avc::tables::ChromaFormat;
use crate::hevc::sps::{ConformanceWindow, CropRect};

/// 块划分约束, SPS 与图像头共用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PartitionParams {
    pub log2_diff_min_qt_min_cb: u32,
    pub max_mtt_hierarchy_depth: u32,
    pub log2_diff_max_bt_min_qt: u32,
    pub log2_diff_max_tt_min_qt: u32,
}

impl PartitionParams {
    /// 按 `{prefix}_log2_diff_min_qt_min_cb_{suffix}` 的命名读取
    pub(crate) fn parse(
        r: &mut SyntaxReader<'_>,
        prefix: &str,
        qt_suffix: &str,
        suffix: &str,
    ) -> ParseResult<Self> {
        let mut p = Self {
            log2_diff_min_qt_min_cb: r.ue(&format!("{prefix}_log2_diff_min_qt_min_cb_{qt_suffix}"))?,
            max_mtt_hierarchy_depth: r.ue(&format!("{prefix}_max_mtt_hierarchy_depth_{suffix}"))?,
            ..Default::default()
        };
        if p.max_mtt_hierarchy_depth != 0 {
            p.log2_diff_max_bt_min_qt = r.ue(&format!("{prefix}_log2_diff_max_bt_min_qt_{suffix}"))?;
            p.log2_diff_max_tt_min_qt = r.ue(&format!("{prefix}_log2_diff_max_tt_min_qt_{suffix}"))?;
        }
        Ok(p)
    }
}

/// 虚拟边界位置, SPS 与图像头共用
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VirtualBoundaries {
    pub pos_x_minus1: Vec<u32>,
    pub pos_y_minus1: Vec<u32>,
}

impl VirtualBoundaries {
    /// SPS 中边界个数为 u(2), 图像头中为 ue(v)
    pub(crate) fn parse(r: &mut SyntaxReader<'_>, prefix: &str) -> ParseResult<Self> {
        let in_sps = prefix == "sps";
        let read_count = |r: &mut SyntaxReader<'_>, name: String| {
            if in_sps {
                r.read_bits(&name, 2, ReadOptions::new().check_range(0, 3))
            } else {
                r.read_ue(&name, ReadOptions::new().check_range(0, 3))
            }
        };
        let mut vb = Self::default();
        let num_ver = read_count(r, format!("{prefix}_num_ver_virtual_boundaries"))?;
        for i in 0..num_ver {
            vb.pos_x_minus1.push(r.ue(&format!("{prefix}_virtual_boundary_pos_x_minus1[{i}]"))?);
        }
        let num_hor = read_count(r, format!("{prefix}_num_hor_virtual_boundaries"))?;
        for i in 0..num_hor {
            vb.pos_y_minus1.push(r.ue(&format!("{prefix}_virtual_boundary_pos_y_minus1[{i}]"))?);
        }
        Ok(vb)
    }
}

/// 一个子图像, 位置与尺寸以 CTU 为单位 (未出现的值已推断)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Subpic {
    pub ctu_top_left_x: u32,
    pub ctu_top_left_y: u32,
    pub width_minus1: u32,
    pub height_minus1: u32,
    pub treated_as_pic_flag: bool,
    pub loop_filter_across_subpic_enabled_flag: bool,
}

impl Subpic {
    /// CTU 坐标 (x, y) 是否落在子图像内
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.ctu_top_left_x
            && x <= self.ctu_top_left_x + self.width_minus1
            && y >= self.ctu_top_left_y
            && y <= self.ctu_top_left_y + self.height_minus1
    }
}

/// 子图像信息; sps_subpic_info_present_flag=0 时为覆盖整幅图像的单个子图像
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubpicInfo {
    pub sps_subpic_info_present_flag: bool,
    pub sps_independent_subpics_flag: bool,
    pub sps_subpic_same_size_flag: bool,
    pub subpics: Vec<Subpic>,
    pub sps_subpic_id_len_minus1: u32,
    pub sps_subpic_id_mapping_explicitly_signalled_flag: bool,
    pub sps_subpic_id_mapping_present_flag: bool,
    pub sps_subpic_id: Vec<u32>,
}

/// 色度 QP 映射表
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChromaQpTable {
    pub qp_table_start_minus26: i32,
    /// (sps_delta_qp_in_val_minus1, sps_delta_qp_diff_val)
    pub points: Vec<(u32, u32)>,
}

/// 亮度自适应去块参数
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LadfParameters {
    pub sps_num_ladf_intervals_minus2: u32,
    pub sps_ladf_lowest_interval_qp_offset: i32,
    /// (sps_ladf_qp_offset, sps_ladf_delta_threshold_minus1)
    pub intervals: Vec<(i32, u32)>,
}

/// SPS 中的定时与 HRD 参数
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpsTimingHrd {
    pub general: GeneralTimingHrd,
    pub sps_sublayer_cpb_params_present_flag: bool,
    pub ols: OlsTimingHrd,
}

/// SPS 推导变量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpsDerived {
    pub sub_width_c: u32,
    pub sub_height_c: u32,
    pub bit_depth: u32,
    pub qp_bd_offset: u32,
    pub ctb_log2_size_y: u32,
    pub ctb_size_y: u32,
    pub min_cb_log2_size_y: u32,
    pub pic_width_in_ctbs_y: u32,
    pub pic_height_in_ctbs_y: u32,
    pub max_pic_order_cnt_lsb: u32,
    pub num_extra_ph_bits: u32,
    pub num_extra_sh_bits: u32,
    pub max_num_merge_cand: u32,
    pub max_num_gpm_merge_cand: u32,
    pub crop: CropRect,
}

/// 序列参数集
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sps {
    pub sps_seq_parameter_set_id: u32,
    pub sps_video_parameter_set_id: u32,
    pub sps_max_sublayers_minus1: u32,
    pub sps_chroma_format_idc: u32,
    pub sps_log2_ctu_size_minus5: u32,
    pub sps_ptl_dpb_hrd_params_present_flag: bool,
    pub profile_tier_level: Option<ProfileTierLevel>,
    pub sps_gdr_enabled_flag: bool,
    pub sps_ref_pic_resampling_enabled_flag: bool,
    pub sps_res_change_in_clvs_allowed_flag: bool,
    pub sps_pic_width_max_in_luma_samples: u32,
    pub sps_pic_height_max_in_luma_samples: u32,
    pub conformance_window: Option<ConformanceWindow>,
    pub subpic_info: SubpicInfo,
    pub sps_bitdepth_minus8: u32,
    pub sps_entropy_coding_sync_enabled_flag: bool,
    pub sps_entry_point_offsets_present_flag: bool,
    pub sps_log2_max_pic_order_cnt_lsb_minus4: u32,
    pub sps_poc_msb_cycle_flag: bool,
    pub sps_poc_msb_cycle_len_minus1: u32,
    pub sps_extra_ph_bit_present_flag: Vec<bool>,
    pub sps_extra_sh_bit_present_flag: Vec<bool>,
    pub sps_sublayer_dpb_params_flag: bool,
    pub dpb_parameters: Option<DpbParameters>,
    pub sps_log2_min_luma_coding_block_size_minus2: u32,
    pub sps_partition_constraints_override_enabled_flag: bool,
    pub intra_luma_partition: PartitionParams,
    pub sps_qtbtt_dual_tree_intra_flag: bool,
    pub intra_chroma_partition: Option<PartitionParams>,
    pub inter_partition: PartitionParams,
    pub sps_max_luma_transform_size_64_flag: bool,
    pub sps_transform_skip_enabled_flag: bool,
    pub sps_log2_transform_skip_max_size_minus2: u32,
    pub sps_bdpcm_enabled_flag: bool,
    pub sps_mts_enabled_flag: bool,
    pub sps_explicit_mts_intra_enabled_flag: bool,
    pub sps_explicit_mts_inter_enabled_flag: bool,
    pub sps_lfnst_enabled_flag: bool,
    pub sps_joint_cbcr_enabled_flag: bool,
    pub sps_same_qp_table_for_chroma_flag: bool,
    pub chroma_qp_tables: Vec<ChromaQpTable>,
    pub sps_sao_enabled_flag: bool,
    pub sps_alf_enabled_flag: bool,
    pub sps_ccalf_enabled_flag: bool,
    pub sps_lmcs_enabled_flag: bool,
    pub sps_weighted_pred_flag: bool,
    pub sps_weighted_bipred_flag: bool,
    pub sps_long_term_ref_pics_flag: bool,
    pub sps_inter_layer_prediction_enabled_flag: bool,
    pub sps_idr_rpl_present_flag: bool,
    pub sps_rpl1_same_as_rpl0_flag: bool,
    /// sps_num_ref_pic_lists[i] 个列表结构; rpl1_same_as_rpl0 时列表 1 为列表 0 的副本
    pub ref_pic_list_structs: [Vec<RefPicListStruct>; 2],
    pub sps_ref_wraparound_enabled_flag: bool,
    pub sps_temporal_mvp_enabled_flag: bool,
    pub sps_sbtmvp_enabled_flag: bool,
    pub sps_amvr_enabled_flag: bool,
    pub sps_bdof_enabled_flag: bool,
    pub sps_bdof_control_present_in_ph_flag: bool,
    pub sps_smvd_enabled_flag: bool,
    pub sps_dmvr_enabled_flag: bool,
    pub sps_dmvr_control_present_in_ph_flag: bool,
    pub sps_mmvd_enabled_flag: bool,
    pub sps_mmvd_fullpel_only_enabled_flag: bool,
    pub sps_six_minus_max_num_merge_cand: u32,
    pub sps_sbt_enabled_flag: bool,
    pub sps_affine_enabled_flag: bool,
    pub sps_five_minus_max_num_subblock_merge_cand: u32,
    pub sps_6param_affine_enabled_flag: bool,
    pub sps_affine_amvr_enabled_flag: bool,
    pub sps_affine_prof_enabled_flag: bool,
    pub sps_prof_control_present_in_ph_flag: bool,
    pub sps_bcw_enabled_flag: bool,
    pub sps_ciip_enabled_flag: bool,
    pub sps_gpm_enabled_flag: bool,
    pub sps_max_num_merge_cand_minus_max_num_gpm_cand: u32,
    pub sps_log2_parallel_merge_level_minus2: u32,
    pub sps_isp_enabled_flag: bool,
    pub sps_mrl_enabled_flag: bool,
    pub sps_mip_enabled_flag: bool,
    pub sps_cclm_enabled_flag: bool,
    pub sps_chroma_horizontal_collocated_flag: bool,
    pub sps_chroma_vertical_collocated_flag: bool,
    pub sps_palette_enabled_flag: bool,
    pub sps_act_enabled_flag: bool,
    pub sps_min_qp_prime_ts: u32,
    pub sps_ibc_enabled_flag: bool,
    pub sps_six_minus_max_num_ibc_merge_cand: u32,
    pub ladf: Option<LadfParameters>,
    pub sps_explicit_scaling_list_enabled_flag: bool,
    pub sps_scaling_matrix_for_lfnst_disabled_flag: bool,
    pub sps_scaling_matrix_for_alternative_colour_space_disabled_flag: bool,
    pub sps_scaling_matrix_designated_colour_space_flag: bool,
    pub sps_dep_quant_enabled_flag: bool,
    pub sps_sign_data_hiding_enabled_flag: bool,
    pub sps_virtual_boundaries_enabled_flag: bool,
    /// sps_virtual_boundaries_present_flag=1 时的位置
    pub virtual_boundaries: Option<VirtualBoundaries>,
    pub timing_hrd: Option<SpsTimingHrd>,
    pub sps_field_seq_flag: bool,
    pub vui: Option<VuiParameters>,
    pub sps_extension_flag: bool,
    pub derived: SpsDerived,
}

impl ParameterSet for Sps {
    const KIND: &'static str = "SPS";
}

impl Sps {
    pub fn parse(r: &mut SyntaxReader<'_>) -> ParseResult<Self> {
        r.sub_level("seq_parameter_set_rbsp()", Self::parse_body)
    }

    fn parse_body(r: &mut SyntaxReader<'_>) -> ParseResult<Self> {
        let mut sps = Self {
            sps_seq_parameter_set_id: r.bits("sps_seq_parameter_set_id", 4)?,
            sps_video_parameter_set_id: r.bits("sps_video_parameter_set_id", 4)?,
            sps_max_sublayers_minus1: r.read_bits(
                "sps_max_sublayers_minus1",
                3,
                ReadOptions::new().check_range(0, 6),
            )?,
            sps_chroma_format_idc: r.read_bits(
                "sps_chroma_format_idc",
                2,
                ReadOptions::new().meaning_map::<ChromaFormat>(),
            )?,
            sps_log2_ctu_size_minus5: r.read_bits(
                "sps_log2_ctu_size_minus5",
                2,
                ReadOptions::new().check_range(0, 2),
            )?,
            sps_ptl_dpb_hrd_params_present_flag: r.flag("sps_ptl_dpb_hrd_params_present_flag")?,
            ..Default::default()
        };
        if sps.sps_video_parameter_set_id == 0 && !sps.sps_ptl_dpb_hrd_params_present_flag {
            return Err(ParseError::constraint(
                "VVC: sps_video_parameter_set_id=0 时 sps_ptl_dpb_hrd_params_present_flag 必须为 1",
            ));
        }
        if sps.sps_ptl_dpb_hrd_params_present_flag {
            sps.profile_tier_level = Some(ProfileTierLevel::parse(r, true, sps.sps_max_sublayers_minus1)?);
        }
        sps.sps_gdr_enabled_flag = r.flag("sps_gdr_enabled_flag")?;
        sps.sps_ref_pic_resampling_enabled_flag = r.flag("sps_ref_pic_resampling_enabled_flag")?;
        if sps.sps_ref_pic_resampling_enabled_flag {
            sps.sps_res_change_in_clvs_allowed_flag = r.flag("sps_res_change_in_clvs_allowed_flag")?;
        }

        let ctb_log2_size_y = sps.sps_log2_ctu_size_minus5 + 5;
        let ctb_size_y = 1u32 << ctb_log2_size_y;
        sps.sps_pic_width_max_in_luma_samples =
            r.read_ue("sps_pic_width_max_in_luma_samples", ReadOptions::new().check_greater(0))?;
        sps.sps_pic_height_max_in_luma_samples =
            r.read_ue("sps_pic_height_max_in_luma_samples", ReadOptions::new().check_greater(0))?;
        if r.flag("sps_conformance_window_flag")? {
            sps.conformance_window = Some(ConformanceWindow {
                left_offset: r.ue("sps_conf_win_left_offset")?,
                right_offset: r.ue("sps_conf_win_right_offset")?,
                top_offset: r.ue("sps_conf_win_top_offset")?,
                bottom_offset: r.ue("sps_conf_win_bottom_offset")?,
            });
        }
        sps.subpic_info = sps.parse_subpic_info(r, ctb_log2_size_y, ctb_size_y)?;

        sps.sps_bitdepth_minus8 = r.read_ue("sps_bitdepth_minus8", ReadOptions::new().check_range(0, 8))?;
        sps.sps_entropy_coding_sync_enabled_flag = r.flag("sps_entropy_coding_sync_enabled_flag")?;
        sps.sps_entry_point_offsets_present_flag = r.flag("sps_entry_point_offsets_present_flag")?;
        sps.sps_log2_max_pic_order_cnt_lsb_minus4 = r.read_bits(
            "sps_log2_max_pic_order_cnt_lsb_minus4",
            4,
            ReadOptions::new().check_range(0, 12),
        )?;
        sps.sps_poc_msb_cycle_flag = r.flag("sps_poc_msb_cycle_flag")?;
        if sps.sps_poc_msb_cycle_flag {
            sps.sps_poc_msb_cycle_len_minus1 = r.read_ue(
                "sps_poc_msb_cycle_len_minus1",
                ReadOptions::new().check_range(0, 27 - i64::from(sps.sps_log2_max_pic_order_cnt_lsb_minus4)),
            )?;
        }
        let num_extra_ph_bytes = r.bits("sps_num_extra_ph_bytes", 2)?;
        for i in 0..num_extra_ph_bytes * 8 {
            sps.sps_extra_ph_bit_present_flag
                .push(r.flag(&format!("sps_extra_ph_bit_present_flag[{i}]"))?);
        }
        let num_extra_sh_bytes = r.bits("sps_num_extra_sh_bytes", 2)?;
        for i in 0..num_extra_sh_bytes * 8 {
            sps.sps_extra_sh_bit_present_flag
                .push(r.flag(&format!("sps_extra_sh_bit_present_flag[{i}]"))?);
        }
        if sps.sps_ptl_dpb_hrd_params_present_flag {
            if sps.sps_max_sublayers_minus1 > 0 {
                sps.sps_sublayer_dpb_params_flag = r.flag("sps_sublayer_dpb_params_flag")?;
            }
            sps.dpb_parameters = Some(DpbParameters::parse(
                r,
                sps.sps_max_sublayers_minus1,
                sps.sps_sublayer_dpb_params_flag,
            )?);
        }

        sps.parse_partitioning(r, ctb_size_y)?;
        sps.parse_transform_tools(r)?;
        sps.parse_inter_tools(r)?;
        sps.parse_intra_tools(r)?;

        if sps.sps_ptl_dpb_hrd_params_present_flag && r.flag("sps_timing_hrd_params_present_flag")? {
            let general = GeneralTimingHrd::parse(r)?;
            let sublayer_cpb =
                sps.sps_max_sublayers_minus1 > 0 && r.flag("sps_sublayer_cpb_params_present_flag")?;
            let first = if sublayer_cpb { 0 } else { sps.sps_max_sublayers_minus1 };
            let ols = OlsTimingHrd::parse(r, &general, first, sps.sps_max_sublayers_minus1)?;
            sps.timing_hrd = Some(SpsTimingHrd {
                general,
                sps_sublayer_cpb_params_present_flag: sublayer_cpb,
                ols,
            });
        }
        sps.sps_field_seq_flag = r.flag("sps_field_seq_flag")?;
        if r.flag("sps_vui_parameters_present_flag")? {
            let size_minus1 =
                r.read_ue("sps_vui_payload_size_minus1", ReadOptions::new().check_range(0, 1023))?;
            while !r.byte_aligned() {
                r.read_flag("sps_vui_alignment_zero_bit", ReadOptions::new().check_equal_to(0))?;
            }
            sps.vui = Some(VuiParameters::parse_payload(r, size_minus1 + 1)?);
        }
        sps.sps_extension_flag = r.flag("sps_extension_flag")?;
        if sps.sps_extension_flag {
            r.log_note("sps_extension_data_flag 未解析");
        } else {
            read_trailing_bits(r)?;
        }

        sps.derived = sps.derive()?;
        log_derived(r, &sps.derived);
        debug!(
            "VVC: SPS 解析完成, id={}, {}x{}, ctb={}",
            sps.sps_seq_parameter_set_id,
            sps.derived.crop.width,
            sps.derived.crop.height,
            sps.derived.ctb_size_y
        );
        Ok(sps)
    }

    fn parse_subpic_info(
        &self,
        r: &mut SyntaxReader<'_>,
        ctb_log2_size_y: u32,
        ctb_size_y: u32,
    ) -> ParseResult<SubpicInfo> {
        let width = self.sps_pic_width_max_in_luma_samples;
        let height = self.sps_pic_height_max_in_luma_samples;
        let width_in_ctbs = width.div_ceil(ctb_size_y);
        let height_in_ctbs = height.div_ceil(ctb_size_y);
        let mut info = SubpicInfo {
            sps_subpic_info_present_flag: r.flag("sps_subpic_info_present_flag")?,
            sps_independent_subpics_flag: true,
            ..Default::default()
        };
        if !info.sps_subpic_info_present_flag {
            info.subpics.push(Subpic {
                width_minus1: width_in_ctbs - 1,
                height_minus1: height_in_ctbs - 1,
                treated_as_pic_flag: true,
                ..Default::default()
            });
            return Ok(info);
        }

        r.sub_level("subpic_info", |r| {
            let num_minus1 = r.read_ue(
                "sps_num_subpics_minus1",
                ReadOptions::new().check_range(0, i64::from(width_in_ctbs * height_in_ctbs) - 1),
            )?;
            if num_minus1 > 0 {
                info.sps_independent_subpics_flag = r.flag("sps_independent_subpics_flag")?;
                info.sps_subpic_same_size_flag = r.flag("sps_subpic_same_size_flag")?;
            }
            let x_bits = ceil_log2((width + ctb_size_y - 1) >> ctb_log2_size_y);
            let y_bits = ceil_log2((height + ctb_size_y - 1) >> ctb_log2_size_y);
            let wide = width > ctb_size_y;
            let tall = height > ctb_size_y;
            for i in 0..=num_minus1 {
                let mut s = Subpic {
                    treated_as_pic_flag: true,
                    ..Default::default()
                };
                if num_minus1 > 0 && (!info.sps_subpic_same_size_flag || i == 0) {
                    if i > 0 && wide {
                        s.ctu_top_left_x = r.bits(&format!("sps_subpic_ctu_top_left_x[{i}]"), x_bits)?;
                    }
                    if i > 0 && tall {
                        s.ctu_top_left_y = r.bits(&format!("sps_subpic_ctu_top_left_y[{i}]"), y_bits)?;
                    }
                    s.width_minus1 = if i < num_minus1 && wide {
                        r.bits(&format!("sps_subpic_width_minus1[{i}]"), x_bits)?
                    } else {
                        width_in_ctbs.saturating_sub(s.ctu_top_left_x + 1)
                    };
                    s.height_minus1 = if i < num_minus1 && tall {
                        r.bits(&format!("sps_subpic_height_minus1[{i}]"), y_bits)?
                    } else {
                        height_in_ctbs.saturating_sub(s.ctu_top_left_y + 1)
                    };
                } else if num_minus1 == 0 {
                    s.width_minus1 = width_in_ctbs - 1;
                    s.height_minus1 = height_in_ctbs - 1;
                } else {
                    // 等尺寸子图像按首个子图像的尺寸逐行排列
                    let first = info.subpics[0];
                    let tmp_w = first.width_minus1 + 1;
                    let tmp_h = first.height_minus1 + 1;
                    let cols = (width_in_ctbs / tmp_w).max(1);
                    s.ctu_top_left_x = (i % cols) * tmp_w;
                    s.ctu_top_left_y = (i / cols) * tmp_h;
                    s.width_minus1 = first.width_minus1;
                    s.height_minus1 = first.height_minus1;
                }
                if !info.sps_independent_subpics_flag {
                    s.treated_as_pic_flag = r.flag(&format!("sps_subpic_treated_as_pic_flag[{i}]"))?;
                    s.loop_filter_across_subpic_enabled_flag =
                        r.flag(&format!("sps_loop_filter_across_subpic_enabled_flag[{i}]"))?;
                }
                if s.ctu_top_left_x + s.width_minus1 >= width_in_ctbs
                    || s.ctu_top_left_y + s.height_minus1 >= height_in_ctbs
                {
                    return Err(ParseError::structural(format!(
                        "VVC: 子图像 {i} 超出图像范围, x={} y={} w={} h={}",
                        s.ctu_top_left_x,
                        s.ctu_top_left_y,
                        s.width_minus1 + 1,
                        s.height_minus1 + 1
                    )));
                }
                info.subpics.push(s);
            }
            info.sps_subpic_id_len_minus1 =
                r.read_ue("sps_subpic_id_len_minus1", ReadOptions::new().check_range(0, 15))?;
            if (1u64 << (info.sps_subpic_id_len_minus1 + 1)) < u64::from(num_minus1) + 1 {
                return Err(ParseError::constraint(format!(
                    "VVC: sps_subpic_id_len_minus1 不足以区分 {} 个子图像",
                    num_minus1 + 1
                )));
            }
            info.sps_subpic_id_mapping_explicitly_signalled_flag =
                r.flag("sps_subpic_id_mapping_explicitly_signalled_flag")?;
            if info.sps_subpic_id_mapping_explicitly_signalled_flag {
                info.sps_subpic_id_mapping_present_flag = r.flag("sps_subpic_id_mapping_present_flag")?;
                if info.sps_subpic_id_mapping_present_flag {
                    for i in 0..=num_minus1 {
                        info.sps_subpic_id.push(
                            r.bits(&format!("sps_subpic_id[{i}]"), info.sps_subpic_id_len_minus1 + 1)?,
                        );
                    }
                }
            }
            Ok(info)
        })
    }

    fn parse_partitioning(&mut self, r: &mut SyntaxReader<'_>, ctb_size_y: u32) -> ParseResult<()> {
        self.sps_log2_min_luma_coding_block_size_minus2 = r.read_ue(
            "sps_log2_min_luma_coding_block_size_minus2",
            ReadOptions::new().check_range(0, i64::from((self.sps_log2_ctu_size_minus5 + 3).min(4))),
        )?;
        let min_cb_size_y = 1u32 << (self.sps_log2_min_luma_coding_block_size_minus2 + 2);
        let unit = min_cb_size_y.max(8);
        for (name, value) in [
            ("sps_pic_width_max_in_luma_samples", self.sps_pic_width_max_in_luma_samples),
            ("sps_pic_height_max_in_luma_samples", self.sps_pic_height_max_in_luma_samples),
        ] {
            if value % unit != 0 {
                return Err(ParseError::constraint(format!(
                    "VVC: {name} 必须是 Max(8, MinCbSizeY) 的整数倍, value={value}, unit={unit}"
                )));
            }
        }
        self.sps_partition_constraints_override_enabled_flag =
            r.flag("sps_partition_constraints_override_enabled_flag")?;
        self.intra_luma_partition = PartitionParams::parse(r, "sps", "intra_slice_luma", "intra_slice_luma")?;
        if self.sps_chroma_format_idc != 0 {
            self.sps_qtbtt_dual_tree_intra_flag = r.flag("sps_qtbtt_dual_tree_intra_flag")?;
        }
        if self.sps_qtbtt_dual_tree_intra_flag {
            self.intra_chroma_partition = Some(PartitionParams::parse(
                r,
                "sps",
                "intra_slice_chroma",
                "intra_slice_chroma",
            )?);
        }
        self.inter_partition = PartitionParams::parse(r, "sps", "inter_slice", "inter_slice")?;
        if ctb_size_y > 32 {
            self.sps_max_luma_transform_size_64_flag = r.flag("sps_max_luma_transform_size_64_flag")?;
        }
        Ok(())
    }

    fn parse_transform_tools(&mut self, r: &mut SyntaxReader<'_>) -> ParseResult<()> {
        self.sps_transform_skip_enabled_flag = r.flag("sps_transform_skip_enabled_flag")?;
        if self.sps_transform_skip_enabled_flag {
            self.sps_log2_transform_skip_max_size_minus2 = r.read_ue(
                "sps_log2_transform_skip_max_size_minus2",
                ReadOptions::new().check_range(0, 3),
            )?;
            self.sps_bdpcm_enabled_flag = r.flag("sps_bdpcm_enabled_flag")?;
        }
        self.sps_mts_enabled_flag = r.flag("sps_mts_enabled_flag")?;
        if self.sps_mts_enabled_flag {
            self.sps_explicit_mts_intra_enabled_flag = r.flag("sps_explicit_mts_intra_enabled_flag")?;
            self.sps_explicit_mts_inter_enabled_flag = r.flag("sps_explicit_mts_inter_enabled_flag")?;
        }
        self.sps_lfnst_enabled_flag = r.flag("sps_lfnst_enabled_flag")?;
        if self.sps_chroma_format_idc != 0 {
            self.sps_joint_cbcr_enabled_flag = r.flag("sps_joint_cbcr_enabled_flag")?;
            self.sps_same_qp_table_for_chroma_flag = r.flag("sps_same_qp_table_for_chroma_flag")?;
            let num_qp_tables = if self.sps_same_qp_table_for_chroma_flag {
                1
            } else if self.sps_joint_cbcr_enabled_flag {
                3
            } else {
                2
            };
            for i in 0..num_qp_tables {
                let mut table = ChromaQpTable {
                    qp_table_start_minus26: r.read_se(
                        &format!("sps_qp_table_start_minus26[{i}]"),
                        ReadOptions::new().check_range(-26 - 6 * i64::from(self.sps_bitdepth_minus8), 36),
                    )?,
                    points: Vec::new(),
                };
                let num_points = r.read_ue(
                    &format!("sps_num_points_in_qp_table_minus1[{i}]"),
                    ReadOptions::new().check_range(0, 36 - i64::from(table.qp_table_start_minus26)),
                )?;
                for j in 0..=num_points {
                    table.points.push((
                        r.ue(&format!("sps_delta_qp_in_val_minus1[{i}][{j}]"))?,
                        r.ue(&format!("sps_delta_qp_diff_val[{i}][{j}]"))?,
                    ));
                }
                self.chroma_qp_tables.push(table);
            }
        }
        self.sps_sao_enabled_flag = r.flag("sps_sao_enabled_flag")?;
        self.sps_alf_enabled_flag = r.flag("sps_alf_enabled_flag")?;
        if self.sps_alf_enabled_flag && self.sps_chroma_format_idc != 0 {
            self.sps_ccalf_enabled_flag = r.flag("sps_ccalf_enabled_flag")?;
        }
        self.sps_lmcs_enabled_flag = r.flag("sps_lmcs_enabled_flag")?;
        Ok(())
    }

    fn parse_inter_tools(&mut self, r: &mut SyntaxReader<'_>) -> ParseResult<()> {
        self.sps_weighted_pred_flag = r.flag("sps_weighted_pred_flag")?;
        self.sps_weighted_bipred_flag = r.flag("sps_weighted_bipred_flag")?;
        self.sps_long_term_ref_pics_flag = r.flag("sps_long_term_ref_pics_flag")?;
        if self.sps_video_parameter_set_id > 0 {
            self.sps_inter_layer_prediction_enabled_flag = r.flag("sps_inter_layer_prediction_enabled_flag")?;
        }
        self.sps_idr_rpl_present_flag = r.flag("sps_idr_rpl_present_flag")?;
        self.sps_rpl1_same_as_rpl0_flag = r.flag("sps_rpl1_same_as_rpl0_flag")?;
        let num_lists = if self.sps_rpl1_same_as_rpl0_flag { 1 } else { 2 };
        let mut ctx = self.rpl_context();
        for i in 0..num_lists {
            let num = r.read_ue(
                &format!("sps_num_ref_pic_lists[{i}]"),
                ReadOptions::new().check_range(0, 64),
            )?;
            ctx.num_ref_pic_lists[i] = num;
            for j in 0..num {
                let rpl = RefPicListStruct::parse(r, &ctx, i, j)?;
                self.ref_pic_list_structs[i].push(rpl);
            }
        }
        if self.sps_rpl1_same_as_rpl0_flag {
            self.ref_pic_list_structs[1] = self.ref_pic_list_structs[0].clone();
        }

        self.sps_ref_wraparound_enabled_flag = r.flag("sps_ref_wraparound_enabled_flag")?;
        self.sps_temporal_mvp_enabled_flag = r.flag("sps_temporal_mvp_enabled_flag")?;
        if self.sps_temporal_mvp_enabled_flag {
            self.sps_sbtmvp_enabled_flag = r.flag("sps_sbtmvp_enabled_flag")?;
        }
        self.sps_amvr_enabled_flag = r.flag("sps_amvr_enabled_flag")?;
        self.sps_bdof_enabled_flag = r.flag("sps_bdof_enabled_flag")?;
        if self.sps_bdof_enabled_flag {
            self.sps_bdof_control_present_in_ph_flag = r.flag("sps_bdof_control_present_in_ph_flag")?;
        }
        self.sps_smvd_enabled_flag = r.flag("sps_smvd_enabled_flag")?;
        self.sps_dmvr_enabled_flag = r.flag("sps_dmvr_enabled_flag")?;
        if self.sps_dmvr_enabled_flag {
            self.sps_dmvr_control_present_in_ph_flag = r.flag("sps_dmvr_control_present_in_ph_flag")?;
        }
        self.sps_mmvd_enabled_flag = r.flag("sps_mmvd_enabled_flag")?;
        if self.sps_mmvd_enabled_flag {
            self.sps_mmvd_fullpel_only_enabled_flag = r.flag("sps_mmvd_fullpel_only_enabled_flag")?;
        }
        self.sps_six_minus_max_num_merge_cand = r.read_ue(
            "sps_six_minus_max_num_merge_cand",
            ReadOptions::new().check_range(0, 5),
        )?;
        let max_num_merge_cand = 6 - self.sps_six_minus_max_num_merge_cand;
        self.sps_sbt_enabled_flag = r.flag("sps_sbt_enabled_flag")?;
        self.sps_affine_enabled_flag = r.flag("sps_affine_enabled_flag")?;
        if self.sps_affine_enabled_flag {
            self.sps_five_minus_max_num_subblock_merge_cand = r.read_ue(
                "sps_five_minus_max_num_subblock_merge_cand",
                ReadOptions::new().check_range(0, 5 - i64::from(self.sps_sbtmvp_enabled_flag)),
            )?;
            self.sps_6param_affine_enabled_flag = r.flag("sps_6param_affine_enabled_flag")?;
            if self.sps_amvr_enabled_flag {
                self.sps_affine_amvr_enabled_flag = r.flag("sps_affine_amvr_enabled_flag")?;
            }
            self.sps_affine_prof_enabled_flag = r.flag("sps_affine_prof_enabled_flag")?;
            if self.sps_affine_prof_enabled_flag {
                self.sps_prof_control_present_in_ph_flag = r.flag("sps_prof_control_present_in_ph_flag")?;
            }
        }
        self.sps_bcw_enabled_flag = r.flag("sps_bcw_enabled_flag")?;
        self.sps_ciip_enabled_flag = r.flag("sps_ciip_enabled_flag")?;
        if max_num_merge_cand >= 2 {
            self.sps_gpm_enabled_flag = r.flag("sps_gpm_enabled_flag")?;
            if self.sps_gpm_enabled_flag && max_num_merge_cand >= 3 {
                self.sps_max_num_merge_cand_minus_max_num_gpm_cand = r.read_ue(
                    "sps_max_num_merge_cand_minus_max_num_gpm_cand",
                    ReadOptions::new().check_range(0, i64::from(max_num_merge_cand) - 2),
                )?;
            }
        }
        self.sps_log2_parallel_merge_level_minus2 = r.read_ue(
            "sps_log2_parallel_merge_level_minus2",
            ReadOptions::new().check_range(0, i64::from(self.sps_log2_ctu_size_minus5) + 3),
        )?;
        Ok(())
    }

    fn parse_intra_tools(&mut self, r: &mut SyntaxReader<'_>) -> ParseResult<()> {
        self.sps_isp_enabled_flag = r.flag("sps_isp_enabled_flag")?;
        self.sps_mrl_enabled_flag = r.flag("sps_mrl_enabled_flag")?;
        self.sps_mip_enabled_flag = r.flag("sps_mip_enabled_flag")?;
        if self.sps_chroma_format_idc != 0 {
            self.sps_cclm_enabled_flag = r.flag("sps_cclm_enabled_flag")?;
        }
        if self.sps_chroma_format_idc == 1 {
            self.sps_chroma_horizontal_collocated_flag = r.flag("sps_chroma_horizontal_collocated_flag")?;
            self.sps_chroma_vertical_collocated_flag = r.flag("sps_chroma_vertical_collocated_flag")?;
        }
        self.sps_palette_enabled_flag = r.flag("sps_palette_enabled_flag")?;
        if self.sps_chroma_format_idc == 3 && !self.sps_max_luma_transform_size_64_flag {
            self.sps_act_enabled_flag = r.flag("sps_act_enabled_flag")?;
        }
        if self.sps_transform_skip_enabled_flag || self.sps_palette_enabled_flag {
            self.sps_min_qp_prime_ts =
                r.read_ue("sps_min_qp_prime_ts", ReadOptions::new().check_range(0, 8))?;
        }
        self.sps_ibc_enabled_flag = r.flag("sps_ibc_enabled_flag")?;
        if self.sps_ibc_enabled_flag {
            self.sps_six_minus_max_num_ibc_merge_cand = r.read_ue(
                "sps_six_minus_max_num_ibc_merge_cand",
                ReadOptions::new().check_range(0, 5),
            )?;
        }
        if r.flag("sps_ladf_enabled_flag")? {
            let mut ladf = LadfParameters {
                sps_num_ladf_intervals_minus2: r.bits("sps_num_ladf_intervals_minus2", 2)?,
                sps_ladf_lowest_interval_qp_offset: r.se("sps_ladf_lowest_interval_qp_offset")?,
                intervals: Vec::new(),
            };
            for i in 0..=ladf.sps_num_ladf_intervals_minus2 {
                ladf.intervals.push((
                    r.se(&format!("sps_ladf_qp_offset[{i}]"))?,
                    r.ue(&format!("sps_ladf_delta_threshold_minus1[{i}]"))?,
                ));
            }
            self.ladf = Some(ladf);
        }
        self.sps_explicit_scaling_list_enabled_flag = r.flag("sps_explicit_scaling_list_enabled_flag")?;
        if self.sps_lfnst_enabled_flag && self.sps_explicit_scaling_list_enabled_flag {
            self.sps_scaling_matrix_for_lfnst_disabled_flag =
                r.flag("sps_scaling_matrix_for_lfnst_disabled_flag")?;
        }
        if self.sps_act_enabled_flag && self.sps_explicit_scaling_list_enabled_flag {
            self.sps_scaling_matrix_for_alternative_colour_space_disabled_flag =
                r.flag("sps_scaling_matrix_for_alternative_colour_space_disabled_flag")?;
        }
        if self.sps_scaling_matrix_for_alternative_colour_space_disabled_flag {
            self.sps_scaling_matrix_designated_colour_space_flag =
                r.flag("sps_scaling_matrix_designated_colour_space_flag")?;
        }
        self.sps_dep_quant_enabled_flag = r.flag("sps_dep_quant_enabled_flag")?;
        self.sps_sign_data_hiding_enabled_flag = r.flag("sps_sign_data_hiding_enabled_flag")?;
        self.sps_virtual_boundaries_enabled_flag = r.flag("sps_virtual_boundaries_enabled_flag")?;
        if self.sps_virtual_boundaries_enabled_flag && r.flag("sps_virtual_boundaries_present_flag")? {
            self.virtual_boundaries = Some(VirtualBoundaries::parse(r, "sps")?);
        }
        Ok(())
    }

    fn derive(&self) -> ParseResult<SpsDerived> {
        let (sub_width_c, sub_height_c) = match self.sps_chroma_format_idc {
            1 => (2, 2),
            2 => (2, 1),
            _ => (1, 1),
        };
        let ctb_log2_size_y = self.sps_log2_ctu_size_minus5 + 5;
        let ctb_size_y = 1 << ctb_log2_size_y;
        let w = self.sps_pic_width_max_in_luma_samples;
        let h = self.sps_pic_height_max_in_luma_samples;
        let window = self.conformance_window.unwrap_or_default();
        let crop_x = sub_width_c * (window.left_offset + window.right_offset);
        let crop_y = sub_height_c * (window.top_offset + window.bottom_offset);
        if crop_x >= w || crop_y >= h {
            return Err(ParseError::constraint(format!(
                "VVC: 一致性窗口裁剪后图像为空, width={w}, height={h}, conf_win=({}, {}, {}, {})",
                window.left_offset, window.right_offset, window.top_offset, window.bottom_offset
            )));
        }
        let max_num_merge_cand = 6 - self.sps_six_minus_max_num_merge_cand;
        let max_num_gpm_merge_cand = if !self.sps_gpm_enabled_flag {
            0
        } else if max_num_merge_cand >= 3 {
            max_num_merge_cand - self.sps_max_num_merge_cand_minus_max_num_gpm_cand
        } else {
            2
        };
        let count = |flags: &[bool]| flags.iter().filter(|&&f| f).count() as u32;
        Ok(SpsDerived {
            sub_width_c,
            sub_height_c,
            bit_depth: self.sps_bitdepth_minus8 + 8,
            qp_bd_offset: 6 * self.sps_bitdepth_minus8,
            ctb_log2_size_y,
            ctb_size_y,
            min_cb_log2_size_y: self.sps_log2_min_luma_coding_block_size_minus2 + 2,
            pic_width_in_ctbs_y: w.div_ceil(ctb_size_y),
            pic_height_in_ctbs_y: h.div_ceil(ctb_size_y),
            max_pic_order_cnt_lsb: 1 << (self.sps_log2_max_pic_order_cnt_lsb_minus4 + 4),
            num_extra_ph_bits: count(&self.sps_extra_ph_bit_present_flag),
            num_extra_sh_bits: count(&self.sps_extra_sh_bit_present_flag),
            max_num_merge_cand,
            max_num_gpm_merge_cand,
            crop: CropRect {
                x: sub_width_c * window.left_offset,
                y: sub_height_c * window.top_offset,
                width: w - crop_x,
                height: h - crop_y,
            },
        })
    }

    /// ref_pic_list_struct() 与 ref_pic_lists() 使用的 SPS 字段
    pub fn rpl_context(&self) -> RplContext {
        RplContext {
            long_term_ref_pics_flag: self.sps_long_term_ref_pics_flag,
            inter_layer_prediction_enabled_flag: self.sps_inter_layer_prediction_enabled_flag,
            weighted_prediction: self.sps_weighted_pred_flag || self.sps_weighted_bipred_flag,
            log2_max_pic_order_cnt_lsb: self.sps_log2_max_pic_order_cnt_lsb_minus4 + 4,
            num_ref_pic_lists: [
                self.ref_pic_list_structs[0].len() as u32,
                self.ref_pic_list_structs[1].len() as u32,
            ],
        }
    }

    pub fn num_subpics(&self) -> usize {
        self.subpic_info.subpics.len()
    }

    pub fn display_size(&self) -> (u32, u32) {
        (self.derived.crop.width, self.derived.crop.height)
    }

    /// 帧率, 取自 SPS 定时信息; 固定帧率时计入 elemental_duration_in_tc_minus1
    pub fn frame_rate(&self) -> Option<Rational> {
        let hrd = self.timing_hrd.as_ref()?;
        let elemental = hrd
            .ols
            .sub_layers
            .last()
            .and_then(|s| s.elemental_duration_in_tc_minus1)
            .map_or(1, |v| u64::from(v) + 1);
        let rate = Rational::new(
            u64::from(hrd.general.time_scale),
            u64::from(hrd.general.num_units_in_tick) * elemental,
        );
        Some(rate.reduce())
    }

    pub fn profile_name(&self) -> String {
        self.profile_tier_level
            .as_ref()
            .map(ProfileTierLevel::profile_name)
            .unwrap_or_default()
    }

    pub fn chroma_format_name(&self) -> &'static str {
        ChromaFormat::from_code(self.sps_chroma_format_idc).map_or("", |c| c.meaning())
    }
}

fn log_derived(r: &mut SyntaxReader<'_>, d: &SpsDerived) {
    r.log_calculated("CtbSizeY", d.ctb_size_y);
    r.log_calculated("PicWidthInCtbsY", d.pic_width_in_ctbs_y);
    r.log_calculated("PicHeightInCtbsY", d.pic_height_in_ctbs_y);
    r.log_calculated("MaxPicOrderCntLsb", d.max_pic_order_cnt_lsb);
    r.log_calculated("MaxNumMergeCand", d.max_num_merge_cand);
    if d.num_extra_ph_bits > 0 || d.num_extra_sh_bits > 0 {
        r.log_calculated("NumExtraPhBits", d.num_extra_ph_bits);
        r.log_calculated("NumExtraShBits", d.num_extra_sh_bits);
    }
    r.log_calculated("显示尺寸", format!("{}x{}", d.crop.width, d.crop.height));
}
