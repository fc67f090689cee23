//! VVC 测试码流构造工具.

use nalscope_core::BitWriter;

pub const TRAIL_NUT: u32 = 0;
pub const IDR_N_LP: u32 = 8;
pub const VPS_NUT: u32 = 14;
pub const SPS_NUT: u32 = 15;
pub const PPS_NUT: u32 = 16;
pub const PH_NUT: u32 = 19;
pub const EOS_NUT: u32 = 21;

/// 两字节 NAL 头部 + 插入防竞争字节的 RBSP
pub fn nal(nal_unit_type: u32, nuh_layer_id: u32, rbsp: &[u8]) -> Vec<u8> {
    let mut out = vec![(nuh_layer_id & 0x3F) as u8, ((nal_unit_type & 0x1F) << 3 | 1) as u8];
    let mut zeros = 0;
    for &b in rbsp {
        if zeros >= 2 && b <= 3 {
            out.push(0x03);
            zeros = 0;
        }
        out.push(b);
        zeros = if b == 0 { zeros + 1 } else { 0 };
    }
    out
}

/// Main 10 profile_tier_level(1, 0), 不含 GCI
pub fn write_main10_ptl(bw: &mut BitWriter, level_idc: u32) {
    bw.write_bits(1, 7); // general_profile_idc
    bw.write_flag(false); // general_tier_flag
    bw.write_bits(level_idc, 8);
    bw.write_flag(true); // ptl_frame_only_constraint_flag
    bw.write_flag(false); // ptl_multilayer_enabled_flag
    bw.write_flag(false); // gci_present_flag
    bw.align_to_byte();
    bw.write_bits(0, 8); // ptl_num_sub_profiles
}

/// 单层、单子层、4:2:0 的 SPS
#[derive(Debug, Clone)]
pub struct SpsDesc {
    pub sps_id: u32,
    pub width: u32,
    pub height: u32,
    pub log2_ctu_size_minus5: u32,
    pub bitdepth_minus8: u32,
    pub entropy_coding_sync: bool,
    pub entry_point_offsets_present: bool,
    pub log2_max_poc_lsb_minus4: u32,
    pub sao: bool,
}

impl Default for SpsDesc {
    fn default() -> Self {
        Self {
            sps_id: 0,
            width: 1920,
            height: 1080,
            log2_ctu_size_minus5: 2,
            bitdepth_minus8: 2,
            entropy_coding_sync: false,
            entry_point_offsets_present: false,
            log2_max_poc_lsb_minus4: 4,
            sao: false,
        }
    }
}

pub fn build_sps_rbsp(desc: &SpsDesc) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_bits(desc.sps_id, 4);
    bw.write_bits(0, 4); // sps_video_parameter_set_id
    bw.write_bits(0, 3); // sps_max_sublayers_minus1
    bw.write_bits(1, 2); // sps_chroma_format_idc
    bw.write_bits(desc.log2_ctu_size_minus5, 2);
    bw.write_flag(true); // sps_ptl_dpb_hrd_params_present_flag
    write_main10_ptl(&mut bw, 83);
    bw.write_flag(false); // sps_gdr_enabled_flag
    bw.write_flag(false); // sps_ref_pic_resampling_enabled_flag
    bw.write_ue(desc.width);
    bw.write_ue(desc.height);
    bw.write_flag(false); // sps_conformance_window_flag
    bw.write_flag(false); // sps_subpic_info_present_flag
    bw.write_ue(desc.bitdepth_minus8);
    bw.write_flag(desc.entropy_coding_sync);
    bw.write_flag(desc.entry_point_offsets_present);
    bw.write_bits(desc.log2_max_poc_lsb_minus4, 4);
    bw.write_flag(false); // sps_poc_msb_cycle_flag
    bw.write_bits(0, 2); // sps_num_extra_ph_bytes
    bw.write_bits(0, 2); // sps_num_extra_sh_bytes
    // dpb_parameters()
    bw.write_ue(4);
    bw.write_ue(2);
    bw.write_ue(0);

    bw.write_ue(0); // sps_log2_min_luma_coding_block_size_minus2
    bw.write_flag(false); // sps_partition_constraints_override_enabled_flag
    bw.write_ue(1);
    bw.write_ue(0); // sps_max_mtt_hierarchy_depth_intra_slice_luma
    bw.write_flag(false); // sps_qtbtt_dual_tree_intra_flag
    bw.write_ue(1);
    bw.write_ue(0); // sps_max_mtt_hierarchy_depth_inter_slice
    if desc.log2_ctu_size_minus5 > 0 {
        bw.write_flag(true); // sps_max_luma_transform_size_64_flag
    }

    bw.write_flag(false); // sps_transform_skip_enabled_flag
    bw.write_flag(false); // sps_mts_enabled_flag
    bw.write_flag(false); // sps_lfnst_enabled_flag
    bw.write_flag(false); // sps_joint_cbcr_enabled_flag
    bw.write_flag(true); // sps_same_qp_table_for_chroma_flag
    bw.write_se(0);
    bw.write_ue(0);
    bw.write_ue(0);
    bw.write_ue(0);
    bw.write_flag(desc.sao);
    bw.write_flag(false); // sps_alf_enabled_flag
    bw.write_flag(false); // sps_lmcs_enabled_flag

    bw.write_flag(false); // sps_weighted_pred_flag
    bw.write_flag(false); // sps_weighted_bipred_flag
    bw.write_flag(false); // sps_long_term_ref_pics_flag
    bw.write_flag(false); // sps_idr_rpl_present_flag
    bw.write_flag(true); // sps_rpl1_same_as_rpl0_flag
    bw.write_ue(0); // sps_num_ref_pic_lists[0]
    bw.write_flag(false); // sps_ref_wraparound_enabled_flag
    bw.write_flag(false); // sps_temporal_mvp_enabled_flag
    bw.write_flag(false); // sps_amvr_enabled_flag
    bw.write_flag(false); // sps_bdof_enabled_flag
    bw.write_flag(false); // sps_smvd_enabled_flag
    bw.write_flag(false); // sps_dmvr_enabled_flag
    bw.write_flag(false); // sps_mmvd_enabled_flag
    bw.write_ue(0); // sps_six_minus_max_num_merge_cand
    bw.write_flag(false); // sps_sbt_enabled_flag
    bw.write_flag(false); // sps_affine_enabled_flag
    bw.write_flag(false); // sps_bcw_enabled_flag
    bw.write_flag(false); // sps_ciip_enabled_flag
    bw.write_flag(false); // sps_gpm_enabled_flag
    bw.write_ue(0); // sps_log2_parallel_merge_level_minus2

    bw.write_flag(false); // sps_isp_enabled_flag
    bw.write_flag(false); // sps_mrl_enabled_flag
    bw.write_flag(false); // sps_mip_enabled_flag
    bw.write_flag(false); // sps_cclm_enabled_flag
    bw.write_flag(false); // sps_chroma_horizontal_collocated_flag
    bw.write_flag(false); // sps_chroma_vertical_collocated_flag
    bw.write_flag(false); // sps_palette_enabled_flag
    bw.write_flag(false); // sps_ibc_enabled_flag
    bw.write_flag(false); // sps_ladf_enabled_flag
    bw.write_flag(false); // sps_explicit_scaling_list_enabled_flag
    bw.write_flag(false); // sps_dep_quant_enabled_flag
    bw.write_flag(false); // sps_sign_data_hiding_enabled_flag
    bw.write_flag(false); // sps_virtual_boundaries_enabled_flag

    bw.write_flag(false); // sps_timing_hrd_params_present_flag
    bw.write_flag(false); // sps_field_seq_flag
    bw.write_flag(false); // sps_vui_parameters_present_flag
    bw.write_flag(false); // sps_extension_flag
    bw.write_trailing_bits();
    bw.finish()
}

/// 均匀 tile 网格: 每个 tile 为 `column_width` x `row_height` 个 CTU
#[derive(Debug, Clone, Copy)]
pub struct TileGrid {
    pub column_width: u32,
    pub row_height: u32,
}

/// tile 与条带划分方式
#[derive(Debug, Clone)]
pub enum Partition {
    /// pps_no_pic_partition_flag=1
    None,
    /// 每个 tile 一个光栅扫描条带组
    Raster(TileGrid),
    /// 每个 tile 一个矩形条带 (网格为单行 tile)
    RectPerTile(TileGrid),
}

#[derive(Debug, Clone)]
pub struct PpsDesc {
    pub pps_id: u32,
    pub sps_id: u32,
    pub width: u32,
    pub height: u32,
    pub log2_ctu_size_minus5: u32,
    pub partition: Partition,
    pub init_qp_minus26: i32,
    /// (override_enabled, disabled, dbf_info_in_ph)
    pub deblocking: Option<(bool, bool, bool)>,
}

impl Default for PpsDesc {
    fn default() -> Self {
        Self {
            pps_id: 0,
            sps_id: 0,
            width: 1920,
            height: 1080,
            log2_ctu_size_minus5: 2,
            partition: Partition::None,
            init_qp_minus26: 0,
            deblocking: None,
        }
    }
}

pub fn build_pps_rbsp(desc: &PpsDesc) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_bits(desc.pps_id, 6);
    bw.write_bits(desc.sps_id, 4);
    bw.write_flag(false); // pps_mixed_nalu_types_in_pic_flag
    bw.write_ue(desc.width);
    bw.write_ue(desc.height);
    bw.write_flag(false); // pps_conformance_window_flag
    bw.write_flag(false); // pps_scaling_window_explicit_signalling_flag
    bw.write_flag(false); // pps_output_flag_present_flag
    let no_partition = matches!(desc.partition, Partition::None);
    bw.write_flag(no_partition);
    bw.write_flag(false); // pps_subpic_id_mapping_present_flag

    let ctb = 1u32 << (desc.log2_ctu_size_minus5 + 5);
    let cols_in_ctbs = desc.width.div_ceil(ctb);
    let rows_in_ctbs = desc.height.div_ceil(ctb);
    match &desc.partition {
        Partition::None => {}
        Partition::Raster(grid) | Partition::RectPerTile(grid) => {
            bw.write_bits(desc.log2_ctu_size_minus5, 2);
            bw.write_ue(0); // pps_num_exp_tile_columns_minus1
            bw.write_ue(0); // pps_num_exp_tile_rows_minus1
            bw.write_ue(grid.column_width - 1);
            bw.write_ue(grid.row_height - 1);
            let num_cols = cols_in_ctbs.div_ceil(grid.column_width);
            let num_rows = rows_in_ctbs.div_ceil(grid.row_height);
            let num_tiles = num_cols * num_rows;
            let rect = matches!(desc.partition, Partition::RectPerTile(_));
            if num_tiles > 1 {
                bw.write_flag(true); // pps_loop_filter_across_tiles_enabled_flag
                bw.write_flag(rect);
            }
            if rect {
                bw.write_flag(false); // pps_single_slice_per_subpic_flag
                bw.write_ue(num_tiles - 1);
                if num_tiles - 1 > 1 {
                    bw.write_flag(false); // pps_tile_idx_delta_present_flag
                }
                for i in 0..num_tiles - 1 {
                    if i != num_cols - 1 {
                        bw.write_ue(0); // pps_slice_width_in_tiles_minus1
                    }
                    if grid.row_height.min(rows_in_ctbs) > 1 {
                        bw.write_ue(0); // pps_num_exp_slices_in_tile
                    }
                }
            }
            if !rect || num_tiles > 1 {
                bw.write_flag(false); // pps_loop_filter_across_slices_enabled_flag
            }
        }
    }

    bw.write_flag(false); // pps_cabac_init_present_flag
    bw.write_ue(0);
    bw.write_ue(0);
    bw.write_flag(false); // pps_rpl1_idx_present_flag
    bw.write_flag(false); // pps_weighted_pred_flag
    bw.write_flag(false); // pps_weighted_bipred_flag
    bw.write_flag(false); // pps_ref_wraparound_enabled_flag
    bw.write_se(desc.init_qp_minus26);
    bw.write_flag(false); // pps_cu_qp_delta_enabled_flag
    bw.write_flag(false); // pps_chroma_tool_offsets_present_flag
    match desc.deblocking {
        Some((override_enabled, disabled, in_ph)) => {
            bw.write_flag(true);
            bw.write_flag(override_enabled);
            bw.write_flag(disabled);
            if !no_partition && override_enabled {
                bw.write_flag(in_ph);
            }
            if !disabled {
                bw.write_se(0);
                bw.write_se(0);
            }
        }
        None => bw.write_flag(false),
    }
    if !no_partition {
        bw.write_flag(false); // pps_rpl_info_in_ph_flag
        bw.write_flag(false); // pps_sao_info_in_ph_flag
        bw.write_flag(false); // pps_alf_info_in_ph_flag
        bw.write_flag(false); // pps_qp_delta_info_in_ph_flag
    }
    bw.write_flag(false); // pps_picture_header_extension_present_flag
    bw.write_flag(false); // pps_slice_header_extension_present_flag
    bw.write_flag(false); // pps_extension_flag
    bw.write_trailing_bits();
    bw.finish()
}

/// 图像头字段 (SPS/PPS 均为上述默认工具配置)
#[derive(Debug, Clone, Copy)]
pub struct PhDesc {
    pub irap: bool,
    pub non_ref: bool,
    pub inter_allowed: bool,
    pub pps_id: u32,
    pub poc_lsb: u32,
    pub log2_max_poc_lsb: u32,
}

impl Default for PhDesc {
    fn default() -> Self {
        Self {
            irap: true,
            non_ref: false,
            inter_allowed: false,
            pps_id: 0,
            poc_lsb: 0,
            log2_max_poc_lsb: 8,
        }
    }
}

/// picture_header_structure(); PPS 的 *_info_in_ph_flag 均为 0
pub fn write_picture_header(bw: &mut BitWriter, desc: &PhDesc) {
    bw.write_flag(desc.irap);
    bw.write_flag(desc.non_ref);
    if desc.irap {
        bw.write_flag(false); // ph_gdr_pic_flag
    }
    bw.write_flag(desc.inter_allowed);
    if desc.inter_allowed {
        bw.write_flag(true); // ph_intra_slice_allowed_flag
    }
    bw.write_ue(desc.pps_id);
    bw.write_bits(desc.poc_lsb, desc.log2_max_poc_lsb);
    if desc.inter_allowed {
        bw.write_flag(false); // ph_mvd_l1_zero_flag
    }
}

pub fn build_ph_rbsp(desc: &PhDesc) -> Vec<u8> {
    let mut bw = BitWriter::new();
    write_picture_header(&mut bw, desc);
    bw.write_trailing_bits();
    bw.finish()
}

/// 条带头, 只写到 byte_alignment() 为止
#[derive(Debug, Clone, Default)]
pub struct SliceDesc {
    /// 嵌入条带头的图像头
    pub picture_header: Option<PhDesc>,
    pub nal_unit_type: u32,
    /// (位数, 值)
    pub slice_address: Option<(u32, u32)>,
    /// 光栅扫描条带的 sh_num_tiles_in_slice_minus1
    pub num_tiles_in_slice_minus1: Option<u32>,
    /// 图像允许帧间条带时写 sh_slice_type
    pub slice_type: Option<u32>,
    /// 列表 0 的短期参考 (DeltaPocValSt), 非 IDR 条带写出 ref_pic_lists()
    pub list0: Vec<i32>,
    pub qp_delta: i32,
    /// SAO 标志在条带头中
    pub sao_in_sh: bool,
    /// 覆盖去块参数: Some(disabled)
    pub deblocking_override: Option<bool>,
    /// sh_entry_point_offset_minus1, 位宽 8
    pub entry_points: Vec<u32>,
}

pub fn build_slice_rbsp(desc: &SliceDesc) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_flag(desc.picture_header.is_some());
    if let Some(ph) = &desc.picture_header {
        write_picture_header(&mut bw, ph);
    }
    if let Some((bits, value)) = desc.slice_address {
        bw.write_bits(value, bits);
    }
    if let Some(n) = desc.num_tiles_in_slice_minus1 {
        bw.write_ue(n);
    }
    if let Some(t) = desc.slice_type {
        bw.write_ue(t);
    }
    if (7..=10).contains(&desc.nal_unit_type) {
        bw.write_flag(false); // sh_no_output_of_prior_pics_flag
    }
    if !(7..=8).contains(&desc.nal_unit_type) {
        // 两个列表各自显式给出 ref_pic_list_struct()
        bw.write_ue(desc.list0.len() as u32);
        for &delta in &desc.list0 {
            bw.write_ue(delta.unsigned_abs() - 1);
            bw.write_flag(delta < 0);
        }
        bw.write_ue(0);
    }
    bw.write_se(desc.qp_delta);
    if desc.sao_in_sh {
        bw.write_flag(true); // sh_sao_luma_used_flag
        bw.write_flag(false); // sh_sao_chroma_used_flag
    }
    if let Some(disabled) = desc.deblocking_override {
        bw.write_flag(true); // sh_deblocking_params_present_flag
        bw.write_flag(disabled);
        if !disabled {
            bw.write_se(1);
            bw.write_se(-1);
        }
    }
    if !desc.entry_points.is_empty() {
        bw.write_ue(7); // sh_entry_offset_len_minus1
        for &offset in &desc.entry_points {
            bw.write_bits(offset, 8);
        }
    }
    bw.write_trailing_bits(); // byte_alignment()
    bw.write_bits(0xA5, 8); // 条带数据
    bw.finish()
}
