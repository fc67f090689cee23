//! HEVC 测试码流构造工具.

use nalscope_core::BitWriter;

use super::super::{HevcParser, HevcParserConfig};

/// general profile Main + general_level_idc, 仅适用于无子层的 PTL
pub fn write_main_ptl(bw: &mut BitWriter, level_idc: u32) {
    write_main_profile(bw);
    bw.write_bits(level_idc, 8);
}

/// general_profile_space .. general_inbld_flag, 共 88 位
pub fn write_main_profile(bw: &mut BitWriter) {
    bw.write_bits(0, 2);
    bw.write_flag(false);
    bw.write_bits(1, 5);
    bw.write_bits(0x6000_0000, 32);
    bw.write_bits(0b1001, 4);
    bw.write_bits_u64(0, 43);
    bw.write_flag(false);
}

/// 基础 VPS 构造参数
#[derive(Debug, Clone)]
pub struct VpsDesc {
    pub vps_id: u32,
    pub max_layers_minus1: u32,
    pub max_layer_id: u32,
    /// 层集合 1.. 包含的 nuh_layer_id
    pub layer_sets: Vec<Vec<u32>>,
    /// (num_units_in_tick, time_scale)
    pub timing: Option<(u32, u32)>,
    pub reserved_0xffff: u32,
}

impl Default for VpsDesc {
    fn default() -> Self {
        Self {
            vps_id: 0,
            max_layers_minus1: 0,
            max_layer_id: 0,
            layer_sets: Vec::new(),
            timing: None,
            reserved_0xffff: 0xFFFF,
        }
    }
}

/// 写出 vps_extension_flag 之前的全部字段 (单子层)
pub fn write_vps_base(bw: &mut BitWriter, desc: &VpsDesc) {
    bw.write_bits(desc.vps_id, 4);
    bw.write_flag(true); // vps_base_layer_internal_flag
    bw.write_flag(true); // vps_base_layer_available_flag
    bw.write_bits(desc.max_layers_minus1, 6);
    bw.write_bits(0, 3); // vps_max_sub_layers_minus1
    bw.write_flag(true); // vps_temporal_id_nesting_flag
    bw.write_bits(desc.reserved_0xffff, 16);
    write_main_ptl(bw, 93);
    bw.write_flag(true); // vps_sub_layer_ordering_info_present_flag
    bw.write_ue(4);
    bw.write_ue(2);
    bw.write_ue(0);
    bw.write_bits(desc.max_layer_id, 6);
    bw.write_ue(desc.layer_sets.len() as u32);
    for set in &desc.layer_sets {
        for j in 0..=desc.max_layer_id {
            bw.write_flag(set.contains(&j));
        }
    }
    match desc.timing {
        Some((num_units_in_tick, time_scale)) => {
            bw.write_flag(true);
            bw.write_bits(num_units_in_tick, 32);
            bw.write_bits(time_scale, 32);
            bw.write_flag(false); // vps_poc_proportional_to_timing_flag
            bw.write_ue(0); // vps_num_hrd_parameters
        }
        None => bw.write_flag(false),
    }
}

/// 不含扩展的 VPS RBSP
pub fn build_vps_rbsp(desc: &VpsDesc) -> Vec<u8> {
    let mut bw = BitWriter::new();
    write_vps_base(&mut bw, desc);
    bw.write_flag(false); // vps_extension_flag
    bw.write_trailing_bits();
    bw.finish()
}

/// 写出 vps_extension_flag=1 与对齐位
pub fn write_extension_start(bw: &mut BitWriter) {
    bw.write_flag(true);
    while !bw.byte_aligned() {
        bw.write_flag(true);
    }
}

/// 写出 vps_extension() 之后的 vps_extension2_flag 与 trailing bits
pub fn write_extension_end(bw: &mut BitWriter) {
    bw.write_ue(0); // vps_non_vui_extension_length
    bw.write_flag(false); // vps_vui_present_flag
    bw.write_flag(false); // vps_extension2_flag
    bw.write_trailing_bits();
}

/// vps_vui_present_flag=1, 对齐位后由 `write_vui` 写出 vps_vui()
pub fn write_extension_end_with_vui(bw: &mut BitWriter, write_vui: &dyn Fn(&mut BitWriter)) {
    bw.write_ue(0); // vps_non_vui_extension_length
    bw.write_flag(true); // vps_vui_present_flag
    while !bw.byte_aligned() {
        bw.write_flag(true);
    }
    write_vui(bw);
    bw.write_flag(false); // vps_extension2_flag
    bw.write_trailing_bits();
}

/// rep_format(), chroma 4:2:0
pub fn write_rep_format(bw: &mut BitWriter, width: u32, height: u32, bit_depth_minus8: Option<u32>) {
    bw.write_bits(width, 16);
    bw.write_bits(height, 16);
    match bit_depth_minus8 {
        Some(depth) => {
            bw.write_flag(true);
            bw.write_bits(1, 2);
            bw.write_bits(depth, 4);
            bw.write_bits(depth, 4);
        }
        None => bw.write_flag(false),
    }
    bw.write_flag(false); // conformance_window_vps_flag
}

/// SPS 构造参数
#[derive(Debug, Clone)]
pub struct SpsDesc {
    pub vps_id: u32,
    pub max_sub_layers_minus1: u32,
    pub sps_id: u32,
    pub chroma_format_idc: u32,
    pub width: u32,
    pub height: u32,
    /// [left, right, top, bottom]
    pub conf_win: Option<[u32; 4]>,
    pub bit_depth_luma_minus8: u32,
    pub log2_max_poc_lsb_minus4: u32,
    pub log2_min_cb_minus3: u32,
    pub log2_diff_max_min_cb: u32,
    /// scaling_list_enabled_flag, 不带显式数据
    pub scaling_list_enabled: bool,
    /// (pcm_sample_bit_depth_luma_minus1, pcm_sample_bit_depth_chroma_minus1)
    pub pcm: Option<(u32, u32)>,
    /// 显式 RPS: (负方向 delta, 正方向 delta), 均标记为当前使用
    pub st_rps: Vec<(Vec<i32>, Vec<i32>)>,
    pub long_term_lsbs: Option<Vec<u32>>,
    /// (num_units_in_tick, time_scale)
    pub timing: Option<(u32, u32)>,
    /// VUI frame_field_info_present_flag
    pub frame_field_info: bool,
    pub range_extension: bool,
}

impl Default for SpsDesc {
    fn default() -> Self {
        Self {
            vps_id: 0,
            max_sub_layers_minus1: 0,
            sps_id: 0,
            chroma_format_idc: 1,
            width: 1920,
            height: 1080,
            conf_win: None,
            bit_depth_luma_minus8: 0,
            log2_max_poc_lsb_minus4: 4,
            log2_min_cb_minus3: 0,
            log2_diff_max_min_cb: 3,
            scaling_list_enabled: false,
            pcm: None,
            st_rps: Vec::new(),
            long_term_lsbs: None,
            timing: None,
            frame_field_info: false,
            range_extension: false,
        }
    }
}

pub fn build_sps_rbsp(desc: &SpsDesc) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_bits(desc.vps_id, 4);
    bw.write_bits(desc.max_sub_layers_minus1, 3);
    bw.write_flag(true); // sps_temporal_id_nesting_flag
    write_main_ptl(&mut bw, 120);
    bw.write_ue(desc.sps_id);
    bw.write_ue(desc.chroma_format_idc);
    if desc.chroma_format_idc == 3 {
        bw.write_flag(false);
    }
    bw.write_ue(desc.width);
    bw.write_ue(desc.height);
    match desc.conf_win {
        Some(win) => {
            bw.write_flag(true);
            for v in win {
                bw.write_ue(v);
            }
        }
        None => bw.write_flag(false),
    }
    bw.write_ue(desc.bit_depth_luma_minus8);
    bw.write_ue(desc.bit_depth_luma_minus8);
    bw.write_ue(desc.log2_max_poc_lsb_minus4);
    bw.write_flag(true); // sps_sub_layer_ordering_info_present_flag
    bw.write_ue(4);
    bw.write_ue(2);
    bw.write_ue(0);
    bw.write_ue(desc.log2_min_cb_minus3);
    bw.write_ue(desc.log2_diff_max_min_cb);
    bw.write_ue(0); // log2_min_luma_transform_block_size_minus2
    bw.write_ue(3); // log2_diff_max_min_luma_transform_block_size
    bw.write_ue(1); // max_transform_hierarchy_depth_inter
    bw.write_ue(1); // max_transform_hierarchy_depth_intra
    bw.write_flag(desc.scaling_list_enabled);
    if desc.scaling_list_enabled {
        bw.write_flag(false); // sps_scaling_list_data_present_flag
    }
    bw.write_flag(true); // amp_enabled_flag
    bw.write_flag(true); // sample_adaptive_offset_enabled_flag
    match desc.pcm {
        Some((luma, chroma)) => {
            bw.write_flag(true);
            bw.write_bits(luma, 4);
            bw.write_bits(chroma, 4);
            bw.write_ue(0);
            bw.write_ue(1);
            bw.write_flag(true);
        }
        None => bw.write_flag(false),
    }
    bw.write_ue(desc.st_rps.len() as u32);
    for (idx, (neg, pos)) in desc.st_rps.iter().enumerate() {
        if idx > 0 {
            bw.write_flag(false); // inter_ref_pic_set_prediction_flag
        }
        bw.write_ue(neg.len() as u32);
        bw.write_ue(pos.len() as u32);
        let mut prev = 0;
        for &d in neg {
            bw.write_ue((prev - d - 1) as u32);
            bw.write_flag(true);
            prev = d;
        }
        prev = 0;
        for &d in pos {
            bw.write_ue((d - prev - 1) as u32);
            bw.write_flag(true);
            prev = d;
        }
    }
    match &desc.long_term_lsbs {
        Some(lsbs) => {
            bw.write_flag(true);
            bw.write_ue(lsbs.len() as u32);
            for &lsb in lsbs {
                bw.write_bits(lsb, desc.log2_max_poc_lsb_minus4 + 4);
                bw.write_flag(true);
            }
        }
        None => bw.write_flag(false),
    }
    bw.write_flag(true); // sps_temporal_mvp_enabled_flag
    bw.write_flag(true); // strong_intra_smoothing_enabled_flag
    if desc.timing.is_some() || desc.frame_field_info {
        bw.write_flag(true); // vui_parameters_present_flag
        for _ in 0..6 {
            bw.write_flag(false);
        }
        bw.write_flag(desc.frame_field_info);
        bw.write_flag(false); // default_display_window_flag
        match desc.timing {
            Some((num_units_in_tick, time_scale)) => {
                bw.write_flag(true); // vui_timing_info_present_flag
                bw.write_bits(num_units_in_tick, 32);
                bw.write_bits(time_scale, 32);
                bw.write_flag(false);
                bw.write_flag(false);
            }
            None => bw.write_flag(false),
        }
        bw.write_flag(false); // bitstream_restriction_flag
    } else {
        bw.write_flag(false);
    }
    if desc.range_extension {
        bw.write_flag(true); // sps_extension_present_flag
        bw.write_flag(true); // sps_range_extension_flag
        bw.write_bits(0, 3);
        bw.write_bits(0, 4);
        bw.write_bits(0b1_0100_0000, 9); // rotation + implicit_rdpcm
    } else {
        bw.write_flag(false);
    }
    bw.write_trailing_bits();
    bw.finish()
}

/// 组装 NAL 单元: 两字节头部 + 插入防竞争字节后的 RBSP
pub fn nal(nal_unit_type: u32, nuh_layer_id: u32, rbsp: &[u8]) -> Vec<u8> {
    let mut out = vec![
        ((nal_unit_type & 0x3F) << 1 | (nuh_layer_id >> 5)) as u8,
        ((nuh_layer_id & 0x1F) << 3 | 1) as u8,
    ];
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

/// PPS 构造参数
#[derive(Debug, Clone, Default)]
pub struct PpsDesc {
    pub pps_id: u32,
    pub sps_id: u32,
    pub dependent_slice_segments: bool,
    pub num_extra_slice_header_bits: u32,
    pub cabac_init_present: bool,
    pub init_qp_minus26: i32,
    pub weighted_pred: bool,
    /// (num_tile_columns_minus1, num_tile_rows_minus1), 均匀划分
    pub tiles: Option<(u32, u32)>,
    pub entropy_coding_sync: bool,
    /// deblocking_filter_control_present_flag 且 override 使能
    pub deblocking_override: bool,
    pub lists_modification_present: bool,
    pub slice_header_extension_present: bool,
}

pub fn build_pps_rbsp(desc: &PpsDesc) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_ue(desc.pps_id);
    bw.write_ue(desc.sps_id);
    bw.write_flag(desc.dependent_slice_segments);
    bw.write_flag(false); // output_flag_present_flag
    bw.write_bits(desc.num_extra_slice_header_bits, 3);
    bw.write_flag(false); // sign_data_hiding_enabled_flag
    bw.write_flag(desc.cabac_init_present);
    bw.write_ue(0); // num_ref_idx_l0_default_active_minus1
    bw.write_ue(0);
    bw.write_se(desc.init_qp_minus26);
    bw.write_flag(false); // constrained_intra_pred_flag
    bw.write_flag(false); // transform_skip_enabled_flag
    bw.write_flag(false); // cu_qp_delta_enabled_flag
    bw.write_se(0);
    bw.write_se(0);
    bw.write_flag(false); // pps_slice_chroma_qp_offsets_present_flag
    bw.write_flag(desc.weighted_pred);
    bw.write_flag(false); // weighted_bipred_flag
    bw.write_flag(false); // transquant_bypass_enabled_flag
    bw.write_flag(desc.tiles.is_some());
    bw.write_flag(desc.entropy_coding_sync);
    if let Some((cols, rows)) = desc.tiles {
        bw.write_ue(cols);
        bw.write_ue(rows);
        bw.write_flag(true); // uniform_spacing_flag
        bw.write_flag(true); // loop_filter_across_tiles_enabled_flag
    }
    bw.write_flag(true); // pps_loop_filter_across_slices_enabled_flag
    bw.write_flag(desc.deblocking_override);
    if desc.deblocking_override {
        bw.write_flag(true);
        bw.write_flag(false);
        bw.write_se(0);
        bw.write_se(0);
    }
    bw.write_flag(false); // pps_scaling_list_data_present_flag
    bw.write_flag(desc.lists_modification_present);
    bw.write_ue(0); // log2_parallel_merge_level_minus2
    bw.write_flag(desc.slice_header_extension_present);
    bw.write_flag(false); // pps_extension_present_flag
    bw.write_trailing_bits();
    bw.finish()
}

pub const VPS_NUT: u32 = 32;
pub const SPS_NUT: u32 = 33;
pub const PPS_NUT: u32 = 34;

/// 依次送入 VPS / SPS / PPS 后的解析器
pub fn parser_with(sps: &SpsDesc, pps: &PpsDesc) -> HevcParser {
    let mut parser = HevcParser::new(HevcParserConfig::default());
    parser
        .parse_nal(&nal(VPS_NUT, 0, &build_vps_rbsp(&VpsDesc::default())))
        .expect("VPS 应可解析");
    parser
        .parse_nal(&nal(SPS_NUT, 0, &build_sps_rbsp(sps)))
        .expect("SPS 应可解析");
    parser
        .parse_nal(&nal(PPS_NUT, 0, &build_pps_rbsp(pps)))
        .expect("PPS 应可解析");
    parser
}
