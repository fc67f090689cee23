//! 集成测试共用的码流构造工具.

#![allow(dead_code)]

use bytes::Bytes;
use nalscope::core::BitWriter;

/// 初始化测试日志, 多次调用安全
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 用 4 字节起始码串联各单元
pub fn annex_b(units: &[Vec<u8>]) -> Bytes {
    let mut out = Vec::new();
    for unit in units {
        out.extend_from_slice(&[0x00, 0x00, 0x00, 0x01]);
        out.extend_from_slice(unit);
    }
    Bytes::from(out)
}

/// 在 RBSP 中插入防竞争字节
fn escape(rbsp: &[u8], out: &mut Vec<u8>) {
    let mut zeros = 0;
    for &b in rbsp {
        if zeros >= 2 && b <= 3 {
            out.push(0x03);
            zeros = 0;
        }
        out.push(b);
        zeros = if b == 0 { zeros + 1 } else { 0 };
    }
}

// ============================================================
// AVC
// ============================================================

pub fn avc_nal(nal_ref_idc: u32, nal_unit_type: u32, rbsp: &[u8]) -> Vec<u8> {
    let mut out = vec![((nal_ref_idc << 5) | nal_unit_type) as u8];
    escape(rbsp, &mut out);
    out
}

/// Main profile SPS, POC type 0 (8 位 lsb), frame_num 4 位, 帧率 25 fps
pub fn avc_sps(width_mbs: u32, height_mbs: u32) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_bits(77, 8);
    bw.write_bits(0, 8);
    bw.write_bits(31, 8);
    bw.write_ue(0); // seq_parameter_set_id
    bw.write_ue(0); // log2_max_frame_num_minus4
    bw.write_ue(0); // pic_order_cnt_type
    bw.write_ue(4); // log2_max_pic_order_cnt_lsb_minus4
    bw.write_ue(2); // max_num_ref_frames
    bw.write_flag(false);
    bw.write_ue(width_mbs - 1);
    bw.write_ue(height_mbs - 1);
    bw.write_flag(true); // frame_mbs_only_flag
    bw.write_flag(true);
    bw.write_flag(false); // frame_cropping_flag
    bw.write_flag(true); // vui_parameters_present_flag
    bw.write_flag(false); // aspect_ratio_info_present_flag
    bw.write_flag(false); // overscan_info_present_flag
    bw.write_flag(false); // video_signal_type_present_flag
    bw.write_flag(false); // chroma_loc_info_present_flag
    bw.write_flag(true); // timing_info_present_flag
    bw.write_bits(1, 32);
    bw.write_bits(50, 32);
    bw.write_flag(true); // fixed_frame_rate_flag
    bw.write_flag(false);
    bw.write_flag(false);
    bw.write_flag(false); // pic_struct_present_flag
    bw.write_flag(false); // bitstream_restriction_flag
    bw.write_trailing_bits();
    avc_nal(3, 7, &bw.finish())
}

/// CAVLC PPS, deblocking_filter_control_present_flag=1
pub fn avc_pps() -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_ue(0);
    bw.write_ue(0);
    bw.write_flag(false);
    bw.write_flag(false);
    bw.write_ue(0);
    bw.write_ue(0);
    bw.write_ue(0);
    bw.write_flag(false);
    bw.write_bits(0, 2);
    bw.write_se(0);
    bw.write_se(0);
    bw.write_se(0);
    bw.write_flag(true);
    bw.write_flag(false);
    bw.write_flag(false);
    bw.write_trailing_bits();
    avc_nal(3, 8, &bw.finish())
}

/// IDR I 条带 (slice_type=7)
pub fn avc_idr_slice(idr_pic_id: u32, poc_lsb: u32) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_ue(0);
    bw.write_ue(7);
    bw.write_ue(0);
    bw.write_bits(0, 4);
    bw.write_ue(idr_pic_id);
    bw.write_bits(poc_lsb, 8);
    bw.write_flag(false); // no_output_of_prior_pics_flag
    bw.write_flag(false); // long_term_reference_flag
    bw.write_se(0);
    bw.write_ue(1);
    bw.write_trailing_bits();
    avc_nal(3, 5, &bw.finish())
}

/// 非 IDR P 条带 (slice_type=5)
pub fn avc_p_slice(nal_ref_idc: u32, frame_num: u32, poc_lsb: u32) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_ue(0);
    bw.write_ue(5);
    bw.write_ue(0);
    bw.write_bits(frame_num, 4);
    bw.write_bits(poc_lsb, 8);
    bw.write_flag(false); // num_ref_idx_active_override_flag
    bw.write_flag(false); // ref_pic_list_modification_flag_l0
    if nal_ref_idc != 0 {
        bw.write_flag(false); // adaptive_ref_pic_marking_mode_flag
    }
    bw.write_se(2);
    bw.write_ue(1);
    bw.write_trailing_bits();
    avc_nal(nal_ref_idc, 1, &bw.finish())
}

// ============================================================
// HEVC
// ============================================================

pub fn hevc_nal(nal_unit_type: u32, nuh_layer_id: u32, rbsp: &[u8]) -> Vec<u8> {
    let mut out = vec![
        ((nal_unit_type & 0x3F) << 1 | (nuh_layer_id >> 5)) as u8,
        ((nuh_layer_id & 0x1F) << 3 | 1) as u8,
    ];
    escape(rbsp, &mut out);
    out
}

/// general Main profile, 无子层
fn write_hevc_main_ptl(bw: &mut BitWriter, level_idc: u32) {
    bw.write_bits(0, 2);
    bw.write_flag(false);
    bw.write_bits(1, 5);
    bw.write_bits(0x6000_0000, 32);
    bw.write_bits(0b1001, 4);
    bw.write_bits_u64(0, 43);
    bw.write_flag(false);
    bw.write_bits(level_idc, 8);
}

/// 单层 VPS, 可选 timing_info
pub fn hevc_vps(timing: Option<(u32, u32)>) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_bits(0, 4);
    bw.write_flag(true);
    bw.write_flag(true);
    bw.write_bits(0, 6); // vps_max_layers_minus1
    bw.write_bits(0, 3);
    bw.write_flag(true);
    bw.write_bits(0xFFFF, 16);
    write_hevc_main_ptl(&mut bw, 93);
    bw.write_flag(true);
    bw.write_ue(4);
    bw.write_ue(2);
    bw.write_ue(0);
    bw.write_bits(0, 6); // vps_max_layer_id
    bw.write_ue(0); // vps_num_layer_sets_minus1
    match timing {
        Some((num_units_in_tick, time_scale)) => {
            bw.write_flag(true);
            bw.write_bits(num_units_in_tick, 32);
            bw.write_bits(time_scale, 32);
            bw.write_flag(false);
            bw.write_ue(0);
        }
        None => bw.write_flag(false),
    }
    bw.write_flag(false); // vps_extension_flag
    bw.write_trailing_bits();
    hevc_nal(32, 0, &bw.finish())
}

/// 4:2:0 8 位 SPS, 一个显式短期 RPS {-1}
pub fn hevc_sps(width: u32, height: u32, conf_win_bottom: u32) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_bits(0, 4);
    bw.write_bits(0, 3);
    bw.write_flag(true);
    write_hevc_main_ptl(&mut bw, 120);
    bw.write_ue(0); // sps_seq_parameter_set_id
    bw.write_ue(1); // chroma_format_idc
    bw.write_ue(width);
    bw.write_ue(height);
    if conf_win_bottom > 0 {
        bw.write_flag(true);
        bw.write_ue(0);
        bw.write_ue(0);
        bw.write_ue(0);
        bw.write_ue(conf_win_bottom);
    } else {
        bw.write_flag(false);
    }
    bw.write_ue(0);
    bw.write_ue(0);
    bw.write_ue(4); // log2_max_pic_order_cnt_lsb_minus4
    bw.write_flag(true);
    bw.write_ue(4);
    bw.write_ue(2);
    bw.write_ue(0);
    bw.write_ue(0); // log2_min_luma_coding_block_size_minus3
    bw.write_ue(3);
    bw.write_ue(0);
    bw.write_ue(3);
    bw.write_ue(1);
    bw.write_ue(1);
    bw.write_flag(false); // scaling_list_enabled_flag
    bw.write_flag(true);
    bw.write_flag(true);
    bw.write_flag(false); // pcm_enabled_flag
    bw.write_ue(1); // num_short_term_ref_pic_sets
    bw.write_ue(1);
    bw.write_ue(0);
    bw.write_ue(0); // delta_poc_s0_minus1
    bw.write_flag(true);
    bw.write_flag(false); // long_term_ref_pics_present_flag
    bw.write_flag(true);
    bw.write_flag(true);
    bw.write_flag(false); // vui_parameters_present_flag
    bw.write_flag(false); // sps_extension_present_flag
    bw.write_trailing_bits();
    hevc_nal(33, 0, &bw.finish())
}

// ============================================================
// MPEG-2
// ============================================================

/// 720x576 25 fps, 6 Mbps
pub fn mpeg2_sequence_header() -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_bits(0xB3, 8);
    bw.write_bits(720, 12);
    bw.write_bits(576, 12);
    bw.write_bits(2, 4); // 4:3
    bw.write_bits(3, 4); // 25 fps
    bw.write_bits(15000, 18);
    bw.write_flag(true);
    bw.write_bits(112, 10);
    bw.write_flag(false);
    bw.write_flag(false);
    bw.write_flag(false);
    bw.finish()
}

/// Main@Main 4:2:0, low_delay=0, 帧率扩展为 0 (末字节为 0)
pub fn mpeg2_sequence_extension() -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_bits(0xB5, 8);
    bw.write_bits(1, 4);
    bw.write_bits(0x48, 8);
    bw.write_flag(false); // progressive_sequence
    bw.write_bits(1, 2);
    bw.write_bits(0, 2);
    bw.write_bits(0, 2);
    bw.write_bits(0, 12);
    bw.write_flag(true);
    bw.write_bits(0, 8);
    bw.write_flag(false);
    bw.write_bits(0, 2);
    bw.write_bits(0, 5);
    bw.finish()
}

pub fn mpeg2_gop(closed_gop: bool) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_bits(0xB8, 8);
    bw.write_flag(false); // drop_frame_flag
    bw.write_bits(10, 5);
    bw.write_bits(0, 6);
    bw.write_flag(true);
    bw.write_bits(0, 6);
    bw.write_bits(0, 6);
    bw.write_flag(closed_gop);
    bw.write_flag(false);
    bw.finish()
}

/// picture_header, coding_type: 1=I 2=P 3=B
pub fn mpeg2_picture(temporal_reference: u32, coding_type: u32) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_bits(0x00, 8);
    bw.write_bits(temporal_reference, 10);
    bw.write_bits(coding_type, 3);
    bw.write_bits(0xFFFF, 16);
    if coding_type >= 2 {
        bw.write_flag(false);
        bw.write_bits(7, 3);
    }
    if coding_type == 3 {
        bw.write_flag(false);
        bw.write_bits(7, 3);
    }
    bw.write_flag(false);
    bw.finish()
}

/// picture_coding_extension, 帧图像, f_code 全为 15
pub fn mpeg2_picture_coding_extension() -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_bits(0xB5, 8);
    bw.write_bits(8, 4);
    for _ in 0..4 {
        bw.write_bits(15, 4);
    }
    bw.write_bits(0, 2); // intra_dc_precision
    bw.write_bits(3, 2); // picture_structure: Frame
    bw.write_bits(0b1_0000_0101, 9);
    bw.write_flag(false); // composite_display_flag
    bw.finish()
}
