//! 测试码流构造工具.

use nalscope_core::BitWriter;

use super::super::{AvcParser, AvcParserConfig};

/// SPS 构造参数
#[derive(Debug, Clone)]
pub struct SpsDesc {
    pub profile_idc: u32,
    pub sps_id: u32,
    pub chroma_format_idc: u32,
    pub log2_max_frame_num_minus4: u32,
    pub poc_type: u32,
    pub log2_max_poc_lsb_minus4: u32,
    /// (delta_pic_order_always_zero_flag, offset_for_non_ref_pic, offset_for_top_to_bottom_field, offset_for_ref_frame)
    pub poc_type1: (bool, i32, i32, Vec<i32>),
    pub max_num_ref_frames: u32,
    pub width_mbs_minus1: u32,
    pub height_map_units_minus1: u32,
    pub frame_mbs_only: bool,
    pub mbaff: bool,
    pub direct_8x8: bool,
    /// [left, right, top, bottom]
    pub crop: Option<[u32; 4]>,
    /// (num_units_in_tick, time_scale)
    pub timing: Option<(u32, u32)>,
    /// VUI 中写出 NAL HRD, 见 `write_hrd`
    pub nal_hrd: bool,
    pub pic_struct_present: bool,
}

impl Default for SpsDesc {
    fn default() -> Self {
        Self {
            profile_idc: 66,
            sps_id: 0,
            chroma_format_idc: 1,
            log2_max_frame_num_minus4: 0,
            poc_type: 0,
            log2_max_poc_lsb_minus4: 4,
            poc_type1: (false, 0, 0, Vec::new()),
            max_num_ref_frames: 4,
            width_mbs_minus1: 19,
            height_map_units_minus1: 14,
            frame_mbs_only: true,
            mbaff: false,
            direct_8x8: true,
            crop: None,
            timing: None,
            nal_hrd: false,
            pic_struct_present: false,
        }
    }
}

/// 写出 seq_parameter_set_data(), 不含 trailing bits
pub fn write_sps_data(bw: &mut BitWriter, desc: &SpsDesc) {
    bw.write_bits(desc.profile_idc, 8);
    bw.write_bits(0, 6); // constraint_set0..5
    bw.write_bits(0, 2);
    bw.write_bits(30, 8); // level_idc
    bw.write_ue(desc.sps_id);
    if matches!(
        desc.profile_idc,
        100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135
    ) {
        bw.write_ue(desc.chroma_format_idc);
        if desc.chroma_format_idc == 3 {
            bw.write_flag(false);
        }
        bw.write_ue(0);
        bw.write_ue(0);
        bw.write_flag(false);
        bw.write_flag(false);
    }
    bw.write_ue(desc.log2_max_frame_num_minus4);
    bw.write_ue(desc.poc_type);
    match desc.poc_type {
        0 => bw.write_ue(desc.log2_max_poc_lsb_minus4),
        1 => {
            let (always_zero, non_ref, top_to_bottom, cycle) = &desc.poc_type1;
            bw.write_flag(*always_zero);
            bw.write_se(*non_ref);
            bw.write_se(*top_to_bottom);
            bw.write_ue(cycle.len() as u32);
            for &v in cycle {
                bw.write_se(v);
            }
        }
        _ => {}
    }
    bw.write_ue(desc.max_num_ref_frames);
    bw.write_flag(false);
    bw.write_ue(desc.width_mbs_minus1);
    bw.write_ue(desc.height_map_units_minus1);
    bw.write_flag(desc.frame_mbs_only);
    if !desc.frame_mbs_only {
        bw.write_flag(desc.mbaff);
    }
    bw.write_flag(desc.direct_8x8);
    match desc.crop {
        Some(c) => {
            bw.write_flag(true);
            for v in c {
                bw.write_ue(v);
            }
        }
        None => bw.write_flag(false),
    }
    if desc.timing.is_none() && !desc.nal_hrd && !desc.pic_struct_present {
        bw.write_flag(false);
        return;
    }
    bw.write_flag(true); // vui_parameters_present_flag
    bw.write_flag(false); // aspect_ratio_info_present_flag
    bw.write_flag(false); // overscan_info_present_flag
    bw.write_flag(false); // video_signal_type_present_flag
    bw.write_flag(false); // chroma_loc_info_present_flag
    match desc.timing {
        Some((num_units_in_tick, time_scale)) => {
            bw.write_flag(true);
            bw.write_bits(num_units_in_tick, 32);
            bw.write_bits(time_scale, 32);
            bw.write_flag(true);
        }
        None => bw.write_flag(false),
    }
    bw.write_flag(desc.nal_hrd);
    if desc.nal_hrd {
        write_hrd(bw);
    }
    bw.write_flag(false); // vcl_hrd
    if desc.nal_hrd {
        bw.write_flag(false); // low_delay_hrd_flag
    }
    bw.write_flag(desc.pic_struct_present);
    bw.write_flag(false); // bitstream_restriction_flag
}

/// 单调度 hrd_parameters(): 初始延迟 24 位, CPB / DPB 延迟 8 位, time_offset 8 位
fn write_hrd(bw: &mut BitWriter) {
    bw.write_ue(0); // cpb_cnt_minus1
    bw.write_bits(0, 4);
    bw.write_bits(0, 4);
    bw.write_ue(999);
    bw.write_ue(999);
    bw.write_flag(false);
    bw.write_bits(23, 5);
    bw.write_bits(7, 5);
    bw.write_bits(7, 5);
    bw.write_bits(8, 5);
}

pub fn build_sps_rbsp(desc: &SpsDesc) -> Vec<u8> {
    let mut bw = BitWriter::new();
    write_sps_data(&mut bw, desc);
    bw.write_trailing_bits();
    bw.finish()
}

/// PPS 构造参数 (单条带组)
#[derive(Debug, Clone)]
pub struct PpsDesc {
    pub pps_id: u32,
    pub sps_id: u32,
    pub entropy_coding_mode: bool,
    pub bottom_field_pic_order: bool,
    pub weighted_pred: bool,
    pub weighted_bipred_idc: u32,
    pub pic_init_qp_minus26: i32,
    pub deblocking_control: bool,
    pub redundant_pic_cnt_present: bool,
}

impl Default for PpsDesc {
    fn default() -> Self {
        Self {
            pps_id: 0,
            sps_id: 0,
            entropy_coding_mode: false,
            bottom_field_pic_order: false,
            weighted_pred: false,
            weighted_bipred_idc: 0,
            pic_init_qp_minus26: 0,
            deblocking_control: true,
            redundant_pic_cnt_present: false,
        }
    }
}

/// 写出 PPS 中 num_slice_groups_minus1 之前的字段
pub fn write_pps_head(bw: &mut BitWriter, desc: &PpsDesc) {
    bw.write_ue(desc.pps_id);
    bw.write_ue(desc.sps_id);
    bw.write_flag(desc.entropy_coding_mode);
    bw.write_flag(desc.bottom_field_pic_order);
}

/// 写出 num_slice_groups_minus1 之后的字段与 trailing bits
pub fn write_pps_tail(bw: &mut BitWriter, desc: &PpsDesc) {
    bw.write_ue(0); // num_ref_idx_l0_default_active_minus1
    bw.write_ue(0); // num_ref_idx_l1_default_active_minus1
    bw.write_flag(desc.weighted_pred);
    bw.write_bits(desc.weighted_bipred_idc, 2);
    bw.write_se(desc.pic_init_qp_minus26);
    bw.write_se(0); // pic_init_qs_minus26
    bw.write_se(0); // chroma_qp_index_offset
    bw.write_flag(desc.deblocking_control);
    bw.write_flag(false); // constrained_intra_pred_flag
    bw.write_flag(desc.redundant_pic_cnt_present);
    bw.write_trailing_bits();
}

pub fn build_pps_rbsp(desc: &PpsDesc) -> Vec<u8> {
    let mut bw = BitWriter::new();
    write_pps_head(&mut bw, desc);
    bw.write_ue(0);
    write_pps_tail(&mut bw, desc);
    bw.finish()
}

/// 条带头构造参数 (CAVLC, 无加权预测)
#[derive(Debug, Clone)]
pub struct SliceDesc {
    pub first_mb: u32,
    /// 0..=9
    pub slice_type: u32,
    pub pps_id: u32,
    pub frame_num: u32,
    pub frame_num_bits: u32,
    /// SPS frame_mbs_only_flag=0 时写 field_pic_flag
    pub field_flags_present: bool,
    /// Some(bottom_field_flag) 表示场图像
    pub field: Option<bool>,
    pub idr_pic_id: Option<u32>,
    /// (pic_order_cnt_lsb, 位宽)
    pub poc_lsb: Option<(u32, u32)>,
    pub delta_poc_bottom: Option<i32>,
    pub delta_poc: Vec<i32>,
    pub nal_ref_idc: u32,
    /// 自适应标记操作: (mmco, 参数)
    pub mmco: Option<Vec<(u32, Vec<u32>)>>,
    pub slice_qp_delta: i32,
    pub deblocking_control: bool,
}

impl Default for SliceDesc {
    fn default() -> Self {
        Self {
            first_mb: 0,
            slice_type: 7,
            pps_id: 0,
            frame_num: 0,
            frame_num_bits: 4,
            field_flags_present: false,
            field: None,
            idr_pic_id: Some(0),
            poc_lsb: Some((0, 8)),
            delta_poc_bottom: None,
            delta_poc: Vec::new(),
            nal_ref_idc: 3,
            mmco: None,
            slice_qp_delta: 0,
            deblocking_control: true,
        }
    }
}

impl SliceDesc {
    /// 非 IDR 的 P 参考条带
    pub fn p_slice(frame_num: u32, poc_lsb: u32) -> Self {
        Self {
            slice_type: 5,
            frame_num,
            idr_pic_id: None,
            poc_lsb: Some((poc_lsb, 8)),
            ..Default::default()
        }
    }
}

pub fn write_slice_header(bw: &mut BitWriter, desc: &SliceDesc) {
    bw.write_ue(desc.first_mb);
    bw.write_ue(desc.slice_type);
    bw.write_ue(desc.pps_id);
    bw.write_bits(desc.frame_num, desc.frame_num_bits);
    if desc.field_flags_present {
        bw.write_flag(desc.field.is_some());
        if let Some(bottom) = desc.field {
            bw.write_flag(bottom);
        }
    }
    if let Some(id) = desc.idr_pic_id {
        bw.write_ue(id);
    }
    if let Some((lsb, bits)) = desc.poc_lsb {
        bw.write_bits(lsb, bits);
    }
    if let Some(d) = desc.delta_poc_bottom {
        bw.write_se(d);
    }
    for &d in &desc.delta_poc {
        bw.write_se(d);
    }
    let kind = desc.slice_type % 5;
    if kind == 1 {
        bw.write_flag(true); // direct_spatial_mv_pred_flag
    }
    if matches!(kind, 0 | 1 | 3) {
        bw.write_flag(false); // num_ref_idx_active_override_flag
    }
    if kind != 2 && kind != 4 {
        bw.write_flag(false); // ref_pic_list_modification_flag_l0
    }
    if kind == 1 {
        bw.write_flag(false); // ref_pic_list_modification_flag_l1
    }
    if desc.nal_ref_idc != 0 {
        if desc.idr_pic_id.is_some() {
            bw.write_flag(false);
            bw.write_flag(false);
        } else {
            match &desc.mmco {
                Some(ops) => {
                    bw.write_flag(true);
                    for (op, args) in ops {
                        bw.write_ue(*op);
                        for &a in args {
                            bw.write_ue(a);
                        }
                    }
                    bw.write_ue(0);
                }
                None => bw.write_flag(false),
            }
        }
    }
    bw.write_se(desc.slice_qp_delta);
    if desc.deblocking_control {
        bw.write_ue(1); // disable_deblocking_filter_idc
    }
}

pub fn build_slice_rbsp(desc: &SliceDesc) -> Vec<u8> {
    let mut bw = BitWriter::new();
    write_slice_header(&mut bw, desc);
    bw.write_trailing_bits();
    bw.finish()
}

/// 组装 NAL 单元: 头部字节 + 插入防竞争字节后的 RBSP
pub fn nal(nal_ref_idc: u32, nal_unit_type: u32, rbsp: &[u8]) -> Vec<u8> {
    let mut out = vec![((nal_ref_idc & 3) << 5 | (nal_unit_type & 0x1F)) as u8];
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

/// 已装入 SPS 0 / PPS 0 的解析器
pub fn parser_with(sps: &SpsDesc, pps: &PpsDesc) -> AvcParser {
    let mut parser = AvcParser::new(AvcParserConfig::default());
    parser
        .parse_nal(&nal(3, 7, &build_sps_rbsp(sps)))
        .expect("测试 SPS 应可解析");
    parser
        .parse_nal(&nal(3, 8, &build_pps_rbsp(pps)))
        .expect("测试 PPS 应可解析");
    parser
}
