use nalscope_core::{BitWriter, ParseError, Rational, SyntaxReader};

use super::super::Vps;
use super::helpers::*;

fn parse_vps(rbsp: &[u8]) -> Result<Vps, ParseError> {
    let mut r = SyntaxReader::new(rbsp);
    Vps::parse(&mut r)
}

#[test]
fn test_vps_single_layer() {
    let vps = parse_vps(&build_vps_rbsp(&VpsDesc::default())).expect("基础 VPS 应可解析");
    assert_eq!(vps.vps_video_parameter_set_id, 0);
    assert_eq!(vps.vps_max_layers_minus1, 0);
    assert_eq!(vps.layer_sets.len(), 1);
    assert_eq!(vps.layer_sets[0].as_slice(), &[0]);
    assert_eq!(vps.sub_layer_ordering.len(), 1);
    assert_eq!(vps.sub_layer_ordering[0].max_dec_pic_buffering_minus1, 4);
    assert_eq!(vps.sub_layer_ordering[0].max_num_reorder_pics, 2);
    assert_eq!(vps.profile_tier_level.general_level_idc, 93);
    assert!(vps.extension.is_none());
    assert!(vps.frame_rate().is_none());
}

#[test]
fn test_vps_layer_id_included_flags() {
    let desc = VpsDesc {
        max_layers_minus1: 2,
        max_layer_id: 3,
        layer_sets: vec![vec![0, 1], vec![0, 1, 3]],
        ..Default::default()
    };
    let vps = parse_vps(&build_vps_rbsp(&desc)).expect("多层集合 VPS 应可解析");
    assert_eq!(vps.vps_num_layer_sets_minus1, 2);
    assert_eq!(vps.layer_sets[1].as_slice(), &[0, 1]);
    assert_eq!(vps.layer_sets[2].as_slice(), &[0, 1, 3]);
    assert_eq!(vps.layer_sets[2].max(), Some(3));
}

#[test]
fn test_vps_timing_frame_rate() {
    let desc = VpsDesc {
        timing: Some((1001, 30000)),
        ..Default::default()
    };
    let vps = parse_vps(&build_vps_rbsp(&desc)).expect("带 timing 的 VPS 应可解析");
    assert_eq!(vps.frame_rate(), Some(Rational::new(30000, 1001)));
    let timing = vps.timing.as_ref().expect("应包含 timing");
    assert!(timing.hrd.is_empty());
    assert!(timing.num_ticks_poc_diff_one_minus1.is_none());
}

#[test]
fn test_vps_reject_reserved_bits() {
    let desc = VpsDesc {
        reserved_0xffff: 0xFFFE,
        ..Default::default()
    };
    let err = parse_vps(&build_vps_rbsp(&desc)).expect_err("vps_reserved_0xffff_16bits 错误应失败");
    assert!(matches!(err, ParseError::ConstraintViolation(_)), "actual={err:?}");
    assert!(format!("{err}").contains("vps_reserved_0xffff_16bits"));
}

#[test]
fn test_vps_reject_missing_temporal_nesting() {
    let mut bw = BitWriter::new();
    bw.write_bits(0, 4);
    bw.write_flag(true);
    bw.write_flag(true);
    bw.write_bits(0, 6);
    bw.write_bits(0, 3);
    bw.write_flag(false); // 单子层时必须为 1
    let data = bw.finish();

    let err = parse_vps(&data).expect_err("vps_temporal_id_nesting_flag=0 应失败");
    assert!(format!("{err}").contains("vps_temporal_id_nesting_flag"));
}

#[test]
fn test_vps_hrd_layer_set_index_range() {
    let mut bw = BitWriter::new();
    write_vps_prefix_with_timing(&mut bw);
    bw.write_ue(1); // vps_num_hrd_parameters
    bw.write_ue(1); // hrd_layer_set_idx[0] 超出 vps_num_layer_sets_minus1=0
    let data = bw.finish();

    let err = parse_vps(&data).expect_err("hrd_layer_set_idx 越界应失败");
    assert!(format!("{err}").contains("hrd_layer_set_idx[0]"));
}

/// 单层 VPS, 写到 vps_poc_proportional_to_timing_flag 为止
fn write_vps_prefix_with_timing(bw: &mut BitWriter) {
    bw.write_bits(0, 4);
    bw.write_flag(true);
    bw.write_flag(true);
    bw.write_bits(0, 6);
    bw.write_bits(0, 3);
    bw.write_flag(true);
    bw.write_bits(0xFFFF, 16);
    write_main_ptl(bw, 93);
    bw.write_flag(true);
    bw.write_ue(4);
    bw.write_ue(2);
    bw.write_ue(0);
    bw.write_bits(0, 6);
    bw.write_ue(0);
    bw.write_flag(true); // vps_timing_info_present_flag
    bw.write_bits(1, 32);
    bw.write_bits(25, 32);
    bw.write_flag(false);
}
