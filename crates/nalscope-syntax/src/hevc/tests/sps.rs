use nalscope_core::{ParseError, Rational, SyntaxReader};

use super::super::{ConformanceWindow, ScalingListData, Sps};
use super::helpers::*;

fn parse_sps(desc: &SpsDesc) -> Result<Sps, ParseError> {
    let rbsp = build_sps_rbsp(desc);
    let mut r = SyntaxReader::new(&rbsp);
    Sps::parse(&mut r, 0)
}

#[test]
fn test_sps_derived_block_sizes() {
    let sps = parse_sps(&SpsDesc::default()).expect("基础 SPS 应可解析");
    let d = &sps.derived;
    assert_eq!(d.min_cb_size_y, 8);
    assert_eq!(d.ctb_log2_size_y, 6);
    assert_eq!(d.ctb_size_y, 64);
    assert_eq!(d.pic_width_in_ctbs_y, 30);
    assert_eq!(d.pic_height_in_ctbs_y, 17, "1080 / 64 向上取整");
    assert_eq!(d.pic_size_in_ctbs_y, 510);
    assert_eq!(d.pic_width_in_min_cbs_y, 240);
    assert_eq!(d.min_tb_log2_size_y, 2);
    assert_eq!(d.max_tb_log2_size_y, 5);
    assert_eq!((d.sub_width_c, d.sub_height_c), (2, 2));
    assert_eq!(d.bit_depth_luma, 8);
    assert_eq!(d.max_pic_order_cnt_lsb, 256);
    assert_eq!(sps.display_size(), (1920, 1080));
    assert_eq!(sps.profile_tier_level.profile_name(), "Main");
    assert_eq!(sps.profile_tier_level.level_name(), "Level 4");
    assert!(sps.scaling_list.is_none());
    assert!(sps.frame_rate().is_none());
}

#[test]
fn test_sps_conformance_window_crop() {
    let desc = SpsDesc {
        height: 1088,
        conf_win: Some([0, 0, 0, 4]),
        ..Default::default()
    };
    let sps = parse_sps(&desc).expect("带一致性窗口的 SPS 应可解析");
    assert_eq!(
        sps.conformance_window,
        Some(ConformanceWindow {
            bottom_offset: 4,
            ..Default::default()
        })
    );
    assert_eq!(sps.display_size(), (1920, 1080), "4:2:0 下偏移以 2 行为单位");
    assert_eq!(sps.derived.pic_height_in_ctbs_y, 17);
}

#[test]
fn test_sps_reject_empty_conformance_window() {
    let desc = SpsDesc {
        width: 64,
        height: 64,
        conf_win: Some([16, 16, 0, 0]),
        ..Default::default()
    };
    let err = parse_sps(&desc).expect_err("裁剪后宽度为 0 应失败");
    assert!(matches!(err, ParseError::ConstraintViolation(_)), "actual={err:?}");
}

#[test]
fn test_sps_reject_width_not_multiple_of_min_cb() {
    let desc = SpsDesc {
        width: 1916,
        ..Default::default()
    };
    let err = parse_sps(&desc).expect_err("宽度不是 MinCbSizeY 的倍数应失败");
    assert!(format!("{err}").contains("pic_width_in_luma_samples"));
}

#[test]
fn test_sps_reject_ctb_size_out_of_range() {
    let desc = SpsDesc {
        log2_min_cb_minus3: 0,
        log2_diff_max_min_cb: 0,
        ..Default::default()
    };
    let err = parse_sps(&desc).expect_err("CtbLog2SizeY=3 应失败");
    assert!(format!("{err}").contains("CtbLog2SizeY"));
}

#[test]
fn test_sps_reject_seven_sub_layers_for_base_layer() {
    let desc = SpsDesc {
        max_sub_layers_minus1: 7,
        ..Default::default()
    };
    let err = parse_sps(&desc).expect_err("sps_max_sub_layers_minus1=7 应失败");
    assert!(format!("{err}").contains("sps_max_sub_layers_minus1"));
}

#[test]
fn test_sps_multilayer_ext_sps_unsupported() {
    let desc = SpsDesc {
        max_sub_layers_minus1: 7,
        ..Default::default()
    };
    let rbsp = build_sps_rbsp(&desc);
    let mut r = SyntaxReader::new(&rbsp);
    let err = Sps::parse(&mut r, 1).expect_err("MultiLayerExtSpsFlag=1 应报告未支持");
    assert!(matches!(err, ParseError::Unsupported(_)), "actual={err:?}");
}

#[test]
fn test_sps_default_scaling_list_when_enabled_without_data() {
    let desc = SpsDesc {
        scaling_list_enabled: true,
        ..Default::default()
    };
    let sps = parse_sps(&desc).expect("启用量化矩阵的 SPS 应可解析");
    assert!(!sps.sps_scaling_list_data_present_flag);
    assert_eq!(sps.scaling_list, Some(ScalingListData::default()));
}

#[test]
fn test_sps_pcm_bit_depth_limit() {
    let ok = parse_sps(&SpsDesc {
        pcm: Some((7, 7)),
        ..Default::default()
    })
    .expect("PCM 位深等于 BitDepth 应可解析");
    let pcm = ok.pcm.expect("应包含 PCM 参数");
    assert_eq!(pcm.pcm_sample_bit_depth_luma_minus1, 7);
    assert!(pcm.pcm_loop_filter_disabled_flag);

    let err = parse_sps(&SpsDesc {
        pcm: Some((8, 7)),
        ..Default::default()
    })
    .expect_err("PCM 位深大于 BitDepthY 应失败");
    assert!(format!("{err}").contains("pcm_sample_bit_depth_luma_minus1"));
}

#[test]
fn test_sps_short_and_long_term_refs() {
    let desc = SpsDesc {
        st_rps: vec![(vec![-1], vec![]), (vec![-1, -3], vec![2])],
        long_term_lsbs: Some(vec![5, 200]),
        ..Default::default()
    };
    let sps = parse_sps(&desc).expect("带 RPS 的 SPS 应可解析");
    assert_eq!(sps.short_term_ref_pic_sets.len(), 2);
    assert_eq!(sps.short_term_ref_pic_sets[1].delta_poc_s0, vec![-1, -3]);
    assert_eq!(sps.short_term_ref_pic_sets[1].delta_poc_s1, vec![2]);
    assert_eq!(sps.short_term_ref_pic_sets[1].num_delta_pocs(), 3);
    assert_eq!(sps.long_term_ref_pics.len(), 2);
    assert_eq!(sps.long_term_ref_pics[1].lt_ref_pic_poc_lsb_sps, 200);
}

#[test]
fn test_sps_reject_rps_exceeding_dpb() {
    let desc = SpsDesc {
        st_rps: vec![(vec![-1, -2, -3, -4, -5], vec![])],
        ..Default::default()
    };
    let err = parse_sps(&desc).expect_err("RPS 大于 DPB 容量应失败");
    assert!(format!("{err}").contains("num_negative_pics"));
}

#[test]
fn test_sps_vui_frame_rate_and_range_extension() {
    let desc = SpsDesc {
        timing: Some((1, 50)),
        range_extension: true,
        ..Default::default()
    };
    let sps = parse_sps(&desc).expect("带 VUI 与 range 扩展的 SPS 应可解析");
    assert_eq!(sps.frame_rate(), Some(Rational::new(50, 1)));
    assert!(sps.extension_flags.sps_range_extension_flag);
    let ext = sps.range_extension.expect("应包含 sps_range_extension");
    assert!(ext.transform_skip_rotation_enabled_flag);
    assert!(!ext.transform_skip_context_enabled_flag);
    assert!(ext.implicit_rdpcm_enabled_flag);
    assert!(!ext.cabac_bypass_alignment_enabled_flag);
}

#[test]
fn test_sps_annotations_include_derived_values() {
    let rbsp = build_sps_rbsp(&SpsDesc::default());
    let mut r = SyntaxReader::new(&rbsp);
    Sps::parse(&mut r, 0).expect("基础 SPS 应可解析");
    let log = r.into_log();
    assert!(log.find("pic_width_in_luma_samples").is_some());
    assert!(log.find("CtbSizeY").is_some(), "推导值应记入注释日志");
    assert!(log.find("sps_max_dec_pic_buffering_minus1[0]").is_some());
}
