use nalscope_core::{BitWriter, ParseError};

use super::super::{VvcParser, VvcParserConfig, VvcPayload};
use super::helpers::*;

/// 三层依次依赖 (2 -> 1 -> 0), 一个显式指定第 2 层输出的 OLS
fn build_layered_vps(output_flags: [bool; 3]) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_bits(1, 4); // vps_video_parameter_set_id
    bw.write_bits(2, 6); // vps_max_layers_minus1
    bw.write_bits(0, 3); // vps_max_sublayers_minus1
    bw.write_flag(false); // vps_all_independent_layers_flag

    bw.write_bits(0, 6); // vps_layer_id[0]
    bw.write_bits(1, 6); // vps_layer_id[1]
    bw.write_flag(false); // vps_independent_layer_flag[1]
    bw.write_flag(false); // vps_max_tid_ref_present_flag[1]
    bw.write_flag(true); // vps_direct_ref_layer_flag[1][0]
    bw.write_bits(2, 6); // vps_layer_id[2]
    bw.write_flag(false);
    bw.write_flag(false);
    bw.write_flag(false); // vps_direct_ref_layer_flag[2][0]
    bw.write_flag(true); // vps_direct_ref_layer_flag[2][1]

    bw.write_bits(2, 2); // vps_ols_mode_idc
    bw.write_bits(0, 8); // vps_num_output_layer_sets_minus2
    for flag in output_flags {
        bw.write_flag(flag);
    }
    bw.write_bits(0, 8); // vps_num_ptls_minus1
    bw.align_to_byte();
    write_main10_ptl(&mut bw, 83);

    bw.write_ue(0); // vps_num_dpb_params_minus1
    bw.write_ue(4);
    bw.write_ue(2);
    bw.write_ue(0);
    bw.write_ue(1920); // vps_ols_dpb_pic_width[0]
    bw.write_ue(1080);
    bw.write_bits(1, 2); // vps_ols_dpb_chroma_format[0]
    bw.write_ue(2); // vps_ols_dpb_bitdepth_minus8[0]
    bw.write_flag(false); // vps_timing_hrd_params_present_flag
    bw.write_flag(false); // vps_extension_flag
    bw.write_trailing_bits();
    bw.finish()
}

#[test]
fn test_vvc_vps_output_layer_set_follows_dependencies() {
    let mut parser = VvcParser::new(VvcParserConfig::default());
    let unit = parser
        .parse_nal(&nal(VPS_NUT, 0, &build_layered_vps([false, false, true])))
        .expect("VPS 应可解析");
    let VvcPayload::Vps(vps) = unit.payload else {
        panic!("应解析为 VPS");
    };
    assert_eq!(vps.vps_video_parameter_set_id, 1);
    assert_eq!(vps.layers.len(), 3);
    assert_eq!(vps.reference_layer_idx(2), vec![0, 1], "间接依赖也计入");
    assert_eq!(vps.output_layer_sets.len(), 2);
    assert_eq!(vps.output_layer_sets[1].layer_ids, vec![0, 1, 2]);
    assert_eq!(vps.output_layer_sets[1].output_layer_ids, vec![2]);
    assert_eq!(vps.num_multi_layer_olss(), 1);
    assert_eq!(vps.multi_layer_ols_idx, vec![None, Some(0)]);
    assert_eq!(vps.ols_dpb.len(), 1);
    assert_eq!(vps.ols_dpb[0].vps_ols_dpb_pic_width, 1920);
    assert_eq!(vps.ols_dpb[0].vps_ols_dpb_bitdepth_minus8, 2);
    assert_eq!(vps.profile_tier_levels.len(), 1);
    assert!(parser.parameter_sets().vps.contains(1), "VPS 应按 id 入库");
}

#[test]
fn test_vvc_vps_ols_without_output_layer() {
    let mut parser = VvcParser::new(VvcParserConfig::default());
    let err = parser
        .parse_nal(&nal(VPS_NUT, 0, &build_layered_vps([false, false, false])))
        .expect_err("OLS 没有输出层时应失败");
    assert!(matches!(err, ParseError::StructuralConstraintViolation(_)), "actual={err:?}");
    assert!(parser.parameter_sets().vps.is_empty());
}
