//! AVC 基本流端到端测试: 分帧 → 分发 → 逐单元解析 → 流概要.

mod common;

use common::*;
use nalscope::core::{FieldValue, ParseError, Rational};
use nalscope::syntax::{Codec, create_parser, split_units};

/// 从描述中取出 `poc=` 的值
fn poc_of(description: &str) -> i64 {
    description
        .split_whitespace()
        .find_map(|t| t.strip_prefix("poc="))
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| panic!("描述中没有 poc: {description}"))
}

fn typical_stream() -> bytes::Bytes {
    annex_b(&[
        avc_sps(20, 15),
        avc_pps(),
        avc_idr_slice(0, 0),
        avc_p_slice(2, 1, 4),
        avc_p_slice(0, 2, 2),
        avc_idr_slice(1, 0),
        avc_p_slice(2, 1, 2),
    ])
}

#[test]
fn test_avc_pipeline_reports_and_summary() {
    init_test_logging();
    let data = typical_stream();
    let units = split_units(&data, Codec::Avc);
    assert_eq!(units.len(), 7, "应切分出 7 个 NAL 单元");

    let mut parser = create_parser(Codec::Avc, false);
    let reports: Vec<_> = units
        .iter()
        .map(|u| parser.parse_unit(&u.data).expect("合法码流的单元应全部可解析"))
        .collect();

    let codes: Vec<u32> = reports.iter().map(|r| r.type_code).collect();
    assert_eq!(codes, vec![7, 8, 5, 1, 1, 5, 1]);
    assert_eq!(reports[0].type_name, "Sps");
    assert_eq!(reports[2].type_name, "CodedSliceIdr");
    assert!(reports[0].description.contains("320x240"), "SPS 描述: {}", reports[0].description);
    assert!(reports[1].description.ends_with("CAVLC"), "PPS 描述: {}", reports[1].description);
    assert!(reports[2].description.starts_with("I frame_num=0"));
    assert!(reports[3].description.starts_with("P frame_num=1"));

    let summary = parser.summary().expect("见到 SPS 后应有流概要");
    assert_eq!(summary.codec, Codec::Avc);
    assert_eq!((summary.width, summary.height), (320, 240));
    assert_eq!(summary.frame_rate, Some(Rational::new(25, 1)), "time_scale / (2 * num_units_in_tick)");
    assert_eq!(summary.chroma_format, "4:2:0");
    assert_eq!(summary.bit_depth, 8);
    assert_eq!(summary.profile, "Main Profile");
}

#[test]
fn test_avc_pipeline_global_poc_across_idr() {
    init_test_logging();
    let data = typical_stream();
    let mut parser = create_parser(Codec::Avc, false);
    let pocs: Vec<i64> = split_units(&data, Codec::Avc)
        .iter()
        .filter_map(|u| {
            let report = parser.parse_unit(&u.data).expect("单元应可解析");
            matches!(report.type_code, 1 | 5).then(|| poc_of(&report.description))
        })
        .collect();
    assert_eq!(pocs, vec![0, 4, 2, 6, 8], "第二个 IDR 应接在已见最大 POC 之后");
}

#[test]
fn test_avc_pipeline_slice_before_parameter_sets() {
    init_test_logging();
    let data = annex_b(&[avc_idr_slice(0, 0), avc_sps(20, 15), avc_pps(), avc_idr_slice(0, 0)]);
    let mut parser = create_parser(Codec::Avc, false);
    let results: Vec<_> = split_units(&data, Codec::Avc)
        .iter()
        .map(|u| parser.parse_unit(&u.data))
        .collect();

    let err = results[0].as_ref().expect_err("缺少 PPS 时条带应失败");
    assert!(
        matches!(err, ParseError::UnresolvedReference { kind: "PPS", id: 0 }),
        "actual={err:?}"
    );
    assert!(results[1..].iter().all(Result::is_ok), "后续单元不受前面失败影响");
}

#[test]
fn test_avc_pipeline_annotations() {
    init_test_logging();
    let data = annex_b(&[avc_sps(120, 68)]);
    let units = split_units(&data, Codec::Avc);

    let mut parser = create_parser(Codec::Avc, true);
    let report = parser.parse_unit(&units[0].data).expect("SPS 应可解析");
    let field = report
        .annotations
        .find("pic_width_in_mbs_minus1")
        .expect("应记录 pic_width_in_mbs_minus1");
    assert_eq!(field.value, Some(FieldValue::Unsigned(119)));
    assert!(report.annotations.find("FrameRate").is_some(), "应记录推导出的帧率");

    let mut quiet = create_parser(Codec::Avc, false);
    let report = quiet.parse_unit(&units[0].data).expect("SPS 应可解析");
    assert!(report.annotations.find("pic_width_in_mbs_minus1").is_none());
    assert_eq!(quiet.summary().map(|s| (s.width, s.height)), Some((1920, 1088)));
}
