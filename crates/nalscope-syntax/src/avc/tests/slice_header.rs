use nalscope_core::{BitWriter, FieldValue, ParseError};

use super::super::slice::{DecRefPicMarking, MmcoOp};
use super::super::tables::SliceType;
use super::super::{AvcParser, AvcParserConfig, AvcPayload, PocDiagnostic, SliceHeader};
use super::helpers::*;

fn parse_slice(parser: &mut AvcParser, nal_type: u32, desc: &SliceDesc) -> SliceHeader {
    let unit = parser
        .parse_nal(&nal(desc.nal_ref_idc, nal_type, &build_slice_rbsp(desc)))
        .expect("测试条带应可解析");
    match unit.payload {
        AvcPayload::Slice(h) => *h,
        other => panic!("应解析为条带: {other:?}"),
    }
}

#[test]
fn test_idr_slice_header_fields() {
    let mut parser = parser_with(&SpsDesc::default(), &PpsDesc::default());
    let desc = SliceDesc {
        idr_pic_id: Some(7),
        slice_qp_delta: -2,
        ..Default::default()
    };
    let h = parse_slice(&mut parser, 5, &desc);
    assert!(h.idr);
    assert_eq!(h.slice_type, SliceType::I);
    assert_eq!(h.slice_type_code, 7);
    assert_eq!(h.idr_pic_id, Some(7));
    assert_eq!(h.slice_qp, 24);
    assert_eq!(
        h.dec_ref_pic_marking,
        Some(DecRefPicMarking::Idr {
            no_output_of_prior_pics_flag: false,
            long_term_reference_flag: false,
        })
    );
    assert_eq!(h.deblocking.map(|d| d.disable_deblocking_filter_idc), Some(1));
    assert_eq!(h.context.pic_size_in_mbs, 300);
    assert!(!h.context.mbaff_frame_flag);
    assert_eq!(h.context.max_pic_num, 16);
    assert_eq!(h.poc.pic_order_cnt_msb, 0);
    assert_eq!(h.poc.top_field_order_cnt, 0);
    assert!(h.poc_diagnostic.is_none());
}

#[test]
fn test_poc_msb_wraps_forward() {
    let mut parser = parser_with(&SpsDesc::default(), &PpsDesc::default());
    let idr = parse_slice(&mut parser, 5, &SliceDesc::default());
    assert_eq!(idr.poc.top_field_order_cnt, 0);

    // 每步 lsb 差值不超过 MaxPicOrderCntLsb / 2, Msb 保持为 0
    let p1 = parse_slice(&mut parser, 1, &SliceDesc::p_slice(1, 128));
    assert_eq!(p1.poc.pic_order_cnt_msb, 0);
    let p2 = parse_slice(&mut parser, 1, &SliceDesc::p_slice(2, 250));
    assert_eq!(p2.poc.pic_order_cnt_msb, 0);
    assert_eq!(p2.poc.top_field_order_cnt, 250);

    let p3 = parse_slice(&mut parser, 1, &SliceDesc::p_slice(3, 2));
    assert_eq!(p3.poc.prev_pic_order_cnt_lsb, 250);
    assert_eq!(p3.poc.pic_order_cnt_msb, 256, "lsb 由 250 回绕到 2 时 Msb 应加 256");
    assert_eq!(p3.poc.top_field_order_cnt, 258);
    assert_eq!(p3.pic_order_cnt(), 258);
}

#[test]
fn test_poc_values_are_logged() {
    let mut parser = parser_with(&SpsDesc::default(), &PpsDesc::default());
    let unit = parser
        .parse_nal(&nal(3, 5, &build_slice_rbsp(&SliceDesc {
            poc_lsb: Some((6, 8)),
            ..Default::default()
        })))
        .expect("IDR 条带应可解析");
    let top = unit
        .annotations
        .find("TopFieldOrderCnt")
        .expect("注释中应记录 TopFieldOrderCnt");
    assert_eq!(top.value, Some(FieldValue::Signed(6)));
    assert!(unit.annotations.find("PicSizeInMbs").is_some());
}

#[test]
fn test_slice_reject_missing_pps() {
    let mut parser = parser_with(&SpsDesc::default(), &PpsDesc::default());
    let desc = SliceDesc {
        pps_id: 4,
        ..Default::default()
    };
    let err = parser
        .parse_nal(&nal(3, 5, &build_slice_rbsp(&desc)))
        .expect_err("引用缺失 PPS 的条带应失败");
    assert!(
        matches!(err, ParseError::UnresolvedReference { kind: "PPS", id: 4 }),
        "actual={err:?}"
    );
    assert!(parser.poc_state().is_none(), "失败的条带不应更新 POC 状态");
}

#[test]
fn test_slice_reject_first_mb_out_of_range() {
    let mut parser = parser_with(&SpsDesc::default(), &PpsDesc::default());
    let desc = SliceDesc {
        first_mb: 300,
        ..Default::default()
    };
    let err = parser
        .parse_nal(&nal(3, 5, &build_slice_rbsp(&desc)))
        .expect_err("first_mb_in_slice=PicSizeInMbs 应失败");
    assert!(format!("{err}").contains("first_mb_in_slice"));
}

#[test]
fn test_slice_reject_idr_with_p_slice_type() {
    let mut parser = parser_with(&SpsDesc::default(), &PpsDesc::default());
    let desc = SliceDesc {
        slice_type: 0,
        ..Default::default()
    };
    let err = parser
        .parse_nal(&nal(3, 5, &build_slice_rbsp(&desc)))
        .expect_err("IDR 中的 P 条带应失败");
    assert!(format!("{err}").contains("slice_type"));
}

#[test]
fn test_slice_reject_qp_out_of_range() {
    let mut parser = parser_with(&SpsDesc::default(), &PpsDesc::default());
    let desc = SliceDesc {
        slice_qp_delta: 26,
        ..Default::default()
    };
    let err = parser
        .parse_nal(&nal(3, 5, &build_slice_rbsp(&desc)))
        .expect_err("SliceQPY=52 应失败");
    assert!(format!("{err}").contains("slice_qp_delta"));
}

#[test]
fn test_missing_poc_context_is_diagnostic() {
    let mut parser = parser_with(&SpsDesc::default(), &PpsDesc::default());
    let unit = parser
        .parse_nal(&nal(3, 1, &build_slice_rbsp(&SliceDesc::p_slice(3, 40))))
        .expect("缺少 POC 上下文时仍应解析成功");
    let AvcPayload::Slice(h) = unit.payload else {
        panic!("应解析为条带");
    };
    assert_eq!(h.poc_diagnostic, Some(PocDiagnostic::MissingPocContext));
    assert_eq!(h.poc.top_field_order_cnt, 0, "POC 字段应保持为 0");
    assert!(
        unit.annotations
            .notes()
            .any(|n| n.name.contains("MissingPOCContext")),
        "注释中应记录诊断"
    );
}

#[test]
fn test_missing_poc_context_strict_mode() {
    let mut parser = AvcParser::new(AvcParserConfig {
        strict_poc: true,
        ..Default::default()
    });
    parser
        .parse_nal(&nal(3, 7, &build_sps_rbsp(&SpsDesc::default())))
        .expect("SPS 应可解析");
    parser
        .parse_nal(&nal(3, 8, &build_pps_rbsp(&PpsDesc::default())))
        .expect("PPS 应可解析");
    let err = parser
        .parse_nal(&nal(3, 1, &build_slice_rbsp(&SliceDesc::p_slice(3, 40))))
        .expect_err("严格模式下缺少 POC 上下文应失败");
    assert!(matches!(err, ParseError::ConstraintViolation(_)));
    assert!(parser.poc_state().is_none());
}

#[test]
fn test_intra_first_picture_without_idr_has_context() {
    let mut parser = parser_with(&SpsDesc::default(), &PpsDesc::default());
    let desc = SliceDesc {
        slice_type: 7,
        idr_pic_id: None,
        frame_num: 5,
        poc_lsb: Some((20, 8)),
        ..Default::default()
    };
    let h = parse_slice(&mut parser, 1, &desc);
    assert!(h.poc_diagnostic.is_none(), "首幅帧内图像不需要 POC 上下文");
    assert_eq!(h.poc.top_field_order_cnt, 20);
    assert_eq!(h.poc.global.value, 20);
}

#[test]
fn test_mmco5_resets_previous_lsb() {
    let mut parser = parser_with(&SpsDesc::default(), &PpsDesc::default());
    parse_slice(&mut parser, 5, &SliceDesc::default());
    let p = parse_slice(&mut parser, 1, &SliceDesc {
        mmco: Some(vec![(5, vec![])]),
        ..SliceDesc::p_slice(1, 200)
    });
    assert_eq!(
        p.dec_ref_pic_marking,
        Some(DecRefPicMarking::Adaptive(vec![MmcoOp::ClearAll]))
    );
    let state = parser.poc_state().expect("应有 POC 状态");
    assert!(state.has_mmco5);
    assert_eq!(state.top_field_order_cnt, 0, "MMCO 5 后 TopFieldOrderCnt 减去 tempPicOrderCnt");

    let next = parse_slice(&mut parser, 1, &SliceDesc::p_slice(1, 4));
    assert_eq!(next.poc.prev_pic_order_cnt_lsb, 0);
    assert_eq!(next.poc.pic_order_cnt_msb, 0);
    assert_eq!(next.poc.top_field_order_cnt, 4);
}

#[test]
fn test_second_slice_of_picture_keeps_state() {
    let mut parser = parser_with(&SpsDesc::default(), &PpsDesc::default());
    parse_slice(&mut parser, 5, &SliceDesc::default());
    let first = parse_slice(&mut parser, 1, &SliceDesc::p_slice(1, 250));
    let second = parse_slice(&mut parser, 1, &SliceDesc {
        first_mb: 150,
        ..SliceDesc::p_slice(1, 250)
    });
    assert_eq!(first.poc, second.poc, "同一图像的条带 POC 应相同");
    assert_eq!(
        parser.poc_state().map(|s| s.pic_order_cnt_lsb),
        Some(250)
    );
}

#[test]
fn test_field_pair_bottom_field_does_not_update_state() {
    let sps = SpsDesc {
        frame_mbs_only: false,
        height_map_units_minus1: 7,
        ..Default::default()
    };
    let mut parser = parser_with(&sps, &PpsDesc::default());
    let top = parse_slice(&mut parser, 5, &SliceDesc {
        field_flags_present: true,
        field: Some(false),
        ..Default::default()
    });
    assert!(top.field_pic_flag);
    assert_eq!(top.context.max_pic_num, 32, "场图像 MaxPicNum = 2 * MaxFrameNum");
    assert_eq!(top.context.pic_height_in_mbs, 8);

    let bottom = parse_slice(&mut parser, 1, &SliceDesc {
        field_flags_present: true,
        field: Some(true),
        ..SliceDesc::p_slice(0, 1)
    });
    assert!(bottom.bottom_field_flag);
    assert_eq!(bottom.poc.bottom_field_order_cnt, 1);
    assert_eq!(
        parser.poc_state().map(|s| s.bottom_field_flag),
        Some(false),
        "底场不应更新上一图像状态"
    );
}

#[test]
fn test_mbaff_halves_first_mb_range() {
    let sps = SpsDesc {
        frame_mbs_only: false,
        mbaff: true,
        height_map_units_minus1: 7,
        ..Default::default()
    };
    let mut parser = parser_with(&sps, &PpsDesc::default());
    let desc = SliceDesc {
        field_flags_present: true,
        first_mb: 160,
        ..Default::default()
    };
    let err = parser
        .parse_nal(&nal(3, 5, &build_slice_rbsp(&desc)))
        .expect_err("MBAFF 帧中 first_mb_in_slice 超过 PicSizeInMbs/2 应失败");
    assert!(format!("{err}").contains("first_mb_in_slice"));
}

#[test]
fn test_bottom_field_pic_order_delta() {
    let pps = PpsDesc {
        bottom_field_pic_order: true,
        ..Default::default()
    };
    let mut parser = parser_with(&SpsDesc::default(), &pps);
    let h = parse_slice(&mut parser, 5, &SliceDesc {
        poc_lsb: Some((4, 8)),
        delta_poc_bottom: Some(-1),
        ..Default::default()
    });
    assert_eq!(h.delta_pic_order_cnt_bottom, -1);
    assert_eq!(h.poc.top_field_order_cnt, 4);
    assert_eq!(h.poc.bottom_field_order_cnt, 3);
    assert_eq!(h.pic_order_cnt(), 3, "帧的 PicOrderCnt 取两场较小值");
}

#[test]
fn test_b_slice_reads_direct_flag() {
    let mut parser = parser_with(&SpsDesc::default(), &PpsDesc::default());
    parse_slice(&mut parser, 5, &SliceDesc::default());
    let b = parse_slice(&mut parser, 0, &SliceDesc {
        slice_type: 1,
        nal_ref_idc: 0,
        ..SliceDesc::p_slice(1, 2)
    });
    assert_eq!(b.slice_type, SliceType::B);
    assert_eq!(b.direct_spatial_mv_pred_flag, Some(true));
    assert!(b.dec_ref_pic_marking.is_none(), "非参考条带没有 dec_ref_pic_marking");
}

#[test]
fn test_data_partitions() {
    let mut parser = parser_with(&SpsDesc::default(), &PpsDesc::default());
    parse_slice(&mut parser, 5, &SliceDesc::default());

    let mut bw = BitWriter::new();
    write_slice_header(&mut bw, &SliceDesc::p_slice(1, 2));
    bw.write_ue(3);
    bw.write_trailing_bits();
    let unit = parser
        .parse_nal(&nal(3, 2, &bw.finish()))
        .expect("分区 A 应可解析");
    match unit.payload {
        AvcPayload::PartitionA { header, slice_id } => {
            assert_eq!(slice_id, 3);
            assert_eq!(header.frame_num, 1);
        }
        other => panic!("应为分区 A: {other:?}"),
    }

    let mut bw = BitWriter::new();
    bw.write_ue(3);
    bw.write_trailing_bits();
    let rbsp = bw.finish();
    let b = parser.parse_nal(&nal(3, 3, &rbsp)).expect("分区 B 应可解析");
    assert_eq!(b.payload, AvcPayload::PartitionB { slice_id: 3 });
    let c = parser.parse_nal(&nal(3, 4, &rbsp)).expect("分区 C 应可解析");
    assert_eq!(c.payload, AvcPayload::PartitionC { slice_id: 3 });
}

#[test]
fn test_slice_group_change_cycle_width() {
    let mut parser = parser_with(&SpsDesc::default(), &PpsDesc::default());
    let desc = PpsDesc {
        pps_id: 1,
        ..Default::default()
    };
    let mut bw = BitWriter::new();
    write_pps_head(&mut bw, &desc);
    bw.write_ue(1);
    bw.write_ue(4); // slice_group_map_type
    bw.write_flag(false);
    bw.write_ue(4); // SliceGroupChangeRate = 5
    write_pps_tail(&mut bw, &desc);
    parser
        .parse_nal(&nal(3, 8, &bw.finish()))
        .expect("带条带组的 PPS 应可解析");

    // Ceil(Log2(300 ÷ 5 + 1)) = 6
    let slice = SliceDesc {
        pps_id: 1,
        ..Default::default()
    };
    let mut bw = BitWriter::new();
    write_slice_header(&mut bw, &slice);
    bw.write_bits(60, 6);
    bw.write_trailing_bits();
    let unit = parser
        .parse_nal(&nal(3, 5, &bw.finish()))
        .expect("带 slice_group_change_cycle 的条带应可解析");
    let AvcPayload::Slice(h) = unit.payload else {
        panic!("应解析为条带");
    };
    assert_eq!(h.slice_group_change_cycle, Some(60));
    assert_eq!(
        unit.annotations
            .find("slice_group_change_cycle")
            .map(|a| a.bit_length),
        Some(6)
    );
}

#[test]
fn test_svc_slice_is_unsupported() {
    let mut parser = parser_with(&SpsDesc::default(), &PpsDesc::default());
    // type 20, svc_extension_flag=1, idr_flag=1, 其余字段, reserved_three_2bits=3
    let mut bw = BitWriter::new();
    bw.write_bits(0x74, 8);
    bw.write_flag(true);
    bw.write_flag(true);
    bw.write_bits(0, 20);
    bw.write_bits(3, 2);
    bw.write_ue(0);
    let err = parser
        .parse_nal(&bw.finish())
        .expect_err("SVC 条带头应返回 Unsupported");
    assert!(matches!(err, ParseError::Unsupported(_)), "actual={err:?}");
}

#[test]
fn test_aud_is_classified_only() {
    let mut parser = AvcParser::new(AvcParserConfig::default());
    let unit = parser.parse_nal(&[0x09, 0xF0]).expect("AUD 应可识别");
    assert_eq!(unit.payload, AvcPayload::Other);
    assert_eq!(unit.header.nal_ref_idc, 0);
}
