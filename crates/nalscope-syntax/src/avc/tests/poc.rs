use nalscope_core::SyntaxReader;

use super::super::tables::SliceType;
use super::super::{PocDiagnostic, PocInput, PocState, Sps, derive_poc};
use super::helpers::*;

fn sps(desc: &SpsDesc) -> Sps {
    let rbsp = build_sps_rbsp(desc);
    let mut r = SyntaxReader::new(&rbsp);
    Sps::parse(&mut r).expect("测试 SPS 应可解析")
}

fn input(idr: bool, nal_ref_idc: u32, frame_num: u32) -> PocInput {
    PocInput {
        idr,
        slice_type: if idr { SliceType::I } else { SliceType::P },
        nal_ref_idc,
        first_mb_in_slice: 0,
        frame_num,
        field_pic_flag: false,
        bottom_field_flag: false,
        pic_order_cnt_lsb: 0,
        delta_pic_order_cnt_bottom: 0,
        delta_pic_order_cnt: [0; 2],
        has_mmco5: false,
    }
}

/// 依次推导一组图像, 返回每幅图像的 (Top, Bottom)
fn run(sps: &Sps, inputs: &[PocInput]) -> Vec<(i64, i64)> {
    let mut prev: Option<PocState> = None;
    inputs
        .iter()
        .map(|i| {
            let (poc, diag) = derive_poc(sps, i, prev.as_ref());
            assert!(diag.is_none(), "不应产生诊断");
            prev = Some(PocState::new(i, &poc));
            (poc.top_field_order_cnt, poc.bottom_field_order_cnt)
        })
        .collect()
}

#[test]
fn test_poc_type2_follows_decoding_order() {
    let sps = sps(&SpsDesc {
        poc_type: 2,
        ..Default::default()
    });
    let pocs = run(&sps, &[
        input(true, 3, 0),
        input(false, 3, 1),
        input(false, 0, 2),
        input(false, 3, 2),
    ]);
    assert_eq!(pocs, vec![(0, 0), (2, 2), (3, 3), (4, 4)]);
}

#[test]
fn test_poc_type2_frame_num_wrap() {
    let sps = sps(&SpsDesc {
        poc_type: 2,
        ..Default::default()
    });
    let mut seq = vec![input(true, 3, 0)];
    seq.extend((1..16).map(|n| input(false, 3, n)));
    seq.push(input(false, 3, 0));
    let pocs = run(&sps, &seq);
    assert_eq!(pocs[15], (30, 30));
    assert_eq!(pocs[16], (32, 32), "frame_num 回绕后 FrameNumOffset 应加 MaxFrameNum");
}

#[test]
fn test_poc_type1_cycle_and_non_ref_offset() {
    let sps = sps(&SpsDesc {
        poc_type: 1,
        poc_type1: (false, -2, 1, vec![2, 4, 6]),
        ..Default::default()
    });
    let pocs = run(&sps, &[
        input(true, 3, 0),
        input(false, 3, 1),
        input(false, 0, 2),
        input(false, 3, 2),
        input(false, 3, 3),
        input(false, 3, 4),
    ]);
    // absFrameNum: 0, 1, 1(非参考减 1), 2, 3, 4
    // expected:    0, 2, 2-2, 6, 12, 12+2
    assert_eq!(pocs[0], (0, 1));
    assert_eq!(pocs[1], (2, 3));
    assert_eq!(pocs[2], (0, 1));
    assert_eq!(pocs[3], (6, 7));
    assert_eq!(pocs[4], (12, 13));
    assert_eq!(pocs[5], (14, 15));
}

#[test]
fn test_poc_type1_deltas() {
    let sps = sps(&SpsDesc {
        poc_type: 1,
        poc_type1: (false, 0, 0, vec![4]),
        ..Default::default()
    });
    let mut p = input(false, 3, 1);
    p.delta_pic_order_cnt = [-1, 3];
    let pocs = run(&sps, &[input(true, 3, 0), p]);
    assert_eq!(pocs[1], (3, 6));
}

#[test]
fn test_poc_type0_mmco5_changes_wrap_reference() {
    let sps = sps(&SpsDesc::default());
    let idr = input(true, 3, 0);
    let (idr_poc, _) = derive_poc(&sps, &idr, None);
    let idr_state = PocState::new(&idr, &idr_poc);

    let mut p = input(false, 3, 1);
    p.pic_order_cnt_lsb = 100;
    let (p_poc, _) = derive_poc(&sps, &p, Some(&idr_state));
    assert_eq!(p_poc.top_field_order_cnt, 100);

    let mut next = input(false, 3, 2);
    next.pic_order_cnt_lsb = 300 % 256;

    // 无 MMCO 5: prevLsb=100, lsb=44 不触发回绕
    let plain = PocState::new(&p, &p_poc);
    let (a, _) = derive_poc(&sps, &next, Some(&plain));
    assert_eq!(a.top_field_order_cnt, 44);

    // 含 MMCO 5: prevLsb = TopFieldOrderCnt - tempPicOrderCnt = 0
    let mut p5 = p;
    p5.has_mmco5 = true;
    let after = PocState::new(&p5, &p_poc);
    assert_eq!(after.top_field_order_cnt, 0);
    let mut far = next;
    far.pic_order_cnt_lsb = 200;
    let (b, _) = derive_poc(&sps, &far, Some(&after));
    assert_eq!(b.prev_pic_order_cnt_lsb, 0);
    assert_eq!(b.pic_order_cnt_msb, -256, "lsb 跳变超过一半时 Msb 减 MaxPicOrderCntLsb");
    assert_eq!(b.top_field_order_cnt, -56);
}

#[test]
fn test_global_poc_advances_at_idr() {
    let sps = sps(&SpsDesc::default());
    let mut seq = vec![input(true, 3, 0)];
    let mut p = input(false, 3, 1);
    p.pic_order_cnt_lsb = 8;
    seq.push(p);
    seq.push(input(true, 3, 0));
    let mut q = input(false, 3, 1);
    q.pic_order_cnt_lsb = 4;
    seq.push(q);

    let mut prev: Option<PocState> = None;
    let globals: Vec<i64> = seq
        .iter()
        .map(|i| {
            let (poc, _) = derive_poc(&sps, i, prev.as_ref());
            prev = Some(PocState::new(i, &poc));
            poc.global.value
        })
        .collect();
    assert_eq!(globals, vec![0, 8, 10, 14]);
    assert_eq!(prev.map(|s| s.global.highest), Some(14));
}

#[test]
fn test_missing_context_leaves_zero() {
    let sps = sps(&SpsDesc::default());
    let mut p = input(false, 3, 4);
    p.pic_order_cnt_lsb = 30;
    let (poc, diag) = derive_poc(&sps, &p, None);
    assert_eq!(diag, Some(PocDiagnostic::MissingPocContext));
    assert_eq!(poc.top_field_order_cnt, 0);
    assert_eq!(poc.bottom_field_order_cnt, 0);
    assert_eq!(poc.global.value, 0);
}
