use nalscope_core::ParseError;

use super::super::{Parallelism, VvcParser, VvcParserConfig, VvcPayload};
use super::helpers::*;

/// 256x128, CTU 32: 8x4 个 CTU
fn small_sps(entropy_coding_sync: bool) -> SpsDesc {
    SpsDesc {
        width: 256,
        height: 128,
        log2_ctu_size_minus5: 0,
        entropy_coding_sync,
        entry_point_offsets_present: true,
        ..Default::default()
    }
}

fn small_pps(partition: Partition) -> PpsDesc {
    PpsDesc {
        width: 256,
        height: 128,
        log2_ctu_size_minus5: 0,
        partition,
        ..Default::default()
    }
}

fn parser_with_sps(desc: &SpsDesc) -> VvcParser {
    let mut parser = VvcParser::new(VvcParserConfig::default());
    parser
        .parse_nal(&nal(SPS_NUT, 0, &build_sps_rbsp(desc)))
        .expect("SPS 应可解析");
    parser
}

#[test]
fn test_vvc_pps_rect_slice_per_tile() {
    let mut parser = parser_with_sps(&small_sps(true));
    let unit = parser
        .parse_nal(&nal(
            PPS_NUT,
            0,
            &build_pps_rbsp(&small_pps(Partition::RectPerTile(TileGrid {
                column_width: 4,
                row_height: 4,
            }))),
        ))
        .expect("PPS 应可解析");
    let VvcPayload::Pps(pps) = unit.payload else {
        panic!("应解析为 PPS");
    };
    assert_eq!(pps.num_tiles(), 2);
    assert!(pps.rect_slice_flag());
    assert_eq!(pps.layout.slices.len(), 2, "每个 tile 一个矩形条带");
    let first: Vec<u32> = pps.layout.slices[0].ctb_addrs.iter().copied().take(5).collect();
    assert_eq!(first, vec![0, 1, 2, 3, 8], "条带内按 tile 内光栅顺序");
    assert_eq!(pps.layout.slices[1].ctb_addrs.first(), Some(&4));
    assert_eq!(pps.layout.slices[1].ctb_addrs.len(), 16);
    assert_eq!(pps.layout.num_slices_in_subpic(0), 2);
    assert_eq!(pps.parallelism(), Parallelism::Mixed, "tile 与 WPP 同时开启");
}

#[test]
fn test_vvc_pps_raster_tiles() {
    let mut parser = parser_with_sps(&small_sps(false));
    let unit = parser
        .parse_nal(&nal(
            PPS_NUT,
            0,
            &build_pps_rbsp(&small_pps(Partition::Raster(TileGrid {
                column_width: 2,
                row_height: 2,
            }))),
        ))
        .expect("PPS 应可解析");
    let VvcPayload::Pps(pps) = unit.payload else {
        panic!("应解析为 PPS");
    };
    assert_eq!(pps.num_tiles(), 8);
    assert!(!pps.rect_slice_flag());
    assert!(pps.layout.slices.is_empty(), "光栅扫描条带不在 PPS 中划分");
    assert_eq!(pps.layout.tile_ctbs(5), vec![18, 19, 26, 27]);
    assert_eq!(pps.parallelism(), Parallelism::Tile);
}

#[test]
fn test_vvc_pps_without_partition_is_one_slice() {
    let mut parser = parser_with_sps(&small_sps(false));
    parser
        .parse_nal(&nal(PPS_NUT, 0, &build_pps_rbsp(&small_pps(Partition::None))))
        .expect("PPS 应可解析");
    let pps = parser.parameter_sets().pps.get(0).expect("PPS 应入库");
    assert!(pps.pps_no_pic_partition_flag);
    assert_eq!(pps.layout.slices.len(), 1);
    assert_eq!(pps.layout.slices[0].ctb_addrs.len(), 32);
    assert_eq!(pps.parallelism(), Parallelism::Slice);
}

#[test]
fn test_vvc_pps_rejects_tile_wider_than_picture() {
    let mut parser = parser_with_sps(&small_sps(false));
    let err = parser
        .parse_nal(&nal(
            PPS_NUT,
            0,
            &build_pps_rbsp(&small_pps(Partition::Raster(TileGrid {
                column_width: 9,
                row_height: 2,
            }))),
        ))
        .expect_err("tile 宽于图像时应失败");
    assert!(matches!(err, ParseError::ConstraintViolation(_)), "actual={err:?}");
    assert!(parser.parameter_sets().pps.is_empty(), "失败的 PPS 不应入库");
}

#[test]
fn test_vvc_pps_requires_sps() {
    let mut parser = VvcParser::new(VvcParserConfig::default());
    let err = parser
        .parse_nal(&nal(PPS_NUT, 0, &build_pps_rbsp(&small_pps(Partition::None))))
        .expect_err("缺少 SPS 时应失败");
    assert!(
        matches!(err, ParseError::UnresolvedReference { kind: "SPS", id: 0 }),
        "actual={err:?}"
    );
}

#[test]
fn test_vvc_pps_size_must_match_sps() {
    let mut parser = parser_with_sps(&small_sps(false));
    let desc = PpsDesc {
        width: 248,
        ..small_pps(Partition::None)
    };
    let err = parser
        .parse_nal(&nal(PPS_NUT, 0, &build_pps_rbsp(&desc)))
        .expect_err("未开启分辨率变化时 PPS 尺寸必须等于 SPS 最大尺寸");
    assert!(matches!(err, ParseError::ConstraintViolation(_)), "actual={err:?}");
}
