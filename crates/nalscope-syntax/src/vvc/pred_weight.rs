//! VVC pred_weight_table() (7.3.8).
//!
//! 权重数量在图像头中由 num_lX_weights 显式给出, 在条带头中等于
//! NumRefIdxActive; 每项的语法与 HEVC 非高精度模式相同.

use nalscope_core::{ParseResult, ReadOptions, SyntaxReader};

use crate::hevc::pred_weight::{PredWeight, WeightContext, parse_list};

/// 决定各列表权重数量的上下文
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WeightCounts {
    pub chroma_array_type: u32,
    pub pps_wp_info_in_ph_flag: bool,
    pub pps_weighted_bipred_flag: bool,
    /// num_ref_entries[i][RplsIdx[i]]
    pub num_ref_entries: [u32; 2],
    /// NumRefIdxActive, 仅在条带头中使用
    pub num_ref_idx_active: [u32; 2],
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PredWeightTable {
    pub luma_log2_weight_denom: u32,
    pub chroma_log2_weight_denom: Option<u32>,
    pub num_l0_weights: Option<u32>,
    pub num_l1_weights: Option<u32>,
    pub l0: Vec<PredWeight>,
    pub l1: Vec<PredWeight>,
}

impl PredWeightTable {
    pub(crate) fn parse(r: &mut SyntaxReader<'_>, counts: &WeightCounts) -> ParseResult<Self> {
        r.sub_level("pred_weight_table()", |r| {
            let luma_log2_weight_denom =
                r.read_ue("luma_log2_weight_denom", ReadOptions::new().check_range(0, 7))?;
            let chroma_log2_weight_denom = if counts.chroma_array_type != 0 {
                let luma = i64::from(luma_log2_weight_denom);
                let delta = r.read_se(
                    "delta_chroma_log2_weight_denom",
                    ReadOptions::new().check_range(-luma, 7 - luma),
                )?;
                let denom = (luma + i64::from(delta)) as u32;
                r.log_calculated("ChromaLog2WeightDenom", denom);
                Some(denom)
            } else {
                None
            };
            let ctx = WeightContext {
                chroma_array_type: counts.chroma_array_type,
                bit_depth_luma: 8,
                bit_depth_chroma: 8,
                high_precision_offsets_enabled_flag: false,
            };

            let mut table = Self {
                luma_log2_weight_denom,
                chroma_log2_weight_denom,
                ..Default::default()
            };
            let num_weights_l0 = if counts.pps_wp_info_in_ph_flag {
                let n = r.read_ue(
                    "num_l0_weights",
                    ReadOptions::new().check_range(0, i64::from(counts.num_ref_entries[0].min(15))),
                )?;
                table.num_l0_weights = Some(n);
                n
            } else {
                counts.num_ref_idx_active[0]
            };
            r.log_calculated("NumWeightsL0", num_weights_l0);
            table.l0 = parse_list(r, &ctx, "l0", num_weights_l0, luma_log2_weight_denom, chroma_log2_weight_denom)?;

            let num_weights_l1 = if !counts.pps_weighted_bipred_flag
                || (counts.pps_wp_info_in_ph_flag && counts.num_ref_entries[1] == 0)
            {
                0
            } else if counts.pps_wp_info_in_ph_flag {
                let n = r.read_ue(
                    "num_l1_weights",
                    ReadOptions::new().check_range(0, i64::from(counts.num_ref_entries[1].min(15))),
                )?;
                table.num_l1_weights = Some(n);
                n
            } else {
                counts.num_ref_idx_active[1]
            };
            if num_weights_l1 > 0 {
                r.log_calculated("NumWeightsL1", num_weights_l1);
                table.l1 =
                    parse_list(r, &ctx, "l1", num_weights_l1, luma_log2_weight_denom, chroma_log2_weight_denom)?;
            }
            Ok(table)
        })
    }
}

#[cfg(test)]
mod tests {
    use nalscope_core::BitWriter;

    use super::*;

    #[test]
    fn test_weights_counted_in_picture_header() {
        let counts = WeightCounts {
            chroma_array_type: 0,
            pps_wp_info_in_ph_flag: true,
            pps_weighted_bipred_flag: true,
            num_ref_entries: [2, 0],
            ..Default::default()
        };
        let mut bw = BitWriter::new();
        bw.write_ue(3); // luma_log2_weight_denom
        bw.write_ue(1); // num_l0_weights
        bw.write_flag(true);
        bw.write_se(2);
        bw.write_se(-1);
        let data = bw.finish();
        let mut r = SyntaxReader::new(&data);
        let t = PredWeightTable::parse(&mut r, &counts).expect("加权表应可解析");
        assert_eq!(t.num_l0_weights, Some(1));
        assert_eq!(t.l0.len(), 1);
        assert_eq!(t.l0[0].luma_weight, 10);
        assert_eq!(t.l0[0].luma_offset, -1);
        assert!(t.l1.is_empty(), "列表 1 没有条目时不读 num_l1_weights");
        assert_eq!(t.num_l1_weights, None);
    }

    #[test]
    fn test_weights_follow_active_refs_in_slice_header() {
        let counts = WeightCounts {
            chroma_array_type: 1,
            pps_weighted_bipred_flag: false,
            num_ref_idx_active: [1, 1],
            ..Default::default()
        };
        let mut bw = BitWriter::new();
        bw.write_ue(2);
        bw.write_se(0);
        bw.write_flag(false); // luma_weight_l0_flag[0]
        bw.write_flag(false); // chroma_weight_l0_flag[0]
        let data = bw.finish();
        let mut r = SyntaxReader::new(&data);
        let t = PredWeightTable::parse(&mut r, &counts).expect("加权表应可解析");
        assert_eq!(t.l0.len(), 1);
        assert_eq!(t.l0[0].chroma_weight, [4, 4]);
        assert!(t.l1.is_empty(), "未开启双向加权时列表 1 无权重");
        assert!(r.bits_left() < 8);
    }
}
