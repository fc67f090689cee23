//! HEVC pred_weight_table() (7.3.6.3).
//!
//! luma_weight_lX_flag 的出现条件依赖参考图像列表; 单层且未启用当前图像参考时
//! 该条件恒为真, 这里按此读取每个参考索引的标志.

use nalscope_core::{ParseResult, ReadOptions, SyntaxReader};

/// 加权预测所需的 SPS 信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightContext {
    pub chroma_array_type: u32,
    pub bit_depth_luma: u32,
    pub bit_depth_chroma: u32,
    pub high_precision_offsets_enabled_flag: bool,
}

impl WeightContext {
    /// WpOffsetHalfRangeY
    fn half_range_luma(&self) -> i32 {
        let bits = if self.high_precision_offsets_enabled_flag {
            self.bit_depth_luma - 1
        } else {
            7
        };
        1 << bits
    }

    /// WpOffsetHalfRangeC
    fn half_range_chroma(&self) -> i32 {
        let bits = if self.high_precision_offsets_enabled_flag {
            self.bit_depth_chroma - 1
        } else {
            7
        };
        1 << bits
    }
}

/// 单个参考索引的推导权重
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredWeight {
    pub luma_weight_flag: bool,
    pub chroma_weight_flag: bool,
    /// LumaWeightLX
    pub luma_weight: i32,
    pub luma_offset: i32,
    /// ChromaWeightLX[Cb, Cr]
    pub chroma_weight: [i32; 2],
    /// ChromaOffsetLX[Cb, Cr] (7-56)
    pub chroma_offset: [i32; 2],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredWeightTable {
    pub luma_log2_weight_denom: u32,
    /// ChromaLog2WeightDenom, ChromaArrayType 为 0 时不存在
    pub chroma_log2_weight_denom: Option<u32>,
    pub l0: Vec<PredWeight>,
    /// 仅 B 条带
    pub l1: Vec<PredWeight>,
}

impl PredWeightTable {
    /// `num_ref_idx_l1_active` 为 `None` 表示 P 条带
    pub(crate) fn parse(
        r: &mut SyntaxReader<'_>,
        ctx: &WeightContext,
        num_ref_idx_l0_active: u32,
        num_ref_idx_l1_active: Option<u32>,
    ) -> ParseResult<Self> {
        r.sub_level("pred_weight_table()", |r| {
            let luma_log2_weight_denom =
                r.read_ue("luma_log2_weight_denom", ReadOptions::new().check_range(0, 7))?;
            let chroma_log2_weight_denom = if ctx.chroma_array_type != 0 {
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

            let l0 = parse_list(
                r,
                ctx,
                "l0",
                num_ref_idx_l0_active,
                luma_log2_weight_denom,
                chroma_log2_weight_denom,
            )?;
            let l1 = match num_ref_idx_l1_active {
                Some(n) => parse_list(
                    r,
                    ctx,
                    "l1",
                    n,
                    luma_log2_weight_denom,
                    chroma_log2_weight_denom,
                )?,
                None => Vec::new(),
            };
            Ok(Self {
                luma_log2_weight_denom,
                chroma_log2_weight_denom,
                l0,
                l1,
            })
        })
    }
}

pub(crate) fn parse_list(
    r: &mut SyntaxReader<'_>,
    ctx: &WeightContext,
    list: &str,
    count: u32,
    luma_denom: u32,
    chroma_denom: Option<u32>,
) -> ParseResult<Vec<PredWeight>> {
    let luma_flags = (0..count)
        .map(|i| r.flag(&format!("luma_weight_{list}_flag[{i}]")))
        .collect::<ParseResult<Vec<_>>>()?;
    let chroma_flags = match chroma_denom {
        Some(_) => (0..count)
            .map(|i| r.flag(&format!("chroma_weight_{list}_flag[{i}]")))
            .collect::<ParseResult<Vec<_>>>()?,
        None => vec![false; count as usize],
    };

    let weight_range = ReadOptions::new().check_range(-128, 127);
    let half_y = i64::from(ctx.half_range_luma());
    let half_c = ctx.half_range_chroma();
    let chroma_denom_value = chroma_denom.unwrap_or(0);

    let mut out = Vec::with_capacity(count as usize);
    for (i, (&luma_weight_flag, &chroma_weight_flag)) in
        luma_flags.iter().zip(&chroma_flags).enumerate()
    {
        let mut w = PredWeight {
            luma_weight_flag,
            chroma_weight_flag,
            luma_weight: 1 << luma_denom,
            luma_offset: 0,
            chroma_weight: [1 << chroma_denom_value; 2],
            chroma_offset: [0; 2],
        };
        if luma_weight_flag {
            let delta =
                r.read_se(&format!("delta_luma_weight_{list}[{i}]"), weight_range.clone())?;
            w.luma_weight += delta;
            w.luma_offset = r.read_se(
                &format!("luma_offset_{list}[{i}]"),
                ReadOptions::new().check_range(-half_y, half_y - 1),
            )?;
        }
        if chroma_weight_flag {
            let offset_range = i64::from(4 * half_c);
            for j in 0..2 {
                let delta = r.read_se(
                    &format!("delta_chroma_weight_{list}[{i}][{j}]"),
                    weight_range.clone(),
                )?;
                w.chroma_weight[j] += delta;
                let delta_offset = r.read_se(
                    &format!("delta_chroma_offset_{list}[{i}][{j}]"),
                    ReadOptions::new().check_range(-offset_range, offset_range - 1),
                )?;
                // (7-56)
                let predicted = half_c - ((half_c * w.chroma_weight[j]) >> chroma_denom_value);
                w.chroma_offset[j] = (predicted + delta_offset).clamp(-half_c, half_c - 1);
            }
        }
        out.push(w);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalscope_core::BitWriter;

    const CTX_420: WeightContext = WeightContext {
        chroma_array_type: 1,
        bit_depth_luma: 8,
        bit_depth_chroma: 8,
        high_precision_offsets_enabled_flag: false,
    };

    #[test]
    fn test_hevc_pred_weight_flags_precede_values() {
        let mut bw = BitWriter::new();
        bw.write_ue(6); // luma_log2_weight_denom
        bw.write_se(-2); // ChromaLog2WeightDenom = 4
        bw.write_flag(true); // luma_weight_l0_flag[0]
        bw.write_flag(false); // luma_weight_l0_flag[1]
        bw.write_flag(false); // chroma_weight_l0_flag[0]
        bw.write_flag(true); // chroma_weight_l0_flag[1]
        bw.write_se(-4); // delta_luma_weight_l0[0]
        bw.write_se(3); // luma_offset_l0[0]
        for _ in 0..2 {
            bw.write_se(0); // delta_chroma_weight
            bw.write_se(5); // delta_chroma_offset
        }
        let data = bw.finish();
        let mut r = SyntaxReader::new(&data);
        let t = PredWeightTable::parse(&mut r, &CTX_420, 2, None).expect("加权表应可解析");
        assert_eq!(t.chroma_log2_weight_denom, Some(4));
        assert_eq!(t.l0[0].luma_weight, 60, "LumaWeight = (1 << 6) + delta");
        assert_eq!(t.l0[0].luma_offset, 3);
        assert_eq!(t.l0[1].luma_weight, 64, "未给出时为 1 << denom");
        assert_eq!(t.l0[1].chroma_weight, [16, 16]);
        // 128 - ((128 * 16) >> 4) + 5
        assert_eq!(t.l0[1].chroma_offset, [5, 5]);
        assert!(t.l1.is_empty());
    }

    #[test]
    fn test_hevc_pred_weight_reject_chroma_denom_out_of_range() {
        let mut bw = BitWriter::new();
        bw.write_ue(6);
        bw.write_se(3);
        let data = bw.finish();
        let mut r = SyntaxReader::new(&data);
        let err = PredWeightTable::parse(&mut r, &CTX_420, 1, None)
            .expect_err("ChromaLog2WeightDenom=9 应失败");
        assert!(format!("{err}").contains("delta_chroma_log2_weight_denom"));
    }

    #[test]
    fn test_hevc_pred_weight_high_precision_offset_range() {
        let ctx = WeightContext {
            chroma_array_type: 0,
            bit_depth_luma: 10,
            bit_depth_chroma: 10,
            high_precision_offsets_enabled_flag: true,
        };
        let mut bw = BitWriter::new();
        bw.write_ue(0);
        bw.write_flag(true);
        bw.write_se(0);
        bw.write_se(-512);
        let data = bw.finish();
        let mut r = SyntaxReader::new(&data);
        let t = PredWeightTable::parse(&mut r, &ctx, 1, None).expect("高精度偏移应可达 -512");
        assert_eq!(t.l0[0].luma_offset, -512);
        assert_eq!(t.chroma_log2_weight_denom, None);
    }
}
