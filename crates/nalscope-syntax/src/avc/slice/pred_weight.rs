//! pred_weight_table() (7.3.3.2).

use nalscope_core::{ParseResult, ReadOptions, SyntaxReader};

/// 单个参考索引的加权参数, 未显式给出时为默认值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredWeight {
    pub luma_weight: i32,
    pub luma_offset: i32,
    /// [Cb, Cr]
    pub chroma_weight: [i32; 2],
    pub chroma_offset: [i32; 2],
    /// luma_weight_lX_flag
    pub luma_explicit: bool,
    /// chroma_weight_lX_flag
    pub chroma_explicit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredWeightTable {
    pub luma_log2_weight_denom: u32,
    /// ChromaArrayType 为 0 时不存在
    pub chroma_log2_weight_denom: Option<u32>,
    pub l0: Vec<PredWeight>,
    /// 仅 B 条带
    pub l1: Vec<PredWeight>,
}

impl PredWeightTable {
    /// `num_ref_idx_l1_active` 为 `None` 表示非 B 条带
    pub(crate) fn parse(
        r: &mut SyntaxReader<'_>,
        chroma_array_type: u32,
        num_ref_idx_l0_active: u32,
        num_ref_idx_l1_active: Option<u32>,
    ) -> ParseResult<Self> {
        r.sub_level("pred_weight_table()", |r| {
            let luma_log2_weight_denom =
                r.read_ue("luma_log2_weight_denom", ReadOptions::new().check_range(0, 7))?;
            let chroma_log2_weight_denom = if chroma_array_type != 0 {
                Some(r.read_ue(
                    "chroma_log2_weight_denom",
                    ReadOptions::new().check_range(0, 7),
                )?)
            } else {
                None
            };

            let l0 = parse_list(
                r,
                "l0",
                num_ref_idx_l0_active,
                luma_log2_weight_denom,
                chroma_log2_weight_denom,
            )?;
            let l1 = match num_ref_idx_l1_active {
                Some(n) => parse_list(
                    r,
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

fn parse_list(
    r: &mut SyntaxReader<'_>,
    list: &str,
    count: u32,
    luma_denom: u32,
    chroma_denom: Option<u32>,
) -> ParseResult<Vec<PredWeight>> {
    let weight_range = ReadOptions::new().check_range(-128, 127);
    let mut out = Vec::with_capacity(count as usize);
    for i in 0..count {
        let mut w = PredWeight {
            luma_weight: 1 << luma_denom,
            luma_offset: 0,
            chroma_weight: [1 << chroma_denom.unwrap_or(0); 2],
            chroma_offset: [0; 2],
            luma_explicit: false,
            chroma_explicit: false,
        };
        if r.flag(&format!("luma_weight_{list}_flag[{i}]"))? {
            w.luma_explicit = true;
            w.luma_weight = r.read_se(&format!("luma_weight_{list}[{i}]"), weight_range.clone())?;
            w.luma_offset = r.read_se(&format!("luma_offset_{list}[{i}]"), weight_range.clone())?;
        }
        if chroma_denom.is_some() && r.flag(&format!("chroma_weight_{list}_flag[{i}]"))? {
            w.chroma_explicit = true;
            for c in 0..2 {
                w.chroma_weight[c] =
                    r.read_se(&format!("chroma_weight_{list}[{i}][{c}]"), weight_range.clone())?;
                w.chroma_offset[c] =
                    r.read_se(&format!("chroma_offset_{list}[{i}][{c}]"), weight_range.clone())?;
            }
        }
        out.push(w);
    }
    Ok(out)
}
