//! AVC 量化矩阵: 默认矩阵 (表 7-3/7-4) 与回退规则 (表 7-2).
//!
//! 所有系数按 zig-zag 扫描顺序存放, 与 scaling_list() 的读取顺序一致.

use nalscope_core::{ParseResult, SyntaxReader};

use crate::scaling_list::read_scaling_list;

pub const DEFAULT_4X4_INTRA: [u8; 16] = [
    6, 13, 13, 20, 20, 20, 28, 28, 28, 28, 32, 32, 32, 37, 37, 42,
];

pub const DEFAULT_4X4_INTER: [u8; 16] = [
    10, 14, 14, 20, 20, 20, 24, 24, 24, 24, 27, 27, 27, 30, 30, 34,
];

pub const DEFAULT_8X8_INTRA: [u8; 64] = [
    6, 10, 10, 13, 11, 13, 16, 16, 16, 16, 18, 18, 18, 18, 18, 23, 23, 23, 23, 23, 23, 25, 25, 25,
    25, 25, 25, 25, 27, 27, 27, 27, 27, 27, 27, 27, 29, 29, 29, 29, 29, 29, 29, 31, 31, 31, 31, 31,
    31, 33, 33, 33, 33, 33, 36, 36, 36, 36, 38, 38, 38, 40, 40, 42,
];

pub const DEFAULT_8X8_INTER: [u8; 64] = [
    9, 13, 13, 15, 13, 15, 17, 17, 17, 17, 19, 19, 19, 19, 19, 21, 21, 21, 21, 21, 21, 22, 22, 22,
    22, 22, 22, 22, 24, 24, 24, 24, 24, 24, 24, 24, 25, 25, 25, 25, 25, 25, 25, 27, 27, 27, 27, 27,
    27, 28, 28, 28, 28, 28, 30, 30, 30, 30, 32, 32, 32, 33, 33, 35,
];

/// 已应用回退规则的量化矩阵集合
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalingMatrices {
    /// Y/Cb/Cr intra, Y/Cb/Cr inter
    pub lists_4x4: [[u8; 16]; 6],
    /// 8x8 列表, 4:4:4 时 6 组, 否则 2 组 (PPS 未开启 8x8 变换时为 0 组)
    pub lists_8x8: Vec<[u8; 64]>,
}

impl ScalingMatrices {
    /// Flat_4x4_16 / Flat_8x8_16
    pub fn flat(num_8x8: usize) -> Self {
        Self {
            lists_4x4: [[16; 16]; 6],
            lists_8x8: vec![[16; 64]; num_8x8],
        }
    }

    /// 读取 `6 + num_8x8` 个 scaling_list_present_flag 及其列表
    ///
    /// `base` 为 `None` 时未出现的列表回退到默认矩阵 (规则 A); 否则
    /// 索引 0/3 (8x8 为 0/1) 回退到 `base` 中对应的列表 (规则 B).
    pub(crate) fn read(
        r: &mut SyntaxReader<'_>,
        prefix: &str,
        num_8x8: usize,
        base: Option<&ScalingMatrices>,
    ) -> ParseResult<Self> {
        let mut lists_4x4 = [[16u8; 16]; 6];
        let mut lists_8x8: Vec<[u8; 64]> = Vec::with_capacity(num_8x8);

        for i in 0..6 {
            let present = r.flag(&format!("{prefix}_scaling_list_present_flag[{i}]"))?;
            lists_4x4[i] = if present {
                let list = read_scaling_list::<16>(r, &format!("ScalingList4x4[{i}]"))?;
                if list.use_default_matrix == Some(true) {
                    default_4x4(i)
                } else {
                    list.values
                }
            } else if i == 0 || i == 3 {
                base.map_or_else(|| default_4x4(i), |b| b.lists_4x4[i])
            } else {
                lists_4x4[i - 1]
            };
        }

        for k in 0..num_8x8 {
            let i = k + 6;
            let present = r.flag(&format!("{prefix}_scaling_list_present_flag[{i}]"))?;
            let list = if present {
                let list = read_scaling_list::<64>(r, &format!("ScalingList8x8[{k}]"))?;
                if list.use_default_matrix == Some(true) {
                    default_8x8(k)
                } else {
                    list.values
                }
            } else if k < 2 {
                base.and_then(|b| b.lists_8x8.get(k).copied())
                    .unwrap_or_else(|| default_8x8(k))
            } else {
                lists_8x8[k - 2]
            };
            lists_8x8.push(list);
        }

        Ok(Self {
            lists_4x4,
            lists_8x8,
        })
    }
}

fn default_4x4(i: usize) -> [u8; 16] {
    if i < 3 {
        DEFAULT_4X4_INTRA
    } else {
        DEFAULT_4X4_INTER
    }
}

fn default_8x8(k: usize) -> [u8; 64] {
    if k % 2 == 0 {
        DEFAULT_8X8_INTRA
    } else {
        DEFAULT_8X8_INTER
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalscope_core::BitWriter;

    fn read(bw: BitWriter, num_8x8: usize, base: Option<&ScalingMatrices>) -> ScalingMatrices {
        let data = bw.finish();
        let mut r = SyntaxReader::new(&data);
        ScalingMatrices::read(&mut r, "seq", num_8x8, base).unwrap()
    }

    #[test]
    fn test_fallback_rule_a_uses_defaults() {
        let mut bw = BitWriter::new();
        for _ in 0..8 {
            bw.write_flag(false);
        }
        let m = read(bw, 2, None);
        assert_eq!(m.lists_4x4[0], DEFAULT_4X4_INTRA);
        assert_eq!(m.lists_4x4[2], DEFAULT_4X4_INTRA, "Cr intra 应回退到 Cb intra");
        assert_eq!(m.lists_4x4[3], DEFAULT_4X4_INTER);
        assert_eq!(m.lists_8x8, vec![DEFAULT_8X8_INTRA, DEFAULT_8X8_INTER]);
    }

    #[test]
    fn test_fallback_previous_list() {
        // 列表 0 显式给出全 10, 列表 1/2 未出现 → 复制列表 0
        let mut bw = BitWriter::new();
        bw.write_flag(true);
        bw.write_se(2);
        for _ in 1..16 {
            bw.write_se(0);
        }
        for _ in 1..6 {
            bw.write_flag(false);
        }
        let m = read(bw, 0, None);
        assert_eq!(m.lists_4x4[0], [10; 16]);
        assert_eq!(m.lists_4x4[1], [10; 16]);
        assert_eq!(m.lists_4x4[2], [10; 16]);
        assert_eq!(m.lists_4x4[3], DEFAULT_4X4_INTER);
        assert!(m.lists_8x8.is_empty());
    }

    #[test]
    fn test_fallback_rule_b_uses_base() {
        let mut base = ScalingMatrices::flat(2);
        base.lists_4x4[3] = [20; 16];
        base.lists_8x8[1] = [30; 64];

        let mut bw = BitWriter::new();
        for _ in 0..8 {
            bw.write_flag(false);
        }
        let m = read(bw, 2, Some(&base));
        assert_eq!(m.lists_4x4[0], [16; 16], "索引 0 应回退到 SPS 列表");
        assert_eq!(m.lists_4x4[5], [20; 16]);
        assert_eq!(m.lists_8x8[1], [30; 64]);
    }

    #[test]
    fn test_explicit_default_escape() {
        let mut bw = BitWriter::new();
        bw.write_flag(false);
        bw.write_flag(false);
        bw.write_flag(false);
        bw.write_flag(true);
        bw.write_se(-8);
        bw.write_flag(false);
        bw.write_flag(false);
        let m = read(bw, 0, Some(&ScalingMatrices::flat(0)));
        assert_eq!(m.lists_4x4[3], DEFAULT_4X4_INTER, "useDefaultScalingMatrixFlag 应选默认矩阵");
        assert_eq!(m.lists_4x4[4], DEFAULT_4X4_INTER);
    }
}
