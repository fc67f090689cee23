//! scaling_list() 读取 (AVC 7.3.2.1.1.1).
//!
//! 按差分方式读取一个 4x4 (N=16) 或 8x8 (N=64) 量化矩阵, 并检测
//! "使用默认矩阵" 的转义: 首个 delta 使 nextScale 变为 0.

use nalscope_core::{ParseResult, SyntaxReader};

/// 读取得到的一个量化矩阵
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalingList<const N: usize> {
    /// 按扫描顺序排列的系数
    pub values: [u8; N],
    /// `Some(true)`: 位置 0 处 nextScale 为 0, 应改用默认矩阵
    pub use_default_matrix: Option<bool>,
}

impl<const N: usize> ScalingList<N> {
    /// 所有系数为 16 的平坦矩阵 (Flat_4x4_16 / Flat_8x8_16)
    pub const FLAT: Self = Self {
        values: [16; N],
        use_default_matrix: None,
    };
}

/// 读取一个 scaling_list(), `name` 用于注释中的字段前缀
pub fn read_scaling_list<const N: usize>(
    reader: &mut SyntaxReader<'_>,
    name: &str,
) -> ParseResult<ScalingList<N>> {
    reader.sub_level(name, |r| {
        let mut values = [0u8; N];
        let mut last_scale = 8i32;
        let mut next_scale = 8i32;
        let mut use_default_matrix = Some(false);

        for (j, slot) in values.iter_mut().enumerate() {
            if next_scale != 0 {
                let delta_scale = r.se(&format!("delta_scale[{j}]"))?;
                next_scale = (last_scale + delta_scale + 256).rem_euclid(256);
                if j == 0 && next_scale == 0 {
                    use_default_matrix = Some(true);
                }
            }
            let value = if next_scale == 0 {
                last_scale
            } else {
                next_scale
            };
            *slot = value as u8;
            last_scale = value;
        }

        if use_default_matrix == Some(true) {
            r.log_calculated("UseDefaultScalingMatrixFlag", true);
        }
        Ok(ScalingList {
            values,
            use_default_matrix,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalscope_core::BitWriter;

    #[test]
    fn test_first_delta_zero_selects_default() {
        // delta=-8 → nextScale=0
        let mut bw = BitWriter::new();
        bw.write_se(-8);
        let data = bw.finish();

        let mut r = SyntaxReader::new(&data);
        let list = read_scaling_list::<16>(&mut r, "ScalingList4x4[0]").unwrap();
        assert_eq!(list.use_default_matrix, Some(true));
        assert_eq!(list.values, [8u8; 16], "默认矩阵转义时列表全部为 lastScale=8");
        assert_eq!(r.bits_read(), bw_len(-8), "只应读取一个 delta");
    }

    #[test]
    fn test_delta_sequence_and_repeat() {
        // 8+2=10, 10+3=13, 然后 nextScale=0 → 其余重复 13
        let mut bw = BitWriter::new();
        bw.write_se(2);
        bw.write_se(3);
        bw.write_se(-13);
        let data = bw.finish();

        let mut r = SyntaxReader::new(&data);
        let list = read_scaling_list::<16>(&mut r, "ScalingList4x4[1]").unwrap();
        assert_eq!(list.use_default_matrix, Some(false));
        assert_eq!(list.values[0], 10);
        assert_eq!(list.values[1], 13);
        assert!(list.values[2..].iter().all(|&v| v == 13));
    }

    #[test]
    fn test_wraps_modulo_256() {
        // 8 + 250 + 256 = 514 mod 256 = 2
        let mut bw = BitWriter::new();
        bw.write_se(250);
        for _ in 1..64 {
            bw.write_se(0);
        }
        let data = bw.finish();

        let mut r = SyntaxReader::new(&data);
        let list = read_scaling_list::<64>(&mut r, "ScalingList8x8[0]").unwrap();
        assert!(list.values.iter().all(|&v| v == 2));
    }

    #[test]
    fn test_truncated_list_fails() {
        let mut bw = BitWriter::new();
        bw.write_se(1);
        let data = bw.finish();
        let mut r = SyntaxReader::new(&data);
        assert!(read_scaling_list::<16>(&mut r, "ScalingList4x4[0]").is_err());
    }

    fn bw_len(v: i32) -> usize {
        let mut bw = BitWriter::new();
        bw.write_se(v);
        bw.bits_written()
    }
}
