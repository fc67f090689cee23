//! HEVC scaling_list_data() (7.3.4).
//!
//! 量化矩阵按对角扫描顺序保存, 与码流中的系数顺序一致.

use nalscope_core::{ParseResult, ReadOptions, SyntaxReader};

/// 表 7-6: 8x8 及以上帧内默认矩阵 (matrixId 0..=2)
const DEFAULT_INTRA_8X8: [u8; 64] = [
    16, 16, 16, 16, 16, 16, 16, 16, 16, 16, 17, 16, 17, 16, 17, 18, 17, 18, 18, 17, 18, 21, 19, 20,
    21, 20, 19, 21, 24, 22, 22, 24, 24, 22, 22, 24, 25, 25, 27, 30, 27, 25, 25, 29, 31, 35, 35, 31,
    29, 36, 41, 44, 41, 36, 47, 54, 54, 47, 65, 70, 65, 88, 88, 115,
];

/// 表 7-6: 8x8 及以上帧间默认矩阵 (matrixId 3..=5)
const DEFAULT_INTER_8X8: [u8; 64] = [
    16, 16, 16, 16, 16, 16, 16, 16, 16, 16, 17, 17, 17, 17, 17, 18, 18, 18, 18, 18, 18, 20, 20, 20,
    20, 20, 20, 20, 24, 24, 24, 24, 24, 24, 24, 24, 25, 25, 25, 25, 25, 25, 25, 28, 28, 28, 28, 28,
    28, 33, 33, 33, 33, 33, 41, 41, 41, 41, 54, 54, 54, 71, 71, 91,
];

/// sizeId 对应的系数个数
fn coef_num(size_id: usize) -> usize {
    (1usize << (4 + (size_id << 1))).min(64)
}

fn default_list(size_id: usize, matrix_id: usize) -> Vec<u8> {
    match (size_id, matrix_id) {
        (0, _) => vec![16; 16],
        (_, 0..=2) => DEFAULT_INTRA_8X8.to_vec(),
        _ => DEFAULT_INTER_8X8.to_vec(),
    }
}

/// scaling_list_data()
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalingListData {
    /// ScalingList[sizeId][matrixId]
    pub lists: [[Vec<u8>; 6]; 4],
    /// 16x16 / 32x32 的 DC 系数, 下标为 sizeId - 2
    pub dc_coef: [[u8; 6]; 2],
}

impl Default for ScalingListData {
    /// 全部使用默认矩阵 (scaling_list_enabled_flag=1 且无显式数据)
    fn default() -> Self {
        Self {
            lists: std::array::from_fn(|size_id| {
                std::array::from_fn(|matrix_id| default_list(size_id, matrix_id))
            }),
            dc_coef: [[16; 6]; 2],
        }
    }
}

impl ScalingListData {
    pub fn parse(r: &mut SyntaxReader<'_>) -> ParseResult<Self> {
        r.sub_level("scaling_list_data()", |r| {
            let mut data = Self::default();
            for size_id in 0..4 {
                let step = if size_id == 3 { 3 } else { 1 };
                for matrix_id in (0..6).step_by(step) {
                    data.parse_one(r, size_id, matrix_id, step)?;
                }
            }
            // 4:4:4 时 32x32 色度矩阵沿用 16x16
            for matrix_id in [1, 2, 4, 5] {
                data.lists[3][matrix_id] = data.lists[2][matrix_id].clone();
                data.dc_coef[1][matrix_id] = data.dc_coef[0][matrix_id];
            }
            Ok(data)
        })
    }

    fn parse_one(
        &mut self,
        r: &mut SyntaxReader<'_>,
        size_id: usize,
        matrix_id: usize,
        step: usize,
    ) -> ParseResult<()> {
        let pred_mode_flag = r.flag(&format!("scaling_list_pred_mode_flag[{size_id}][{matrix_id}]"))?;
        if !pred_mode_flag {
            let delta = r.read_ue(
                &format!("scaling_list_pred_matrix_id_delta[{size_id}][{matrix_id}]"),
                ReadOptions::new().check_range(0, (matrix_id / step) as i64),
            )? as usize;
            if delta == 0 {
                self.lists[size_id][matrix_id] = default_list(size_id, matrix_id);
                if size_id > 1 {
                    self.dc_coef[size_id - 2][matrix_id] = 16;
                }
            } else {
                let ref_matrix_id = matrix_id - delta * step;
                self.lists[size_id][matrix_id] = self.lists[size_id][ref_matrix_id].clone();
                if size_id > 1 {
                    self.dc_coef[size_id - 2][matrix_id] = self.dc_coef[size_id - 2][ref_matrix_id];
                }
                r.log_calculated("refMatrixId", ref_matrix_id);
            }
            return Ok(());
        }

        let mut next_coef: i32 = 8;
        if size_id > 1 {
            let dc_minus8 = r.read_se(
                &format!("scaling_list_dc_coef_minus8[{}][{matrix_id}]", size_id - 2),
                ReadOptions::new().check_range(-7, 247),
            )?;
            next_coef = dc_minus8 + 8;
            self.dc_coef[size_id - 2][matrix_id] = next_coef as u8;
        }
        let n = coef_num(size_id);
        let mut list = Vec::with_capacity(n);
        for i in 0..n {
            let delta = r.read_se(
                &format!("scaling_list_delta_coef[{i}]"),
                ReadOptions::new().check_range(-128, 127),
            )?;
            next_coef = (next_coef + delta + 256).rem_euclid(256);
            list.push(next_coef as u8);
        }
        self.lists[size_id][matrix_id] = list;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use nalscope_core::BitWriter;

    use super::*;

    /// 写出全部 "沿用默认矩阵" 的 scaling_list_data
    fn write_all_default(bw: &mut BitWriter) {
        for size_id in 0..4 {
            let count = if size_id == 3 { 2 } else { 6 };
            for _ in 0..count {
                bw.write_flag(false);
                bw.write_ue(0);
            }
        }
    }

    #[test]
    fn test_scaling_list_all_default() {
        let mut bw = BitWriter::new();
        write_all_default(&mut bw);
        let data = bw.finish();

        let mut r = SyntaxReader::new(&data);
        let lists = ScalingListData::parse(&mut r).unwrap();
        assert_eq!(lists, ScalingListData::default());
        assert_eq!(lists.lists[1][0][63], 115);
        assert_eq!(lists.lists[3][3][63], 91);
    }

    #[test]
    fn test_scaling_list_explicit_and_copy() {
        let mut bw = BitWriter::new();
        // sizeId 0, matrixId 0: 显式, 全部 delta = +1 -> 9, 10, ..., 24
        bw.write_flag(true);
        for _ in 0..16 {
            bw.write_se(1);
        }
        // matrixId 1: 复制 matrixId 0
        bw.write_flag(false);
        bw.write_ue(1);
        // 其余默认
        for _ in 2..6 {
            bw.write_flag(false);
            bw.write_ue(0);
        }
        for size_id in 1..4 {
            let count = if size_id == 3 { 2 } else { 6 };
            for m in 0..count {
                if size_id == 2 && m == 0 {
                    // 显式 16x16: DC = 20, 系数全部 8 (首项 delta=-12)
                    bw.write_flag(true);
                    bw.write_se(12);
                    bw.write_se(-12);
                    for _ in 1..64 {
                        bw.write_se(0);
                    }
                } else {
                    bw.write_flag(false);
                    bw.write_ue(0);
                }
            }
        }
        let data = bw.finish();

        let mut r = SyntaxReader::new(&data);
        let lists = ScalingListData::parse(&mut r).unwrap();
        let expected: Vec<u8> = (9..25).collect();
        assert_eq!(lists.lists[0][0], expected);
        assert_eq!(lists.lists[0][1], expected, "pred_matrix_id_delta=1 应复制前一矩阵");
        assert_eq!(lists.lists[0][2], vec![16; 16]);
        assert_eq!(lists.dc_coef[0][0], 20);
        assert_eq!(lists.lists[2][0], vec![8; 64]);
    }

    #[test]
    fn test_scaling_list_reject_bad_pred_delta() {
        let mut bw = BitWriter::new();
        bw.write_flag(false);
        bw.write_ue(1); // matrixId 0 无可参考矩阵
        let data = bw.finish();

        let mut r = SyntaxReader::new(&data);
        let err = ScalingListData::parse(&mut r).expect_err("matrixId 0 的 delta=1 应失败");
        assert!(format!("{err}").contains("scaling_list_pred_matrix_id_delta[0][0]"));
    }
}
