//! VVC 图像划分: tile 网格、矩形条带的 CTU 列表与子图像归属 (6.5.1).

use nalscope_core::{ParseError, ParseResult};

use super::sps::Subpic;

/// 一个矩形条带
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RectSlice {
    /// SliceTopLeftTileIdx
    pub top_left_tile_idx: u32,
    /// CtbAddrInSlice, 按 tile 内光栅顺序
    pub ctb_addrs: Vec<u32>,
    /// 首个 CTU 所在的子图像
    pub subpic_idx: usize,
}

/// 以 CTB 为单位的图像划分
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PictureLayout {
    pub pic_width_in_ctbs_y: u32,
    pub pic_height_in_ctbs_y: u32,
    /// ColWidthVal
    pub column_widths: Vec<u32>,
    /// RowHeightVal
    pub row_heights: Vec<u32>,
    col_bd: Vec<u32>,
    row_bd: Vec<u32>,
    /// 矩形条带; 光栅扫描条带时为空
    pub slices: Vec<RectSlice>,
    /// 每个子图像中的图像级条带序号, 按条带顺序
    pub subpic_slices: Vec<Vec<usize>>,
}

/// 先用显式尺寸, 再重复最后一个显式尺寸, 剩余部分成为最后一项
fn split_ctbs(name: &str, total: u32, explicit_minus1: &[u32]) -> ParseResult<Vec<u32>> {
    let mut sizes = Vec::new();
    let mut remaining = i64::from(total);
    for &v in explicit_minus1 {
        sizes.push(v + 1);
        remaining -= i64::from(v) + 1;
    }
    if remaining < 0 {
        return Err(ParseError::structural(format!(
            "VVC: {name} 之和超出图像尺寸, total={total}, explicit={explicit_minus1:?}"
        )));
    }
    let uniform = explicit_minus1.last().map_or(total, |v| v + 1);
    while remaining >= i64::from(uniform) {
        sizes.push(uniform);
        remaining -= i64::from(uniform);
    }
    if remaining > 0 {
        sizes.push(remaining as u32);
    }
    Ok(sizes)
}

fn boundaries(sizes: &[u32]) -> Vec<u32> {
    let mut bd = Vec::with_capacity(sizes.len() + 1);
    let mut acc = 0;
    bd.push(0);
    for s in sizes {
        acc += s;
        bd.push(acc);
    }
    bd
}

impl PictureLayout {
    /// 单个 tile 覆盖整幅图像
    pub fn single_tile(pic_width_in_ctbs_y: u32, pic_height_in_ctbs_y: u32) -> Self {
        Self::with_tiles(
            pic_width_in_ctbs_y,
            pic_height_in_ctbs_y,
            vec![pic_width_in_ctbs_y],
            vec![pic_height_in_ctbs_y],
        )
    }

    /// 由 pps_tile_column_width_minus1 / pps_tile_row_height_minus1 推导 tile 网格
    pub fn from_explicit(
        pic_width_in_ctbs_y: u32,
        pic_height_in_ctbs_y: u32,
        column_width_minus1: &[u32],
        row_height_minus1: &[u32],
    ) -> ParseResult<Self> {
        let columns = split_ctbs("pps_tile_column_width_minus1", pic_width_in_ctbs_y, column_width_minus1)?;
        let rows = split_ctbs("pps_tile_row_height_minus1", pic_height_in_ctbs_y, row_height_minus1)?;
        Ok(Self::with_tiles(pic_width_in_ctbs_y, pic_height_in_ctbs_y, columns, rows))
    }

    fn with_tiles(width: u32, height: u32, column_widths: Vec<u32>, row_heights: Vec<u32>) -> Self {
        Self {
            pic_width_in_ctbs_y: width,
            pic_height_in_ctbs_y: height,
            col_bd: boundaries(&column_widths),
            row_bd: boundaries(&row_heights),
            column_widths,
            row_heights,
            slices: Vec::new(),
            subpic_slices: Vec::new(),
        }
    }

    pub fn num_tile_columns(&self) -> u32 {
        self.column_widths.len() as u32
    }

    pub fn num_tile_rows(&self) -> u32 {
        self.row_heights.len() as u32
    }

    /// NumTilesInPic
    pub fn num_tiles(&self) -> u32 {
        self.num_tile_columns() * self.num_tile_rows()
    }

    pub fn pic_size_in_ctbs_y(&self) -> u32 {
        self.pic_width_in_ctbs_y * self.pic_height_in_ctbs_y
    }

    /// CtbToTileColBd / CtbToTileRowBd 对应的 tile 列与行
    pub fn tile_of_ctb(&self, ctb_addr: u32) -> (usize, usize) {
        let x = ctb_addr % self.pic_width_in_ctbs_y;
        let y = ctb_addr / self.pic_width_in_ctbs_y;
        let col = self.col_bd.partition_point(|&bd| bd <= x).saturating_sub(1);
        let row = self.row_bd.partition_point(|&bd| bd <= y).saturating_sub(1);
        (col, row)
    }

    /// 把 tile (tile_x, tile_y) 中落在 `clip` 内的 CTU 按光栅顺序追加到 `out`
    fn add_tile(&self, out: &mut Vec<u32>, tile_x: usize, tile_y: usize, clip: Option<&Subpic>) {
        for y in self.row_bd[tile_y]..self.row_bd[tile_y + 1] {
            for x in self.col_bd[tile_x]..self.col_bd[tile_x + 1] {
                if clip.is_none_or(|s| s.contains(x, y)) {
                    out.push(y * self.pic_width_in_ctbs_y + x);
                }
            }
        }
    }

    /// 第 tile_idx 个 tile 的全部 CTU
    pub fn tile_ctbs(&self, tile_idx: u32) -> Vec<u32> {
        let cols = self.num_tile_columns();
        let mut out = Vec::new();
        self.add_tile(&mut out, (tile_idx % cols) as usize, (tile_idx / cols) as usize, None);
        out
    }

    /// 从 tile (tile_x, tile_y) 起覆盖 w x h 个 tile 的矩形条带
    pub(crate) fn push_tile_rect(&mut self, tile_x: u32, tile_y: u32, w: u32, h: u32) -> ParseResult<()> {
        if tile_x + w > self.num_tile_columns() || tile_y + h > self.num_tile_rows() {
            return Err(ParseError::structural(format!(
                "VVC: 条带超出 tile 网格, tile=({tile_x}, {tile_y}), size={w}x{h}"
            )));
        }
        let mut ctb_addrs = Vec::new();
        for j in tile_y..tile_y + h {
            for k in tile_x..tile_x + w {
                self.add_tile(&mut ctb_addrs, k as usize, j as usize, None);
            }
        }
        self.slices.push(RectSlice {
            top_left_tile_idx: tile_y * self.num_tile_columns() + tile_x,
            ctb_addrs,
            subpic_idx: 0,
        });
        Ok(())
    }

    /// tile (tile_x, tile_y) 内从 CTU 行 `ctb_y` 起高 `height` 行的条带
    pub(crate) fn push_tile_rows(&mut self, tile_x: u32, tile_y: u32, ctb_y: u32, height: u32) {
        let mut ctb_addrs = Vec::new();
        let (x0, x1) = (self.col_bd[tile_x as usize], self.col_bd[tile_x as usize + 1]);
        for y in ctb_y..ctb_y + height {
            for x in x0..x1 {
                ctb_addrs.push(y * self.pic_width_in_ctbs_y + x);
            }
        }
        self.slices.push(RectSlice {
            top_left_tile_idx: tile_y * self.num_tile_columns() + tile_x,
            ctb_addrs,
            subpic_idx: 0,
        });
    }

    /// 起始 CTU 行
    pub(crate) fn row_start(&self, tile_y: u32) -> u32 {
        self.row_bd[tile_y as usize]
    }

    /// 每个子图像一个条带
    pub(crate) fn push_subpic_slices(&mut self, subpics: &[Subpic]) {
        for subpic in subpics {
            let mut ctb_addrs = Vec::new();
            for tile_y in 0..self.row_heights.len() {
                for tile_x in 0..self.column_widths.len() {
                    self.add_tile(&mut ctb_addrs, tile_x, tile_y, Some(subpic));
                }
            }
            let top_left = ctb_addrs.first().copied().unwrap_or(0);
            let (col, row) = self.tile_of_ctb(top_left);
            self.slices.push(RectSlice {
                top_left_tile_idx: (row * self.column_widths.len() + col) as u32,
                ctb_addrs,
                subpic_idx: 0,
            });
        }
    }

    /// 按首个 CTU 确定各条带所属子图像, 推导 NumSlicesInSubpic
    pub(crate) fn assign_subpics(&mut self, subpics: &[Subpic]) -> ParseResult<()> {
        self.subpic_slices = vec![Vec::new(); subpics.len().max(1)];
        for (i, slice) in self.slices.iter_mut().enumerate() {
            let first = slice.ctb_addrs.first().copied().unwrap_or(0);
            let x = first % self.pic_width_in_ctbs_y;
            let y = first / self.pic_width_in_ctbs_y;
            let idx = if subpics.is_empty() {
                Some(0)
            } else {
                subpics.iter().position(|s| s.contains(x, y))
            };
            let Some(idx) = idx else {
                return Err(ParseError::structural(format!(
                    "VVC: 条带 {i} 的首个 CTU ({x}, {y}) 不在任何子图像内"
                )));
            };
            slice.subpic_idx = idx;
            self.subpic_slices[idx].push(i);
        }
        Ok(())
    }

    /// NumSlicesInSubpic
    pub fn num_slices_in_subpic(&self, subpic_idx: usize) -> u32 {
        self.subpic_slices.get(subpic_idx).map_or(0, |s| s.len() as u32)
    }

    /// NumEntryPoints: 跨越 tile 边界, 或开启 WPP 时换 CTU 行, 各计一个入口点
    pub fn count_entry_points(&self, ctb_addrs: &[u32], entropy_coding_sync: bool) -> u32 {
        ctb_addrs
            .windows(2)
            .filter(|pair| {
                let (prev, cur) = (pair[0], pair[1]);
                let prev_y = prev / self.pic_width_in_ctbs_y;
                let cur_y = cur / self.pic_width_in_ctbs_y;
                self.tile_of_ctb(prev) != self.tile_of_ctb(cur) || (entropy_coding_sync && prev_y != cur_y)
            })
            .count() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_then_uniform_tile_columns() {
        // 30 列: 显式 4, 之后按 8 重复, 余 2
        let layout = PictureLayout::from_explicit(30, 17, &[3, 7], &[]).expect("tile 划分应合法");
        assert_eq!(layout.column_widths, vec![4, 8, 8, 8, 2]);
        assert_eq!(layout.row_heights, vec![17]);
        assert_eq!(layout.num_tiles(), 5);
        assert_eq!(layout.tile_of_ctb(12), (1, 0));
        assert_eq!(layout.tile_of_ctb(30 + 29), (4, 0));
    }

    #[test]
    fn test_oversized_tile_columns_are_rejected() {
        let err = PictureLayout::from_explicit(10, 4, &[6, 6], &[]).expect_err("列宽之和超出应报错");
        assert!(matches!(err, ParseError::StructuralConstraintViolation(_)), "actual={err:?}");
    }

    #[test]
    fn test_entry_points_for_tiles_and_wavefront() {
        let mut layout = PictureLayout::from_explicit(4, 2, &[1], &[]).expect("tile 划分应合法");
        layout.push_tile_rect(0, 0, 2, 1).expect("条带应在网格内");
        let ctbs = layout.slices[0].ctb_addrs.clone();
        assert_eq!(ctbs, vec![0, 1, 4, 5, 2, 3, 6, 7]);
        assert_eq!(layout.count_entry_points(&ctbs, false), 1);
        assert_eq!(layout.count_entry_points(&ctbs, true), 3);
    }
}
