//! ref_pic_list_modification() 与 ref_pic_list_mvc_modification().

use nalscope_core::{ParseError, ParseResult, ReadOptions, SyntaxReader};

use crate::avc::tables::SliceType;

/// 单个列表最多允许的修改项数
const MAX_MODIFICATIONS: usize = 96;

/// 一个 modification_of_pic_nums_idc 操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefPicListModOp {
    /// idc=0
    ShortTermSub { abs_diff_pic_num_minus1: u32 },
    /// idc=1
    ShortTermAdd { abs_diff_pic_num_minus1: u32 },
    /// idc=2
    LongTerm { long_term_pic_num: u32 },
    /// idc=4, 仅 MVC
    ViewIdxSub { abs_diff_view_idx_minus1: u32 },
    /// idc=5, 仅 MVC
    ViewIdxAdd { abs_diff_view_idx_minus1: u32 },
}

/// 两个参考列表的修改操作, 对应 flag 为 0 时为 `None`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RefPicListModification {
    pub l0: Option<Vec<RefPicListModOp>>,
    pub l1: Option<Vec<RefPicListModOp>>,
}

impl RefPicListModification {
    /// `mvc` 为 true 时按 ref_pic_list_mvc_modification() 解析 (NAL 类型 20/21)
    pub(crate) fn parse(
        r: &mut SyntaxReader<'_>,
        slice_type: SliceType,
        mvc: bool,
        max_pic_num: u32,
    ) -> ParseResult<Self> {
        let name = if mvc {
            "ref_pic_list_mvc_modification()"
        } else {
            "ref_pic_list_modification()"
        };
        r.sub_level(name, |r| {
            let mut out = Self::default();
            if slice_type.is_intra() {
                return Ok(out);
            }
            if r.flag("ref_pic_list_modification_flag_l0")? {
                out.l0 = Some(parse_list(r, "l0", mvc, max_pic_num)?);
            }
            if slice_type == SliceType::B && r.flag("ref_pic_list_modification_flag_l1")? {
                out.l1 = Some(parse_list(r, "l1", mvc, max_pic_num)?);
            }
            Ok(out)
        })
    }
}

fn parse_list(
    r: &mut SyntaxReader<'_>,
    list: &str,
    mvc: bool,
    max_pic_num: u32,
) -> ParseResult<Vec<RefPicListModOp>> {
    let max_idc = if mvc { 5 } else { 3 };
    let mut ops = Vec::new();
    loop {
        let idc = r.read_ue(
            "modification_of_pic_nums_idc",
            ReadOptions::new().check_range(0, max_idc),
        )?;
        let op = match idc {
            0 | 1 => {
                let abs_diff_pic_num_minus1 = r.read_ue(
                    "abs_diff_pic_num_minus1",
                    ReadOptions::new().check_range(0, i64::from(max_pic_num) - 1),
                )?;
                if idc == 0 {
                    RefPicListModOp::ShortTermSub {
                        abs_diff_pic_num_minus1,
                    }
                } else {
                    RefPicListModOp::ShortTermAdd {
                        abs_diff_pic_num_minus1,
                    }
                }
            }
            2 => RefPicListModOp::LongTerm {
                long_term_pic_num: r.ue("long_term_pic_num")?,
            },
            3 => break,
            _ => {
                let abs_diff_view_idx_minus1 = r.ue("abs_diff_view_idx_minus1")?;
                if idc == 4 {
                    RefPicListModOp::ViewIdxSub {
                        abs_diff_view_idx_minus1,
                    }
                } else {
                    RefPicListModOp::ViewIdxAdd {
                        abs_diff_view_idx_minus1,
                    }
                }
            }
        };
        ops.push(op);
        if ops.len() > MAX_MODIFICATIONS {
            return Err(ParseError::constraint(format!(
                "AVC: ref_pic_list_modification_{list} 项数过多, max={MAX_MODIFICATIONS}"
            )));
        }
    }
    Ok(ops)
}
