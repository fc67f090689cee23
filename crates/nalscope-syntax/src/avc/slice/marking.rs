//! dec_ref_pic_marking() (7.3.3.3).

use nalscope_core::{ParseError, ParseResult, ReadOptions, SyntaxReader};

const MAX_MMCO_OPS: usize = 64;

/// memory_management_control_operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmcoOp {
    /// 1: 短期参考标记为不用于参考
    ForgetShort { difference_of_pic_nums_minus1: u32 },
    /// 2: 长期参考标记为不用于参考
    ForgetLong { long_term_pic_num: u32 },
    /// 3: 短期参考转为长期参考
    ConvertShortToLong {
        difference_of_pic_nums_minus1: u32,
        long_term_frame_idx: u32,
    },
    /// 4: 设置最大长期帧索引
    TrimLong { max_long_term_frame_idx_plus1: u32 },
    /// 5: 清空所有参考
    ClearAll,
    /// 6: 当前图像标记为长期参考
    MarkCurrentLong { long_term_frame_idx: u32 },
}

impl MmcoOp {
    pub fn code(self) -> u32 {
        match self {
            Self::ForgetShort { .. } => 1,
            Self::ForgetLong { .. } => 2,
            Self::ConvertShortToLong { .. } => 3,
            Self::TrimLong { .. } => 4,
            Self::ClearAll => 5,
            Self::MarkCurrentLong { .. } => 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecRefPicMarking {
    Idr {
        no_output_of_prior_pics_flag: bool,
        long_term_reference_flag: bool,
    },
    /// adaptive_ref_pic_marking_mode_flag=0
    SlidingWindow,
    Adaptive(Vec<MmcoOp>),
}

impl DecRefPicMarking {
    /// 是否包含 MMCO 5
    pub fn has_mmco5(&self) -> bool {
        matches!(self, Self::Adaptive(ops) if ops.contains(&MmcoOp::ClearAll))
    }

    pub(crate) fn parse(
        r: &mut SyntaxReader<'_>,
        idr: bool,
        max_pic_num: u32,
        max_num_ref_frames: u32,
    ) -> ParseResult<Self> {
        r.sub_level("dec_ref_pic_marking()", |r| {
            if idr {
                return Ok(Self::Idr {
                    no_output_of_prior_pics_flag: r.flag("no_output_of_prior_pics_flag")?,
                    long_term_reference_flag: r.flag("long_term_reference_flag")?,
                });
            }
            if !r.flag("adaptive_ref_pic_marking_mode_flag")? {
                return Ok(Self::SlidingWindow);
            }

            let diff_range =
                ReadOptions::new().check_range(0, i64::from(max_pic_num) - 1);
            let idx_range =
                ReadOptions::new().check_range(0, i64::from(max_num_ref_frames.max(1)) - 1);
            let mut ops = Vec::new();
            loop {
                let op = r.read_ue(
                    "memory_management_control_operation",
                    ReadOptions::new().check_range(0, 6),
                )?;
                let parsed = match op {
                    0 => break,
                    1 => MmcoOp::ForgetShort {
                        difference_of_pic_nums_minus1: r
                            .read_ue("difference_of_pic_nums_minus1", diff_range.clone())?,
                    },
                    2 => MmcoOp::ForgetLong {
                        long_term_pic_num: r.ue("long_term_pic_num")?,
                    },
                    3 => MmcoOp::ConvertShortToLong {
                        difference_of_pic_nums_minus1: r
                            .read_ue("difference_of_pic_nums_minus1", diff_range.clone())?,
                        long_term_frame_idx: r
                            .read_ue("long_term_frame_idx", idx_range.clone())?,
                    },
                    4 => MmcoOp::TrimLong {
                        max_long_term_frame_idx_plus1: r.read_ue(
                            "max_long_term_frame_idx_plus1",
                            ReadOptions::new().check_range(0, i64::from(max_num_ref_frames)),
                        )?,
                    },
                    5 => MmcoOp::ClearAll,
                    _ => MmcoOp::MarkCurrentLong {
                        long_term_frame_idx: r
                            .read_ue("long_term_frame_idx", idx_range.clone())?,
                    },
                };
                if ops.len() >= MAX_MMCO_OPS {
                    return Err(ParseError::constraint(format!(
                        "AVC: memory_management_control_operation 数量过多, max={MAX_MMCO_OPS}"
                    )));
                }
                ops.push(parsed);
            }
            Ok(Self::Adaptive(ops))
        })
    }
}
