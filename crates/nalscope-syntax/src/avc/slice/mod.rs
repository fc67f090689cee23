//! AVC 条带头及其子结构.

pub mod header;
pub mod marking;
pub mod pred_weight;
pub mod ref_pic_list;

pub use header::{DeblockingFilter, SliceHeader};
pub use marking::{DecRefPicMarking, MmcoOp};
pub use pred_weight::{PredWeight, PredWeightTable};
pub use ref_pic_list::{RefPicListModOp, RefPicListModification};

use super::sps::Sps;

/// 由 SPS 与 field_pic_flag 得到的条带级推导变量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SliceDecodingContext {
    pub mbaff_frame_flag: bool,
    pub pic_height_in_mbs: u32,
    pub pic_size_in_mbs: u32,
    pub max_pic_num: u32,
}

impl SliceDecodingContext {
    pub fn new(sps: &Sps, field_pic_flag: bool) -> Self {
        let d = &sps.derived;
        let pic_height_in_mbs = if field_pic_flag {
            d.frame_height_in_mbs / 2
        } else {
            d.frame_height_in_mbs
        };
        Self {
            mbaff_frame_flag: sps.mb_adaptive_frame_field_flag && !field_pic_flag,
            pic_height_in_mbs,
            pic_size_in_mbs: d.pic_width_in_mbs * pic_height_in_mbs,
            max_pic_num: if field_pic_flag {
                2 * d.max_frame_num
            } else {
                d.max_frame_num
            },
        }
    }
}
