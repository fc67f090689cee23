//! 图像顺序计数 (8.2.1) 与跨图像的 POC 状态.
//!
//! 上一图像的状态以值类型 [`PocState`] 由调用方逐片传入, 本模块不保存任何
//! 跨条带的可变状态.
//!
//! 除标准的 TopFieldOrderCnt / BottomFieldOrderCnt 外, 还维护一个在 IDR 处
//! 单调递增的全局 POC: 每遇到 IDR, 基线推进到此前出现过的最大值 + 2.

use log::warn;

use super::sps::{PicOrderCntInfo, Sps};
use super::tables::SliceType;

/// 计算当前条带 POC 所需的条带头字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PocInput {
    pub idr: bool,
    pub slice_type: SliceType,
    pub nal_ref_idc: u32,
    pub first_mb_in_slice: u32,
    pub frame_num: u32,
    pub field_pic_flag: bool,
    pub bottom_field_flag: bool,
    pub pic_order_cnt_lsb: u32,
    pub delta_pic_order_cnt_bottom: i32,
    pub delta_pic_order_cnt: [i32; 2],
    /// 当前图像的 dec_ref_pic_marking 是否含 MMCO 5
    pub has_mmco5: bool,
}

/// 全局 POC 三元组
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GlobalPoc {
    pub value: i64,
    /// 到目前为止出现过的最大值
    pub highest: i64,
    /// 最近一个 IDR 的基线
    pub last_idr: i64,
}

/// 条带的 POC 推导结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PicOrderCount {
    pub prev_pic_order_cnt_msb: i64,
    pub prev_pic_order_cnt_lsb: u32,
    /// 仅 pic_order_cnt_type=0
    pub pic_order_cnt_msb: i64,
    /// 仅 pic_order_cnt_type=1/2
    pub frame_num_offset: i64,
    pub top_field_order_cnt: i64,
    pub bottom_field_order_cnt: i64,
    pub global: GlobalPoc,
}

impl PicOrderCount {
    /// PicOrderCnt(CurrPic): 帧取两场较小值, 场取各自的计数
    pub fn pic_order_cnt(&self, input: &PocInput) -> i64 {
        match (input.field_pic_flag, input.bottom_field_flag) {
            (false, _) => self.top_field_order_cnt.min(self.bottom_field_order_cnt),
            (true, false) => self.top_field_order_cnt,
            (true, true) => self.bottom_field_order_cnt,
        }
    }
}

/// 非致命的 POC 诊断
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PocDiagnostic {
    /// 非 IDR、非帧内图像之前没有任何可用的 POC 状态, POC 字段置 0
    MissingPocContext,
}

impl std::fmt::Display for PocDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingPocContext => {
                write!(f, "MissingPOCContext: 非 IDR/非帧内图像之前没有 POC 状态")
            }
        }
    }
}

/// 传递给下一图像的 POC 状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PocState {
    pub frame_num: u32,
    pub pic_order_cnt_msb: i64,
    pub pic_order_cnt_lsb: u32,
    pub prev_pic_order_cnt_msb: i64,
    pub prev_pic_order_cnt_lsb: u32,
    pub has_mmco5: bool,
    pub top_field_order_cnt: i64,
    pub bottom_field_flag: bool,
    pub frame_num_offset: i64,
    pub global: GlobalPoc,
}

impl PocState {
    /// 由当前条带的输入与推导结果构造状态
    ///
    /// 含 MMCO 5 的图像在解码后 TopFieldOrderCnt 减去 tempPicOrderCnt (8.2.1).
    pub fn new(input: &PocInput, poc: &PicOrderCount) -> Self {
        let top = if input.has_mmco5 {
            let temp = poc.pic_order_cnt(input);
            poc.top_field_order_cnt - temp
        } else {
            poc.top_field_order_cnt
        };
        Self {
            frame_num: input.frame_num,
            pic_order_cnt_msb: poc.pic_order_cnt_msb,
            pic_order_cnt_lsb: input.pic_order_cnt_lsb,
            prev_pic_order_cnt_msb: poc.prev_pic_order_cnt_msb,
            prev_pic_order_cnt_lsb: poc.prev_pic_order_cnt_lsb,
            has_mmco5: input.has_mmco5,
            top_field_order_cnt: top,
            bottom_field_flag: input.bottom_field_flag,
            frame_num_offset: poc.frame_num_offset,
            global: poc.global,
        }
    }
}

/// 推导当前条带的 POC
///
/// `prev` 为 `None` 且当前图像既非 IDR 也非帧内时返回 `MissingPocContext`,
/// 此时所有 POC 字段为 0.
pub fn derive_poc(
    sps: &Sps,
    input: &PocInput,
    prev: Option<&PocState>,
) -> (PicOrderCount, Option<PocDiagnostic>) {
    if prev.is_none() && !input.idr && !input.slice_type.is_intra() {
        warn!(
            "AVC: MissingPOCContext, frame_num={}, slice_type={}",
            input.frame_num,
            input.slice_type.as_str()
        );
        return (
            PicOrderCount::default(),
            Some(PocDiagnostic::MissingPocContext),
        );
    }

    let mut poc = match &sps.pic_order_cnt {
        PicOrderCntInfo::Type0 { .. } => {
            derive_type0(i64::from(sps.derived.max_pic_order_cnt_lsb), input, prev)
        }
        PicOrderCntInfo::Type1 {
            offset_for_non_ref_pic,
            offset_for_top_to_bottom_field,
            offset_for_ref_frame,
            ..
        } => {
            let frame_num_offset = frame_num_offset(sps, input, prev);
            let expected = expected_pic_order_cnt(
                sps,
                input,
                frame_num_offset,
                offset_for_ref_frame,
                i64::from(*offset_for_non_ref_pic),
            );
            let top_to_bottom = i64::from(*offset_for_top_to_bottom_field);
            let d0 = i64::from(input.delta_pic_order_cnt[0]);
            let d1 = i64::from(input.delta_pic_order_cnt[1]);
            let (top, bottom) = match (input.field_pic_flag, input.bottom_field_flag) {
                (false, _) => {
                    let top = expected + d0;
                    (top, top + top_to_bottom + d1)
                }
                (true, false) => (expected + d0, 0),
                (true, true) => (0, expected + top_to_bottom + d0),
            };
            PicOrderCount {
                frame_num_offset,
                top_field_order_cnt: top,
                bottom_field_order_cnt: bottom,
                ..Default::default()
            }
        }
        PicOrderCntInfo::Type2 => {
            let frame_num_offset = frame_num_offset(sps, input, prev);
            let temp = if input.idr {
                0
            } else if input.nal_ref_idc == 0 {
                2 * (frame_num_offset + i64::from(input.frame_num)) - 1
            } else {
                2 * (frame_num_offset + i64::from(input.frame_num))
            };
            let (top, bottom) = match (input.field_pic_flag, input.bottom_field_flag) {
                (false, _) => (temp, temp),
                (true, false) => (temp, 0),
                (true, true) => (0, temp),
            };
            PicOrderCount {
                frame_num_offset,
                top_field_order_cnt: top,
                bottom_field_order_cnt: bottom,
                ..Default::default()
            }
        }
    };

    poc.global = derive_global(input, &poc, prev);
    (poc, None)
}

fn derive_type0(max_lsb: i64, input: &PocInput, prev: Option<&PocState>) -> PicOrderCount {
    let (prev_msb, prev_lsb) = match prev {
        _ if input.idr => (0, 0),
        None => (0, 0),
        Some(p) if input.first_mb_in_slice != 0 => {
            (p.prev_pic_order_cnt_msb, p.prev_pic_order_cnt_lsb)
        }
        Some(p) if p.has_mmco5 => {
            let lsb = if p.bottom_field_flag {
                0
            } else {
                u32::try_from(p.top_field_order_cnt).unwrap_or(0)
            };
            (0, lsb)
        }
        Some(p) => (p.pic_order_cnt_msb, p.pic_order_cnt_lsb),
    };

    let lsb = i64::from(input.pic_order_cnt_lsb);
    let prev_lsb_i = i64::from(prev_lsb);
    let msb = if lsb < prev_lsb_i && prev_lsb_i - lsb >= max_lsb / 2 {
        prev_msb + max_lsb
    } else if lsb > prev_lsb_i && lsb - prev_lsb_i > max_lsb / 2 {
        prev_msb - max_lsb
    } else {
        prev_msb
    };

    let (top, bottom) = match (input.field_pic_flag, input.bottom_field_flag) {
        (false, _) => {
            let top = msb + lsb;
            (top, top + i64::from(input.delta_pic_order_cnt_bottom))
        }
        (true, false) => (msb + lsb, 0),
        (true, true) => (0, msb + lsb),
    };

    PicOrderCount {
        prev_pic_order_cnt_msb: prev_msb,
        prev_pic_order_cnt_lsb: prev_lsb,
        pic_order_cnt_msb: msb,
        top_field_order_cnt: top,
        bottom_field_order_cnt: bottom,
        ..Default::default()
    }
}

/// FrameNumOffset (类型 1/2)
fn frame_num_offset(sps: &Sps, input: &PocInput, prev: Option<&PocState>) -> i64 {
    if input.idr {
        return 0;
    }
    let Some(p) = prev else {
        // 首个图像为帧内图像时 prevFrameNumOffset 取 0
        return 0;
    };
    let prev_offset = if p.has_mmco5 { 0 } else { p.frame_num_offset };
    if p.frame_num > input.frame_num {
        prev_offset + i64::from(sps.derived.max_frame_num)
    } else {
        prev_offset
    }
}

/// expectedPicOrderCnt (类型 1)
fn expected_pic_order_cnt(
    sps: &Sps,
    input: &PocInput,
    frame_num_offset: i64,
    offset_for_ref_frame: &[i32],
    offset_for_non_ref_pic: i64,
) -> i64 {
    let cycle_len = offset_for_ref_frame.len() as i64;
    let mut abs_frame_num = if cycle_len != 0 {
        frame_num_offset + i64::from(input.frame_num)
    } else {
        0
    };
    if input.nal_ref_idc == 0 && abs_frame_num > 0 {
        abs_frame_num -= 1;
    }

    let mut expected = 0;
    if abs_frame_num > 0 {
        let cycle_cnt = (abs_frame_num - 1) / cycle_len;
        let in_cycle = ((abs_frame_num - 1) % cycle_len) as usize;
        expected = cycle_cnt * sps.derived.expected_delta_per_pic_order_cnt_cycle;
        expected += offset_for_ref_frame[..=in_cycle]
            .iter()
            .map(|&v| i64::from(v))
            .sum::<i64>();
    }
    if input.nal_ref_idc == 0 {
        expected += offset_for_non_ref_pic;
    }
    expected
}

fn derive_global(input: &PocInput, poc: &PicOrderCount, prev: Option<&PocState>) -> GlobalPoc {
    let local = if input.field_pic_flag && input.bottom_field_flag {
        poc.bottom_field_order_cnt
    } else {
        poc.top_field_order_cnt
    };

    match prev {
        None if input.idr || input.slice_type.is_intra() => GlobalPoc {
            value: local,
            highest: local,
            last_idr: 0,
        },
        None => GlobalPoc::default(),
        Some(p) if input.first_mb_in_slice != 0 => p.global,
        Some(p) if input.idr => {
            let value = p.global.highest + 2;
            GlobalPoc {
                value,
                highest: value,
                last_idr: value,
            }
        }
        Some(p) => {
            let value = p.global.last_idr + local;
            GlobalPoc {
                value,
                highest: p.global.highest.max(value),
                last_idr: p.global.last_idr,
            }
        }
    }
}
