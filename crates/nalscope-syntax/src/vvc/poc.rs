//! VVC 图像顺序计数 (8.3.1).
//!
//! 与 HEVC 相同, 跨图像状态是 prevTid0Pic 的 ph_pic_order_cnt_lsb / PicOrderCntMsb
//! 和全局 POC 计数; 区别在于 ph_poc_msb_cycle_val 可以直接给出 MSB,
//! 并且 ph_non_ref_pic_flag=1 的图像不作为 prevTid0Pic.

use super::nal::NalUnitType;

/// 推导 POC 所需的图像头与 NAL 字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PocInput {
    pub nal_unit_type: NalUnitType,
    pub temporal_id: u32,
    pub ph_non_ref_pic_flag: bool,
    pub ph_pic_order_cnt_lsb: u32,
    pub ph_poc_msb_cycle_val: Option<u32>,
    /// 码流中的首幅图像, 或紧随 EOS 之后的首幅图像
    pub first_picture_in_sequence: bool,
}

impl PocInput {
    /// NoOutputBeforeRecoveryFlag: IDR 与序列首幅图像为 1
    pub fn no_output_before_recovery_flag(&self) -> bool {
        self.nal_unit_type.is_idr() || self.first_picture_in_sequence
    }

    /// CLVSS 图像: NoOutputBeforeRecoveryFlag=1 的 IRAP 或 GDR 图像
    pub fn is_clvss(&self) -> bool {
        let t = self.nal_unit_type;
        (t.is_irap() || t == NalUnitType::GdrNut) && self.no_output_before_recovery_flag()
    }

    /// 当前图像能否作为后续图像的 prevTid0Pic
    pub fn is_tid0_anchor(&self) -> bool {
        let t = self.nal_unit_type;
        self.temporal_id == 0
            && !self.ph_non_ref_pic_flag
            && t != NalUnitType::RaslNut
            && t != NalUnitType::RadlNut
    }
}

/// 当前图像的 POC 推导结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PicOrderCount {
    pub no_output_before_recovery_flag: bool,
    pub prev_pic_order_cnt_lsb: u32,
    pub prev_pic_order_cnt_msb: i64,
    pub pic_order_cnt_msb: i64,
    /// PicOrderCntVal (8-3)
    pub pic_order_cnt_val: i64,
    /// 跨 CLVS 单调的全局 POC
    pub global: i64,
}

/// 传递给下一图像的 POC 状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PocState {
    pub prev_tid0_pic_order_cnt_lsb: u32,
    pub prev_tid0_pic_order_cnt_msb: i64,
    pub global_offset: i64,
    /// 自上一个偏移推进以来的最大全局 POC, 尚无时为 -1
    pub global_max: i64,
}

impl Default for PocState {
    fn default() -> Self {
        Self {
            prev_tid0_pic_order_cnt_lsb: 0,
            prev_tid0_pic_order_cnt_msb: 0,
            global_offset: 0,
            global_max: -1,
        }
    }
}

impl PocState {
    pub fn advance(&self, input: &PocInput, poc: &PicOrderCount) -> Self {
        let mut next = *self;
        let reset = input.is_clvss();
        if reset && self.global_max > 0 {
            next.global_offset = self.global_max + 1;
            next.global_max = -1;
        }
        if !reset && poc.global > next.global_max {
            next.global_max = poc.global;
        }
        if input.is_tid0_anchor() {
            next.prev_tid0_pic_order_cnt_lsb = input.ph_pic_order_cnt_lsb;
            next.prev_tid0_pic_order_cnt_msb = poc.pic_order_cnt_msb;
        }
        next
    }
}

pub fn derive_poc(max_pic_order_cnt_lsb: u32, input: &PocInput, prev: &PocState) -> PicOrderCount {
    let clvss = input.is_clvss();
    let max_lsb = i64::from(max_pic_order_cnt_lsb);
    let lsb = i64::from(input.ph_pic_order_cnt_lsb);
    let (prev_lsb, prev_msb) = if clvss {
        (0, 0)
    } else {
        (prev.prev_tid0_pic_order_cnt_lsb, prev.prev_tid0_pic_order_cnt_msb)
    };
    let prev_lsb_i = i64::from(prev_lsb);

    // (8-2)
    let msb = if let Some(cycle) = input.ph_poc_msb_cycle_val {
        i64::from(cycle) * max_lsb
    } else if clvss {
        0
    } else if lsb < prev_lsb_i && prev_lsb_i - lsb >= max_lsb / 2 {
        prev_msb + max_lsb
    } else if lsb > prev_lsb_i && lsb - prev_lsb_i > max_lsb / 2 {
        prev_msb - max_lsb
    } else {
        prev_msb
    };
    let pic_order_cnt_val = msb + lsb;

    let offset = if clvss && prev.global_max > 0 {
        prev.global_max + 1
    } else {
        prev.global_offset
    };

    PicOrderCount {
        no_output_before_recovery_flag: input.no_output_before_recovery_flag(),
        prev_pic_order_cnt_lsb: prev_lsb,
        prev_pic_order_cnt_msb: prev_msb,
        pic_order_cnt_msb: msb,
        pic_order_cnt_val,
        global: offset + pic_order_cnt_val,
    }
}
