//! HEVC 图像顺序计数 (8.3.1).
//!
//! 跨图像的状态只有 prevTid0Pic 的 slice_pic_order_cnt_lsb / PicOrderCntMsb 与全局 POC
//! 计数, 以值类型 [`PocState`] 由解析器保存并在每幅图像的首个条带后更新.
//!
//! 全局 POC: 每遇到 NoRaslOutputFlag=1 的 IRAP 图像, 偏移推进到此前出现过的最大值 + 1,
//! 使拼接流中的 POC 单调.

use super::nal::NalUnitType;

/// 推导 POC 所需的条带字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PocInput {
    pub nal_unit_type: NalUnitType,
    pub temporal_id: u32,
    pub slice_pic_order_cnt_lsb: u32,
    /// 码流中的首幅图像, 或紧随 EOS 之后的首幅图像
    pub first_picture_in_sequence: bool,
}

impl PocInput {
    /// NoRaslOutputFlag: IDR、BLA、序列首幅图像为 1
    pub fn no_rasl_output_flag(&self) -> bool {
        self.nal_unit_type.is_idr() || self.nal_unit_type.is_bla() || self.first_picture_in_sequence
    }

    /// 当前图像能否作为后续图像的 prevTid0Pic
    pub fn is_tid0_anchor(&self) -> bool {
        let t = self.nal_unit_type;
        self.temporal_id == 0 && !t.is_rasl() && !t.is_radl() && !t.is_slnr()
    }
}

/// 当前图像的 POC 推导结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PicOrderCount {
    pub no_rasl_output_flag: bool,
    pub prev_pic_order_cnt_lsb: u32,
    pub prev_pic_order_cnt_msb: i64,
    pub pic_order_cnt_msb: i64,
    /// PicOrderCntVal (8-2)
    pub pic_order_cnt_val: i64,
    /// 跨 IRAP 单调的全局 POC
    pub global: i64,
}

/// 传递给下一图像的 POC 状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PocState {
    pub prev_tid0_pic_order_cnt_lsb: u32,
    pub prev_tid0_pic_order_cnt_msb: i64,
    /// 当前全局偏移
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
    /// 由当前图像的推导结果得到下一图像使用的状态
    pub fn advance(&self, input: &PocInput, poc: &PicOrderCount) -> Self {
        let mut next = *self;
        let irap_reset = input.nal_unit_type.is_irap() && poc.no_rasl_output_flag;
        if irap_reset && self.global_max > 0 {
            next.global_offset = self.global_max + 1;
            next.global_max = -1;
        }
        if !irap_reset && poc.global > next.global_max {
            next.global_max = poc.global;
        }
        if input.is_tid0_anchor() {
            next.prev_tid0_pic_order_cnt_lsb = input.slice_pic_order_cnt_lsb;
            next.prev_tid0_pic_order_cnt_msb = poc.pic_order_cnt_msb;
        }
        next
    }
}

/// 推导当前图像的 POC, `max_pic_order_cnt_lsb` 取自生效的 SPS
pub fn derive_poc(max_pic_order_cnt_lsb: u32, input: &PocInput, prev: &PocState) -> PicOrderCount {
    let no_rasl_output_flag = input.no_rasl_output_flag();
    let irap_reset = input.nal_unit_type.is_irap() && no_rasl_output_flag;

    let (prev_lsb, prev_msb) = if irap_reset {
        (0, 0)
    } else {
        (prev.prev_tid0_pic_order_cnt_lsb, prev.prev_tid0_pic_order_cnt_msb)
    };

    let max_lsb = i64::from(max_pic_order_cnt_lsb);
    let lsb = i64::from(input.slice_pic_order_cnt_lsb);
    let prev_lsb_i = i64::from(prev_lsb);
    // (8-1)
    let msb = if irap_reset {
        0
    } else if lsb < prev_lsb_i && prev_lsb_i - lsb >= max_lsb / 2 {
        prev_msb + max_lsb
    } else if lsb > prev_lsb_i && lsb - prev_lsb_i > max_lsb / 2 {
        prev_msb - max_lsb
    } else {
        prev_msb
    };
    let pic_order_cnt_val = msb + lsb;

    let offset = if irap_reset && prev.global_max > 0 {
        prev.global_max + 1
    } else {
        prev.global_offset
    };

    PicOrderCount {
        no_rasl_output_flag,
        prev_pic_order_cnt_lsb: prev_lsb,
        prev_pic_order_cnt_msb: prev_msb,
        pic_order_cnt_msb: msb,
        pic_order_cnt_val,
        global: offset + pic_order_cnt_val,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(nal_unit_type: NalUnitType, tid: u32, lsb: u32) -> PocInput {
        PocInput {
            nal_unit_type,
            temporal_id: tid,
            slice_pic_order_cnt_lsb: lsb,
            first_picture_in_sequence: false,
        }
    }

    /// 依次推导并推进状态, 返回各图像的 (PicOrderCntVal, 全局 POC)
    fn run(max_lsb: u32, pictures: &[PocInput]) -> Vec<(i64, i64)> {
        let mut state = PocState::default();
        pictures
            .iter()
            .map(|p| {
                let poc = derive_poc(max_lsb, p, &state);
                state = state.advance(p, &poc);
                (poc.pic_order_cnt_val, poc.global)
            })
            .collect()
    }

    #[test]
    fn test_poc_msb_wraps_forward() {
        let pics = [
            input(NalUnitType::IdrWRadl, 0, 0),
            input(NalUnitType::TrailR, 0, 8),
            input(NalUnitType::TrailR, 0, 14),
            input(NalUnitType::TrailR, 0, 4),
        ];
        let pocs: Vec<i64> = run(16, &pics).into_iter().map(|p| p.0).collect();
        assert_eq!(pocs, vec![0, 8, 14, 20], "lsb 回绕后 MSB 应加 MaxPicOrderCntLsb");
    }

    #[test]
    fn test_poc_msb_wraps_backward() {
        let mut state = PocState {
            prev_tid0_pic_order_cnt_lsb: 2,
            prev_tid0_pic_order_cnt_msb: 16,
            ..Default::default()
        };
        let p = input(NalUnitType::TrailR, 0, 14);
        let poc = derive_poc(16, &p, &state);
        assert_eq!(poc.pic_order_cnt_msb, 0);
        assert_eq!(poc.pic_order_cnt_val, 14);
        state = state.advance(&p, &poc);
        assert_eq!(state.prev_tid0_pic_order_cnt_msb, 0);
    }

    #[test]
    fn test_poc_prev_tid0_skips_higher_sub_layers_and_leading_pictures() {
        let mut state = PocState::default();
        let idr = input(NalUnitType::IdrNLp, 0, 0);
        let poc = derive_poc(16, &idr, &state);
        state = state.advance(&idr, &poc);

        for skipped in [
            input(NalUnitType::TrailR, 1, 6),
            input(NalUnitType::RaslR, 0, 12),
            input(NalUnitType::RadlN, 0, 10),
            input(NalUnitType::TrailN, 0, 3),
        ] {
            let poc = derive_poc(16, &skipped, &state);
            state = state.advance(&skipped, &poc);
            assert_eq!(
                state.prev_tid0_pic_order_cnt_lsb, 0,
                "{:?} 不应成为 prevTid0Pic",
                skipped.nal_unit_type
            );
        }
    }

    #[test]
    fn test_poc_cra_first_in_stream_resets_msb() {
        let mut cra = input(NalUnitType::CraNut, 0, 9);
        cra.first_picture_in_sequence = true;
        let state = PocState {
            prev_tid0_pic_order_cnt_lsb: 3,
            prev_tid0_pic_order_cnt_msb: 64,
            ..Default::default()
        };
        let poc = derive_poc(16, &cra, &state);
        assert!(poc.no_rasl_output_flag);
        assert_eq!(poc.pic_order_cnt_msb, 0);
        assert_eq!(poc.pic_order_cnt_val, 9);

        cra.first_picture_in_sequence = false;
        let poc = derive_poc(16, &cra, &state);
        assert!(!poc.no_rasl_output_flag, "流中间的 CRA 不重置");
        assert_eq!(poc.pic_order_cnt_msb, 64);
    }

    #[test]
    fn test_poc_global_offset_advances_at_idr() {
        let pics = [
            input(NalUnitType::IdrWRadl, 0, 0),
            input(NalUnitType::TrailR, 0, 4),
            input(NalUnitType::TrailR, 0, 2),
            input(NalUnitType::IdrWRadl, 0, 0),
            input(NalUnitType::TrailR, 0, 1),
        ];
        let globals: Vec<i64> = run(256, &pics).into_iter().map(|p| p.1).collect();
        assert_eq!(globals, vec![0, 4, 2, 5, 6], "第二个 IDR 应从最大值 + 1 开始");
    }
}
