//! HEVC 短期参考图像集 st_ref_pic_set() (7.3.7, 7.4.8).
//!
//! 帧间 RPS 预测引用同一 SPS 中下标更小的 RPS, 已解析的集合由调用方按顺序传入.

use nalscope_core::{ParseError, ParseResult, ReadOptions, SyntaxReader};

/// 单个短期 RPS, 保存推导后的 DeltaPocS0/S1 与 UsedByCurrPicS0/S1
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShortTermRps {
    pub inter_ref_pic_set_prediction_flag: bool,
    /// 帧间预测时的 RefRpsIdx
    pub ref_rps_idx: Option<usize>,
    /// 帧间预测时的 deltaRps
    pub delta_rps: Option<i32>,
    /// 负方向, 按 POC 距离由近到远
    pub delta_poc_s0: Vec<i32>,
    pub used_by_curr_pic_s0: Vec<bool>,
    /// 正方向, 按 POC 距离由近到远
    pub delta_poc_s1: Vec<i32>,
    pub used_by_curr_pic_s1: Vec<bool>,
}

impl ShortTermRps {
    pub fn num_negative_pics(&self) -> usize {
        self.delta_poc_s0.len()
    }

    pub fn num_positive_pics(&self) -> usize {
        self.delta_poc_s1.len()
    }

    /// NumDeltaPocs (7-71)
    pub fn num_delta_pocs(&self) -> usize {
        self.num_negative_pics() + self.num_positive_pics()
    }

    /// 被当前图像使用的短期参考图像个数
    pub fn num_used_by_curr(&self) -> usize {
        self.used_by_curr_pic_s0
            .iter()
            .chain(&self.used_by_curr_pic_s1)
            .filter(|u| **u)
            .count()
    }

    /// 解析第 `st_rps_idx` 个 st_ref_pic_set()
    ///
    /// `previous` 为同一 SPS 中已解析的集合 (下标 0..st_rps_idx).
    /// `max_dec_pic_buffering_minus1` 为最高子层的 sps_max_dec_pic_buffering_minus1.
    pub fn parse(
        r: &mut SyntaxReader<'_>,
        st_rps_idx: usize,
        num_short_term_ref_pic_sets: usize,
        previous: &[ShortTermRps],
        max_dec_pic_buffering_minus1: u32,
    ) -> ParseResult<Self> {
        r.sub_level("st_ref_pic_set()", |r| {
            let inter = st_rps_idx != 0 && r.flag("inter_ref_pic_set_prediction_flag")?;
            let rps = if inter {
                Self::parse_predicted(r, st_rps_idx, num_short_term_ref_pic_sets, previous)?
            } else {
                Self::parse_explicit(r, max_dec_pic_buffering_minus1)?
            };

            if rps.num_delta_pocs() > max_dec_pic_buffering_minus1 as usize {
                return Err(ParseError::constraint(format!(
                    "HEVC: st_ref_pic_set({st_rps_idx}) 的 NumDeltaPocs 超出 sps_max_dec_pic_buffering_minus1, NumDeltaPocs={}, max={}",
                    rps.num_delta_pocs(),
                    max_dec_pic_buffering_minus1
                )));
            }
            r.log_calculated(&format!("NumNegativePics[{st_rps_idx}]"), rps.num_negative_pics());
            r.log_calculated(&format!("NumPositivePics[{st_rps_idx}]"), rps.num_positive_pics());
            Ok(rps)
        })
    }

    fn parse_explicit(r: &mut SyntaxReader<'_>, max_dec_pic_buffering_minus1: u32) -> ParseResult<Self> {
        let max = i64::from(max_dec_pic_buffering_minus1);
        let num_negative_pics =
            r.read_ue("num_negative_pics", ReadOptions::new().check_range(0, max))?;
        let num_positive_pics = r.read_ue(
            "num_positive_pics",
            ReadOptions::new().check_range(0, max - i64::from(num_negative_pics)),
        )?;

        let mut rps = Self::default();
        let mut poc = 0i32;
        for i in 0..num_negative_pics {
            let delta = r.read_ue(
                &format!("delta_poc_s0_minus1[{i}]"),
                ReadOptions::new().check_range(0, 32767),
            )?;
            // (7-67)
            poc -= delta as i32 + 1;
            rps.delta_poc_s0.push(poc);
            rps.used_by_curr_pic_s0
                .push(r.flag(&format!("used_by_curr_pic_s0_flag[{i}]"))?);
        }
        poc = 0;
        for i in 0..num_positive_pics {
            let delta = r.read_ue(
                &format!("delta_poc_s1_minus1[{i}]"),
                ReadOptions::new().check_range(0, 32767),
            )?;
            // (7-68)
            poc += delta as i32 + 1;
            rps.delta_poc_s1.push(poc);
            rps.used_by_curr_pic_s1
                .push(r.flag(&format!("used_by_curr_pic_s1_flag[{i}]"))?);
        }
        Ok(rps)
    }

    fn parse_predicted(
        r: &mut SyntaxReader<'_>,
        st_rps_idx: usize,
        num_short_term_ref_pic_sets: usize,
        previous: &[ShortTermRps],
    ) -> ParseResult<Self> {
        // 仅条带头中的 RPS (st_rps_idx == num_short_term_ref_pic_sets) 显式给出 delta_idx_minus1
        let delta_idx_minus1 = if st_rps_idx == num_short_term_ref_pic_sets {
            r.read_ue(
                "delta_idx_minus1",
                ReadOptions::new().check_range(0, st_rps_idx as i64 - 1),
            )?
        } else {
            0
        };
        let delta_rps_sign = r.flag("delta_rps_sign")?;
        let abs_delta_rps_minus1 =
            r.read_ue("abs_delta_rps_minus1", ReadOptions::new().check_range(0, 32767))?;

        // (7-59) (7-60)
        let ref_rps_idx = st_rps_idx - (delta_idx_minus1 as usize + 1);
        let delta_rps = (1 - 2 * i32::from(delta_rps_sign)) * (abs_delta_rps_minus1 as i32 + 1);
        r.log_calculated("RefRpsIdx", ref_rps_idx);
        r.log_calculated("deltaRps", delta_rps);
        let reference = previous
            .get(ref_rps_idx)
            .ok_or(ParseError::UnresolvedReference {
                kind: "st_ref_pic_set",
                id: ref_rps_idx as u32,
            })?;

        let n = reference.num_delta_pocs();
        let mut used_by_curr_pic_flag = Vec::with_capacity(n + 1);
        let mut use_delta_flag = Vec::with_capacity(n + 1);
        for j in 0..=n {
            let used = r.flag(&format!("used_by_curr_pic_flag[{j}]"))?;
            used_by_curr_pic_flag.push(used);
            use_delta_flag.push(used || r.flag(&format!("use_delta_flag[{j}]"))?);
        }

        let neg = reference.num_negative_pics();
        let mut rps = Self {
            inter_ref_pic_set_prediction_flag: true,
            ref_rps_idx: Some(ref_rps_idx),
            delta_rps: Some(delta_rps),
            ..Default::default()
        };

        // (7-61): 负方向
        for j in (0..reference.num_positive_pics()).rev() {
            let d_poc = reference.delta_poc_s1[j] + delta_rps;
            if d_poc < 0 && use_delta_flag[neg + j] {
                rps.delta_poc_s0.push(d_poc);
                rps.used_by_curr_pic_s0.push(used_by_curr_pic_flag[neg + j]);
            }
        }
        if delta_rps < 0 && use_delta_flag[n] {
            rps.delta_poc_s0.push(delta_rps);
            rps.used_by_curr_pic_s0.push(used_by_curr_pic_flag[n]);
        }
        for j in 0..neg {
            let d_poc = reference.delta_poc_s0[j] + delta_rps;
            if d_poc < 0 && use_delta_flag[j] {
                rps.delta_poc_s0.push(d_poc);
                rps.used_by_curr_pic_s0.push(used_by_curr_pic_flag[j]);
            }
        }

        // (7-62): 正方向
        for j in (0..neg).rev() {
            let d_poc = reference.delta_poc_s0[j] + delta_rps;
            if d_poc > 0 && use_delta_flag[j] {
                rps.delta_poc_s1.push(d_poc);
                rps.used_by_curr_pic_s1.push(used_by_curr_pic_flag[j]);
            }
        }
        if delta_rps > 0 && use_delta_flag[n] {
            rps.delta_poc_s1.push(delta_rps);
            rps.used_by_curr_pic_s1.push(used_by_curr_pic_flag[n]);
        }
        for j in 0..reference.num_positive_pics() {
            let d_poc = reference.delta_poc_s1[j] + delta_rps;
            if d_poc > 0 && use_delta_flag[neg + j] {
                rps.delta_poc_s1.push(d_poc);
                rps.used_by_curr_pic_s1.push(used_by_curr_pic_flag[neg + j]);
            }
        }
        Ok(rps)
    }
}
