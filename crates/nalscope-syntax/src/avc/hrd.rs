//! AVC hrd_parameters() (E.1.2).

use nalscope_core::{ParseError, ParseResult, ReadOptions, SyntaxReader};

/// 单个 SchedSelIdx 的 CPB 规格
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpbSpec {
    pub bit_rate_value_minus1: u32,
    pub cpb_size_value_minus1: u32,
    pub cbr_flag: bool,
    /// BitRate[SchedSelIdx] = (bit_rate_value_minus1 + 1) * 2^(6 + bit_rate_scale)
    pub bit_rate: u64,
    /// CpbSize[SchedSelIdx] = (cpb_size_value_minus1 + 1) * 2^(4 + cpb_size_scale)
    pub cpb_size: u64,
}

/// hrd_parameters()
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HrdParameters {
    pub cpb_cnt_minus1: u32,
    pub bit_rate_scale: u32,
    pub cpb_size_scale: u32,
    pub schedules: Vec<CpbSpec>,
    pub initial_cpb_removal_delay_length_minus1: u32,
    pub cpb_removal_delay_length_minus1: u32,
    pub dpb_output_delay_length_minus1: u32,
    pub time_offset_length: u32,
}

impl HrdParameters {
    pub fn parse(r: &mut SyntaxReader<'_>, name: &str) -> ParseResult<Self> {
        r.sub_level(name, |r| {
            let cpb_cnt_minus1 =
                r.read_ue("cpb_cnt_minus1", ReadOptions::new().check_range(0, 31))?;
            let bit_rate_scale = r.bits("bit_rate_scale", 4)?;
            let cpb_size_scale = r.bits("cpb_size_scale", 4)?;

            let mut schedules = Vec::with_capacity(cpb_cnt_minus1 as usize + 1);
            for i in 0..=cpb_cnt_minus1 {
                let bit_rate_value_minus1 = r.ue(&format!("bit_rate_value_minus1[{i}]"))?;
                let cpb_size_value_minus1 = r.ue(&format!("cpb_size_value_minus1[{i}]"))?;
                let cbr_flag = r.flag(&format!("cbr_flag[{i}]"))?;

                let bit_rate = (u64::from(bit_rate_value_minus1) + 1) << (6 + bit_rate_scale);
                let cpb_size = (u64::from(cpb_size_value_minus1) + 1) << (4 + cpb_size_scale);
                r.log_calculated(&format!("BitRate[{i}]"), bit_rate);
                r.log_calculated(&format!("CpbSize[{i}]"), cpb_size);

                schedules.push(CpbSpec {
                    bit_rate_value_minus1,
                    cpb_size_value_minus1,
                    cbr_flag,
                    bit_rate,
                    cpb_size,
                });
            }

            Ok(Self {
                cpb_cnt_minus1,
                bit_rate_scale,
                cpb_size_scale,
                schedules,
                initial_cpb_removal_delay_length_minus1: r
                    .bits("initial_cpb_removal_delay_length_minus1", 5)?,
                cpb_removal_delay_length_minus1: r.bits("cpb_removal_delay_length_minus1", 5)?,
                dpb_output_delay_length_minus1: r.bits("dpb_output_delay_length_minus1", 5)?,
                time_offset_length: r.bits("time_offset_length", 5)?,
            })
        })
    }

    /// NAL HRD 与 VCL HRD 同时存在时, 四个长度字段必须两两相等
    pub fn check_consistent_with(&self, vcl: &Self) -> ParseResult<()> {
        let pairs = [
            (
                "initial_cpb_removal_delay_length_minus1",
                self.initial_cpb_removal_delay_length_minus1,
                vcl.initial_cpb_removal_delay_length_minus1,
            ),
            (
                "cpb_removal_delay_length_minus1",
                self.cpb_removal_delay_length_minus1,
                vcl.cpb_removal_delay_length_minus1,
            ),
            (
                "dpb_output_delay_length_minus1",
                self.dpb_output_delay_length_minus1,
                vcl.dpb_output_delay_length_minus1,
            ),
            (
                "time_offset_length",
                self.time_offset_length,
                vcl.time_offset_length,
            ),
        ];
        for (name, nal, vcl) in pairs {
            if nal != vcl {
                return Err(ParseError::structural(format!(
                    "AVC: NAL HRD 与 VCL HRD 的 {name} 不一致, nal={nal}, vcl={vcl}"
                )));
            }
        }
        Ok(())
    }
}
