//! HEVC hrd_parameters() / sub_layer_hrd_parameters() (E.2.2, E.2.3).

use nalscope_core::{ParseError, ParseResult, ReadOptions, SyntaxReader};

/// commonInfPresentFlag 为 1 时读取的公共字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HrdCommonInfo {
    pub nal_hrd_parameters_present_flag: bool,
    pub vcl_hrd_parameters_present_flag: bool,
    pub sub_pic_hrd_params_present_flag: bool,
    pub tick_divisor_minus2: u32,
    pub du_cpb_removal_delay_increment_length_minus1: u32,
    pub sub_pic_cpb_params_in_pic_timing_sei_flag: bool,
    pub dpb_output_delay_du_length_minus1: u32,
    pub bit_rate_scale: u32,
    pub cpb_size_scale: u32,
    pub cpb_size_du_scale: u32,
    pub initial_cpb_removal_delay_length_minus1: u32,
    pub au_cpb_removal_delay_length_minus1: u32,
    pub dpb_output_delay_length_minus1: u32,
}

impl HrdCommonInfo {
    fn parse(r: &mut SyntaxReader<'_>) -> ParseResult<Self> {
        let mut info = Self {
            nal_hrd_parameters_present_flag: r.flag("nal_hrd_parameters_present_flag")?,
            vcl_hrd_parameters_present_flag: r.flag("vcl_hrd_parameters_present_flag")?,
            // 长度字段未出现时推断为 23
            initial_cpb_removal_delay_length_minus1: 23,
            au_cpb_removal_delay_length_minus1: 23,
            dpb_output_delay_length_minus1: 23,
            ..Default::default()
        };
        if !info.nal_hrd_parameters_present_flag && !info.vcl_hrd_parameters_present_flag {
            return Ok(info);
        }

        info.sub_pic_hrd_params_present_flag = r.flag("sub_pic_hrd_params_present_flag")?;
        if info.sub_pic_hrd_params_present_flag {
            info.tick_divisor_minus2 = r.bits("tick_divisor_minus2", 8)?;
            info.du_cpb_removal_delay_increment_length_minus1 =
                r.bits("du_cpb_removal_delay_increment_length_minus1", 5)?;
            info.sub_pic_cpb_params_in_pic_timing_sei_flag =
                r.flag("sub_pic_cpb_params_in_pic_timing_sei_flag")?;
            info.dpb_output_delay_du_length_minus1 =
                r.bits("dpb_output_delay_du_length_minus1", 5)?;
        }
        info.bit_rate_scale = r.bits("bit_rate_scale", 4)?;
        info.cpb_size_scale = r.bits("cpb_size_scale", 4)?;
        if info.sub_pic_hrd_params_present_flag {
            info.cpb_size_du_scale = r.bits("cpb_size_du_scale", 4)?;
        }
        info.initial_cpb_removal_delay_length_minus1 =
            r.bits("initial_cpb_removal_delay_length_minus1", 5)?;
        info.au_cpb_removal_delay_length_minus1 = r.bits("au_cpb_removal_delay_length_minus1", 5)?;
        info.dpb_output_delay_length_minus1 = r.bits("dpb_output_delay_length_minus1", 5)?;
        Ok(info)
    }
}

/// 单个 CPB 规格
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpbSchedule {
    pub bit_rate_value_minus1: u32,
    pub cpb_size_value_minus1: u32,
    pub cpb_size_du_value_minus1: Option<u32>,
    pub bit_rate_du_value_minus1: Option<u32>,
    pub cbr_flag: bool,
    /// (bit_rate_value_minus1 + 1) * 2^(6 + bit_rate_scale)
    pub bit_rate: u64,
    /// (cpb_size_value_minus1 + 1) * 2^(4 + cpb_size_scale)
    pub cpb_size: u64,
}

/// sub_layer_hrd_parameters()
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubLayerHrd {
    pub schedules: Vec<CpbSchedule>,
}

impl SubLayerHrd {
    fn parse(
        r: &mut SyntaxReader<'_>,
        name: &str,
        cpb_cnt: u32,
        common: &HrdCommonInfo,
    ) -> ParseResult<Self> {
        r.sub_level(name, |r| {
            let value_range = ReadOptions::new().check_range(0, 4_294_967_294);
            let mut schedules: Vec<CpbSchedule> = Vec::with_capacity(cpb_cnt as usize + 1);
            for i in 0..=cpb_cnt as usize {
                let bit_rate_value_minus1 =
                    r.read_ue(&format!("bit_rate_value_minus1[{i}]"), value_range.clone())?;
                let cpb_size_value_minus1 =
                    r.read_ue(&format!("cpb_size_value_minus1[{i}]"), value_range.clone())?;
                let (cpb_size_du_value_minus1, bit_rate_du_value_minus1) =
                    if common.sub_pic_hrd_params_present_flag {
                        (
                            Some(r.read_ue(
                                &format!("cpb_size_du_value_minus1[{i}]"),
                                value_range.clone(),
                            )?),
                            Some(r.read_ue(
                                &format!("bit_rate_du_value_minus1[{i}]"),
                                value_range.clone(),
                            )?),
                        )
                    } else {
                        (None, None)
                    };
                let cbr_flag = r.flag(&format!("cbr_flag[{i}]"))?;

                if let Some(prev) = schedules.last() {
                    check_monotonic(prev, bit_rate_value_minus1, cpb_size_value_minus1, i)?;
                    if let (Some(p), Some(c)) = (prev.cpb_size_du_value_minus1, cpb_size_du_value_minus1)
                        && c > p
                    {
                        return Err(ParseError::constraint(format!(
                            "HEVC: cpb_size_du_value_minus1[{i}]={c} 应不大于前一项 {p}"
                        )));
                    }
                    if let (Some(p), Some(c)) = (prev.bit_rate_du_value_minus1, bit_rate_du_value_minus1)
                        && c <= p
                    {
                        return Err(ParseError::constraint(format!(
                            "HEVC: bit_rate_du_value_minus1[{i}]={c} 应大于前一项 {p}"
                        )));
                    }
                }

                let bit_rate = (u64::from(bit_rate_value_minus1) + 1) << (6 + common.bit_rate_scale);
                let cpb_size = (u64::from(cpb_size_value_minus1) + 1) << (4 + common.cpb_size_scale);
                r.log_calculated(&format!("BitRate[{i}]"), bit_rate);
                r.log_calculated(&format!("CpbSize[{i}]"), cpb_size);

                schedules.push(CpbSchedule {
                    bit_rate_value_minus1,
                    cpb_size_value_minus1,
                    cpb_size_du_value_minus1,
                    bit_rate_du_value_minus1,
                    cbr_flag,
                    bit_rate,
                    cpb_size,
                });
            }
            Ok(Self { schedules })
        })
    }
}

/// 码率严格递增, CPB 大小不增
fn check_monotonic(prev: &CpbSchedule, bit_rate: u32, cpb_size: u32, i: usize) -> ParseResult<()> {
    if bit_rate <= prev.bit_rate_value_minus1 {
        return Err(ParseError::constraint(format!(
            "HEVC: bit_rate_value_minus1[{i}]={bit_rate} 应大于前一项 {}",
            prev.bit_rate_value_minus1
        )));
    }
    if cpb_size > prev.cpb_size_value_minus1 {
        return Err(ParseError::constraint(format!(
            "HEVC: cpb_size_value_minus1[{i}]={cpb_size} 应不大于前一项 {}",
            prev.cpb_size_value_minus1
        )));
    }
    Ok(())
}

/// 单个时域子层的 HRD 信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubLayerHrdInfo {
    pub fixed_pic_rate_general_flag: bool,
    pub fixed_pic_rate_within_cvs_flag: bool,
    pub elemental_duration_in_tc_minus1: Option<u32>,
    pub low_delay_hrd_flag: bool,
    pub cpb_cnt_minus1: u32,
    pub nal: Option<SubLayerHrd>,
    pub vcl: Option<SubLayerHrd>,
}

/// hrd_parameters()
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HrdParameters {
    pub common_inf_present_flag: bool,
    /// commonInfPresentFlag=0 时继承自前一个 hrd_parameters()
    pub common: HrdCommonInfo,
    pub sub_layers: Vec<SubLayerHrdInfo>,
}

impl HrdParameters {
    /// `inherited` 为 commonInfPresentFlag=0 时沿用的公共字段
    pub fn parse(
        r: &mut SyntaxReader<'_>,
        common_inf_present_flag: bool,
        max_num_sub_layers_minus1: u32,
        inherited: Option<&HrdCommonInfo>,
    ) -> ParseResult<Self> {
        r.sub_level("hrd_parameters()", |r| {
            if max_num_sub_layers_minus1 > 6 {
                return Err(ParseError::constraint(format!(
                    "HEVC: maxNumSubLayersMinus1 超出范围, value={max_num_sub_layers_minus1}"
                )));
            }
            let common = if common_inf_present_flag {
                HrdCommonInfo::parse(r)?
            } else {
                inherited.copied().unwrap_or_default()
            };

            let mut sub_layers = Vec::with_capacity(max_num_sub_layers_minus1 as usize + 1);
            for i in 0..=max_num_sub_layers_minus1 {
                let fixed_pic_rate_general_flag = r.flag(&format!("fixed_pic_rate_general_flag[{i}]"))?;
                let fixed_pic_rate_within_cvs_flag = if fixed_pic_rate_general_flag {
                    true
                } else {
                    r.flag(&format!("fixed_pic_rate_within_cvs_flag[{i}]"))?
                };
                let (elemental_duration_in_tc_minus1, low_delay_hrd_flag) =
                    if fixed_pic_rate_within_cvs_flag {
                        let d = r.read_ue(
                            &format!("elemental_duration_in_tc_minus1[{i}]"),
                            ReadOptions::new().check_range(0, 2047),
                        )?;
                        (Some(d), false)
                    } else {
                        (None, r.flag(&format!("low_delay_hrd_flag[{i}]"))?)
                    };
                let cpb_cnt_minus1 = if low_delay_hrd_flag {
                    0
                } else {
                    r.read_ue(
                        &format!("cpb_cnt_minus1[{i}]"),
                        ReadOptions::new().check_range(0, 31),
                    )?
                };

                let nal = if common.nal_hrd_parameters_present_flag {
                    Some(SubLayerHrd::parse(r, "nal_sub_layer_hrd_parameters()", cpb_cnt_minus1, &common)?)
                } else {
                    None
                };
                let vcl = if common.vcl_hrd_parameters_present_flag {
                    Some(SubLayerHrd::parse(r, "vcl_sub_layer_hrd_parameters()", cpb_cnt_minus1, &common)?)
                } else {
                    None
                };
                sub_layers.push(SubLayerHrdInfo {
                    fixed_pic_rate_general_flag,
                    fixed_pic_rate_within_cvs_flag,
                    elemental_duration_in_tc_minus1,
                    low_delay_hrd_flag,
                    cpb_cnt_minus1,
                    nal,
                    vcl,
                });
            }

            Ok(Self {
                common_inf_present_flag,
                common,
                sub_layers,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use nalscope_core::BitWriter;

    use super::*;

    /// 公共字段: 仅 NAL HRD, 无子图像参数, bit_rate_scale=2, cpb_size_scale=3
    fn write_common(bw: &mut BitWriter) {
        bw.write_flag(true);
        bw.write_flag(false);
        bw.write_flag(false);
        bw.write_bits(2, 4);
        bw.write_bits(3, 4);
        bw.write_bits(23, 5);
        bw.write_bits(15, 5);
        bw.write_bits(4, 5);
    }

    /// 子层 0: fixed_pic_rate_general_flag=1, elemental_duration=0, 两个 CPB
    fn write_sub_layer(bw: &mut BitWriter, cpbs: &[(u32, u32)]) {
        bw.write_flag(true);
        bw.write_ue(0);
        bw.write_ue(cpbs.len() as u32 - 1);
        for &(rate, size) in cpbs {
            bw.write_ue(rate);
            bw.write_ue(size);
            bw.write_flag(false);
        }
    }

    #[test]
    fn test_hrd_parse_and_derive() {
        let mut bw = BitWriter::new();
        write_common(&mut bw);
        write_sub_layer(&mut bw, &[(9, 99), (19, 49)]);
        let data = bw.finish();

        let mut r = SyntaxReader::new(&data);
        let hrd = HrdParameters::parse(&mut r, true, 0, None).unwrap();
        assert!(hrd.common.nal_hrd_parameters_present_flag);
        assert_eq!(hrd.common.au_cpb_removal_delay_length_minus1, 15);
        let sub = &hrd.sub_layers[0];
        assert!(sub.fixed_pic_rate_within_cvs_flag);
        assert_eq!(sub.elemental_duration_in_tc_minus1, Some(0));
        let nal = sub.nal.as_ref().expect("应有 NAL HRD");
        assert!(sub.vcl.is_none());
        assert_eq!(nal.schedules.len(), 2);
        assert_eq!(nal.schedules[0].bit_rate, 10 << 8);
        assert_eq!(nal.schedules[1].cpb_size, 50 << 7);
    }

    #[test]
    fn test_hrd_reject_non_increasing_bit_rate() {
        let mut bw = BitWriter::new();
        write_common(&mut bw);
        write_sub_layer(&mut bw, &[(9, 99), (9, 49)]);
        let data = bw.finish();

        let mut r = SyntaxReader::new(&data);
        let err = HrdParameters::parse(&mut r, true, 0, None).expect_err("码率不递增应失败");
        assert!(matches!(err, ParseError::ConstraintViolation(_)));
        assert!(format!("{err}").contains("bit_rate_value_minus1[1]"));
    }

    #[test]
    fn test_hrd_reject_increasing_cpb_size() {
        let mut bw = BitWriter::new();
        write_common(&mut bw);
        write_sub_layer(&mut bw, &[(9, 49), (19, 99)]);
        let data = bw.finish();

        let mut r = SyntaxReader::new(&data);
        let err = HrdParameters::parse(&mut r, true, 0, None).expect_err("CPB 变大应失败");
        assert!(format!("{err}").contains("cpb_size_value_minus1[1]"));
    }

    #[test]
    fn test_hrd_inherits_common_info() {
        let mut bw = BitWriter::new();
        write_common(&mut bw);
        write_sub_layer(&mut bw, &[(9, 99)]);
        // 第二个 hrd_parameters: commonInfPresentFlag=0
        write_sub_layer(&mut bw, &[(4, 9)]);
        let data = bw.finish();

        let mut r = SyntaxReader::new(&data);
        let first = HrdParameters::parse(&mut r, true, 0, None).unwrap();
        let second = HrdParameters::parse(&mut r, false, 0, Some(&first.common)).unwrap();
        assert_eq!(second.common, first.common);
        let nal = second.sub_layers[0].nal.as_ref().expect("继承后应有 NAL HRD");
        assert_eq!(nal.schedules[0].bit_rate, 5 << 8);
    }

    #[test]
    fn test_hrd_low_delay_skips_cpb_cnt() {
        let mut bw = BitWriter::new();
        // 无 NAL/VCL HRD
        bw.write_flag(false);
        bw.write_flag(false);
        // 子层 0, 1: fixed_pic_rate_general=0, within_cvs=0, low_delay=1
        for _ in 0..2 {
            bw.write_flag(false);
            bw.write_flag(false);
            bw.write_flag(true);
        }
        let data = bw.finish();

        let mut r = SyntaxReader::new(&data);
        let hrd = HrdParameters::parse(&mut r, true, 1, None).unwrap();
        assert_eq!(hrd.sub_layers.len(), 2);
        assert!(hrd.sub_layers.iter().all(|s| s.low_delay_hrd_flag && s.cpb_cnt_minus1 == 0));
        assert_eq!(r.bits_read(), 8);
    }
}
