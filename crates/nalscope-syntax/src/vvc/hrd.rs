//! VVC dpb_parameters() (7.3.4) 与定时/HRD 参数 (7.3.5).

use nalscope_core::{ParseResult, Rational, ReadOptions, SyntaxReader};

/// 一个子层的 DPB 参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DpbSubLayer {
    pub max_dec_pic_buffering_minus1: u32,
    pub max_num_reorder_pics: u32,
    pub max_latency_increase_plus1: u32,
}

/// dpb_parameters(), 下标为 TemporalId, 未出现的低子层按最高子层填充
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DpbParameters {
    pub sub_layers: Vec<DpbSubLayer>,
}

impl DpbParameters {
    pub fn parse(
        r: &mut SyntaxReader<'_>,
        max_sub_layers_minus1: u32,
        sub_layer_info_flag: bool,
    ) -> ParseResult<Self> {
        r.sub_level("dpb_parameters()", |r| {
            let first = if sub_layer_info_flag { 0 } else { max_sub_layers_minus1 };
            let mut present = Vec::new();
            for i in first..=max_sub_layers_minus1 {
                let max_dec = r.ue(&format!("dpb_max_dec_pic_buffering_minus1[{i}]"))?;
                let reorder = r.read_ue(
                    &format!("dpb_max_num_reorder_pics[{i}]"),
                    ReadOptions::new().check_range(0, i64::from(max_dec)),
                )?;
                present.push(DpbSubLayer {
                    max_dec_pic_buffering_minus1: max_dec,
                    max_num_reorder_pics: reorder,
                    max_latency_increase_plus1: r
                        .ue(&format!("dpb_max_latency_increase_plus1[{i}]"))?,
                });
            }
            let highest = present.last().copied().unwrap_or_default();
            let mut sub_layers = vec![highest; first as usize];
            sub_layers.extend(present);
            Ok(Self { sub_layers })
        })
    }

    /// 最高子层的参数
    pub fn highest(&self) -> DpbSubLayer {
        self.sub_layers.last().copied().unwrap_or_default()
    }
}

/// general_timing_hrd_parameters()
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GeneralTimingHrd {
    pub num_units_in_tick: u32,
    pub time_scale: u32,
    pub general_nal_hrd_params_present_flag: bool,
    pub general_vcl_hrd_params_present_flag: bool,
    pub general_same_pic_timing_in_all_ols_flag: bool,
    pub general_du_hrd_params_present_flag: bool,
    pub tick_divisor_minus2: u32,
    pub bit_rate_scale: u32,
    pub cpb_size_scale: u32,
    pub cpb_size_du_scale: u32,
    pub hrd_cpb_cnt_minus1: u32,
}

impl GeneralTimingHrd {
    pub fn parse(r: &mut SyntaxReader<'_>) -> ParseResult<Self> {
        r.sub_level("general_timing_hrd_parameters()", |r| {
            let mut hrd = Self {
                num_units_in_tick: r
                    .read_bits("num_units_in_tick", 32, ReadOptions::new().check_greater(0))?,
                time_scale: r.read_bits("time_scale", 32, ReadOptions::new().check_greater(0))?,
                general_nal_hrd_params_present_flag: r
                    .flag("general_nal_hrd_params_present_flag")?,
                general_vcl_hrd_params_present_flag: r
                    .flag("general_vcl_hrd_params_present_flag")?,
                ..Default::default()
            };
            if hrd.any_hrd_present() {
                hrd.general_same_pic_timing_in_all_ols_flag =
                    r.flag("general_same_pic_timing_in_all_ols_flag")?;
                hrd.general_du_hrd_params_present_flag =
                    r.flag("general_du_hrd_params_present_flag")?;
                if hrd.general_du_hrd_params_present_flag {
                    hrd.tick_divisor_minus2 = r.bits("tick_divisor_minus2", 8)?;
                }
                hrd.bit_rate_scale = r.bits("bit_rate_scale", 4)?;
                hrd.cpb_size_scale = r.bits("cpb_size_scale", 4)?;
                if hrd.general_du_hrd_params_present_flag {
                    hrd.cpb_size_du_scale = r.bits("cpb_size_du_scale", 4)?;
                }
                hrd.hrd_cpb_cnt_minus1 =
                    r.read_ue("hrd_cpb_cnt_minus1", ReadOptions::new().check_range(0, 31))?;
            }
            r.log_calculated("ClockTick", hrd.clock_tick().to_string());
            Ok(hrd)
        })
    }

    pub fn any_hrd_present(&self) -> bool {
        self.general_nal_hrd_params_present_flag || self.general_vcl_hrd_params_present_flag
    }

    /// 时钟节拍 num_units_in_tick / time_scale 秒
    pub fn clock_tick(&self) -> Rational {
        Rational::new(u64::from(self.num_units_in_tick), u64::from(self.time_scale))
    }

    /// 每个时钟节拍对应一幅图像时的帧率
    pub fn frame_rate(&self) -> Rational {
        Rational::new(u64::from(self.time_scale), u64::from(self.num_units_in_tick)).reduce()
    }
}

/// sublayer_hrd_parameters() 中的一个 CPB
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpbSpec {
    pub bit_rate_value_minus1: u32,
    pub cpb_size_value_minus1: u32,
    pub cpb_size_du_value_minus1: Option<u32>,
    pub bit_rate_du_value_minus1: Option<u32>,
    pub cbr_flag: bool,
}

/// ols_timing_hrd_parameters() 中的一个子层
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OlsTimingSubLayer {
    pub fixed_pic_rate_general_flag: bool,
    pub fixed_pic_rate_within_cvs_flag: bool,
    pub elemental_duration_in_tc_minus1: Option<u32>,
    pub low_delay_hrd_flag: bool,
    pub nal_cpbs: Vec<CpbSpec>,
    pub vcl_cpbs: Vec<CpbSpec>,
}

/// ols_timing_hrd_parameters(firstSubLayer, MaxSubLayersVal), 下标为 TemporalId
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OlsTimingHrd {
    pub first_sub_layer: u32,
    pub sub_layers: Vec<OlsTimingSubLayer>,
}

impl OlsTimingHrd {
    pub fn parse(
        r: &mut SyntaxReader<'_>,
        general: &GeneralTimingHrd,
        first_sub_layer: u32,
        max_sub_layers_val: u32,
    ) -> ParseResult<Self> {
        r.sub_level("ols_timing_hrd_parameters()", |r| {
            let mut sub_layers = vec![OlsTimingSubLayer::default(); first_sub_layer as usize];
            for i in first_sub_layer..=max_sub_layers_val {
                let mut s = OlsTimingSubLayer {
                    fixed_pic_rate_general_flag: r
                        .flag(&format!("fixed_pic_rate_general_flag[{i}]"))?,
                    ..Default::default()
                };
                s.fixed_pic_rate_within_cvs_flag = s.fixed_pic_rate_general_flag
                    || r.flag(&format!("fixed_pic_rate_within_cvs_flag[{i}]"))?;
                if s.fixed_pic_rate_within_cvs_flag {
                    s.elemental_duration_in_tc_minus1 = Some(r.read_ue(
                        &format!("elemental_duration_in_tc_minus1[{i}]"),
                        ReadOptions::new().check_range(0, 2047),
                    )?);
                } else if general.any_hrd_present() && general.hrd_cpb_cnt_minus1 == 0 {
                    s.low_delay_hrd_flag = r.flag(&format!("low_delay_hrd_flag[{i}]"))?;
                }
                if general.general_nal_hrd_params_present_flag {
                    s.nal_cpbs = parse_sublayer_hrd(r, general, i)?;
                }
                if general.general_vcl_hrd_params_present_flag {
                    s.vcl_cpbs = parse_sublayer_hrd(r, general, i)?;
                }
                sub_layers.push(s);
            }
            Ok(Self {
                first_sub_layer,
                sub_layers,
            })
        })
    }
}

fn parse_sublayer_hrd(
    r: &mut SyntaxReader<'_>,
    general: &GeneralTimingHrd,
    sub_layer: u32,
) -> ParseResult<Vec<CpbSpec>> {
    r.sub_level(&format!("sublayer_hrd_parameters({sub_layer})"), |r| {
        let du = general.general_du_hrd_params_present_flag;
        let mut cpbs = Vec::new();
        for j in 0..=general.hrd_cpb_cnt_minus1 {
            let bit_rate_value_minus1 = r.ue(&format!("bit_rate_value_minus1[{sub_layer}][{j}]"))?;
            let cpb_size_value_minus1 = r.ue(&format!("cpb_size_value_minus1[{sub_layer}][{j}]"))?;
            let (cpb_size_du_value_minus1, bit_rate_du_value_minus1) = if du {
                (
                    Some(r.ue(&format!("cpb_size_du_value_minus1[{sub_layer}][{j}]"))?),
                    Some(r.ue(&format!("bit_rate_du_value_minus1[{sub_layer}][{j}]"))?),
                )
            } else {
                (None, None)
            };
            cpbs.push(CpbSpec {
                bit_rate_value_minus1,
                cpb_size_value_minus1,
                cpb_size_du_value_minus1,
                bit_rate_du_value_minus1,
                cbr_flag: r.flag(&format!("cbr_flag[{sub_layer}][{j}]"))?,
            });
        }
        Ok(cpbs)
    })
}

#[cfg(test)]
mod tests {
    use nalscope_core::BitWriter;

    use super::*;

    #[test]
    fn test_dpb_parameters_fill_lower_sub_layers() {
        let mut bw = BitWriter::new();
        bw.write_ue(5);
        bw.write_ue(2);
        bw.write_ue(0);
        let data = bw.finish();
        let mut r = SyntaxReader::new(&data);
        let dpb = DpbParameters::parse(&mut r, 2, false).expect("DPB 参数应可解析");
        assert_eq!(dpb.sub_layers.len(), 3);
        assert_eq!(dpb.sub_layers[0], dpb.highest());
        assert_eq!(dpb.highest().max_dec_pic_buffering_minus1, 5);
        assert_eq!(dpb.highest().max_num_reorder_pics, 2);
    }

    #[test]
    fn test_timing_hrd_with_nal_cpb() {
        let mut bw = BitWriter::new();
        bw.write_bits(1001, 32);
        bw.write_bits(60000, 32);
        bw.write_flag(true); // nal
        bw.write_flag(false); // vcl
        bw.write_flag(true); // same_pic_timing
        bw.write_flag(false); // du
        bw.write_bits(4, 4);
        bw.write_bits(5, 4);
        bw.write_ue(0); // hrd_cpb_cnt_minus1
        // ols_timing_hrd_parameters(0, 0)
        bw.write_flag(true); // fixed_pic_rate_general_flag
        bw.write_ue(0);
        bw.write_ue(1999);
        bw.write_ue(2999);
        bw.write_flag(true); // cbr_flag
        let data = bw.finish();

        let mut r = SyntaxReader::new(&data);
        let general = GeneralTimingHrd::parse(&mut r).expect("HRD 应可解析");
        assert_eq!(general.frame_rate(), Rational::new(60000, 1001));
        let ols = OlsTimingHrd::parse(&mut r, &general, 0, 0).expect("OLS HRD 应可解析");
        let s = &ols.sub_layers[0];
        assert!(s.fixed_pic_rate_within_cvs_flag, "general 为 1 时 within_cvs 推断为 1");
        assert_eq!(s.elemental_duration_in_tc_minus1, Some(0));
        assert_eq!(s.nal_cpbs[0].bit_rate_value_minus1, 1999);
        assert!(s.nal_cpbs[0].cbr_flag);
        assert!(s.vcl_cpbs.is_empty());
    }
}
