//! HEVC profile_tier_level() (7.3.3).

use nalscope_core::{ParseResult, ReadOptions, SymbolTable, SyntaxReader, symbol_table};

symbol_table! {
    /// general_profile_idc (附录 A)
    pub enum ProfileIdc {
        Main = 1 => "Main",
        Main10 = 2 => "Main 10",
        MainStillPicture = 3 => "Main Still Picture",
        FormatRangeExtensions = 4 => "Format Range Extensions",
        HighThroughput = 5 => "High Throughput",
        MultiviewMain = 6 => "Multiview Main",
        ScalableMain = 7 => "Scalable Main",
        Main3d = 8 => "3D Main",
        ScreenContentCoding = 9 => "Screen-Extended",
        ScalableFormatRange = 10 => "Scalable Format Range Extensions",
        HighThroughputScreenContent = 11 => "High Throughput Screen-Extended",
    }
}

symbol_table! {
    /// general_level_idc = 30 * 级别号
    pub enum LevelIdc {
        L1 = 30 => "Level 1",
        L2 = 60 => "Level 2",
        L2_1 = 63 => "Level 2.1",
        L3 = 90 => "Level 3",
        L3_1 = 93 => "Level 3.1",
        L4 = 120 => "Level 4",
        L4_1 = 123 => "Level 4.1",
        L5 = 150 => "Level 5",
        L5_1 = 153 => "Level 5.1",
        L5_2 = 156 => "Level 5.2",
        L6 = 180 => "Level 6",
        L6_1 = 183 => "Level 6.1",
        L6_2 = 186 => "Level 6.2",
        L8_5 = 255 => "Level 8.5",
    }
}

/// level_idc 对应的级别名, 如 93 -> "Level 3.1"
pub fn level_name(level_idc: u32) -> String {
    let major = level_idc / 30;
    let minor = level_idc % 30 / 3;
    if minor == 0 {
        format!("Level {major}")
    } else {
        format!("Level {major}.{minor}")
    }
}

/// profile 信息 (general_ 或 sub_layer_ 前缀相同)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProfileInfo {
    pub profile_space: u32,
    pub tier_flag: bool,
    pub profile_idc: u32,
    pub profile_compatibility_flags: u32,
    pub progressive_source_flag: bool,
    pub interlaced_source_flag: bool,
    pub non_packed_constraint_flag: bool,
    pub frame_only_constraint_flag: bool,
    /// 仅 profile 4..=7 (或其兼容标志) 时出现
    pub range_constraints: Option<RangeConstraintFlags>,
    pub inbld_flag: bool,
}

impl ProfileInfo {
    /// profile_compatibility_flag[j]
    pub fn compatible_with(&self, j: u32) -> bool {
        j < 32 && self.profile_compatibility_flags & (0x8000_0000 >> j) != 0
    }

    fn profile_or_compatible(&self, profiles: std::ops::RangeInclusive<u32>) -> bool {
        profiles.contains(&self.profile_idc) || profiles.into_iter().any(|j| self.compatible_with(j))
    }

    /// `sub_layer` 为 `None` 时读取 general_ 字段, 否则读取 sub_layer_ 字段
    fn parse(r: &mut SyntaxReader<'_>, sub_layer: Option<usize>) -> ParseResult<Self> {
        let name = |field: &str| match sub_layer {
            None => format!("general_{field}"),
            Some(i) => format!("sub_layer_{field}[{i}]"),
        };

        let profile_space = r.read_bits(&name("profile_space"), 2, ReadOptions::new().check_equal_to(0))?;
        let tier_flag = r.read_flag(
            &name("tier_flag"),
            ReadOptions::new().meaning("0: Main tier, 1: High tier"),
        )?;
        let profile_idc = r.read_bits(
            &name("profile_idc"),
            5,
            ReadOptions::new().meaning_map::<ProfileIdc>(),
        )?;
        let mut info = Self {
            profile_space,
            tier_flag,
            profile_idc,
            ..Default::default()
        };
        for j in 0..32 {
            if r.flag(&format!("{}[{j}]", name("profile_compatibility_flag")))? {
                info.profile_compatibility_flags |= 0x8000_0000 >> j;
            }
        }
        info.progressive_source_flag = r.flag(&name("progressive_source_flag"))?;
        info.interlaced_source_flag = r.flag(&name("interlaced_source_flag"))?;
        info.non_packed_constraint_flag = r.flag(&name("non_packed_constraint_flag"))?;
        info.frame_only_constraint_flag = r.flag(&name("frame_only_constraint_flag"))?;

        if info.profile_or_compatible(4..=7) {
            info.range_constraints = Some(RangeConstraintFlags {
                max_12bit: r.flag(&name("max_12bit_constraint_flag"))?,
                max_10bit: r.flag(&name("max_10bit_constraint_flag"))?,
                max_8bit: r.flag(&name("max_8bit_constraint_flag"))?,
                max_422chroma: r.flag(&name("max_422chroma_constraint_flag"))?,
                max_420chroma: r.flag(&name("max_420chroma_constraint_flag"))?,
                max_monochrome: r.flag(&name("max_monochrome_constraint_flag"))?,
                intra: r.flag(&name("intra_constraint_flag"))?,
                one_picture_only: r.flag(&name("one_picture_only_constraint_flag"))?,
                lower_bit_rate: r.flag(&name("lower_bit_rate_constraint_flag"))?,
            });
            r.read_bits_u64(&name("reserved_zero_34bits"), 34, ReadOptions::new().check_equal_to(0))?;
        } else {
            r.read_bits_u64(&name("reserved_zero_43bits"), 43, ReadOptions::new().check_equal_to(0))?;
        }

        if info.profile_or_compatible(1..=5) {
            info.inbld_flag = r.flag(&name("inbld_flag"))?;
        } else {
            r.read_flag(&name("reserved_zero_bit"), ReadOptions::new().check_equal_to(0))?;
        }
        Ok(info)
    }
}

/// 格式范围扩展的约束标志
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RangeConstraintFlags {
    pub max_12bit: bool,
    pub max_10bit: bool,
    pub max_8bit: bool,
    pub max_422chroma: bool,
    pub max_420chroma: bool,
    pub max_monochrome: bool,
    pub intra: bool,
    pub one_picture_only: bool,
    pub lower_bit_rate: bool,
}

/// 单个子层的 profile / level
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubLayerPtl {
    pub profile: Option<ProfileInfo>,
    pub level_idc: Option<u32>,
}

/// profile_tier_level()
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProfileTierLevel {
    /// profilePresentFlag=0 时为 `None`
    pub general: Option<ProfileInfo>,
    pub general_level_idc: u32,
    /// 下标 i 对应 TemporalId=i 的子层, 长度为 maxNumSubLayersMinus1
    pub sub_layers: Vec<SubLayerPtl>,
}

impl ProfileTierLevel {
    pub fn parse(
        r: &mut SyntaxReader<'_>,
        profile_present_flag: bool,
        max_num_sub_layers_minus1: u32,
    ) -> ParseResult<Self> {
        r.sub_level("profile_tier_level()", |r| {
            let general = if profile_present_flag {
                Some(ProfileInfo::parse(r, None)?)
            } else {
                None
            };
            let general_level_idc = r.read_bits(
                "general_level_idc",
                8,
                ReadOptions::new().meaning_map::<LevelIdc>(),
            )?;
            if LevelIdc::from_code(general_level_idc).is_none() {
                r.log_calculated("Level", level_name(general_level_idc));
            }

            let n = max_num_sub_layers_minus1 as usize;
            let mut present = Vec::with_capacity(n);
            for i in 0..n {
                let profile = r.flag(&format!("sub_layer_profile_present_flag[{i}]"))?;
                let level = r.flag(&format!("sub_layer_level_present_flag[{i}]"))?;
                present.push((profile, level));
            }
            if n > 0 {
                for i in n..8 {
                    r.read_bits(
                        &format!("reserved_zero_2bits[{i}]"),
                        2,
                        ReadOptions::new().check_equal_to(0),
                    )?;
                }
            }

            let mut sub_layers = Vec::with_capacity(n);
            for (i, (profile_present, level_present)) in present.into_iter().enumerate() {
                let profile = if profile_present {
                    Some(ProfileInfo::parse(r, Some(i))?)
                } else {
                    None
                };
                let level_idc = if level_present {
                    Some(r.read_bits(
                        &format!("sub_layer_level_idc[{i}]"),
                        8,
                        ReadOptions::new().meaning_map::<LevelIdc>(),
                    )?)
                } else {
                    None
                };
                sub_layers.push(SubLayerPtl { profile, level_idc });
            }

            Ok(Self {
                general,
                general_level_idc,
                sub_layers,
            })
        })
    }

    pub fn level_name(&self) -> String {
        level_name(self.general_level_idc)
    }

    /// 可读的 profile 名称
    pub fn profile_name(&self) -> String {
        match &self.general {
            Some(p) => ProfileIdc::from_code(p.profile_idc)
                .map_or_else(|| format!("profile_idc={}", p.profile_idc), |v| v.meaning().to_string()),
            None => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use nalscope_core::BitWriter;

    use super::*;

    /// 写出 general profile (Main, 仅兼容标志 1/2), 不含 level
    fn write_main_profile(bw: &mut BitWriter) {
        bw.write_bits(0, 2);
        bw.write_flag(false);
        bw.write_bits(1, 5);
        bw.write_bits(0x6000_0000, 32);
        bw.write_bits(0b1001, 4);
        bw.write_bits_u64(0, 43);
        bw.write_flag(false); // general_inbld_flag
    }

    #[test]
    fn test_level_name() {
        assert_eq!(level_name(93), "Level 3.1");
        assert_eq!(level_name(120), "Level 4");
        assert_eq!(level_name(156), "Level 5.2");
        assert_eq!(LevelIdc::L6_2.meaning(), "Level 6.2");
    }

    #[test]
    fn test_ptl_without_sub_layers() {
        let mut bw = BitWriter::new();
        write_main_profile(&mut bw);
        bw.write_bits(93, 8);
        let data = bw.finish();

        let mut r = SyntaxReader::new(&data);
        let ptl = ProfileTierLevel::parse(&mut r, true, 0).unwrap();
        let general = ptl.general.as_ref().unwrap();
        assert_eq!(general.profile_idc, 1);
        assert!(general.compatible_with(1));
        assert!(general.compatible_with(2));
        assert!(!general.compatible_with(3));
        assert!(general.progressive_source_flag);
        assert!(general.frame_only_constraint_flag);
        assert!(general.range_constraints.is_none());
        assert_eq!(ptl.general_level_idc, 93);
        assert_eq!(ptl.profile_name(), "Main");
        assert_eq!(r.bits_read(), 96, "无子层时 PTL 固定 96 位");
    }

    #[test]
    fn test_ptl_with_sub_layers() {
        let mut bw = BitWriter::new();
        write_main_profile(&mut bw);
        bw.write_bits(120, 8);
        // 子层 0: 只有 level; 子层 1: 都没有
        bw.write_flag(false);
        bw.write_flag(true);
        bw.write_flag(false);
        bw.write_flag(false);
        for _ in 2..8 {
            bw.write_bits(0, 2);
        }
        bw.write_bits(90, 8);
        let data = bw.finish();

        let mut r = SyntaxReader::new(&data);
        let ptl = ProfileTierLevel::parse(&mut r, true, 2).unwrap();
        assert_eq!(ptl.sub_layers.len(), 2);
        assert_eq!(ptl.sub_layers[0].level_idc, Some(90));
        assert!(ptl.sub_layers[0].profile.is_none());
        assert_eq!(ptl.sub_layers[1], SubLayerPtl::default());
    }

    #[test]
    fn test_ptl_range_extension_constraints() {
        let mut bw = BitWriter::new();
        bw.write_bits(0, 2);
        bw.write_flag(true);
        bw.write_bits(4, 5);
        bw.write_bits(0x0800_0000, 32);
        bw.write_bits(0, 4);
        // max_12bit .. lower_bit_rate
        for flag in [true, true, false, true, false, false, false, false, true] {
            bw.write_flag(flag);
        }
        bw.write_bits_u64(0, 34);
        bw.write_flag(false);
        bw.write_bits(153, 8);
        let data = bw.finish();

        let mut r = SyntaxReader::new(&data);
        let ptl = ProfileTierLevel::parse(&mut r, true, 0).unwrap();
        let general = ptl.general.unwrap();
        assert!(general.tier_flag);
        let rc = general.range_constraints.expect("profile 4 应读取约束标志");
        assert!(rc.max_12bit && rc.max_10bit && !rc.max_8bit && rc.max_422chroma);
        assert!(rc.lower_bit_rate);
    }

    #[test]
    fn test_ptl_reject_nonzero_reserved_bits() {
        let mut bw = BitWriter::new();
        bw.write_bits(0, 2);
        bw.write_flag(false);
        bw.write_bits(1, 5);
        bw.write_bits(0, 32);
        bw.write_bits(0, 4);
        bw.write_bits_u64(1, 43);
        bw.write_flag(false);
        bw.write_bits(93, 8);
        let data = bw.finish();

        let mut r = SyntaxReader::new(&data);
        let err = ProfileTierLevel::parse(&mut r, true, 0).expect_err("保留位非 0 应失败");
        assert!(format!("{err}").contains("general_reserved_zero_43bits"));
    }
}
