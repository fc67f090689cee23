//! VVC profile_tier_level() (7.3.3.1) 与 general_constraints_info() (7.3.3.2).

use nalscope_core::{ParseResult, ReadOptions, SymbolTable, SyntaxReader, symbol_table};

symbol_table! {
    /// general_profile_idc (附录 A)
    pub enum ProfileIdc {
        Main10 = 1 => "Main 10",
        Main12 = 2 => "Main 12",
        Main12Intra = 10 => "Main 12 Intra",
        MultilayerMain10 = 17 => "Multilayer Main 10",
        Main10_444 = 33 => "Main 10 4:4:4",
        Main12_444 = 34 => "Main 12 4:4:4",
        Main16_444 = 35 => "Main 16 4:4:4",
        Main12_444Intra = 42 => "Main 12 4:4:4 Intra",
        Main16_444Intra = 43 => "Main 16 4:4:4 Intra",
        MultilayerMain10_444 = 49 => "Multilayer Main 10 4:4:4",
        Main10StillPicture = 65 => "Main 10 Still Picture",
        Main12StillPicture = 66 => "Main 12 Still Picture",
        Main10_444StillPicture = 97 => "Main 10 4:4:4 Still Picture",
        Main12_444StillPicture = 98 => "Main 12 4:4:4 Still Picture",
        Main16_444StillPicture = 99 => "Main 16 4:4:4 Still Picture",
    }
}

/// level_idc = 16 * 主级别 + 3 * 子级别, 如 83 -> "Level 5.1"
pub fn level_name(level_idc: u32) -> String {
    let major = level_idc / 16;
    let minor = level_idc % 16 / 3;
    if minor == 0 {
        format!("Level {major}")
    } else {
        format!("Level {major}.{minor}")
    }
}

/// general_constraints_info() 中的一个字段
#[derive(Debug, Clone, Copy)]
enum GciField {
    Flag(&'static str),
    Idc(&'static str, u32),
}

use GciField::{Flag, Idc};

/// 按码流顺序排列的约束字段, 不含 gci_present_flag 与保留位
const GCI_FIELDS: [GciField; 66] = [
    Flag("gci_intra_only_constraint_flag"),
    Flag("gci_all_layers_independent_constraint_flag"),
    Flag("gci_one_au_only_constraint_flag"),
    Idc("gci_sixteen_minus_max_bitdepth_constraint_idc", 4),
    Idc("gci_three_minus_max_chroma_format_constraint_idc", 2),
    Flag("gci_no_mixed_nalu_types_in_pic_constraint_flag"),
    Flag("gci_no_trail_constraint_flag"),
    Flag("gci_no_stsa_constraint_flag"),
    Flag("gci_no_rasl_constraint_flag"),
    Flag("gci_no_radl_constraint_flag"),
    Flag("gci_no_idr_constraint_flag"),
    Flag("gci_no_cra_constraint_flag"),
    Flag("gci_no_gdr_constraint_flag"),
    Flag("gci_no_aps_constraint_flag"),
    Flag("gci_no_idr_rpl_constraint_flag"),
    Flag("gci_one_tile_per_pic_constraint_flag"),
    Flag("gci_pic_header_in_slice_header_constraint_flag"),
    Flag("gci_one_slice_per_pic_constraint_flag"),
    Flag("gci_no_rectangular_slice_constraint_flag"),
    Flag("gci_one_slice_per_subpic_constraint_flag"),
    Flag("gci_no_subpic_info_constraint_flag"),
    Idc("gci_three_minus_max_log2_ctu_size_constraint_idc", 2),
    Flag("gci_no_partition_constraints_override_constraint_flag"),
    Flag("gci_no_mtt_constraint_flag"),
    Flag("gci_no_qtbtt_dual_tree_intra_constraint_flag"),
    Flag("gci_no_palette_constraint_flag"),
    Flag("gci_no_ibc_constraint_flag"),
    Flag("gci_no_isp_constraint_flag"),
    Flag("gci_no_mrl_constraint_flag"),
    Flag("gci_no_mip_constraint_flag"),
    Flag("gci_no_cclm_constraint_flag"),
    Flag("gci_no_ref_pic_resampling_constraint_flag"),
    Flag("gci_no_res_change_in_clvs_constraint_flag"),
    Flag("gci_no_weighted_prediction_constraint_flag"),
    Flag("gci_no_ref_wraparound_constraint_flag"),
    Flag("gci_no_temporal_mvp_constraint_flag"),
    Flag("gci_no_sbtmvp_constraint_flag"),
    Flag("gci_no_amvr_constraint_flag"),
    Flag("gci_no_bdof_constraint_flag"),
    Flag("gci_no_smvd_constraint_flag"),
    Flag("gci_no_dmvr_constraint_flag"),
    Flag("gci_no_mmvd_constraint_flag"),
    Flag("gci_no_affine_motion_constraint_flag"),
    Flag("gci_no_prof_constraint_flag"),
    Flag("gci_no_bcw_constraint_flag"),
    Flag("gci_no_ciip_constraint_flag"),
    Flag("gci_no_gpm_constraint_flag"),
    Flag("gci_no_luma_transform_size_64_constraint_flag"),
    Flag("gci_no_transform_skip_constraint_flag"),
    Flag("gci_no_bdpcm_constraint_flag"),
    Flag("gci_no_mts_constraint_flag"),
    Flag("gci_no_lfnst_constraint_flag"),
    Flag("gci_no_joint_cbcr_constraint_flag"),
    Flag("gci_no_sbt_constraint_flag"),
    Flag("gci_no_act_constraint_flag"),
    Flag("gci_no_explicit_scaling_list_constraint_flag"),
    Flag("gci_no_dep_quant_constraint_flag"),
    Flag("gci_no_sign_data_hiding_constraint_flag"),
    Flag("gci_no_cu_qp_delta_constraint_flag"),
    Flag("gci_no_chroma_qp_offset_constraint_flag"),
    Flag("gci_no_sao_constraint_flag"),
    Flag("gci_no_alf_constraint_flag"),
    Flag("gci_no_ccalf_constraint_flag"),
    Flag("gci_no_lmcs_constraint_flag"),
    Flag("gci_no_ladf_constraint_flag"),
    Flag("gci_no_virtual_boundaries_constraint_flag"),
];

/// general_constraints_info()
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GeneralConstraintsInfo {
    /// gci_present_flag=0 时为空, 否则与约束字段一一对应
    values: Vec<(&'static str, u32)>,
    pub gci_num_reserved_bits: u32,
}

impl GeneralConstraintsInfo {
    pub fn parse(r: &mut SyntaxReader<'_>) -> ParseResult<Self> {
        r.sub_level("general_constraints_info()", |r| {
            let mut gci = Self::default();
            if r.flag("gci_present_flag")? {
                for field in GCI_FIELDS {
                    let entry = match field {
                        Flag(name) => (name, u32::from(r.flag(name)?)),
                        Idc(name, width) => (name, r.bits(name, width)?),
                    };
                    gci.values.push(entry);
                }
                gci.gci_num_reserved_bits = r.bits("gci_num_reserved_bits", 8)?;
                for i in 0..gci.gci_num_reserved_bits {
                    r.flag(&format!("gci_reserved_bit[{i}]"))?;
                }
            }
            while !r.byte_aligned() {
                r.read_flag("gci_alignment_zero_bit", ReadOptions::new().check_equal_to(0))?;
            }
            Ok(gci)
        })
    }

    pub fn present(&self) -> bool {
        !self.values.is_empty()
    }

    /// 按字段名取值, 未出现时为 `None`
    pub fn get(&self, name: &str) -> Option<u32> {
        self.values.iter().find(|(n, _)| *n == name).map(|&(_, v)| v)
    }

    /// 取值为 1 的约束标志名
    pub fn active_flags(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.values
            .iter()
            .filter(|(name, v)| name.ends_with("_flag") && *v == 1)
            .map(|&(name, _)| name)
    }
}

/// profile_tier_level()
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProfileTierLevel {
    /// profileTierPresentFlag=0 时为 `None`
    pub general_profile_idc: Option<u32>,
    pub general_tier_flag: bool,
    pub general_level_idc: u32,
    pub ptl_frame_only_constraint_flag: bool,
    pub ptl_multilayer_enabled_flag: bool,
    pub general_constraints_info: Option<GeneralConstraintsInfo>,
    pub ptl_sublayer_level_present_flag: Vec<bool>,
    /// 下标 i 对应 TemporalId=i, 未出现的值已按上一子层推断
    pub sublayer_level_idc: Vec<u32>,
    pub general_sub_profile_idc: Vec<u32>,
}

impl ProfileTierLevel {
    pub fn parse(
        r: &mut SyntaxReader<'_>,
        profile_tier_present_flag: bool,
        max_num_sub_layers_minus1: u32,
    ) -> ParseResult<Self> {
        r.sub_level("profile_tier_level()", |r| {
            let mut ptl = Self::default();
            if profile_tier_present_flag {
                ptl.general_profile_idc = Some(r.read_bits(
                    "general_profile_idc",
                    7,
                    ReadOptions::new().meaning_map::<ProfileIdc>(),
                )?);
                ptl.general_tier_flag = r.read_flag(
                    "general_tier_flag",
                    ReadOptions::new().meaning("0: Main tier, 1: High tier"),
                )?;
            }
            ptl.general_level_idc = r.bits("general_level_idc", 8)?;
            r.log_calculated("Level", level_name(ptl.general_level_idc));
            ptl.ptl_frame_only_constraint_flag = r.flag("ptl_frame_only_constraint_flag")?;
            ptl.ptl_multilayer_enabled_flag = r.flag("ptl_multilayer_enabled_flag")?;
            if profile_tier_present_flag {
                ptl.general_constraints_info = Some(GeneralConstraintsInfo::parse(r)?);
            }

            let n = max_num_sub_layers_minus1 as usize;
            ptl.ptl_sublayer_level_present_flag = vec![false; n];
            for i in (0..n).rev() {
                ptl.ptl_sublayer_level_present_flag[i] =
                    r.flag(&format!("ptl_sublayer_level_present_flag[{i}]"))?;
            }
            while !r.byte_aligned() {
                r.read_flag("ptl_reserved_zero_bit", ReadOptions::new().check_equal_to(0))?;
            }
            // 未出现的子层级别等于高一子层的级别
            ptl.sublayer_level_idc = vec![ptl.general_level_idc; n];
            let mut higher = ptl.general_level_idc;
            for i in (0..n).rev() {
                if ptl.ptl_sublayer_level_present_flag[i] {
                    higher = r.bits(&format!("sublayer_level_idc[{i}]"), 8)?;
                }
                ptl.sublayer_level_idc[i] = higher;
            }

            if profile_tier_present_flag {
                let num = r.bits("ptl_num_sub_profiles", 8)?;
                for i in 0..num {
                    let idc = r.bits(&format!("general_sub_profile_idc[{i}]"), 32)?;
                    ptl.general_sub_profile_idc.push(idc);
                }
            }
            Ok(ptl)
        })
    }

    pub fn level_name(&self) -> String {
        level_name(self.general_level_idc)
    }

    /// 可读的 profile 名称
    pub fn profile_name(&self) -> String {
        match self.general_profile_idc {
            Some(idc) => ProfileIdc::from_code(idc)
                .map_or_else(|| format!("profile_idc={idc}"), |p| p.meaning().to_string()),
            None => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use nalscope_core::BitWriter;

    use super::*;

    #[test]
    fn test_level_name() {
        assert_eq!(level_name(83), "Level 5.1");
        assert_eq!(level_name(64), "Level 4");
        assert_eq!(level_name(102), "Level 6.2");
    }

    #[test]
    fn test_ptl_without_constraints_info() {
        let mut bw = BitWriter::new();
        bw.write_bits(1, 7); // Main 10
        bw.write_flag(false);
        bw.write_bits(83, 8);
        bw.write_flag(true); // ptl_frame_only_constraint_flag
        bw.write_flag(false);
        bw.write_flag(false); // gci_present_flag
        bw.write_bits(0, 5); // gci_alignment_zero_bit
        bw.write_bits(0, 8); // ptl_num_sub_profiles
        let data = bw.finish();

        let mut r = SyntaxReader::new(&data);
        let ptl = ProfileTierLevel::parse(&mut r, true, 0).expect("PTL 应可解析");
        assert_eq!(ptl.profile_name(), "Main 10");
        assert_eq!(ptl.level_name(), "Level 5.1");
        assert!(ptl.ptl_frame_only_constraint_flag);
        assert!(!ptl.general_constraints_info.as_ref().is_some_and(|g| g.present()));
        assert_eq!(r.bits_read(), 32);
    }

    #[test]
    fn test_ptl_sublayer_levels_are_inferred() {
        let mut bw = BitWriter::new();
        bw.write_bits(64, 8); // general_level_idc, 无 profile
        bw.write_flag(false);
        bw.write_flag(false);
        // i=2, 1, 0: 只有子层 1 出现
        bw.write_flag(false);
        bw.write_flag(true);
        bw.write_flag(false);
        bw.write_bits(0, 3);
        bw.write_bits(51, 8);
        let data = bw.finish();

        let mut r = SyntaxReader::new(&data);
        let ptl = ProfileTierLevel::parse(&mut r, false, 3).expect("PTL 应可解析");
        assert!(ptl.general_profile_idc.is_none());
        assert_eq!(ptl.sublayer_level_idc, vec![51, 51, 64]);
        assert_eq!(ptl.profile_name(), "");
    }

    #[test]
    fn test_gci_fields_by_name() {
        let mut bw = BitWriter::new();
        bw.write_flag(true); // gci_present_flag
        bw.write_flag(true); // intra_only
        bw.write_flag(false);
        bw.write_flag(false);
        bw.write_bits(6, 4); // sixteen_minus_max_bitdepth
        bw.write_bits(2, 2);
        // 其余 61 个字段共 62 位
        bw.write_bits(0, 31);
        bw.write_bits(0, 31);
        bw.write_bits(0, 8);
        while !bw.byte_aligned() {
            bw.write_flag(false);
        }
        let data = bw.finish();

        let mut r = SyntaxReader::new(&data);
        let gci = GeneralConstraintsInfo::parse(&mut r).expect("GCI 应可解析");
        assert!(gci.present());
        assert_eq!(gci.get("gci_sixteen_minus_max_bitdepth_constraint_idc"), Some(6));
        assert_eq!(gci.get("gci_three_minus_max_chroma_format_constraint_idc"), Some(2));
        assert_eq!(
            gci.active_flags().collect::<Vec<_>>(),
            vec!["gci_intra_only_constraint_flag"]
        );
        assert!(r.byte_aligned());
    }
}
