//! AVC 带语义标签的编码字段符号表.

use nalscope_core::symbol_table;

symbol_table! {
    /// profile_idc (附录 A)
    pub enum ProfileIdc {
        Cavlc444Intra = 44 => "CAVLC 4:4:4 Intra Profile",
        Baseline = 66 => "Baseline/Constrained Baseline Profile",
        Main = 77 => "Main Profile",
        ScalableBaseline = 83 => "Scalable Baseline/Scalable Constrained Baseline Profile",
        ScalableHigh = 86 => "Scalable High/Scalable Constrained High Profile",
        Extended = 88 => "Extended Profile",
        High = 100 => "High/Progressive High/Constrained High Profile",
        High10 = 110 => "High 10/High 10 Intra Profile",
        MultiviewHigh = 118 => "Multiview High Profile",
        High422 = 122 => "High 4:2:2/High 4:2:2 Intra Profile",
        StereoHigh = 128 => "Stereo High Profile",
        MfcHigh = 134 => "MFC High Profile",
        MfcDepthHigh = 135 => "MFC Depth High Profile",
        MultiviewDepthHigh = 138 => "Multiview Depth High Profile",
        EnhancedMultiviewDepthHigh = 139 => "Enhanced Multiview Depth High Profile",
        High444 = 244 => "High 4:4:4 Predictive Profile",
    }
}

impl ProfileIdc {
    /// 是否携带 chroma_format_idc / 位深 / 量化矩阵字段
    pub fn has_chroma_info(profile_idc: u32) -> bool {
        matches!(
            profile_idc,
            100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135
        )
    }
}

symbol_table! {
    /// chroma_format_idc
    pub enum ChromaFormat {
        Monochrome = 0 => "4:0:0",
        Yuv420 = 1 => "4:2:0",
        Yuv422 = 2 => "4:2:2",
        Yuv444 = 3 => "4:4:4",
    }
}

symbol_table! {
    /// aspect_ratio_idc (表 E-1)
    pub enum AspectRatioIdc {
        Unspecified = 0 => "Unspecified",
        Square = 1 => "1:1 (square)",
        Sar12x11 = 2 => "12:11",
        Sar10x11 = 3 => "10:11",
        Sar16x11 = 4 => "16:11",
        Sar40x33 = 5 => "40:33",
        Sar24x11 = 6 => "24:11",
        Sar20x11 = 7 => "20:11",
        Sar32x11 = 8 => "32:11",
        Sar80x33 = 9 => "80:33",
        Sar18x11 = 10 => "18:11",
        Sar15x11 = 11 => "15:11",
        Sar64x33 = 12 => "64:33",
        Sar160x99 = 13 => "160:99",
        Sar4x3 = 14 => "4:3",
        Sar3x2 = 15 => "3:2",
        Sar2x1 = 16 => "2:1",
        ExtendedSar = 255 => "Extended_SAR",
    }
}

/// aspect_ratio_idc 1..=16 对应的 (sar_width, sar_height)
const SAR_TABLE: [(u32, u32); 17] = [
    (0, 0),
    (1, 1),
    (12, 11),
    (10, 11),
    (16, 11),
    (40, 33),
    (24, 11),
    (20, 11),
    (32, 11),
    (80, 33),
    (18, 11),
    (15, 11),
    (64, 33),
    (160, 99),
    (4, 3),
    (3, 2),
    (2, 1),
];

impl AspectRatioIdc {
    /// 预定义的采样宽高比, `Unspecified` / `ExtendedSar` 返回 `None`
    pub fn sample_aspect_ratio(self) -> Option<(u32, u32)> {
        use nalscope_core::SymbolTable;
        let (w, h) = *SAR_TABLE.get(self.code() as usize)?;
        (w > 0).then_some((w, h))
    }
}

symbol_table! {
    /// video_format (表 E-2)
    pub enum VideoFormat {
        Component = 0 => "Component",
        Pal = 1 => "PAL",
        Ntsc = 2 => "NTSC",
        Secam = 3 => "SECAM",
        Mac = 4 => "MAC",
        Unspecified = 5 => "Unspecified video format",
        Reserved6 = 6 => "Reserved",
        Reserved7 = 7 => "Reserved",
    }
}

symbol_table! {
    /// colour_primaries (表 E-3)
    pub enum ColourPrimaries {
        Bt709 = 1 => "Rec. ITU-R BT.709-5 / BT.1361 / IEC 61966-2-1 (sRGB or sYCC)",
        Unspecified = 2 => "Unspecified",
        Bt470M = 4 => "Rec. ITU-R BT.470-6 System M (historical) (NTSC)",
        Bt470Bg = 5 => "Rec. ITU-R BT.470-6 System B, G (historical) / BT.601 625 / BT.1358 625 / BT.1700 PAL and 625 SECAM",
        Bt601 = 6 => "Rec. ITU-R BT.601-6 525 / BT.1358 525 / BT.1700 NTSC",
        Smpte240M = 7 => "SMPTE 240M (1999)",
        GenericFilm = 8 => "Generic film (colour filters using Illuminant C)",
        Bt2020 = 9 => "Rec. ITU-R BT.2020",
        Xyz = 10 => "SMPTE ST 428-1 (CIE 1931 XYZ)",
        Dci = 11 => "SMPTE RP 431-2 (DCI-P3)",
        DisplayP3 = 12 => "SMPTE EG 432-1 (Display P3)",
        Ebu3213 = 22 => "EBU Tech. 3213-E",
    }
}

symbol_table! {
    /// transfer_characteristics (表 E-4)
    pub enum TransferCharacteristics {
        Bt709 = 1 => "Rec. ITU-R BT.709-5 / BT.1361 conventional colour gamut system",
        Unspecified = 2 => "Unspecified",
        Gamma22 = 4 => "Rec. ITU-R BT.470-6 System M (historical) (NTSC)",
        Gamma28 = 5 => "Rec. ITU-R BT.470-6 System B, G (historical)",
        Bt601 = 6 => "Rec. ITU-R BT.601-6 525 or 625 / BT.1358 / BT.1700 NTSC / SMPTE 170M",
        Smpte240M = 7 => "SMPTE 240M (1999)",
        Linear = 8 => "Linear transfer characteristics",
        Log100 = 9 => "Logarithmic transfer characteristic (100:1 range)",
        Log316 = 10 => "Logarithmic transfer characteristic (100 * Sqrt( 10 ) : 1 range)",
        Iec61966_2_4 = 11 => "IEC 61966-2-4",
        Bt1361 = 12 => "Rec. ITU-R BT.1361 extended colour gamut system",
        Srgb = 13 => "IEC 61966-2-1 (sRGB or sYCC)",
        Bt2020Ten = 14 => "Rec. ITU-R BT.2020 for 10 bit system",
        Bt2020Twelve = 15 => "Rec. ITU-R BT.2020 for 12 bit system",
        Pq = 16 => "SMPTE ST 2084 (PQ)",
        Smpte428 = 17 => "SMPTE ST 428-1",
        Hlg = 18 => "ARIB STD-B67 (HLG)",
    }
}

symbol_table! {
    /// matrix_coefficients (表 E-5)
    pub enum MatrixCoefficients {
        Rgb = 0 => "RGB IEC 61966-2-1 (sRGB)",
        Bt709 = 1 => "Rec. ITU-R BT.709-5 / BT.1361",
        Unspecified = 2 => "Unspecified",
        Fcc = 4 => "US FCC Title 47 CFR (2003) 73.682 (a) (20)",
        Bt470Bg = 5 => "Rec. ITU-R BT.470-6 System B, G / BT.601-6 625 / BT.1358 625 / BT.1700 625 PAL and 625 SECAM",
        Bt601 = 6 => "Rec. ITU-R BT.601-6 525 / BT.1358 525 / BT.1700 NTSC / SMPTE 170M",
        Smpte240M = 7 => "SMPTE 240M (1999)",
        YCgCo = 8 => "YCgCo",
        Bt2020Ncl = 9 => "Rec. ITU-R BT.2020 non-constant luminance system",
        Bt2020Cl = 10 => "Rec. ITU-R BT.2020 constant luminance system",
        Smpte2085 = 11 => "SMPTE ST 2085 (Y'D'zD'x)",
        ChromaNcl = 12 => "Chromaticity-derived non-constant luminance system",
        ChromaCl = 13 => "Chromaticity-derived constant luminance system",
        ICtCp = 14 => "Rec. ITU-R BT.2100 ICtCp",
    }
}

symbol_table! {
    /// slice_type (表 7-6), 5..=9 表示整幅图像的所有条带类型相同
    pub enum SliceTypeCode {
        P = 0 => "P (P slice)",
        B = 1 => "B (B slice)",
        I = 2 => "I (I slice)",
        Sp = 3 => "SP (SP slice)",
        Si = 4 => "SI (SI slice)",
        PAll = 5 => "P (P slice) all slices",
        BAll = 6 => "B (B slice) all slices",
        IAll = 7 => "I (I slice) all slices",
        SpAll = 8 => "SP (SP slice) all slices",
        SiAll = 9 => "SI (SI slice) all slices",
    }
}

/// 条带类型 (slice_type % 5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SliceType {
    P,
    B,
    I,
    Sp,
    Si,
}

impl SliceType {
    /// 由 slice_type 码值 (0..=9) 得到条带类型
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code % 5 {
            0 => Self::P,
            1 => Self::B,
            2 => Self::I,
            3 => Self::Sp,
            _ => Self::Si,
        })
        .filter(|_| code <= 9)
    }

    /// 是否为帧内条带 (I / SI)
    pub fn is_intra(self) -> bool {
        matches!(self, Self::I | Self::Si)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::P => "P",
            Self::B => "B",
            Self::I => "I",
            Self::Sp => "SP",
            Self::Si => "SI",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalscope_core::SymbolTable;

    #[test]
    fn test_sar_lookup() {
        assert_eq!(AspectRatioIdc::Sar16x11.sample_aspect_ratio(), Some((16, 11)));
        assert_eq!(AspectRatioIdc::Unspecified.sample_aspect_ratio(), None);
        assert_eq!(AspectRatioIdc::ExtendedSar.sample_aspect_ratio(), None);
        assert_eq!(AspectRatioIdc::from_code(255), Some(AspectRatioIdc::ExtendedSar));
        assert_eq!(AspectRatioIdc::meaning_of(17), None);
    }

    #[test]
    fn test_slice_type_mod_5() {
        assert_eq!(SliceType::from_code(7), Some(SliceType::I));
        assert_eq!(SliceType::from_code(5), Some(SliceType::P));
        assert_eq!(SliceType::from_code(10), None);
        assert!(SliceType::Si.is_intra());
        assert!(!SliceType::B.is_intra());
    }

    #[test]
    fn test_high_profile_set() {
        for p in [100, 110, 122, 244, 44, 83, 86, 118, 128, 138, 139, 134, 135] {
            assert!(ProfileIdc::has_chroma_info(p), "profile {p} 应携带色度信息");
        }
        assert!(!ProfileIdc::has_chroma_info(66));
        assert!(!ProfileIdc::has_chroma_info(77));
        assert_eq!(ProfileIdc::from_code(100), Some(ProfileIdc::High));
    }
}
