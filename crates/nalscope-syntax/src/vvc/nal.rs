//! VVC NAL 单元头部 (H.266 7.3.1.2).
//!
//! 两字节头部: forbidden_zero_bit, nuh_reserved_zero_bit, nuh_layer_id (6),
//! nal_unit_type (5), nuh_temporal_id_plus1 (3).

use nalscope_core::{ParseError, ParseResult, ReadOptions, SymbolTable, SyntaxReader, symbol_table};

symbol_table! {
    /// nal_unit_type (表 5), 覆盖全部 32 个码值
    pub enum NalUnitType {
        TrailNut = 0 => "Coded slice of a trailing picture or subpicture",
        StsaNut = 1 => "Coded slice of an STSA picture or subpicture",
        RadlNut = 2 => "Coded slice of a RADL picture or subpicture",
        RaslNut = 3 => "Coded slice of a RASL picture or subpicture",
        RsvVcl4 = 4 => "Reserved non-IRAP VCL NAL unit type",
        RsvVcl5 = 5 => "Reserved non-IRAP VCL NAL unit type",
        RsvVcl6 = 6 => "Reserved non-IRAP VCL NAL unit type",
        IdrWRadl = 7 => "Coded slice of an IDR picture or subpicture",
        IdrNLp = 8 => "Coded slice of an IDR picture or subpicture",
        CraNut = 9 => "Coded slice of a CRA picture or subpicture",
        GdrNut = 10 => "Coded slice of a GDR picture or subpicture",
        RsvIrap11 = 11 => "Reserved IRAP VCL NAL unit type",
        OpiNut = 12 => "Operating point information",
        DciNut = 13 => "Decoding capability information",
        VpsNut = 14 => "Video parameter set",
        SpsNut = 15 => "Sequence parameter set",
        PpsNut = 16 => "Picture parameter set",
        PrefixApsNut = 17 => "Adaptation parameter set",
        SuffixApsNut = 18 => "Adaptation parameter set",
        PhNut = 19 => "Picture header",
        AudNut = 20 => "AU delimiter",
        EosNut = 21 => "End of sequence",
        EobNut = 22 => "End of bitstream",
        PrefixSeiNut = 23 => "Supplemental enhancement information",
        SuffixSeiNut = 24 => "Supplemental enhancement information",
        FdNut = 25 => "Filler data",
        RsvNvcl26 = 26 => "Reserved non-VCL NAL unit type",
        RsvNvcl27 = 27 => "Reserved non-VCL NAL unit type",
        Unspec28 = 28 => "Unspecified non-VCL NAL unit type",
        Unspec29 = 29 => "Unspecified non-VCL NAL unit type",
        Unspec30 = 30 => "Unspecified non-VCL NAL unit type",
        Unspec31 = 31 => "Unspecified non-VCL NAL unit type",
    }
}

impl NalUnitType {
    /// 0..=11 为 VCL 单元
    pub fn is_vcl(self) -> bool {
        self.code() <= 11
    }

    /// IDR_W_RADL..=RSV_IRAP_11
    pub fn is_irap(self) -> bool {
        (7..=11).contains(&self.code())
    }

    pub fn is_idr(self) -> bool {
        matches!(self, Self::IdrWRadl | Self::IdrNLp)
    }

    /// 已定义的条带类型 (不含保留类型)
    pub fn is_slice(self) -> bool {
        matches!(self.code(), 0..=3 | 7..=10)
    }

    pub fn is_parameter_set(self) -> bool {
        matches!(
            self,
            Self::VpsNut | Self::SpsNut | Self::PpsNut | Self::PrefixApsNut | Self::SuffixApsNut
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalHeader {
    pub nal_unit_type: NalUnitType,
    pub nuh_layer_id: u32,
    pub nuh_temporal_id_plus1: u32,
}

impl NalHeader {
    pub const LEN: usize = 2;

    pub fn temporal_id(&self) -> u32 {
        self.nuh_temporal_id_plus1 - 1
    }

    pub fn parse(r: &mut SyntaxReader<'_>) -> ParseResult<Self> {
        r.sub_level("nal_unit_header()", |r| {
            r.read_flag("forbidden_zero_bit", ReadOptions::new().check_equal_to(0))?;
            r.read_flag("nuh_reserved_zero_bit", ReadOptions::new().check_equal_to(0))?;
            let nuh_layer_id =
                r.read_bits("nuh_layer_id", 6, ReadOptions::new().check_range(0, 55))?;
            let type_code = r.read_bits(
                "nal_unit_type",
                5,
                ReadOptions::new().meaning_map::<NalUnitType>(),
            )?;
            let nal_unit_type = NalUnitType::from_code(type_code).ok_or_else(|| {
                ParseError::constraint(format!("VVC: nal_unit_type 非法, value={type_code}"))
            })?;
            let nuh_temporal_id_plus1 = r.read_bits(
                "nuh_temporal_id_plus1",
                3,
                ReadOptions::new().check_greater(0),
            )?;
            if nal_unit_type.is_irap() && nuh_temporal_id_plus1 != 1 {
                return Err(ParseError::constraint(format!(
                    "VVC: IRAP 单元的 TemporalId 必须为 0, nuh_temporal_id_plus1={nuh_temporal_id_plus1}"
                )));
            }
            Ok(Self {
                nal_unit_type,
                nuh_layer_id,
                nuh_temporal_id_plus1,
            })
        })
    }
}
