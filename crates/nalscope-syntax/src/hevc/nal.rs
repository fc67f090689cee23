//! HEVC NAL 单元头部 (7.3.1.2).
//!
//! HEVC NAL 头部为 2 字节:
//! - forbidden_zero_bit (1 bit)
//! - nal_unit_type (6 bits)
//! - nuh_layer_id (6 bits)
//! - nuh_temporal_id_plus1 (3 bits)

use nalscope_core::{ParseError, ParseResult, ReadOptions, SymbolTable, SyntaxReader, symbol_table};

symbol_table! {
    /// nal_unit_type (表 7-1), 覆盖全部 64 个码值
    pub enum NalUnitType {
        TrailN = 0 => "Coded slice segment of a non-TSA, non-STSA trailing picture",
        TrailR = 1 => "Coded slice segment of a non-TSA, non-STSA trailing picture",
        TsaN = 2 => "Coded slice segment of a TSA picture",
        TsaR = 3 => "Coded slice segment of a TSA picture",
        StsaN = 4 => "Coded slice segment of an STSA picture",
        StsaR = 5 => "Coded slice segment of an STSA picture",
        RadlN = 6 => "Coded slice segment of a RADL picture",
        RadlR = 7 => "Coded slice segment of a RADL picture",
        RaslN = 8 => "Coded slice segment of a RASL picture",
        RaslR = 9 => "Coded slice segment of a RASL picture",
        RsvVclN10 = 10 => "Reserved non-IRAP SLNR VCL NAL unit type",
        RsvVclR11 = 11 => "Reserved non-IRAP sub-layer reference VCL NAL unit type",
        RsvVclN12 = 12 => "Reserved non-IRAP SLNR VCL NAL unit type",
        RsvVclR13 = 13 => "Reserved non-IRAP sub-layer reference VCL NAL unit type",
        RsvVclN14 = 14 => "Reserved non-IRAP SLNR VCL NAL unit type",
        RsvVclR15 = 15 => "Reserved non-IRAP sub-layer reference VCL NAL unit type",
        BlaWLp = 16 => "Coded slice segment of a BLA picture",
        BlaWRadl = 17 => "Coded slice segment of a BLA picture",
        BlaNLp = 18 => "Coded slice segment of a BLA picture",
        IdrWRadl = 19 => "Coded slice segment of an IDR picture",
        IdrNLp = 20 => "Coded slice segment of an IDR picture",
        CraNut = 21 => "Coded slice segment of a CRA picture",
        RsvIrapVcl22 = 22 => "Reserved IRAP VCL NAL unit type",
        RsvIrapVcl23 = 23 => "Reserved IRAP VCL NAL unit type",
        RsvVcl24 = 24 => "Reserved non-IRAP VCL NAL unit type",
        RsvVcl25 = 25 => "Reserved non-IRAP VCL NAL unit type",
        RsvVcl26 = 26 => "Reserved non-IRAP VCL NAL unit type",
        RsvVcl27 = 27 => "Reserved non-IRAP VCL NAL unit type",
        RsvVcl28 = 28 => "Reserved non-IRAP VCL NAL unit type",
        RsvVcl29 = 29 => "Reserved non-IRAP VCL NAL unit type",
        RsvVcl30 = 30 => "Reserved non-IRAP VCL NAL unit type",
        RsvVcl31 = 31 => "Reserved non-IRAP VCL NAL unit type",
        VpsNut = 32 => "Video parameter set",
        SpsNut = 33 => "Sequence parameter set",
        PpsNut = 34 => "Picture parameter set",
        AudNut = 35 => "Access unit delimiter",
        EosNut = 36 => "End of sequence",
        EobNut = 37 => "End of bitstream",
        FdNut = 38 => "Filler data",
        PrefixSeiNut = 39 => "Supplemental enhancement information",
        SuffixSeiNut = 40 => "Supplemental enhancement information",
        RsvNvcl41 = 41 => "Reserved",
        RsvNvcl42 = 42 => "Reserved",
        RsvNvcl43 = 43 => "Reserved",
        RsvNvcl44 = 44 => "Reserved",
        RsvNvcl45 = 45 => "Reserved",
        RsvNvcl46 = 46 => "Reserved",
        RsvNvcl47 = 47 => "Reserved",
        Unspec48 = 48 => "Unspecified",
        Unspec49 = 49 => "Unspecified",
        Unspec50 = 50 => "Unspecified",
        Unspec51 = 51 => "Unspecified",
        Unspec52 = 52 => "Unspecified",
        Unspec53 = 53 => "Unspecified",
        Unspec54 = 54 => "Unspecified",
        Unspec55 = 55 => "Unspecified",
        Unspec56 = 56 => "Unspecified",
        Unspec57 = 57 => "Unspecified",
        Unspec58 = 58 => "Unspecified",
        Unspec59 = 59 => "Unspecified",
        Unspec60 = 60 => "Unspecified",
        Unspec61 = 61 => "Unspecified",
        Unspec62 = 62 => "Unspecified",
        Unspec63 = 63 => "Unspecified",
    }
}

impl NalUnitType {
    /// 是否为 VCL NAL (0..=31)
    pub fn is_vcl(self) -> bool {
        self.code() < 32
    }

    /// IRAP (Intra Random Access Point): BLA / IDR / CRA 及保留的 22, 23
    pub fn is_irap(self) -> bool {
        (16..=23).contains(&self.code())
    }

    pub fn is_idr(self) -> bool {
        matches!(self, Self::IdrWRadl | Self::IdrNLp)
    }

    pub fn is_bla(self) -> bool {
        matches!(self, Self::BlaWLp | Self::BlaWRadl | Self::BlaNLp)
    }

    /// 子层非参考图像 (SLNR)
    pub fn is_slnr(self) -> bool {
        matches!(
            self,
            Self::TrailN
                | Self::TsaN
                | Self::StsaN
                | Self::RadlN
                | Self::RaslN
                | Self::RsvVclN10
                | Self::RsvVclN12
                | Self::RsvVclN14
        )
    }

    pub fn is_radl(self) -> bool {
        matches!(self, Self::RadlN | Self::RadlR)
    }

    pub fn is_rasl(self) -> bool {
        matches!(self, Self::RaslN | Self::RaslR)
    }

    /// 是否为已定义 (非保留) 的条带片段类型
    pub fn is_slice(self) -> bool {
        matches!(self.code(), 0..=9 | 16..=21)
    }
}

/// 解析后的 NAL 头部
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalHeader {
    pub nal_unit_type: NalUnitType,
    pub nuh_layer_id: u32,
    pub nuh_temporal_id_plus1: u32,
}

impl NalHeader {
    /// 头部字节数
    pub const LEN: usize = 2;

    /// TemporalId = nuh_temporal_id_plus1 - 1
    pub fn temporal_id(&self) -> u32 {
        self.nuh_temporal_id_plus1 - 1
    }

    /// 解析 nal_unit_header, 读取器须位于 NAL 首字节
    pub fn parse(r: &mut SyntaxReader<'_>) -> ParseResult<Self> {
        r.sub_level("nal_unit_header()", |r| {
            r.read_flag("forbidden_zero_bit", ReadOptions::new().check_equal_to(0))?;
            let type_code = r.read_bits(
                "nal_unit_type",
                6,
                ReadOptions::new().meaning_map::<NalUnitType>(),
            )?;
            let nal_unit_type = NalUnitType::from_code(type_code).ok_or_else(|| {
                ParseError::constraint(format!("HEVC: nal_unit_type 非法, value={type_code}"))
            })?;
            let nuh_layer_id =
                r.read_bits("nuh_layer_id", 6, ReadOptions::new().check_range(0, 55))?;
            let nuh_temporal_id_plus1 = r.read_bits(
                "nuh_temporal_id_plus1",
                3,
                ReadOptions::new().check_greater(0),
            )?;
            if nal_unit_type.is_irap() && nuh_temporal_id_plus1 != 1 {
                return Err(ParseError::constraint(format!(
                    "HEVC: IRAP 图像的 TemporalId 必须为 0, nuh_temporal_id_plus1={nuh_temporal_id_plus1}"
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

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(bytes: &[u8]) -> ParseResult<NalHeader> {
        let mut r = SyntaxReader::new(bytes);
        NalHeader::parse(&mut r)
    }

    #[test]
    fn test_nal_type_table_complete() {
        for code in 0..64 {
            let t = NalUnitType::from_code(code).expect("64 个码值都应有定义");
            assert_eq!(t.code(), code);
        }
        assert_eq!(NalUnitType::from_code(64), None);
    }

    #[test]
    fn test_nal_header_parse_vps() {
        // VPS: 0x40 0x01
        let header = parse(&[0x40, 0x01]).unwrap();
        assert_eq!(header.nal_unit_type, NalUnitType::VpsNut);
        assert_eq!(header.nuh_layer_id, 0);
        assert_eq!(header.temporal_id(), 0);
    }

    #[test]
    fn test_nal_header_layer_id() {
        // type=1, layer_id=5, tid_plus1=3: 0_000001_000101_011
        let header = parse(&[0x02, 0x2B]).unwrap();
        assert_eq!(header.nal_unit_type, NalUnitType::TrailR);
        assert_eq!(header.nuh_layer_id, 5);
        assert_eq!(header.temporal_id(), 2);
    }

    #[test]
    fn test_nal_header_reject_zero_temporal_id_plus1() {
        let err = parse(&[0x40, 0x00]).expect_err("nuh_temporal_id_plus1=0 应失败");
        let msg = format!("{err}");
        assert!(
            msg.contains("nuh_temporal_id_plus1"),
            "错误信息应包含字段名, actual={}",
            msg
        );
    }

    #[test]
    fn test_nal_header_reject_layer_id_out_of_range() {
        // layer_id=56: 0_100000_111000_001 -> 0x41 0xC1
        let err = parse(&[0x41, 0xC1]).expect_err("nuh_layer_id=56 应失败");
        assert!(format!("{err}").contains("nuh_layer_id"));
    }

    #[test]
    fn test_nal_type_predicates() {
        assert!(NalUnitType::CraNut.is_irap());
        assert!(NalUnitType::RsvIrapVcl23.is_irap());
        assert!(!NalUnitType::RsvVcl24.is_irap());
        assert!(NalUnitType::IdrNLp.is_idr());
        assert!(NalUnitType::RsvVclN14.is_slnr());
        assert!(!NalUnitType::TrailR.is_slnr());
        assert!(NalUnitType::RadlR.is_radl());
        assert!(NalUnitType::RaslN.is_rasl());
        assert!(NalUnitType::BlaNLp.is_slice());
        assert!(!NalUnitType::RsvIrapVcl22.is_slice());
        assert!(!NalUnitType::SpsNut.is_vcl());
    }
}
