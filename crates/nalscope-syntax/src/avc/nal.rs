//! AVC NAL 单元头部.
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ forbidden_zero_bit(1) | nal_ref_idc(2) | nal_unit_type(5) │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! 类型 14/20/21 之后还有 3 字节扩展头 (SVC / MVC / 3D-AVC).

use nalscope_core::{ParseResult, ReadOptions, SymbolTable, SyntaxReader, symbol_table};

symbol_table! {
    /// nal_unit_type (表 7-1), 覆盖全部 32 个码值
    pub enum NalUnitType {
        Unspecified0 = 0 => "Unspecified",
        CodedSliceNonIdr = 1 => "Coded slice of a non-IDR picture",
        CodedSliceDataPartitionA = 2 => "Coded slice data partition A",
        CodedSliceDataPartitionB = 3 => "Coded slice data partition B",
        CodedSliceDataPartitionC = 4 => "Coded slice data partition C",
        CodedSliceIdr = 5 => "Coded slice of an IDR picture",
        Sei = 6 => "Supplemental enhancement information (SEI)",
        Sps = 7 => "Sequence parameter set",
        Pps = 8 => "Picture parameter set",
        AccessUnitDelimiter = 9 => "Access unit delimiter",
        EndOfSequence = 10 => "End of sequence",
        EndOfStream = 11 => "End of stream",
        FillerData = 12 => "Filler data",
        SpsExtension = 13 => "Sequence parameter set extension",
        PrefixNal = 14 => "Prefix NAL unit",
        SubsetSps = 15 => "Subset sequence parameter set",
        DepthParameterSet = 16 => "Depth parameter set",
        Reserved17 = 17 => "Reserved",
        Reserved18 = 18 => "Reserved",
        AuxiliarySlice = 19 => "Coded slice of an auxiliary coded picture without partitioning",
        CodedSliceExtension = 20 => "Coded slice extension",
        CodedSliceExtensionDepth = 21 => "Coded slice extension for a depth view component or a 3D-AVC texture view component",
        Reserved22 = 22 => "Reserved",
        Reserved23 = 23 => "Reserved",
        Unspecified24 = 24 => "Unspecified",
        Unspecified25 = 25 => "Unspecified",
        Unspecified26 = 26 => "Unspecified",
        Unspecified27 = 27 => "Unspecified",
        Unspecified28 = 28 => "Unspecified",
        Unspecified29 = 29 => "Unspecified",
        Unspecified30 = 30 => "Unspecified",
        Unspecified31 = 31 => "Unspecified",
    }
}

impl NalUnitType {
    /// 是否为 VCL NAL (1..=5)
    pub fn is_vcl(self) -> bool {
        (1..=5).contains(&self.code())
    }

    pub fn is_idr(self) -> bool {
        self == Self::CodedSliceIdr
    }

    /// 是否携带 slice_header()
    pub fn has_slice_header(self) -> bool {
        matches!(
            self,
            Self::CodedSliceNonIdr
                | Self::CodedSliceIdr
                | Self::CodedSliceDataPartitionA
                | Self::CodedSliceExtension
                | Self::CodedSliceExtensionDepth
        )
    }

    /// 头部之后是否跟随 3 字节扩展头
    pub fn has_header_extension(self) -> bool {
        matches!(
            self,
            Self::PrefixNal | Self::CodedSliceExtension | Self::CodedSliceExtensionDepth
        )
    }
}

/// nal_unit_header_mvc_extension()
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MvcExtension {
    pub non_idr_flag: bool,
    pub priority_id: u32,
    pub view_id: u32,
    pub temporal_id: u32,
    pub anchor_pic_flag: bool,
    pub inter_view_flag: bool,
}

/// nal_unit_header_svc_extension()
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SvcExtension {
    pub idr_flag: bool,
    pub priority_id: u32,
    pub no_inter_layer_pred_flag: bool,
    pub dependency_id: u32,
    pub quality_id: u32,
    pub temporal_id: u32,
    pub use_ref_base_pic_flag: bool,
    pub discardable_flag: bool,
    pub output_flag: bool,
}

/// 扩展头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderExtension {
    Svc(SvcExtension),
    Mvc(MvcExtension),
    /// nal_unit_header_3davc_extension(), 不展开
    Avc3d,
}

/// 解析后的 NAL 头部
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NalHeader {
    pub nal_ref_idc: u32,
    pub nal_unit_type: NalUnitType,
    pub extension: Option<HeaderExtension>,
}

impl NalHeader {
    /// 头部字节数 (含扩展头)
    pub fn header_len(&self) -> usize {
        if self.nal_unit_type.has_header_extension() {
            4
        } else {
            1
        }
    }

    /// IdrPicFlag: 类型 5, 或 MVC 扩展头中 non_idr_flag=0
    pub fn idr_pic_flag(&self) -> bool {
        match self.extension {
            Some(HeaderExtension::Mvc(ext)) => !ext.non_idr_flag,
            Some(HeaderExtension::Svc(ext)) => ext.idr_flag,
            _ => self.nal_unit_type.is_idr(),
        }
    }

    /// 解析 nal_unit_header, 读取器须位于 NAL 首字节
    pub fn parse(r: &mut SyntaxReader<'_>) -> ParseResult<Self> {
        r.sub_level("nal_unit_header()", |r| {
            r.read_flag("forbidden_zero_bit", ReadOptions::new().check_equal_to(0))?;
            let nal_ref_idc = r.bits("nal_ref_idc", 2)?;
            let type_code = r.read_bits(
                "nal_unit_type",
                5,
                ReadOptions::new().meaning_map::<NalUnitType>(),
            )?;
            let nal_unit_type = NalUnitType::from_code(type_code).ok_or_else(|| {
                nalscope_core::ParseError::constraint(format!(
                    "AVC: nal_unit_type 非法, value={type_code}"
                ))
            })?;

            let extension = if nal_unit_type.has_header_extension() {
                Some(parse_header_extension(r, nal_unit_type)?)
            } else {
                None
            };

            Ok(Self {
                nal_ref_idc,
                nal_unit_type,
                extension,
            })
        })
    }
}

fn parse_header_extension(
    r: &mut SyntaxReader<'_>,
    nal_unit_type: NalUnitType,
) -> ParseResult<HeaderExtension> {
    let is_3d = if nal_unit_type == NalUnitType::CodedSliceExtensionDepth {
        r.flag("avc_3d_extension_flag")?
    } else {
        false
    };
    if is_3d {
        r.skip("nal_unit_header_3davc_extension()", 23)?;
        return Ok(HeaderExtension::Avc3d);
    }

    let svc = if nal_unit_type == NalUnitType::CodedSliceExtensionDepth {
        false
    } else {
        r.flag("svc_extension_flag")?
    };

    if svc {
        r.sub_level("nal_unit_header_svc_extension()", |r| {
            let ext = SvcExtension {
                idr_flag: r.flag("idr_flag")?,
                priority_id: r.bits("priority_id", 6)?,
                no_inter_layer_pred_flag: r.flag("no_inter_layer_pred_flag")?,
                dependency_id: r.bits("dependency_id", 3)?,
                quality_id: r.bits("quality_id", 4)?,
                temporal_id: r.bits("temporal_id", 3)?,
                use_ref_base_pic_flag: r.flag("use_ref_base_pic_flag")?,
                discardable_flag: r.flag("discardable_flag")?,
                output_flag: r.flag("output_flag")?,
            };
            r.read_bits("reserved_three_2bits", 2, ReadOptions::new().check_equal_to(3))?;
            Ok(HeaderExtension::Svc(ext))
        })
    } else {
        r.sub_level("nal_unit_header_mvc_extension()", |r| {
            let ext = MvcExtension {
                non_idr_flag: r.flag("non_idr_flag")?,
                priority_id: r.bits("priority_id", 6)?,
                view_id: r.bits("view_id", 10)?,
                temporal_id: r.bits("temporal_id", 3)?,
                anchor_pic_flag: r.flag("anchor_pic_flag")?,
                inter_view_flag: r.flag("inter_view_flag")?,
            };
            r.read_flag("reserved_one_bit", ReadOptions::new().check_equal_to(1))?;
            Ok(HeaderExtension::Mvc(ext))
        })
    }
}
