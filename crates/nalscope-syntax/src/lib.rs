//! # nalscope-syntax
//!
//! 视频基本流的语法解析器, 每种标准一个模块:
//!
//! - [`avc`]: H.264/AVC 的 SPS/PPS/VUI/HRD、条带头部、SEI 与 POC 推导
//! - [`hevc`]: H.265/HEVC 的 VPS (含多层扩展)、SPS、PPS、条带片段头、SEI 与 POC 推导
//! - [`vvc`]: H.266/VVC 的 VPS/SPS/PPS、图像头、条带头与 POC 推导
//! - [`sei`]: AVC/HEVC 共用的 SEI 分帧
//! - [`mpeg2`]: MPEG-2 视频的序列/图像头部与扩展
//!
//! 分帧由 [`annexb`] 完成, [`dispatch`] 按编解码器创建统一接口的解析器.
//!
//! ## 使用示例
//!
//! ```rust
//! use bytes::Bytes;
//! use nalscope_syntax::{Codec, create_parser, split_units};
//!
//! let data = Bytes::from_static(&[0x00, 0x00, 0x01, 0x09, 0xF0]);
//! let mut parser = create_parser(Codec::Avc, true);
//! for unit in split_units(&data, Codec::Avc) {
//!     let report = parser.parse_unit(&unit.data).unwrap();
//!     println!("{} {}", report.type_name, report.description);
//! }
//! ```

pub mod annexb;
pub mod avc;
pub mod dispatch;
pub mod hevc;
pub mod mpeg2;
pub mod scaling_list;
pub mod sei;
pub mod vvc;

// 重导出常用类型
pub use annexb::{NalUnit, split_annex_b, split_length_prefixed, split_start_code_units};
pub use dispatch::{Codec, ElementaryStreamParser, StreamSummary, UnitReport, create_parser, split_units};
