//! # nalscope
//!
//! 视频基本流语法检查工具集: 逐个 NAL 单元 (或 MPEG-2 起始码单元) 解析参数集、
//! 条带头部等语法结构, 校验取值约束, 并输出带注释的字段列表.
//!
//! 支持 H.264/AVC、H.265/HEVC (含多层 VPS 扩展)、H.266/VVC (单元分类) 与 MPEG-2 视频.
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use nalscope::syntax::{Codec, create_parser, split_units};
//!
//! let data = bytes::Bytes::from(std::fs::read("input.264").unwrap());
//! let mut parser = create_parser(Codec::Avc, false);
//! for unit in split_units(&data, Codec::Avc) {
//!     match parser.parse_unit(&unit.data) {
//!         Ok(report) => println!("{:>8} {} {}", unit.offset, report.type_name, report.description),
//!         Err(err) => eprintln!("{:>8} 解析失败: {err}", unit.offset),
//!     }
//! }
//! if let Some(summary) = parser.summary() {
//!     println!("{}x{}", summary.width, summary.height);
//! }
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `nalscope-core` | 比特读取、注释日志、符号表、参数集存储 |
//! | `nalscope-syntax` | AVC/HEVC/VVC/MPEG-2 语法解析与分帧 |

pub mod logging;

/// 基础设施
pub use nalscope_core as core;

/// 各标准的语法解析器
pub use nalscope_syntax as syntax;

/// 获取 nalscope 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
