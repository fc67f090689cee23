//! H.264/AVC 语法解析.
//!
//! - NAL 头部 (含 SVC/MVC/3D-AVC 扩展头)
//! - SPS / subset SPS / PPS, 含 VUI、HRD 与量化矩阵回退规则
//! - 条带头及其子结构, 以及逐条带的 POC 推导
//! - SEI: buffering_period、pic_timing、user_data_unregistered、recovery_point
//! - [`AvcParser`]: 按码流顺序维护参数集存储与 POC 状态

pub mod hrd;
pub mod nal;
pub mod parser;
pub mod poc;
pub mod pps;
pub mod scaling;
pub mod sei;
pub mod slice;
pub mod sps;
pub mod tables;
pub mod vui;

#[cfg(test)]
mod tests;

pub use nal::{HeaderExtension, NalHeader, NalUnitType};
pub use parser::{AvcParameterSets, AvcParser, AvcParserConfig, AvcPayload, AvcUnit};
pub use poc::{PicOrderCount, PocDiagnostic, PocInput, PocState, derive_poc};
pub use pps::{Pps, SliceGroupMap};
pub use sei::SeiPayload;
pub use slice::{SliceDecodingContext, SliceHeader};
pub use sps::{PicOrderCntInfo, Sps};
pub use vui::VuiParameters;

/// Ceil(Log2(v)), v 为 0 或 1 时为 0
pub(crate) fn ceil_log2(v: u32) -> u32 {
    if v <= 1 {
        0
    } else {
        32 - (v - 1).leading_zeros()
    }
}
