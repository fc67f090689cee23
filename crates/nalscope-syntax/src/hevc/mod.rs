//! H.265/HEVC 语法解析.
//!
//! - NAL 头部与 64 种单元类型
//! - VPS (含多层扩展的层依赖图、输出层集合与 vps_vui)、SPS、PPS、profile_tier_level、HRD
//! - 条带片段头 (含 RPS、加权预测表、入口点) 与 POC 推导
//! - 前缀/后缀 SEI
//! - [`HevcParser`]: 按码流顺序维护 VPS/SPS/PPS 存储与 POC 状态

pub mod hrd;
pub mod nal;
pub mod parser;
pub mod poc;
pub mod pps;
pub mod pred_weight;
pub mod ptl;
pub mod rps;
pub mod scaling;
pub mod sei;
pub mod slice;
pub mod sps;
pub mod vps;
pub mod vps_extension;
pub mod vps_vui;
pub mod vui;

#[cfg(test)]
mod tests;

pub use hrd::HrdParameters;
pub use nal::{NalHeader, NalUnitType};
pub use parser::{HevcParameterSets, HevcParser, HevcParserConfig, HevcPayload, HevcUnit};
pub use poc::{PicOrderCount, PocInput, PocState, derive_poc};
pub use pps::{Parallelism, Pps, TileLayout};
pub use pred_weight::PredWeightTable;
pub use ptl::ProfileTierLevel;
pub use rps::ShortTermRps;
pub use scaling::ScalingListData;
pub use sei::SeiPayload;
pub use slice::{SliceSegmentHeader, SliceType};
pub use sps::{ConformanceWindow, Sps, SpsDerived};
pub use vps::{LayerIdList, Vps};
pub use vps_extension::{OutputLayerSet, RepFormat, ScalabilityMask, VpsExtension};
pub use vps_vui::{BspHrdParams, VpsVui};
pub use vui::VuiParameters;
