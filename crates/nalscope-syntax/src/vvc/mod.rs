//! H.266/VVC 语法解析.
//!
//! - NAL 头部与 32 种单元类型
//! - VPS (层依赖、输出层集合、OLS 的 DPB 与 HRD)、SPS、PPS (tile 与矩形条带划分)
//! - profile_tier_level 与 general_constraints_info、dpb/HRD 参数、VUI
//! - 图像头 (独立 PH_NUT 或嵌入条带头)、条带头 (参考图像列表、加权预测表、入口点) 与 POC 推导
//! - [`VvcParser`]: 按码流顺序维护 VPS/SPS/PPS 存储、当前图像头与 POC 状态

pub mod hrd;
pub mod layout;
pub mod nal;
pub mod parser;
pub mod ph;
pub mod poc;
pub mod pps;
pub mod pred_weight;
pub mod ptl;
pub mod rpl;
pub mod slice;
pub mod sps;
pub mod vps;
pub mod vui;

#[cfg(test)]
mod tests;

pub use crate::hevc::pps::Parallelism;
pub use hrd::{DpbParameters, GeneralTimingHrd, OlsTimingHrd};
pub use layout::{PictureLayout, RectSlice};
pub use nal::{NalHeader, NalUnitType};
pub use parser::{VvcParameterSets, VvcParser, VvcParserConfig, VvcPayload, VvcUnit};
pub use ph::{DeblockingParams, PictureHeader};
pub use poc::{PicOrderCount, PocInput, PocState, derive_poc};
pub use pps::Pps;
pub use pred_weight::PredWeightTable;
pub use ptl::{GeneralConstraintsInfo, ProfileTierLevel};
pub use rpl::{RefPicListStruct, RefPicLists};
pub use slice::SliceHeader;
pub use sps::{Sps, SpsDerived};
pub use vps::{OutputLayerSet, Vps};
pub use vui::VuiParameters;
