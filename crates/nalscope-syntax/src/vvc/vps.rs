//! VVC 视频参数集 (video_parameter_set_rbsp, 7.3.2.3).
//!
//! 解析层依赖、输出层集合 (OLS)、各 OLS 的 PTL/DPB/HRD 索引, 并推导
//! TotalNumOlss、LayerIdInOls、OutputLayerIdInOls 与 NumMultiLayerOlss.

use log::debug;
use nalscope_core::{ParameterSet, ParseError, ParseResult, ReadOptions, SyntaxReader};

use super::hrd::{DpbParameters, GeneralTimingHrd, OlsTimingHrd};
use super::ptl::ProfileTierLevel;
use crate::avc::sps::read_trailing_bits;

/// VPS 中的一层
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VpsLayer {
    pub vps_layer_id: u32,
    pub vps_independent_layer_flag: bool,
    pub vps_max_tid_ref_present_flag: bool,
    /// 下标 j < i
    pub vps_direct_ref_layer_flag: Vec<bool>,
    pub vps_max_tid_il_ref_pics_plus1: Vec<u32>,
}

/// 多层 OLS 的 DPB 描述
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OlsDpbInfo {
    pub vps_ols_dpb_pic_width: u32,
    pub vps_ols_dpb_pic_height: u32,
    pub vps_ols_dpb_chroma_format: u32,
    pub vps_ols_dpb_bitdepth_minus8: u32,
    /// 未出现时已推断
    pub vps_ols_dpb_params_idx: u32,
}

/// VPS 的定时与 HRD 参数
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VpsTimingHrd {
    pub general: GeneralTimingHrd,
    pub vps_sublayer_cpb_params_present_flag: bool,
    /// (vps_hrd_max_tid, ols_timing_hrd_parameters)
    pub ols: Vec<(u32, OlsTimingHrd)>,
    /// 下标为多层 OLS 序号, 未出现时已推断
    pub vps_ols_timing_hrd_idx: Vec<u32>,
}

/// 推导出的输出层集合
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutputLayerSet {
    /// LayerIdInOls
    pub layer_ids: Vec<u32>,
    /// OutputLayerIdInOls
    pub output_layer_ids: Vec<u32>,
    /// vps_ols_ptl_idx, 未出现时已推断
    pub ptl_idx: u32,
}

/// 视频参数集
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Vps {
    pub vps_video_parameter_set_id: u32,
    pub vps_max_layers_minus1: u32,
    pub vps_max_sublayers_minus1: u32,
    pub vps_default_ptl_dpb_hrd_max_tid_flag: bool,
    pub vps_all_independent_layers_flag: bool,
    pub layers: Vec<VpsLayer>,
    pub vps_each_layer_is_an_ols_flag: bool,
    pub vps_ols_mode_idc: u32,
    /// vps_ols_output_layer_flag[i][j], 仅 vps_ols_mode_idc=2 时非空, 下标 0 对应 OLS 1
    pub vps_ols_output_layer_flag: Vec<Vec<bool>>,
    pub vps_pt_present_flag: Vec<bool>,
    pub vps_ptl_max_tid: Vec<u32>,
    pub profile_tier_levels: Vec<ProfileTierLevel>,
    pub vps_sublayer_dpb_params_present_flag: bool,
    /// (vps_dpb_max_tid, dpb_parameters)
    pub dpb_parameters: Vec<(u32, DpbParameters)>,
    pub ols_dpb: Vec<OlsDpbInfo>,
    pub timing_hrd: Option<VpsTimingHrd>,
    pub vps_extension_flag: bool,
    pub output_layer_sets: Vec<OutputLayerSet>,
    /// 下标为 OLS 序号, 单层 OLS 为 None
    pub multi_layer_ols_idx: Vec<Option<u32>>,
}

impl ParameterSet for Vps {
    const KIND: &'static str = "VPS";
}

impl Vps {
    pub fn parse(r: &mut SyntaxReader<'_>) -> ParseResult<Self> {
        r.sub_level("video_parameter_set_rbsp()", Self::parse_body)
    }

    fn parse_body(r: &mut SyntaxReader<'_>) -> ParseResult<Self> {
        let mut vps = Self {
            vps_video_parameter_set_id: r.read_bits(
                "vps_video_parameter_set_id",
                4,
                ReadOptions::new().check_greater(0),
            )?,
            vps_max_layers_minus1: r.bits("vps_max_layers_minus1", 6)?,
            vps_max_sublayers_minus1: r.read_bits(
                "vps_max_sublayers_minus1",
                3,
                ReadOptions::new().check_range(0, 6),
            )?,
            ..Default::default()
        };
        let multi_layer = vps.vps_max_layers_minus1 > 0;
        vps.vps_default_ptl_dpb_hrd_max_tid_flag = if multi_layer && vps.vps_max_sublayers_minus1 > 0 {
            r.flag("vps_default_ptl_dpb_hrd_max_tid_flag")?
        } else {
            true
        };
        vps.vps_all_independent_layers_flag = !multi_layer || r.flag("vps_all_independent_layers_flag")?;

        vps.parse_layers(r)?;

        vps.vps_each_layer_is_an_ols_flag = !multi_layer;
        let mut num_ptls_minus1 = 0;
        if multi_layer {
            if vps.vps_all_independent_layers_flag {
                vps.vps_each_layer_is_an_ols_flag = r.flag("vps_each_layer_is_an_ols_flag")?;
            }
            if !vps.vps_each_layer_is_an_ols_flag {
                vps.vps_ols_mode_idc = if vps.vps_all_independent_layers_flag {
                    2
                } else {
                    r.read_bits("vps_ols_mode_idc", 2, ReadOptions::new().check_range(0, 2))?
                };
                if vps.vps_ols_mode_idc == 2 {
                    let num_minus2 = r.bits("vps_num_output_layer_sets_minus2", 8)?;
                    for i in 1..=num_minus2 + 1 {
                        let mut flags = Vec::with_capacity(vps.layers.len());
                        for j in 0..=vps.vps_max_layers_minus1 {
                            flags.push(r.flag(&format!("vps_ols_output_layer_flag[{i}][{j}]"))?);
                        }
                        vps.vps_ols_output_layer_flag.push(flags);
                    }
                }
            }
            num_ptls_minus1 = r.bits("vps_num_ptls_minus1", 8)?;
        }
        vps.derive_output_layer_sets()?;
        let total_num_olss = vps.output_layer_sets.len() as u32;
        r.log_calculated("TotalNumOlss", total_num_olss);
        if num_ptls_minus1 + 1 > total_num_olss {
            return Err(ParseError::constraint(format!(
                "VVC: vps_num_ptls_minus1 超出 TotalNumOlss, value={num_ptls_minus1}, TotalNumOlss={total_num_olss}"
            )));
        }

        for i in 0..=num_ptls_minus1 {
            let present = i == 0 || r.flag(&format!("vps_pt_present_flag[{i}]"))?;
            vps.vps_pt_present_flag.push(present);
            let max_tid = vps.read_max_tid(r, &format!("vps_ptl_max_tid[{i}]"))?;
            vps.vps_ptl_max_tid.push(max_tid);
        }
        while !r.byte_aligned() {
            r.read_flag("vps_ptl_alignment_zero_bit", ReadOptions::new().check_equal_to(0))?;
        }
        for i in 0..=num_ptls_minus1 as usize {
            let ptl = ProfileTierLevel::parse(r, vps.vps_pt_present_flag[i], vps.vps_ptl_max_tid[i])?;
            vps.profile_tier_levels.push(ptl);
        }
        let explicit_ptl_idx = num_ptls_minus1 > 0 && num_ptls_minus1 + 1 != total_num_olss;
        for i in 0..total_num_olss {
            let idx = if explicit_ptl_idx {
                r.read_bits(
                    &format!("vps_ols_ptl_idx[{i}]"),
                    8,
                    ReadOptions::new().check_range(0, i64::from(num_ptls_minus1)),
                )?
            } else if num_ptls_minus1 == 0 {
                0
            } else {
                i
            };
            vps.output_layer_sets[i as usize].ptl_idx = idx;
        }

        if !vps.vps_each_layer_is_an_ols_flag {
            vps.parse_dpb_and_hrd(r)?;
        }

        vps.vps_extension_flag = r.flag("vps_extension_flag")?;
        if vps.vps_extension_flag {
            r.log_note("vps_extension_data_flag 未解析");
        } else {
            read_trailing_bits(r)?;
        }
        debug!(
            "VVC: VPS 解析完成, id={}, layers={}, olss={}",
            vps.vps_video_parameter_set_id,
            vps.layers.len(),
            vps.output_layer_sets.len()
        );
        Ok(vps)
    }

    /// 未出现时推断为 vps_max_sublayers_minus1
    fn read_max_tid(&self, r: &mut SyntaxReader<'_>, name: &str) -> ParseResult<u32> {
        if self.vps_default_ptl_dpb_hrd_max_tid_flag {
            Ok(self.vps_max_sublayers_minus1)
        } else {
            r.read_bits(
                name,
                3,
                ReadOptions::new().check_range(0, i64::from(self.vps_max_sublayers_minus1)),
            )
        }
    }

    fn parse_layers(&mut self, r: &mut SyntaxReader<'_>) -> ParseResult<()> {
        for i in 0..=self.vps_max_layers_minus1 as usize {
            let mut layer = VpsLayer {
                vps_layer_id: r.bits(&format!("vps_layer_id[{i}]"), 6)?,
                vps_independent_layer_flag: true,
                ..Default::default()
            };
            if let Some(prev) = self.layers.last() {
                if layer.vps_layer_id <= prev.vps_layer_id {
                    return Err(ParseError::constraint(format!(
                        "VVC: vps_layer_id 必须递增, layer[{i}]={}, layer[{}]={}",
                        layer.vps_layer_id,
                        i - 1,
                        prev.vps_layer_id
                    )));
                }
            }
            layer.vps_direct_ref_layer_flag = vec![false; i];
            layer.vps_max_tid_il_ref_pics_plus1 = vec![7; i];
            if i > 0 && !self.vps_all_independent_layers_flag {
                layer.vps_independent_layer_flag = r.flag(&format!("vps_independent_layer_flag[{i}]"))?;
                if !layer.vps_independent_layer_flag {
                    layer.vps_max_tid_ref_present_flag =
                        r.flag(&format!("vps_max_tid_ref_present_flag[{i}]"))?;
                    for j in 0..i {
                        let direct = r.flag(&format!("vps_direct_ref_layer_flag[{i}][{j}]"))?;
                        layer.vps_direct_ref_layer_flag[j] = direct;
                        if layer.vps_max_tid_ref_present_flag && direct {
                            layer.vps_max_tid_il_ref_pics_plus1[j] =
                                r.bits(&format!("vps_max_tid_il_ref_pics_plus1[{i}][{j}]"), 3)?;
                        }
                    }
                    if !layer.vps_direct_ref_layer_flag.contains(&true) {
                        return Err(ParseError::structural(format!(
                            "VVC: 非独立层 {i} 没有直接参考层"
                        )));
                    }
                }
            }
            self.layers.push(layer);
        }
        Ok(())
    }

    /// dependencyFlag 闭包: 第 i 层直接或间接参考的层序号
    pub fn reference_layer_idx(&self, i: usize) -> Vec<usize> {
        let n = self.layers.len();
        let mut dependency = vec![vec![false; n]; n];
        for a in 0..n {
            for b in 0..a {
                let direct = self.layers[a].vps_direct_ref_layer_flag[b];
                let indirect = (0..a).any(|k| self.layers[a].vps_direct_ref_layer_flag[k] && dependency[k][b]);
                dependency[a][b] = direct || indirect;
            }
        }
        dependency
            .get(i)
            .map(|row| (0..n).filter(|&j| row[j]).collect())
            .unwrap_or_default()
    }

    fn derive_output_layer_sets(&mut self) -> ParseResult<()> {
        let ids: Vec<u32> = self.layers.iter().map(|l| l.vps_layer_id).collect();
        let max_layers = ids.len();
        let total = if max_layers == 1 {
            1
        } else if self.vps_each_layer_is_an_ols_flag || self.vps_ols_mode_idc < 2 {
            max_layers
        } else {
            self.vps_ols_output_layer_flag.len() + 1
        };

        let mut olss = Vec::with_capacity(total);
        olss.push(OutputLayerSet {
            layer_ids: vec![ids[0]],
            output_layer_ids: vec![ids[0]],
            ptl_idx: 0,
        });
        for i in 1..total {
            let ols = if self.vps_each_layer_is_an_ols_flag {
                OutputLayerSet {
                    layer_ids: vec![ids[i]],
                    output_layer_ids: vec![ids[i]],
                    ptl_idx: 0,
                }
            } else if self.vps_ols_mode_idc == 0 {
                OutputLayerSet {
                    layer_ids: ids[..=i].to_vec(),
                    output_layer_ids: vec![ids[i]],
                    ptl_idx: 0,
                }
            } else if self.vps_ols_mode_idc == 1 {
                OutputLayerSet {
                    layer_ids: ids[..=i].to_vec(),
                    output_layer_ids: ids[..=i].to_vec(),
                    ptl_idx: 0,
                }
            } else {
                let flags = &self.vps_ols_output_layer_flag[i - 1];
                let mut included = vec![false; max_layers];
                let mut output_layer_ids = Vec::new();
                for (k, _) in flags.iter().enumerate().filter(|(_, f)| **f) {
                    included[k] = true;
                    output_layer_ids.push(ids[k]);
                    for ref_idx in self.reference_layer_idx(k) {
                        included[ref_idx] = true;
                    }
                }
                if output_layer_ids.is_empty() {
                    return Err(ParseError::structural(format!("VVC: OLS {i} 没有输出层")));
                }
                OutputLayerSet {
                    layer_ids: (0..max_layers).filter(|&k| included[k]).map(|k| ids[k]).collect(),
                    output_layer_ids,
                    ptl_idx: 0,
                }
            };
            olss.push(ols);
        }

        let mut next = 0;
        self.multi_layer_ols_idx = olss
            .iter()
            .map(|ols| {
                (ols.layer_ids.len() > 1).then(|| {
                    next += 1;
                    next - 1
                })
            })
            .collect();
        self.output_layer_sets = olss;
        Ok(())
    }

    /// NumMultiLayerOlss
    pub fn num_multi_layer_olss(&self) -> u32 {
        self.multi_layer_ols_idx.iter().flatten().count() as u32
    }

    fn parse_dpb_and_hrd(&mut self, r: &mut SyntaxReader<'_>) -> ParseResult<()> {
        let num_multi_layer_olss = self.num_multi_layer_olss();
        r.log_calculated("NumMultiLayerOlss", num_multi_layer_olss);
        let num_dpb_params = r.read_ue(
            "vps_num_dpb_params_minus1",
            ReadOptions::new().check_range(0, (i64::from(num_multi_layer_olss) - 1).max(0)),
        )? + 1;
        if self.vps_max_sublayers_minus1 > 0 {
            self.vps_sublayer_dpb_params_present_flag = r.flag("vps_sublayer_dpb_params_present_flag")?;
        }
        for i in 0..num_dpb_params {
            let max_tid = self.read_max_tid(r, &format!("vps_dpb_max_tid[{i}]"))?;
            let dpb = DpbParameters::parse(r, max_tid, self.vps_sublayer_dpb_params_present_flag)?;
            self.dpb_parameters.push((max_tid, dpb));
        }
        for i in 0..num_multi_layer_olss {
            let mut info = OlsDpbInfo {
                vps_ols_dpb_pic_width: r.ue(&format!("vps_ols_dpb_pic_width[{i}]"))?,
                vps_ols_dpb_pic_height: r.ue(&format!("vps_ols_dpb_pic_height[{i}]"))?,
                vps_ols_dpb_chroma_format: r.bits(&format!("vps_ols_dpb_chroma_format[{i}]"), 2)?,
                vps_ols_dpb_bitdepth_minus8: r.read_ue(
                    &format!("vps_ols_dpb_bitdepth_minus8[{i}]"),
                    ReadOptions::new().check_range(0, 8),
                )?,
                vps_ols_dpb_params_idx: 0,
            };
            info.vps_ols_dpb_params_idx = if num_dpb_params > 1 && num_dpb_params != num_multi_layer_olss {
                r.read_ue(
                    &format!("vps_ols_dpb_params_idx[{i}]"),
                    ReadOptions::new().check_range(0, i64::from(num_dpb_params) - 1),
                )?
            } else if num_dpb_params == 1 {
                0
            } else {
                i
            };
            self.ols_dpb.push(info);
        }

        if r.flag("vps_timing_hrd_params_present_flag")? {
            let general = GeneralTimingHrd::parse(r)?;
            let sublayer_cpb = self.vps_max_sublayers_minus1 > 0
                && r.flag("vps_sublayer_cpb_params_present_flag")?;
            let num_hrd = r.read_ue(
                "vps_num_ols_timing_hrd_params_minus1",
                ReadOptions::new().check_range(0, (i64::from(num_multi_layer_olss) - 1).max(0)),
            )? + 1;
            let mut ols = Vec::with_capacity(num_hrd as usize);
            for i in 0..num_hrd {
                let max_tid = self.read_max_tid(r, &format!("vps_hrd_max_tid[{i}]"))?;
                let first = if sublayer_cpb { 0 } else { max_tid };
                ols.push((max_tid, OlsTimingHrd::parse(r, &general, first, max_tid)?));
            }
            let mut idx = Vec::with_capacity(num_multi_layer_olss as usize);
            for i in 0..num_multi_layer_olss {
                idx.push(if num_hrd > 1 && num_hrd != num_multi_layer_olss {
                    r.read_ue(
                        &format!("vps_ols_timing_hrd_idx[{i}]"),
                        ReadOptions::new().check_range(0, i64::from(num_hrd) - 1),
                    )?
                } else if num_hrd == 1 {
                    0
                } else {
                    i
                });
            }
            self.timing_hrd = Some(VpsTimingHrd {
                general,
                vps_sublayer_cpb_params_present_flag: sublayer_cpb,
                ols,
                vps_ols_timing_hrd_idx: idx,
            });
        }
        Ok(())
    }
}
