//! VVC 参考图像列表: ref_pic_list_struct() (7.3.10) 与 ref_pic_lists() (7.3.9).

use nalscope_core::{ParseError, ParseResult, ReadOptions, SyntaxReader};

use crate::avc::ceil_log2;

/// 解析列表结构所需的 SPS 字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RplContext {
    pub long_term_ref_pics_flag: bool,
    pub inter_layer_prediction_enabled_flag: bool,
    /// sps_weighted_pred_flag || sps_weighted_bipred_flag
    pub weighted_prediction: bool,
    pub log2_max_pic_order_cnt_lsb: u32,
    pub num_ref_pic_lists: [u32; 2],
}

/// ref_pic_list_struct() 中的一项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RplEntry {
    ShortTerm {
        abs_delta_poc_st: u32,
        strp_entry_sign_flag: bool,
        /// DeltaPocValSt
        delta_poc_val_st: i32,
    },
    LongTerm {
        /// ltrp_in_header_flag=1 时在条带/图像头中给出
        rpls_poc_lsb_lt: Option<u32>,
    },
    InterLayer {
        ilrp_idx: u32,
    },
}

/// ref_pic_list_struct(listIdx, rplsIdx)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RefPicListStruct {
    pub ltrp_in_header_flag: bool,
    pub entries: Vec<RplEntry>,
}

impl RefPicListStruct {
    pub fn parse(
        r: &mut SyntaxReader<'_>,
        ctx: &RplContext,
        list_idx: usize,
        rpls_idx: u32,
    ) -> ParseResult<Self> {
        r.sub_level(&format!("ref_pic_list_struct({list_idx}, {rpls_idx})"), |r| {
            let num_ref_entries = r.read_ue(
                &format!("num_ref_entries[{list_idx}][{rpls_idx}]"),
                ReadOptions::new().check_range(0, 29),
            )?;
            let ltrp_in_header_flag = if ctx.long_term_ref_pics_flag
                && rpls_idx < ctx.num_ref_pic_lists[list_idx]
                && num_ref_entries > 0
            {
                r.flag(&format!("ltrp_in_header_flag[{list_idx}][{rpls_idx}]"))?
            } else {
                true
            };

            let mut entries = Vec::with_capacity(num_ref_entries as usize);
            for i in 0..num_ref_entries {
                let inter_layer = ctx.inter_layer_prediction_enabled_flag
                    && r.flag(&format!("inter_layer_ref_pic_flag[{list_idx}][{rpls_idx}][{i}]"))?;
                let entry = if inter_layer {
                    RplEntry::InterLayer {
                        ilrp_idx: r.ue(&format!("ilrp_idx[{list_idx}][{rpls_idx}][{i}]"))?,
                    }
                } else {
                    let short_term = !ctx.long_term_ref_pics_flag
                        || r.flag(&format!("st_ref_pic_flag[{list_idx}][{rpls_idx}][{i}]"))?;
                    if short_term {
                        let abs_delta_poc_st = r.read_ue(
                            &format!("abs_delta_poc_st[{list_idx}][{rpls_idx}][{i}]"),
                            ReadOptions::new().check_range(0, (1 << 15) - 1),
                        )?;
                        let abs = if ctx.weighted_prediction && i != 0 {
                            abs_delta_poc_st
                        } else {
                            abs_delta_poc_st + 1
                        };
                        let strp_entry_sign_flag = abs > 0
                            && r.flag(&format!("strp_entry_sign_flag[{list_idx}][{rpls_idx}][{i}]"))?;
                        let delta = abs as i32;
                        RplEntry::ShortTerm {
                            abs_delta_poc_st,
                            strp_entry_sign_flag,
                            delta_poc_val_st: if strp_entry_sign_flag { -delta } else { delta },
                        }
                    } else {
                        let rpls_poc_lsb_lt = if ltrp_in_header_flag {
                            None
                        } else {
                            Some(r.bits(
                                &format!("rpls_poc_lsb_lt[{list_idx}][{rpls_idx}][{i}]"),
                                ctx.log2_max_pic_order_cnt_lsb,
                            )?)
                        };
                        RplEntry::LongTerm { rpls_poc_lsb_lt }
                    }
                };
                entries.push(entry);
            }
            Ok(Self {
                ltrp_in_header_flag,
                entries,
            })
        })
    }

    pub fn num_ref_entries(&self) -> u32 {
        self.entries.len() as u32
    }

    /// NumLtrpEntries
    pub fn num_ltrp_entries(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, RplEntry::LongTerm { .. }))
            .count()
    }
}

/// 头部中给出的长期参考图像 POC 信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LtrpInfo {
    pub poc_lsb_lt: Option<u32>,
    pub delta_poc_msb_cycle_present_flag: bool,
    pub delta_poc_msb_cycle_lt: u32,
}

/// ref_pic_lists() 中的一个列表
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RefPicList {
    pub rpl_sps_flag: bool,
    pub rpl_idx: u32,
    /// RplsIdx: 引用 SPS 时为 rpl_idx, 否则为 sps_num_ref_pic_lists
    pub rpls_idx: u32,
    /// 生效的列表结构 (引用 SPS 时为其副本)
    pub structure: RefPicListStruct,
    pub ltrp: Vec<LtrpInfo>,
}

/// ref_pic_lists()
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RefPicLists {
    pub lists: [RefPicList; 2],
}

impl RefPicLists {
    /// `sps_lists` 为 SPS 中两组列表结构, `rpl1_idx_present` 取自 PPS
    pub fn parse(
        r: &mut SyntaxReader<'_>,
        ctx: &RplContext,
        sps_lists: &[Vec<RefPicListStruct>; 2],
        rpl1_idx_present: bool,
    ) -> ParseResult<Self> {
        r.sub_level("ref_pic_lists()", |r| {
            let mut out = Self::default();
            for i in 0..2 {
                let num = ctx.num_ref_pic_lists[i];
                let signalled = i == 0 || rpl1_idx_present;
                let rpl_sps_flag = if num > 0 && signalled {
                    r.flag(&format!("rpl_sps_flag[{i}]"))?
                } else if num == 0 {
                    false
                } else {
                    out.lists[0].rpl_sps_flag
                };

                let list = if rpl_sps_flag {
                    let rpl_idx = if num > 1 && signalled {
                        r.read_bits(
                            &format!("rpl_idx[{i}]"),
                            ceil_log2(num),
                            ReadOptions::new().check_range(0, i64::from(num) - 1),
                        )?
                    } else if i == 1 && !rpl1_idx_present {
                        out.lists[0].rpl_idx
                    } else {
                        0
                    };
                    let structure = sps_lists[i].get(rpl_idx as usize).cloned().ok_or_else(|| {
                        ParseError::structural(format!(
                            "VVC: rpl_idx[{i}] 超出 SPS 列表数, value={rpl_idx}, num={num}"
                        ))
                    })?;
                    RefPicList {
                        rpl_sps_flag,
                        rpl_idx,
                        rpls_idx: rpl_idx,
                        structure,
                        ltrp: Vec::new(),
                    }
                } else {
                    RefPicList {
                        rpl_sps_flag,
                        rpl_idx: 0,
                        rpls_idx: num,
                        structure: RefPicListStruct::parse(r, ctx, i, num)?,
                        ltrp: Vec::new(),
                    }
                };
                r.log_calculated(&format!("RplsIdx[{i}]"), list.rpls_idx);

                let mut ltrp = Vec::new();
                for j in 0..list.structure.num_ltrp_entries() {
                    let poc_lsb_lt = if list.structure.ltrp_in_header_flag {
                        Some(r.bits(&format!("poc_lsb_lt[{i}][{j}]"), ctx.log2_max_pic_order_cnt_lsb)?)
                    } else {
                        None
                    };
                    let present = r.flag(&format!("delta_poc_msb_cycle_present_flag[{i}][{j}]"))?;
                    ltrp.push(LtrpInfo {
                        poc_lsb_lt,
                        delta_poc_msb_cycle_present_flag: present,
                        delta_poc_msb_cycle_lt: if present {
                            r.ue(&format!("delta_poc_msb_cycle_lt[{i}][{j}]"))?
                        } else {
                            0
                        },
                    });
                }
                out.lists[i] = RefPicList { ltrp, ..list };
            }
            Ok(out)
        })
    }

    /// num_ref_entries[i][RplsIdx[i]]
    pub fn num_ref_entries(&self, list_idx: usize) -> u32 {
        self.lists[list_idx].structure.num_ref_entries()
    }
}

#[cfg(test)]
mod tests {
    use nalscope_core::BitWriter;

    use super::*;

    fn ctx() -> RplContext {
        RplContext {
            long_term_ref_pics_flag: true,
            log2_max_pic_order_cnt_lsb: 8,
            num_ref_pic_lists: [1, 1],
            ..Default::default()
        }
    }

    #[test]
    fn test_rpl_struct_short_and_long_term() {
        let mut bw = BitWriter::new();
        bw.write_ue(2); // num_ref_entries
        bw.write_flag(false); // ltrp_in_header_flag
        bw.write_flag(true); // st_ref_pic_flag
        bw.write_ue(0); // abs_delta_poc_st -> 1
        bw.write_flag(true); // strp_entry_sign_flag
        bw.write_flag(false); // 长期
        bw.write_bits(17, 8);
        let data = bw.finish();

        let mut r = SyntaxReader::new(&data);
        let rpl = RefPicListStruct::parse(&mut r, &ctx(), 0, 0).expect("列表结构应可解析");
        assert!(!rpl.ltrp_in_header_flag);
        assert_eq!(
            rpl.entries,
            vec![
                RplEntry::ShortTerm {
                    abs_delta_poc_st: 0,
                    strp_entry_sign_flag: true,
                    delta_poc_val_st: -1,
                },
                RplEntry::LongTerm {
                    rpls_poc_lsb_lt: Some(17),
                },
            ]
        );
        assert_eq!(rpl.num_ltrp_entries(), 1);
    }

    #[test]
    fn test_ref_pic_lists_inherit_list0_selection() {
        let sps_lists = [
            vec![RefPicListStruct {
                ltrp_in_header_flag: true,
                entries: vec![RplEntry::LongTerm { rpls_poc_lsb_lt: None }],
            }],
            vec![RefPicListStruct::default()],
        ];
        let mut bw = BitWriter::new();
        bw.write_flag(true); // rpl_sps_flag[0]
        bw.write_bits(9, 8); // poc_lsb_lt[0][0]
        bw.write_flag(true);
        bw.write_ue(1);
        let data = bw.finish();

        let mut r = SyntaxReader::new(&data);
        let lists = RefPicLists::parse(&mut r, &ctx(), &sps_lists, false).expect("列表应可解析");
        assert!(lists.lists[1].rpl_sps_flag, "rpl_sps_flag[1] 应沿用列表 0");
        assert_eq!(lists.num_ref_entries(0), 1);
        assert_eq!(lists.num_ref_entries(1), 0);
        assert_eq!(
            lists.lists[0].ltrp,
            vec![LtrpInfo {
                poc_lsb_lt: Some(9),
                delta_poc_msb_cycle_present_flag: true,
                delta_poc_msb_cycle_lt: 1,
            }]
        );
    }
}
