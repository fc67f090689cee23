//! 基本流分帧: Annex B 起始码与长度前缀两种封装.
//!
//! # Annex B 格式
//!
//! 使用起始码分隔单元:
//! - 3 字节起始码: `00 00 01`
//! - 4 字节起始码: `00 00 00 01`
//!
//! AVC/HEVC/VVC 的 NAL 单元以 stop bit 结尾, 单元尾部的 0 字节可以安全去除.
//! MPEG-2 头部没有 stop bit, 末字节可能就是 0 (如 sequence_extension 的帧率扩展),
//! 因此 [`split_start_code_units`] 只识别 3 字节起始码并保留尾部 0 字节.
//!
//! # 长度前缀格式
//!
//! 每个单元前有 1-4 字节的大端长度 (MP4 `avcC`/`hvcC` 中的 lengthSizeMinusOne + 1):
//! ```text
//! [length: N bytes BE] [NAL data: length bytes]
//! ```

use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;
use nalscope_core::{ParseError, ParseResult};

/// 分帧后的单元, 不含起始码/长度前缀, 含头部字节
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NalUnit {
    /// 单元在输入数据中的字节偏移
    pub offset: usize,
    /// 单元数据
    pub data: Bytes,
}

impl NalUnit {
    /// 去掉 `header_len` 字节头部并移除防竞争字节, 得到 RBSP
    pub fn rbsp(&self, header_len: usize) -> Vec<u8> {
        let start = header_len.min(self.data.len());
        remove_emulation_prevention(&self.data[start..])
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// 从 Annex B 字节流中切分出所有单元
///
/// 支持 3 字节和 4 字节起始码, 去除单元尾部的 0 字节 (trailing_zero_8bits).
/// 第一个起始码之前的数据被忽略.
pub fn split_annex_b(data: &Bytes) -> Vec<NalUnit> {
    let offsets = find_start_codes(data);
    let mut units = Vec::with_capacity(offsets.len());

    for (i, &start) in offsets.iter().enumerate() {
        let end = offsets.get(i + 1).copied().unwrap_or(data.len());

        let unit_start = skip_start_code(data, start);
        if unit_start >= end {
            continue;
        }

        let mut unit_end = end;
        while unit_end > unit_start && data[unit_end - 1] == 0x00 {
            unit_end -= 1;
        }

        if unit_end > unit_start {
            units.push(NalUnit {
                offset: unit_start,
                data: data.slice(unit_start..unit_end),
            });
        }
    }

    units
}

/// 按 3 字节起始码切分 MPEG-2 视频单元, 保留单元尾部的 0 字节
///
/// 起始码之前的填充 0 字节计入前一个单元.
pub fn split_start_code_units(data: &Bytes) -> Vec<NalUnit> {
    let mut starts = Vec::new();
    let mut i = 0;
    while i + 2 < data.len() {
        if data[i] == 0x00 && data[i + 1] == 0x00 && data[i + 2] == 0x01 {
            starts.push(i + 3);
            i += 3;
        } else {
            i += 1;
        }
    }

    let mut units = Vec::with_capacity(starts.len());
    for (idx, &start) in starts.iter().enumerate() {
        let end = starts.get(idx + 1).map_or(data.len(), |next| next - 3);
        if end > start {
            units.push(NalUnit {
                offset: start,
                data: data.slice(start..end),
            });
        }
    }
    units
}

/// 从长度前缀数据中切分单元
///
/// `length_size` 必须位于 1..=4; 声明长度超出剩余数据时返回 `TruncatedStream`.
pub fn split_length_prefixed(data: &Bytes, length_size: usize) -> ParseResult<Vec<NalUnit>> {
    if !(1..=4).contains(&length_size) {
        return Err(ParseError::Unsupported(format!(
            "长度前缀字节数非法, length_size={}",
            length_size
        )));
    }

    let mut units = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        if pos + length_size > data.len() {
            return Err(ParseError::TruncatedStream {
                needed: length_size * 8,
                remaining: (data.len() - pos) * 8,
            });
        }
        let unit_len = BigEndian::read_uint(&data[pos..], length_size) as usize;
        pos += length_size;

        if pos + unit_len > data.len() {
            return Err(ParseError::TruncatedStream {
                needed: unit_len * 8,
                remaining: (data.len() - pos) * 8,
            });
        }
        if unit_len > 0 {
            units.push(NalUnit {
                offset: pos,
                data: data.slice(pos..pos + unit_len),
            });
        }
        pos += unit_len;
    }

    Ok(units)
}

/// 查找所有起始码的位置 (指向起始码首字节)
pub fn find_start_codes(data: &[u8]) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut i = 0;

    while i + 2 < data.len() {
        if data[i] == 0x00 && data[i + 1] == 0x00 {
            if data[i + 2] == 0x01 {
                positions.push(i);
                i += 3;
                continue;
            } else if i + 3 < data.len() && data[i + 2] == 0x00 && data[i + 3] == 0x01 {
                positions.push(i);
                i += 4;
                continue;
            }
        }
        i += 1;
    }

    positions
}

/// 跳过起始码, 返回单元数据的起始位置
fn skip_start_code(data: &[u8], pos: usize) -> usize {
    if data[pos..].starts_with(&[0x00, 0x00, 0x00, 0x01]) {
        pos + 4
    } else if data[pos..].starts_with(&[0x00, 0x00, 0x01]) {
        pos + 3
    } else {
        pos
    }
}

/// 移除防竞争字节 (`00 00 03` → `00 00`)
pub fn remove_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut rbsp = Vec::with_capacity(data.len());
    let mut zeros = 0usize;

    for &b in data {
        if zeros >= 2 && b == 0x03 {
            zeros = 0;
            continue;
        }
        zeros = if b == 0x00 { zeros + 1 } else { 0 };
        rbsp.push(b);
    }

    rbsp
}
