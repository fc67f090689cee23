//! SEI 消息的公共分帧 (AVC 7.3.2.3 / HEVC 7.3.5).
//!
//! sei_rbsp() 由若干 sei_message() 组成, 每条消息先给出以 0xFF 扩展的 payloadType
//! 与 payloadSize, 负载解析由各编解码器提供. 负载解析结束后读指针总是移到负载末尾,
//! 未解析的尾部数据只记一条跳过注释.

use log::debug;
use nalscope_core::{ParseError, ParseResult, ReadOptions, SyntaxReader};

use crate::avc::sps::read_trailing_bits;

/// 一条已解析的 SEI 消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeiMessage<P> {
    pub payload_type: u32,
    pub payload_size: u32,
    pub payload: P,
}

/// 负载所占的位区间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadBounds {
    pub start: usize,
    pub end: usize,
}

impl PayloadBounds {
    /// 负载内尚未读取的位数
    pub fn remaining(&self, r: &SyntaxReader<'_>) -> usize {
        self.end.saturating_sub(r.bits_read())
    }

    /// 负载中尚未读取的完整字节
    pub fn raw(&self, r: &SyntaxReader<'_>) -> Vec<u8> {
        let len = self.remaining(r) / 8;
        r.remaining_bytes().get(..len).unwrap_or(&[]).to_vec()
    }

    /// payload_extension_present(): 剩余数据不只是 sei_payload 的对齐位
    pub fn extension_present(&self, r: &SyntaxReader<'_>) -> bool {
        let left = self.remaining(r);
        if left == 0 {
            return false;
        }
        if left > 8 {
            return true;
        }
        // 对齐位形如 1 后跟若干 0
        match r.peek_bits(left as u32) {
            Ok(bits) => bits != 1 << (left - 1),
            Err(_) => false,
        }
    }

    /// 校验负载未越界并跳到负载末尾
    fn finish(&self, r: &mut SyntaxReader<'_>, payload_type: u32) -> ParseResult<()> {
        let pos = r.bits_read();
        if pos > self.end {
            return Err(ParseError::structural(format!(
                "SEI 负载解析越界, payloadType={payload_type}, 多读 {} 位",
                pos - self.end
            )));
        }
        let left = self.end - pos;
        if left > 0 {
            r.skip("sei_payload 剩余数据", left)?;
        }
        Ok(())
    }
}

/// 解析整个 sei_rbsp()
///
/// `name_of` 给出 payloadType 的名称, `parse_payload` 解析单条负载.
pub fn read_sei_rbsp<P>(
    r: &mut SyntaxReader<'_>,
    name_of: impl Fn(u32) -> Option<&'static str>,
    mut parse_payload: impl FnMut(&mut SyntaxReader<'_>, u32, &PayloadBounds) -> ParseResult<P>,
) -> ParseResult<Vec<SeiMessage<P>>> {
    let mut messages = Vec::new();
    loop {
        let message = r.sub_level("sei_message()", |r| {
            let payload_type = read_ff_coded(r, "last_payload_type_byte")?;
            r.log_calculated_with(
                "payloadType",
                payload_type,
                Some(name_of(payload_type).unwrap_or("reserved_sei_message")),
            );
            let payload_size = read_ff_coded(r, "last_payload_size_byte")?;
            r.log_calculated("payloadSize", payload_size);

            if !r.byte_aligned() {
                return Err(ParseError::structural("SEI 负载起点未按字节对齐"));
            }
            let start = r.bits_read();
            let end = start + payload_size as usize * 8;
            if end > start + r.bits_left() {
                return Err(ParseError::TruncatedStream {
                    needed: payload_size as usize * 8,
                    remaining: r.bits_left(),
                });
            }
            let bounds = PayloadBounds { start, end };
            let payload = parse_payload(r, payload_type, &bounds)?;
            bounds.finish(r, payload_type)?;
            Ok(SeiMessage {
                payload_type,
                payload_size,
                payload,
            })
        })?;
        messages.push(message);
        if !r.more_rbsp_data() {
            break;
        }
    }
    read_trailing_bits(r)?;
    debug!("SEI: 共 {} 条消息", messages.len());
    Ok(messages)
}

/// SEI 描述: 逐条列出 payloadType 名称
pub fn describe_sei<P>(
    messages: &[SeiMessage<P>],
    name_of: impl Fn(u32) -> Option<&'static str>,
) -> String {
    messages
        .iter()
        .map(|m| match name_of(m.payload_type) {
            Some(name) => name.to_string(),
            None => format!("type {}", m.payload_type),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// payloadType / payloadSize: 0xFF 字节累加, 最后一个字节小于 0xFF
fn read_ff_coded(r: &mut SyntaxReader<'_>, last_name: &str) -> ParseResult<u32> {
    let mut value = 0u32;
    while r.peek_bits(8)? == 0xFF {
        r.bits("ff_byte", 8)?;
        value = value.saturating_add(0xFF);
    }
    Ok(value.saturating_add(r.bits(last_name, 8)?))
}

/// user_data_unregistered()
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDataUnregistered {
    pub uuid_iso_iec_11578: [u8; 16],
    pub user_data_payload_byte: Vec<u8>,
}

impl UserDataUnregistered {
    /// 可打印时的文本形式 (编码器版本串等)
    pub fn text(&self) -> Option<String> {
        let data = self
            .user_data_payload_byte
            .strip_suffix(&[0])
            .unwrap_or(&self.user_data_payload_byte);
        let text = std::str::from_utf8(data).ok()?;
        (!text.is_empty() && text.chars().all(|c| !c.is_control() || c == '\n'))
            .then(|| text.to_string())
    }

    pub fn uuid_hex(&self) -> String {
        self.uuid_iso_iec_11578
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    pub fn parse(r: &mut SyntaxReader<'_>, bounds: &PayloadBounds) -> ParseResult<Self> {
        r.sub_level("user_data_unregistered()", |r| {
            if bounds.remaining(r) < 128 {
                return Err(ParseError::constraint(
                    "user_data_unregistered 负载不足 16 字节",
                ));
            }
            let mut uuid = [0u8; 16];
            for (i, byte) in uuid.iter_mut().enumerate() {
                *byte = r.bits(&format!("uuid_iso_iec_11578[{i}]"), 8)? as u8;
            }
            let count = bounds.remaining(r) / 8;
            let data = r.remaining_bytes().get(..count).unwrap_or(&[]).to_vec();
            r.skip("user_data_payload_byte", count * 8)?;
            let message = Self {
                uuid_iso_iec_11578: uuid,
                user_data_payload_byte: data,
            };
            r.log_calculated("uuid", message.uuid_hex());
            if let Some(text) = message.text() {
                r.log_note(format!("user_data: {text}"));
            }
            Ok(message)
        })
    }
}

/// mastering_display_colour_volume()
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasteringDisplayColourVolume {
    /// (x, y), 单位 0.00002
    pub display_primaries: [(u32, u32); 3],
    pub white_point: (u32, u32),
    /// 单位 0.0001 cd/m²
    pub max_display_mastering_luminance: u32,
    pub min_display_mastering_luminance: u32,
}

impl MasteringDisplayColourVolume {
    pub fn parse(r: &mut SyntaxReader<'_>) -> ParseResult<Self> {
        r.sub_level("mastering_display_colour_volume()", |r| {
            let mut display_primaries = [(0, 0); 3];
            for (c, p) in display_primaries.iter_mut().enumerate() {
                let range = ReadOptions::new().check_range(0, 50000);
                p.0 = r.read_bits(&format!("display_primaries_x[{c}]"), 16, range.clone())?;
                p.1 = r.read_bits(&format!("display_primaries_y[{c}]"), 16, range)?;
            }
            let white_point = (
                r.read_bits("white_point_x", 16, ReadOptions::new().check_range(0, 50000))?,
                r.read_bits("white_point_y", 16, ReadOptions::new().check_range(0, 50000))?,
            );
            let max_display_mastering_luminance = r.bits("max_display_mastering_luminance", 32)?;
            let min_display_mastering_luminance = r.bits("min_display_mastering_luminance", 32)?;
            if min_display_mastering_luminance >= max_display_mastering_luminance {
                r.log_note("min_display_mastering_luminance 不小于最大值");
            }
            Ok(Self {
                display_primaries,
                white_point,
                max_display_mastering_luminance,
                min_display_mastering_luminance,
            })
        })
    }
}

/// content_light_level_info()
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentLightLevel {
    pub max_content_light_level: u32,
    pub max_pic_average_light_level: u32,
}

impl ContentLightLevel {
    pub fn parse(r: &mut SyntaxReader<'_>) -> ParseResult<Self> {
        r.sub_level("content_light_level_info()", |r| {
            Ok(Self {
                max_content_light_level: r.bits("max_content_light_level", 16)?,
                max_pic_average_light_level: r.bits("max_pic_average_light_level", 16)?,
            })
        })
    }
}

/// pic_struct 的含义 (AVC 表 D-1 / HEVC 表 D-2 的公共前 9 项)
pub(crate) fn pic_struct_meaning(pic_struct: u32) -> &'static str {
    match pic_struct {
        0 => "(progressive) frame",
        1 => "top field",
        2 => "bottom field",
        3 => "top field, bottom field, in that order",
        4 => "bottom field, top field, in that order",
        5 => "top field, bottom field, top field repeated, in that order",
        6 => "bottom field, top field, bottom field repeated, in that order",
        7 => "frame doubling",
        8 => "frame tripling",
        9 => "top field paired with previous bottom field in output order",
        10 => "bottom field paired with previous top field in output order",
        11 => "top field paired with next bottom field in output order",
        12 => "bottom field paired with next top field in output order",
        _ => "reserved",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalscope_core::BitWriter;

    fn name_of(code: u32) -> Option<&'static str> {
        (code == 5).then_some("user_data_unregistered")
    }

    #[test]
    fn test_sei_ff_coded_type_and_size() {
        let mut bw = BitWriter::new();
        bw.write_bits(0xFF, 8);
        bw.write_bits(0x02, 8); // payloadType = 257
        bw.write_bits(3, 8);
        for b in [0xAA, 0xBB, 0xCC] {
            bw.write_bits(b, 8);
        }
        bw.write_trailing_bits();
        let data = bw.finish();
        let mut r = SyntaxReader::new(&data);
        let messages = read_sei_rbsp(&mut r, name_of, |_, _, _| Ok(())).expect("SEI 应可解析");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].payload_type, 257, "0xFF 字节应累加");
        assert_eq!(messages[0].payload_size, 3);
    }

    #[test]
    fn test_sei_multiple_messages_and_user_data_text() {
        let mut bw = BitWriter::new();
        let text = b"x265 3.5";
        bw.write_bits(5, 8);
        bw.write_bits(16 + text.len() as u32, 8);
        for i in 0..16 {
            bw.write_bits(i, 8);
        }
        for &b in text {
            bw.write_bits(u32::from(b), 8);
        }
        bw.write_bits(144, 8); // content_light_level_info
        bw.write_bits(4, 8);
        bw.write_bits(1000, 16);
        bw.write_bits(400, 16);
        bw.write_trailing_bits();
        let data = bw.finish();
        let mut r = SyntaxReader::new(&data);
        let messages = read_sei_rbsp(&mut r, name_of, |r, t, b| match t {
            5 => UserDataUnregistered::parse(r, b).map(Some),
            _ => Ok(None),
        })
        .expect("SEI 应可解析");
        assert_eq!(messages.len(), 2);
        let user = messages[0].payload.as_ref().expect("应解析出 user_data_unregistered");
        assert_eq!(user.text().as_deref(), Some("x265 3.5"));
        assert_eq!(user.uuid_hex(), "000102030405060708090a0b0c0d0e0f");
        assert!(messages[1].payload.is_none(), "未知负载应被跳过");
        assert!(r.log().notes().any(|n| n.name.contains("x265")));
    }

    #[test]
    fn test_sei_payload_size_exceeds_data() {
        let mut bw = BitWriter::new();
        bw.write_bits(5, 8);
        bw.write_bits(40, 8);
        bw.write_bits(0, 8);
        bw.write_trailing_bits();
        let data = bw.finish();
        let mut r = SyntaxReader::new(&data);
        let err = read_sei_rbsp(&mut r, name_of, |_, _, _| Ok(())).expect_err("payloadSize 越界应失败");
        assert!(matches!(err, ParseError::TruncatedStream { .. }));
    }

    #[test]
    fn test_sei_payload_over_read_is_structural_error() {
        let mut bw = BitWriter::new();
        bw.write_bits(1, 8);
        bw.write_bits(1, 8);
        bw.write_bits(0xFF, 8);
        bw.write_bits(0xFF, 8);
        bw.write_trailing_bits();
        let data = bw.finish();
        let mut r = SyntaxReader::new(&data);
        let err = read_sei_rbsp(&mut r, name_of, |r, _, _| r.bits("too_long", 16))
            .expect_err("负载解析越过 payloadSize 应失败");
        assert!(matches!(err, ParseError::StructuralConstraintViolation(_)));
    }

    #[test]
    fn test_sei_extension_present_ignores_alignment_bits() {
        let mut bw = BitWriter::new();
        bw.write_bits(0b1011_1000, 8);
        let data = bw.finish();
        let mut r = SyntaxReader::new(&data);
        let bounds = PayloadBounds { start: 0, end: 8 };
        r.bits("a", 3).expect("应可读");
        assert!(bounds.extension_present(&r), "还剩 11000, 不只是对齐位");
        r.bits("b", 1).expect("应可读");
        assert!(!bounds.extension_present(&r), "只剩 1000 对齐位");
    }
}
