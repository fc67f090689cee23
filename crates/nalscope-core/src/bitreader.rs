//! 比特流读取器.
//!
//! 从已去除防竞争字节的 RBSP 中按位读取数据, 按大端位序 (MSB first).
//! 除定长读取外还提供 `ue(v)` / `se(v)` Exp-Golomb 解码与 `more_rbsp_data()` 判定.

use crate::{ParseError, ParseResult};

/// Exp-Golomb 允许的最大前导零个数 (值域覆盖 32 位无符号)
const MAX_LEADING_ZEROS: u32 = 31;

/// 比特流读取器
///
/// # 示例
/// ```
/// use nalscope_core::bitreader::BitReader;
///
/// let data = [0b10111001, 0b01010101];
/// let mut br = BitReader::new(&data);
/// assert_eq!(br.read_bits(4).unwrap(), 0b1011);
/// assert_eq!(br.read_ue().unwrap(), 0);
/// assert_eq!(br.read_bits(3).unwrap(), 0b001);
/// ```
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    /// 源数据
    data: &'a [u8],
    /// 当前字节索引
    byte_pos: usize,
    /// 当前字节中的位位置 (0-7, 0 表示最高位)
    bit_pos: u8,
}

impl<'a> BitReader<'a> {
    /// 创建新的比特流读取器
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    /// 获取已读取的总位数
    pub fn bits_read(&self) -> usize {
        self.byte_pos * 8 + self.bit_pos as usize
    }

    /// 获取剩余可读位数
    pub fn bits_left(&self) -> usize {
        if self.byte_pos >= self.data.len() {
            return 0;
        }
        (self.data.len() - self.byte_pos) * 8 - self.bit_pos as usize
    }

    /// 是否已到达末尾
    pub fn is_eof(&self) -> bool {
        self.bits_left() == 0
    }

    fn truncated(&self, needed: usize) -> ParseError {
        ParseError::TruncatedStream {
            needed,
            remaining: self.bits_left(),
        }
    }

    /// 读取 1 个位
    pub fn read_bit(&mut self) -> ParseResult<u32> {
        if self.byte_pos >= self.data.len() {
            return Err(self.truncated(1));
        }

        let bit = (self.data[self.byte_pos] >> (7 - self.bit_pos)) & 1;
        self.bit_pos += 1;
        if self.bit_pos >= 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }

        Ok(u32::from(bit))
    }

    /// 读取 1 个位并转换为布尔值
    pub fn read_flag(&mut self) -> ParseResult<bool> {
        Ok(self.read_bit()? == 1)
    }

    /// 读取 N 个位 (最多 32 位)
    ///
    /// 按大端位序读取, 返回值的低 N 位有效.
    pub fn read_bits(&mut self, n: u32) -> ParseResult<u32> {
        if n == 0 {
            return Ok(0);
        }
        if n > 32 {
            return Err(ParseError::Unsupported(format!(
                "read_bits: n={} 超过 32 位",
                n
            )));
        }
        if (n as usize) > self.bits_left() {
            return Err(self.truncated(n as usize));
        }

        let mut result: u32 = 0;
        let mut remaining = n;

        while remaining > 0 {
            let available = 8 - self.bit_pos as u32;
            let to_read = remaining.min(available);

            let shift = available - to_read;
            let mask = ((1u32 << to_read) - 1) as u8;
            let bits = (self.data[self.byte_pos] >> shift) & mask;

            result = (result << to_read) | u32::from(bits);

            self.bit_pos += to_read as u8;
            if self.bit_pos >= 8 {
                self.bit_pos = 0;
                self.byte_pos += 1;
            }
            remaining -= to_read;
        }

        Ok(result)
    }

    /// 读取 N 个位 (最多 64 位)
    pub fn read_bits_u64(&mut self, n: u32) -> ParseResult<u64> {
        if n <= 32 {
            return self.read_bits(n).map(u64::from);
        }
        if n > 64 {
            return Err(ParseError::Unsupported(format!(
                "read_bits_u64: n={} 超过 64 位",
                n
            )));
        }

        let high = u64::from(self.read_bits(n - 32)?);
        let low = u64::from(self.read_bits(32)?);
        Ok((high << 32) | low)
    }

    /// 读取无符号 Exp-Golomb 编码值 ue(v)
    ///
    /// 先统计前导零个数 `k`, 再读取 `k` 位后缀, 结果为 `2^k - 1 + suffix`.
    /// 返回 `(value, 消耗的位数)`.
    pub fn read_ue_with_len(&mut self) -> ParseResult<(u32, u32)> {
        let mut leading_zeros = 0u32;
        while self.read_bit()? == 0 {
            leading_zeros += 1;
            if leading_zeros > MAX_LEADING_ZEROS {
                return Err(ParseError::constraint(format!(
                    "Exp-Golomb 前导零过多, leading_zeros>{}",
                    MAX_LEADING_ZEROS
                )));
            }
        }

        if leading_zeros == 0 {
            return Ok((0, 1));
        }

        let suffix = u64::from(self.read_bits(leading_zeros)?);
        let value = (1u64 << leading_zeros) - 1 + suffix;
        let value = u32::try_from(value).map_err(|_| {
            ParseError::constraint(format!("Exp-Golomb 值超出 32 位, value={}", value))
        })?;
        Ok((value, leading_zeros * 2 + 1))
    }

    /// 读取无符号 Exp-Golomb 编码值 ue(v)
    pub fn read_ue(&mut self) -> ParseResult<u32> {
        self.read_ue_with_len().map(|(v, _)| v)
    }

    /// 读取有符号 Exp-Golomb 编码值 se(v)
    pub fn read_se(&mut self) -> ParseResult<i32> {
        let code = self.read_ue()?;
        Ok(ue_to_se(code))
    }

    /// 窥视 N 个位 (不移动位置)
    pub fn peek_bits(&self, n: u32) -> ParseResult<u32> {
        let mut lookahead = self.clone();
        lookahead.read_bits(n)
    }

    /// 跳过 N 个位
    pub fn skip_bits(&mut self, n: usize) -> ParseResult<()> {
        if n > self.bits_left() {
            return Err(self.truncated(n));
        }

        let total_bits = self.bit_pos as usize + n;
        self.byte_pos += total_bits / 8;
        self.bit_pos = (total_bits % 8) as u8;

        Ok(())
    }

    /// 当前是否位于字节边界
    pub fn byte_aligned(&self) -> bool {
        self.bit_pos == 0
    }

    /// 对齐到下一个字节边界
    pub fn align_to_byte(&mut self) {
        if self.bit_pos > 0 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
    }

    /// 当前 RBSP 在 rbsp_stop_one_bit 之前是否还有数据
    ///
    /// 停止位是整个缓冲区中最后一个为 1 的位, 其后只允许出现 0 (包括 cabac_zero_word).
    pub fn more_rbsp_data(&self) -> bool {
        let Some(last_byte) = self.data.iter().rposition(|&b| b != 0) else {
            return false;
        };
        let trailing_zeros = self.data[last_byte].trailing_zeros() as usize;
        let stop_bit_pos = last_byte * 8 + (7 - trailing_zeros);
        self.bits_read() < stop_bit_pos
    }

    /// 获取当前字节位置
    pub fn byte_position(&self) -> usize {
        self.byte_pos
    }

    /// 获取底层数据引用
    pub fn data(&self) -> &'a [u8] {
        self.data
    }
}

/// 将 ue(v) 码值映射为 se(v): 0→0, 1→1, 2→-1, 3→2, 4→-2, ...
pub fn ue_to_se(code: u32) -> i32 {
    let magnitude = i64::from(code).div_euclid(2) + i64::from(code & 1);
    let value = if code & 1 == 0 { -magnitude } else { magnitude };
    value as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_single_bits() {
        let data = [0b10110000];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bit().unwrap(), 1);
        assert_eq!(br.read_bit().unwrap(), 0);
        assert_eq!(br.read_bit().unwrap(), 1);
        assert_eq!(br.read_bit().unwrap(), 1);
        assert_eq!(br.bits_read(), 4);
        assert_eq!(br.bits_left(), 4);
    }

    #[test]
    fn test_read_bits_cross_byte() {
        let data = [0xAB, 0xCD];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bits(4).unwrap(), 0xA);
        assert_eq!(br.read_bits(8).unwrap(), 0xBC);
        assert_eq!(br.read_bits(4).unwrap(), 0xD);
        assert!(br.is_eof());
    }

    #[test]
    fn test_read_bits_32_and_64() {
        let data = [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bits(32).unwrap(), 0x12345678);
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_bits_u64(64).unwrap(), 0x123456789ABCDEF0);
    }

    #[test]
    fn test_truncated_stream_reports_bits() {
        let data = [0xFF];
        let mut br = BitReader::new(&data);
        br.read_bits(6).unwrap();
        match br.read_bits(4) {
            Err(ParseError::TruncatedStream { needed, remaining }) => {
                assert_eq!(needed, 4);
                assert_eq!(remaining, 2);
            }
            other => panic!("应返回 TruncatedStream, actual={:?}", other),
        }
    }

    #[test]
    fn test_read_ue_small_values() {
        // 1 | 010 | 011 | 00100 | 00101 -> 0, 1, 2, 3, 4
        let data = [0b10100110, 0b01000010, 0b10000000];
        let mut br = BitReader::new(&data);
        for expected in 0..5 {
            assert_eq!(br.read_ue().unwrap(), expected);
        }
    }

    #[test]
    fn test_read_ue_reports_code_length() {
        let data = [0b00101000];
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_ue_with_len().unwrap(), (4, 5));
    }

    #[test]
    fn test_read_ue_max_32bit() {
        // 31 个前导零 + 1 + 31 个 1 → 2^32 - 2
        let mut data = vec![0u8; 3];
        data.push(0b00000001);
        data.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFE]);
        let mut br = BitReader::new(&data);
        assert_eq!(br.read_ue().unwrap(), u32::MAX - 1);
    }

    #[test]
    fn test_read_ue_reject_too_many_leading_zeros() {
        let data = [0u8; 8];
        let mut br = BitReader::new(&data);
        let err = br.read_ue().expect_err("全零数据应失败");
        let msg = format!("{}", err);
        assert!(msg.contains("前导零"), "错误信息应包含 前导零, actual={}", msg);
    }

    #[test]
    fn test_read_se_mapping() {
        let expected = [0, 1, -1, 2, -2];
        for (code, value) in expected.iter().enumerate() {
            assert_eq!(ue_to_se(code as u32), *value, "ue={} 映射错误", code);
        }
        assert_eq!(ue_to_se(u32::MAX - 1), -(i32::MAX));
    }

    #[test]
    fn test_peek_does_not_advance() {
        let data = [0b11001100];
        let br = BitReader::new(&data);
        assert_eq!(br.peek_bits(4).unwrap(), 0b1100);
        assert_eq!(br.bits_read(), 0);
    }

    #[test]
    fn test_alignment() {
        let data = [0xFF, 0x0F];
        let mut br = BitReader::new(&data);
        assert!(br.byte_aligned());
        br.read_bits(3).unwrap();
        assert!(!br.byte_aligned());
        br.align_to_byte();
        assert!(br.byte_aligned());
        assert_eq!(br.read_bits(8).unwrap(), 0x0F);
    }

    #[test]
    fn test_more_rbsp_data() {
        // 数据 101 + 停止位 1 + 填充 0000
        let data = [0b10110000];
        let mut br = BitReader::new(&data);
        assert!(br.more_rbsp_data());
        br.read_bits(3).unwrap();
        assert!(!br.more_rbsp_data());
    }

    #[test]
    fn test_more_rbsp_data_ignores_trailing_zero_bytes() {
        let data = [0b11000000, 0x80, 0x00, 0x00];
        let mut br = BitReader::new(&data);
        br.read_bits(8).unwrap();
        assert!(!br.more_rbsp_data());
    }

    #[test]
    fn test_more_rbsp_data_all_zero() {
        let data = [0x00, 0x00];
        let br = BitReader::new(&data);
        assert!(!br.more_rbsp_data());
    }
}
