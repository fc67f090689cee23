//! 比特流写入器.
//!
//! 按大端位序 (MSB first) 写入, 与 [`BitReader`](crate::bitreader::BitReader) 对应.
//! 主要用于构造测试码流与基准数据: 支持定长字段、`ue(v)` / `se(v)` 以及 RBSP 尾部位.

/// 比特流写入器
///
/// # 示例
/// ```
/// use nalscope_core::bitwriter::BitWriter;
///
/// let mut bw = BitWriter::new();
/// bw.write_bits(0b1011, 4);
/// bw.write_ue(0);
/// bw.write_bits(0b001, 3);
/// bw.write_bits(0b01010101, 8);
/// assert_eq!(bw.finish(), vec![0b10111001, 0b01010101]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    /// 输出缓冲区
    data: Vec<u8>,
    /// 当前字节 (正在填充)
    current_byte: u8,
    /// 当前字节中已填充的位数 (0-7)
    bit_count: u8,
}

impl BitWriter {
    /// 创建新的比特流写入器
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取已写入的总位数
    pub fn bits_written(&self) -> usize {
        self.data.len() * 8 + self.bit_count as usize
    }

    /// 写入 1 个位
    pub fn write_bit(&mut self, bit: u32) {
        self.current_byte = (self.current_byte << 1) | (bit & 1) as u8;
        self.bit_count += 1;
        if self.bit_count >= 8 {
            self.data.push(self.current_byte);
            self.current_byte = 0;
            self.bit_count = 0;
        }
    }

    /// 写入布尔标志
    pub fn write_flag(&mut self, flag: bool) {
        self.write_bit(u32::from(flag));
    }

    /// 写入 N 个位 (最多 32 位), 取 `value` 的低 N 位
    pub fn write_bits(&mut self, value: u32, n: u32) {
        debug_assert!(n <= 32, "write_bits: n={n} 超过 32 位");
        for i in (0..n).rev() {
            self.write_bit((value >> i) & 1);
        }
    }

    /// 写入 N 个位 (最多 64 位)
    pub fn write_bits_u64(&mut self, value: u64, n: u32) {
        debug_assert!(n <= 64, "write_bits_u64: n={n} 超过 64 位");
        for i in (0..n).rev() {
            self.write_bit(((value >> i) & 1) as u32);
        }
    }

    /// 写入无符号 Exp-Golomb 编码值 ue(v)
    pub fn write_ue(&mut self, value: u32) {
        let code = u64::from(value) + 1;
        let len = 64 - code.leading_zeros();
        self.write_bits_u64(0, len - 1);
        self.write_bits_u64(code, len);
    }

    /// 写入有符号 Exp-Golomb 编码值 se(v)
    pub fn write_se(&mut self, value: i32) {
        let magnitude = i64::from(value).unsigned_abs();
        let code = if value > 0 {
            magnitude * 2 - 1
        } else {
            magnitude * 2
        };
        self.write_ue(code as u32);
    }

    /// 写入 rbsp_trailing_bits(): 停止位 1 后补 0 到字节边界
    pub fn write_trailing_bits(&mut self) {
        self.write_bit(1);
        self.align_to_byte();
    }

    /// 是否位于字节边界
    pub fn byte_aligned(&self) -> bool {
        self.bit_count == 0
    }

    /// 以 0 填充到下一个字节边界
    pub fn align_to_byte(&mut self) {
        if self.bit_count > 0 {
            let shift = 8 - self.bit_count;
            self.current_byte <<= shift;
            self.data.push(self.current_byte);
            self.current_byte = 0;
            self.bit_count = 0;
        }
    }

    /// 写入整字节数据
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if self.byte_aligned() {
            self.data.extend_from_slice(bytes);
        } else {
            for &b in bytes {
                self.write_bits(u32::from(b), 8);
            }
        }
    }

    /// 完成写入, 对齐并返回缓冲区
    pub fn finish(mut self) -> Vec<u8> {
        self.align_to_byte();
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitreader::BitReader;

    #[test]
    fn test_write_bits_basic() {
        let mut bw = BitWriter::new();
        bw.write_bits(0b101, 3);
        bw.write_bits(0b11001, 5);
        assert_eq!(bw.bits_written(), 8);
        assert_eq!(bw.finish(), vec![0b10111001]);
    }

    #[test]
    fn test_write_ue_codewords() {
        // 0 → 1, 1 → 010, 2 → 011, 3 → 00100
        let mut bw = BitWriter::new();
        bw.write_ue(0);
        bw.write_ue(1);
        bw.write_ue(2);
        bw.write_ue(3);
        assert_eq!(bw.bits_written(), 1 + 3 + 3 + 5);
        let data = bw.finish();
        assert_eq!(data, vec![0b10100110, 0b01000000]);
    }

    #[test]
    fn test_exp_golomb_reader_inverse() {
        let ue_values = [0u32, 1, 7, 8, 255, 65_535, 1 << 20, u32::MAX - 1];
        let se_values = [0i32, 1, -1, 2, -2, 127, -128, i32::MAX, -i32::MAX];

        let mut bw = BitWriter::new();
        for &v in &ue_values {
            bw.write_ue(v);
        }
        for &v in &se_values {
            bw.write_se(v);
        }
        let data = bw.finish();

        let mut br = BitReader::new(&data);
        for &v in &ue_values {
            assert_eq!(br.read_ue().unwrap(), v, "ue({v}) 读回不一致");
        }
        for &v in &se_values {
            assert_eq!(br.read_se().unwrap(), v, "se({v}) 读回不一致");
        }
    }

    #[test]
    fn test_trailing_bits() {
        let mut bw = BitWriter::new();
        bw.write_bits(0b01, 2);
        bw.write_trailing_bits();
        assert!(bw.byte_aligned());
        assert_eq!(bw.finish(), vec![0b01100000]);
    }

    #[test]
    fn test_write_bytes_unaligned() {
        let mut bw = BitWriter::new();
        bw.write_bit(1);
        bw.write_bytes(&[0xFF]);
        assert_eq!(bw.finish(), vec![0xFF, 0x80]);
    }
}
