//! 带注释的语法元素读取器.
//!
//! [`SyntaxReader`] 包装 [`BitReader`], 每读取一个语法元素:
//! 1. 按 [`ReadOptions`] 中的约束逐条检查, 遇到第一条失败即返回 `ConstraintViolation`;
//! 2. 向 [`AnnotationLog`] 追加一条记录 (字段名、取值、位宽、含义).
//!
//! 读取失败时日志中会追加一条 `Error` 条目, 方便定位中止位置.

use crate::annotation::{Annotation, AnnotationKind, AnnotationLog, FieldValue};
use crate::bitreader::BitReader;
use crate::symbol::SymbolTable;
use crate::{ParseError, ParseResult};

/// 单条取值约束
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Check {
    EqualTo(i64),
    Range(i64, i64),
    Greater(i64),
    Smaller(i64),
}

impl Check {
    fn verify(self, name: &str, value: i64) -> ParseResult<()> {
        let ok = match self {
            Self::EqualTo(v) => value == v,
            Self::Range(lo, hi) => (lo..=hi).contains(&value),
            Self::Greater(v) => value > v,
            Self::Smaller(v) => value < v,
        };
        if ok {
            return Ok(());
        }
        let expect = match self {
            Self::EqualTo(v) => format!("应等于 {v}"),
            Self::Range(lo, hi) => format!("超出范围 [{lo}, {hi}]"),
            Self::Greater(v) => format!("应大于 {v}"),
            Self::Smaller(v) => format!("应小于 {v}"),
        };
        Err(ParseError::constraint(format!("{name}={value} {expect}")))
    }
}

/// 含义来源
#[derive(Debug, Clone, Copy)]
enum Meaning {
    Fixed(&'static str),
    Lookup(fn(u32) -> Option<&'static str>),
}

/// 单次读取的选项: 取值约束与含义标注
///
/// ```
/// use nalscope_core::ReadOptions;
///
/// let opts = ReadOptions::new().check_range(0, 31).meaning("cpb 数量减 1");
/// # let _ = opts;
/// ```
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    checks: Vec<Check>,
    meaning: Option<Meaning>,
}

impl ReadOptions {
    /// 无约束、无含义
    pub const NONE: Self = Self {
        checks: Vec::new(),
        meaning: None,
    };

    pub fn new() -> Self {
        Self::default()
    }

    /// 取值必须等于 `v`
    pub fn check_equal_to(mut self, v: i64) -> Self {
        self.checks.push(Check::EqualTo(v));
        self
    }

    /// 取值必须位于闭区间 `[lo, hi]`
    pub fn check_range(mut self, lo: i64, hi: i64) -> Self {
        self.checks.push(Check::Range(lo, hi));
        self
    }

    /// 取值必须大于 `v`
    pub fn check_greater(mut self, v: i64) -> Self {
        self.checks.push(Check::Greater(v));
        self
    }

    /// 取值必须小于 `v`
    pub fn check_smaller(mut self, v: i64) -> Self {
        self.checks.push(Check::Smaller(v));
        self
    }

    /// 固定含义文本
    pub fn meaning(mut self, text: &'static str) -> Self {
        self.meaning = Some(Meaning::Fixed(text));
        self
    }

    /// 通过符号表查找含义
    pub fn meaning_map<T: SymbolTable>(mut self) -> Self {
        self.meaning = Some(Meaning::Lookup(T::meaning_of));
        self
    }

    fn verify(&self, name: &str, value: i64) -> ParseResult<()> {
        self.checks.iter().try_for_each(|c| c.verify(name, value))
    }

    fn describe(&self, code: Option<u32>) -> Option<String> {
        match self.meaning? {
            Meaning::Fixed(text) => Some(text.to_string()),
            Meaning::Lookup(lookup) => code.and_then(lookup).map(str::to_string),
        }
    }
}

/// 带注释日志的语法元素读取器
#[derive(Debug, Clone)]
pub struct SyntaxReader<'a> {
    bits: BitReader<'a>,
    log: AnnotationLog,
    depth: usize,
}

impl<'a> SyntaxReader<'a> {
    /// 创建读取器, 记录全部注释
    pub fn new(rbsp: &'a [u8]) -> Self {
        Self::with_log(rbsp, AnnotationLog::new(true))
    }

    /// 使用指定日志创建读取器
    pub fn with_log(rbsp: &'a [u8], log: AnnotationLog) -> Self {
        Self {
            bits: BitReader::new(rbsp),
            log,
            depth: 0,
        }
    }

    /// 读取 1 位标志 `u(1)`
    pub fn read_flag(&mut self, name: &str, opts: ReadOptions) -> ParseResult<bool> {
        let offset = self.bits.bits_read();
        let value = self.guard(name, |r| r.bits.read_flag())?;
        self.finish_read(name, offset, i64::from(value), value.into(), opts)?;
        Ok(value)
    }

    /// 读取 `width` 位无符号定长字段 `u(n)`
    pub fn read_bits(&mut self, name: &str, width: u32, opts: ReadOptions) -> ParseResult<u32> {
        let offset = self.bits.bits_read();
        let value = self.guard(name, |r| r.bits.read_bits(width))?;
        self.finish_read(name, offset, i64::from(value), value.into(), opts)?;
        Ok(value)
    }

    /// 读取最多 64 位无符号定长字段
    pub fn read_bits_u64(&mut self, name: &str, width: u32, opts: ReadOptions) -> ParseResult<u64> {
        let offset = self.bits.bits_read();
        let value = self.guard(name, |r| r.bits.read_bits_u64(width))?;
        let signed = i64::try_from(value).unwrap_or(i64::MAX);
        self.finish_read(name, offset, signed, value.into(), opts)?;
        Ok(value)
    }

    /// 读取无符号 Exp-Golomb 字段 `ue(v)`
    pub fn read_ue(&mut self, name: &str, opts: ReadOptions) -> ParseResult<u32> {
        let offset = self.bits.bits_read();
        let value = self.guard(name, |r| r.bits.read_ue())?;
        self.finish_read(name, offset, i64::from(value), value.into(), opts)?;
        Ok(value)
    }

    /// 读取有符号 Exp-Golomb 字段 `se(v)`
    pub fn read_se(&mut self, name: &str, opts: ReadOptions) -> ParseResult<i32> {
        let offset = self.bits.bits_read();
        let value = self.guard(name, |r| r.bits.read_se())?;
        self.finish_read(name, offset, i64::from(value), value.into(), opts)?;
        Ok(value)
    }

    /// `read_flag(name, ReadOptions::NONE)` 的简写
    pub fn flag(&mut self, name: &str) -> ParseResult<bool> {
        self.read_flag(name, ReadOptions::NONE)
    }

    /// `read_bits(name, width, ReadOptions::NONE)` 的简写
    pub fn bits(&mut self, name: &str, width: u32) -> ParseResult<u32> {
        self.read_bits(name, width, ReadOptions::NONE)
    }

    /// `read_ue(name, ReadOptions::NONE)` 的简写
    pub fn ue(&mut self, name: &str) -> ParseResult<u32> {
        self.read_ue(name, ReadOptions::NONE)
    }

    /// `read_se(name, ReadOptions::NONE)` 的简写
    pub fn se(&mut self, name: &str) -> ParseResult<i32> {
        self.read_se(name, ReadOptions::NONE)
    }

    /// 跳过 `n` 位 (保留位、扩展数据等), 记录一条注释
    pub fn skip(&mut self, name: &str, n: usize) -> ParseResult<()> {
        let offset = self.bits.bits_read();
        self.guard(name, |r| r.bits.skip_bits(n))?;
        self.log.push(Annotation {
            name: name.to_string(),
            value: None,
            bit_length: n as u32,
            bit_offset: offset,
            meaning: Some("跳过".to_string()),
            depth: self.depth,
            kind: AnnotationKind::Read,
        });
        Ok(())
    }

    /// 记录一个推导变量
    pub fn log_calculated(&mut self, name: &str, value: impl Into<FieldValue>) {
        self.log_calculated_with(name, value, None);
    }

    /// 记录一个带含义的推导变量
    pub fn log_calculated_with(
        &mut self,
        name: &str,
        value: impl Into<FieldValue>,
        meaning: Option<&str>,
    ) {
        self.log.push(Annotation {
            name: name.to_string(),
            value: Some(value.into()),
            bit_length: 0,
            bit_offset: self.bits.bits_read(),
            meaning: meaning.map(str::to_string),
            depth: self.depth,
            kind: AnnotationKind::Calculated,
        });
    }

    /// 记录一条诊断
    pub fn log_note(&mut self, text: impl Into<String>) {
        self.log.push(Annotation {
            name: text.into(),
            value: None,
            bit_length: 0,
            bit_offset: self.bits.bits_read(),
            meaning: None,
            depth: self.depth,
            kind: AnnotationKind::Note,
        });
    }

    /// 在嵌套层级中执行 `f`, 日志中先写入子结构标题
    pub fn sub_level<T>(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut Self) -> ParseResult<T>,
    ) -> ParseResult<T> {
        self.log.push(Annotation {
            name: name.to_string(),
            value: None,
            bit_length: 0,
            bit_offset: self.bits.bits_read(),
            meaning: None,
            depth: self.depth,
            kind: AnnotationKind::SubLevel,
        });
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    pub fn byte_aligned(&self) -> bool {
        self.bits.byte_aligned()
    }

    /// 读取 byte_alignment(): 1 个 1 位后补 0 到字节边界
    pub fn byte_alignment(&mut self) -> ParseResult<()> {
        self.read_flag("alignment_bit_equal_to_one", ReadOptions::new().check_equal_to(1))?;
        while !self.byte_aligned() {
            self.read_flag("alignment_bit_equal_to_zero", ReadOptions::new().check_equal_to(0))?;
        }
        Ok(())
    }

    pub fn more_rbsp_data(&self) -> bool {
        self.bits.more_rbsp_data()
    }

    pub fn bits_read(&self) -> usize {
        self.bits.bits_read()
    }

    pub fn bits_left(&self) -> usize {
        self.bits.bits_left()
    }

    /// 当前字节 (含未读完的部分字节) 起的剩余数据
    pub fn remaining_bytes(&self) -> &'a [u8] {
        let data = self.bits.data();
        data.get(self.bits.byte_position()..).unwrap_or(&[])
    }

    /// 窥视后续 `n` 位
    pub fn peek_bits(&self, n: u32) -> ParseResult<u32> {
        self.bits.peek_bits(n)
    }

    /// 当前日志
    pub fn log(&self) -> &AnnotationLog {
        &self.log
    }

    /// 取出日志
    pub fn into_log(self) -> AnnotationLog {
        self.log
    }

    fn guard<T>(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut Self) -> ParseResult<T>,
    ) -> ParseResult<T> {
        f(self).map_err(|e| self.record_error(name, e))
    }

    fn record_error(&mut self, name: &str, err: ParseError) -> ParseError {
        self.log.push(Annotation {
            name: format!("{name}: {err}"),
            value: None,
            bit_length: 0,
            bit_offset: self.bits.bits_read(),
            meaning: None,
            depth: self.depth,
            kind: AnnotationKind::Error,
        });
        err
    }

    fn finish_read(
        &mut self,
        name: &str,
        offset: usize,
        numeric: i64,
        value: FieldValue,
        opts: ReadOptions,
    ) -> ParseResult<()> {
        let code = u32::try_from(numeric).ok();
        self.log.push(Annotation {
            name: name.to_string(),
            value: Some(value),
            bit_length: (self.bits.bits_read() - offset) as u32,
            bit_offset: offset,
            meaning: opts.describe(code),
            depth: self.depth,
            kind: AnnotationKind::Read,
        });
        opts.verify(name, numeric)
            .map_err(|e| self.record_error(name, e))
    }
}
