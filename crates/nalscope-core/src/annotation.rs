//! 语法元素注释日志.
//!
//! 每次读取都会追加一条 [`Annotation`], 记录字段名、取值、位宽与含义.
//! 日志只供展示 (命令行 `--fields` 输出), 解析逻辑从不读取它.

use std::fmt;

/// 注释中记录的字段取值
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// 定长或 ue(v) 读取的无符号值
    Unsigned(u64),
    /// se(v) 或推导出的有符号值
    Signed(i64),
    /// 1 位标志
    Flag(bool),
    /// 文本值 (如推导出的分辨率描述)
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsigned(v) => write!(f, "{v}"),
            Self::Signed(v) => write!(f, "{v}"),
            Self::Flag(v) => write!(f, "{}", u8::from(*v)),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        Self::Unsigned(u64::from(v))
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        Self::Unsigned(v)
    }
}

impl From<usize> for FieldValue {
    fn from(v: usize) -> Self {
        Self::Unsigned(v as u64)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        Self::Signed(i64::from(v))
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Signed(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Flag(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

/// 注释条目类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationKind {
    /// 从码流读取的字段
    Read,
    /// 由已读字段推导出的变量
    Calculated,
    /// 嵌套语法结构的标题 (如 `vui_parameters()`)
    SubLevel,
    /// 自由文本诊断
    Note,
    /// 导致解析中止的错误
    Error,
}

/// 单条注释
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// 字段名或结构名
    pub name: String,
    /// 取值, 子结构标题与诊断为 `None`
    pub value: Option<FieldValue>,
    /// 消耗的位数, 非读取条目为 0
    pub bit_length: u32,
    /// 读取前的位偏移 (相对 RBSP 起点)
    pub bit_offset: usize,
    /// 取值含义
    pub meaning: Option<String>,
    /// 嵌套深度
    pub depth: usize,
    /// 条目类别
    pub kind: AnnotationKind,
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for _ in 0..self.depth {
            f.write_str("  ")?;
        }
        match self.kind {
            AnnotationKind::SubLevel => write!(f, "{}:", self.name)?,
            AnnotationKind::Note => write!(f, "# {}", self.name)?,
            AnnotationKind::Error => write!(f, "! {}", self.name)?,
            AnnotationKind::Read | AnnotationKind::Calculated => {
                write!(f, "{}", self.name)?;
                if let Some(value) = &self.value {
                    write!(f, " = {value}")?;
                }
                if self.kind == AnnotationKind::Read {
                    write!(f, " [{}b]", self.bit_length)?;
                } else {
                    f.write_str(" (calc)")?;
                }
            }
        }
        if let Some(meaning) = &self.meaning {
            write!(f, " // {meaning}")?;
        }
        Ok(())
    }
}

/// 追加式注释日志
#[derive(Debug, Clone)]
pub struct AnnotationLog {
    entries: Vec<Annotation>,
    enabled: bool,
}

impl Default for AnnotationLog {
    fn default() -> Self {
        Self::new(true)
    }
}

impl AnnotationLog {
    /// 创建日志, `enabled=false` 时丢弃 Read/Calculated/SubLevel 条目, 仅保留诊断与错误
    pub fn new(enabled: bool) -> Self {
        Self {
            entries: Vec::new(),
            enabled,
        }
    }

    /// 是否记录全部条目
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 追加一条注释
    pub fn push(&mut self, annotation: Annotation) {
        let always_kept = matches!(annotation.kind, AnnotationKind::Note | AnnotationKind::Error);
        if self.enabled || always_kept {
            self.entries.push(annotation);
        }
    }

    /// 全部条目
    pub fn entries(&self) -> &[Annotation] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Annotation> {
        self.entries.iter()
    }

    /// 按名称查找第一条读取或推导条目
    pub fn find(&self, name: &str) -> Option<&Annotation> {
        self.entries.iter().find(|a| {
            a.name == name && matches!(a.kind, AnnotationKind::Read | AnnotationKind::Calculated)
        })
    }

    /// 所有诊断 (Note) 条目
    pub fn notes(&self) -> impl Iterator<Item = &Annotation> {
        self.entries
            .iter()
            .filter(|a| a.kind == AnnotationKind::Note)
    }

    /// 将另一段日志追加到末尾
    pub fn extend(&mut self, other: AnnotationLog) {
        self.entries.extend(other.entries);
    }
}

impl<'a> IntoIterator for &'a AnnotationLog {
    type Item = &'a Annotation;
    type IntoIter = std::slice::Iter<'a, Annotation>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_entry(name: &str, value: u32) -> Annotation {
        Annotation {
            name: name.to_string(),
            value: Some(value.into()),
            bit_length: 8,
            bit_offset: 0,
            meaning: None,
            depth: 0,
            kind: AnnotationKind::Read,
        }
    }

    #[test]
    fn test_disabled_log_keeps_notes() {
        let mut log = AnnotationLog::new(false);
        log.push(read_entry("profile_idc", 100));
        log.push(Annotation {
            name: "缺少 POC 上下文".into(),
            value: None,
            bit_length: 0,
            bit_offset: 0,
            meaning: None,
            depth: 0,
            kind: AnnotationKind::Note,
        });
        assert_eq!(log.len(), 1, "关闭时只保留诊断");
        assert_eq!(log.notes().count(), 1);
    }

    #[test]
    fn test_display_format() {
        let mut entry = read_entry("profile_idc", 100);
        entry.depth = 1;
        entry.meaning = Some("High".into());
        assert_eq!(entry.to_string(), "  profile_idc = 100 [8b] // High");
    }

    #[test]
    fn test_find_by_name() {
        let mut log = AnnotationLog::default();
        log.push(read_entry("level_idc", 40));
        assert_eq!(
            log.find("level_idc").and_then(|a| a.value.clone()),
            Some(FieldValue::Unsigned(40))
        );
        assert!(log.find("missing").is_none());
    }
}
