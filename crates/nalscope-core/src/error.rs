//! 统一错误类型定义.
//!
//! 所有 nalscope crate 共用的解析错误, 任一错误都会中止当前 NAL 单元的解析.

use thiserror::Error;

/// 语法解析错误
#[derive(Debug, Error)]
pub enum ParseError {
    /// 码流在读取过程中耗尽
    #[error("码流截断: 需要 {needed} 位, 剩余 {remaining} 位")]
    TruncatedStream { needed: usize, remaining: usize },

    /// 字段取值不满足标准规定的取值/范围
    #[error("约束违例: {0}")]
    ConstraintViolation(String),

    /// 跨字段的结构约束不满足
    #[error("结构约束违例: {0}")]
    StructuralConstraintViolation(String),

    /// 引用的参数集尚未出现在存储中
    #[error("未找到引用的 {kind}: id={id}")]
    UnresolvedReference { kind: &'static str, id: u32 },

    /// 可识别但不解析的语法
    #[error("不支持的语法: {0}")]
    Unsupported(String),
}

impl ParseError {
    /// 构造约束违例错误
    pub fn constraint(msg: impl Into<String>) -> Self {
        Self::ConstraintViolation(msg.into())
    }

    /// 构造结构约束违例错误
    pub fn structural(msg: impl Into<String>) -> Self {
        Self::StructuralConstraintViolation(msg.into())
    }
}

/// nalscope 统一 Result 类型
pub type ParseResult<T> = Result<T, ParseError>;
