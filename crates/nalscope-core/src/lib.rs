//! # nalscope-core
//!
//! nalscope 视频基本流语法解析的基础设施.
//!
//! - [`bitreader::BitReader`]: 按位读取 RBSP, 支持 Exp-Golomb 编码
//! - [`reader::SyntaxReader`]: 带注释日志与取值约束检查的语法元素读取器
//! - [`symbol::SymbolTable`]: 码值 ↔ 枚举 ↔ 含义 的双向映射
//! - [`store::ParameterSetStore`]: 按 ID 存取已解析的参数集

pub mod annotation;
pub mod bitreader;
pub mod bitwriter;
pub mod error;
pub mod rational;
pub mod reader;
pub mod store;
pub mod symbol;

// 重导出常用类型
pub use bitreader::BitReader;
pub use bitwriter::BitWriter;
pub use annotation::{Annotation, AnnotationKind, AnnotationLog, FieldValue};
pub use error::{ParseError, ParseResult};
pub use rational::Rational;
pub use reader::{ReadOptions, SyntaxReader};
pub use store::{ParameterSet, ParameterSetStore};
pub use symbol::{SymbolEntry, SymbolTable};
