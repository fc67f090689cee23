//! 符号表: 码值 ↔ 枚举值 ↔ 名称/含义 的双向映射.
//!
//! 所有带语义标签的编码字段 (NAL 类型、profile、宽高比等) 都由 [`symbol_table!`](crate::symbol_table)
//! 宏生成: 一个穷尽的枚举加上关联常量表.

/// 符号表中的一行
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolEntry<T: 'static> {
    /// 码流中的编码值
    pub code: u32,
    /// 对应的枚举值
    pub value: T,
    /// 枚举名称
    pub name: &'static str,
    /// 可读含义
    pub meaning: &'static str,
}

/// 由 `symbol_table!` 生成的枚举实现此 trait
pub trait SymbolTable: Sized + Copy + PartialEq + 'static {
    /// 全部条目, 按声明顺序
    const ENTRIES: &'static [SymbolEntry<Self>];

    /// 枚举值对应的编码值
    fn code(self) -> u32;

    /// 由编码值查找枚举值
    fn from_code(code: u32) -> Option<Self> {
        Self::entry_of(code).map(|e| e.value)
    }

    /// 编码值对应的条目
    fn entry_of(code: u32) -> Option<&'static SymbolEntry<Self>> {
        Self::ENTRIES.iter().find(|e| e.code == code)
    }

    /// 枚举名称
    fn name(self) -> &'static str {
        Self::ENTRIES
            .iter()
            .find(|e| e.value == self)
            .map_or("", |e| e.name)
    }

    /// 可读含义
    fn meaning(self) -> &'static str {
        Self::ENTRIES
            .iter()
            .find(|e| e.value == self)
            .map_or("", |e| e.meaning)
    }

    /// 由编码值查找含义, 供 [`ReadOptions::meaning_map`](crate::ReadOptions::meaning_map) 使用
    fn meaning_of(code: u32) -> Option<&'static str> {
        Self::entry_of(code).map(|e| e.meaning)
    }
}

/// 生成符号表枚举
///
/// ```
/// use nalscope_core::{symbol_table, SymbolTable};
///
/// symbol_table! {
///     /// 图像编码类型
///     pub enum CodingType {
///         Intra = 1 => "I",
///         Predictive = 2 => "P",
///     }
/// }
///
/// assert_eq!(CodingType::from_code(2), Some(CodingType::Predictive));
/// assert_eq!(CodingType::Intra.meaning(), "I");
/// assert_eq!(CodingType::meaning_of(3), None);
/// ```
#[macro_export]
macro_rules! symbol_table {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident = $code:expr => $meaning:expr
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $(
                $(#[$vmeta])*
                $variant,
            )+
        }

        impl $crate::symbol::SymbolTable for $name {
            const ENTRIES: &'static [$crate::symbol::SymbolEntry<Self>] = &[
                $(
                    $crate::symbol::SymbolEntry {
                        code: $code,
                        value: $name::$variant,
                        name: stringify!($variant),
                        meaning: $meaning,
                    },
                )+
            ];

            fn code(self) -> u32 {
                match self {
                    $( $name::$variant => $code, )+
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str($crate::symbol::SymbolTable::meaning(*self))
            }
        }
    };
}
