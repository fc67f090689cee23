//! 参数集存储.
//!
//! 每种编解码器为每类参数集 (SPS/PPS/VPS) 维护一个按 ID 索引的存储.
//! 解析时整条插入 (同 ID 覆盖), 引用时按 ID 查找.

use std::collections::BTreeMap;

use crate::{ParseError, ParseResult};

/// 可存入 [`ParameterSetStore`] 的参数集
pub trait ParameterSet {
    /// 参数集类别名, 出现在 `UnresolvedReference` 错误中
    const KIND: &'static str;
}

/// 按 ID 索引的参数集存储
#[derive(Debug, Clone)]
pub struct ParameterSetStore<T> {
    sets: BTreeMap<u32, T>,
}

impl<T> Default for ParameterSetStore<T> {
    fn default() -> Self {
        Self {
            sets: BTreeMap::new(),
        }
    }
}

impl<T: ParameterSet> ParameterSetStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入参数集, 同 ID 的旧值被覆盖并返回
    pub fn insert(&mut self, id: u32, set: T) -> Option<T> {
        self.sets.insert(id, set)
    }

    /// 按 ID 查找, 缺失时返回 `UnresolvedReference`
    pub fn get(&self, id: u32) -> ParseResult<&T> {
        self.sets.get(&id).ok_or(ParseError::UnresolvedReference {
            kind: T::KIND,
            id,
        })
    }

    pub fn contains(&self, id: u32) -> bool {
        self.sets.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// 按 ID 升序遍历
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.sets.iter().map(|(&id, set)| (id, set))
    }

    /// 清空存储
    pub fn clear(&mut self) {
        self.sets.clear();
    }
}
