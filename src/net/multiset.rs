//! 带重复计数的多重集。
//!
//! 内部以 `BTreeMap<T, usize>` 保存 `值 -> 次数`，不变式：存储的次数恒 `>= 1`，
//! 归零的条目立即删除。由于键有序，结构相等的多重集哈希一致，可以直接作为
//! 哈希表的键（状态图中的标识快照依赖这一点）。
//!
//! 派生的 `Ord` 仅是结构上的全序，用于把多重集放进有序容器；集合意义上的
//! 包含关系由 [`MultiSet::is_subset_of`] 等方法给出，它只是偏序。
use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::iter;
use std::ops::{Add, Mul};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::net::error::TokenError;

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MultiSet<T> {
    counts: BTreeMap<T, usize>,
}

impl<T> MultiSet<T> {
    pub fn new() -> Self {
        Self {
            counts: BTreeMap::new(),
        }
    }

    /// 含重复的元素个数。
    pub fn len(&self) -> usize {
        self.counts.values().sum()
    }

    /// 不同元素的个数。
    pub fn size(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// 按重复次数逐个迭代。
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.counts
            .iter()
            .flat_map(|(value, count)| iter::repeat_n(value, *count))
    }

    /// 迭代 `(值, 次数)`，不含重复。
    pub fn items(&self) -> impl Iterator<Item = (&T, usize)> {
        self.counts.iter().map(|(value, count)| (value, *count))
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }
}

impl<T: Ord> MultiSet<T> {
    pub fn count(&self, value: &T) -> usize {
        self.counts.get(value).copied().unwrap_or(0)
    }

    pub fn contains(&self, value: &T) -> bool {
        self.counts.contains_key(value)
    }

    pub fn add_one(&mut self, value: T) {
        self.add_times(value, 1);
    }

    fn add_times(&mut self, value: T, times: usize) {
        if times == 0 {
            return;
        }
        *self.counts.entry(value).or_insert(0) += times;
    }

    /// 每个值加入 `times` 次。
    pub fn add<I>(&mut self, values: I, times: usize)
    where
        I: IntoIterator<Item = T>,
    {
        for value in values {
            self.add_times(value, times);
        }
    }

    /// 每个值移除 `times` 次。先整体校验再修改：失败时多重集保持不变。
    pub fn remove<I>(&mut self, values: I, times: usize) -> Result<(), TokenError>
    where
        I: IntoIterator<Item = T>,
        T: fmt::Debug,
    {
        let mut wanted: BTreeMap<T, usize> = BTreeMap::new();
        for value in values {
            *wanted.entry(value).or_insert(0) += times;
        }
        self.remove_counts(wanted)
    }

    fn remove_counts(&mut self, wanted: BTreeMap<T, usize>) -> Result<(), TokenError>
    where
        T: fmt::Debug,
    {
        for (value, requested) in &wanted {
            let available = self.count(value);
            if *requested > available {
                return Err(TokenError::Insufficient {
                    value: format!("{:?}", value),
                    requested: *requested,
                    available,
                });
            }
        }
        for (value, requested) in wanted {
            if requested == 0 {
                continue;
            }
            if let Entry::Occupied(mut entry) = self.counts.entry(value) {
                *entry.get_mut() -= requested;
                if *entry.get() == 0 {
                    entry.remove();
                }
            }
        }
        Ok(())
    }

    /// 多重集之差，要求 `other <= self`。
    pub fn difference(&self, other: &Self) -> Result<Self, TokenError>
    where
        T: Clone + fmt::Debug,
    {
        let mut result = self.clone();
        let wanted = other
            .counts
            .iter()
            .map(|(value, count)| (value.clone(), *count))
            .collect();
        result.remove_counts(wanted)?;
        Ok(result)
    }

    /// 标量乘法，`k = 0` 得到空多重集。计数在 `usize::MAX` 处饱和。
    pub fn times(&self, k: usize) -> Self
    where
        T: Clone,
    {
        if k == 0 {
            return Self::new();
        }
        Self {
            counts: self
                .counts
                .iter()
                .map(|(value, count)| (value.clone(), count.saturating_mul(k)))
                .collect(),
        }
    }

    pub fn domain(&self) -> BTreeSet<&T> {
        self.counts.keys().collect()
    }

    /// `self <= other`：每个值在 `self` 中的次数不超过在 `other` 中的次数。
    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.counts
            .iter()
            .all(|(value, count)| *count <= other.count(value))
    }

    /// `self < other`：包含且至少一处严格更少，或不同元素更少。
    pub fn is_strict_subset_of(&self, other: &Self) -> bool {
        let mut strict = false;
        for (value, count) in &self.counts {
            let theirs = other.count(value);
            if *count > theirs {
                return false;
            }
            if *count < theirs {
                strict = true;
            }
        }
        strict || self.size() < other.size()
    }

    pub fn is_superset_of(&self, other: &Self) -> bool {
        other.is_subset_of(self)
    }

    pub fn is_strict_superset_of(&self, other: &Self) -> bool {
        other.is_strict_subset_of(self)
    }

    /// 包含关系下的偏序比较。
    pub fn inclusion(&self, other: &Self) -> Option<Ordering> {
        match (self.is_subset_of(other), other.is_subset_of(self)) {
            (true, true) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Less),
            (false, true) => Some(Ordering::Greater),
            (false, false) => None,
        }
    }
}

impl<T> Default for MultiSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Ord> FromIterator<T> for MultiSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut result = Self::new();
        result.add(iter, 1);
        result
    }
}

impl<T: Ord> Extend<T> for MultiSet<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.add(iter, 1);
    }
}

impl<T: Ord, const N: usize> From<[T; N]> for MultiSet<T> {
    fn from(values: [T; N]) -> Self {
        values.into_iter().collect()
    }
}

impl<T: Ord> From<Vec<T>> for MultiSet<T> {
    fn from(values: Vec<T>) -> Self {
        values.into_iter().collect()
    }
}

impl<T: Clone> IntoIterator for MultiSet<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.counts
            .into_iter()
            .flat_map(|(value, count)| iter::repeat_n(value, count))
            .collect::<Vec<_>>()
            .into_iter()
    }
}

impl<T: Ord + Clone> Add for &MultiSet<T> {
    type Output = MultiSet<T>;

    fn add(self, other: &MultiSet<T>) -> MultiSet<T> {
        let mut result = self.clone();
        for (value, count) in &other.counts {
            result.add_times(value.clone(), *count);
        }
        result
    }
}

impl<T: Ord + Clone> Add for MultiSet<T> {
    type Output = MultiSet<T>;

    fn add(self, other: MultiSet<T>) -> MultiSet<T> {
        &self + &other
    }
}

impl<T: Ord + Clone> Mul<usize> for &MultiSet<T> {
    type Output = MultiSet<T>;

    fn mul(self, k: usize) -> MultiSet<T> {
        self.times(k)
    }
}

impl<T: fmt::Display> fmt::Display for MultiSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (idx, value) in self.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, "}}")
    }
}

impl<T: fmt::Debug> fmt::Debug for MultiSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

// JSON 不支持非字符串键，序列化为 `[值, 次数]` 列表。
impl<T: Serialize> Serialize for MultiSet<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let pairs: Vec<(&T, usize)> = self.items().collect();
        pairs.serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for MultiSet<T>
where
    T: Deserialize<'de> + Ord,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let pairs = Vec::<(T, usize)>::deserialize(deserializer)?;
        let mut result = Self::new();
        for (value, count) in pairs {
            result.add_times(value, count);
        }
        Ok(result)
    }
}
