//! 变量替换（绑定）：名字到值的部分映射。
//!
//! * `apply` 对未绑定名字返回名字本身（恒等默认）；
//! * `lookup` 为严格访问，未绑定时报 [`DomainError::Unbound`]；
//! * `merge` 即并集 `f + g`，共享名字取值不同则报冲突；
//! * `compose` 即函数复合 `(f * g)(x) = f(g(x))`。
//!
//! 所有组合操作都返回新对象，不修改操作数。
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::net::error::DomainError;
use crate::net::value::Value;

#[derive(Default, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Substitution {
    bindings: BTreeMap<String, Value>,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    /// 构造单绑定替换。
    pub fn with(name: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut sub = Self::new();
        sub.insert(name, value);
        sub
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.bindings.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn lookup(&self, name: &str) -> Result<&Value, DomainError> {
        self.bindings
            .get(name)
            .ok_or_else(|| DomainError::Unbound(name.to_string()))
    }

    /// 调用式访问：未绑定的名字映射为它自身。
    pub fn apply(&self, name: &str) -> Value {
        self.bindings
            .get(name)
            .cloned()
            .unwrap_or_else(|| Value::Str(name.to_string()))
    }

    /// 变量重命名：绑定到字符串时返回该字符串，否则返回原名。
    pub fn rename(&self, name: &str) -> String {
        match self.bindings.get(name) {
            Some(Value::Str(target)) => target.clone(),
            _ => name.to_string(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn domain(&self) -> BTreeSet<&str> {
        self.bindings.keys().map(String::as_str).collect()
    }

    pub fn image(&self) -> Vec<&Value> {
        self.bindings.values().collect()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// 并集。两个替换在共享名字上取值不同时失败。
    pub fn merge(&self, other: &Substitution) -> Result<Substitution, DomainError> {
        let mut result = self.clone();
        for (name, value) in &other.bindings {
            match result.bindings.get(name) {
                Some(existing) if existing != value => {
                    return Err(DomainError::Conflict(name.clone()));
                }
                Some(_) => {}
                None => {
                    result.bindings.insert(name.clone(), value.clone());
                }
            }
        }
        Ok(result)
    }

    /// 复合 `self * other`：先应用 `other`，若结果是名字再交给 `self`。
    pub fn compose(&self, other: &Substitution) -> Substitution {
        let mut result = self.clone();
        for (name, value) in &other.bindings {
            let mapped = match value.as_name() {
                Some(inner) => self.apply(inner),
                None => value.clone(),
            };
            result.bindings.insert(name.clone(), mapped);
        }
        result
    }

    /// 只保留 `names` 中的绑定。
    pub fn restrict<'a, I>(&self, names: I) -> Substitution
    where
        I: IntoIterator<Item = &'a str>,
    {
        let keep: BTreeSet<&str> = names.into_iter().collect();
        Substitution {
            bindings: self
                .bindings
                .iter()
                .filter(|(name, _)| keep.contains(name.as_str()))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        }
    }

    pub(crate) fn as_map(&self) -> &BTreeMap<String, Value> {
        &self.bindings
    }
}

/// 各弧局部模式的笛卡尔积，两两合并，丢弃冲突组合。重复的模式保留。
///
/// `parts` 为空时结果是只含空替换的单元素列表；任一部分为空时结果为空。
pub fn combine(parts: &[Vec<Substitution>]) -> Vec<Substitution> {
    if parts.is_empty() {
        return vec![Substitution::new()];
    }
    let mut result = Vec::new();
    for choice in parts.iter().map(|part| part.iter()).multi_cartesian_product() {
        let merged = choice
            .into_iter()
            .try_fold(Substitution::new(), |acc, sub| acc.merge(sub));
        if let Ok(sub) = merged {
            result.push(sub);
        }
    }
    result
}

impl<K, V> FromIterator<(K, V)> for Substitution
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut sub = Self::new();
        for (name, value) in iter {
            sub.insert(name, value);
        }
        sub
    }
}

impl fmt::Display for Substitution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = self
            .bindings
            .iter()
            .map(|(name, value)| format!("{} -> {}", name, value))
            .join(", ");
        write!(f, "{{{}}}", body)
    }
}

impl fmt::Debug for Substitution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
