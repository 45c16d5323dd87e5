//! 库所的令牌类型约束。
//!
//! 约束只对外暴露一个谓词 `accepts`，组合（与/或/非）不属于执行引擎的职责；
//! 唯一的例外是合并库所时需要的并集 [`Union`]。
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::net::value::{Value, ValueKind};

pub trait TokenType: fmt::Debug + Send + Sync {
    fn accepts(&self, value: &Value) -> bool;

    /// 可序列化的描述；自定义谓词返回 `None`，持久化时退化为 `Any`。
    fn to_spec(&self) -> Option<TypeSpec> {
        None
    }
}

pub type SharedType = Arc<dyn TokenType>;

/// 接受任意令牌。
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyToken;

impl TokenType for AnyToken {
    fn accepts(&self, _value: &Value) -> bool {
        true
    }

    fn to_spec(&self) -> Option<TypeSpec> {
        Some(TypeSpec::Any)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct KindOf(pub ValueKind);

impl TokenType for KindOf {
    fn accepts(&self, value: &Value) -> bool {
        value.kind() == self.0
    }

    fn to_spec(&self) -> Option<TypeSpec> {
        Some(TypeSpec::Kind(self.0))
    }
}

/// 有限值域。
#[derive(Debug, Clone)]
pub struct OneOf(pub BTreeSet<Value>);

impl OneOf {
    pub fn new<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self(values.into_iter().map(Into::into).collect())
    }
}

impl TokenType for OneOf {
    fn accepts(&self, value: &Value) -> bool {
        self.0.contains(value)
    }

    fn to_spec(&self) -> Option<TypeSpec> {
        Some(TypeSpec::OneOf(self.0.iter().cloned().collect()))
    }
}

/// 任意函数谓词。
pub struct Predicate {
    name: String,
    check: Box<dyn Fn(&Value) -> bool + Send + Sync>,
}

impl Predicate {
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Box::new(check),
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Predicate({})", self.name)
    }
}

impl TokenType for Predicate {
    fn accepts(&self, value: &Value) -> bool {
        (self.check)(value)
    }
}

#[derive(Debug, Clone)]
pub struct Union(pub Vec<SharedType>);

impl TokenType for Union {
    fn accepts(&self, value: &Value) -> bool {
        self.0.iter().any(|ty| ty.accepts(value))
    }

    fn to_spec(&self) -> Option<TypeSpec> {
        let mut values = BTreeSet::new();
        for ty in &self.0 {
            match ty.to_spec()? {
                TypeSpec::Any => return Some(TypeSpec::Any),
                TypeSpec::OneOf(vs) => values.extend(vs),
                TypeSpec::Kind(_) => return None,
            }
        }
        Some(TypeSpec::OneOf(values.into_iter().collect()))
    }
}

/// 令牌类型的可序列化形式。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeSpec {
    #[default]
    Any,
    Kind(ValueKind),
    OneOf(Vec<Value>),
}

impl TypeSpec {
    pub fn build(&self) -> SharedType {
        match self {
            TypeSpec::Any => Arc::new(AnyToken),
            TypeSpec::Kind(kind) => Arc::new(KindOf(*kind)),
            TypeSpec::OneOf(values) => Arc::new(OneOf::new(values.iter().cloned())),
        }
    }
}

/// 把两个类型合并为并集；任一方为 `AnyToken` 时直接返回它。
pub fn unite(left: &SharedType, right: &SharedType) -> SharedType {
    if matches!(left.to_spec(), Some(TypeSpec::Any)) {
        return left.clone();
    }
    if matches!(right.to_spec(), Some(TypeSpec::Any)) {
        return right.clone();
    }
    Arc::new(Union(vec![left.clone(), right.clone()]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_and_domain_constraints() {
        let ints = KindOf(ValueKind::Int);
        assert!(ints.accepts(&Value::Int(3)));
        assert!(!ints.accepts(&Value::from("3")));

        let small = OneOf::new([1, 2]);
        assert!(small.accepts(&Value::Int(2)));
        assert!(!small.accepts(&Value::Int(5)));
    }

    #[test]
    fn predicate_runs_closure() {
        let even = Predicate::new("even", |v| v.as_int().is_some_and(|i| i % 2 == 0));
        assert!(even.accepts(&Value::Int(4)));
        assert!(!even.accepts(&Value::Int(3)));
        assert!(even.to_spec().is_none());
    }

    #[test]
    fn union_accepts_either_side() {
        let left: SharedType = Arc::new(OneOf::new([1]));
        let right: SharedType = Arc::new(KindOf(ValueKind::Str));
        let both = unite(&left, &right);
        assert!(both.accepts(&Value::Int(1)));
        assert!(both.accepts(&Value::from("a")));
        assert!(!both.accepts(&Value::Int(2)));

        let any: SharedType = Arc::new(AnyToken);
        assert!(matches!(unite(&left, &any).to_spec(), Some(TypeSpec::Any)));
    }
}
