//! 令牌值域：黑令牌、布尔、整数、字符串、元组，以及 flush 弧绑定得到的多重集。
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::net::multiset::MultiSet;

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    /// 黑令牌 `dot`。
    Dot,
    Bool(bool),
    Int(i64),
    Str(String),
    Tuple(Vec<Value>),
    Bag(MultiSet<Value>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Dot,
    Bool,
    Int,
    Str,
    Tuple,
    Bag,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Dot => "dot",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Str => "str",
            ValueKind::Tuple => "tuple",
            ValueKind::Bag => "multiset",
        };
        f.write_str(name)
    }
}

impl Value {
    pub fn tuple<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Value::Tuple(items.into_iter().collect())
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Dot => ValueKind::Dot,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Str(_) => ValueKind::Str,
            Value::Tuple(_) => ValueKind::Tuple,
            Value::Bag(_) => ValueKind::Bag,
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Dot => true,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Str(s) => !s.is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Bag(bag) => !bag.is_empty(),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// 字符串值可以充当名字（用于替换的复合与变量重命名）。
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// 展开为令牌序列：多重集与元组逐项展开，其余值视为单个令牌。
    pub fn spread(&self) -> Vec<Value> {
        match self {
            Value::Bag(bag) => bag.iter().cloned().collect(),
            Value::Tuple(items) => items.clone(),
            other => vec![other.clone()],
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<MultiSet<Value>> for Value {
    fn from(value: MultiSet<Value>) -> Self {
        Value::Bag(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Dot => write!(f, "dot"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Str(s) => write!(f, "'{}'", s),
            Value::Tuple(items) if items.len() == 1 => write!(f, "({},)", items[0]),
            Value::Tuple(items) => {
                write!(f, "(")?;
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, ")")
            }
            Value::Bag(bag) => write!(f, "{}", bag),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
