//! # 表达式求值
//!
//! 守卫与输出弧上的表达式交给一个不透明的 [`Evaluator`]。网络持有一个
//! [`Environment`]（求值器 + 全局名字），在每次 `bind`、守卫检查时以引用方式
//! 传入，而不是挂在弧上的可变全局状态。
//!
//! 默认求值器 [`Interpreter`] 支持整数、字符串、布尔字面量、黑令牌 `dot`、
//! 名字、元组、`+ - * / // %`、比较、`and`/`or`/`not`、一元负号与括号。
//!
//! ```rust
//! use RustCPN::expr::{Environment, Expression};
//! use RustCPN::net::{Substitution, Value};
//!
//! let env = Environment::default();
//! let guard = Expression::new("x != 1");
//! assert!(guard.holds(&Substitution::with("x", 0), &env).unwrap());
//! assert!(!guard.holds(&Substitution::with("x", 1), &env).unwrap());
//! ```
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::net::substitution::Substitution;
use crate::net::value::Value;

pub mod eval;
pub mod lexer;
pub mod parser;

pub use eval::Interpreter;
pub use lexer::{free_names, rename};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("name '{0}' is not defined")]
    UnboundName(String),
    #[error("type error: {0}")]
    Type(String),
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    Overflow,
}

/// 一次求值可见的名字：先查绑定，再查全局。
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    binding: &'a Substitution,
    globals: &'a BTreeMap<String, Value>,
}

impl<'a> Scope<'a> {
    pub fn new(binding: &'a Substitution, globals: &'a BTreeMap<String, Value>) -> Self {
        Self { binding, globals }
    }

    pub fn lookup(&self, name: &str) -> Option<&'a Value> {
        self.binding.get(name).or_else(|| self.globals.get(name))
    }
}

pub trait Evaluator: Send + Sync {
    fn evaluate(&self, source: &str, scope: &Scope<'_>) -> Result<Value, EvalError>;
}

#[derive(Clone)]
pub struct Environment {
    evaluator: Arc<dyn Evaluator>,
    globals: BTreeMap<String, Value>,
}

impl Environment {
    pub fn new() -> Self {
        Self::with_evaluator(Arc::new(Interpreter::new()))
    }

    pub fn with_evaluator(evaluator: Arc<dyn Evaluator>) -> Self {
        Self {
            evaluator,
            globals: BTreeMap::new(),
        }
    }

    pub fn declare(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.globals.insert(name.into(), value.into());
    }

    pub fn globals(&self) -> &BTreeMap<String, Value> {
        &self.globals
    }

    pub fn is_global(&self, name: &str) -> bool {
        self.globals.contains_key(name)
    }

    pub fn evaluate(&self, source: &str, binding: &Substitution) -> Result<Value, EvalError> {
        self.evaluator
            .evaluate(source, &Scope::new(binding, &self.globals))
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("globals", &self.globals)
            .finish_non_exhaustive()
    }
}

const TRUE: &str = "True";

/// 守卫或输出弧上的表达式源文本。
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Expression {
    source: String,
}

impl Expression {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into().trim().to_string(),
        }
    }

    /// 恒真表达式，作为缺省守卫。
    pub fn truth() -> Self {
        Self::new(TRUE)
    }

    pub fn is_true(&self) -> bool {
        self.source == TRUE
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// 恒真表达式不经求值直接返回 `True`。
    pub fn evaluate(&self, binding: &Substitution, env: &Environment) -> Result<Value, EvalError> {
        if self.is_true() {
            return Ok(Value::Bool(true));
        }
        env.evaluate(&self.source, binding)
    }

    pub fn holds(&self, binding: &Substitution, env: &Environment) -> Result<bool, EvalError> {
        Ok(self.evaluate(binding, env)?.truthy())
    }

    pub fn vars(&self) -> Result<BTreeSet<String>, EvalError> {
        free_names(&self.source)
    }

    /// 重命名自由变量，得到新的表达式。
    pub fn substitute(&self, renaming: &Substitution) -> Result<Expression, EvalError> {
        Ok(Expression {
            source: rename(&self.source, |name| renaming.rename(name))?,
        })
    }

    pub fn and(&self, other: &Expression) -> Expression {
        match (self.is_true(), other.is_true()) {
            (true, _) => other.clone(),
            (_, true) => self.clone(),
            _ => Expression::new(format!("({}) and ({})", self.source, other.source)),
        }
    }

    pub fn or(&self, other: &Expression) -> Expression {
        if self.is_true() || other.is_true() {
            return Expression::truth();
        }
        Expression::new(format!("({}) or ({})", self.source, other.source))
    }

    pub fn not(&self) -> Expression {
        Expression::new(format!("not ({})", self.source))
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Expression({:?})", self.source)
    }
}

impl From<&str> for Expression {
    fn from(source: &str) -> Self {
        Expression::new(source)
    }
}
