//! # 弧注记代数
//!
//! 弧注记是一棵不可变的树，八种变体对同一组操作给出各自的语义：
//!
//! | 变体 | 输入弧 | `flow` | `modes(available)` |
//! |------|--------|--------|--------------------|
//! | `Value(v)` | 允许 | `{v}` | `v ∈ available` 时一个空替换 |
//! | `Variable(x)` | 允许 | `{b(x)}` | 每个令牌（含重复）一个 `{x -> v}` |
//! | `Expression(e)` | 禁止 | `{eval(e)}` | 不适用 |
//! | `MultiArc(cs)` | 各分量均允许时 | 分量 flow 之和 | 分量模式的积，再要求总 flow `<= available` |
//! | `Tuple(cs)` | 各分量均允许时 | 分量 flow 的积，组成元组 | 只匹配等长元组令牌 |
//! | `Test(a)` | 允许 | 空 | 同 `a` |
//! | `Inhibitor(a, c)` | 允许 | 空 | `a` 的任何模式都不满足 `c` 时一个空替换 |
//! | `Flush(x)` | 同内部注记 | `b(x)` 的全部元素 | 总是一个 `{x -> available}` |
//!
//! `bind` 把注记在绑定下求值为一个令牌值，`tokens` 给出该值展开后实际流经
//! 弧的令牌序列（用于库所类型检查）。
use std::collections::BTreeSet;
use std::fmt;

use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::expr::lexer::KEYWORDS;
use crate::expr::{Environment, Expression};
use crate::net::error::{ModeError, NetError, NetResult, StructuralError};
use crate::net::multiset::MultiSet;
use crate::net::substitution::{Substitution, combine};
use crate::net::value::Value;

static VARIABLE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z]\w*$").expect("variable name pattern must compile")
});

/// 标识符且不是表达式关键字（`True`、`dot` 等作变量名会遮蔽字面量）。
pub fn is_variable_name(name: &str) -> bool {
    VARIABLE_NAME.is_match(name) && !KEYWORDS.contains(&name)
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ArcAnnotation {
    Value(Value),
    Variable(String),
    Expression(Expression),
    MultiArc(Vec<ArcAnnotation>),
    Tuple(Vec<ArcAnnotation>),
    Test(Box<ArcAnnotation>),
    Inhibitor {
        inner: Box<ArcAnnotation>,
        condition: Expression,
    },
    Flush(Box<ArcAnnotation>),
}

impl ArcAnnotation {
    pub fn value(value: impl Into<Value>) -> Self {
        ArcAnnotation::Value(value.into())
    }

    pub fn variable(name: impl Into<String>) -> Result<Self, StructuralError> {
        let name = name.into();
        if !is_variable_name(&name) {
            return Err(StructuralError::InvalidVariable(name));
        }
        Ok(ArcAnnotation::Variable(name))
    }

    pub fn expression(source: impl Into<String>) -> Self {
        ArcAnnotation::Expression(Expression::new(source))
    }

    pub fn multi(components: Vec<ArcAnnotation>) -> Result<Self, StructuralError> {
        if components.is_empty() {
            return Err(StructuralError::MissingComponents("multiarc"));
        }
        Ok(ArcAnnotation::MultiArc(components))
    }

    pub fn tuple(components: Vec<ArcAnnotation>) -> Result<Self, StructuralError> {
        if components.is_empty() {
            return Err(StructuralError::MissingComponents("tuple"));
        }
        Ok(ArcAnnotation::Tuple(components))
    }

    pub fn test(inner: ArcAnnotation) -> Self {
        ArcAnnotation::Test(Box::new(inner))
    }

    pub fn inhibitor(inner: ArcAnnotation) -> Self {
        Self::inhibitor_if(inner, Expression::truth())
    }

    pub fn inhibitor_if(inner: ArcAnnotation, condition: Expression) -> Self {
        ArcAnnotation::Inhibitor {
            inner: Box::new(inner),
            condition,
        }
    }

    /// 合法变量名构造变量 flush 弧，否则视为表达式（仅可用于输出弧）。
    pub fn flush(source: &str) -> Self {
        let source = source.trim();
        let inner = if is_variable_name(source) {
            ArcAnnotation::Variable(source.to_string())
        } else {
            ArcAnnotation::expression(source)
        };
        ArcAnnotation::Flush(Box::new(inner))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ArcAnnotation::Value(_) => "value",
            ArcAnnotation::Variable(_) => "variable",
            ArcAnnotation::Expression(_) => "expression",
            ArcAnnotation::MultiArc(_) => "multiarc",
            ArcAnnotation::Tuple(_) => "tuple",
            ArcAnnotation::Test(_) => "test",
            ArcAnnotation::Inhibitor { .. } => "inhibitor",
            ArcAnnotation::Flush(_) => "flush",
        }
    }

    /// 结构校验：变量名合法、多弧与元组非空。反序列化得到的注记需要先校验。
    pub fn validate(&self) -> Result<(), StructuralError> {
        match self {
            ArcAnnotation::Variable(name) if !is_variable_name(name) => {
                Err(StructuralError::InvalidVariable(name.clone()))
            }
            ArcAnnotation::MultiArc(cs) if cs.is_empty() => {
                Err(StructuralError::MissingComponents("multiarc"))
            }
            ArcAnnotation::Tuple(cs) if cs.is_empty() => {
                Err(StructuralError::MissingComponents("tuple"))
            }
            ArcAnnotation::MultiArc(cs) | ArcAnnotation::Tuple(cs) => {
                cs.iter().try_for_each(ArcAnnotation::validate)
            }
            ArcAnnotation::Test(inner)
            | ArcAnnotation::Inhibitor { inner, .. }
            | ArcAnnotation::Flush(inner) => inner.validate(),
            _ => Ok(()),
        }
    }

    pub fn input_allowed(&self) -> bool {
        match self {
            ArcAnnotation::Value(_) | ArcAnnotation::Variable(_) => true,
            ArcAnnotation::Expression(_) => false,
            ArcAnnotation::MultiArc(cs) | ArcAnnotation::Tuple(cs) => {
                cs.iter().all(ArcAnnotation::input_allowed)
            }
            ArcAnnotation::Test(_) | ArcAnnotation::Inhibitor { .. } => true,
            ArcAnnotation::Flush(inner) => inner.input_allowed(),
        }
    }

    /// 自由变量集合。
    pub fn vars(&self) -> BTreeSet<String> {
        let mut result = BTreeSet::new();
        self.collect_vars(&mut result);
        result
    }

    fn collect_vars(&self, out: &mut BTreeSet<String>) {
        match self {
            ArcAnnotation::Value(_) => {}
            ArcAnnotation::Variable(name) => {
                out.insert(name.clone());
            }
            // 无法切分的表达式在求值时才报错
            ArcAnnotation::Expression(expr) => out.extend(expr.vars().unwrap_or_default()),
            ArcAnnotation::MultiArc(cs) | ArcAnnotation::Tuple(cs) => {
                cs.iter().for_each(|c| c.collect_vars(out));
            }
            ArcAnnotation::Test(inner) | ArcAnnotation::Flush(inner) => inner.collect_vars(out),
            ArcAnnotation::Inhibitor { inner, condition } => {
                inner.collect_vars(out);
                out.extend(condition.vars().unwrap_or_default());
            }
        }
    }

    /// 按 `renaming` 重命名自由变量（结构改写，不求值）。
    pub fn substitute(&self, renaming: &Substitution) -> NetResult<ArcAnnotation> {
        let result = match self {
            ArcAnnotation::Value(v) => ArcAnnotation::Value(v.clone()),
            ArcAnnotation::Variable(name) => ArcAnnotation::variable(renaming.rename(name))?,
            ArcAnnotation::Expression(expr) => {
                ArcAnnotation::Expression(expr.substitute(renaming)?)
            }
            ArcAnnotation::MultiArc(cs) => ArcAnnotation::MultiArc(
                cs.iter()
                    .map(|c| c.substitute(renaming))
                    .collect::<NetResult<_>>()?,
            ),
            ArcAnnotation::Tuple(cs) => ArcAnnotation::Tuple(
                cs.iter()
                    .map(|c| c.substitute(renaming))
                    .collect::<NetResult<_>>()?,
            ),
            ArcAnnotation::Test(inner) => ArcAnnotation::Test(Box::new(inner.substitute(renaming)?)),
            ArcAnnotation::Inhibitor { inner, condition } => ArcAnnotation::Inhibitor {
                inner: Box::new(inner.substitute(renaming)?),
                condition: condition.substitute(renaming)?,
            },
            ArcAnnotation::Flush(inner) => {
                ArcAnnotation::Flush(Box::new(inner.substitute(renaming)?))
            }
        };
        Ok(result)
    }

    /// 把等于 `old` 的子注记替换为 `new`。
    pub fn replace(&self, old: &ArcAnnotation, new: &ArcAnnotation) -> ArcAnnotation {
        if self == old {
            return new.clone();
        }
        match self {
            ArcAnnotation::MultiArc(cs) => {
                ArcAnnotation::MultiArc(cs.iter().map(|c| c.replace(old, new)).collect())
            }
            ArcAnnotation::Tuple(cs) => {
                ArcAnnotation::Tuple(cs.iter().map(|c| c.replace(old, new)).collect())
            }
            ArcAnnotation::Test(inner) => ArcAnnotation::Test(Box::new(inner.replace(old, new))),
            ArcAnnotation::Inhibitor { inner, condition } => {
                let condition = match (old, new) {
                    (ArcAnnotation::Expression(from), ArcAnnotation::Expression(to))
                        if from == condition =>
                    {
                        to.clone()
                    }
                    _ => condition.clone(),
                };
                ArcAnnotation::Inhibitor {
                    inner: Box::new(inner.replace(old, new)),
                    condition,
                }
            }
            ArcAnnotation::Flush(inner) => ArcAnnotation::Flush(Box::new(inner.replace(old, new))),
            other => other.clone(),
        }
    }

    /// 在绑定下求值为单个令牌值。
    pub fn bind(&self, binding: &Substitution, env: &Environment) -> NetResult<Value> {
        match self {
            ArcAnnotation::Value(v) => Ok(v.clone()),
            ArcAnnotation::Variable(name) => Ok(binding.lookup(name)?.clone()),
            ArcAnnotation::Expression(expr) => Ok(expr.evaluate(binding, env)?),
            ArcAnnotation::MultiArc(cs) | ArcAnnotation::Tuple(cs) => cs
                .iter()
                .map(|c| c.bind(binding, env))
                .collect::<NetResult<Vec<_>>>()
                .map(Value::Tuple),
            ArcAnnotation::Test(inner) => inner.bind(binding, env),
            ArcAnnotation::Inhibitor { condition, .. } => {
                if condition.holds(binding, env)? {
                    Ok(Value::Tuple(Vec::new()))
                } else {
                    Err(ModeError::ConditionFailed(binding.to_string()).into())
                }
            }
            ArcAnnotation::Flush(inner) => {
                let bound = inner.bind(binding, env)?;
                Ok(Value::Bag(bound.spread().into_iter().collect()))
            }
        }
    }

    /// 实际流经弧的令牌序列，用于库所类型检查。抑制弧不搬运令牌。
    pub fn tokens(&self, binding: &Substitution, env: &Environment) -> NetResult<Vec<Value>> {
        match self {
            ArcAnnotation::MultiArc(cs) => {
                let mut result = Vec::new();
                for c in cs {
                    result.extend(c.tokens(binding, env)?);
                }
                Ok(result)
            }
            ArcAnnotation::Test(inner) => inner.tokens(binding, env),
            ArcAnnotation::Inhibitor { .. } => Ok(Vec::new()),
            ArcAnnotation::Flush(inner) => Ok(inner.bind(binding, env)?.spread()),
            other => Ok(vec![other.bind(binding, env)?]),
        }
    }

    /// 在绑定下该弧搬运的令牌多重集。
    pub fn flow(&self, binding: &Substitution, env: &Environment) -> NetResult<MultiSet<Value>> {
        match self {
            ArcAnnotation::Value(_) | ArcAnnotation::Variable(_) | ArcAnnotation::Expression(_) => {
                Ok(MultiSet::from([self.bind(binding, env)?]))
            }
            ArcAnnotation::MultiArc(cs) => {
                let mut result = MultiSet::new();
                for c in cs {
                    result = &result + &c.flow(binding, env)?;
                }
                Ok(result)
            }
            ArcAnnotation::Tuple(cs) => {
                let flows = cs
                    .iter()
                    .map(|c| c.flow(binding, env).map(|f| f.into_iter().collect::<Vec<_>>()))
                    .collect::<NetResult<Vec<_>>>()?;
                Ok(flows
                    .into_iter()
                    .multi_cartesian_product()
                    .map(Value::Tuple)
                    .collect())
            }
            ArcAnnotation::Test(_) | ArcAnnotation::Inhibitor { .. } => Ok(MultiSet::new()),
            ArcAnnotation::Flush(inner) => {
                Ok(inner.bind(binding, env)?.spread().into_iter().collect())
            }
        }
    }

    /// 给定库所中实际持有的令牌，返回所有内部一致且可实现的绑定。
    ///
    /// 找不到绑定时返回 [`ModeError`]，由迁移层折叠为空模式列表。
    pub fn modes(
        &self,
        available: &MultiSet<Value>,
        env: &Environment,
    ) -> NetResult<Vec<Substitution>> {
        match self {
            ArcAnnotation::Value(v) => {
                if available.contains(v) {
                    Ok(vec![Substitution::new()])
                } else {
                    Err(ModeError::NoMatch.into())
                }
            }
            ArcAnnotation::Variable(name) => {
                if available.is_empty() {
                    return Err(ModeError::NoValue.into());
                }
                Ok(available
                    .iter()
                    .map(|v| Substitution::with(name.clone(), v.clone()))
                    .collect())
            }
            ArcAnnotation::Expression(_) => {
                Err(StructuralError::InputNotAllowed(self.kind_name()).into())
            }
            ArcAnnotation::MultiArc(cs) => {
                let parts = cs
                    .iter()
                    .map(|c| c.modes(available, env))
                    .collect::<NetResult<Vec<_>>>()?;
                let mut result = Vec::new();
                for sub in combine(&parts) {
                    match self.flow(&sub, env) {
                        Ok(flow) if flow.is_subset_of(available) => result.push(sub),
                        Ok(_) | Err(NetError::Domain(_)) => {}
                        Err(err) => return Err(err),
                    }
                }
                Ok(result)
            }
            ArcAnnotation::Tuple(cs) => {
                let mut result = Vec::new();
                for token in available.iter() {
                    let Value::Tuple(items) = token else {
                        continue;
                    };
                    if items.len() != cs.len() {
                        continue;
                    }
                    let mut parts = Vec::with_capacity(cs.len());
                    let mut matched = true;
                    for (item, c) in items.iter().zip(cs) {
                        match c.modes(&MultiSet::from([item.clone()]), env) {
                            Ok(modes) => parts.push(modes),
                            Err(err) if err.is_mode() => {
                                matched = false;
                                break;
                            }
                            Err(err) => return Err(err),
                        }
                    }
                    if matched {
                        result.extend(combine(&parts));
                    }
                }
                if result.is_empty() {
                    return Err(ModeError::NoMode.into());
                }
                Ok(result)
            }
            ArcAnnotation::Test(inner) => inner.modes(available, env),
            ArcAnnotation::Inhibitor { inner, condition } => {
                let witnesses = match inner.modes(available, env) {
                    Ok(modes) => modes,
                    Err(err) if err.is_mode() => return Ok(vec![Substitution::new()]),
                    Err(err) => return Err(err),
                };
                for binding in witnesses {
                    if condition.holds(&binding, env)? {
                        return Err(ModeError::Inhibited(binding.to_string()).into());
                    }
                }
                Ok(vec![Substitution::new()])
            }
            ArcAnnotation::Flush(inner) => match inner.as_ref() {
                ArcAnnotation::Variable(name) => Ok(vec![Substitution::with(
                    name.clone(),
                    Value::Bag(available.clone()),
                )]),
                other => Err(StructuralError::InputNotAllowed(other.kind_name()).into()),
            },
        }
    }
}

fn write_components(f: &mut fmt::Formatter<'_>, cs: &[ArcAnnotation]) -> fmt::Result {
    if cs.len() == 1 {
        return write!(f, "({},)", cs[0]);
    }
    write!(f, "({})", cs.iter().join(", "))
}

fn write_suffixed(f: &mut fmt::Formatter<'_>, inner: &ArcAnnotation, suffix: char) -> fmt::Result {
    let text = inner.to_string();
    if text.chars().count() == 1 || (text.starts_with('(') && text.ends_with(')')) {
        write!(f, "{}{}", text, suffix)
    } else {
        write!(f, "({}){}", text, suffix)
    }
}

impl fmt::Display for ArcAnnotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArcAnnotation::Value(v) => write!(f, "{}", v),
            ArcAnnotation::Variable(name) => f.write_str(name),
            ArcAnnotation::Expression(expr) => write!(f, "{}", expr),
            ArcAnnotation::MultiArc(cs) | ArcAnnotation::Tuple(cs) => write_components(f, cs),
            ArcAnnotation::Test(inner) => write_suffixed(f, inner, '?'),
            ArcAnnotation::Inhibitor { inner, condition } if condition.is_true() => {
                write!(f, "{{no {}}}", inner)
            }
            ArcAnnotation::Inhibitor { inner, condition } => {
                write!(f, "{{no {} if {}}}", inner, condition)
            }
            ArcAnnotation::Flush(inner) => write_suffixed(f, inner, '!'),
        }
    }
}

impl fmt::Debug for ArcAnnotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind_name(), self)
    }
}
