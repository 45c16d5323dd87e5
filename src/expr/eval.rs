//! 默认求值器：解析结果按源文本缓存，对同一守卫的重复求值只解析一次。
use std::cmp::Ordering;
use std::sync::{Arc, RwLock};

use rustc_hash::FxHashMap;

use crate::expr::parser::{self, Ast, BinOp, CmpOp};
use crate::expr::{EvalError, Evaluator, Scope};
use crate::net::value::Value;

#[derive(Debug, Default)]
pub struct Interpreter {
    cache: RwLock<FxHashMap<String, Arc<Ast>>>,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    fn compile(&self, source: &str) -> Result<Arc<Ast>, EvalError> {
        if let Ok(cache) = self.cache.read() {
            if let Some(ast) = cache.get(source) {
                return Ok(ast.clone());
            }
        }
        let ast = Arc::new(parser::parse(source)?);
        if let Ok(mut cache) = self.cache.write() {
            cache.insert(source.to_string(), ast.clone());
        }
        Ok(ast)
    }
}

impl Evaluator for Interpreter {
    fn evaluate(&self, source: &str, scope: &Scope<'_>) -> Result<Value, EvalError> {
        let ast = self.compile(source)?;
        eval(&ast, scope)
    }
}

pub fn eval(ast: &Ast, scope: &Scope<'_>) -> Result<Value, EvalError> {
    match ast {
        Ast::Literal(value) => Ok(value.clone()),
        Ast::Name(name) => scope
            .lookup(name)
            .cloned()
            .ok_or_else(|| EvalError::UnboundName(name.clone())),
        Ast::Tuple(items) => items
            .iter()
            .map(|item| eval(item, scope))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Tuple),
        Ast::Neg(inner) => match eval(inner, scope)? {
            Value::Int(i) => i.checked_neg().map(Value::Int).ok_or(EvalError::Overflow),
            other => Err(EvalError::Type(format!("bad operand for unary -: {}", other.kind()))),
        },
        Ast::Binary(op, lhs, rhs) => arithmetic(*op, eval(lhs, scope)?, eval(rhs, scope)?),
        Ast::Compare(op, lhs, rhs) => compare(*op, &eval(lhs, scope)?, &eval(rhs, scope)?),
        Ast::And(lhs, rhs) => {
            let left = eval(lhs, scope)?;
            if left.truthy() { eval(rhs, scope) } else { Ok(left) }
        }
        Ast::Or(lhs, rhs) => {
            let left = eval(lhs, scope)?;
            if left.truthy() { Ok(left) } else { eval(rhs, scope) }
        }
        Ast::Not(inner) => Ok(Value::Bool(!eval(inner, scope)?.truthy())),
    }
}

fn floor_div(a: i64, b: i64) -> Result<i64, EvalError> {
    if b == 0 {
        return Err(EvalError::DivisionByZero);
    }
    let q = a.checked_div(b).ok_or(EvalError::Overflow)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

fn floor_rem(a: i64, b: i64) -> Result<i64, EvalError> {
    if b == 0 {
        return Err(EvalError::DivisionByZero);
    }
    let r = a.checked_rem(b).ok_or(EvalError::Overflow)?;
    if r != 0 && ((r < 0) != (b < 0)) {
        Ok(r + b)
    } else {
        Ok(r)
    }
}

fn arithmetic(op: BinOp, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    let result = match (op, lhs, rhs) {
        (BinOp::Add, Value::Int(a), Value::Int(b)) => {
            Value::Int(a.checked_add(b).ok_or(EvalError::Overflow)?)
        }
        (BinOp::Sub, Value::Int(a), Value::Int(b)) => {
            Value::Int(a.checked_sub(b).ok_or(EvalError::Overflow)?)
        }
        (BinOp::Mul, Value::Int(a), Value::Int(b)) => {
            Value::Int(a.checked_mul(b).ok_or(EvalError::Overflow)?)
        }
        (BinOp::Div, Value::Int(a), Value::Int(b)) => Value::Int(floor_div(a, b)?),
        (BinOp::Rem, Value::Int(a), Value::Int(b)) => Value::Int(floor_rem(a, b)?),
        (BinOp::Add, Value::Str(a), Value::Str(b)) => Value::Str(a + &b),
        (BinOp::Add, Value::Tuple(mut a), Value::Tuple(b)) => {
            a.extend(b);
            Value::Tuple(a)
        }
        (BinOp::Add, Value::Bag(a), Value::Bag(b)) => Value::Bag(&a + &b),
        (op, lhs, rhs) => {
            return Err(EvalError::Type(format!(
                "unsupported operand types for {:?}: {} and {}",
                op,
                lhs.kind(),
                rhs.kind()
            )));
        }
    };
    Ok(result)
}

fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> Result<Value, EvalError> {
    let holds = match op {
        CmpOp::Eq => lhs == rhs,
        CmpOp::Ne => lhs != rhs,
        ordering => {
            if lhs.kind() != rhs.kind() {
                return Err(EvalError::Type(format!(
                    "cannot order {} and {}",
                    lhs.kind(),
                    rhs.kind()
                )));
            }
            let ord = lhs.cmp(rhs);
            match ordering {
                CmpOp::Lt => ord == Ordering::Less,
                CmpOp::Le => ord != Ordering::Greater,
                CmpOp::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            }
        }
    };
    Ok(Value::Bool(holds))
}
