//! 表达式语法分析（nom）。
//!
//! 优先级从低到高：`or` < `and` < `not` < 比较 < `+ -` < `* / // %` < 一元负号 < 原子。
//! 比较不支持链式写法。括号中单个表达式是分组，带逗号或为空时是元组。
use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{char, digit1, multispace0, satisfy};
use nom::combinator::{all_consuming, map, map_res, not, opt, peek, value, verify};
use nom::multi::{many0, separated_list0};
use nom::sequence::{delimited, pair, preceded, terminated};
use nom::{IResult, Parser};

use crate::expr::lexer::{KEYWORDS, identifier, quoted};
use crate::expr::EvalError;
use crate::net::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Ast {
    Literal(Value),
    Name(String),
    Tuple(Vec<Ast>),
    Neg(Box<Ast>),
    Binary(BinOp, Box<Ast>, Box<Ast>),
    Compare(CmpOp, Box<Ast>, Box<Ast>),
    And(Box<Ast>, Box<Ast>),
    Or(Box<Ast>, Box<Ast>),
    Not(Box<Ast>),
}

type PResult<'a, T> = IResult<&'a str, T>;

fn ws<'a, O, P>(inner: P) -> impl Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>
where
    P: Parser<&'a str, Output = O, Error = nom::error::Error<&'a str>>,
{
    delimited(multispace0, inner, multispace0)
}

/// 关键字之后不能紧跟标识符字符。
fn keyword<'a>(
    word: &'static str,
) -> impl Parser<&'a str, Output = &'a str, Error = nom::error::Error<&'a str>> {
    terminated(
        tag(word),
        not(peek(satisfy(|c: char| c.is_alphanumeric() || c == '_'))),
    )
}

fn literal(input: &str) -> PResult<'_, Ast> {
    alt((
        value(Ast::Literal(Value::Bool(true)), alt((keyword("True"), keyword("true")))),
        value(Ast::Literal(Value::Bool(false)), alt((keyword("False"), keyword("false")))),
        value(Ast::Literal(Value::Dot), keyword("dot")),
        map_res(digit1, |digits: &str| {
            digits.parse::<i64>().map(|i| Ast::Literal(Value::Int(i)))
        }),
        map(quoted, |text: &str| Ast::Literal(Value::Str(text.to_string()))),
    ))
    .parse(input)
}

fn name(input: &str) -> PResult<'_, Ast> {
    map(
        verify(identifier, |ident: &str| !KEYWORDS.contains(&ident)),
        |ident: &str| Ast::Name(ident.to_string()),
    )
    .parse(input)
}

fn parenthesised(input: &str) -> PResult<'_, Ast> {
    let (input, _) = char('(').parse(input)?;
    let (input, mut items) = separated_list0(ws(char(',')), disjunction).parse(input)?;
    let (input, trailing) = opt(ws(char(','))).parse(input)?;
    let (input, _) = ws(char(')')).parse(input)?;
    let ast = if items.len() == 1 && trailing.is_none() {
        items.remove(0)
    } else {
        Ast::Tuple(items)
    };
    Ok((input, ast))
}

fn atom(input: &str) -> PResult<'_, Ast> {
    ws(alt((literal, name, parenthesised))).parse(input)
}

fn unary(input: &str) -> PResult<'_, Ast> {
    alt((
        map(preceded(ws(char('-')), unary), |inner| Ast::Neg(Box::new(inner))),
        atom,
    ))
    .parse(input)
}

fn fold_binary(first: Ast, rest: Vec<(BinOp, Ast)>) -> Ast {
    rest.into_iter().fold(first, |acc, (op, rhs)| {
        Ast::Binary(op, Box::new(acc), Box::new(rhs))
    })
}

fn term(input: &str) -> PResult<'_, Ast> {
    let operator = ws(alt((
        value(BinOp::Mul, char('*')),
        value(BinOp::Div, tag("//")),
        value(BinOp::Div, char('/')),
        value(BinOp::Rem, char('%')),
    )));
    let (input, (first, rest)) = pair(unary, many0(pair(operator, unary))).parse(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn additive(input: &str) -> PResult<'_, Ast> {
    let operator = ws(alt((value(BinOp::Add, char('+')), value(BinOp::Sub, char('-')))));
    let (input, (first, rest)) = pair(term, many0(pair(operator, term))).parse(input)?;
    Ok((input, fold_binary(first, rest)))
}

fn comparison(input: &str) -> PResult<'_, Ast> {
    let operator = ws(alt((
        value(CmpOp::Eq, tag("==")),
        value(CmpOp::Ne, tag("!=")),
        value(CmpOp::Le, tag("<=")),
        value(CmpOp::Ge, tag(">=")),
        value(CmpOp::Lt, tag("<")),
        value(CmpOp::Gt, tag(">")),
    )));
    let (input, (lhs, rhs)) = pair(additive, opt(pair(operator, additive))).parse(input)?;
    let ast = match rhs {
        Some((op, rhs)) => Ast::Compare(op, Box::new(lhs), Box::new(rhs)),
        None => lhs,
    };
    Ok((input, ast))
}

fn negation(input: &str) -> PResult<'_, Ast> {
    alt((
        map(preceded(ws(keyword("not")), negation), |inner| {
            Ast::Not(Box::new(inner))
        }),
        comparison,
    ))
    .parse(input)
}

fn conjunction(input: &str) -> PResult<'_, Ast> {
    let (input, (first, rest)) =
        pair(negation, many0(preceded(ws(keyword("and")), negation))).parse(input)?;
    let ast = rest
        .into_iter()
        .fold(first, |acc, rhs| Ast::And(Box::new(acc), Box::new(rhs)));
    Ok((input, ast))
}

fn disjunction(input: &str) -> PResult<'_, Ast> {
    let (input, (first, rest)) =
        pair(conjunction, many0(preceded(ws(keyword("or")), conjunction))).parse(input)?;
    let ast = rest
        .into_iter()
        .fold(first, |acc, rhs| Ast::Or(Box::new(acc), Box::new(rhs)));
    Ok((input, ast))
}

pub fn parse(source: &str) -> Result<Ast, EvalError> {
    all_consuming(ws(disjunction))
        .parse(source)
        .map(|(_, ast)| ast)
        .map_err(|err| EvalError::Syntax(format!("{}: {}", source, err)))
}
