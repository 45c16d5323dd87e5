//! 表达式的词法切分，只服务于自由名字提取与变量重命名。
use std::collections::BTreeSet;

use nom::branch::alt;
use nom::bytes::complete::{tag, take_while};
use nom::character::complete::{alpha1, alphanumeric1, char, digit1, multispace0, satisfy};
use nom::combinator::{map, recognize};
use nom::multi::many0_count;
use nom::sequence::{delimited, pair};
use nom::{IResult, Parser};

use crate::expr::EvalError;

/// 不被视为变量的保留字。
pub const KEYWORDS: &[&str] = &["and", "or", "not", "True", "False", "true", "false", "dot"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Name,
    Number,
    Text,
    Symbol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub start: usize,
}

impl Token<'_> {
    pub fn end(&self) -> usize {
        self.start + self.text.len()
    }

    pub fn is_variable(&self) -> bool {
        self.kind == TokenKind::Name && !KEYWORDS.contains(&self.text)
    }
}

pub(crate) fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0_count(alt((alphanumeric1, tag("_")))),
    ))
    .parse(input)
}

pub(crate) fn quoted(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(char('\''), take_while(|c: char| c != '\''), char('\'')),
        delimited(char('"'), take_while(|c: char| c != '"'), char('"')),
    ))
    .parse(input)
}

fn symbol(input: &str) -> IResult<&str, &str> {
    alt((
        tag("=="),
        tag("!="),
        tag("<="),
        tag(">="),
        tag("//"),
        recognize(satisfy(|c| "+-*/%<>(),".contains(c))),
    ))
    .parse(input)
}

fn token(input: &str) -> IResult<&str, (TokenKind, &str)> {
    alt((
        map(identifier, |s| (TokenKind::Name, s)),
        map(digit1, |s| (TokenKind::Number, s)),
        map(recognize(quoted), |s| (TokenKind::Text, s)),
        map(symbol, |s| (TokenKind::Symbol, s)),
    ))
    .parse(input)
}

pub fn tokenize(source: &str) -> Result<Vec<Token<'_>>, EvalError> {
    let mut tokens = Vec::new();
    let mut rest = source;
    loop {
        let (after_ws, _) = multispace0::<_, nom::error::Error<&str>>(rest)
            .map_err(|_| EvalError::Syntax(source.to_string()))?;
        if after_ws.is_empty() {
            break;
        }
        let start = source.len() - after_ws.len();
        let (next, (kind, text)) =
            token(after_ws).map_err(|_| EvalError::Syntax(source.to_string()))?;
        tokens.push(Token { kind, text, start });
        rest = next;
    }
    Ok(tokens)
}

/// 表达式中出现的自由名字（去除保留字）。
pub fn free_names(source: &str) -> Result<BTreeSet<String>, EvalError> {
    Ok(tokenize(source)?
        .into_iter()
        .filter(Token::is_variable)
        .map(|tok| tok.text.to_string())
        .collect())
}

/// 按词法单元重命名变量，`x` 不会匹配 `xy` 的前缀，字符串字面量保持不变。
pub fn rename<F>(source: &str, mut renaming: F) -> Result<String, EvalError>
where
    F: FnMut(&str) -> String,
{
    let mut result = String::with_capacity(source.len());
    let mut last = 0;
    for tok in tokenize(source)? {
        if tok.is_variable() {
            result.push_str(&source[last..tok.start]);
            result.push_str(&renaming(tok.text));
            last = tok.end();
        }
    }
    result.push_str(&source[last..]);
    Ok(result)
}
