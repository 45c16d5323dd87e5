//! 错误分类：域错误、结构错误、模式错误、令牌错误与发生错误。
use std::fmt;

use thiserror::Error;

use crate::expr::EvalError;

/// 节点种类，用于结构错误信息。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Place,
    Transition,
    Node,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Place => write!(f, "place"),
            NodeKind::Transition => write!(f, "transition"),
            NodeKind::Node => write!(f, "node"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("unbound variable '{0}'")]
    Unbound(String),
    #[error("conflict on '{0}'")]
    Conflict(String),
    #[error("'{0}' absent from the marking")]
    AbsentPlace(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("{kind} '{name}' exists")]
    NodeExists { kind: NodeKind, name: String },
    #[error("{kind} '{name}' not found")]
    NodeNotFound { kind: NodeKind, name: String },
    #[error("already connected to '{0}'")]
    AlreadyConnected(String),
    #[error("not connected to '{0}'")]
    NotConnected(String),
    #[error("'{0}' not allowed on input arcs")]
    InputNotAllowed(&'static str),
    #[error("not a variable name '{0}'")]
    InvalidVariable(String),
    #[error("missing {0} components")]
    MissingComponents(&'static str),
    #[error("nothing to merge into '{0}'")]
    EmptyMerge(String),
    #[error("unknown state {0}")]
    UnknownState(usize),
    #[error("all states removed")]
    NoStates,
}

/// 单条弧注记找不到可满足的绑定。迁移层面会折叠为空模式列表。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModeError {
    #[error("no match for value")]
    NoMatch,
    #[error("no value to bind")]
    NoValue,
    #[error("no mode found")]
    NoMode,
    #[error("inhibited by {0}")]
    Inhibited(String),
    #[error("condition not true for {0}")]
    ConditionFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("forbidden token '{token}' in place '{place}'")]
    Forbidden { place: String, token: String },
    #[error("insufficient occurrences of {value}: requested {requested}, available {available}")]
    Insufficient {
        value: String,
        requested: usize,
        available: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FiringError {
    #[error("transition '{transition}' not enabled for {binding}")]
    NotEnabled { transition: String, binding: String },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NetError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Structural(#[from] StructuralError),
    #[error(transparent)]
    Mode(#[from] ModeError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Firing(#[from] FiringError),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

impl NetError {
    pub fn is_mode(&self) -> bool {
        matches!(self, NetError::Mode(_))
    }
}

pub type NetResult<T> = Result<T, NetError>;
