//! 库所：名字、令牌多重集与类型约束。
//!
//! 令牌只能经 `add` / `remove` / `reset` 修改，每次修改前先整体校验，
//! 失败时令牌保持不变。
use std::fmt;
use std::sync::Arc;

use indexmap::IndexSet;

use crate::net::error::TokenError;
use crate::net::multiset::MultiSet;
use crate::net::types::{AnyToken, SharedType};
use crate::net::value::Value;

#[derive(Clone)]
pub struct Place {
    pub name: String,
    tokens: MultiSet<Value>,
    token_type: SharedType,
    /// 以本库所为输出的迁移。
    pub(crate) pre: IndexSet<String>,
    /// 以本库所为输入的迁移。
    pub(crate) post: IndexSet<String>,
}

impl Place {
    pub fn new<I>(name: impl Into<String>, tokens: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Self {
            name: name.into(),
            tokens: tokens.into_iter().collect(),
            token_type: Arc::new(AnyToken),
            pre: IndexSet::new(),
            post: IndexSet::new(),
        }
    }

    pub fn with_type<I>(
        name: impl Into<String>,
        tokens: I,
        token_type: SharedType,
    ) -> Result<Self, TokenError>
    where
        I: IntoIterator<Item = Value>,
    {
        let mut place = Self {
            name: name.into(),
            tokens: MultiSet::new(),
            token_type,
            pre: IndexSet::new(),
            post: IndexSet::new(),
        };
        place.add(tokens)?;
        Ok(place)
    }

    pub fn tokens(&self) -> &MultiSet<Value> {
        &self.tokens
    }

    pub fn token_type(&self) -> &SharedType {
        &self.token_type
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn pre(&self) -> impl Iterator<Item = &str> {
        self.pre.iter().map(String::as_str)
    }

    pub fn post(&self) -> impl Iterator<Item = &str> {
        self.post.iter().map(String::as_str)
    }

    /// 校验全部令牌，报告第一个不满足约束的令牌。
    pub fn check<'a, I>(&self, values: I) -> Result<(), TokenError>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        for value in values {
            if !self.token_type.accepts(value) {
                return Err(TokenError::Forbidden {
                    place: self.name.clone(),
                    token: value.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn add<I>(&mut self, values: I) -> Result<(), TokenError>
    where
        I: IntoIterator<Item = Value>,
    {
        let values: Vec<Value> = values.into_iter().collect();
        self.check(&values)?;
        self.tokens.add(values, 1);
        Ok(())
    }

    pub fn remove<I>(&mut self, values: I) -> Result<(), TokenError>
    where
        I: IntoIterator<Item = Value>,
    {
        self.tokens.remove(values, 1)
    }

    /// 用 `values` 整体替换令牌。
    pub fn reset<I>(&mut self, values: I) -> Result<(), TokenError>
    where
        I: IntoIterator<Item = Value>,
    {
        let tokens: MultiSet<Value> = values.into_iter().collect();
        self.check(tokens.iter())?;
        self.tokens = tokens;
        Ok(())
    }

    pub fn empty(&mut self) {
        self.tokens.clear();
    }

    /// 回滚专用：恢复之前取得的快照，快照已经校验过。
    pub(crate) fn replace_unchecked(&mut self, tokens: MultiSet<Value>) {
        self.tokens = tokens;
    }

    pub(crate) fn set_type(&mut self, token_type: SharedType) {
        self.token_type = token_type;
    }

    /// 同令牌同类型、不带任何连接的副本。
    pub fn copy_as(&self, name: impl Into<String>) -> Place {
        Place {
            name: name.into(),
            tokens: self.tokens.clone(),
            token_type: self.token_type.clone(),
            pre: IndexSet::new(),
            post: IndexSet::new(),
        }
    }
}

impl fmt::Debug for Place {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Place")
            .field("name", &self.name)
            .field("tokens", &self.tokens)
            .field("type", &self.token_type)
            .finish()
    }
}
