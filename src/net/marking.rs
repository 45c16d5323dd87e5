//! 标识：库所名到令牌多重集的只读快照，独立于任何网络。
//!
//! 空库所不出现在标识中，因此等价状态无论以何种顺序访问得到都结构相等、哈希一致。
//! 比较运算是逐库所的多重集包含关系（偏序）。
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;
use std::ops::Add;

use itertools::Itertools;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::net::error::{DomainError, NetResult};
use crate::net::multiset::MultiSet;
use crate::net::value::Value;

#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Marking {
    places: BTreeMap<String, MultiSet<Value>>,
}

impl Marking {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, place: &str) -> Option<&MultiSet<Value>> {
        self.places.get(place)
    }

    /// 缺失的库所视为空多重集。
    pub fn tokens(&self, place: &str) -> MultiSet<Value> {
        self.places.get(place).cloned().unwrap_or_default()
    }

    pub fn contains(&self, place: &str) -> bool {
        self.places.contains_key(place)
    }

    /// 设置库所令牌；空多重集等价于删除该库所。
    pub fn insert(&mut self, place: impl Into<String>, tokens: MultiSet<Value>) {
        let place = place.into();
        if tokens.is_empty() {
            self.places.remove(&place);
        } else {
            self.places.insert(place, tokens);
        }
    }

    pub fn places(&self) -> impl Iterator<Item = &str> {
        self.places.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MultiSet<Value>)> {
        self.places.iter().map(|(name, tokens)| (name.as_str(), tokens))
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }

    /// 逐库所相加。
    pub fn add(&self, other: &Marking) -> Marking {
        let mut result = self.clone();
        for (place, tokens) in &other.places {
            match result.places.entry(place.clone()) {
                btree_map::Entry::Occupied(mut entry) => {
                    let sum = &*entry.get() + tokens;
                    entry.insert(sum);
                }
                btree_map::Entry::Vacant(entry) => {
                    entry.insert(tokens.clone());
                }
            }
        }
        result
    }

    /// 逐库所相减；`other` 中的库所必须出现在 `self` 中。
    pub fn sub(&self, other: &Marking) -> NetResult<Marking> {
        let mut result = self.clone();
        for (place, tokens) in &other.places {
            let Some(current) = result.places.get(place) else {
                return Err(DomainError::AbsentPlace(place.clone()).into());
            };
            let left = current.difference(tokens)?;
            result.insert(place.clone(), left);
        }
        Ok(result)
    }

    pub fn is_subset_of(&self, other: &Marking) -> bool {
        self.places.iter().all(|(place, tokens)| match other.places.get(place) {
            Some(theirs) => tokens.is_subset_of(theirs),
            None => tokens.is_empty(),
        })
    }
}

impl PartialOrd for Marking {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            return Some(Ordering::Equal);
        }
        match (self.is_subset_of(other), other.is_subset_of(self)) {
            (true, _) => Some(Ordering::Less),
            (_, true) => Some(Ordering::Greater),
            _ => None,
        }
    }
}

impl<S: Into<String>> FromIterator<(S, MultiSet<Value>)> for Marking {
    fn from_iter<I: IntoIterator<Item = (S, MultiSet<Value>)>>(iter: I) -> Self {
        let mut marking = Marking::new();
        for (place, tokens) in iter {
            let place = place.into();
            let merged = &marking.tokens(&place) + &tokens;
            marking.insert(place, merged);
        }
        marking
    }
}

impl Add for &Marking {
    type Output = Marking;

    fn add(self, other: &Marking) -> Marking {
        Marking::add(self, other)
    }
}

impl fmt::Display for Marking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = self
            .places
            .iter()
            .map(|(place, tokens)| format!("{}: {}", place, tokens))
            .join(", ");
        write!(f, "{{{}}}", body)
    }
}

impl fmt::Debug for Marking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Marking({})", self)
    }
}

impl Serialize for Marking {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.places.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Marking {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let places = BTreeMap::<String, MultiSet<Value>>::deserialize(deserializer)?;
        Ok(places.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::error::{NetError, TokenError};

    fn ms(values: &[i64]) -> MultiSet<Value> {
        values.iter().map(|&i| Value::Int(i)).collect()
    }

    #[test]
    fn empty_places_are_omitted() {
        let m: Marking = [("p", ms(&[1])), ("q", ms(&[]))].into_iter().collect();
        assert_eq!(m.len(), 1);
        assert!(!m.contains("q"));
        assert!(m.tokens("q").is_empty());
        assert_eq!(m, [("p", ms(&[1]))].into_iter().collect::<Marking>());
    }

    #[test]
    fn arithmetic_is_per_place() {
        let a: Marking = [("p", ms(&[1])), ("q", ms(&[2]))].into_iter().collect();
        let b: Marking = [("p", ms(&[1, 3]))].into_iter().collect();
        let sum = &a + &b;
        assert_eq!(sum.tokens("p"), ms(&[1, 1, 3]));
        assert_eq!(sum.sub(&b).unwrap(), a);

        let absent: Marking = [("r", ms(&[1]))].into_iter().collect();
        assert_eq!(
            a.sub(&absent).unwrap_err(),
            NetError::Domain(DomainError::AbsentPlace("r".into()))
        );
        assert!(matches!(
            a.sub(&b),
            Err(NetError::Token(TokenError::Insufficient { .. }))
        ));
    }

    #[test]
    fn comparison_is_inclusion() {
        let small: Marking = [("p", ms(&[1]))].into_iter().collect();
        let big: Marking = [("p", ms(&[1, 2])), ("q", ms(&[0]))].into_iter().collect();
        let other: Marking = [("q", ms(&[5]))].into_iter().collect();
        assert!(small < big);
        assert!(big >= small);
        assert_eq!(small.partial_cmp(&other), None);
        assert!(!(small < small.clone()));
    }

    #[test]
    fn json_form_is_a_place_map() {
        let m: Marking = [("p", ms(&[1]))].into_iter().collect();
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, r#"{"p":[[{"Int":1},1]]}"#);
        let back: Marking = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }
}
