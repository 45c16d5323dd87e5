//! 着色 Petri 网：库所与迁移共享同一名字空间，双向维护连接关系。
//!
//! 对标识的批量修改（`set_marking` / `add_marking` / `remove_marking` / `fire`）
//! 都是全有或全无：中途失败会恢复到修改前的标识再返回错误。
use std::collections::BTreeSet;
use std::fmt::{self, Write as FmtWrite};
use std::fs;
use std::path::Path;

use indexmap::{IndexMap, IndexSet};
use log::{debug, warn};
use rayon::prelude::*;

use crate::expr::{Environment, Expression};
use crate::net::annotation::ArcAnnotation;
use crate::net::error::{NetResult, NodeKind, StructuralError};
use crate::net::marking::Marking;
use crate::net::place::Place;
use crate::net::substitution::Substitution;
use crate::net::transition::Transition;
use crate::net::types::unite;
use crate::net::value::Value;

/// 按名字取得的节点。
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Place(&'a Place),
    Transition(&'a Transition),
}

impl NodeRef<'_> {
    pub fn name(&self) -> &str {
        match self {
            NodeRef::Place(place) => &place.name,
            NodeRef::Transition(trans) => &trans.name,
        }
    }
}

#[derive(Clone)]
pub struct PetriNet {
    pub name: String,
    places: IndexMap<String, Place>,
    transitions: IndexMap<String, Transition>,
    env: Environment,
}

impl fmt::Debug for PetriNet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PetriNet")
            .field("name", &self.name)
            .field("places", &self.places.values().collect::<Vec<_>>())
            .field("transitions", &self.transitions.values().collect::<Vec<_>>())
            .field("env", &self.env)
            .finish()
    }
}

fn not_found(kind: NodeKind, name: &str) -> StructuralError {
    StructuralError::NodeNotFound {
        kind,
        name: name.to_string(),
    }
}

/// 保持位置不变地修改映射中的键。
fn rename_key<V>(map: &mut IndexMap<String, V>, old: &str, new: &str) {
    if let Some((index, _, value)) = map.shift_remove_full(old) {
        map.shift_insert(index, new.to_string(), value);
    }
}

fn rename_member(set: &mut IndexSet<String>, old: &str, new: &str) {
    if let Some((index, _)) = set.shift_remove_full(old) {
        set.shift_insert(index, new.to_string());
    }
}

/// 把多条弧注记拼成一条：多弧先展开为分量。
fn join_labels(labels: Vec<ArcAnnotation>) -> NetResult<ArcAnnotation> {
    let mut flat = Vec::with_capacity(labels.len());
    for label in labels {
        match label {
            ArcAnnotation::MultiArc(components) => flat.extend(components),
            other => flat.push(other),
        }
    }
    if flat.len() == 1 {
        return Ok(flat.remove(0));
    }
    Ok(ArcAnnotation::multi(flat)?)
}

impl PetriNet {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_environment(name, Environment::default())
    }

    pub fn with_environment(name: impl Into<String>, env: Environment) -> Self {
        Self {
            name: name.into(),
            places: IndexMap::new(),
            transitions: IndexMap::new(),
            env,
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// 声明一个在所有守卫和表达式中可见的全局名字。
    pub fn declare(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.env.declare(name, value);
    }

    pub fn has_place(&self, name: &str) -> bool {
        self.places.contains_key(name)
    }

    pub fn has_transition(&self, name: &str) -> bool {
        self.transitions.contains_key(name)
    }

    pub fn has_node(&self, name: &str) -> bool {
        self.has_place(name) || self.has_transition(name)
    }

    pub fn place(&self, name: &str) -> NetResult<&Place> {
        Ok(self
            .places
            .get(name)
            .ok_or_else(|| not_found(NodeKind::Place, name))?)
    }

    fn place_mut(&mut self, name: &str) -> NetResult<&mut Place> {
        Ok(self
            .places
            .get_mut(name)
            .ok_or_else(|| not_found(NodeKind::Place, name))?)
    }

    pub fn transition(&self, name: &str) -> NetResult<&Transition> {
        Ok(self
            .transitions
            .get(name)
            .ok_or_else(|| not_found(NodeKind::Transition, name))?)
    }

    fn transition_mut(&mut self, name: &str) -> NetResult<&mut Transition> {
        Ok(self
            .transitions
            .get_mut(name)
            .ok_or_else(|| not_found(NodeKind::Transition, name))?)
    }

    pub fn node(&self, name: &str) -> NetResult<NodeRef<'_>> {
        if let Some(place) = self.places.get(name) {
            return Ok(NodeRef::Place(place));
        }
        if let Some(trans) = self.transitions.get(name) {
            return Ok(NodeRef::Transition(trans));
        }
        Err(not_found(NodeKind::Node, name).into())
    }

    pub fn places(&self) -> impl Iterator<Item = &Place> {
        self.places.values()
    }

    pub fn transitions(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.values()
    }

    fn ensure_fresh(&self, name: &str) -> Result<(), StructuralError> {
        let kind = if self.has_place(name) {
            NodeKind::Place
        } else if self.has_transition(name) {
            NodeKind::Transition
        } else {
            return Ok(());
        };
        Err(StructuralError::NodeExists {
            kind,
            name: name.to_string(),
        })
    }

    pub fn add_place(&mut self, mut place: Place) -> NetResult<()> {
        self.ensure_fresh(&place.name)?;
        place.pre.clear();
        place.post.clear();
        debug!("add place {} with {}", place.name, place.tokens());
        self.places.insert(place.name.clone(), place);
        Ok(())
    }

    /// 加入迁移；迁移已带的弧经由 `add_input` / `add_output` 重新连接。
    pub fn add_transition(&mut self, transition: Transition) -> NetResult<()> {
        self.ensure_fresh(&transition.name)?;
        let Transition {
            name,
            guard,
            inputs,
            outputs,
        } = transition;
        self.transitions
            .insert(name.clone(), Transition::with_guard(name.clone(), guard));
        let connected = inputs
            .into_iter()
            .try_for_each(|(place, label)| self.add_input(&place, &name, label))
            .and_then(|_| {
                outputs
                    .into_iter()
                    .try_for_each(|(place, label)| self.add_output(&place, &name, label))
            });
        if let Err(err) = connected {
            self.remove_transition(&name)?;
            return Err(err);
        }
        Ok(())
    }

    /// 先删除所有关联弧再删除库所。
    pub fn remove_place(&mut self, name: &str) -> NetResult<Place> {
        let place = self.place(name)?;
        let producers: Vec<String> = place.pre.iter().cloned().collect();
        let consumers: Vec<String> = place.post.iter().cloned().collect();
        for trans in producers {
            self.remove_output(name, &trans)?;
        }
        for trans in consumers {
            self.remove_input(name, &trans)?;
        }
        debug!("remove place {}", name);
        Ok(self
            .places
            .shift_remove(name)
            .ok_or_else(|| not_found(NodeKind::Place, name))?)
    }

    pub fn remove_transition(&mut self, name: &str) -> NetResult<Transition> {
        let trans = self.transition(name)?;
        let inputs: Vec<String> = trans.inputs.keys().cloned().collect();
        let outputs: Vec<String> = trans.outputs.keys().cloned().collect();
        for place in inputs {
            self.remove_input(&place, name)?;
        }
        for place in outputs {
            self.remove_output(&place, name)?;
        }
        debug!("remove transition {}", name);
        Ok(self
            .transitions
            .shift_remove(name)
            .ok_or_else(|| not_found(NodeKind::Transition, name))?)
    }

    pub fn add_input(&mut self, place: &str, trans: &str, label: ArcAnnotation) -> NetResult<()> {
        self.place(place)?;
        self.transition_mut(trans)?.add_input(place, label)?;
        self.place_mut(place)?.post.insert(trans.to_string());
        Ok(())
    }

    pub fn remove_input(&mut self, place: &str, trans: &str) -> NetResult<ArcAnnotation> {
        self.place(place)?;
        let label = self.transition_mut(trans)?.remove_input(place)?;
        self.place_mut(place)?.post.shift_remove(trans);
        Ok(label)
    }

    pub fn add_output(&mut self, place: &str, trans: &str, label: ArcAnnotation) -> NetResult<()> {
        self.place(place)?;
        let unbound: BTreeSet<String> = {
            let inputs: BTreeSet<String> = self
                .transition(trans)?
                .inputs
                .values()
                .flat_map(|a| a.vars())
                .collect();
            label
                .vars()
                .into_iter()
                .filter(|v| !inputs.contains(v) && !self.env.is_global(v))
                .collect()
        };
        if !unbound.is_empty() {
            warn!(
                "output arc {} -> {} uses {:?}, not bound by any input arc yet",
                trans, place, unbound
            );
        }
        self.transition_mut(trans)?.add_output(place, label)?;
        self.place_mut(place)?.pre.insert(trans.to_string());
        Ok(())
    }

    pub fn remove_output(&mut self, place: &str, trans: &str) -> NetResult<ArcAnnotation> {
        self.place(place)?;
        let label = self.transition_mut(trans)?.remove_output(place)?;
        self.place_mut(place)?.pre.shift_remove(trans);
        Ok(label)
    }

    /// 一组节点的前驱节点名。
    pub fn pre<'a, I>(&self, nodes: I) -> NetResult<BTreeSet<String>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut result = BTreeSet::new();
        for name in nodes {
            match self.node(name)? {
                NodeRef::Place(place) => result.extend(place.pre.iter().cloned()),
                NodeRef::Transition(trans) => result.extend(trans.inputs.keys().cloned()),
            }
        }
        Ok(result)
    }

    /// 一组节点的后继节点名。
    pub fn post<'a, I>(&self, nodes: I) -> NetResult<BTreeSet<String>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut result = BTreeSet::new();
        for name in nodes {
            match self.node(name)? {
                NodeRef::Place(place) => result.extend(place.post.iter().cloned()),
                NodeRef::Transition(trans) => result.extend(trans.outputs.keys().cloned()),
            }
        }
        Ok(result)
    }

    pub fn get_marking(&self) -> Marking {
        self.places
            .values()
            .map(|place| (place.name.as_str(), place.tokens().clone()))
            .collect()
    }

    fn restore(&mut self, marking: &Marking) {
        for place in self.places.values_mut() {
            place.replace_unchecked(marking.tokens(&place.name));
        }
    }

    fn with_rollback<F>(&mut self, action: &str, update: F) -> NetResult<()>
    where
        F: FnOnce(&mut Self) -> NetResult<()>,
    {
        let old = self.get_marking();
        update(self).inspect_err(|err| {
            warn!("{} failed, restoring previous marking: {}", action, err);
            self.restore(&old);
        })
    }

    /// 设置标识：标识中缺失的库所清空，网络中不存在的库所忽略。
    pub fn set_marking(&mut self, marking: &Marking) -> NetResult<()> {
        self.with_rollback("set_marking", |net| {
            for place in net.places.values_mut() {
                match marking.get(&place.name) {
                    Some(tokens) => place.reset(tokens.iter().cloned())?,
                    None => place.empty(),
                }
            }
            Ok(())
        })
    }

    pub fn add_marking(&mut self, marking: &Marking) -> NetResult<()> {
        self.with_rollback("add_marking", |net| {
            for (name, tokens) in marking.iter() {
                if let Some(place) = net.places.get_mut(name) {
                    place.add(tokens.iter().cloned())?;
                }
            }
            Ok(())
        })
    }

    pub fn remove_marking(&mut self, marking: &Marking) -> NetResult<()> {
        self.with_rollback("remove_marking", |net| {
            for (name, tokens) in marking.iter() {
                if let Some(place) = net.places.get_mut(name) {
                    place.remove(tokens.iter().cloned())?;
                }
            }
            Ok(())
        })
    }

    pub fn rename_node(&mut self, old: &str, new: &str) -> NetResult<()> {
        if self.has_node(new) {
            return Err(StructuralError::NodeExists {
                kind: NodeKind::Node,
                name: new.to_string(),
            }
            .into());
        }
        if let Some(place) = self.places.get(old) {
            let producers: Vec<String> = place.pre.iter().cloned().collect();
            let consumers: Vec<String> = place.post.iter().cloned().collect();
            for trans in producers {
                rename_key(&mut self.transition_mut(&trans)?.outputs, old, new);
            }
            for trans in consumers {
                rename_key(&mut self.transition_mut(&trans)?.inputs, old, new);
            }
            rename_key(&mut self.places, old, new);
            self.place_mut(new)?.name = new.to_string();
        } else if let Some(trans) = self.transitions.get(old) {
            let inputs: Vec<String> = trans.inputs.keys().cloned().collect();
            let outputs: Vec<String> = trans.outputs.keys().cloned().collect();
            for place in inputs {
                rename_member(&mut self.place_mut(&place)?.post, old, new);
            }
            for place in outputs {
                rename_member(&mut self.place_mut(&place)?.pre, old, new);
            }
            rename_key(&mut self.transitions, old, new);
            self.transition_mut(new)?.name = new.to_string();
        } else {
            return Err(not_found(NodeKind::Node, old).into());
        }
        debug!("rename node {} to {}", old, new);
        Ok(())
    }

    /// 复制库所（令牌、类型与所有连接）。
    pub fn copy_place<'a, I>(&mut self, source: &str, targets: I) -> NetResult<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let src = self.place(source)?.clone();
        for target in targets {
            self.add_place(src.copy_as(target))?;
            for trans in &src.post {
                let label = self.transition(trans)?.inputs[source].clone();
                self.add_input(target, trans, label)?;
            }
            for trans in &src.pre {
                let label = self.transition(trans)?.outputs[source].clone();
                self.add_output(target, trans, label)?;
            }
        }
        Ok(())
    }

    /// 复制迁移（守卫与所有连接）。
    pub fn copy_transition<'a, I>(&mut self, source: &str, targets: I) -> NetResult<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let src = self.transition(source)?.clone();
        for target in targets {
            let mut copy = src.clone();
            copy.name = target.to_string();
            self.add_transition(copy)?;
        }
        Ok(())
    }

    /// 合并库所为新库所 `target`：令牌相加，类型取并，弧合并为多弧。源库所保留。
    pub fn merge_places<'a, I>(&mut self, target: &str, sources: I) -> NetResult<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let sources = sources
            .into_iter()
            .map(|name| self.place(name).cloned())
            .collect::<NetResult<Vec<_>>>()?;
        let Some((first, rest)) = sources.split_first() else {
            return Err(StructuralError::EmptyMerge(target.to_string()).into());
        };
        let mut merged = first.copy_as(target);
        for place in rest {
            merged.set_type(unite(merged.token_type(), place.token_type()));
            let tokens = merged.tokens() + place.tokens();
            merged.replace_unchecked(tokens);
        }
        self.add_place(merged)?;

        let mut consumers: IndexMap<String, Vec<ArcAnnotation>> = IndexMap::new();
        let mut producers: IndexMap<String, Vec<ArcAnnotation>> = IndexMap::new();
        for place in &sources {
            for trans in &place.post {
                let label = self.transition(trans)?.inputs[&place.name].clone();
                consumers.entry(trans.clone()).or_default().push(label);
            }
            for trans in &place.pre {
                let label = self.transition(trans)?.outputs[&place.name].clone();
                producers.entry(trans.clone()).or_default().push(label);
            }
        }
        for (trans, labels) in consumers {
            self.add_input(target, &trans, join_labels(labels)?)?;
        }
        for (trans, labels) in producers {
            self.add_output(target, &trans, join_labels(labels)?)?;
        }
        Ok(())
    }

    /// 合并迁移为新迁移 `target`：守卫取合取，弧合并为多弧。源迁移保留。
    pub fn merge_transitions<'a, I>(&mut self, target: &str, sources: I) -> NetResult<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let sources = sources
            .into_iter()
            .map(|name| self.transition(name).cloned())
            .collect::<NetResult<Vec<_>>>()?;
        if sources.is_empty() {
            return Err(StructuralError::EmptyMerge(target.to_string()).into());
        }
        let guard = sources
            .iter()
            .fold(Expression::truth(), |acc, trans| acc.and(&trans.guard));
        self.add_transition(Transition::with_guard(target, guard))?;

        let mut inputs: IndexMap<String, Vec<ArcAnnotation>> = IndexMap::new();
        let mut outputs: IndexMap<String, Vec<ArcAnnotation>> = IndexMap::new();
        for trans in &sources {
            for (place, label) in &trans.inputs {
                inputs.entry(place.clone()).or_default().push(label.clone());
            }
            for (place, label) in &trans.outputs {
                outputs.entry(place.clone()).or_default().push(label.clone());
            }
        }
        for (place, labels) in inputs {
            self.add_input(&place, target, join_labels(labels)?)?;
        }
        for (place, labels) in outputs {
            self.add_output(&place, target, join_labels(labels)?)?;
        }
        Ok(())
    }

    pub fn modes(&self, trans: &str) -> NetResult<Vec<Substitution>> {
        self.transition(trans)?.modes(self)
    }

    pub fn enabled(&self, trans: &str, binding: &Substitution) -> NetResult<bool> {
        self.transition(trans)?.enabled(self, binding)
    }

    pub fn activated(&self, trans: &str, binding: &Substitution) -> NetResult<bool> {
        self.transition(trans)?.activated(self, binding)
    }

    pub fn flow(&self, trans: &str, binding: &Substitution) -> NetResult<(Marking, Marking)> {
        self.transition(trans)?.flow(self, binding)
    }

    /// 以 `binding` 激发迁移。先算出完整的令牌流再修改库所，
    /// 同一库所既是输入又是输出时结果与修改顺序无关。
    pub fn fire(&mut self, trans: &str, binding: &Substitution) -> NetResult<()> {
        let (consumed, produced) = self.flow(trans, binding)?;
        debug!("fire {} with {}", trans, binding);
        self.with_rollback("fire", |net| {
            for (name, tokens) in consumed.iter() {
                net.place_mut(name)?.remove(tokens.iter().cloned())?;
            }
            for (name, tokens) in produced.iter() {
                net.place_mut(name)?.add(tokens.iter().cloned())?;
            }
            Ok(())
        })
    }

    /// 冻结当前标识，计算所有迁移的模式；`parallel` 时用 rayon 并行计算。
    pub fn all_modes(&self, parallel: bool) -> NetResult<Vec<(String, Vec<Substitution>)>> {
        let transitions: Vec<&Transition> = self.transitions.values().collect();
        let compute = |trans: &&Transition| -> NetResult<(String, Vec<Substitution>)> {
            Ok((trans.name.clone(), trans.modes(self)?))
        };
        if parallel {
            transitions.par_iter().map(compute).collect()
        } else {
            transitions.iter().map(compute).collect()
        }
    }

    pub fn to_dot(&self) -> String {
        let mut dot = String::new();
        let _ = writeln!(&mut dot, "digraph \"{}\" {{", escape_label(&self.name));
        let _ = writeln!(&mut dot, "    rankdir=LR;");
        let _ = writeln!(&mut dot, "    node [fontname=\"Helvetica\"];");

        for (idx, place) in self.places.values().enumerate() {
            let label = format!("{}\\n{}", escape_label(&place.name), escape_label(&place.tokens().to_string()));
            let _ = writeln!(
                &mut dot,
                "    place_{} [label=\"{}\", shape=circle, style=filled, fillcolor=\"#e3f2fd\"];",
                idx, label
            );
        }

        for (idx, trans) in self.transitions.values().enumerate() {
            let label = if trans.guard.is_true() {
                escape_label(&trans.name)
            } else {
                format!("{}\\n[{}]", escape_label(&trans.name), escape_label(trans.guard.source()))
            };
            let _ = writeln!(
                &mut dot,
                "    trans_{} [label=\"{}\", shape=box, style=filled, fillcolor=\"#ffe0b2\"];",
                idx, label
            );
        }

        for (t_idx, trans) in self.transitions.values().enumerate() {
            for (place, label) in &trans.inputs {
                if let Some(p_idx) = self.places.get_index_of(place) {
                    let _ = writeln!(
                        &mut dot,
                        "    place_{} -> trans_{} [label=\"{}\"];",
                        p_idx,
                        t_idx,
                        escape_label(&label.to_string())
                    );
                }
            }
            for (place, label) in &trans.outputs {
                if let Some(p_idx) = self.places.get_index_of(place) {
                    let _ = writeln!(
                        &mut dot,
                        "    trans_{} -> place_{} [label=\"{}\"];",
                        t_idx,
                        p_idx,
                        escape_label(&label.to_string())
                    );
                }
            }
        }

        let _ = writeln!(&mut dot, "}}");
        dot
    }

    pub fn write_dot<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_dot())
    }
}

pub(crate) fn escape_label(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::net::error::{FiringError, NetError, TokenError};
    use crate::net::multiset::MultiSet;
    use crate::net::types::KindOf;
    use crate::net::value::ValueKind;

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().map(|&i| Value::Int(i)).collect()
    }

    fn var(name: &str) -> ArcAnnotation {
        ArcAnnotation::variable(name).unwrap()
    }

    fn int_place(name: &str, values: &[i64]) -> Place {
        Place::with_type(name, ints(values), Arc::new(KindOf(ValueKind::Int))).unwrap()
    }

    /// p=[0,1,2] --x--> t[x!=1] --x+1--> q
    fn counter() -> PetriNet {
        let mut net = PetriNet::new("counter");
        net.add_place(int_place("p", &[0, 1, 2])).unwrap();
        net.add_place(int_place("q", &[])).unwrap();
        net.add_transition(Transition::with_guard("t", Expression::new("x != 1")))
            .unwrap();
        net.add_input("p", "t", var("x")).unwrap();
        net.add_output("q", "t", ArcAnnotation::expression("x + 1")).unwrap();
        net
    }

    #[test]
    fn names_are_shared_between_node_kinds() {
        let mut net = counter();
        assert_eq!(
            net.add_transition(Transition::new("p")).unwrap_err(),
            NetError::Structural(StructuralError::NodeExists {
                kind: NodeKind::Place,
                name: "p".into()
            })
        );
        assert!(net.add_place(Place::new("t", [])).is_err());
        assert!(matches!(net.node("zz"), Err(NetError::Structural(_))));
        assert_eq!(net.node("t").unwrap().name(), "t");
    }

    #[test]
    fn adjacency_is_symmetric() {
        let net = counter();
        assert_eq!(net.post(["p"]).unwrap(), BTreeSet::from(["t".to_string()]));
        assert_eq!(net.pre(["t"]).unwrap(), BTreeSet::from(["p".to_string()]));
        assert_eq!(net.pre(["q"]).unwrap(), BTreeSet::from(["t".to_string()]));
        assert_eq!(net.post(["t"]).unwrap(), BTreeSet::from(["q".to_string()]));
    }

    #[test]
    fn modes_skip_guard_violations() {
        let net = counter();
        let modes = net.modes("t").unwrap();
        assert_eq!(modes, vec![Substitution::with("x", 0), Substitution::with("x", 2)]);
        for mode in &modes {
            assert!(net.enabled("t", mode).unwrap());
        }
        assert!(!net.enabled("t", &Substitution::with("x", 1)).unwrap());
        assert!(net.activated("t", &Substitution::with("x", 7)).unwrap());
    }

    #[test]
    fn firing_moves_tokens_per_flow() {
        let mut net = counter();
        let binding = Substitution::with("x", 0);
        let (consumed, produced) = net.flow("t", &binding).unwrap();
        let before = net.get_marking();
        net.fire("t", &binding).unwrap();
        let after = net.get_marking();
        assert_eq!(after, before.sub(&consumed).unwrap().add(&produced));
        assert_eq!(net.place("p").unwrap().tokens(), &MultiSet::from(ints(&[1, 2])));
        assert_eq!(net.place("q").unwrap().tokens(), &MultiSet::from(ints(&[1])));
    }

    #[test]
    fn firing_a_disabled_binding_fails() {
        let mut net = counter();
        let before = net.get_marking();
        assert!(matches!(
            net.fire("t", &Substitution::with("x", 1)),
            Err(NetError::Firing(FiringError::NotEnabled { .. }))
        ));
        assert_eq!(net.get_marking(), before);
    }

    #[test]
    fn ill_typed_outputs_disable_the_binding() {
        let mut net = counter();
        net.remove_output("q", "t").unwrap();
        net.add_output("q", "t", ArcAnnotation::value("text")).unwrap();
        assert!(net.modes("t").unwrap().is_empty());
    }

    #[test]
    fn unbound_output_variable_propagates_eval_error() {
        let mut net = counter();
        net.add_place(Place::new("r", [])).unwrap();
        net.add_output("r", "t", ArcAnnotation::expression("y")).unwrap();
        assert!(matches!(net.modes("t"), Err(NetError::Eval(_))));
    }

    #[test]
    fn bulk_updates_roll_back() {
        let mut net = counter();
        let before = net.get_marking();
        let bad: Marking = [
            ("p", MultiSet::from(ints(&[5]))),
            ("q", MultiSet::from([Value::from("oops")])),
        ]
        .into_iter()
        .collect();
        assert!(matches!(
            net.set_marking(&bad),
            Err(NetError::Token(TokenError::Forbidden { .. }))
        ));
        assert_eq!(net.get_marking(), before);
        assert!(net.add_marking(&bad).is_err());
        assert_eq!(net.get_marking(), before);

        let too_many: Marking = [("p", MultiSet::from(ints(&[0, 0])))].into_iter().collect();
        assert!(net.remove_marking(&too_many).is_err());
        assert_eq!(net.get_marking(), before);

        let only_q: Marking = [("q", MultiSet::from(ints(&[9]))), ("ghost", MultiSet::from(ints(&[1])))]
            .into_iter()
            .collect();
        net.set_marking(&only_q).unwrap();
        assert!(net.place("p").unwrap().is_empty());
    }

    #[test]
    fn remove_place_drops_incident_arcs() {
        let mut net = counter();
        net.remove_place("p").unwrap();
        assert!(net.transition("t").unwrap().input_arc("p").is_none());
        net.remove_transition("t").unwrap();
        assert!(net.place("q").unwrap().pre().next().is_none());
    }

    #[test]
    fn rename_keeps_connections() {
        let mut net = counter();
        net.rename_node("p", "src").unwrap();
        net.rename_node("t", "step").unwrap();
        assert!(net.transition("step").unwrap().input_arc("src").is_some());
        assert_eq!(net.post(["src"]).unwrap(), BTreeSet::from(["step".to_string()]));
        assert!(net.rename_node("q", "src").is_err());
        assert!(net.rename_node("missing", "x").is_err());
    }

    #[test]
    fn copies_share_arcs() {
        let mut net = counter();
        net.copy_place("p", ["p2"]).unwrap();
        net.copy_transition("t", ["t2"]).unwrap();
        assert_eq!(net.place("p2").unwrap().tokens().len(), 3);
        assert!(net.transition("t").unwrap().input_arc("p2").is_some());
        assert_eq!(net.transition("t2").unwrap().guard.source(), "x != 1");
        assert_eq!(net.pre(["t2"]).unwrap().len(), 2);
    }

    #[test]
    fn merging_joins_arcs_into_multiarcs() {
        let mut net = counter();
        net.add_place(Place::new("s", [Value::from("a")])).unwrap();
        net.add_input("s", "t", ArcAnnotation::value("a")).unwrap();
        net.merge_places("ps", ["p", "s"]).unwrap();
        let merged = net.place("ps").unwrap();
        assert_eq!(merged.tokens().len(), 4);
        assert!(merged.token_type().accepts(&Value::from("a")));
        assert_eq!(
            net.transition("t").unwrap().input_arc("ps"),
            Some(&ArcAnnotation::multi(vec![var("x"), ArcAnnotation::value("a")]).unwrap())
        );

        net.add_transition(Transition::with_guard("u", Expression::new("x > 0")))
            .unwrap();
        net.add_input("p", "u", var("x")).unwrap();
        net.merge_transitions("tu", ["t", "u"]).unwrap();
        let tu = net.transition("tu").unwrap();
        assert_eq!(tu.guard.source(), "(x != 1) and (x > 0)");
        assert_eq!(
            tu.input_arc("p"),
            Some(&ArcAnnotation::multi(vec![var("x"), var("x")]).unwrap())
        );
        assert!(net.merge_places("none", []).is_err());
    }

    #[test]
    fn parallel_modes_match_sequential() {
        let mut net = counter();
        net.copy_transition("t", ["t2", "t3"]).unwrap();
        assert_eq!(net.all_modes(true).unwrap(), net.all_modes(false).unwrap());
    }

    #[test]
    fn dot_lists_every_node() {
        let dot = counter().to_dot();
        assert!(dot.contains("place_0 -> trans_0 [label=\"x\"]"));
        assert!(dot.contains("trans_0 -> place_1 [label=\"x + 1\"]"));
        assert!(dot.contains("[x != 1]"));
    }
}
