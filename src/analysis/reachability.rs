//! 可达图（状态图）的惰性构造。
//!
//! 状态编号按发现顺序分配，0 为构造时网络的标识。待处理状态放在 FIFO 队列中，
//! 计算某状态的后继时：把网络移动到该状态，枚举所有迁移的所有模式，
//! 由令牌流得到后继标识，经结构相等去重后记录带标签的边（前向与后向）。
//!
//! 网络可能有无穷状态空间，`build` 不做检查；用 [`StateGraphConfig::state_limit`]
//! 或 [`StateGraph::explore`] 限制探索规模。
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::fs;
use std::path::Path;

use log::{debug, info};
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::net::core::escape_label;
use crate::net::error::{NetResult, StructuralError};
use crate::net::ids::StateId;
use crate::net::index_vec::{Idx, IndexVec};
use crate::net::{Marking, PetriNet, Substitution};

/// 边标签：迁移名与激发所用的模式。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FiringLabel {
    pub transition: String,
    pub mode: Substitution,
}

impl fmt::Display for FiringLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.transition, self.mode)
    }
}

type Adjacency = BTreeMap<StateId, BTreeSet<FiringLabel>>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateGraphConfig {
    /// 最多保留的状态数量，None 表示不设上限。
    pub state_limit: Option<usize>,
    /// 用 rayon 并行计算各迁移的模式。
    pub parallel_modes: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateGraphStats {
    pub state_count: usize,
    pub edge_count: usize,
    pub pending: usize,
    pub deadlock_count: usize,
    pub truncated: bool,
}

/// 可序列化的状态图快照。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateRecord {
    pub id: StateId,
    pub marking: Marking,
    pub successors: Vec<(StateId, FiringLabel)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateGraphExport {
    pub net: String,
    pub stats: StateGraphStats,
    pub states: Vec<StateRecord>,
}

#[derive(Debug, Clone)]
pub struct StateGraph {
    net: PetriNet,
    markings: IndexVec<StateId, Option<Marking>>,
    states: FxHashMap<Marking, StateId>,
    succ: IndexVec<StateId, Adjacency>,
    pred: IndexVec<StateId, Adjacency>,
    todo: VecDeque<StateId>,
    done: BTreeSet<StateId>,
    /// 计算后继时没有任何迁移有模式的状态。
    deadlocks: BTreeSet<StateId>,
    removed: FxHashSet<StateId>,
    current: StateId,
    config: StateGraphConfig,
    truncated: bool,
}

impl StateGraph {
    pub fn new(net: &PetriNet) -> Self {
        Self::with_config(net, StateGraphConfig::default())
    }

    /// 复制网络，以其当前标识作为状态 0。
    pub fn with_config(net: &PetriNet, config: StateGraphConfig) -> Self {
        let mut graph = Self {
            net: net.clone(),
            markings: IndexVec::new(),
            states: FxHashMap::default(),
            succ: IndexVec::new(),
            pred: IndexVec::new(),
            todo: VecDeque::new(),
            done: BTreeSet::new(),
            deadlocks: BTreeSet::new(),
            removed: FxHashSet::default(),
            current: StateId(0),
            config,
            truncated: false,
        };
        graph.create_state(net.get_marking());
        graph
    }

    /// 当前所在状态对应的网络。
    pub fn net(&self) -> &PetriNet {
        &self.net
    }

    pub fn config(&self) -> &StateGraphConfig {
        &self.config
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    fn create_state(&mut self, marking: Marking) -> StateId {
        let id = self.markings.push(Some(marking.clone()));
        self.succ.push(Adjacency::new());
        self.pred.push(Adjacency::new());
        self.states.insert(marking, id);
        self.todo.push_back(id);
        debug!("new state {:?}", id);
        id
    }

    fn create_edge(&mut self, source: StateId, target: StateId, label: FiringLabel) {
        self.succ[source]
            .entry(target)
            .or_default()
            .insert(label.clone());
        self.pred[target].entry(source).or_default().insert(label);
    }

    fn known(&self, state: StateId) -> NetResult<&Marking> {
        match self.markings.get(state) {
            Some(Some(marking)) => Ok(marking),
            _ => Err(StructuralError::UnknownState(state.index()).into()),
        }
    }

    /// 当前状态；若它已被删除，退回到下一个待处理状态或任一已处理状态。
    pub fn current(&self) -> NetResult<StateId> {
        if !self.removed.contains(&self.current) {
            return Ok(self.current);
        }
        self.todo
            .front()
            .or_else(|| self.done.first())
            .copied()
            .ok_or_else(|| StructuralError::NoStates.into())
    }

    /// 把网络移动到已发现的状态。已删除的状态按 `current()` 处理。
    pub fn goto(&mut self, state: StateId) -> NetResult<()> {
        let state = if self.removed.contains(&state) {
            self.current()?
        } else {
            state
        };
        let marking = self.known(state)?.clone();
        if self.current != state {
            self.current = state;
            self.net.set_marking(&marking)?;
        }
        Ok(())
    }

    pub fn marking(&self, state: StateId) -> Option<&Marking> {
        self.markings.get(state).and_then(Option::as_ref)
    }

    pub fn contains(&self, marking: &Marking) -> bool {
        self.states.contains_key(marking)
    }

    pub fn state_of(&self, marking: &Marking) -> Option<StateId> {
        self.states.get(marking).copied()
    }

    /// 已发现（处理或待处理）的状态数。
    pub fn len(&self) -> usize {
        self.done.len() + self.todo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 尚未计算后继的状态数。
    pub fn todo(&self) -> usize {
        self.todo.len()
    }

    pub fn completed(&self) -> bool {
        self.todo.is_empty()
    }

    /// 按编号顺序列出现存状态。
    pub fn states(&self) -> impl Iterator<Item = (StateId, &Marking)> {
        self.markings
            .iter_enumerated()
            .filter_map(|(id, marking)| marking.as_ref().map(|m| (id, m)))
    }

    fn limit_reached(&self) -> bool {
        self.config
            .state_limit
            .is_some_and(|limit| self.states.len() >= limit)
    }

    /// 计算 `state` 的后继。求值失败时状态回到队首，图保持不变。
    fn compute(&mut self, state: StateId) -> NetResult<()> {
        let firings = match self.firings(state) {
            Ok(firings) => firings,
            Err(err) => {
                self.todo.push_front(state);
                return Err(err);
            }
        };
        if firings.is_empty() {
            debug!("deadlock at {:?}", state);
            self.deadlocks.insert(state);
        }
        for (label, next) in firings {
            let target = match self.states.get(&next) {
                Some(&id) => id,
                None if self.limit_reached() => {
                    if !self.truncated {
                        info!(
                            "state limit {:?} reached, exploration truncated",
                            self.config.state_limit
                        );
                    }
                    self.truncated = true;
                    continue;
                }
                None => self.create_state(next),
            };
            self.create_edge(state, target, label);
        }
        self.done.insert(state);
        Ok(())
    }

    /// 在 `state` 处所有可激发的 (标签, 后继标识)，不修改图。
    fn firings(&mut self, state: StateId) -> NetResult<Vec<(FiringLabel, Marking)>> {
        self.goto(state)?;
        let marking = self.known(state)?.clone();
        let mut firings = Vec::new();
        for (transition, modes) in self.net.all_modes(self.config.parallel_modes)? {
            for mode in modes {
                let (consumed, produced) = self.net.flow(&transition, &mode)?;
                let next = marking.sub(&consumed)?.add(&produced);
                firings.push((
                    FiringLabel {
                        transition: transition.clone(),
                        mode,
                    },
                    next,
                ));
            }
        }
        Ok(firings)
    }

    /// 处理队首状态，直到队列为空或队首编号超过 `stop`。
    pub fn build_until(&mut self, stop: StateId) -> NetResult<()> {
        while let Some(&state) = self.todo.front() {
            if state > stop {
                break;
            }
            self.todo.pop_front();
            self.compute(state)?;
        }
        Ok(())
    }

    /// 构造完整的可达图。网络无界时不会终止，除非设置了状态上限。
    pub fn build(&mut self) -> NetResult<()> {
        while let Some(state) = self.todo.pop_front() {
            self.compute(state)?;
        }
        Ok(())
    }

    /// 至多处理 `limit` 个待处理状态，返回实际处理的数量。
    pub fn explore(&mut self, limit: usize) -> NetResult<usize> {
        let mut processed = 0;
        while processed < limit {
            let Some(state) = self.todo.pop_front() else {
                break;
            };
            self.compute(state)?;
            processed += 1;
        }
        Ok(processed)
    }

    /// 依次访问每个状态（必要时先计算其后继），访问时网络位于该状态。
    /// 结束后回到调用前的当前状态。
    pub fn visit<F>(&mut self, mut visitor: F) -> NetResult<()>
    where
        F: FnMut(StateId, &PetriNet) -> NetResult<()>,
    {
        let current = self.current()?;
        let processed: Vec<StateId> = self.done.iter().copied().collect();
        for state in processed {
            self.goto(state)?;
            visitor(state, &self.net)?;
        }
        while let Some(state) = self.todo.pop_front() {
            self.compute(state)?;
            self.goto(state)?;
            visitor(state, &self.net)?;
        }
        self.goto(current)
    }

    fn process(&mut self, state: StateId) -> NetResult<()> {
        let current = self.current()?;
        self.build_until(state)?;
        self.goto(current)
    }

    /// 状态的后继：`(目标状态, 标签)`，必要时先计算。
    pub fn successors(&mut self, state: StateId) -> NetResult<Vec<(StateId, FiringLabel)>> {
        self.known(state)?;
        self.process(state)?;
        Ok(Self::flatten(&self.succ[state]))
    }

    /// 已知的前驱。图未构造完成时，之后发现的状态也可能成为前驱。
    pub fn predecessors(&self, state: StateId) -> NetResult<Vec<(StateId, FiringLabel)>> {
        self.known(state)?;
        Ok(Self::flatten(&self.pred[state]))
    }

    fn flatten(adjacency: &Adjacency) -> Vec<(StateId, FiringLabel)> {
        adjacency
            .iter()
            .flat_map(|(&other, labels)| labels.iter().map(move |label| (other, label.clone())))
            .collect()
    }

    /// 删除状态及其所有关联边，返回其标识。
    pub fn remove_state(&mut self, state: StateId) -> NetResult<Marking> {
        self.known(state)?;
        self.removed.insert(state);
        self.done.remove(&state);
        self.deadlocks.remove(&state);
        self.todo.retain(|&pending| pending != state);
        let marking = self.markings[state]
            .take()
            .ok_or(StructuralError::UnknownState(state.index()))?;
        self.states.remove(&marking);

        for pred in std::mem::take(&mut self.pred[state]).into_keys() {
            self.succ[pred].remove(&state);
        }
        for succ in std::mem::take(&mut self.succ[state]).into_keys() {
            self.pred[succ].remove(&state);
        }
        debug!("removed state {:?}", state);

        if self.current == state {
            self.goto(state)?;
        }
        Ok(marking)
    }

    /// 已处理且没有任何迁移可激发的状态。后继因状态上限或删除而缺失的状态不算死锁。
    pub fn deadlocks(&self) -> Vec<StateId> {
        self.deadlocks.iter().copied().collect()
    }

    pub fn edge_count(&self) -> usize {
        self.succ
            .iter_enumerated()
            .map(|(_, targets)| targets.values().map(BTreeSet::len).sum::<usize>())
            .sum()
    }

    pub fn stats(&self) -> StateGraphStats {
        StateGraphStats {
            state_count: self.len(),
            edge_count: self.edge_count(),
            pending: self.todo.len(),
            deadlock_count: self.deadlocks.len(),
            truncated: self.truncated,
        }
    }

    pub fn export(&self) -> StateGraphExport {
        StateGraphExport {
            net: self.net.name.clone(),
            stats: self.stats(),
            states: self
                .states()
                .map(|(id, marking)| StateRecord {
                    id,
                    marking: marking.clone(),
                    successors: Self::flatten(&self.succ[id]),
                })
                .collect(),
        }
    }

    /// 以 petgraph 图导出：节点权为状态编号，每个标签一条边。
    pub fn to_petgraph(&self) -> DiGraph<StateId, FiringLabel> {
        let mut graph = DiGraph::new();
        let mut nodes: FxHashMap<StateId, NodeIndex> = FxHashMap::default();
        for (id, _) in self.states() {
            nodes.insert(id, graph.add_node(id));
        }
        for (source, _) in self.states() {
            for (target, label) in Self::flatten(&self.succ[source]) {
                if let (Some(&from), Some(&to)) = (nodes.get(&source), nodes.get(&target)) {
                    graph.add_edge(from, to, label);
                }
            }
        }
        graph
    }

    pub fn to_dot(&self) -> String {
        self.to_dot_with(true)
    }

    /// `edge_labels` 为假时省略边上的迁移与模式。
    pub fn to_dot_with(&self, edge_labels: bool) -> String {
        let graph = self.to_petgraph();
        format!(
            "{:?}",
            Dot::with_attr_getters(
                &graph,
                &[Config::NodeNoLabel, Config::EdgeNoLabel],
                &|_, edge| {
                    if edge_labels {
                        format!("label=\"{}\"", escape_label(&edge.weight().to_string()))
                    } else {
                        String::new()
                    }
                },
                &|_, (_, state)| {
                    let marking = self
                        .marking(*state)
                        .map(ToString::to_string)
                        .unwrap_or_default();
                    let shape = if self.deadlocks.contains(state) {
                        ", style=filled, fillcolor=\"#ffcdd2\""
                    } else {
                        ""
                    };
                    format!(
                        "label=\"s{}\\n{}\"{}",
                        state,
                        escape_label(&marking),
                        shape
                    )
                },
            )
        )
    }

    pub fn write_dot<P: AsRef<Path>>(&self, path: P, edge_labels: bool) -> std::io::Result<()> {
        let dot = self.to_dot_with(edge_labels);
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, dot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expression;
    use crate::net::{ArcAnnotation, Place, Transition, Value};

    /// p=[0] --x--> t[guard] --x+1--> p
    fn counter(guard: &str) -> PetriNet {
        let mut net = PetriNet::new("counter");
        net.add_place(Place::new("p", [Value::Int(0)])).unwrap();
        net.add_transition(Transition::with_guard("t", Expression::new(guard)))
            .unwrap();
        net.add_input("p", "t", ArcAnnotation::variable("x").unwrap())
            .unwrap();
        net.add_output("p", "t", ArcAnnotation::expression("x + 1"))
            .unwrap();
        net
    }

    fn at(value: i64) -> Marking {
        [("p", [Value::Int(value)].into())].into_iter().collect()
    }

    #[test]
    fn lazy_construction_counts_states() {
        let mut graph = StateGraph::new(&counter("x < 5"));
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.todo(), 1);
        assert!(matches!(
            graph.goto(StateId(2)),
            Err(crate::net::NetError::Structural(StructuralError::UnknownState(2)))
        ));
        graph.build().unwrap();
        assert_eq!(graph.len(), 6);
        assert!(graph.completed());
        graph.goto(StateId(2)).unwrap();
        assert_eq!(graph.net().get_marking(), at(2));
        assert_eq!(graph.deadlocks(), vec![StateId(5)]);
    }

    #[test]
    fn successors_and_predecessors_carry_labels() {
        let mut graph = StateGraph::new(&counter("x < 5"));
        graph.build().unwrap();
        let succ = graph.successors(StateId(2)).unwrap();
        assert_eq!(
            succ,
            vec![(
                StateId(3),
                FiringLabel {
                    transition: "t".into(),
                    mode: Substitution::with("x", 2)
                }
            )]
        );
        let pred = graph.predecessors(StateId(2)).unwrap();
        assert_eq!(pred[0].0, StateId(1));
        assert_eq!(pred[0].1.mode, Substitution::with("x", 1));
    }

    #[test]
    fn successors_compute_on_demand() {
        let mut graph = StateGraph::new(&counter("x < 5"));
        let succ = graph.successors(StateId(0)).unwrap();
        assert_eq!(succ.len(), 1);
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.current().unwrap(), StateId(0));
    }

    #[test]
    fn visit_walks_states_in_order() {
        let mut graph = StateGraph::new(&counter("x < 5"));
        let mut seen = Vec::new();
        graph
            .visit(|state, net| {
                seen.push((state, net.get_marking()));
                Ok(())
            })
            .unwrap();
        let expected: Vec<_> = (0..6).map(|i| (StateId(i), at(i as i64))).collect();
        assert_eq!(seen, expected);
        assert_eq!(graph.current().unwrap(), StateId(0));
    }

    #[test]
    fn state_limit_truncates_graph() {
        let config = StateGraphConfig {
            state_limit: Some(3),
            parallel_modes: false,
        };
        let mut graph = StateGraph::with_config(&counter("True"), config);
        graph.build().unwrap();
        assert!(graph.is_truncated());
        assert_eq!(graph.len(), 3);
        assert!(graph.stats().truncated);
        // s2 still has a mode, its successor was cut by the limit
        assert!(graph.deadlocks().is_empty());
        assert_eq!(graph.stats().deadlock_count, 0);
        assert!(!graph.to_dot().contains("fillcolor"));
    }

    #[test]
    fn explore_processes_a_bounded_number_of_states() {
        let mut graph = StateGraph::new(&counter("True"));
        assert_eq!(graph.explore(4).unwrap(), 4);
        assert_eq!(graph.len(), 5);
        assert!(!graph.completed());
    }

    #[test]
    fn removing_a_state_prunes_edges_both_ways() {
        let mut graph = StateGraph::new(&counter("x < 5"));
        graph.build().unwrap();
        graph.goto(StateId(3)).unwrap();
        let marking = graph.remove_state(StateId(3)).unwrap();
        assert_eq!(marking, at(3));
        assert!(!graph.contains(&marking));
        assert!(graph.successors(StateId(2)).unwrap().is_empty());
        assert!(graph.predecessors(StateId(4)).unwrap().is_empty());
        assert!(graph.remove_state(StateId(3)).is_err());
        assert_ne!(graph.current().unwrap(), StateId(3));
        assert_eq!(graph.len(), 5);
        assert_eq!(graph.stats().edge_count, 3);
        assert_eq!(graph.deadlocks(), vec![StateId(5)]);
    }

    #[test]
    fn failed_computation_leaves_state_pending() {
        let mut net = PetriNet::new("div");
        net.add_place(Place::new("p", [Value::Int(0), Value::Int(1)]))
            .unwrap();
        net.add_transition(Transition::new("t")).unwrap();
        net.add_input("p", "t", ArcAnnotation::variable("x").unwrap())
            .unwrap();
        net.add_output("p", "t", ArcAnnotation::expression("10 // (x - 1)"))
            .unwrap();

        let mut graph = StateGraph::new(&net);
        assert!(graph.build().is_err());
        assert_eq!(graph.todo(), 1);
        assert!(!graph.completed());
        assert!(graph.build().is_err());
        assert_eq!(graph.len(), 1);
        assert!(graph.deadlocks().is_empty());
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn dot_and_petgraph_agree() {
        let mut graph = StateGraph::new(&counter("x < 2"));
        graph.build().unwrap();
        let pg = graph.to_petgraph();
        assert_eq!(pg.node_count(), 3);
        assert_eq!(pg.edge_count(), 2);
        let dot = graph.to_dot();
        assert!(dot.contains("s2"));
        assert!(dot.contains("t {x -> 0}"));
        assert!(!graph.to_dot_with(false).contains("x -> 0"));
        assert_eq!(dot.matches("fillcolor").count(), 1);
    }

    #[test]
    fn export_serializes_to_json() {
        let mut graph = StateGraph::new(&counter("x < 1"));
        graph.build().unwrap();
        let export = graph.export();
        assert_eq!(export.states.len(), 2);
        let json = serde_json::to_value(&export).unwrap();
        assert_eq!(json["stats"]["state_count"], 2);
        assert_eq!(json["states"][0]["successors"][0][0], 1);
    }
}
