use RustCPN::analysis::{StateGraph, StateGraphConfig};
use RustCPN::expr::Expression;
use RustCPN::net::*;

/// s1 -> s2 -> s3 -> s1, one black token circulating.
fn ring(initial: [usize; 3]) -> PetriNet {
    let mut net = PetriNet::new("ring");
    for (i, &count) in initial.iter().enumerate() {
        let tokens = vec![Value::Dot; count];
        net.add_place(Place::new(format!("s{}", i + 1), tokens))
            .unwrap();
    }
    for i in 1..=3 {
        let next = i % 3 + 1;
        let name = format!("t{}{}", i, next);
        net.add_transition(Transition::new(name.clone())).unwrap();
        net.add_input(&format!("s{}", i), &name, ArcAnnotation::value(Value::Dot))
            .unwrap();
        net.add_output(&format!("s{}", next), &name, ArcAnnotation::value(Value::Dot))
            .unwrap();
    }
    net
}

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

#[test]
fn ring_has_three_states_in_a_cycle() {
    let mut graph = StateGraph::new(&ring([1, 0, 0]));
    assert!(!graph.completed());
    graph.build().unwrap();
    assert!(graph.completed());
    assert_eq!(graph.len(), 3);

    for state in 0..3 {
        let succ = graph.successors(StateId(state)).unwrap();
        assert_eq!(succ.len(), 1);
        assert_eq!(succ[0].0, StateId((state + 1) % 3));
        let pred = graph.predecessors(StateId(state)).unwrap();
        assert_eq!(pred.len(), 1);
        assert_eq!(pred[0].0, StateId((state + 2) % 3));
    }
    assert!(graph.deadlocks().is_empty());
}

#[test]
fn ring_starting_elsewhere_is_the_same_cycle() {
    let mut graph = StateGraph::new(&ring([0, 0, 1]));
    graph.build().unwrap();
    assert_eq!(graph.len(), 3);
    let first = graph.successors(StateId(0)).unwrap();
    assert_eq!(first[0].1.transition, "t31");
}

#[test]
fn bounded_counter_has_six_states() {
    let mut graph = StateGraph::new(&counter("x < 5"));
    graph.build().unwrap();
    assert_eq!(graph.len(), 6);
    assert!(graph.completed());
    let last = StateId(5);
    assert!(graph.successors(last).unwrap().is_empty());
    assert_eq!(graph.deadlocks(), vec![last]);

    let marking: Marking = [("p", MultiSet::from([Value::Int(5)]))].into_iter().collect();
    assert_eq!(graph.state_of(&marking), Some(last));
    graph.goto(last).unwrap();
    assert_eq!(graph.net().get_marking(), marking);
}

#[test]
fn unbounded_net_is_cut_by_the_state_limit() {
    let config = StateGraphConfig {
        state_limit: Some(10),
        parallel_modes: true,
    };
    let mut graph = StateGraph::with_config(&counter("True"), config);
    graph.build().unwrap();
    let stats = graph.stats();
    assert_eq!(stats.state_count, 10);
    assert!(stats.truncated);
    assert_eq!(stats.pending, 0);
}

#[test]
fn states_are_discovered_breadth_first() {
    let mut net = PetriNet::new("branch");
    net.add_place(Place::new("p", [Value::Int(0)])).unwrap();
    net.add_transition(Transition::with_guard("inc", Expression::new("x < 2")))
        .unwrap();
    net.add_transition(Transition::with_guard("dec", Expression::new("x > -2")))
        .unwrap();
    for t in ["inc", "dec"] {
        net.add_input("p", t, ArcAnnotation::variable("x").unwrap())
            .unwrap();
    }
    net.add_output("p", "inc", ArcAnnotation::expression("x + 1"))
        .unwrap();
    net.add_output("p", "dec", ArcAnnotation::expression("x - 1"))
        .unwrap();

    let mut graph = StateGraph::new(&net);
    graph.build().unwrap();
    let order: Vec<i64> = graph
        .states()
        .map(|(_, marking)| marking.tokens("p").iter().next().and_then(Value::as_int).unwrap())
        .collect();
    assert_eq!(order, vec![0, 1, -1, 2, -2]);
    assert_eq!(graph.stats().edge_count, 8);
}

#[test]
fn truncated_states_are_not_deadlocks() {
    let config = StateGraphConfig {
        state_limit: Some(3),
        parallel_modes: false,
    };
    let mut graph = StateGraph::with_config(&counter("True"), config);
    graph.build().unwrap();
    graph.goto(StateId(2)).unwrap();
    assert_eq!(graph.net().modes("t").unwrap(), vec![Substitution::with("x", 2)]);
    assert!(graph.deadlocks().is_empty());
    let stats = graph.stats();
    assert_eq!(stats.state_count, 3);
    assert_eq!(stats.edge_count, 2);
    assert_eq!(stats.deadlock_count, 0);
    assert!(stats.truncated);
}

#[test]
fn build_can_be_retried_after_an_evaluation_error() {
    let mut net = PetriNet::new("div");
    net.add_place(Place::new("p", [Value::Int(0), Value::Int(1)]))
        .unwrap();
    net.add_transition(Transition::new("t")).unwrap();
    net.add_input("p", "t", ArcAnnotation::variable("x").unwrap())
        .unwrap();
    net.add_output("p", "t", ArcAnnotation::expression("10 // (x - 1)"))
        .unwrap();

    let mut graph = StateGraph::new(&net);
    for _ in 0..2 {
        let err = graph.build().unwrap_err();
        assert!(matches!(err, NetError::Eval(_)));
        assert!(!graph.completed());
        assert_eq!(graph.len(), 1);
    }
    assert!(graph.successors(StateId(0)).is_err());
    assert!(graph.deadlocks().is_empty());
}

#[test]
fn parallel_firings_between_two_states_keep_every_label() {
    let mut net = PetriNet::new("loop");
    net.add_place(Place::new("p", [Value::Int(1), Value::Int(2)]))
        .unwrap();
    net.add_transition(Transition::new("t")).unwrap();
    net.add_input("p", "t", ArcAnnotation::variable("x").unwrap())
        .unwrap();
    net.add_output("p", "t", ArcAnnotation::variable("x").unwrap())
        .unwrap();

    let mut graph = StateGraph::new(&net);
    graph.build().unwrap();
    assert_eq!(graph.len(), 1);
    let succ = graph.successors(StateId(0)).unwrap();
    let modes: Vec<_> = succ.iter().map(|(target, label)| (*target, label.mode.clone())).collect();
    assert_eq!(
        modes,
        vec![
            (StateId(0), Substitution::with("x", 1)),
            (StateId(0), Substitution::with("x", 2)),
        ]
    );
    assert_eq!(graph.predecessors(StateId(0)).unwrap().len(), 2);
    assert_eq!(graph.edge_count(), 2);
    assert!(graph.deadlocks().is_empty());
}
