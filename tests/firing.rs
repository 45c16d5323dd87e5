use std::sync::Arc;

use RustCPN::expr::Expression;
use RustCPN::net::*;

fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().map(|&i| Value::Int(i)).collect()
}

fn var(name: &str) -> ArcAnnotation {
    ArcAnnotation::variable(name).unwrap()
}

fn counter() -> PetriNet {
    let mut net = PetriNet::new("counter");
    net.add_place(Place::with_type("p", ints(&[0, 1, 2]), Arc::new(KindOf(ValueKind::Int))).unwrap())
        .unwrap();
    net.add_place(Place::with_type("q", [], Arc::new(KindOf(ValueKind::Int))).unwrap())
        .unwrap();
    net.add_transition(Transition::with_guard("t", Expression::new("x != 1")))
        .unwrap();
    net.add_input("p", "t", var("x")).unwrap();
    net.add_output("q", "t", ArcAnnotation::expression("x + 1"))
        .unwrap();
    net
}

#[test]
fn bounded_counter_fires_per_mode() {
    let mut net = counter();
    let modes = net.modes("t").unwrap();
    assert!(!modes.contains(&Substitution::with("x", 1)));
    assert_eq!(modes.len(), 2);

    net.fire("t", &Substitution::with("x", 0)).unwrap();
    assert_eq!(net.place("p").unwrap().tokens(), &MultiSet::from(ints(&[1, 2])));
    assert_eq!(net.place("q").unwrap().tokens(), &MultiSet::from(ints(&[1])));
}

#[test]
fn every_mode_is_enabled_and_fires_its_flow() {
    let net = counter();
    for mode in net.modes("t").unwrap() {
        assert!(net.enabled("t", &mode).unwrap());
        let (consumed, produced) = net.flow("t", &mode).unwrap();
        let mut copy = net.clone();
        copy.fire("t", &mode).unwrap();
        let expected = net.get_marking().sub(&consumed).unwrap().add(&produced);
        assert_eq!(copy.get_marking(), expected);
    }
}

#[test]
fn firing_a_disabled_binding_is_an_error() {
    let mut net = counter();
    let err = net.fire("t", &Substitution::with("x", 1)).unwrap_err();
    assert_eq!(
        err.to_string(),
        "transition 't' not enabled for {x -> 1}"
    );
    assert!(net.fire("missing", &Substitution::new()).is_err());
}

#[test]
fn inhibitor_arcs_test_for_absence() {
    let mut net = PetriNet::new("inhibit");
    net.add_place(Place::new("guard", [])).unwrap();
    net.add_place(Place::new("out", [])).unwrap();
    net.add_transition(Transition::new("t")).unwrap();
    net.add_input("guard", "t", ArcAnnotation::inhibitor(var("x")))
        .unwrap();
    net.add_output("out", "t", ArcAnnotation::value(Value::Dot))
        .unwrap();
    assert_eq!(net.modes("t").unwrap(), vec![Substitution::new()]);

    net.add_marking(&[("guard", MultiSet::from([Value::Int(3)]))].into_iter().collect())
        .unwrap();
    assert!(net.modes("t").unwrap().is_empty());
}

#[test]
fn conditional_inhibitor_only_blocks_matching_tokens() {
    let mut net = PetriNet::new("inhibit-if");
    net.add_place(Place::new("p", ints(&[1, 2]))).unwrap();
    net.add_transition(Transition::new("t")).unwrap();
    net.add_input(
        "p",
        "t",
        ArcAnnotation::inhibitor_if(var("x"), Expression::new("x > 5")),
    )
    .unwrap();
    assert_eq!(net.modes("t").unwrap().len(), 1);
    net.add_marking(&[("p", MultiSet::from(ints(&[9])))].into_iter().collect())
        .unwrap();
    assert!(net.modes("t").unwrap().is_empty());
}

#[test]
fn flush_arcs_move_whole_places() {
    let mut net = PetriNet::new("flush");
    net.add_place(Place::new("src", ints(&[1, 1, 2]))).unwrap();
    net.add_place(Place::new("dst", [])).unwrap();
    net.add_transition(Transition::new("t")).unwrap();
    net.add_input("src", "t", ArcAnnotation::flush("x")).unwrap();
    net.add_output("dst", "t", ArcAnnotation::flush("x")).unwrap();

    let modes = net.modes("t").unwrap();
    assert_eq!(modes.len(), 1);
    assert_eq!(
        modes[0].get("x"),
        Some(&Value::Bag(MultiSet::from(ints(&[1, 1, 2]))))
    );
    net.fire("t", &modes[0]).unwrap();
    assert!(net.place("src").unwrap().is_empty());
    assert_eq!(net.place("dst").unwrap().tokens().len(), 3);

    let modes = net.modes("t").unwrap();
    assert_eq!(modes, vec![Substitution::with("x", Value::Bag(MultiSet::new()))]);
}

#[test]
fn shared_variables_unify_across_arcs() {
    let mut net = PetriNet::new("join");
    net.add_place(Place::new("a", ints(&[1, 2, 3]))).unwrap();
    net.add_place(Place::new("b", ints(&[2, 3, 4]))).unwrap();
    net.add_place(Place::new("c", [])).unwrap();
    net.add_transition(Transition::new("t")).unwrap();
    net.add_input("a", "t", var("x")).unwrap();
    net.add_input("b", "t", var("x")).unwrap();
    net.add_output("c", "t", var("x")).unwrap();
    let modes = net.modes("t").unwrap();
    assert_eq!(
        modes,
        vec![Substitution::with("x", 2), Substitution::with("x", 3)]
    );
}

#[test]
fn multi_arcs_do_not_double_count_tokens() {
    let mut net = PetriNet::new("pairs");
    net.add_place(Place::new("p", ints(&[1, 2]))).unwrap();
    net.add_transition(Transition::new("t")).unwrap();
    net.add_input(
        "p",
        "t",
        ArcAnnotation::multi(vec![var("x"), var("y")]).unwrap(),
    )
    .unwrap();
    let modes = net.modes("t").unwrap();
    assert_eq!(modes.len(), 2);
    for mode in &modes {
        assert_ne!(mode.get("x"), mode.get("y"));
    }
}

#[test]
fn tuple_arcs_destructure_tokens() {
    let mut net = PetriNet::new("tuples");
    net.add_place(Place::new(
        "p",
        [
            Value::tuple([Value::Int(1), Value::from("a")]),
            Value::tuple([Value::Int(2), Value::from("b")]),
            Value::Int(3),
        ],
    ))
    .unwrap();
    net.add_place(Place::new("q", [])).unwrap();
    net.add_transition(Transition::with_guard("t", Expression::new("n > 1")))
        .unwrap();
    net.add_input(
        "p",
        "t",
        ArcAnnotation::tuple(vec![var("n"), var("s")]).unwrap(),
    )
    .unwrap();
    net.add_output("q", "t", var("s")).unwrap();
    let modes = net.modes("t").unwrap();
    assert_eq!(modes.len(), 1);
    net.fire("t", &modes[0]).unwrap();
    assert_eq!(net.place("q").unwrap().tokens(), &MultiSet::from([Value::from("b")]));
}

#[test]
fn failed_set_marking_leaves_the_net_unchanged() {
    let mut net = counter();
    let before = net.get_marking();
    let bad: Marking = [("q", MultiSet::from([Value::from("x")]))].into_iter().collect();
    assert!(net.set_marking(&bad).is_err());
    assert_eq!(net.get_marking(), before);
}

#[test]
fn multiset_and_substitution_laws() {
    let a = MultiSet::from(ints(&[1, 1, 2]));
    let b = MultiSet::from(ints(&[2, 3]));
    assert_eq!((&a + &b).difference(&b).unwrap(), a);
    assert_eq!(a.len(), 3);
    assert!(a.times(0).is_empty());
    assert!(a.is_subset_of(&a) && a == a.clone());

    let f = Substitution::with("y", 5);
    let g = Substitution::with("x", "y");
    let gx = g.apply("x");
    assert_eq!(f.compose(&g).apply("x"), f.apply(gx.as_name().unwrap()));
    assert!(f.merge(&Substitution::with("y", 6)).is_err());
    assert!(f.merge(&g).is_ok());
}
