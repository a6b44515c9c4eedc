//! End-to-end scenarios exercised purely through `slt`'s public API: a
//! multi-node force-value round trip over the in-memory transport, a
//! wire-codec round trip through `Location::header_create`/`from_header`,
//! and a container scenario checking that iteration keeps provenance.

use slt::{
    config::{with_config, Config},
    Expression, InMemoryBus, Location, Operator, Scalar, SourceKey, Tracked, TrackedList,
    TrackingNode,
};
use std::rc::Rc;

fn source(line: u32) -> SourceKey {
    SourceKey { file: "tracking_scenarios.rs", line }
}

#[test]
fn force_value_round_trips_across_two_nodes_over_the_bus() {
    with_config(Config { expr_chain: true, ..Config::default() }, || {
        let bus = InMemoryBus::new();

        let sensor = TrackingNode::with_transport("sensor", Box::new(bus.transport_for("sensor".to_owned())));
        bus.register("sensor".to_owned(), sensor.manager());

        let controller = TrackingNode::with_transport("controller", Box::new(bus.transport_for("controller".to_owned())));
        bus.register("controller".to_owned(), controller.manager());

        let reading = sensor.location(Scalar::Int32(10), source(1));
        let scaled = reading.mul(3i32).unwrap().add(2i32).unwrap();
        assert_eq!(scaled.raw(), Scalar::Int32(32));

        let applied = controller.force_value(&scaled, Scalar::Int32(50)).unwrap();
        assert!(applied);

        let rereading = sensor.location(Scalar::Int32(10), source(1));
        assert_eq!(rereading.raw(), Scalar::Int32(16));
    });
}

#[test]
fn expression_history_survives_a_full_wire_round_trip() {
    let mut expr = Expression::new();
    expr.append(Scalar::Int32(4), false, Operator::Add);
    expr.append(Scalar::Int32(2), false, Operator::MulInt);

    let msg = slt::codec::encode(&mut expr);
    let mut decoded = slt::codec::decode(&msg).unwrap();

    assert_eq!(decoded.apply(Scalar::Int32(3)).unwrap(), expr.apply(Scalar::Int32(3)).unwrap());
}

#[test]
fn location_header_round_trips_a_tree_with_content() {
    let root = Location::new_ref("proc".to_owned(), 0);
    root.borrow_mut().content_add("x".to_owned(), Location::new_ref("proc".to_owned(), 1));
    root.borrow_mut().expr.append(Scalar::Int32(1), false, Operator::Add);

    let header = Location::header_create(&root);
    let restored = Location::from_header(&header).unwrap();

    assert_eq!(restored.borrow().node_name, "proc");
    assert_eq!(restored.borrow().id, 0);
    assert!(restored.borrow().content_has("x"));
}

#[test]
fn tracked_list_iteration_keeps_each_element_tracked() {
    let node = TrackingNode::new("proc");
    let root = Location::new_ref("proc".to_owned(), -1);
    let mut list = TrackedList::new(Rc::clone(&root), Some(Rc::clone(node.manager())));
    list.push(node.location(Scalar::Int32(1), source(2)));
    list.push(node.location(Scalar::Int32(2), source(3)));

    let doubled: Vec<Tracked> = list.iter().map(|t| t.mul(2i32).unwrap()).collect();
    assert_eq!(doubled[0].raw(), Scalar::Int32(2));
    assert_eq!(doubled[1].raw(), Scalar::Int32(4));
    assert!(root.borrow().content_has("0"));
    assert!(root.borrow().content_has("1"));
}
