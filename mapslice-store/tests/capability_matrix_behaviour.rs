//! The physical strategy chosen for polylines must never change which
//! entities a query selects. These tests run the same queries over the same
//! dataset with every capability combination forced in turn.

mod support;

use mapslice_core::{BoundingBox, EntityKind, Group, Member, Node, Polyline, StreamItem};
use mapslice_store::test_support::SchemaLayout;
use mapslice_store::{Capabilities, Session, SessionConfig};
use rstest::rstest;
use support::{assert_stream_shape, drain, kind_ids, node, seeded, way};

fn dataset() -> (Vec<Node>, Vec<Polyline>, Vec<Group>) {
    let n1 = node(1, 0.2, 0.2);
    let n2 = node(2, 0.8, 0.8);
    let n3 = node(3, 5.0, 5.0);
    let n4 = node(4, 6.0, 6.0);
    let inside = way(10, &[&n1, &n2]);
    let crossing = way(11, &[&n2, &n3]);
    let outside = way(12, &[&n3, &n4]);
    let group = Group::new(100, vec![Member::new(EntityKind::Polyline, 10, "outer")]);
    (
        vec![n1, n2, n3, n4],
        vec![inside, crossing, outside],
        vec![group],
    )
}

fn forced_session(capabilities: Capabilities) -> Session {
    let (nodes, ways, groups) = dataset();
    let conn = seeded(&SchemaLayout::default(), &nodes, &ways, &groups);
    Session::with_config(conn, SessionConfig::new().with_capabilities(capabilities))
}

fn rebuilt() -> Capabilities {
    Capabilities {
        polyline_linestring: false,
        polyline_bbox: true,
        way_node_index: true,
    }
}

fn rebuilt_packed() -> Capabilities {
    Capabilities {
        polyline_linestring: false,
        polyline_bbox: true,
        way_node_index: false,
    }
}

fn membership() -> Capabilities {
    Capabilities {
        polyline_linestring: false,
        polyline_bbox: false,
        way_node_index: true,
    }
}

#[rstest]
#[case::cached_linestring(Capabilities::full())]
#[case::rebuilt_linestring(rebuilt())]
#[case::rebuilt_linestring_packed(rebuilt_packed())]
#[case::node_membership(membership())]
#[case::node_membership_packed(Capabilities::default())]
fn bbox_streams_agree_across_strategies(#[case] capabilities: Capabilities) {
    let mut session = forced_session(capabilities);

    let items = drain(
        session
            .iterate_bbox(0.0, 1.0, 1.0, 0.0, true)
            .expect("query"),
    );

    assert_stream_shape(&items);
    assert_eq!(kind_ids(&items, EntityKind::Polyline), vec![10, 11]);
    assert_eq!(kind_ids(&items, EntityKind::Node), vec![1, 2, 3]);
    assert_eq!(kind_ids(&items, EntityKind::Group), vec![100]);
}

#[rstest]
#[case::cached_linestring(Capabilities::full())]
#[case::rebuilt_linestring(rebuilt())]
#[case::rebuilt_linestring_packed(rebuilt_packed())]
#[case::node_membership(membership())]
#[case::node_membership_packed(Capabilities::default())]
fn typed_polyline_streams_agree_across_strategies(#[case] capabilities: Capabilities) {
    let mut session = forced_session(capabilities);

    let items = drain(
        session
            .iterate_selected_polylines(&[BoundingBox::new(0.0, 1.0, 1.0, 0.0)], &[])
            .expect("query"),
    );

    assert_stream_shape(&items);
    assert_eq!(kind_ids(&items, EntityKind::Polyline), vec![10, 11]);
    // Every strategy ends by completing the selected polylines' nodes, so
    // the node segment is identical as well.
    assert_eq!(kind_ids(&items, EntityKind::Node), vec![1, 2, 3]);
}

#[rstest]
#[case::cached_linestring(Capabilities::full())]
#[case::node_membership_packed(Capabilities::default())]
fn group_streams_agree_across_strategies(#[case] capabilities: Capabilities) {
    let mut session = forced_session(capabilities);

    let items = drain(
        session
            .iterate_selected_groups(&[BoundingBox::new(0.0, 1.0, 1.0, 0.0)], &[])
            .expect("query"),
    );

    assert_eq!(kind_ids(&items, EntityKind::Group), vec![100]);
}

#[rstest]
fn probing_reflects_the_dataset_layout() {
    let layout = SchemaLayout {
        linestring: false,
        bbox: true,
        way_node_index: true,
    };
    let (nodes, mut ways, groups) = dataset();
    for way in &mut ways {
        way.linestring = None;
    }
    let conn = seeded(&layout, &nodes, &ways, &groups);
    let mut session = Session::new(conn);

    let capabilities = session.capabilities().expect("probe");

    assert!(!capabilities.polyline_linestring);
    assert!(capabilities.polyline_bbox);
    assert!(capabilities.way_node_index);
}

#[rstest]
fn probed_plan_still_selects_over_a_partial_layout() {
    // No cached geometry and no link table at all: the node-membership
    // fallback over the packed node ids must still find the crossing way.
    let layout = SchemaLayout::bare();
    let (nodes, mut ways, groups) = dataset();
    for way in &mut ways {
        way.linestring = None;
        way.bbox = None;
    }
    let conn = seeded(&layout, &nodes, &ways, &groups);
    let mut session = Session::new(conn);

    let items = drain(
        session
            .iterate_bbox(0.0, 1.0, 1.0, 0.0, true)
            .expect("query"),
    );

    assert_eq!(kind_ids(&items, EntityKind::Polyline), vec![10, 11]);
    assert_eq!(kind_ids(&items, EntityKind::Node), vec![1, 2, 3]);
}

#[rstest]
fn forced_capabilities_are_reported_back() {
    let mut session = forced_session(membership());
    assert_eq!(session.capabilities().expect("capabilities"), membership());
}

#[rstest]
fn streams_are_byte_stable_across_strategy_runs() {
    let first: Vec<StreamItem> = {
        let mut session = forced_session(Capabilities::full());
        drain(
            session
                .iterate_bbox(0.0, 1.0, 1.0, 0.0, true)
                .expect("query"),
        )
    };
    let second: Vec<StreamItem> = {
        let mut session = forced_session(Capabilities::full());
        drain(
            session
                .iterate_bbox(0.0, 1.0, 1.0, 0.0, true)
                .expect("query"),
        )
    };
    assert_eq!(first, second);
}
