//! Behaviour tests for the typed selector queries.

mod support;

use mapslice_core::{BoundingBox, EntityKind, Group, Member, StreamItem, TagSelector, Tags};
use mapslice_store::test_support::SchemaLayout;
use mapslice_store::{Session, StoreError};
use rstest::rstest;
use support::{assert_stream_shape, drain, kind_ids, node, seeded, tagged_node, way};

fn unit_box() -> BoundingBox {
    BoundingBox::new(-1.0, 1.0, 1.0, -1.0)
}

#[rstest]
fn nodes_select_by_attribute_alone() {
    let cafe = tagged_node(1, 0.0, 0.0, "amenity", "cafe");
    let bench = tagged_node(2, 0.0, 0.5, "amenity", "bench");
    let conn = seeded(&SchemaLayout::default(), &[cafe, bench], &[], &[]);
    let mut session = Session::new(conn);

    let items = drain(
        session
            .iterate_selected_nodes(&[], &[TagSelector::equals("amenity", "cafe")])
            .expect("query"),
    );

    assert_stream_shape(&items);
    assert_eq!(kind_ids(&items, EntityKind::Node), vec![1]);
    let StreamItem::Bounds(bounds) = &items[0] else {
        panic!("expected the bounds marker first");
    };
    assert_eq!((bounds.left, bounds.right), (-180.0, 180.0));
}

#[rstest]
fn box_and_attribute_clauses_conjoin() {
    let inside_match = tagged_node(1, 0.5, 0.5, "amenity", "cafe");
    let inside_other = tagged_node(2, 0.4, 0.4, "amenity", "bench");
    let outside_match = tagged_node(3, 5.0, 5.0, "amenity", "cafe");
    let conn = seeded(
        &SchemaLayout::default(),
        &[inside_match, inside_other, outside_match],
        &[],
        &[],
    );
    let mut session = Session::new(conn);

    let items = drain(
        session
            .iterate_selected_nodes(&[unit_box()], &[TagSelector::equals("amenity", "cafe")])
            .expect("query"),
    );

    assert_eq!(kind_ids(&items, EntityKind::Node), vec![1]);
    let StreamItem::Bounds(bounds) = &items[0] else {
        panic!("expected the bounds marker first");
    };
    assert_eq!((bounds.left, bounds.right), (-1.0, 1.0));
}

#[rstest]
fn empty_selector_lists_select_everything() {
    let conn = seeded(
        &SchemaLayout::default(),
        &[node(1, 0.0, 0.0), node(2, 50.0, 50.0)],
        &[],
        &[],
    );
    let mut session = Session::new(conn);

    let items = drain(session.iterate_selected_nodes(&[], &[]).expect("query"));

    assert_eq!(kind_ids(&items, EntityKind::Node), vec![1, 2]);
}

#[rstest]
fn selector_lists_compose_with_or() {
    let cafe = tagged_node(1, 0.0, 0.0, "amenity", "cafe");
    let museum = tagged_node(2, 0.1, 0.1, "tourism", "museum");
    let plain = node(3, 0.2, 0.2);
    let conn = seeded(&SchemaLayout::default(), &[cafe, museum, plain], &[], &[]);
    let mut session = Session::new(conn);

    let items = drain(
        session
            .iterate_selected_nodes(
                &[],
                &[
                    TagSelector::equals("amenity", "cafe"),
                    TagSelector::exists("tourism"),
                ],
            )
            .expect("query"),
    );

    assert_eq!(kind_ids(&items, EntityKind::Node), vec![1, 2]);
}

#[rstest]
fn numeric_comparison_casts_tag_values() {
    let city = tagged_node(1, 0.0, 0.0, "population", "250000");
    let hamlet = tagged_node(2, 0.1, 0.1, "population", "40");
    let unlabelled = node(3, 0.2, 0.2);
    let conn = seeded(&SchemaLayout::default(), &[city, hamlet, unlabelled], &[], &[]);
    let mut session = Session::new(conn);

    let items = drain(
        session
            .iterate_selected_nodes(&[], &[TagSelector::compare("population", ">", 1000.0)])
            .expect("query"),
    );

    assert_eq!(kind_ids(&items, EntityKind::Node), vec![1]);
}

#[rstest]
fn degenerate_box_fails_and_leaves_the_session_usable() {
    let conn = seeded(&SchemaLayout::default(), &[node(1, 0.0, 0.0)], &[], &[]);
    let mut session = Session::new(conn);

    let error = session
        .iterate_selected_nodes(&[BoundingBox::new(2.0, 1.0, 1.0, -1.0)], &[])
        .expect_err("degenerate box must fail");
    assert!(matches!(error, StoreError::InvalidSelector { .. }));

    let items = drain(
        session
            .iterate_selected_nodes(&[], &[])
            .expect("session stays usable"),
    );
    assert_eq!(kind_ids(&items, EntityKind::Node), vec![1]);
}

#[rstest]
fn malformed_operator_fails_and_leaves_the_session_usable() {
    let conn = seeded(&SchemaLayout::default(), &[node(1, 0.0, 0.0)], &[], &[]);
    let mut session = Session::new(conn);

    let error = session
        .iterate_selected_nodes(&[], &[TagSelector::compare("population", "~", 10.0)])
        .expect_err("malformed operator must fail");
    assert!(matches!(error, StoreError::InvalidSelector { .. }));

    assert!(session.iterate_selected_nodes(&[], &[]).is_ok());
}

#[rstest]
fn polylines_select_by_box_and_stream_their_nodes() {
    let n1 = node(1, 0.0, 0.0);
    let n2 = node(2, 0.5, 0.5);
    let n3 = node(3, 5.0, 5.0);
    let n4 = node(4, 6.0, 6.0);
    let inside = way(10, &[&n1, &n2]);
    let outside = way(11, &[&n3, &n4]);
    let conn = seeded(
        &SchemaLayout::default(),
        &[n1, n2, n3, n4],
        &[inside, outside],
        &[],
    );
    let mut session = Session::new(conn);

    let items = drain(
        session
            .iterate_selected_polylines(&[unit_box()], &[])
            .expect("query"),
    );

    assert_stream_shape(&items);
    assert_eq!(kind_ids(&items, EntityKind::Polyline), vec![10]);
    assert_eq!(kind_ids(&items, EntityKind::Node), vec![1, 2]);
    assert!(kind_ids(&items, EntityKind::Group).is_empty());
}

#[rstest]
fn polylines_select_by_attribute_without_a_box() {
    let n1 = node(1, 0.0, 0.0);
    let n2 = node(2, 0.5, 0.5);
    let n3 = node(3, 5.0, 5.0);
    let road = way(10, &[&n1, &n2]).with_tags(Tags::from([(
        "highway".to_string(),
        "primary".to_string(),
    )]));
    let path = way(11, &[&n2, &n3]);
    let conn = seeded(&SchemaLayout::default(), &[n1, n2, n3], &[road, path], &[]);
    let mut session = Session::new(conn);

    let items = drain(
        session
            .iterate_selected_polylines(&[], &[TagSelector::exists("highway")])
            .expect("query"),
    );

    assert_eq!(kind_ids(&items, EntityKind::Polyline), vec![10]);
    assert_eq!(kind_ids(&items, EntityKind::Node), vec![1, 2]);
}

#[rstest]
fn groups_close_over_their_transitive_parents() {
    let n1 = node(1, 0.0, 0.0);
    let w1 = way(10, &[&n1]);
    let r1 = Group::new(100, vec![Member::new(EntityKind::Polyline, 10, "outer")]);
    let r2 = Group::new(101, vec![Member::new(EntityKind::Group, 100, "")]);
    let conn = seeded(&SchemaLayout::default(), &[n1], &[w1], &[r1, r2]);
    let mut session = Session::new(conn);

    let items = drain(
        session
            .iterate_selected_groups(&[unit_box()], &[])
            .expect("query"),
    );

    assert_stream_shape(&items);
    assert_eq!(kind_ids(&items, EntityKind::Group), vec![100, 101]);
    assert!(kind_ids(&items, EntityKind::Node).is_empty());
    assert!(kind_ids(&items, EntityKind::Polyline).is_empty());
}

#[rstest]
fn boxless_group_selection_filters_by_attribute_then_closes() {
    let n1 = node(1, 0.0, 0.0);
    let route = Group::new(100, vec![Member::new(EntityKind::Node, 1, "stop")])
        .with_tags(Tags::from([("type".to_string(), "route".to_string())]));
    let parent = Group::new(101, vec![Member::new(EntityKind::Group, 100, "")]);
    let unrelated = Group::new(102, vec![Member::new(EntityKind::Node, 1, "stop")]);
    let conn = seeded(
        &SchemaLayout::default(),
        &[n1],
        &[],
        &[route, parent, unrelated],
    );
    let mut session = Session::new(conn);

    let items = drain(
        session
            .iterate_selected_groups(&[], &[TagSelector::equals("type", "route")])
            .expect("query"),
    );

    assert_eq!(kind_ids(&items, EntityKind::Group), vec![100, 101]);
}

#[rstest]
fn grouped_selection_with_box_applies_the_attribute_to_seeds_only() {
    let n1 = node(1, 0.0, 0.0);
    let tagged = Group::new(100, vec![Member::new(EntityKind::Node, 1, "stop")])
        .with_tags(Tags::from([("type".to_string(), "route".to_string())]));
    let untagged = Group::new(101, vec![Member::new(EntityKind::Node, 1, "stop")]);
    let parent = Group::new(102, vec![Member::new(EntityKind::Group, 100, "")]);
    let conn = seeded(
        &SchemaLayout::default(),
        &[n1],
        &[],
        &[tagged, untagged, parent],
    );
    let mut session = Session::new(conn);

    let items = drain(
        session
            .iterate_selected_groups(&[unit_box()], &[TagSelector::equals("type", "route")])
            .expect("query"),
    );

    // The untagged sibling is not seeded; the untagged parent joins through
    // closure.
    assert_eq!(kind_ids(&items, EntityKind::Group), vec![100, 102]);
}

#[rstest]
fn selected_all_streams_every_kind_for_the_expression() {
    let n1 = tagged_node(1, 0.0, 0.0, "amenity", "cafe");
    let n2 = node(2, 0.5, 0.5);
    let w1 = way(10, &[&n1, &n2]);
    let r1 = Group::new(100, vec![Member::new(EntityKind::Polyline, 10, "outer")]);
    let conn = seeded(&SchemaLayout::default(), &[n1, n2], &[w1], &[r1]);
    let mut session = Session::new(conn);

    let items = drain(session.iterate_selected_all(&[unit_box()], &[]).expect("query"));

    assert_stream_shape(&items);
    assert_eq!(kind_ids(&items, EntityKind::Node), vec![1, 2]);
    assert_eq!(kind_ids(&items, EntityKind::Polyline), vec![10]);
    assert_eq!(kind_ids(&items, EntityKind::Group), vec![100]);
}

#[rstest]
fn selected_all_with_attributes_narrows_each_kind() {
    let n1 = tagged_node(1, 0.0, 0.0, "amenity", "cafe");
    let n2 = node(2, 0.5, 0.5);
    let w1 = way(10, &[&n1, &n2]);
    let r1 = Group::new(100, vec![Member::new(EntityKind::Polyline, 10, "outer")]);
    let conn = seeded(&SchemaLayout::default(), &[n1, n2], &[w1], &[r1]);
    let mut session = Session::new(conn);

    let items = drain(
        session
            .iterate_selected_all(&[unit_box()], &[TagSelector::equals("amenity", "cafe")])
            .expect("query"),
    );

    // Only the tagged node matches; the untagged polyline drops out and with
    // it the group that referenced it.
    assert_eq!(kind_ids(&items, EntityKind::Node), vec![1]);
    assert!(kind_ids(&items, EntityKind::Polyline).is_empty());
    assert!(kind_ids(&items, EntityKind::Group).is_empty());
}
