//! Shared fixtures for the behaviour suites.

#![allow(dead_code)]

use geo::Coord;
use mapslice_core::{EntityKind, Group, Node, Polyline, StreamItem, Tags};
use mapslice_store::test_support::{self, SchemaLayout};
use mapslice_store::EntityStream;
use rusqlite::Connection;

pub fn node(id: u64, lon: f64, lat: f64) -> Node {
    Node::new(id, Coord { x: lon, y: lat })
}

pub fn tagged_node(id: u64, lon: f64, lat: f64, key: &str, value: &str) -> Node {
    node(id, lon, lat).with_tags(Tags::from([(key.to_string(), value.to_string())]))
}

/// A polyline over the given nodes with its cached geometry derived.
pub fn way(id: u64, node_refs: &[&Node]) -> Polyline {
    let mut way = Polyline::new(id, node_refs.iter().map(|node| node.id).collect());
    let nodes: Vec<Node> = node_refs.iter().map(|node| (*node).clone()).collect();
    test_support::cache_geometry(&mut way, &nodes);
    way
}

pub fn populate(
    conn: &Connection,
    layout: &SchemaLayout,
    nodes: &[Node],
    ways: &[Polyline],
    groups: &[Group],
) {
    for node in nodes {
        test_support::insert_node(conn, node);
    }
    for way in ways {
        test_support::insert_polyline(conn, layout, way);
    }
    for group in groups {
        test_support::insert_group(conn, group);
    }
}

/// An in-memory dataset with the given layout and content.
pub fn seeded(
    layout: &SchemaLayout,
    nodes: &[Node],
    ways: &[Polyline],
    groups: &[Group],
) -> Connection {
    let conn = test_support::connection_with_schema(layout);
    populate(&conn, layout, nodes, ways, groups);
    conn
}

pub fn drain(stream: EntityStream<'_>) -> Vec<StreamItem> {
    stream.map(|item| item.expect("stream item")).collect()
}

pub fn kind_ids(items: &[StreamItem], kind: EntityKind) -> Vec<u64> {
    items
        .iter()
        .filter(|item| item.kind() == Some(kind))
        .filter_map(StreamItem::id)
        .collect()
}

/// Checks the universal stream invariants: one bounds marker, one
/// last-update marker, entities grouped by kind in fixed order with
/// strictly ascending ids.
pub fn assert_stream_shape(items: &[StreamItem]) {
    assert!(
        matches!(items.first(), Some(StreamItem::Bounds(_))),
        "stream must open with the bounds marker"
    );
    assert!(
        matches!(items.get(1), Some(StreamItem::LastUpdated(_))),
        "the last-update marker must follow the bounds marker"
    );
    assert_eq!(
        items
            .iter()
            .filter(|item| matches!(item, StreamItem::Bounds(_)))
            .count(),
        1,
        "exactly one bounds marker"
    );
    assert_eq!(
        items
            .iter()
            .filter(|item| matches!(item, StreamItem::LastUpdated(_)))
            .count(),
        1,
        "exactly one last-update marker"
    );

    let ranks: Vec<u8> = items[2..]
        .iter()
        .map(|item| match item.kind() {
            Some(EntityKind::Node) => 0,
            Some(EntityKind::Polyline) => 1,
            Some(EntityKind::Group) => 2,
            None => panic!("marker found after the stream head"),
        })
        .collect();
    assert!(
        ranks.windows(2).all(|pair| pair[0] <= pair[1]),
        "entities must be grouped in node, polyline, group order"
    );

    for kind in [EntityKind::Node, EntityKind::Polyline, EntityKind::Group] {
        let ids = kind_ids(items, kind);
        assert!(
            ids.windows(2).all(|pair| pair[0] < pair[1]),
            "{kind} ids must be strictly ascending without duplicates"
        );
    }
}
