//! Test-only helpers: schema builder and row writers for the dataset layout
//! the store expects. Used by the unit and behaviour suites; handy for
//! ad-hoc fixtures.

use geo::{BoundingRect, LineString, Point};
use mapslice_core::geom;
use mapslice_core::marker::timestamp_to_unix;
use mapslice_core::{Group, Node, Polyline};
use rusqlite::{params, Connection};

use crate::session::SCHEMA_VERSION;

/// Which optional schema features a fixture dataset carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaLayout {
    /// Cached `linestring` column on the polyline table.
    pub linestring: bool,
    /// Cached `bbox` column on the polyline table.
    pub bbox: bool,
    /// The `way_nodes` link table.
    pub way_node_index: bool,
}

impl Default for SchemaLayout {
    fn default() -> Self {
        Self {
            linestring: true,
            bbox: true,
            way_node_index: true,
        }
    }
}

impl SchemaLayout {
    /// A layout with no optional features at all.
    #[must_use]
    pub fn bare() -> Self {
        Self {
            linestring: false,
            bbox: false,
            way_node_index: false,
        }
    }
}

/// Creates the dataset schema for the given layout and stamps the current
/// schema version.
pub fn create_schema(conn: &Connection, layout: &SchemaLayout) {
    conn.execute_batch(
        "CREATE TABLE schema_info (version INTEGER NOT NULL);
         CREATE TABLE dataset_state (last_update INTEGER NOT NULL);
         CREATE TABLE nodes (
             id INTEGER PRIMARY KEY,
             version INTEGER NOT NULL,
             user_id INTEGER NOT NULL,
             tstamp INTEGER NOT NULL,
             changeset_id INTEGER NOT NULL,
             tags TEXT NOT NULL,
             geom TEXT NOT NULL
         );
         CREATE TABLE relations (
             id INTEGER PRIMARY KEY,
             version INTEGER NOT NULL,
             user_id INTEGER NOT NULL,
             tstamp INTEGER NOT NULL,
             changeset_id INTEGER NOT NULL,
             tags TEXT NOT NULL
         );
         CREATE TABLE relation_members (
             relation_id INTEGER NOT NULL,
             member_id INTEGER NOT NULL,
             member_type TEXT NOT NULL,
             sequence_id INTEGER NOT NULL,
             role TEXT NOT NULL,
             PRIMARY KEY (relation_id, sequence_id)
         );",
    )
    .expect("create base schema");

    let mut ways = String::from(
        "CREATE TABLE ways (
             id INTEGER PRIMARY KEY,
             version INTEGER NOT NULL,
             user_id INTEGER NOT NULL,
             tstamp INTEGER NOT NULL,
             changeset_id INTEGER NOT NULL,
             tags TEXT NOT NULL,
             nodes TEXT NOT NULL",
    );
    if layout.linestring {
        ways.push_str(",\n             linestring TEXT");
    }
    if layout.bbox {
        ways.push_str(",\n             bbox TEXT");
    }
    ways.push_str("\n         )");
    conn.execute(&ways, []).expect("create ways table");

    if layout.way_node_index {
        conn.execute(
            "CREATE TABLE way_nodes (
                 way_id INTEGER NOT NULL,
                 node_id INTEGER NOT NULL,
                 sequence_id INTEGER NOT NULL,
                 PRIMARY KEY (way_id, sequence_id)
             )",
            [],
        )
        .expect("create way_nodes table");
    }

    conn.execute(
        "INSERT INTO schema_info (version) VALUES (?)",
        [SCHEMA_VERSION],
    )
    .expect("stamp schema version");
}

/// An in-memory connection with a freshly created schema.
#[must_use]
pub fn connection_with_schema(layout: &SchemaLayout) -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory store");
    create_schema(&conn, layout);
    conn
}

/// Overwrites the stamped schema version.
pub fn set_schema_version(conn: &Connection, version: i64) {
    conn.execute("UPDATE schema_info SET version = ?", [version])
        .expect("update schema version");
}

/// Records the dataset's last-modification instant as Unix seconds.
pub fn set_last_update(conn: &Connection, seconds: i64) {
    conn.execute("DELETE FROM dataset_state", [])
        .expect("clear dataset state");
    conn.execute("INSERT INTO dataset_state (last_update) VALUES (?)", [seconds])
        .expect("record last update");
}

pub fn insert_node(conn: &Connection, node: &Node) {
    conn.execute(
        "INSERT INTO nodes (id, version, user_id, tstamp, changeset_id, tags, geom)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            node.id,
            node.version,
            node.user_id,
            timestamp_to_unix(node.timestamp),
            node.changeset_id,
            serde_json::to_string(&node.tags).expect("serialize tags"),
            geom::encode_point(&Point::from(node.location)),
        ],
    )
    .expect("insert node");
}

pub fn insert_polyline(conn: &Connection, layout: &SchemaLayout, way: &Polyline) {
    let mut columns =
        String::from("id, version, user_id, tstamp, changeset_id, tags, nodes");
    let mut values = String::from("?1, ?2, ?3, ?4, ?5, ?6, ?7");
    let mut extras: Vec<Option<String>> = Vec::new();
    if layout.linestring {
        columns.push_str(", linestring");
        extras.push(way.linestring.as_ref().map(geom::encode_line));
        values.push_str(&format!(", ?{}", 7 + extras.len()));
    }
    if layout.bbox {
        columns.push_str(", bbox");
        extras.push(way.bbox.as_ref().map(geom::encode_envelope));
        values.push_str(&format!(", ?{}", 7 + extras.len()));
    }

    let mut bindings: Vec<rusqlite::types::Value> = vec![
        i64::try_from(way.id).expect("way id fits").into(),
        i64::from(way.version).into(),
        way.user_id.into(),
        timestamp_to_unix(way.timestamp).into(),
        way.changeset_id.into(),
        serde_json::to_string(&way.tags)
            .expect("serialize tags")
            .into(),
        serde_json::to_string(&way.nodes)
            .expect("serialize node ids")
            .into(),
    ];
    for extra in extras {
        bindings.push(match extra {
            Some(text) => text.into(),
            None => rusqlite::types::Value::Null,
        });
    }

    conn.execute(
        &format!("INSERT INTO ways ({columns}) VALUES ({values})"),
        rusqlite::params_from_iter(bindings),
    )
    .expect("insert polyline");

    if layout.way_node_index {
        for (sequence, node_id) in way.nodes.iter().enumerate() {
            conn.execute(
                "INSERT INTO way_nodes (way_id, node_id, sequence_id) VALUES (?1, ?2, ?3)",
                params![way.id, node_id, sequence as i64],
            )
            .expect("insert way node");
        }
    }
}

pub fn insert_group(conn: &Connection, group: &Group) {
    conn.execute(
        "INSERT INTO relations (id, version, user_id, tstamp, changeset_id, tags)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            group.id,
            group.version,
            group.user_id,
            timestamp_to_unix(group.timestamp),
            group.changeset_id,
            serde_json::to_string(&group.tags).expect("serialize tags"),
        ],
    )
    .expect("insert group");
    for (sequence, member) in group.members.iter().enumerate() {
        conn.execute(
            "INSERT INTO relation_members (relation_id, member_id, member_type, sequence_id, role)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                group.id,
                member.member_id,
                member.kind.code(),
                sequence as i64,
                member.role,
            ],
        )
        .expect("insert group member");
    }
}

/// Fills a polyline's cached geometry columns from its referenced nodes.
pub fn cache_geometry(way: &mut Polyline, nodes: &[Node]) {
    let coords: Vec<_> = way
        .nodes
        .iter()
        .map(|id| {
            nodes
                .iter()
                .find(|node| node.id == *id)
                .expect("referenced node present")
                .location
        })
        .collect();
    let line = LineString::from(coords);
    way.bbox = line.bounding_rect();
    way.linestring = Some(line);
}
