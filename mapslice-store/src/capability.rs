//! One-shot probing of the dataset's optional schema features.
//!
//! Probing inspects schema metadata once per session and never fails a
//! query: a missing feature only downgrades the physical plan.

use rusqlite::Connection;

use crate::error::StoreError;

/// The optional schema features that change the physical plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// The polyline table carries a cached `linestring` geometry column.
    pub polyline_linestring: bool,
    /// The polyline table carries a cached `bbox` rectangle column.
    pub polyline_bbox: bool,
    /// The dataset ships the `way_nodes` link table; without it, way→node
    /// steps fall back to unpacking the polyline's own node-id column.
    pub way_node_index: bool,
}

impl Capabilities {
    /// All features present.
    #[must_use]
    pub fn full() -> Self {
        Self {
            polyline_linestring: true,
            polyline_bbox: true,
            way_node_index: true,
        }
    }
}

pub(crate) fn probe(conn: &Connection) -> Result<Capabilities, StoreError> {
    let mut statement = conn
        .prepare("SELECT name FROM pragma_table_info('ways')")
        .map_err(unavailable)?;
    let mut rows = statement.query([]).map_err(unavailable)?;
    let mut polyline_linestring = false;
    let mut polyline_bbox = false;
    while let Some(row) = rows.next().map_err(unavailable)? {
        let column: String = row.get(0).map_err(unavailable)?;
        match column.as_str() {
            "linestring" => polyline_linestring = true,
            "bbox" => polyline_bbox = true,
            _ => {}
        }
    }

    let way_node_index = table_exists(conn, "way_nodes")?;

    Ok(Capabilities {
        polyline_linestring,
        polyline_bbox,
        way_node_index,
    })
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool, StoreError> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            [name],
            |row| row.get(0),
        )
        .map_err(unavailable)?;
    Ok(count > 0)
}

fn unavailable(source: rusqlite::Error) -> StoreError {
    StoreError::Unavailable { source }
}
