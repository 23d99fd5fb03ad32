//! Entity cursor adapters.
//!
//! Each adapter reads one entity kind from a named set selected by a shared
//! prefix — empty for the full tables, `"bbox_"` for the scratch sets — and
//! decodes rows into domain records in ascending id order.

use mapslice_core::geom::{self, Geometry};
use mapslice_core::marker::timestamp_from_unix;
use mapslice_core::{EntityKind, Group, Member, Node, Polyline, Tags};
use rusqlite::{params, Connection, Row};

use crate::capability::Capabilities;
use crate::error::{DecodeError, StoreError};

/// Read access to one entity kind through the scratch-prefix convention.
pub trait EntityAdapter {
    type Record;

    /// Reads every record of the set selected by `prefix`, ascending by id.
    fn open(&self, conn: &Connection, prefix: &str) -> Result<Vec<Self::Record>, StoreError>;
}

/// Adapter for point entities.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeReader;

impl EntityAdapter for NodeReader {
    type Record = Node;

    fn open(&self, conn: &Connection, prefix: &str) -> Result<Vec<Node>, StoreError> {
        let sql = format!(
            "SELECT id, version, user_id, tstamp, changeset_id, tags, geom \
             FROM {prefix}nodes ORDER BY id"
        );
        read_nodes(conn, &sql, params![])
    }
}

/// Adapter for polylines; aware of which cached-geometry columns the
/// dataset carries.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolylineReader {
    pub linestring: bool,
    pub bbox: bool,
}

impl PolylineReader {
    #[must_use]
    pub fn for_capabilities(capabilities: Capabilities) -> Self {
        Self {
            linestring: capabilities.polyline_linestring,
            bbox: capabilities.polyline_bbox,
        }
    }

    fn select(&self, prefix: &str) -> String {
        let mut sql =
            String::from("SELECT id, version, user_id, tstamp, changeset_id, tags, nodes");
        if self.linestring {
            sql.push_str(", linestring");
        }
        if self.bbox {
            sql.push_str(", bbox");
        }
        sql.push_str(&format!(" FROM {prefix}ways"));
        sql
    }

    fn decode(&self, row: &Row<'_>) -> Result<Polyline, StoreError> {
        let id: u64 = row.get(0).map_err(broken(EntityKind::Polyline))?;
        let tags_text: String = row.get(5).map_err(broken(EntityKind::Polyline))?;
        let nodes_text: String = row.get(6).map_err(broken(EntityKind::Polyline))?;
        let mut polyline = Polyline::new(
            id,
            serde_json::from_str(&nodes_text).map_err(decode(EntityKind::Polyline, id))?,
        );
        polyline.version = row.get(1).map_err(broken(EntityKind::Polyline))?;
        polyline.timestamp =
            timestamp_from_unix(row.get(3).map_err(broken(EntityKind::Polyline))?);
        polyline.user_id = row.get(2).map_err(broken(EntityKind::Polyline))?;
        polyline.changeset_id = row.get(4).map_err(broken(EntityKind::Polyline))?;
        polyline.tags = decode_tags(EntityKind::Polyline, id, &tags_text)?;

        let mut column = 7;
        if self.linestring {
            let text: Option<String> = row.get(column).map_err(broken(EntityKind::Polyline))?;
            polyline.linestring = match text {
                Some(text) => match geom::decode(&text)
                    .map_err(decode(EntityKind::Polyline, id))?
                {
                    Geometry::Line(line) => Some(line),
                    _ => {
                        return Err(shape_error(EntityKind::Polyline, id));
                    }
                },
                None => None,
            };
            column += 1;
        }
        if self.bbox {
            let text: Option<String> = row.get(column).map_err(broken(EntityKind::Polyline))?;
            polyline.bbox = match text {
                Some(text) => match geom::decode(&text)
                    .map_err(decode(EntityKind::Polyline, id))?
                {
                    Geometry::Envelope(rect) => Some(rect),
                    _ => {
                        return Err(shape_error(EntityKind::Polyline, id));
                    }
                },
                None => None,
            };
        }
        Ok(polyline)
    }
}

impl EntityAdapter for PolylineReader {
    type Record = Polyline;

    fn open(&self, conn: &Connection, prefix: &str) -> Result<Vec<Polyline>, StoreError> {
        let sql = format!("{} ORDER BY id", self.select(prefix));
        let mut statement = conn.prepare(&sql).map_err(broken(EntityKind::Polyline))?;
        let mut rows = statement
            .query([])
            .map_err(broken(EntityKind::Polyline))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().map_err(broken(EntityKind::Polyline))? {
            records.push(self.decode(row)?);
        }
        Ok(records)
    }
}

/// Adapter for groups; members come from the shared member table in
/// sequence order.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupReader;

impl EntityAdapter for GroupReader {
    type Record = Group;

    fn open(&self, conn: &Connection, prefix: &str) -> Result<Vec<Group>, StoreError> {
        let sql = format!(
            "SELECT id, version, user_id, tstamp, changeset_id, tags \
             FROM {prefix}relations ORDER BY id"
        );
        read_groups(conn, &sql, params![])
    }
}

fn read_nodes(
    conn: &Connection,
    sql: &str,
    bindings: &[&dyn rusqlite::ToSql],
) -> Result<Vec<Node>, StoreError> {
    let mut statement = conn.prepare(sql).map_err(broken(EntityKind::Node))?;
    let mut rows = statement.query(bindings).map_err(broken(EntityKind::Node))?;
    let mut records = Vec::new();
    while let Some(row) = rows.next().map_err(broken(EntityKind::Node))? {
        records.push(decode_node(row)?);
    }
    Ok(records)
}

fn decode_node(row: &Row<'_>) -> Result<Node, StoreError> {
    let id: u64 = row.get(0).map_err(broken(EntityKind::Node))?;
    let tags_text: String = row.get(5).map_err(broken(EntityKind::Node))?;
    let geom_text: String = row.get(6).map_err(broken(EntityKind::Node))?;
    let location = match geom::decode(&geom_text).map_err(decode(EntityKind::Node, id))? {
        Geometry::Point(point) => point.into(),
        _ => return Err(shape_error(EntityKind::Node, id)),
    };
    let mut node = Node::new(id, location);
    node.version = row.get(1).map_err(broken(EntityKind::Node))?;
    node.user_id = row.get(2).map_err(broken(EntityKind::Node))?;
    node.timestamp = timestamp_from_unix(row.get(3).map_err(broken(EntityKind::Node))?);
    node.changeset_id = row.get(4).map_err(broken(EntityKind::Node))?;
    node.tags = decode_tags(EntityKind::Node, id, &tags_text)?;
    Ok(node)
}

fn read_groups(
    conn: &Connection,
    sql: &str,
    bindings: &[&dyn rusqlite::ToSql],
) -> Result<Vec<Group>, StoreError> {
    let mut statement = conn.prepare(sql).map_err(broken(EntityKind::Group))?;
    let mut member_statement = conn
        .prepare(
            "SELECT member_id, member_type, role FROM relation_members \
             WHERE relation_id = ? ORDER BY sequence_id",
        )
        .map_err(broken(EntityKind::Group))?;
    let mut rows = statement.query(bindings).map_err(broken(EntityKind::Group))?;
    let mut records = Vec::new();
    while let Some(row) = rows.next().map_err(broken(EntityKind::Group))? {
        let id: u64 = row.get(0).map_err(broken(EntityKind::Group))?;
        let tags_text: String = row.get(5).map_err(broken(EntityKind::Group))?;

        let mut members = Vec::new();
        let mut member_rows = member_statement
            .query(params![id])
            .map_err(broken(EntityKind::Group))?;
        while let Some(member_row) = member_rows.next().map_err(broken(EntityKind::Group))? {
            let member_id: u64 = member_row.get(0).map_err(broken(EntityKind::Group))?;
            let code: String = member_row.get(1).map_err(broken(EntityKind::Group))?;
            let role: String = member_row.get(2).map_err(broken(EntityKind::Group))?;
            let kind = EntityKind::from_code(&code).ok_or_else(|| StoreError::Decode {
                kind: EntityKind::Group,
                id,
                source: DecodeError::MemberKind { code },
            })?;
            members.push(Member::new(kind, member_id, role));
        }

        let mut group = Group::new(id, members);
        group.version = row.get(1).map_err(broken(EntityKind::Group))?;
        group.user_id = row.get(2).map_err(broken(EntityKind::Group))?;
        group.timestamp = timestamp_from_unix(row.get(3).map_err(broken(EntityKind::Group))?);
        group.changeset_id = row.get(4).map_err(broken(EntityKind::Group))?;
        group.tags = decode_tags(EntityKind::Group, id, &tags_text)?;
        records.push(group);
    }
    Ok(records)
}

pub(crate) fn node_by_id(conn: &Connection, id: u64) -> Result<Option<Node>, StoreError> {
    let records = read_nodes(
        conn,
        "SELECT id, version, user_id, tstamp, changeset_id, tags, geom \
         FROM nodes WHERE id = ?",
        params![id],
    )?;
    Ok(records.into_iter().next())
}

pub(crate) fn polyline_by_id(
    conn: &Connection,
    capabilities: Capabilities,
    id: u64,
) -> Result<Option<Polyline>, StoreError> {
    let reader = PolylineReader::for_capabilities(capabilities);
    let sql = format!("{} WHERE id = ?", reader.select(""));
    let mut statement = conn.prepare(&sql).map_err(broken(EntityKind::Polyline))?;
    let mut rows = statement
        .query(params![id])
        .map_err(broken(EntityKind::Polyline))?;
    match rows.next().map_err(broken(EntityKind::Polyline))? {
        Some(row) => Ok(Some(reader.decode(row)?)),
        None => Ok(None),
    }
}

pub(crate) fn group_by_id(conn: &Connection, id: u64) -> Result<Option<Group>, StoreError> {
    let records = read_groups(
        conn,
        "SELECT id, version, user_id, tstamp, changeset_id, tags \
         FROM relations WHERE id = ?",
        params![id],
    )?;
    Ok(records.into_iter().next())
}

fn decode_tags(kind: EntityKind, id: u64, text: &str) -> Result<Tags, StoreError> {
    serde_json::from_str(text).map_err(decode(kind, id))
}

fn broken(kind: EntityKind) -> impl Fn(rusqlite::Error) -> StoreError {
    move |source| StoreError::CursorBroken { kind, source }
}

fn decode<E>(kind: EntityKind, id: u64) -> impl Fn(E) -> StoreError
where
    E: Into<DecodeError>,
{
    move |source| StoreError::Decode {
        kind,
        id,
        source: source.into(),
    }
}

fn shape_error(kind: EntityKind, id: u64) -> StoreError {
    StoreError::Decode {
        kind,
        id,
        source: DecodeError::Geometry(geom::GeometryError::UnrecognisedShape),
    }
}
