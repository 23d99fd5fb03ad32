//! Runs plan stages in order against the store.
//!
//! Every materialization drops a leftover scratch set of the same name,
//! creates the temporary table from its staged SELECT, adds a unique id
//! index where the stage calls for one, refreshes statistics and records the
//! resulting row count for diagnostics. Any store error aborts the query
//! with the failing stage's name.

use log::{debug, trace};
use mapslice_core::selector::{Clause, ParamValue};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

use crate::capability::Capabilities;
use crate::error::StoreError;
use crate::planner::Stage;

pub(crate) fn run(
    conn: &Connection,
    capabilities: Capabilities,
    stages: &[Stage],
) -> Result<(), StoreError> {
    for stage in stages {
        execute(conn, capabilities, stage)?;
    }
    Ok(())
}

fn execute(conn: &Connection, capabilities: Capabilities, stage: &Stage) -> Result<(), StoreError> {
    let name = stage.name();
    match stage {
        Stage::TuneScratch => {
            trace!("pinning scratch sets to memory");
            conn.pragma_update(None, "temp_store", "MEMORY")
                .map_err(|source| fail(name, source))
        }
        Stage::MaterializeNodes { clause } => {
            debug!("selecting nodes into the scratch set");
            materialize(
                conn,
                name,
                "bbox_nodes",
                &format!("SELECT * FROM nodes WHERE {}", clause.sql),
                &clause.params,
                true,
            )
        }
        Stage::EmptyNodes => materialize(
            conn,
            name,
            "bbox_nodes",
            "SELECT * FROM nodes WHERE 0 = 1",
            &[],
            false,
        ),
        Stage::NodesById { ids } => {
            materialize_ids(conn, name, "bbox_nodes", "SELECT * FROM nodes", ids)
        }
        Stage::MaterializeWays { clause } => {
            debug!("selecting polylines into the scratch set");
            materialize(
                conn,
                name,
                "bbox_ways",
                &format!(
                    "SELECT {} FROM ways WHERE {}",
                    way_columns(capabilities, None),
                    clause.sql
                ),
                &clause.params,
                true,
            )
        }
        Stage::RebuildWays { candidates, filter } => {
            debug!("selecting polylines by rebuilding linestrings over the cached bbox index");
            let mut params = candidates.params.clone();
            params.extend(filter.params.iter().cloned());
            materialize(
                conn,
                name,
                "bbox_ways",
                &rebuild_ways_select(capabilities, candidates, filter),
                &params,
                true,
            )
        }
        Stage::WaysFromNodes { tags } => {
            debug!("selecting polylines referencing already-selected nodes");
            materialize(
                conn,
                name,
                "bbox_ways",
                &ways_from_nodes_select(capabilities, tags),
                &tags.params,
                true,
            )
        }
        Stage::WaysById { ids } => materialize_ids(
            conn,
            name,
            "bbox_ways",
            &format!("SELECT {} FROM ways", way_columns(capabilities, None)),
            ids,
        ),
        Stage::SeedGroups { tags } => {
            debug!("selecting groups referencing selected nodes or polylines");
            materialize(conn, name, "bbox_relations", &seed_groups_select(tags), &tags.params, true)
        }
        Stage::MaterializeGroups { clause } => {
            debug!("selecting groups matching attributes");
            materialize(
                conn,
                name,
                "bbox_relations",
                &format!("SELECT * FROM relations WHERE {}", clause.sql),
                &clause.params,
                true,
            )
        }
        Stage::GroupsById { ids } => {
            materialize_ids(conn, name, "bbox_relations", "SELECT * FROM relations", ids)
        }
        Stage::CloseGroups => close_groups(conn, name),
        Stage::ClearNodes => conn
            .execute("DELETE FROM bbox_nodes", [])
            .map(drop)
            .map_err(|source| fail(name, source)),
        Stage::ExpandWayNodes => expand_way_nodes(conn, name, capabilities),
    }
}

fn materialize(
    conn: &Connection,
    stage: &'static str,
    table: &str,
    select: &str,
    params: &[ParamValue],
    with_index: bool,
) -> Result<(), StoreError> {
    conn.execute(&format!("DROP TABLE IF EXISTS {table}"), [])
        .map_err(|source| fail(stage, source))?;
    conn.execute(
        &format!("CREATE TEMP TABLE {table} AS {select}"),
        params_from_iter(bind(params)),
    )
    .map_err(|source| fail(stage, source))?;
    if with_index {
        conn.execute(
            &format!("CREATE UNIQUE INDEX pk_{table} ON {table} (id)"),
            [],
        )
        .map_err(|source| fail(stage, source))?;
    }
    analyze(conn, stage, table)?;
    debug!("{} rows materialized into {table}", count_rows(conn, table));
    Ok(())
}

fn materialize_ids(
    conn: &Connection,
    stage: &'static str,
    table: &str,
    select: &str,
    ids: &[i64],
) -> Result<(), StoreError> {
    let select = if ids.is_empty() {
        format!("{select} WHERE 0 = 1")
    } else {
        format!("{select} WHERE id IN ({})", placeholders(ids.len()))
    };
    conn.execute(&format!("DROP TABLE IF EXISTS {table}"), [])
        .map_err(|source| fail(stage, source))?;
    conn.execute(
        &format!("CREATE TEMP TABLE {table} AS {select}"),
        params_from_iter(ids.iter()),
    )
    .map_err(|source| fail(stage, source))?;
    analyze(conn, stage, table)?;
    debug!("{} rows materialized into {table}", count_rows(conn, table));
    Ok(())
}

fn close_groups(conn: &Connection, stage: &'static str) -> Result<(), StoreError> {
    const STEP: &str = "INSERT INTO bbox_relations \
         SELECT r.* FROM relations r INNER JOIN (\
             SELECT rm.relation_id FROM relation_members rm \
             INNER JOIN bbox_relations br ON rm.member_id = br.id \
             WHERE rm.member_type = 'R' AND NOT EXISTS (\
                 SELECT * FROM bbox_relations br2 WHERE rm.relation_id = br2.id\
             ) GROUP BY rm.relation_id\
         ) rids ON r.id = rids.relation_id";
    loop {
        let inserted = conn.execute(STEP, []).map_err(|source| fail(stage, source))?;
        trace!("closure step pulled {inserted} parent groups");
        if inserted == 0 {
            break;
        }
    }
    analyze(conn, stage, "bbox_relations")
}

fn expand_way_nodes(
    conn: &Connection,
    stage: &'static str,
    capabilities: Capabilities,
) -> Result<(), StoreError> {
    debug!("selecting all nodes referenced by selected polylines");
    let statements = [
        "DROP TABLE IF EXISTS bbox_way_nodes".to_string(),
        "CREATE TEMP TABLE bbox_way_nodes (id INTEGER)".to_string(),
        if capabilities.way_node_index {
            "INSERT INTO bbox_way_nodes \
             SELECT wn.node_id FROM way_nodes wn \
             INNER JOIN bbox_ways w ON wn.way_id = w.id"
                .to_string()
        } else {
            "INSERT INTO bbox_way_nodes \
             SELECT jn.value FROM bbox_ways w, json_each(w.nodes) jn"
                .to_string()
        },
        "DROP TABLE IF EXISTS bbox_missing_way_nodes".to_string(),
        "CREATE TEMP TABLE bbox_missing_way_nodes AS \
         SELECT buwn.id FROM (SELECT DISTINCT bwn.id AS id FROM bbox_way_nodes bwn) buwn \
         WHERE NOT EXISTS (SELECT * FROM bbox_nodes WHERE id = buwn.id)"
            .to_string(),
        "CREATE UNIQUE INDEX pk_bbox_missing_way_nodes ON bbox_missing_way_nodes (id)".to_string(),
        "ANALYZE bbox_missing_way_nodes".to_string(),
        "INSERT INTO bbox_nodes \
         SELECT n.* FROM nodes n \
         INNER JOIN bbox_missing_way_nodes bwn ON n.id = bwn.id"
            .to_string(),
        "ANALYZE bbox_nodes".to_string(),
    ];
    for statement in &statements {
        conn.execute(statement, [])
            .map_err(|source| fail(stage, source))?;
    }
    debug!(
        "{} missing nodes merged into bbox_nodes",
        count_rows(conn, "bbox_missing_way_nodes")
    );
    Ok(())
}

fn ways_from_nodes_select(capabilities: Capabilities, tags: &Clause) -> String {
    let columns = way_columns(capabilities, Some("w"));
    if capabilities.way_node_index {
        format!(
            "SELECT {columns} FROM ways w INNER JOIN (\
                 SELECT wn.way_id AS way_id FROM way_nodes wn \
                 INNER JOIN bbox_nodes n ON wn.node_id = n.id \
                 GROUP BY wn.way_id\
             ) wids ON w.id = wids.way_id WHERE {}",
            tags.sql
        )
    } else {
        format!(
            "SELECT {columns} FROM ways w WHERE EXISTS (\
                 SELECT 1 FROM json_each(w.nodes) jn \
                 INNER JOIN bbox_nodes n ON jn.value = n.id\
             ) AND {}",
            tags.sql
        )
    }
}

fn rebuild_ways_select(capabilities: Capabilities, candidates: &Clause, filter: &Clause) -> String {
    // Inner query: candidate polylines constrained by the cached bbox,
    // joined to their node coordinates in sequence order. Middle query:
    // one rebuilt linestring per polyline. Outer query: filter by the
    // rebuilt line; the candidates already minimised the data it sees.
    let inner = if capabilities.way_node_index {
        format!(
            "SELECT w.*, n.geom AS geom FROM nodes n \
             INNER JOIN way_nodes wn ON n.id = wn.node_id \
             INNER JOIN ways w ON wn.way_id = w.id \
             WHERE {} ORDER BY wn.way_id, wn.sequence_id",
            candidates.sql
        )
    } else {
        format!(
            "SELECT w.*, n.geom AS geom FROM ways w, json_each(w.nodes) jn \
             INNER JOIN nodes n ON n.id = jn.value \
             WHERE {} ORDER BY w.id, jn.key",
            candidates.sql
        )
    };
    let middle = format!(
        "SELECT {}, make_line(c.geom) AS way_line FROM ({inner}) c GROUP BY c.id",
        way_columns_aliased(capabilities, "c")
    );
    format!(
        "SELECT {} FROM ({middle}) w WHERE {}",
        way_columns(capabilities, Some("w")),
        filter.sql
    )
}

fn seed_groups_select(tags: &Clause) -> String {
    format!(
        "SELECT r.* FROM relations r INNER JOIN (\
             SELECT relation_id FROM (\
                 SELECT rm.relation_id AS relation_id FROM relation_members rm \
                 INNER JOIN bbox_nodes n ON rm.member_id = n.id \
                 WHERE rm.member_type = 'N' \
                 UNION \
                 SELECT rm.relation_id AS relation_id FROM relation_members rm \
                 INNER JOIN bbox_ways w ON rm.member_id = w.id \
                 WHERE rm.member_type = 'W'\
             ) rids GROUP BY relation_id\
         ) rids ON r.id = rids.relation_id WHERE {}",
        tags.sql
    )
}

const WAY_COLUMNS: [&str; 7] = [
    "id",
    "version",
    "user_id",
    "tstamp",
    "changeset_id",
    "tags",
    "nodes",
];

/// The polyline column list for the current capability set, optionally
/// qualified. Explicit lists keep every materialization strategy producing
/// the same scratch shape.
fn way_columns(capabilities: Capabilities, qualifier: Option<&str>) -> String {
    columns_for(capabilities)
        .map(|column| match qualifier {
            Some(qualifier) => format!("{qualifier}.{column}"),
            None => column.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// As [`way_columns`] but re-aliasing each column to its bare name, for the
/// middle grouping query of the rebuild strategy.
fn way_columns_aliased(capabilities: Capabilities, qualifier: &str) -> String {
    columns_for(capabilities)
        .map(|column| format!("{qualifier}.{column} AS {column}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn columns_for(capabilities: Capabilities) -> impl Iterator<Item = &'static str> {
    WAY_COLUMNS
        .into_iter()
        .chain(capabilities.polyline_linestring.then_some("linestring"))
        .chain(capabilities.polyline_bbox.then_some("bbox"))
}

fn analyze(conn: &Connection, stage: &'static str, table: &str) -> Result<(), StoreError> {
    conn.execute(&format!("ANALYZE {table}"), [])
        .map(drop)
        .map_err(|source| fail(stage, source))
}

fn count_rows(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get(0)
    })
    .unwrap_or(-1)
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn bind(params: &[ParamValue]) -> Vec<Value> {
    params
        .iter()
        .map(|param| match param {
            ParamValue::Float(value) => Value::Real(*value),
            ParamValue::Int(value) => Value::Integer(*value),
            ParamValue::Text(value) => Value::Text(value.clone()),
        })
        .collect()
}

fn fail(stage: &'static str, source: rusqlite::Error) -> StoreError {
    StoreError::QueryFailed { stage, source }
}
