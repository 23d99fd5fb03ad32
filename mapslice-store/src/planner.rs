//! Translates a query kind, its selectors and the probed capabilities into
//! an ordered list of stage descriptors.
//!
//! Stage ordering rules: the node set is complete before any node-membership
//! polyline stage runs; the polyline set is complete before group seeding;
//! the group-over-group closure runs before complete-ways expansion, so
//! nodes promoted by the expansion never extend group closure; expansion is
//! always last.

use mapslice_core::selector::{bbox_clause, tag_clause, Clause, GeometryTarget};
use mapslice_core::{BoundingBox, TagSelector};

use crate::capability::Capabilities;
use crate::error::StoreError;

/// Prefix shared by every scratch set; the adapter contract selects the
/// backing tables with it.
pub(crate) const SCRATCH_PREFIX: &str = "bbox_";

/// Which entity kinds a plan's stream emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EmitSet {
    pub nodes: bool,
    pub polylines: bool,
    pub groups: bool,
}

impl EmitSet {
    pub(crate) const ALL: Self = Self {
        nodes: true,
        polylines: true,
        groups: true,
    };
    pub(crate) const NODES: Self = Self {
        nodes: true,
        polylines: false,
        groups: false,
    };
    pub(crate) const NODES_AND_POLYLINES: Self = Self {
        nodes: true,
        polylines: true,
        groups: false,
    };
    pub(crate) const GROUPS: Self = Self {
        nodes: false,
        polylines: false,
        groups: true,
    };
}

/// One set-building step against the store.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Stage {
    /// Pins scratch sets to memory for the remainder of the connection.
    TuneScratch,
    /// `bbox_nodes` from a node-table predicate.
    MaterializeNodes { clause: Clause },
    /// `bbox_nodes` with the node-table shape but no rows.
    EmptyNodes,
    /// `bbox_nodes` from an explicit id list.
    NodesById { ids: Vec<i64> },
    /// `bbox_ways` from a polyline-table predicate (cached linestring, or a
    /// plain attribute selection).
    MaterializeWays { clause: Clause },
    /// `bbox_ways` by rebuilding each candidate's linestring on the fly:
    /// candidates are constrained by the cached bbox column, the rebuilt
    /// line is filtered by the outer clause.
    RebuildWays { candidates: Clause, filter: Clause },
    /// `bbox_ways` as the polylines referencing any row of `bbox_nodes`.
    WaysFromNodes { tags: Clause },
    /// `bbox_ways` from an explicit id list.
    WaysById { ids: Vec<i64> },
    /// Seed `bbox_relations` with groups directly referencing the node or
    /// polyline sets, de-duplicated by union.
    SeedGroups { tags: Clause },
    /// `bbox_relations` from a group-table predicate.
    MaterializeGroups { clause: Clause },
    /// `bbox_relations` from an explicit id list.
    GroupsById { ids: Vec<i64> },
    /// Pull parent groups of current members until a fixed point.
    CloseGroups,
    /// Reset `bbox_nodes` to empty, keeping its shape.
    ClearNodes,
    /// Complete-ways expansion: node ids referenced by `bbox_ways` that are
    /// missing from `bbox_nodes` are materialized and merged in.
    ExpandWayNodes,
}

impl Stage {
    /// Stage name carried by `QueryFailed` errors and diagnostics.
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::TuneScratch => "tune scratch",
            Self::MaterializeNodes { .. } | Self::EmptyNodes | Self::NodesById { .. } => {
                "materialize nodes"
            }
            Self::MaterializeWays { .. }
            | Self::RebuildWays { .. }
            | Self::WaysFromNodes { .. }
            | Self::WaysById { .. } => "materialize polylines",
            Self::SeedGroups { .. } | Self::MaterializeGroups { .. } | Self::GroupsById { .. } => {
                "materialize groups"
            }
            Self::CloseGroups => "close groups",
            Self::ClearNodes => "clear nodes",
            Self::ExpandWayNodes => "expand way nodes",
        }
    }
}

/// An ordered stage list plus the cursors to assemble afterwards.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Plan {
    pub stages: Vec<Stage>,
    pub emit: EmitSet,
    /// Whether cursors read the scratch sets or the full tables.
    pub scratch: bool,
}

pub(crate) fn plan_all() -> Plan {
    Plan {
        stages: Vec::new(),
        emit: EmitSet::ALL,
        scratch: false,
    }
}

pub(crate) fn plan_bbox(
    bbox: &BoundingBox,
    complete_ways: bool,
    capabilities: Capabilities,
    tune: bool,
) -> Result<Plan, StoreError> {
    let boxes = std::slice::from_ref(bbox);
    let mut stages = opening(tune);
    stages.push(Stage::MaterializeNodes {
        clause: bbox_clause(boxes, GeometryTarget::NodePoint)?,
    });
    stages.push(way_selection(boxes, &[], capabilities)?);
    stages.push(Stage::SeedGroups {
        tags: Clause::tautology(),
    });
    stages.push(Stage::CloseGroups);
    if complete_ways {
        stages.push(Stage::ExpandWayNodes);
    }
    Ok(Plan {
        stages,
        emit: EmitSet::ALL,
        scratch: true,
    })
}

pub(crate) fn plan_selected_nodes(
    boxes: &[BoundingBox],
    tags: &[TagSelector],
    tune: bool,
) -> Result<Plan, StoreError> {
    let clause = bbox_clause(boxes, GeometryTarget::NodePoint)?.and(tag_clause(tags)?);
    let mut stages = opening(tune);
    stages.push(Stage::MaterializeNodes { clause });
    Ok(Plan {
        stages,
        emit: EmitSet::NODES,
        scratch: true,
    })
}

pub(crate) fn plan_selected_polylines(
    boxes: &[BoundingBox],
    tags: &[TagSelector],
    capabilities: Capabilities,
    tune: bool,
) -> Result<Plan, StoreError> {
    let mut stages = opening(tune);
    // With no cached geometry at all the node set doubles as the spatial
    // seed; it is cleared again before expansion repopulates it with the
    // nodes the selected polylines actually reference.
    let seed_from_nodes = !boxes.is_empty()
        && !capabilities.polyline_linestring
        && !capabilities.polyline_bbox;
    if seed_from_nodes {
        stages.push(Stage::MaterializeNodes {
            clause: bbox_clause(boxes, GeometryTarget::NodePoint)?,
        });
    } else {
        stages.push(Stage::EmptyNodes);
    }
    stages.push(way_selection(boxes, tags, capabilities)?);
    if seed_from_nodes {
        stages.push(Stage::ClearNodes);
    }
    stages.push(Stage::ExpandWayNodes);
    Ok(Plan {
        stages,
        emit: EmitSet::NODES_AND_POLYLINES,
        scratch: true,
    })
}

pub(crate) fn plan_selected_groups(
    boxes: &[BoundingBox],
    tags: &[TagSelector],
    capabilities: Capabilities,
    tune: bool,
) -> Result<Plan, StoreError> {
    let tags = tag_clause(tags)?;
    let mut stages = opening(tune);
    if boxes.is_empty() {
        stages.push(Stage::MaterializeGroups { clause: tags });
    } else {
        stages.push(Stage::MaterializeNodes {
            clause: bbox_clause(boxes, GeometryTarget::NodePoint)?,
        });
        stages.push(way_selection(boxes, &[], capabilities)?);
        stages.push(Stage::SeedGroups { tags });
    }
    stages.push(Stage::CloseGroups);
    Ok(Plan {
        stages,
        emit: EmitSet::GROUPS,
        scratch: true,
    })
}

pub(crate) fn plan_selected_all(
    boxes: &[BoundingBox],
    tags: &[TagSelector],
    capabilities: Capabilities,
    tune: bool,
) -> Result<Plan, StoreError> {
    let mut stages = opening(tune);
    stages.push(Stage::MaterializeNodes {
        clause: bbox_clause(boxes, GeometryTarget::NodePoint)?.and(tag_clause(tags)?),
    });
    stages.push(way_selection(boxes, tags, capabilities)?);
    stages.push(Stage::SeedGroups {
        tags: Clause::tautology(),
    });
    stages.push(Stage::CloseGroups);
    stages.push(Stage::ExpandWayNodes);
    Ok(Plan {
        stages,
        emit: EmitSet::ALL,
        scratch: true,
    })
}

pub(crate) fn plan_nodes_by_id(ids: &[u64], tune: bool) -> Result<Plan, StoreError> {
    let mut stages = opening(tune);
    stages.push(Stage::NodesById {
        ids: signed_ids(ids)?,
    });
    Ok(Plan {
        stages,
        emit: EmitSet::NODES,
        scratch: true,
    })
}

pub(crate) fn plan_polylines_by_id(ids: &[u64], tune: bool) -> Result<Plan, StoreError> {
    let mut stages = opening(tune);
    stages.push(Stage::EmptyNodes);
    stages.push(Stage::WaysById {
        ids: signed_ids(ids)?,
    });
    stages.push(Stage::ExpandWayNodes);
    Ok(Plan {
        stages,
        emit: EmitSet::NODES_AND_POLYLINES,
        scratch: true,
    })
}

pub(crate) fn plan_groups_by_id(ids: &[u64], tune: bool) -> Result<Plan, StoreError> {
    let mut stages = opening(tune);
    stages.push(Stage::GroupsById {
        ids: signed_ids(ids)?,
    });
    Ok(Plan {
        stages,
        emit: EmitSet::GROUPS,
        scratch: true,
    })
}

/// Chooses the polyline materialization strategy for the given selectors.
fn way_selection(
    boxes: &[BoundingBox],
    tags: &[TagSelector],
    capabilities: Capabilities,
) -> Result<Stage, StoreError> {
    let tags = tag_clause(tags)?;
    if boxes.is_empty() {
        // No spatial constraint; the attribute clause selects directly.
        return Ok(Stage::MaterializeWays {
            clause: Clause::tautology().and(tags),
        });
    }
    if capabilities.polyline_linestring {
        return Ok(Stage::MaterializeWays {
            clause: bbox_clause(boxes, GeometryTarget::PolylineLine)?.and(tags),
        });
    }
    if capabilities.polyline_bbox {
        return Ok(Stage::RebuildWays {
            candidates: overlap_clause(boxes, "w.bbox")?,
            filter: overlap_clause(boxes, "w.way_line")?.and(tags),
        });
    }
    Ok(Stage::WaysFromNodes { tags })
}

/// OR-joins boxes against an internal geometry expression of the rebuild
/// strategy.
fn overlap_clause(boxes: &[BoundingBox], column: &str) -> Result<Clause, StoreError> {
    let mut fragments = Vec::with_capacity(boxes.len());
    let mut params = Vec::with_capacity(boxes.len());
    for selector in boxes {
        selector.validate()?;
        fragments.push(BoundingBox::overlap_fragment(column));
        params.push(selector.param());
    }
    Ok(Clause {
        sql: format!("({})", fragments.join(" OR ")),
        params,
    })
}

fn opening(tune: bool) -> Vec<Stage> {
    if tune {
        vec![Stage::TuneScratch]
    } else {
        Vec::new()
    }
}

fn signed_ids(ids: &[u64]) -> Result<Vec<i64>, StoreError> {
    ids.iter()
        .map(|&id| i64::try_from(id).map_err(|_| StoreError::IdOutOfRange { id }))
        .collect()
}
