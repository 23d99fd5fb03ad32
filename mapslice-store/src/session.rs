//! Sessions: one store connection, one transaction, one query at a time.

use std::path::Path;

use log::debug;
use mapslice_core::{BoundingBox, DatasetBounds, EntityKind, Group, Node, Polyline, TagSelector};
use rusqlite::{Connection, OptionalExtension};

use crate::adapter;
use crate::capability::{self, Capabilities};
use crate::error::StoreError;
use crate::executor;
use crate::planner::{self, Plan};
use crate::spatial;
use crate::stream::EntityStream;

/// Schema generation this implementation understands.
pub const SCHEMA_VERSION: i64 = 1;

/// Origin tag carried by every bounds marker.
const ORIGIN: &str = concat!("mapslice ", env!("CARGO_PKG_VERSION"));

/// Tunables applied when the session initializes.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Skip the schema-version check. Off by default; useful against
    /// ad-hoc datasets.
    pub skip_schema_validation: bool,
    /// Leave scratch sets on disk instead of pinning them to memory.
    pub scratch_on_disk: bool,
    /// Replace the probed capability record, forcing a particular physical
    /// plan.
    pub capabilities: Option<Capabilities>,
}

impl SessionConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_skip_schema_validation(mut self, skip: bool) -> Self {
        self.skip_schema_validation = skip;
        self
    }

    #[must_use]
    pub fn with_scratch_on_disk(mut self, on_disk: bool) -> Self {
        self.scratch_on_disk = on_disk;
        self
    }

    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Constructed; nothing touched the store yet.
    Idle,
    /// Transaction open, capabilities probed.
    Ready,
    /// Committed; no further queries.
    Completed,
    /// A fatal error occurred; only `release` remains useful.
    Poisoned,
    /// Connection returned; terminal.
    Released,
}

/// Read-only access to one dataset through one connection-scoped
/// transaction.
///
/// Construction cannot fail: the transaction is opened, the schema version
/// validated and the capabilities probed lazily on the first query. Streams
/// borrow the session mutably, so a stream must be drained or dropped before
/// the next query or [`Session::complete`]. Every query's scratch side
/// effects stay private to this session and die with the transaction.
pub struct Session {
    conn: Option<Connection>,
    config: SessionConfig,
    phase: Phase,
    capabilities: Capabilities,
}

impl Session {
    /// Wraps an already-acquired connection. The connection is owned
    /// exclusively by this session until [`Session::release`].
    #[must_use]
    pub fn new(conn: Connection) -> Self {
        Self::with_config(conn, SessionConfig::default())
    }

    #[must_use]
    pub fn with_config(conn: Connection, config: SessionConfig) -> Self {
        Self {
            conn: Some(conn),
            config,
            phase: Phase::Idle,
            capabilities: Capabilities::default(),
        }
    }

    /// Convenience constructor opening a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_config(path, SessionConfig::default())
    }

    pub fn open_with_config(
        path: impl AsRef<Path>,
        config: SessionConfig,
    ) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::Unavailable { source })?;
        Ok(Self::with_config(conn, config))
    }

    /// The capability record in effect for this session.
    pub fn capabilities(&mut self) -> Result<Capabilities, StoreError> {
        self.ensure_ready()?;
        Ok(self.capabilities)
    }

    /// Point lookup of a node.
    pub fn node_by_id(&mut self, id: u64) -> Result<Node, StoreError> {
        self.ensure_ready()?;
        let result = adapter::node_by_id(self.connection()?, id);
        self.require_found(result, EntityKind::Node, id)
    }

    /// Point lookup of a polyline.
    pub fn polyline_by_id(&mut self, id: u64) -> Result<Polyline, StoreError> {
        self.ensure_ready()?;
        let capabilities = self.capabilities;
        let result = adapter::polyline_by_id(self.connection()?, capabilities, id);
        self.require_found(result, EntityKind::Polyline, id)
    }

    /// Point lookup of a group.
    pub fn group_by_id(&mut self, id: u64) -> Result<Group, StoreError> {
        self.ensure_ready()?;
        let result = adapter::group_by_id(self.connection()?, id);
        self.require_found(result, EntityKind::Group, id)
    }

    /// Streams the whole dataset.
    pub fn iterate_all(&mut self) -> Result<EntityStream<'_>, StoreError> {
        self.ensure_ready()?;
        self.run(planner::plan_all(), DatasetBounds::world(ORIGIN))
    }

    /// Streams everything inside a bounding box. With `complete_ways`, nodes
    /// referenced by a selected polyline but lying outside the box are
    /// pulled into the stream as well.
    pub fn iterate_bbox(
        &mut self,
        left: f64,
        right: f64,
        top: f64,
        bottom: f64,
        complete_ways: bool,
    ) -> Result<EntityStream<'_>, StoreError> {
        self.ensure_ready()?;
        let bbox = BoundingBox::new(left, right, top, bottom);
        let plan = planner::plan_bbox(&bbox, complete_ways, self.capabilities, self.tune())?;
        self.run(plan, DatasetBounds::new(left, right, top, bottom, ORIGIN))
    }

    /// Streams nodes matching `(boxes OR…) AND (tags OR…)`.
    pub fn iterate_selected_nodes(
        &mut self,
        boxes: &[BoundingBox],
        tags: &[TagSelector],
    ) -> Result<EntityStream<'_>, StoreError> {
        self.ensure_ready()?;
        let plan = planner::plan_selected_nodes(boxes, tags, self.tune())?;
        self.run(plan, selected_bounds(boxes))
    }

    /// Streams matching polylines together with every node they reference.
    pub fn iterate_selected_polylines(
        &mut self,
        boxes: &[BoundingBox],
        tags: &[TagSelector],
    ) -> Result<EntityStream<'_>, StoreError> {
        self.ensure_ready()?;
        let plan =
            planner::plan_selected_polylines(boxes, tags, self.capabilities, self.tune())?;
        self.run(plan, selected_bounds(boxes))
    }

    /// Streams matching groups, closed over their transitive parents.
    pub fn iterate_selected_groups(
        &mut self,
        boxes: &[BoundingBox],
        tags: &[TagSelector],
    ) -> Result<EntityStream<'_>, StoreError> {
        self.ensure_ready()?;
        let plan = planner::plan_selected_groups(boxes, tags, self.capabilities, self.tune())?;
        self.run(plan, selected_bounds(boxes))
    }

    /// Streams all three entity kinds for a selector expression.
    pub fn iterate_selected_all(
        &mut self,
        boxes: &[BoundingBox],
        tags: &[TagSelector],
    ) -> Result<EntityStream<'_>, StoreError> {
        self.ensure_ready()?;
        let plan = planner::plan_selected_all(boxes, tags, self.capabilities, self.tune())?;
        self.run(plan, selected_bounds(boxes))
    }

    /// Streams the nodes with the given ids.
    pub fn iterate_nodes_by_id(&mut self, ids: &[u64]) -> Result<EntityStream<'_>, StoreError> {
        self.ensure_ready()?;
        let plan = planner::plan_nodes_by_id(ids, self.tune())?;
        self.run(plan, DatasetBounds::world(ORIGIN))
    }

    /// Streams the polylines with the given ids plus the nodes they
    /// reference.
    pub fn iterate_polylines_by_id(
        &mut self,
        ids: &[u64],
    ) -> Result<EntityStream<'_>, StoreError> {
        self.ensure_ready()?;
        let plan = planner::plan_polylines_by_id(ids, self.tune())?;
        self.run(plan, DatasetBounds::world(ORIGIN))
    }

    /// Streams the groups with the given ids.
    pub fn iterate_groups_by_id(&mut self, ids: &[u64]) -> Result<EntityStream<'_>, StoreError> {
        self.ensure_ready()?;
        let plan = planner::plan_groups_by_id(ids, self.tune())?;
        self.run(plan, DatasetBounds::world(ORIGIN))
    }

    /// Commits the transaction. Further queries report a lifecycle
    /// violation; `complete` on an already-completed session is a no-op.
    pub fn complete(&mut self) -> Result<(), StoreError> {
        match self.phase {
            Phase::Idle | Phase::Completed => {
                self.phase = Phase::Completed;
                Ok(())
            }
            Phase::Ready => match self.connection()?.execute_batch("COMMIT") {
                Ok(()) => {
                    self.phase = Phase::Completed;
                    Ok(())
                }
                Err(source) => {
                    self.phase = Phase::Poisoned;
                    Err(StoreError::QueryFailed {
                        stage: "commit",
                        source,
                    })
                }
            },
            Phase::Poisoned => Err(lifecycle("session poisoned by an earlier failure")),
            Phase::Released => Err(lifecycle("session released")),
        }
    }

    /// Rolls back when not committed and returns the connection to the
    /// runtime. Idempotent; succeeds on a poisoned session.
    pub fn release(&mut self) {
        if let Some(conn) = self.conn.take() {
            if matches!(self.phase, Phase::Ready | Phase::Poisoned) {
                let _ = conn.execute_batch("ROLLBACK");
            }
        }
        self.phase = Phase::Released;
    }

    pub(crate) fn connection(&self) -> Result<&Connection, StoreError> {
        self.conn
            .as_ref()
            .ok_or_else(|| lifecycle("session released"))
    }

    pub(crate) fn capability_record(&self) -> Capabilities {
        self.capabilities
    }

    pub(crate) fn poison(&mut self) {
        self.phase = Phase::Poisoned;
    }

    fn tune(&self) -> bool {
        !self.config.scratch_on_disk
    }

    fn ensure_ready(&mut self) -> Result<(), StoreError> {
        match self.phase {
            Phase::Ready => return Ok(()),
            Phase::Idle => {}
            Phase::Completed => return Err(lifecycle("session already completed")),
            Phase::Poisoned => return Err(lifecycle("session poisoned by an earlier failure")),
            Phase::Released => return Err(lifecycle("session released")),
        }
        match self.initialize() {
            Ok(()) => {
                self.phase = Phase::Ready;
                Ok(())
            }
            Err(error) => {
                self.phase = Phase::Poisoned;
                Err(error)
            }
        }
    }

    fn initialize(&mut self) -> Result<(), StoreError> {
        let Some(conn) = self.conn.as_ref() else {
            return Err(lifecycle("session released"));
        };
        spatial::register(conn).map_err(|source| StoreError::Unavailable { source })?;
        if !self.config.skip_schema_validation {
            validate_schema(conn)?;
        }
        conn.execute_batch("BEGIN DEFERRED")
            .map_err(|source| StoreError::Unavailable { source })?;
        let capabilities = match self.config.capabilities {
            Some(capabilities) => capabilities,
            None => capability::probe(conn)?,
        };
        debug!("session ready; capabilities: {capabilities:?}");
        self.capabilities = capabilities;
        Ok(())
    }

    fn run(
        &mut self,
        plan: Plan,
        bounds: DatasetBounds,
    ) -> Result<EntityStream<'_>, StoreError> {
        let outcome = match self.connection() {
            Ok(conn) => executor::run(conn, self.capabilities, &plan.stages),
            Err(error) => Err(error),
        };
        if let Err(error) = outcome {
            self.abort();
            return Err(error);
        }
        Ok(EntityStream::new(self, plan.emit, plan.scratch, bounds))
    }

    fn require_found<T>(
        &mut self,
        result: Result<Option<T>, StoreError>,
        kind: EntityKind,
        id: u64,
    ) -> Result<T, StoreError> {
        match result {
            Ok(Some(record)) => Ok(record),
            Ok(None) => Err(StoreError::NotFound { kind, id }),
            Err(error) => {
                self.poison();
                Err(error)
            }
        }
    }

    /// Rolls back and poisons after a failed stage; no partial result
    /// escapes.
    fn abort(&mut self) {
        if let Some(conn) = self.conn.as_ref() {
            let _ = conn.execute_batch("ROLLBACK");
        }
        self.phase = Phase::Poisoned;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("phase", &self.phase)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

fn selected_bounds(boxes: &[BoundingBox]) -> DatasetBounds {
    boxes
        .first()
        .map(|bbox| DatasetBounds::new(bbox.left, bbox.right, bbox.top, bbox.bottom, ORIGIN))
        .unwrap_or_else(|| DatasetBounds::world(ORIGIN))
}

fn validate_schema(conn: &Connection) -> Result<(), StoreError> {
    let unavailable = |source| StoreError::Unavailable { source };
    let present: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'schema_info'",
            [],
            |row| row.get(0),
        )
        .map_err(unavailable)?;
    if present == 0 {
        return Err(StoreError::SchemaIncompatible {
            found: None,
            expected: SCHEMA_VERSION,
        });
    }
    let found: Option<i64> = conn
        .query_row("SELECT version FROM schema_info", [], |row| row.get(0))
        .optional()
        .map_err(unavailable)?;
    match found {
        Some(version) if version == SCHEMA_VERSION => Ok(()),
        other => Err(StoreError::SchemaIncompatible {
            found: other,
            expected: SCHEMA_VERSION,
        }),
    }
}

fn lifecycle(reason: &'static str) -> StoreError {
    StoreError::LifecycleViolation { reason }
}
