//! Lazy concatenation of the per-query cursors.
//!
//! Every stream yields the bounds marker, the last-update marker and then
//! one segment per requested entity kind in the fixed order nodes,
//! polylines, groups. A segment is opened only once the previous one is
//! exhausted; a store or decode failure yields a single `Err` item, ends the
//! stream and poisons the session.

use std::collections::VecDeque;
use std::fmt;

use mapslice_core::marker::LastUpdated;
use mapslice_core::{DatasetBounds, StreamItem};
use rusqlite::{Connection, OptionalExtension};

use crate::adapter::{EntityAdapter, GroupReader, NodeReader, PolylineReader};
use crate::error::StoreError;
use crate::planner::{EmitSet, SCRATCH_PREFIX};
use crate::session::Session;

enum Segment {
    Bounds(DatasetBounds),
    LastUpdated,
    Nodes,
    Polylines,
    Groups,
}

/// A single ordered stream over the result of one query.
///
/// The stream borrows its [`Session`] mutably, so the session cannot run
/// another query or be completed until the stream is dropped. Dropping the
/// stream closes it; an explicit [`EntityStream::close`] reads better at
/// call sites that abandon a stream early.
pub struct EntityStream<'session> {
    session: &'session mut Session,
    prefix: &'static str,
    segments: VecDeque<Segment>,
    current: std::vec::IntoIter<StreamItem>,
}

impl<'session> EntityStream<'session> {
    pub(crate) fn new(
        session: &'session mut Session,
        emit: EmitSet,
        scratch: bool,
        bounds: DatasetBounds,
    ) -> Self {
        let mut segments = VecDeque::new();
        segments.push_back(Segment::Bounds(bounds));
        segments.push_back(Segment::LastUpdated);
        if emit.nodes {
            segments.push_back(Segment::Nodes);
        }
        if emit.polylines {
            segments.push_back(Segment::Polylines);
        }
        if emit.groups {
            segments.push_back(Segment::Groups);
        }
        Self {
            session,
            prefix: if scratch { SCRATCH_PREFIX } else { "" },
            segments,
            current: Vec::new().into_iter(),
        }
    }

    /// Abandons the stream, releasing any opened cursor. Equivalent to
    /// dropping it; closing twice is impossible by construction.
    pub fn close(self) {}

    fn open_segment(&mut self, segment: Segment) -> Result<Vec<StreamItem>, StoreError> {
        let capabilities = self.session.capability_record();
        let conn = self.session.connection()?;
        match segment {
            Segment::Bounds(bounds) => Ok(vec![StreamItem::Bounds(bounds)]),
            Segment::LastUpdated => Ok(vec![StreamItem::LastUpdated(fetch_last_updated(conn))]),
            Segment::Nodes => Ok(NodeReader
                .open(conn, self.prefix)?
                .into_iter()
                .map(StreamItem::Node)
                .collect()),
            Segment::Polylines => Ok(PolylineReader::for_capabilities(capabilities)
                .open(conn, self.prefix)?
                .into_iter()
                .map(StreamItem::Polyline)
                .collect()),
            Segment::Groups => Ok(GroupReader
                .open(conn, self.prefix)?
                .into_iter()
                .map(StreamItem::Group)
                .collect()),
        }
    }
}

impl Iterator for EntityStream<'_> {
    type Item = Result<StreamItem, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.current.next() {
                return Some(Ok(item));
            }
            let segment = self.segments.pop_front()?;
            match self.open_segment(segment) {
                Ok(items) => self.current = items.into_iter(),
                Err(error) => {
                    self.segments.clear();
                    self.current = Vec::new().into_iter();
                    self.session.poison();
                    return Some(Err(error));
                }
            }
        }
    }
}

impl fmt::Debug for EntityStream<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityStream")
            .field("prefix", &self.prefix)
            .field("pending_segments", &self.segments.len())
            .finish_non_exhaustive()
    }
}

/// Reads the dataset's last-modification record; the zero instant when the
/// record is unavailable.
fn fetch_last_updated(conn: &Connection) -> LastUpdated {
    conn.query_row("SELECT last_update FROM dataset_state", [], |row| {
        row.get::<_, i64>(0)
    })
    .optional()
    .ok()
    .flatten()
    .map(LastUpdated::from_unix)
    .unwrap_or_else(LastUpdated::zero)
}
