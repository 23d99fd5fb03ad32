//! Error types for the query pipeline.

use mapslice_core::geom::GeometryError;
use mapslice_core::{EntityKind, SelectorError};
use thiserror::Error;

/// Errors raised by sessions, plans and streams.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A selector was malformed; raised before any store interaction, the
    /// session stays usable.
    #[error("invalid selector")]
    InvalidSelector {
        #[from]
        source: SelectorError,
    },
    /// The dataset's schema version does not match this implementation.
    /// Raised at session initialization, before any transaction is opened.
    #[error("schema version {found:?} is not supported (expected {expected})")]
    SchemaIncompatible { found: Option<i64>, expected: i64 },
    /// The store connection could not be opened or prepared.
    #[error("store unavailable")]
    Unavailable {
        #[source]
        source: rusqlite::Error,
    },
    /// A plan stage failed; the transaction is rolled back and no partial
    /// result is returned.
    #[error("query stage `{stage}` failed")]
    QueryFailed {
        stage: &'static str,
        #[source]
        source: rusqlite::Error,
    },
    /// The store failed mid-iteration; the stream is closed and the caller
    /// must release the session.
    #[error("cursor failed while reading {kind} records")]
    CursorBroken {
        kind: EntityKind,
        #[source]
        source: rusqlite::Error,
    },
    /// A stored record could not be decoded into its domain type.
    #[error("failed to decode {kind} {id}")]
    Decode {
        kind: EntityKind,
        id: u64,
        #[source]
        source: DecodeError,
    },
    /// The session was used outside its lifecycle (after a fatal error,
    /// after `complete`, or after `release`).
    #[error("session lifecycle violation: {reason}")]
    LifecycleViolation { reason: &'static str },
    /// A point lookup matched no record.
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: u64 },
    /// An id cannot be represented in the store's signed integer range.
    #[error("id {id} exceeds the store's integer range")]
    IdOutOfRange { id: u64 },
}

/// Payload-level causes of a [`StoreError::Decode`].
#[derive(Debug, Error)]
pub enum DecodeError {
    /// A JSON column (tags, packed node ids) failed to parse.
    #[error("invalid JSON payload")]
    Json(#[from] serde_json::Error),
    /// A geometry column failed to parse or had the wrong shape.
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    /// A member row carried an unknown kind code.
    #[error("unknown member kind code `{code}`")]
    MemberKind { code: String },
}
