//! Facade crate for the mapslice extraction engine.
//!
//! Re-exports the domain model from `mapslice-core` and the query pipeline
//! from `mapslice-store`. Most callers only need [`Session`] and the selector
//! types.

#![forbid(unsafe_code)]

pub use mapslice_core::{
    BoundingBox, DatasetBounds, EntityKind, GeometryTarget, Group, LastUpdated, Member, Node,
    Polyline, SelectorError, StreamItem, TagSelector, Tags,
};
pub use mapslice_store::{
    Capabilities, DecodeError, EntityAdapter, EntityStream, GroupReader, NodeReader,
    PolylineReader, Session, SessionConfig, StoreError, SCHEMA_VERSION,
};
