//! Core domain types for the mapslice extraction engine.
//!
//! Defines the three map entity kinds (nodes, polylines and groups), the
//! envelope markers emitted at the head of every result stream, and the
//! selector algebra that turns declarative filters into SQL predicate
//! fragments with positionally bound parameters.

#![forbid(unsafe_code)]

pub mod entity;
pub mod geom;
pub mod item;
pub mod marker;
pub mod selector;

pub use entity::{EntityKind, Group, Member, Node, Polyline, Tags};
pub use item::StreamItem;
pub use marker::{DatasetBounds, LastUpdated};
pub use selector::{
    bbox_clause, tag_clause, BoundingBox, Clause, GeometryTarget, ParamValue, SelectorError,
    TagSelector,
};
