//! Map entities.
//!
//! The three entity kinds reference one another: polylines order node ids,
//! groups order typed member references (which may point at other groups).
//! Coordinates are WGS84 (`x = longitude`, `y = latitude`) in degrees.

use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;

use geo::{Coord, LineString, Rect};

/// Map of attribute key/value pairs (OpenStreetMap-style tags).
pub type Tags = HashMap<String, String>;

/// The entity kinds a stream can carry, in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Node,
    Polyline,
    Group,
}

impl EntityKind {
    /// Single-letter storage code used by the member table.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Node => "N",
            Self::Polyline => "W",
            Self::Group => "R",
        }
    }

    /// Inverse of [`EntityKind::code`].
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "N" => Some(Self::Node),
            "W" => Some(Self::Polyline),
            "R" => Some(Self::Group),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Node => "node",
            Self::Polyline => "polyline",
            Self::Group => "group",
        };
        f.write_str(name)
    }
}

/// A point entity with coordinates and attributes.
///
/// # Examples
/// ```rust
/// use geo::Coord;
/// use mapslice_core::{Node, Tags};
///
/// let node = Node::new(1, Coord { x: 144.95, y: -37.81 })
///     .with_tags(Tags::from([("amenity".into(), "cafe".into())]));
/// assert_eq!(node.tags.get("amenity"), Some(&"cafe".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Unique identifier.
    pub id: u64,
    /// Edit version.
    pub version: u32,
    /// Time of the last edit.
    pub timestamp: SystemTime,
    /// Author identifier.
    pub user_id: i64,
    /// Changeset that produced the current version.
    pub changeset_id: i64,
    /// Free-form attributes.
    pub tags: Tags,
    /// Geographic location (WGS84; `x = longitude`, `y = latitude`).
    pub location: Coord<f64>,
}

impl Node {
    /// Creates a node with default edit metadata and no tags.
    #[must_use]
    pub fn new(id: u64, location: Coord<f64>) -> Self {
        Self {
            id,
            version: 1,
            timestamp: SystemTime::UNIX_EPOCH,
            user_id: 0,
            changeset_id: 0,
            tags: Tags::new(),
            location,
        }
    }

    /// Replaces the tag map.
    #[must_use]
    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    /// Replaces the edit timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// An ordered sequence of node references forming a (possibly closed) path.
///
/// The cached `linestring` and `bbox` geometries mirror the optional store
/// columns of the same names; they are populated when the backing dataset
/// carries them.
#[derive(Debug, Clone, PartialEq)]
pub struct Polyline {
    /// Unique identifier.
    pub id: u64,
    /// Edit version.
    pub version: u32,
    /// Time of the last edit.
    pub timestamp: SystemTime,
    /// Author identifier.
    pub user_id: i64,
    /// Changeset that produced the current version.
    pub changeset_id: i64,
    /// Free-form attributes.
    pub tags: Tags,
    /// Referenced node ids in path order.
    pub nodes: Vec<u64>,
    /// Cached full geometry, when the dataset carries one.
    pub linestring: Option<LineString<f64>>,
    /// Cached bounding rectangle, when the dataset carries one.
    pub bbox: Option<Rect<f64>>,
}

impl Polyline {
    /// Creates a polyline with default edit metadata, no tags and no cached
    /// geometry.
    #[must_use]
    pub fn new(id: u64, nodes: Vec<u64>) -> Self {
        Self {
            id,
            version: 1,
            timestamp: SystemTime::UNIX_EPOCH,
            user_id: 0,
            changeset_id: 0,
            tags: Tags::new(),
            nodes,
            linestring: None,
            bbox: None,
        }
    }

    /// Replaces the tag map.
    #[must_use]
    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }
}

/// One typed member reference of a [`Group`].
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    /// Kind of the referent.
    pub kind: EntityKind,
    /// Identifier of the referent.
    pub member_id: u64,
    /// Role the referent plays within the group.
    pub role: String,
}

impl Member {
    #[must_use]
    pub fn new(kind: EntityKind, member_id: u64, role: impl Into<String>) -> Self {
        Self {
            kind,
            member_id,
            role: role.into(),
        }
    }
}

/// An ordered collection of typed member references with per-member roles.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    /// Unique identifier.
    pub id: u64,
    /// Edit version.
    pub version: u32,
    /// Time of the last edit.
    pub timestamp: SystemTime,
    /// Author identifier.
    pub user_id: i64,
    /// Changeset that produced the current version.
    pub changeset_id: i64,
    /// Free-form attributes.
    pub tags: Tags,
    /// Member references in sequence order.
    pub members: Vec<Member>,
}

impl Group {
    /// Creates a group with default edit metadata and no tags.
    #[must_use]
    pub fn new(id: u64, members: Vec<Member>) -> Self {
        Self {
            id,
            version: 1,
            timestamp: SystemTime::UNIX_EPOCH,
            user_id: 0,
            changeset_id: 0,
            tags: Tags::new(),
            members,
        }
    }

    /// Replaces the tag map.
    #[must_use]
    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(EntityKind::Node, "N")]
    #[case(EntityKind::Polyline, "W")]
    #[case(EntityKind::Group, "R")]
    fn kind_codes_round_trip(#[case] kind: EntityKind, #[case] code: &str) {
        assert_eq!(kind.code(), code);
        assert_eq!(EntityKind::from_code(code), Some(kind));
    }

    #[rstest]
    fn unknown_member_code_is_rejected() {
        assert_eq!(EntityKind::from_code("X"), None);
    }

    #[rstest]
    fn group_preserves_member_order() {
        let group = Group::new(
            9,
            vec![
                Member::new(EntityKind::Polyline, 4, "outer"),
                Member::new(EntityKind::Node, 2, ""),
            ],
        );
        assert_eq!(group.members[0].member_id, 4);
        assert_eq!(group.members[1].kind, EntityKind::Node);
    }
}
