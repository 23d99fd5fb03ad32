//! The single item type yielded by result streams.

use crate::entity::{EntityKind, Group, Node, Polyline};
use crate::marker::{DatasetBounds, LastUpdated};

/// One record of a result stream.
///
/// Every stream starts with exactly one [`StreamItem::Bounds`] followed by
/// exactly one [`StreamItem::LastUpdated`]; entities follow grouped by kind
/// in the order node, polyline, group, ascending by id within each kind.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Bounds(DatasetBounds),
    LastUpdated(LastUpdated),
    Node(Node),
    Polyline(Polyline),
    Group(Group),
}

impl StreamItem {
    /// The entity kind, or `None` for the head markers.
    #[must_use]
    pub fn kind(&self) -> Option<EntityKind> {
        match self {
            Self::Node(_) => Some(EntityKind::Node),
            Self::Polyline(_) => Some(EntityKind::Polyline),
            Self::Group(_) => Some(EntityKind::Group),
            Self::Bounds(_) | Self::LastUpdated(_) => None,
        }
    }

    /// The entity id, or `None` for the head markers.
    #[must_use]
    pub fn id(&self) -> Option<u64> {
        match self {
            Self::Node(node) => Some(node.id),
            Self::Polyline(polyline) => Some(polyline.id),
            Self::Group(group) => Some(group.id),
            Self::Bounds(_) | Self::LastUpdated(_) => None,
        }
    }

    #[must_use]
    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Self::Node(node) => Some(node),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_polyline(&self) -> Option<&Polyline> {
        match self {
            Self::Polyline(polyline) => Some(polyline),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Self::Group(group) => Some(group),
            _ => None,
        }
    }
}
