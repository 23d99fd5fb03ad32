//! Envelope markers emitted at the head of every result stream.

use std::time::{Duration, SystemTime};

/// The rectangle a stream was selected from, plus an informational origin tag
/// identifying the producing implementation.
///
/// Streams that were not selected from a box of their own (full iteration,
/// by-id lookups, selector queries without a bounding box) carry the
/// whole-world rectangle.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetBounds {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
    /// Free-text producer tag.
    pub origin: String,
}

impl DatasetBounds {
    #[must_use]
    pub fn new(left: f64, right: f64, top: f64, bottom: f64, origin: impl Into<String>) -> Self {
        Self {
            left,
            right,
            top,
            bottom,
            origin: origin.into(),
        }
    }

    /// The whole-world rectangle.
    #[must_use]
    pub fn world(origin: impl Into<String>) -> Self {
        Self::new(-180.0, 180.0, 90.0, -90.0, origin)
    }
}

/// The dataset's last-modification instant.
///
/// Exactly one of these follows the bounds marker in every stream. When the
/// dataset does not record a last modification the marker carries the zero
/// instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastUpdated {
    pub timestamp: SystemTime,
}

impl LastUpdated {
    /// The zero instant (`UNIX_EPOCH`).
    #[must_use]
    pub fn zero() -> Self {
        Self {
            timestamp: SystemTime::UNIX_EPOCH,
        }
    }

    #[must_use]
    pub fn from_unix(seconds: i64) -> Self {
        Self {
            timestamp: timestamp_from_unix(seconds),
        }
    }
}

/// Converts store-side Unix seconds into a [`SystemTime`]. Instants before
/// the epoch clamp to the epoch.
#[must_use]
pub fn timestamp_from_unix(seconds: i64) -> SystemTime {
    match u64::try_from(seconds) {
        Ok(seconds) => SystemTime::UNIX_EPOCH + Duration::from_secs(seconds),
        Err(_) => SystemTime::UNIX_EPOCH,
    }
}

/// Converts a [`SystemTime`] into store-side Unix seconds. Instants before
/// the epoch clamp to zero.
#[must_use]
pub fn timestamp_to_unix(timestamp: SystemTime) -> i64 {
    timestamp
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
