//! Compact JSON geometry encoding shared by the store columns, the bound
//! polygon parameters and the registered spatial SQL functions.
//!
//! Shapes: point `[x, y]`, linestring `[[x, y], …]`, envelope
//! `{"min": [x, y], "max": [x, y]}`, polygon `{"ring": [[x, y], …]}`.

use geo::{BoundingRect, Coord, Intersects, LineString, Point, Polygon, Rect};
use serde_json::{json, Value};
use thiserror::Error;

/// Name of the envelope-overlap SQL function the store registers; selector
/// fragments reference it by this name.
pub const OVERLAP_FUNCTION: &str = "geom_overlaps";

/// A decoded stored geometry.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Point<f64>),
    Line(LineString<f64>),
    Envelope(Rect<f64>),
    Area(Polygon<f64>),
}

impl Geometry {
    /// The axis-aligned envelope, or `None` for an empty geometry.
    #[must_use]
    pub fn envelope(&self) -> Option<Rect<f64>> {
        match self {
            Self::Point(point) => {
                let coord = Coord {
                    x: point.x(),
                    y: point.y(),
                };
                Some(Rect::new(coord, coord))
            }
            Self::Line(line) => line.bounding_rect(),
            Self::Envelope(rect) => Some(*rect),
            Self::Area(area) => area.bounding_rect(),
        }
    }
}

/// Errors raised when decoding a stored geometry payload.
#[derive(Debug, Error)]
pub enum GeometryError {
    /// The payload was not valid JSON.
    #[error("geometry payload is not valid JSON")]
    Json(#[from] serde_json::Error),
    /// The payload parsed but matched none of the known shapes.
    #[error("geometry payload has an unrecognised shape")]
    UnrecognisedShape,
}

/// True when the envelopes of both geometries overlap; boundary contact
/// counts as overlap. Empty geometries overlap nothing.
#[must_use]
pub fn envelopes_overlap(a: &Geometry, b: &Geometry) -> bool {
    match (a.envelope(), b.envelope()) {
        (Some(a), Some(b)) => a.intersects(&b),
        _ => false,
    }
}

#[must_use]
pub fn encode_point(point: &Point<f64>) -> String {
    json!([point.x(), point.y()]).to_string()
}

#[must_use]
pub fn encode_line(line: &LineString<f64>) -> String {
    Value::Array(line.coords().map(pair).collect()).to_string()
}

#[must_use]
pub fn encode_envelope(rect: &Rect<f64>) -> String {
    json!({
        "min": [rect.min().x, rect.min().y],
        "max": [rect.max().x, rect.max().y],
    })
    .to_string()
}

#[must_use]
pub fn encode_area(area: &Polygon<f64>) -> String {
    json!({ "ring": area.exterior().coords().map(pair).collect::<Vec<_>>() }).to_string()
}

pub fn decode(text: &str) -> Result<Geometry, GeometryError> {
    let value: Value = serde_json::from_str(text)?;
    decode_value(&value).ok_or(GeometryError::UnrecognisedShape)
}

fn decode_value(value: &Value) -> Option<Geometry> {
    match value {
        Value::Array(_) => {
            if let Some(coord) = coord(value) {
                return Some(Geometry::Point(Point::from(coord)));
            }
            let coords: Vec<Coord<f64>> = value
                .as_array()?
                .iter()
                .map(coord)
                .collect::<Option<_>>()?;
            Some(Geometry::Line(LineString::from(coords)))
        }
        Value::Object(map) => {
            if let (Some(min), Some(max)) = (
                map.get("min").and_then(coord),
                map.get("max").and_then(coord),
            ) {
                return Some(Geometry::Envelope(Rect::new(min, max)));
            }
            let ring: Vec<Coord<f64>> = map
                .get("ring")?
                .as_array()?
                .iter()
                .map(coord)
                .collect::<Option<_>>()?;
            Some(Geometry::Area(Polygon::new(LineString::from(ring), Vec::new())))
        }
        _ => None,
    }
}

fn coord(value: &Value) -> Option<Coord<f64>> {
    let items = value.as_array()?;
    if items.len() != 2 {
        return None;
    }
    Some(Coord {
        x: items[0].as_f64()?,
        y: items[1].as_f64()?,
    })
}

fn pair(coord: &Coord<f64>) -> Value {
    json!([coord.x, coord.y])
}
