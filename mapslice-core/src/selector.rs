//! Selector algebra.
//!
//! Selectors emit SQL predicate fragments with positional `?` placeholders
//! plus the ordered parameter values that bind them. A list of selectors
//! composes with OR and degenerates to the tautology `(1=1)` when empty; a
//! bounding-box clause and a tag clause compose with AND. Which geometry
//! column a box addresses is chosen structurally through
//! [`GeometryTarget`] — selectors never know which table they will be
//! applied to.

use geo::{Coord, LineString, Polygon, Rect};
use thiserror::Error;

use crate::geom;

/// A value bound to one positional placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Float(f64),
    Int(i64),
    Text(String),
}

/// Errors raised when a selector is malformed.
#[derive(Debug, Error, PartialEq)]
pub enum SelectorError {
    /// The box does not describe a positive area.
    #[error(
        "degenerate bounding box: left {left} must be < right {right} \
         and bottom {bottom} must be < top {top}"
    )]
    DegenerateBox {
        left: f64,
        right: f64,
        bottom: f64,
        top: f64,
    },
    /// A comparison selector carried an operator outside the supported set.
    #[error("unsupported comparison operator `{op}`")]
    UnsupportedOperator { op: String },
}

/// The geometry column a bounding-box predicate addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryTarget {
    /// The point geometry of the node table.
    NodePoint,
    /// The cached linestring geometry of the polyline table.
    PolylineLine,
}

impl GeometryTarget {
    #[must_use]
    pub fn column(&self) -> &'static str {
        match self {
            Self::NodePoint => "geom",
            Self::PolylineLine => "linestring",
        }
    }
}

/// A geographic bounding box in unprojected WGS84 degrees.
///
/// Construction never fails; [`BoundingBox::validate`] is applied by the
/// planner before any store interaction so that a malformed box surfaces as
/// an error while the session stays usable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub left: f64,
    pub right: f64,
    pub bottom: f64,
    pub top: f64,
}

impl BoundingBox {
    #[must_use]
    pub fn new(left: f64, right: f64, top: f64, bottom: f64) -> Self {
        Self {
            left,
            right,
            bottom,
            top,
        }
    }

    /// Rejects boxes without a positive area.
    pub fn validate(&self) -> Result<(), SelectorError> {
        if self.left >= self.right || self.bottom >= self.top {
            return Err(SelectorError::DegenerateBox {
                left: self.left,
                right: self.right,
                bottom: self.bottom,
                top: self.top,
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn rect(&self) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.left,
                y: self.bottom,
            },
            Coord {
                x: self.right,
                y: self.top,
            },
        )
    }

    /// The box as a closed five-point ring.
    #[must_use]
    pub fn area(&self) -> Polygon<f64> {
        let ring = LineString::from(vec![
            Coord {
                x: self.left,
                y: self.bottom,
            },
            Coord {
                x: self.left,
                y: self.top,
            },
            Coord {
                x: self.right,
                y: self.top,
            },
            Coord {
                x: self.right,
                y: self.bottom,
            },
            Coord {
                x: self.left,
                y: self.bottom,
            },
        ]);
        Polygon::new(ring, Vec::new())
    }

    /// Predicate fragment against an arbitrary geometry column expression.
    #[must_use]
    pub fn overlap_fragment(column: &str) -> String {
        format!("({}({column}, ?))", geom::OVERLAP_FUNCTION)
    }

    /// Predicate fragment against the chosen geometry target.
    #[must_use]
    pub fn fragment(&self, target: GeometryTarget) -> String {
        Self::overlap_fragment(target.column())
    }

    /// The single bound parameter: the box ring as an encoded polygon.
    #[must_use]
    pub fn param(&self) -> ParamValue {
        ParamValue::Text(geom::encode_area(&self.area()))
    }
}

/// An attribute predicate over the entity tag map.
#[derive(Debug, Clone, PartialEq)]
pub enum TagSelector {
    /// The tag `key` is present with exactly `value`.
    Equals { key: String, value: String },
    /// The tag `key` is present with any value.
    Exists { key: String },
    /// The tag `key` is present and compares numerically against `value`.
    /// Supported operators: `<`, `<=`, `>`, `>=`, `=`, `!=`, `<>`.
    Compare {
        key: String,
        op: String,
        value: f64,
    },
    /// Free-form disjunction of nested selectors.
    AnyOf(Vec<TagSelector>),
}

impl TagSelector {
    #[must_use]
    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Equals {
            key: key.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn exists(key: impl Into<String>) -> Self {
        Self::Exists { key: key.into() }
    }

    #[must_use]
    pub fn compare(key: impl Into<String>, op: impl Into<String>, value: f64) -> Self {
        Self::Compare {
            key: key.into(),
            op: op.into(),
            value,
        }
    }

    #[must_use]
    pub fn any_of(selectors: Vec<TagSelector>) -> Self {
        Self::AnyOf(selectors)
    }

    /// Predicate fragment over the JSON `tags` column.
    pub fn fragment(&self) -> Result<String, SelectorError> {
        match self {
            Self::Equals { .. } => Ok(
                "(EXISTS (SELECT 1 FROM json_each(tags) WHERE key = ? AND value = ?))".to_string(),
            ),
            Self::Exists { .. } => {
                Ok("(EXISTS (SELECT 1 FROM json_each(tags) WHERE key = ?))".to_string())
            }
            Self::Compare { op, .. } => {
                let op = comparison_operator(op)?;
                Ok(format!(
                    "(EXISTS (SELECT 1 FROM json_each(tags) \
                     WHERE key = ? AND CAST(value AS REAL) {op} ?))"
                ))
            }
            Self::AnyOf(selectors) => {
                if selectors.is_empty() {
                    return Ok(TAUTOLOGY.to_string());
                }
                let fragments = selectors
                    .iter()
                    .map(TagSelector::fragment)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!("({})", fragments.join(" OR ")))
            }
        }
    }

    /// Parameter values, in fragment placeholder order.
    #[must_use]
    pub fn params(&self) -> Vec<ParamValue> {
        match self {
            Self::Equals { key, value } => vec![
                ParamValue::Text(key.clone()),
                ParamValue::Text(value.clone()),
            ],
            Self::Exists { key } => vec![ParamValue::Text(key.clone())],
            Self::Compare { key, value, .. } => {
                vec![ParamValue::Text(key.clone()), ParamValue::Float(*value)]
            }
            Self::AnyOf(selectors) => selectors.iter().flat_map(TagSelector::params).collect(),
        }
    }
}

const TAUTOLOGY: &str = "(1=1)";

fn comparison_operator(op: &str) -> Result<&'static str, SelectorError> {
    match op {
        "<" => Ok("<"),
        "<=" => Ok("<="),
        ">" => Ok(">"),
        ">=" => Ok(">="),
        "=" => Ok("="),
        "!=" => Ok("!="),
        "<>" => Ok("<>"),
        other => Err(SelectorError::UnsupportedOperator {
            op: other.to_string(),
        }),
    }
}

/// A rendered predicate with its ordered parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub sql: String,
    pub params: Vec<ParamValue>,
}

impl Clause {
    /// The `(1=1)` degenerate clause; the store's planner optimises it away.
    #[must_use]
    pub fn tautology() -> Self {
        Self {
            sql: TAUTOLOGY.to_string(),
            params: Vec::new(),
        }
    }

    /// Conjunction of two clauses; parameters keep their textual order.
    #[must_use]
    pub fn and(self, other: Clause) -> Clause {
        let mut params = self.params;
        params.extend(other.params);
        Clause {
            sql: format!("({}) AND ({})", self.sql, other.sql),
            params,
        }
    }
}

/// OR-joins a list of bounding boxes against the chosen geometry target,
/// validating each box.
pub fn bbox_clause(
    boxes: &[BoundingBox],
    target: GeometryTarget,
) -> Result<Clause, SelectorError> {
    if boxes.is_empty() {
        return Ok(Clause::tautology());
    }
    let mut fragments = Vec::with_capacity(boxes.len());
    let mut params = Vec::with_capacity(boxes.len());
    for selector in boxes {
        selector.validate()?;
        fragments.push(selector.fragment(target));
        params.push(selector.param());
    }
    Ok(Clause {
        sql: format!("({})", fragments.join(" OR ")),
        params,
    })
}

/// OR-joins a list of tag selectors.
pub fn tag_clause(selectors: &[TagSelector]) -> Result<Clause, SelectorError> {
    if selectors.is_empty() {
        return Ok(Clause::tautology());
    }
    let mut fragments = Vec::with_capacity(selectors.len());
    let mut params = Vec::new();
    for selector in selectors {
        fragments.push(selector.fragment()?);
        params.extend(selector.params());
    }
    Ok(Clause {
        sql: format!("({})", fragments.join(" OR ")),
        params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn box_targets_the_chosen_geometry_column() {
        let selector = BoundingBox::new(-1.0, 1.0, 1.0, -1.0);
        assert_eq!(
            selector.fragment(GeometryTarget::NodePoint),
            "(geom_overlaps(geom, ?))"
        );
        assert_eq!(
            selector.fragment(GeometryTarget::PolylineLine),
            "(geom_overlaps(linestring, ?))"
        );
    }

    #[rstest]
    fn box_parameter_is_a_closed_ring() {
        let selector = BoundingBox::new(0.0, 2.0, 1.0, 0.0);
        let ParamValue::Text(encoded) = selector.param() else {
            panic!("expected a text parameter");
        };
        let area = geom::decode(&encoded).expect("decode ring");
        assert_eq!(area.envelope(), Some(selector.rect()));
    }

    #[rstest]
    #[case(BoundingBox::new(1.0, 1.0, 1.0, -1.0))] // zero width
    #[case(BoundingBox::new(2.0, 1.0, 1.0, -1.0))] // inverted horizontally
    #[case(BoundingBox::new(-1.0, 1.0, -1.0, 1.0))] // inverted vertically
    fn degenerate_boxes_are_rejected(#[case] selector: BoundingBox) {
        assert!(matches!(
            selector.validate(),
            Err(SelectorError::DegenerateBox { .. })
        ));
    }

    #[rstest]
    fn equals_selector_binds_key_then_value() {
        let selector = TagSelector::equals("amenity", "cafe");
        assert_eq!(
            selector.fragment().expect("fragment"),
            "(EXISTS (SELECT 1 FROM json_each(tags) WHERE key = ? AND value = ?))"
        );
        assert_eq!(
            selector.params(),
            vec![
                ParamValue::Text("amenity".into()),
                ParamValue::Text("cafe".into())
            ]
        );
    }

    #[rstest]
    #[case("<")]
    #[case("<=")]
    #[case(">")]
    #[case(">=")]
    #[case("=")]
    #[case("!=")]
    #[case("<>")]
    fn comparison_operators_are_accepted(#[case] op: &str) {
        let selector = TagSelector::compare("population", op, 1000.0);
        assert!(selector.fragment().is_ok());
    }

    #[rstest]
    fn malformed_operator_is_rejected() {
        let selector = TagSelector::compare("population", "~", 1000.0);
        assert_eq!(
            selector.fragment(),
            Err(SelectorError::UnsupportedOperator { op: "~".into() })
        );
    }

    #[rstest]
    fn selector_lists_compose_with_or() {
        let clause = tag_clause(&[
            TagSelector::exists("highway"),
            TagSelector::equals("amenity", "cafe"),
        ])
        .expect("clause");
        assert!(clause.sql.contains(" OR "));
        assert_eq!(clause.params.len(), 3);
    }

    #[rstest]
    fn empty_lists_degenerate_to_the_tautology() {
        assert_eq!(
            tag_clause(&[]).expect("clause"),
            Clause::tautology()
        );
        assert_eq!(
            bbox_clause(&[], GeometryTarget::NodePoint).expect("clause"),
            Clause::tautology()
        );
    }

    #[rstest]
    fn clauses_conjoin_preserving_parameter_order() {
        let boxes = [BoundingBox::new(-1.0, 1.0, 1.0, -1.0)];
        let tags = [TagSelector::exists("name")];
        let clause = bbox_clause(&boxes, GeometryTarget::NodePoint)
            .expect("boxes")
            .and(tag_clause(&tags).expect("tags"));
        assert!(clause.sql.starts_with("(("));
        assert!(clause.sql.contains(") AND ("));
        assert!(matches!(clause.params[0], ParamValue::Text(_)));
        assert_eq!(clause.params.len(), 2);
        assert_eq!(clause.params[1], ParamValue::Text("name".into()));
    }

    #[rstest]
    fn nested_disjunction_flattens_parameters() {
        let selector = TagSelector::any_of(vec![
            TagSelector::equals("amenity", "cafe"),
            TagSelector::compare("population", ">", 10.0),
        ]);
        let fragment = selector.fragment().expect("fragment");
        assert!(fragment.contains(" OR "));
        assert_eq!(selector.params().len(), 4);
    }

    #[rstest]
    fn empty_disjunction_is_the_tautology() {
        assert_eq!(
            TagSelector::any_of(Vec::new()).fragment().expect("fragment"),
            "(1=1)"
        );
    }
}
