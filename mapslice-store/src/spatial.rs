//! Spatial SQL functions registered on the store connection.
//!
//! `geom_overlaps(a, b)` is the envelope-overlap predicate used by every
//! bounding-box fragment; `make_line(geom)` aggregates point rows into an
//! encoded linestring for the on-the-fly geometry rebuild strategy. NULL
//! geometry arguments never match.

use geo::{Coord, LineString};
use mapslice_core::geom::{self, Geometry};
use rusqlite::functions::{Aggregate, Context, FunctionFlags};
use rusqlite::Connection;

pub(crate) fn register(conn: &Connection) -> rusqlite::Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;
    conn.create_scalar_function(geom::OVERLAP_FUNCTION, 2, flags, overlap)?;
    conn.create_aggregate_function("make_line", 1, flags, MakeLine)
}

fn overlap(ctx: &Context<'_>) -> rusqlite::Result<bool> {
    let Some(a) = decode_argument(ctx, 0)? else {
        return Ok(false);
    };
    let Some(b) = decode_argument(ctx, 1)? else {
        return Ok(false);
    };
    Ok(geom::envelopes_overlap(&a, &b))
}

fn decode_argument(ctx: &Context<'_>, index: usize) -> rusqlite::Result<Option<Geometry>> {
    match ctx.get::<Option<String>>(index)? {
        None => Ok(None),
        Some(text) => geom::decode(&text)
            .map(Some)
            .map_err(|error| rusqlite::Error::UserFunctionError(Box::new(error))),
    }
}

struct MakeLine;

impl Aggregate<Vec<Coord<f64>>, Option<String>> for MakeLine {
    fn init(&self, _: &mut Context<'_>) -> rusqlite::Result<Vec<Coord<f64>>> {
        Ok(Vec::new())
    }

    fn step(&self, ctx: &mut Context<'_>, coords: &mut Vec<Coord<f64>>) -> rusqlite::Result<()> {
        let Some(geometry) = decode_argument(ctx, 0)? else {
            return Ok(());
        };
        match geometry {
            Geometry::Point(point) => {
                coords.push(Coord {
                    x: point.x(),
                    y: point.y(),
                });
                Ok(())
            }
            _ => Err(rusqlite::Error::UserFunctionError(
                "make_line expects point geometries".into(),
            )),
        }
    }

    fn finalize(
        &self,
        _: &mut Context<'_>,
        coords: Option<Vec<Coord<f64>>>,
    ) -> rusqlite::Result<Option<String>> {
        Ok(coords.map(|coords| geom::encode_line(&LineString::from(coords))))
    }
}
