//! Query planning and execution against a spatially indexed map dataset.
//!
//! A [`Session`] owns one store connection and one transaction. Its typed
//! query entry points translate selector expressions into staged scratch-set
//! materializations and hand back a single lazy [`EntityStream`] that yields
//! a bounds marker, a last-update marker and the selected entities grouped
//! by kind in ascending id order.
//!
//! ```no_run
//! use mapslice_core::TagSelector;
//! use mapslice_store::Session;
//!
//! # fn main() -> Result<(), mapslice_store::StoreError> {
//! let mut session = Session::open("dataset.db")?;
//! let cafes = [TagSelector::equals("amenity", "cafe")];
//! for item in session.iterate_selected_nodes(&[], &cafes)? {
//!     println!("{:?}", item?);
//! }
//! session.complete()?;
//! session.release();
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

mod adapter;
mod capability;
mod error;
mod executor;
mod planner;
mod session;
mod spatial;
mod stream;
pub mod test_support;

pub use adapter::{EntityAdapter, GroupReader, NodeReader, PolylineReader};
pub use capability::Capabilities;
pub use error::{DecodeError, StoreError};
pub use session::{Session, SessionConfig, SCHEMA_VERSION};
pub use stream::EntityStream;
