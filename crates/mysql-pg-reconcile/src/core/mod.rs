//! Core abstractions for store-agnostic reconciliation.
//!
//! - [`schema`]: declarative table and column descriptions
//! - [`value`]: scalar values, rows and primary keys
//! - [`traits`]: the [`Store`] and [`Dialect`] seams implemented by drivers
//! - [`identifier`]: identifier validation and quoting
//!
//! The reconciliation components ([`crate::diff`], [`crate::replicate`],
//! [`crate::verify`]) only depend on this module, never on a concrete driver.

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{ColumnKind, ColumnSpec, IdentifierCase, TableSpec};
pub use traits::{Dialect, QueryOutput, Store};
pub use value::{KeySet, KeyValue, Row, Value};
