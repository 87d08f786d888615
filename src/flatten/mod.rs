//! Flattening - collapse nested schemas and records into flat column sets
//!
//! Nested property paths are joined with a fixed separator after being
//! inflected into warehouse-safe identifiers. The schema flattener is the
//! enforcement point for column-name collisions; the record flattener uses
//! the identical key computation so record columns always align with the
//! table built from the schema.

pub mod inflect;
pub mod record;
pub mod schema;

pub use inflect::{flatten_key, inflect_column_name, MAX_IDENTIFIER_LEN};
pub use record::flatten_record;
pub use schema::{flatten_schema, ColumnSpec};

/// Path-join separator used throughout flattening.
pub const SEPARATOR: &str = "__";

/// Hard guard on schema and record nesting depth. Traversal past this depth
/// aborts with [`TargetError::DepthExceeded`](crate::error::TargetError)
/// instead of recursing unboundedly on adversarial input.
pub const MAX_NESTING_DEPTH: usize = 64;
