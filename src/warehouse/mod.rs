//! Warehouse collaborator - the capability boundary the load engine writes
//! through
//!
//! The core engine depends only on the [`Warehouse`] trait, never on a
//! concrete driver. All calls are synchronous and serialized by the
//! single-threaded dispatch of the engine, so implementations need no
//! internal locking. A failure from any method is fatal to the run and is
//! never retried by the caller.

pub mod duckdb;
pub mod memory;
pub mod sql;

use serde_json::Value;

use crate::error::WarehouseError;
use crate::table::TableDef;

pub use self::duckdb::DuckDbWarehouse;
pub use self::memory::MemoryWarehouse;

/// One serialized record: values in the owning table's column order, with
/// `Value::Null` for columns absent from the record.
pub type Row = Vec<Value>;

/// Capabilities the load engine needs from a warehouse.
pub trait Warehouse {
    fn schema_exists(&mut self, schema: &str) -> Result<bool, WarehouseError>;

    /// Create the schema if it does not exist yet.
    fn ensure_schema(&mut self, schema: &str) -> Result<(), WarehouseError>;

    fn table_exists(&mut self, table: &TableDef) -> Result<bool, WarehouseError>;

    fn create_table(&mut self, table: &TableDef) -> Result<(), WarehouseError>;

    /// Plain append: every row is inserted.
    fn execute_append(&mut self, table: &TableDef, rows: &[Row]) -> Result<(), WarehouseError>;

    /// Merge semantics: rows matching an existing row on `key_columns` are
    /// updated in place, the rest are inserted.
    fn execute_upsert(
        &mut self,
        table: &TableDef,
        rows: &[Row],
        key_columns: &[String],
    ) -> Result<(), WarehouseError>;

    fn drop_table(&mut self, table: &TableDef) -> Result<(), WarehouseError>;

    fn drop_schema(&mut self, database: &str, schema: &str) -> Result<(), WarehouseError>;
}
