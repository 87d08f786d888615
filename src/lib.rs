//! # Ingot - stream-to-warehouse loading engine
//!
//! Consumes a line-delimited message stream (schemas, records, checkpoints)
//! and materializes each logical stream as a table in a columnar SQL
//! warehouse, keeping structure and contents in sync as messages arrive.
//!
//! ## Modules
//!
//! - **flatten**: collapse nested schemas and records into flat, collision
//!   checked column sets
//! - **table**: map flattened descriptors to column types and build table
//!   definitions
//! - **loader**: per-stream buffering, flush thresholds, upsert-vs-append
//! - **engine**: the per-line protocol state machine
//! - **warehouse**: the collaborator trait plus the embedded DuckDB driver
//!   and an in-memory implementation for tests
//!
//! ## Quick Start
//!
//! ```rust
//! use std::io::Cursor;
//!
//! use ingot::{load_stream, MemoryWarehouse, TargetConfig, TargetEngine};
//!
//! # fn main() -> anyhow::Result<()> {
//! let input = concat!(
//!     r#"{"type": "SCHEMA", "stream": "users", "schema":"#,
//!     r#" {"properties": {"id": {"type": "integer"}, "name": {"type": "string"}}},"#,
//!     r#" "key_properties": ["id"]}"#,
//!     "\n",
//!     r#"{"type": "RECORD", "stream": "users", "record": {"id": 1, "name": "Alice"}}"#,
//!     "\n",
//! );
//!
//! let config = TargetConfig {
//!     timestamp_column: None,
//!     ..TargetConfig::default()
//! };
//! let mut engine = TargetEngine::new(config, MemoryWarehouse::new());
//! load_stream(Cursor::new(input), &mut engine)?;
//!
//! assert_eq!(engine.state()["users"], 1);
//! assert_eq!(engine.warehouse().rows("tap.users").unwrap().len(), 1);
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use std::io::BufRead;

pub mod config;
pub mod engine;
pub mod error;
pub mod flatten;
pub mod loader;
pub mod message;
pub mod table;
pub mod warehouse;

// Re-export commonly used types for convenience
pub use config::TargetConfig;
pub use engine::TargetEngine;
pub use error::{TargetError, WarehouseError};
pub use loader::StreamLoader;
pub use message::Message;
pub use table::{build_table, Column, ColumnType, TableDef};
pub use warehouse::{DuckDbWarehouse, MemoryWarehouse, Warehouse};

/// Main entry point: feed a message stream through the engine line by line,
/// then force a full flush so nothing stays buffered.
pub fn load_stream<R: BufRead, W: Warehouse>(
    reader: R,
    engine: &mut TargetEngine<W>,
) -> Result<()> {
    for line in reader.lines() {
        let line = line.context("failed to read input line")?;
        engine.process_line(&line)?;
    }

    engine.flush_all_cached_records()?;
    Ok(())
}
