//! Error taxonomy for the load engine.
//!
//! Every error here is fatal to the run: the engine never retries or
//! silently recovers, preferring a loud abort over a partially-loaded or
//! mis-typed table. Buffers flushed before the failure stay committed.

use thiserror::Error;

/// Errors raised while processing a message stream.
#[derive(Debug, Error)]
pub enum TargetError {
    /// The input line was not a well-formed protocol message.
    #[error("unable to parse message line ({reason}): {line}")]
    Parse { reason: String, line: String },

    /// A RECORD arrived for a stream with no prior SCHEMA.
    #[error("a record for stream {stream} was encountered before a corresponding schema")]
    RecordBeforeSchema { stream: String },

    /// The record payload was not a JSON object.
    #[error("record for stream {stream} is not a JSON object")]
    RecordNotObject { stream: String },

    /// A record lacked one of the stream's declared key properties.
    #[error("record for stream {stream} is missing key property {property}")]
    MissingKeyProperty { stream: String, property: String },

    /// A record lacked a property the schema marks as required.
    #[error("'{property}' is a required property for stream {stream}")]
    MissingRequiredProperty { stream: String, property: String },

    /// A SCHEMA message carried no top-level `properties` mapping. A
    /// relational target needs at least one column to materialize a table.
    #[error("schema for stream {stream} has no top-level properties")]
    EmptySchema { stream: String },

    /// Two distinct source paths flattened to the same column name.
    #[error("duplicate column name produced in schema: {column}")]
    DuplicateColumn { column: String },

    /// Nesting deeper than the traversal guard allows.
    #[error("nesting depth exceeds {limit} levels at {path}")]
    DepthExceeded { limit: usize, path: String },

    /// A record arrived for a stream whose loader was already closed by the
    /// end-of-run flush.
    #[error("stream {stream} received a record after its loader was closed")]
    StreamClosed { stream: String },

    /// A DDL or write call failed in the warehouse collaborator.
    #[error("warehouse operation failed for stream {stream}: {source}")]
    Warehouse {
        stream: String,
        #[source]
        source: WarehouseError,
    },
}

/// Errors surfaced by a [`Warehouse`](crate::warehouse::Warehouse)
/// implementation. Never retried; the loader wraps them with stream context
/// and aborts the run.
#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error(transparent)]
    DuckDb(#[from] duckdb::Error),

    #[error("{0}")]
    Message(String),
}
