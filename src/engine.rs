//! The ingestion engine: per-line protocol state machine that validates and
//! routes messages to stream loaders.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::config::TargetConfig;
use crate::error::TargetError;
use crate::flatten::{flatten_record, SEPARATOR};
use crate::loader::StreamLoader;
use crate::message::Message;
use crate::table::{build_table, inflect_key_properties};
use crate::warehouse::Warehouse;

/// Everything the engine tracks for one registered stream.
struct StreamState {
    loader: StreamLoader,
    schema: Value,
    key_properties: Vec<String>,
    records_seen: u64,
}

/// Processes the message stream line by line, dispatching to per-stream
/// loaders.
///
/// The engine exclusively owns the loader registry and the warehouse
/// collaborator; dispatch is synchronous and strictly in arrival order, so
/// no two loaders are ever mutated concurrently and warehouse writes are
/// serialized without locks. There is no timeout or cancellation layer: a
/// stalled warehouse call stalls the run, bounded only by the buffer
/// thresholds.
pub struct TargetEngine<W: Warehouse> {
    config: TargetConfig,
    warehouse: W,
    streams: HashMap<String, StreamState>,
    bookmarks: Map<String, Value>,
}

impl<W: Warehouse> TargetEngine<W> {
    pub fn new(config: TargetConfig, warehouse: W) -> Self {
        TargetEngine {
            config,
            warehouse,
            streams: HashMap::new(),
            bookmarks: Map::new(),
        }
    }

    /// Process one line of input. Empty lines are skipped.
    pub fn process_line(&mut self, line: &str) -> Result<(), TargetError> {
        if line.trim().is_empty() {
            return Ok(());
        }
        let message = Message::parse(line)?;
        self.process_message(message)
    }

    /// Dispatch one parsed message, then flush any buffer whose idle TTL
    /// has expired.
    pub fn process_message(&mut self, message: Message) -> Result<(), TargetError> {
        match message {
            Message::Schema {
                stream,
                schema,
                key_properties,
            } => self.handle_schema(stream, schema, key_properties)?,
            Message::Record { stream, record } => self.handle_record(stream, record)?,
            Message::State { value } => self.handle_state(value),
            Message::ActivateVersion { stream, version } => {
                // Reserved for version-cutover semantics.
                warn!(%stream, ?version, "ACTIVATE_VERSION message is not supported yet");
            }
        }

        self.flush_expired_buffers()
    }

    fn handle_schema(
        &mut self,
        stream: String,
        schema: Value,
        key_properties: Vec<String>,
    ) -> Result<(), TargetError> {
        if schema.get("properties").is_none() {
            return Err(TargetError::EmptySchema { stream });
        }

        // A re-declared schema may be incompatible with what is buffered, so
        // anything cached under the old definition is flushed first and the
        // table definition is re-derived from scratch.
        let records_seen = match self.streams.get_mut(&stream) {
            Some(existing) => {
                info!(%stream, "schema re-declared, flushing buffered records");
                existing.loader.flush(&mut self.warehouse)?;
                existing.records_seen
            }
            None => 0,
        };

        let key_properties = inflect_key_properties(&key_properties);
        let table = build_table(
            &self.config.schema,
            &stream,
            &key_properties,
            &schema,
            self.config.timestamp_column.as_deref(),
        )?;
        let loader = StreamLoader::create(
            &mut self.warehouse,
            table,
            key_properties.clone(),
            self.config.batch_size,
            Duration::from_secs(self.config.buffer_ttl_seconds),
        )?;

        self.streams.insert(
            stream,
            StreamState {
                loader,
                schema,
                key_properties,
                records_seen,
            },
        );
        Ok(())
    }

    fn handle_record(&mut self, stream: String, record: Value) -> Result<(), TargetError> {
        let Some(state) = self.streams.get_mut(&stream) else {
            return Err(TargetError::RecordBeforeSchema { stream });
        };
        let Some(record) = record.as_object() else {
            return Err(TargetError::RecordNotObject { stream });
        };

        validate_required(&state.schema, record, &stream)?;

        let mut flat = flatten_record(record, SEPARATOR)?;
        for key in &state.key_properties {
            if !flat.contains_key(key) {
                return Err(TargetError::MissingKeyProperty {
                    stream,
                    property: key.clone(),
                });
            }
        }

        if let Some(timestamp_column) = &self.config.timestamp_column {
            if !flat.contains_key(timestamp_column) {
                let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
                flat.insert(timestamp_column.clone(), Value::String(now));
            }
        }

        state.loader.buffer_record(&mut self.warehouse, flat)?;
        state.records_seen += 1;
        Ok(())
    }

    /// Merge a bookmark mapping into the run-state snapshot. Later entries
    /// overwrite earlier ones per stream; no flush happens here.
    fn handle_state(&mut self, value: Value) {
        match value {
            Value::Object(entries) => {
                for (stream, bookmark) in entries {
                    self.bookmarks.insert(stream, bookmark);
                }
            }
            other => warn!(value = %other, "ignoring non-object STATE value"),
        }
    }

    fn flush_expired_buffers(&mut self) -> Result<(), TargetError> {
        let now = Instant::now();
        for (stream, state) in self.streams.iter_mut() {
            if state.loader.buffer_expired(now) {
                info!(%stream, "buffer has expired, flushing");
                state.loader.flush(&mut self.warehouse)?;
            }
        }
        Ok(())
    }

    /// End-of-run: force every loader to flush its remaining buffer and
    /// close, guaranteeing no buffered record is lost.
    pub fn flush_all_cached_records(&mut self) -> Result<(), TargetError> {
        for state in self.streams.values_mut() {
            state.loader.close(&mut self.warehouse)?;
        }
        Ok(())
    }

    /// The final checkpoint mapping: the per-stream record count, overridden
    /// by any explicit bookmark the upstream protocol supplied, which is
    /// passed through unmodified.
    pub fn state(&self) -> Map<String, Value> {
        let mut state = Map::new();
        for (stream, stream_state) in &self.streams {
            state.insert(stream.clone(), Value::from(stream_state.records_seen));
        }
        for (stream, bookmark) in &self.bookmarks {
            state.insert(stream.clone(), bookmark.clone());
        }
        state
    }

    /// Rows left in buffers across every stream. Zero after
    /// [`flush_all_cached_records`](Self::flush_all_cached_records).
    pub fn buffered_records(&self) -> usize {
        self.streams.values().map(|s| s.loader.buffered()).sum()
    }

    pub fn warehouse(&self) -> &W {
        &self.warehouse
    }

    pub fn into_warehouse(self) -> W {
        self.warehouse
    }
}

/// Check that every property the schema marks as required is present,
/// descending into nested objects the record actually carries. Shares the
/// nesting depth guard with the flatteners.
fn validate_required(
    schema: &Value,
    record: &Map<String, Value>,
    stream: &str,
) -> Result<(), TargetError> {
    validate_required_at(schema, record, stream, 0)
}

fn validate_required_at(
    schema: &Value,
    record: &Map<String, Value>,
    stream: &str,
    depth: usize,
) -> Result<(), TargetError> {
    if depth > crate::flatten::MAX_NESTING_DEPTH {
        return Err(TargetError::DepthExceeded {
            limit: crate::flatten::MAX_NESTING_DEPTH,
            path: stream.to_string(),
        });
    }

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for property in required.iter().filter_map(|p| p.as_str()) {
            if !record.contains_key(property) {
                return Err(TargetError::MissingRequiredProperty {
                    stream: stream.to_string(),
                    property: property.to_string(),
                });
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) {
        for (name, child_schema) in properties {
            if let Some(Value::Object(child)) = record.get(name) {
                validate_required_at(child_schema, child, stream, depth + 1)?;
            }
        }
    }

    Ok(())
}
