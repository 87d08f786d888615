//! Per-stream loader: owns one table's lifecycle, a bounded record buffer,
//! and the flush path that turns buffered records into warehouse writes.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{TargetError, WarehouseError};
use crate::table::TableDef;
use crate::warehouse::{Row, Warehouse};

/// Expiry deadline for an idle buffer. Re-armed on every buffered record,
/// disarmed when the buffer is flushed.
#[derive(Debug)]
struct BufferExpiry {
    ttl: Duration,
    deadline: Option<Instant>,
}

impl BufferExpiry {
    fn new(ttl: Duration) -> Self {
        BufferExpiry { ttl, deadline: None }
    }

    fn rearm(&mut self) {
        self.deadline = Some(Instant::now() + self.ttl);
    }

    fn disarm(&mut self) {
        self.deadline = None;
    }

    fn expired(&self, at: Instant) -> bool {
        self.deadline.is_some_and(|deadline| deadline <= at)
    }
}

/// Record buffer with optional key-based dedup.
///
/// When key properties are declared, a second record for the same key tuple
/// replaces the first in place, so a flush never sends two rows that would
/// collide inside one upsert statement. Insertion order of first occurrence
/// is preserved.
#[derive(Debug, Default)]
struct RecordBuffer {
    records: Vec<Map<String, Value>>,
    by_key: HashMap<String, usize>,
}

impl RecordBuffer {
    fn push(&mut self, key: Option<String>, record: Map<String, Value>) {
        match key {
            Some(key) => match self.by_key.get(&key) {
                Some(&position) => self.records[position] = record,
                None => {
                    self.by_key.insert(key, self.records.len());
                    self.records.push(record);
                }
            },
            None => self.records.push(record),
        }
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn clear(&mut self) {
        self.records.clear();
        self.by_key.clear();
    }
}

/// Owns one stream's table handle and buffer.
///
/// Lifecycle: created on the stream's first SCHEMA message (table DDL is
/// issued immediately), buffers each validated record, flushes when the
/// batch threshold is crossed, and closes on the end-of-run flush after
/// which records are rejected. Warehouse failures propagate without retry;
/// flushes already committed for other streams stay committed.
pub struct StreamLoader {
    table: TableDef,
    key_properties: Vec<String>,
    buffer: RecordBuffer,
    rows_loaded: u64,
    batch_size: usize,
    expiry: BufferExpiry,
    closed: bool,
}

impl StreamLoader {
    /// Build the loader and make sure the target schema and table exist.
    pub fn create<W: Warehouse>(
        warehouse: &mut W,
        table: TableDef,
        key_properties: Vec<String>,
        batch_size: usize,
        buffer_ttl: Duration,
    ) -> Result<Self, TargetError> {
        schema_apply(warehouse, &table).map_err(|source| TargetError::Warehouse {
            stream: table.name.clone(),
            source,
        })?;

        Ok(StreamLoader {
            table,
            key_properties,
            buffer: RecordBuffer::default(),
            rows_loaded: 0,
            batch_size,
            expiry: BufferExpiry::new(buffer_ttl),
            closed: false,
        })
    }

    pub fn table(&self) -> &TableDef {
        &self.table
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn rows_loaded(&self) -> u64 {
        self.rows_loaded
    }

    pub fn buffer_expired(&self, at: Instant) -> bool {
        self.expiry.expired(at)
    }

    /// Append a validated, flattened record; flush synchronously when the
    /// batch threshold is crossed.
    pub fn buffer_record<W: Warehouse>(
        &mut self,
        warehouse: &mut W,
        record: Map<String, Value>,
    ) -> Result<(), TargetError> {
        if self.closed {
            return Err(TargetError::StreamClosed {
                stream: self.table.name.clone(),
            });
        }

        let key = self.key_fingerprint(&record);
        self.buffer.push(key, record);
        self.expiry.rearm();

        if self.buffer.len() >= self.batch_size {
            self.flush(warehouse)?;
        }
        Ok(())
    }

    /// Write every buffered record, clear the buffer, and bump the running
    /// total. Upsert when key properties are declared, append otherwise.
    pub fn flush<W: Warehouse>(&mut self, warehouse: &mut W) -> Result<(), TargetError> {
        if self.buffer.is_empty() {
            self.expiry.disarm();
            return Ok(());
        }

        let rows: Vec<Row> = self
            .buffer
            .records
            .iter()
            .map(|record| self.serialize_row(record))
            .collect();
        debug!(table = %self.table.qualified_name(), rows = rows.len(), "flushing buffer");

        let result = if self.key_properties.is_empty() {
            warehouse.execute_append(&self.table, &rows)
        } else {
            warehouse.execute_upsert(&self.table, &rows, &self.key_properties)
        };
        result.map_err(|source| TargetError::Warehouse {
            stream: self.table.name.clone(),
            source,
        })?;

        self.rows_loaded += rows.len() as u64;
        self.buffer.clear();
        self.expiry.disarm();
        Ok(())
    }

    /// End-of-run close: flush whatever is buffered regardless of the
    /// threshold, then refuse further records.
    pub fn close<W: Warehouse>(&mut self, warehouse: &mut W) -> Result<(), TargetError> {
        self.flush(warehouse)?;
        self.closed = true;
        Ok(())
    }

    /// Serialize a flat record into the table's column order, with nulls
    /// for columns the record does not carry.
    fn serialize_row(&self, record: &Map<String, Value>) -> Row {
        self.table
            .columns
            .iter()
            .map(|column| record.get(&column.name).cloned().unwrap_or(Value::Null))
            .collect()
    }

    fn key_fingerprint(&self, record: &Map<String, Value>) -> Option<String> {
        if self.key_properties.is_empty() {
            return None;
        }
        let keys: Vec<Value> = self
            .key_properties
            .iter()
            .map(|k| record.get(k).cloned().unwrap_or(Value::Null))
            .collect();
        Some(Value::Array(keys).to_string())
    }
}

/// Make sure the target schema and table exist, creating whichever is
/// missing.
fn schema_apply<W: Warehouse>(warehouse: &mut W, table: &TableDef) -> Result<(), WarehouseError> {
    if !warehouse.schema_exists(&table.schema)? {
        debug!(schema = %table.schema, "schema does not exist, creating it");
        warehouse.ensure_schema(&table.schema)?;
    }
    if !warehouse.table_exists(table)? {
        debug!(table = %table.qualified_name(), "table does not exist, creating it");
        warehouse.create_table(table)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::build_table;
    use crate::warehouse::MemoryWarehouse;
    use serde_json::json;

    const TTL: Duration = Duration::from_secs(60);

    fn record(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    fn loader_with_keys(
        warehouse: &mut MemoryWarehouse,
        keys: &[&str],
        batch_size: usize,
    ) -> StreamLoader {
        let schema = json!({
            "properties": {
                "id": {"type": "integer"},
                "name": {"type": "string"}
            }
        });
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        let table = build_table("tap", "users", &keys, &schema, None).unwrap();
        StreamLoader::create(warehouse, table, keys, batch_size, TTL).unwrap()
    }

    #[test]
    fn test_create_issues_ddl() {
        let mut warehouse = MemoryWarehouse::new();
        let loader = loader_with_keys(&mut warehouse, &["id"], 10);

        assert!(warehouse.table("tap.users").is_some());
        assert_eq!(loader.buffered(), 0);
    }

    #[test]
    fn test_records_buffer_until_threshold() {
        let mut warehouse = MemoryWarehouse::new();
        let mut loader = loader_with_keys(&mut warehouse, &["id"], 3);

        for id in 0..2 {
            loader
                .buffer_record(&mut warehouse, record(json!({"id": id, "name": "x"})))
                .unwrap();
        }

        assert_eq!(loader.buffered(), 2);
        assert_eq!(warehouse.rows("tap.users").unwrap().len(), 0);

        loader
            .buffer_record(&mut warehouse, record(json!({"id": 2, "name": "x"})))
            .unwrap();

        assert_eq!(loader.buffered(), 0);
        assert_eq!(loader.rows_loaded(), 3);
        assert_eq!(warehouse.rows("tap.users").unwrap().len(), 3);
    }

    #[test]
    fn test_same_key_replaces_in_buffer() {
        let mut warehouse = MemoryWarehouse::new();
        let mut loader = loader_with_keys(&mut warehouse, &["id"], 10);

        loader
            .buffer_record(&mut warehouse, record(json!({"id": 1, "name": "a"})))
            .unwrap();
        loader
            .buffer_record(&mut warehouse, record(json!({"id": 1, "name": "b"})))
            .unwrap();

        assert_eq!(loader.buffered(), 1);
        loader.flush(&mut warehouse).unwrap();

        let rows = warehouse.rows("tap.users").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][1], json!("b"));
    }

    #[test]
    fn test_no_keys_keeps_every_record() {
        let mut warehouse = MemoryWarehouse::new();
        let mut loader = loader_with_keys(&mut warehouse, &[], 10);

        loader
            .buffer_record(&mut warehouse, record(json!({"id": 1, "name": "a"})))
            .unwrap();
        loader
            .buffer_record(&mut warehouse, record(json!({"id": 1, "name": "b"})))
            .unwrap();
        loader.flush(&mut warehouse).unwrap();

        assert_eq!(warehouse.rows("tap.users").unwrap().len(), 2);
    }

    #[test]
    fn test_missing_columns_serialize_as_null() {
        let mut warehouse = MemoryWarehouse::new();
        let mut loader = loader_with_keys(&mut warehouse, &["id"], 10);

        loader
            .buffer_record(&mut warehouse, record(json!({"id": 1})))
            .unwrap();
        loader.flush(&mut warehouse).unwrap();

        let rows = warehouse.rows("tap.users").unwrap();
        assert_eq!(rows[0], vec![json!(1), json!(null)]);
    }

    #[test]
    fn test_close_flushes_and_rejects_further_records() {
        let mut warehouse = MemoryWarehouse::new();
        let mut loader = loader_with_keys(&mut warehouse, &["id"], 100);

        loader
            .buffer_record(&mut warehouse, record(json!({"id": 1, "name": "a"})))
            .unwrap();
        loader.close(&mut warehouse).unwrap();

        assert_eq!(loader.buffered(), 0);
        assert_eq!(warehouse.rows("tap.users").unwrap().len(), 1);

        let err = loader
            .buffer_record(&mut warehouse, record(json!({"id": 2, "name": "b"})))
            .unwrap_err();
        assert!(matches!(err, TargetError::StreamClosed { .. }));
    }

    #[test]
    fn test_empty_flush_is_a_no_op() {
        let mut warehouse = MemoryWarehouse::new();
        let mut loader = loader_with_keys(&mut warehouse, &["id"], 10);

        loader.flush(&mut warehouse).unwrap();
        assert_eq!(loader.rows_loaded(), 0);
    }

    #[test]
    fn test_expiry_arms_on_record_and_disarms_on_flush() {
        let mut warehouse = MemoryWarehouse::new();
        let mut loader = loader_with_keys(&mut warehouse, &["id"], 10);
        let far_future = Instant::now() + Duration::from_secs(3600);

        // Nothing buffered, nothing armed.
        assert!(!loader.buffer_expired(far_future));

        loader
            .buffer_record(&mut warehouse, record(json!({"id": 1, "name": "a"})))
            .unwrap();
        assert!(loader.buffer_expired(far_future));
        assert!(!loader.buffer_expired(Instant::now()));

        loader.flush(&mut warehouse).unwrap();
        assert!(!loader.buffer_expired(far_future));
    }
}
