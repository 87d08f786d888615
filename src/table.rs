//! Table definitions: map flattened column descriptors to concrete column
//! types and assemble per-stream table definitions.

use serde_json::Value;

use crate::error::TargetError;
use crate::flatten::{flatten_key, flatten_schema, ColumnSpec, SEPARATOR};

/// Concrete warehouse column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Timestamp,
    Double,
    BigInt,
    Boolean,
}

impl ColumnType {
    /// Resolve a flattened descriptor to a column type, first match wins.
    ///
    /// There is no native semi-structured column support in this engine:
    /// objects and arrays land as text and are unpacked by a downstream
    /// transformation step. An `integer`+`string` descriptor is a numeric
    /// value that may arrive encoded as a string, so it stays text.
    pub fn from_spec(spec: &ColumnSpec) -> Self {
        if spec.has_type("object") {
            ColumnType::Text
        } else if spec.has_type("array") {
            ColumnType::Text
        } else if spec.format.as_deref() == Some("date-time") {
            ColumnType::Timestamp
        } else if spec.has_type("number") {
            ColumnType::Double
        } else if spec.has_type("integer") && spec.has_type("string") {
            ColumnType::Text
        } else if spec.has_type("integer") {
            ColumnType::BigInt
        } else if spec.has_type("boolean") {
            ColumnType::Boolean
        } else {
            ColumnType::Text
        }
    }

    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Text => "VARCHAR",
            ColumnType::Timestamp => "TIMESTAMP",
            ColumnType::Double => "DOUBLE",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Boolean => "BOOLEAN",
        }
    }
}

/// One column of a stream table.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub primary_key: bool,
}

/// The materialized shape of one stream: an ordered column list under a
/// target schema. Pure data; DDL execution belongs to the warehouse
/// collaborator.
#[derive(Debug, Clone)]
pub struct TableDef {
    /// Warehouse schema (namespace) the table lives in.
    pub schema: String,
    /// Table name; identical to the stream name.
    pub name: String,
    pub columns: Vec<Column>,
}

impl TableDef {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn key_columns(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// Build the table definition for a stream from its declared schema.
///
/// One column per flattened property, flagged primary-key when its flat name
/// is among the (already inflected) key properties. The load-timestamp
/// column is appended when configured and not already produced by the
/// schema.
pub fn build_table(
    target_schema: &str,
    stream: &str,
    key_properties: &[String],
    json_schema: &Value,
    timestamp_column: Option<&str>,
) -> Result<TableDef, TargetError> {
    let flat_schema = flatten_schema(json_schema, SEPARATOR)?;

    let mut columns: Vec<Column> = flat_schema
        .iter()
        .map(|(name, spec)| Column {
            name: name.clone(),
            column_type: ColumnType::from_spec(spec),
            primary_key: key_properties.iter().any(|k| k == name),
        })
        .collect();

    if let Some(timestamp_column) = timestamp_column {
        if !columns.iter().any(|c| c.name == timestamp_column) {
            columns.push(Column {
                name: timestamp_column.to_string(),
                column_type: ColumnType::Timestamp,
                primary_key: false,
            });
        }
    }

    Ok(TableDef {
        schema: target_schema.to_string(),
        name: stream.to_string(),
        columns,
    })
}

/// Inflect declared key-property names the same way schema properties are
/// inflected, so key lookups match flattened column names.
pub fn inflect_key_properties(key_properties: &[String]) -> Vec<String> {
    key_properties
        .iter()
        .map(|k| flatten_key(std::slice::from_ref(k), SEPARATOR))
        .collect()
}
