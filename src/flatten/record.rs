//! Record flattening: collapse a nested record into a flat column → value
//! mapping aligned with the flattened schema.

use serde_json::{Map, Value};

use crate::error::TargetError;
use crate::flatten::inflect::flatten_key;
use crate::flatten::MAX_NESTING_DEPTH;

/// Flatten a nested record using the same inflected key computation as the
/// schema flattener, so record columns always line up with table columns.
///
/// Nested objects merge their pairs under the extended prefix. Arrays are
/// stored as their JSON text serialization: semi-structured storage is
/// deferred to a downstream transformation step rather than modeled here.
/// No validation happens at this layer.
pub fn flatten_record(
    record: &Map<String, Value>,
    separator: &str,
) -> Result<Map<String, Value>, TargetError> {
    let mut flat = Map::new();
    let mut path = Vec::new();
    walk(record, &mut path, separator, 0, &mut flat)?;
    Ok(flat)
}

fn walk(
    object: &Map<String, Value>,
    path: &mut Vec<String>,
    separator: &str,
    depth: usize,
    out: &mut Map<String, Value>,
) -> Result<(), TargetError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(TargetError::DepthExceeded {
            limit: MAX_NESTING_DEPTH,
            path: path.join("."),
        });
    }

    for (key, value) in object {
        path.push(key.clone());
        match value {
            Value::Object(nested) => walk(nested, path, separator, depth + 1, out)?,
            Value::Array(_) => {
                out.insert(flatten_key(path, separator), Value::String(value.to_string()));
            }
            scalar => {
                out.insert(flatten_key(path, separator), scalar.clone());
            }
        }
        path.pop();
    }

    Ok(())
}
