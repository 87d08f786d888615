//! Schema flattening: collapse a nested JSON-schema `properties` tree into
//! a flat, collision-checked column set.

use serde_json::Value;
use tracing::warn;

use crate::error::TargetError;
use crate::flatten::inflect::flatten_key;
use crate::flatten::MAX_NESTING_DEPTH;

/// Type descriptor for one flattened column: the declared JSON-schema type
/// names plus an optional `format`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub types: Vec<String>,
    pub format: Option<String>,
}

impl ColumnSpec {
    fn from_property(property: &Value) -> Self {
        let types = match property.get("type") {
            Some(Value::String(t)) => vec![t.clone()],
            Some(Value::Array(ts)) => ts
                .iter()
                .filter_map(|t| t.as_str().map(String::from))
                .collect(),
            _ => Vec::new(),
        };
        let format = property
            .get("format")
            .and_then(|f| f.as_str())
            .map(String::from);

        ColumnSpec { types, format }
    }

    /// Same as [`from_property`](Self::from_property) but with the declared
    /// types replaced by a nullable `type_name`. Used for properties whose
    /// schema is an alternative list rather than an explicit type.
    fn forced_nullable(property: &Value, type_name: &str) -> Self {
        let mut spec = Self::from_property(property);
        spec.types = vec!["null".to_string(), type_name.to_string()];
        spec
    }

    pub fn has_type(&self, type_name: &str) -> bool {
        self.types.iter().any(|t| t == type_name)
    }
}

/// Flatten a nested schema into `(column name, descriptor)` pairs, sorted by
/// column name.
///
/// Properties typed `object` recurse into their own `properties` under the
/// extended path, as do type-less properties that carry a `properties`
/// mapping of their own. Any other property without an explicit `type` is
/// treated as an alternative list (`anyOf`-style): the first alternative's
/// first entry decides, and only `string` and `array` alternatives are
/// supported. Any
/// two paths flattening to the same column name abort with
/// [`TargetError::DuplicateColumn`]; this is the final enforcement point of
/// the collision-safety contract the inflector upholds in practice.
pub fn flatten_schema(
    schema: &Value,
    separator: &str,
) -> Result<Vec<(String, ColumnSpec)>, TargetError> {
    let mut items = Vec::new();
    let mut path = Vec::new();
    collect_properties(schema, &mut path, separator, 0, &mut items)?;

    items.sort_by(|a, b| a.0.cmp(&b.0));
    for pair in items.windows(2) {
        if pair[0].0 == pair[1].0 {
            return Err(TargetError::DuplicateColumn {
                column: pair[0].0.clone(),
            });
        }
    }

    Ok(items)
}

fn collect_properties(
    node: &Value,
    path: &mut Vec<String>,
    separator: &str,
    depth: usize,
    items: &mut Vec<(String, ColumnSpec)>,
) -> Result<(), TargetError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(TargetError::DepthExceeded {
            limit: MAX_NESTING_DEPTH,
            path: path.join("."),
        });
    }

    let Some(properties) = node.get("properties").and_then(|p| p.as_object()) else {
        return Ok(());
    };

    for (name, property) in properties {
        path.push(name.clone());
        let flat_name = flatten_key(path, separator);

        if is_empty_definition(property) {
            warn!(column = %flat_name, "empty property definition, skipping");
        } else if property.get("type").is_some() {
            if ColumnSpec::from_property(property).has_type("object") {
                collect_properties(property, path, separator, depth + 1, items)?;
            } else {
                items.push((flat_name, ColumnSpec::from_property(property)));
            }
        } else if property.get("properties").is_some() {
            // A nested `properties` mapping with no declared type is still an
            // object.
            collect_properties(property, path, separator, depth + 1, items)?;
        } else {
            match first_alternative_type(property) {
                Some((alternative, "string")) => {
                    items.push((flat_name, ColumnSpec::forced_nullable(alternative, "string")));
                }
                Some((alternative, "array")) => {
                    items.push((flat_name, ColumnSpec::forced_nullable(alternative, "array")));
                }
                _ => {
                    warn!(column = %flat_name, "unsupported property shape, skipping");
                }
            }
        }

        path.pop();
    }

    Ok(())
}

fn is_empty_definition(property: &Value) -> bool {
    match property {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// For a property expressed as an alternative list, return the first
/// alternative together with its declared type.
fn first_alternative_type(property: &Value) -> Option<(&Value, &str)> {
    let alternatives = property.as_object()?.values().next()?.as_array()?;
    let first = alternatives.first()?;
    let type_name = first.get("type")?.as_str()?;
    Some((first, type_name))
}
