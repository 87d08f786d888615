//! Run configuration, loaded from a JSON config file.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Configuration consumed by the load engine.
///
/// `database` and `schema` identify where tables land; everything else has
/// a default. Setting `timestamp_column` to `null` disables the load
/// timestamp entirely.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    /// Warehouse database location (a file path, or `:memory:`).
    pub database: String,

    /// Target schema (namespace) the stream tables are created in.
    pub schema: String,

    /// Flush threshold: buffered rows per stream before a batch write.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Name of the load-timestamp column appended to every table.
    #[serde(default = "default_timestamp_column")]
    pub timestamp_column: Option<String>,

    /// Seconds a non-empty buffer may sit idle before it is flushed.
    #[serde(default = "default_buffer_ttl")]
    pub buffer_ttl_seconds: u64,
}

fn default_batch_size() -> usize {
    5000
}

fn default_timestamp_column() -> Option<String> {
    Some("__loaded_at".to_string())
}

fn default_buffer_ttl() -> u64 {
    60
}

impl TargetConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path).with_context(|| {
            format!("failed to open config file: {}", path.as_ref().display())
        })?;
        serde_json::from_reader(BufReader::new(file)).context("failed to parse config file")
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        TargetConfig {
            database: ":memory:".to_string(),
            schema: "tap".to_string(),
            batch_size: default_batch_size(),
            timestamp_column: default_timestamp_column(),
            buffer_ttl_seconds: default_buffer_ttl(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_in() {
        let config: TargetConfig =
            serde_json::from_str(r#"{"database": "warehouse.db", "schema": "analytics"}"#)
                .unwrap();

        assert_eq!(config.database, "warehouse.db");
        assert_eq!(config.schema, "analytics");
        assert_eq!(config.batch_size, 5000);
        assert_eq!(config.timestamp_column.as_deref(), Some("__loaded_at"));
        assert_eq!(config.buffer_ttl_seconds, 60);
    }

    #[test]
    fn test_timestamp_column_can_be_disabled() {
        let config: TargetConfig = serde_json::from_str(
            r#"{"database": ":memory:", "schema": "tap", "timestamp_column": null}"#,
        )
        .unwrap();

        assert!(config.timestamp_column.is_none());
    }

    #[test]
    fn test_missing_database_is_an_error() {
        let result: std::result::Result<TargetConfig, _> =
            serde_json::from_str(r#"{"schema": "tap"}"#);
        assert!(result.is_err());
    }
}
