//! SQL statement rendering for stream tables.
//!
//! Statements are rendered once per flush and bound per row. Upserts use
//! `INSERT ... ON CONFLICT ... DO UPDATE` over the declared primary key,
//! which carries the same merge semantics as a warehouse MERGE statement.

use crate::table::TableDef;

pub fn create_schema(schema: &str) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {}", schema)
}

pub fn create_table(table: &TableDef) -> String {
    let mut parts: Vec<String> = table
        .columns
        .iter()
        .map(|c| format!("{} {}", c.name, c.column_type.sql_type()))
        .collect();

    let keys: Vec<&str> = table.key_columns().collect();
    if !keys.is_empty() {
        parts.push(format!("PRIMARY KEY ({})", keys.join(", ")));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        table.qualified_name(),
        parts.join(", ")
    )
}

/// Single-row parameterized insert; executed once per buffered row inside
/// one transaction per flush.
pub fn insert(table: &TableDef) -> String {
    let columns: Vec<&str> = table.column_names().collect();
    let placeholders = vec!["?"; columns.len()].join(", ");

    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.qualified_name(),
        columns.join(", "),
        placeholders
    )
}

/// Single-row parameterized upsert. Non-key columns are updated from the
/// incoming row on conflict; a table whose columns are all keys degrades to
/// `DO NOTHING`.
pub fn upsert(table: &TableDef, key_columns: &[String]) -> String {
    let non_key_updates: Vec<String> = table
        .column_names()
        .filter(|name| !key_columns.iter().any(|k| k == name))
        .map(|name| format!("{} = excluded.{}", name, name))
        .collect();

    let conflict_action = if non_key_updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", non_key_updates.join(", "))
    };

    format!(
        "{} ON CONFLICT ({}) {}",
        insert(table),
        key_columns.join(", "),
        conflict_action
    )
}

pub fn drop_table(table: &TableDef) -> String {
    format!("DROP TABLE IF EXISTS {}", table.qualified_name())
}

pub fn drop_schema(database: &str, schema: &str) -> String {
    format!("DROP SCHEMA {}.{}", database, schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Column, ColumnType};

    fn users_table() -> TableDef {
        TableDef {
            schema: "tap".to_string(),
            name: "users".to_string(),
            columns: vec![
                Column {
                    name: "id".to_string(),
                    column_type: ColumnType::BigInt,
                    primary_key: true,
                },
                Column {
                    name: "name".to_string(),
                    column_type: ColumnType::Text,
                    primary_key: false,
                },
                Column {
                    name: "__loaded_at".to_string(),
                    column_type: ColumnType::Timestamp,
                    primary_key: false,
                },
            ],
        }
    }

    #[test]
    fn test_create_table_renders_types_and_primary_key() {
        let sql = create_table(&users_table());
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS tap.users \
             (id BIGINT, name VARCHAR, __loaded_at TIMESTAMP, PRIMARY KEY (id))"
        );
    }

    #[test]
    fn test_create_table_without_keys_has_no_primary_key_clause() {
        let mut table = users_table();
        for column in &mut table.columns {
            column.primary_key = false;
        }

        assert!(!create_table(&table).contains("PRIMARY KEY"));
    }

    #[test]
    fn test_insert_binds_every_column() {
        assert_eq!(
            insert(&users_table()),
            "INSERT INTO tap.users (id, name, __loaded_at) VALUES (?, ?, ?)"
        );
    }

    #[test]
    fn test_upsert_updates_non_key_columns() {
        let sql = upsert(&users_table(), &["id".to_string()]);
        assert_eq!(
            sql,
            "INSERT INTO tap.users (id, name, __loaded_at) VALUES (?, ?, ?) \
             ON CONFLICT (id) DO UPDATE SET name = excluded.name, \
             __loaded_at = excluded.__loaded_at"
        );
    }

    #[test]
    fn test_all_key_upsert_degrades_to_do_nothing() {
        let table = TableDef {
            schema: "tap".to_string(),
            name: "pairs".to_string(),
            columns: vec![Column {
                name: "id".to_string(),
                column_type: ColumnType::BigInt,
                primary_key: true,
            }],
        };

        let sql = upsert(&table, &["id".to_string()]);
        assert!(sql.ends_with("ON CONFLICT (id) DO NOTHING"));
    }
}
