//! Embedded columnar warehouse backed by DuckDB.
//!
//! All writes run through rendered SQL from [`sql`](crate::warehouse::sql):
//! one prepared statement per flush, executed row by row inside a single
//! transaction so a failed flush leaves nothing half-written in the table.

use duckdb::{params, params_from_iter, Connection};
use serde_json::Value;
use tracing::debug;

use crate::error::WarehouseError;
use crate::table::TableDef;
use crate::warehouse::{sql, Row, Warehouse};

pub struct DuckDbWarehouse {
    conn: Connection,
}

impl DuckDbWarehouse {
    /// Open a database file, or an in-memory database for `:memory:`.
    pub fn open(database: &str) -> Result<Self, WarehouseError> {
        let conn = if database == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(database)?
        };
        Ok(DuckDbWarehouse { conn })
    }

    pub fn open_in_memory() -> Result<Self, WarehouseError> {
        Self::open(":memory:")
    }

    fn write_rows(&mut self, statement: &str, rows: &[Row]) -> Result<(), WarehouseError> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(statement)?;
            for row in rows {
                stmt.execute(params_from_iter(row.iter().map(bind_value)))?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

/// Convert a JSON value into a bindable DuckDB value.
///
/// Timestamps travel as RFC 3339 text and rely on the engine's implicit
/// VARCHAR cast; arrays and objects were already serialized to text by the
/// record flattener, so anything non-scalar left here is serialized the
/// same way.
fn bind_value(value: &Value) -> duckdb::types::Value {
    match value {
        Value::Null => duckdb::types::Value::Null,
        Value::Bool(b) => duckdb::types::Value::Boolean(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                duckdb::types::Value::BigInt(i)
            } else {
                duckdb::types::Value::Double(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => duckdb::types::Value::Text(s.clone()),
        other => duckdb::types::Value::Text(other.to_string()),
    }
}

impl Warehouse for DuckDbWarehouse {
    fn schema_exists(&mut self, schema: &str) -> Result<bool, WarehouseError> {
        let count: i64 = self.conn.query_row(
            "SELECT count(*) FROM information_schema.schemata \
             WHERE lower(schema_name) = lower(?)",
            params![schema],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn ensure_schema(&mut self, schema: &str) -> Result<(), WarehouseError> {
        self.conn.execute_batch(&sql::create_schema(schema))?;
        Ok(())
    }

    fn table_exists(&mut self, table: &TableDef) -> Result<bool, WarehouseError> {
        let count: i64 = self.conn.query_row(
            "SELECT count(*) FROM information_schema.tables \
             WHERE lower(table_schema) = lower(?) AND lower(table_name) = lower(?)",
            params![table.schema, table.name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn create_table(&mut self, table: &TableDef) -> Result<(), WarehouseError> {
        debug!(table = %table.qualified_name(), "creating table");
        self.conn.execute_batch(&sql::create_table(table))?;
        Ok(())
    }

    fn execute_append(&mut self, table: &TableDef, rows: &[Row]) -> Result<(), WarehouseError> {
        debug!(table = %table.qualified_name(), rows = rows.len(), "appending rows");
        self.write_rows(&sql::insert(table), rows)
    }

    fn execute_upsert(
        &mut self,
        table: &TableDef,
        rows: &[Row],
        key_columns: &[String],
    ) -> Result<(), WarehouseError> {
        debug!(table = %table.qualified_name(), rows = rows.len(), "upserting rows");
        self.write_rows(&sql::upsert(table, key_columns), rows)
    }

    fn drop_table(&mut self, table: &TableDef) -> Result<(), WarehouseError> {
        self.conn.execute_batch(&sql::drop_table(table))?;
        Ok(())
    }

    fn drop_schema(&mut self, database: &str, schema: &str) -> Result<(), WarehouseError> {
        self.conn
            .execute_batch(&sql::drop_schema(database, schema))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Column, ColumnType};
    use serde_json::json;

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
            ],
        }
    }

    fn count_rows(warehouse: &DuckDbWarehouse) -> i64 {
        warehouse
            .conn
            .query_row("SELECT count(*) FROM tap.users", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_schema_and_table_lifecycle() {
        let mut warehouse = DuckDbWarehouse::open_in_memory().unwrap();
        let table = users_table();

        assert!(!warehouse.schema_exists("tap").unwrap());
        warehouse.ensure_schema("tap").unwrap();
        assert!(warehouse.schema_exists("tap").unwrap());

        assert!(!warehouse.table_exists(&table).unwrap());
        warehouse.create_table(&table).unwrap();
        assert!(warehouse.table_exists(&table).unwrap());

        // Re-running the DDL is a no-op, not an error.
        warehouse.ensure_schema("tap").unwrap();
        warehouse.create_table(&table).unwrap();
    }

    #[test]
    fn test_append_and_upsert() {
        let mut warehouse = DuckDbWarehouse::open_in_memory().unwrap();
        let table = users_table();
        warehouse.ensure_schema("tap").unwrap();
        warehouse.create_table(&table).unwrap();
        let keys = vec!["id".to_string()];

        warehouse
            .execute_upsert(&table, &[vec![json!(1), json!("a")]], &keys)
            .unwrap();
        warehouse
            .execute_upsert(&table, &[vec![json!(1), json!("b")]], &keys)
            .unwrap();
        assert_eq!(count_rows(&warehouse), 1);

        let name: String = warehouse
            .conn
            .query_row("SELECT name FROM tap.users WHERE id = 1", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(name, "b");

        warehouse
            .execute_append(&table, &[vec![json!(2), json!("c")]])
            .unwrap();
        assert_eq!(count_rows(&warehouse), 2);
    }

    #[test]
    fn test_null_values_bind() {
        let mut warehouse = DuckDbWarehouse::open_in_memory().unwrap();
        let table = users_table();
        warehouse.ensure_schema("tap").unwrap();
        warehouse.create_table(&table).unwrap();

        warehouse
            .execute_append(&table, &[vec![json!(1), json!(null)]])
            .unwrap();

        let name: Option<String> = warehouse
            .conn
            .query_row("SELECT name FROM tap.users", [], |row| row.get(0))
            .unwrap();
        assert!(name.is_none());
    }
}
