//! In-memory [`Warehouse`] used by the engine and loader tests.

use std::collections::{HashMap, HashSet};

use crate::error::WarehouseError;
use crate::table::TableDef;
use crate::warehouse::{Row, Warehouse};

/// Tables held as plain row vectors, keyed by qualified name. Upserts scan
/// for a key match and replace in place, mirroring merge semantics.
#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    schemas: HashSet<String>,
    tables: HashMap<String, StoredTable>,
}

#[derive(Debug)]
pub struct StoredTable {
    pub table: TableDef,
    pub rows: Vec<Row>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self, qualified_name: &str) -> Option<&[Row]> {
        self.tables.get(qualified_name).map(|t| t.rows.as_slice())
    }

    pub fn table(&self, qualified_name: &str) -> Option<&TableDef> {
        self.tables.get(qualified_name).map(|t| &t.table)
    }

    fn key_indexes(table: &TableDef, key_columns: &[String]) -> Vec<usize> {
        key_columns
            .iter()
            .filter_map(|k| table.column_index(k))
            .collect()
    }
}

impl Warehouse for MemoryWarehouse {
    fn schema_exists(&mut self, schema: &str) -> Result<bool, WarehouseError> {
        Ok(self.schemas.contains(schema))
    }

    fn ensure_schema(&mut self, schema: &str) -> Result<(), WarehouseError> {
        self.schemas.insert(schema.to_string());
        Ok(())
    }

    fn table_exists(&mut self, table: &TableDef) -> Result<bool, WarehouseError> {
        Ok(self.tables.contains_key(&table.qualified_name()))
    }

    fn create_table(&mut self, table: &TableDef) -> Result<(), WarehouseError> {
        self.tables
            .entry(table.qualified_name())
            .or_insert_with(|| StoredTable {
                table: table.clone(),
                rows: Vec::new(),
            });
        Ok(())
    }

    fn execute_append(&mut self, table: &TableDef, rows: &[Row]) -> Result<(), WarehouseError> {
        let stored = self
            .tables
            .get_mut(&table.qualified_name())
            .ok_or_else(|| {
                WarehouseError::Message(format!("no such table: {}", table.qualified_name()))
            })?;
        stored.rows.extend_from_slice(rows);
        Ok(())
    }

    fn execute_upsert(
        &mut self,
        table: &TableDef,
        rows: &[Row],
        key_columns: &[String],
    ) -> Result<(), WarehouseError> {
        let stored = self
            .tables
            .get_mut(&table.qualified_name())
            .ok_or_else(|| {
                WarehouseError::Message(format!("no such table: {}", table.qualified_name()))
            })?;
        let key_indexes = Self::key_indexes(&stored.table, key_columns);

        for row in rows {
            let existing = stored.rows.iter_mut().find(|candidate| {
                key_indexes
                    .iter()
                    .all(|&i| candidate.get(i) == row.get(i))
            });
            match existing {
                Some(slot) => *slot = row.clone(),
                None => stored.rows.push(row.clone()),
            }
        }
        Ok(())
    }

    fn drop_table(&mut self, table: &TableDef) -> Result<(), WarehouseError> {
        self.tables.remove(&table.qualified_name());
        Ok(())
    }

    fn drop_schema(&mut self, _database: &str, schema: &str) -> Result<(), WarehouseError> {
        self.schemas.remove(schema);
        self.tables.retain(|_, t| t.table.schema != schema);
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

    #[test]
    fn test_append_keeps_duplicates() {
        let mut warehouse = MemoryWarehouse::new();
        let table = users_table();
        warehouse.create_table(&table).unwrap();

        let row = vec![json!(1), json!("a")];
        warehouse.execute_append(&table, &[row.clone()]).unwrap();
        warehouse.execute_append(&table, &[row]).unwrap();

        assert_eq!(warehouse.rows("tap.users").unwrap().len(), 2);
    }

    #[test]
    fn test_upsert_replaces_matching_keys() {
        let mut warehouse = MemoryWarehouse::new();
        let table = users_table();
        warehouse.create_table(&table).unwrap();
        let keys = vec!["id".to_string()];

        warehouse
            .execute_upsert(&table, &[vec![json!(1), json!("a")]], &keys)
            .unwrap();
        warehouse
            .execute_upsert(
                &table,
                &[vec![json!(1), json!("b")], vec![json!(2), json!("c")]],
                &keys,
            )
            .unwrap();

        let rows = warehouse.rows("tap.users").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec![json!(1), json!("b")]);
        assert_eq!(rows[1], vec![json!(2), json!("c")]);
    }

    #[test]
    fn test_drop_schema_removes_its_tables() {
        let mut warehouse = MemoryWarehouse::new();
        let table = users_table();
        warehouse.ensure_schema("tap").unwrap();
        warehouse.create_table(&table).unwrap();

        warehouse.drop_table(&table).unwrap();
        assert!(!warehouse.table_exists(&table).unwrap());

        warehouse.create_table(&table).unwrap();
        warehouse.drop_schema("warehouse", "tap").unwrap();
        assert!(!warehouse.schema_exists("tap").unwrap());
        assert!(!warehouse.table_exists(&table).unwrap());
    }

    #[test]
    fn test_write_to_missing_table_fails() {
        let mut warehouse = MemoryWarehouse::new();
        let err = warehouse
            .execute_append(&users_table(), &[vec![json!(1), json!("a")]])
            .unwrap_err();
        assert!(err.to_string().contains("no such table"));
    }
}
