//! Form tables: runtime DDL, watermark reads and conflict-skipping inserts.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use log::{debug, info};
use serde_json::Value;

use formsync_core::errors::{Error, Result};
use formsync_core::forms::{TableLayout, MAIN_ID_COLUMN};
use formsync_core::submissions::Row;
use formsync_core::sync::FormTableStoreTrait;

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;

/// Rows per multi-row INSERT statement.
const INSERT_CHUNK_ROWS: usize = 200;

fn escape_sqlite_str(value: &str) -> String {
    value.replace('\'', "''")
}

fn quote_identifier(value: &str) -> String {
    format!("`{}`", value.replace('`', "``"))
}

fn quote_list<'a>(names: impl IntoIterator<Item = &'a String>) -> String {
    names
        .into_iter()
        .map(|n| quote_identifier(n))
        .collect::<Vec<_>>()
        .join(", ")
}

fn json_value_to_sql_literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(v) => {
            if *v {
                "1".to_string()
            } else {
                "0".to_string()
            }
        }
        Value::Number(v) => v.to_string(),
        Value::String(v) => format!("'{}'", escape_sqlite_str(v)),
        Value::Array(_) | Value::Object(_) => {
            format!("'{}'", escape_sqlite_str(&value.to_string()))
        }
    }
}

#[derive(diesel::QueryableByName)]
struct PragmaTableInfoRow {
    #[diesel(sql_type = diesel::sql_types::Text)]
    name: String,
}

#[derive(diesel::QueryableByName)]
struct ScalarRow {
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    value: i64,
}

fn load_table_columns(conn: &mut SqliteConnection, table: &str) -> Result<Vec<String>> {
    let sql = format!("PRAGMA main.table_info('{}')", escape_sqlite_str(table));
    let columns = diesel::sql_query(sql)
        .load::<PragmaTableInfoRow>(conn)
        .map_err(StorageError::from)?
        .into_iter()
        .map(|row| row.name)
        .collect();
    Ok(columns)
}

fn execute_ddl(conn: &mut SqliteConnection, sql: &str) -> Result<()> {
    debug!("[db] {}", sql);
    diesel::sql_query(sql)
        .execute(conn)
        .map_err(|e| StorageError::from(e).into_schema())?;
    Ok(())
}

fn create_table_sql(layout: &TableLayout) -> String {
    let mut defs: Vec<String> = layout
        .columns
        .iter()
        .map(|c| format!("{} {}", quote_identifier(&c.name), c.column_type.sql_type()))
        .collect();
    if layout.primary_key.is_empty() {
        return format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_identifier(&layout.name),
            defs.join(", ")
        );
    }
    // WITHOUT ROWID keeps `_id` from aliasing the rowid (a NULL id would be
    // auto-numbered) and makes every key column NOT NULL.
    defs.push(format!("PRIMARY KEY ({})", quote_list(&layout.primary_key)));
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({}) WITHOUT ROWID",
        quote_identifier(&layout.name),
        defs.join(", ")
    )
}

fn add_column_sql(table: &str, column: &str, sql_type: &str) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        quote_identifier(table),
        quote_identifier(column),
        sql_type
    )
}

/// One multi-row INSERT for `rows`, over the sorted union of their keys.
/// Keys a row lacks are bound as NULL.
fn insert_sql(table: &str, rows: &[Row], conflict_columns: &[String]) -> Option<String> {
    let columns: BTreeSet<&String> = rows.iter().flat_map(|r| r.keys()).collect();
    if columns.is_empty() {
        return None;
    }
    let values = rows
        .iter()
        .map(|row| {
            let literals = columns
                .iter()
                .map(|c| {
                    row.get(*c)
                        .map(json_value_to_sql_literal)
                        .unwrap_or_else(|| "NULL".to_string())
                })
                .collect::<Vec<_>>();
            format!("({})", literals.join(", "))
        })
        .collect::<Vec<_>>()
        .join(", ");
    let conflict = if conflict_columns.is_empty() {
        String::new()
    } else {
        format!(" ON CONFLICT ({}) DO NOTHING", quote_list(conflict_columns))
    };
    Some(format!(
        "INSERT INTO {} ({}) VALUES {}{}",
        quote_identifier(table),
        quote_list(columns.iter().copied()),
        values,
        conflict
    ))
}

pub struct FormTableRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl FormTableRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        FormTableRepository { pool, writer }
    }

    fn scalar(&self, sql: String) -> Result<i64> {
        let mut conn = get_connection(&self.pool)?;
        let row = diesel::sql_query(sql)
            .get_result::<ScalarRow>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(row.value)
    }
}

#[async_trait]
impl FormTableStoreTrait for FormTableRepository {
    async fn ensure_table(&self, layout: &TableLayout) -> Result<()> {
        let layout = layout.clone();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                let existing = load_table_columns(conn, &layout.name)?;
                if existing.is_empty() {
                    execute_ddl(conn, &create_table_sql(&layout))?;
                    info!(
                        "[db] created table {} ({} columns)",
                        layout.name,
                        layout.columns.len()
                    );
                    return Ok(());
                }

                let existing: HashSet<String> = existing.into_iter().collect();
                let mut added = Vec::new();
                for column in layout.columns.iter().filter(|c| !existing.contains(&c.name)) {
                    execute_ddl(
                        conn,
                        &add_column_sql(&layout.name, &column.name, column.column_type.sql_type()),
                    )?;
                    added.push(column.name.clone());
                }
                if !added.is_empty() {
                    info!("[db] added declared columns to {}: {:?}", layout.name, added);
                }
                Ok(())
            })
            .await
    }

    async fn add_missing_columns(&self, table: &str, columns: &[String]) -> Result<Vec<String>> {
        let table = table.to_string();
        let columns = columns.to_vec();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Vec<String>> {
                let mut existing: HashSet<String> =
                    load_table_columns(conn, &table)?.into_iter().collect();
                if existing.is_empty() {
                    return Err(Error::schema(format!("no such table: {table}")));
                }
                let mut added = Vec::new();
                for column in columns {
                    if column.is_empty() || existing.contains(&column) {
                        continue;
                    }
                    execute_ddl(conn, &add_column_sql(&table, &column, "TEXT"))?;
                    existing.insert(column.clone());
                    added.push(column);
                }
                Ok(added)
            })
            .await
    }

    fn max_submission_id(&self, table: &str) -> Result<i64> {
        self.scalar(format!(
            "SELECT COALESCE(MAX({}), 0) AS value FROM {}",
            quote_identifier(MAIN_ID_COLUMN),
            quote_identifier(table)
        ))
    }

    async fn insert_rows(
        &self,
        table: &str,
        rows: Vec<Row>,
        conflict_columns: &[String],
    ) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let table = table.to_string();
        let conflict_columns = conflict_columns.to_vec();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<usize> {
                let mut inserted = 0;
                for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
                    let Some(sql) = insert_sql(&table, chunk, &conflict_columns) else {
                        continue;
                    };
                    inserted += diesel::sql_query(sql)
                        .execute(conn)
                        .map_err(StorageError::from)?;
                }
                debug!("[db] inserted {} of {} rows into {}", inserted, rows.len(), table);
                Ok(inserted)
            })
            .await
    }

    fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let mut conn = get_connection(&self.pool)?;
        load_table_columns(&mut conn, table)
    }

    fn count_non_null(&self, table: &str, column: &str) -> Result<i64> {
        self.scalar(format!(
            "SELECT COUNT(*) AS value FROM {} WHERE {} IS NOT NULL",
            quote_identifier(table),
            quote_identifier(column)
        ))
    }

    async fn drop_columns(&self, table: &str, columns: &[String]) -> Result<()> {
        if columns.is_empty() {
            return Ok(());
        }
        let table = table.to_string();
        let columns = columns.to_vec();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                for column in &columns {
                    execute_ddl(
                        conn,
                        &format!(
                            "ALTER TABLE {} DROP COLUMN {}",
                            quote_identifier(&table),
                            quote_identifier(column)
                        ),
                    )?;
                }
                debug!("[db] dropped columns from {}: {:?}", table, columns);
                Ok(())
            })
            .await
    }
}
