//! In-memory fakes of the API and table store for orchestrator tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::sync_traits::{FormApiTrait, FormTableStoreTrait};
use crate::errors::{Error, Result};
use crate::forms::{AssetDetail, TableLayout, MAIN_ID_COLUMN};
use crate::submissions::{PageCursor, Row, SubmissionPage};

const NEXT_PREFIX: &str = "mem://next/";

/// Serves a fixed submission set, honoring the `_id > watermark` filter and
/// paginating with `mem://next/<offset>` links.
pub struct InMemoryFormApi {
    content: Value,
    submissions: Mutex<Vec<Value>>,
    page_size: usize,
    pending: Mutex<Vec<Value>>,
    watermarks: Mutex<Vec<i64>>,
    detail_calls: Mutex<usize>,
    fail_pages: AtomicBool,
}

impl InMemoryFormApi {
    pub fn new(content: Value, submissions: Vec<Value>) -> Self {
        Self {
            content,
            submissions: Mutex::new(submissions),
            page_size: 1000,
            pending: Mutex::new(Vec::new()),
            watermarks: Mutex::new(Vec::new()),
            detail_calls: Mutex::new(0),
            fail_pages: AtomicBool::new(false),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn push_submission(&self, submission: Value) {
        self.submissions.lock().unwrap().push(submission);
    }

    pub fn fail_pages(&self, fail: bool) {
        self.fail_pages.store(fail, Ordering::SeqCst);
    }

    pub fn watermarks(&self) -> Vec<i64> {
        self.watermarks.lock().unwrap().clone()
    }

    pub fn detail_calls(&self) -> usize {
        *self.detail_calls.lock().unwrap()
    }

    fn page_from(&self, offset: usize) -> SubmissionPage {
        let pending = self.pending.lock().unwrap();
        let end = (offset + self.page_size).min(pending.len());
        let results = pending.get(offset..end).map(<[Value]>::to_vec).unwrap_or_default();
        let next = (end < pending.len()).then(|| format!("{NEXT_PREFIX}{end}"));
        SubmissionPage { results, next }
    }
}

#[async_trait]
impl FormApiTrait for InMemoryFormApi {
    async fn get_asset_detail(&self, _api_token: &str, asset_uid: &str) -> Result<AssetDetail> {
        *self.detail_calls.lock().unwrap() += 1;
        Ok(AssetDetail {
            uid: Some(asset_uid.to_string()),
            name: Some("Test form".to_string()),
            data: None,
            content: self.content.clone(),
        })
    }

    fn data_url(&self, detail: &AssetDetail, asset_uid: &str) -> String {
        detail
            .data
            .clone()
            .unwrap_or_else(|| format!("mem://assets/{asset_uid}/data/"))
    }

    async fn fetch_page(&self, _api_token: &str, cursor: &PageCursor) -> Result<SubmissionPage> {
        if self.fail_pages.load(Ordering::SeqCst) {
            return Err(Error::transport(Some(503), "service unavailable"));
        }
        match cursor {
            PageCursor::First { watermark, .. } => {
                self.watermarks.lock().unwrap().push(*watermark);
                let mut selected: Vec<Value> = self
                    .submissions
                    .lock()
                    .unwrap()
                    .iter()
                    .filter(|s| s[MAIN_ID_COLUMN].as_i64().is_some_and(|id| id > *watermark))
                    .cloned()
                    .collect();
                selected.sort_by_key(|s| s[MAIN_ID_COLUMN].as_i64());
                *self.pending.lock().unwrap() = selected;
                Ok(self.page_from(0))
            }
            PageCursor::Next(url) => {
                let offset = url
                    .strip_prefix(NEXT_PREFIX)
                    .and_then(|n| n.parse::<usize>().ok())
                    .ok_or_else(|| Error::transport(Some(400), format!("bad cursor {url}")))?;
                Ok(self.page_from(offset))
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemTable {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// Table store over plain vectors. Inserting a row with an unknown column is
/// an error, so callers must widen first.
#[derive(Default)]
pub struct InMemoryTableStore {
    tables: Mutex<BTreeMap<String, MemTable>>,
    fail_ddl: AtomicBool,
}

impl InMemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_ddl(&self, fail: bool) {
        self.fail_ddl.store(fail, Ordering::SeqCst);
    }

    pub fn table(&self, name: &str) -> Option<MemTable> {
        self.tables.lock().unwrap().get(name).cloned()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.lock().unwrap().keys().cloned().collect()
    }

    fn check_ddl(&self) -> Result<()> {
        if self.fail_ddl.load(Ordering::SeqCst) {
            return Err(Error::schema("permission denied"));
        }
        Ok(())
    }

    fn with_table<T>(&self, table: &str, f: impl FnOnce(&mut MemTable) -> Result<T>) -> Result<T> {
        let mut tables = self.tables.lock().unwrap();
        let t = tables
            .get_mut(table)
            .ok_or_else(|| Error::schema(format!("no such table: {table}")))?;
        f(t)
    }
}

#[async_trait]
impl FormTableStoreTrait for InMemoryTableStore {
    async fn ensure_table(&self, layout: &TableLayout) -> Result<()> {
        self.check_ddl()?;
        let mut tables = self.tables.lock().unwrap();
        let table = tables.entry(layout.name.clone()).or_default();
        for name in layout.column_names() {
            if !table.columns.contains(&name) {
                table.columns.push(name);
            }
        }
        Ok(())
    }

    async fn add_missing_columns(&self, table: &str, columns: &[String]) -> Result<Vec<String>> {
        self.check_ddl()?;
        self.with_table(table, |t| {
            let mut added = Vec::new();
            for name in columns {
                if !t.columns.contains(name) {
                    t.columns.push(name.clone());
                    added.push(name.clone());
                }
            }
            Ok(added)
        })
    }

    fn max_submission_id(&self, table: &str) -> Result<i64> {
        self.with_table(table, |t| {
            Ok(t.rows
                .iter()
                .filter_map(|r| r.get(MAIN_ID_COLUMN).and_then(Value::as_i64))
                .max()
                .unwrap_or(0))
        })
    }

    async fn insert_rows(
        &self,
        table: &str,
        rows: Vec<Row>,
        conflict_columns: &[String],
    ) -> Result<usize> {
        self.with_table(table, |t| {
            // A key with a NULL or missing part never conflicts, as in SQLite.
            let key_of = |row: &Row| -> Option<Vec<String>> {
                conflict_columns
                    .iter()
                    .map(|c| row.get(c).filter(|v| !v.is_null()).map(Value::to_string))
                    .collect()
            };
            let mut keys: HashSet<Vec<String>> = t.rows.iter().filter_map(key_of).collect();
            let mut inserted = 0;
            for row in rows {
                if let Some(unknown) = row.keys().find(|k| !t.columns.contains(k)) {
                    return Err(Error::schema(format!("table {table} has no column {unknown}")));
                }
                let fresh = match key_of(&row) {
                    Some(key) => keys.insert(key),
                    None => true,
                };
                if fresh {
                    t.rows.push(row);
                    inserted += 1;
                }
            }
            Ok(inserted)
        })
    }

    fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        self.with_table(table, |t| Ok(t.columns.clone()))
    }

    fn count_non_null(&self, table: &str, column: &str) -> Result<i64> {
        self.with_table(table, |t| {
            Ok(t.rows
                .iter()
                .filter(|r| r.get(column).is_some_and(|v| !v.is_null()))
                .count() as i64)
        })
    }

    async fn drop_columns(&self, table: &str, columns: &[String]) -> Result<()> {
        self.check_ddl()?;
        self.with_table(table, |t| {
            t.columns.retain(|c| !columns.contains(c));
            for row in &mut t.rows {
                row.retain(|k, _| !columns.contains(k));
            }
            Ok(())
        })
    }
}
