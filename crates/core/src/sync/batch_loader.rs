//! Accumulates transformed rows per table and flushes them in batches.
//!
//! Each flush widens the target table, then inserts with the table's primary
//! key as the conflict target. Batches commit independently. Repeat tables
//! always flush before the main table, so the main-table watermark never moves
//! past a submission whose child rows are not stored yet.

use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};

use super::sync_model::SyncOutcome;
use super::sync_traits::FormTableStoreTrait;
use crate::errors::Result;
use crate::forms::FormLayouts;
use crate::submissions::{submission_id, Row, TransformedSubmission};

pub struct BatchLoader<'a> {
    store: &'a dyn FormTableStoreTrait,
    layouts: &'a FormLayouts,
    batch_size: usize,
    main_rows: Vec<Row>,
    /// Repeat table name -> pending rows.
    repeat_rows: BTreeMap<String, Vec<Row>>,
    outcome: SyncOutcome,
}

impl<'a> BatchLoader<'a> {
    pub fn new(
        store: &'a dyn FormTableStoreTrait,
        layouts: &'a FormLayouts,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            layouts,
            batch_size: batch_size.max(1),
            main_rows: Vec::new(),
            repeat_rows: BTreeMap::new(),
            outcome: SyncOutcome::default(),
        }
    }

    /// Queues one submission's rows, flushing any table that reaches the
    /// batch size. A submission without an integer `_id` is skipped with its
    /// child rows; storing it would move the watermark past unfetched data.
    pub async fn push(&mut self, submission: TransformedSubmission) -> Result<()> {
        if submission_id(&submission.main_row).is_none() {
            warn!(
                "[load] skipping submission without an integer _id ({} child rows)",
                submission.repeat_row_count()
            );
            return Ok(());
        }
        let layouts = self.layouts;
        for (root, rows) in submission.repeat_rows {
            if rows.is_empty() {
                continue;
            }
            let Some(table) = layouts.repeat_table(&root) else {
                debug!("[load] no table for repeat root '{}'; dropping rows", root);
                continue;
            };
            let pending = self.repeat_rows.entry(table.to_string()).or_default();
            pending.extend(rows);
            if pending.len() >= self.batch_size {
                self.flush_repeat(table).await?;
            }
        }

        self.main_rows.push(submission.main_row);
        if self.main_rows.len() >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    /// Flushes all repeat tables, then the main table.
    pub async fn flush(&mut self) -> Result<()> {
        let tables: Vec<String> = self.repeat_rows.keys().cloned().collect();
        for table in tables {
            self.flush_repeat(&table).await?;
        }

        let rows = std::mem::take(&mut self.main_rows);
        if !rows.is_empty() {
            let layout = &self.layouts.main;
            let inserted = load_rows(self.store, &layout.name, rows, &layout.primary_key).await?;
            self.outcome.inserted_main += inserted;
        }
        Ok(())
    }

    /// Flushes what is pending and returns the inserted counts.
    pub async fn finish(mut self) -> Result<SyncOutcome> {
        self.flush().await?;
        Ok(self.outcome)
    }

    async fn flush_repeat(&mut self, table: &str) -> Result<()> {
        let rows = self.repeat_rows.remove(table).unwrap_or_default();
        if rows.is_empty() {
            return Ok(());
        }
        let key = self
            .layouts
            .repeats
            .iter()
            .find(|(_, layout)| layout.name == table)
            .map(|(_, layout)| layout.primary_key.clone())
            .unwrap_or_default();
        let inserted = load_rows(self.store, table, rows, &key).await?;
        self.outcome.inserted_repeat += inserted;
        Ok(())
    }
}

/// Widens `table` to cover every column in `rows`, then inserts them.
pub async fn load_rows(
    store: &dyn FormTableStoreTrait,
    table: &str,
    rows: Vec<Row>,
    conflict_columns: &[String],
) -> Result<usize> {
    if rows.is_empty() {
        return Ok(0);
    }
    let columns: Vec<String> = rows
        .iter()
        .flat_map(|row| row.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let added = store.add_missing_columns(table, &columns).await?;
    if !added.is_empty() {
        info!("[db] added columns to {}: {:?}", table, added);
    }
    let attempted = rows.len();
    let inserted = store.insert_rows(table, rows, conflict_columns).await?;
    debug!(
        "[load] {} inserted={} skipped={}",
        table,
        inserted,
        attempted.saturating_sub(inserted)
    );
    Ok(inserted)
}
