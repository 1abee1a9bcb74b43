use async_trait::async_trait;

use super::sync_model::{NewSyncEntry, SyncEntry, SyncEntryOutcome};
use crate::errors::Result;
use crate::forms::{AssetDetail, TableLayout};
use crate::submissions::{PageCursor, Row, SubmissionPage};

/// Remote form-collection API.
#[async_trait]
pub trait FormApiTrait: Send + Sync {
    /// Fetches asset metadata, including the form definition.
    async fn get_asset_detail(&self, api_token: &str, asset_uid: &str) -> Result<AssetDetail>;

    /// Submissions endpoint for an asset.
    fn data_url(&self, detail: &AssetDetail, asset_uid: &str) -> String;

    /// Fetches one page of submissions.
    async fn fetch_page(&self, api_token: &str, cursor: &PageCursor) -> Result<SubmissionPage>;
}

/// Storage of form tables: DDL primitives, the watermark, inserts and the
/// queries the drift auditor needs.
#[async_trait]
pub trait FormTableStoreTrait: Send + Sync {
    /// Creates the table if absent, otherwise adds any declared column it
    /// lacks. Idempotent.
    async fn ensure_table(&self, layout: &TableLayout) -> Result<()>;

    /// Adds every column of `columns` the table lacks as TEXT. Returns the
    /// names actually added.
    async fn add_missing_columns(&self, table: &str, columns: &[String]) -> Result<Vec<String>>;

    /// `MAX(_id)` of a main table, 0 when it is empty.
    fn max_submission_id(&self, table: &str) -> Result<i64>;

    /// Inserts rows, skipping any whose `conflict_columns` already exist.
    /// Returns the number of rows actually inserted.
    async fn insert_rows(
        &self,
        table: &str,
        rows: Vec<Row>,
        conflict_columns: &[String],
    ) -> Result<usize>;

    /// Column names in table order.
    fn table_columns(&self, table: &str) -> Result<Vec<String>>;

    fn count_non_null(&self, table: &str, column: &str) -> Result<i64>;

    async fn drop_columns(&self, table: &str, columns: &[String]) -> Result<()>;
}

/// Registry of forms the periodic driver synchronizes.
#[async_trait]
pub trait SyncEntryRepositoryTrait: Send + Sync {
    fn list(&self) -> Result<Vec<SyncEntry>>;

    fn get(&self, id: i32) -> Result<Option<SyncEntry>>;

    async fn create(&self, entry: NewSyncEntry) -> Result<SyncEntry>;

    /// Returns whether an entry was removed.
    async fn delete(&self, id: i32) -> Result<bool>;

    /// Stores the status, the error text and the sync time of a run.
    async fn record_outcome(&self, id: i32, outcome: SyncEntryOutcome) -> Result<()>;
}
