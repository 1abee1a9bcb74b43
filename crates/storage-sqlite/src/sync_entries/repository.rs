use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::SqliteConnection;
use log::info;

use formsync_core::errors::{Error, Result};
use formsync_core::sync::{NewSyncEntry, SyncEntry, SyncEntryOutcome, SyncEntryRepositoryTrait};

use super::model::{NewSyncEntryDB, SyncEntryDB};
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::sync_entries;
use crate::schema::sync_entries::dsl::*;

pub struct SyncEntryRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SyncEntryRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        SyncEntryRepository { pool, writer }
    }
}

#[async_trait]
impl SyncEntryRepositoryTrait for SyncEntryRepository {
    fn list(&self) -> Result<Vec<SyncEntry>> {
        let mut conn = get_connection(&self.pool)?;
        let entries_db = sync_entries
            .order(id.asc())
            .load::<SyncEntryDB>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(entries_db.into_iter().map(SyncEntry::from).collect())
    }

    fn get(&self, entry_id: i32) -> Result<Option<SyncEntry>> {
        let mut conn = get_connection(&self.pool)?;
        let entry_db = sync_entries
            .find(entry_id)
            .first::<SyncEntryDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        Ok(entry_db.map(SyncEntry::from))
    }

    async fn create(&self, entry: NewSyncEntry) -> Result<SyncEntry> {
        entry.validate()?;
        let new_entry_db: NewSyncEntryDB = entry.into();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<SyncEntry> {
                let result_db = diesel::insert_into(sync_entries::table)
                    .values(&new_entry_db)
                    .returning(SyncEntryDB::as_returning())
                    .get_result(conn)
                    .map_err(|e| match e {
                        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                            Error::configuration(format!(
                                "A form already syncs into table '{}'",
                                new_entry_db.main_table
                            ))
                        }
                        other => StorageError::from(other).into(),
                    })?;
                info!(
                    "[db] registered entry {} ({} -> {})",
                    result_db.id, result_db.asset_uid, result_db.main_table
                );
                Ok(SyncEntry::from(result_db))
            })
            .await
    }

    async fn delete(&self, entry_id: i32) -> Result<bool> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<bool> {
                let affected = diesel::delete(sync_entries.find(entry_id))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(affected > 0)
            })
            .await
    }

    async fn record_outcome(&self, entry_id: i32, outcome: SyncEntryOutcome) -> Result<()> {
        let (succeeded, error_text) = match outcome {
            SyncEntryOutcome::Succeeded => (true, None),
            SyncEntryOutcome::Failed(message) => (false, Some(message)),
        };
        let synced_at = Utc::now().to_rfc3339();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                let affected = diesel::update(sync_entries.find(entry_id))
                    .set((
                        status.eq(succeeded),
                        last_error.eq(error_text),
                        last_sync_at.eq(Some(synced_at)),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                if affected == 0 {
                    return Err(Error::configuration(format!(
                        "Sync entry {entry_id} not found"
                    )));
                }
                Ok(())
            })
            .await
    }
}
