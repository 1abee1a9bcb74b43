use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use formsync_core::sync::{NewSyncEntry, SyncEntry};

#[derive(
    Queryable, Identifiable, Selectable, AsChangeset, Debug, Clone, Serialize, Deserialize,
)]
#[diesel(table_name = crate::schema::sync_entries)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncEntryDB {
    pub id: i32,
    pub name: String,
    pub api_token: String,
    pub asset_uid: String,
    pub main_table: String,
    pub definition_path: Option<String>,
    pub status: bool,
    pub last_sync_at: Option<String>,
    pub last_error: Option<String>,
    pub created_at: String,
}

#[derive(Insertable, Debug, Clone, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::sync_entries)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct NewSyncEntryDB {
    pub name: String,
    pub api_token: String,
    pub asset_uid: String,
    pub main_table: String,
    pub definition_path: Option<String>,
    pub status: bool,
    pub created_at: String,
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

impl From<SyncEntryDB> for SyncEntry {
    fn from(db: SyncEntryDB) -> Self {
        Self {
            id: db.id,
            name: db.name,
            api_token: db.api_token,
            asset_uid: db.asset_uid,
            main_table: db.main_table,
            definition_path: db.definition_path,
            status: db.status,
            last_sync_at: db.last_sync_at.as_deref().and_then(parse_timestamp),
            last_error: db.last_error,
            created_at: parse_timestamp(&db.created_at).unwrap_or_default(),
        }
    }
}

impl From<NewSyncEntry> for NewSyncEntryDB {
    fn from(entry: NewSyncEntry) -> Self {
        let main_table = entry.resolved_main_table();
        Self {
            name: entry.name.trim().to_string(),
            api_token: entry.api_token,
            asset_uid: entry.asset_uid,
            main_table,
            definition_path: entry
                .definition_path
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty()),
            status: false,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}
