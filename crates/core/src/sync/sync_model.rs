//! Sync run results, stages and registered entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};
use crate::forms::FormSpec;
use crate::identifiers::sanitize_identifier;

/// Rows inserted by one run. Conflict-skipped duplicates are not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub inserted_main: usize,
    pub inserted_repeat: usize,
}

impl SyncOutcome {
    pub fn is_empty(&self) -> bool {
        self.inserted_main == 0 && self.inserted_repeat == 0
    }
}

/// Run stages in execution order. Any stage may end in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    FetchMetadata,
    EnsureSchema,
    ComputeWatermark,
    StreamAndLoad,
    Audit,
    Done,
    Failed,
}

impl SyncStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FetchMetadata => "fetch_metadata",
            Self::EnsureSchema => "ensure_schema",
            Self::ComputeWatermark => "compute_watermark",
            Self::StreamAndLoad => "stream_and_load",
            Self::Audit => "audit",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SyncStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry policy classification for transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRetryClass {
    Retryable,
    Permanent,
    ReauthRequired,
}

/// Classify an HTTP status into retry behavior.
pub fn classify_http_status(status: u16) -> SyncRetryClass {
    match status {
        401 | 403 => SyncRetryClass::ReauthRequired,
        408 | 409 | 423 | 425 | 429 => SyncRetryClass::Retryable,
        500..=599 => SyncRetryClass::Retryable,
        _ => SyncRetryClass::Permanent,
    }
}

/// A registered form the periodic driver synchronizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEntry {
    pub id: i32,
    pub name: String,
    #[serde(skip_serializing)]
    pub api_token: String,
    pub asset_uid: String,
    pub main_table: String,
    /// On-disk cached asset detail, if any.
    pub definition_path: Option<String>,
    /// Whether the last run succeeded.
    pub status: bool,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SyncEntry {
    pub fn form_spec(&self) -> FormSpec {
        FormSpec::new(&self.api_token, &self.asset_uid).with_main_table(&self.main_table)
    }
}

/// Input for registering a form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSyncEntry {
    pub name: String,
    pub api_token: String,
    pub asset_uid: String,
    pub main_table: Option<String>,
    pub definition_path: Option<String>,
}

impl NewSyncEntry {
    /// Caller-supplied table name, or the asset uid, sanitized.
    pub fn resolved_main_table(&self) -> String {
        let source = self
            .main_table
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.asset_uid);
        sanitize_identifier(source)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::configuration("Entry name is required"));
        }
        FormSpec::new(&self.api_token, &self.asset_uid)
            .with_main_table(&self.resolved_main_table())
            .validate()
    }
}

/// Result of one entry's run, as recorded by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEntryOutcome {
    Succeeded,
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_http_status_for_retry_policy() {
        assert_eq!(classify_http_status(500), SyncRetryClass::Retryable);
        assert_eq!(classify_http_status(429), SyncRetryClass::Retryable);
        assert_eq!(classify_http_status(401), SyncRetryClass::ReauthRequired);
        assert_eq!(classify_http_status(404), SyncRetryClass::Permanent);
    }

    #[test]
    fn new_entry_defaults_table_to_uid() {
        let entry = NewSyncEntry {
            name: "Household".into(),
            api_token: "tok".into(),
            asset_uid: "aXk9-Q".into(),
            main_table: Some("  ".into()),
            definition_path: None,
        };
        assert_eq!(entry.resolved_main_table(), "axk9_q");
        assert!(entry.validate().is_ok());
    }

    #[test]
    fn new_entry_requires_name_and_token() {
        let mut entry = NewSyncEntry {
            name: " ".into(),
            api_token: "tok".into(),
            asset_uid: "uid".into(),
            main_table: None,
            definition_path: None,
        };
        assert!(entry.validate().unwrap_err().is_configuration());
        entry.name = "x".into();
        entry.api_token = String::new();
        assert!(entry.validate().unwrap_err().is_configuration());
    }

    #[test]
    fn stage_names_are_snake_case() {
        assert_eq!(SyncStage::ComputeWatermark.to_string(), "compute_watermark");
        assert_eq!(SyncStage::Failed.as_str(), "failed");
    }
}
