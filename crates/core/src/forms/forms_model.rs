//! Domain models for registered forms and their derived columns.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::{Error, Result};
use crate::identifiers::sanitize_identifier;

/// Asset metadata as returned by the form API.
///
/// Only the fields the synchronizer reads are modeled; `content` keeps the raw
/// definition tree so it can be walked in either of its shapes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetDetail {
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Submissions endpoint for this asset.
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub content: serde_json::Value,
}

/// One remote form to synchronize.
#[derive(Debug, Clone, PartialEq)]
pub struct FormSpec {
    pub api_token: String,
    pub asset_uid: String,
    pub main_table: String,
    /// Cached definition; fetched on first use when absent.
    pub asset_detail: Option<AssetDetail>,
}

impl FormSpec {
    /// Creates a form whose main table is named after the sanitized asset uid.
    pub fn new(api_token: impl Into<String>, asset_uid: impl Into<String>) -> Self {
        let asset_uid = asset_uid.into();
        Self {
            api_token: api_token.into(),
            main_table: sanitize_identifier(&asset_uid),
            asset_uid,
            asset_detail: None,
        }
    }

    pub fn with_main_table(mut self, main_table: &str) -> Self {
        self.main_table = sanitize_identifier(main_table);
        self
    }

    pub fn with_asset_detail(mut self, detail: AssetDetail) -> Self {
        self.asset_detail = Some(detail);
        self
    }

    /// `<main_table>/<asset_uid>`, used to tag log lines.
    pub fn label(&self) -> String {
        format!("{}/{}", self.main_table, self.asset_uid)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_token.trim().is_empty() {
            return Err(Error::configuration("API token is required"));
        }
        if self.asset_uid.trim().is_empty() {
            return Err(Error::configuration("Asset uid is required"));
        }
        if self.main_table.is_empty() {
            return Err(Error::configuration(format!(
                "Asset uid '{}' does not produce a usable table name",
                self.asset_uid
            )));
        }
        Ok(())
    }
}

/// Semantic type of a derived column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Decimal,
    Date,
    Time,
    Timestamp,
    Text,
}

impl ColumnType {
    /// Maps a form field type tag (`integer`, `select_one list`, ...) to a
    /// semantic type. Unknown and blank tags are text.
    pub fn from_form_type(type_tag: &str) -> Self {
        match base_type(type_tag).as_str() {
            "integer" => Self::Integer,
            "decimal" | "number" | "range" => Self::Decimal,
            "date" => Self::Date,
            "time" => Self::Time,
            "start" | "end" => Self::Timestamp,
            _ => Self::Text,
        }
    }

    /// Column type used in generated DDL.
    pub fn sql_type(&self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Decimal => "NUMERIC",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::Timestamp => "TIMESTAMP",
            Self::Text => "TEXT",
        }
    }
}

/// Normalized leading token of a type tag.
///
/// `"Begin Group"` and `"begin_group"` both become `begin_group`;
/// `"select_one yes_no"` becomes `select_one`.
pub fn base_type(type_tag: &str) -> String {
    let lowered = type_tag.trim().to_ascii_lowercase();
    let mut tokens = lowered.split_whitespace();
    let Some(first) = tokens.next() else {
        return String::new();
    };
    match (first, tokens.next()) {
        ("begin" | "end", Some(second @ ("group" | "repeat"))) => format!("{first}_{second}"),
        _ => first.to_string(),
    }
}

/// A leaf field: its slash-joined path from the form root and semantic type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub path: String,
    pub column_type: ColumnType,
}

impl ColumnDefinition {
    pub fn new(path: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            path: path.into(),
            column_type,
        }
    }

    pub fn identifier(&self) -> String {
        sanitize_identifier(&self.path)
    }
}

/// Columns derived from a form definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedSchema {
    pub main_columns: Vec<ColumnDefinition>,
    /// Repeat root path -> its columns. Roots without leaves map to an empty list.
    pub repeat_columns: BTreeMap<String, Vec<ColumnDefinition>>,
}

impl ExtractedSchema {
    pub fn repeat_roots(&self) -> Vec<String> {
        self.repeat_columns.keys().cloned().collect()
    }

    pub fn column_count(&self) -> usize {
        self.main_columns.len() + self.repeat_columns.values().map(Vec::len).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_mapping_follows_form_tags() {
        assert_eq!(ColumnType::from_form_type("integer"), ColumnType::Integer);
        assert_eq!(ColumnType::from_form_type("decimal"), ColumnType::Decimal);
        assert_eq!(ColumnType::from_form_type("range"), ColumnType::Decimal);
        assert_eq!(ColumnType::from_form_type("date"), ColumnType::Date);
        assert_eq!(ColumnType::from_form_type("time"), ColumnType::Time);
        assert_eq!(ColumnType::from_form_type("start"), ColumnType::Timestamp);
        assert_eq!(ColumnType::from_form_type("end"), ColumnType::Timestamp);
        assert_eq!(ColumnType::from_form_type("select_one yes_no"), ColumnType::Text);
        assert_eq!(ColumnType::from_form_type("geopoint"), ColumnType::Text);
        assert_eq!(ColumnType::from_form_type(""), ColumnType::Text);
        assert_eq!(ColumnType::from_form_type("  Integer "), ColumnType::Integer);
    }

    #[test]
    fn base_type_joins_spaced_boundary_markers() {
        assert_eq!(base_type("begin group"), "begin_group");
        assert_eq!(base_type("End Repeat"), "end_repeat");
        assert_eq!(base_type("begin_repeat"), "begin_repeat");
        assert_eq!(base_type("select_multiple colors"), "select_multiple");
        assert_eq!(base_type("   "), "");
    }

    #[test]
    fn form_spec_defaults_table_to_sanitized_uid() {
        let spec = FormSpec::new("token", "aBc-123");
        assert_eq!(spec.main_table, "abc_123");
        assert_eq!(spec.label(), "abc_123/aBc-123");
        assert!(spec.validate().is_ok());

        let spec = FormSpec::new("token", "aBc").with_main_table("Survey 2024");
        assert_eq!(spec.main_table, "survey_2024");
    }

    #[test]
    fn form_spec_rejects_missing_token() {
        let err = FormSpec::new("  ", "uid").validate().unwrap_err();
        assert!(err.is_configuration());
    }
}
