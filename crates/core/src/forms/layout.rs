//! Table layouts derived from an extracted schema.

use log::warn;
use std::collections::{HashMap, HashSet};

use super::forms_model::{ColumnDefinition, ColumnType, ExtractedSchema};
use crate::identifiers::{last_segment, sanitize_identifier};

/// Primary key of every main table.
pub const MAIN_ID_COLUMN: &str = "_id";

/// Parent submission id carried by every repeat row.
pub const SUBMISSION_ID_COLUMN: &str = "_submission_id";

/// 1-based position of a repeat row within its submission.
pub const REPEAT_INDEX_COLUMN: &str = "repeat_index";

/// Metadata fields the form API attaches to every submission.
pub const SYSTEM_FIELDS_MAIN: [(&str, ColumnType); 14] = [
    (MAIN_ID_COLUMN, ColumnType::Integer),
    ("_uuid", ColumnType::Text),
    ("_submission_time", ColumnType::Timestamp),
    ("_status", ColumnType::Text),
    ("__version__", ColumnType::Text),
    ("_submitted_by", ColumnType::Text),
    ("_xform_id_string", ColumnType::Text),
    ("_tags", ColumnType::Text),
    ("_notes", ColumnType::Text),
    ("_attachments", ColumnType::Text),
    ("_geolocation", ColumnType::Text),
    ("formhub/uuid", ColumnType::Text),
    ("meta/instanceID", ColumnType::Text),
    ("meta/rootUUID", ColumnType::Text),
];

/// Sanitized identifiers of [`SYSTEM_FIELDS_MAIN`].
pub fn system_main_identifiers() -> HashSet<String> {
    SYSTEM_FIELDS_MAIN
        .iter()
        .map(|(path, _)| sanitize_identifier(path))
        .collect()
}

/// Columns every repeat table carries besides the form-derived ones.
pub fn system_repeat_identifiers() -> HashSet<String> {
    [SUBMISSION_ID_COLUMN, REPEAT_INDEX_COLUMN]
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// `<main>__<sanitized tail of the repeat root>`.
pub fn repeat_table_name(main_table: &str, repeat_root: &str) -> String {
    format!(
        "{}__{}",
        main_table,
        sanitize_identifier(last_segment(repeat_root))
    )
}

/// Column prefix that repeat columns carry when the form nests them under the
/// repeat name, e.g. `kids_` for root `family/kids`.
pub fn repeat_column_prefix(repeat_root: &str) -> String {
    format!("{}_", sanitize_identifier(last_segment(repeat_root)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutColumn {
    pub name: String,
    pub column_type: ColumnType,
}

/// A table name with its ordered, de-duplicated columns and primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    pub name: String,
    pub columns: Vec<LayoutColumn>,
    pub primary_key: Vec<String>,
}

impl TableLayout {
    /// System fields first, then form fields, keyed on `_id`.
    pub fn main(name: &str, columns: &[ColumnDefinition]) -> Self {
        let system = SYSTEM_FIELDS_MAIN
            .iter()
            .map(|(path, column_type)| (sanitize_identifier(path), *column_type));
        Self {
            name: name.to_string(),
            columns: unique_columns(system.chain(form_columns(columns))),
            primary_key: vec![MAIN_ID_COLUMN.to_string()],
        }
    }

    /// Parent id and sequence index, then the repeat's fields.
    pub fn repeat(name: &str, columns: &[ColumnDefinition]) -> Self {
        let system = [
            (SUBMISSION_ID_COLUMN.to_string(), ColumnType::Integer),
            (REPEAT_INDEX_COLUMN.to_string(), ColumnType::Integer),
        ];
        Self {
            name: name.to_string(),
            columns: unique_columns(system.into_iter().chain(form_columns(columns))),
            primary_key: vec![
                SUBMISSION_ID_COLUMN.to_string(),
                REPEAT_INDEX_COLUMN.to_string(),
            ],
        }
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

fn form_columns(columns: &[ColumnDefinition]) -> impl Iterator<Item = (String, ColumnType)> + '_ {
    columns.iter().map(|c| (c.identifier(), c.column_type))
}

fn unique_columns(items: impl Iterator<Item = (String, ColumnType)>) -> Vec<LayoutColumn> {
    let mut seen = HashSet::new();
    items
        .filter(|(name, _)| !name.is_empty() && seen.insert(name.clone()))
        .map(|(name, column_type)| LayoutColumn { name, column_type })
        .collect()
}

/// Main layout plus one layout per repeat root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormLayouts {
    pub main: TableLayout,
    /// (repeat root path, layout), in root order.
    pub repeats: Vec<(String, TableLayout)>,
}

impl FormLayouts {
    pub fn build(main_table: &str, schema: &ExtractedSchema) -> Self {
        let layouts = Self {
            main: TableLayout::main(main_table, &schema.main_columns),
            repeats: schema
                .repeat_columns
                .iter()
                .map(|(root, cols)| {
                    (
                        root.clone(),
                        TableLayout::repeat(&repeat_table_name(main_table, root), cols),
                    )
                })
                .collect(),
        };
        for (table, roots) in layouts.shared_repeat_tables() {
            warn!(
                "[layout] repeat roots {} all map to table {}; their rows share it",
                roots.join(", "),
                table
            );
        }
        layouts
    }

    /// Repeat tables claimed by more than one root, with those roots in order.
    pub fn shared_repeat_tables(&self) -> Vec<(String, Vec<String>)> {
        let mut by_table: HashMap<&str, Vec<String>> = HashMap::new();
        for (root, layout) in &self.repeats {
            by_table
                .entry(layout.name.as_str())
                .or_default()
                .push(root.clone());
        }
        let mut shared: Vec<(String, Vec<String>)> = by_table
            .into_iter()
            .filter(|(_, roots)| roots.len() > 1)
            .map(|(table, roots)| (table.to_string(), roots))
            .collect();
        shared.sort();
        shared
    }

    pub fn repeat_table(&self, root: &str) -> Option<&str> {
        self.repeats
            .iter()
            .find(|(r, _)| r == root)
            .map(|(_, layout)| layout.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_layout_puts_system_fields_first_and_dedupes() {
        let layout = TableLayout::main(
            "survey",
            &[
                ColumnDefinition::new("_uuid", ColumnType::Integer),
                ColumnDefinition::new("age", ColumnType::Integer),
            ],
        );
        let names = layout.column_names();
        assert_eq!(names[0], "_id");
        assert_eq!(names.len(), SYSTEM_FIELDS_MAIN.len() + 1);
        assert_eq!(names.last().map(String::as_str), Some("age"));
        assert!(names.contains(&"meta_instanceid".to_string()));
        let uuid = layout.columns.iter().find(|c| c.name == "_uuid").unwrap();
        assert_eq!(uuid.column_type, ColumnType::Text);
        assert_eq!(layout.primary_key, vec!["_id".to_string()]);
    }

    #[test]
    fn repeat_layout_has_composite_key() {
        let layout = TableLayout::repeat(
            "survey__kids",
            &[ColumnDefinition::new("family/kids/name", ColumnType::Text)],
        );
        assert_eq!(
            layout.column_names(),
            vec!["_submission_id", "repeat_index", "family_kids_name"]
        );
        assert_eq!(layout.primary_key, vec!["_submission_id", "repeat_index"]);
    }

    #[test]
    fn repeat_tables_are_named_after_the_tail_segment() {
        assert_eq!(repeat_table_name("survey", "family/Kids List"), "survey__kids_list");
        assert_eq!(repeat_column_prefix("family/kids"), "kids_");
    }

    #[test]
    fn form_layouts_map_roots_to_tables() {
        let mut schema = ExtractedSchema::default();
        schema
            .main_columns
            .push(ColumnDefinition::new("age", ColumnType::Integer));
        schema.repeat_columns.insert("family/kids".into(), vec![]);
        let layouts = FormLayouts::build("survey", &schema);
        assert_eq!(layouts.repeat_table("family/kids"), Some("survey__kids"));
        assert_eq!(layouts.repeat_table("missing"), None);
    }

    #[test]
    fn roots_with_the_same_tail_are_reported_as_sharing_a_table() {
        let mut schema = ExtractedSchema::default();
        schema.repeat_columns.insert("a/items".into(), vec![]);
        schema.repeat_columns.insert("b/items".into(), vec![]);
        schema.repeat_columns.insert("family/kids".into(), vec![]);
        let layouts = FormLayouts::build("survey", &schema);
        assert_eq!(
            layouts.shared_repeat_tables(),
            vec![(
                "survey__items".to_string(),
                vec!["a/items".to_string(), "b/items".to_string()]
            )]
        );
    }
}
