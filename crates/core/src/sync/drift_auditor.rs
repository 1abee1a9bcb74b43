//! Advisory checks run after a load. Findings are logged and returned; a
//! failing check is logged and skipped, never propagated.

use log::{info, warn};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use super::sync_traits::FormTableStoreTrait;
use crate::config::SyncOptions;
use crate::errors::Result;
use crate::forms::{
    repeat_column_prefix, system_main_identifiers, system_repeat_identifiers, ColumnDefinition,
    ExtractedSchema, FormLayouts, MAIN_ID_COLUMN, REPEAT_INDEX_COLUMN, SUBMISSION_ID_COLUMN,
};
use crate::submissions::TransformedSubmission;

/// Column identifiers observed in the first few transformed submissions.
#[derive(Debug, Clone, Default)]
pub struct DriftSample {
    limit: usize,
    main_seen: usize,
    main_keys: BTreeSet<String>,
    repeat_seen: BTreeMap<String, usize>,
    repeat_keys: BTreeMap<String, BTreeSet<String>>,
}

impl DriftSample {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    /// Records keys from the main row and from the first child row of each
    /// non-empty repeat, up to `limit` submissions per scope.
    pub fn observe(&mut self, submission: &TransformedSubmission) {
        if self.main_seen < self.limit {
            self.main_keys.extend(submission.main_row.keys().cloned());
            self.main_seen += 1;
        }
        for (root, rows) in &submission.repeat_rows {
            let Some(first) = rows.first() else {
                continue;
            };
            let seen = self.repeat_seen.entry(root.clone()).or_insert(0);
            if *seen < self.limit {
                self.repeat_keys
                    .entry(root.clone())
                    .or_default()
                    .extend(first.keys().cloned());
                *seen += 1;
            }
        }
    }
}

/// Definition versus observed columns for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaMismatch {
    pub table: String,
    /// `main` or the repeat root path.
    pub scope: String,
    pub only_in_definition: Vec<String>,
    pub only_in_data: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriftReport {
    pub mismatches: Vec<SchemaMismatch>,
    /// (table, columns with zero non-null values)
    pub empty_columns: Vec<(String, Vec<String>)>,
    /// (table, dropped duplicate columns)
    pub dropped_columns: Vec<(String, Vec<String>)>,
}

fn identifiers(columns: &[ColumnDefinition]) -> BTreeSet<String> {
    columns.iter().map(ColumnDefinition::identifier).collect()
}

fn limited(items: impl Iterator<Item = String>, limit: usize) -> Vec<String> {
    items.take(limit).collect()
}

fn mismatch(
    table: &str,
    scope: &str,
    defined: &BTreeSet<String>,
    observed: &BTreeSet<String>,
    system: &HashSet<String>,
    limit: usize,
) -> Option<SchemaMismatch> {
    let only_in_definition = limited(defined.difference(observed).cloned(), limit);
    let only_in_data = limited(
        observed
            .difference(defined)
            .filter(|c| !system.contains(*c))
            .cloned(),
        limit,
    );
    if only_in_definition.is_empty() && only_in_data.is_empty() {
        return None;
    }
    Some(SchemaMismatch {
        table: table.to_string(),
        scope: scope.to_string(),
        only_in_definition,
        only_in_data,
    })
}

/// Compares definition columns with the sample, per scope. Scopes with no
/// sampled rows are not reported.
pub fn schema_mismatch_report(
    schema: &ExtractedSchema,
    layouts: &FormLayouts,
    sample: &DriftSample,
    limit: usize,
) -> Vec<SchemaMismatch> {
    let mut findings = Vec::new();
    if sample.main_seen > 0 {
        findings.extend(mismatch(
            &layouts.main.name,
            "main",
            &identifiers(&schema.main_columns),
            &sample.main_keys,
            &system_main_identifiers(),
            limit,
        ));
    }
    let repeat_system = system_repeat_identifiers();
    for (root, columns) in &schema.repeat_columns {
        let (Some(observed), Some(table)) =
            (sample.repeat_keys.get(root), layouts.repeat_table(root))
        else {
            continue;
        };
        findings.extend(mismatch(
            table,
            root,
            &identifiers(columns),
            observed,
            &repeat_system,
            limit,
        ));
    }
    findings
}

fn is_key_column(column: &str) -> bool {
    matches!(
        column,
        MAIN_ID_COLUMN | SUBMISSION_ID_COLUMN | REPEAT_INDEX_COLUMN
    )
}

/// Columns of `table` with no non-null value, checking at most `max_columns`.
pub fn audit_all_null_columns(
    store: &dyn FormTableStoreTrait,
    table: &str,
    max_columns: usize,
) -> Result<Vec<String>> {
    let mut empty = Vec::new();
    let candidates = store.table_columns(table)?;
    for column in candidates
        .iter()
        .filter(|c| !is_key_column(c))
        .take(max_columns)
    {
        if store.count_non_null(table, column)? == 0 {
            warn!("[audit] column {}.{} has 0 non-null values", table, column);
            empty.push(column.clone());
        }
    }
    Ok(empty)
}

/// Drops each column `X` of a repeat table that is entirely NULL while
/// `<prefix>X` also exists.
pub async fn cleanup_duplicate_repeat_columns(
    store: &dyn FormTableStoreTrait,
    table: &str,
    prefix: &str,
) -> Result<Vec<String>> {
    let columns = store.table_columns(table)?;
    let present: HashSet<&str> = columns.iter().map(String::as_str).collect();
    let mut candidates = Vec::new();
    for column in &columns {
        if is_key_column(column) || column.starts_with(prefix) {
            continue;
        }
        let prefixed = format!("{prefix}{column}");
        if present.contains(prefixed.as_str()) && store.count_non_null(table, column)? == 0 {
            candidates.push(column.clone());
        }
    }
    if !candidates.is_empty() {
        store.drop_columns(table, &candidates).await?;
        info!(
            "[cleanup] dropped empty duplicate cols from {}: {:?}",
            table, candidates
        );
    }
    Ok(candidates)
}

pub struct DriftAuditor<'a> {
    store: &'a dyn FormTableStoreTrait,
    options: &'a SyncOptions,
}

impl<'a> DriftAuditor<'a> {
    pub fn new(store: &'a dyn FormTableStoreTrait, options: &'a SyncOptions) -> Self {
        Self { store, options }
    }

    pub async fn audit(
        &self,
        schema: &ExtractedSchema,
        layouts: &FormLayouts,
        sample: &DriftSample,
    ) -> DriftReport {
        let mut report = DriftReport {
            mismatches: schema_mismatch_report(schema, layouts, sample, self.options.report_limit),
            ..DriftReport::default()
        };
        for finding in &report.mismatches {
            if !finding.only_in_definition.is_empty() {
                warn!(
                    "[schema][{}] {}: in definition not in sample: {:?}",
                    finding.table, finding.scope, finding.only_in_definition
                );
            }
            if !finding.only_in_data.is_empty() {
                warn!(
                    "[schema][{}] {}: in sample not in definition: {:?}",
                    finding.table, finding.scope, finding.only_in_data
                );
            }
        }

        let tables: Vec<&str> = std::iter::once(layouts.main.name.as_str())
            .chain(layouts.repeats.iter().map(|(_, l)| l.name.as_str()))
            .collect();

        if self.options.run_null_audit {
            for table in &tables {
                match audit_all_null_columns(self.store, table, self.options.null_audit_max_columns)
                {
                    Ok(empty) if !empty.is_empty() => {
                        report.empty_columns.push((table.to_string(), empty))
                    }
                    Ok(_) => {}
                    Err(e) => warn!("[audit] null audit of {} failed: {}", table, e),
                }
            }
        }

        if self.options.drop_empty_duplicate_columns {
            for (root, layout) in &layouts.repeats {
                let prefix = repeat_column_prefix(root);
                match cleanup_duplicate_repeat_columns(self.store, &layout.name, &prefix).await {
                    Ok(dropped) if !dropped.is_empty() => {
                        report.dropped_columns.push((layout.name.clone(), dropped))
                    }
                    Ok(_) => {}
                    Err(e) => warn!("[cleanup] {} failed: {}", layout.name, e),
                }
            }
        }
        report
    }
}
