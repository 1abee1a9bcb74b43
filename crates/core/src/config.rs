//! Per-run tuning knobs, overridable from the environment.

/// Rows accumulated per main-table batch before a flush.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Submissions whose keys are sampled for the schema mismatch report.
pub const DEFAULT_SAMPLE_ROWS: usize = 3;

/// Upper bound on columns checked per table by the all-null audit.
pub const DEFAULT_NULL_AUDIT_MAX_COLUMNS: usize = 200;

/// Maximum names listed per drift finding.
pub const DEFAULT_REPORT_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    pub batch_size: usize,
    pub sample_rows: usize,
    pub run_null_audit: bool,
    pub null_audit_max_columns: usize,
    pub drop_empty_duplicate_columns: bool,
    pub report_limit: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            sample_rows: DEFAULT_SAMPLE_ROWS,
            run_null_audit: true,
            null_audit_max_columns: DEFAULT_NULL_AUDIT_MAX_COLUMNS,
            drop_empty_duplicate_columns: true,
            report_limit: DEFAULT_REPORT_LIMIT,
        }
    }
}

impl SyncOptions {
    /// Reads overrides from `FORMSYNC_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            batch_size: env_usize("FORMSYNC_BATCH_SIZE")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.batch_size),
            sample_rows: defaults.sample_rows,
            run_null_audit: env_flag("FORMSYNC_NULL_AUDIT").unwrap_or(defaults.run_null_audit),
            null_audit_max_columns: env_usize("FORMSYNC_NULL_AUDIT_MAX_COLUMNS")
                .unwrap_or(defaults.null_audit_max_columns),
            drop_empty_duplicate_columns: env_flag("FORMSYNC_DROP_EMPTY_DUPLICATE_COLUMNS")
                .unwrap_or(defaults.drop_empty_duplicate_columns),
            report_limit: defaults.report_limit,
        }
    }
}

/// Trimmed, non-empty value of an environment variable.
pub fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn env_usize(name: &str) -> Option<usize> {
    env_string(name).and_then(|v| v.parse::<usize>().ok())
}

pub fn env_flag(name: &str) -> Option<bool> {
    env_string(name).map(|v| parse_flag(&v))
}

/// Anything other than `false`, `0` or `no` counts as enabled.
pub fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "false" | "0" | "no"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_parsing_matches_disable_words() {
        assert!(!parse_flag("False"));
        assert!(!parse_flag(" 0 "));
        assert!(!parse_flag("no"));
        assert!(parse_flag("true"));
        assert!(parse_flag("yes"));
        assert!(parse_flag("1"));
    }

    #[test]
    fn env_overrides_are_applied() {
        std::env::set_var("FORMSYNC_BATCH_SIZE", "250");
        std::env::set_var("FORMSYNC_NULL_AUDIT", "no");
        let options = SyncOptions::from_env();
        std::env::remove_var("FORMSYNC_BATCH_SIZE");
        std::env::remove_var("FORMSYNC_NULL_AUDIT");

        assert_eq!(options.batch_size, 250);
        assert!(!options.run_null_audit);
        assert!(options.drop_empty_duplicate_columns);
    }
}
