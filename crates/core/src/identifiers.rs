//! Identifier sanitization for form paths.
//!
//! Form paths look like `group/sub group/question-1`. Storage identifiers must:
//! - contain only ASCII letters, digits and `_` (every other run of characters
//!   becomes a single `_`)
//! - be lowercase
//! - not start with a digit (`c_` is prefixed)
//! - be at most [`MAX_IDENTIFIER_LEN`] characters (hard cutoff)
//!
//! Truncation can make two long paths collide. Collisions are tolerated here and
//! surfaced by the drift audit.

use log::debug;

/// Identifier length limit (PostgreSQL NAMEDATALEN - 1, kept for portability).
pub const MAX_IDENTIFIER_LEN: usize = 63;

const DIGIT_PREFIX: &str = "c_";

/// Sanitizes without applying the length limit.
pub fn sanitize_identifier_raw(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut in_replacement = false;
    for ch in path.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            out.push(ch.to_ascii_lowercase());
            in_replacement = false;
        } else if !in_replacement {
            out.push('_');
            in_replacement = true;
        }
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert_str(0, DIGIT_PREFIX);
    }
    out
}

/// Cuts an identifier to [`MAX_IDENTIFIER_LEN`] characters.
pub fn truncate_identifier(ident: String) -> String {
    if ident.len() <= MAX_IDENTIFIER_LEN {
        return ident;
    }
    // Sanitized identifiers are ASCII, so byte and char boundaries coincide.
    let cut = ident[..MAX_IDENTIFIER_LEN].to_string();
    debug!("[ident] truncated '{}' -> '{}'", ident, cut);
    cut
}

/// Converts an arbitrary path into a storage-safe identifier.
pub fn sanitize_identifier(path: &str) -> String {
    truncate_identifier(sanitize_identifier_raw(path))
}

/// Non-empty `/`-separated segments of a path.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|seg| !seg.is_empty()).collect()
}

/// Last non-empty segment of a path, or the path itself when it has none.
pub fn last_segment(path: &str) -> &str {
    split_path(path).last().copied().unwrap_or(path)
}

/// Trims a group or repeat name, including trailing separators some form
/// builders leave behind (`,`, `;` and their Arabic-script forms).
pub fn normalize_segment(name: &str) -> String {
    name.trim()
        .trim_end_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '،' | '؛'))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_runs_of_disallowed_characters_with_one_underscore() {
        assert_eq!(sanitize_identifier("Q1/sub-field!!"), "q1_sub_field_");
        assert_eq!(sanitize_identifier("family/kids/name"), "family_kids_name");
        assert_eq!(sanitize_identifier("a  b"), "a_b");
    }

    #[test]
    fn existing_underscores_are_preserved() {
        assert_eq!(sanitize_identifier("_submission_time"), "_submission_time");
        assert_eq!(sanitize_identifier("__version__"), "__version__");
        assert_eq!(sanitize_identifier("meta/instanceID"), "meta_instanceid");
    }

    #[test]
    fn leading_digit_gets_prefix() {
        assert_eq!(sanitize_identifier("1st_visit"), "c_1st_visit");
        assert_eq!(sanitize_identifier("2024/score"), "c_2024_score");
    }

    #[test]
    fn non_ascii_letters_are_replaced() {
        assert_eq!(sanitize_identifier("سن/age"), "_age");
        assert_eq!(sanitize_identifier("café"), "caf_");
    }

    #[test]
    fn output_never_exceeds_limit() {
        let long = "segment/".repeat(40);
        let ident = sanitize_identifier(&long);
        assert_eq!(ident.len(), MAX_IDENTIFIER_LEN);

        let digits = "9".repeat(100);
        let ident = sanitize_identifier(&digits);
        assert!(ident.starts_with("c_"));
        assert_eq!(ident.len(), MAX_IDENTIFIER_LEN);
    }

    #[test]
    fn truncation_can_collide() {
        let base = "x".repeat(MAX_IDENTIFIER_LEN);
        assert_eq!(
            sanitize_identifier(&format!("{base}/first")),
            sanitize_identifier(&format!("{base}/second"))
        );
    }

    #[test]
    fn sanitizing_is_deterministic_and_idempotent() {
        let once = sanitize_identifier("Q1/sub-field!!");
        assert_eq!(once, sanitize_identifier("Q1/sub-field!!"));
        assert_eq!(sanitize_identifier(&once), once);

        let prefixed = sanitize_identifier("7/up");
        assert_eq!(sanitize_identifier(&prefixed), prefixed);
    }

    #[test]
    fn empty_input_is_total() {
        assert_eq!(sanitize_identifier(""), "");
    }

    #[test]
    fn path_helpers() {
        assert_eq!(split_path("/a//b/"), vec!["a", "b"]);
        assert_eq!(last_segment("family/kids"), "kids");
        assert_eq!(last_segment("kids"), "kids");
        assert_eq!(normalize_segment(" household ,; "), "household");
        assert_eq!(normalize_segment("members،"), "members");
    }
}
