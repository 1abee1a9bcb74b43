use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A sanitized flat row: column identifier -> scalar value.
pub type Row = BTreeMap<String, Value>;

/// One page of the submissions endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmissionPage {
    #[serde(default)]
    pub results: Vec<Value>,
    /// Continuation URL, absent on the last page.
    #[serde(default)]
    pub next: Option<String>,
}

/// Where the next page comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    /// The filtered first request: every submission with `_id > watermark`.
    First { data_url: String, watermark: i64 },
    /// A server-provided continuation link, used verbatim.
    Next(String),
}

/// Output of the row transformer for one submission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformedSubmission {
    pub main_row: Row,
    /// Repeat root path -> child rows in element order.
    pub repeat_rows: BTreeMap<String, Vec<Row>>,
}

impl TransformedSubmission {
    pub fn repeat_row_count(&self) -> usize {
        self.repeat_rows.values().map(Vec::len).sum()
    }
}
