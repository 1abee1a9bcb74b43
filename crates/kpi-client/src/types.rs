//! Wire types of the KPI API that are not part of the core domain.

use serde::Deserialize;

/// Error body returned by the API, e.g. `{"detail": "Invalid token."}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub detail: String,
}
