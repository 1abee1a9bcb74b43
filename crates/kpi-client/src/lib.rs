//! Client for the KPI form-collection API: asset metadata and paginated
//! submission retrieval.

mod client;
mod config;
mod error;
mod types;

pub use client::KpiClient;
pub use config::*;
pub use error::{KpiError, Result};
pub use types::*;
