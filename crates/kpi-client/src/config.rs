//! Client settings, overridable from the environment.

use formsync_core::config::{env_flag, env_string, env_usize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_KPI_URL: &str = "https://kf.kobotoolbox.org";
pub const API_PATH: &str = "/api/v2";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_PAGE_LIMIT: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// API root including `/api/v2`, without a trailing slash.
    pub api_base: String,
    pub timeout: Duration,
    pub verify_tls: bool,
    /// PEM file added as an extra trusted root.
    pub ca_bundle: Option<PathBuf>,
    /// `limit` sent with the first page request.
    pub page_limit: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: api_base_from(DEFAULT_KPI_URL),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            verify_tls: true,
            ca_bundle: None,
            page_limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl ClientConfig {
    /// Reads `FORMSYNC_API_URL`, `FORMSYNC_HTTP_TIMEOUT_SECS`,
    /// `FORMSYNC_VERIFY_TLS` and `FORMSYNC_CA_BUNDLE`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base: env_string("FORMSYNC_API_URL")
                .map(|url| api_base_from(&url))
                .unwrap_or(defaults.api_base),
            timeout: env_usize("FORMSYNC_HTTP_TIMEOUT_SECS")
                .filter(|secs| *secs > 0)
                .map(|secs| Duration::from_secs(secs as u64))
                .unwrap_or(defaults.timeout),
            verify_tls: env_flag("FORMSYNC_VERIFY_TLS").unwrap_or(defaults.verify_tls),
            ca_bundle: env_string("FORMSYNC_CA_BUNDLE").map(PathBuf::from),
            page_limit: defaults.page_limit,
        }
    }

    /// Same settings against another server root.
    pub fn with_server_url(mut self, server_url: &str) -> Self {
        self.api_base = api_base_from(server_url);
        self
    }
}

/// `https://host/` -> `https://host/api/v2`. A root that already ends in the
/// API path is kept.
pub fn api_base_from(server_url: &str) -> String {
    let root = server_url.trim().trim_end_matches('/');
    if root.ends_with(API_PATH) {
        root.to_string()
    } else {
        format!("{root}{API_PATH}")
    }
}
