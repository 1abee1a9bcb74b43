//! KPI API client: asset metadata and paginated submissions.
//!
//! Every request carries `Authorization: Token <api token>`.

use async_trait::async_trait;
use log::{debug, error};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;

use formsync_core::forms::AssetDetail;
use formsync_core::submissions::{PageCursor, SubmissionPage};
use formsync_core::sync::FormApiTrait;

use crate::config::ClientConfig;
use crate::error::{KpiError, Result};
use crate::types::ApiErrorResponse;

const MAX_LOG_BODY_CHARS: usize = 512;

#[derive(Debug, Clone)]
pub struct KpiClient {
    client: reqwest::Client,
    api_base: String,
    page_limit: usize,
}

impl KpiClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(config.timeout);
        if !config.verify_tls {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(path) = &config.ca_bundle {
            let pem = std::fs::read(path).map_err(|e| {
                KpiError::invalid_request(format!(
                    "Cannot read CA bundle {}: {}",
                    path.display(),
                    e
                ))
            })?;
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
        }

        Ok(Self {
            client: builder.build()?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            page_limit: config.page_limit.max(1),
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn log_response(status: StatusCode, body: &str) {
        if status.is_success() {
            debug!("[api] response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("[api] response error ({}): {}", status, preview);
    }

    fn headers(&self, token: &str) -> Result<HeaderMap> {
        let token = token.trim();
        if token.is_empty() {
            return Err(KpiError::auth("API token is empty"));
        }
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let auth_value = HeaderValue::from_str(&format!("Token {}", token))
            .map_err(|_| KpiError::auth("Invalid API token format"))?;
        headers.insert(AUTHORIZATION, auth_value);
        Ok(headers)
    }

    /// Reads the body as text. Bytes that are not valid UTF-8 are replaced.
    async fn read_body(response: reqwest::Response) -> Result<(StatusCode, String)> {
        let status = response.status();
        let bytes = response.bytes().await?;
        let body = String::from_utf8_lossy(&bytes).into_owned();
        Self::log_response(status, &body);
        Ok((status, body))
    }

    fn api_error(status: StatusCode, body: &str) -> KpiError {
        match serde_json::from_str::<ApiErrorResponse>(body) {
            Ok(error) => KpiError::api(status.as_u16(), error.detail),
            Err(_) => KpiError::api(status.as_u16(), format!("Request failed: {}", body)),
        }
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let (status, body) = Self::read_body(response).await?;
        if !status.is_success() {
            return Err(Self::api_error(status, &body));
        }
        serde_json::from_str(&body).map_err(|e| {
            error!("[api] failed to parse response ({}): {}", status, e);
            KpiError::Json(e)
        })
    }

    /// Asset metadata. Tries `/assets/{uid}.json`, then
    /// `/assets/{uid}/?format=json`; the first 200 with a JSON body wins.
    pub async fn fetch_asset_detail(&self, token: &str, asset_uid: &str) -> Result<AssetDetail> {
        let uid = urlencoding::encode(asset_uid.trim());
        let candidates = [
            format!("{}/assets/{}.json", self.api_base, uid),
            format!("{}/assets/{}/?format=json", self.api_base, uid),
        ];
        let headers = self.headers(token)?;

        let mut last_error = None;
        for url in &candidates {
            debug!("[api] asset detail: {}", url);
            let response = self
                .client
                .get(url)
                .headers(headers.clone())
                .send()
                .await?;
            let (status, body) = Self::read_body(response).await?;
            if status != StatusCode::OK {
                last_error = Some(Self::api_error(status, &body));
                continue;
            }
            match serde_json::from_str::<AssetDetail>(&body) {
                Ok(detail) => return Ok(detail),
                Err(e) => {
                    debug!("[api] {} returned a non-JSON body: {}", url, e);
                    last_error = Some(KpiError::Json(e));
                }
            }
        }
        Err(last_error.unwrap_or_else(|| KpiError::invalid_request("No asset endpoint tried")))
    }

    /// The asset's `data` link with a trailing slash, or the conventional
    /// `/assets/{uid}/data/` endpoint.
    pub fn resolve_data_url(&self, detail: &AssetDetail, asset_uid: &str) -> String {
        match detail.data.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            Some(data) if data.ends_with('/') => data.to_string(),
            Some(data) => format!("{}/", data),
            None => format!(
                "{}/assets/{}/data/",
                self.api_base,
                urlencoding::encode(asset_uid.trim())
            ),
        }
    }

    /// One page of submissions. The first page filters on `_id > watermark`
    /// sorted ascending; continuation links are requested as given.
    pub async fn fetch_submissions_page(
        &self,
        token: &str,
        cursor: &PageCursor,
    ) -> Result<SubmissionPage> {
        let headers = self.headers(token)?;
        let request = match cursor {
            PageCursor::First {
                data_url,
                watermark,
            } => {
                let query = serde_json::json!({"_id": {"$gt": watermark}}).to_string();
                let sort = serde_json::json!({"_id": 1}).to_string();
                let limit = self.page_limit.to_string();
                self.client.get(data_url).query(&[
                    ("format", "json"),
                    ("query", query.as_str()),
                    ("sort", sort.as_str()),
                    ("limit", limit.as_str()),
                ])
            }
            PageCursor::Next(url) => self.client.get(url),
        };

        let response = request.headers(headers).send().await?;
        Self::parse_response(response).await
    }
}

#[async_trait]
impl FormApiTrait for KpiClient {
    async fn get_asset_detail(
        &self,
        api_token: &str,
        asset_uid: &str,
    ) -> formsync_core::Result<AssetDetail> {
        Ok(self.fetch_asset_detail(api_token, asset_uid).await?)
    }

    fn data_url(&self, detail: &AssetDetail, asset_uid: &str) -> String {
        self.resolve_data_url(detail, asset_uid)
    }

    async fn fetch_page(
        &self,
        api_token: &str,
        cursor: &PageCursor,
    ) -> formsync_core::Result<SubmissionPage> {
        Ok(self.fetch_submissions_page(api_token, cursor).await?)
    }
}
