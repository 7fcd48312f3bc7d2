//! Signed JSON client for a single Huawei Cloud service endpoint

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use hwlive_core::path_search::path_search;
use log::{debug, warn};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use serde_json::Value as Json;
use url::Url;

use crate::error::ClientError;
use crate::signer::Signer;

/// Maximum length of response body to log
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Truncate a body for logging and strip control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.chars().count() > MAX_LOG_BODY_LENGTH {
        let head: String = body.chars().take(MAX_LOG_BODY_LENGTH).collect();
        format!("{}... [truncated, {} bytes total]", head, body.len())
    } else {
        body.to_string()
    };
    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Retry `operation` on retryable errors with exponential backoff
pub async fn retry_with_max_retries<F, Fut, T>(
    max_retries: usize,
    operation_name: &str,
    mut operation: F,
) -> Result<T, ClientError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                warn!(
                    "Retryable error in {} (attempt {}/{}): {}",
                    operation_name,
                    attempt + 1,
                    max_retries,
                    e
                );
                // 100ms, 200ms, 400ms, ...
                let backoff_ms = 100 * (1u64 << attempt.min(10));
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Client bound to one service endpoint, region and project
#[derive(Debug, Clone)]
pub struct ServiceClient {
    http: reqwest::Client,
    endpoint: Url,
    region: String,
    project_id: String,
    signer: Signer,
    security_token: Option<String>,
    max_retries: usize,
}

impl ServiceClient {
    pub fn new(
        http: reqwest::Client,
        endpoint: &str,
        region: impl Into<String>,
        project_id: impl Into<String>,
        signer: Signer,
    ) -> Result<Self, ClientError> {
        let endpoint = if endpoint.ends_with('/') {
            Url::parse(endpoint)?
        } else {
            Url::parse(&format!("{}/", endpoint))?
        };
        Ok(Self {
            http,
            endpoint,
            region: region.into(),
            project_id: project_id.into(),
            signer,
            security_token: None,
            max_retries: 0,
        })
    }

    pub fn with_security_token(mut self, token: Option<String>) -> Self {
        self.security_token = token;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Resolve a path template relative to the endpoint
    ///
    /// `{project_id}` is replaced with the client's project.
    pub fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, ClientError> {
        let path = path.replace("{project_id}", &self.project_id);
        let mut url = self.endpoint.join(path.trim_start_matches('/'))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    pub async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Json, ClientError> {
        self.request(Method::GET, path, query, None).await
    }

    pub async fn post(&self, path: &str, body: &Json) -> Result<Json, ClientError> {
        self.request(Method::POST, path, &[], Some(body)).await
    }

    pub async fn put(&self, path: &str, body: &Json) -> Result<Json, ClientError> {
        self.request(Method::PUT, path, &[], Some(body)).await
    }

    pub async fn delete(&self, path: &str, query: &[(&str, &str)]) -> Result<Json, ClientError> {
        self.request(Method::DELETE, path, query, None).await
    }

    /// Send a signed JSON request
    ///
    /// Successful responses are parsed as JSON, an empty body yields `null`.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Json>,
    ) -> Result<Json, ClientError> {
        let url = self.url(path, query)?;
        let body = body.map(serde_json::to_vec).transpose()?;
        let operation = format!("{} {}", method, url.path());

        retry_with_max_retries(self.max_retries, &operation, || {
            self.send_once(&method, &url, body.as_deref())
        })
        .await
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&[u8]>,
    ) -> Result<Json, ClientError> {
        let mut builder = self
            .http
            .request(method.clone(), url.clone())
            .header(CONTENT_TYPE, "application/json");
        if !self.project_id.is_empty() {
            builder = builder.header("X-Project-Id", &self.project_id);
        }
        if let Some(token) = &self.security_token {
            builder = builder.header("X-Security-Token", token);
        }
        if let Some(body) = body {
            builder = builder.body(body.to_vec());
        }

        let mut request = builder.build()?;
        self.signer.sign(&mut request, Utc::now())?;
        debug!("{} {}", method, request.url());

        let response = self.http.execute(request).await?;
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            if text.trim().is_empty() {
                return Ok(Json::Null);
            }
            return Ok(serde_json::from_str(&text)?);
        }

        debug!("API error: {} - {}", status, sanitize_for_log(&text));
        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(url.path().to_string()));
        }

        let parsed: Json = serde_json::from_str(&text).unwrap_or(Json::Null);
        Err(ClientError::Api {
            status: status.as_u16(),
            code: error_field("error_code || error.code", &parsed),
            message: error_field("error_msg || error.message || message", &parsed),
        })
    }
}

fn error_field(expr: &str, body: &Json) -> String {
    match path_search(expr, body) {
        Some(Json::String(s)) => s,
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// Walks offset-paginated list APIs
///
/// Pages are requested with `limit_key=limit&offset_key=N` until one comes
/// back empty. The offset advances by the length of each page.
#[derive(Debug, Clone)]
pub struct OffsetPager {
    /// PathSearch expression selecting the items of a page
    pub data_path: String,
    pub offset_key: String,
    pub limit_key: String,
    pub limit: usize,
}

impl OffsetPager {
    pub fn new(data_path: impl Into<String>) -> Self {
        Self {
            data_path: data_path.into(),
            offset_key: "offset".to_string(),
            limit_key: "limit".to_string(),
            limit: 100,
        }
    }

    /// Collect the items of every page
    pub async fn all(
        &self,
        client: &ServiceClient,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<Json>, ClientError> {
        let limit = self.limit.to_string();
        let mut items = Vec::new();
        let mut offset = 0usize;

        loop {
            let offset_str = offset.to_string();
            let mut page_query: Vec<(&str, &str)> = vec![(self.limit_key.as_str(), limit.as_str())];
            page_query.extend_from_slice(query);
            page_query.push((self.offset_key.as_str(), offset_str.as_str()));

            let body = client.get(path, &page_query).await?;
            let page = match path_search(&self.data_path, &body) {
                Some(Json::Array(page)) => page,
                _ => Vec::new(),
            };
            if page.is_empty() {
                break;
            }

            debug!("page at offset {} returned {} items", offset, page.len());
            offset += page.len();
            items.extend(page);
        }

        Ok(items)
    }
}
