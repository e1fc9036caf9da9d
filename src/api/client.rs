use std::time::{Duration, Instant};

use anyhow::Result;
use log::{debug, info, warn};
use serde_json::Value;
use thiserror::Error;

use super::auth::TokenSource;
use super::types::{Bundle, Page, ResultSet, SearchQuery};
use crate::config::RequestDefaults;

const FHIR_JSON: &str = "application/fhir+json";

/// The server never returns more than this many records for one search,
/// whatever the client asks for.
pub const SERVER_RECORD_CAP: u64 = 5000;

/// Safely slice a string at UTF-8 character boundaries.
/// Returns a substring from `start` to `end` byte positions, adjusted to valid char boundaries.
fn safe_slice(s: &str, start: usize, end: usize) -> &str {
    let start = s.floor_char_boundary(start);
    let end = s.ceil_char_boundary(end.min(s.len()));
    &s[start..end]
}

/// Truncate a string for log output, appending "..." if truncated.
fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", safe_slice(s, 0, max_len))
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Unauthorized (401). The access token was rejected by the API.")]
    Unauthorized,

    #[error("Resource not found (404): {0}")]
    NotFound(String),

    #[error("HTTP error ({status}): {body}")]
    Http { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    fn from_transport(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout(e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

/// Per-search options.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
    pub page_size: u32,
    /// Stop after this many pages even if the server offers more.
    pub max_pages: Option<u32>,
    /// Value for `active` when the caller didn't set one. `None` leaves it out.
    pub active_default: Option<bool>,
}

impl FetchOptions {
    pub fn from_defaults(defaults: &RequestDefaults) -> Self {
        Self {
            page_size: defaults.page_size,
            max_pages: defaults.max_pages,
            active_default: defaults.active.then_some(true),
        }
    }
}

/// Blocking FHIR REST client with bearer-token auth.
pub struct FhirClient {
    base_url: String,
    client: reqwest::blocking::Client,
    tokens: Box<dyn TokenSource>,
}

impl FhirClient {
    pub fn new(base_url: &str, timeout: Duration, tokens: Box<dyn TokenSource>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            tokens,
        })
    }

    fn resource_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Issue one authenticated GET and return the decoded JSON body.
    fn get_json(&mut self, url: &str, params: Option<&SearchQuery>) -> Result<Value, ApiError> {
        let token = self.tokens.token()?;

        let mut request = self
            .client
            .get(url)
            .bearer_auth(token)
            .header("Accept", FHIR_JSON);
        if let Some(params) = params {
            debug!("GET {} params={:?}", url, params.pairs());
            request = request.query(params.pairs());
        } else {
            debug!("GET {}", url);
        }

        let start = Instant::now();
        let response = request.send().map_err(|e| {
            debug!("  transport error after {:?}: {}", start.elapsed(), e);
            ApiError::from_transport(e)
        })?;

        let status = response.status();
        debug!("  response: {} in {:?}", status, start.elapsed());

        let body = response.text().map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout(e.to_string())
            } else {
                ApiError::InvalidResponse(format!("failed to read body: {}", e))
            }
        })?;

        match status.as_u16() {
            200..=299 => {
                debug!("  response body: {} bytes", body.len());
                serde_json::from_str(&body).map_err(|e| {
                    debug!("  deserialization error: {}", e);
                    ApiError::InvalidResponse(format!(
                        "{}\n\nResponse body:\n{}",
                        e,
                        truncate_for_log(&body, 500)
                    ))
                })
            }
            401 => {
                debug!("  unauthorized (401)");
                Err(ApiError::Unauthorized)
            }
            404 => {
                debug!("  not found (404)");
                Err(ApiError::NotFound(url.to_string()))
            }
            code => {
                debug!("  http error ({}): {}", code, truncate_for_log(&body, 500));
                Err(ApiError::Http {
                    status: code,
                    body: describe_error_body(&body),
                })
            }
        }
    }

    /// Fetch one search page and keep the entries of `resource_type`.
    pub fn fetch_page(
        &mut self,
        url: &str,
        params: Option<&SearchQuery>,
        resource_type: &str,
    ) -> Result<Page, ApiError> {
        let body = self.get_json(url, params)?;
        let bundle: Bundle = serde_json::from_value(body)
            .map_err(|e| ApiError::InvalidResponse(format!("not a FHIR Bundle: {}", e)))?;
        let page = bundle.into_page(resource_type);
        debug!(
            "  page: {} {} entries, next={}",
            page.entries.len(),
            resource_type,
            page.next.is_some()
        );
        Ok(page)
    }

    /// Search `resource_type`, following "next" links up to `options.max_pages`.
    ///
    /// The caller's parameters are sent unchanged, plus `_count` and (when the
    /// caller didn't set `active`) the active default. Follow-up pages use the
    /// server's next URL verbatim. Any failed request aborts the whole search.
    pub fn search(
        &mut self,
        resource_type: &str,
        query: &SearchQuery,
        options: &FetchOptions,
    ) -> Result<ResultSet, ApiError> {
        let mut params = query.clone();
        params.set("_count", options.page_size.to_string());
        if let Some(active) = options.active_default {
            params.set_default("active", active.to_string());
        }

        let url = self.resource_url(resource_type);
        info!("Fetching first page from {} with params {:?}", url, params.pairs());
        let first = self.fetch_page(&url, Some(&params), resource_type)?;

        match first.total {
            Some(total) => {
                info!("API reported a total of {} {} records", total, resource_type);
                if total >= SERVER_RECORD_CAP {
                    warn!(
                        "API reported {} {} records; at most {} are returned per request",
                        total, resource_type, SERVER_RECORD_CAP
                    );
                }
            }
            None => warn!("API did not report a total number of {} records", resource_type),
        }

        let mut results = ResultSet::default();
        let mut next = first.next.clone();
        results.push_page(first);

        while let Some(next_url) = next {
            if options
                .max_pages
                .is_some_and(|max| results.pages_fetched >= max)
            {
                info!("Reached max_pages limit ({})", results.pages_fetched);
                break;
            }

            let page = self.fetch_page(&next_url, None, resource_type)?;
            next = page.next.clone();
            results.push_page(page);
            info!(
                "Retrieved {} {} records so far (page {})",
                results.len(),
                resource_type,
                results.pages_fetched
            );
        }

        info!(
            "Finished fetching. Total {} records retrieved: {}",
            resource_type,
            results.len()
        );
        Ok(results)
    }

    /// Read a single resource by type and ID.
    pub fn read(&mut self, resource_type: &str, id: &str) -> Result<Value, ApiError> {
        let url = self.resource_url(&format!("{}/{}", resource_type, id));
        self.get_json(&url, None)
    }

    /// Read a single resource, mapping 404 to `None`.
    pub fn read_optional(&mut self, resource_type: &str, id: &str) -> Result<Option<Value>, ApiError> {
        match self.read(resource_type, id) {
            Ok(resource) => Ok(Some(resource)),
            Err(ApiError::NotFound(_)) => {
                warn!("{} with ID {} not found", resource_type, id);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Condense an error body: OperationOutcome diagnostics when present, otherwise
/// the (truncated) raw body.
fn describe_error_body(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body)
        && json.get("resourceType").and_then(Value::as_str) == Some("OperationOutcome")
        && let Some(issues) = json.get("issue").and_then(Value::as_array)
    {
        let msgs: Vec<&str> = issues
            .iter()
            .filter_map(|i| i.get("diagnostics").and_then(Value::as_str))
            .collect();
        if !msgs.is_empty() {
            return msgs.join("; ");
        }
    }
    truncate_for_log(body, 500)
}
