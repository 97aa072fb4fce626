//! Fetch-and-classify HTTP layer.
//!
//! `execute_request` performs one call and turns the outcome into either a parsed body or a
//! taxonomy error attributed to the calling provider. `HttpClient` layers auth, default
//! headers, timeouts and retry on top of it.

use crate::retry::{retry_with_backoff_when, RetryPolicy};
use chrono::{DateTime, Utc};
use omnisearch_core::{AuthType, ProviderConfig, ProviderError, Result, DEFAULT_TIMEOUT_MS};
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

pub const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Patch => reqwest::Method::PATCH,
            Self::Delete => reqwest::Method::DELETE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub headers: BTreeMap<String, String>,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub timeout_ms: u64,
    /// Non-2xx statuses the caller wants back as a successful response.
    pub accept_status: Vec<u16>,
}

impl RequestSpec {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            headers: BTreeMap::new(),
            query: Vec::new(),
            body: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            accept_status: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(serde_json::Value),
    Text(String),
}

impl ResponseBody {
    fn parse(text: String) -> Self {
        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(v) => Self::Json(v),
            Err(_) => Self::Text(text),
        }
    }

    /// Decode into a provider response schema; shape mismatches are `API_ERROR`.
    pub fn decode<T: DeserializeOwned>(self, provider: &str) -> Result<T> {
        match self {
            Self::Json(v) => serde_json::from_value(v).map_err(|e| {
                ProviderError::api(format!("Malformed response from {provider}: {e}"), provider)
            }),
            Self::Text(t) => serde_json::from_str(&t).map_err(|e| {
                ProviderError::api(format!("Malformed response from {provider}: {e}"), provider)
            }),
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Json(v) => v.to_string(),
            Self::Text(t) => t,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: ResponseBody,
}

/// Parse a rate-limit reset value.
///
/// All-digit values are Unix epoch seconds, whatever their length. Anything else is tried as
/// RFC 3339 and then RFC 2822; unparseable values yield no hint.
pub fn parse_rate_limit_reset(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        let secs: i64 = s.parse().ok()?;
        return DateTime::<Utc>::from_timestamp(secs, 0);
    }
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_rfc2822(s))
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// `message`, `error`, `detail` (in that order), else the raw body when non-empty.
fn upstream_message(body: &ResponseBody) -> Option<String> {
    match body {
        ResponseBody::Json(v) => ["message", "error", "detail"]
            .iter()
            .find_map(|k| match v.get(*k)? {
                serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
                serde_json::Value::Object(o) => o
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(|s| s.to_string()),
                _ => None,
            })
            .or_else(|| Some(v.to_string())),
        ResponseBody::Text(t) if !t.trim().is_empty() => Some(t.trim().to_string()),
        ResponseBody::Text(_) => None,
    }
}

/// Map a non-success status into the error taxonomy.
pub fn classify_status(
    status: u16,
    headers: &HeaderMap,
    body: &ResponseBody,
    provider: &str,
) -> ProviderError {
    let status_text = reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown Status")
        .to_string();
    match status {
        401 => ProviderError::api("Invalid API key", provider),
        403 => ProviderError::api("API key has insufficient access", provider),
        429 => {
            let reset = headers
                .get(RATE_LIMIT_RESET_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_rate_limit_reset);
            let err = ProviderError::rate_limit("Rate limit exceeded", provider);
            match reset {
                Some(at) => err.with_details(serde_json::json!({
                    "reset_at": at.to_rfc3339(),
                    "reset_epoch_s": at.timestamp(),
                })),
                None => err,
            }
        }
        500..=599 => ProviderError::provider(
            format!(
                "{provider} API internal error (HTTP {status}): {}",
                upstream_message(body).unwrap_or(status_text)
            ),
            provider,
        ),
        _ => ProviderError::api(
            upstream_message(body).unwrap_or(status_text),
            provider,
        )
        .with_details(serde_json::json!({ "status": status })),
    }
}

fn classify_transport(e: &reqwest::Error, timeout_ms: u64, provider: &str) -> ProviderError {
    if e.is_timeout() {
        ProviderError::api(format!("Request timed out after {timeout_ms}ms"), provider)
    } else {
        ProviderError::api(format!("Network error: {e}"), provider)
    }
}

pub async fn execute_request(
    client: &reqwest::Client,
    url: &str,
    spec: &RequestSpec,
    provider: &str,
) -> Result<HttpResponse> {
    let t0 = Instant::now();
    let mut rb = client
        .request(spec.method.as_reqwest(), url)
        .timeout(Duration::from_millis(spec.timeout_ms));
    for (k, v) in &spec.headers {
        rb = rb.header(k.as_str(), v.as_str());
    }
    if !spec.query.is_empty() {
        rb = rb.query(&spec.query);
    }
    if let Some(body) = &spec.body {
        rb = rb.json(body);
    }

    let resp = rb
        .send()
        .await
        .map_err(|e| classify_transport(&e, spec.timeout_ms, provider))?;
    let status = resp.status().as_u16();
    let headers = resp.headers().clone();
    let text = resp
        .text()
        .await
        .map_err(|e| classify_transport(&e, spec.timeout_ms, provider))?;
    let body = ResponseBody::parse(text);

    tracing::debug!(
        provider,
        method = spec.method.as_str(),
        url,
        status,
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "http request"
    );

    if (200..300).contains(&status) || spec.accept_status.contains(&status) {
        return Ok(HttpResponse { status, body });
    }
    Err(classify_status(status, &headers, &body, provider))
}

/// Provider-scoped HTTP client. All `with_*` builders return a new client.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    provider: String,
    base_url: Option<String>,
    headers: BTreeMap<String, String>,
    timeout_ms: u64,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn new(client: reqwest::Client, provider: impl Into<String>) -> Self {
        Self {
            client,
            provider: provider.into(),
            base_url: None,
            headers: BTreeMap::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retry: RetryPolicy::default(),
        }
    }

    /// Client with base URL, timeout, retry budget, custom headers and auth from `config`.
    pub fn for_config(
        client: reqwest::Client,
        provider: impl Into<String>,
        config: &ProviderConfig,
    ) -> Self {
        let mut c = Self::new(client, provider)
            .with_base_url(&config.base_url)
            .with_timeout_ms(config.timeout_ms)
            .with_retry(RetryPolicy {
                max_retries: config.max_retries,
                ..RetryPolicy::default()
            });
        for (k, v) in &config.custom_headers {
            c = c.with_header(k, v);
        }
        match &config.auth_type {
            AuthType::Bearer => c.with_bearer(&config.api_key),
            AuthType::ApiKey { header } => c.with_api_key_header(header, &config.api_key),
            AuthType::Custom => c,
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn with_base_url(&self, base_url: &str) -> Self {
        let mut c = self.clone();
        c.base_url = Some(base_url.trim_end_matches('/').to_string());
        c
    }

    pub fn with_header(&self, name: &str, value: &str) -> Self {
        let mut c = self.clone();
        c.headers.insert(name.to_string(), value.to_string());
        c
    }

    pub fn with_bearer(&self, token: &str) -> Self {
        self.with_header("Authorization", &format!("Bearer {token}"))
    }

    pub fn with_api_key_header(&self, header: &str, key: &str) -> Self {
        self.with_header(header, key)
    }

    pub fn with_timeout_ms(&self, timeout_ms: u64) -> Self {
        let mut c = self.clone();
        c.timeout_ms = timeout_ms;
        c
    }

    pub fn with_retry(&self, retry: RetryPolicy) -> Self {
        let mut c = self.clone();
        c.retry = retry;
        c
    }

    /// Absolute URLs pass through; anything else is joined onto the base URL.
    pub fn resolve(&self, path_or_url: &str) -> String {
        if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
            return path_or_url.to_string();
        }
        match &self.base_url {
            Some(base) if path_or_url.is_empty() => base.clone(),
            Some(base) => format!("{base}/{}", path_or_url.trim_start_matches('/')),
            None => path_or_url.to_string(),
        }
    }

    pub async fn request(
        &self,
        method: Method,
        path_or_url: &str,
        query: &[(&str, &str)],
        body: Option<serde_json::Value>,
    ) -> Result<ResponseBody> {
        let url = self.resolve(path_or_url);
        let spec = RequestSpec {
            method,
            headers: self.headers.clone(),
            query: query
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body,
            timeout_ms: self.timeout_ms,
            accept_status: Vec::new(),
        };
        let resp = retry_with_backoff_when(
            || execute_request(&self.client, &url, &spec, &self.provider),
            self.retry,
            ProviderError::is_retryable,
        )
        .await?;
        Ok(resp.body)
    }

    pub async fn get(&self, path_or_url: &str, query: &[(&str, &str)]) -> Result<ResponseBody> {
        self.request(Method::Get, path_or_url, query, None).await
    }

    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path_or_url: &str,
        body: &B,
    ) -> Result<ResponseBody> {
        let body = self.to_json(body)?;
        self.request(Method::Post, path_or_url, &[], Some(body)).await
    }

    pub async fn put<B: Serialize + ?Sized>(
        &self,
        path_or_url: &str,
        body: &B,
    ) -> Result<ResponseBody> {
        let body = self.to_json(body)?;
        self.request(Method::Put, path_or_url, &[], Some(body)).await
    }

    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        path_or_url: &str,
        body: &B,
    ) -> Result<ResponseBody> {
        let body = self.to_json(body)?;
        self.request(Method::Patch, path_or_url, &[], Some(body)).await
    }

    pub async fn delete(&self, path_or_url: &str) -> Result<ResponseBody> {
        self.request(Method::Delete, path_or_url, &[], None).await
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path_or_url: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        self.get(path_or_url, query).await?.decode(&self.provider)
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path_or_url: &str,
        body: &B,
    ) -> Result<T> {
        self.post(path_or_url, body).await?.decode(&self.provider)
    }

    fn to_json<B: Serialize + ?Sized>(&self, body: &B) -> Result<serde_json::Value> {
        serde_json::to_value(body).map_err(|e| {
            ProviderError::invalid_input(
                format!("Unserializable request body: {e}"),
                &self.provider,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnisearch_core::ErrorKind;
    use reqwest::header::HeaderValue;

    #[test]
    fn reset_digits_are_epoch_seconds() {
        let at = parse_rate_limit_reset("1700000000").unwrap();
        assert_eq!(at.timestamp(), 1_700_000_000);
        // Short numeric values stay epoch seconds rather than falling into date parsing.
        assert_eq!(parse_rate_limit_reset("2024").unwrap().timestamp(), 2024);
    }

    #[test]
    fn reset_accepts_rfc3339_and_rfc2822() {
        let a = parse_rate_limit_reset("2024-05-01T12:00:00Z").unwrap();
        assert_eq!(a.to_rfc3339(), "2024-05-01T12:00:00+00:00");
        let b = parse_rate_limit_reset("Wed, 01 May 2024 12:00:00 GMT").unwrap();
        assert_eq!(a, b);
        assert!(parse_rate_limit_reset("soon").is_none());
        assert!(parse_rate_limit_reset("").is_none());
    }

    #[test]
    fn classifies_auth_and_server_errors() {
        let h = HeaderMap::new();
        let empty = ResponseBody::Text(String::new());
        let e = classify_status(401, &h, &empty, "brave");
        assert_eq!((e.kind, e.message.as_str()), (ErrorKind::ApiError, "Invalid API key"));
        assert_eq!(e.provider, "brave");
        let e = classify_status(403, &h, &empty, "brave");
        assert_eq!(e.kind, ErrorKind::ApiError);
        assert!(e.message.contains("insufficient access"));
        let e = classify_status(502, &h, &empty, "brave");
        assert_eq!(e.kind, ErrorKind::ProviderError);
        assert!(e.message.contains("Bad Gateway"));
    }

    #[test]
    fn rate_limit_carries_reset_details() {
        let mut h = HeaderMap::new();
        h.insert(RATE_LIMIT_RESET_HEADER, HeaderValue::from_static("1700000000"));
        let e = classify_status(429, &h, &ResponseBody::Text(String::new()), "exa");
        assert_eq!(e.kind, ErrorKind::RateLimit);
        assert_eq!(e.details.unwrap()["reset_epoch_s"], 1_700_000_000i64);

        let e = classify_status(429, &HeaderMap::new(), &ResponseBody::Text(String::new()), "exa");
        assert!(e.details.is_none());
    }

    #[test]
    fn other_4xx_prefers_upstream_message_fields() {
        let h = HeaderMap::new();
        let body = ResponseBody::Json(serde_json::json!({ "detail": "query too long" }));
        assert_eq!(classify_status(422, &h, &body, "p").message, "query too long");
        let body = ResponseBody::Json(serde_json::json!({
            "message": "first",
            "error": "second"
        }));
        assert_eq!(classify_status(400, &h, &body, "p").message, "first");
        let body = ResponseBody::Json(serde_json::json!({ "error": { "message": "nested" } }));
        assert_eq!(classify_status(400, &h, &body, "p").message, "nested");
        let body = ResponseBody::Text("plain failure".to_string());
        assert_eq!(classify_status(404, &h, &body, "p").message, "plain failure");
        let body = ResponseBody::Json(serde_json::json!({ "other": 1 }));
        assert_eq!(classify_status(404, &h, &body, "p").message, r#"{"other":1}"#);
        let empty = ResponseBody::Text(String::new());
        assert_eq!(classify_status(404, &h, &empty, "p").message, "Not Found");
    }

    #[test]
    fn builders_do_not_mutate_the_original() {
        let base = HttpClient::new(reqwest::Client::new(), "tavily");
        let authed = base.with_bearer("k").with_timeout_ms(5).with_retry(RetryPolicy::none());
        assert!(base.headers.is_empty());
        assert_eq!(base.timeout_ms(), DEFAULT_TIMEOUT_MS);
        assert_eq!(base.retry_policy(), RetryPolicy::default());
        assert_eq!(authed.headers.get("Authorization").map(String::as_str), Some("Bearer k"));
        assert_eq!(authed.timeout_ms(), 5);
        assert_eq!(authed.retry_policy().max_retries, 0);
    }

    #[test]
    fn for_config_applies_auth_type() {
        let mut cfg = ProviderConfig::new(
            "secret",
            "https://api.example.com/",
            AuthType::ApiKey {
                header: "x-api-key".to_string(),
            },
        );
        cfg.custom_headers
            .insert("x-extra".to_string(), "1".to_string());
        let c = HttpClient::for_config(reqwest::Client::new(), "exa", &cfg);
        assert_eq!(c.headers.get("x-api-key").map(String::as_str), Some("secret"));
        assert_eq!(c.headers.get("x-extra").map(String::as_str), Some("1"));
        assert_eq!(c.resolve("/search"), "https://api.example.com/search");
        assert_eq!(c.resolve("https://other.test/x"), "https://other.test/x");
        assert_eq!(c.retry_policy().max_retries, 3);

        let custom = ProviderConfig::new("secret", "https://k.test", AuthType::Custom);
        let c = HttpClient::for_config(reqwest::Client::new(), "kagi", &custom);
        assert!(c.headers.is_empty());
    }

    #[test]
    fn decode_failure_is_api_error() {
        #[derive(Debug, serde::Deserialize)]
        struct Shape {
            #[allow(dead_code)]
            results: Vec<String>,
        }
        let e = ResponseBody::Json(serde_json::json!({ "nope": true }))
            .decode::<Shape>("tavily")
            .unwrap_err();
        assert_eq!(e.kind, ErrorKind::ApiError);
        assert!(e.message.starts_with("Malformed response"));
    }
}
