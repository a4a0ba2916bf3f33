//! HTTP backend abstraction.
//!
//! The REST and SOAP clients never talk to `reqwest` directly; they go
//! through [`HttpBackend`] so the whole transport stack can be exercised
//! against scripted responses in tests. [`ReqwestBackend`] is the production
//! implementation and optionally enforces a coarse request quota on top of
//! the adaptive limiter's pacing.

use crate::error::{TransportError, TransportResult};
use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorRateLimiter,
};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

type QuotaLimiter = GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Request body variants the transports produce.
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// JSON payload (REST).
    Json(serde_json::Value),
    /// XML payload (SOAP envelopes).
    Xml(String),
    /// Form-encoded payload (OAuth token exchange).
    Form(Vec<(String, String)>),
}

/// A prepared HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<RequestBody>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(url: impl Into<String>, body: RequestBody) -> Self {
        Self {
            method: "POST".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: Some(body),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A raw HTTP response. Header names are lowercased.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|v| v.as_str())
    }

    /// Parses the body as JSON.
    pub fn json(&self) -> TransportResult<serde_json::Value> {
        serde_json::from_str(&self.body).map_err(|e| {
            TransportError::InvalidResponse(format!(
                "JSON parse error (status {}): {}",
                self.status, e
            ))
        })
    }
}

/// The seam between the transports and the wire.
#[async_trait]
pub trait HttpBackend: Send + Sync {
    /// Executes a single request. Returns `Ok` for any HTTP status the
    /// server produced; `Err` only for failures to get a response at all.
    async fn execute(&self, request: HttpRequest) -> TransportResult<HttpResponse>;
}

/// Coarse transport-level request quota.
#[derive(Debug, Clone)]
pub struct RequestQuota {
    /// Requests allowed per period.
    pub max_requests: u32,
    /// Quota period.
    pub period: Duration,
    /// Burst allowance.
    pub burst: u32,
}

impl Default for RequestQuota {
    fn default() -> Self {
        Self {
            max_requests: 200,
            period: Duration::from_secs(60),
            burst: 20,
        }
    }
}

/// Production backend over `reqwest`.
pub struct ReqwestBackend {
    client: reqwest::Client,
    quota: Option<Arc<QuotaLimiter>>,
}

impl ReqwestBackend {
    /// Builds a backend with the given timeout and TLS settings.
    pub fn new(
        timeout_secs: u64,
        verify_tls: bool,
        quota: Option<RequestQuota>,
    ) -> TransportResult<Self> {
        if !verify_tls {
            warn!("TLS certificate verification disabled");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .danger_accept_invalid_certs(!verify_tls)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| TransportError::Config(e.to_string()))?;

        let quota = quota.map(|q| {
            let per_request = q.period / q.max_requests.max(1);
            let quota = Quota::with_period(per_request)
                .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
                .allow_burst(NonZeroU32::new(q.burst).unwrap_or(NonZeroU32::MIN));
            Arc::new(GovernorRateLimiter::direct(quota))
        });

        Ok(Self { client, quota })
    }
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn execute(&self, request: HttpRequest) -> TransportResult<HttpResponse> {
        if let Some(quota) = &self.quota {
            quota.until_ready().await;
        }

        let method: reqwest::Method = request
            .method
            .parse()
            .map_err(|_| TransportError::Internal(format!("bad method {}", request.method)))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        builder = match request.body {
            Some(RequestBody::Json(value)) => builder.json(&value),
            Some(RequestBody::Xml(xml)) => builder
                .header("Content-Type", "text/xml; charset=utf-8")
                .body(xml),
            Some(RequestBody::Form(fields)) => builder.form(&fields),
            None => builder,
        };

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(e.to_string())
            } else if e.is_connect() {
                TransportError::ConnectionFailed(e.to_string())
            } else {
                TransportError::Internal(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_header_lookup_is_case_insensitive() {
        let mut headers = HashMap::new();
        headers.insert("retry-after".to_string(), "5".to_string());
        let response = HttpResponse {
            status: 429,
            headers,
            body: String::new(),
        };
        assert_eq!(response.header("Retry-After"), Some("5"));
        assert!(!response.is_success());
    }

    #[test]
    fn response_json_parse_error_is_typed() {
        let response = HttpResponse {
            status: 200,
            headers: HashMap::new(),
            body: "not json".to_string(),
        };
        assert!(matches!(
            response.json(),
            Err(TransportError::InvalidResponse(_))
        ));
    }

    #[test]
    fn request_builders_set_fields() {
        let request = HttpRequest::get("https://example.com/a").with_header("X-Test", "1");
        assert_eq!(request.method, "GET");
        assert_eq!(request.headers.len(), 1);
        assert!(request.body.is_none());
    }
}
