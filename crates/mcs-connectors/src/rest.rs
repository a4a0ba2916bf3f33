//! REST client with retry, auth refresh, and pagination.

use crate::auth::TokenManager;
use crate::error::{TransportError, TransportResult};
use crate::http::{HttpBackend, HttpRequest, HttpResponse, RequestBody};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// HTTP statuses worth another attempt.
const RETRYABLE_STATUS: [u16; 5] = [429, 500, 502, 503, 504];

/// Base delay between retries.
const RETRY_BASE: Duration = Duration::from_secs(1);

/// Fallback wait for a 429 without a usable `Retry-After`.
const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);

/// 429s with a `Retry-After` header do not consume retry attempts; this
/// bounds how many such waits a single request will sit through.
const MAX_RATE_LIMIT_WAITS: u32 = 10;

/// Hard ceiling on pages fetched by [`RestClient::get_paged`].
pub const PAGE_CEILING: u32 = 10_000;

/// Default collection page size.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Outcome of a single REST call.
///
/// `ok` mirrors the HTTP success range; non-retryable HTTP failures are
/// reported here rather than as errors so callers can decide per endpoint
/// (a 404 on a detail fetch is routine). Transport-level failures (retries
/// exhausted, fatal auth, cancellation) surface as [`TransportError`].
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub ok: bool,
    pub status: u16,
    pub data: serde_json::Value,
    pub error: Option<String>,
    /// Number of 429 responses absorbed while serving this call.
    pub rate_limit_hits: u32,
}

/// Accumulated result of a paginated collection fetch.
///
/// A transport failure mid-pagination does not discard earlier pages; it is
/// carried in `error` so the extractor can emit a partial result.
#[derive(Debug, Default)]
pub struct PagedOutcome {
    pub items: Vec<serde_json::Value>,
    pub pages: u32,
    pub rate_limit_hits: u32,
    pub error: Option<TransportError>,
}

/// Paginated JSON client for the platform's REST surface.
pub struct RestClient {
    backend: Arc<dyn HttpBackend>,
    tokens: Arc<TokenManager>,
    base_url: String,
    max_retries: u32,
    cancel: CancellationToken,
}

impl RestClient {
    pub fn new(
        base_url: impl Into<String>,
        backend: Arc<dyn HttpBackend>,
        tokens: Arc<TokenManager>,
        max_retries: u32,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            backend,
            tokens,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_retries: max_retries.max(1),
            cancel,
        }
    }

    fn build_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// GET a path relative to the REST base.
    pub async fn get(&self, path: &str) -> TransportResult<ApiResponse> {
        self.request("GET", path, None).await
    }

    /// POST a JSON body to a path relative to the REST base.
    pub async fn post(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> TransportResult<ApiResponse> {
        self.request("POST", path, Some(body)).await
    }

    /// Executes a request with the full retry policy:
    /// up to `max_retries` attempts for 5xx and network errors with
    /// exponential backoff and jitter, `Retry-After`-honoring waits for 429
    /// (uncounted, bounded), and a single uncounted retry after the first
    /// 401 once the token has been force-refreshed.
    pub async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> TransportResult<ApiResponse> {
        let url = self.build_url(path);
        let mut attempt: u32 = 0;
        let mut refreshed_after_401 = false;
        let mut rate_limit_waits: u32 = 0;
        let mut rate_limit_hits: u32 = 0;

        loop {
            self.check_cancel()?;
            let token = self.tokens.get_token().await?;

            let mut request = HttpRequest {
                method: method.to_string(),
                url: url.clone(),
                headers: vec![(
                    "Authorization".to_string(),
                    format!("Bearer {}", token.expose()),
                )],
                body: body.clone().map(RequestBody::Json),
            };
            request = request.with_header("Accept", "application/json");

            attempt += 1;
            let sent = tokio::select! {
                _ = self.cancel.cancelled() => Err(TransportError::Canceled),
                result = self.backend.execute(request) => result,
            };

            match sent {
                Ok(response) if response.status == 401 => {
                    if refreshed_after_401 {
                        return Err(TransportError::AuthFailed(
                            "request rejected again after token refresh".to_string(),
                        ));
                    }
                    refreshed_after_401 = true;
                    attempt -= 1;
                    self.tokens.force_refresh("rest 401").await?;
                }
                Ok(response) if response.status == 429 => {
                    rate_limit_hits += 1;
                    let header_wait = retry_after(&response);
                    let counted = header_wait.is_none();
                    if counted && attempt >= self.max_retries {
                        return Err(TransportError::RateLimited(
                            DEFAULT_RATE_LIMIT_WAIT.as_secs(),
                        ));
                    }
                    if !counted {
                        attempt -= 1;
                        rate_limit_waits += 1;
                        if rate_limit_waits > MAX_RATE_LIMIT_WAITS {
                            return Err(TransportError::RateLimited(
                                header_wait.map_or(0, |d| d.as_secs()),
                            ));
                        }
                    }
                    let wait = header_wait.unwrap_or(DEFAULT_RATE_LIMIT_WAIT);
                    warn!(path, wait_secs = wait.as_secs(), "rate limited");
                    self.sleep_cancellable(wait).await?;
                }
                Ok(response) if RETRYABLE_STATUS.contains(&response.status) => {
                    if attempt >= self.max_retries {
                        return Err(TransportError::RetriesExhausted(format!(
                            "{} {} kept returning {}",
                            method, path, response.status
                        )));
                    }
                    let wait = backoff_with_jitter(attempt);
                    debug!(path, status = response.status, ?wait, "retrying");
                    self.sleep_cancellable(wait).await?;
                }
                Ok(response) => {
                    return Ok(finish_response(response, rate_limit_hits));
                }
                Err(TransportError::Canceled) => return Err(TransportError::Canceled),
                Err(e) if e.is_retryable() => {
                    if attempt >= self.max_retries {
                        return Err(TransportError::RetriesExhausted(e.to_string()));
                    }
                    let wait = backoff_with_jitter(attempt);
                    debug!(path, error = %e, ?wait, "retrying after network error");
                    self.sleep_cancellable(wait).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Iterates a collection endpoint with `$page`/`$pageSize`, stopping on
    /// an empty or short page. Failures after the first page keep the
    /// accumulated items.
    pub async fn get_paged(&self, path: &str, page_size: u32) -> PagedOutcome {
        let mut outcome = PagedOutcome::default();
        let separator = if path.contains('?') { '&' } else { '?' };

        for page in 1..=PAGE_CEILING {
            let page_path = format!("{path}{separator}$page={page}&$pageSize={page_size}");
            let response = match self.get(&page_path).await {
                Ok(response) => response,
                Err(e) => {
                    outcome.error = Some(e);
                    break;
                }
            };
            outcome.rate_limit_hits += response.rate_limit_hits;

            if !response.ok {
                outcome.error = Some(TransportError::RequestFailed {
                    status: response.status,
                    message: response
                        .error
                        .unwrap_or_else(|| "collection fetch failed".to_string()),
                });
                break;
            }

            let items = response
                .data
                .get("items")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            let count = items.len();
            outcome.items.extend(items);
            outcome.pages = page;

            if count == 0 || (count as u32) < page_size {
                break;
            }
        }

        outcome
    }

    fn check_cancel(&self) -> TransportResult<()> {
        if self.cancel.is_cancelled() {
            Err(TransportError::Canceled)
        } else {
            Ok(())
        }
    }

    async fn sleep_cancellable(&self, duration: Duration) -> TransportResult<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(TransportError::Canceled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

fn finish_response(response: HttpResponse, rate_limit_hits: u32) -> ApiResponse {
    let ok = response.is_success();
    let data = if response.body.trim().is_empty() {
        serde_json::Value::Null
    } else {
        response
            .json()
            .unwrap_or_else(|_| serde_json::Value::String(response.body.clone()))
    };
    let error = if ok {
        None
    } else {
        Some(response.body.chars().take(500).collect())
    };
    ApiResponse {
        ok,
        status: response.status,
        data,
        error,
        rate_limit_hits,
    }
}

/// Parses `Retry-After` as either delta-seconds or an HTTP-date.
fn retry_after(response: &HttpResponse) -> Option<Duration> {
    let value = response.header("retry-after")?;
    if let Ok(secs) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let when = chrono::DateTime::parse_from_rfc2822(value.trim()).ok()?;
    let delta = when.signed_duration_since(chrono::Utc::now());
    Some(Duration::from_secs(delta.num_seconds().max(0) as u64))
}

/// `base * 2^(attempt-1)` with ±20% jitter.
fn backoff_with_jitter(attempt: u32) -> Duration {
    let base_ms = RETRY_BASE.as_millis() as u64 * (1u64 << (attempt.saturating_sub(1)).min(10));
    let jitter_span = base_ms / 5;
    let jitter = pseudo_random() % (2 * jitter_span + 1);
    Duration::from_millis(base_ms - jitter_span + jitter)
}

/// Cheap jitter source; statistical quality does not matter here.
fn pseudo_random() -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    std::time::Instant::now().hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;
    use crate::testing::{MockBackend, MockResponse};
    use serde_json::json;

    fn client_with(backend: Arc<MockBackend>) -> RestClient {
        let config = ConnectionConfig {
            rest_base: "https://x.rest.example.com".into(),
            soap_base: "https://x.soap.example.com/Service.asmx".into(),
            auth_base: "https://x.auth.example.com".into(),
            client_id: "cid".into(),
            client_secret: "cs".into(),
            account_id: None,
            timeout_secs: 60,
            max_retries: 3,
            verify_tls: true,
        };
        backend.on("/v2/token").always(MockResponse::json(
            200,
            json!({"access_token": "tok", "expires_in": 3600}),
        ));
        let tokens = Arc::new(TokenManager::new(config, backend.clone() as Arc<dyn HttpBackend>));
        RestClient::new(
            "https://x.rest.example.com",
            backend,
            tokens,
            3,
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn recovers_from_single_401_with_one_refresh() {
        let backend = Arc::new(MockBackend::new());
        let route = backend.on("/automation/v1/queries");
        route.push(MockResponse::text(401, "expired"));
        route.push(MockResponse::json(200, json!({"items": [1, 2]})));

        let client = client_with(backend.clone());
        let response = client.get("/automation/v1/queries").await.unwrap();
        assert!(response.ok);
        // One initial exchange plus exactly one forced refresh.
        assert_eq!(backend.requests_to("/v2/token").len(), 2);
    }

    #[tokio::test]
    async fn second_401_is_fatal() {
        let backend = Arc::new(MockBackend::new());
        backend
            .on("/automation/v1/queries")
            .always(MockResponse::text(401, "expired"));

        let client = client_with(backend);
        let err = client.get("/automation/v1/queries").await.unwrap_err();
        assert!(matches!(err, TransportError::AuthFailed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn honors_retry_after_seconds() {
        let backend = Arc::new(MockBackend::new());
        let route = backend.on("/automation/v1/automations");
        route.push(MockResponse::rate_limited(5));
        route.push(MockResponse::json(200, json!({"items": []})));

        let client = client_with(backend);
        let started = tokio::time::Instant::now();
        let response = client.get("/automation/v1/automations").await.unwrap();
        assert!(response.ok);
        assert_eq!(response.rate_limit_hits, 1);
        assert!(started.elapsed() >= Duration::from_millis(4500));
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_429_with_retry_after_eventually_succeeds() {
        let backend = Arc::new(MockBackend::new());
        let route = backend.on("/automation/v1/imports");
        for _ in 0..5 {
            route.push(MockResponse::rate_limited(1));
        }
        route.push(MockResponse::json(200, json!({"items": [{"id": 1}]})));

        let client = client_with(backend);
        let started = tokio::time::Instant::now();
        let response = client.get("/automation/v1/imports").await.unwrap();
        assert!(response.ok);
        assert_eq!(response.rate_limit_hits, 5);
        // Five one-second waits, each at least 0.9s.
        assert!(started.elapsed() >= Duration::from_millis(4500));
    }

    #[tokio::test(start_paused = true)]
    async fn server_errors_exhaust_retries() {
        let backend = Arc::new(MockBackend::new());
        backend
            .on("/interaction/v1/interactions")
            .always(MockResponse::text(503, "unavailable"));

        let client = client_with(backend.clone());
        let err = client.get("/interaction/v1/interactions").await.unwrap_err();
        assert!(matches!(err, TransportError::RetriesExhausted(_)));
        assert_eq!(backend.requests_to("/interaction/v1/interactions").len(), 3);
    }

    #[tokio::test]
    async fn non_retryable_status_fails_immediately_with_ok_false() {
        let backend = Arc::new(MockBackend::new());
        backend
            .on("/data/v1/customobjects/abc/fields")
            .push(MockResponse::text(404, "missing"));

        let client = client_with(backend.clone());
        let response = client
            .get("/data/v1/customobjects/abc/fields")
            .await
            .unwrap();
        assert!(!response.ok);
        assert_eq!(response.status, 404);
        assert_eq!(backend.requests_to("/data/v1").len(), 1);
    }

    #[tokio::test]
    async fn pagination_stops_on_short_page() {
        let backend = Arc::new(MockBackend::new());
        let route = backend.on("/automation/v1/queries");
        route.push(MockResponse::json(
            200,
            json!({"items": [{"id": 1}, {"id": 2}]}),
        ));
        route.push(MockResponse::json(200, json!({"items": [{"id": 3}]})));

        let client = client_with(backend.clone());
        let outcome = client.get_paged("/automation/v1/queries", 2).await;
        assert!(outcome.error.is_none());
        assert_eq!(outcome.items.len(), 3);
        assert_eq!(outcome.pages, 2);
    }

    #[tokio::test]
    async fn pagination_exact_page_size_terminates_on_empty_page() {
        let backend = Arc::new(MockBackend::new());
        let route = backend.on("/automation/v1/scripts");
        route.push(MockResponse::json(
            200,
            json!({"items": [{"id": 1}, {"id": 2}]}),
        ));
        route.push(MockResponse::json(200, json!({"items": []})));

        let client = client_with(backend.clone());
        let outcome = client.get_paged("/automation/v1/scripts", 2).await;
        assert!(outcome.error.is_none());
        assert_eq!(outcome.items.len(), 2);
        assert_eq!(outcome.pages, 2);
        assert_eq!(backend.requests_to("/automation/v1/scripts").len(), 2);
    }

    #[tokio::test]
    async fn empty_collection_yields_no_items_and_no_error() {
        let backend = Arc::new(MockBackend::new());
        backend
            .on("/automation/v1/filters")
            .push(MockResponse::json(200, json!({"items": []})));

        let client = client_with(backend);
        let outcome = client.get_paged("/automation/v1/filters", 50).await;
        assert!(outcome.error.is_none());
        assert!(outcome.items.is_empty());
        assert_eq!(outcome.pages, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn pagination_failure_keeps_accumulated_items() {
        let backend = Arc::new(MockBackend::new());
        let route = backend.on("/automation/v1/dataextracts");
        route.push(MockResponse::json(
            200,
            json!({"items": [{"id": 1}, {"id": 2}]}),
        ));
        route.always(MockResponse::text(500, "boom"));

        let client = client_with(backend);
        let outcome = client.get_paged("/automation/v1/dataextracts", 2).await;
        assert_eq!(outcome.items.len(), 2);
        assert!(matches!(
            outcome.error,
            Some(TransportError::RetriesExhausted(_))
        ));
    }

    #[tokio::test]
    async fn cancellation_aborts_request() {
        let backend = Arc::new(MockBackend::new());
        backend.on("/v2/token").always(MockResponse::json(
            200,
            json!({"access_token": "tok", "expires_in": 3600}),
        ));
        let config = ConnectionConfig {
            rest_base: "https://x.rest.example.com".into(),
            soap_base: "https://x.soap.example.com/Service.asmx".into(),
            auth_base: "https://x.auth.example.com".into(),
            client_id: "cid".into(),
            client_secret: "cs".into(),
            account_id: None,
            timeout_secs: 60,
            max_retries: 3,
            verify_tls: true,
        };
        let tokens = Arc::new(TokenManager::new(
            config,
            backend.clone() as Arc<dyn HttpBackend>,
        ));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let client = RestClient::new(
            "https://x.rest.example.com",
            backend,
            tokens,
            3,
            cancel,
        );
        let err = client.get("/automation/v1/queries").await.unwrap_err();
        assert!(matches!(err, TransportError::Canceled));
    }

    #[test]
    fn retry_after_parses_http_date() {
        let when = chrono::Utc::now() + chrono::Duration::seconds(30);
        let response = HttpResponse {
            status: 429,
            headers: [(
                "retry-after".to_string(),
                when.to_rfc2822(),
            )]
            .into_iter()
            .collect(),
            body: String::new(),
        };
        let wait = retry_after(&response).unwrap();
        assert!(wait <= Duration::from_secs(30));
        assert!(wait >= Duration::from_secs(25));
    }

    #[test]
    fn backoff_grows_and_jitters_within_bounds() {
        let first = backoff_with_jitter(1);
        assert!(first >= Duration::from_millis(800) && first <= Duration::from_millis(1200));
        let second = backoff_with_jitter(2);
        assert!(second >= Duration::from_millis(1600) && second <= Duration::from_millis(2400));
    }
}
