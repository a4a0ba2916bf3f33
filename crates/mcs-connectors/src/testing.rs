//! Scripted HTTP backend for tests.
//!
//! [`MockBackend`] routes requests by URL substring to queues of canned
//! responses, records every request it sees, and lets tests inject
//! network-level errors. Used across the workspace to exercise retry,
//! auth-refresh, and pagination behavior without a live endpoint.

use crate::error::{TransportError, TransportResult};
use crate::http::{HttpBackend, HttpRequest, HttpResponse};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
enum Outcome {
    Http {
        status: u16,
        headers: Vec<(String, String)>,
        body: String,
    },
    Error(TransportError),
}

/// A canned response (or injected error).
#[derive(Clone)]
pub struct MockResponse {
    outcome: Outcome,
}

impl MockResponse {
    /// JSON response with the given status.
    pub fn json(status: u16, value: serde_json::Value) -> Self {
        Self {
            outcome: Outcome::Http {
                status,
                headers: Vec::new(),
                body: value.to_string(),
            },
        }
    }

    /// Plain-text / XML response with the given status.
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Http {
                status,
                headers: Vec::new(),
                body: body.into(),
            },
        }
    }

    /// A 429 carrying a `Retry-After` header in seconds.
    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::text(429, "").with_header("Retry-After", retry_after_secs.to_string())
    }

    /// Injects a transport-level error instead of a response.
    pub fn error(error: TransportError) -> Self {
        Self {
            outcome: Outcome::Error(error),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let Outcome::Http { headers, .. } = &mut self.outcome {
            headers.push((name.into(), value.into()));
        }
        self
    }

    fn to_result(&self) -> TransportResult<HttpResponse> {
        match &self.outcome {
            Outcome::Http {
                status,
                headers,
                body,
            } => Ok(HttpResponse {
                status: *status,
                headers: headers
                    .iter()
                    .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
                    .collect(),
                body: body.clone(),
            }),
            Outcome::Error(e) => Err(e.clone()),
        }
    }
}

#[derive(Default)]
struct RouteState {
    queue: Mutex<VecDeque<MockResponse>>,
    fallback: Mutex<Option<MockResponse>>,
}

/// Handle for scripting one route.
#[derive(Clone)]
pub struct RouteHandle {
    state: Arc<RouteState>,
}

impl RouteHandle {
    /// Queues a one-shot response.
    pub fn push(&self, response: MockResponse) -> &Self {
        self.state.lock_queue().push_back(response);
        self
    }

    /// Sets the response used whenever the queue is empty.
    pub fn always(&self, response: MockResponse) -> &Self {
        *self.state.fallback.lock().unwrap() = Some(response);
        self
    }
}

impl RouteState {
    fn lock_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<MockResponse>> {
        self.queue.lock().unwrap()
    }

    fn next(&self) -> Option<MockResponse> {
        if let Some(response) = self.lock_queue().pop_front() {
            return Some(response);
        }
        self.fallback.lock().unwrap().clone()
    }
}

/// Route-matched scripted HTTP backend.
#[derive(Default)]
pub struct MockBackend {
    routes: Mutex<Vec<(String, Arc<RouteState>)>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or fetches) the route whose pattern is a substring of
    /// matching request URLs. The longest matching pattern wins.
    pub fn on(&self, pattern: impl Into<String>) -> RouteHandle {
        let pattern = pattern.into();
        let mut routes = self.routes.lock().unwrap();
        if let Some((_, state)) = routes.iter().find(|(p, _)| *p == pattern) {
            return RouteHandle {
                state: Arc::clone(state),
            };
        }
        let state = Arc::new(RouteState::default());
        routes.push((pattern, Arc::clone(&state)));
        RouteHandle { state }
    }

    /// All requests executed so far, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Requests whose URL contains the given fragment.
    pub fn requests_to(&self, fragment: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url.contains(fragment))
            .collect()
    }

    fn route_for(&self, url: &str) -> Option<Arc<RouteState>> {
        let routes = self.routes.lock().unwrap();
        routes
            .iter()
            .filter(|(pattern, _)| url.contains(pattern.as_str()))
            .max_by_key(|(pattern, _)| pattern.len())
            .map(|(_, state)| Arc::clone(state))
    }
}

#[async_trait]
impl HttpBackend for MockBackend {
    async fn execute(&self, request: HttpRequest) -> TransportResult<HttpResponse> {
        let url = request.url.clone();
        self.requests.lock().unwrap().push(request);

        match self.route_for(&url).and_then(|route| route.next()) {
            Some(response) => response.to_result(),
            None => Ok(HttpResponse {
                status: 404,
                headers: HashMap::new(),
                body: format!("{{\"error\":\"no mock for {}\"}}", url),
            }),
        }
    }
}

/// Parses a JSON literal, panicking on malformed test fixtures.
pub fn json_body(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).expect("test fixture must be valid JSON")
}

/// An empty REST collection page (`{"items": []}`).
pub fn empty_page() -> MockResponse {
    MockResponse::json(200, serde_json::json!({ "items": [] }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn longest_pattern_wins() {
        let backend = MockBackend::new();
        backend
            .on("/automation/v1/automations")
            .always(MockResponse::json(200, serde_json::json!({"kind": "list"})));
        backend
            .on("/automation/v1/automations/a-1")
            .always(MockResponse::json(200, serde_json::json!({"kind": "detail"})));

        let detail = backend
            .execute(HttpRequest::get(
                "https://x/automation/v1/automations/a-1",
            ))
            .await
            .unwrap();
        assert!(detail.body.contains("detail"));

        let list = backend
            .execute(HttpRequest::get("https://x/automation/v1/automations?$page=1"))
            .await
            .unwrap();
        assert!(list.body.contains("list"));
    }

    #[tokio::test]
    async fn queue_drains_then_fallback() {
        let backend = MockBackend::new();
        let route = backend.on("/thing");
        route.push(MockResponse::text(500, "boom"));
        route.always(MockResponse::text(200, "ok"));

        let first = backend
            .execute(HttpRequest::get("https://x/thing"))
            .await
            .unwrap();
        assert_eq!(first.status, 500);
        let second = backend
            .execute(HttpRequest::get("https://x/thing"))
            .await
            .unwrap();
        assert_eq!(second.status, 200);
    }

    #[tokio::test]
    async fn unmatched_url_is_404() {
        let backend = MockBackend::new();
        let response = backend
            .execute(HttpRequest::get("https://x/nowhere"))
            .await
            .unwrap();
        assert_eq!(response.status, 404);
    }
}
