//! OAuth2 token management.
//!
//! One valid access token is held per engine run. Concurrent callers that
//! find the token stale collapse onto a single network exchange: the first
//! caller performs the refresh while holding the refresh mutex and everyone
//! else re-checks the cache once the mutex is released.

use crate::config::ConnectionConfig;
use crate::error::{TransportError, TransportResult};
use crate::http::{HttpBackend, HttpRequest, RequestBody};
use crate::secure_string::SecureString;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Tokens are treated as stale this long before their actual expiry.
const EXPIRY_SKEW: Duration = Duration::from_secs(60);

/// Attempts for the token exchange itself.
const REFRESH_ATTEMPTS: u32 = 3;

/// Fallback lifetime when the server omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: u64 = 1200;

struct CachedToken {
    token: SecureString,
    expires_at: Instant,
    generation: u64,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + EXPIRY_SKEW < self.expires_at
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Single-flight OAuth2 client-credentials token cache.
pub struct TokenManager {
    config: ConnectionConfig,
    backend: Arc<dyn HttpBackend>,
    cached: RwLock<Option<CachedToken>>,
    refresh_lock: Mutex<()>,
}

impl TokenManager {
    pub fn new(config: ConnectionConfig, backend: Arc<dyn HttpBackend>) -> Self {
        Self {
            config,
            backend,
            cached: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Returns a valid access token, refreshing if the cached one is stale.
    pub async fn get_token(&self) -> TransportResult<SecureString> {
        if let Some(token) = self.fresh_token().await {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;
        // Re-check: another caller may have refreshed while we waited.
        if let Some(token) = self.fresh_token().await {
            return Ok(token);
        }
        self.exchange().await
    }

    /// Invalidates the current token and obtains a new one.
    ///
    /// Concurrent calls collapse to one exchange; callers that queued behind
    /// an in-flight refresh receive the token it produced.
    pub async fn force_refresh(&self, reason: &str) -> TransportResult<SecureString> {
        let observed = self.current_generation().await;
        debug!(reason, "forcing token refresh");

        let _guard = self.refresh_lock.lock().await;
        if self.current_generation().await != observed {
            if let Some(token) = self.fresh_token().await {
                return Ok(token);
            }
        }
        self.exchange().await
    }

    async fn fresh_token(&self) -> Option<SecureString> {
        let cached = self.cached.read().await;
        cached
            .as_ref()
            .filter(|t| t.is_fresh())
            .map(|t| t.token.clone())
    }

    async fn current_generation(&self) -> u64 {
        self.cached.read().await.as_ref().map_or(0, |t| t.generation)
    }

    /// Performs the client-credentials exchange. Must be called with the
    /// refresh lock held. A failed exchange leaves the cache untouched.
    async fn exchange(&self) -> TransportResult<SecureString> {
        let mut fields = vec![
            ("grant_type".to_string(), "client_credentials".to_string()),
            ("client_id".to_string(), self.config.client_id.clone()),
            (
                "client_secret".to_string(),
                self.config.client_secret.expose().to_string(),
            ),
        ];
        if let Some(account_id) = &self.config.account_id {
            fields.push(("account_id".to_string(), account_id.clone()));
        }

        let mut last_error = String::from("no attempts made");
        for attempt in 1..=REFRESH_ATTEMPTS {
            if attempt > 1 {
                let delay = Duration::from_secs(1u64 << (attempt - 2));
                tokio::time::sleep(delay).await;
            }

            let request = HttpRequest::post(
                self.config.token_url(),
                RequestBody::Form(fields.clone()),
            );

            match self.backend.execute(request).await {
                Ok(response) if response.is_success() => {
                    let parsed: TokenResponse =
                        serde_json::from_str(&response.body).map_err(|e| {
                            TransportError::AuthFailed(format!("bad token response: {}", e))
                        })?;
                    let expires_in = parsed.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);
                    let token = SecureString::new(parsed.access_token);

                    let mut cached = self.cached.write().await;
                    let generation = cached.as_ref().map_or(0, |t| t.generation) + 1;
                    *cached = Some(CachedToken {
                        token: token.clone(),
                        expires_at: Instant::now() + Duration::from_secs(expires_in),
                        generation,
                    });
                    info!(expires_in, "obtained access token");
                    return Ok(token);
                }
                Ok(response) => {
                    last_error = format!("token endpoint returned {}", response.status);
                    // 4xx from the auth server will not heal on retry.
                    if (400..500).contains(&response.status) {
                        break;
                    }
                    warn!(status = response.status, attempt, "token exchange failed");
                }
                Err(TransportError::Canceled) => return Err(TransportError::Canceled),
                Err(e) => {
                    last_error = e.to_string();
                    warn!(error = %e, attempt, "token exchange failed");
                }
            }
        }

        Err(TransportError::AuthFailed(last_error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{json_body, MockBackend, MockResponse};

    fn test_config() -> ConnectionConfig {
        ConnectionConfig {
            rest_base: "https://x.rest.example.com".into(),
            soap_base: "https://x.soap.example.com/Service.asmx".into(),
            auth_base: "https://x.auth.example.com".into(),
            client_id: "cid".into(),
            client_secret: "cs".into(),
            account_id: Some("510001234".into()),
            timeout_secs: 60,
            max_retries: 3,
            verify_tls: true,
        }
    }

    fn token_response(token: &str) -> MockResponse {
        MockResponse::json(
            200,
            serde_json::json!({"access_token": token, "expires_in": 3600}),
        )
    }

    #[tokio::test]
    async fn caches_token_until_stale() {
        let backend = Arc::new(MockBackend::new());
        backend.on("/v2/token").push(token_response("tok-1"));

        let manager = TokenManager::new(test_config(), backend.clone());
        assert_eq!(manager.get_token().await.unwrap().expose(), "tok-1");
        assert_eq!(manager.get_token().await.unwrap().expose(), "tok-1");
        assert_eq!(backend.request_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_exchange() {
        let backend = Arc::new(MockBackend::new());
        backend.on("/v2/token").push(token_response("tok-1"));

        let manager = Arc::new(TokenManager::new(test_config(), backend.clone()));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = Arc::clone(&manager);
            handles.push(tokio::spawn(async move { manager.get_token().await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().expose(), "tok-1");
        }
        assert_eq!(backend.request_count(), 1);
    }

    #[tokio::test]
    async fn force_refresh_collapses_and_replaces() {
        let backend = Arc::new(MockBackend::new());
        let route = backend.on("/v2/token");
        route.push(token_response("tok-1"));
        route.push(token_response("tok-2"));

        let manager = TokenManager::new(test_config(), backend.clone());
        assert_eq!(manager.get_token().await.unwrap().expose(), "tok-1");
        assert_eq!(
            manager.force_refresh("401 observed").await.unwrap().expose(),
            "tok-2"
        );
        assert_eq!(manager.get_token().await.unwrap().expose(), "tok-2");
        assert_eq!(backend.request_count(), 2);
    }

    #[tokio::test]
    async fn auth_failure_does_not_clobber_nothing_and_is_typed() {
        let backend = Arc::new(MockBackend::new());
        backend
            .on("/v2/token")
            .push(MockResponse::json(401, json_body(r#"{"error":"invalid_client"}"#)));

        let manager = TokenManager::new(test_config(), backend.clone());
        let err = manager.get_token().await.unwrap_err();
        assert!(matches!(err, TransportError::AuthFailed(_)));
        // 4xx from the auth server is not retried.
        assert_eq!(backend.request_count(), 1);
    }

    #[tokio::test]
    async fn sends_account_id_with_exchange() {
        let backend = Arc::new(MockBackend::new());
        backend.on("/v2/token").push(token_response("tok-1"));

        let manager = TokenManager::new(test_config(), backend.clone());
        manager.get_token().await.unwrap();

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        match &requests[0].body {
            Some(RequestBody::Form(fields)) => {
                assert!(fields
                    .iter()
                    .any(|(k, v)| k == "account_id" && v == "510001234"));
                assert!(fields
                    .iter()
                    .any(|(k, v)| k == "grant_type" && v == "client_credentials"));
            }
            other => panic!("expected form body, got {:?}", other),
        }
    }
}
