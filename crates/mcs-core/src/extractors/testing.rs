//! Test fixtures for extractor and cache scenarios.
//!
//! Builds a full engine context (REST + SOAP clients, caches, limiter)
//! over a scripted [`MockBackend`], with the token route pre-registered.

use super::{ExtractorContext, ExtractorOptions};
use crate::cache::CacheManager;
use mcs_connectors::testing::{MockBackend, MockResponse};
use mcs_connectors::{
    AdaptiveRateLimiter, ConnectionConfig, HttpBackend, RateLimiterConfig, RestClient, SoapClient,
    TokenManager,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A scripted engine: backend plus the clients wired over it.
pub struct EngineFixture {
    pub backend: Arc<MockBackend>,
    pub rest: Arc<RestClient>,
    pub soap: Arc<SoapClient>,
    pub cancel: CancellationToken,
}

impl EngineFixture {
    /// Wraps retrieve results in a SOAP response envelope.
    pub fn soap_body(&self, status: &str, request_id: &str, results: &str) -> String {
        soap_retrieve_body(status, request_id, results)
    }

    /// Builds an [`ExtractorContext`] over this fixture.
    pub fn context(&self) -> ExtractorContext {
        self.context_with_options(ExtractorOptions::default())
    }

    pub fn context_with_options(&self, options: ExtractorOptions) -> ExtractorContext {
        ExtractorContext {
            rest: self.rest.clone(),
            soap: self.soap.clone(),
            cache: Arc::new(CacheManager::new(self.rest.clone(), self.soap.clone())),
            limiter: Arc::new(AdaptiveRateLimiter::new(RateLimiterConfig {
                // Keep pacing out of the way of unpaused test clocks.
                initial_delay: Duration::from_millis(0),
                min_delay: Duration::from_millis(0),
                ..RateLimiterConfig::default()
            })),
            options,
            progress: None,
            cancel: self.cancel.clone(),
        }
    }
}

/// A fresh fixture with the OAuth token route already scripted.
pub fn engine_fixture() -> EngineFixture {
    let backend = Arc::new(MockBackend::new());
    backend.on("/v2/token").always(MockResponse::json(
        200,
        serde_json::json!({"access_token": "tok", "expires_in": 3600}),
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

    let cancel = CancellationToken::new();
    let tokens = Arc::new(TokenManager::new(
        config,
        backend.clone() as Arc<dyn HttpBackend>,
    ));
    let rest = Arc::new(RestClient::new(
        "https://x.rest.example.com",
        backend.clone() as Arc<dyn HttpBackend>,
        tokens.clone(),
        3,
        cancel.clone(),
    ));
    let soap = Arc::new(SoapClient::new(
        "https://x.soap.example.com/Service.asmx",
        backend.clone() as Arc<dyn HttpBackend>,
        tokens,
        3,
        cancel.clone(),
    ));

    EngineFixture {
        backend,
        rest,
        soap,
        cancel,
    }
}

/// Wraps retrieve results in a SOAP response envelope.
pub fn soap_retrieve_body(status: &str, request_id: &str, results: &str) -> String {
    format!(
        "<soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\" \
         xmlns=\"http://exacttarget.com/wsdl/partnerAPI\"><soap:Body>\
         <RetrieveResponseMsg><OverallStatus>{status}</OverallStatus>\
         <RequestID>{request_id}</RequestID>{results}\
         </RetrieveResponseMsg></soap:Body></soap:Envelope>"
    )
}
