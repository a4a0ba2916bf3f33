//! # mcs-connectors
//!
//! Transport layer for the Marketing Cloud inventory engine.
//!
//! This crate owns everything that talks to the remote platform: the OAuth2
//! token manager, the REST and SOAP clients with retry and pagination, and
//! the adaptive rate limiter that paces extractor traffic. All network I/O
//! goes through the [`HttpBackend`] trait so tests can script responses
//! without a live endpoint.

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod rate_limit;
pub mod rest;
pub mod secure_string;
pub mod soap;
pub mod testing;

pub use auth::TokenManager;
pub use config::ConnectionConfig;
pub use error::{TransportError, TransportResult};
pub use http::{HttpBackend, HttpRequest, HttpResponse, ReqwestBackend, RequestBody, RequestQuota};
pub use rate_limit::{AdaptiveRateLimiter, RateLimitGuard, RateLimiterConfig, RateLimiterStatus};
pub use rest::{ApiResponse, RestClient};
pub use secure_string::SecureString;
pub use soap::{RetrieveOutcome, SimpleFilter, SoapClient};
