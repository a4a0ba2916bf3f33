//! Connection configuration for the Marketing Cloud tenant.

use crate::secure_string::SecureString;
use serde::{Deserialize, Serialize};

/// Immutable record of endpoints and credentials for one tenant.
///
/// Environment/dotenv loading lives in the CLI collaborator; library code
/// and tests construct this directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// REST API base, e.g. `https://<subdomain>.rest.marketingcloudapis.com`.
    pub rest_base: String,
    /// SOAP endpoint, e.g. `https://<subdomain>.soap.marketingcloudapis.com/Service.asmx`.
    pub soap_base: String,
    /// Auth base, e.g. `https://<subdomain>.auth.marketingcloudapis.com`.
    pub auth_base: String,
    /// OAuth2 client id.
    pub client_id: String,
    /// OAuth2 client secret (zeroized on drop).
    pub client_secret: SecureString,
    /// Business unit MID to scope the token to.
    #[serde(default)]
    pub account_id: Option<String>,
    /// Per-request timeout in seconds (connect + read).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum HTTP attempts per request.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Whether to verify TLS certificates.
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_verify_tls() -> bool {
    true
}

impl ConnectionConfig {
    /// Full URL of the OAuth2 token endpoint.
    pub fn token_url(&self) -> String {
        format!("{}/v2/token", self.auth_base.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_url_joins_without_double_slash() {
        let config = ConnectionConfig {
            rest_base: "https://x.rest.example.com".into(),
            soap_base: "https://x.soap.example.com/Service.asmx".into(),
            auth_base: "https://x.auth.example.com/".into(),
            client_id: "id".into(),
            client_secret: "secret".into(),
            account_id: None,
            timeout_secs: 60,
            max_retries: 3,
            verify_tls: true,
        };
        assert_eq!(config.token_url(), "https://x.auth.example.com/v2/token");
    }

    #[test]
    fn defaults_apply_on_deserialize() {
        let config: ConnectionConfig = serde_json::from_str(
            r#"{
                "rest_base": "https://r",
                "soap_base": "https://s",
                "auth_base": "https://a",
                "client_id": "cid",
                "client_secret": "cs"
            }"#,
        )
        .unwrap();
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.max_retries, 3);
        assert!(config.verify_tls);
        assert!(config.account_id.is_none());
    }
}
