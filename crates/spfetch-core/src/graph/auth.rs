//! App-only authentication against Microsoft Entra ID.
//!
//! Tokens are obtained with the OAuth2 client-credentials grant:
//! 1. Look for a cached token that is not about to expire
//! 2. Otherwise POST `client_id`, `client_secret` and `scope` to the tenant's
//!    v2.0 token endpoint and cache the answer in memory
//!
//! Nothing is persisted; a new provider starts with an empty cache.

use std::fmt;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::{RunConfig, Secret};
use crate::CoreError;

/// Tokens expiring within this window are treated as already expired.
const EXPIRY_SKEW: Duration = Duration::from_secs(300);

/// Errors that can occur while acquiring a token.
#[derive(Debug, Error)]
pub enum AuthenticationError {
    /// The identity provider answered with an OAuth2 error.
    #[error("identity provider rejected the client ({status}): {description}")]
    Rejected {
        /// HTTP status of the token response.
        status: u16,
        /// `error_description` (or `error`) from the response body.
        description: String,
    },

    /// The token endpoint could not be reached.
    #[error("identity provider unreachable: {0}")]
    Unreachable(String),

    /// The token endpoint answered 2xx with an unusable body.
    #[error("unexpected token response: {0}")]
    MalformedResponse(String),
}

impl From<AuthenticationError> for CoreError {
    fn from(e: AuthenticationError) -> Self {
        Self::Auth(e.to_string())
    }
}

/// A bearer access token. The value never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a raw access token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token for an `Authorization: Bearer` header.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    credential: Credential,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self, now: Instant) -> bool {
        now + EXPIRY_SKEW < self.expires_at
    }
}

/// Acquires and caches app-only tokens for one run.
#[derive(Debug)]
pub struct TokenProvider {
    http_client: Client,
    token_url: String,
    client_id: String,
    client_secret: Secret,
    scope: String,
    cache: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    /// Create a provider for the tenant and app registration in `config`.
    #[must_use]
    pub fn new(http_client: Client, config: &RunConfig) -> Self {
        Self {
            http_client,
            token_url: config.token_url(),
            client_id: config.client_id().to_string(),
            client_secret: config.client_secret().clone(),
            scope: config.scope().to_string(),
            cache: Mutex::new(None),
        }
    }

    /// Return a bearer credential, using the cache when it is still fresh.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity provider rejects the client, cannot
    /// be reached, or returns a body without an access token.
    pub async fn get_token(&self) -> Result<Credential, AuthenticationError> {
        if let Some(credential) = self.acquire_token_silent().await {
            log::debug!("using cached access token");
            return Ok(credential);
        }

        let fresh = self.acquire_token_for_client().await?;
        let credential = fresh.credential.clone();
        *self.cache.lock().await = Some(fresh);
        Ok(credential)
    }

    /// Look up a cached token without touching the network.
    pub async fn acquire_token_silent(&self) -> Option<Credential> {
        self.cache
            .lock()
            .await
            .as_ref()
            .filter(|cached| cached.is_fresh(Instant::now()))
            .map(|cached| cached.credential.clone())
    }

    async fn acquire_token_for_client(&self) -> Result<CachedToken, AuthenticationError> {
        log::debug!("requesting app token from {}", self.token_url);

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose()),
            ("scope", self.scope.as_str()),
        ];

        let response = self
            .http_client
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthenticationError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let description = serde_json::from_str::<TokenErrorResponse>(&text).map_or_else(
                |_| text.clone(),
                |err| err.error_description.unwrap_or(err.error),
            );
            return Err(AuthenticationError::Rejected {
                status: status.as_u16(),
                description,
            });
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthenticationError::MalformedResponse(e.to_string()))?;

        if token.access_token.is_empty() {
            return Err(AuthenticationError::MalformedResponse(
                "empty access_token".to_string(),
            ));
        }

        log::info!("acquired app token (expires in {}s)", token.expires_in);

        Ok(CachedToken {
            credential: Credential::new(token.access_token),
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn config_for(server: &MockServer) -> RunConfig {
        RunConfig::builder()
            .tenant_id("tenant-1")
            .client_id("client-1")
            .client_secret(Secret::new("secret-1"))
            .download_path("/tmp/spfetch-auth-test")
            .authority_host(server.base_url())
            .build()
            .expect("valid config")
    }

    #[tokio::test]
    async fn get_token_exchanges_client_credentials() {
        let server = MockServer::start_async().await;
        let token = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/tenant-1/oauth2/v2.0/token")
                    .body_contains("grant_type=client_credentials")
                    .body_contains("client_id=client-1")
                    .body_contains("client_secret=secret-1");
                then.status(200).json_body(json!({
                    "token_type": "Bearer",
                    "expires_in": 3599,
                    "access_token": "tok-123"
                }));
            })
            .await;

        let provider = TokenProvider::new(Client::new(), &config_for(&server));
        let credential = provider.get_token().await.expect("token");

        assert_eq!(credential.secret(), "tok-123");
        token.assert_async().await;
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let server = MockServer::start_async().await;
        let token = server
            .mock_async(|when, then| {
                when.method(POST).path("/tenant-1/oauth2/v2.0/token");
                then.status(200)
                    .json_body(json!({"expires_in": 3599, "access_token": "tok-123"}));
            })
            .await;

        let provider = TokenProvider::new(Client::new(), &config_for(&server));
        assert!(provider.acquire_token_silent().await.is_none());

        provider.get_token().await.expect("first token");
        provider.get_token().await.expect("second token");

        token.assert_hits_async(1).await;
        assert!(provider.acquire_token_silent().await.is_some());
    }

    #[tokio::test]
    async fn nearly_expired_token_is_not_reused() {
        let server = MockServer::start_async().await;
        let token = server
            .mock_async(|when, then| {
                when.method(POST).path("/tenant-1/oauth2/v2.0/token");
                then.status(200)
                    .json_body(json!({"expires_in": 60, "access_token": "short-lived"}));
            })
            .await;

        let provider = TokenProvider::new(Client::new(), &config_for(&server));
        provider.get_token().await.expect("first token");
        provider.get_token().await.expect("second token");

        token.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn rejected_client_reports_error_description() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/tenant-1/oauth2/v2.0/token");
                then.status(401).json_body(json!({
                    "error": "invalid_client",
                    "error_description": "AADSTS7000215: Invalid client secret provided."
                }));
            })
            .await;

        let provider = TokenProvider::new(Client::new(), &config_for(&server));
        let err = provider.get_token().await.unwrap_err();

        match err {
            AuthenticationError::Rejected {
                status,
                ref description,
            } => {
                assert_eq!(status, 401);
                assert!(description.contains("AADSTS7000215"));
            }
            ref other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(CoreError::from(err), CoreError::Auth(_)));
    }

    #[tokio::test]
    async fn unreachable_provider_is_an_auth_error() {
        let config = RunConfig::builder()
            .tenant_id("tenant-1")
            .client_id("client-1")
            .client_secret(Secret::new("secret-1"))
            .download_path("/tmp/spfetch-auth-test")
            .authority_host("http://127.0.0.1:9")
            .build()
            .expect("valid config");

        let provider = TokenProvider::new(Client::new(), &config);
        let err = provider.get_token().await.unwrap_err();
        assert!(matches!(err, AuthenticationError::Unreachable(_)));
    }

    #[test]
    fn credential_debug_is_redacted() {
        let rendered = format!("{:?}", Credential::new("tok-123"));
        assert_eq!(rendered, "Credential(***)");
    }
}
