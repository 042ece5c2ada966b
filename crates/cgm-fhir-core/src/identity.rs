use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::config::IdentityConfig;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("token endpoint not configured")]
    NotConfigured,
    #[error("token endpoint answered {0}")]
    Status(u16),
    #[error("token response had an empty access_token")]
    EmptyToken,
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for IdentityError {
    fn from(err: reqwest::Error) -> Self {
        IdentityError::Transport(err.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: i64,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Requests a fresh bearer token. Nothing is cached between calls.
    async fn token(&self) -> Result<String, IdentityError>;
}

/// OAuth2 client-credentials grant against a single token endpoint.
pub struct ClientCredentialsClient {
    http: Client,
    config: IdentityConfig,
}

impl ClientCredentialsClient {
    pub fn new(http: Client, config: IdentityConfig) -> Self {
        Self { http, config }
    }
}

#[async_trait]
impl IdentityProvider for ClientCredentialsClient {
    async fn token(&self) -> Result<String, IdentityError> {
        if self.config.token_endpoint.trim().is_empty() {
            return Err(IdentityError::NotConfigured);
        }

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("scope", self.config.scope.as_str()),
        ];

        let response = self
            .http
            .post(&self.config.token_endpoint)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(IdentityError::Status(status.as_u16()));
        }

        let token: TokenResponse = response.json().await?;
        if token.access_token.is_empty() {
            return Err(IdentityError::EmptyToken);
        }
        Ok(token.access_token)
    }
}
