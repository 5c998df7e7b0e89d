use crate::core::config::LogtoM2MConfig;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Machine-to-machine token from the Logto token endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct M2MToken {
    pub access_token: String,
    pub expires_in: u64,
}

struct CachedToken {
    token: M2MToken,
    fetched_at: Instant,
}

impl CachedToken {
    fn remaining(&self) -> Duration {
        Duration::from_secs(self.token.expires_in).saturating_sub(self.fetched_at.elapsed())
    }
}

/// Caches the Management API token and refreshes it shortly before expiry
pub struct LogtoTokenManager {
    config: LogtoM2MConfig,
    client: reqwest::Client,
    cache: RwLock<Option<CachedToken>>,
    refresh_margin: Duration,
}

impl LogtoTokenManager {
    pub fn new(config: LogtoM2MConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            cache: RwLock::new(None),
            refresh_margin: Duration::from_secs(60),
        }
    }

    pub async fn access_token(&self) -> Result<String, TokenError> {
        if let Some(cached) = self.cache.read().await.as_ref() {
            if cached.remaining() > self.refresh_margin {
                return Ok(cached.token.access_token.clone());
            }
        }

        let token = self.fetch().await?;
        let access_token = token.access_token.clone();
        *self.cache.write().await = Some(CachedToken {
            token,
            fetched_at: Instant::now(),
        });
        Ok(access_token)
    }

    async fn fetch(&self) -> Result<M2MToken, TokenError> {
        tracing::debug!("Fetching Logto M2M token from {}", self.config.token_url);

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("scope", self.config.scope.as_str()),
                ("resource", self.config.resource.as_str()),
            ])
            .send()
            .await
            .map_err(|e| TokenError::Fetch(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TokenError::Fetch(format!("HTTP {} - {}", status, body)));
        }

        let token: M2MToken = response
            .json()
            .await
            .map_err(|e| TokenError::Parse(e.to_string()))?;

        tracing::info!("Fetched Logto M2M token, expires in {}s", token.expires_in);
        Ok(token)
    }

    pub fn api_base_url(&self) -> &str {
        &self.config.api_base_url
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Failed to fetch token: {0}")]
    Fetch(String),

    #[error("Failed to parse token response: {0}")]
    Parse(String),
}
