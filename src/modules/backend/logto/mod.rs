//! Hosted auth over the Logto Management API
//!
//! Credentials live in Logto. A successful sign-in opens a local session that
//! lapses after the configured TTL; the lapse is announced on the session
//! channel like any other session change.

mod token_manager;

pub use token_manager::LogtoTokenManager;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{AuthProvider, BackendError, RemoteSession};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogtoUser {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    primary_email: Option<String>,
    #[serde(default)]
    is_suspended: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserRequest<'a> {
    primary_email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LogtoErrorResponse {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: String,
}

fn unavailable(context: &str, e: impl std::fmt::Display) -> BackendError {
    tracing::error!("Logto {} failed: {}", context, e);
    BackendError::Unavailable(format!("{}: {}", context, e))
}

pub struct LogtoAuthProvider {
    token_manager: Arc<LogtoTokenManager>,
    http_client: reqwest::Client,
    sessions: Arc<watch::Sender<Option<RemoteSession>>>,
    session_ttl: Duration,
    expiry: Mutex<Option<JoinHandle<()>>>,
}

impl LogtoAuthProvider {
    pub fn new(token_manager: Arc<LogtoTokenManager>, session_ttl: Duration) -> Self {
        let (sessions, _) = watch::channel(None);
        Self {
            token_manager,
            http_client: reqwest::Client::new(),
            sessions: Arc::new(sessions),
            session_ttl,
            expiry: Mutex::new(None),
        }
    }

    async fn bearer(&self) -> Result<String, BackendError> {
        self.token_manager
            .access_token()
            .await
            .map_err(|e| unavailable("M2M token", e))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.token_manager.api_base_url(), path)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<LogtoUser>, BackendError> {
        let response = self
            .http_client
            .get(self.url(&format!("/api/users?search={}", urlencoding::encode(email))))
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .map_err(|e| unavailable("user search", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(unavailable("user search", format!("HTTP {} - {}", status, body)));
        }

        let users: Vec<LogtoUser> = response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(format!("user search response: {}", e)))?;

        // search is fuzzy; only an exact email counts
        Ok(users
            .into_iter()
            .find(|u| u.primary_email.as_deref() == Some(email)))
    }

    async fn verify_password(&self, user_id: &str, password: &str) -> Result<bool, BackendError> {
        let response = self
            .http_client
            .post(self.url(&format!("/api/users/{}/password/verify", user_id)))
            .bearer_auth(self.bearer().await?)
            .json(&serde_json::json!({ "password": password }))
            .send()
            .await
            .map_err(|e| unavailable("password verification", e))?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(true),
            StatusCode::UNPROCESSABLE_ENTITY => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(unavailable(
                    "password verification",
                    format!("HTTP {} - {}", status, body),
                ))
            }
        }
    }

    async fn create_user(&self, email: &str, password: &str) -> Result<LogtoUser, BackendError> {
        let response = self
            .http_client
            .post(self.url("/api/users"))
            .bearer_auth(self.bearer().await?)
            .json(&CreateUserRequest {
                primary_email: email,
                password,
            })
            .send()
            .await
            .map_err(|e| unavailable("user creation", e))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| BackendError::Malformed(format!("user creation response: {}", e)));
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNPROCESSABLE_ENTITY {
            if let Ok(error) = serde_json::from_str::<LogtoErrorResponse>(&body) {
                if error.code == "user.email.exists" || error.message.contains("already") {
                    return Err(BackendError::EmailInUse);
                }
                return Err(BackendError::Rejected(error.message));
            }
            return Err(BackendError::Rejected(body));
        }

        Err(unavailable("user creation", format!("HTTP {} - {}", status, body)))
    }

    /// Publish a session for `user` and arm its expiry timer
    fn open_session(&self, user: LogtoUser, email: &str) -> RemoteSession {
        let ttl = chrono::Duration::from_std(self.session_ttl)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        let session = RemoteSession {
            uid: user.id,
            email: user.primary_email.unwrap_or_else(|| email.to_string()),
            display_name: user.name,
            expires_at: Some(Utc::now() + ttl),
        };
        self.sessions.send_replace(Some(session.clone()));

        let sessions = Arc::clone(&self.sessions);
        let armed = session.clone();
        let ttl = self.session_ttl;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let expired = sessions.send_if_modified(|current| {
                if current.as_ref() == Some(&armed) {
                    *current = None;
                    true
                } else {
                    false
                }
            });
            if expired {
                tracing::info!("Session for {} expired", armed.uid);
            }
        });
        self.replace_expiry(Some(timer));

        session
    }

    fn replace_expiry(&self, timer: Option<JoinHandle<()>>) {
        let mut slot = self.expiry.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        *slot = timer;
    }
}

#[async_trait]
impl AuthProvider for LogtoAuthProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<RemoteSession, BackendError> {
        let user = self
            .find_user_by_email(email)
            .await?
            .ok_or(BackendError::InvalidCredentials)?;

        if user.is_suspended {
            return Err(BackendError::Rejected("Account is suspended".to_string()));
        }
        if !self.verify_password(&user.id, password).await? {
            return Err(BackendError::InvalidCredentials);
        }

        tracing::info!("Signed in Logto user {}", user.id);
        Ok(self.open_session(user, email))
    }

    async fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> Result<RemoteSession, BackendError> {
        let user = self.create_user(email, password).await?;
        tracing::info!("Created Logto user {}", user.id);
        Ok(self.open_session(user, email))
    }

    async fn update_display_name(&self, uid: &str, name: &str) -> Result<(), BackendError> {
        let response = self
            .http_client
            .patch(self.url(&format!("/api/users/{}", uid)))
            .bearer_auth(self.bearer().await?)
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await
            .map_err(|e| unavailable("profile update", e))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(BackendError::NotFound(format!("account {}", uid))),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(unavailable("profile update", format!("HTTP {} - {}", status, body)))
            }
        }
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.replace_expiry(None);
        self.sessions.send_replace(None);
        Ok(())
    }

    fn sessions(&self) -> watch::Receiver<Option<RemoteSession>> {
        self.sessions.subscribe()
    }
}
