use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use validator::Validate;

use crate::core::context::ErrorSlot;
use crate::core::error::{AppError, AuthFailure, Result};
use crate::features::session::dtos::RegisterRequestDto;
use crate::features::session::models::{ProfileRecord, User};
use crate::modules::backend::{AuthProvider, DocumentStore, RemoteSession};
use crate::shared::constants::USERS_COLLECTION;

/// Session/auth adapter over the hosted provider.
///
/// `login` and `register` only change the provider's session; the local
/// [`User`] is published by [`SessionService::watch_sessions`], which resolves
/// every session change against the `users` profile collection.
pub struct SessionService {
    auth: Arc<dyn AuthProvider>,
    documents: Arc<dyn DocumentStore>,
    user: watch::Sender<Option<User>>,
    refresh: Notify,
    errors: Arc<ErrorSlot>,
}

impl SessionService {
    pub fn new(
        auth: Arc<dyn AuthProvider>,
        documents: Arc<dyn DocumentStore>,
        errors: Arc<ErrorSlot>,
    ) -> Self {
        let (user, _) = watch::channel(None);
        Self {
            auth,
            documents,
            user,
            refresh: Notify::new(),
            errors,
        }
    }

    fn fail<T>(&self, error: AppError) -> Result<T> {
        self.errors.record(&error);
        Err(error)
    }

    /// Sign in and return the account id
    pub async fn login(&self, email: &str, password: &str) -> Result<String> {
        match self.auth.sign_in(email, password).await {
            Ok(session) => {
                tracing::info!("Signed in account {}", session.uid);
                Ok(session.uid)
            }
            Err(e) => {
                tracing::warn!("Sign-in failed for {}: {}", email, e);
                self.fail(AppError::from_auth_backend(e))
            }
        }
    }

    /// Create the credential, attach the display name and write the profile
    pub async fn register(&self, dto: &RegisterRequestDto) -> Result<String> {
        if let Err(e) = dto.validate() {
            return self.fail(e.into());
        }

        let session = match self.auth.create_account(&dto.email, &dto.password).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("Account creation failed for {}: {}", dto.email, e);
                return self.fail(AppError::from_auth_backend(e));
            }
        };

        if let Err(e) = self.auth.update_display_name(&session.uid, &dto.name).await {
            tracing::error!("Failed to set display name for {}: {}", session.uid, e);
            return self.fail(AppError::from_auth_backend(e));
        }

        let profile = ProfileRecord {
            uid: session.uid.clone(),
            name: dto.name.trim().to_string(),
            email: session.email.clone(),
            role: dto.role,
        };
        if let Err(e) = self
            .documents
            .set(USERS_COLLECTION, &session.uid, profile.to_document())
            .await
        {
            tracing::error!("Failed to write profile for {}: {}", session.uid, e);
            return self.fail(AppError::from_auth_backend(e));
        }

        tracing::info!("Registered {} account {}", dto.role, session.uid);
        // The provider announced the session before the profile existed
        self.refresh.notify_one();
        Ok(session.uid)
    }

    pub async fn logout(&self) -> Result<()> {
        if let Err(e) = self.auth.sign_out().await {
            tracing::error!("Sign-out failed: {}", e);
            return self.fail(AppError::from_auth_backend(e));
        }
        self.user.send_replace(None);
        tracing::info!("Signed out");
        Ok(())
    }

    pub fn current_user(&self) -> Option<User> {
        self.user.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<User>> {
        self.user.subscribe()
    }

    /// Wait until the subscription publishes the user for `uid`
    pub async fn wait_for_user(&self, uid: &str, timeout: Duration) -> Result<User> {
        let mut users = self.user.subscribe();
        let published = match tokio::time::timeout(
            timeout,
            users.wait_for(|u| u.as_ref().is_some_and(|u| u.id == uid)),
        )
        .await
        {
            Ok(Ok(user)) => user.as_ref().cloned(),
            _ => None,
        };

        match published {
            Some(user) => Ok(user),
            None => {
                tracing::warn!("No user published for {} within {:?}", uid, timeout);
                self.fail(AppError::Auth(AuthFailure::ProfileMissing))
            }
        }
    }

    /// Standing subscription: republish the user on every session change.
    /// Runs until the provider's session channel closes.
    pub async fn watch_sessions(self: Arc<Self>) {
        let mut sessions = self.auth.sessions();
        loop {
            let session = sessions.borrow_and_update().clone();
            let user = self.resolve(session).await;
            self.user.send_if_modified(|current| {
                if *current == user {
                    return false;
                }
                *current = user;
                true
            });

            tokio::select! {
                changed = sessions.changed() => {
                    if changed.is_err() {
                        tracing::debug!("Session channel closed");
                        break;
                    }
                }
                _ = self.refresh.notified() => {}
            }
        }
    }

    async fn resolve(&self, session: Option<RemoteSession>) -> Option<User> {
        let session = session?;
        let doc = match self.documents.get(USERS_COLLECTION, &session.uid).await {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                tracing::warn!("Account {} has no profile record", session.uid);
                return None;
            }
            Err(e) => {
                tracing::error!("Failed to load profile for {}: {}", session.uid, e);
                self.errors.record(&AppError::from_auth_backend(e));
                return None;
            }
        };

        match ProfileRecord::from_document(&doc.data) {
            Ok(profile) => {
                let mut user = profile.into_user();
                // the profile is keyed by the account id
                user.id = session.uid;
                Some(user)
            }
            Err(e) => {
                tracing::warn!("Malformed profile for {}: {}", session.uid, e);
                self.errors
                    .record(&AppError::Decode(format!("profile {}: {}", session.uid, e)));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::session::models::UserRole;
    use crate::modules::backend::MemoryBackend;
    use crate::shared::test_helpers::{registration, SYNC_TIMEOUT};
    use serde_json::json;

    fn service(backend: &MemoryBackend) -> Arc<SessionService> {
        let service = Arc::new(SessionService::new(
            Arc::new(backend.clone()),
            Arc::new(backend.clone()),
            Arc::new(ErrorSlot::default()),
        ));
        tokio::spawn(Arc::clone(&service).watch_sessions());
        service
    }

    #[tokio::test]
    async fn test_register_publishes_user_with_role() {
        let backend = MemoryBackend::new();
        let service = service(&backend);

        let dto = registration("Jane", UserRole::Citizen);
        let uid = service.register(&dto).await.unwrap();
        let user = service.wait_for_user(&uid, SYNC_TIMEOUT).await.unwrap();

        assert_eq!(user.name, "Jane");
        assert_eq!(user.email, dto.email);
        assert_eq!(user.role, UserRole::Citizen);
    }

    #[tokio::test]
    async fn test_login_resolves_stored_role() {
        let backend = MemoryBackend::new();
        let service = service(&backend);

        let dto = registration("Ada", UserRole::Admin);
        service.register(&dto).await.unwrap();
        service.logout().await.unwrap();
        assert!(service.current_user().is_none());

        let uid = service.login(&dto.email, &dto.password).await.unwrap();
        let user = service.wait_for_user(&uid, SYNC_TIMEOUT).await.unwrap();
        assert!(user.is_admin());
    }

    #[tokio::test]
    async fn test_invalid_credentials_leave_user_empty() {
        let backend = MemoryBackend::new();
        let service = service(&backend);
        let dto = registration("Jane", UserRole::Citizen);
        service.register(&dto).await.unwrap();
        service.logout().await.unwrap();

        let err = service.login(&dto.email, "wrong-password").await.unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthFailure::InvalidCredentials)));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(service.current_user().is_none());
        assert_eq!(
            service.errors.get().as_deref(),
            Some("Authentication error: Invalid email or password")
        );
    }

    #[tokio::test]
    async fn test_duplicate_registration() {
        let backend = MemoryBackend::new();
        let service = service(&backend);
        let dto = registration("Jane", UserRole::Citizen);
        service.register(&dto).await.unwrap();

        let err = service.register(&dto).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Auth(AuthFailure::EmailAlreadyRegistered)
        ));
    }

    #[tokio::test]
    async fn test_invalid_registration_makes_no_remote_call() {
        let backend = MemoryBackend::new();
        let service = service(&backend);
        let mut dto = registration("Jane", UserRole::Citizen);
        dto.password = "123".to_string();

        let err = service.register(&dto).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(matches!(
            backend.sign_in(&dto.email, "123").await,
            Err(crate::modules::backend::BackendError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_session_without_profile_publishes_none() {
        let backend = MemoryBackend::new();
        let service = service(&backend);

        backend
            .create_account("ghost@example.com", "secret1")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(service.current_user().is_none());
    }

    #[tokio::test]
    async fn test_malformed_profile_records_decode_error() {
        let backend = MemoryBackend::new();
        let service = service(&backend);

        let session = backend
            .create_account("odd@example.com", "secret1")
            .await
            .unwrap();
        backend
            .insert_raw(USERS_COLLECTION, &session.uid, json!({"name": 42}))
            .await;
        service.refresh.notify_one();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(service.current_user().is_none());
        assert!(service
            .errors
            .get()
            .is_some_and(|e| e.starts_with("Malformed record")));
    }

    #[tokio::test]
    async fn test_session_expiry_clears_user() {
        let backend = MemoryBackend::new();
        let service = service(&backend);
        let uid = service
            .register(&registration("Jane", UserRole::Citizen))
            .await
            .unwrap();
        service.wait_for_user(&uid, SYNC_TIMEOUT).await.unwrap();

        let mut users = service.subscribe();
        backend.expire_session();
        tokio::time::timeout(SYNC_TIMEOUT, users.wait_for(Option::is_none))
            .await
            .expect("user should clear on expiry")
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_user_times_out() {
        let backend = MemoryBackend::new();
        let service = service(&backend);

        let err = service
            .wait_for_user("nobody", Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthFailure::ProfileMissing)));
    }
}
