//! Process-wide store lifecycle
//!
//! `AppContext` owns the session adapter, the report store and the tasks that
//! keep them in sync with the backend. Build it once with [`AppContext::init`]
//! and hand clones of the `Arc` to whatever renders the store.

use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::core::error::{AppError, Result};
use crate::features::reports::services::ReportStore;
use crate::features::session::dtos::RegisterRequestDto;
use crate::features::session::models::User;
use crate::features::session::services::SessionService;
use crate::modules::backend::{AuthProvider, DocumentStore};

/// The last failure seen by any store operation, as a display message
#[derive(Debug, Default)]
pub struct ErrorSlot {
    message: RwLock<Option<String>>,
}

impl ErrorSlot {
    pub fn record(&self, error: &AppError) {
        let mut slot = self.message.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(error.to_string());
    }

    pub fn get(&self) -> Option<String> {
        self.message
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn clear(&self) {
        let mut slot = self.message.write().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }
}

pub struct AppContext {
    session: Arc<SessionService>,
    reports: Arc<ReportStore>,
    errors: Arc<ErrorSlot>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AppContext {
    /// Wire the adapters together and start both standing subscriptions.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn init(auth: Arc<dyn AuthProvider>, documents: Arc<dyn DocumentStore>) -> Arc<Self> {
        let errors = Arc::new(ErrorSlot::default());
        let session = Arc::new(SessionService::new(
            auth,
            Arc::clone(&documents),
            Arc::clone(&errors),
        ));
        let reports = Arc::new(ReportStore::new(
            documents,
            session.subscribe(),
            Arc::clone(&errors),
        ));

        let tasks = vec![
            tokio::spawn(Arc::clone(&session).watch_sessions()),
            tokio::spawn(Arc::clone(&reports).watch_collection()),
        ];
        tracing::info!("Store context initialized");

        Arc::new(Self {
            session,
            reports,
            errors,
            tasks: Mutex::new(tasks),
        })
    }

    /// Stop the subscriptions. Safe to call more than once.
    pub fn dispose(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        if tasks.is_empty() {
            return;
        }
        for task in tasks.drain(..) {
            task.abort();
        }
        tracing::info!("Store context disposed");
    }

    pub fn session(&self) -> &Arc<SessionService> {
        &self.session
    }

    pub fn reports(&self) -> &Arc<ReportStore> {
        &self.reports
    }

    /// Returns the signed-in account id; the user itself arrives through the
    /// session subscription
    pub async fn login(&self, email: &str, password: &str) -> Result<String> {
        self.session.login(email, password).await
    }

    pub async fn register(&self, dto: &RegisterRequestDto) -> Result<String> {
        self.session.register(dto).await
    }

    pub async fn logout(&self) -> Result<()> {
        self.session.logout().await?;
        self.reports.clear();
        Ok(())
    }

    pub fn current_user(&self) -> Option<User> {
        self.session.current_user()
    }

    pub fn subscribe_user(&self) -> watch::Receiver<Option<User>> {
        self.session.subscribe()
    }

    pub fn last_error(&self) -> Option<String> {
        self.errors.get()
    }

    pub fn clear_error(&self) {
        self.errors.clear();
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        self.dispose();
    }
}
