use axum::{
    routing::{get, post},
    Router,
};

use crate::features::session::handlers::{self, SessionState};

/// Session routes; `/me` needs the session middleware applied by the caller
pub fn routes(state: SessionState) -> Router {
    Router::new()
        .route("/api/session/register", post(handlers::register))
        .route("/api/session/login", post(handlers::login))
        .route("/api/session/logout", post(handlers::logout))
        .route("/api/session/me", get(handlers::get_me))
        .route(
            "/api/session/error",
            get(handlers::get_last_error).delete(handlers::clear_last_error),
        )
        .with_state(state)
}
