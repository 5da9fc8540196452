pub mod error;
pub mod messages;
pub mod notifications;
pub mod users;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tracing::error;

use missive_db::Database;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/users", post(users::create_user))
        .route("/users/{user_id}", axum::routing::delete(users::delete_user))
        .route("/users/{user_id}/unread", get(users::get_unread))
        .route("/users/{user_id}/unread/read", post(users::mark_all_read))
        .route("/users/{user_id}/inbox", get(users::list_inbox))
        .route("/messages", post(messages::create_message))
        .route(
            "/messages/{message_id}",
            get(messages::get_message)
                .patch(messages::update_message)
                .delete(messages::delete_message),
        )
        .route("/messages/{message_id}/thread", get(messages::get_thread))
        .route("/messages/{message_id}/history", get(messages::get_history))
        .route("/notifications/{notification_id}/read", post(notifications::mark_read))
        .with_state(state)
}

/// Runs a store call on the blocking pool; SQLite must not block the
/// async runtime.
pub(crate) async fn run_blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> missive_db::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })?
        .map_err(ApiError::from)
}
