use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use missive_db::queries::{DEFAULT_PAGE_SIZE, InboxCursor};
use missive_types::api::{CreateUserRequest, MarkAllReadResponse};
use missive_types::models::MessageId;

use crate::error::ApiError;
use crate::{AppState, run_blocking};

const MAX_USERNAME_LEN: usize = 32;

#[derive(Debug, Deserialize)]
pub struct InboxQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor: the `timestamp` of the oldest message on the previous page.
    pub before: Option<DateTime<Utc>>,
    /// The `id` of that same message. Without it every message at `before`
    /// is skipped.
    pub before_id: Option<MessageId>,
}

impl InboxQuery {
    fn cursor(&self) -> Result<Option<InboxCursor>, ApiError> {
        match (self.before, self.before_id) {
            (None, None) => Ok(None),
            (None, Some(_)) => Err(ApiError::BadRequest(
                "before_id requires before".to_string(),
            )),
            (Some(timestamp), id) => Ok(Some(InboxCursor {
                timestamp,
                id: id.unwrap_or(MessageId::MIN),
            })),
        }
    }
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_SIZE
}

pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim().to_string();
    if username.is_empty() || username.chars().count() > MAX_USERNAME_LEN {
        return Err(ApiError::BadRequest(format!(
            "username must be 1-{} characters",
            MAX_USERNAME_LEN
        )));
    }

    let user = run_blocking(&state, move |db| db.create_user(&username)).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    run_blocking(&state, move |db| db.delete_user(user_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_unread(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let unread = run_blocking(&state, move |db| db.get_unread(user_id)).await?;
    Ok(Json(unread))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let marked = run_blocking(&state, move |db| db.mark_all_read(user_id)).await?;
    Ok(Json(MarkAllReadResponse { marked }))
}

pub async fn list_inbox(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<InboxQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let cursor = query.cursor()?;
    let messages = run_blocking(&state, move |db| {
        db.list_inbox(user_id, query.limit, cursor)
    })
    .await?;
    Ok(Json(messages))
}
