use axum::{
    extract::{Path, State},
    http::StatusCode,
};

use missive_types::models::NotificationId;

use crate::error::ApiError;
use crate::{AppState, run_blocking};

pub async fn mark_read(
    State(state): State<AppState>,
    Path(notification_id): Path<NotificationId>,
) -> Result<StatusCode, ApiError> {
    run_blocking(&state, move |db| db.mark_read(notification_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
