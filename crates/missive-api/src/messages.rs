use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use missive_types::api::{CreateMessageRequest, UpdateMessageRequest};
use missive_types::models::MessageId;

use crate::error::ApiError;
use crate::{AppState, run_blocking};

pub async fn create_message(
    State(state): State<AppState>,
    Json(req): Json<CreateMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = run_blocking(&state, move |db| {
        db.create_message(req.sender_id, req.receiver_id, &req.content, req.parent_id)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn get_message(
    State(state): State<AppState>,
    Path(message_id): Path<MessageId>,
) -> Result<impl IntoResponse, ApiError> {
    let message = run_blocking(&state, move |db| db.get_message(message_id)).await?;
    Ok(Json(message))
}

pub async fn update_message(
    State(state): State<AppState>,
    Path(message_id): Path<MessageId>,
    Json(req): Json<UpdateMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let message = run_blocking(&state, move |db| {
        db.update_message_content(message_id, req.editor_id, &req.content)
    })
    .await?;
    Ok(Json(message))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<MessageId>,
) -> Result<StatusCode, ApiError> {
    run_blocking(&state, move |db| db.delete_message(message_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_thread(
    State(state): State<AppState>,
    Path(message_id): Path<MessageId>,
) -> Result<impl IntoResponse, ApiError> {
    let thread = run_blocking(&state, move |db| db.get_thread(message_id)).await?;
    Ok(Json(thread))
}

pub async fn get_history(
    State(state): State<AppState>,
    Path(message_id): Path<MessageId>,
) -> Result<impl IntoResponse, ApiError> {
    let history = run_blocking(&state, move |db| db.get_history(message_id)).await?;
    Ok(Json(history))
}
