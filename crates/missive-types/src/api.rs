use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::MessageId;

// -- Users --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateUserRequest {
    pub username: String,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateMessageRequest {
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub content: String,
    /// Set when the message is a reply.
    #[serde(default)]
    pub parent_id: Option<MessageId>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateMessageRequest {
    pub editor_id: Uuid,
    pub content: String,
}

// -- Notifications --

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkAllReadResponse {
    pub marked: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
