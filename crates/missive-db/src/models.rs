//! Database row types. These map directly to SQLite rows and keep ids and
//! timestamps in their stored text form; `into_*` converts to the shared
//! models in `missive-types`.

use chrono::{DateTime, SecondsFormat, Utc};
use missive_types::models::{HistoryEntry, MessageId, MessageView, User};
use rusqlite::Row;
use uuid::Uuid;

use crate::error::{Result, StoreError};

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: MessageId,
    pub sender_id: String,
    pub sender_username: String,
    pub receiver_id: String,
    pub receiver_username: String,
    pub content: String,
    pub timestamp: String,
    pub edited: bool,
    pub edited_by: Option<String>,
    pub parent_id: Option<MessageId>,
}

pub struct HistoryRow {
    pub id: i64,
    pub message_id: MessageId,
    pub old_content: String,
    pub edited_at: String,
    pub edited_by: Option<String>,
}

/// Column list matching [`MessageRow::from_row`]. Joins the sender and
/// receiver usernames so a view never needs a second lookup.
pub(crate) const MESSAGE_SELECT: &str =
    "SELECT m.id, m.sender_id, s.username, m.receiver_id, r.username,
            m.content, m.timestamp, m.edited, m.edited_by, m.parent_id
     FROM messages m
     JOIN users s ON s.id = m.sender_id
     JOIN users r ON r.id = m.receiver_id";

impl UserRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            created_at: row.get(2)?,
        })
    }

    pub fn into_user(self) -> Result<User> {
        Ok(User {
            id: parse_uuid(&self.id)?,
            username: self.username,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

impl MessageRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            sender_id: row.get(1)?,
            sender_username: row.get(2)?,
            receiver_id: row.get(3)?,
            receiver_username: row.get(4)?,
            content: row.get(5)?,
            timestamp: row.get(6)?,
            edited: row.get(7)?,
            edited_by: row.get(8)?,
            parent_id: row.get(9)?,
        })
    }

    pub fn into_view(self) -> Result<MessageView> {
        Ok(MessageView {
            id: self.id,
            sender_id: parse_uuid(&self.sender_id)?,
            sender_username: self.sender_username,
            receiver_id: parse_uuid(&self.receiver_id)?,
            receiver_username: self.receiver_username,
            content: self.content,
            timestamp: parse_ts(&self.timestamp)?,
            edited: self.edited,
            edited_by: self.edited_by.as_deref().map(parse_uuid).transpose()?,
            parent_id: self.parent_id,
        })
    }
}

impl HistoryRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            message_id: row.get(1)?,
            old_content: row.get(2)?,
            edited_at: row.get(3)?,
            edited_by: row.get(4)?,
        })
    }

    pub fn into_entry(self) -> Result<HistoryEntry> {
        Ok(HistoryEntry {
            id: self.id,
            message_id: self.message_id,
            old_content: self.old_content,
            edited_at: parse_ts(&self.edited_at)?,
            edited_by: self.edited_by.as_deref().map(parse_uuid).transpose()?,
        })
    }
}

/// Fixed-width RFC 3339 so that string order in SQLite is time order.
pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp '{}': {}", s, e)))
}

pub fn parse_uuid(s: &str) -> Result<Uuid> {
    s.parse()
        .map_err(|e| StoreError::Corrupt(format!("uuid '{}': {}", s, e)))
}
