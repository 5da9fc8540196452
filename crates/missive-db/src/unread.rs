use missive_types::models::MessageSummary;
use uuid::Uuid;

use crate::Database;
use crate::error::{Result, StoreError};
use crate::models::{parse_ts, parse_uuid};
use crate::queries::user_exists;

struct UnreadRow {
    notification_id: i64,
    notified_at: String,
    message_id: i64,
    sender_id: String,
    sender_username: String,
    receiver_id: String,
    receiver_username: String,
    content: String,
    timestamp: String,
}

impl UnreadRow {
    fn into_summary(self) -> Result<MessageSummary> {
        Ok(MessageSummary {
            notification_id: self.notification_id,
            message_id: self.message_id,
            sender_id: parse_uuid(&self.sender_id)?,
            sender_username: self.sender_username,
            receiver_id: parse_uuid(&self.receiver_id)?,
            receiver_username: self.receiver_username,
            content: self.content,
            timestamp: parse_ts(&self.timestamp)?,
            notified_at: parse_ts(&self.notified_at)?,
        })
    }
}

impl Database {
    /// Unread notifications of `user_id`, oldest first, each joined to the
    /// columns of its message that a listing shows.
    pub fn get_unread(&self, user_id: Uuid) -> Result<Vec<MessageSummary>> {
        let rows = self.with_conn(|conn| {
            if !user_exists(conn, user_id)? {
                return Err(StoreError::invalid_reference("user", user_id));
            }
            let mut stmt = conn.prepare(
                "SELECT n.id, n.created_at, m.id, m.sender_id, s.username,
                        m.receiver_id, r.username, m.content, m.timestamp
                 FROM notifications n
                 JOIN messages m ON m.id = n.message_id
                 JOIN users s ON s.id = m.sender_id
                 JOIN users r ON r.id = m.receiver_id
                 WHERE n.user_id = ?1 AND n.is_read = 0
                 ORDER BY n.created_at, n.id",
            )?;
            let rows = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok(UnreadRow {
                        notification_id: row.get(0)?,
                        notified_at: row.get(1)?,
                        message_id: row.get(2)?,
                        sender_id: row.get(3)?,
                        sender_username: row.get(4)?,
                        receiver_id: row.get(5)?,
                        receiver_username: row.get(6)?,
                        content: row.get(7)?,
                        timestamp: row.get(8)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        rows.into_iter().map(UnreadRow::into_summary).collect()
    }

    pub fn unread_count(&self, user_id: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            if !user_exists(conn, user_id)? {
                return Err(StoreError::invalid_reference("user", user_id));
            }
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
                [user_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(n as usize)
        })
    }
}
