use chrono::{DateTime, Utc};
use missive_types::models::NotificationId;
use rusqlite::Transaction;
use tracing::{debug, info};
use uuid::Uuid;

use crate::Database;
use crate::error::{Result, StoreError};
use crate::hooks::MessageHook;
use crate::models::{MessageRow, fmt_ts};
use crate::queries::user_exists;

/// Fans a newly created message out to its receiver as one unread
/// notification.
pub struct NotificationDispatcher;

impl MessageHook for NotificationDispatcher {
    fn name(&self) -> &'static str {
        "notification-dispatcher"
    }

    fn after_create(
        &self,
        tx: &Transaction<'_>,
        message: &MessageRow,
        now: DateTime<Utc>,
    ) -> Result<()> {
        // UNIQUE(message_id, user_id) keeps a replayed creation at one row.
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO notifications (user_id, message_id, created_at, is_read)
             VALUES (?1, ?2, ?3, 0)",
            rusqlite::params![message.receiver_id, message.id, fmt_ts(now)],
        )?;

        debug!(
            message_id = message.id,
            receiver = %message.receiver_id,
            inserted,
            "notification dispatched"
        );
        Ok(())
    }
}

impl Database {
    pub fn mark_read(&self, notification_id: NotificationId) -> Result<()> {
        self.with_tx(|tx| {
            let updated = tx.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1",
                [notification_id],
            )?;
            if updated == 0 {
                return Err(StoreError::not_found("notification", notification_id));
            }
            Ok(())
        })
    }

    /// Marks every unread notification of `user_id` as read. Returns how
    /// many changed.
    pub fn mark_all_read(&self, user_id: Uuid) -> Result<usize> {
        let marked = self.with_tx(|tx| {
            if !user_exists(tx, user_id)? {
                return Err(StoreError::invalid_reference("user", user_id));
            }
            let n = tx.execute(
                "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
                [user_id.to_string()],
            )?;
            Ok(n)
        })?;

        info!(user = %user_id, marked, "marked all notifications read");
        Ok(marked)
    }
}
