use chrono::{DateTime, Utc};
use missive_types::models::{HistoryEntry, MessageId};
use rusqlite::Transaction;
use tracing::debug;

use crate::Database;
use crate::error::{Result, StoreError};
use crate::hooks::{ContentChange, MessageHook};
use crate::models::{HistoryRow, MessageRow, fmt_ts};

/// Records the content a message had right before an edit replaced it.
pub struct EditAuditLog;

impl MessageHook for EditAuditLog {
    fn name(&self) -> &'static str {
        "edit-audit-log"
    }

    fn before_content_change(
        &self,
        tx: &Transaction<'_>,
        current: &MessageRow,
        change: &mut ContentChange,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if current.content == change.new_content {
            return Ok(());
        }

        tx.execute(
            "INSERT INTO message_history (message_id, old_content, edited_at, edited_by)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                current.id,
                current.content,
                fmt_ts(now),
                change.editor.to_string()
            ],
        )?;
        change.mark_edited = true;

        debug!(message_id = current.id, "captured pre-edit content");
        Ok(())
    }
}

impl Database {
    /// Audit trail of a message, oldest edit first.
    pub fn get_history(&self, message_id: MessageId) -> Result<Vec<HistoryEntry>> {
        let rows = self.with_conn(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM messages WHERE id = ?1)",
                [message_id],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(StoreError::not_found("message", message_id));
            }

            let mut stmt = conn.prepare(
                "SELECT id, message_id, old_content, edited_at, edited_by
                 FROM message_history
                 WHERE message_id = ?1
                 ORDER BY edited_at, id",
            )?;
            let rows = stmt
                .query_map([message_id], HistoryRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        rows.into_iter().map(HistoryRow::into_entry).collect()
    }
}
