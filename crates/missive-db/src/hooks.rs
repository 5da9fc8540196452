//! Mutation hooks run by the store inside the transaction of the mutation
//! that triggered them. A hook error rolls the whole mutation back.

use chrono::{DateTime, Utc};
use rusqlite::Transaction;
use uuid::Uuid;

use crate::error::Result;
use crate::models::MessageRow;

/// A pending content write, visible to hooks before it is applied.
#[derive(Debug, Clone)]
pub struct ContentChange {
    pub new_content: String,
    pub editor: Uuid,
    /// Whether the write should flip `edited` and record `editor` as
    /// `edited_by`. Starts false; the audit log sets it.
    pub mark_edited: bool,
}

pub trait MessageHook: Send + Sync {
    fn name(&self) -> &'static str;

    /// Called by `update_message_content` with the stored row, only when
    /// the new content differs from it.
    fn before_content_change(
        &self,
        _tx: &Transaction<'_>,
        _current: &MessageRow,
        _change: &mut ContentChange,
        _now: DateTime<Utc>,
    ) -> Result<()> {
        Ok(())
    }

    /// Called by `create_message` after the insert, before commit.
    fn after_create(
        &self,
        _tx: &Transaction<'_>,
        _message: &MessageRow,
        _now: DateTime<Utc>,
    ) -> Result<()> {
        Ok(())
    }
}
