use chrono::{DateTime, Utc};
use missive_types::models::{MessageId, MessageView, User};
use rusqlite::{Connection, OptionalExtension};
use tracing::{info, warn};
use uuid::Uuid;

use crate::Database;
use crate::error::{Result, StoreError, is_unique_violation};
use crate::hooks::ContentChange;
use crate::models::{MESSAGE_SELECT, MessageRow, UserRow, fmt_ts};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Position in an inbox listing. Rows strictly older than
/// `(timestamp, id)` come next, so messages sharing a timestamp are neither
/// skipped nor repeated across pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboxCursor {
    pub timestamp: DateTime<Utc>,
    pub id: MessageId,
}

impl InboxCursor {
    /// Cursor continuing after `message`, the last row of a page.
    pub fn after(message: &MessageView) -> Self {
        Self {
            timestamp: message.timestamp,
            id: message.id,
        }
    }
}

impl Database {
    // -- Users --

    pub fn create_user(&self, username: &str) -> Result<User> {
        let id = Uuid::new_v4();
        let now = self.now();

        self.with_tx(|tx| {
            tx.execute(
                "INSERT INTO users (id, username, created_at) VALUES (?1, ?2, ?3)",
                (id.to_string(), username, fmt_ts(now)),
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::DuplicateUser(username.to_string())
                } else {
                    e.into()
                }
            })?;
            Ok(())
        })?;

        info!(user = %id, username, "user created");
        Ok(User {
            id,
            username: username.to_string(),
            created_at: now,
        })
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.with_conn(|conn| query_user(conn, "id", &id.to_string()))?
            .map(UserRow::into_user)
            .transpose()
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.with_conn(|conn| query_user(conn, "username", username))?
            .map(UserRow::into_user)
            .transpose()
    }

    /// Removes a user together with every message they sent or received.
    /// Edits they made elsewhere stay, attributed to nobody.
    pub fn delete_user(&self, user_id: Uuid) -> Result<()> {
        let removed = self
            .with_tx(|tx| {
                if !user_exists(tx, user_id)? {
                    return Err(StoreError::invalid_reference("user", user_id));
                }
                let uid = user_id.to_string();
                let owned: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM messages WHERE sender_id = ?1 OR receiver_id = ?1",
                    [&uid],
                    |row| row.get(0),
                )?;

                // Foreign keys cascade to messages, their history and
                // notifications, and null out edited_by references.
                tx.execute("DELETE FROM users WHERE id = ?1", [&uid])?;
                Ok(owned)
            })
            .map_err(|e| e.into_cascade("user", user_id))?;

        info!(user = %user_id, messages = removed, "user deleted");
        Ok(())
    }

    // -- Messages --

    pub fn create_message(
        &self,
        sender: Uuid,
        receiver: Uuid,
        content: &str,
        parent: Option<MessageId>,
    ) -> Result<MessageView> {
        let now = self.now();
        let hooks = self.hooks()?;

        let row = self.with_tx(|tx| {
            for (role, id) in [("sender", sender), ("receiver", receiver)] {
                if !user_exists(tx, id)? {
                    warn!(role, user = %id, "rejected message with unknown user");
                    return Err(StoreError::invalid_reference("user", id));
                }
            }
            if let Some(parent_id) = parent {
                if load_message(tx, parent_id)?.is_none() {
                    return Err(StoreError::not_found("parent message", parent_id));
                }
            }

            tx.execute(
                "INSERT INTO messages (sender_id, receiver_id, content, timestamp, parent_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    sender.to_string(),
                    receiver.to_string(),
                    content,
                    fmt_ts(now),
                    parent
                ],
            )?;
            let id = tx.last_insert_rowid();
            let row = load_message(tx, id)?.ok_or_else(|| StoreError::not_found("message", id))?;

            for hook in &hooks {
                hook.after_create(tx, &row, now)?;
            }
            Ok(row)
        })?;

        info!(message_id = row.id, parent = ?row.parent_id, "message created");
        row.into_view()
    }

    pub fn get_message(&self, id: MessageId) -> Result<MessageView> {
        self.with_conn(|conn| load_message(conn, id))?
            .ok_or_else(|| StoreError::not_found("message", id))?
            .into_view()
    }

    /// Replaces a message's content. Hooks see the stored row before the
    /// write; identical content is a no-op that leaves `edited` alone.
    pub fn update_message_content(
        &self,
        message_id: MessageId,
        editor: Uuid,
        new_content: &str,
    ) -> Result<MessageView> {
        let now = self.now();
        let hooks = self.hooks()?;

        let row = self
            .with_tx(|tx| {
                let current = load_message(tx, message_id)?
                    .ok_or_else(|| StoreError::not_found("message", message_id))?;
                if !user_exists(tx, editor)? {
                    return Err(StoreError::invalid_reference("user", editor));
                }
                if current.content == new_content {
                    return Ok(current);
                }

                let mut change = ContentChange {
                    new_content: new_content.to_string(),
                    editor,
                    mark_edited: false,
                };
                for hook in &hooks {
                    hook.before_content_change(tx, &current, &mut change, now)?;
                }

                // Compare-and-swap on the content read above.
                let updated = tx.execute(
                    "UPDATE messages
                     SET content = ?1,
                         edited = CASE WHEN ?2 THEN 1 ELSE edited END,
                         edited_by = CASE WHEN ?2 THEN ?3 ELSE edited_by END
                     WHERE id = ?4 AND content = ?5",
                    rusqlite::params![
                        change.new_content,
                        change.mark_edited,
                        change.editor.to_string(),
                        message_id,
                        current.content
                    ],
                )?;
                if updated == 0 {
                    return Err(StoreError::ConflictingEdit { message_id });
                }

                load_message(tx, message_id)?
                    .ok_or_else(|| StoreError::not_found("message", message_id))
            })
            .map_err(|e| e.into_conflict(message_id))?;

        info!(message_id, editor = %editor, "message content updated");
        row.into_view()
    }

    /// Deletes a message with its history and notifications. Replies are
    /// kept and become thread roots.
    pub fn delete_message(&self, message_id: MessageId) -> Result<()> {
        self.with_tx(|tx| {
            let deleted = tx.execute("DELETE FROM messages WHERE id = ?1", [message_id])?;
            if deleted == 0 {
                return Err(StoreError::not_found("message", message_id));
            }
            Ok(())
        })
        .map_err(|e| e.into_cascade("message", message_id))?;

        info!(message_id, "message deleted");
        Ok(())
    }

    /// Messages received by `user_id`, newest first, starting after
    /// `before` when given.
    pub fn list_inbox(
        &self,
        user_id: Uuid,
        limit: u32,
        before: Option<InboxCursor>,
    ) -> Result<Vec<MessageView>> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);

        let rows = self.with_conn(|conn| {
            if !user_exists(conn, user_id)? {
                return Err(StoreError::invalid_reference("user", user_id));
            }
            let sql = format!(
                "{MESSAGE_SELECT}
                 WHERE m.receiver_id = ?1
                   AND (?2 IS NULL OR (m.timestamp, m.id) < (?2, ?3))
                 ORDER BY m.timestamp DESC, m.id DESC
                 LIMIT ?4"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    rusqlite::params![
                        user_id.to_string(),
                        before.map(|c| fmt_ts(c.timestamp)),
                        before.map(|c| c.id),
                        limit
                    ],
                    MessageRow::from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        rows.into_iter().map(MessageRow::into_view).collect()
    }
}

pub(crate) fn load_message(conn: &Connection, id: MessageId) -> Result<Option<MessageRow>> {
    let sql = format!("{MESSAGE_SELECT} WHERE m.id = ?1");
    let row = conn
        .query_row(&sql, [id], MessageRow::from_row)
        .optional()?;
    Ok(row)
}

pub(crate) fn user_exists(conn: &Connection, user_id: Uuid) -> Result<bool> {
    let exists = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
        [user_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT id, username, created_at FROM users WHERE {column} = ?1");
    let row = conn.query_row(&sql, [value], UserRow::from_row).optional()?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::test_support::{alice_and_bob, db_with_clock, user};

    fn count(db: &Database, sql: &str) -> i64 {
        db.with_conn(|conn| Ok(conn.query_row(sql, [], |r| r.get(0))?))
            .unwrap()
    }

    #[test]
    fn duplicate_username_is_rejected() {
        let (db, _clock) = db_with_clock();
        user(&db, "alice");
        assert!(matches!(
            db.create_user("alice"),
            Err(StoreError::DuplicateUser(name)) if name == "alice"
        ));
    }

    #[test]
    fn create_rejects_unknown_users() {
        let (db, _clock) = db_with_clock();
        let a = user(&db, "alice");
        let ghost = Uuid::new_v4();

        assert!(matches!(
            db.create_message(a, ghost, "hi", None),
            Err(StoreError::InvalidReference { .. })
        ));
        assert!(matches!(
            db.create_message(ghost, a, "hi", None),
            Err(StoreError::InvalidReference { .. })
        ));
        assert_eq!(count(&db, "SELECT COUNT(*) FROM messages"), 0);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM notifications"), 0);
    }

    #[test]
    fn create_rejects_missing_parent() {
        let (db, _clock) = db_with_clock();
        let (a, b) = alice_and_bob(&db);
        let err = db.create_message(a, b, "re", Some(404)).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { id, .. } if id == "404"));
    }

    #[test]
    fn created_message_view() {
        let (db, clock) = db_with_clock();
        let (a, b) = alice_and_bob(&db);
        let m = db.create_message(a, b, "hi", None).unwrap();

        assert_eq!(m.sender_id, a);
        assert_eq!(m.sender_username, "alice");
        assert_eq!(m.receiver_username, "bob");
        assert_eq!(m.timestamp, crate::Clock::now(clock.as_ref()));
        assert!(!m.edited);
        assert_eq!(m.edited_by, None);
        assert_eq!(db.get_message(m.id).unwrap(), m);
    }

    #[test]
    fn edit_marks_message_and_keeps_timestamp() {
        let (db, clock) = db_with_clock();
        let (a, b) = alice_and_bob(&db);
        let m = db.create_message(a, b, "hi", None).unwrap();
        clock.advance(Duration::minutes(3));

        let edited = db.update_message_content(m.id, a, "hi there").unwrap();
        assert_eq!(edited.content, "hi there");
        assert!(edited.edited);
        assert_eq!(edited.edited_by, Some(a));
        assert_eq!(edited.timestamp, m.timestamp);
    }

    #[test]
    fn identical_edit_is_a_no_op() {
        let (db, _clock) = db_with_clock();
        let (a, b) = alice_and_bob(&db);
        let m = db.create_message(a, b, "hi", None).unwrap();

        let same = db.update_message_content(m.id, b, "hi").unwrap();
        assert_eq!(same, m);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM message_history"), 0);
    }

    #[test]
    fn edit_errors() {
        let (db, _clock) = db_with_clock();
        let (a, b) = alice_and_bob(&db);
        let m = db.create_message(a, b, "hi", None).unwrap();

        assert!(matches!(
            db.update_message_content(999, a, "x"),
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            db.update_message_content(m.id, Uuid::new_v4(), "x"),
            Err(StoreError::InvalidReference { .. })
        ));
        assert_eq!(db.get_message(m.id).unwrap().content, "hi");
    }

    #[test]
    fn delete_message_orphans_replies() {
        let (db, _clock) = db_with_clock();
        let (a, b) = alice_and_bob(&db);
        let root = db.create_message(a, b, "root", None).unwrap();
        let reply = db.create_message(b, a, "reply", Some(root.id)).unwrap();
        let nested = db.create_message(a, b, "nested", Some(reply.id)).unwrap();
        db.update_message_content(root.id, a, "root v2").unwrap();

        db.delete_message(root.id).unwrap();

        assert!(matches!(db.get_message(root.id), Err(StoreError::NotFound { .. })));
        assert_eq!(db.get_message(reply.id).unwrap().parent_id, None);
        assert_eq!(db.get_message(nested.id).unwrap().parent_id, Some(reply.id));
        assert_eq!(count(&db, "SELECT COUNT(*) FROM message_history"), 0);
        assert_eq!(
            count(&db, &format!("SELECT COUNT(*) FROM notifications WHERE message_id = {}", root.id)),
            0
        );

        let thread = db.get_thread(reply.id).unwrap();
        assert_eq!(thread.ids(), vec![reply.id, nested.id]);
    }

    #[test]
    fn delete_missing_message() {
        let (db, _clock) = db_with_clock();
        assert!(matches!(db.delete_message(5), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn delete_user_cascades_and_clears_attribution() {
        let (db, _clock) = db_with_clock();
        let (a, b) = alice_and_bob(&db);
        let c = user(&db, "carol");

        let ab = db.create_message(a, b, "a to b", None).unwrap();
        let ca = db.create_message(c, a, "c to a", None).unwrap();
        let bc = db.create_message(b, c, "b to c", None).unwrap();
        db.update_message_content(bc.id, a, "edited by a").unwrap();
        db.update_message_content(ab.id, a, "a to b v2").unwrap();

        db.delete_user(a).unwrap();

        assert!(db.get_user(a).unwrap().is_none());
        assert!(matches!(db.get_message(ab.id), Err(StoreError::NotFound { .. })));
        assert!(matches!(db.get_message(ca.id), Err(StoreError::NotFound { .. })));

        let survivor = db.get_message(bc.id).unwrap();
        assert_eq!(survivor.content, "edited by a");
        assert!(survivor.edited);
        assert_eq!(survivor.edited_by, None);

        let history = db.get_history(bc.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].old_content, "b to c");
        assert_eq!(history[0].edited_by, None);

        assert_eq!(
            count(&db, &format!("SELECT COUNT(*) FROM message_history WHERE message_id = {}", ab.id)),
            0
        );
        assert_eq!(count(&db, "SELECT COUNT(*) FROM notifications"), 1);
    }

    #[test]
    fn delete_unknown_user() {
        let (db, _clock) = db_with_clock();
        assert!(matches!(
            db.delete_user(Uuid::new_v4()),
            Err(StoreError::InvalidReference { .. })
        ));
    }

    #[test]
    fn inbox_pages_newest_first() {
        let (db, clock) = db_with_clock();
        let (a, b) = alice_and_bob(&db);
        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(db.create_message(a, b, &format!("m{i}"), None).unwrap().id);
            clock.advance(Duration::seconds(1));
        }
        db.create_message(b, a, "not in b's inbox", None).unwrap();

        let first = db.list_inbox(b, 2, None).unwrap();
        assert_eq!(first.iter().map(|m| m.id).collect::<Vec<_>>(), vec![ids[4], ids[3]]);

        let cursor = first.last().map(InboxCursor::after);
        let second = db.list_inbox(b, 2, cursor).unwrap();
        assert_eq!(second.iter().map(|m| m.id).collect::<Vec<_>>(), vec![ids[2], ids[1]]);

        let all = db.list_inbox(b, 1000, None).unwrap();
        assert_eq!(all.len(), 5);
    }

    #[test]
    fn inbox_pages_through_tied_timestamps() {
        let (db, _clock) = db_with_clock();
        let (a, b) = alice_and_bob(&db);
        let ids: Vec<_> = (0..5)
            .map(|i| db.create_message(a, b, &format!("m{i}"), None).unwrap().id)
            .collect();

        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = db.list_inbox(b, 2, cursor).unwrap();
            if page.is_empty() {
                break;
            }
            cursor = page.last().map(InboxCursor::after);
            seen.extend(page.iter().map(|m| m.id));
        }

        let newest_first: Vec<_> = ids.into_iter().rev().collect();
        assert_eq!(seen, newest_first);
    }
}
