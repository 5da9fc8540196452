use rusqlite::Connection;
use tracing::info;

use crate::error::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                created_at  TEXT NOT NULL
            );

            -- Sender/receiver own the message; the editor only attributes it.
            CREATE TABLE messages (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                sender_id       TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                receiver_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content         TEXT NOT NULL,
                timestamp       TEXT NOT NULL,
                edited          INTEGER NOT NULL DEFAULT 0,
                edited_by       TEXT REFERENCES users(id) ON DELETE SET NULL,
                parent_id       INTEGER REFERENCES messages(id) ON DELETE SET NULL
            );

            CREATE INDEX idx_messages_parent
                ON messages(parent_id, timestamp, id);
            CREATE INDEX idx_messages_sender
                ON messages(sender_id);
            CREATE INDEX idx_messages_receiver
                ON messages(receiver_id, timestamp);
            CREATE INDEX idx_messages_edited_by
                ON messages(edited_by);

            CREATE TABLE message_history (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id  INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                old_content TEXT NOT NULL,
                edited_at   TEXT NOT NULL,
                edited_by   TEXT REFERENCES users(id) ON DELETE SET NULL
            );

            CREATE INDEX idx_history_message
                ON message_history(message_id, edited_at);
            CREATE INDEX idx_history_edited_by
                ON message_history(edited_by);

            CREATE TABLE notifications (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                message_id  INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL,
                is_read     INTEGER NOT NULL DEFAULT 0,
                UNIQUE(message_id, user_id)
            );

            CREATE INDEX idx_notifications_unread
                ON notifications(user_id, is_read, created_at);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
