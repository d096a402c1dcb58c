//! v001 -- Chat message table.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    seq          INTEGER PRIMARY KEY AUTOINCREMENT, -- insertion order, breaks timestamp ties
    id           TEXT NOT NULL UNIQUE,              -- UUID v4
    sender_id    TEXT NOT NULL,
    receiver_id  TEXT NOT NULL,
    text         TEXT,
    media        TEXT,                              -- data URL or upload reference
    media_type   TEXT,                              -- 'image' | 'video'
    is_read      INTEGER NOT NULL DEFAULT 0,        -- boolean 0/1
    is_delivered INTEGER NOT NULL DEFAULT 0,        -- boolean 0/1
    property_id  TEXT,                              -- optional listing reference
    created_at   TEXT NOT NULL                      -- RFC-3339, microsecond precision
);

CREATE INDEX IF NOT EXISTS idx_messages_pair_ts
    ON messages(sender_id, receiver_id, created_at);

CREATE INDEX IF NOT EXISTS idx_messages_receiver_unread
    ON messages(receiver_id, is_read);
"#;

/// Apply the migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
