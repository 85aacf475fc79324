//! v001 -- subscribers, announcements and their attachments.

use rusqlite::Connection;

/// Timestamps are fixed-width RFC 3339 UTC strings, so text order is time order.
const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS subscribers (
    id             TEXT PRIMARY KEY NOT NULL,   -- transport chat id
    display_name   TEXT,
    role           TEXT NOT NULL DEFAULT 'subscriber',
    language       TEXT NOT NULL DEFAULT 'en',
    last_active_at TEXT NOT NULL,
    created_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_subscribers_role ON subscribers(role);
CREATE INDEX IF NOT EXISTS idx_subscribers_last_active ON subscribers(last_active_at);

CREATE TABLE IF NOT EXISTS announcements (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,  -- never reused after delete
    title      TEXT NOT NULL,
    body       TEXT NOT NULL,
    category   TEXT NOT NULL,
    created_by TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_announcements_created
    ON announcements(created_at DESC, id DESC);

CREATE TABLE IF NOT EXISTS announcement_attachments (
    announcement_id INTEGER NOT NULL,
    position        INTEGER NOT NULL,
    kind            TEXT NOT NULL,             -- photo | document | video
    file_ref        TEXT NOT NULL,

    PRIMARY KEY (announcement_id, position),
    FOREIGN KEY (announcement_id) REFERENCES announcements(id) ON DELETE CASCADE
);
"#;

pub fn up(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(UP_SQL)
}
