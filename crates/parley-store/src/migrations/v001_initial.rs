//! v001 -- Initial schema creation.
//!
//! Creates the four core tables: `users`, `conversations`, `chatrooms`, and
//! `messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    username          TEXT PRIMARY KEY NOT NULL,
    password_hash     TEXT NOT NULL,               -- hex-encoded blake3
    created_at        TEXT NOT NULL,               -- ISO-8601 / RFC-3339
    last_cleared_date TEXT NOT NULL
        DEFAULT '0001-01-01T00:00:00+00:00'        -- sync cursor, null-date sentinel
);

-- ----------------------------------------------------------------
-- Conversations (one container per user pair)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS conversations (
    id         TEXT PRIMARY KEY NOT NULL,          -- sorted hash pair joined with '.'
    user_a     TEXT NOT NULL,
    user_b     TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Chatrooms
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chatrooms (
    id           TEXT PRIMARY KEY NOT NULL,        -- blake3 of the room path
    path         TEXT NOT NULL,                    -- client-facing path
    participants TEXT NOT NULL,                    -- JSON array of usernames
    created_at   TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Messages (append-only, keyed by timestamp within a container)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    container_id TEXT NOT NULL,                    -- conversation or chatroom id
    ts           REAL NOT NULL,                    -- epoch seconds, microsecond resolution
    author       TEXT NOT NULL,
    body         TEXT NOT NULL,
    fullname     TEXT,                             -- nullable display name

    PRIMARY KEY (container_id, ts)
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
