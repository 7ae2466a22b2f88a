//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to the API layer.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// A two-party conversation container.
///
/// The id is the sorted pair of participant hashes joined with `.`, so it is
/// identical regardless of which participant created it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    /// `join(".", sorted([hashed(user_a), hashed(user_b)]))`.
    pub id: String,
    pub user_a: String,
    pub user_b: String,
    /// When the container was first created.
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    /// Map each participant to the label under which the *other* side's
    /// messages are presented to them.
    pub fn partner_map(&self) -> HashMap<String, String> {
        HashMap::from([
            (self.user_a.clone(), self.user_b.clone()),
            (self.user_b.clone(), self.user_a.clone()),
        ])
    }
}

// ---------------------------------------------------------------------------
// ChatRoom
// ---------------------------------------------------------------------------

/// A multi-participant chatroom container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRoom {
    /// `hashed(path)`.
    pub id: String,
    /// Client-facing path, also the label chatroom messages appear under.
    pub path: String,
    /// Current participant usernames.
    pub participants: Vec<String>,
    /// When the room was created.
    pub created_at: DateTime<Utc>,
}

impl ChatRoom {
    /// Every participant sees the room under its path. Rebuilt from the
    /// participant set on every read, so membership edits can never leave the
    /// two out of sync.
    pub fn partner_map(&self) -> HashMap<String, String> {
        self.participants
            .iter()
            .map(|p| (p.clone(), self.path.clone()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message, immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// The conversation or chatroom this message belongs to.
    pub container_id: String,
    /// Epoch seconds with microsecond resolution; unique within a container.
    pub ts: f64,
    /// Author username.
    pub author: String,
    /// Message body.
    pub body: String,
    /// Optional display name. Older records may lack one.
    pub fullname: Option<String>,
}

impl Message {
    /// The timestamp as a UTC instant.
    pub fn time(&self) -> DateTime<Utc> {
        let micros = (self.ts * 1e6).round() as i64;
        DateTime::from_timestamp_micros(micros).unwrap_or_else(Utc::now)
    }

    /// Display name with the backward-compatibility fallback: records stored
    /// without a fullname resolve to the author username.
    pub fn display_name(&self) -> &str {
        self.fullname.as_deref().unwrap_or(&self.author)
    }
}

// ---------------------------------------------------------------------------
// UserRecord
// ---------------------------------------------------------------------------

/// A registered user, including the incremental-sync cursor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRecord {
    pub username: String,
    /// When the user registered.
    pub created_at: DateTime<Utc>,
    /// The latest message time this user has already cleared; the null-date
    /// sentinel until a retrieval with `clear` advances it.
    pub last_cleared_date: DateTime<Utc>,
}
