//! The chatroom directory: creation, membership edits, removal, and lookup
//! of multi-participant containers.
//!
//! Rooms are keyed by the hash of their client-facing path. Creation is
//! last-writer-wins on the key; every other operation reports `NotFound`
//! when the room is absent.

use chrono::{DateTime, Utc};
use parley_shared::hashed;
use rusqlite::params;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::ChatRoom;

impl Database {
    /// Create a chatroom at `path`, replacing any existing room with the
    /// same key.
    pub fn create_chat_room(&self, path: &str, participants: &[String]) -> Result<ChatRoom> {
        let id = hashed(path);
        self.conn().execute(
            "INSERT OR REPLACE INTO chatrooms (id, path, participants, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                id,
                path,
                serde_json::to_string(participants)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        self.get_chat_room(path)
    }

    /// Fetch a chatroom by its client-facing path.
    pub fn get_chat_room(&self, path: &str) -> Result<ChatRoom> {
        self.conn()
            .query_row(
                "SELECT id, path, participants, created_at
                 FROM chatrooms WHERE id = ?1",
                params![hashed(path)],
                row_to_chat_room,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Add a participant to an existing room. No-op if already present.
    pub fn add_chat_room_participant(&self, path: &str, participant: &str) -> Result<()> {
        let mut room = self.get_chat_room(path)?;
        if room.participants.iter().any(|p| p == participant) {
            return Ok(());
        }
        room.participants.push(participant.to_string());
        self.write_participants(&room.id, &room.participants)
    }

    /// Replace a room's participant set wholesale.
    ///
    /// The partner map is derived from the participant list on read, so this
    /// also remaps exactly the new participant set to the room's path.
    pub fn edit_chat_room(&self, path: &str, participants: &[String]) -> Result<()> {
        // Existence check first so an edit of a missing room is NotFound,
        // not a silent zero-row update.
        let room = self.get_chat_room(path)?;
        self.write_participants(&room.id, participants)
    }

    /// Delete a room permanently.
    pub fn remove_chat_room(&self, path: &str) -> Result<()> {
        let affected = self.conn().execute(
            "DELETE FROM chatrooms WHERE id = ?1",
            params![hashed(path)],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Every room that has `username` in its participant set. Linear scan.
    pub fn chat_rooms_for(&self, username: &str) -> Result<Vec<ChatRoom>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, path, participants, created_at FROM chatrooms",
        )?;
        let rows = stmt.query_map([], row_to_chat_room)?;

        let mut rooms = Vec::new();
        for row in rows {
            let room = row?;
            if room.participants.iter().any(|p| p == username) {
                rooms.push(room);
            }
        }
        Ok(rooms)
    }

    fn write_participants(&self, id: &str, participants: &[String]) -> Result<()> {
        self.conn().execute(
            "UPDATE chatrooms SET participants = ?1 WHERE id = ?2",
            params![serde_json::to_string(participants)?, id],
        )?;
        Ok(())
    }
}

/// Map a `rusqlite::Row` to a [`ChatRoom`].
fn row_to_chat_room(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatRoom> {
    let id: String = row.get(0)?;
    let path: String = row.get(1)?;
    let participants_json: String = row.get(2)?;
    let created_str: String = row.get(3)?;

    let participants: Vec<String> = serde_json::from_str(&participants_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(ChatRoom {
        id,
        path,
        participants,
        created_at,
    })
}
