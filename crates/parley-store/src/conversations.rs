//! The conversation directory: lazy lookup/creation of the unique two-party
//! container for a pair of users.

use chrono::{DateTime, Utc};
use parley_shared::hashed;
use rusqlite::params;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Conversation;

/// Derive the directory key for a pair of users.
///
/// The two participant hashes are sorted before joining, so the id is the
/// same regardless of argument order.
pub fn conversation_id(user_a: &str, user_b: &str) -> String {
    let mut pair = [hashed(user_a), hashed(user_b)];
    pair.sort();
    pair.join(".")
}

impl Database {
    /// Fetch the conversation between two users, creating it if absent.
    ///
    /// The insert is `OR IGNORE` keyed on the derived id, so concurrent
    /// double-creation can never produce two containers for the same pair.
    pub fn get_or_create_conversation(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Conversation> {
        let id = conversation_id(user_a, user_b);
        self.conn().execute(
            "INSERT OR IGNORE INTO conversations (id, user_a, user_b, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![id, user_a, user_b, Utc::now().to_rfc3339()],
        )?;
        self.get_conversation(&id)
    }

    /// Fetch a conversation by id.
    pub fn get_conversation(&self, id: &str) -> Result<Conversation> {
        self.conn()
            .query_row(
                "SELECT id, user_a, user_b, created_at
                 FROM conversations WHERE id = ?1",
                params![id],
                row_to_conversation,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Every conversation whose id has `hashed(username)` as one of its two
    /// components.
    pub fn conversations_for(&self, username: &str) -> Result<Vec<Conversation>> {
        let key = hashed(username);

        let mut stmt = self.conn().prepare(
            "SELECT id, user_a, user_b, created_at FROM conversations",
        )?;
        let rows = stmt.query_map([], row_to_conversation)?;

        let mut conversations = Vec::new();
        for row in rows {
            let conv = row?;
            if conv.id.split('.').any(|component| component == key) {
                conversations.push(conv);
            }
        }
        Ok(conversations)
    }
}

/// Map a `rusqlite::Row` to a [`Conversation`].
fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    let id: String = row.get(0)?;
    let user_a: String = row.get(1)?;
    let user_b: String = row.get(2)?;
    let created_str: String = row.get(3)?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Conversation {
        id,
        user_a,
        user_b,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_order_independent() {
        assert_eq!(conversation_id("alice", "bob"), conversation_id("bob", "alice"));
        assert_ne!(conversation_id("alice", "bob"), conversation_id("alice", "carol"));
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let db = Database::open_in_memory().unwrap();

        let first = db.get_or_create_conversation("alice", "bob").unwrap();
        let second = db.get_or_create_conversation("bob", "alice").unwrap();
        assert_eq!(first.id, second.id);

        let count: u32 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM conversations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn conversations_for_matches_either_side() {
        let db = Database::open_in_memory().unwrap();
        db.get_or_create_conversation("alice", "bob").unwrap();
        db.get_or_create_conversation("alice", "carol").unwrap();
        db.get_or_create_conversation("bob", "carol").unwrap();

        assert_eq!(db.conversations_for("alice").unwrap().len(), 2);
        assert_eq!(db.conversations_for("bob").unwrap().len(), 2);
        assert_eq!(db.conversations_for("dave").unwrap().len(), 0);
    }

    #[test]
    fn partner_map_preserved_across_creation_order() {
        let db = Database::open_in_memory().unwrap();
        let conv = db.get_or_create_conversation("bob", "alice").unwrap();
        let map = conv.partner_map();
        assert_eq!(map["bob"], "alice");
        assert_eq!(map["alice"], "bob");
    }
}
