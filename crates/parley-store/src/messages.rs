//! Append-only message containers.
//!
//! Messages are keyed by `(container_id, ts)`. The append path guarantees
//! unique timestamps within a container: if the clock has not advanced past
//! the container's newest message, the new timestamp is bumped one
//! microsecond beyond it. Two rapid appends can therefore never overwrite
//! each other.

use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::database::Database;
use crate::error::Result;
use crate::models::Message;

/// Smallest timestamp step: one microsecond, in seconds.
const TS_STEP: f64 = 1e-6;

impl Database {
    /// Append a message to a container, timestamped now.
    pub fn append_message(
        &self,
        container_id: &str,
        body: &str,
        author: &str,
        fullname: Option<&str>,
    ) -> Result<Message> {
        self.append_message_at(container_id, body, author, fullname, Utc::now())
    }

    /// Append with an explicit clock reading. Exposed for deterministic
    /// tests; production callers use [`Database::append_message`].
    pub fn append_message_at(
        &self,
        container_id: &str,
        body: &str,
        author: &str,
        fullname: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Message> {
        let mut ts = now.timestamp_micros() as f64 * TS_STEP;

        let newest: Option<f64> = self.conn().query_row(
            "SELECT MAX(ts) FROM messages WHERE container_id = ?1",
            params![container_id],
            |row| row.get(0),
        )?;
        if let Some(newest) = newest {
            if ts <= newest {
                ts = newest + TS_STEP;
            }
        }

        self.conn().execute(
            "INSERT INTO messages (container_id, ts, author, body, fullname)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![container_id, ts, author, body, fullname],
        )?;

        Ok(Message {
            container_id: container_id.to_string(),
            ts,
            author: author.to_string(),
            body: body.to_string(),
            fullname: fullname.map(String::from),
        })
    }

    /// All messages in a container, ascending by timestamp.
    pub fn messages_for_container(&self, container_id: &str) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT container_id, ts, author, body, fullname
             FROM messages
             WHERE container_id = ?1
             ORDER BY ts ASC",
        )?;

        let rows = stmt.query_map(params![container_id], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }
}

/// Map a `rusqlite::Row` to a [`Message`].
fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        container_id: row.get(0)?,
        ts: row.get(1)?,
        author: row.get(2)?,
        body: row.get(3)?,
        fullname: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_iterate_preserves_order() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..5 {
            db.append_message("c1", &format!("msg {i}"), "alice", None)
                .unwrap();
        }

        let messages = db.messages_for_container("c1").unwrap();
        assert_eq!(messages.len(), 5);
        assert!(messages.windows(2).all(|w| w[0].ts < w[1].ts));
        assert_eq!(messages[0].body, "msg 0");
        assert_eq!(messages[4].body, "msg 4");
    }

    #[test]
    fn identical_clock_readings_never_collide() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();

        // Simulate a clock that does not advance between appends.
        for i in 0..10 {
            db.append_message_at("c1", &format!("m{i}"), "alice", None, now)
                .unwrap();
        }

        let messages = db.messages_for_container("c1").unwrap();
        assert_eq!(messages.len(), 10, "no message may be silently overwritten");
        assert!(messages.windows(2).all(|w| w[0].ts < w[1].ts));
    }

    #[test]
    fn clock_regression_still_appends_after_newest() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();

        db.append_message_at("c1", "first", "alice", None, now).unwrap();
        let earlier = now - chrono::Duration::seconds(5);
        let second = db
            .append_message_at("c1", "second", "alice", None, earlier)
            .unwrap();

        let messages = db.messages_for_container("c1").unwrap();
        assert_eq!(messages.last().unwrap().body, "second");
        assert!(second.ts > messages[0].ts - TS_STEP);
    }

    #[test]
    fn containers_are_isolated() {
        let db = Database::open_in_memory().unwrap();
        db.append_message("c1", "hello", "alice", Some("Alice")).unwrap();
        db.append_message("c2", "world", "bob", None).unwrap();

        assert_eq!(db.messages_for_container("c1").unwrap().len(), 1);
        assert_eq!(db.messages_for_container("c2").unwrap().len(), 1);
        assert_eq!(db.messages_for_container("c3").unwrap().len(), 0);
    }
}
