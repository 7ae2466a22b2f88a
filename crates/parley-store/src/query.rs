//! The range-query engine.
//!
//! Merges the messages of a set of containers into one time-windowed,
//! participant-scoped result, keyed by the partner label the requesting user
//! knows each container under, together with an advancing cursor date.
//!
//! The cursor is the newest message date that is `<= until`, across every
//! container processed, **including** messages that the `since` bound
//! excludes from the returned mapping. Incremental-sync callers rely on this:
//! the cursor must be independent of how much has already been delivered.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use parley_shared::{null_date, MessageView};

use crate::database::Database;
use crate::error::Result;
use crate::models::{ChatRoom, Conversation};

/// One container as seen by the engine: its storage key plus the partner map
/// resolving the requesting user to a display label.
#[derive(Debug, Clone)]
pub struct MessageSource {
    pub container_id: String,
    pub partner: HashMap<String, String>,
}

impl From<&Conversation> for MessageSource {
    fn from(conv: &Conversation) -> Self {
        Self {
            container_id: conv.id.clone(),
            partner: conv.partner_map(),
        }
    }
}

impl From<&ChatRoom> for MessageSource {
    fn from(room: &ChatRoom) -> Self {
        Self {
            container_id: room.id.clone(),
            partner: room.partner_map(),
        }
    }
}

/// Messages per partner label, ascending by timestamp within each label.
pub type WindowedMessages = BTreeMap<String, Vec<MessageView>>;

/// Collect every message in `(since, until]` from the given containers,
/// scoped to `username`.
///
/// Containers that do not list `username` as a partner are skipped with a
/// warning; the state is unexpected but not fatal. Returns the label-keyed
/// mapping and the cursor date (the null sentinel when nothing at all fell
/// inside `until`).
pub fn collect_window(
    db: &Database,
    sources: &[MessageSource],
    username: &str,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<(WindowedMessages, DateTime<Utc>)> {
    let mut last_msg_date = null_date();
    let mut windowed = WindowedMessages::new();

    for source in sources {
        let Some(label) = source.partner.get(username) else {
            tracing::warn!(
                container = %source.container_id,
                user = %username,
                "container does not list the requesting user as a partner; skipping"
            );
            continue;
        };

        let mut included = Vec::new();
        for message in db.messages_for_container(&source.container_id)? {
            let mdate = message.time();

            if mdate > until {
                continue;
            }

            // The cursor wants the latest date that is <= until, even for
            // messages the since bound excludes below.
            if mdate > last_msg_date {
                last_msg_date = mdate;
            }

            if mdate <= since {
                continue;
            }

            included.push(message);
        }

        included.sort_by(|a, b| a.ts.total_cmp(&b.ts));

        if !included.is_empty() {
            let views = included
                .iter()
                .map(|m| {
                    (
                        m.author.clone(),
                        m.body.clone(),
                        m.time().to_rfc3339(),
                        m.display_name().to_string(),
                    )
                })
                .collect();
            windowed.insert(label.clone(), views);
        }
    }

    Ok((windowed, last_msg_date))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    /// A conversation between alice and bob with one message per minute.
    fn seeded(db: &Database, count: i64) -> MessageSource {
        let conv = db.get_or_create_conversation("alice", "bob").unwrap();
        for i in 0..count {
            db.append_message_at(
                &conv.id,
                &format!("msg {i}"),
                "alice",
                Some("Alice A."),
                base() + Duration::minutes(i),
            )
            .unwrap();
        }
        MessageSource::from(&conv)
    }

    #[test]
    fn full_window_returns_everything() {
        let db = Database::open_in_memory().unwrap();
        let source = seeded(&db, 4);

        let (windowed, last) =
            collect_window(&db, &[source], "bob", null_date(), Utc::now()).unwrap();

        let msgs = &windowed["alice"];
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0].1, "msg 0");
        assert_eq!(msgs[0].3, "Alice A.");
        assert_eq!(last, base() + Duration::minutes(3));
    }

    #[test]
    fn until_bounds_both_messages_and_cursor() {
        let db = Database::open_in_memory().unwrap();
        let source = seeded(&db, 4);
        let until = base() + Duration::minutes(1);

        let (windowed, last) =
            collect_window(&db, &[source], "bob", null_date(), until).unwrap();

        assert_eq!(windowed["alice"].len(), 2);
        assert!(last <= until);
        assert_eq!(last, until);
    }

    #[test]
    fn cursor_is_independent_of_since() {
        let db = Database::open_in_memory().unwrap();
        let source = seeded(&db, 4);
        let until = base() + Duration::minutes(10);

        let (_, last_all) =
            collect_window(&db, std::slice::from_ref(&source), "bob", null_date(), until)
                .unwrap();
        let (windowed, last_tail) = collect_window(
            &db,
            &[source],
            "bob",
            base() + Duration::minutes(2),
            until,
        )
        .unwrap();

        // Raising since shrinks the result but never moves the cursor.
        assert_eq!(windowed["alice"].len(), 1);
        assert_eq!(last_all, last_tail);
    }

    #[test]
    fn since_is_exclusive_of_already_delivered() {
        let db = Database::open_in_memory().unwrap();
        let source = seeded(&db, 3);

        // since exactly on a message date excludes that message.
        let (windowed, _) = collect_window(
            &db,
            &[source],
            "bob",
            base() + Duration::minutes(1),
            base() + Duration::minutes(10),
        )
        .unwrap();

        let msgs = &windowed["alice"];
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].1, "msg 2");
    }

    #[test]
    fn empty_window_returns_sentinel_cursor() {
        let db = Database::open_in_memory().unwrap();
        let source = seeded(&db, 2);

        let (windowed, last) = collect_window(
            &db,
            &[source],
            "bob",
            null_date(),
            base() - Duration::hours(1),
        )
        .unwrap();

        assert!(windowed.is_empty());
        assert_eq!(last, null_date());
    }

    #[test]
    fn non_partner_containers_are_skipped() {
        let db = Database::open_in_memory().unwrap();
        let source = seeded(&db, 2);

        let (windowed, last) =
            collect_window(&db, &[source], "mallory", null_date(), Utc::now()).unwrap();

        assert!(windowed.is_empty());
        assert_eq!(last, null_date());
    }

    #[test]
    fn missing_fullname_falls_back_to_author() {
        let db = Database::open_in_memory().unwrap();
        let conv = db.get_or_create_conversation("alice", "bob").unwrap();
        db.append_message_at(&conv.id, "hi", "alice", None, base())
            .unwrap();

        let (windowed, _) = collect_window(
            &db,
            &[MessageSource::from(&conv)],
            "bob",
            null_date(),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(windowed["alice"][0].3, "alice");
    }

    #[test]
    fn chatroom_messages_keyed_by_path() {
        let db = Database::open_in_memory().unwrap();
        let room = db
            .create_chat_room("lobby", &["alice".into(), "bob".into()])
            .unwrap();
        db.append_message_at(&room.id, "welcome", "alice", None, base())
            .unwrap();

        let (windowed, _) = collect_window(
            &db,
            &[MessageSource::from(&room)],
            "bob",
            null_date(),
            Utc::now(),
        )
        .unwrap();

        assert!(windowed.contains_key("lobby"));
    }
}
