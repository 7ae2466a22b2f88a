//! The chat service: every public operation of the Parley backend.
//!
//! Each operation authenticates first, validates before mutating, and
//! reports its outcome in-band through a typed response carrying a
//! [`Status`]. The shared [`Database`] handle is serialized behind a mutex,
//! so each operation runs as one atomic read-modify-write unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use parley_shared::{null_date, Status, NULL_DATE};
use parley_store::presence::PresenceTracker;
use parley_store::query::{collect_window, MessageSource, WindowedMessages};
use parley_store::{ChatRoom, Conversation, Database, StoreError};

// ---------------------------------------------------------------------------
// Request/response shapes
// ---------------------------------------------------------------------------

/// Scopes a retrieval to chatrooms: `"*"` for every room the caller belongs
/// to, a single path, or an explicit list of paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoomSelector {
    Pattern(String),
    Paths(Vec<String>),
}

/// Bare outcome, with an optional human-readable error message.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errmsg: Option<String>,
}

impl StatusResponse {
    fn ok() -> Self {
        Self {
            status: Status::Success,
            errmsg: None,
        }
    }

    fn auth_fail() -> Self {
        Self {
            status: Status::AuthFail,
            errmsg: None,
        }
    }

    fn not_found(errmsg: Option<String>) -> Self {
        Self {
            status: Status::NotFound,
            errmsg,
        }
    }

    fn error(errmsg: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            errmsg: Some(errmsg.into()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisteredResponse {
    pub status: Status,
    pub is_registered: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OnlineUsersResponse {
    pub status: Status,
    pub online_users: Vec<String>,
}

/// Outcome of a send, carrying the stored message's date so clients can
/// advance their own cursors.
#[derive(Debug, Serialize, Deserialize)]
pub struct SendResponse {
    pub status: Status,
    pub last_msg_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errmsg: Option<String>,
}

/// Outcome of a retrieval: conversation and chatroom messages keyed by
/// partner label, plus the combined cursor candidate.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub status: Status,
    pub messages: WindowedMessages,
    pub chatroom_messages: WindowedMessages,
    pub last_msg_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errmsg: Option<String>,
}

impl MessagesResponse {
    fn empty(status: Status, errmsg: Option<String>) -> Self {
        Self {
            status,
            messages: WindowedMessages::new(),
            chatroom_messages: WindowedMessages::new(),
            last_msg_date: NULL_DATE.to_string(),
            errmsg,
        }
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// The service itself: the store handle plus the volatile presence tracker.
pub struct ChatService {
    db: Mutex<Database>,
    presence: PresenceTracker,
}

impl ChatService {
    pub fn new(db: Database) -> Self {
        Self {
            db: Mutex::new(db),
            presence: PresenceTracker::new(),
        }
    }

    // -- Identity (thin wrappers over the user table) --

    pub async fn register(&self, username: &str, password: &str) -> StatusResponse {
        match self.db.lock().await.register_user(username, password) {
            Ok(()) => StatusResponse::ok(),
            Err(e) => StatusResponse::error(e.to_string()),
        }
    }

    pub async fn is_registered(&self, username: &str) -> RegisteredResponse {
        match self.db.lock().await.is_registered(username) {
            Ok(is_registered) => RegisteredResponse {
                status: Status::Success,
                is_registered,
            },
            Err(e) => {
                warn!(error = %e, "is_registered: store failure");
                RegisteredResponse {
                    status: Status::Error,
                    is_registered: false,
                }
            }
        }
    }

    pub async fn set_password(&self, username: &str, password: &str) -> StatusResponse {
        match self.db.lock().await.set_password(username, password) {
            Ok(()) => StatusResponse::ok(),
            Err(StoreError::NotFound) => StatusResponse::not_found(None),
            Err(e) => StatusResponse::error(e.to_string()),
        }
    }

    async fn authenticated(&self, username: &str, password: &str) -> bool {
        self.db
            .lock()
            .await
            .authenticate(username, password)
            .unwrap_or(false)
    }

    // -- Chatroom directory --

    pub async fn create_chat_room(
        &self,
        username: &str,
        password: &str,
        path: &str,
        participants: &[String],
    ) -> StatusResponse {
        if !self.authenticated(username, password).await {
            warn!(user = %username, "create_chat_room: authentication failed");
            return StatusResponse::auth_fail();
        }

        match self.db.lock().await.create_chat_room(path, participants) {
            Ok(_) => StatusResponse::ok(),
            Err(e) => StatusResponse::error(e.to_string()),
        }
    }

    pub async fn add_chat_room_participant(
        &self,
        username: &str,
        password: &str,
        path: &str,
        participant: &str,
    ) -> StatusResponse {
        if !self.authenticated(username, password).await {
            warn!(user = %username, "add_chat_room_participant: authentication failed");
            return StatusResponse::auth_fail();
        }

        let db = self.db.lock().await;

        // An unregistered participant is rejected the same way as bad
        // credentials.
        if !db.is_registered(participant).unwrap_or(false) {
            warn!(participant = %participant, "add_chat_room_participant: participant not registered");
            return StatusResponse::auth_fail();
        }

        match db.add_chat_room_participant(path, participant) {
            Ok(()) => StatusResponse::ok(),
            Err(StoreError::NotFound) => {
                StatusResponse::not_found(Some(format!("Chatroom '{path}' doesn't exist")))
            }
            Err(e) => StatusResponse::error(e.to_string()),
        }
    }

    pub async fn edit_chat_room(
        &self,
        username: &str,
        password: &str,
        path: &str,
        participants: &[String],
    ) -> StatusResponse {
        if !self.authenticated(username, password).await {
            warn!(user = %username, "edit_chat_room: authentication failed");
            return StatusResponse::auth_fail();
        }

        match self.db.lock().await.edit_chat_room(path, participants) {
            Ok(()) => StatusResponse::ok(),
            Err(StoreError::NotFound) => {
                StatusResponse::not_found(Some(format!("Chatroom '{path}' doesn't exist")))
            }
            Err(e) => StatusResponse::error(e.to_string()),
        }
    }

    pub async fn remove_chat_room(
        &self,
        username: &str,
        password: &str,
        path: &str,
    ) -> StatusResponse {
        if !self.authenticated(username, password).await {
            warn!(user = %username, "remove_chat_room: authentication failed");
            return StatusResponse::auth_fail();
        }

        match self.db.lock().await.remove_chat_room(path) {
            Ok(()) => StatusResponse::ok(),
            Err(StoreError::NotFound) => StatusResponse::not_found(None),
            Err(e) => StatusResponse::error(e.to_string()),
        }
    }

    // -- Presence --

    pub async fn confirm_as_online(&self, username: Option<&str>) -> StatusResponse {
        let Some(username) = username else {
            return StatusResponse::error("Username may not be None");
        };

        self.presence.confirm(username).await;
        StatusResponse::ok()
    }

    pub async fn get_online_users(&self) -> OnlineUsersResponse {
        OnlineUsersResponse {
            status: Status::Success,
            online_users: self.presence.online_users().await,
        }
    }

    // -- Sending --

    pub async fn send_message(
        &self,
        username: &str,
        password: &str,
        fullname: &str,
        recipient: &str,
        text: &str,
    ) -> SendResponse {
        if !self.authenticated(username, password).await {
            warn!(user = %username, "send_message: authentication failed");
            return SendResponse {
                status: Status::AuthFail,
                last_msg_date: NULL_DATE.to_string(),
                errmsg: None,
            };
        }

        let db = self.db.lock().await;
        let result = db
            .get_or_create_conversation(username, recipient)
            .and_then(|conv| db.append_message(&conv.id, text, username, Some(fullname)));

        match result {
            Ok(message) => SendResponse {
                status: Status::Success,
                last_msg_date: message.time().to_rfc3339(),
                errmsg: None,
            },
            Err(e) => SendResponse {
                status: Status::Error,
                last_msg_date: NULL_DATE.to_string(),
                errmsg: Some(e.to_string()),
            },
        }
    }

    pub async fn send_chat_room_message(
        &self,
        username: &str,
        password: &str,
        fullname: &str,
        room: &str,
        text: &str,
    ) -> SendResponse {
        if !self.authenticated(username, password).await {
            warn!(user = %username, "send_chat_room_message: authentication failed");
            return SendResponse {
                status: Status::AuthFail,
                last_msg_date: NULL_DATE.to_string(),
                errmsg: None,
            };
        }

        let db = self.db.lock().await;
        let chatroom = match db.get_chat_room(room) {
            Ok(chatroom) => chatroom,
            Err(StoreError::NotFound) => {
                return SendResponse {
                    status: Status::NotFound,
                    last_msg_date: NULL_DATE.to_string(),
                    errmsg: Some(format!("Chatroom '{room}' doesn't exist")),
                }
            }
            Err(e) => {
                return SendResponse {
                    status: Status::Error,
                    last_msg_date: NULL_DATE.to_string(),
                    errmsg: Some(e.to_string()),
                }
            }
        };

        match db.append_message(&chatroom.id, text, username, Some(fullname)) {
            Ok(message) => SendResponse {
                status: Status::Success,
                last_msg_date: message.time().to_rfc3339(),
                errmsg: None,
            },
            Err(e) => SendResponse {
                status: Status::Error,
                last_msg_date: NULL_DATE.to_string(),
                errmsg: Some(e.to_string()),
            },
        }
    }

    // -- Retrieval --

    pub async fn get_messages(
        &self,
        username: &str,
        password: &str,
        partner: Option<&str>,
        chatrooms: &RoomSelector,
        since: Option<&str>,
        until: Option<&str>,
    ) -> MessagesResponse {
        if !self.authenticated(username, password).await {
            warn!(user = %username, "get_messages: authentication failed");
            return MessagesResponse::empty(Status::AuthFail, None);
        }

        self.windowed_messages(username, partner, chatrooms, since, until)
            .await
    }

    /// Incremental sync: everything since the caller's stored cursor (or an
    /// explicit `since`), across every conversation and chatroom.
    pub async fn get_new_messages(
        &self,
        username: &str,
        password: &str,
        since: Option<&str>,
    ) -> MessagesResponse {
        if !self.authenticated(username, password).await {
            warn!(user = %username, "get_new_messages: authentication failed");
            return MessagesResponse::empty(Status::AuthFail, None);
        }

        // The sentinel (or no value at all) means "from my stored cursor".
        let since = match since {
            None => None,
            Some(NULL_DATE) => None,
            Some(s) => Some(s.to_string()),
        };
        let since = match since {
            Some(s) => s,
            None => match self.db.lock().await.last_cleared_date(username) {
                Ok(date) => date.to_rfc3339(),
                Err(e) => return MessagesResponse::empty(Status::Error, Some(e.to_string())),
            },
        };

        self.windowed_messages(
            username,
            Some("*"),
            &RoomSelector::Pattern("*".to_string()),
            Some(&since),
            None,
        )
        .await
    }

    /// Scoped retrieval from the stored cursor; optionally advances the
    /// cursor to the retrieval's combined last date.
    pub async fn get_uncleared_messages(
        &self,
        username: &str,
        password: &str,
        partner: Option<&str>,
        chatrooms: &RoomSelector,
        until: Option<&str>,
        clear: bool,
    ) -> MessagesResponse {
        if !self.authenticated(username, password).await {
            warn!(user = %username, "get_uncleared_messages: authentication failed");
            return MessagesResponse::empty(Status::AuthFail, None);
        }

        let since = match self.db.lock().await.last_cleared_date(username) {
            Ok(date) => date.to_rfc3339(),
            Err(e) => return MessagesResponse::empty(Status::Error, Some(e.to_string())),
        };

        let response = self
            .windowed_messages(username, partner, chatrooms, Some(&since), until)
            .await;

        if clear && response.status == Status::Success {
            if let Ok(date) = DateTime::parse_from_rfc3339(&response.last_msg_date) {
                if let Err(e) = self
                    .db
                    .lock()
                    .await
                    .set_last_cleared_date(username, date.with_timezone(&Utc))
                {
                    return MessagesResponse::empty(Status::Error, Some(e.to_string()));
                }
            }
        }

        response
    }

    /// The shared retrieval path: validate the window, resolve containers,
    /// run the engine once over conversations and once over chatrooms, and
    /// combine the two cursor candidates by max.
    async fn windowed_messages(
        &self,
        username: &str,
        partner: Option<&str>,
        chatrooms: &RoomSelector,
        since: Option<&str>,
        until: Option<&str>,
    ) -> MessagesResponse {
        // Window validation happens before any container is touched.
        let since = match parse_window_date(since) {
            Ok(date) => date.unwrap_or_else(null_date),
            Err(response) => return response,
        };
        let until = match parse_window_date(until) {
            Ok(date) => date.unwrap_or_else(Utc::now),
            Err(response) => return response,
        };

        let db = self.db.lock().await;

        let conversations: Vec<Conversation> = match partner {
            None | Some("") => Vec::new(),
            Some("*") => match db.conversations_for(username) {
                Ok(convs) => convs,
                Err(e) => return MessagesResponse::empty(Status::Error, Some(e.to_string())),
            },
            Some(partner) => match db.get_or_create_conversation(username, partner) {
                Ok(conv) => vec![conv],
                Err(e) => return MessagesResponse::empty(Status::Error, Some(e.to_string())),
            },
        };

        let room_paths = match chatrooms {
            RoomSelector::Pattern(p) if p == "*" => None,
            RoomSelector::Pattern(p) => Some(vec![p.clone()]),
            RoomSelector::Paths(paths) => Some(paths.clone()),
        };
        let rooms: Vec<ChatRoom> = match room_paths {
            None => match db.chat_rooms_for(username) {
                Ok(rooms) => rooms,
                Err(e) => return MessagesResponse::empty(Status::Error, Some(e.to_string())),
            },
            Some(paths) => {
                let mut rooms = Vec::with_capacity(paths.len());
                for path in &paths {
                    match db.get_chat_room(path) {
                        Ok(room) => rooms.push(room),
                        Err(StoreError::NotFound) => {
                            return MessagesResponse::empty(
                                Status::Error,
                                Some(format!("Chatroom '{path}' doesn't exist")),
                            )
                        }
                        Err(e) => {
                            return MessagesResponse::empty(Status::Error, Some(e.to_string()))
                        }
                    }
                }
                rooms
            }
        };

        let conv_sources: Vec<MessageSource> =
            conversations.iter().map(MessageSource::from).collect();
        let room_sources: Vec<MessageSource> = rooms.iter().map(MessageSource::from).collect();

        let (messages, last_conv_date) =
            match collect_window(&db, &conv_sources, username, since, until) {
                Ok(result) => result,
                Err(e) => return MessagesResponse::empty(Status::Error, Some(e.to_string())),
            };
        let (chatroom_messages, last_room_date) =
            match collect_window(&db, &room_sources, username, since, until) {
                Ok(result) => result,
                Err(e) => return MessagesResponse::empty(Status::Error, Some(e.to_string())),
            };

        let last_msg_date = last_conv_date.max(last_room_date);

        MessagesResponse {
            status: Status::Success,
            messages,
            chatroom_messages,
            last_msg_date: last_msg_date.to_rfc3339(),
            errmsg: None,
        }
    }
}

/// Parse an optional window bound; a present-but-malformed value is a
/// validation failure.
fn parse_window_date(value: Option<&str>) -> Result<Option<DateTime<Utc>>, MessagesResponse> {
    match value {
        None => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|_| {
                MessagesResponse::empty(Status::Error, Some("Invalid date format".to_string()))
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn service_with_users(users: &[&str]) -> ChatService {
        let db = Database::open_in_memory().unwrap();
        for user in users {
            db.register_user(user, "pw").unwrap();
        }
        ChatService::new(db)
    }

    fn all_rooms() -> RoomSelector {
        RoomSelector::Pattern("*".to_string())
    }

    fn no_rooms() -> RoomSelector {
        RoomSelector::Paths(Vec::new())
    }

    #[tokio::test]
    async fn direct_message_round_trip() {
        let svc = service_with_users(&["alice", "bob"]).await;

        let sent = svc
            .send_message("alice", "pw", "Alice A.", "bob", "hello bob")
            .await;
        assert_eq!(sent.status, Status::Success);
        assert_ne!(sent.last_msg_date, NULL_DATE);

        let result = svc
            .get_messages("bob", "pw", Some("alice"), &no_rooms(), None, None)
            .await;
        assert_eq!(result.status, Status::Success);

        let msgs = &result.messages["alice"];
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].0, "alice");
        assert_eq!(msgs[0].1, "hello bob");
        assert_eq!(msgs[0].3, "Alice A.");
        assert_eq!(result.last_msg_date, sent.last_msg_date);
    }

    #[tokio::test]
    async fn bad_credentials_are_auth_fail() {
        let svc = service_with_users(&["alice"]).await;

        let sent = svc
            .send_message("alice", "wrong", "Alice", "bob", "hi")
            .await;
        assert_eq!(sent.status, Status::AuthFail);
        assert_eq!(sent.last_msg_date, NULL_DATE);

        let result = svc
            .get_messages("alice", "wrong", Some("*"), &all_rooms(), None, None)
            .await;
        assert_eq!(result.status, Status::AuthFail);
    }

    #[tokio::test]
    async fn chatroom_message_reaches_other_participant() {
        let svc = service_with_users(&["alice", "bob"]).await;

        let created = svc
            .create_chat_room(
                "alice",
                "pw",
                "lobby",
                &["alice".to_string(), "bob".to_string()],
            )
            .await;
        assert_eq!(created.status, Status::Success);

        let sent = svc
            .send_chat_room_message("alice", "pw", "Alice A.", "lobby", "welcome")
            .await;
        assert_eq!(sent.status, Status::Success);

        let result = svc
            .get_messages(
                "bob",
                "pw",
                None,
                &RoomSelector::Paths(vec!["lobby".to_string()]),
                None,
                None,
            )
            .await;
        assert_eq!(result.status, Status::Success);
        assert_eq!(result.chatroom_messages["lobby"][0].1, "welcome");
        assert!(result.messages.is_empty());
    }

    #[tokio::test]
    async fn unknown_room_in_selector_is_validation_error() {
        let svc = service_with_users(&["alice"]).await;

        let result = svc
            .get_messages(
                "alice",
                "pw",
                None,
                &RoomSelector::Paths(vec!["nowhere".to_string()]),
                None,
                None,
            )
            .await;
        assert_eq!(result.status, Status::Error);
        assert!(result.errmsg.unwrap().contains("nowhere"));
    }

    #[tokio::test]
    async fn send_to_unknown_room_is_not_found() {
        let svc = service_with_users(&["alice"]).await;

        let sent = svc
            .send_chat_room_message("alice", "pw", "Alice", "nowhere", "hi")
            .await;
        assert_eq!(sent.status, Status::NotFound);
        assert_eq!(sent.last_msg_date, NULL_DATE);
    }

    #[tokio::test]
    async fn remove_room_twice_reports_not_found() {
        let svc = service_with_users(&["alice"]).await;
        svc.create_chat_room("alice", "pw", "lobby", &["alice".to_string()])
            .await;

        assert_eq!(
            svc.remove_chat_room("alice", "pw", "lobby").await.status,
            Status::Success
        );
        assert_eq!(
            svc.remove_chat_room("alice", "pw", "lobby").await.status,
            Status::NotFound
        );
        assert_eq!(
            svc.remove_chat_room("alice", "pw", "ghost").await.status,
            Status::NotFound
        );
    }

    #[tokio::test]
    async fn unregistered_participant_is_rejected() {
        let svc = service_with_users(&["alice"]).await;
        svc.create_chat_room("alice", "pw", "lobby", &["alice".to_string()])
            .await;

        let added = svc
            .add_chat_room_participant("alice", "pw", "lobby", "ghost")
            .await;
        assert_eq!(added.status, Status::AuthFail);
    }

    #[tokio::test]
    async fn malformed_window_date_is_rejected_before_retrieval() {
        let svc = service_with_users(&["alice"]).await;

        let result = svc
            .get_messages(
                "alice",
                "pw",
                Some("*"),
                &all_rooms(),
                Some("not-a-date"),
                None,
            )
            .await;
        assert_eq!(result.status, Status::Error);
        assert_eq!(result.errmsg.as_deref(), Some("Invalid date format"));
    }

    #[tokio::test]
    async fn uncleared_cursor_is_monotone_under_clear() {
        let svc = service_with_users(&["alice", "bob"]).await;

        svc.send_message("alice", "pw", "Alice", "bob", "one").await;

        let first = svc
            .get_uncleared_messages("bob", "pw", Some("*"), &all_rooms(), None, true)
            .await;
        assert_eq!(first.status, Status::Success);
        assert_eq!(first.messages["alice"].len(), 1);
        let cursor1 = first.last_msg_date.clone();
        assert_ne!(cursor1, NULL_DATE);

        // Nothing new: the window is empty but the cursor must not regress.
        let second = svc
            .get_uncleared_messages("bob", "pw", Some("*"), &all_rooms(), None, true)
            .await;
        assert!(second.messages.is_empty());
        assert_eq!(second.last_msg_date, cursor1);

        svc.send_message("alice", "pw", "Alice", "bob", "two").await;
        let third = svc
            .get_uncleared_messages("bob", "pw", Some("*"), &all_rooms(), None, true)
            .await;
        assert_eq!(third.messages["alice"].len(), 1);
        assert_eq!(third.messages["alice"][0].1, "two");
        assert!(third.last_msg_date > cursor1);
    }

    #[tokio::test]
    async fn new_messages_resumes_from_stored_cursor() {
        let svc = service_with_users(&["alice", "bob"]).await;

        svc.send_message("alice", "pw", "Alice", "bob", "old").await;
        svc.get_uncleared_messages("bob", "pw", Some("*"), &all_rooms(), None, true)
            .await;

        // Sentinel since: resume from the cursor, so "old" is not redelivered.
        let caught_up = svc.get_new_messages("bob", "pw", Some(NULL_DATE)).await;
        assert_eq!(caught_up.status, Status::Success);
        assert!(caught_up.messages.is_empty());

        svc.send_message("alice", "pw", "Alice", "bob", "fresh").await;
        let fresh = svc.get_new_messages("bob", "pw", None).await;
        assert_eq!(fresh.messages["alice"].len(), 1);
        assert_eq!(fresh.messages["alice"][0].1, "fresh");
    }

    #[tokio::test]
    async fn confirm_as_online_requires_username() {
        let svc = service_with_users(&[]).await;

        let missing = svc.confirm_as_online(None).await;
        assert_eq!(missing.status, Status::Error);
        assert_eq!(missing.errmsg.as_deref(), Some("Username may not be None"));

        assert_eq!(
            svc.confirm_as_online(Some("alice")).await.status,
            Status::Success
        );
        let online = svc.get_online_users().await;
        assert_eq!(online.online_users, vec!["alice".to_string()]);
    }

    #[tokio::test]
    async fn register_and_password_lifecycle() {
        let svc = service_with_users(&[]).await;

        assert_eq!(svc.register("carol", "pw").await.status, Status::Success);
        assert!(svc.is_registered("carol").await.is_registered);
        assert!(!svc.is_registered("dave").await.is_registered);

        assert_eq!(
            svc.set_password("carol", "pw2").await.status,
            Status::Success
        );
        assert_eq!(
            svc.set_password("dave", "pw").await.status,
            Status::NotFound
        );

        // Old password no longer authenticates.
        let stale = svc
            .send_message("carol", "pw", "Carol", "dave", "hi")
            .await;
        assert_eq!(stale.status, Status::AuthFail);
    }
}
