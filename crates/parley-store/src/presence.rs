//! Best-effort user presence.
//!
//! A process-wide map of last-confirmed timestamps. Entries are volatile:
//! the tracker is constructed empty at process start and nothing survives a
//! restart, which callers must tolerate. Stale entries are never deleted,
//! they simply age out of the online classification.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parley_shared::null_date;
use tokio::sync::Mutex;

/// Repeated confirmations inside this window do not touch the stored time.
const DEBOUNCE_SECS: i64 = 30;

/// A user is online iff confirmed strictly more recently than this.
const ONLINE_WINDOW_SECS: i64 = 60;

/// Tracks per-user last-seen timestamps with debounced updates.
#[derive(Clone)]
pub struct PresenceTracker {
    seen: Arc<Mutex<HashMap<String, DateTime<Utc>>>>,
}

impl PresenceTracker {
    /// Create an empty tracker. Called once at process start; the log line
    /// is the visible signal that presence state begins from scratch.
    pub fn new() -> Self {
        tracing::info!("presence tracker initialized; entries do not survive a restart");
        Self {
            seen: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record a confirmation signal for `username`.
    pub async fn confirm(&self, username: &str) {
        self.confirm_at(username, Utc::now()).await;
    }

    /// [`PresenceTracker::confirm`] with an explicit clock reading.
    pub async fn confirm_at(&self, username: &str, now: DateTime<Utc>) {
        let mut seen = self.seen.lock().await;
        let stored = seen.get(username).copied().unwrap_or_else(null_date);
        if stored + Duration::seconds(DEBOUNCE_SECS) < now {
            seen.insert(username.to_string(), now);
        }
    }

    /// Whether `username` confirmed recently enough to classify as online.
    pub async fn is_online(&self, username: &str) -> bool {
        self.is_online_at(username, Utc::now()).await
    }

    /// [`PresenceTracker::is_online`] with an explicit clock reading.
    pub async fn is_online_at(&self, username: &str, now: DateTime<Utc>) -> bool {
        let seen = self.seen.lock().await;
        let stored = seen.get(username).copied().unwrap_or_else(null_date);
        stored > now - Duration::seconds(ONLINE_WINDOW_SECS)
    }

    /// Every tracked username currently classifying as online.
    pub async fn online_users(&self) -> Vec<String> {
        self.online_users_at(Utc::now()).await
    }

    /// [`PresenceTracker::online_users`] with an explicit clock reading.
    pub async fn online_users_at(&self, now: DateTime<Utc>) -> Vec<String> {
        let cutoff = now - Duration::seconds(ONLINE_WINDOW_SECS);
        let seen = self.seen.lock().await;
        seen.iter()
            .filter(|(_, &stored)| stored > cutoff)
            .map(|(user, _)| user.clone())
            .collect()
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new()
    }
}
