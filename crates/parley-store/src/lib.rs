//! # parley-store
//!
//! SQLite-backed storage for the Parley chat service.
//!
//! The crate exposes a synchronous [`Database`] handle that wraps a
//! `rusqlite::Connection` and provides typed helpers for every domain model:
//! the conversation and chatroom directories, append-only message containers,
//! and user records carrying the incremental-sync cursor. On top of the
//! stored data sit two pure-ish components: the range-query engine
//! ([`query`]) and the volatile in-memory [`presence::PresenceTracker`].

pub mod chatrooms;
pub mod conversations;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod presence;
pub mod query;
pub mod users;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
