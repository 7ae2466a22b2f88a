//! # parley-shared
//!
//! Types shared between the Parley store and server crates: the response
//! status enum, the null-date sentinel used for sync cursors and presence,
//! and the stable identity hasher that turns usernames and room paths into
//! storage keys.

pub mod hash;
pub mod types;

pub use hash::hashed;
pub use types::{null_date, MessageView, Status, NULL_DATE};
