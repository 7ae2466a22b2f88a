use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of every service operation, carried in-band in the response body.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Success,
    AuthFail,
    NotFound,
    Error,
}

/// Sentinel meaning "no date recorded yet".
///
/// Used as the default sync cursor for freshly registered users and as the
/// `last_msg_date` of retrievals that matched nothing. Chosen as the minimum
/// representable RFC 3339 instant so it sorts before any real message.
pub const NULL_DATE: &str = "0001-01-01T00:00:00+00:00";

/// The [`NULL_DATE`] sentinel as a `DateTime<Utc>`.
pub fn null_date() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 0).unwrap()
}

/// A single message as seen by retrieval callers:
/// `(author, body, time, fullname)`.
///
/// `fullname` is already resolved here — records stored without one fall
/// back to the author username at read time.
pub type MessageView = (String, String, String, String);
