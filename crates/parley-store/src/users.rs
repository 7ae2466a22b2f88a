//! User records: credentials and the per-user incremental-sync cursor.

use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::UserRecord;

/// Hash a password for storage (hex blake3).
fn password_hash(password: &str) -> String {
    blake3::hash(password.as_bytes()).to_hex().to_string()
}

impl Database {
    /// Register a user. Registering an existing username is a no-op.
    pub fn register_user(&self, username: &str, password: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO users (username, password_hash, created_at)
             VALUES (?1, ?2, ?3)",
            params![username, password_hash(password), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Check a username/password pair against the stored hash.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<bool> {
        let stored: Option<String> = self
            .conn()
            .query_row(
                "SELECT password_hash FROM users WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(StoreError::Sqlite(other)),
            })?;

        Ok(stored.is_some_and(|h| h == password_hash(password)))
    }

    /// Whether a username exists in the user table.
    pub fn is_registered(&self, username: &str) -> Result<bool> {
        let count: u32 = self.conn().query_row(
            "SELECT COUNT(*) FROM users WHERE username = ?1",
            params![username],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Replace a user's password.
    pub fn set_password(&self, username: &str, password: &str) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE users SET password_hash = ?1 WHERE username = ?2",
            params![password_hash(password), username],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Fetch a full user record.
    pub fn get_user(&self, username: &str) -> Result<UserRecord> {
        self.conn()
            .query_row(
                "SELECT username, created_at, last_cleared_date
                 FROM users WHERE username = ?1",
                params![username],
                row_to_user,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// The user's sync cursor; the null-date sentinel until first advanced.
    pub fn last_cleared_date(&self, username: &str) -> Result<DateTime<Utc>> {
        Ok(self.get_user(username)?.last_cleared_date)
    }

    /// Overwrite the user's sync cursor.
    ///
    /// The cursor is expected to only move forward; a regression is written
    /// anyway but logged as a bug signal.
    pub fn set_last_cleared_date(&self, username: &str, date: DateTime<Utc>) -> Result<()> {
        let previous = self.last_cleared_date(username)?;
        if date < previous {
            tracing::warn!(
                user = %username,
                previous = %previous.to_rfc3339(),
                new = %date.to_rfc3339(),
                "sync cursor moved backwards"
            );
        }

        self.conn().execute(
            "UPDATE users SET last_cleared_date = ?1 WHERE username = ?2",
            params![date.to_rfc3339(), username],
        )?;
        Ok(())
    }
}

/// Map a `rusqlite::Row` to a [`UserRecord`].
fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRecord> {
    let username: String = row.get(0)?;
    let created_str: String = row.get(1)?;
    let cleared_str: String = row.get(2)?;

    let parse = |idx, s: &str| {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })
    };

    Ok(UserRecord {
        username,
        created_at: parse(1, &created_str)?,
        last_cleared_date: parse(2, &cleared_str)?,
    })
}
