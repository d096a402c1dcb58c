//! User directory: display data for conversation previews and the
//! online/last-seen flags maintained by the realtime gateway.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use rentease_shared::types::UserId;

use crate::database::{format_ts, now, parse_ts, Database};
use crate::error::{Result, StoreError};
use crate::models::User;

impl Database {
    /// Insert a user, or refresh the display fields of an existing one.
    pub fn upsert_user(
        &self,
        id: &UserId,
        full_name: &str,
        avatar: Option<&str>,
        email: Option<&str>,
    ) -> Result<User> {
        if id.is_blank() {
            return Err(StoreError::Validation("user id is required".into()));
        }

        self.conn().execute(
            "INSERT INTO users (id, full_name, avatar, email, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                full_name = excluded.full_name,
                avatar    = excluded.avatar,
                email     = excluded.email",
            params![id.as_str(), full_name, avatar, email, format_ts(&now())],
        )?;

        self.find_user(id)?.ok_or(StoreError::NotFound)
    }

    /// Look up a user. `Ok(None)` when the identity does not resolve.
    pub fn find_user(&self, id: &UserId) -> Result<Option<User>> {
        let user = self
            .conn()
            .query_row(
                "SELECT id, full_name, avatar, email, is_online, last_seen, created_at
                 FROM users WHERE id = ?1",
                params![id.as_str()],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Record a presence transition. Returns `false` if the user is not in
    /// the directory, which callers treat as a no-op.
    pub fn set_user_online(&self, id: &UserId, online: bool, at: DateTime<Utc>) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE users SET is_online = ?1, last_seen = ?2 WHERE id = ?3",
            params![online, format_ts(&at), id.as_str()],
        )?;
        Ok(affected > 0)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let id: String = row.get(0)?;
    let last_seen: Option<String> = row.get(5)?;
    let created_at: String = row.get(6)?;

    Ok(User {
        id: UserId(id),
        full_name: row.get(1)?,
        avatar: row.get(2)?,
        email: row.get(3)?,
        is_online: row.get(4)?,
        last_seen: last_seen.map(|s| parse_ts(5, &s)).transpose()?,
        created_at: parse_ts(6, &created_at)?,
    })
}
