use crate::models::{MessageRow, UserRow};
use crate::Database;
use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, Row};
use uuid::Uuid;

const USER_COLUMNS: &str = "id, fullname, email, password, profile_pic, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, text, image_url, created_at";

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        fullname: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<UserRow> {
        self.with_conn(|conn| {
            let created_at = now();
            conn.execute(
                "INSERT INTO users (id, fullname, email, password, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                (id, fullname, email, password_hash, &created_at),
            )?;
            Ok(UserRow {
                id: id.to_string(),
                fullname: fullname.to_string(),
                email: email.to_string(),
                password: password_hash.to_string(),
                profile_pic: String::new(),
                created_at: created_at.clone(),
                updated_at: created_at,
            })
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Everyone except `id`, for the contacts sidebar.
    pub fn list_users_except(&self, id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE id != ?1 ORDER BY fullname COLLATE NOCASE, id"
            ))?;
            let rows = stmt
                .query_map([id], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns the updated row, or `None` if the user no longer exists.
    pub fn update_profile_pic(&self, id: &str, url: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET profile_pic = ?1, updated_at = ?2 WHERE id = ?3",
                (url, now(), id),
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_user(conn, "id", id)
        })
    }

    // -- Messages --

    /// Stores a message and returns the persisted row with its generated id
    /// and timestamp.
    pub fn insert_message(
        &self,
        sender_id: &str,
        receiver_id: &str,
        text: Option<&str>,
        image_url: Option<&str>,
    ) -> Result<MessageRow> {
        self.with_conn(|conn| {
            let row = MessageRow {
                id: Uuid::new_v4().to_string(),
                sender_id: sender_id.to_string(),
                receiver_id: receiver_id.to_string(),
                text: text.map(str::to_string),
                image_url: image_url.map(str::to_string),
                created_at: now(),
            };
            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, text, image_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    row.id,
                    row.sender_id,
                    row.receiver_id,
                    row.text,
                    row.image_url,
                    row.created_at
                ],
            )?;
            Ok(row)
        })
    }

    /// Full history between two users in either direction, oldest first.
    pub fn get_conversation(&self, user_a: &str, user_b: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2)
                    OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY seq ASC"
            ))?;
            let rows = stmt
                .query_map([user_a, user_b], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        sender_id: row.get(1)?,
                        receiver_id: row.get(2)?,
                        text: row.get(3)?,
                        image_url: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        fullname: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        profile_pic: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// `column` is always a literal from this module, never user input.
fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1"))?;

    let row = stmt.query_row([value], user_from_row).optional()?;

    Ok(row)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
