//! Database row types, mapped directly from SQLite rows.
//! Conversion into the wire models happens through `to_profile` / `to_record`.
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};

use duet_types::models::{MessageRecord, UserProfile};

pub struct UserRow {
    pub id: String,
    pub fullname: String,
    pub email: String,
    pub password: String,
    pub profile_pic: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: Option<String>,
    pub image_url: Option<String>,
    pub created_at: String,
}

impl UserRow {
    pub fn to_profile(&self) -> Result<UserProfile> {
        Ok(UserProfile {
            id: self.id.parse().with_context(|| format!("corrupt user id '{}'", self.id))?,
            fullname: self.fullname.clone(),
            email: self.email.clone(),
            profile_pic: self.profile_pic.clone(),
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

impl MessageRow {
    pub fn to_record(&self) -> Result<MessageRecord> {
        Ok(MessageRecord {
            id: self.id.parse().with_context(|| format!("corrupt message id '{}'", self.id))?,
            sender_id: self
                .sender_id
                .parse()
                .with_context(|| format!("corrupt sender_id on message '{}'", self.id))?,
            receiver_id: self
                .receiver_id
                .parse()
                .with_context(|| format!("corrupt receiver_id on message '{}'", self.id))?,
            text: self.text.clone(),
            image_url: self.image_url.clone(),
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

/// Rows written by this crate are RFC 3339. Rows written by hand through the
/// sqlite shell usually carry `datetime('now')` output, so accept that too.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc()))
        .with_context(|| format!("corrupt timestamp '{}'", raw))
}
