//! Snippet rows and query parameters.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::rusqlite::{self, Row, types::Type};

/// Content type used when a request does not name one.
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// A persisted snippet joined with its content.
///
/// `encrypted_content` is only ever produced and consumed by the
/// [`Envelope`](crate::crypto::Envelope). This is also the shape stored in
/// the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnippetRow {
    pub id: i64,
    pub public_id: String,
    pub title: Option<String>,
    pub content_type: String,
    #[serde(with = "base64_bytes")]
    pub encrypted_content: Vec<u8>,
    pub password_hash: Option<String>,
    pub edit_token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub view_count: i64,
    pub last_edited_at: Option<DateTime<Utc>>,
}

impl SnippetRow {
    /// A row past its expiry is a tombstone: it exists but must read as absent.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at < now)
    }

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            public_id: row.get(1)?,
            title: row.get(2)?,
            content_type: row.get(3)?,
            encrypted_content: row.get(4)?,
            password_hash: row.get(5)?,
            edit_token: row.get(6)?,
            created_at: parse_timestamp(row, 7)?,
            expires_at: parse_optional_timestamp(row, 8)?,
            view_count: row.get(9)?,
            last_edited_at: parse_optional_timestamp(row, 10)?,
        })
    }
}

/// Insert parameters. `public_id` is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewSnippet {
    pub title: Option<String>,
    pub content_type: String,
    pub encrypted_content: Vec<u8>,
    pub password_hash: Option<String>,
    pub edit_token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Metadata half of an update.
#[derive(Debug, Clone)]
pub struct UpdateSnippetParams {
    pub id: i64,
    pub title: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_edited_at: DateTime<Utc>,
}

/// Content half of an update.
#[derive(Debug, Clone)]
pub struct UpdateSnippetContentParams {
    pub snippet_id: i64,
    pub content_type: String,
    pub encrypted_content: Vec<u8>,
}

/// Serde helper: ciphertext as standard base64 text.
mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

/// Fixed-width UTC text so stored timestamps sort lexically.
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_optional_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => parse_timestamp(row, idx).map(Some),
        None => Ok(None),
    }
}
