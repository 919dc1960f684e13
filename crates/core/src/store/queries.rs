//! Snippet queries.
//!
//! [`SnippetQueries`] is the capability every executor exposes. It is
//! implemented once, for `rusqlite::Connection`; a `rusqlite::Transaction`
//! dereferences to a connection, so the same queries run inside
//! [`Store::with_transaction`](super::Store::with_transaction).

use rand::{Rng, distributions::Alphanumeric, rngs::OsRng};
use tokio_rusqlite::{
    params,
    rusqlite::{self, Connection, OptionalExtension},
};

use super::model::{NewSnippet, SnippetRow, UpdateSnippetContentParams, UpdateSnippetParams, format_timestamp};
use crate::Error;

const PUBLIC_ID_LEN: usize = 10;
const PUBLIC_ID_ATTEMPTS: usize = 3;

const SELECT_SNIPPET: &str = "SELECT
    s.id, s.public_id, s.title, c.content_type, c.encrypted_content,
    s.password_hash, s.edit_token, s.created_at, s.expires_at,
    s.view_count, s.last_edited_at
FROM snippets s
JOIN snippet_contents c ON c.snippet_id = s.id";

/// Snippet operations available on the primary, a replica, or a transaction.
pub trait SnippetQueries {
    /// Insert a snippet and its content, returning the stored row.
    fn create_snippet(&self, params: &NewSnippet) -> Result<SnippetRow, Error>;

    /// Fetch by public id. `Error::NotFound` when no row exists; expiry is
    /// not checked here.
    fn get_snippet_by_public_id(&self, public_id: &str) -> Result<SnippetRow, Error>;

    /// Replace title, expiry and edit stamp.
    fn update_snippet(&self, params: &UpdateSnippetParams) -> Result<SnippetRow, Error>;

    /// Replace content type and ciphertext.
    fn update_snippet_content(&self, params: &UpdateSnippetContentParams) -> Result<(), Error>;

    /// Delete by internal id, returning the number of rows removed.
    fn delete_snippet_by_id(&self, id: i64) -> Result<u64, Error>;
}

/// Random alphanumeric id from the OS RNG.
pub fn generate_public_id() -> String {
    OsRng.sample_iter(&Alphanumeric).take(PUBLIC_ID_LEN).map(char::from).collect()
}

fn is_public_id_collision(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, Some(msg))
        if e.code == rusqlite::ErrorCode::ConstraintViolation && msg.contains("snippets.public_id"))
}

/// Run `f` under a savepoint so multi-statement writes stay atomic whether or
/// not the caller already opened a transaction.
fn atomically<T>(conn: &Connection, f: impl FnOnce() -> Result<T, Error>) -> Result<T, Error> {
    conn.execute_batch("SAVEPOINT snippet_write")?;
    match f() {
        Ok(value) => {
            conn.execute_batch("RELEASE snippet_write")?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rb) = conn.execute_batch("ROLLBACK TO snippet_write; RELEASE snippet_write") {
                return Err(Error::Transaction { source: Box::new(err), rollback: rb.to_string() });
            }
            Err(err)
        }
    }
}

fn select_by_id(conn: &Connection, id: i64) -> Result<SnippetRow, Error> {
    conn.query_row(&format!("{SELECT_SNIPPET} WHERE s.id = ?1"), params![id], SnippetRow::from_row)
        .optional()?
        .ok_or_else(|| Error::NotFound(format!("snippet #{id}")))
}

impl SnippetQueries for Connection {
    fn create_snippet(&self, params: &NewSnippet) -> Result<SnippetRow, Error> {
        atomically(self, || {
            let created_at = format_timestamp(params.created_at);
            let expires_at = params.expires_at.map(format_timestamp);

            let mut attempt = 0;
            let id = loop {
                attempt += 1;
                let public_id = generate_public_id();
                let inserted = self.execute(
                    "INSERT INTO snippets (public_id, title, password_hash, edit_token, created_at, expires_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![public_id, params.title, params.password_hash, params.edit_token, created_at, expires_at],
                );
                match inserted {
                    Ok(_) => break self.last_insert_rowid(),
                    Err(e) if is_public_id_collision(&e) && attempt < PUBLIC_ID_ATTEMPTS => {
                        tracing::debug!(attempt, "public id collision, retrying");
                    }
                    Err(e) => return Err(e.into()),
                }
            };

            self.execute(
                "INSERT INTO snippet_contents (snippet_id, content_type, encrypted_content) VALUES (?1, ?2, ?3)",
                params![id, params.content_type, params.encrypted_content],
            )?;

            select_by_id(self, id)
        })
    }

    fn get_snippet_by_public_id(&self, public_id: &str) -> Result<SnippetRow, Error> {
        self.query_row(&format!("{SELECT_SNIPPET} WHERE s.public_id = ?1"), params![public_id], SnippetRow::from_row)
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("snippet {public_id}")))
    }

    fn update_snippet(&self, params: &UpdateSnippetParams) -> Result<SnippetRow, Error> {
        let updated = self.execute(
            "UPDATE snippets SET title = ?1, expires_at = ?2, last_edited_at = ?3 WHERE id = ?4",
            params![
                params.title,
                params.expires_at.map(format_timestamp),
                format_timestamp(params.last_edited_at),
                params.id,
            ],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("snippet #{}", params.id)));
        }
        select_by_id(self, params.id)
    }

    fn update_snippet_content(&self, params: &UpdateSnippetContentParams) -> Result<(), Error> {
        let updated = self.execute(
            "UPDATE snippet_contents SET content_type = ?1, encrypted_content = ?2 WHERE snippet_id = ?3",
            params![params.content_type, params.encrypted_content, params.snippet_id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("content for snippet #{}", params.snippet_id)));
        }
        Ok(())
    }

    fn delete_snippet_by_id(&self, id: i64) -> Result<u64, Error> {
        let deleted = self.execute("DELETE FROM snippets WHERE id = ?1", params![id])?;
        Ok(deleted as u64)
    }
}
