//! Snippet schema migrations.
//!
//! A `_migrations` version table records what has been applied. Migrations
//! run against the primary only; replicas receive the schema through
//! replication.

use tokio_rusqlite::{Connection, params};

use crate::Error;

/// Migration list: (version, SQL), applied in order.
///
/// Every statement uses CREATE ... IF NOT EXISTS so a partially applied
/// batch can be re-run.
const MIGRATIONS: &[(i64, &str)] = &[(1, include_str!("../../migrations/001_snippets.sql"))];

/// Run any pending migrations.
///
/// # Errors
///
/// Returns an error if a migration SQL fails to execute.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current: i64 =
            conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))?;

        for (version, sql) in MIGRATIONS {
            if *version > current {
                conn.execute_batch(sql)
                    .map_err(|e| Error::MigrationFailed(format!("version {version}: {e}")))?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, ?2)",
                    params![version, chrono::Utc::now().to_rfc3339()],
                )?;
                tracing::info!(version, "applied schema migration");
            }
        }

        Ok(())
    })
    .await
    .map_err(Error::from)
}

/// Whether the snippet tables exist on this connection.
pub async fn schema_present(conn: &Connection) -> Result<bool, Error> {
    conn.call(|conn| -> Result<bool, Error> {
        let present: bool = conn.query_row(
            "SELECT COUNT(*) = 2 FROM sqlite_master
             WHERE type = 'table' AND name IN ('snippets', 'snippet_contents')",
            [],
            |row| row.get(0),
        )?;
        Ok(present)
    })
    .await
    .map_err(Error::from)
}
