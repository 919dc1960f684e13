//! Replica-aware snippet store.
//!
//! One primary pool takes every write and transaction; reads that tolerate
//! replication lag go to replica pools chosen round-robin. With no replicas
//! configured, `replica()` hands back the primary.

pub mod migrations;
pub mod model;
pub mod pool;
pub mod queries;

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio_rusqlite::rusqlite::{self, Transaction, TransactionBehavior};

use crate::Error;
use crate::config::DbConfig;

pub use model::{DEFAULT_CONTENT_TYPE, NewSnippet, SnippetRow, UpdateSnippetContentParams, UpdateSnippetParams};
pub use pool::{MEMORY_DSN, Pool, PoolOptions, Role};
pub use queries::SnippetQueries;

/// Primary pool, replica pools, and the rotation index over the replicas.
#[derive(Debug)]
pub struct Store {
    primary: Pool,
    replicas: Vec<Pool>,
    replica_idx: AtomicUsize,
}

impl Store {
    /// Open and health-check every configured pool, then migrate the primary.
    ///
    /// # Errors
    ///
    /// Fails if any database cannot be reached, if migrations fail, or if a
    /// replica does not carry the snippet schema.
    pub async fn open(config: &DbConfig) -> Result<Self, Error> {
        let options = PoolOptions::from(config);

        let primary = Pool::open("primary", &config.primary_dsn, Role::Primary, options.clone())
            .await
            .map_err(|e| Error::Config(format!("failed to open primary database: {e}")))?;

        let conn = primary.connection().await?;
        migrations::run(&conn).await?;

        let mut replicas = Vec::with_capacity(config.replica_dsns.len());
        for (i, dsn) in config.replica_dsns.iter().enumerate() {
            let replica = Pool::open(format!("replica-{i}"), dsn, Role::Replica, options.clone())
                .await
                .map_err(|e| Error::Config(format!("failed to open replica database {i}: {e}")))?;

            let conn = replica.connection().await?;
            if !migrations::schema_present(&conn).await? {
                return Err(Error::Config(format!("replica database {i} has no snippet schema")));
            }
            replicas.push(replica);
        }

        tracing::info!(replicas = replicas.len(), "snippet store ready");

        Ok(Self { primary, replicas, replica_idx: AtomicUsize::new(0) })
    }

    /// In-memory primary, no replicas.
    pub async fn open_in_memory() -> Result<Self, Error> {
        Self::open(&DbConfig { primary_dsn: MEMORY_DSN.into(), ..Default::default() }).await
    }

    /// Executor bound to the primary.
    pub fn primary(&self) -> Executor<'_> {
        Executor { pool: &self.primary }
    }

    /// Executor bound to the next replica in rotation, or the primary when
    /// there are none.
    pub fn replica(&self) -> Executor<'_> {
        if self.replicas.is_empty() {
            return self.primary();
        }
        // fetch_add advances exactly once per call, even under contention
        let idx = self.replica_idx.fetch_add(1, Ordering::AcqRel) % self.replicas.len();
        Executor { pool: &self.replicas[idx] }
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }

    /// Run `f` inside one primary transaction.
    ///
    /// Commits when `f` succeeds and the caller is still waiting. When `f`
    /// fails, or the caller gave up (deadline or dropped future), the
    /// transaction is rolled back; if the rollback fails too, both are
    /// reported in `Error::Transaction`.
    pub async fn with_transaction<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&dyn SnippetQueries) -> Result<T, Error> + Send + 'static,
        T: Send + 'static,
    {
        self.primary
            .run_watched(move |conn, submission| -> Result<T, Error> {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let outcome = f(&*tx).and_then(|value| {
                    if submission.abandoned() { Err(Error::Cancelled) } else { Ok(value) }
                });
                settle(tx, outcome)
            })
            .await
    }

    /// Close the primary and every replica.
    ///
    /// # Errors
    ///
    /// Every pool is closed even if an earlier one fails; the first failure
    /// is returned.
    pub async fn close(&self) -> Result<(), Error> {
        let mut first_err = self.primary.close().await.err();
        for replica in &self.replicas {
            if let Err(e) = replica.close().await {
                tracing::warn!(pool = replica.name(), error = %e, "failed to close replica");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// End of a transaction: commit or roll back.
trait Settle {
    fn commit(self) -> rusqlite::Result<()>;
    fn rollback(self) -> rusqlite::Result<()>;
}

impl Settle for Transaction<'_> {
    fn commit(self) -> rusqlite::Result<()> {
        Transaction::commit(self)
    }

    fn rollback(self) -> rusqlite::Result<()> {
        Transaction::rollback(self)
    }
}

/// Commit on success, otherwise roll back and keep the original error.
fn settle<T>(tx: impl Settle, outcome: Result<T, Error>) -> Result<T, Error> {
    match outcome {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(err) => match tx.rollback() {
            Ok(()) => Err(err),
            Err(rb) => Err(Error::Transaction { source: Box::new(err), rollback: rb.to_string() }),
        },
    }
}

/// Async handle that runs [`SnippetQueries`] on one pool.
#[derive(Debug, Clone, Copy)]
pub struct Executor<'s> {
    pool: &'s Pool,
}

impl<'s> Executor<'s> {
    /// Name of the backing pool (`primary`, `replica-0`, ...).
    pub fn pool_name(&self) -> &'s str {
        self.pool.name()
    }

    pub fn role(&self) -> Role {
        self.pool.role()
    }

    pub async fn create_snippet(&self, params: NewSnippet) -> Result<SnippetRow, Error> {
        self.pool.run(move |conn| conn.create_snippet(&params)).await
    }

    pub async fn get_snippet_by_public_id(&self, public_id: &str) -> Result<SnippetRow, Error> {
        let public_id = public_id.to_string();
        self.pool.run(move |conn| conn.get_snippet_by_public_id(&public_id)).await
    }

    pub async fn update_snippet(&self, params: UpdateSnippetParams) -> Result<SnippetRow, Error> {
        self.pool.run(move |conn| conn.update_snippet(&params)).await
    }

    pub async fn update_snippet_content(&self, params: UpdateSnippetContentParams) -> Result<(), Error> {
        self.pool.run(move |conn| conn.update_snippet_content(&params)).await
    }

    pub async fn delete_snippet_by_id(&self, id: i64) -> Result<u64, Error> {
        self.pool.run(move |conn| conn.delete_snippet_by_id(id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn new_snippet(token: &str) -> NewSnippet {
        NewSnippet {
            title: None,
            content_type: DEFAULT_CONTENT_TYPE.into(),
            encrypted_content: b"sealed".to_vec(),
            password_hash: None,
            edit_token: token.into(),
            created_at: Utc::now(),
            expires_at: Some(Utc::now() + Duration::days(1)),
        }
    }

    async fn file_store(dir: &tempfile::TempDir, replicas: usize) -> Store {
        let primary = dir.path().join("primary.sqlite").to_str().unwrap().to_string();
        let config = DbConfig {
            primary_dsn: primary.clone(),
            replica_dsns: vec![primary; replicas],
            max_open_conns: 2,
            max_idle_conns: 1,
            ..Default::default()
        };
        Store::open(&config).await.unwrap()
    }

    #[tokio::test]
    async fn test_no_replicas_falls_back_to_primary() {
        let store = Store::open_in_memory().await.unwrap();
        let exec = store.replica();
        assert_eq!(exec.pool_name(), store.primary().pool_name());
        assert_eq!(exec.role(), Role::Primary);
    }

    #[tokio::test]
    async fn test_replica_round_robin_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = file_store(&dir, 3).await;

        let names: Vec<&str> = (0..6).map(|_| store.replica().pool_name()).collect();
        assert_eq!(names, ["replica-0", "replica-1", "replica-2", "replica-0", "replica-1", "replica-2"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_replica_rotation_is_even_under_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(file_store(&dir, 3).await);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                (0..300).map(|_| store.replica().pool_name().to_string()).collect::<Vec<_>>()
            }));
        }

        let mut counts: HashMap<String, usize> = HashMap::new();
        for handle in handles {
            for name in handle.await.unwrap() {
                *counts.entry(name).or_default() += 1;
            }
        }

        assert_eq!(counts.len(), 3);
        assert!(counts.values().all(|&n| n == 800), "uneven rotation: {counts:?}");
    }

    #[tokio::test]
    async fn test_replica_reads_primary_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = file_store(&dir, 1).await;

        let created = store.primary().create_snippet(new_snippet("tok")).await.unwrap();
        let fetched = store.replica().get_snippet_by_public_id(&created.public_id).await.unwrap();
        assert_eq!(fetched.id, created.id);

        let write = store.replica().delete_snippet_by_id(created.id).await;
        assert!(matches!(write, Err(Error::Database(_))));
    }

    #[tokio::test]
    async fn test_unreachable_replica_fails_construction() {
        let dir = tempfile::tempdir().unwrap();
        let config = DbConfig {
            primary_dsn: dir.path().join("p.sqlite").to_str().unwrap().to_string(),
            replica_dsns: vec![dir.path().join("missing/dir/r.sqlite").to_str().unwrap().to_string()],
            ..Default::default()
        };
        assert!(matches!(Store::open(&config).await, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_replica_without_schema_fails_construction() {
        let dir = tempfile::tempdir().unwrap();
        let config = DbConfig {
            primary_dsn: dir.path().join("p.sqlite").to_str().unwrap().to_string(),
            replica_dsns: vec![dir.path().join("empty.sqlite").to_str().unwrap().to_string()],
            ..Default::default()
        };
        assert!(matches!(Store::open(&config).await, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_transaction_commits() {
        let store = Store::open_in_memory().await.unwrap();
        let created = store.primary().create_snippet(new_snippet("tok")).await.unwrap();
        let id = created.id;

        store
            .with_transaction(move |q| {
                q.update_snippet(&UpdateSnippetParams {
                    id,
                    title: Some("renamed".into()),
                    expires_at: None,
                    last_edited_at: Utc::now(),
                })?;
                q.update_snippet_content(&UpdateSnippetContentParams {
                    snippet_id: id,
                    content_type: "text/x-rust".into(),
                    encrypted_content: b"new".to_vec(),
                })
            })
            .await
            .unwrap();

        let row = store.primary().get_snippet_by_public_id(&created.public_id).await.unwrap();
        assert_eq!(row.title.as_deref(), Some("renamed"));
        assert_eq!(row.encrypted_content, b"new");
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_on_error() {
        let store = Store::open_in_memory().await.unwrap();
        let created = store.primary().create_snippet(new_snippet("tok")).await.unwrap();
        let id = created.id;

        let result: Result<(), Error> = store
            .with_transaction(move |q| {
                q.update_snippet(&UpdateSnippetParams {
                    id,
                    title: Some("half-applied".into()),
                    expires_at: None,
                    last_edited_at: Utc::now(),
                })?;
                q.update_snippet_content(&UpdateSnippetContentParams {
                    snippet_id: id + 1000,
                    content_type: DEFAULT_CONTENT_TYPE.into(),
                    encrypted_content: vec![],
                })
            })
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));

        let row = store.primary().get_snippet_by_public_id(&created.public_id).await.unwrap();
        assert!(row.title.is_none());
        assert!(row.last_edited_at.is_none());
    }

    /// Records which way a transaction was settled.
    struct Recorder {
        log: Arc<std::sync::Mutex<Vec<&'static str>>>,
        rollback_fails: bool,
    }

    impl Settle for Recorder {
        fn commit(self) -> rusqlite::Result<()> {
            self.log.lock().unwrap().push("commit");
            Ok(())
        }

        fn rollback(self) -> rusqlite::Result<()> {
            self.log.lock().unwrap().push("rollback");
            if self.rollback_fails { Err(rusqlite::Error::InvalidQuery) } else { Ok(()) }
        }
    }

    fn recorder(rollback_fails: bool) -> (Recorder, Arc<std::sync::Mutex<Vec<&'static str>>>) {
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        (Recorder { log: log.clone(), rollback_fails }, log)
    }

    #[test]
    fn test_settle_commits_success() {
        let (tx, log) = recorder(false);
        assert_eq!(settle(tx, Ok(7)).unwrap(), 7);
        assert_eq!(*log.lock().unwrap(), ["commit"]);
    }

    #[test]
    fn test_settle_rolls_back_failure() {
        let (tx, log) = recorder(false);
        let result: Result<(), Error> = settle(tx, Err(Error::Validation("bad".into())));
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(*log.lock().unwrap(), ["rollback"]);
    }

    #[test]
    fn test_settle_reports_failed_rollback_with_original_error() {
        let (tx, log) = recorder(true);
        let result: Result<(), Error> = settle(tx, Err(Error::NotFound("snippet #1".into())));

        match result {
            Err(Error::Transaction { source, rollback }) => {
                assert!(matches!(*source, Error::NotFound(_)));
                assert!(!rollback.is_empty());
            }
            other => panic!("expected a transaction error, got {other:?}"),
        }
        assert_eq!(*log.lock().unwrap(), ["rollback"]);
    }

    #[tokio::test]
    async fn test_close_is_reported_per_pool() {
        let dir = tempfile::tempdir().unwrap();
        let store = file_store(&dir, 2).await;
        store.close().await.unwrap();
        assert!(store.replica().get_snippet_by_public_id("x").await.is_err());
        assert!(store.primary().get_snippet_by_public_id("x").await.is_err());
    }
}
