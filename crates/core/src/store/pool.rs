//! Connection pools over tokio-rusqlite.
//!
//! A pool owns up to `max_open_conns` connections to one DSN and hands them
//! out round-robin. Each tokio-rusqlite connection runs its statements on its
//! own background thread, so a checked-out handle is a cheap clone.
//!
//! Work submitted through [`Pool::run`] is bounded by the query deadline.
//! When the caller stops waiting, work still queued is skipped and a
//! statement already executing is interrupted.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio_rusqlite::{
    Connection,
    rusqlite::{self, InterruptHandle},
};

use crate::Error;
use crate::config::DbConfig;

/// DSN that selects an in-memory database.
pub const MEMORY_DSN: &str = ":memory:";

const BUSY_TIMEOUT_MS: u32 = 5_000;

/// Which side of the topology a pool serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Primary,
    Replica,
}

/// Sizing and deadline options shared by every pool in a store.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub max_open_conns: usize,
    pub max_idle_conns: usize,
    pub conn_max_lifetime: Option<Duration>,
    pub query_timeout: Duration,
}

impl From<&DbConfig> for PoolOptions {
    fn from(cfg: &DbConfig) -> Self {
        Self {
            max_open_conns: cfg.max_open_conns,
            max_idle_conns: cfg.max_idle_conns,
            conn_max_lifetime: cfg.conn_max_lifetime(),
            query_timeout: cfg.query_timeout(),
        }
    }
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self::from(&DbConfig::default())
    }
}

struct Slot {
    conn: Connection,
    interrupt: Arc<InterruptHandle>,
    opened_at: Instant,
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot").field("opened_at", &self.opened_at).finish_non_exhaustive()
    }
}

/// Round-robin set of connections to one database.
#[derive(Debug)]
pub struct Pool {
    name: String,
    dsn: String,
    role: Role,
    options: PoolOptions,
    slots: Vec<Mutex<Option<Slot>>>,
    next: AtomicUsize,
    closed: AtomicBool,
}

fn lock(slot: &Mutex<Option<Slot>>) -> MutexGuard<'_, Option<Slot>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Queued,
    Running,
    Finished,
    Abandoned,
}

/// Progress of one closure handed to a connection thread, shared with the
/// caller waiting on it.
#[derive(Debug)]
pub(crate) struct Submission {
    phase: Mutex<Phase>,
}

impl Submission {
    fn new() -> Self {
        Self { phase: Mutex::new(Phase::Queued) }
    }

    fn phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queued → Running. False if the caller already gave up.
    fn start(&self) -> bool {
        let mut phase = self.phase();
        if *phase == Phase::Queued {
            *phase = Phase::Running;
            true
        } else {
            false
        }
    }

    fn finish(&self) {
        let mut phase = self.phase();
        if *phase == Phase::Running {
            *phase = Phase::Finished;
        }
    }

    /// True once the caller has stopped waiting for the result.
    pub(crate) fn abandoned(&self) -> bool {
        *self.phase() == Phase::Abandoned
    }
}

/// Marks the submission abandoned when the caller stops waiting (deadline or
/// dropped future). Queued work is then skipped; running work is interrupted.
struct AbandonOnDrop {
    submission: Arc<Submission>,
    interrupt: Arc<InterruptHandle>,
}

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        let mut phase = self.submission.phase();
        match *phase {
            Phase::Queued => *phase = Phase::Abandoned,
            Phase::Running => {
                *phase = Phase::Abandoned;
                // Held under the lock: `finish` cannot run, so the interrupt
                // lands on this submission and not on the next one.
                self.interrupt.interrupt();
            }
            Phase::Finished | Phase::Abandoned => {}
        }
    }
}

impl Pool {
    /// Open a pool and health-check it.
    ///
    /// `max_idle_conns` connections (at least one) are opened immediately;
    /// the rest open on first use. An in-memory DSN always gets exactly one
    /// connection, since every SQLite memory connection is its own database.
    ///
    /// # Errors
    ///
    /// Returns an error if a connection cannot be opened or fails `SELECT 1`.
    pub async fn open(name: impl Into<String>, dsn: &str, role: Role, options: PoolOptions) -> Result<Self, Error> {
        let in_memory = dsn == MEMORY_DSN;
        let size = if in_memory { 1 } else { options.max_open_conns.max(1) };
        let eager = options.max_idle_conns.clamp(1, size);

        let pool = Self {
            name: name.into(),
            dsn: dsn.to_string(),
            role,
            options,
            slots: (0..size).map(|_| Mutex::new(None)).collect(),
            next: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        };

        for slot in pool.slots.iter().take(eager) {
            let (conn, interrupt) = open_connection(&pool.dsn, role).await?;
            *lock(slot) = Some(Slot { conn, interrupt, opened_at: Instant::now() });
        }

        pool.ping().await?;
        tracing::debug!(pool = %pool.name, size, eager, "opened connection pool");

        Ok(pool)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    fn in_memory(&self) -> bool {
        self.dsn == MEMORY_DSN
    }

    fn expired(&self, slot: &Slot) -> bool {
        !self.in_memory() && self.options.conn_max_lifetime.is_some_and(|max| slot.opened_at.elapsed() >= max)
    }

    /// Check out the next connection, opening or recycling it if needed.
    pub(crate) async fn connection(&self) -> Result<Connection, Error> {
        self.checkout().await.map(|(conn, _)| conn)
    }

    async fn checkout(&self) -> Result<(Connection, Arc<InterruptHandle>), Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Database(tokio_rusqlite::Error::ConnectionClosed));
        }

        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.slots.len();
        {
            let guard = lock(&self.slots[idx]);
            if let Some(slot) = guard.as_ref().filter(|s| !self.expired(s)) {
                return Ok((slot.conn.clone(), slot.interrupt.clone()));
            }
        }

        let (conn, interrupt) = open_connection(&self.dsn, self.role).await?;
        let mut guard = lock(&self.slots[idx]);
        if let Some(slot) = guard.as_ref().filter(|s| !self.expired(s)) {
            // Another caller refilled the slot while we were opening.
            return Ok((slot.conn.clone(), slot.interrupt.clone()));
        }
        if guard.is_some() {
            tracing::debug!(pool = %self.name, slot = idx, "recycling connection past max lifetime");
        }
        *guard = Some(Slot { conn: conn.clone(), interrupt: interrupt.clone(), opened_at: Instant::now() });
        Ok((conn, interrupt))
    }

    /// Run `f` on a pooled connection under the query deadline.
    ///
    /// If the deadline passes or the returned future is dropped before the
    /// connection thread picks the work up, `f` is never executed. If `f` is
    /// already executing, its current statement is interrupted.
    pub(crate) async fn run<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<T, Error> + Send + 'static,
        T: Send + 'static,
    {
        self.run_watched(move |conn, _| f(conn)).await
    }

    /// Like [`run`](Self::run), but `f` can ask the [`Submission`] whether
    /// its caller is still waiting before doing something irreversible.
    pub(crate) async fn run_watched<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut rusqlite::Connection, &Submission) -> Result<T, Error> + Send + 'static,
        T: Send + 'static,
    {
        let (conn, interrupt) = self.checkout().await?;
        let submission = Arc::new(Submission::new());
        let _guard = AbandonOnDrop { submission: submission.clone(), interrupt };

        let call = conn.call(move |conn| -> Result<T, Error> {
            if !submission.start() {
                return Err(Error::Cancelled);
            }
            let result = f(conn, &submission);
            submission.finish();
            result
        });

        match tokio::time::timeout(self.options.query_timeout, call).await {
            Ok(result) => result.map_err(Error::from),
            Err(_) => {
                tracing::warn!(pool = %self.name, timeout = ?self.options.query_timeout, "query deadline exceeded");
                Err(Error::Timeout(format!("{} did not answer within {:?}", self.name, self.options.query_timeout)))
            }
        }
    }

    /// Health check.
    pub async fn ping(&self) -> Result<(), Error> {
        self.run(|conn| -> Result<(), Error> {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }

    /// Close every open connection. Later checkouts fail.
    ///
    /// # Errors
    ///
    /// Returns the first close failure; the rest are logged.
    pub async fn close(&self) -> Result<(), Error> {
        self.closed.store(true, Ordering::Release);

        let conns: Vec<Connection> = self.slots.iter().filter_map(|slot| lock(slot).take()).map(|s| s.conn).collect();

        let mut first_err = None;
        for conn in conns {
            if let Err(e) = conn.close().await {
                let err = Error::from(e);
                tracing::warn!(pool = %self.name, error = %err, "failed to close connection");
                first_err.get_or_insert(err);
            }
        }

        first_err.map_or(Ok(()), Err)
    }

    #[cfg(test)]
    pub(crate) fn open_slots(&self) -> usize {
        self.slots.iter().filter(|slot| lock(slot).is_some()).count()
    }
}

async fn open_connection(dsn: &str, role: Role) -> Result<(Connection, Arc<InterruptHandle>), Error> {
    let conn = if dsn == MEMORY_DSN {
        Connection::open_in_memory().await
    } else {
        Connection::open(dsn).await
    }
    .map_err(|e| Error::Database(e.into()))?;

    let read_only = role == Role::Replica;
    let interrupt = conn
        .call(move |conn| {
            conn.execute_batch(&format!(
                "PRAGMA journal_mode=WAL;
                 PRAGMA synchronous=NORMAL;
                 PRAGMA temp_store=MEMORY;
                 PRAGMA foreign_keys=ON;
                 PRAGMA busy_timeout={BUSY_TIMEOUT_MS};"
            ))?;
            if read_only {
                conn.execute_batch("PRAGMA query_only=ON;")?;
            }
            Ok(conn.get_interrupt_handle())
        })
        .await
        .map_err(Error::Database)?;

    Ok((conn, Arc::new(interrupt)))
}
