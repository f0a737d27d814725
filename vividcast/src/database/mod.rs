//! Persistence layer: SQLite via sqlx.
//!
//! Two pools share one database file: a read pool sized to the host, and a
//! serialized write pool with a single connection. Every read-modify-write
//! (admission, settlement, grants) goes through the write pool inside a
//! `BEGIN IMMEDIATE` transaction, so the write lock is taken up front and
//! deferred-upgrade deadlocks cannot occur.

pub mod models;
pub mod repositories;
pub mod retry;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use std::time::Duration;

/// Database connection pool type alias.
pub type DbPool = Pool<Sqlite>;

/// Serialized write pool type alias (max_connections=1).
pub type WritePool = Pool<Sqlite>;

const MAX_READ_POOL_SIZE: u32 = 10;
const BUSY_TIMEOUT_MS: u64 = 30_000;
const CACHE_SIZE_KB: i32 = -64000;
const WAL_AUTOCHECKPOINT_PAGES: i32 = 1000;
const JOURNAL_SIZE_LIMIT_BYTES: i64 = 64 * 1024 * 1024;

/// Per-connection pragmas: bound WAL growth, size the page cache, keep temp
/// state off disk.
async fn tune_connection(conn: &mut sqlx::SqliteConnection) -> std::result::Result<(), sqlx::Error> {
    let pragmas = [
        format!("PRAGMA wal_autocheckpoint = {WAL_AUTOCHECKPOINT_PAGES}"),
        format!("PRAGMA journal_size_limit = {JOURNAL_SIZE_LIMIT_BYTES}"),
        format!("PRAGMA cache_size = {CACHE_SIZE_KB}"),
        "PRAGMA temp_store = MEMORY".to_string(),
    ];
    for pragma in &pragmas {
        sqlx::query(pragma).execute(&mut *conn).await?;
    }
    Ok(())
}

/// In-memory databases report `memory` instead of `wal`; anything else
/// means the journal mode did not stick and is forced back.
async fn verify_journal_mode(
    pool: &DbPool,
    pool_name: &str,
) -> std::result::Result<(), sqlx::Error> {
    let mut conn = pool.acquire().await?;
    let mode: String = sqlx::query("PRAGMA journal_mode")
        .fetch_one(&mut *conn)
        .await?
        .get(0);
    if mode != "wal" && mode != "memory" {
        tracing::warn!(pool_name, journal_mode = %mode, "journal mode is not WAL, re-setting");
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Compute a default read pool size from available CPU cores.
pub fn default_read_pool_size() -> u32 {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(2);
    (cores * 2).min(MAX_READ_POOL_SIZE)
}

fn connect_options(database_url: &str) -> std::result::Result<SqliteConnectOptions, sqlx::Error> {
    Ok(SqliteConnectOptions::from_str(database_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))
        .foreign_keys(true)
        .create_if_missing(true))
}

/// Initialize the read pool with WAL mode and performance pragmas.
pub async fn init_pool_with_size(
    database_url: &str,
    max_connections: u32,
) -> std::result::Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .after_connect(|conn, _meta| Box::pin(async move { tune_connection(&mut *conn).await }))
        .connect_with(connect_options(database_url)?)
        .await?;

    verify_journal_mode(&pool, "read_pool").await?;

    tracing::info!(max_connections, "read pool ready (WAL)");

    Ok(pool)
}

/// Initialize the read pool with default size.
pub async fn init_pool(database_url: &str) -> std::result::Result<DbPool, sqlx::Error> {
    init_pool_with_size(database_url, default_read_pool_size()).await
}

/// Initialize the serialized write pool (`max_connections = 1`).
///
/// All writes that use `BEGIN IMMEDIATE` go through this pool, so only one
/// connection ever attempts to take the SQLite write lock.
pub async fn init_write_pool(database_url: &str) -> std::result::Result<WritePool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(60))
        .after_connect(|conn, _meta| Box::pin(async move { tune_connection(&mut *conn).await }))
        .connect_with(connect_options(database_url)?)
        .await?;

    verify_journal_mode(&pool, "write_pool").await?;

    // Catch up any WAL frames left over from a previous crash without
    // blocking readers.
    {
        let mut conn = pool.acquire().await?;
        let (busy, checkpointed, total): (i32, i32, i32) =
            sqlx::query_as("PRAGMA wal_checkpoint(PASSIVE)")
                .fetch_one(&mut *conn)
                .await?;
        tracing::info!(busy, checkpointed, total, "startup WAL checkpoint");
    }

    tracing::info!("write pool ready (1 connection, serialized writes)");

    Ok(pool)
}

pub async fn run_migrations(pool: &DbPool) -> std::result::Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("database migrations applied");
    Ok(())
}

/// Begin an immediate transaction on the write pool.
pub async fn begin_immediate(
    pool: &WritePool,
) -> std::result::Result<ImmediateTransaction, sqlx::Error> {
    let mut conn = pool.acquire().await?;
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
    Ok(ImmediateTransaction::new(conn))
}

/// Wrapper for a manual immediate transaction.
///
/// Dropping an unfinished transaction closes the connection, which rolls the
/// transaction back server-side.
pub struct ImmediateTransaction {
    conn: sqlx::pool::PoolConnection<Sqlite>,
    finished: bool,
}

impl ImmediateTransaction {
    pub fn new(conn: sqlx::pool::PoolConnection<Sqlite>) -> Self {
        Self {
            conn,
            finished: false,
        }
    }

    /// Commit the transaction.
    pub async fn commit(mut self) -> std::result::Result<(), sqlx::Error> {
        sqlx::query("COMMIT").execute(&mut *self.conn).await?;
        self.finished = true;
        Ok(())
    }

    pub async fn rollback(mut self) -> std::result::Result<(), sqlx::Error> {
        sqlx::query("ROLLBACK").execute(&mut *self.conn).await?;
        self.finished = true;
        Ok(())
    }
}

impl std::ops::Deref for ImmediateTransaction {
    type Target = sqlx::SqliteConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl std::ops::DerefMut for ImmediateTransaction {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

impl Drop for ImmediateTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.conn.close_on_drop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_pool() {
        let pool = init_pool("sqlite::memory:").await.unwrap();

        let result: (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await
            .unwrap();

        // In-memory databases report "memory" instead of "wal".
        assert!(result.0 == "memory" || result.0 == "wal");
    }
}
