use super::schema::{BOOTSTRAP_KEY, SEED_RECORD, SELECT_RECORD, SQLITE_INIT};
use crate::config::StorageConfig;
use crate::error::StorageError;
use backon::{ConstantBuilder, Retryable};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions,
    SqliteSynchronous,
};
use sqlx::{Executor, SqlitePool, Statement};
use std::{path::Path, time::Duration};
use tracing::{debug, info};

/// Opens `path` as a one-connection WAL pool and runs the setup transaction.
///
/// The whole "acquire + `BEGIN IMMEDIATE` + schema + seed" attempt is retried with a
/// constant delay, which rides out a previous writer still holding the file during a
/// rename race. Exhausting the budget closes the pool and reports `OpenExhausted`.
pub(super) async fn open_pool(path: &Path, cfg: &StorageConfig) -> Result<SqlitePool, StorageError> {
    let connect_opts = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .busy_timeout(cfg.busy_timeout())
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal);

    // One connection per process; the pool never holds a second handle to any file.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_lazy_with(connect_opts);

    let seed_value = path.display().to_string();
    let retry_policy = ConstantBuilder::default()
        .with_delay(cfg.open_retry_delay())
        .with_max_times(cfg.open_retry_times);

    let result = (|| bootstrap(&pool, &seed_value))
        .retry(retry_policy)
        .notify(|err: &sqlx::Error, delay: Duration| {
            debug!(
                path = %path.display(),
                error = %err,
                ?delay,
                "Storage setup transaction failed (will retry)"
            );
        })
        .await;

    match result {
        Ok(()) => {
            info!(path = %path.display(), "Storage opened");
            Ok(pool)
        }
        Err(source) => {
            pool.close().await;
            Err(StorageError::OpenExhausted {
                path: path.to_path_buf(),
                attempts: cfg.open_retry_times + 1,
                source,
            })
        }
    }
}

async fn bootstrap(pool: &SqlitePool, seed_value: &str) -> Result<(), sqlx::Error> {
    let mut conn = pool.acquire().await?;
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

    let result = match apply_schema(&mut conn, seed_value).await {
        Ok(()) => sqlx::query("COMMIT").execute(&mut *conn).await.map(|_| ()),
        Err(e) => Err(e),
    };
    if result.is_err() {
        // Leave the connection outside any transaction so the next attempt can BEGIN again.
        let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
    }
    result
}

async fn apply_schema(conn: &mut SqliteConnection, seed_value: &str) -> Result<(), sqlx::Error> {
    for stmt in SQLITE_INIT.split(';') {
        let s = stmt.trim();
        if s.is_empty() {
            continue;
        }
        sqlx::query(s).execute(&mut *conn).await?;
    }
    sqlx::query(SEED_RECORD)
        .bind(BOOTSTRAP_KEY)
        .bind(seed_value)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Point lookup. Only statement preparation is retried; the query itself runs once.
pub(super) async fn read_record(
    pool: &SqlitePool,
    key: i64,
    cfg: &StorageConfig,
) -> Result<Option<String>, StorageError> {
    let retry_policy = ConstantBuilder::default()
        .with_delay(cfg.prepare_retry_delay())
        .with_max_times(cfg.prepare_retry_times);

    let stmt = (|| pool.prepare(SELECT_RECORD))
        .retry(retry_policy)
        .notify(|err: &sqlx::Error, _delay: Duration| {
            debug!(key, error = %err, "Prepare failed (will retry)");
        })
        .await
        .map_err(|source| StorageError::Prepare {
            attempts: cfg.prepare_retry_times + 1,
            source,
        })?;

    let value = stmt
        .query_scalar::<String>()
        .bind(key)
        .fetch_optional(pool)
        .await?;

    Ok(value)
}
