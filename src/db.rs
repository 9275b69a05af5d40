use std::{future::Future, path::PathBuf, time::Duration};

use anyhow::Result;
use sea_orm::{
    ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QuerySelect, Select,
    SqlxPostgresConnector, Statement,
};
use sqlx::postgres::PgPoolOptions;
use tokio::fs;

use crate::{
    config::AppConfig,
    error::{AppError, AppResult},
};

pub type DbPool = sqlx::PgPool;
pub type OrmConn = DatabaseConnection;

pub async fn create_pool(database_url: &str) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Wrap an existing sqlx pool so SeaORM and raw queries share connections.
pub fn orm_from_pool(pool: DbPool) -> OrmConn {
    SqlxPostgresConnector::from_sqlx_postgres_pool(pool)
}

/// Minimal migration runner that executes SQL files in `migrations/` in filename order.
pub async fn run_migrations(conn: &DatabaseConnection) -> Result<()> {
    let mut entries = fs::read_dir("migrations").await?;
    let mut files: Vec<PathBuf> = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "sql") {
            files.push(path);
        }
    }
    files.sort();

    let backend = conn.get_database_backend();
    for file in files {
        tracing::debug!(file = %file.display(), "applying migration");
        let sql = fs::read_to_string(&file).await?;
        // Postgres prepared statements cannot contain multiple commands,
        // so split the migration file and run each statement individually.
        for stmt in sql.split(';') {
            let stmt = stmt.trim();
            if stmt.is_empty() {
                continue;
            }
            let statement = format!("{stmt};");
            conn.execute(Statement::from_string(backend, statement))
                .await?;
        }
    }

    Ok(())
}

/// Deadline and retry budget applied to every store call.
#[derive(Debug, Clone, Copy)]
pub struct StorePolicy {
    pub timeout: Duration,
    pub read_retries: u32,
}

impl From<&AppConfig> for StorePolicy {
    fn from(config: &AppConfig) -> Self {
        Self {
            timeout: config.store_timeout,
            read_retries: config.store_read_retries,
        }
    }
}

/// Run a store operation under a deadline. A timed-out future is dropped, which
/// rolls back any transaction it had open, so the caller must treat it as uncommitted.
pub async fn with_deadline<T, F>(limit: Duration, op: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    match tokio::time::timeout(limit, op).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(timeout_ms = limit.as_millis() as u64, "store deadline exceeded");
            Err(AppError::Timeout)
        }
    }
}

/// Idempotent reads only: retried on `Timeout`, every other outcome is returned as is.
pub async fn read_with_retry<T, F, Fut>(policy: StorePolicy, mut op: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempt = 0;
    loop {
        match with_deadline(policy.timeout, op()).await {
            Err(AppError::Timeout) if attempt < policy.read_retries => {
                attempt += 1;
                tracing::warn!(attempt, "retrying store read after timeout");
            }
            other => return other,
        }
    }
}

/// Count the full selection, then fetch one window of it.
pub async fn fetch_page<E, C>(
    conn: &C,
    select: Select<E>,
    limit: u64,
    offset: u64,
) -> AppResult<(Vec<E::Model>, u64)>
where
    E: EntityTrait,
    E::Model: Send + Sync,
    C: ConnectionTrait,
{
    let total = select.clone().count(conn).await?;
    let items = select.limit(limit).offset(offset).all(conn).await?;
    Ok((items, total))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn policy(retries: u32) -> StorePolicy {
        StorePolicy {
            timeout: Duration::from_millis(20),
            read_retries: retries,
        }
    }

    #[tokio::test]
    async fn deadline_turns_a_stalled_call_into_timeout() {
        let result: AppResult<()> =
            with_deadline(Duration::from_millis(10), std::future::pending()).await;
        assert!(matches!(result, Err(AppError::Timeout)));
    }

    #[tokio::test]
    async fn reads_are_retried_until_the_budget_runs_out() {
        let calls = AtomicU32::new(0);
        let result: AppResult<()> = read_with_retry(policy(2), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::Timeout) }
        })
        .await;

        assert!(matches!(result, Err(AppError::Timeout)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_stops_at_first_success() {
        let calls = AtomicU32::new(0);
        let result = read_with_retry(policy(3), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(AppError::Timeout)
                } else {
                    Ok(n)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: AppResult<()> = read_with_retry(policy(5), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::not_found("order")) }
        })
        .await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
