use serde_json::Value;
use uuid::Uuid;

use crate::{
    db::{DbPool, with_deadline},
    error::AppResult,
    state::AppState,
};

pub async fn log_audit(
    pool: &DbPool,
    user_id: Option<Uuid>,
    action: &str,
    resource: Option<&str>,
    metadata: Option<Value>,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_logs (id, user_id, action, resource, metadata)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(action)
    .bind(resource)
    .bind(metadata)
    .execute(pool)
    .await?;

    Ok(())
}

/// Best-effort audit entry written after a committed mutation; failures are only logged.
pub async fn record(state: &AppState, user_id: Option<Uuid>, action: &str, resource: &str, metadata: Value) {
    let write = log_audit(&state.pool, user_id, action, Some(resource), Some(metadata));
    if let Err(err) = with_deadline(state.store().timeout, write).await {
        tracing::warn!(error = %err, action, "audit log failed");
    }
}
