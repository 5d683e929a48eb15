use chrono::{Duration as ChronoDuration, Utc};
use counter_propagation::{
    ApplyOutcome, CounterKind, CounterSink, DeltaEvent, PropagationError, PropagationResult,
};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// PostgreSQL-backed aggregate counters
///
/// Table: counters(counter, entity_id, value)
///
/// Each applied delta id is recorded in `processed_deltas` inside the same
/// transaction as the counter update, so a redelivered delta is detected
/// instead of applied twice.
#[derive(Clone)]
pub struct PgCounterSink {
    pool: PgPool,
}

impl PgCounterSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Current value; 0 for counters never touched
    pub async fn get(&self, counter: CounterKind, entity_id: i64) -> Result<i64, sqlx::Error> {
        let value: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT value FROM counters
            WHERE counter = $1 AND entity_id = $2
            "#,
        )
        .bind(counter.as_str())
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(value.unwrap_or(0))
    }

    /// Forget delta ids older than `retention`. Returns rows deleted.
    pub async fn cleanup_processed(&self, retention: ChronoDuration) -> Result<u64, sqlx::Error> {
        let cutoff = Utc::now() - retention;
        let result = sqlx::query(
            r#"
            DELETE FROM processed_deltas
            WHERE processed_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

fn apply_failed(err: sqlx::Error) -> PropagationError {
    PropagationError::ApplyFailed(err.to_string())
}

#[async_trait::async_trait]
impl CounterSink for PgCounterSink {
    async fn apply_delta(&self, event: &DeltaEvent) -> PropagationResult<ApplyOutcome> {
        let mut tx = self.pool.begin().await.map_err(apply_failed)?;

        if let Some(delta_id) = event.delta_id {
            let inserted = sqlx::query(
                r#"
                INSERT INTO processed_deltas (delta_id, counter, entity_id, processed_at)
                VALUES ($1, $2, $3, NOW())
                ON CONFLICT (delta_id) DO NOTHING
                "#,
            )
            .bind(delta_id)
            .bind(event.counter.as_str())
            .bind(event.entity_id)
            .execute(&mut *tx)
            .await
            .map_err(apply_failed)?
            .rows_affected();

            if inserted == 0 {
                tx.rollback().await.map_err(apply_failed)?;
                return Ok(ApplyOutcome::Duplicate);
            }
        }

        sqlx::query(
            r#"
            INSERT INTO counters (counter, entity_id, value, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (counter, entity_id)
            DO UPDATE SET value = counters.value + EXCLUDED.value, updated_at = NOW()
            "#,
        )
        .bind(event.counter.as_str())
        .bind(event.entity_id)
        .bind(event.delta)
        .execute(&mut *tx)
        .await
        .map_err(apply_failed)?;

        tx.commit().await.map_err(apply_failed)?;

        debug!(
            counter = %event.counter,
            entity_id = event.entity_id,
            delta = event.delta,
            "Counter updated"
        );
        Ok(ApplyOutcome::Applied)
    }
}

/// Periodically purge the delta ledger. Runs until the task is dropped.
pub async fn run_ledger_cleanup(
    sink: Arc<PgCounterSink>,
    interval: Duration,
    retention_hours: i64,
) -> anyhow::Result<()> {
    let retention = ChronoDuration::hours(retention_hours);
    let mut ticker = tokio::time::interval(interval);

    info!(
        interval_secs = interval.as_secs(),
        retention_hours, "Delta ledger cleanup started"
    );

    loop {
        ticker.tick().await;
        match sink.cleanup_processed(retention).await {
            Ok(0) => {}
            Ok(deleted) => info!(deleted, "Purged expired delta ids"),
            Err(e) => warn!(error = %e, "Delta ledger cleanup failed"),
        }
    }
}
