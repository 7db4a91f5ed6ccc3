//! Cost record persistence.

use sqlx::SqlitePool;

use crate::cost::CostRecord;

/// Insert a cost record into the audit table.
pub async fn insert_cost_record(pool: &SqlitePool, record: &CostRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO cost_records (
            correlation_id, timestamp, tier, model, complexity,
            input_tokens, output_tokens, cost_usd,
            routing_tokens, routing_cost_usd
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&record.correlation_id)
    .bind(record.timestamp.to_rfc3339())
    .bind(record.tier.as_str())
    .bind(&record.model)
    .bind(record.complexity.map(|c| c.as_str()))
    .bind(record.input_tokens as i64)
    .bind(record.output_tokens as i64)
    .bind(record.cost_usd)
    .bind(record.routing_tokens as i64)
    .bind(record.routing_cost_usd)
    .execute(pool)
    .await?;
    Ok(())
}

/// Spawn a fire-and-forget database write.
///
/// If the write fails, a warning is logged but the error is not propagated.
pub fn spawn_cost_write(pool: &SqlitePool, record: CostRecord) {
    let pool = pool.clone();
    tokio::spawn(async move {
        if let Err(e) = insert_cost_record(&pool, &record).await {
            tracing::warn!(
                correlation_id = %record.correlation_id,
                error = %e,
                "Failed to write cost record to database"
            );
        }
    });
}
