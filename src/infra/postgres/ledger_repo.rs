use {
    crate::domain::error::StoreError,
    crate::domain::ledger::{EventId, LedgerDecision, LedgerStatus, NewLedgerEvent},
    sqlx::PgPool,
};

/// Records a delivery. Exactly one of three things happens: a fresh
/// `processing` row is inserted, a stalled or failed row is reclaimed for
/// reprocessing, or a terminal row turns the delivery into a duplicate.
pub async fn record_event(
    pool: &PgPool,
    event: &NewLedgerEvent,
) -> Result<LedgerDecision, StoreError> {
    let mut tx = pool.begin().await?;

    let inserted = sqlx::query_scalar::<_, bool>(
        r#"
        INSERT INTO webhook_events
            (event_id, event_type, external_payment_id, resource_reference, status, payload)
        VALUES ($1, $2, $3, $4, 'processing', $5)
        ON CONFLICT (event_id) DO NOTHING
        RETURNING true
        "#,
    )
    .bind(event.event_id.as_str())
    .bind(&event.event_type)
    .bind(event.external_payment_id.as_deref())
    .bind(event.resource_reference.as_deref())
    .bind(&event.payload)
    .fetch_optional(&mut *tx)
    .await?;

    if inserted.is_some() {
        tx.commit().await?;
        return Ok(LedgerDecision::New);
    }

    // FOR UPDATE serializes concurrent deliveries of the same event id.
    let status = sqlx::query_scalar::<_, String>(
        "SELECT status FROM webhook_events WHERE event_id = $1 FOR UPDATE",
    )
    .bind(event.event_id.as_str())
    .fetch_one(&mut *tx)
    .await?;
    let prior = LedgerStatus::try_from(status.as_str())
        .map_err(|e| StoreError::CorruptRow(e.to_string()))?;

    if prior.is_terminal() {
        tx.commit().await?;
        return Ok(LedgerDecision::Duplicate(prior));
    }

    sqlx::query(
        r#"
        UPDATE webhook_events
        SET status = 'processing', attempts = attempts + 1, updated_at = now()
        WHERE event_id = $1
        "#,
    )
    .bind(event.event_id.as_str())
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    Ok(LedgerDecision::Reprocess(prior))
}

pub async fn finalize_event(
    pool: &PgPool,
    event_id: &EventId,
    status: LedgerStatus,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE webhook_events
        SET status = $2,
            processed_at = CASE WHEN $3 THEN now() ELSE processed_at END,
            updated_at = now()
        WHERE event_id = $1
        "#,
    )
    .bind(event_id.as_str())
    .bind(status.as_str())
    .bind(status.is_terminal())
    .execute(pool)
    .await?;
    Ok(())
}
