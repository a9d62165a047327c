use {crate::domain::audit::NewAuditEntry, crate::domain::error::StoreError};

/// Inserts an audit row. Rows tied to an event are unique per
/// `(event_id, action)`, so reprocessing a delivery never double-logs.
pub async fn insert_audit_entry(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    entry: &NewAuditEntry,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO audit_log
            (id, entity_type, entity_id, event_id, action, actor, alert, detail)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (event_id, action) WHERE event_id IS NOT NULL DO NOTHING
        "#,
    )
    .bind(entry.id)
    .bind(&entry.entity_type)
    .bind(entry.entity_id)
    .bind(entry.event_id.as_deref())
    .bind(&entry.action)
    .bind(&entry.actor)
    .bind(entry.alert)
    .bind(&entry.detail)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() > 0)
}
