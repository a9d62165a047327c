use {
    super::corrupt,
    crate::domain::error::StoreError,
    crate::domain::money::MinorUnits,
    crate::domain::store::NewPaymentRecord,
    sqlx::PgPool,
};

/// Records a payment observed on a confirmation. Re-deliveries of the same
/// gateway payment are a no-op.
pub async fn insert_payment(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    record: &NewPaymentRecord,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO payments
            (id, external_id, booking_id, credit_id, amount, event_type)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (external_id) DO NOTHING
        "#,
    )
    .bind(record.id)
    .bind(&record.external_id)
    .bind(record.booking_id)
    .bind(record.credit_id)
    .bind(record.amount.cents())
    .bind(&record.event_type)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Amount we recorded for a gateway payment id, if its confirmation ever
/// reached us.
pub async fn fetch_amount(
    pool: &PgPool,
    external_id: &str,
) -> Result<Option<MinorUnits>, StoreError> {
    let amount = sqlx::query_scalar::<_, i64>(
        "SELECT amount FROM payments WHERE external_id = $1",
    )
    .bind(external_id)
    .fetch_optional(pool)
    .await?;
    amount.map(|v| MinorUnits::new(v).map_err(corrupt)).transpose()
}
