use {
    super::corrupt,
    crate::domain::error::StoreError,
    crate::domain::money::MinorUnits,
    crate::domain::refund::{NewRefund, Refund, RefundStatus},
    chrono::{DateTime, Utc},
    sqlx::PgPool,
    uuid::Uuid,
};

#[derive(sqlx::FromRow)]
struct RefundRow {
    id: Uuid,
    booking_id: Uuid,
    expected_amount: i64,
    refunded_amount: i64,
    is_partial: bool,
    amount_unknown: bool,
    credits_returned: i64,
    money_returned: i64,
    status: String,
    gateway: String,
    external_refund_id: Option<String>,
    processed_at: Option<DateTime<Utc>>,
}

impl TryFrom<RefundRow> for Refund {
    type Error = StoreError;

    fn try_from(row: RefundRow) -> Result<Self, Self::Error> {
        Ok(Refund {
            id: row.id,
            booking_id: row.booking_id,
            expected_amount: MinorUnits::new(row.expected_amount).map_err(corrupt)?,
            refunded_amount: MinorUnits::new(row.refunded_amount).map_err(corrupt)?,
            is_partial: row.is_partial,
            amount_unknown: row.amount_unknown,
            credits_returned: MinorUnits::new(row.credits_returned).map_err(corrupt)?,
            money_returned: MinorUnits::new(row.money_returned).map_err(corrupt)?,
            status: RefundStatus::try_from(row.status.as_str()).map_err(corrupt)?,
            gateway: row.gateway,
            external_refund_id: row.external_refund_id,
            processed_at: row.processed_at,
        })
    }
}

pub async fn fetch_for_booking(
    pool: &PgPool,
    booking_id: Uuid,
) -> Result<Option<Refund>, StoreError> {
    let row = sqlx::query_as::<_, RefundRow>(
        r#"
        SELECT id, booking_id, expected_amount, refunded_amount, is_partial,
               amount_unknown, credits_returned, money_returned, status,
               gateway, external_refund_id, processed_at
        FROM refunds
        WHERE booking_id = $1
        "#,
    )
    .bind(booking_id)
    .fetch_optional(pool)
    .await?;
    row.map(Refund::try_from).transpose()
}

/// Inserts the booking's single refund row. False means another writer
/// inserted one first.
pub async fn insert(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    refund: &NewRefund,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO refunds
            (id, booking_id, expected_amount, refunded_amount, is_partial,
             amount_unknown, credits_returned, money_returned, status,
             gateway, external_refund_id, processed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (booking_id) DO NOTHING
        "#,
    )
    .bind(refund.id)
    .bind(refund.booking_id)
    .bind(refund.expected_amount.cents())
    .bind(refund.refunded_amount.cents())
    .bind(refund.is_partial)
    .bind(refund.amount_unknown)
    .bind(refund.credits_returned.cents())
    .bind(refund.money_returned.cents())
    .bind(refund.status.as_str())
    .bind(&refund.gateway)
    .bind(refund.external_refund_id.as_deref())
    .bind(refund.processed_at)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Completes a pending refund row. False when it was not pending anymore.
pub async fn complete(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    refund_id: Uuid,
    external_refund_id: Option<&str>,
    processed_at: DateTime<Utc>,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE refunds
        SET status = 'completed',
            external_refund_id = COALESCE($2, external_refund_id),
            processed_at = $3,
            updated_at = now()
        WHERE id = $1 AND status = 'pending'
        "#,
    )
    .bind(refund_id)
    .bind(external_refund_id)
    .bind(processed_at)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() > 0)
}
