use {
    super::corrupt,
    crate::domain::credit::{Credit, CreditStatus, CreditUsageType, NewCredit},
    crate::domain::error::StoreError,
    crate::domain::money::MinorUnits,
    crate::domain::store::CreditUpdate,
    chrono::{DateTime, Utc},
    sqlx::PgPool,
    uuid::Uuid,
};

#[derive(sqlx::FromRow)]
struct CreditRow {
    id: Uuid,
    user_id: Uuid,
    status: String,
    usage_type: String,
    amount: i64,
    remaining_amount: i64,
    coupon_code: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    external_payment_id: Option<String>,
}

impl TryFrom<CreditRow> for Credit {
    type Error = StoreError;

    fn try_from(row: CreditRow) -> Result<Self, Self::Error> {
        Ok(Credit {
            id: row.id,
            user_id: row.user_id,
            status: CreditStatus::try_from(row.status.as_str()).map_err(corrupt)?,
            usage_type: CreditUsageType::try_from(row.usage_type.as_str()).map_err(corrupt)?,
            amount: MinorUnits::new(row.amount).map_err(corrupt)?,
            remaining_amount: MinorUnits::new(row.remaining_amount).map_err(corrupt)?,
            coupon_code: row.coupon_code,
            expires_at: row.expires_at,
            external_payment_id: row.external_payment_id,
        })
    }
}

const CREDIT_COLUMNS: &str = "id, user_id, status, usage_type, amount, remaining_amount, \
                              coupon_code, expires_at, external_payment_id";

pub async fn fetch_credit(pool: &PgPool, id: Uuid) -> Result<Option<Credit>, StoreError> {
    let row = sqlx::query_as::<_, CreditRow>(&format!(
        "SELECT {CREDIT_COLUMNS} FROM credits WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.map(Credit::try_from).transpose()
}

/// Loads a set of credits preserving the order of `ids`; restoration math
/// depends on application order.
pub async fn fetch_credits(pool: &PgPool, ids: &[Uuid]) -> Result<Vec<Credit>, StoreError> {
    if ids.is_empty() {
        return Ok(vec![]);
    }
    let rows = sqlx::query_as::<_, CreditRow>(&format!(
        r#"
        SELECT {CREDIT_COLUMNS}
        FROM credits c
        JOIN unnest($1::uuid[]) WITH ORDINALITY AS wanted(credit_id, position)
          ON c.id = wanted.credit_id
        ORDER BY wanted.position
        "#
    ))
    .bind(ids)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(Credit::try_from).collect()
}

pub async fn insert_credit(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    credit: &NewCredit,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO credits
            (id, user_id, status, usage_type, amount, remaining_amount,
             source_booking_id, external_payment_id, expires_at)
        VALUES ($1, $2, 'confirmed', $3, $4, $4, $5, $6, $7)
        "#,
    )
    .bind(credit.id)
    .bind(credit.user_id)
    .bind(credit.usage_type.as_str())
    .bind(credit.amount.cents())
    .bind(credit.source_booking_id)
    .bind(credit.external_payment_id.as_deref())
    .bind(credit.expires_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Status-guarded credit update. False means the guard matched nothing.
pub async fn update_credit(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    update: &CreditUpdate,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE credits
        SET status = $2,
            remaining_amount = $3,
            external_payment_id = COALESCE($4, external_payment_id),
            updated_at = now()
        WHERE id = $1
          AND ($5::text IS NULL OR status = $5)
        "#,
    )
    .bind(update.credit_id)
    .bind(update.status.as_str())
    .bind(update.remaining_amount.cents())
    .bind(update.external_payment_id.as_deref())
    .bind(update.expected_status.map(|s| s.as_str()))
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Hands a coupon redemption back when a discounted purchase is refunded.
pub async fn release_coupon(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    code: &str,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE coupons
        SET redemption_count = greatest(redemption_count - 1, 0),
            updated_at = now()
        WHERE code = $1
        "#,
    )
    .bind(code)
    .execute(&mut **tx)
    .await?;
    if result.rows_affected() == 0 {
        tracing::warn!(code, "released coupon does not exist");
    }
    Ok(())
}
