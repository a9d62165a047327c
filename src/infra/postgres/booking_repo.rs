use {
    super::corrupt,
    crate::domain::booking::{
        Booking, BookingStatus, FinancialStatus, PaymentState, ProductBilling, ProductInfo,
        ProductKind,
    },
    crate::domain::error::StoreError,
    crate::domain::money::MinorUnits,
    crate::domain::store::BookingUpdate,
    chrono::{DateTime, Utc},
    sqlx::PgPool,
    uuid::Uuid,
};

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    user_id: Uuid,
    room_id: Uuid,
    product_id: Uuid,
    status: String,
    payment_status: String,
    financial_status: String,
    amount_paid: i64,
    net_amount: Option<i64>,
    credits_used: i64,
    credit_ids: Vec<Uuid>,
    external_payment_id: Option<String>,
    email_sent_at: Option<DateTime<Utc>>,
    product_kind: String,
    product_billing: String,
    product_price: i64,
    package_hours: Option<i32>,
    validity_days: Option<i32>,
    room_hourly_rate: Option<i64>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let kind = match row.product_kind.as_str() {
            "single_slot" => ProductKind::SingleSlot,
            "hour_package" => {
                let hours = row
                    .package_hours
                    .and_then(|h| u32::try_from(h).ok())
                    .ok_or_else(|| {
                        StoreError::CorruptRow(format!(
                            "hour package product {} without valid hours",
                            row.product_id
                        ))
                    })?;
                ProductKind::HourPackage {
                    hours,
                    validity_days: row.validity_days.and_then(|d| u32::try_from(d).ok()),
                }
            }
            other => {
                return Err(StoreError::CorruptRow(format!(
                    "unknown product kind: {other}"
                )));
            }
        };

        Ok(Booking {
            id: row.id,
            user_id: row.user_id,
            room_id: row.room_id,
            product_id: row.product_id,
            status: BookingStatus::try_from(row.status.as_str()).map_err(corrupt)?,
            payment_state: PaymentState::try_from(row.payment_status.as_str()).map_err(corrupt)?,
            financial_status: FinancialStatus::try_from(row.financial_status.as_str())
                .map_err(corrupt)?,
            amount_paid: MinorUnits::new(row.amount_paid).map_err(corrupt)?,
            net_amount: row
                .net_amount
                .map(|v| MinorUnits::new(v).map_err(corrupt))
                .transpose()?,
            credits_used: MinorUnits::new(row.credits_used).map_err(corrupt)?,
            credit_ids: row.credit_ids,
            external_payment_id: row.external_payment_id,
            email_sent_at: row.email_sent_at,
            product: ProductInfo {
                kind,
                billing: ProductBilling::try_from(row.product_billing.as_str())
                    .map_err(corrupt)?,
                price: MinorUnits::new(row.product_price).map_err(corrupt)?,
            },
            room_hourly_rate: row
                .room_hourly_rate
                .map(|v| MinorUnits::new(v).map_err(corrupt))
                .transpose()?,
        })
    }
}

pub async fn fetch_booking(pool: &PgPool, id: Uuid) -> Result<Option<Booking>, StoreError> {
    let row = sqlx::query_as::<_, BookingRow>(
        r#"
        SELECT b.id, b.user_id, b.room_id, b.product_id,
               b.status, b.payment_status, b.financial_status,
               b.amount_paid, b.net_amount, b.credits_used, b.credit_ids,
               b.external_payment_id, b.email_sent_at,
               p.kind AS product_kind, p.billing AS product_billing,
               p.price AS product_price, p.package_hours, p.validity_days,
               r.hourly_rate AS room_hourly_rate
        FROM bookings b
        JOIN products p ON p.id = b.product_id
        JOIN rooms r ON r.id = b.room_id
        WHERE b.id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(Booking::try_from).transpose()
}

/// Applies a field-level update. Returns false when the optimistic guard
/// matched nothing, in which case the caller rolls the transaction back.
pub async fn update_booking(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    update: &BookingUpdate,
) -> Result<bool, StoreError> {
    let (expected_status, expected_financial) = match &update.expected {
        Some((status, financial)) => (Some(status.as_str()), Some(financial.as_str())),
        None => (None, None),
    };

    let result = sqlx::query(
        r#"
        UPDATE bookings
        SET status = COALESCE($2, status),
            payment_status = COALESCE($3, payment_status),
            financial_status = COALESCE($4, financial_status),
            amount_paid = COALESCE($5, amount_paid),
            net_amount = COALESCE($6, net_amount),
            external_payment_id = COALESCE($7, external_payment_id),
            notes = CASE WHEN $8::text IS NULL THEN notes
                         ELSE concat_ws(E'\n', notes, $8::text) END,
            updated_at = now()
        WHERE id = $1
          AND ($9::text IS NULL OR status = $9)
          AND ($10::text IS NULL OR financial_status = $10)
        "#,
    )
    .bind(update.booking_id)
    .bind(update.status.map(|s| s.as_str()))
    .bind(update.payment_state.map(|s| s.as_str()))
    .bind(update.financial_status.map(|s| s.as_str()))
    .bind(update.amount_paid.map(|v| v.cents()))
    .bind(update.net_amount.map(|v| v.cents()))
    .bind(update.external_payment_id.as_deref())
    .bind(update.note.as_deref())
    .bind(expected_status)
    .bind(expected_financial)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// One-shot claim of the confirmation notification for a booking.
pub async fn claim_notification(pool: &PgPool, booking_id: Uuid) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE bookings
        SET email_sent_at = now(), updated_at = now()
        WHERE id = $1 AND email_sent_at IS NULL
        "#,
    )
    .bind(booking_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}
