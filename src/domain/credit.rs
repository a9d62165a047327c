use {
    super::audit::NewAuditEntry,
    super::booking::{BlockReason, Booking, PaymentFacts, ProductBilling},
    super::error::WebhookError,
    super::money::MinorUnits,
    super::ports::{ActivationRequest, ConversionEvent, SideEffect},
    super::store::{CreditUpdate, NewPaymentRecord, StateChanges},
    chrono::{DateTime, Duration, Utc},
    serde::{Deserialize, Serialize},
    serde_json::json,
    std::fmt,
    uuid::Uuid,
};

/// Validity window applied when the product does not carry its own.
pub const DEFAULT_VALIDITY_DAYS: u32 = 90;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CreditStatus {
    Pending,
    Confirmed,
    Used,
    Refunded,
}

impl CreditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Used => "used",
            Self::Refunded => "refunded",
        }
    }
}

impl fmt::Display for CreditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for CreditStatus {
    type Error = WebhookError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "used" => Ok(Self::Used),
            "refunded" => Ok(Self::Refunded),
            other => Err(WebhookError::Validation(format!(
                "unknown credit status: {other}"
            ))),
        }
    }
}

/// Which bookings a credit can pay for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CreditUsageType {
    Hourly,
    Shift,
    SaturdayHourly,
}

impl CreditUsageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Shift => "shift",
            Self::SaturdayHourly => "saturday_hourly",
        }
    }
}

impl fmt::Display for CreditUsageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for CreditUsageType {
    type Error = WebhookError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "hourly" => Ok(Self::Hourly),
            "shift" => Ok(Self::Shift),
            "saturday_hourly" => Ok(Self::SaturdayHourly),
            other => Err(WebhookError::Validation(format!(
                "unknown credit usage type: {other}"
            ))),
        }
    }
}

impl ProductBilling {
    /// Usage restriction a credit minted from this product carries.
    pub fn credit_usage(&self) -> CreditUsageType {
        match self {
            Self::Hourly => CreditUsageType::Hourly,
            Self::Shift => CreditUsageType::Shift,
            Self::Saturday => CreditUsageType::SaturdayHourly,
        }
    }
}

/// A credit balance as loaded for reconciliation.
#[derive(Debug, Clone)]
pub struct Credit {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: CreditStatus,
    pub usage_type: CreditUsageType,
    pub amount: MinorUnits,
    pub remaining_amount: MinorUnits,
    pub coupon_code: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub external_payment_id: Option<String>,
}

/// Credit to insert, minted by a package confirmation. Inserted as
/// `Confirmed` with the full amount remaining.
#[derive(Debug, Clone)]
pub struct NewCredit {
    pub id: Uuid,
    pub user_id: Uuid,
    pub usage_type: CreditUsageType,
    pub amount: MinorUnits,
    pub expires_at: DateTime<Utc>,
    pub source_booking_id: Option<Uuid>,
    pub external_payment_id: Option<String>,
}

/// Sizes the credit for an hour-package confirmation. The room's hourly
/// rate wins; a product without a room rate falls back to price divided by
/// hours.
pub fn mint_package_credit(
    booking: &Booking,
    hours: u32,
    validity_days: Option<u32>,
    now: DateTime<Utc>,
) -> Result<NewCredit, WebhookError> {
    if hours == 0 {
        return Err(WebhookError::Validation(format!(
            "hour package on booking {} has zero hours",
            booking.id
        )));
    }
    let rate = match booking.room_hourly_rate {
        Some(rate) => rate,
        None => MinorUnits::new(booking.product.price.cents() / i64::from(hours))?,
    };
    let amount = rate
        .cents()
        .checked_mul(i64::from(hours))
        .ok_or_else(|| {
            WebhookError::Validation(format!(
                "credit amount overflow for booking {}",
                booking.id
            ))
        })
        .and_then(MinorUnits::new)?;
    let validity = validity_days.unwrap_or(DEFAULT_VALIDITY_DAYS);

    Ok(NewCredit {
        id: Uuid::now_v7(),
        user_id: booking.user_id,
        usage_type: booking.product.billing.credit_usage(),
        amount,
        expires_at: now + Duration::days(i64::from(validity)),
        source_booking_id: Some(booking.id),
        external_payment_id: None,
    })
}

#[derive(Debug)]
pub struct PurchasePlan {
    pub changes: StateChanges,
    pub effects: Vec<SideEffect>,
}

#[derive(Debug)]
pub enum PurchaseOutcome {
    AlreadyProcessed,
    Blocked {
        reason: BlockReason,
        audit: NewAuditEntry,
    },
    Proceed(PurchasePlan),
}

/// Confirmation of a standalone credit purchase.
pub fn confirm_purchase(credit: &Credit, facts: &PaymentFacts) -> PurchaseOutcome {
    match credit.status {
        CreditStatus::Confirmed | CreditStatus::Used => {
            return PurchaseOutcome::AlreadyProcessed;
        }
        CreditStatus::Refunded => {
            let audit = NewAuditEntry::new(
                "credit",
                credit.id,
                "confirmation_blocked",
                json!({
                    "reason": BlockReason::Refunded.as_str(),
                    "status": credit.status.as_str(),
                    "external_payment_id": facts.external_payment_id,
                }),
            )
            .with_event(&facts.event_id)
            .as_alert();
            return PurchaseOutcome::Blocked {
                reason: BlockReason::Refunded,
                audit,
            };
        }
        CreditStatus::Pending => {}
    }

    let paid = facts.paid_value.unwrap_or(credit.amount);

    let mut changes = StateChanges::default();
    changes.credit_updates.push(CreditUpdate {
        credit_id: credit.id,
        expected_status: Some(CreditStatus::Pending),
        status: CreditStatus::Confirmed,
        remaining_amount: credit.amount,
        external_payment_id: Some(facts.external_payment_id.clone()),
    });
    changes.payment = Some(NewPaymentRecord {
        id: Uuid::now_v7(),
        external_id: facts.external_payment_id.clone(),
        booking_id: None,
        credit_id: Some(credit.id),
        amount: paid,
        event_type: facts.event_type.clone(),
    });
    changes.audits.push(
        NewAuditEntry::new(
            "credit",
            credit.id,
            "purchase_confirmed",
            json!({
                "amount": paid.cents(),
                "usage_type": credit.usage_type.as_str(),
                "external_payment_id": facts.external_payment_id,
            }),
        )
        .with_event(&facts.event_id),
    );

    let mut effects = vec![SideEffect::TrackConversion(ConversionEvent {
        event_type: facts.event_type.clone(),
        entity_type: "credit",
        entity_id: credit.id,
        value: paid,
        order_id: credit.id.to_string(),
        content_ids: vec![credit.usage_type.as_str().to_owned()],
        contact: facts.contact.clone(),
    })];
    if let Some(email) = facts.contact.as_ref().and_then(|c| c.email.clone()) {
        effects.push(SideEffect::ActivateAccount(ActivationRequest {
            user_id: credit.user_id,
            email,
            name: facts.contact.as_ref().and_then(|c| c.name.clone()),
        }));
    }

    PurchaseOutcome::Proceed(PurchasePlan { changes, effects })
}

/// Refund of a standalone credit purchase. Zeroes the balance and releases
/// the coupon redemption that discounted the purchase, if any.
pub fn refund_purchase(credit: &Credit, facts: &PaymentFacts) -> PurchaseOutcome {
    if credit.status == CreditStatus::Refunded {
        return PurchaseOutcome::AlreadyProcessed;
    }

    let mut changes = StateChanges::default();
    changes.credit_updates.push(CreditUpdate {
        credit_id: credit.id,
        expected_status: Some(credit.status),
        status: CreditStatus::Refunded,
        remaining_amount: MinorUnits::ZERO,
        external_payment_id: None,
    });
    changes.release_coupon = credit.coupon_code.clone();
    changes.audits.push(
        NewAuditEntry::new(
            "credit",
            credit.id,
            "purchase_refunded",
            json!({
                "previous_status": credit.status.as_str(),
                "amount": credit.amount.cents(),
                "remaining_amount": credit.remaining_amount.cents(),
                "coupon_released": credit.coupon_code,
                "external_payment_id": facts.external_payment_id,
            }),
        )
        .with_event(&facts.event_id),
    );

    PurchaseOutcome::Proceed(PurchasePlan {
        changes,
        effects: vec![],
    })
}
