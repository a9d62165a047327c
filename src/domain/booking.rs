use {
    super::audit::NewAuditEntry,
    super::credit::mint_package_credit,
    super::error::WebhookError,
    super::money::MinorUnits,
    super::ports::{ActivationRequest, ConversionEvent, CustomerContact, SideEffect},
    super::store::{BookingUpdate, NewPaymentRecord, StateChanges},
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    serde_json::json,
    std::fmt,
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
            Self::NoShow => "no_show",
        }
    }

    /// Lifecycle rank; higher means further along. Used to prevent
    /// out-of-order events from regressing status.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Confirmed => 1,
            Self::Cancelled | Self::Completed | Self::NoShow => 2,
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for BookingStatus {
    type Error = WebhookError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "cancelled" => Ok(Self::Cancelled),
            "completed" => Ok(Self::Completed),
            "no_show" => Ok(Self::NoShow),
            other => Err(WebhookError::Validation(format!(
                "unknown booking status: {other}"
            ))),
        }
    }
}

/// What the payment gateway has told us about the charge itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Pending,
    Approved,
    Rejected,
    Refunded,
}

impl PaymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for PaymentState {
    type Error = WebhookError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "refunded" => Ok(Self::Refunded),
            other => Err(WebhookError::Validation(format!(
                "unknown payment state: {other}"
            ))),
        }
    }
}

/// How the booking stands financially from our side of the books.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinancialStatus {
    Unpaid,
    Paid,
    Courtesy,
    PartialRefund,
    Refunded,
}

impl FinancialStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unpaid => "unpaid",
            Self::Paid => "paid",
            Self::Courtesy => "courtesy",
            Self::PartialRefund => "partial_refund",
            Self::Refunded => "refunded",
        }
    }
}

impl fmt::Display for FinancialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for FinancialStatus {
    type Error = WebhookError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "unpaid" => Ok(Self::Unpaid),
            "paid" => Ok(Self::Paid),
            "courtesy" => Ok(Self::Courtesy),
            "partial_refund" => Ok(Self::PartialRefund),
            "refunded" => Ok(Self::Refunded),
            other => Err(WebhookError::Validation(format!(
                "unknown financial status: {other}"
            ))),
        }
    }
}

/// Billing model of the booked product. Decides which usage restriction a
/// minted package credit carries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProductBilling {
    Hourly,
    Shift,
    Saturday,
}

impl ProductBilling {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Shift => "shift",
            Self::Saturday => "saturday",
        }
    }
}

impl TryFrom<&str> for ProductBilling {
    type Error = WebhookError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "hourly" => Ok(Self::Hourly),
            "shift" => Ok(Self::Shift),
            "saturday" => Ok(Self::Saturday),
            other => Err(WebhookError::Validation(format!(
                "unknown product billing: {other}"
            ))),
        }
    }
}

/// Shape of what was booked, as far as reconciliation cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductKind {
    /// A single room slot; confirmation touches only the booking itself.
    SingleSlot,
    /// A prepaid hour bundle; confirmation also mints a credit.
    HourPackage {
        hours: u32,
        validity_days: Option<u32>,
    },
}

#[derive(Debug, Clone)]
pub struct ProductInfo {
    pub kind: ProductKind,
    pub billing: ProductBilling,
    /// List price in minor units.
    pub price: MinorUnits,
}

/// A booking as loaded for reconciliation, product and room rate joined in.
#[derive(Debug, Clone)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub room_id: Uuid,
    pub product_id: Uuid,
    pub status: BookingStatus,
    pub payment_state: PaymentState,
    pub financial_status: FinancialStatus,
    pub amount_paid: MinorUnits,
    /// Amount actually settled by the gateway, when known.
    pub net_amount: Option<MinorUnits>,
    pub credits_used: MinorUnits,
    /// Credits consumed at checkout, in the order they were applied.
    pub credit_ids: Vec<Uuid>,
    pub external_payment_id: Option<String>,
    pub email_sent_at: Option<DateTime<Utc>>,
    pub product: ProductInfo,
    pub room_hourly_rate: Option<MinorUnits>,
}

/// Facts a confirmation or capture-refusal event carries, converted to
/// internal types at the boundary.
#[derive(Debug, Clone)]
pub struct PaymentFacts {
    pub event_id: String,
    pub event_type: String,
    pub external_payment_id: String,
    pub paid_value: Option<MinorUnits>,
    /// Amount settled after gateway fees, when the event reports it.
    pub net_value: Option<MinorUnits>,
    pub billing_type: Option<String>,
    pub contact: Option<CustomerContact>,
}

/// Why a confirmation was refused by the state guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    Courtesy,
    Cancelled,
    Refunded,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Courtesy => "courtesy",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }

    pub fn ledger_status(&self) -> super::ledger::LedgerStatus {
        match self {
            Self::Courtesy => super::ledger::LedgerStatus::BlockedCourtesy,
            Self::Cancelled => super::ledger::LedgerStatus::BlockedCancelled,
            Self::Refunded => super::ledger::LedgerStatus::BlockedRefunded,
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything a confirmation wants persisted and scheduled, decided purely
/// from the loaded snapshot. The store applies `changes` in one transaction.
#[derive(Debug)]
pub struct ConfirmPlan {
    pub changes: StateChanges,
    pub effects: Vec<SideEffect>,
    pub minted_credit: bool,
}

#[derive(Debug)]
pub enum ConfirmOutcome {
    /// Booking already confirmed and paid; redelivery changes nothing.
    AlreadyProcessed,
    /// A state guard rejected the confirmation; the audit row flags it for
    /// human review.
    Blocked {
        reason: BlockReason,
        audit: NewAuditEntry,
    },
    Proceed(ConfirmPlan),
}

/// Payment-confirmation transition. Guards run in a fixed order: the
/// already-processed short-circuit first, then courtesy, cancellation and
/// refund blocks.
pub fn confirm(
    booking: &Booking,
    facts: &PaymentFacts,
    now: DateTime<Utc>,
) -> Result<ConfirmOutcome, WebhookError> {
    if booking.status == BookingStatus::Confirmed
        && booking.financial_status == FinancialStatus::Paid
    {
        return Ok(ConfirmOutcome::AlreadyProcessed);
    }
    if booking.financial_status == FinancialStatus::Courtesy {
        return Ok(blocked(booking, facts, BlockReason::Courtesy));
    }
    if booking.status == BookingStatus::Cancelled {
        return Ok(blocked(booking, facts, BlockReason::Cancelled));
    }
    if booking.financial_status == FinancialStatus::Refunded {
        return Ok(blocked(booking, facts, BlockReason::Refunded));
    }

    let paid = facts.paid_value.unwrap_or(booking.product.price);

    let mut changes = StateChanges::default();
    let mut minted_credit = false;
    let mut action = "payment_confirmed";

    if let ProductKind::HourPackage {
        hours,
        validity_days,
    } = booking.product.kind
    {
        let credit = mint_package_credit(booking, hours, validity_days, now)?;
        changes.audits.push(
            NewAuditEntry::new(
                "credit",
                credit.id,
                "credit_minted",
                json!({
                    "booking_id": booking.id,
                    "amount": credit.amount.cents(),
                    "usage_type": credit.usage_type.as_str(),
                    "expires_at": credit.expires_at,
                }),
            )
            .with_event(&facts.event_id),
        );
        changes.mint_credit = Some(credit);
        minted_credit = true;
        action = "package_confirmed";
    }

    changes.booking = Some(BookingUpdate {
        booking_id: booking.id,
        expected: Some((booking.status, booking.financial_status)),
        // Never regress a booking that is already past confirmation.
        status: (booking.status.rank() < BookingStatus::Confirmed.rank())
            .then_some(BookingStatus::Confirmed),
        payment_state: Some(PaymentState::Approved),
        financial_status: Some(FinancialStatus::Paid),
        amount_paid: Some(paid),
        net_amount: facts.net_value,
        external_payment_id: Some(facts.external_payment_id.clone()),
        note: None,
    });

    changes.payment = Some(NewPaymentRecord {
        id: Uuid::now_v7(),
        external_id: facts.external_payment_id.clone(),
        booking_id: Some(booking.id),
        credit_id: None,
        amount: paid,
        event_type: facts.event_type.clone(),
    });

    changes.audits.push(
        NewAuditEntry::new(
            "booking",
            booking.id,
            action,
            json!({
                "previous_status": booking.status.as_str(),
                "previous_financial_status": booking.financial_status.as_str(),
                "amount": paid.cents(),
                "billing_type": facts.billing_type,
                "external_payment_id": facts.external_payment_id,
            }),
        )
        .with_event(&facts.event_id),
    );

    let mut effects = vec![
        SideEffect::NotifyBookingConfirmed {
            booking_id: booking.id,
        },
        SideEffect::TrackConversion(ConversionEvent {
            event_type: facts.event_type.clone(),
            entity_type: "booking",
            entity_id: booking.id,
            value: paid,
            order_id: booking.id.to_string(),
            content_ids: vec![booking.product_id.to_string()],
            contact: facts.contact.clone(),
        }),
    ];
    if let Some(email) = facts.contact.as_ref().and_then(|c| c.email.clone()) {
        effects.push(SideEffect::ActivateAccount(ActivationRequest {
            user_id: booking.user_id,
            email,
            name: facts.contact.as_ref().and_then(|c| c.name.clone()),
        }));
    }

    Ok(ConfirmOutcome::Proceed(ConfirmPlan {
        changes,
        effects,
        minted_credit,
    }))
}

fn blocked(booking: &Booking, facts: &PaymentFacts, reason: BlockReason) -> ConfirmOutcome {
    let audit = NewAuditEntry::new(
        "booking",
        booking.id,
        "confirmation_blocked",
        json!({
            "reason": reason.as_str(),
            "status": booking.status.as_str(),
            "financial_status": booking.financial_status.as_str(),
            "external_payment_id": facts.external_payment_id,
        }),
    )
    .with_event(&facts.event_id)
    .as_alert();
    ConfirmOutcome::Blocked { reason, audit }
}

/// Card-capture refusal. Touches the payment state only; booking status and
/// financial status are left alone so a later retry can still confirm.
pub fn capture_refused(booking: &Booking, facts: &PaymentFacts) -> StateChanges {
    let mut changes = StateChanges::default();
    changes.booking = Some(BookingUpdate {
        booking_id: booking.id,
        expected: None,
        status: None,
        payment_state: Some(PaymentState::Rejected),
        financial_status: None,
        amount_paid: None,
        net_amount: None,
        external_payment_id: Some(facts.external_payment_id.clone()),
        note: None,
    });
    changes.audits.push(
        NewAuditEntry::new(
            "booking",
            booking.id,
            "capture_refused",
            json!({
                "external_payment_id": facts.external_payment_id,
                "billing_type": facts.billing_type,
            }),
        )
        .with_event(&facts.event_id),
    );
    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_booking() -> Booking {
        Booking {
            id: Uuid::now_v7(),
            user_id: Uuid::now_v7(),
            room_id: Uuid::now_v7(),
            product_id: Uuid::now_v7(),
            status: BookingStatus::Pending,
            payment_state: PaymentState::Pending,
            financial_status: FinancialStatus::Unpaid,
            amount_paid: MinorUnits::ZERO,
            net_amount: None,
            credits_used: MinorUnits::ZERO,
            credit_ids: vec![],
            external_payment_id: None,
            email_sent_at: None,
            product: ProductInfo {
                kind: ProductKind::SingleSlot,
                billing: ProductBilling::Hourly,
                price: MinorUnits::new(5000).unwrap(),
            },
            room_hourly_rate: Some(MinorUnits::new(2500).unwrap()),
        }
    }

    fn facts(paid: Option<i64>) -> PaymentFacts {
        PaymentFacts {
            event_id: "evt_1".to_owned(),
            event_type: "PAYMENT_CONFIRMED".to_owned(),
            external_payment_id: "pay_123".to_owned(),
            paid_value: paid.map(|v| MinorUnits::new(v).unwrap()),
            net_value: None,
            billing_type: Some("PIX".to_owned()),
            contact: Some(CustomerContact {
                name: Some("Ana".to_owned()),
                email: Some("ana@example.com".to_owned()),
            }),
        }
    }

    #[test]
    fn confirmed_and_paid_short_circuits_before_any_guard() {
        let mut booking = base_booking();
        booking.status = BookingStatus::Confirmed;
        booking.financial_status = FinancialStatus::Paid;
        let out = confirm(&booking, &facts(Some(5000)), Utc::now()).unwrap();
        assert!(matches!(out, ConfirmOutcome::AlreadyProcessed));
    }

    #[test]
    fn courtesy_blocks_even_when_cancelled() {
        let mut booking = base_booking();
        booking.status = BookingStatus::Cancelled;
        booking.financial_status = FinancialStatus::Courtesy;
        let out = confirm(&booking, &facts(Some(5000)), Utc::now()).unwrap();
        match out {
            ConfirmOutcome::Blocked { reason, audit } => {
                assert_eq!(reason, BlockReason::Courtesy);
                assert!(audit.alert);
            }
            other => panic!("expected block, got {other:?}"),
        }
    }

    #[test]
    fn cancelled_booking_blocks_with_alert_audit() {
        let mut booking = base_booking();
        booking.status = BookingStatus::Cancelled;
        let out = confirm(&booking, &facts(Some(5000)), Utc::now()).unwrap();
        match out {
            ConfirmOutcome::Blocked { reason, audit } => {
                assert_eq!(reason, BlockReason::Cancelled);
                assert!(audit.alert);
                assert_eq!(audit.action, "confirmation_blocked");
            }
            other => panic!("expected block, got {other:?}"),
        }
    }

    #[test]
    fn refunded_booking_blocks_confirmation() {
        let mut booking = base_booking();
        booking.financial_status = FinancialStatus::Refunded;
        let out = confirm(&booking, &facts(Some(5000)), Utc::now()).unwrap();
        assert!(matches!(
            out,
            ConfirmOutcome::Blocked {
                reason: BlockReason::Refunded,
                ..
            }
        ));
    }

    #[test]
    fn single_slot_confirmation_updates_booking_without_minting() {
        let booking = base_booking();
        let out = confirm(&booking, &facts(Some(4800)), Utc::now()).unwrap();
        let plan = match out {
            ConfirmOutcome::Proceed(plan) => plan,
            other => panic!("expected proceed, got {other:?}"),
        };
        assert!(!plan.minted_credit);
        assert!(plan.changes.mint_credit.is_none());

        let update = plan.changes.booking.as_ref().unwrap();
        assert_eq!(update.status, Some(BookingStatus::Confirmed));
        assert_eq!(update.payment_state, Some(PaymentState::Approved));
        assert_eq!(update.financial_status, Some(FinancialStatus::Paid));
        assert_eq!(update.amount_paid, Some(MinorUnits::new(4800).unwrap()));
        assert_eq!(update.external_payment_id.as_deref(), Some("pay_123"));
        assert_eq!(
            update.expected,
            Some((BookingStatus::Pending, FinancialStatus::Unpaid))
        );

        let payment = plan.changes.payment.as_ref().unwrap();
        assert_eq!(payment.external_id, "pay_123");
        assert_eq!(payment.amount.cents(), 4800);
    }

    #[test]
    fn missing_paid_value_falls_back_to_list_price() {
        let booking = base_booking();
        let out = confirm(&booking, &facts(None), Utc::now()).unwrap();
        let ConfirmOutcome::Proceed(plan) = out else {
            panic!("expected proceed");
        };
        let update = plan.changes.booking.unwrap();
        assert_eq!(update.amount_paid, Some(MinorUnits::new(5000).unwrap()));
    }

    #[test]
    fn settled_net_is_recorded_when_the_event_carries_it() {
        let booking = base_booking();
        let mut f = facts(Some(5000));
        f.net_value = Some(MinorUnits::new(4810).unwrap());
        let out = confirm(&booking, &f, Utc::now()).unwrap();
        let ConfirmOutcome::Proceed(plan) = out else {
            panic!("expected proceed");
        };
        let update = plan.changes.booking.unwrap();
        assert_eq!(update.net_amount, Some(MinorUnits::new(4810).unwrap()));
    }

    #[test]
    fn package_confirmation_also_mints_a_credit() {
        let mut booking = base_booking();
        booking.product.kind = ProductKind::HourPackage {
            hours: 10,
            validity_days: None,
        };
        let out = confirm(&booking, &facts(Some(25000)), Utc::now()).unwrap();
        let ConfirmOutcome::Proceed(plan) = out else {
            panic!("expected proceed");
        };
        assert!(plan.minted_credit);
        let credit = plan.changes.mint_credit.unwrap();
        // 10 hours at the 2500 room rate.
        assert_eq!(credit.amount.cents(), 25000);
    }

    #[test]
    fn confirmation_schedules_notification_tracking_and_activation() {
        let booking = base_booking();
        let out = confirm(&booking, &facts(Some(5000)), Utc::now()).unwrap();
        let ConfirmOutcome::Proceed(plan) = out else {
            panic!("expected proceed");
        };
        assert_eq!(plan.effects.len(), 3);
        assert!(matches!(
            plan.effects[0],
            SideEffect::NotifyBookingConfirmed { .. }
        ));
        assert!(matches!(plan.effects[1], SideEffect::TrackConversion(_)));
        assert!(matches!(plan.effects[2], SideEffect::ActivateAccount(_)));
    }

    #[test]
    fn confirmation_without_contact_skips_activation() {
        let booking = base_booking();
        let mut f = facts(Some(5000));
        f.contact = None;
        let out = confirm(&booking, &f, Utc::now()).unwrap();
        let ConfirmOutcome::Proceed(plan) = out else {
            panic!("expected proceed");
        };
        assert_eq!(plan.effects.len(), 2);
        assert!(
            !plan
                .effects
                .iter()
                .any(|e| matches!(e, SideEffect::ActivateAccount(_)))
        );
    }

    #[test]
    fn late_confirmation_never_regresses_a_completed_booking() {
        let mut booking = base_booking();
        booking.status = BookingStatus::Completed;
        let out = confirm(&booking, &facts(Some(5000)), Utc::now()).unwrap();
        let ConfirmOutcome::Proceed(plan) = out else {
            panic!("expected proceed");
        };
        let update = plan.changes.booking.unwrap();
        assert_eq!(update.status, None);
        assert_eq!(update.financial_status, Some(FinancialStatus::Paid));
    }

    #[test]
    fn capture_refusal_touches_only_the_payment_state() {
        let booking = base_booking();
        let changes = capture_refused(&booking, &facts(None));
        let update = changes.booking.unwrap();
        assert_eq!(update.payment_state, Some(PaymentState::Rejected));
        assert_eq!(update.status, None);
        assert_eq!(update.financial_status, None);
        assert_eq!(update.amount_paid, None);
        assert!(update.expected.is_none());
    }
}
