use {
    super::audit::NewAuditEntry,
    super::booking::{Booking, FinancialStatus, PaymentState},
    super::credit::{Credit, CreditStatus},
    super::error::WebhookError,
    super::money::MinorUnits,
    super::store::{BookingUpdate, CreditUpdate, RefundWrite, StateChanges},
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    serde_json::json,
    std::fmt,
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    /// Awaiting manual review (partial or unknown amount).
    Pending,
    Completed,
}

impl RefundStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for RefundStatus {
    type Error = WebhookError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            other => Err(WebhookError::Validation(format!(
                "unknown refund status: {other}"
            ))),
        }
    }
}

/// A persisted refund record. At most one exists per booking.
#[derive(Debug, Clone)]
pub struct Refund {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub expected_amount: MinorUnits,
    pub refunded_amount: MinorUnits,
    pub is_partial: bool,
    pub amount_unknown: bool,
    pub credits_returned: MinorUnits,
    pub money_returned: MinorUnits,
    pub status: RefundStatus,
    pub gateway: String,
    pub external_refund_id: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Refund record to insert.
#[derive(Debug, Clone)]
pub struct NewRefund {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub expected_amount: MinorUnits,
    pub refunded_amount: MinorUnits,
    pub is_partial: bool,
    pub amount_unknown: bool,
    pub credits_returned: MinorUnits,
    pub money_returned: MinorUnits,
    pub status: RefundStatus,
    pub gateway: String,
    pub external_refund_id: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Refund-relevant values carried by the event, already in minor units.
#[derive(Debug, Clone)]
pub struct RefundFacts {
    pub event_id: String,
    pub event_type: String,
    pub external_payment_id: String,
    pub refunded_value: Option<MinorUnits>,
    pub chargeback_value: Option<MinorUnits>,
    pub payment_value: Option<MinorUnits>,
}

impl RefundFacts {
    /// First known amount in the payload's order of authority.
    pub fn payload_amount(&self) -> Option<MinorUnits> {
        self.refunded_value
            .or(self.chargeback_value)
            .or(self.payment_value)
    }
}

/// Rounding slack allowed before a refund counts as partial: one percent of
/// the expected amount, floored at 100 minor units.
pub fn tolerance(expected: MinorUnits) -> MinorUnits {
    MinorUnits::new((expected.cents() / 100).max(100)).unwrap_or(MinorUnits::ZERO)
}

/// How a refund amount reconciles against what we expected back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    pub expected: MinorUnits,
    pub refunded: MinorUnits,
    pub amount_unknown: bool,
    pub is_partial: bool,
    pub credits_returned: MinorUnits,
    pub money_returned: MinorUnits,
}

/// Classifies a refund and splits it between credit restoration and money
/// returned to the customer. Credits are made whole first.
pub fn reconcile(
    expected: MinorUnits,
    refunded: Option<MinorUnits>,
    credits_used: MinorUnits,
) -> Reconciliation {
    let (refunded, amount_unknown) = match refunded {
        Some(v) => (v, false),
        None => (MinorUnits::ZERO, true),
    };
    let is_partial = amount_unknown || refunded < expected.saturating_sub(tolerance(expected));
    let credits_returned = credits_used.min(refunded);
    let money_returned = refunded.saturating_sub(credits_returned);
    Reconciliation {
        expected,
        refunded,
        amount_unknown,
        is_partial,
        credits_returned,
        money_returned,
    }
}

/// Amount the gateway should hand back for a booking: the settled net when
/// recorded, otherwise everything the customer put in.
pub fn expected_amount(booking: &Booking) -> MinorUnits {
    booking
        .net_amount
        .unwrap_or_else(|| booking.amount_paid.saturating_add(booking.credits_used))
}

/// Splits `total` across the credits that funded a booking, in application
/// order. The split is even, remainder going to the earliest credits one
/// unit at a time; no credit receives more than it contributed, and capped
/// overflow flows to the earliest credit with capacity left.
pub fn restoration_split(
    credits: &[Credit],
    total: MinorUnits,
) -> Result<Vec<MinorUnits>, WebhookError> {
    let n = credits.len();
    if n == 0 || total.is_zero() {
        return Ok(vec![MinorUnits::ZERO; n]);
    }

    let caps: Vec<i64> = credits
        .iter()
        .map(|c| c.amount.saturating_sub(c.remaining_amount).cents())
        .collect();

    let total = total.cents();
    let base = total / n as i64;
    let mut remainder = total % n as i64;
    let mut alloc = vec![base; n];
    for slot in alloc.iter_mut() {
        if remainder == 0 {
            break;
        }
        *slot += 1;
        remainder -= 1;
    }

    let mut overflow = 0i64;
    for (slot, cap) in alloc.iter_mut().zip(&caps) {
        if *slot > *cap {
            overflow += *slot - *cap;
            *slot = *cap;
        }
    }
    for (slot, cap) in alloc.iter_mut().zip(&caps) {
        if overflow == 0 {
            break;
        }
        let take = (*cap - *slot).min(overflow);
        *slot += take;
        overflow -= take;
    }

    alloc.into_iter().map(MinorUnits::new).collect()
}

#[derive(Debug)]
pub struct RefundPlan {
    pub changes: StateChanges,
    /// The refund row stayed `Pending` for manual review.
    pub pending_review: bool,
    /// This event completed an earlier `Pending` row instead of creating one.
    pub completes_existing: bool,
}

#[derive(Debug)]
pub enum RefundOutcome {
    /// A completed refund already exists for this booking.
    AlreadyRefunded,
    Proceed(RefundPlan),
}

/// Booking refund reconciliation. Exactly one refund row ever exists per
/// booking; a redelivery against a `Pending` row completes it without
/// touching credits again.
pub fn reconcile_booking_refund(
    booking: &Booking,
    credits: &[Credit],
    existing: Option<&Refund>,
    facts: &RefundFacts,
    stored_payment_amount: Option<MinorUnits>,
    gateway: &str,
    now: DateTime<Utc>,
) -> Result<RefundOutcome, WebhookError> {
    if let Some(refund) = existing {
        if refund.status == RefundStatus::Completed {
            return Ok(RefundOutcome::AlreadyRefunded);
        }
        let mut changes = StateChanges::default();
        changes.refund = Some(RefundWrite::Complete {
            refund_id: refund.id,
            external_refund_id: Some(facts.external_payment_id.clone()),
            processed_at: now,
        });
        changes.audits.push(
            NewAuditEntry::new(
                "refund",
                refund.id,
                "refund_completed",
                json!({
                    "booking_id": booking.id,
                    "external_payment_id": facts.external_payment_id,
                }),
            )
            .with_event(&facts.event_id),
        );
        return Ok(RefundOutcome::Proceed(RefundPlan {
            changes,
            pending_review: false,
            completes_existing: true,
        }));
    }

    let expected = expected_amount(booking);
    let refunded = facts.payload_amount().or(stored_payment_amount);
    let rec = reconcile(expected, refunded, booking.credits_used);

    let mut changes = StateChanges::default();

    let splits = restoration_split(credits, rec.credits_returned)?;
    for (credit, give) in credits.iter().zip(splits) {
        if give.is_zero() {
            continue;
        }
        changes.credit_updates.push(CreditUpdate {
            credit_id: credit.id,
            expected_status: Some(credit.status),
            status: CreditStatus::Confirmed,
            remaining_amount: credit.amount.min(credit.remaining_amount.saturating_add(give)),
            external_payment_id: None,
        });
    }

    let financial = if rec.is_partial {
        FinancialStatus::PartialRefund
    } else {
        FinancialStatus::Refunded
    };
    changes.booking = Some(BookingUpdate {
        booking_id: booking.id,
        expected: Some((booking.status, booking.financial_status)),
        status: None,
        payment_state: Some(PaymentState::Refunded),
        financial_status: Some(financial),
        amount_paid: None,
        net_amount: None,
        external_payment_id: None,
        note: Some(format!(
            "refund via {gateway}: expected {} refunded {}{}",
            rec.expected,
            rec.refunded,
            if rec.amount_unknown {
                " (amount unknown)"
            } else {
                ""
            },
        )),
    });

    let refund_id = Uuid::now_v7();
    let status = if rec.is_partial {
        RefundStatus::Pending
    } else {
        RefundStatus::Completed
    };
    changes.refund = Some(RefundWrite::Insert(NewRefund {
        id: refund_id,
        booking_id: booking.id,
        expected_amount: rec.expected,
        refunded_amount: rec.refunded,
        is_partial: rec.is_partial,
        amount_unknown: rec.amount_unknown,
        credits_returned: rec.credits_returned,
        money_returned: rec.money_returned,
        status,
        gateway: gateway.to_owned(),
        external_refund_id: Some(facts.external_payment_id.clone()),
        processed_at: (status == RefundStatus::Completed).then_some(now),
    }));

    changes.audits.push(
        NewAuditEntry::new(
            "refund",
            refund_id,
            "refund_processed",
            json!({
                "booking_id": booking.id,
                "original_status": booking.status.as_str(),
                "original_financial_status": booking.financial_status.as_str(),
                "expected_amount": rec.expected.cents(),
                "refunded_amount": rec.refunded.cents(),
                "amount_unknown": rec.amount_unknown,
                "is_partial": rec.is_partial,
                "credits_returned": rec.credits_returned.cents(),
                "money_returned": rec.money_returned.cents(),
            }),
        )
        .with_event(&facts.event_id),
    );

    Ok(RefundOutcome::Proceed(RefundPlan {
        changes,
        pending_review: rec.is_partial,
        completes_existing: false,
    }))
}
