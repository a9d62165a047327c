#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reserva::domain::audit::NewAuditEntry;
use reserva::domain::booking::{
    Booking, BookingStatus, FinancialStatus, PaymentState, ProductBilling, ProductInfo,
    ProductKind,
};
use reserva::domain::credit::{Credit, CreditStatus, CreditUsageType};
use reserva::domain::error::{SideEffectError, StoreError};
use reserva::domain::ledger::{EventId, LedgerDecision, LedgerStatus, NewLedgerEvent};
use reserva::domain::money::MinorUnits;
use reserva::domain::ports::{
    AccountActivator, ActivationRequest, ConversionEvent, ConversionTracker, Notifier,
};
use reserva::domain::refund::{Refund, RefundStatus};
use reserva::domain::store::{
    ApplyOutcome, NewPaymentRecord, ReconciliationStore, RefundWrite, StateChanges,
};
use reserva::services::dispatcher::{Dispatch, Dispatcher};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

// ── In-memory store ────────────────────────────────────────────────────────
//
// Mirrors the Postgres store's guard semantics: apply() stages everything on
// a copy and commits only if every guarded write matched, so a Conflict
// leaves state untouched exactly like a rolled-back transaction.

#[derive(Clone)]
struct LedgerEntry {
    event_type: String,
    status: LedgerStatus,
    attempts: u32,
    external_payment_id: Option<String>,
    resource_reference: Option<String>,
    processed_at: Option<DateTime<Utc>>,
}

#[derive(Default, Clone)]
struct Inner {
    ledger: HashMap<String, LedgerEntry>,
    bookings: HashMap<Uuid, Booking>,
    booking_notes: HashMap<Uuid, Vec<String>>,
    credits: HashMap<Uuid, Credit>,
    refunds: HashMap<Uuid, Refund>,
    payments: HashMap<String, NewPaymentRecord>,
    audits: Vec<NewAuditEntry>,
    audit_keys: HashSet<(String, String)>,
    coupons: HashMap<String, i64>,
    conversion_claims: HashSet<(String, String, String)>,
    fail_applies: u32,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn insert_booking(&self, booking: Booking) {
        self.inner.lock().unwrap().bookings.insert(booking.id, booking);
    }

    pub fn insert_credit(&self, credit: Credit) {
        self.inner.lock().unwrap().credits.insert(credit.id, credit);
    }

    pub fn insert_refund(&self, refund: Refund) {
        self.inner
            .lock()
            .unwrap()
            .refunds
            .insert(refund.booking_id, refund);
    }

    pub fn insert_coupon(&self, code: &str, redemptions: i64) {
        self.inner
            .lock()
            .unwrap()
            .coupons
            .insert(code.to_owned(), redemptions);
    }

    pub fn seed_payment(&self, external_id: &str, booking_id: Uuid, amount: i64) {
        self.inner.lock().unwrap().payments.insert(
            external_id.to_owned(),
            NewPaymentRecord {
                id: Uuid::now_v7(),
                external_id: external_id.to_owned(),
                booking_id: Some(booking_id),
                credit_id: None,
                amount: cents(amount),
                event_type: "PAYMENT_CONFIRMED".to_owned(),
            },
        );
    }

    /// Makes the next `apply` fail, for exercising the failed-ledger path.
    pub fn fail_next_apply(&self) {
        self.inner.lock().unwrap().fail_applies += 1;
    }

    pub fn get_booking(&self, id: Uuid) -> Booking {
        self.inner.lock().unwrap().bookings[&id].clone()
    }

    pub fn get_credit(&self, id: Uuid) -> Credit {
        self.inner.lock().unwrap().credits[&id].clone()
    }

    pub fn get_refund(&self, booking_id: Uuid) -> Option<Refund> {
        self.inner.lock().unwrap().refunds.get(&booking_id).cloned()
    }

    pub fn booking_notes(&self, id: Uuid) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .booking_notes
            .get(&id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn audit_entries(&self) -> Vec<NewAuditEntry> {
        self.inner.lock().unwrap().audits.clone()
    }

    pub fn audit_actions(&self, entity_id: Uuid) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .audits
            .iter()
            .filter(|a| a.entity_id == entity_id)
            .map(|a| a.action.clone())
            .collect()
    }

    pub fn ledger_status(&self, event_id: &str) -> Option<LedgerStatus> {
        self.inner
            .lock()
            .unwrap()
            .ledger
            .get(event_id)
            .map(|e| e.status)
    }

    pub fn ledger_attempts(&self, event_id: &str) -> u32 {
        self.inner
            .lock()
            .unwrap()
            .ledger
            .get(event_id)
            .map(|e| e.attempts)
            .unwrap_or(0)
    }

    pub fn coupon_redemptions(&self, code: &str) -> i64 {
        self.inner.lock().unwrap().coupons[code]
    }

    pub fn payment_count(&self) -> usize {
        self.inner.lock().unwrap().payments.len()
    }
}

#[async_trait]
impl ReconciliationStore for MemoryStore {
    async fn record_event(&self, event: &NewLedgerEvent) -> Result<LedgerDecision, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let key = event.event_id.as_str().to_owned();
        if !inner.ledger.contains_key(&key) {
            inner.ledger.insert(
                key,
                LedgerEntry {
                    event_type: event.event_type.clone(),
                    status: LedgerStatus::Processing,
                    attempts: 1,
                    external_payment_id: event.external_payment_id.clone(),
                    resource_reference: event.resource_reference.clone(),
                    processed_at: None,
                },
            );
            return Ok(LedgerDecision::New);
        }
        let entry = inner.ledger.get_mut(&key).unwrap();
        if entry.status.is_terminal() {
            return Ok(LedgerDecision::Duplicate(entry.status));
        }
        let prior = entry.status;
        entry.status = LedgerStatus::Processing;
        entry.attempts += 1;
        Ok(LedgerDecision::Reprocess(prior))
    }

    async fn finalize_event(
        &self,
        event_id: &EventId,
        status: LedgerStatus,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.ledger.get_mut(event_id.as_str()) {
            entry.status = status;
            if status.is_terminal() {
                entry.processed_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        Ok(self.inner.lock().unwrap().bookings.get(&id).cloned())
    }

    async fn credit(&self, id: Uuid) -> Result<Option<Credit>, StoreError> {
        Ok(self.inner.lock().unwrap().credits.get(&id).cloned())
    }

    async fn credits(&self, ids: &[Uuid]) -> Result<Vec<Credit>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| inner.credits.get(id).cloned())
            .collect())
    }

    async fn refund_for_booking(&self, booking_id: Uuid) -> Result<Option<Refund>, StoreError> {
        Ok(self.inner.lock().unwrap().refunds.get(&booking_id).cloned())
    }

    async fn payment_amount(&self, external_id: &str) -> Result<Option<MinorUnits>, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .payments
            .get(external_id)
            .map(|p| p.amount))
    }

    async fn apply(&self, changes: StateChanges) -> Result<ApplyOutcome, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_applies > 0 {
            inner.fail_applies -= 1;
            return Err(StoreError::CorruptRow("injected store failure".to_owned()));
        }
        let mut staged = inner.clone();

        if let Some(update) = &changes.booking {
            let Some(booking) = staged.bookings.get_mut(&update.booking_id) else {
                return Ok(ApplyOutcome::Conflict);
            };
            if let Some((status, financial)) = update.expected {
                if booking.status != status || booking.financial_status != financial {
                    return Ok(ApplyOutcome::Conflict);
                }
            }
            if let Some(s) = update.status {
                booking.status = s;
            }
            if let Some(s) = update.payment_state {
                booking.payment_state = s;
            }
            if let Some(s) = update.financial_status {
                booking.financial_status = s;
            }
            if let Some(v) = update.amount_paid {
                booking.amount_paid = v;
            }
            if let Some(v) = update.net_amount {
                booking.net_amount = Some(v);
            }
            if let Some(id) = &update.external_payment_id {
                booking.external_payment_id = Some(id.clone());
            }
            if let Some(note) = &update.note {
                staged
                    .booking_notes
                    .entry(update.booking_id)
                    .or_default()
                    .push(note.clone());
            }
        }

        if let Some(mint) = &changes.mint_credit {
            staged.credits.insert(
                mint.id,
                Credit {
                    id: mint.id,
                    user_id: mint.user_id,
                    status: CreditStatus::Confirmed,
                    usage_type: mint.usage_type,
                    amount: mint.amount,
                    remaining_amount: mint.amount,
                    coupon_code: None,
                    expires_at: Some(mint.expires_at),
                    external_payment_id: mint.external_payment_id.clone(),
                },
            );
        }

        for update in &changes.credit_updates {
            let Some(credit) = staged.credits.get_mut(&update.credit_id) else {
                return Ok(ApplyOutcome::Conflict);
            };
            if let Some(expected) = update.expected_status {
                if credit.status != expected {
                    return Ok(ApplyOutcome::Conflict);
                }
            }
            credit.status = update.status;
            credit.remaining_amount = update.remaining_amount;
            if let Some(id) = &update.external_payment_id {
                credit.external_payment_id = Some(id.clone());
            }
        }

        match &changes.refund {
            Some(RefundWrite::Insert(new)) => {
                if staged.refunds.contains_key(&new.booking_id) {
                    return Ok(ApplyOutcome::Conflict);
                }
                staged.refunds.insert(
                    new.booking_id,
                    Refund {
                        id: new.id,
                        booking_id: new.booking_id,
                        expected_amount: new.expected_amount,
                        refunded_amount: new.refunded_amount,
                        is_partial: new.is_partial,
                        amount_unknown: new.amount_unknown,
                        credits_returned: new.credits_returned,
                        money_returned: new.money_returned,
                        status: new.status,
                        gateway: new.gateway.clone(),
                        external_refund_id: new.external_refund_id.clone(),
                        processed_at: new.processed_at,
                    },
                );
            }
            Some(RefundWrite::Complete {
                refund_id,
                external_refund_id,
                processed_at,
            }) => {
                let Some(refund) = staged.refunds.values_mut().find(|r| r.id == *refund_id)
                else {
                    return Ok(ApplyOutcome::Conflict);
                };
                if refund.status != RefundStatus::Pending {
                    return Ok(ApplyOutcome::Conflict);
                }
                refund.status = RefundStatus::Completed;
                if let Some(id) = external_refund_id {
                    refund.external_refund_id = Some(id.clone());
                }
                refund.processed_at = Some(*processed_at);
            }
            None => {}
        }

        if let Some(payment) = &changes.payment {
            staged
                .payments
                .entry(payment.external_id.clone())
                .or_insert_with(|| payment.clone());
        }

        if let Some(code) = &changes.release_coupon {
            if let Some(count) = staged.coupons.get_mut(code) {
                *count = (*count - 1).max(0);
            }
        }

        for entry in &changes.audits {
            if let Some(event_id) = &entry.event_id {
                let key = (event_id.clone(), entry.action.clone());
                if !staged.audit_keys.insert(key) {
                    continue;
                }
            }
            staged.audits.push(entry.clone());
        }

        *inner = staged;
        Ok(ApplyOutcome::Applied)
    }

    async fn claim_booking_notification(&self, booking_id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(booking) = inner.bookings.get_mut(&booking_id) else {
            return Ok(false);
        };
        if booking.email_sent_at.is_some() {
            return Ok(false);
        }
        booking.email_sent_at = Some(Utc::now());
        Ok(true)
    }

    async fn claim_conversion(
        &self,
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<bool, StoreError> {
        Ok(self.inner.lock().unwrap().conversion_claims.insert((
            event_type.to_owned(),
            entity_type.to_owned(),
            entity_id.to_owned(),
        )))
    }
}

// ── Recording collaborators ────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingNotifier {
    pub notified: Mutex<Vec<Uuid>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn booking_confirmed(&self, booking_id: Uuid) -> Result<(), SideEffectError> {
        self.notified.lock().unwrap().push(booking_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingTracker {
    pub tracked: Mutex<Vec<ConversionEvent>>,
}

#[async_trait]
impl ConversionTracker for RecordingTracker {
    async fn track(&self, event: &ConversionEvent) -> Result<(), SideEffectError> {
        self.tracked.lock().unwrap().push(event.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingActivator {
    pub activated: Mutex<Vec<ActivationRequest>>,
}

#[async_trait]
impl AccountActivator for RecordingActivator {
    async fn activate(&self, request: &ActivationRequest) -> Result<(), SideEffectError> {
        self.activated.lock().unwrap().push(request.clone());
        Ok(())
    }
}

// ── Harness ────────────────────────────────────────────────────────────────

pub struct Harness {
    pub store: MemoryStore,
    pub dispatcher: Dispatcher,
    pub notifier: Arc<RecordingNotifier>,
    pub tracker: Arc<RecordingTracker>,
    pub activator: Arc<RecordingActivator>,
}

pub fn harness() -> Harness {
    let store = MemoryStore::default();
    let notifier = Arc::new(RecordingNotifier::default());
    let tracker = Arc::new(RecordingTracker::default());
    let activator = Arc::new(RecordingActivator::default());
    let dispatcher = Dispatcher::new(
        Arc::new(store.clone()),
        notifier.clone(),
        tracker.clone(),
        activator.clone(),
    );
    Harness {
        store,
        dispatcher,
        notifier,
        tracker,
        activator,
    }
}

/// Parses a body, runs the full pipeline, and awaits the scheduled effects
/// inline so assertions see their results.
pub async fn deliver(h: &Harness, body: &str) -> Dispatch {
    let event = reserva::gateway::parse_event(body).expect("fixture body must parse");
    let (dispatch, effects) = h.dispatcher.process(&event).await.expect("dispatch failed");
    effects.run().await;
    dispatch
}

// ── Fixtures ───────────────────────────────────────────────────────────────

pub fn cents(v: i64) -> MinorUnits {
    MinorUnits::new(v).unwrap()
}

/// Pending, unpaid single-slot booking at the given list price.
pub fn make_booking(price: i64) -> Booking {
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
            price: cents(price),
        },
        room_hourly_rate: Some(cents(2500)),
    }
}

/// Pending hour-package booking, room rate per hour.
pub fn make_package_booking(hours: u32, rate: i64) -> Booking {
    let mut booking = make_booking(rate * i64::from(hours));
    booking.product.kind = ProductKind::HourPackage {
        hours,
        validity_days: None,
    };
    booking.room_hourly_rate = Some(cents(rate));
    booking
}

pub fn make_credit(amount: i64, remaining: i64, status: CreditStatus) -> Credit {
    Credit {
        id: Uuid::now_v7(),
        user_id: Uuid::now_v7(),
        status,
        usage_type: CreditUsageType::Hourly,
        amount: cents(amount),
        remaining_amount: cents(remaining),
        coupon_code: None,
        expires_at: None,
        external_payment_id: None,
    }
}

// ── Event bodies ───────────────────────────────────────────────────────────

pub fn payment_event(
    event_id: &str,
    event_type: &str,
    payment_id: &str,
    reference: &str,
    value: f64,
) -> String {
    serde_json::json!({
        "id": event_id,
        "event": event_type,
        "payment": {
            "id": payment_id,
            "externalReference": reference,
            "value": value,
            "billingType": "PIX",
            "customer": {"name": "Ana Souza", "email": "ana@example.com"}
        }
    })
    .to_string()
}

/// Refund event; `refunded` of None leaves the amount fields out entirely.
pub fn refund_event(
    event_id: &str,
    payment_id: &str,
    reference: &str,
    refunded: Option<f64>,
) -> String {
    let mut payment = serde_json::json!({
        "id": payment_id,
        "externalReference": reference,
    });
    if let Some(v) = refunded {
        payment["refundedValue"] = serde_json::json!(v);
    }
    serde_json::json!({
        "id": event_id,
        "event": "PAYMENT_REFUNDED",
        "payment": payment,
    })
    .to_string()
}

pub fn checkout_event(event_id: &str, checkout_id: &str, reference: &str, value: f64) -> String {
    serde_json::json!({
        "id": event_id,
        "event": "CHECKOUT_PAID",
        "checkout": {
            "id": checkout_id,
            "externalReference": reference,
            "value": value,
            "status": "PAID",
            "customer": {"name": "Bruno Lima", "email": "bruno@example.com"}
        }
    })
    .to_string()
}
