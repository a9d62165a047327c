use {
    super::audit::NewAuditEntry,
    super::booking::{Booking, BookingStatus, FinancialStatus, PaymentState},
    super::credit::{Credit, CreditStatus, NewCredit},
    super::error::StoreError,
    super::ledger::{EventId, LedgerDecision, LedgerStatus, NewLedgerEvent},
    super::money::MinorUnits,
    super::refund::{NewRefund, Refund},
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    uuid::Uuid,
};

/// Field-level booking update. When `expected` is set, the write only lands
/// if the row still carries that status pair; a miss means a concurrent
/// writer got there first.
#[derive(Debug, Clone)]
pub struct BookingUpdate {
    pub booking_id: Uuid,
    pub expected: Option<(BookingStatus, FinancialStatus)>,
    pub status: Option<BookingStatus>,
    pub payment_state: Option<PaymentState>,
    pub financial_status: Option<FinancialStatus>,
    pub amount_paid: Option<MinorUnits>,
    pub net_amount: Option<MinorUnits>,
    pub external_payment_id: Option<String>,
    /// Appended to the booking's notes.
    pub note: Option<String>,
}

/// Credit update with the new absolute remaining balance, guarded by the
/// status the credit had when the plan was computed.
#[derive(Debug, Clone)]
pub struct CreditUpdate {
    pub credit_id: Uuid,
    pub expected_status: Option<CreditStatus>,
    pub status: CreditStatus,
    pub remaining_amount: MinorUnits,
    pub external_payment_id: Option<String>,
}

/// Refund row write. Insert races on the per-booking uniqueness; Complete
/// races on the row still being `Pending`.
#[derive(Debug, Clone)]
pub enum RefundWrite {
    Insert(NewRefund),
    Complete {
        refund_id: Uuid,
        external_refund_id: Option<String>,
        processed_at: DateTime<Utc>,
    },
}

/// Payment observed on a confirmation, kept so a later refund with no
/// amount can recover what was charged.
#[derive(Debug, Clone)]
pub struct NewPaymentRecord {
    pub id: Uuid,
    pub external_id: String,
    pub booking_id: Option<Uuid>,
    pub credit_id: Option<Uuid>,
    pub amount: MinorUnits,
    pub event_type: String,
}

/// Everything a transition wants persisted, applied in a single
/// transaction.
#[derive(Debug, Default)]
pub struct StateChanges {
    pub booking: Option<BookingUpdate>,
    pub mint_credit: Option<NewCredit>,
    pub credit_updates: Vec<CreditUpdate>,
    pub refund: Option<RefundWrite>,
    pub payment: Option<NewPaymentRecord>,
    /// Coupon code whose redemption count is handed back.
    pub release_coupon: Option<String>,
    pub audits: Vec<NewAuditEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// A guarded write matched zero rows; the whole transaction rolled back.
    Conflict,
}

/// Persistence seam for the reconciliation pipeline.
#[async_trait]
pub trait ReconciliationStore: Send + Sync {
    /// Records a delivery in the ledger before anything else runs.
    async fn record_event(&self, event: &NewLedgerEvent) -> Result<LedgerDecision, StoreError>;

    /// Stamps the final ledger status once the pipeline decides.
    async fn finalize_event(
        &self,
        event_id: &EventId,
        status: LedgerStatus,
    ) -> Result<(), StoreError>;

    async fn booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError>;

    async fn credit(&self, id: Uuid) -> Result<Option<Credit>, StoreError>;

    /// Loads credits preserving the order of `ids`.
    async fn credits(&self, ids: &[Uuid]) -> Result<Vec<Credit>, StoreError>;

    async fn refund_for_booking(&self, booking_id: Uuid) -> Result<Option<Refund>, StoreError>;

    /// Amount recorded for a gateway payment id, if we saw it get paid.
    async fn payment_amount(&self, external_id: &str) -> Result<Option<MinorUnits>, StoreError>;

    /// Applies a change set atomically, rolling back on any guard miss.
    async fn apply(&self, changes: StateChanges) -> Result<ApplyOutcome, StoreError>;

    /// Claims the one-shot confirmation notification for a booking.
    /// Returns false when it was already claimed.
    async fn claim_booking_notification(&self, booking_id: Uuid) -> Result<bool, StoreError>;

    /// Claims a conversion report for its dedup key. Returns false when the
    /// conversion was already reported.
    async fn claim_conversion(
        &self,
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<bool, StoreError>;
}
