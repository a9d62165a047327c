pub mod audit_repo;
pub mod booking_repo;
pub mod claims_repo;
pub mod credit_repo;
pub mod ledger_repo;
pub mod payment_repo;
pub mod refund_repo;

use {
    crate::domain::booking::Booking,
    crate::domain::credit::Credit,
    crate::domain::error::StoreError,
    crate::domain::ledger::{EventId, LedgerDecision, LedgerStatus, NewLedgerEvent},
    crate::domain::money::MinorUnits,
    crate::domain::refund::Refund,
    crate::domain::store::{ApplyOutcome, ReconciliationStore, RefundWrite, StateChanges},
    async_trait::async_trait,
    sqlx::PgPool,
    uuid::Uuid,
};

pub(crate) fn corrupt(err: impl std::fmt::Display) -> StoreError {
    StoreError::CorruptRow(err.to_string())
}

/// Postgres-backed store. Reads go straight to the pool; `apply` wraps the
/// whole change set in one transaction and rolls back on any guard miss.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ReconciliationStore for PgStore {
    async fn record_event(&self, event: &NewLedgerEvent) -> Result<LedgerDecision, StoreError> {
        ledger_repo::record_event(&self.pool, event).await
    }

    async fn finalize_event(
        &self,
        event_id: &EventId,
        status: LedgerStatus,
    ) -> Result<(), StoreError> {
        ledger_repo::finalize_event(&self.pool, event_id, status).await
    }

    async fn booking(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        booking_repo::fetch_booking(&self.pool, id).await
    }

    async fn credit(&self, id: Uuid) -> Result<Option<Credit>, StoreError> {
        credit_repo::fetch_credit(&self.pool, id).await
    }

    async fn credits(&self, ids: &[Uuid]) -> Result<Vec<Credit>, StoreError> {
        credit_repo::fetch_credits(&self.pool, ids).await
    }

    async fn refund_for_booking(&self, booking_id: Uuid) -> Result<Option<Refund>, StoreError> {
        refund_repo::fetch_for_booking(&self.pool, booking_id).await
    }

    async fn payment_amount(&self, external_id: &str) -> Result<Option<MinorUnits>, StoreError> {
        payment_repo::fetch_amount(&self.pool, external_id).await
    }

    async fn apply(&self, changes: StateChanges) -> Result<ApplyOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        if let Some(update) = &changes.booking {
            if !booking_repo::update_booking(&mut tx, update).await? {
                tx.rollback().await?;
                return Ok(ApplyOutcome::Conflict);
            }
        }
        if let Some(credit) = &changes.mint_credit {
            credit_repo::insert_credit(&mut tx, credit).await?;
        }
        for update in &changes.credit_updates {
            if !credit_repo::update_credit(&mut tx, update).await? {
                tx.rollback().await?;
                return Ok(ApplyOutcome::Conflict);
            }
        }
        match &changes.refund {
            Some(RefundWrite::Insert(refund)) => {
                if !refund_repo::insert(&mut tx, refund).await? {
                    tx.rollback().await?;
                    return Ok(ApplyOutcome::Conflict);
                }
            }
            Some(RefundWrite::Complete {
                refund_id,
                external_refund_id,
                processed_at,
            }) => {
                if !refund_repo::complete(
                    &mut tx,
                    *refund_id,
                    external_refund_id.as_deref(),
                    *processed_at,
                )
                .await?
                {
                    tx.rollback().await?;
                    return Ok(ApplyOutcome::Conflict);
                }
            }
            None => {}
        }
        if let Some(payment) = &changes.payment {
            payment_repo::insert_payment(&mut tx, payment).await?;
        }
        if let Some(code) = &changes.release_coupon {
            credit_repo::release_coupon(&mut tx, code).await?;
        }
        for entry in &changes.audits {
            audit_repo::insert_audit_entry(&mut tx, entry).await?;
        }

        tx.commit().await?;
        Ok(ApplyOutcome::Applied)
    }

    async fn claim_booking_notification(&self, booking_id: Uuid) -> Result<bool, StoreError> {
        booking_repo::claim_notification(&self.pool, booking_id).await
    }

    async fn claim_conversion(
        &self,
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<bool, StoreError> {
        claims_repo::claim_conversion(&self.pool, event_type, entity_type, entity_id).await
    }
}
