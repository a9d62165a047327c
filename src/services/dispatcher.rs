use {
    crate::domain::booking::{self, BlockReason, ConfirmOutcome},
    crate::domain::credit::{self, PurchaseOutcome},
    crate::domain::error::WebhookError,
    crate::domain::ledger::{LedgerDecision, LedgerStatus},
    crate::domain::ports::{AccountActivator, ConversionTracker, Notifier, SideEffect},
    crate::domain::reference::{self, ResourceKind},
    crate::domain::refund::{self, RefundOutcome},
    crate::domain::store::{ApplyOutcome, ReconciliationStore, StateChanges},
    crate::gateway::{EventKind, GatewayEvent, PROVIDER_NAME},
    chrono::Utc,
    std::sync::Arc,
    uuid::Uuid,
};

/// What the pipeline decided for a delivery. Mirrored into the HTTP
/// response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Recognized and acknowledged, nothing to do.
    Skipped(&'static str),
    /// The resource already reflects this payment.
    AlreadyConfirmed,
    /// A state guard refused the transition.
    Blocked(BlockReason),
    /// A state change was applied.
    Action(&'static str),
}

/// Post-commit work bundled with the collaborators that run it. The HTTP
/// handler spawns this; tests run it inline.
pub struct ScheduledEffects {
    effects: Vec<SideEffect>,
    store: Arc<dyn ReconciliationStore>,
    notifier: Arc<dyn Notifier>,
    tracker: Arc<dyn ConversionTracker>,
    activator: Arc<dyn AccountActivator>,
}

impl ScheduledEffects {
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Runs every effect, claiming its idempotency guard first. Failures
    /// are logged; none of them fail the delivery that scheduled them.
    pub async fn run(self) {
        for effect in self.effects {
            match effect {
                SideEffect::NotifyBookingConfirmed { booking_id } => {
                    match self.store.claim_booking_notification(booking_id).await {
                        Ok(true) => {
                            if let Err(err) = self.notifier.booking_confirmed(booking_id).await {
                                tracing::warn!(
                                    booking_id = %booking_id,
                                    error = %err,
                                    "confirmation notification failed"
                                );
                            }
                        }
                        Ok(false) => {
                            tracing::debug!(
                                booking_id = %booking_id,
                                "confirmation notification already sent"
                            );
                        }
                        Err(err) => {
                            tracing::warn!(
                                booking_id = %booking_id,
                                error = %err,
                                "notification claim failed"
                            );
                        }
                    }
                }
                SideEffect::TrackConversion(event) => {
                    let claimed = self
                        .store
                        .claim_conversion(
                            &event.event_type,
                            event.entity_type,
                            &event.entity_id.to_string(),
                        )
                        .await;
                    match claimed {
                        Ok(true) => {
                            if let Err(err) = self.tracker.track(&event).await {
                                tracing::warn!(
                                    entity_id = %event.entity_id,
                                    error = %err,
                                    "conversion tracking failed"
                                );
                            }
                        }
                        Ok(false) => {
                            tracing::debug!(
                                entity_id = %event.entity_id,
                                "conversion already tracked"
                            );
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "conversion claim failed");
                        }
                    }
                }
                SideEffect::ActivateAccount(request) => {
                    if let Err(err) = self.activator.activate(&request).await {
                        tracing::warn!(
                            user_id = %request.user_id,
                            error = %err,
                            "account activation failed"
                        );
                    }
                }
            }
        }
    }
}

/// Routes parsed gateway events through the ledger, the state transitions
/// and the store.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn ReconciliationStore>,
    notifier: Arc<dyn Notifier>,
    tracker: Arc<dyn ConversionTracker>,
    activator: Arc<dyn AccountActivator>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn ReconciliationStore>,
        notifier: Arc<dyn Notifier>,
        tracker: Arc<dyn ConversionTracker>,
        activator: Arc<dyn AccountActivator>,
    ) -> Self {
        Self {
            store,
            notifier,
            tracker,
            activator,
        }
    }

    /// Full pipeline for one delivery: ledger first, transition second,
    /// terminal ledger status last. Side effects are returned for the
    /// caller to schedule after the response is on its way.
    #[tracing::instrument(
        name = "dispatch",
        skip_all,
        fields(event_id = %event.event_id(), event_type = event.event_type())
    )]
    pub async fn process(
        &self,
        event: &GatewayEvent,
    ) -> Result<(Dispatch, ScheduledEffects), WebhookError> {
        match self.store.record_event(&event.ledger_event()).await? {
            LedgerDecision::Duplicate(prior) => {
                tracing::info!(prior = %prior, "duplicate delivery skipped");
                return Ok((Dispatch::Skipped("duplicate"), self.bundle(vec![])));
            }
            LedgerDecision::Reprocess(prior) => {
                tracing::info!(prior = %prior, "reprocessing non-terminal delivery");
            }
            LedgerDecision::New => {}
        }

        match self.run(event).await {
            Ok((dispatch, status, effects)) => {
                self.store.finalize_event(event.event_id(), status).await?;
                Ok((dispatch, self.bundle(effects)))
            }
            Err(err) => {
                // Leave the row reprocessable; the gateway will redeliver.
                if let Err(finalize_err) = self
                    .store
                    .finalize_event(event.event_id(), LedgerStatus::Failed)
                    .await
                {
                    tracing::error!(
                        error = %finalize_err,
                        "could not mark ledger row failed"
                    );
                }
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        event: &GatewayEvent,
    ) -> Result<(Dispatch, LedgerStatus, Vec<SideEffect>), WebhookError> {
        let kind = event.kind();
        if kind == EventKind::Irrelevant {
            return Ok((
                Dispatch::Skipped("irrelevant_event"),
                LedgerStatus::Processed,
                vec![],
            ));
        }

        let Some(resource) = event.reference().and_then(reference::resolve) else {
            tracing::warn!("event carries no usable reference");
            return Ok((
                Dispatch::Skipped("no_reference"),
                LedgerStatus::IgnoredNoReference,
                vec![],
            ));
        };

        match resource.kind {
            ResourceKind::Booking => self.run_booking(event, kind, &resource.id).await,
            ResourceKind::Purchase => self.run_purchase(event, kind, &resource.id).await,
        }
    }

    async fn run_booking(
        &self,
        event: &GatewayEvent,
        kind: EventKind,
        raw_id: &str,
    ) -> Result<(Dispatch, LedgerStatus, Vec<SideEffect>), WebhookError> {
        let booking = match Uuid::parse_str(raw_id) {
            Ok(id) => self.store.booking(id).await?,
            Err(_) => None,
        };
        let Some(booking) = booking else {
            tracing::warn!(reference = raw_id, "no booking for reference");
            return Ok((
                Dispatch::Skipped("not_found"),
                LedgerStatus::IgnoredNotFound,
                vec![],
            ));
        };

        match kind {
            EventKind::Confirmation => {
                let facts = event.payment_facts()?;
                match booking::confirm(&booking, &facts, Utc::now())? {
                    ConfirmOutcome::AlreadyProcessed => Ok((
                        Dispatch::AlreadyConfirmed,
                        LedgerStatus::Processed,
                        vec![],
                    )),
                    ConfirmOutcome::Blocked { reason, audit } => {
                        let mut changes = StateChanges::default();
                        changes.audits.push(audit);
                        self.store.apply(changes).await?;
                        tracing::warn!(
                            booking_id = %booking.id,
                            reason = %reason,
                            "confirmation blocked"
                        );
                        Ok((Dispatch::Blocked(reason), reason.ledger_status(), vec![]))
                    }
                    ConfirmOutcome::Proceed(plan) => {
                        match self.store.apply(plan.changes).await? {
                            ApplyOutcome::Applied => {
                                let action = if plan.minted_credit {
                                    "package_confirmed"
                                } else {
                                    "booking_confirmed"
                                };
                                Ok((
                                    Dispatch::Action(action),
                                    LedgerStatus::Processed,
                                    plan.effects,
                                ))
                            }
                            ApplyOutcome::Conflict => {
                                tracing::info!(
                                    booking_id = %booking.id,
                                    "confirmation lost a concurrent race"
                                );
                                Ok((
                                    Dispatch::AlreadyConfirmed,
                                    LedgerStatus::Processed,
                                    vec![],
                                ))
                            }
                        }
                    }
                }
            }
            EventKind::CaptureRefusal => {
                let facts = event.payment_facts()?;
                self.store
                    .apply(booking::capture_refused(&booking, &facts))
                    .await?;
                Ok((
                    Dispatch::Action("capture_refused"),
                    LedgerStatus::Processed,
                    vec![],
                ))
            }
            EventKind::Refund => {
                let facts = event.refund_facts()?;
                let existing = self.store.refund_for_booking(booking.id).await?;
                let stored = if facts.payload_amount().is_none() {
                    self.store
                        .payment_amount(&facts.external_payment_id)
                        .await?
                } else {
                    None
                };
                let credits = self.store.credits(&booking.credit_ids).await?;
                let outcome = refund::reconcile_booking_refund(
                    &booking,
                    &credits,
                    existing.as_ref(),
                    &facts,
                    stored,
                    PROVIDER_NAME,
                    Utc::now(),
                )?;
                match outcome {
                    RefundOutcome::AlreadyRefunded => Ok((
                        Dispatch::Skipped("already_refunded"),
                        LedgerStatus::Processed,
                        vec![],
                    )),
                    RefundOutcome::Proceed(plan) => match self.store.apply(plan.changes).await? {
                        ApplyOutcome::Applied => {
                            let action = if plan.pending_review {
                                "refund_pending"
                            } else {
                                "refund_completed"
                            };
                            Ok((Dispatch::Action(action), LedgerStatus::Processed, vec![]))
                        }
                        ApplyOutcome::Conflict => {
                            tracing::info!(
                                booking_id = %booking.id,
                                "refund lost a concurrent race"
                            );
                            Ok((
                                Dispatch::Skipped("already_refunded"),
                                LedgerStatus::Processed,
                                vec![],
                            ))
                        }
                    },
                }
            }
            EventKind::Irrelevant => Ok((
                Dispatch::Skipped("irrelevant_event"),
                LedgerStatus::Processed,
                vec![],
            )),
        }
    }

    async fn run_purchase(
        &self,
        event: &GatewayEvent,
        kind: EventKind,
        raw_id: &str,
    ) -> Result<(Dispatch, LedgerStatus, Vec<SideEffect>), WebhookError> {
        let credit = match Uuid::parse_str(raw_id) {
            Ok(id) => self.store.credit(id).await?,
            Err(_) => None,
        };
        let Some(credit) = credit else {
            tracing::warn!(reference = raw_id, "no credit purchase for reference");
            return Ok((
                Dispatch::Skipped("not_found"),
                LedgerStatus::IgnoredNotFound,
                vec![],
            ));
        };

        let outcome = match kind {
            EventKind::Confirmation => {
                let facts = event.payment_facts()?;
                credit::confirm_purchase(&credit, &facts)
            }
            EventKind::Refund => {
                let facts = event.payment_facts()?;
                credit::refund_purchase(&credit, &facts)
            }
            EventKind::CaptureRefusal => {
                // A refused capture leaves the purchase pending; nothing to
                // record against the credit itself.
                tracing::info!(credit_id = %credit.id, "capture refusal on pending purchase");
                return Ok((
                    Dispatch::Skipped("not_applicable"),
                    LedgerStatus::Processed,
                    vec![],
                ));
            }
            EventKind::Irrelevant => {
                return Ok((
                    Dispatch::Skipped("irrelevant_event"),
                    LedgerStatus::Processed,
                    vec![],
                ));
            }
        };
        let action = match kind {
            EventKind::Refund => "purchase_refunded",
            _ => "purchase_confirmed",
        };

        match outcome {
            PurchaseOutcome::AlreadyProcessed => Ok((
                Dispatch::AlreadyConfirmed,
                LedgerStatus::Processed,
                vec![],
            )),
            PurchaseOutcome::Blocked { reason, audit } => {
                let mut changes = StateChanges::default();
                changes.audits.push(audit);
                self.store.apply(changes).await?;
                tracing::warn!(
                    credit_id = %credit.id,
                    reason = %reason,
                    "purchase confirmation blocked"
                );
                Ok((Dispatch::Blocked(reason), reason.ledger_status(), vec![]))
            }
            PurchaseOutcome::Proceed(plan) => match self.store.apply(plan.changes).await? {
                ApplyOutcome::Applied => {
                    Ok((Dispatch::Action(action), LedgerStatus::Processed, plan.effects))
                }
                ApplyOutcome::Conflict => {
                    tracing::info!(credit_id = %credit.id, "purchase event lost a concurrent race");
                    Ok((Dispatch::AlreadyConfirmed, LedgerStatus::Processed, vec![]))
                }
            },
        }
    }

    fn bundle(&self, effects: Vec<SideEffect>) -> ScheduledEffects {
        ScheduledEffects {
            effects,
            store: Arc::clone(&self.store),
            notifier: Arc::clone(&self.notifier),
            tracker: Arc::clone(&self.tracker),
            activator: Arc::clone(&self.activator),
        }
    }
}
