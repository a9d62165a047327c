use {super::error::SideEffectError, super::money::MinorUnits, async_trait::async_trait, uuid::Uuid};

/// Customer details forwarded by the gateway, when it has them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerContact {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// A conversion to report to the marketing pipeline. Deduplicated per
/// `(event_type, entity_type, entity_id)` before the tracker is called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionEvent {
    pub event_type: String,
    pub entity_type: &'static str,
    pub entity_id: Uuid,
    pub value: MinorUnits,
    pub order_id: String,
    pub content_ids: Vec<String>,
    pub contact: Option<CustomerContact>,
}

/// Pre-registration to promote into a full account after first payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationRequest {
    pub user_id: Uuid,
    pub email: String,
    pub name: Option<String>,
}

/// Work to run after the transaction commits. Failures are logged and never
/// surface in the webhook response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    NotifyBookingConfirmed { booking_id: Uuid },
    TrackConversion(ConversionEvent),
    ActivateAccount(ActivationRequest),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn booking_confirmed(&self, booking_id: Uuid) -> Result<(), SideEffectError>;
}

#[async_trait]
pub trait ConversionTracker: Send + Sync {
    async fn track(&self, event: &ConversionEvent) -> Result<(), SideEffectError>;
}

#[async_trait]
pub trait AccountActivator: Send + Sync {
    async fn activate(&self, request: &ActivationRequest) -> Result<(), SideEffectError>;
}
