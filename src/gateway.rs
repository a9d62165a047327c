//! Wire contract of the payment gateway.
//!
//! Payloads come in two families sharing one envelope: `PAYMENT_*` events
//! carry a `payment` object, `CHECKOUT_*` events a `checkout` object. Both
//! are converted here, once, into typed internal representations; nothing
//! past this module touches raw JSON or decimal amounts.

use {
    crate::domain::booking::PaymentFacts,
    crate::domain::error::WebhookError,
    crate::domain::ledger::{EventId, NewLedgerEvent},
    crate::domain::money::MinorUnits,
    crate::domain::ports::CustomerContact,
    crate::domain::refund::RefundFacts,
    serde::Deserialize,
};

/// Label stored on refund rows for the provider that processed them.
pub const PROVIDER_NAME: &str = "gateway";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEnvelope {
    id: String,
    event: String,
    #[serde(default)]
    payment: Option<PaymentPayload>,
    #[serde(default)]
    checkout: Option<CheckoutPayload>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub id: String,
    #[serde(default)]
    pub external_reference: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub net_value: Option<f64>,
    #[serde(default)]
    pub refunded_value: Option<f64>,
    #[serde(default)]
    pub chargeback_value: Option<f64>,
    #[serde(default)]
    pub billing_type: Option<String>,
    #[serde(default)]
    pub customer: Option<CustomerPayload>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutPayload {
    pub id: String,
    #[serde(default)]
    pub external_reference: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub customer: Option<CustomerPayload>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerPayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl CustomerPayload {
    fn contact(&self) -> CustomerContact {
        CustomerContact {
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaymentEvent {
    pub event_id: EventId,
    pub event_type: String,
    pub payment: PaymentPayload,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct CheckoutEvent {
    pub event_id: EventId,
    pub event_type: String,
    pub checkout: CheckoutPayload,
    pub raw: serde_json::Value,
}

/// A parsed delivery, discriminated by event family.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    Payment(PaymentEvent),
    Checkout(CheckoutEvent),
}

/// Parses and validates a webhook body. Structural problems are
/// [`WebhookError::MalformedPayload`]; unknown event types parse fine and
/// are skipped later.
pub fn parse_event(body: &str) -> Result<GatewayEvent, WebhookError> {
    let raw: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;
    let envelope: RawEnvelope = serde_json::from_value(raw.clone())
        .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;

    let event_id = EventId::new(envelope.id)
        .map_err(|_| WebhookError::MalformedPayload("empty event id".to_owned()))?;
    if envelope.event.trim().is_empty() {
        return Err(WebhookError::MalformedPayload("empty event type".to_owned()));
    }

    if envelope.event.starts_with("CHECKOUT_") {
        let checkout = envelope.checkout.ok_or_else(|| {
            WebhookError::MalformedPayload(format!(
                "{} without checkout object",
                envelope.event
            ))
        })?;
        Ok(GatewayEvent::Checkout(CheckoutEvent {
            event_id,
            event_type: envelope.event,
            checkout,
            raw,
        }))
    } else {
        let payment = envelope.payment.ok_or_else(|| {
            WebhookError::MalformedPayload(format!("{} without payment object", envelope.event))
        })?;
        Ok(GatewayEvent::Payment(PaymentEvent {
            event_id,
            event_type: envelope.event,
            payment,
            raw,
        }))
    }
}

/// Which pipeline an event type feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Confirmation,
    Refund,
    CaptureRefusal,
    Irrelevant,
}

pub fn classify(event_type: &str) -> EventKind {
    match event_type {
        "PAYMENT_CONFIRMED" | "PAYMENT_RECEIVED" | "CHECKOUT_PAID" => EventKind::Confirmation,
        "PAYMENT_REFUNDED" | "PAYMENT_CHARGEBACK" => EventKind::Refund,
        "PAYMENT_CAPTURE_REFUSED" => EventKind::CaptureRefusal,
        _ => EventKind::Irrelevant,
    }
}

impl GatewayEvent {
    pub fn event_id(&self) -> &EventId {
        match self {
            Self::Payment(e) => &e.event_id,
            Self::Checkout(e) => &e.event_id,
        }
    }

    pub fn event_type(&self) -> &str {
        match self {
            Self::Payment(e) => &e.event_type,
            Self::Checkout(e) => &e.event_type,
        }
    }

    pub fn kind(&self) -> EventKind {
        classify(self.event_type())
    }

    /// Reference string the gateway echoes back, if any.
    pub fn reference(&self) -> Option<&str> {
        match self {
            Self::Payment(e) => e.payment.external_reference.as_deref(),
            Self::Checkout(e) => e.checkout.external_reference.as_deref(),
        }
    }

    /// Gateway-side id of the payment or checkout session.
    pub fn external_payment_id(&self) -> &str {
        match self {
            Self::Payment(e) => &e.payment.id,
            Self::Checkout(e) => &e.checkout.id,
        }
    }

    pub fn contact(&self) -> Option<CustomerContact> {
        match self {
            Self::Payment(e) => e.payment.customer.as_ref().map(CustomerPayload::contact),
            Self::Checkout(e) => e.checkout.customer.as_ref().map(CustomerPayload::contact),
        }
    }

    /// Ledger row for this delivery, raw payload included.
    pub fn ledger_event(&self) -> NewLedgerEvent {
        let raw = match self {
            Self::Payment(e) => e.raw.clone(),
            Self::Checkout(e) => e.raw.clone(),
        };
        NewLedgerEvent {
            event_id: self.event_id().clone(),
            event_type: self.event_type().to_owned(),
            external_payment_id: Some(self.external_payment_id().to_owned()),
            resource_reference: self.reference().map(str::to_owned),
            payload: raw,
        }
    }

    /// Facts for the confirmation and capture-refusal paths.
    pub fn payment_facts(&self) -> Result<PaymentFacts, WebhookError> {
        let (paid_value, net_value, billing_type) = match self {
            Self::Payment(e) => (
                opt_minor(e.payment.value)?,
                opt_minor(e.payment.net_value)?,
                e.payment.billing_type.clone(),
            ),
            Self::Checkout(e) => (opt_minor(e.checkout.value)?, None, None),
        };
        Ok(PaymentFacts {
            event_id: self.event_id().as_str().to_owned(),
            event_type: self.event_type().to_owned(),
            external_payment_id: self.external_payment_id().to_owned(),
            paid_value,
            net_value,
            billing_type,
            contact: self.contact(),
        })
    }

    /// Facts for the refund path, amounts in the payload's order of
    /// authority.
    pub fn refund_facts(&self) -> Result<RefundFacts, WebhookError> {
        let (refunded, chargeback, value) = match self {
            Self::Payment(e) => (
                opt_minor(e.payment.refunded_value)?,
                opt_minor(e.payment.chargeback_value)?,
                opt_minor(e.payment.value)?,
            ),
            Self::Checkout(e) => (None, None, opt_minor(e.checkout.value)?),
        };
        Ok(RefundFacts {
            event_id: self.event_id().as_str().to_owned(),
            event_type: self.event_type().to_owned(),
            external_payment_id: self.external_payment_id().to_owned(),
            refunded_value: refunded,
            chargeback_value: chargeback,
            payment_value: value,
        })
    }
}

fn opt_minor(value: Option<f64>) -> Result<Option<MinorUnits>, WebhookError> {
    value.map(MinorUnits::from_decimal).transpose()
}
