use {
    super::error::WebhookError,
    derive_more::Display,
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// Gateway-assigned event identifier, unique across every delivery of the
/// same event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Result<Self, WebhookError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(WebhookError::Validation(
                "EventId cannot be empty".to_owned(),
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Terminal and in-flight states of a ledger row.
///
/// `Processing` is written before any side effect runs, so a crash strands
/// the row in a reprocessable state instead of silently losing the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    Processing,
    Processed,
    Failed,
    IgnoredNoReference,
    IgnoredNotFound,
    BlockedCancelled,
    BlockedRefunded,
    BlockedCourtesy,
}

impl LedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Failed => "failed",
            Self::IgnoredNoReference => "ignored_no_reference",
            Self::IgnoredNotFound => "ignored_not_found",
            Self::BlockedCancelled => "blocked_cancelled",
            Self::BlockedRefunded => "blocked_refunded",
            Self::BlockedCourtesy => "blocked_courtesy",
        }
    }

    /// A terminal row makes any redelivery of the same event a no-op.
    /// `Processing` and `Failed` rows are eligible for reprocessing.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Processing | Self::Failed)
    }
}

impl fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for LedgerStatus {
    type Error = WebhookError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "processing" => Ok(Self::Processing),
            "processed" => Ok(Self::Processed),
            "failed" => Ok(Self::Failed),
            "ignored_no_reference" => Ok(Self::IgnoredNoReference),
            "ignored_not_found" => Ok(Self::IgnoredNotFound),
            "blocked_cancelled" => Ok(Self::BlockedCancelled),
            "blocked_refunded" => Ok(Self::BlockedRefunded),
            "blocked_courtesy" => Ok(Self::BlockedCourtesy),
            other => Err(WebhookError::Validation(format!(
                "unknown ledger status: {other}"
            ))),
        }
    }
}

/// Ledger row written when a delivery first arrives, before any other work.
#[derive(Debug, Clone)]
pub struct NewLedgerEvent {
    pub event_id: EventId,
    pub event_type: String,
    pub external_payment_id: Option<String>,
    pub resource_reference: Option<String>,
    pub payload: serde_json::Value,
}

/// What the ledger already knows about an incoming event id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerDecision {
    /// First sighting; a `Processing` row was inserted.
    New,
    /// A prior attempt stalled in `Processing` or ended `Failed`; the row was
    /// reclaimed and the event should run again.
    Reprocess(LedgerStatus),
    /// A prior attempt reached a terminal status; skip entirely.
    Duplicate(LedgerStatus),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_exclude_processing_and_failed() {
        assert!(!LedgerStatus::Processing.is_terminal());
        assert!(!LedgerStatus::Failed.is_terminal());
        assert!(LedgerStatus::Processed.is_terminal());
        assert!(LedgerStatus::IgnoredNoReference.is_terminal());
        assert!(LedgerStatus::IgnoredNotFound.is_terminal());
        assert!(LedgerStatus::BlockedCancelled.is_terminal());
        assert!(LedgerStatus::BlockedRefunded.is_terminal());
        assert!(LedgerStatus::BlockedCourtesy.is_terminal());
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            LedgerStatus::Processing,
            LedgerStatus::Processed,
            LedgerStatus::Failed,
            LedgerStatus::IgnoredNoReference,
            LedgerStatus::IgnoredNotFound,
            LedgerStatus::BlockedCancelled,
            LedgerStatus::BlockedRefunded,
            LedgerStatus::BlockedCourtesy,
        ] {
            assert_eq!(LedgerStatus::try_from(status.as_str()).unwrap(), status);
        }
        assert!(LedgerStatus::try_from("finished").is_err());
    }

    #[test]
    fn event_ids_must_be_non_empty() {
        assert!(EventId::new("").is_err());
        assert!(EventId::new("  ").is_err());
        assert!(EventId::new("evt_123").is_ok());
    }
}
