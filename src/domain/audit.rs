use uuid::Uuid;

/// Actor recorded on every row this pipeline writes.
pub const WEBHOOK_ACTOR: &str = "webhook:gateway";

#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub id: Uuid,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub event_id: Option<String>,
    pub action: String,
    pub actor: String,
    /// Flags the row for human review in the back office.
    pub alert: bool,
    pub detail: serde_json::Value,
}

impl NewAuditEntry {
    pub fn new(
        entity_type: &str,
        entity_id: Uuid,
        action: &str,
        detail: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            entity_type: entity_type.to_owned(),
            entity_id,
            event_id: None,
            action: action.to_owned(),
            actor: WEBHOOK_ACTOR.to_owned(),
            alert: false,
            detail,
        }
    }

    pub fn with_event(mut self, event_id: &str) -> Self {
        self.event_id = Some(event_id.to_owned());
        self
    }

    pub fn as_alert(mut self) -> Self {
        self.alert = true;
        self
    }
}
