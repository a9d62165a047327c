//! HTTP clients for the services the pipeline notifies after commit.
//!
//! Each collaborator is optional: without a configured base URL the adapter
//! logs and reports success, which keeps single-service deployments and
//! local development working with no stubs.

use {
    crate::domain::error::SideEffectError,
    crate::domain::ports::{
        AccountActivator, ActivationRequest, ConversionEvent, ConversionTracker, Notifier,
    },
    async_trait::async_trait,
    reqwest::Client,
    serde_json::json,
    uuid::Uuid,
};

fn http_err(err: reqwest::Error) -> SideEffectError {
    SideEffectError::Http(err.to_string())
}

pub struct HttpNotifier {
    client: Client,
    base_url: Option<String>,
}

impl HttpNotifier {
    pub fn new(client: Client, base_url: Option<String>) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn booking_confirmed(&self, booking_id: Uuid) -> Result<(), SideEffectError> {
        let Some(base) = &self.base_url else {
            tracing::debug!(booking_id = %booking_id, "notifier not configured, skipping");
            return Ok(());
        };
        self.client
            .post(format!("{base}/notifications/booking-confirmed"))
            .json(&json!({"bookingId": booking_id}))
            .send()
            .await
            .map_err(http_err)?
            .error_for_status()
            .map_err(http_err)?;
        tracing::info!(booking_id = %booking_id, "booking confirmation notification sent");
        Ok(())
    }
}

pub struct HttpConversionTracker {
    client: Client,
    base_url: Option<String>,
}

impl HttpConversionTracker {
    pub fn new(client: Client, base_url: Option<String>) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl ConversionTracker for HttpConversionTracker {
    async fn track(&self, event: &ConversionEvent) -> Result<(), SideEffectError> {
        let Some(base) = &self.base_url else {
            tracing::debug!(entity_id = %event.entity_id, "tracker not configured, skipping");
            return Ok(());
        };
        self.client
            .post(format!("{base}/conversions"))
            .json(&json!({
                "eventType": event.event_type,
                "orderId": event.order_id,
                "value": event.value.cents(),
                "contentIds": event.content_ids,
                "email": event.contact.as_ref().and_then(|c| c.email.clone()),
                "name": event.contact.as_ref().and_then(|c| c.name.clone()),
            }))
            .send()
            .await
            .map_err(http_err)?
            .error_for_status()
            .map_err(http_err)?;
        tracing::info!(
            entity_id = %event.entity_id,
            event_type = event.event_type,
            "conversion reported"
        );
        Ok(())
    }
}

pub struct HttpAccountActivator {
    client: Client,
    base_url: Option<String>,
}

impl HttpAccountActivator {
    pub fn new(client: Client, base_url: Option<String>) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl AccountActivator for HttpAccountActivator {
    async fn activate(&self, request: &ActivationRequest) -> Result<(), SideEffectError> {
        let Some(base) = &self.base_url else {
            tracing::debug!(user_id = %request.user_id, "activator not configured, skipping");
            return Ok(());
        };
        self.client
            .post(format!("{base}/activations"))
            .json(&json!({
                "userId": request.user_id,
                "email": request.email,
                "name": request.name,
            }))
            .send()
            .await
            .map_err(http_err)?
            .error_for_status()
            .map_err(http_err)?;
        tracing::info!(user_id = %request.user_id, "account activation requested");
        Ok(())
    }
}
