use {
    crate::{
        AppState,
        adapters::api_errors::ApiError,
        domain::error::WebhookError,
        gateway,
        services::dispatcher::Dispatch,
    },
    axum::{Json, extract::State, http::HeaderMap},
    serde_json::{Value, json},
    sha2::{Digest, Sha256},
};

/// Shared-secret header the gateway is configured to send.
pub const TOKEN_HEADER: &str = "x-webhook-token";

/// POST /webhook. Authenticates, parses, dispatches, and answers 200 for
/// everything past authentication and parsing; the body says what actually
/// happened.
#[tracing::instrument(
    name = "webhook",
    skip_all,
    fields(
        event_id = tracing::field::Empty,
        event_type = tracing::field::Empty,
    )
)]
pub async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<Value>, ApiError> {
    let token = headers
        .get(TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| WebhookError::Unauthorized("missing token header".to_owned()))?;
    if !token_matches(token, &state.webhook_token) {
        return Err(WebhookError::Unauthorized("token mismatch".to_owned()).into());
    }

    let event = gateway::parse_event(&body).inspect_err(|_| {
        tracing::warn!(payload_digest = %payload_digest(&body), "unparseable webhook body");
    })?;

    let span = tracing::Span::current();
    span.record("event_id", event.event_id().as_str());
    span.record("event_type", event.event_type());

    match state.dispatcher.process(&event).await {
        Ok((dispatch, effects)) => {
            if !effects.is_empty() {
                tokio::spawn(effects.run());
            }
            Ok(Json(respond(dispatch)))
        }
        Err(err) => {
            tracing::error!(
                error = %err,
                payload_digest = %payload_digest(&body),
                "webhook processing failed"
            );
            Ok(Json(json!({"received": true, "error": true})))
        }
    }
}

pub async fn healthz() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

fn token_matches(provided: &str, expected: &str) -> bool {
    Sha256::digest(provided.as_bytes()) == Sha256::digest(expected.as_bytes())
}

/// Short fingerprint for correlating log lines with gateway deliveries
/// without logging customer data.
fn payload_digest(body: &str) -> String {
    hex::encode(&Sha256::digest(body.as_bytes())[..8])
}

fn respond(dispatch: Dispatch) -> Value {
    match dispatch {
        Dispatch::Skipped(reason) => json!({"received": true, "skipped": reason}),
        Dispatch::AlreadyConfirmed => json!({"received": true, "alreadyConfirmed": true}),
        Dispatch::Blocked(reason) => json!({
            "received": true,
            "blocked": true,
            "reason": reason.as_str(),
        }),
        Dispatch::Action(action) => json!({"received": true, "action": action}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_comparison_accepts_only_the_exact_secret() {
        assert!(token_matches("s3cret", "s3cret"));
        assert!(!token_matches("s3cret ", "s3cret"));
        assert!(!token_matches("", "s3cret"));
    }

    #[test]
    fn responses_mirror_the_dispatch() {
        assert_eq!(
            respond(Dispatch::Skipped("duplicate")),
            json!({"received": true, "skipped": "duplicate"})
        );
        assert_eq!(
            respond(Dispatch::AlreadyConfirmed),
            json!({"received": true, "alreadyConfirmed": true})
        );
        assert_eq!(
            respond(Dispatch::Action("booking_confirmed")),
            json!({"received": true, "action": "booking_confirmed"})
        );
        assert_eq!(
            respond(Dispatch::Blocked(
                crate::domain::booking::BlockReason::Cancelled
            )),
            json!({"received": true, "blocked": true, "reason": "cancelled"})
        );
    }
}
