use crate::domain::error::WebhookError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Newtype over the domain error so the HTTP mapping lives in the adapter
/// layer.
pub struct ApiError(pub WebhookError);

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self.0 {
            WebhookError::Unauthorized(msg) => {
                tracing::warn!(reason = %msg, "webhook rejected");
                let body = serde_json::json!({"error": "unauthorized"});
                (StatusCode::UNAUTHORIZED, Json(body)).into_response()
            }
            WebhookError::MalformedPayload(msg) | WebhookError::Validation(msg) => {
                tracing::warn!(reason = %msg, "malformed webhook payload");
                let body = serde_json::json!({"error": "malformed payload"});
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
            // Processing faults are acknowledged so the gateway redelivers
            // instead of disabling the endpoint.
            WebhookError::Store(err) => {
                tracing::error!(error = %err, "store error behind webhook");
                acknowledge_with_error()
            }
            WebhookError::Serialization(err) => {
                tracing::error!(error = %err, "serialization error behind webhook");
                acknowledge_with_error()
            }
        }
    }
}

fn acknowledge_with_error() -> Response {
    let body = serde_json::json!({"received": true, "error": true});
    (StatusCode::OK, Json(body)).into_response()
}
