use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("store: {0}")]
    Store(#[from] StoreError),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

/// Failures from collaborator services. These are logged, never propagated
/// into the webhook response.
#[derive(Debug, Error)]
pub enum SideEffectError {
    #[error("http: {0}")]
    Http(String),

    #[error("store: {0}")]
    Store(#[from] StoreError),
}
