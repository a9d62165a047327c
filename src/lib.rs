//! Payment-webhook reconciliation for the booking platform.
//!
//! The gateway delivers payment lifecycle events over HTTP; this crate
//! authenticates them, records them in an idempotency ledger, and applies
//! the resulting state transitions to bookings, hour-package credits, and
//! refunds in a single database transaction. Side effects (notifications,
//! conversion tracking, account activation) run after commit and never
//! influence the HTTP response.
//!
//! Layering, top to bottom:
//!
//! - [`adapters`]: HTTP surface (webhook handler, health probe) and HTTP
//!   clients for the collaborating services.
//! - [`services`]: the dispatcher that turns a parsed event into applied
//!   state plus scheduled effects.
//! - [`domain`]: pure transition logic. Given current state and payment
//!   facts, it returns the changes to apply without touching I/O.
//! - [`infra`]: PostgreSQL store behind the [`domain::store::ReconciliationStore`]
//!   trait.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod gateway;
pub mod infra;
pub mod services;

use {
    crate::{
        adapters::webhook::{healthz, webhook_handler},
        services::dispatcher::Dispatcher,
    },
    axum::{
        Router,
        extract::DefaultBodyLimit,
        routing::{get, post},
    },
    std::{sync::Arc, time::Duration},
    tower_http::{timeout::TimeoutLayer, trace::TraceLayer},
};

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub webhook_token: Arc<str>,
}

/// Builds the ingestion router. One webhook route plus a health probe.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(15)))
        .layer(DefaultBodyLimit::max(64 * 1024)) // gateway events stay well under 64 KB
        .with_state(state)
}
