//! Web server module for handling account webhooks.
//!
//! This module provides the HTTP surface of the service:
//! - `GET /health` for liveness checks
//! - `POST /api/webhooks` for identity provider deliveries
//!
//! Verification and dispatch happen inline; there is no queue between the
//! request and the account service call.

pub mod error;
pub mod handlers;
pub mod signature;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub use error::WebhookError;
pub use handlers::{account_webhook, health, AppState, HealthResponse, SyncResponse};
pub use signature::{
    verify_webhook_signature, verify_webhook_signature_at, SignatureError, WebhookSecret,
};

/// Path the identity provider posts deliveries to.
pub const WEBHOOK_PATH: &str = "/api/webhooks";

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(WEBHOOK_PATH, post(account_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
