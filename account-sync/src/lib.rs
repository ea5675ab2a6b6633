//! Account Sync - mirrors identity provider account events into the account service.
//!
//! The identity provider posts signed webhooks whenever an account is
//! created, updated or deleted. Each delivery is verified, narrowed into a
//! typed event, and applied to the account service with at most one mutation.
//!
//! ## Architecture
//!
//! ```text
//! Identity provider → POST /api/webhooks → verify → WebhookEvent → process_event → AccountApi
//! ```

pub mod accounts;
pub mod config;
pub mod events;
pub mod ledger;
pub mod process;
pub mod web;

// Re-export commonly used types
pub use accounts::{AccountApi, HttpAccountApi, InMemoryAccountApi, SharedAccountApi};
pub use config::{Config, ConfigError};
pub use events::{AccountRecord, WebhookEvent};
pub use ledger::{DeliveryClaim, DeliveryLedger};
pub use process::{process_event, ProcessOptions, SyncOutcome};
pub use web::{router, AppState};
