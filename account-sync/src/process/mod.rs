//! Event processing.
//!
//! Turns a verified [`WebhookEvent`] into at most one account service
//! mutation.
//!
//! ## Processing Flow
//!
//! ```text
//! WebhookEvent → process_event() → AccountApi → SyncOutcome
//! ```

pub mod lifecycle;

use thiserror::Error;
use tracing::info;

use crate::accounts::{Account, AccountApi, AccountApiError};
use crate::events::WebhookEvent;

pub use lifecycle::{process_created, process_deleted, process_updated};

/// Knobs for event processing.
#[derive(Debug, Clone, Copy)]
pub struct ProcessOptions {
    /// Write the identity provider id into a created account's metadata
    pub link_external_id: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            link_external_id: true,
        }
    }
}

/// What processing did.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Created(Account),
    Updated(Account),
    Deleted { id: String },
    /// No handler for this event type; nothing was called.
    Ignored { event_type: String },
}

/// Errors raised while processing an event.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("missing email address")]
    MissingEmail,

    #[error("missing account id")]
    MissingAccountId,

    #[error(transparent)]
    AccountApi(#[from] AccountApiError),
}

/// Process a verified event.
///
/// Routes to the handler for the event kind. Unhandled kinds return
/// [`SyncOutcome::Ignored`] without touching the account service.
pub async fn process_event(
    api: &dyn AccountApi,
    event: &WebhookEvent,
    options: ProcessOptions,
) -> Result<SyncOutcome, ProcessError> {
    info!(event_type = event.event_type(), "event_routing");

    let outcome = match event {
        WebhookEvent::AccountCreated(data) => process_created(api, data, options).await?,
        WebhookEvent::AccountUpdated(data) => process_updated(api, data).await?,
        WebhookEvent::AccountDeleted(data) => process_deleted(api, data).await?,
        WebhookEvent::Other { event_type } => SyncOutcome::Ignored {
            event_type: event_type.clone(),
        },
    };

    Ok(outcome)
}
