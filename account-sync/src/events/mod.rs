//! Identity provider event envelopes.
//!
//! Deliveries arrive as `{ "type": ..., "data": ... }`. The envelope is first
//! read loosely and then narrowed into [`WebhookEvent`], a closed set of the
//! event kinds this service acts on plus a catch-all.

pub mod types;

pub use types::{
    AccountData, AccountRecord, DeletedData, EmailAddress, EventEnvelope, WebhookEvent,
    ACCOUNT_CREATED, ACCOUNT_DELETED, ACCOUNT_UPDATED,
};
