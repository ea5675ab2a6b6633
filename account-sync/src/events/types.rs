//! Event envelope and account payload types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event type for a newly registered account.
pub const ACCOUNT_CREATED: &str = "account.created";

/// Event type for a profile change.
pub const ACCOUNT_UPDATED: &str = "account.updated";

/// Event type for a removed account.
pub const ACCOUNT_DELETED: &str = "account.deleted";

// =============================================================================
// Wire Types
// =============================================================================

/// Loosely typed envelope, exactly as delivered.
#[derive(Debug, Clone, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

/// One entry of the provider's `email_addresses` array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailAddress {
    #[serde(default)]
    pub email_address: String,
}

/// Account payload carried by created and updated events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountData {
    /// Provider account id
    pub id: Option<String>,
    /// Email addresses, primary first
    pub email_addresses: Vec<EmailAddress>,
    /// Profile photo URL
    pub image_url: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

/// Payload carried by deleted events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeletedData {
    pub id: Option<String>,
    pub deleted: Option<bool>,
}

// =============================================================================
// Typed Events
// =============================================================================

/// A delivery narrowed to the event kinds this service handles.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    AccountCreated(AccountData),
    AccountUpdated(AccountData),
    AccountDeleted(DeletedData),
    /// Any event type without a handler. Acknowledged, never acted on.
    Other { event_type: String },
}

impl WebhookEvent {
    /// Parse a raw request body.
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        let envelope: EventEnvelope = serde_json::from_slice(body)?;
        Self::from_envelope(envelope)
    }

    /// Narrow a loosely typed envelope.
    pub fn from_envelope(envelope: EventEnvelope) -> Result<Self, serde_json::Error> {
        let EventEnvelope { event_type, data } = envelope;

        // A missing `data` reads as an empty object so the id checks downstream
        // can report it.
        let data = if data.is_null() {
            Value::Object(Default::default())
        } else {
            data
        };

        let event = match event_type.as_str() {
            ACCOUNT_CREATED => WebhookEvent::AccountCreated(serde_json::from_value(data)?),
            ACCOUNT_UPDATED => WebhookEvent::AccountUpdated(serde_json::from_value(data)?),
            ACCOUNT_DELETED => WebhookEvent::AccountDeleted(serde_json::from_value(data)?),
            _ => WebhookEvent::Other { event_type },
        };

        Ok(event)
    }

    /// The event type string as delivered.
    pub fn event_type(&self) -> &str {
        match self {
            WebhookEvent::AccountCreated(_) => ACCOUNT_CREATED,
            WebhookEvent::AccountUpdated(_) => ACCOUNT_UPDATED,
            WebhookEvent::AccountDeleted(_) => ACCOUNT_DELETED,
            WebhookEvent::Other { event_type } => event_type.as_str(),
        }
    }
}

impl AccountData {
    /// The account id, if present and non-blank.
    pub fn account_id(&self) -> Option<&str> {
        non_blank(self.id.as_deref())
    }

    /// The first listed email address, if any.
    pub fn primary_email(&self) -> Option<&str> {
        self.email_addresses
            .first()
            .and_then(|e| non_blank(Some(e.email_address.as_str())))
    }

    /// Normalize into the record forwarded to the account service.
    pub fn to_record(&self) -> AccountRecord {
        AccountRecord {
            external_id: self.account_id().unwrap_or_default().to_string(),
            email: self.primary_email().map(str::to_string),
            username: owned(&self.username),
            first_name: owned(&self.first_name),
            last_name: owned(&self.last_name),
            photo_url: owned(&self.image_url),
        }
    }
}

impl DeletedData {
    /// The account id, if present and non-blank.
    pub fn account_id(&self) -> Option<&str> {
        non_blank(self.id.as_deref())
    }
}

// =============================================================================
// Account Record
// =============================================================================

/// Normalized profile fields forwarded to the account service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRecord {
    /// Identity provider account id
    pub external_id: String,
    pub email: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub photo_url: Option<String>,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn owned(value: &Option<String>) -> Option<String> {
    non_blank(value.as_deref()).map(str::to_string)
}
