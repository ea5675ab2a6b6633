//! Request and response bodies for the account service.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::events::AccountRecord;

/// Body of a create call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccount {
    pub email_address: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    pub external_id: String,
}

impl CreateAccount {
    /// Build a create body from a record. Returns `None` when the record has
    /// no email address.
    pub fn from_record(record: &AccountRecord) -> Option<Self> {
        let email = record.email.clone()?;
        Some(Self {
            email_address: vec![email],
            username: record.username.clone(),
            first_name: record.first_name.clone(),
            last_name: record.last_name.clone(),
            photo_url: record.photo_url.clone(),
            external_id: record.external_id.clone(),
        })
    }
}

/// Body of an update call. Absent fields are left untouched remotely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccount {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

impl From<&AccountRecord> for UpdateAccount {
    fn from(record: &AccountRecord) -> Self {
        Self {
            username: record.username.clone(),
            first_name: record.first_name.clone(),
            last_name: record.last_name.clone(),
            photo_url: record.photo_url.clone(),
        }
    }
}

/// Account as returned by the account service.
///
/// Fields this service does not interpret are kept in `extra` so the record
/// can be echoed back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub email_address: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
