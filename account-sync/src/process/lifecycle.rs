//! Handlers for account lifecycle events.

use serde_json::json;
use tracing::{info, warn};

use super::{ProcessError, ProcessOptions, SyncOutcome};
use crate::accounts::{AccountApi, CreateAccount, UpdateAccount};
use crate::events::{AccountData, DeletedData};

/// Create the account described by a created event.
///
/// This function:
/// 1. Normalizes the payload into an account record
/// 2. Creates the account remotely (an email address is required)
/// 3. Optionally writes the identity provider id into the new account's metadata
///
/// A metadata failure is logged and does not fail the event; the account
/// already exists at that point.
pub async fn process_created(
    api: &dyn AccountApi,
    data: &AccountData,
    options: ProcessOptions,
) -> Result<SyncOutcome, ProcessError> {
    let record = data.to_record();
    let body = CreateAccount::from_record(&record).ok_or(ProcessError::MissingEmail)?;

    info!(
        external_id = %record.external_id,
        has_username = record.username.is_some(),
        has_photo = record.photo_url.is_some(),
        "account_create_start"
    );

    let created = api.create_account(&body).await?;

    if options.link_external_id && !record.external_id.is_empty() {
        let metadata = json!({ "externalId": record.external_id });
        match api.set_metadata(&created.id, metadata).await {
            Ok(()) => info!(
                account_id = %created.id,
                external_id = %record.external_id,
                "account_metadata_linked"
            ),
            Err(e) => warn!(
                account_id = %created.id,
                external_id = %record.external_id,
                error = %e,
                "account_metadata_link_failed"
            ),
        }
    }

    info!(account_id = %created.id, "account_create_complete");

    Ok(SyncOutcome::Created(created))
}

/// Apply a profile change to an existing account.
pub async fn process_updated(
    api: &dyn AccountApi,
    data: &AccountData,
) -> Result<SyncOutcome, ProcessError> {
    let id = data.account_id().ok_or(ProcessError::MissingAccountId)?;
    let changes = UpdateAccount::from(&data.to_record());

    info!(account_id = %id, "account_update_start");

    let updated = api.update_account(id, &changes).await?;

    info!(account_id = %id, "account_update_complete");

    Ok(SyncOutcome::Updated(updated))
}

/// Delete the account named by a deleted event.
pub async fn process_deleted(
    api: &dyn AccountApi,
    data: &DeletedData,
) -> Result<SyncOutcome, ProcessError> {
    let id = data.account_id().ok_or(ProcessError::MissingAccountId)?;

    info!(account_id = %id, "account_delete_start");

    api.delete_account(id).await?;

    info!(account_id = %id, "account_delete_complete");

    Ok(SyncOutcome::Deleted { id: id.to_string() })
}
