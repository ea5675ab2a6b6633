//! In-process account service.
//!
//! Keeps accounts in a map and records every call it receives, in order.
//! Used by tests and for running the service without a real account backend.
//!
//! Like the real service, an account is addressable both by its own id and
//! by the identity provider id it was created with.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::client::{AccountApi, AccountApiError};
use super::types::{Account, CreateAccount, UpdateAccount};

/// A call received by [`InMemoryAccountApi`].
#[derive(Debug, Clone, PartialEq)]
pub enum AccountCall {
    Create(CreateAccount),
    Update { id: String, changes: UpdateAccount },
    Delete { id: String },
    SetMetadata { id: String, metadata: Value },
}

#[derive(Default)]
struct MemoryState {
    accounts: HashMap<String, Account>,
    /// Identity provider id -> account id
    external_ids: HashMap<String, String>,
    calls: Vec<AccountCall>,
    next_id: u64,
    failing: bool,
}

/// [`AccountApi`] backed by a `HashMap`.
#[derive(Clone, Default)]
pub struct InMemoryAccountApi {
    inner: Arc<RwLock<MemoryState>>,
}

impl InMemoryAccountApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an account as if it had been created earlier.
    pub async fn insert(&self, account: Account) {
        let mut state = self.inner.write().await;
        state.accounts.insert(account.id.clone(), account);
    }

    /// Look up a stored account by account id or identity provider id.
    pub async fn account(&self, id: &str) -> Option<Account> {
        let state = self.inner.read().await;
        let key = state.resolve(id)?;
        state.accounts.get(&key).cloned()
    }

    /// Every call received so far, oldest first.
    pub async fn calls(&self) -> Vec<AccountCall> {
        self.inner.read().await.calls.clone()
    }

    /// Make every following call fail with a 503 until switched back.
    pub async fn set_failing(&self, failing: bool) {
        self.inner.write().await.failing = failing;
    }
}

impl MemoryState {
    fn resolve(&self, id: &str) -> Option<String> {
        if self.accounts.contains_key(id) {
            return Some(id.to_string());
        }
        self.external_ids.get(id).cloned()
    }

    fn account_mut(&mut self, id: &str) -> Result<&mut Account, AccountApiError> {
        let key = self.resolve(id).ok_or_else(|| not_found(id))?;
        self.accounts.get_mut(&key).ok_or_else(|| not_found(id))
    }
}

fn unavailable() -> AccountApiError {
    AccountApiError::Status {
        status: 503,
        body: "account service unavailable".to_string(),
    }
}

fn not_found(id: &str) -> AccountApiError {
    AccountApiError::Status {
        status: 404,
        body: format!("account {id} not found"),
    }
}

#[async_trait]
impl AccountApi for InMemoryAccountApi {
    async fn create_account(&self, account: &CreateAccount) -> Result<Account, AccountApiError> {
        let mut state = self.inner.write().await;
        state.calls.push(AccountCall::Create(account.clone()));
        if state.failing {
            return Err(unavailable());
        }

        state.next_id += 1;
        let created = Account {
            id: format!("acct_{}", state.next_id),
            email_address: account.email_address.clone(),
            username: account.username.clone(),
            first_name: account.first_name.clone(),
            last_name: account.last_name.clone(),
            photo_url: account.photo_url.clone(),
            extra: Default::default(),
        };
        if !account.external_id.is_empty() {
            state
                .external_ids
                .insert(account.external_id.clone(), created.id.clone());
        }
        state.accounts.insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn update_account(
        &self,
        id: &str,
        changes: &UpdateAccount,
    ) -> Result<Account, AccountApiError> {
        let mut state = self.inner.write().await;
        state.calls.push(AccountCall::Update {
            id: id.to_string(),
            changes: changes.clone(),
        });
        if state.failing {
            return Err(unavailable());
        }

        let account = state.account_mut(id)?;
        if changes.username.is_some() {
            account.username = changes.username.clone();
        }
        if changes.first_name.is_some() {
            account.first_name = changes.first_name.clone();
        }
        if changes.last_name.is_some() {
            account.last_name = changes.last_name.clone();
        }
        if changes.photo_url.is_some() {
            account.photo_url = changes.photo_url.clone();
        }
        Ok(account.clone())
    }

    async fn delete_account(&self, id: &str) -> Result<(), AccountApiError> {
        let mut state = self.inner.write().await;
        state.calls.push(AccountCall::Delete { id: id.to_string() });
        if state.failing {
            return Err(unavailable());
        }

        let key = state.resolve(id).ok_or_else(|| not_found(id))?;
        state.accounts.remove(&key);
        state.external_ids.retain(|_, account_id| *account_id != key);
        Ok(())
    }

    async fn set_metadata(&self, id: &str, metadata: Value) -> Result<(), AccountApiError> {
        let mut state = self.inner.write().await;
        state.calls.push(AccountCall::SetMetadata {
            id: id.to_string(),
            metadata: metadata.clone(),
        });
        if state.failing {
            return Err(unavailable());
        }

        let account = state.account_mut(id)?;
        let entry = account
            .extra
            .entry("metadata")
            .or_insert_with(|| Value::Object(Default::default()));
        if let (Value::Object(existing), Value::Object(patch)) = (entry, metadata) {
            existing.extend(patch);
        }
        Ok(())
    }
}
