//! Account service client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use super::types::{Account, CreateAccount, UpdateAccount};
use crate::Config;

/// Errors raised by account service calls.
#[derive(Debug, Error)]
pub enum AccountApiError {
    #[error("account service request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("account service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("account service response could not be decoded: {0}")]
    Decode(#[source] reqwest::Error),

    #[error("account service URL `{0}` cannot be extended with a path")]
    InvalidBaseUrl(String),
}

/// Operations the account service exposes.
#[async_trait]
pub trait AccountApi: Send + Sync {
    /// Create an account and return it as stored remotely.
    async fn create_account(&self, account: &CreateAccount) -> Result<Account, AccountApiError>;

    /// Update the account with the given id.
    async fn update_account(
        &self,
        id: &str,
        changes: &UpdateAccount,
    ) -> Result<Account, AccountApiError>;

    /// Delete the account with the given id.
    async fn delete_account(&self, id: &str) -> Result<(), AccountApiError>;

    /// Merge `metadata` into the account's metadata.
    async fn set_metadata(&self, id: &str, metadata: Value) -> Result<(), AccountApiError>;
}

/// Shared trait object wrapper.
pub type SharedAccountApi = Arc<dyn AccountApi>;

/// JSON/HTTP implementation of [`AccountApi`].
#[derive(Clone)]
pub struct HttpAccountApi {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpAccountApi {
    /// Create a client for the service rooted at `base_url`.
    pub fn new(
        base_url: Url,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AccountApiError> {
        if base_url.cannot_be_a_base() {
            return Err(AccountApiError::InvalidBaseUrl(base_url.to_string()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(AccountApiError::Transport)?;

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Create a client from application configuration.
    pub fn from_config(config: &Config) -> Result<Self, AccountApiError> {
        Self::new(
            config.account_api_url.clone(),
            config.account_api_key.clone(),
            config.request_timeout(),
        )
    }

    /// Resolve `{base}/accounts[/{id}[/{suffix}]]`. The id is percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, AccountApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AccountApiError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push("accounts")
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.client.request(method, url);
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Response, AccountApiError> {
        let response = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                if e.is_timeout() {
                    error!(operation = operation, error = %e, "account_api_timeout");
                } else {
                    error!(operation = operation, error = %e, "account_api_request_error");
                }
                return Err(AccountApiError::Transport(e));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(200).collect();
            error!(
                operation = operation,
                status_code = status.as_u16(),
                body_preview = %preview,
                "account_api_error_status"
            );
            return Err(AccountApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        info!(
            operation = operation,
            status_code = status.as_u16(),
            "account_api_call_complete"
        );

        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<T, AccountApiError> {
        self.send(operation, request)
            .await?
            .json()
            .await
            .map_err(AccountApiError::Decode)
    }
}

#[async_trait]
impl AccountApi for HttpAccountApi {
    async fn create_account(&self, account: &CreateAccount) -> Result<Account, AccountApiError> {
        let url = self.endpoint(&[])?;
        self.send_json("create_account", self.request(Method::POST, url).json(account))
            .await
    }

    async fn update_account(
        &self,
        id: &str,
        changes: &UpdateAccount,
    ) -> Result<Account, AccountApiError> {
        let url = self.endpoint(&[id])?;
        self.send_json("update_account", self.request(Method::PATCH, url).json(changes))
            .await
    }

    async fn delete_account(&self, id: &str) -> Result<(), AccountApiError> {
        let url = self.endpoint(&[id])?;
        self.send("delete_account", self.request(Method::DELETE, url))
            .await
            .map(|_| ())
    }

    async fn set_metadata(&self, id: &str, metadata: Value) -> Result<(), AccountApiError> {
        let url = self.endpoint(&[id, "metadata"])?;
        self.send("set_metadata", self.request(Method::PATCH, url).json(&metadata))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    fn api(server: &MockServer, key: Option<&str>) -> HttpAccountApi {
        let base = Url::parse(&format!("{}/api/", server.uri())).unwrap();
        HttpAccountApi::new(base, key.map(str::to_string), Duration::from_secs(5)).unwrap()
    }

    fn create_body() -> CreateAccount {
        CreateAccount {
            email_address: vec!["a@b.com".to_string()],
            username: Some("bob".to_string()),
            first_name: None,
            last_name: None,
            photo_url: None,
            external_id: "u_1".to_string(),
        }
    }

    #[test]
    fn test_endpoint_encodes_id() {
        let api = HttpAccountApi::new(
            Url::parse("https://accounts.example.com/v1").unwrap(),
            None,
            Duration::from_secs(1),
        )
        .unwrap();

        assert_eq!(
            api.endpoint(&["u/1", "metadata"]).unwrap().as_str(),
            "https://accounts.example.com/v1/accounts/u%2F1/metadata"
        );
    }

    #[test]
    fn test_rejects_non_base_url() {
        let result = HttpAccountApi::new(
            Url::parse("mailto:ops@example.com").unwrap(),
            None,
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(AccountApiError::InvalidBaseUrl(_))));
    }

    #[tokio::test]
    async fn create_account_posts_json_with_bearer() {
        let server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/api/accounts"))
            .and(matchers::header("authorization", "Bearer sk_test"))
            .and(matchers::body_json(json!({
                "emailAddress": ["a@b.com"],
                "username": "bob",
                "externalId": "u_1"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "acct_1",
                "emailAddress": ["a@b.com"],
                "username": "bob"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let account = api(&server, Some("sk_test"))
            .create_account(&create_body())
            .await
            .unwrap();

        assert_eq!(account.id, "acct_1");
        assert_eq!(account.username.as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn update_account_patches_by_id() {
        let server = MockServer::start().await;

        Mock::given(matchers::method("PATCH"))
            .and(matchers::path("/api/accounts/acct_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "acct_1",
                "firstName": "Ada"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let changes = UpdateAccount {
            first_name: Some("Ada".to_string()),
            ..Default::default()
        };
        let account = api(&server, None)
            .update_account("acct_1", &changes)
            .await
            .unwrap();

        assert_eq!(account.first_name.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn delete_and_metadata_accept_empty_bodies() {
        let server = MockServer::start().await;

        Mock::given(matchers::method("DELETE"))
            .and(matchers::path("/api/accounts/acct_1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(matchers::method("PATCH"))
            .and(matchers::path("/api/accounts/acct_1/metadata"))
            .and(matchers::body_json(json!({ "externalId": "u_1" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let api = api(&server, None);
        api.delete_account("acct_1").await.unwrap();
        api.set_metadata("acct_1", json!({ "externalId": "u_1" }))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("email taken"))
            .mount(&server)
            .await;

        let err = api(&server, None)
            .create_account(&create_body())
            .await
            .unwrap_err();

        match err {
            AccountApiError::Status { status, body } => {
                assert_eq!(status, 422);
                assert_eq!(body, "email taken");
            }
            other => panic!("Expected Status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn undecodable_response_is_reported() {
        let server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = api(&server, None)
            .create_account(&create_body())
            .await
            .unwrap_err();

        assert!(matches!(err, AccountApiError::Decode(_)));
    }
}
