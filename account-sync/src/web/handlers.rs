//! Webhook endpoint handlers.
//!
//! The account webhook handler:
//! 1. Checks the three svix headers are present
//! 2. Verifies the signature over the raw body
//! 3. Parses the event envelope
//! 4. Skips deliveries already processed (when the ledger is enabled)
//! 5. Mirrors the event into the account service and reports the outcome

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::accounts::{Account, SharedAccountApi};
use crate::events::WebhookEvent;
use crate::ledger::DeliveryLedger;
use crate::process::{process_event, ProcessError, ProcessOptions, SyncOutcome};
use crate::web::error::WebhookError;
use crate::web::signature::{
    verify_webhook_signature, ID_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER,
};
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub accounts: SharedAccountApi,
    /// Present when redelivery dedup is enabled
    pub ledger: Option<DeliveryLedger>,
}

impl AppState {
    pub fn new(config: Config, accounts: SharedAccountApi) -> Self {
        let ledger = config
            .dedup_enabled
            .then(|| DeliveryLedger::new(Duration::from_secs(config.dedup_ttl_secs)));

        Self {
            config: Arc::new(config),
            accounts,
            ledger,
        }
    }

    fn process_options(&self) -> ProcessOptions {
        ProcessOptions {
            link_external_id: self.config.link_external_id,
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Account Webhook
// =============================================================================

/// Body returned after a successful create, update or delete.
#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Account>,
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// The three signature headers of a delivery.
#[derive(Debug)]
struct SvixHeaders<'a> {
    id: &'a str,
    timestamp: &'a str,
    signature: &'a str,
}

impl<'a> SvixHeaders<'a> {
    fn from_headers(headers: &'a HeaderMap) -> Option<Self> {
        Some(Self {
            id: header_value(headers, ID_HEADER)?,
            timestamp: header_value(headers, TIMESTAMP_HEADER)?,
            signature: header_value(headers, SIGNATURE_HEADER)?,
        })
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
}

/// Account lifecycle webhook endpoint.
pub async fn account_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, WebhookError> {
    let Some(svix) = SvixHeaders::from_headers(&headers) else {
        warn!(
            has_id = headers.contains_key(ID_HEADER),
            has_timestamp = headers.contains_key(TIMESTAMP_HEADER),
            has_signature = headers.contains_key(SIGNATURE_HEADER),
            "webhook_headers_missing"
        );
        return Err(WebhookError::MissingHeaders);
    };

    info!(
        delivery_id = %svix.id,
        body_length = body.len(),
        "webhook_received"
    );

    verify_webhook_signature(
        &state.config.webhook_secret,
        svix.id,
        svix.timestamp,
        svix.signature,
        &body,
        state.config.signature_tolerance_secs,
    )
    .map_err(|e| {
        warn!(delivery_id = %svix.id, reason = %e, "webhook_signature_invalid");
        WebhookError::InvalidSignature(e)
    })?;

    let event = WebhookEvent::parse(&body).map_err(|e| {
        warn!(delivery_id = %svix.id, error = %e, "webhook_payload_invalid");
        WebhookError::InvalidPayload(e)
    })?;

    let event_type = event.event_type().to_string();

    // Dropping the claim on any early return (or cancellation) releases the id.
    let claim = match &state.ledger {
        Some(ledger) => match ledger.claim(svix.id) {
            Some(claim) => Some(claim),
            None => {
                info!(
                    delivery_id = %svix.id,
                    event_type = %event_type,
                    "webhook_duplicate_ignored"
                );
                return Ok((StatusCode::OK, "duplicate event ignored").into_response());
            }
        },
        None => None,
    };

    let outcome = match process_event(state.accounts.as_ref(), &event, state.process_options())
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            match &e {
                ProcessError::AccountApi(api_error) => error!(
                    delivery_id = %svix.id,
                    event_type = %event_type,
                    error = %api_error,
                    "webhook_account_sync_failed"
                ),
                _ => warn!(
                    delivery_id = %svix.id,
                    event_type = %event_type,
                    reason = %e,
                    "webhook_event_rejected"
                ),
            }

            return Err(e.into());
        }
    };

    if let Some(claim) = claim {
        claim.commit();
    }

    let response = match outcome {
        SyncOutcome::Created(account) | SyncOutcome::Updated(account) => {
            info!(
                delivery_id = %svix.id,
                event_type = %event_type,
                account_id = %account.id,
                "webhook_synced"
            );
            Json(SyncResponse {
                message: "OK",
                user: Some(account),
                user_id: None,
            })
            .into_response()
        }
        SyncOutcome::Deleted { id } => {
            info!(
                delivery_id = %svix.id,
                event_type = %event_type,
                account_id = %id,
                "webhook_synced"
            );
            Json(SyncResponse {
                message: "OK",
                user: None,
                user_id: Some(id),
            })
            .into_response()
        }
        SyncOutcome::Ignored { event_type } => {
            info!(
                delivery_id = %svix.id,
                event_type = %event_type,
                body = %String::from_utf8_lossy(&body),
                "webhook_unhandled_event"
            );
            (StatusCode::OK, "webhook received").into_response()
        }
    };

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{
        AccountApi, AccountApiError, AccountCall, CreateAccount, InMemoryAccountApi,
        UpdateAccount,
    };
    use crate::web::router;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use crate::web::signature::WebhookSecret;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::time::{SystemTime, UNIX_EPOCH};
    use tower::ServiceExt;

    const SECRET: &str = "whsec_MfKQ9r8GKYqrTwjUPD8ILPZIo2LaLaSw";

    fn config(dedup_enabled: bool) -> Config {
        Config::from_lookup(|name| match name {
            "WEBHOOK_SECRET" => Some(SECRET.to_string()),
            "WEBHOOK_DEDUP_ENABLED" => Some(dedup_enabled.to_string()),
            _ => None,
        })
        .unwrap()
    }

    fn state(api: &InMemoryAccountApi, dedup_enabled: bool) -> AppState {
        AppState::new(config(dedup_enabled), Arc::new(api.clone()))
    }

    fn now() -> String {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
            .to_string()
    }

    fn signed_request(msg_id: &str, body: &Value) -> Request<Body> {
        let body = serde_json::to_vec(body).unwrap();
        let timestamp = now();
        let signature = WebhookSecret::new(SECRET)
            .unwrap()
            .sign(msg_id, &timestamp, &body);

        Request::builder()
            .method("POST")
            .uri("/api/webhooks")
            .header("content-type", "application/json")
            .header("svix-id", msg_id)
            .header("svix-timestamp", timestamp)
            .header("svix-signature", format!("v1,{signature}"))
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn created_event() -> Value {
        json!({
            "type": "account.created",
            "data": {
                "id": "u_1",
                "email_addresses": [{ "email_address": "a@b.com" }],
                "image_url": "https://img.example.com/u_1.png",
                "username": "bob"
            }
        })
    }

    #[tokio::test]
    async fn test_missing_headers_rejected() {
        let api = InMemoryAccountApi::new();
        let app = router(state(&api, true));

        let mut request = signed_request("msg_1", &created_event());
        request.headers_mut().remove("svix-timestamp");

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, "missing svix headers");
        assert!(api.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_bad_signature_rejected() {
        let api = InMemoryAccountApi::new();
        let app = router(state(&api, true));

        let mut request = signed_request("msg_1", &created_event());
        request.headers_mut().insert(
            "svix-signature",
            "v1,dGhpcyBpcyBub3QgdGhlIHNpZ25hdHVyZQ==".parse().unwrap(),
        );

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, "invalid webhook signature");
        assert!(api.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_created_echoes_account() {
        let api = InMemoryAccountApi::new();
        let app = router(state(&api, true));

        let response = app
            .oneshot(signed_request("msg_1", &created_event()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["message"], "OK");
        assert_eq!(body["user"]["id"], "acct_1");
        assert_eq!(body["user"]["username"], "bob");

        let creates: Vec<_> = api
            .calls()
            .await
            .into_iter()
            .filter_map(|c| match c {
                AccountCall::Create(body) => Some(body),
                _ => None,
            })
            .collect();
        assert_eq!(creates.len(), 1);
        assert_eq!(creates[0].email_address, vec!["a@b.com".to_string()]);
        assert_eq!(creates[0].username.as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn test_created_without_email_rejected() {
        let api = InMemoryAccountApi::new();
        let app = router(state(&api, true));

        let event = json!({
            "type": "account.created",
            "data": { "id": "u_1", "email_addresses": [] }
        });
        let response = app.oneshot(signed_request("msg_1", &event)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(api.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_updated_without_id_rejected() {
        let api = InMemoryAccountApi::new();
        let app = router(state(&api, true));

        let event = json!({ "type": "account.updated", "data": { "first_name": "Bo" } });
        let response = app.oneshot(signed_request("msg_1", &event)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, "missing account id");
        assert!(api.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_deleted_returns_user_id() {
        let api = InMemoryAccountApi::new();
        api.insert(Account {
            id: "u_123".to_string(),
            ..Default::default()
        })
        .await;
        let app = router(state(&api, true));

        let event = json!({ "type": "account.deleted", "data": { "id": "u_123", "deleted": true } });
        let response = app.oneshot(signed_request("msg_1", &event)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body, json!({ "message": "OK", "userId": "u_123" }));
        assert_eq!(
            api.calls().await,
            vec![AccountCall::Delete {
                id: "u_123".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_unknown_event_acknowledged() {
        let api = InMemoryAccountApi::new();
        let app = router(state(&api, true));

        let event = json!({ "type": "account.unknown_event", "data": { "id": "u_1" } });
        let response = app.oneshot(signed_request("msg_1", &event)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "webhook received");
        assert!(api.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_account_service_failure_is_500() {
        let api = InMemoryAccountApi::new();
        api.set_failing(true).await;
        let app = router(state(&api, true));

        let response = app
            .oneshot(signed_request("msg_1", &created_event()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, "account service error");
    }

    #[tokio::test]
    async fn test_malformed_payload_rejected() {
        let api = InMemoryAccountApi::new();
        let app = router(state(&api, true));

        let response = app
            .oneshot(signed_request("msg_1", &json!({ "data": {} })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_text(response).await, "invalid event payload");
    }

    #[tokio::test]
    async fn test_health() {
        let api = InMemoryAccountApi::new();
        let app = router(state(&api, false));

        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, r#"{"status":"ok"}"#);
    }

    #[tokio::test]
    async fn test_header_values_signed_as_received() {
        let api = InMemoryAccountApi::new();
        let app = router(state(&api, true));

        let response = app
            .oneshot(signed_request("msg_1 ", &created_event()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    /// Account service whose calls never complete while stalled.
    #[derive(Clone, Default)]
    struct StallingAccountApi {
        inner: InMemoryAccountApi,
        stalled: Arc<AtomicBool>,
    }

    impl StallingAccountApi {
        async fn wait_if_stalled(&self) {
            if self.stalled.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
        }
    }

    #[async_trait]
    impl AccountApi for StallingAccountApi {
        async fn create_account(
            &self,
            account: &CreateAccount,
        ) -> Result<Account, AccountApiError> {
            self.wait_if_stalled().await;
            self.inner.create_account(account).await
        }

        async fn update_account(
            &self,
            id: &str,
            changes: &UpdateAccount,
        ) -> Result<Account, AccountApiError> {
            self.wait_if_stalled().await;
            self.inner.update_account(id, changes).await
        }

        async fn delete_account(&self, id: &str) -> Result<(), AccountApiError> {
            self.wait_if_stalled().await;
            self.inner.delete_account(id).await
        }

        async fn set_metadata(&self, id: &str, metadata: Value) -> Result<(), AccountApiError> {
            self.wait_if_stalled().await;
            self.inner.set_metadata(id, metadata).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_delivery_is_processed_on_retry() {
        let api = StallingAccountApi::default();
        api.stalled.store(true, Ordering::SeqCst);
        let app = router(AppState::new(config(true), Arc::new(api.clone())));

        let first = tokio::time::timeout(
            Duration::from_millis(100),
            app.clone().oneshot(signed_request("msg_1", &created_event())),
        )
        .await;
        assert!(first.is_err(), "first delivery should still be in flight");

        api.stalled.store(false, Ordering::SeqCst);

        let response = app
            .oneshot(signed_request("msg_1", &created_event()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["user"]["id"], "acct_1");
        assert!(api.inner.account("u_1").await.is_some());
    }
}
