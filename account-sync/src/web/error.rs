//! Webhook error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::accounts::AccountApiError;
use crate::process::ProcessError;
use crate::web::signature::SignatureError;

/// Everything that can stop a delivery from being processed.
///
/// Client faults map to 400 and account service faults to 500. The body is
/// the plain-text message only; detail stays in the logs.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing svix headers")]
    MissingHeaders,

    #[error("invalid webhook signature")]
    InvalidSignature(#[source] SignatureError),

    #[error("invalid event payload")]
    InvalidPayload(#[source] serde_json::Error),

    #[error("missing email address")]
    MissingEmail,

    #[error("missing account id")]
    MissingAccountId,

    #[error("account service error")]
    AccountService(#[source] AccountApiError),
}

impl WebhookError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebhookError::MissingHeaders
            | WebhookError::InvalidSignature(_)
            | WebhookError::InvalidPayload(_)
            | WebhookError::MissingEmail
            | WebhookError::MissingAccountId => StatusCode::BAD_REQUEST,
            WebhookError::AccountService(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ProcessError> for WebhookError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::MissingEmail => WebhookError::MissingEmail,
            ProcessError::MissingAccountId => WebhookError::MissingAccountId,
            ProcessError::AccountApi(e) => WebhookError::AccountService(e),
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
