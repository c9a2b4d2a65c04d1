use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use pairline_shared::PairingError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Pairing(#[from] PairingError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            ServerError::Pairing(e) => match e {
                PairingError::ParticipantNotFound(_) | PairingError::SessionNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                PairingError::DuplicateParticipant(_) => StatusCode::CONFLICT,
                PairingError::NotAMember { .. } => StatusCode::FORBIDDEN,
                PairingError::SessionClosed(_) => StatusCode::GONE,
                PairingError::InvalidMessage(_) => StatusCode::BAD_REQUEST,
                PairingError::StoreUnavailable(_)
                | PairingError::SessionCreateFailed(_)
                | PairingError::DeliveryFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
            },
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ServerError::Pairing(e) if e.is_transient() => {
                tracing::warn!(error = %e, "Request failed on a transient error");
                "Service temporarily unavailable".to_string()
            }
            _ => self.to_string(),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
