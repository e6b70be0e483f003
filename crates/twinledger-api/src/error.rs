//! Typed errors over HTTP.
//!
//! Handlers return [`ApiError`], which renders a [`LedgerError`] as
//! `{code, message, error}` with a status derived from its class. Clients
//! decode the `error` field back into the same variant.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use twinledger_types::{ErrorClass, LedgerError};

/// Wire form of a failed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub error: LedgerError,
}

impl From<&LedgerError> for ErrorBody {
    fn from(error: &LedgerError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
            error: error.clone(),
        }
    }
}

/// HTTP status for `error`.
#[must_use]
pub fn status_for(error: &LedgerError) -> StatusCode {
    match error {
        LedgerError::UnknownAccount(_) | LedgerError::UnknownLock(_) => StatusCode::NOT_FOUND,
        LedgerError::MalformedEnvelope { .. } | LedgerError::Serialization(_) => {
            StatusCode::BAD_REQUEST
        }
        LedgerError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => match error.class() {
            ErrorClass::Authentication => StatusCode::UNAUTHORIZED,
            ErrorClass::Funds => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorClass::Bridge | ErrorClass::Settlement => StatusCode::CONFLICT,
            ErrorClass::Network => StatusCode::BAD_GATEWAY,
            ErrorClass::Safety | ErrorClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

#[derive(Debug)]
pub struct ApiError(pub LedgerError);

impl From<LedgerError> for ApiError {
    fn from(error: LedgerError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (status_for(&self.0), Json(ErrorBody::from(&self.0))).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<Json<T>, ApiError>;
