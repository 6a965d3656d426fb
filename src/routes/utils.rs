use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::Engine;
use serde::Serialize;

use crate::error::LedgerError;

/// Body shape shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub data: Option<T>,
    pub error: Option<String>,
}

#[inline]
pub fn ok<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(Envelope { data: Some(data), error: None })).into_response()
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn unauthorized(message: &str) -> Self {
        Self { status: StatusCode::UNAUTHORIZED, message: message.to_string() }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        let status = match &err {
            LedgerError::OwnershipMismatch => StatusCode::FORBIDDEN,
            err if err.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {:?}", err);
            return Self { status, message: "internal error".to_string() };
        }
        Self { status, message: err.to_string() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Envelope::<()> { data: None, error: Some(self.message) };
        (self.status, Json(body)).into_response()
    }
}

/// Extracts the caller-asserted principal from `Authorization: Basic <base64(user:password)>`.
/// The password part is not checked.
#[inline]
pub fn validate_principal(headers: &HeaderMap) -> Result<String, ApiError> {
    let value = match headers.get(header::AUTHORIZATION).map(|value| value.to_str()) {
        Some(Ok(value)) => value,
        _ => return Err(ApiError::unauthorized("missing authorization")),
    };

    let encoded = match value.split_once(' ') {
        Some((scheme, encoded)) if scheme.eq_ignore_ascii_case("basic") => encoded.trim(),
        _ => return Err(ApiError::unauthorized("invalid_basic_auth")),
    };

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| ApiError::unauthorized("invalid_basic_auth"))?;

    match decoded.split_once(':') {
        Some((principal, _)) if !principal.is_empty() => Ok(principal.to_string()),
        Some(_) => Err(ApiError::unauthorized("invalid principal")),
        None => Err(ApiError::unauthorized("invalid_basic_auth")),
    }
}
