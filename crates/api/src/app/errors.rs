use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use wms_core::DomainError;
use wms_infra::{FlowError, StoreError};

pub fn flow_error_to_response(err: FlowError) -> axum::response::Response {
    match err {
        FlowError::Domain(e) => domain_error_to_response(e),
        FlowError::Store(StoreError::Conflict(msg)) => {
            json_error(StatusCode::CONFLICT, "conflict", msg)
        }
        FlowError::Store(e) => {
            tracing::error!(error = %e, "storage failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
    }
}

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    let message = err.to_string();
    let (status, code) = match &err {
        DomainError::Validation(_) | DomainError::InsufficientData(_) => {
            (StatusCode::BAD_REQUEST, "validation_error")
        }
        DomainError::MissingField(_) => (StatusCode::BAD_REQUEST, "missing_field"),
        DomainError::InvalidLines(errors) => {
            return json_error_with(StatusCode::BAD_REQUEST, "invalid_lines", message, errors);
        }
        DomainError::InvalidId(_) => (StatusCode::BAD_REQUEST, "invalid_id"),
        DomainError::InsufficientStock { .. } => (StatusCode::BAD_REQUEST, "insufficient_stock"),
        DomainError::InsufficientReservation { .. } => {
            (StatusCode::BAD_REQUEST, "insufficient_reservation")
        }
        DomainError::InvalidStatusTransition { .. } => {
            (StatusCode::BAD_REQUEST, "invalid_status_transition")
        }
        DomainError::BusinessRule(_) => (StatusCode::BAD_REQUEST, "business_rule_violation"),
        DomainError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        DomainError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
        DomainError::InvariantViolation(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation")
        }
    };
    json_error(status, code, message)
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    json_error_with(status, code, message, &[])
}

pub fn json_error_with(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
    errors: &[String],
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
            "errors": errors,
        })),
    )
        .into_response()
}

/// Parse a path segment into a typed id, answering `400 invalid_id` on failure.
pub fn parse_id<T>(raw: &str) -> Result<T, axum::response::Response>
where
    T: std::str::FromStr<Err = DomainError>,
{
    raw.parse::<T>()
        .map_err(|e| json_error(StatusCode::BAD_REQUEST, "invalid_id", e.to_string()))
}
