use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;
use serde_json::json;

use stockbook_infra::LedgerError;

pub fn ledger_error_to_response(err: LedgerError) -> axum::response::Response {
    match err {
        LedgerError::InvalidArgument(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_argument", msg),
        LedgerError::NotFound(what) => json_error(StatusCode::NOT_FOUND, "not_found", format!("{what} not found")),
        LedgerError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        LedgerError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        LedgerError::Unauthorized => json_error(StatusCode::FORBIDDEN, "forbidden", "unauthorized"),
        LedgerError::Store(msg) => {
            tracing::error!(error = %msg, "inventory store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "inventory store unavailable")
        }
    }
}

pub fn json_ok(status: StatusCode, data: impl Serialize) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "success": true,
            "data": data,
        })),
    )
        .into_response()
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "success": false,
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn invalid_argument(message: impl Into<String>) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "invalid_argument", message)
}

pub fn json_rejection(rejection: JsonRejection) -> axum::response::Response {
    invalid_argument(rejection.body_text())
}

pub fn query_rejection(rejection: QueryRejection) -> axum::response::Response {
    invalid_argument(rejection.body_text())
}

/// Parse a path/query identifier, answering 400 on garbage.
pub fn parse_id<T: core::str::FromStr>(raw: &str, what: &str) -> Result<T, axum::response::Response> {
    raw.trim()
        .parse()
        .map_err(|_| invalid_argument(format!("invalid {what} id '{raw}'")))
}
