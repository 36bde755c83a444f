//! API-side authorization guard.
//!
//! Every protected handler calls [`require`] before touching the ledger; the
//! policy itself lives in `stockbook_auth::evaluate`.

use axum::http::StatusCode;
use axum::response::Response;

use stockbook_auth::{Action, Decision, Resource, evaluate};

use crate::app::errors::json_error;
use crate::context::PrincipalContext;

pub fn require(principal: &PrincipalContext, resource: Resource, action: Action) -> Result<(), Response> {
    match evaluate(principal.principal(), resource, action) {
        Decision::Allow => Ok(()),
        Decision::Deny { required } => Err(json_error(
            StatusCode::FORBIDDEN,
            "forbidden",
            format!("missing permission: {required}"),
        )),
    }
}
