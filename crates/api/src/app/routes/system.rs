use axum::{extract::Extension, http::StatusCode, response::Response};
use serde_json::json;

use crate::app::errors::json_ok;
use crate::context::PrincipalContext;

pub async fn health() -> Response {
    json_ok(StatusCode::OK, json!({ "status": "ok" }))
}

pub async fn whoami(Extension(principal): Extension<PrincipalContext>) -> Response {
    json_ok(
        StatusCode::OK,
        json!({
            "user_id": principal.user_id().to_string(),
            "roles": principal.roles().iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        }),
    )
}
