//! Minimal product/site registry the surrounding application pushes into.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::Response,
    routing::put,
};

use stockbook_auth::{Action, Resource};
use stockbook_core::{ProductId, SiteId};
use stockbook_inventory::{ProductRef, SiteRef};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz::require;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/products/:id", put(upsert_product))
        .route("/sites/:id", put(upsert_site))
}

pub async fn upsert_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::UpsertProductRequest>, JsonRejection>,
) -> Response {
    if let Err(denied) = require(&principal, Resource::Catalog, Action::Write) {
        return denied;
    }
    let id: ProductId = match errors::parse_id(&id, "product") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };

    let product = ProductRef {
        id,
        sku: body.sku,
        name: body.name,
        unit: body.unit,
    };
    match services.ledger.register_product(product).await {
        Ok(product) => errors::json_ok(StatusCode::OK, product),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn upsert_site(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::UpsertSiteRequest>, JsonRejection>,
) -> Response {
    if let Err(denied) = require(&principal, Resource::Catalog, Action::Write) {
        return denied;
    }
    let id: SiteId = match errors::parse_id(&id, "site") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };

    let site = SiteRef {
        id,
        code: body.code,
        name: body.name,
    };
    match services.ledger.register_site(site).await {
        Ok(site) => errors::json_ok(StatusCode::OK, site),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
