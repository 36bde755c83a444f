use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Extension, Path, Query,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::Response,
    routing::{get, post, put},
};
use serde_json::json;

use stockbook_auth::{Action, Resource};
use stockbook_core::{InventoryId, SiteId};
use stockbook_infra::ledger::TransferRequest;
use stockbook_inventory::{InventoryQuery, LowStockFilter, MovementType, StockChange};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz::require;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_inventory).post(open_record))
        .route("/low-stock", get(list_low_stock))
        .route("/transfers", post(transfer_stock))
        .route("/:id", get(get_record))
        .route("/:id/thresholds", put(set_thresholds))
        .route("/:id/adjust", post(adjust_stock))
        .route("/:id/recount", post(recount_stock))
        .route("/:id/reserve", post(reserve_stock))
        .route("/:id/release", post(release_stock))
        .route("/:id/movements", get(movement_history))
        .route("/:id/reconcile", get(reconcile))
}

fn optional_site(raw: Option<&str>) -> Result<Option<SiteId>, Response> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => errors::parse_id(raw, "site").map(Some),
        None => Ok(None),
    }
}

fn change_to_response(change: StockChange) -> Response {
    errors::json_ok(
        StatusCode::OK,
        json!({
            "id": change.record.id_typed().to_string(),
            "quantity": change.record.quantity(),
            "reserved_qty": change.record.reserved_qty(),
            "available_qty": change.record.available_qty(),
            "status": change.record.status(),
            "movement": change.movement,
        }),
    )
}

pub async fn list_inventory(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    params: Result<Query<dto::InventoryListParams>, QueryRejection>,
) -> Response {
    if let Err(denied) = require(&principal, Resource::Inventory, Action::Read) {
        return denied;
    }
    let Query(params) = match params {
        Ok(p) => p,
        Err(rejection) => return errors::query_rejection(rejection),
    };
    let site_id = match optional_site(params.site_id.as_deref()) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let query = InventoryQuery {
        site_id,
        low_stock: params.low_stock,
        search: params.search,
    };
    match services.ledger.list_inventory(&query).await {
        Ok(views) => errors::json_ok(
            StatusCode::OK,
            views.iter().map(dto::inventory_view_to_json).collect::<Vec<_>>(),
        ),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn list_low_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    params: Result<Query<dto::LowStockParams>, QueryRejection>,
) -> Response {
    if let Err(denied) = require(&principal, Resource::Inventory, Action::Read) {
        return denied;
    }
    let Query(params) = match params {
        Ok(p) => p,
        Err(rejection) => return errors::query_rejection(rejection),
    };
    let site_id = match optional_site(params.site_id.as_deref()) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let filter = LowStockFilter {
        site_id,
        critical_only: params.critical,
    };
    match services.ledger.list_low_stock(&filter).await {
        Ok(views) => errors::json_ok(
            StatusCode::OK,
            views.iter().map(dto::inventory_view_to_json).collect::<Vec<_>>(),
        ),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn open_record(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<dto::OpenRecordRequest>, JsonRejection>,
) -> Response {
    if let Err(denied) = require(&principal, Resource::Inventory, Action::Manage) {
        return denied;
    }
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };

    match services
        .ledger
        .open_record(body.product_id, body.site_id, body.thresholds.into())
        .await
    {
        Ok(opened) => {
            let status = if opened.created { StatusCode::CREATED } else { StatusCode::OK };
            errors::json_ok(status, dto::inventory_view_to_json(&opened.view))
        }
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn get_record(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(denied) = require(&principal, Resource::Inventory, Action::Read) {
        return denied;
    }
    let id: InventoryId = match errors::parse_id(&id, "inventory") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.ledger.get_record(id).await {
        Ok(view) => errors::json_ok(StatusCode::OK, dto::inventory_view_to_json(&view)),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn set_thresholds(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::ThresholdsRequest>, JsonRejection>,
) -> Response {
    if let Err(denied) = require(&principal, Resource::Inventory, Action::Manage) {
        return denied;
    }
    let id: InventoryId = match errors::parse_id(&id, "inventory") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };

    match services.ledger.set_thresholds(id, body.into()).await {
        Ok(view) => errors::json_ok(StatusCode::OK, dto::inventory_view_to_json(&view)),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn adjust_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::AdjustStockRequest>, JsonRejection>,
) -> Response {
    if let Err(denied) = require(&principal, Resource::Inventory, Action::Adjust) {
        return denied;
    }
    let id: InventoryId = match errors::parse_id(&id, "inventory") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    let movement_type: MovementType = match body.movement_type.parse() {
        Ok(t) => t,
        Err(e) => return errors::ledger_error_to_response(e.into()),
    };

    match services
        .ledger
        .adjust_stock(
            id,
            body.quantity_change,
            movement_type,
            dto::note(body.reason, body.notes),
            principal.user_id(),
        )
        .await
    {
        Ok(change) => change_to_response(change),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn recount_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::RecountRequest>, JsonRejection>,
) -> Response {
    if let Err(denied) = require(&principal, Resource::Inventory, Action::Adjust) {
        return denied;
    }
    let id: InventoryId = match errors::parse_id(&id, "inventory") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };

    match services
        .ledger
        .recount_stock(
            id,
            body.counted_quantity,
            dto::note(body.reason, body.notes),
            principal.user_id(),
        )
        .await
    {
        Ok(change) => change_to_response(change),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn reserve_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::QuantityRequest>, JsonRejection>,
) -> Response {
    if let Err(denied) = require(&principal, Resource::Inventory, Action::Reserve) {
        return denied;
    }
    let id: InventoryId = match errors::parse_id(&id, "inventory") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };

    match services.ledger.reserve_stock(id, body.quantity, principal.user_id()).await {
        Ok(change) => change_to_response(change),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn release_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    body: Result<Json<dto::QuantityRequest>, JsonRejection>,
) -> Response {
    if let Err(denied) = require(&principal, Resource::Inventory, Action::Reserve) {
        return denied;
    }
    let id: InventoryId = match errors::parse_id(&id, "inventory") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };

    match services.ledger.release_stock(id, body.quantity, principal.user_id()).await {
        Ok(change) => change_to_response(change),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn transfer_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<dto::TransferRequest>, JsonRejection>,
) -> Response {
    if let Err(denied) = require(&principal, Resource::Inventory, Action::Adjust) {
        return denied;
    }
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => return errors::json_rejection(rejection),
    };

    let request = TransferRequest {
        product_id: body.product_id,
        from_site: body.from_site_id,
        to_site: body.to_site_id,
        quantity: body.quantity,
        note: dto::note(body.reason, body.notes),
    };
    match services.ledger.transfer_stock(request, principal.user_id()).await {
        Ok(outcome) => errors::json_ok(StatusCode::CREATED, dto::transfer_to_json(&outcome)),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn movement_history(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(denied) = require(&principal, Resource::Inventory, Action::Read) {
        return denied;
    }
    let id: InventoryId = match errors::parse_id(&id, "inventory") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.ledger.movement_history(id).await {
        Ok(movements) => errors::json_ok(StatusCode::OK, movements),
        Err(e) => errors::ledger_error_to_response(e),
    }
}

pub async fn reconcile(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(denied) = require(&principal, Resource::Inventory, Action::Audit) {
        return denied;
    }
    let id: InventoryId = match errors::parse_id(&id, "inventory") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.ledger.reconcile(id).await {
        Ok(report) => errors::json_ok(StatusCode::OK, report),
        Err(e) => errors::ledger_error_to_response(e),
    }
}
