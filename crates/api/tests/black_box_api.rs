use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

use stockbook_api::app::services::AppServices;
use stockbook_auth::{JwtClaims, Role};
use stockbook_core::{ProductId, SiteId, UserId};
use stockbook_inventory::StockPolicy;

const JWT_SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(StockPolicy::Strict).await
    }

    async fn spawn_with(policy: StockPolicy) -> Self {
        // Same router as prod, in-memory store, ephemeral port.
        let app = stockbook_api::app::build_app(JWT_SECRET.to_string(), AppServices::in_memory(policy));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, token: &str, path: &str) -> (StatusCode, Value) {
        let res = self.client.get(self.url(path)).bearer_auth(token).send().await.unwrap();
        (res.status(), res.json().await.unwrap())
    }

    async fn post(&self, token: &str, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        (res.status(), res.json().await.unwrap())
    }

    async fn put(&self, token: &str, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .put(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        (res.status(), res.json().await.unwrap())
    }

    /// Register a product and a site, then open a record with the given thresholds.
    async fn stocked_record(&self, token: &str, name: &str, thresholds: Value) -> (String, String, String) {
        let product_id = ProductId::new().to_string();
        let site_id = SiteId::new().to_string();

        let (status, _) = self
            .put(
                token,
                &format!("/catalog/products/{product_id}"),
                json!({ "sku": format!("SKU-{name}"), "name": name, "unit": "pcs" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = self
            .put(
                token,
                &format!("/catalog/sites/{site_id}"),
                json!({ "code": format!("SITE-{name}"), "name": format!("{name} site") }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let mut body = json!({ "product_id": product_id, "site_id": site_id });
        if let (Some(obj), Some(extra)) = (body.as_object_mut(), thresholds.as_object()) {
            obj.extend(extra.clone());
        }
        let (status, opened) = self.post(token, "/inventory", body).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = opened["data"]["id"].as_str().unwrap().to_string();
        (id, product_id, site_id)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(roles: Vec<Role>) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: UserId::new(),
        roles,
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(srv.url("/whoami")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "unauthenticated");

    let res = srv
        .client
        .get(srv.url("/inventory"))
        .bearer_auth("not-a-token")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn principal_is_derived_from_token() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt(vec![Role::MANAGER]);

    let (status, body) = srv.get(&token, "/whoami").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["roles"].as_array().unwrap().iter().any(|r| r == "manager"));
}

#[tokio::test]
async fn allocation_adjustment_updates_levels_and_logs_a_movement() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt(vec![Role::ADMIN]);
    let (id, _, _) = srv.stocked_record(&token, "Widget", json!({})).await;

    let (status, _) = srv
        .post(
            &token,
            &format!("/inventory/{id}/adjust"),
            json!({ "quantity_change": 100, "movement_type": "STOCK_IN", "reason": "initial" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = srv
        .post(&token, &format!("/inventory/{id}/reserve"), json!({ "quantity": 20 }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = srv
        .post(
            &token,
            &format!("/inventory/{id}/adjust"),
            json!({ "quantity_change": -15, "movement_type": "stock_out", "reason": "allocation" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["quantity"], "85");
    assert_eq!(body["data"]["reserved_qty"], "20");
    assert_eq!(body["data"]["available_qty"], "65");
    assert_eq!(body["data"]["movement"]["quantity_change"], "-15");
    assert_eq!(body["data"]["movement"]["movement_type"], "STOCK_OUT");

    let (status, history) = srv.get(&token, &format!("/inventory/{id}/movements")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["data"].as_array().unwrap().len(), 2);

    let (status, report) = srv.get(&token, &format!("/inventory/{id}/reconcile")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["data"]["consistent"], true);
    assert_eq!(report["data"]["ledger_total"], "85");
    assert_eq!(report["data"]["movement_count"], 2);
}

#[tokio::test]
async fn only_elevated_roles_can_adjust() {
    let srv = TestServer::spawn().await;
    let admin = mint_jwt(vec![Role::ADMIN]);
    let viewer = mint_jwt(vec![Role::VIEWER]);
    let manager = mint_jwt(vec![Role::MANAGER]);
    let (id, _, _) = srv.stocked_record(&admin, "Gadget", json!({})).await;

    let adjust = json!({ "quantity_change": 5, "movement_type": "STOCK_IN" });
    let (status, body) = srv.post(&viewer, &format!("/inventory/{id}/adjust"), adjust.clone()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, _) = srv.get(&viewer, &format!("/inventory/{id}")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = srv.post(&manager, &format!("/inventory/{id}/adjust"), adjust).await;
    assert_eq!(status, StatusCode::OK);

    let (status, history) = srv.get(&viewer, &format!("/inventory/{id}/movements")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn rejected_adjustments_map_to_error_envelopes() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt(vec![Role::ADMIN]);
    let (id, _, _) = srv.stocked_record(&token, "Sprocket", json!({})).await;

    let (status, body) = srv
        .post(
            &token,
            &format!("/inventory/{id}/adjust"),
            json!({ "quantity_change": 0, "movement_type": "ADJUSTMENT" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_argument");

    let (status, body) = srv
        .post(
            &token,
            &format!("/inventory/{id}/adjust"),
            json!({ "quantity_change": 3, "movement_type": "TELEPORT" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_argument");

    let (status, body) = srv
        .post(
            &token,
            &format!("/inventory/{id}/adjust"),
            json!({ "quantity_change": -1, "movement_type": "STOCK_OUT" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invariant_violation");

    let (status, body) = srv
        .post(
            &token,
            "/inventory/not-a-uuid/adjust",
            json!({ "quantity_change": 1, "movement_type": "STOCK_IN" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_argument");

    let missing = stockbook_core::InventoryId::new();
    let (status, body) = srv
        .post(
            &token,
            &format!("/inventory/{missing}/adjust"),
            json!({ "quantity_change": 1, "movement_type": "STOCK_IN" }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    for too_precise in ["0.00001", "0.00006"] {
        let (status, body) = srv
            .post(
                &token,
                &format!("/inventory/{id}/adjust"),
                json!({ "quantity_change": too_precise, "movement_type": "STOCK_IN" }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{too_precise}");
        assert_eq!(body["error"], "invalid_argument");
    }

    let (_, history) = srv.get(&token, &format!("/inventory/{id}/movements")).await;
    assert!(history["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn allow_negative_policy_accepts_backorders() {
    let srv = TestServer::spawn_with(StockPolicy::AllowNegative).await;
    let token = mint_jwt(vec![Role::ADMIN]);
    let (id, _, _) = srv.stocked_record(&token, "Backorder", json!({})).await;

    let (status, body) = srv
        .post(
            &token,
            &format!("/inventory/{id}/adjust"),
            json!({ "quantity_change": -4, "movement_type": "STOCK_OUT" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["quantity"], "-4");
}

#[tokio::test]
async fn low_stock_boundary_is_inclusive() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt(vec![Role::ADMIN]);
    let thresholds = json!({ "min_stock_level": 10 });

    let (at_min, _, _) = srv.stocked_record(&token, "AtMin", thresholds.clone()).await;
    let (above_min, _, _) = srv.stocked_record(&token, "AboveMin", thresholds.clone()).await;
    let (critical, _, _) = srv.stocked_record(&token, "Critical", thresholds).await;

    for (id, qty) in [(&at_min, 10), (&above_min, 11), (&critical, 5)] {
        let (status, _) = srv
            .post(
                &token,
                &format!("/inventory/{id}/adjust"),
                json!({ "quantity_change": qty, "movement_type": "STOCK_IN" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = srv.get(&token, "/inventory/low-stock").await;
    assert_eq!(status, StatusCode::OK);
    let rows = body["data"].as_array().unwrap();
    let ids: Vec<&str> = rows.iter().map(|r| r["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec![critical.as_str(), at_min.as_str()]);
    assert_eq!(rows[0]["status"], "critical");
    assert_eq!(rows[1]["status"], "low");

    let (_, body) = srv.get(&token, "/inventory/low-stock?critical=true").await;
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![critical.as_str()]);

    let (_, body) = srv.get(&token, "/inventory?low_stock=true&search=min").await;
    let names: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["product"]["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["AtMin"]);
}

#[tokio::test]
async fn transfer_moves_stock_between_sites() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt(vec![Role::ADMIN]);
    let (source, product_id, site_id) = srv.stocked_record(&token, "Crate", json!({})).await;

    let annex = SiteId::new().to_string();
    let (status, _) = srv
        .put(&token, &format!("/catalog/sites/{annex}"), json!({ "code": "ANNEX", "name": "Annex" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    srv.post(
        &token,
        &format!("/inventory/{source}/adjust"),
        json!({ "quantity_change": 30, "movement_type": "STOCK_IN" }),
    )
    .await;

    let (status, body) = srv
        .post(
            &token,
            "/inventory/transfers",
            json!({
                "product_id": product_id,
                "from_site_id": site_id,
                "to_site_id": annex,
                "quantity": 12,
                "reason": "rebalance",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["source"]["quantity"], "18");
    assert_eq!(body["data"]["destination"]["quantity"], "12");
    let movements = body["data"]["movements"].as_array().unwrap();
    assert_eq!(movements[0]["movement_type"], "TRANSFER_OUT");
    assert_eq!(movements[1]["movement_type"], "TRANSFER_IN");
    assert_eq!(movements[0]["reference_id"], body["data"]["reference_id"]);
    assert_eq!(movements[1]["reference_id"], body["data"]["reference_id"]);

    let (_, listed) = srv.get(&token, &format!("/inventory?site_id={annex}")).await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn opening_an_existing_pair_returns_it() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt(vec![Role::ADMIN]);
    let (id, product_id, site_id) = srv.stocked_record(&token, "Bolt", json!({})).await;

    let (status, body) = srv
        .post(&token, "/inventory", json!({ "product_id": product_id, "site_id": site_id }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], id.as_str());

    let (status, body) = srv
        .post(&token, "/inventory", json!({ "product_id": ProductId::new(), "site_id": site_id }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}
