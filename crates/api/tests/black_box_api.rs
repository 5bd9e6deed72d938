use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

use wms_core::{LocationId, ProductId};
use wms_infra::{InMemoryDirectory, InMemoryWarehouseStore, Warehouse};

const TOKEN: &str = "hook-secret";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    product: Uuid,
    location: Uuid,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let product = Uuid::now_v7();
        let location = Uuid::now_v7();
        let directory = InMemoryDirectory::new();
        directory
            .register_product(ProductId::from_uuid(product), true)
            .unwrap();
        directory
            .register_location(LocationId::from_uuid(location), true)
            .unwrap();
        let warehouse = Arc::new(Warehouse::new(InMemoryWarehouseStore::new(), directory));

        // Same router as prod, bound to an ephemeral port.
        let app = wms_api::app::build_app_with(warehouse, Some(TOKEN.to_string()));
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
            product,
            location,
            handle,
        }
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let res = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("x-actor", "clerk-7")
            .header("x-webhook-token", TOKEN)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let res = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    /// Receive `quantity` units through an inbound document.
    async fn stock(&self, quantity: i64) {
        let (status, doc) = self
            .post(
                "/inbound",
                json!({
                    "supplier": "Acme",
                    "lines": [{
                        "product_id": self.product,
                        "location_id": self.location,
                        "expected_quantity": quantity
                    }]
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{doc}");
        let id = doc["id"].as_str().unwrap();
        let line_id = doc["lines"][0]["id"].clone();
        let (status, received) = self
            .post(
                &format!("/inbound/{id}/receive"),
                json!({
                    "lines": [{
                        "line_id": line_id,
                        "received_quantity": quantity,
                        "damaged_quantity": 0
                    }]
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{received}");
    }

    async fn outbound(&self, quantity: i64) -> String {
        let (status, doc) = self
            .post(
                "/outbound",
                json!({
                    "customer": "Globex",
                    "lines": [{
                        "product_id": self.product,
                        "location_id": self.location,
                        "ordered_quantity": quantity
                    }]
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{doc}");
        doc["id"].as_str().unwrap().to_string()
    }

    async fn balance(&self) -> Value {
        let (status, body) = self
            .get(&format!(
                "/inventory/balances/{}/{}",
                self.product, self.location
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        body
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[tokio::test]
async fn health_is_public() {
    let server = TestServer::spawn().await;
    let (status, body) = server.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn prepaid_order_ships_after_gateway_confirmation() {
    let server = TestServer::spawn().await;
    server.stock(100).await;
    assert_eq!(server.balance().await["quantity_on_hand"], 100);

    let outbound = server.outbound(10).await;
    let (status, payment) = server
        .post(
            "/payments",
            json!({
                "outbound_id": outbound,
                "payment_type": "Prepaid",
                "amount": 4990,
                "currency": "EUR",
                "external_payment_id": "gw-123"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{payment}");
    assert!(payment["number"].as_str().unwrap().starts_with("PAY-"));

    let (status, picked) = server.post(&format!("/outbound/{outbound}/pick"), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{picked}");
    assert_eq!(picked["status"], "Picked");
    assert_eq!(server.balance().await["quantity_available"], 90);

    let (status, blocked) = server.post(&format!("/outbound/{outbound}/ship"), json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(blocked["error"], "business_rule_violation");

    let (status, hook) = server
        .post(
            "/webhooks/payments",
            json!({
                "externalPaymentId": "gw-123",
                "gatewayEventId": "evt-1",
                "status": "Confirmed",
                "eventData": { "amount": 4990 }
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(hook["success"], true);
    assert_eq!(hook["outcome"], "processed");

    let (status, shipped) = server.post(&format!("/outbound/{outbound}/ship"), json!({})).await;
    assert_eq!(status, StatusCode::OK, "{shipped}");
    assert_eq!(shipped["status"], "Shipped");

    let balance = server.balance().await;
    assert_eq!(balance["quantity_on_hand"], 90);
    assert_eq!(balance["quantity_reserved"], 0);

    let (_, ledger) = server
        .get(&format!(
            "/inventory/ledger/{}/{}",
            server.product, server.location
        ))
        .await;
    assert_eq!(ledger["entries"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn duplicate_payment_webhook_is_acknowledged_once() {
    let server = TestServer::spawn().await;
    server.stock(5).await;
    let outbound = server.outbound(1).await;
    let (_, payment) = server
        .post(
            "/payments",
            json!({
                "outbound_id": outbound,
                "payment_type": "COD",
                "amount": 100,
                "currency": "EUR",
                "external_payment_id": "gw-dup"
            }),
        )
        .await;

    let notice = json!({
        "externalPaymentId": "gw-dup",
        "gatewayEventId": "evt-dup",
        "status": "Confirmed",
        "eventData": {}
    });
    let (_, first) = server.post("/webhooks/payments", notice.clone()).await;
    let (status, second) = server.post("/webhooks/payments", notice).await;
    assert_eq!(first["outcome"], "processed");
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["outcome"], "duplicate");
    assert_eq!(second["success"], true);

    let (_, stored) = server
        .get(&format!("/payments/{}", payment["id"].as_str().unwrap()))
        .await;
    assert_eq!(stored["status"], "Confirmed");
}

#[tokio::test]
async fn webhooks_require_the_shared_token() {
    let server = TestServer::spawn().await;
    let res = server
        .client
        .post(format!("{}/webhooks/deliveries", server.base_url))
        .json(&json!({ "trackingNumber": "TRK-1", "partnerEventId": "p-1", "status": "InTransit" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_tracking_number_is_not_an_http_error() {
    let server = TestServer::spawn().await;
    let (status, body) = server
        .post(
            "/webhooks/deliveries",
            json!({ "trackingNumber": "TRK-404", "partnerEventId": "p-1", "status": "InTransit" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["outcome"], "not_found");
}

#[tokio::test]
async fn webhook_without_event_id_is_rejected() {
    let server = TestServer::spawn().await;
    let (status, body) = server
        .post(
            "/webhooks/deliveries",
            json!({ "trackingNumber": "TRK-1", "status": "InTransit" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "missing_field");
}

#[tokio::test]
async fn delivery_tracking_follows_partner_updates() {
    let server = TestServer::spawn().await;
    server.stock(5).await;
    let outbound = server.outbound(2).await;
    let (status, delivery) = server
        .post(
            "/deliveries",
            json!({ "outbound_id": outbound, "tracking_number": "TRK-9", "carrier": "DHL" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{delivery}");

    let (_, hook) = server
        .post(
            "/webhooks/deliveries",
            json!({
                "trackingNumber": "TRK-9",
                "partnerEventId": "p-1",
                "status": "in_transit",
                "currentLocation": "Hub A"
            }),
        )
        .await;
    assert_eq!(hook["outcome"], "processed");

    let (_, stored) = server
        .get(&format!("/deliveries/{}", delivery["id"].as_str().unwrap()))
        .await;
    assert_eq!(stored["status"], "InTransit");
    assert_eq!(stored["current_location"], "Hub A");
}

#[tokio::test]
async fn lookups_report_bad_and_unknown_ids() {
    let server = TestServer::spawn().await;
    let (status, body) = server.get("/outbound/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_id");

    let (status, body) = server.get(&format!("/inbound/{}", Uuid::now_v7())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn outbound_beyond_available_stock_lists_the_shortage() {
    let server = TestServer::spawn().await;
    server.stock(3).await;
    let (status, body) = server
        .post(
            "/outbound",
            json!({
                "lines": [{
                    "product_id": server.product,
                    "location_id": server.location,
                    "ordered_quantity": 4
                }]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_lines");
    assert!(body["errors"][0]
        .as_str()
        .unwrap()
        .contains("requested 4, available 3"));
}

#[tokio::test]
async fn malformed_pick_body_is_rejected_without_reserving() {
    let server = TestServer::spawn().await;
    server.stock(20).await;
    let outbound = server.outbound(20).await;
    let (_, doc) = server.get(&format!("/outbound/{outbound}")).await;
    let line_id = doc["lines"][0]["id"].clone();

    let (status, body) = server
        .post(
            &format!("/outbound/{outbound}/pick"),
            json!({
                "lines": [{ "line_id": line_id, "picked_quantity": "5" }],
                "expected_version": 99
            }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_body");

    let (_, doc) = server.get(&format!("/outbound/{outbound}")).await;
    assert_eq!(doc["status"], "Pending");
    assert_eq!(server.balance().await["quantity_reserved"], 0);

    let (status, _) = server
        .post(
            &format!("/outbound/{outbound}/pick"),
            json!({ "expected_version": 99 }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}
