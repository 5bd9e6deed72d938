//! Partner-facing callbacks. Every processed request answers `200` with an
//! outcome envelope so partners stop retrying; only malformed payloads fail.

use std::sync::Arc;

use axum::{extract::Extension, response::IntoResponse, routing::post, Json, Router};
use serde_json::Value as JsonValue;

use wms_core::WebhookOutcome;
use wms_infra::{DeliveryWebhook, Directory, PaymentWebhook, Warehouse, WarehouseStore};

use crate::app::errors;

pub fn router<S, D>() -> Router
where
    S: WarehouseStore,
    D: Directory,
{
    Router::new()
        .route("/payments", post(payment_webhook::<S, D>))
        .route("/deliveries", post(delivery_webhook::<S, D>))
}

pub async fn payment_webhook<S, D>(
    Extension(warehouse): Extension<Arc<Warehouse<S, D>>>,
    Json(body): Json<PaymentWebhook>,
) -> axum::response::Response
where
    S: WarehouseStore,
    D: Directory,
{
    match warehouse.process_payment_webhook(body).await {
        Ok(outcome) => Json(envelope(&outcome)).into_response(),
        Err(e) => errors::flow_error_to_response(e),
    }
}

pub async fn delivery_webhook<S, D>(
    Extension(warehouse): Extension<Arc<Warehouse<S, D>>>,
    Json(body): Json<DeliveryWebhook>,
) -> axum::response::Response
where
    S: WarehouseStore,
    D: Directory,
{
    match warehouse.process_delivery_webhook(body).await {
        Ok(outcome) => Json(envelope(&outcome)).into_response(),
        Err(e) => errors::flow_error_to_response(e),
    }
}

fn envelope(outcome: &WebhookOutcome) -> JsonValue {
    let mut body = serde_json::to_value(outcome).unwrap_or_else(|_| serde_json::json!({}));
    if let JsonValue::Object(map) = &mut body {
        map.insert("success".to_string(), JsonValue::Bool(outcome.is_success()));
        map.insert("message".to_string(), JsonValue::String(outcome.message()));
    }
    body
}
