use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use wms_core::{LocationId, ProductId};
use wms_infra::{Directory, Warehouse, WarehouseStore};
use wms_inventory::StockKey;

use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router<S, D>() -> Router
where
    S: WarehouseStore,
    D: Directory,
{
    Router::new()
        .route("/balances/:product_id/:location_id", get(get_balance::<S, D>))
        .route("/ledger/:product_id/:location_id", get(get_ledger::<S, D>))
        .route("/adjustments", post(adjust_stock::<S, D>))
}

fn parse_key(product_id: &str, location_id: &str) -> Result<StockKey, axum::response::Response> {
    let product: ProductId = errors::parse_id(product_id)?;
    let location: LocationId = errors::parse_id(location_id)?;
    Ok(StockKey::new(product, location))
}

pub async fn get_balance<S, D>(
    Extension(warehouse): Extension<Arc<Warehouse<S, D>>>,
    Path((product_id, location_id)): Path<(String, String)>,
) -> axum::response::Response
where
    S: WarehouseStore,
    D: Directory,
{
    let key = match parse_key(&product_id, &location_id) {
        Ok(key) => key,
        Err(resp) => return resp,
    };
    match warehouse.stock_balance(key).await {
        Ok(balance) => Json(dto::balance_json(&balance)).into_response(),
        Err(e) => errors::flow_error_to_response(e),
    }
}

pub async fn get_ledger<S, D>(
    Extension(warehouse): Extension<Arc<Warehouse<S, D>>>,
    Path((product_id, location_id)): Path<(String, String)>,
) -> axum::response::Response
where
    S: WarehouseStore,
    D: Directory,
{
    let key = match parse_key(&product_id, &location_id) {
        Ok(key) => key,
        Err(resp) => return resp,
    };
    match warehouse.stock_ledger(key).await {
        Ok(entries) => Json(dto::ledger_json(&entries)).into_response(),
        Err(e) => errors::flow_error_to_response(e),
    }
}

pub async fn adjust_stock<S, D>(
    Extension(warehouse): Extension<Arc<Warehouse<S, D>>>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<dto::AdjustStockRequest>,
) -> axum::response::Response
where
    S: WarehouseStore,
    D: Directory,
{
    match warehouse
        .adjust_stock(body.key(), body.delta, &body.reason, actor.actor())
        .await
    {
        Ok(entry) => (StatusCode::CREATED, Json(serde_json::json!(entry))).into_response(),
        Err(e) => errors::flow_error_to_response(e),
    }
}
