use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use wms_core::DeliveryId;
use wms_infra::{Directory, Warehouse, WarehouseStore};

use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router<S, D>() -> Router
where
    S: WarehouseStore,
    D: Directory,
{
    Router::new()
        .route("/", post(create_delivery::<S, D>))
        .route("/:id", get(get_delivery::<S, D>))
}

pub async fn create_delivery<S, D>(
    Extension(warehouse): Extension<Arc<Warehouse<S, D>>>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<dto::CreateDeliveryRequest>,
) -> axum::response::Response
where
    S: WarehouseStore,
    D: Directory,
{
    match warehouse.create_delivery(body, actor.actor()).await {
        Ok(delivery) => {
            (StatusCode::CREATED, Json(dto::delivery_json(&delivery))).into_response()
        }
        Err(e) => errors::flow_error_to_response(e),
    }
}

pub async fn get_delivery<S, D>(
    Extension(warehouse): Extension<Arc<Warehouse<S, D>>>,
    Path(id): Path<String>,
) -> axum::response::Response
where
    S: WarehouseStore,
    D: Directory,
{
    let id: DeliveryId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match warehouse.get_delivery(id).await {
        Ok(delivery) => Json(dto::delivery_json(&delivery)).into_response(),
        Err(e) => errors::flow_error_to_response(e),
    }
}
