use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use wms_core::InboundId;
use wms_infra::{Directory, Warehouse, WarehouseStore};

use crate::app::extract::OptionalJson;
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router<S, D>() -> Router
where
    S: WarehouseStore,
    D: Directory,
{
    Router::new()
        .route("/", post(create_inbound::<S, D>))
        .route("/:id", get(get_inbound::<S, D>))
        .route("/:id/receive", post(receive_inbound::<S, D>))
        .route("/:id/cancel", post(cancel_inbound::<S, D>))
}

pub async fn create_inbound<S, D>(
    Extension(warehouse): Extension<Arc<Warehouse<S, D>>>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<dto::CreateInboundRequest>,
) -> axum::response::Response
where
    S: WarehouseStore,
    D: Directory,
{
    match warehouse.create_inbound(body, actor.actor()).await {
        Ok(doc) => (StatusCode::CREATED, Json(dto::inbound_json(&doc))).into_response(),
        Err(e) => errors::flow_error_to_response(e),
    }
}

pub async fn get_inbound<S, D>(
    Extension(warehouse): Extension<Arc<Warehouse<S, D>>>,
    Path(id): Path<String>,
) -> axum::response::Response
where
    S: WarehouseStore,
    D: Directory,
{
    let id: InboundId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match warehouse.get_inbound(id).await {
        Ok(doc) => Json(dto::inbound_json(&doc)).into_response(),
        Err(e) => errors::flow_error_to_response(e),
    }
}

pub async fn receive_inbound<S, D>(
    Extension(warehouse): Extension<Arc<Warehouse<S, D>>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReceiveInboundRequest>,
) -> axum::response::Response
where
    S: WarehouseStore,
    D: Directory,
{
    let id: InboundId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let expected = dto::expected(body.expected_version);
    match warehouse
        .receive_inbound(id, body.receipt, expected, actor.actor())
        .await
    {
        Ok(doc) => Json(dto::inbound_json(&doc)).into_response(),
        Err(e) => errors::flow_error_to_response(e),
    }
}

pub async fn cancel_inbound<S, D>(
    Extension(warehouse): Extension<Arc<Warehouse<S, D>>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    OptionalJson(body): OptionalJson<dto::VersionedRequest>,
) -> axum::response::Response
where
    S: WarehouseStore,
    D: Directory,
{
    let id: InboundId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match warehouse
        .cancel_inbound(id, dto::expected(body.expected_version), actor.actor())
        .await
    {
        Ok(doc) => Json(dto::inbound_json(&doc)).into_response(),
        Err(e) => errors::flow_error_to_response(e),
    }
}
