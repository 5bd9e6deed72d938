use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use wms_core::OutboundId;
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
        .route("/", post(create_outbound::<S, D>))
        .route("/:id", get(get_outbound::<S, D>))
        .route("/:id/pick", post(pick_outbound::<S, D>))
        .route("/:id/pack", post(pack_outbound::<S, D>))
        .route("/:id/ship", post(ship_outbound::<S, D>))
        .route("/:id/cancel", post(cancel_outbound::<S, D>))
}

pub async fn create_outbound<S, D>(
    Extension(warehouse): Extension<Arc<Warehouse<S, D>>>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<dto::CreateOutboundRequest>,
) -> axum::response::Response
where
    S: WarehouseStore,
    D: Directory,
{
    match warehouse.create_outbound(body, actor.actor()).await {
        Ok(doc) => (StatusCode::CREATED, Json(dto::outbound_json(&doc))).into_response(),
        Err(e) => errors::flow_error_to_response(e),
    }
}

pub async fn get_outbound<S, D>(
    Extension(warehouse): Extension<Arc<Warehouse<S, D>>>,
    Path(id): Path<String>,
) -> axum::response::Response
where
    S: WarehouseStore,
    D: Directory,
{
    let id: OutboundId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match warehouse.get_outbound(id).await {
        Ok(doc) => Json(dto::outbound_json(&doc)).into_response(),
        Err(e) => errors::flow_error_to_response(e),
    }
}

/// An empty body picks every line in full.
pub async fn pick_outbound<S, D>(
    Extension(warehouse): Extension<Arc<Warehouse<S, D>>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    OptionalJson(body): OptionalJson<dto::PickOutboundRequest>,
) -> axum::response::Response
where
    S: WarehouseStore,
    D: Directory,
{
    let id: OutboundId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let expected = dto::expected(body.expected_version);
    match warehouse
        .pick_outbound(id, body.lines, expected, actor.actor())
        .await
    {
        Ok(doc) => Json(dto::outbound_json(&doc)).into_response(),
        Err(e) => errors::flow_error_to_response(e),
    }
}

pub async fn pack_outbound<S, D>(
    Extension(warehouse): Extension<Arc<Warehouse<S, D>>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    OptionalJson(body): OptionalJson<dto::VersionedRequest>,
) -> axum::response::Response
where
    S: WarehouseStore,
    D: Directory,
{
    let id: OutboundId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match warehouse
        .pack_outbound(id, dto::expected(body.expected_version), actor.actor())
        .await
    {
        Ok(doc) => Json(dto::outbound_json(&doc)).into_response(),
        Err(e) => errors::flow_error_to_response(e),
    }
}

pub async fn ship_outbound<S, D>(
    Extension(warehouse): Extension<Arc<Warehouse<S, D>>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    OptionalJson(body): OptionalJson<dto::VersionedRequest>,
) -> axum::response::Response
where
    S: WarehouseStore,
    D: Directory,
{
    let id: OutboundId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match warehouse
        .ship_outbound(id, dto::expected(body.expected_version), actor.actor())
        .await
    {
        Ok(doc) => Json(dto::outbound_json(&doc)).into_response(),
        Err(e) => errors::flow_error_to_response(e),
    }
}

pub async fn cancel_outbound<S, D>(
    Extension(warehouse): Extension<Arc<Warehouse<S, D>>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    OptionalJson(body): OptionalJson<dto::CancelOutboundRequest>,
) -> axum::response::Response
where
    S: WarehouseStore,
    D: Directory,
{
    let id: OutboundId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let expected = dto::expected(body.expected_version);
    match warehouse
        .cancel_outbound(id, body.reason, expected, actor.actor())
        .await
    {
        Ok(doc) => Json(dto::outbound_json(&doc)).into_response(),
        Err(e) => errors::flow_error_to_response(e),
    }
}
