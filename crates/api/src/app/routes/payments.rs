use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use wms_core::PaymentId;
use wms_infra::{Directory, PaymentAction, Warehouse, WarehouseStore};

use crate::app::extract::OptionalJson;
use crate::app::{dto, errors};
use crate::context::ActorContext;

pub fn router<S, D>() -> Router
where
    S: WarehouseStore,
    D: Directory,
{
    Router::new()
        .route("/", post(create_payment::<S, D>))
        .route("/:id", get(get_payment::<S, D>))
        .route("/:id/confirm", post(confirm_payment::<S, D>))
        .route("/:id/fail", post(fail_payment::<S, D>))
        .route("/:id/cancel", post(cancel_payment::<S, D>))
}

/// Create a payment and link it to its outbound document.
pub async fn create_payment<S, D>(
    Extension(warehouse): Extension<Arc<Warehouse<S, D>>>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<dto::CreatePaymentRequest>,
) -> axum::response::Response
where
    S: WarehouseStore,
    D: Directory,
{
    match warehouse.create_payment(body, actor.actor()).await {
        Ok(payment) => (StatusCode::CREATED, Json(dto::payment_json(&payment))).into_response(),
        Err(e) => errors::flow_error_to_response(e),
    }
}

pub async fn get_payment<S, D>(
    Extension(warehouse): Extension<Arc<Warehouse<S, D>>>,
    Path(id): Path<String>,
) -> axum::response::Response
where
    S: WarehouseStore,
    D: Directory,
{
    let id: PaymentId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match warehouse.get_payment(id).await {
        Ok(payment) => Json(dto::payment_json(&payment)).into_response(),
        Err(e) => errors::flow_error_to_response(e),
    }
}

pub async fn confirm_payment<S, D>(
    Extension(warehouse): Extension<Arc<Warehouse<S, D>>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    OptionalJson(body): OptionalJson<dto::PaymentTransitionRequest>,
) -> axum::response::Response
where
    S: WarehouseStore,
    D: Directory,
{
    transition(warehouse, actor, id, PaymentAction::Confirm, body).await
}

pub async fn fail_payment<S, D>(
    Extension(warehouse): Extension<Arc<Warehouse<S, D>>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    OptionalJson(body): OptionalJson<dto::PaymentTransitionRequest>,
) -> axum::response::Response
where
    S: WarehouseStore,
    D: Directory,
{
    transition(warehouse, actor, id, PaymentAction::Fail, body).await
}

pub async fn cancel_payment<S, D>(
    Extension(warehouse): Extension<Arc<Warehouse<S, D>>>,
    Extension(actor): Extension<ActorContext>,
    Path(id): Path<String>,
    OptionalJson(body): OptionalJson<dto::PaymentTransitionRequest>,
) -> axum::response::Response
where
    S: WarehouseStore,
    D: Directory,
{
    transition(warehouse, actor, id, PaymentAction::Cancel, body).await
}

async fn transition<S, D>(
    warehouse: Arc<Warehouse<S, D>>,
    actor: ActorContext,
    id: String,
    action: PaymentAction,
    body: dto::PaymentTransitionRequest,
) -> axum::response::Response
where
    S: WarehouseStore,
    D: Directory,
{
    let id: PaymentId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let expected = dto::expected(body.expected_version);
    match warehouse
        .transition_payment(id, action, body.notes, expected, actor.actor())
        .await
    {
        Ok(payment) => Json(dto::payment_json(&payment)).into_response(),
        Err(e) => errors::flow_error_to_response(e),
    }
}
