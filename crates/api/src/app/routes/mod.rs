use axum::Router;

use wms_infra::{Directory, WarehouseStore};

pub mod deliveries;
pub mod inbound;
pub mod inventory;
pub mod outbound;
pub mod payments;
pub mod system;
pub mod webhooks;

/// Router for all document and stock endpoints (actor-scoped).
pub fn router<S, D>() -> Router
where
    S: WarehouseStore,
    D: Directory,
{
    Router::new()
        .nest("/inbound", inbound::router::<S, D>())
        .nest("/outbound", outbound::router::<S, D>())
        .nest("/payments", payments::router::<S, D>())
        .nest("/deliveries", deliveries::router::<S, D>())
        .nest("/inventory", inventory::router::<S, D>())
}
