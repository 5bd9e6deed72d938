//! HTTP application wiring (Axum router + warehouse wiring).
//!
//! - `services.rs`: storage and directory backends
//! - `routes/`: HTTP routes + handlers (one file per document type)
//! - `dto.rs`: request bodies and JSON views
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use wms_infra::{Directory, Warehouse, WarehouseStore};

use crate::config::AppConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod extract;
pub mod routes;
pub mod services;

/// Build the full HTTP router for the configured backend (used by `main.rs`).
pub async fn build_app(config: &AppConfig) -> anyhow::Result<Router> {
    let token = config.webhook_token.clone();
    if token.is_none() {
        tracing::warn!("WMS_WEBHOOK_TOKEN not set; webhook endpoints are unauthenticated");
    }
    let app = match &config.database_url {
        Some(url) => build_app_with(Arc::new(services::postgres(url).await?), token),
        None => build_app_with(
            Arc::new(services::in_memory(config.directory_seed.as_deref())?),
            token,
        ),
    };
    Ok(app)
}

/// Router over an already-built warehouse.
pub fn build_app_with<S, D>(warehouse: Arc<Warehouse<S, D>>, webhook_token: Option<String>) -> Router
where
    S: WarehouseStore,
    D: Directory,
{
    let auth_state = middleware::WebhookAuthState {
        token: webhook_token.map(Arc::from),
    };

    let webhooks = routes::webhooks::router::<S, D>().layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::webhook_auth_middleware,
    ));

    let documents = routes::router::<S, D>().layer(axum::middleware::from_fn(
        middleware::actor_middleware,
    ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(documents)
        .nest("/webhooks", webhooks)
        .layer(Extension(warehouse))
        .layer(ServiceBuilder::new())
}
