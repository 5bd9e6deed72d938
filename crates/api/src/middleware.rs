use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::context::ActorContext;

pub const ACTOR_HEADER: &str = "x-actor";
pub const WEBHOOK_TOKEN_HEADER: &str = "x-webhook-token";

#[derive(Clone)]
pub struct WebhookAuthState {
    /// `None` leaves webhooks unauthenticated.
    pub token: Option<Arc<str>>,
}

/// Attach the caller's [`ActorContext`] to the request.
pub async fn actor_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let actor = extract_header(req.headers(), ACTOR_HEADER)
        .map(ActorContext::new)
        .unwrap_or_default();
    req.extensions_mut().insert(actor);
    next.run(req).await
}

/// Reject webhook calls that do not carry the configured shared secret.
pub async fn webhook_auth_middleware(
    State(state): State<WebhookAuthState>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    if let Some(expected) = &state.token {
        let presented = extract_header(req.headers(), WEBHOOK_TOKEN_HEADER)
            .ok_or(StatusCode::UNAUTHORIZED)?;
        if presented != expected.as_ref() {
            return Err(StatusCode::UNAUTHORIZED);
        }
    }
    Ok(next.run(req).await)
}

fn extract_header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let value = headers.get(name)?.to_str().ok()?.trim();
    if value.is_empty() {
        return None;
    }
    Some(value)
}
