/// Node-to-node endpoints backing the peer transport. These are NOT part of
/// the public API - other turnstile nodes are the only callers.
use axum::{
    extract::{Path, State},
    Json,
};
use tracing::instrument;

use crate::cluster::messages::{
    AnnounceAck, IncrementRequest, IncrementResponse, LookupResponse, PeekRequest, PeekResponse,
    RegistryUpdate,
};
use crate::error::TurnstileError;
use crate::limiter::service::{serve_increment, serve_peek};
use crate::node::Node;
use crate::singleton::registry::Applied;

#[instrument(skip(node), level = "debug")]
pub async fn increment(
    State(node): State<Node>,
    Json(request): Json<IncrementRequest>,
) -> Result<Json<IncrementResponse>, TurnstileError> {
    serve_increment(&node.slot, request).await.map(Json)
}

#[instrument(skip(node), level = "debug")]
pub async fn peek(
    State(node): State<Node>,
    Json(request): Json<PeekRequest>,
) -> Result<Json<PeekResponse>, TurnstileError> {
    serve_peek(&node.slot, request).await.map(Json)
}

#[instrument(skip(node), level = "debug")]
pub async fn announce(
    State(node): State<Node>,
    Json(update): Json<RegistryUpdate>,
) -> Json<AnnounceAck> {
    let applied = node.registry.apply(update).await;
    Json(AnnounceAck {
        applied: applied == Applied::Accepted,
    })
}

#[instrument(skip(node), level = "debug")]
pub async fn lookup(State(node): State<Node>, Path(name): Path<String>) -> Json<LookupResponse> {
    Json(LookupResponse {
        handle: node.registry.lookup(&name).await,
    })
}
