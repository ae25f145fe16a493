mod base;
mod cluster;
mod rate_limits;

use std::borrow::Cow;

use axum::{
    error_handling::HandleErrorLayer, http::StatusCode, response::IntoResponse, routing, Router,
};
use tokio::time::Duration;
use tower::{BoxError, ServiceBuilder};
use tower_http::trace::TraceLayer;

pub mod paths;

use crate::error::Result;
use crate::node::Node;

/// Build the API around one assembled node.
pub async fn api(node: Node) -> Result<Router> {
    // Endpoints
    let api = Router::new()
        .route(paths::base::ROOT, routing::get(base::root))
        .route(paths::base::HEALTH, routing::get(base::health))
        .route(paths::base::ABOUT, routing::get(base::about))
        .route(paths::base::STATUS, routing::get(base::status))
        // Public rate limiting surface
        .route(paths::rate_limits::LIMIT, routing::post(rate_limits::rate_limit))
        .route(paths::rate_limits::CHECK, routing::get(rate_limits::check_limit))
        // Node-to-node transport surface
        .route(paths::internal::INCREMENT, routing::post(cluster::increment))
        .route(paths::internal::PEEK, routing::post(cluster::peek))
        .route(paths::internal::ANNOUNCE, routing::post(cluster::announce))
        .route(paths::internal::LOOKUP, routing::get(cluster::lookup))
        .layer(
            ServiceBuilder::new()
                // Handle errors from middleware
                .layer(HandleErrorLayer::new(handle_error))
                .load_shed()
                .timeout(Duration::from_secs(10)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(node);

    Ok(api)
}

async fn handle_error(error: BoxError) -> impl IntoResponse {
    if error.is::<tower::timeout::error::Elapsed>() {
        return (StatusCode::REQUEST_TIMEOUT, Cow::from("request timed out"));
    }

    if error.is::<tower::load_shed::error::Overloaded>() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Cow::from("service is overloaded, try again later"),
        );
    }

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Cow::from(format!("Unhandled internal error: {}", error)),
    )
}
