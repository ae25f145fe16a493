use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{event, instrument, Level};

use crate::dispatch::RateDecision;
use crate::limiter::counter_store::Verdict;
use crate::node::Node;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckRateResponse {
    pub key: String,
    pub result: Verdict,
    pub calls_remaining: u32,
    pub window_id: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuotaProbeResponse {
    pub key: String,
    pub calls_remaining: u32,
    pub window_id: u64,
}

#[instrument(skip(node), level = "debug")]
pub async fn rate_limit(Path(key): Path<String>, State(node): State<Node>) -> Response {
    match node.check_rate(&key).await {
        RateDecision::Allowed {
            calls_remaining,
            window_id,
        } => (
            StatusCode::OK,
            Json(CheckRateResponse {
                key,
                result: Verdict::Allowed,
                calls_remaining,
                window_id,
            }),
        )
            .into_response(),
        RateDecision::Denied { window_id } => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(CheckRateResponse {
                key,
                result: Verdict::Denied,
                calls_remaining: 0,
                window_id,
            }),
        )
            .into_response(),
        RateDecision::Unavailable => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

#[instrument(skip(node), level = "debug")]
pub async fn check_limit(
    Path(key): Path<String>,
    State(node): State<Node>,
) -> Result<Json<QuotaProbeResponse>, StatusCode> {
    node.peek_rate(&key)
        .await
        .map(|probe| {
            Json(QuotaProbeResponse {
                key,
                calls_remaining: probe.calls_remaining,
                window_id: probe.window_id,
            })
        })
        .map_err(|err| {
            event!(
                Level::ERROR,
                message = "Failed checking limit",
                err = format!("{:?}", err)
            );
            StatusCode::SERVICE_UNAVAILABLE
        })
}
