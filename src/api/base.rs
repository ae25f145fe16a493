use axum::extract::State;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::cluster::membership::MemberReport;
use crate::limiter::service::LimiterStatus;
use crate::node::{Node, NodeName};
use crate::settings::{APP_NAME, APP_VERSION};
use crate::singleton::registry::SingletonHandle;

// basic handler that responds with a static string
pub async fn root() -> &'static str {
    "Welcome to Turnstile"
}

pub async fn health() -> &'static str {
    "OK"
}

#[derive(Serialize, Deserialize)]
pub struct AboutResponse {
    name: String,
    version: String,
}

impl Default for AboutResponse {
    fn default() -> Self {
        Self {
            name: APP_NAME.to_string(),
            version: APP_VERSION.to_string(),
        }
    }
}

#[instrument]
pub async fn about() -> axum::Json<AboutResponse> {
    axum::Json(AboutResponse::default())
}

#[derive(Serialize)]
pub struct StatusReport {
    pub node: NodeName,
    pub is_owner: bool,
    pub owner: Option<SingletonHandle>,
    pub window: Option<LimiterStatus>,
    pub members: Vec<MemberReport>,
}

#[instrument(skip(node), level = "debug")]
pub async fn status(State(node): State<Node>) -> axum::Json<StatusReport> {
    let owner = node.registry.lookup(&node.settings.singleton_name).await;
    let active = node.slot.active().await;
    let window = match &active {
        Some(active) => active.handle.status().await.ok(),
        None => None,
    };
    axum::Json(StatusReport {
        node: node.name().clone(),
        is_owner: active.is_some(),
        owner,
        window,
        members: node.membership.members().await,
    })
}
