use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::scheduler::{Scheduler, StatsSnapshot};
use crate::queue::{Dispatcher, QueueName};
use crate::version::VERSION;

pub struct StatusState {
    pub scheduler: Scheduler,
    pub dispatcher: Arc<Dispatcher>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub version: &'static str,
    pub in_flight: usize,
    pub stats: StatsSnapshot,
    pub queues: BTreeMap<QueueName, usize>,
}

pub fn create_status_router(state: Arc<StatusState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/status", get(status))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn status(State(state): State<Arc<StatusState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: VERSION,
        in_flight: state.scheduler.in_flight(),
        stats: state.scheduler.stats().snapshot(),
        queues: state.dispatcher.depths(),
    })
}
