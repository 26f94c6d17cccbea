//! Router served while the Slack secrets are missing. Keeps the process
//! healthy for the host and tells Slack (and operators) nothing is wired yet.

use axum::{
    routing::{get, post},
    Router,
};
use tracing::warn;

use crate::{health, receiver::EVENTS_PATH};

pub const UNCONFIGURED_EVENTS_BODY: &str = "Slack app not configured yet";

pub fn router(missing: Vec<&'static str>) -> Router {
    Router::new()
        .route(health::HEALTH_PATH, get(health::unconfigured))
        .route(EVENTS_PATH, post(move || unconfigured_events(missing.clone())))
}

async fn unconfigured_events(missing: Vec<&'static str>) -> &'static str {
    warn!(
        event_name = "system.degraded.events_received",
        correlation_id = "degraded",
        missing = %missing.join(","),
        "Received /slack/events but Slack env vars are missing"
    );
    UNCONFIGURED_EVENTS_BODY
}
