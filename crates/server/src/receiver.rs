use std::{future::Future, sync::Arc, time::Duration};

use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use budzy_slack::{
    api::SlackApi,
    commands::AckResponder,
    events::{EventContext, EventDispatcher, SlackEnvelope, SlackEvent},
    webhook::{
        parse_payload, InboundPayload, SignatureVerifier, RETRY_NUM_HEADER, SIGNATURE_HEADER,
        TIMESTAMP_HEADER,
    },
};
use serde_json::json;
use tokio::{sync::Mutex, task::JoinSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const EVENTS_PATH: &str = "/slack/events";

/// Slack shows the user an error if a slash command is not acknowledged in time.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(3);

/// Handler tasks that outlive the HTTP response, kept so shutdown can wait
/// for replies already in flight.
#[derive(Clone, Default)]
pub struct InFlightTasks {
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl InFlightTasks {
    pub async fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().await;
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    /// Waits up to `grace` for every tracked task and returns how many were
    /// still running when the wait began. Stragglers are aborted.
    pub async fn drain(&self, grace: Duration) -> usize {
        let mut tasks = std::mem::take(&mut *self.tasks.lock().await);
        while tasks.try_join_next().is_some() {}
        let pending = tasks.len();
        if tokio::time::timeout(grace, async { while tasks.join_next().await.is_some() {} })
            .await
            .is_err()
        {
            warn!(
                event_name = "system.server.drain_timeout",
                correlation_id = "shutdown",
                remaining = tasks.len(),
                "aborting handler tasks still running after grace period"
            );
            tasks.abort_all();
        }
        pending
    }
}

#[derive(Clone)]
pub struct ReceiverState {
    verifier: Arc<SignatureVerifier>,
    dispatcher: Arc<EventDispatcher>,
    api: Arc<dyn SlackApi>,
    ack_timeout: Duration,
    tasks: InFlightTasks,
}

impl ReceiverState {
    pub fn new(
        verifier: SignatureVerifier,
        dispatcher: EventDispatcher,
        api: Arc<dyn SlackApi>,
    ) -> Self {
        Self {
            verifier: Arc::new(verifier),
            dispatcher: Arc::new(dispatcher),
            api,
            ack_timeout: ACK_TIMEOUT,
            tasks: InFlightTasks::default(),
        }
    }

    pub fn with_ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.ack_timeout = ack_timeout;
        self
    }

    pub fn tasks(&self) -> InFlightTasks {
        self.tasks.clone()
    }
}

pub fn router(state: ReceiverState) -> Router {
    Router::new().route(EVENTS_PATH, post(slack_events)).with_state(state)
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

pub async fn slack_events(
    State(state): State<ReceiverState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let verified = state.verifier.verify(
        header_value(&headers, TIMESTAMP_HEADER),
        header_value(&headers, SIGNATURE_HEADER),
        &body,
    );
    if let Err(error) = verified {
        warn!(
            event_name = "slack.webhook.rejected",
            correlation_id = "unverified",
            error = %error,
            "rejected slack request with invalid signature"
        );
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let payload = match parse_payload(header_value(&headers, CONTENT_TYPE.as_str()), &body) {
        Ok(payload) => payload,
        Err(error) => {
            warn!(
                event_name = "slack.webhook.unparseable",
                correlation_id = "unparsed",
                error = %error,
                "could not decode slack request body"
            );
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    match payload {
        InboundPayload::UrlVerification { challenge } => {
            info!(
                event_name = "slack.webhook.url_verification",
                correlation_id = "url_verification",
                "answered url verification challenge"
            );
            Json(json!({ "challenge": challenge })).into_response()
        }
        InboundPayload::SslCheck => StatusCode::OK.into_response(),
        InboundPayload::Envelope(envelope) => {
            let correlation_id = if envelope.envelope_id.is_empty() {
                Uuid::new_v4().to_string()
            } else {
                envelope.envelope_id.clone()
            };
            if let Some(retry_num) = header_value(&headers, RETRY_NUM_HEADER) {
                debug!(
                    event_name = "slack.webhook.retry",
                    correlation_id = %correlation_id,
                    retry_num,
                    "slack redelivered request"
                );
            }
            receive_envelope(state, envelope, correlation_id).await
        }
    }
}

async fn receive_envelope(
    state: ReceiverState,
    envelope: SlackEnvelope,
    correlation_id: String,
) -> Response {
    match &envelope.event {
        SlackEvent::SlashCommand(command) => {
            let response_url = command.response_url.clone();
            receive_command(state, envelope, response_url, correlation_id).await
        }
        SlackEvent::AppHomeOpened(_) | SlackEvent::TeamJoin(_) => {
            let dispatcher = state.dispatcher.clone();
            state.tasks.spawn(async move {
                let ctx = EventContext { correlation_id, ..EventContext::default() };
                if let Err(error) = dispatcher.dispatch(&envelope, &ctx).await {
                    warn!(
                        event_name = "slack.event.failed",
                        correlation_id = %ctx.correlation_id,
                        user_id = envelope.event.user_id().unwrap_or("unknown"),
                        error = %error,
                        "event handler failed"
                    );
                }
            })
            .await;
            StatusCode::OK.into_response()
        }
        SlackEvent::Unsupported { event_type } => {
            debug!(
                event_name = "slack.event.ignored",
                correlation_id = %correlation_id,
                event_type = %event_type,
                "ignoring unsupported slack delivery"
            );
            StatusCode::OK.into_response()
        }
    }
}

/// Holds the HTTP response until the handler acknowledges; the handler keeps
/// running on its own task after that to deliver the ephemeral reply.
async fn receive_command(
    state: ReceiverState,
    envelope: SlackEnvelope,
    response_url: String,
    correlation_id: String,
) -> Response {
    let (responder, ack_rx) = AckResponder::new(state.api.clone(), response_url);
    let ctx = EventContext::new(correlation_id.clone(), Arc::new(responder));
    let dispatcher = state.dispatcher.clone();

    state
        .tasks
        .spawn(async move {
            if let Err(error) = dispatcher.dispatch(&envelope, &ctx).await {
                warn!(
                    event_name = "slack.command.failed",
                    correlation_id = %ctx.correlation_id,
                    user_id = envelope.event.user_id().unwrap_or("unknown"),
                    error = %error,
                    "slash command handler failed"
                );
            }
        })
        .await;

    match tokio::time::timeout(state.ack_timeout, ack_rx).await {
        Ok(Ok(())) => StatusCode::OK.into_response(),
        Ok(Err(_)) => {
            warn!(
                event_name = "slack.command.not_acknowledged",
                correlation_id = %correlation_id,
                "slash command handler finished without acknowledging"
            );
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(_) => {
            warn!(
                event_name = "slack.command.ack_timeout",
                correlation_id = %correlation_id,
                timeout_ms = state.ack_timeout.as_millis() as u64,
                "slash command was not acknowledged in time"
            );
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
