use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};

use crate::{
    api::{ChatPostMessage, SlackApi, ViewsPublish},
    blocks,
    commands::{
        CommandParseError, CommandResponder, EphemeralResponse, NoopCommandResponder,
        OnboardCommand, ReplyError, SlashCommandPayload,
    },
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    SlashCommand(SlashCommandPayload),
    AppHomeOpened(AppHomeOpenedEvent),
    TeamJoin(TeamJoinEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::SlashCommand(_) => SlackEventType::SlashCommand,
            Self::AppHomeOpened(_) => SlackEventType::AppHomeOpened,
            Self::TeamJoin(_) => SlackEventType::TeamJoin,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }

    /// User the event is about, for log correlation.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::SlashCommand(payload) => Some(payload.user_id.as_str()),
            Self::AppHomeOpened(event) => Some(event.user.as_str()),
            Self::TeamJoin(event) => Some(event.user.id.as_str()),
            Self::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    SlashCommand,
    AppHomeOpened,
    TeamJoin,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AppHomeOpenedEvent {
    pub user: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub tab: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct TeamJoinEvent {
    pub user: TeamJoinUser,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct TeamJoinUser {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub real_name: Option<String>,
}

#[derive(Clone)]
pub struct EventContext {
    pub correlation_id: String,
    pub responder: Arc<dyn CommandResponder>,
}

impl EventContext {
    pub fn new(correlation_id: impl Into<String>, responder: Arc<dyn CommandResponder>) -> Self {
        Self { correlation_id: correlation_id.into(), responder }
    }
}

impl Default for EventContext {
    fn default() -> Self {
        Self {
            correlation_id: "unknown-correlation-id".to_owned(),
            responder: Arc::new(NoopCommandResponder),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(EphemeralResponse),
    Processed,
    Ignored,
}

#[derive(Debug, Error)]
pub enum EventHandlerError {
    #[error(transparent)]
    Parse(#[from] CommandParseError),
    #[error(transparent)]
    Reply(#[from] ReplyError),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Dispatcher with the `/onboard`, `app_home_opened` and `team_join` handlers.
pub fn default_dispatcher(api: Arc<dyn SlackApi>) -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(SlashCommandHandler);
    dispatcher.register(AppHomeOpenedHandler::new(api.clone()));
    dispatcher.register(TeamJoinHandler::new(api));
    dispatcher
}

/// Handles `/onboard`. Failures here propagate so Slack shows the invoking
/// user its own error.
pub struct SlashCommandHandler;

#[async_trait]
impl EventHandler for SlashCommandHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::SlashCommand
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::SlashCommand(payload) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let command = OnboardCommand::parse(payload)?;
        ctx.responder.ack().await?;

        let response = command.greeting();
        ctx.responder.respond(&response).await?;
        info!(
            event_name = "slack.command.onboard_responded",
            correlation_id = %ctx.correlation_id,
            user_id = %command.user_id,
            channel_id = %command.channel_id,
            "sent onboard greeting"
        );

        Ok(HandlerResult::Responded(response))
    }
}

/// Publishes the home tab. Best effort: a failed publish is logged only.
pub struct AppHomeOpenedHandler {
    api: Arc<dyn SlackApi>,
}

impl AppHomeOpenedHandler {
    pub fn new(api: Arc<dyn SlackApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl EventHandler for AppHomeOpenedHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::AppHomeOpened
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::AppHomeOpened(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let request = ViewsPublish { user_id: event.user.clone(), view: blocks::home_view() };
        match self.api.publish_view(&request).await {
            Ok(()) => info!(
                event_name = "slack.home.published",
                correlation_id = %ctx.correlation_id,
                user_id = %event.user,
                "published app home"
            ),
            Err(error) => error!(
                event_name = "slack.home.publish_failed",
                correlation_id = %ctx.correlation_id,
                user_id = %event.user,
                error = %error,
                "error publishing app home"
            ),
        }

        Ok(HandlerResult::Processed)
    }
}

/// Sends a welcome DM to new members. Best effort: a failed post is logged only.
pub struct TeamJoinHandler {
    api: Arc<dyn SlackApi>,
}

impl TeamJoinHandler {
    pub fn new(api: Arc<dyn SlackApi>) -> Self {
        Self { api }
    }
}

pub fn welcome_message(user_id: &str) -> ChatPostMessage {
    // Posting to a user id opens (or reuses) the bot's DM with that user.
    ChatPostMessage {
        channel: user_id.to_owned(),
        text: format!("🎉 Welcome to the team, <@{user_id}>!"),
    }
}

#[async_trait]
impl EventHandler for TeamJoinHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::TeamJoin
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::TeamJoin(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let message = welcome_message(&event.user.id);
        match self.api.post_message(&message).await {
            Ok(()) => info!(
                event_name = "slack.team_join.welcomed",
                correlation_id = %ctx.correlation_id,
                user_id = %event.user.id,
                "sent welcome direct message"
            ),
            Err(error) => error!(
                event_name = "slack.team_join.welcome_failed",
                correlation_id = %ctx.correlation_id,
                user_id = %event.user.id,
                error = %error,
                "error handling team_join"
            ),
        }

        Ok(HandlerResult::Processed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::{
        default_dispatcher, AppHomeOpenedEvent, DispatchError, EventContext, EventDispatcher,
        EventHandlerError, HandlerResult, SlackEnvelope, SlackEvent, TeamJoinEvent, TeamJoinUser,
    };
    use crate::api::{RecordedCall, RecordingSlackApi};
    use crate::commands::{
        CommandParseError, CommandResponder, EphemeralResponse, ReplyError, SlashCommandPayload,
    };

    #[derive(Default)]
    struct RecordingResponder {
        log: Mutex<Vec<String>>,
        responses: Mutex<Vec<EphemeralResponse>>,
    }

    #[async_trait]
    impl CommandResponder for RecordingResponder {
        async fn ack(&self) -> Result<(), ReplyError> {
            self.log.lock().await.push("ack".to_owned());
            Ok(())
        }

        async fn respond(&self, response: &EphemeralResponse) -> Result<(), ReplyError> {
            self.log.lock().await.push("respond".to_owned());
            self.responses.lock().await.push(response.clone());
            Ok(())
        }
    }

    fn command_envelope(command: &str, user_id: &str) -> SlackEnvelope {
        SlackEnvelope {
            envelope_id: "trigger-1".to_owned(),
            event: SlackEvent::SlashCommand(SlashCommandPayload {
                command: command.to_owned(),
                user_id: user_id.to_owned(),
                channel_id: "C1".to_owned(),
                response_url: "https://hooks.slack.test/commands/1".to_owned(),
                ..SlashCommandPayload::default()
            }),
        }
    }

    fn home_envelope(user: &str) -> SlackEnvelope {
        SlackEnvelope {
            envelope_id: "Ev-home".to_owned(),
            event: SlackEvent::AppHomeOpened(AppHomeOpenedEvent {
                user: user.to_owned(),
                channel: Some("D1".to_owned()),
                tab: Some("home".to_owned()),
            }),
        }
    }

    fn team_join_envelope(user_id: &str) -> SlackEnvelope {
        SlackEnvelope {
            envelope_id: "Ev-join".to_owned(),
            event: SlackEvent::TeamJoin(TeamJoinEvent {
                user: TeamJoinUser { id: user_id.to_owned(), name: None, real_name: None },
            }),
        }
    }

    #[test]
    fn default_dispatcher_registers_handlers() {
        let dispatcher = default_dispatcher(Arc::new(RecordingSlackApi::new()));
        assert_eq!(dispatcher.handler_count(), 3);
    }

    #[tokio::test]
    async fn onboard_acks_then_responds_once_with_user_mention() {
        let api = Arc::new(RecordingSlackApi::new());
        let dispatcher = default_dispatcher(api.clone());
        let responder = Arc::new(RecordingResponder::default());
        let ctx = EventContext::new("trigger-1", responder.clone());

        let result = dispatcher
            .dispatch(&command_envelope("/onboard", "U123"), &ctx)
            .await
            .expect("dispatch");

        assert!(matches!(result, HandlerResult::Responded(ref response) if response.text.contains("<@U123>")));
        assert_eq!(*responder.log.lock().await, vec!["ack", "respond"]);
        let responses = responder.responses.lock().await;
        assert_eq!(responses.len(), 1);
        assert!(responses[0].text.contains("<@U123>"));
        assert!(api.calls().await.is_empty(), "command replies go through the responder only");
    }

    #[tokio::test]
    async fn unknown_command_is_not_acknowledged() {
        let dispatcher = default_dispatcher(Arc::new(RecordingSlackApi::new()));
        let responder = Arc::new(RecordingResponder::default());
        let ctx = EventContext::new("trigger-2", responder.clone());

        let result = dispatcher.dispatch(&command_envelope("/other", "U1"), &ctx).await;

        assert!(matches!(
            result,
            Err(DispatchError::Handler(EventHandlerError::Parse(
                CommandParseError::UnsupportedCommand(_)
            )))
        ));
        assert!(responder.log.lock().await.is_empty());
    }

    #[tokio::test]
    async fn app_home_opened_publishes_view_for_viewer() {
        let api = Arc::new(RecordingSlackApi::new());
        let dispatcher = default_dispatcher(api.clone());

        let result = dispatcher
            .dispatch(&home_envelope("U456"), &EventContext::default())
            .await
            .expect("dispatch");

        assert_eq!(result, HandlerResult::Processed);
        let calls = api.calls().await;
        assert_eq!(calls.len(), 1);
        let RecordedCall::PublishView(request) = &calls[0] else {
            panic!("expected views.publish, got {calls:?}");
        };
        assert_eq!(request.user_id, "U456");
        assert!(request.view.blocks.len() >= 2);
        assert!(request.view.blocks.iter().any(|block| block.contains_text("Budzy Onboarding Bot")));
    }

    #[tokio::test]
    async fn team_join_sends_direct_message_to_new_member() {
        let api = Arc::new(RecordingSlackApi::new());
        let dispatcher = default_dispatcher(api.clone());

        let result = dispatcher
            .dispatch(&team_join_envelope("U789"), &EventContext::default())
            .await
            .expect("dispatch");

        assert_eq!(result, HandlerResult::Processed);
        let calls = api.calls().await;
        assert_eq!(calls.len(), 1);
        let RecordedCall::PostMessage(message) = &calls[0] else {
            panic!("expected chat.postMessage, got {calls:?}");
        };
        assert_eq!(message.channel, "U789");
        assert!(message.text.contains("<@U789>"));
    }

    #[tokio::test]
    async fn outbound_failures_are_swallowed_and_dispatch_continues() {
        let api = Arc::new(RecordingSlackApi::failing("not_authed"));
        let dispatcher = default_dispatcher(api.clone());

        let home = dispatcher.dispatch(&home_envelope("U456"), &EventContext::default()).await;
        let join = dispatcher.dispatch(&team_join_envelope("U789"), &EventContext::default()).await;
        let again = dispatcher.dispatch(&home_envelope("U457"), &EventContext::default()).await;

        assert!(matches!(home, Ok(HandlerResult::Processed)));
        assert!(matches!(join, Ok(HandlerResult::Processed)));
        assert!(matches!(again, Ok(HandlerResult::Processed)));
        assert_eq!(api.calls().await.len(), 3, "each event attempts exactly one call, no retries");
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().expect("log buffer").clone()).expect("utf8 logs")
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("log buffer").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn outbound_failures_are_logged_at_error_level() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);
        let dispatcher = default_dispatcher(Arc::new(RecordingSlackApi::failing("not_authed")));
        let ctx = EventContext { correlation_id: "corr-7".to_owned(), ..EventContext::default() };

        dispatcher.dispatch(&home_envelope("U456"), &ctx).await.expect("dispatch");
        dispatcher.dispatch(&team_join_envelope("U789"), &ctx).await.expect("dispatch");

        let output = logs.contents();
        let lines: Vec<&str> = output.lines().collect();
        let home = lines
            .iter()
            .find(|line| line.contains("slack.home.publish_failed"))
            .expect("home failure logged");
        let join = lines
            .iter()
            .find(|line| line.contains("slack.team_join.welcome_failed"))
            .expect("welcome failure logged");
        for line in [home, join] {
            assert!(line.contains("ERROR"), "{line}");
            assert!(line.contains("corr-7"), "{line}");
            assert!(line.contains("not_authed"), "{line}");
        }
        assert!(home.contains("U456"));
        assert!(join.contains("U789"));
    }

    #[tokio::test]
    async fn unsupported_events_are_ignored() {
        let api = Arc::new(RecordingSlackApi::new());
        let dispatcher = default_dispatcher(api.clone());
        let envelope = SlackEnvelope {
            envelope_id: "Ev-other".to_owned(),
            event: SlackEvent::Unsupported { event_type: "member_joined_channel".to_owned() },
        };

        let result = dispatcher.dispatch(&envelope, &EventContext::default()).await.expect("dispatch");

        assert_eq!(result, HandlerResult::Ignored);
        assert!(api.calls().await.is_empty());
    }

    #[tokio::test]
    async fn dispatcher_returns_ignored_when_no_handler_registered() {
        let dispatcher = EventDispatcher::new();

        let result = dispatcher
            .dispatch(&home_envelope("U1"), &EventContext::default())
            .await
            .expect("dispatch");

        assert_eq!(result, HandlerResult::Ignored);
    }

    #[test]
    fn user_id_is_extracted_for_log_correlation() {
        assert_eq!(home_envelope("U1").event.user_id(), Some("U1"));
        assert_eq!(team_join_envelope("U2").event.user_id(), Some("U2"));
        assert_eq!(command_envelope("/onboard", "U3").event.user_id(), Some("U3"));
    }
}
