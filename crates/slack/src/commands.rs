use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{oneshot, Mutex};

use crate::api::{SlackApi, SlackApiError};

pub const ONBOARD_COMMAND: &str = "/onboard";

/// Form fields Slack posts for a slash command invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SlashCommandPayload {
    pub command: String,
    pub text: String,
    pub user_id: String,
    pub user_name: String,
    pub channel_id: String,
    pub team_id: String,
    pub response_url: String,
    pub trigger_id: String,
}

impl SlashCommandPayload {
    pub fn from_form(fields: &HashMap<String, String>) -> Result<Self, CommandParseError> {
        let required = |key: &'static str| {
            fields
                .get(key)
                .filter(|value| !value.trim().is_empty())
                .cloned()
                .ok_or(CommandParseError::MissingField(key))
        };
        let optional = |key: &str| fields.get(key).cloned().unwrap_or_default();

        Ok(Self {
            command: required("command")?,
            text: optional("text"),
            user_id: required("user_id")?,
            user_name: optional("user_name"),
            channel_id: optional("channel_id"),
            team_id: optional("team_id"),
            response_url: optional("response_url"),
            trigger_id: optional("trigger_id"),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Ephemeral,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EphemeralResponse {
    pub response_type: ResponseType,
    pub text: String,
}

impl EphemeralResponse {
    pub fn new(text: impl Into<String>) -> Self {
        Self { response_type: ResponseType::Ephemeral, text: text.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OnboardCommand {
    pub user_id: String,
    pub channel_id: String,
    pub text: String,
}

impl OnboardCommand {
    pub fn parse(payload: &SlashCommandPayload) -> Result<Self, CommandParseError> {
        if payload.command.trim() != ONBOARD_COMMAND {
            return Err(CommandParseError::UnsupportedCommand(payload.command.clone()));
        }

        Ok(Self {
            user_id: payload.user_id.clone(),
            channel_id: payload.channel_id.clone(),
            text: payload.text.trim().to_owned(),
        })
    }

    pub fn greeting(&self) -> EphemeralResponse {
        EphemeralResponse::new(format!(
            "👋 Hi <@{}>! I'll help onboard folks here.",
            self.user_id
        ))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("unsupported slash command: {0}")]
    UnsupportedCommand(String),
    #[error("slash command payload is missing `{0}`")]
    MissingField(&'static str),
}

#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("slash command was already acknowledged")]
    AlreadyAcknowledged,
    #[error("acknowledgment window closed before the command was acknowledged")]
    AckWindowClosed,
    #[error("slash command payload carried no response_url")]
    MissingResponseUrl,
    #[error(transparent)]
    Api(#[from] SlackApiError),
}

/// Reply channel handed to the slash command handler.
///
/// `ack` must be called once, promptly, before any `respond`.
#[async_trait]
pub trait CommandResponder: Send + Sync {
    async fn ack(&self) -> Result<(), ReplyError>;
    async fn respond(&self, response: &EphemeralResponse) -> Result<(), ReplyError>;
}

/// Responder for contexts with nothing to acknowledge, such as events.
#[derive(Default)]
pub struct NoopCommandResponder;

#[async_trait]
impl CommandResponder for NoopCommandResponder {
    async fn ack(&self) -> Result<(), ReplyError> {
        Ok(())
    }

    async fn respond(&self, _response: &EphemeralResponse) -> Result<(), ReplyError> {
        Ok(())
    }
}

/// Acknowledges over a oneshot channel held by the HTTP receiver and sends
/// responses to the command's `response_url`.
pub struct AckResponder {
    ack_tx: Mutex<Option<oneshot::Sender<()>>>,
    api: Arc<dyn SlackApi>,
    response_url: String,
}

impl AckResponder {
    pub fn new(
        api: Arc<dyn SlackApi>,
        response_url: impl Into<String>,
    ) -> (Self, oneshot::Receiver<()>) {
        let (ack_tx, ack_rx) = oneshot::channel();
        let responder =
            Self { ack_tx: Mutex::new(Some(ack_tx)), api, response_url: response_url.into() };
        (responder, ack_rx)
    }
}

#[async_trait]
impl CommandResponder for AckResponder {
    async fn ack(&self) -> Result<(), ReplyError> {
        let sender = self.ack_tx.lock().await.take().ok_or(ReplyError::AlreadyAcknowledged)?;
        sender.send(()).map_err(|_| ReplyError::AckWindowClosed)
    }

    async fn respond(&self, response: &EphemeralResponse) -> Result<(), ReplyError> {
        if self.response_url.trim().is_empty() {
            return Err(ReplyError::MissingResponseUrl);
        }

        self.api.respond(&self.response_url, response).await.map_err(ReplyError::from)
    }
}
