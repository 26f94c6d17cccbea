//! Inbound HTTP surface shared by every Slack delivery: request signing and
//! body decoding for the Events API and slash commands.

use std::collections::HashMap;

use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;

use crate::{
    commands::{CommandParseError, SlashCommandPayload},
    events::{AppHomeOpenedEvent, SlackEnvelope, SlackEvent, TeamJoinEvent},
};

type HmacSha256 = Hmac<Sha256>;

pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const RETRY_NUM_HEADER: &str = "x-slack-retry-num";

const SIGNATURE_VERSION: &str = "v0";
/// Requests older (or newer) than this are treated as replays.
pub const MAX_TIMESTAMP_SKEW_SECS: i64 = 60 * 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("missing `{0}` header")]
    MissingHeader(&'static str),
    #[error("request timestamp `{0}` is not a unix timestamp")]
    InvalidTimestamp(String),
    #[error("request timestamp is {age_secs}s away from now")]
    StaleTimestamp { age_secs: i64 },
    #[error("request signature does not match")]
    InvalidSignature,
    #[error("request body is not valid json: {0}")]
    InvalidJson(String),
    #[error("request body is missing `{0}`")]
    MissingField(&'static str),
    #[error("`{event_type}` event could not be decoded: {reason}")]
    InvalidEvent { event_type: String, reason: String },
    #[error(transparent)]
    Command(#[from] CommandParseError),
}

impl WebhookError {
    /// Signature failures are answered with 401, everything else with 400.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Self::MissingHeader(_)
                | Self::InvalidTimestamp(_)
                | Self::StaleTimestamp { .. }
                | Self::InvalidSignature
        )
    }
}

/// Verifies `X-Slack-Signature` against the app's signing secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    signing_secret: SecretString,
    max_skew_secs: i64,
}

impl SignatureVerifier {
    pub fn new(signing_secret: SecretString) -> Self {
        Self { signing_secret, max_skew_secs: MAX_TIMESTAMP_SKEW_SECS }
    }

    pub fn verify(
        &self,
        timestamp: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<(), WebhookError> {
        self.verify_at(Utc::now().timestamp(), timestamp, signature, body)
    }

    pub fn verify_at(
        &self,
        now: i64,
        timestamp: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<(), WebhookError> {
        let timestamp = timestamp.ok_or(WebhookError::MissingHeader(TIMESTAMP_HEADER))?;
        let signature = signature.ok_or(WebhookError::MissingHeader(SIGNATURE_HEADER))?;

        let sent_at: i64 = timestamp
            .trim()
            .parse()
            .map_err(|_| WebhookError::InvalidTimestamp(timestamp.to_owned()))?;
        let age_secs = now - sent_at;
        if age_secs.abs() > self.max_skew_secs {
            return Err(WebhookError::StaleTimestamp { age_secs });
        }

        let expected = signature
            .strip_prefix(SIGNATURE_VERSION)
            .and_then(|rest| rest.strip_prefix('='))
            .and_then(|digest| hex::decode(digest).ok())
            .ok_or(WebhookError::InvalidSignature)?;

        let mac = self.mac(timestamp.trim(), body)?;
        mac.verify_slice(&expected).map_err(|_| WebhookError::InvalidSignature)
    }

    /// Produces the `v0=<hex>` header value Slack would send for `body`.
    pub fn sign(&self, timestamp: &str, body: &[u8]) -> Result<String, WebhookError> {
        let digest = self.mac(timestamp, body)?.finalize().into_bytes();
        Ok(format!("{SIGNATURE_VERSION}={}", hex::encode(digest)))
    }

    fn mac(&self, timestamp: &str, body: &[u8]) -> Result<HmacSha256, WebhookError> {
        let mut mac = HmacSha256::new_from_slice(self.signing_secret.expose_secret().as_bytes())
            .map_err(|_| WebhookError::InvalidSignature)?;
        mac.update(SIGNATURE_VERSION.as_bytes());
        mac.update(b":");
        mac.update(timestamp.as_bytes());
        mac.update(b":");
        mac.update(body);
        Ok(mac)
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("max_skew_secs", &self.max_skew_secs)
            .finish_non_exhaustive()
    }
}

/// A verified request body, decoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundPayload {
    UrlVerification { challenge: String },
    SslCheck,
    Envelope(SlackEnvelope),
}

pub fn parse_payload(
    content_type: Option<&str>,
    body: &[u8],
) -> Result<InboundPayload, WebhookError> {
    let is_form = content_type
        .map(|value| value.to_ascii_lowercase().starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);

    if is_form {
        parse_form(body)
    } else {
        parse_json(body)
    }
}

fn parse_form(body: &[u8]) -> Result<InboundPayload, WebhookError> {
    let fields: HashMap<String, String> = url::form_urlencoded::parse(body).into_owned().collect();

    if fields.get("ssl_check").map(String::as_str) == Some("1") {
        return Ok(InboundPayload::SslCheck);
    }

    if let Some(payload) = fields.get("payload") {
        // Interactivity payloads (buttons, shortcuts) are acknowledged and dropped.
        let event_type = serde_json::from_str::<Value>(payload)
            .ok()
            .and_then(|value| value.get("type").and_then(Value::as_str).map(str::to_owned))
            .unwrap_or_else(|| "interactive".to_owned());
        return Ok(InboundPayload::Envelope(SlackEnvelope {
            envelope_id: String::new(),
            event: SlackEvent::Unsupported { event_type },
        }));
    }

    let command = SlashCommandPayload::from_form(&fields)?;
    Ok(InboundPayload::Envelope(SlackEnvelope {
        envelope_id: command.trigger_id.clone(),
        event: SlackEvent::SlashCommand(command),
    }))
}

fn parse_json(body: &[u8]) -> Result<InboundPayload, WebhookError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|error| WebhookError::InvalidJson(error.to_string()))?;
    let body_type =
        value.get("type").and_then(Value::as_str).ok_or(WebhookError::MissingField("type"))?;

    match body_type {
        "url_verification" => {
            let challenge = value
                .get("challenge")
                .and_then(Value::as_str)
                .ok_or(WebhookError::MissingField("challenge"))?;
            Ok(InboundPayload::UrlVerification { challenge: challenge.to_owned() })
        }
        "event_callback" => {
            let envelope_id =
                value.get("event_id").and_then(Value::as_str).unwrap_or_default().to_owned();
            let event = value.get("event").ok_or(WebhookError::MissingField("event"))?;
            Ok(InboundPayload::Envelope(SlackEnvelope { envelope_id, event: decode_event(event)? }))
        }
        other => Ok(InboundPayload::Envelope(SlackEnvelope {
            envelope_id: String::new(),
            event: SlackEvent::Unsupported { event_type: other.to_owned() },
        })),
    }
}

fn decode_event(event: &Value) -> Result<SlackEvent, WebhookError> {
    let event_type =
        event.get("type").and_then(Value::as_str).ok_or(WebhookError::MissingField("event.type"))?;
    let invalid = |error: serde_json::Error| WebhookError::InvalidEvent {
        event_type: event_type.to_owned(),
        reason: error.to_string(),
    };

    match event_type {
        "app_home_opened" => {
            AppHomeOpenedEvent::deserialize(event).map(SlackEvent::AppHomeOpened).map_err(invalid)
        }
        "team_join" => TeamJoinEvent::deserialize(event).map(SlackEvent::TeamJoin).map_err(invalid),
        other => Ok(SlackEvent::Unsupported { event_type: other.to_owned() }),
    }
}
