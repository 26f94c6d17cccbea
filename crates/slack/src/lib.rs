//! Slack integration for the Budzy onboarding bot.
//!
//! - **Webhook** (`webhook`) - request signing and body decoding for `/slack/events`
//! - **Events** (`events`) - typed envelopes, `EventDispatcher`, and the three handlers
//! - **Slash Commands** (`commands`) - `/onboard` parsing and the ack/respond contract
//! - **Web API** (`api`) - `chat.postMessage`, `views.publish`, and `response_url` replies
//! - **Block Kit** (`blocks`) - the App Home view
//!
//! # Architecture
//!
//! ```text
//! POST /slack/events → SignatureVerifier → parse_payload → EventDispatcher → Handlers
//!                                                                   ↓
//!                                                    SlackApi (Web API / response_url)
//! ```

pub mod api;
pub mod blocks;
pub mod commands;
pub mod events;
pub mod webhook;
