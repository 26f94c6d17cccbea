use std::sync::Arc;

use axum::Router;
use budzy_core::{
    config::{slack_token_warnings, AppConfig, ENV_BOT_TOKEN, ENV_SIGNING_SECRET},
    OperatingMode, SlackCredentials,
};
use budzy_slack::{
    api::{SlackApi, SlackWebClient},
    events::default_dispatcher,
    webhook::SignatureVerifier,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::{degraded, health, receiver, receiver::InFlightTasks};

pub struct Application {
    pub config: AppConfig,
    pub mode: OperatingMode,
    pub router: Router,
    pub tasks: InFlightTasks,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("could not bind listener on `{address}`: {source}")]
    Bind { address: String, source: std::io::Error },
}

/// Picks the operating mode once and builds the matching router. Missing Slack
/// secrets are never an error here.
pub fn bootstrap_with_config(config: AppConfig) -> Application {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let mode = OperatingMode::select(&config);
    let (router, tasks) = match &mode {
        OperatingMode::Degraded { missing } => {
            warn!(
                event_name = "system.bootstrap.slack_unconfigured",
                correlation_id = "bootstrap",
                missing = %missing.join(","),
                "⚠️ Slack env vars missing. Starting in health-only mode."
            );
            warn!(
                event_name = "system.bootstrap.slack_hint",
                correlation_id = "bootstrap",
                "{}",
                unconfigured_hint()
            );
            (degraded::router(missing.clone()), InFlightTasks::default())
        }
        OperatingMode::Full(credentials) => {
            for warning in slack_token_warnings(&config.slack) {
                warn!(
                    event_name = "system.bootstrap.slack_token_warning",
                    correlation_id = "bootstrap",
                    "{warning}"
                );
            }
            bot_router(credentials, &config)
        }
    };

    info!(
        event_name = "system.bootstrap.mode_selected",
        correlation_id = "bootstrap",
        mode = mode.label(),
        "operating mode selected"
    );

    Application { config, mode, router, tasks }
}

/// `.env` files are never loaded, which is the usual surprise in local setups.
fn unconfigured_hint() -> String {
    format!(
        "Set {ENV_SIGNING_SECRET} and {ENV_BOT_TOKEN} to enable Slack features. \
         .env files are not read: export the variables in the shell or put them \
         under [slack] in budzy.toml."
    )
}

pub async fn bind(app: &Application) -> Result<TcpListener, BootstrapError> {
    let address = app.config.listen_address();
    TcpListener::bind(&address).await.map_err(|source| BootstrapError::Bind { address, source })
}

fn bot_router(credentials: &SlackCredentials, config: &AppConfig) -> (Router, InFlightTasks) {
    let api: Arc<dyn SlackApi> =
        Arc::new(SlackWebClient::new(&config.slack.api_base_url, credentials.bot_token.clone()));
    let state = receiver::ReceiverState::new(
        SignatureVerifier::new(credentials.signing_secret.clone()),
        default_dispatcher(api.clone()),
        api,
    );

    let tasks = state.tasks();

    (health::router().merge(receiver::router(state)), tasks)
}
