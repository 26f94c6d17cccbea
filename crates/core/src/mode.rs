use secrecy::SecretString;

use crate::config::AppConfig;

/// Credentials required to serve Slack traffic.
#[derive(Clone, Debug)]
pub struct SlackCredentials {
    pub signing_secret: SecretString,
    pub bot_token: SecretString,
}

/// Process-wide operating mode, decided once at startup.
///
/// There is no transition between the two variants inside a running process;
/// fixing the configuration requires a restart.
#[derive(Clone, Debug)]
pub enum OperatingMode {
    Degraded { missing: Vec<&'static str> },
    Full(SlackCredentials),
}

impl OperatingMode {
    pub fn select(config: &AppConfig) -> Self {
        match (&config.slack.signing_secret, &config.slack.bot_token) {
            (Some(signing_secret), Some(bot_token)) => Self::Full(SlackCredentials {
                signing_secret: signing_secret.clone(),
                bot_token: bot_token.clone(),
            }),
            _ => Self::Degraded { missing: config.missing_slack_settings() },
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Degraded { .. } => "degraded",
            Self::Full(_) => "full",
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }
}
