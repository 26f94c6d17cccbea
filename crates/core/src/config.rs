use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_SIGNING_SECRET: &str = "SLACK_SIGNING_SECRET";
pub const ENV_BOT_TOKEN: &str = "SLACK_BOT_TOKEN";
pub const ENV_PORT: &str = "PORT";
pub const ENV_CONFIG_PATH: &str = "BUDZY_CONFIG";

pub const DEFAULT_PORT: u16 = 10_000;
pub const DEFAULT_SLACK_API_BASE_URL: &str = "https://slack.com/api";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub slack: SlackConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Slack credentials are optional at load time: their absence selects the
/// degraded operating mode instead of failing validation.
#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub signing_secret: Option<SecretString>,
    pub bot_token: Option<SecretString>,
    pub api_base_url: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub signing_secret: Option<String>,
    pub bot_token: Option<String>,
    pub slack_api_base_url: Option<String>,
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            slack: SlackConfig {
                signing_secret: None,
                bot_token: None,
                api_base_url: DEFAULT_SLACK_API_BASE_URL.to_string(),
            },
            server: ServerConfig { bind_address: "0.0.0.0".to_string(), port: DEFAULT_PORT },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

/// Blank values count as unset so that `SLACK_BOT_TOKEN=""` keeps the process
/// in degraded mode.
fn secret_value(value: String) -> Option<SecretString> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value.into())
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let explicit_path =
            options.config_path.clone().or_else(|| read_env(ENV_CONFIG_PATH).map(PathBuf::from));
        let maybe_path = resolve_config_path(explicit_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = explicit_path.unwrap_or_else(|| PathBuf::from("budzy.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Environment variables that must be set before the bot can talk to Slack.
    pub fn missing_slack_settings(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.slack.signing_secret.is_none() {
            missing.push(ENV_SIGNING_SECRET);
        }
        if self.slack.bot_token.is_none() {
            missing.push(ENV_BOT_TOKEN);
        }
        missing
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(slack) = patch.slack {
            if let Some(signing_secret) = slack.signing_secret {
                self.slack.signing_secret = secret_value(signing_secret);
            }
            if let Some(bot_token) = slack.bot_token {
                self.slack.bot_token = secret_value(bot_token);
            }
            if let Some(api_base_url) = slack.api_base_url {
                self.slack.api_base_url = api_base_url;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        // Present-but-blank secrets still win over the file and clear it.
        if let Ok(value) = env::var(ENV_SIGNING_SECRET) {
            self.slack.signing_secret = secret_value(value);
        }
        if let Ok(value) = env::var(ENV_BOT_TOKEN) {
            self.slack.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("BUDZY_SLACK_API_BASE_URL") {
            self.slack.api_base_url = value;
        }

        if let Some(value) = read_env("BUDZY_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env(ENV_PORT) {
            self.server.port = parse_u16(ENV_PORT, value.trim())?;
        }

        let log_level = read_env("BUDZY_LOGGING_LEVEL").or_else(|| read_env("BUDZY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("BUDZY_LOGGING_FORMAT").or_else(|| read_env("BUDZY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(signing_secret) = overrides.signing_secret {
            self.slack.signing_secret = secret_value(signing_secret);
        }
        if let Some(bot_token) = overrides.bot_token {
            self.slack.bot_token = secret_value(bot_token);
        }
        if let Some(api_base_url) = overrides.slack_api_base_url {
            self.slack.api_base_url = api_base_url;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_slack(&self.slack)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// Non-fatal remarks about the Slack credentials, logged at startup.
pub fn slack_token_warnings(slack: &SlackConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    if let Some(bot_token) = &slack.bot_token {
        let bot_token = bot_token.expose_secret();
        if !bot_token.starts_with("xoxb-") {
            let hint = if bot_token.starts_with("xapp-") {
                " (hint: you may have used the app-level token instead of the bot token)"
            } else {
                ""
            };
            warnings.push(format!(
                "{ENV_BOT_TOKEN} does not start with `xoxb-`{hint}. Get it from https://api.slack.com/apps > Your App > OAuth & Permissions > Bot User OAuth Token"
            ));
        }
    }
    warnings
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("budzy.toml"), PathBuf::from("config/budzy.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

/// Keys whose `${VAR}` may be unset: the secret is then absent and the
/// process starts degraded instead of failing to load.
const OPTIONAL_SECRET_KEYS: &[&str] = &["slack.signing_secret", "slack.bot_token"];

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut section = String::new();

    for line in input.split_inclusive('\n') {
        let trimmed = line.trim();
        if let Some(header) = trimmed.strip_prefix('[').and_then(|rest| rest.split(']').next()) {
            section = header.trim().to_owned();
        }

        let key = trimmed.split('=').next().unwrap_or_default().trim();
        let qualified_key =
            if section.is_empty() { key.to_owned() } else { format!("{section}.{key}") };
        let unset_is_absent = OPTIONAL_SECRET_KEYS.contains(&qualified_key.as_str());

        interpolate_line(line, unset_is_absent, &mut output)?;
    }

    Ok(output)
}

fn interpolate_line(
    line: &str,
    unset_is_absent: bool,
    output: &mut String,
) -> Result<(), ConfigError> {
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            match env::var(&key) {
                Ok(value) => output.push_str(&value),
                Err(_) if unset_is_absent => {}
                Err(_) => return Err(ConfigError::MissingEnvInterpolation { var: key }),
            }
            continue;
        }

        output.push(ch);
    }

    Ok(())
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    let base_url = slack.api_base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "slack.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    slack: Option<SlackPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    signing_secret: Option<String>,
    bot_token: Option<String>,
    api_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
