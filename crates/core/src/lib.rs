pub mod config;
pub mod mode;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use mode::{OperatingMode, SlackCredentials};
