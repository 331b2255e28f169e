// Configuration management module
// Tunables come from an optional TOML file, secrets from the process environment

pub mod environment;
pub mod interactive;
pub mod settings;


pub use environment::{API_KEY_VAR, DATABASE_URL_FALLBACK_VAR, DATABASE_URL_VAR, Secrets};
pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    ChatConfig, Config, ConfigError, DatabaseConfig, EmbeddingConfig, IngestConfig,
    RetrievalConfig, RetryConfig,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}
