
use std::fmt;

use url::Url;

use super::ConfigError;

pub const API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const DATABASE_URL_VAR: &str = "POSTGRES_CONNECTION";
pub const DATABASE_URL_FALLBACK_VAR: &str = "DATABASE_URL";

/// Credentials that must come from the environment rather than the config file.
#[derive(Clone, PartialEq, Eq)]
pub struct Secrets {
    api_key: String,
    database_url: String,
}

impl Secrets {
    /// Validate and wrap an API key and a connection string.
    #[inline]
    pub fn new(api_key: &str, database_url: &str) -> Result<Self, ConfigError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(ConfigError::MissingVariable(API_KEY_VAR));
        }
        if database_url.trim().is_empty() {
            return Err(ConfigError::MissingVariable(DATABASE_URL_VAR));
        }

        Ok(Self {
            api_key: api_key.to_string(),
            database_url: normalize_database_url(database_url)?,
        })
    }

    #[inline]
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve secrets through `lookup`, which maps a variable name to its value.
    #[inline]
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = required(&lookup, API_KEY_VAR)?;
        let database_url = required(&lookup, DATABASE_URL_VAR)
            .or_else(|_| required(&lookup, DATABASE_URL_FALLBACK_VAR))
            .map_err(|_| ConfigError::MissingVariable(DATABASE_URL_VAR))?;

        Self::new(&api_key, &database_url)
    }

    #[inline]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    #[inline]
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Connection string with the password masked, safe for logs and terminals.
    #[inline]
    pub fn redacted_database_url(&self) -> String {
        redact_database_url(&self.database_url)
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("api_key", &"<redacted>")
            .field("database_url", &self.redacted_database_url())
            .finish()
    }
}

/// Read a variable that must be present and non-blank.
#[inline]
pub fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::MissingVariable(name))
}

/// Normalise a PostgreSQL connection URL.
///
/// Driver suffixes such as `postgresql+psycopg://` are stripped. The result
/// must name a host and a database.
#[inline]
pub fn normalize_database_url(raw: &str) -> Result<String, ConfigError> {
    let raw = raw.trim();
    let (scheme, rest) = raw
        .split_once("://")
        .ok_or_else(|| ConfigError::InvalidDatabaseUrl("missing scheme".to_string()))?;
    let scheme = scheme.split('+').next().unwrap_or(scheme);

    if scheme != "postgres" && scheme != "postgresql" {
        return Err(ConfigError::InvalidDatabaseUrl(format!(
            "unsupported scheme '{}' (expected postgresql://)",
            scheme
        )));
    }

    let normalized = format!("{}://{}", scheme, rest);
    let url = Url::parse(&normalized)
        .map_err(|e| ConfigError::InvalidDatabaseUrl(format!("{}", e)))?;

    if url.host_str().is_none_or(str::is_empty) {
        return Err(ConfigError::InvalidDatabaseUrl(
            "missing host".to_string(),
        ));
    }

    if url.path().trim_start_matches('/').is_empty() {
        return Err(ConfigError::InvalidDatabaseUrl(
            "missing database name".to_string(),
        ));
    }

    Ok(normalized)
}

fn redact_database_url(database_url: &str) -> String {
    match Url::parse(database_url) {
        Ok(mut url) => {
            if url.password().is_some() {
                // Only fails for cannot-be-a-base URLs, which were rejected earlier
                let _ = url.set_password(Some("***"));
            }
            url.to_string()
        }
        Err(_) => "<invalid url>".to_string(),
    }
}
