use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

pub type Result<T> = std::result::Result<T, RagError>;

/// SQLSTATE raised when `statement_timeout` cancels a query
const QUERY_CANCELED: &str = "57014";

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Could not connect to {target}: {message}. {hint}")]
    Connectivity {
        target: String,
        message: String,
        hint: String,
    },

    #[error("{service} rejected the API credential: {message}")]
    Authentication { service: String, message: String },

    #[error("{service} rate limit still exceeded after {attempts} attempt(s)")]
    RateLimited { service: String, attempts: u32 },

    #[error("Network error talking to {service}: {message}")]
    Network { service: String, message: String },

    #[error("{service} returned HTTP {status}: {message}")]
    Api {
        service: String,
        status: u16,
        message: String,
    },

    #[error("Malformed response from {service}: {message}")]
    MalformedResponse { service: String, message: String },

    #[error("No PDF documents found in {}", .0.display())]
    NoDocuments(PathBuf),

    #[error("Failed to read document {}: {message}", .path.display())]
    DocumentRead { path: PathBuf, message: String },

    #[error("Embedding dimension mismatch: collection '{collection}' expects {expected}, got {actual}")]
    DimensionMismatch {
        collection: String,
        expected: usize,
        actual: usize,
    },

    #[error("Data error: {0}")]
    Data(String),

    #[error("The pgvector extension is not available: {0}")]
    MissingExtension(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Query pipeline cannot move from {from} to {to}")]
    InvalidTransition {
        from: pipeline::QueryState,
        to: pipeline::QueryState,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Coarse classification of [`RagError`], used for exit codes and for
/// deciding whether an operation may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Connectivity,
    RateLimit,
    Data,
    Fatal,
}

impl RagError {
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::MissingExtension(_) | Self::Authentication { .. } => {
                ErrorKind::Configuration
            }
            Self::Connectivity { .. } | Self::Network { .. } => ErrorKind::Connectivity,
            Self::RateLimited { .. } => ErrorKind::RateLimit,
            Self::NoDocuments(_)
            | Self::DocumentRead { .. }
            | Self::DimensionMismatch { .. }
            | Self::Data(_) => ErrorKind::Data,
            Self::Api { .. }
            | Self::MalformedResponse { .. }
            | Self::Database(_)
            | Self::InvalidTransition { .. }
            | Self::Io(_)
            | Self::Other(_) => ErrorKind::Fatal,
        }
    }

    /// Whether a single failed attempt may succeed if repeated.
    #[inline]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Network { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Process exit code for a command that failed with this error.
    #[inline]
    pub fn exit_code(&self) -> u8 {
        match self.kind() {
            ErrorKind::Configuration => 2,
            ErrorKind::Connectivity => 3,
            ErrorKind::Data => 4,
            ErrorKind::RateLimit => 5,
            ErrorKind::Fatal => 1,
        }
    }

    /// Short remediation advice shown under the error message.
    #[inline]
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Config(_) => Some(
                "Set OPENAI_API_KEY and POSTGRES_CONNECTION in the environment (see `pgvector-rag verify`).",
            ),
            Self::Authentication { .. } => Some("Check that OPENAI_API_KEY is valid."),
            Self::MissingExtension(_) => {
                Some("Run `CREATE EXTENSION vector;` as a superuser, or use the pgvector/pgvector image.")
            }
            Self::NoDocuments(_) => Some("Add PDF files to the documents directory and retry."),
            Self::RateLimited { .. } => Some("Wait a moment and try again."),
            Self::DimensionMismatch { .. } => Some(
                "The embedding model changed since the collection was created; drop the collection or restore the model.",
            ),
            _ => None,
        }
    }

    /// Wrap a sqlx failure. Pool and statement timeouts become
    /// connectivity errors, everything else is a database error.
    pub(crate) fn database(context: &str, error: &sqlx::Error) -> Self {
        let timed_out = matches!(error, sqlx::Error::PoolTimedOut)
            || error
                .as_database_error()
                .and_then(|e| e.code())
                .is_some_and(|code| code == QUERY_CANCELED);

        if timed_out {
            return Self::Connectivity {
                target: "PostgreSQL".to_string(),
                message: format!("{}: {}", context, error),
                hint: "The database did not answer in time; check its load or raise [database] query_timeout_secs".to_string(),
            };
        }
        Self::Database(format!("{}: {}", context, error))
    }
}

pub mod commands;
pub mod config;
pub mod database;
pub mod documents;
pub mod embeddings;
mod http;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod retriever;
pub mod retry;
