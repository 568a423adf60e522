//! Error taxonomy for the importer.
//!
//! Configuration and input errors are fatal and stop a run before any
//! reconciliation happens. Search errors are per-item and get converted into
//! an outcome by the engine. Publish errors surface after the batch and never
//! invalidate outcomes that were already computed.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("secrets file not found: {0}")]
    SecretsNotFound(PathBuf),

    #[error("invalid secrets file {path}: {message}")]
    InvalidSecrets { path: PathBuf, message: String },

    #[error("missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("threshold must be within (0, 1), got {0}")]
    InvalidThreshold(f64),

    #[error("candidate limit must be at least 1")]
    ZeroCandidateLimit,

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("invalid base url: {0}")]
    Url(#[from] url::ParseError),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("failed to build http client: {0}")]
    HttpClient(String),

    #[error("failed to read credentials from the terminal: {0}")]
    Prompt(#[source] std::io::Error),
}

#[derive(Debug, Error)]
pub enum InputError {
    #[error("path not found: {0}")]
    NotFound(PathBuf),

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("failed to read {path}: {message}")]
    Unreadable { path: PathBuf, message: String },
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search request timed out")]
    Timeout,

    #[error("rate limited (retry after {0:?})")]
    RateLimited(Option<Duration>),

    #[error("api error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed search response: {0}")]
    Decode(String),
}

impl SearchError {
    /// Whether a retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            SearchError::Timeout | SearchError::RateLimited(_) | SearchError::Transport(_) => true,
            SearchError::Api { status, .. } => *status >= 500,
            SearchError::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SearchError::Timeout
        } else if e.is_decode() {
            SearchError::Decode(e.to_string())
        } else {
            SearchError::Transport(e.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("playlist publishing requires a user access token")]
    MissingUserToken,

    #[error("api error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed playlist response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for PublishError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            PublishError::Decode(e.to_string())
        } else {
            PublishError::Transport(e.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Search(#[from] SearchError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("log write failed: {0}")]
    Log(#[from] std::io::Error),
}
