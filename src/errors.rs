/*!
 * Error types for the subbatch library.
 *
 * Provider failures are classified here so the batch scheduler can decide
 * between split-retry recovery and aborting the run. Errors use the
 * thiserror crate for ergonomic definitions.
 */

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when talking to a translation backend
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The request did not complete within the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),
}

/// Recovery class of a backend failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connection problems, timeouts and server errors
    Transport,
    /// Backend asked us to slow down
    RateLimit,
    /// Bad or missing credentials
    Auth,
    /// Response arrived but could not be mapped onto the request
    ResponseShape,
}

impl ProviderError {
    /// Classify this error for the recovery logic
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::RequestFailed(_) | Self::ConnectionError(_) | Self::Timeout(_) => {
                FailureKind::Transport
            }
            Self::ApiError { status_code, .. } => match status_code {
                401 | 403 => FailureKind::Auth,
                429 => FailureKind::RateLimit,
                _ => FailureKind::Transport,
            },
            Self::ParseError(_) => FailureKind::ResponseShape,
            Self::RateLimitExceeded(_) => FailureKind::RateLimit,
            Self::AuthenticationError(_) => FailureKind::Auth,
        }
    }

    /// Whether splitting and resending could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        self.kind() != FailureKind::Auth
    }
}

/// Errors that can occur while translating a job
#[derive(Error, Debug)]
pub enum TranslationError {
    /// Error from the provider API
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The backend answered with a different set of units than requested
    #[error("Response shape mismatch: expected {expected} units, received {received}")]
    ResponseShape {
        /// Number of units sent
        expected: usize,
        /// Number of units returned
        received: usize,
    },

    /// A window kept failing after the maximum number of halvings
    #[error("Window of {units} units still failing at split depth {depth}: {last_failure}")]
    SplitDepthExceeded {
        /// Depth at which the branch was abandoned
        depth: usize,
        /// Size of the abandoned branch
        units: usize,
        /// Description of the last failure seen
        last_failure: String,
    },

    /// The translation cache could not be read or written
    #[error("Cache error: {0}")]
    Cache(String),

    /// The job was cancelled between windows
    #[error("Translation cancelled after {completed_windows} of {total_windows} windows")]
    Cancelled {
        /// Windows fully translated and checkpointed
        completed_windows: usize,
        /// Windows in the job
        total_windows: usize,
    },

    /// Invalid pipeline configuration or input
    #[error("Invalid job: {0}")]
    InvalidJob(String),
}

impl TranslationError {
    /// Wrap a cache-layer failure
    pub fn cache(error: anyhow::Error) -> Self {
        Self::Cache(format!("{:#}", error))
    }
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from translation
    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
