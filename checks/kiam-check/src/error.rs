use std::num::ParseIntError;

use thiserror::Error;

/// Invalid environment input. Raised before any external call is made.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("error occurred attempting to parse LAMBDA_COUNT: {source}")]
    InvalidLambdaCount {
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("LAMBDA_COUNT must not be negative, got {0}")]
    NegativeLambdaCount(i64),

    #[error("failed to parse DEBUG environment variable: invalid boolean literal {0:?}")]
    InvalidDebug(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to resolve AWS credentials: {0}")]
    Credentials(String),
}

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// One `ListFunctions` call failed. `message` is what gets reported; the
/// underlying SDK error, when there is one, stays reachable as the source.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ListPageError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl ListPageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum EnumerationError {
    #[error("failed to list Lambda functions on page {page} ({collected} collected so far): {source}")]
    Request {
        page: usize,
        collected: usize,
        #[source]
        source: ListPageError,
    },

    #[error("gave up listing Lambda functions after {pages} pages, the API kept returning a marker")]
    PageLimitExceeded { pages: usize },
}

/// The reporting sink refused the report. Not reportable itself.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("KH_REPORTING_URL is not set")]
    MissingUrl,

    #[error("KH_REPORTING_URL {url:?} is not a valid URL: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to send report: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("kuberhealthy rejected the report with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Everything that turns a run into a reported failure.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to create AWS session: {0}")]
    Session(#[from] SessionError),

    #[error("nil AWS session")]
    NilSession,

    #[error("error occurred during Lambda check: {0}")]
    Enumeration(#[from] EnumerationError),

    #[error("panic: {0}")]
    Panic(String),
}
