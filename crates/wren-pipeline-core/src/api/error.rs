use eventsource_stream::EventStreamError;
use serde_json::{Value, json};
use thiserror::Error;

pub const TIMEOUT_ERROR: &str = "TIMEOUT_ERROR";
pub const CONNECTION_ERROR: &str = "CONNECTION_ERROR";
pub const REQUEST_ERROR: &str = "REQUEST_ERROR";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SseParseError {
    #[error("UTF-8 error: {details}")]
    Utf8 { details: String },
    #[error("Parse error: {details}")]
    Parser { details: String },
    #[error("Transport error: {details}")]
    Transport { details: String },
}

impl<E> From<EventStreamError<E>> for SseParseError
where
    E: std::error::Error,
{
    fn from(err: EventStreamError<E>) -> Self {
        match err {
            EventStreamError::Utf8(err) => Self::Utf8 {
                details: err.to_string(),
            },
            EventStreamError::Parser(err) => Self::Parser {
                details: err.to_string(),
            },
            EventStreamError::Transport(err) => Self::Transport {
                details: err.to_string(),
            },
        }
    }
}

/// Transport-level failure talking to Wren-UI.
///
/// In-band application errors (a JSON body carrying `code`/`error`) are not
/// represented here; they travel as [`UpstreamError`].
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Request to {path} timed out")]
    Timeout { path: String },

    #[error("Could not connect to Wren-UI for {path}: {details}")]
    Connection { path: String, details: String },

    #[error("Request to {path} failed: {details}")]
    Request { path: String, details: String },

    #[error("Wren-UI returned status {status} for {path}: {body}")]
    Status {
        path: String,
        status: u16,
        body: String,
    },

    #[error("Failed to parse response from {path}: {details}")]
    ResponseParsing { path: String, details: String },

    #[error("Stream error: {0}")]
    Stream(#[from] SseParseError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    pub fn from_reqwest(path: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout {
                path: path.to_string(),
            }
        } else if err.is_connect() {
            ApiError::Connection {
                path: path.to_string(),
                details: err.to_string(),
            }
        } else {
            ApiError::Request {
                path: path.to_string(),
                details: err.to_string(),
            }
        }
    }

    /// Machine-readable code reported to the user.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Timeout { .. } => TIMEOUT_ERROR,
            ApiError::Connection { .. } => CONNECTION_ERROR,
            _ => REQUEST_ERROR,
        }
    }

    /// Timeouts and refused connections retry on a short fixed delay.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Timeout { .. } | ApiError::Connection { .. })
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Timeout { .. } | ApiError::Connection { .. } | ApiError::Request { .. } => {
                true
            }
            ApiError::Status { status, .. } => *status >= 500,
            ApiError::ResponseParsing { .. }
            | ApiError::Stream(_)
            | ApiError::InvalidRequest(_) => false,
        }
    }

    /// The `{"error": ..., "code": ...}` shape Wren-UI itself uses.
    pub fn to_json(&self) -> Value {
        json!({ "error": self.to_string(), "code": self.code() })
    }
}

/// Error codes Wren-UI reports inside JSON bodies and `error` stream events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamCode {
    NonSqlQuery,
    NoRelevantData,
    Other(String),
}

impl UpstreamCode {
    pub fn from_code(code: &str) -> Self {
        match code {
            "NON_SQL_QUERY" => Self::NonSqlQuery,
            "NO_RELEVANT_DATA" => Self::NoRelevantData,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for UpstreamCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonSqlQuery => f.write_str("NON_SQL_QUERY"),
            Self::NoRelevantData => f.write_str("NO_RELEVANT_DATA"),
            Self::Other(raw) => f.write_str(raw),
        }
    }
}

/// Application error returned in-band by Wren-UI. Never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct UpstreamError {
    pub code: UpstreamCode,
    pub message: String,
    pub explanation_query_id: Option<String>,
}

impl UpstreamError {
    pub fn is_non_sql(&self) -> bool {
        self.code == UpstreamCode::NonSqlQuery
    }
}
