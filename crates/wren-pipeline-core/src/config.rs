use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::api::retry::RetryPolicy;
use crate::error::{Error, Result};
use crate::session::SessionRegistryConfig;

pub const DEFAULT_MODEL_NAME: &str = "WrenAI Database Query (Streaming)";
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_ROWS: usize = 500;
pub const DEFAULT_CHUNK_SIZE: usize = 2000;

/// Query parameter carrying the explanation id on `/api/v1/stream_explanation`.
///
/// Deployed Wren-UI revisions disagree on the name, so it is configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize)]
pub enum ExplanationParam {
    #[default]
    #[strum(serialize = "queryId")]
    #[serde(rename = "queryId")]
    QueryId,
    #[strum(serialize = "explanationQueryId")]
    #[serde(rename = "explanationQueryId")]
    ExplanationQueryId,
}

/// Which streaming endpoint drives the reasoning phase of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StreamEndpoint {
    #[default]
    Ask,
    GenerateSql,
}

impl StreamEndpoint {
    pub fn path(self) -> &'static str {
        match self {
            StreamEndpoint::Ask => "/api/v1/stream/ask",
            StreamEndpoint::GenerateSql => "/api/v1/stream/generate_sql",
        }
    }
}

/// Runtime configuration for a pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Base URL of the Wren-UI service, without a trailing `/api/...` path.
    pub base_url: String,
    pub read_timeout: Duration,
    pub connect_timeout: Duration,
    /// Maximum number of table rows rendered per result.
    pub max_rows: usize,
    /// Display name reported to the chat host.
    pub model_name: String,
    pub retry: RetryPolicy,
    pub explanation_param: ExplanationParam,
    pub stream_endpoint: StreamEndpoint,
    pub session: SessionRegistryConfig,
    /// Upper bound, in bytes, for a single emitted table fragment.
    pub chunk_size: usize,
}

impl PipelineConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            max_rows: DEFAULT_MAX_ROWS,
            model_name: DEFAULT_MODEL_NAME.to_string(),
            retry: RetryPolicy::default(),
            explanation_param: ExplanationParam::default(),
            stream_endpoint: StreamEndpoint::default(),
            session: SessionRegistryConfig::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Build a configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("WREN_UI_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| Error::Configuration("WREN_UI_URL is not set".to_string()))?;

        let mut config = Self::new(base_url.trim());

        if let Some(secs) = parse_var::<u64, _>(&lookup, "WREN_UI_TIMEOUT")? {
            config.read_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "WREN_UI_CONNECT_TIMEOUT")? {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(rows) = parse_var(&lookup, "MAX_ROWS")? {
            config.max_rows = rows;
        }
        if let Some(name) = lookup("MODEL_NAME").filter(|v| !v.trim().is_empty()) {
            config.model_name = name;
        }
        if let Some(attempts) = parse_var(&lookup, "WREN_UI_RETRIES")? {
            config.retry.max_attempts = attempts;
        }
        if let Some(param) = parse_var(&lookup, "WREN_EXPLANATION_PARAM")? {
            config.explanation_param = param;
        }
        if let Some(endpoint) = parse_var(&lookup, "WREN_STREAM_ENDPOINT")? {
            config.stream_endpoint = endpoint;
        }
        if let Some(max) = parse_var(&lookup, "WREN_MAX_SESSIONS")? {
            config.session.max_sessions = max;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "WREN_SESSION_IDLE_SECS")? {
            config.session.idle_timeout = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }

    pub fn with_model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_explanation_param(mut self, param: ExplanationParam) -> Self {
        self.explanation_param = param;
        self
    }

    pub fn with_stream_endpoint(mut self, endpoint: StreamEndpoint) -> Self {
        self.stream_endpoint = endpoint;
        self
    }

    pub fn with_session(mut self, session: SessionRegistryConfig) -> Self {
        self.session = session;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let parsed = url::Url::parse(&self.base_url).map_err(|e| {
            Error::Configuration(format!("Invalid WREN_UI_URL '{}': {e}", self.base_url))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::Configuration(format!(
                "WREN_UI_URL must use http or https, got '{}'",
                parsed.scheme()
            )));
        }
        if self.max_rows == 0 {
            return Err(Error::Configuration("MAX_ROWS must be > 0".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Configuration(
                "WREN_UI_RETRIES must be > 0".to_string(),
            ));
        }
        if self.session.max_sessions == 0 {
            return Err(Error::Configuration(
                "WREN_MAX_SESSIONS must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Configuration(format!("Invalid value '{raw}' for {key}: {e}"))),
    }
}
