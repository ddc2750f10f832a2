//! Wire types for the Wren-UI REST and streaming endpoints.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{UpstreamCode, UpstreamError};

pub type Record = Map<String, Value>;

/// `{question, threadId?}` body shared by the ask and SQL generation endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRequest {
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

impl QuestionRequest {
    pub fn new(question: impl Into<String>, thread_id: Option<String>) -> Self {
        Self {
            question: question.into(),
            thread_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSqlRequest {
    pub sql: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

/// Body for endpoints that need both the question and the SQL answering it
/// (summary and chart generation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlQuestionRequest {
    pub question: String,
    pub sql: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

/// In-band failure fields every Wren-UI JSON response may carry.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub explanation_query_id: Option<String>,
}

impl Failure {
    /// Present when the body carries an `error`, or a `code` without one.
    pub fn as_error(&self) -> Option<UpstreamError> {
        if self.error.is_none() && self.code.is_none() {
            return None;
        }
        Some(UpstreamError {
            code: UpstreamCode::from_code(self.code.as_deref().unwrap_or("UNKNOWN")),
            message: error_message(self.error.as_ref()),
            explanation_query_id: self.explanation_query_id.clone(),
        })
    }
}

/// Wren-UI reports `error` as a plain string or as an object carrying a
/// `message`; anything else is shown as its JSON text.
fn error_message(error: Option<&Value>) -> String {
    match error {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "Unknown error".to_string(),
        Some(Value::Object(obj)) => obj
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| Value::Object(obj.clone()).to_string(), str::to_string),
        Some(other) => other.to_string(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(flatten)]
    pub failure: Failure,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateSqlResponse {
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(flatten)]
    pub failure: Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type", default)]
    pub column_type: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: None,
        }
    }
}

/// Tabular result of `/api/v1/run_sql`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    #[serde(default)]
    pub records: Vec<Record>,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub total_rows: u64,
    #[serde(flatten)]
    pub failure: Failure,
}

impl QueryResult {
    /// Reported row count, never less than the number of records received.
    pub fn total_rows(&self) -> u64 {
        self.total_rows.max(self.records.len() as u64)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(flatten)]
    pub failure: Failure,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartResponse {
    #[serde(default)]
    pub vega_spec: Option<Value>,
    #[serde(flatten)]
    pub failure: Failure,
}

/// Progress checkpoint named in a `state` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    SqlGenerationStart,
    SqlGenerationSuccess,
    SqlGenerationFailed,
    SqlExecutionStart,
    SqlExecutionEnd,
    Other(String),
}

impl Phase {
    pub fn from_name(name: &str) -> Self {
        match name {
            "sql_generation_start" => Self::SqlGenerationStart,
            "sql_generation_success" => Self::SqlGenerationSuccess,
            "sql_generation_failed" => Self::SqlGenerationFailed,
            "sql_execution_start" => Self::SqlExecutionStart,
            "sql_execution_end" => Self::SqlExecutionEnd,
            other => Self::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateData {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub rephrased_question: Option<String>,
    #[serde(default)]
    pub retrieved_tables: Option<Vec<String>>,
    #[serde(default)]
    pub sql: Option<String>,
}

impl StateData {
    pub fn phase(&self) -> Option<Phase> {
        self.state.as_deref().map(Phase::from_name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type", default)]
    pub block_type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

impl Delta {
    pub fn text(&self) -> &str {
        self.text
            .as_deref()
            .filter(|t| !t.is_empty())
            .or(self.value.as_deref())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorData {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub explanation_query_id: Option<String>,
}

impl ErrorData {
    pub fn to_upstream_error(&self) -> UpstreamError {
        UpstreamError {
            code: UpstreamCode::from_code(self.code.as_deref().unwrap_or("UNKNOWN")),
            message: error_message(self.error.as_ref()),
            explanation_query_id: self.explanation_query_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopData {
    #[serde(default)]
    pub thread_id: Option<String>,
}

/// One decoded frame of the reasoning stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart,
    State {
        #[serde(default)]
        data: StateData,
    },
    ContentBlockStart {
        #[serde(default)]
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        #[serde(default)]
        delta: Delta,
    },
    ContentBlockStop,
    Error {
        #[serde(default)]
        data: ErrorData,
    },
    MessageStop {
        #[serde(default)]
        data: StopData,
    },
    /// Frame that was not JSON or not a known event, kept verbatim.
    #[serde(skip)]
    Raw(String),
}

impl StreamEvent {
    /// Decode one `data:` payload. Blank payloads yield nothing; anything
    /// unparsable becomes [`StreamEvent::Raw`].
    pub fn decode(data: &str) -> Option<Self> {
        let text = data.trim();
        if text.is_empty() {
            return None;
        }
        Some(
            serde_json::from_str::<StreamEvent>(text)
                .unwrap_or_else(|_| StreamEvent::Raw(text.to_string())),
        )
    }
}

/// One frame of `/api/v1/stream_explanation`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ExplanationFrame {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub done: bool,
}

impl ExplanationFrame {
    pub fn decode(data: &str) -> Option<Self> {
        let text = data.trim();
        if text.is_empty() {
            return None;
        }
        serde_json::from_str(text).ok()
    }
}
