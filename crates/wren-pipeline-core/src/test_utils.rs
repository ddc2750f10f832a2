//! Test utilities for wren-pipeline-core
//!
//! A scripted [`Upstream`] that answers from canned responses and records
//! every call, so turns can be exercised without a Wren-UI instance.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures_util::stream;
use serde_json::Value;

use crate::api::error::{ApiError, SseParseError};
use crate::api::sse::{EventStream, ExplanationStream};
use crate::api::types::{
    AskResponse, ChartResponse, Column, ExplanationFrame, GenerateSqlResponse, QueryResult,
    QuestionRequest, Record, RunSqlRequest, SqlQuestionRequest, StateData, StreamEvent,
    SummaryResponse,
};
use crate::api::Upstream;

/// One recorded upstream call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Ask(QuestionRequest),
    GenerateSql(QuestionRequest),
    RunSql(RunSqlRequest),
    GenerateSummary(SqlQuestionRequest),
    GenerateVegaChart(SqlQuestionRequest),
    StreamReasoning(QuestionRequest),
    StreamExplanation(String),
}

#[derive(Default)]
struct Script {
    reasoning: Vec<StreamEvent>,
    fail_reasoning: bool,
    interrupt_reasoning: bool,
    explanation: Vec<ExplanationFrame>,
    fail_explanation: bool,
    interrupt_explanation: bool,
    ask: AskResponse,
    generate_sql: GenerateSqlResponse,
    run_sql: QueryResult,
    fail_run_sql: bool,
    summary: SummaryResponse,
    chart: ChartResponse,
}

#[derive(Default)]
pub struct ScriptedUpstream {
    script: Mutex<Script>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: Call) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    /// Events every reasoning stream yields, in order.
    pub fn with_reasoning(self, events: Vec<StreamEvent>) -> Self {
        self.script().reasoning = events;
        self
    }

    /// Make opening the reasoning stream fail with a connection error.
    pub fn with_reasoning_failure(self) -> Self {
        self.script().fail_reasoning = true;
        self
    }

    /// End the reasoning stream with a transport error after its events.
    pub fn with_reasoning_interrupted(self) -> Self {
        self.script().interrupt_reasoning = true;
        self
    }

    pub fn with_explanation(self, frames: Vec<ExplanationFrame>) -> Self {
        self.script().explanation = frames;
        self
    }

    /// Make opening the explanation stream fail.
    pub fn with_explanation_failure(self) -> Self {
        self.script().fail_explanation = true;
        self
    }

    /// End the explanation stream with a transport error after its frames.
    pub fn with_explanation_interrupted(self) -> Self {
        self.script().interrupt_explanation = true;
        self
    }

    pub fn with_ask(self, response: AskResponse) -> Self {
        self.script().ask = response;
        self
    }

    pub fn with_generate_sql(self, response: GenerateSqlResponse) -> Self {
        self.script().generate_sql = response;
        self
    }

    pub fn with_run_sql(self, response: QueryResult) -> Self {
        self.script().run_sql = response;
        self
    }

    /// Make run_sql time out.
    pub fn with_run_sql_failure(self) -> Self {
        self.script().fail_run_sql = true;
        self
    }

    pub fn with_summary(self, response: SummaryResponse) -> Self {
        self.script().summary = response;
        self
    }

    pub fn with_chart(self, response: ChartResponse) -> Self {
        self.script().chart = response;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl Upstream for ScriptedUpstream {
    async fn ask(&self, request: QuestionRequest) -> Result<AskResponse, ApiError> {
        self.record(Call::Ask(request));
        Ok(self.script().ask.clone())
    }

    async fn generate_sql(
        &self,
        request: QuestionRequest,
    ) -> Result<GenerateSqlResponse, ApiError> {
        self.record(Call::GenerateSql(request));
        Ok(self.script().generate_sql.clone())
    }

    async fn run_sql(&self, request: RunSqlRequest) -> Result<QueryResult, ApiError> {
        self.record(Call::RunSql(request));
        let script = self.script();
        if script.fail_run_sql {
            return Err(ApiError::Timeout {
                path: "/api/v1/run_sql".to_string(),
            });
        }
        Ok(script.run_sql.clone())
    }

    async fn generate_summary(
        &self,
        request: SqlQuestionRequest,
    ) -> Result<SummaryResponse, ApiError> {
        self.record(Call::GenerateSummary(request));
        Ok(self.script().summary.clone())
    }

    async fn generate_vega_chart(
        &self,
        request: SqlQuestionRequest,
    ) -> Result<ChartResponse, ApiError> {
        self.record(Call::GenerateVegaChart(request));
        Ok(self.script().chart.clone())
    }

    async fn stream_reasoning(&self, request: QuestionRequest) -> Result<EventStream, ApiError> {
        self.record(Call::StreamReasoning(request));
        let script = self.script();
        if script.fail_reasoning {
            return Err(ApiError::Connection {
                path: "/api/v1/stream/ask".to_string(),
                details: "connection refused".to_string(),
            });
        }
        let mut events: Vec<Result<StreamEvent, ApiError>> =
            script.reasoning.iter().cloned().map(Ok).collect();
        if script.interrupt_reasoning {
            events.push(Err(connection_reset()));
        }
        Ok(Box::pin(stream::iter(events)))
    }

    async fn stream_explanation(&self, query_id: &str) -> Result<ExplanationStream, ApiError> {
        self.record(Call::StreamExplanation(query_id.to_string()));
        let script = self.script();
        if script.fail_explanation {
            return Err(ApiError::Status {
                path: "/api/v1/stream_explanation".to_string(),
                status: 404,
                body: "unknown query id".to_string(),
            });
        }
        let mut frames: Vec<Result<ExplanationFrame, ApiError>> =
            script.explanation.iter().cloned().map(Ok).collect();
        if script.interrupt_explanation {
            frames.push(Err(connection_reset()));
        }
        Ok(Box::pin(stream::iter(frames)))
    }
}

fn connection_reset() -> ApiError {
    ApiError::Stream(SseParseError::Transport {
        details: "connection reset".to_string(),
    })
}

/// A `state` event carrying only a phase name.
pub fn phase(name: &str) -> StreamEvent {
    StreamEvent::State {
        data: StateData {
            state: Some(name.to_string()),
            ..StateData::default()
        },
    }
}

/// `sql_generation_success` with the generated SQL.
pub fn sql_generated(sql: &str) -> StreamEvent {
    StreamEvent::State {
        data: StateData {
            state: Some("sql_generation_success".to_string()),
            sql: Some(sql.to_string()),
            ..StateData::default()
        },
    }
}

pub fn explanation(messages: &[&str]) -> Vec<ExplanationFrame> {
    messages
        .iter()
        .map(|m| ExplanationFrame {
            message: Some((*m).to_string()),
            done: false,
        })
        .chain(std::iter::once(ExplanationFrame {
            message: None,
            done: true,
        }))
        .collect()
}

/// Build a run_sql result from JSON objects and column names.
pub fn query_result(rows: Vec<Value>, columns: &[&str]) -> QueryResult {
    let records: Vec<Record> = rows
        .into_iter()
        .filter_map(|row| match row {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect();
    QueryResult {
        total_rows: records.len() as u64,
        records,
        columns: columns.iter().map(|c| Column::new(*c)).collect(),
        ..QueryResult::default()
    }
}
