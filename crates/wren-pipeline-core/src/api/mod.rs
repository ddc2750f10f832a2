pub mod client;
pub mod error;
pub mod retry;
pub mod sse;
pub mod types;

use async_trait::async_trait;

pub use client::WrenClient;
pub use error::{ApiError, UpstreamCode, UpstreamError};
pub use retry::{RetryPolicy, retry_with_backoff};
pub use sse::{EventStream, ExplanationStream};
pub use types::{
    AskResponse, ChartResponse, Column, GenerateSqlResponse, QueryResult, QuestionRequest,
    Record, RunSqlRequest, SqlQuestionRequest, StreamEvent, SummaryResponse,
};

/// The Wren-UI operations a turn needs. [`WrenClient`] is the HTTP
/// implementation; tests drive turns with scripted fakes.
#[async_trait]
pub trait Upstream: Send + Sync + 'static {
    /// One-shot question to SQL and summary (`/api/v1/ask`).
    async fn ask(&self, request: QuestionRequest) -> Result<AskResponse, ApiError>;

    /// Non-streaming SQL generation (`/api/v1/generate_sql`).
    async fn generate_sql(&self, request: QuestionRequest)
    -> Result<GenerateSqlResponse, ApiError>;

    async fn run_sql(&self, request: RunSqlRequest) -> Result<QueryResult, ApiError>;

    async fn generate_summary(
        &self,
        request: SqlQuestionRequest,
    ) -> Result<SummaryResponse, ApiError>;

    async fn generate_vega_chart(
        &self,
        request: SqlQuestionRequest,
    ) -> Result<ChartResponse, ApiError>;

    /// Open the reasoning event stream for one question.
    async fn stream_reasoning(&self, request: QuestionRequest) -> Result<EventStream, ApiError>;

    /// Open the explanation stream for a non-SQL question.
    async fn stream_explanation(&self, query_id: &str) -> Result<ExplanationStream, ApiError>;
}
