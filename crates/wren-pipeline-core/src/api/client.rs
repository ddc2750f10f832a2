use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::api::Upstream;
use crate::api::error::ApiError;
use crate::api::retry::{RetryPolicy, retry_with_backoff};
use crate::api::sse::{
    EventStream, ExplanationStream, SseStream, decode_events, decode_explanation,
    parse_sse_stream,
};
use crate::api::types::{
    AskResponse, ChartResponse, GenerateSqlResponse, QueryResult, QuestionRequest,
    RunSqlRequest, SqlQuestionRequest, SummaryResponse,
};
use crate::config::{ExplanationParam, PipelineConfig, StreamEndpoint};

pub const ASK_PATH: &str = "/api/v1/ask";
pub const GENERATE_SQL_PATH: &str = "/api/v1/generate_sql";
pub const RUN_SQL_PATH: &str = "/api/v1/run_sql";
pub const GENERATE_SUMMARY_PATH: &str = "/api/v1/generate_summary";
pub const GENERATE_VEGA_CHART_PATH: &str = "/api/v1/generate_vega_chart";
pub const STREAM_EXPLANATION_PATH: &str = "/api/v1/stream_explanation";

const USER_AGENT: &str = concat!("WrenAI-OpenWebUI-Pipeline/", env!("CARGO_PKG_VERSION"));

/// HTTP client for the Wren-UI REST and SSE endpoints.
#[derive(Clone)]
pub struct WrenClient {
    http_client: reqwest::Client,
    base_url: String,
    read_timeout: Duration,
    retry: RetryPolicy,
    explanation_param: ExplanationParam,
    stream_endpoint: StreamEndpoint,
}

impl WrenClient {
    pub fn new(config: &PipelineConfig) -> Result<Self, ApiError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json; charset=utf-8"),
        );
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json; charset=utf-8"),
        );
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static(USER_AGENT),
        );
        headers.insert(
            header::CONNECTION,
            header::HeaderValue::from_static("keep-alive"),
        );

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .build()
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            read_timeout: config.read_timeout,
            retry: config.retry.clone(),
            explanation_param: config.explanation_param,
            stream_endpoint: config.stream_endpoint,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Issue a JSON call with retries.
    ///
    /// A 4xx/5xx response whose body is JSON is returned as `Ok`, since Wren-UI
    /// encodes application errors (`{"code": "NON_SQL_QUERY", ...}`) that way.
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        timeout: Option<Duration>,
    ) -> Result<Value, ApiError> {
        let timeout = timeout.unwrap_or(self.read_timeout);
        retry_with_backoff(&self.retry, path, |attempt| {
            let method = method.clone();
            async move {
                debug!(target: "wren::client", path, attempt = attempt + 1, "Sending request");
                self.call_once(method, path, body, timeout).await
            }
        })
        .await
    }

    async fn call_once(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        timeout: Duration,
    ) -> Result<Value, ApiError> {
        let mut request = self
            .http_client
            .request(method, self.url(path))
            .timeout(timeout);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::from_reqwest(path, &e))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::from_reqwest(path, &e))?;

        if status.is_client_error() || status.is_server_error() {
            return match serde_json::from_str::<Value>(&text) {
                Ok(value) => {
                    warn!(
                        target: "wren::client",
                        path,
                        status = status.as_u16(),
                        body = %value,
                        "Wren-UI returned an error body"
                    );
                    Ok(value)
                }
                Err(_) => Err(ApiError::Status {
                    path: path.to_string(),
                    status: status.as_u16(),
                    body: text,
                }),
            };
        }

        serde_json::from_str(&text).map_err(|e| ApiError::ResponseParsing {
            path: path.to_string(),
            details: format!("Error: {e}, Body: {text}"),
        })
    }

    pub async fn post_json<P, T>(&self, path: &str, payload: &P) -> Result<T, ApiError>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(payload)
            .map_err(|e| ApiError::InvalidRequest(format!("Unserializable payload: {e}")))?;
        let value = self.call(Method::POST, path, Some(&body), None).await?;
        serde_json::from_value(value).map_err(|e| ApiError::ResponseParsing {
            path: path.to_string(),
            details: e.to_string(),
        })
    }

    async fn open_stream(
        &self,
        request: reqwest::RequestBuilder,
        path: &str,
    ) -> Result<SseStream, ApiError> {
        let response = request
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| ApiError::from_reqwest(path, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                path: path.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        info!(target: "wren::client", path, "Stream opened");
        Ok(parse_sse_stream(response.bytes_stream()))
    }

    async fn stream_on(
        &self,
        endpoint: StreamEndpoint,
        payload: &QuestionRequest,
    ) -> Result<EventStream, ApiError> {
        let path = endpoint.path();
        let request = self.http_client.post(self.url(path)).json(payload);
        let sse = self.open_stream(request, path).await?;
        Ok(decode_events(sse))
    }

    pub async fn stream_ask(&self, payload: &QuestionRequest) -> Result<EventStream, ApiError> {
        self.stream_on(StreamEndpoint::Ask, payload).await
    }

    pub async fn stream_generate_sql(
        &self,
        payload: &QuestionRequest,
    ) -> Result<EventStream, ApiError> {
        self.stream_on(StreamEndpoint::GenerateSql, payload).await
    }

    /// Open the reasoning stream on the configured endpoint.
    pub async fn stream_question(&self, payload: &QuestionRequest) -> Result<EventStream, ApiError> {
        self.stream_on(self.stream_endpoint, payload).await
    }

    pub async fn stream_explanation_frames(
        &self,
        query_id: &str,
    ) -> Result<ExplanationStream, ApiError> {
        let request = self
            .http_client
            .get(self.url(STREAM_EXPLANATION_PATH))
            .query(&[(self.explanation_param.to_string(), query_id)]);
        let sse = self.open_stream(request, STREAM_EXPLANATION_PATH).await?;
        Ok(decode_explanation(sse))
    }
}

#[async_trait]
impl Upstream for WrenClient {
    async fn ask(&self, request: QuestionRequest) -> Result<AskResponse, ApiError> {
        info!(target: "wren::client", question = %request.question, "Asking question");
        self.post_json(ASK_PATH, &request).await
    }

    async fn generate_sql(
        &self,
        request: QuestionRequest,
    ) -> Result<GenerateSqlResponse, ApiError> {
        self.post_json(GENERATE_SQL_PATH, &request).await
    }

    async fn run_sql(&self, request: RunSqlRequest) -> Result<QueryResult, ApiError> {
        debug!(
            target: "wren::client",
            sql = %request.sql.chars().take(100).collect::<String>(),
            "Running SQL"
        );
        let result: QueryResult = self.post_json(RUN_SQL_PATH, &request).await?;
        info!(
            target: "wren::client",
            records = result.records.len(),
            "SQL execution returned"
        );
        Ok(result)
    }

    async fn generate_summary(
        &self,
        request: SqlQuestionRequest,
    ) -> Result<SummaryResponse, ApiError> {
        self.post_json(GENERATE_SUMMARY_PATH, &request).await
    }

    async fn generate_vega_chart(
        &self,
        request: SqlQuestionRequest,
    ) -> Result<ChartResponse, ApiError> {
        let question = request.question.trim();
        let sql = request.sql.trim();
        if question.is_empty() {
            return Err(ApiError::InvalidRequest(
                "Question is required for chart generation".to_string(),
            ));
        }
        if sql.is_empty() {
            return Err(ApiError::InvalidRequest(
                "SQL query is required for chart generation".to_string(),
            ));
        }
        let payload = SqlQuestionRequest {
            question: question.to_string(),
            sql: sql.to_string(),
            thread_id: request.thread_id,
        };
        self.post_json(GENERATE_VEGA_CHART_PATH, &payload).await
    }

    async fn stream_reasoning(&self, request: QuestionRequest) -> Result<EventStream, ApiError> {
        self.stream_question(&request).await
    }

    async fn stream_explanation(&self, query_id: &str) -> Result<ExplanationStream, ApiError> {
        self.stream_explanation_frames(query_id).await
    }
}
