//! Entry point the chat host calls once per user message.

use std::fmt;
use std::sync::Arc;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{Display, EnumString};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::api::{Upstream, WrenClient};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::session::{SessionId, SessionRegistry};
use crate::turn::{FragmentStream, Input, TurnRuntime, TurnSettings, answer_once, classify};

pub const EMPTY_QUESTION: &str = "Please enter a question.";
pub const NO_SQL_ADVISORY: &str = "⚠️ **No SQL query found in this chat yet.**\n\nAsk a data question first, then send **Show chart**.";
pub const NO_QUESTION_ADVISORY: &str = "⚠️ **No question found in this chat yet.**\n\nAsk a data question first, then send **Show chart**.";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PipelineMode {
    /// Stream reasoning, SQL and results as they arrive.
    #[default]
    Streaming,
    /// One ask call and one execution, answered as a single document.
    OneShot,
}

/// Reply to one user message.
pub enum PipeOutput {
    Text(String),
    Stream(FragmentStream),
}

impl PipeOutput {
    /// Concatenate every fragment into one string.
    pub async fn collect(self) -> String {
        match self {
            PipeOutput::Text(text) => text,
            PipeOutput::Stream(stream) => stream.collect::<Vec<String>>().await.concat(),
        }
    }

    pub fn into_stream(self) -> FragmentStream {
        match self {
            PipeOutput::Text(text) => Box::pin(futures_util::stream::once(async move { text })),
            PipeOutput::Stream(stream) => stream,
        }
    }
}

impl fmt::Debug for PipeOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipeOutput::Text(text) => f.debug_tuple("Text").field(text).finish(),
            PipeOutput::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    mode: PipelineMode,
    runtime: TurnRuntime,
}

impl Pipeline {
    /// Pipeline talking to the Wren-UI instance named in `config`.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let client = WrenClient::new(&config)?;
        Self::with_upstream(config, Arc::new(client))
    }

    pub fn with_upstream(config: PipelineConfig, upstream: Arc<dyn Upstream>) -> Result<Self> {
        let sessions = Arc::new(SessionRegistry::new(config.session.clone())?);
        let settings = TurnSettings {
            max_rows: config.max_rows,
            chunk_size: config.chunk_size,
        };
        Ok(Self {
            runtime: TurnRuntime::new(upstream, sessions, settings),
            mode: PipelineMode::default(),
            config,
        })
    }

    pub fn with_mode(mut self, mode: PipelineMode) -> Self {
        self.mode = mode;
        self
    }

    /// Display name reported to the chat host.
    pub fn name(&self) -> &str {
        &self.config.model_name
    }

    pub fn mode(&self) -> PipelineMode {
        self.mode
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        self.runtime.sessions()
    }

    pub async fn on_startup(&self) {
        info!(
            target: "wren::pipeline",
            name = %self.config.model_name,
            base_url = %self.config.base_url,
            mode = %self.mode,
            "Pipeline started"
        );
    }

    pub async fn on_shutdown(&self) {
        info!(
            target: "wren::pipeline",
            sessions = self.sessions().len(),
            "Pipeline shutting down"
        );
    }

    /// Answer one user message.
    ///
    /// Only `user_message` is used as the question; `messages` (the host's
    /// history) is ignored since Wren-UI keeps its own thread. The session is
    /// resolved from `body.metadata`.
    pub async fn pipe(
        &self,
        user_message: &str,
        model_id: &str,
        messages: &[Value],
        body: &Value,
    ) -> PipeOutput {
        self.pipe_with_cancel(user_message, model_id, messages, body, CancellationToken::new())
            .await
    }

    pub async fn pipe_with_cancel(
        &self,
        user_message: &str,
        model_id: &str,
        _messages: &[Value],
        body: &Value,
        cancel: CancellationToken,
    ) -> PipeOutput {
        let session_id = SessionId::from_body(body);
        debug!(target: "wren::pipeline", session_id = %session_id, model_id, "Received message");

        match classify(user_message) {
            Input::Empty => PipeOutput::Text(EMPTY_QUESTION.to_string()),
            Input::Synthetic => {
                debug!(target: "wren::pipeline", session_id = %session_id, "Ignoring host-generated prompt");
                PipeOutput::Text(String::new())
            }
            Input::ChartCommand => self.chart(session_id, cancel),
            Input::Question(question) => match self.mode {
                PipelineMode::Streaming => {
                    PipeOutput::Stream(self.runtime.question(session_id, question, cancel))
                }
                PipelineMode::OneShot => PipeOutput::Text(
                    answer_once(
                        self.runtime.upstream().as_ref(),
                        self.sessions(),
                        &session_id,
                        &question,
                        self.config.max_rows,
                    )
                    .await,
                ),
            },
        }
    }

    fn chart(&self, session_id: SessionId, cancel: CancellationToken) -> PipeOutput {
        let snapshot = self.sessions().snapshot(&session_id).unwrap_or_default();
        let Some(sql) = snapshot.last_sql.filter(|s| !s.trim().is_empty()) else {
            return PipeOutput::Text(NO_SQL_ADVISORY.to_string());
        };
        let Some(question) = snapshot.last_question.filter(|q| !q.trim().is_empty()) else {
            return PipeOutput::Text(NO_QUESTION_ADVISORY.to_string());
        };
        PipeOutput::Stream(self.runtime.chart(session_id, question, sql, cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::{
        AskResponse, ChartResponse, ErrorData, ExplanationFrame, Failure, GenerateSqlResponse,
        QueryResult, QuestionRequest, StateData, StopData, StreamEvent, SummaryResponse,
    };
    use crate::test_utils::{Call, ScriptedUpstream, explanation, phase, query_result, sql_generated};
    use serde_json::json;

    fn pipeline(upstream: Arc<ScriptedUpstream>) -> Pipeline {
        Pipeline::with_upstream(PipelineConfig::new("http://wren-ui:3000"), upstream).unwrap()
    }

    fn body(chat_id: &str) -> Value {
        json!({ "metadata": { "chat_id": chat_id } })
    }

    async fn run(pipeline: &Pipeline, message: &str, chat_id: &str) -> String {
        pipeline
            .pipe(message, "wren", &[], &body(chat_id))
            .await
            .collect()
            .await
    }

    fn sales_upstream() -> ScriptedUpstream {
        ScriptedUpstream::new()
            .with_reasoning(vec![
                StreamEvent::MessageStart,
                sql_generated("SELECT region, SUM(sales) FROM orders GROUP BY region"),
                phase("sql_execution_start"),
                phase("sql_execution_end"),
                StreamEvent::MessageStop {
                    data: StopData {
                        thread_id: Some("thread-1".to_string()),
                    },
                },
            ])
            .with_run_sql(query_result(
                vec![
                    json!({"region": "EU", "sales": 1200}),
                    json!({"region": "US", "sales": 3400}),
                    json!({"region": "APAC", "sales": 560}),
                ],
                &["region", "sales"],
            ))
    }

    #[tokio::test]
    async fn test_sales_question_renders_table() {
        let upstream = Arc::new(sales_upstream());
        let pipeline = pipeline(upstream.clone());

        let output = run(&pipeline, "show total sales by region", "chat-1").await;

        let table = "| region | sales |\n\
                     | --- | --- |\n\
                     | EU | 1,200 |\n\
                     | US | 3,400 |\n\
                     | APAC | 560 |\n\
                     \n\
                     **Total rows:** 3";
        assert!(output.contains(table), "output was:\n{output}");
        assert!(output.contains("```sql\nSELECT region, SUM(sales) FROM orders GROUP BY region\n```"));
        assert!(output.contains("Show chart"));

        let snapshot = pipeline.sessions().snapshot(&SessionId::from("chat-1")).unwrap();
        assert_eq!(snapshot.thread_id.as_deref(), Some("thread-1"));
        assert_eq!(
            snapshot.last_sql.as_deref(),
            Some("SELECT region, SUM(sales) FROM orders GROUP BY region")
        );
        assert_eq!(
            snapshot.last_question.as_deref(),
            Some("show total sales by region")
        );

        let run_sql_calls = upstream
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::RunSql(_)))
            .count();
        assert_eq!(run_sql_calls, 1);
    }

    #[tokio::test]
    async fn test_non_sql_question_streams_explanation() {
        let upstream = Arc::new(
            ScriptedUpstream::new()
                .with_reasoning(vec![StreamEvent::Error {
                    data: ErrorData {
                        code: Some("NON_SQL_QUERY".to_string()),
                        error: Some(json!("Not a data question")),
                        explanation_query_id: Some("abc123".to_string()),
                    },
                }])
                .with_explanation(explanation(&["I", " can", " help..."])),
        );
        let pipeline = pipeline(upstream.clone());

        let output = run(&pipeline, "hello, how are you?", "chat-2").await;

        assert_eq!(output, "I can help...");
        assert!(
            upstream
                .calls()
                .contains(&Call::StreamExplanation("abc123".to_string()))
        );
        assert!(!upstream.calls().iter().any(|c| matches!(c, Call::RunSql(_))));
        assert!(pipeline.sessions().snapshot(&SessionId::from("chat-2")).is_none());
    }

    #[tokio::test]
    async fn test_chart_after_small_talk_uses_last_data_question() {
        let upstream = Arc::new(
            ScriptedUpstream::new()
                .with_reasoning(vec![StreamEvent::Error {
                    data: ErrorData {
                        code: Some("NON_SQL_QUERY".to_string()),
                        error: Some(json!("Not a data question")),
                        explanation_query_id: Some("abc123".to_string()),
                    },
                }])
                .with_explanation(explanation(&["Hello!"]))
                .with_chart(ChartResponse {
                    vega_spec: Some(json!({"mark": "bar"})),
                    ..ChartResponse::default()
                }),
        );
        let pipeline = pipeline(upstream.clone());
        let session = SessionId::from("chat-2b");
        pipeline.sessions().record_turn(
            &session,
            crate::session::TurnRecord {
                question: Some("total sales by region".to_string()),
                sql: Some("SELECT region, SUM(sales) FROM orders GROUP BY region".to_string()),
            },
        );

        assert_eq!(run(&pipeline, "hello, how are you?", "chat-2b").await, "Hello!");
        run(&pipeline, "show chart", "chat-2b").await;

        let request = upstream
            .calls()
            .into_iter()
            .find_map(|c| match c {
                Call::GenerateVegaChart(request) => Some(request),
                _ => None,
            })
            .unwrap();
        assert_eq!(request.question, "total sales by region");
        assert_eq!(
            request.sql,
            "SELECT region, SUM(sales) FROM orders GROUP BY region"
        );
    }

    #[tokio::test]
    async fn test_explanation_open_failure_is_reported() {
        let upstream = Arc::new(
            ScriptedUpstream::new()
                .with_reasoning(vec![StreamEvent::Error {
                    data: ErrorData {
                        code: Some("NON_SQL_QUERY".to_string()),
                        error: None,
                        explanation_query_id: Some("abc123".to_string()),
                    },
                }])
                .with_explanation_failure(),
        );
        let pipeline = pipeline(upstream);

        let output = run(&pipeline, "hello", "chat-2c").await;
        assert!(output.starts_with("\n❌ Explanation failed: "), "output was:\n{output}");
        assert!(output.contains("404"));
    }

    #[tokio::test]
    async fn test_explanation_interrupted_keeps_partial_text() {
        let upstream = Arc::new(
            ScriptedUpstream::new()
                .with_reasoning(vec![StreamEvent::Error {
                    data: ErrorData {
                        code: Some("NON_SQL_QUERY".to_string()),
                        error: None,
                        explanation_query_id: Some("abc123".to_string()),
                    },
                }])
                .with_explanation(vec![ExplanationFrame {
                    message: Some("I can".to_string()),
                    done: false,
                }])
                .with_explanation_interrupted(),
        );
        let pipeline = pipeline(upstream);

        let output = run(&pipeline, "hello", "chat-2d").await;
        assert!(output.starts_with("I can\n❌ Explanation failed: "), "output was:\n{output}");
        assert!(output.contains("connection reset"));
    }

    #[tokio::test]
    async fn test_non_sql_without_id_falls_back_to_ask() {
        let upstream = Arc::new(
            ScriptedUpstream::new()
                .with_reasoning(vec![StreamEvent::Error {
                    data: ErrorData {
                        code: Some("NON_SQL_QUERY".to_string()),
                        ..ErrorData::default()
                    },
                }])
                .with_ask(AskResponse {
                    explanation: Some("Hi!\\nI answer \\\"data\\\" questions.".to_string()),
                    ..AskResponse::default()
                }),
        );
        let pipeline = pipeline(upstream);

        let output = run(&pipeline, "hi there", "chat-3").await;
        assert_eq!(output, "Hi!\nI answer \"data\" questions.");
    }

    #[tokio::test]
    async fn test_chart_without_prior_sql_makes_no_calls() {
        let upstream = Arc::new(ScriptedUpstream::new());
        let pipeline = pipeline(upstream.clone());

        let output = run(&pipeline, "show chart", "chat-4").await;

        assert_eq!(output, NO_SQL_ADVISORY);
        assert_eq!(upstream.call_count(), 0);
    }

    #[tokio::test]
    async fn test_synthetic_prompt_makes_no_calls() {
        let upstream = Arc::new(ScriptedUpstream::new());
        let pipeline = pipeline(upstream.clone());

        let output = run(
            &pipeline,
            "### Task:\nSuggest 3-5 relevant follow-up questions\n<chat_history>\nUSER: hi\n</chat_history>",
            "chat-5",
        )
        .await;

        assert_eq!(output, "");
        assert_eq!(upstream.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_message() {
        let upstream = Arc::new(ScriptedUpstream::new());
        let pipeline = pipeline(upstream.clone());

        assert_eq!(run(&pipeline, "   ", "chat-6").await, EMPTY_QUESTION);
        assert_eq!(upstream.call_count(), 0);
    }

    #[tokio::test]
    async fn test_chart_after_question() {
        let upstream = Arc::new(sales_upstream().with_chart(ChartResponse {
            vega_spec: Some(json!({"mark": "bar"})),
            ..ChartResponse::default()
        }));
        let pipeline = pipeline(upstream.clone());

        run(&pipeline, "show total sales by region", "chat-7").await;
        let output = run(&pipeline, "Show chart", "chat-7").await;

        assert!(output.starts_with("### 📈 Generating chart…\n"));
        assert!(output.contains("```json\n{\"mark\":\"bar\"}\n```\n"));
        assert!(output.contains("[Open in Vega Editor](https://vega.github.io/editor/#/url/vega-lite/"));
        assert!(output.contains("<details><summary>Standalone HTML viewer"));

        let chart_call = upstream.calls().into_iter().find_map(|c| match c {
            Call::GenerateVegaChart(request) => Some(request),
            _ => None,
        });
        let request = chart_call.unwrap();
        assert_eq!(request.question, "show total sales by region");
        assert_eq!(request.thread_id.as_deref(), Some("thread-1"));
    }

    #[tokio::test]
    async fn test_chart_failure_is_reported() {
        let upstream = Arc::new(sales_upstream().with_chart(ChartResponse {
            vega_spec: None,
            failure: Failure {
                code: Some("NO_CHART".to_string()),
                error: Some(json!("Chart not supported for this data")),
                explanation_query_id: None,
            },
        }));
        let pipeline = pipeline(upstream);

        run(&pipeline, "show total sales by region", "chat-8").await;
        let output = run(&pipeline, "chart", "chat-8").await;

        assert!(output.contains("❌ **Chart generation failed** `NO_CHART`\n\nChart not supported for this data\n"));
    }

    #[tokio::test]
    async fn test_follow_up_reuses_thread_and_keeps_first_id() {
        let upstream = Arc::new(sales_upstream());
        let pipeline = pipeline(upstream.clone());

        run(&pipeline, "show total sales by region", "chat-9").await;
        run(&pipeline, "and by year?", "chat-9").await;

        let streams: Vec<QuestionRequest> = upstream
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::StreamReasoning(request) => Some(request),
                _ => None,
            })
            .collect();
        assert_eq!(streams.len(), 2);
        assert_eq!(streams[0].thread_id, None);
        assert_eq!(streams[1].thread_id.as_deref(), Some("thread-1"));
    }

    #[tokio::test]
    async fn test_sql_without_execution_keeps_previous_sql() {
        let upstream = Arc::new(ScriptedUpstream::new().with_reasoning(vec![
            sql_generated("SELECT 2"),
            StreamEvent::MessageStop {
                data: StopData::default(),
            },
        ]));
        let pipeline = pipeline(upstream.clone());
        let session = SessionId::from("chat-10");
        pipeline.sessions().record_turn(
            &session,
            crate::session::TurnRecord {
                question: None,
                sql: Some("SELECT 1".to_string()),
            },
        );

        let output = run(&pipeline, "count orders", "chat-10").await;

        assert!(output.contains("generated but not executed"));
        let snapshot = pipeline.sessions().snapshot(&session).unwrap();
        assert_eq!(snapshot.last_sql.as_deref(), Some("SELECT 1"));
        assert!(!upstream.calls().iter().any(|c| matches!(c, Call::RunSql(_))));
    }

    #[tokio::test]
    async fn test_no_sql_falls_back_to_generate_sql() {
        let upstream = Arc::new(
            ScriptedUpstream::new()
                .with_reasoning(vec![StreamEvent::MessageStart, phase("sql_generation_failed")])
                .with_generate_sql(GenerateSqlResponse {
                    failure: Failure {
                        code: Some("NO_RELEVANT_DATA".to_string()),
                        error: Some(json!("No relevant tables found")),
                        explanation_query_id: None,
                    },
                    ..GenerateSqlResponse::default()
                }),
        );
        let pipeline = pipeline(upstream);

        let output = run(&pipeline, "revenue from mars", "chat-11").await;
        assert!(output.ends_with("\n❌ Error `NO_RELEVANT_DATA`: No relevant tables found\n"));
    }

    #[tokio::test]
    async fn test_no_sql_and_no_error_gives_note() {
        let upstream = Arc::new(
            ScriptedUpstream::new().with_reasoning(vec![StreamEvent::MessageStart]),
        );
        let pipeline = pipeline(upstream);

        let output = run(&pipeline, "something vague", "chat-12").await;
        assert!(output.ends_with("ℹ️ No SQL was produced for this question. Ask a data-related question to get tables and charts.\n"));
    }

    #[tokio::test]
    async fn test_stream_error_is_surfaced_and_question_not_recorded() {
        let upstream = Arc::new(ScriptedUpstream::new().with_reasoning(vec![
            StreamEvent::State {
                data: StateData {
                    state: Some("understanding".to_string()),
                    ..StateData::default()
                },
            },
            StreamEvent::Error {
                data: ErrorData {
                    code: Some("MODEL_OVERLOADED".to_string()),
                    error: Some(json!("try later")),
                    explanation_query_id: None,
                },
            },
        ]));
        let pipeline = pipeline(upstream);

        let output = run(&pipeline, "top products", "chat-13").await;

        assert_eq!(
            output,
            "- understanding\n\n❌ Error `MODEL_OVERLOADED`: try later\n"
        );
        assert!(pipeline.sessions().snapshot(&SessionId::from("chat-13")).is_none());
    }

    #[tokio::test]
    async fn test_interrupted_reasoning_is_surfaced_and_not_recorded() {
        let upstream = Arc::new(
            ScriptedUpstream::new()
                .with_reasoning(vec![
                    StreamEvent::MessageStart,
                    sql_generated("SELECT 1"),
                ])
                .with_reasoning_interrupted(),
        );
        let pipeline = pipeline(upstream.clone());

        let output = run(&pipeline, "top products", "chat-13b").await;

        assert!(output.contains("```sql\nSELECT 1\n```"));
        assert!(output.ends_with("connection reset\n"), "output was:\n{output}");
        assert!(output.contains("\n❌ Streaming failed: "));
        assert!(pipeline.sessions().snapshot(&SessionId::from("chat-13b")).is_none());
        assert!(!upstream.calls().iter().any(|c| matches!(c, Call::RunSql(_))));
    }

    #[tokio::test]
    async fn test_sql_execution_error_in_body_is_reported() {
        let upstream = Arc::new(sales_upstream().with_run_sql(QueryResult {
            failure: Failure {
                code: Some("SQL_EXECUTION_ERROR".to_string()),
                error: Some(json!("Table not found")),
                explanation_query_id: None,
            },
            ..QueryResult::default()
        }));
        let pipeline = pipeline(upstream);

        let output = run(&pipeline, "show total sales by region", "chat-13c").await;

        assert!(
            output.contains("❌ SQL execution error: Table not found\n"),
            "output was:\n{output}"
        );
        assert!(!output.contains("| region |"));
    }

    #[tokio::test]
    async fn test_sql_execution_transport_error_is_reported() {
        let upstream = Arc::new(sales_upstream().with_run_sql_failure());
        let pipeline = pipeline(upstream);

        let output = run(&pipeline, "show total sales by region", "chat-13d").await;

        assert!(
            output.contains("❌ SQL execution error: Request to /api/v1/run_sql timed out\n"),
            "output was:\n{output}"
        );
        // The SQL was still produced, so it stays available for charting.
        let snapshot = pipeline.sessions().snapshot(&SessionId::from("chat-13d")).unwrap();
        assert_eq!(
            snapshot.last_sql.as_deref(),
            Some("SELECT region, SUM(sales) FROM orders GROUP BY region")
        );
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_reported() {
        let upstream = Arc::new(ScriptedUpstream::new().with_reasoning_failure());
        let pipeline = pipeline(upstream);

        let output = run(&pipeline, "top products", "chat-14").await;
        assert!(output.starts_with("\n❌ Streaming failed: "));
    }

    #[tokio::test]
    async fn test_cancelled_turn_stops_early() {
        let upstream = Arc::new(sales_upstream());
        let pipeline = pipeline(upstream.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let output = pipeline
            .pipe_with_cancel("show total sales by region", "wren", &[], &body("chat-15"), cancel)
            .await
            .collect()
            .await;

        assert_eq!(output, "");
        assert!(!upstream.calls().iter().any(|c| matches!(c, Call::RunSql(_))));
    }

    #[tokio::test]
    async fn test_one_shot_mode() {
        let upstream = Arc::new(
            ScriptedUpstream::new()
                .with_ask(AskResponse {
                    sql: Some("SELECT region, SUM(sales) FROM orders GROUP BY region".to_string()),
                    summary: Some("Sales per region.".to_string()),
                    thread_id: Some("thread-9".to_string()),
                    ..AskResponse::default()
                })
                .with_run_sql(query_result(
                    vec![json!({"region": "EU", "sales": 10.5})],
                    &["region", "sales"],
                )),
        );
        let pipeline = pipeline(upstream.clone()).with_mode(PipelineMode::OneShot);

        let output = pipeline
            .pipe("sales by region", "wren", &[], &body("chat-16"))
            .await;
        let PipeOutput::Text(text) = output else {
            panic!("one-shot mode should answer with text");
        };

        assert!(text.starts_with("## 📊 Summary\n\nSales per region.\n\n## 🔍 SQL Query\n\n```sql\n"));
        assert!(text.contains("## 📋 Results (1 rows)\n\n| region | sales |"));
        assert!(text.contains("| EU | 10.50 |"));
        assert_eq!(
            pipeline.sessions().get(&SessionId::from("chat-16")).as_deref(),
            Some("thread-9")
        );
    }

    #[tokio::test]
    async fn test_one_shot_fetches_missing_summary() {
        let upstream = Arc::new(
            ScriptedUpstream::new()
                .with_ask(AskResponse {
                    sql: Some("SELECT region, SUM(sales) FROM orders GROUP BY region".to_string()),
                    ..AskResponse::default()
                })
                .with_summary(SummaryResponse {
                    summary: Some("From summary.".to_string()),
                    ..SummaryResponse::default()
                })
                .with_run_sql(query_result(
                    vec![json!({"region": "EU", "sales": 10})],
                    &["region", "sales"],
                )),
        );
        let pipeline = pipeline(upstream.clone()).with_mode(PipelineMode::OneShot);

        let output = run(&pipeline, "sales by region", "chat-16b").await;

        assert!(output.starts_with("## 📊 Summary\n\nFrom summary."), "output was:\n{output}");
        assert!(
            upstream
                .calls()
                .iter()
                .any(|c| matches!(c, Call::GenerateSummary(r) if r.question == "sales by region"))
        );
    }

    #[tokio::test]
    async fn test_one_shot_error_block() {
        let upstream = Arc::new(ScriptedUpstream::new().with_ask(AskResponse {
            failure: Failure {
                code: Some("NO_RELEVANT_DATA".to_string()),
                error: Some(json!("No relevant data")),
                explanation_query_id: None,
            },
            ..AskResponse::default()
        }));
        let pipeline = pipeline(upstream.clone()).with_mode(PipelineMode::OneShot);

        let output = run(&pipeline, "revenue on mars", "chat-17").await;

        assert!(output.starts_with("## ❌ Database Query Error\n\n**Error:** No relevant data\n\n"));
        assert_eq!(upstream.call_count(), 1);
    }
}
