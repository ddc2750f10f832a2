use std::pin::Pin;
use std::sync::Arc;

use async_stream::stream;
use futures_core::Stream;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::types::{QuestionRequest, RunSqlRequest, SqlQuestionRequest};
use crate::api::{ApiError, Upstream};
use crate::format::{
    chunk_text, clean_escapes, render_chart_link, render_standalone_viewer, render_table,
};
use crate::session::{SessionId, SessionRegistry, TurnRecord};

use super::effect::Effect;
use super::reduce::{NextStep, next_step, reduce};
use super::state::{TurnPhase, TurnState};

/// Markdown fragments of one turn, in delivery order.
pub type FragmentStream = Pin<Box<dyn Stream<Item = String> + Send>>;

pub const RESULTS_HEADING: &str = "\n### 📋 Results\n";
pub const NO_DATA_RETURNED: &str = "_No data returned._\n";
pub const SECTION_BREAK: &str = "\n---\n";
pub const CHART_HINT: &str =
    "➡️ **Type `Show chart`** to render a Vega-Lite chart for this result.\n";
pub const NO_SQL_NOTE: &str = "ℹ️ No SQL was produced for this question. Ask a data-related question to get tables and charts.\n";
pub const NOT_EXECUTED_NOTE: &str = "ℹ️ The SQL above was generated but not executed, so there are no results to show or chart.\n";
pub const NO_EXPLANATION_NOTE: &str = "ℹ️ This question does not need a database query, and no explanation was returned.\n";
pub const CHART_HEADING: &str = "### 📈 Generating chart…\n";
pub const CHART_TITLE: &str = "WrenAI Chart";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnSettings {
    pub max_rows: usize,
    pub chunk_size: usize,
}

#[derive(Debug, Clone)]
enum ExplainVia {
    Stream(String),
    Ask,
}

/// Runs turns against an [`Upstream`], keeping the session registry current.
#[derive(Clone)]
pub struct TurnRuntime {
    upstream: Arc<dyn Upstream>,
    sessions: Arc<SessionRegistry>,
    settings: TurnSettings,
}

impl TurnRuntime {
    pub fn new(
        upstream: Arc<dyn Upstream>,
        sessions: Arc<SessionRegistry>,
        settings: TurnSettings,
    ) -> Self {
        Self {
            upstream,
            sessions,
            settings,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn upstream(&self) -> &Arc<dyn Upstream> {
        &self.upstream
    }

    pub fn settings(&self) -> TurnSettings {
        self.settings
    }

    /// Answer one question: a single reasoning stream, then results,
    /// an explanation, or an error, as the stream dictates.
    ///
    /// The stream ends early when `cancel` fires; dropping it closes any open
    /// upstream connection.
    pub fn question(
        &self,
        session_id: SessionId,
        question: String,
        cancel: CancellationToken,
    ) -> FragmentStream {
        let upstream = Arc::clone(&self.upstream);
        let sessions = Arc::clone(&self.sessions);
        let settings = self.settings;

        let turn = stream! {
            let known_thread = sessions.get(&session_id);
            let mut state = TurnState::new(question.clone(), known_thread.clone());
            info!(
                target: "wren::turn",
                session_id = %session_id,
                thread_id = ?known_thread,
                "Starting turn"
            );

            let request = QuestionRequest::new(question.clone(), known_thread);
            let mut events = match upstream.stream_reasoning(request).await {
                Ok(events) => events,
                Err(e) => {
                    error!(target: "wren::turn", session_id = %session_id, error = %e, "Could not open reasoning stream");
                    yield format!("\n❌ Streaming failed: {e}\n");
                    return;
                }
            };

            let mut explain = None;
            let mut finished = false;
            while !finished {
                let Some(item) = events.next().await else {
                    break;
                };
                let event = match item {
                    Ok(event) => event,
                    Err(e) => {
                        error!(target: "wren::turn", session_id = %session_id, error = %e, "Reasoning stream failed");
                        state.phase = TurnPhase::Failed;
                        yield format!("\n❌ Streaming failed: {e}\n");
                        break;
                    }
                };

                for effect in reduce(&mut state, event) {
                    match effect {
                        Effect::Emit(text) => {
                            yield text;
                        }
                        Effect::CaptureThreadId(thread_id) => {
                            sessions.set(&session_id, &thread_id);
                        }
                        Effect::OpenExplanation(query_id) => {
                            explain = Some(ExplainVia::Stream(query_id));
                            finished = true;
                        }
                        Effect::FallbackExplain => {
                            explain = Some(ExplainVia::Ask);
                            finished = true;
                        }
                        Effect::Finish => finished = true,
                    }
                }
            }
            // The explanation stream must not overlap the reasoning stream.
            drop(events);

            if state.phase == TurnPhase::Failed {
                debug!(target: "wren::turn", session_id = %session_id, "Turn failed");
                return;
            }

            // Only data turns become the question a later chart request refers to.
            let asked = state.effective_question().trim().to_string();

            if let Some(via) = explain {
                let mut fragments = explanation_fragments(
                    Arc::clone(&upstream),
                    via,
                    question.clone(),
                    state.thread_id.clone(),
                );
                while let Some(fragment) = fragments.next().await {
                    yield fragment;
                }
                return;
            }

            match next_step(&state) {
                NextStep::Execute { sql } => {
                    sessions.record_turn(
                        &session_id,
                        TurnRecord {
                            question: Some(asked),
                            sql: Some(sql.clone()),
                        },
                    );
                    let mut fragments = result_fragments(
                        Arc::clone(&upstream),
                        sql,
                        state.thread_id.clone(),
                        settings,
                    );
                    while let Some(fragment) = fragments.next().await {
                        yield fragment;
                    }
                    yield SECTION_BREAK.to_string();
                    yield CHART_HINT.to_string();
                }
                NextStep::NotExecuted => {
                    sessions.record_turn(
                        &session_id,
                        TurnRecord {
                            question: Some(asked),
                            sql: None,
                        },
                    );
                    yield SECTION_BREAK.to_string();
                    yield NOT_EXECUTED_NOTE.to_string();
                }
                NextStep::ResolveWithoutSql => {
                    info!(target: "wren::turn", session_id = %session_id, "No SQL streamed, asking generate_sql why");
                    let request = QuestionRequest::new(question.clone(), state.thread_id.clone());
                    match upstream.generate_sql(request).await {
                        Err(e) => {
                            yield render_api_error(&e);
                        }
                        Ok(response) => {
                            if state.thread_id.is_none() {
                                if let Some(thread_id) = response.thread_id.as_deref().filter(|t| !t.is_empty()) {
                                    state.thread_id = Some(thread_id.to_string());
                                    sessions.set(&session_id, thread_id);
                                }
                            }
                            match response.failure.as_error() {
                                Some(err) if err.is_non_sql() => {
                                    state.phase = TurnPhase::ExplainingNonSql;
                                    let via = err
                                        .explanation_query_id
                                        .filter(|id| !id.is_empty())
                                        .map_or(ExplainVia::Ask, ExplainVia::Stream);
                                    let mut fragments = explanation_fragments(
                                        Arc::clone(&upstream),
                                        via,
                                        question.clone(),
                                        state.thread_id.clone(),
                                    );
                                    while let Some(fragment) = fragments.next().await {
                                        yield fragment;
                                    }
                                }
                                Some(err) => {
                                    yield format!("\n❌ Error `{}`: {}\n", err.code, err.message);
                                }
                                None => {
                                    sessions.record_turn(
                                        &session_id,
                                        TurnRecord {
                                            question: Some(asked),
                                            sql: None,
                                        },
                                    );
                                    yield SECTION_BREAK.to_string();
                                    yield NO_SQL_NOTE.to_string();
                                }
                            }
                        }
                    }
                }
                NextStep::Stop => {}
            }

            state.phase = TurnPhase::Done;
            debug!(target: "wren::turn", session_id = %session_id, phase = ?state.phase, "Turn finished");
        };

        cancellable(turn, cancel)
    }

    /// Chart the session's last executed SQL.
    pub fn chart(
        &self,
        session_id: SessionId,
        question: String,
        sql: String,
        cancel: CancellationToken,
    ) -> FragmentStream {
        let upstream = Arc::clone(&self.upstream);
        let sessions = Arc::clone(&self.sessions);

        let turn = stream! {
            yield CHART_HEADING.to_string();
            let thread_id = sessions.get(&session_id);
            info!(target: "wren::turn", session_id = %session_id, "Generating chart");

            let request = SqlQuestionRequest { question, sql, thread_id };
            let response = match upstream.generate_vega_chart(request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(target: "wren::turn", session_id = %session_id, error = %e, "Chart request failed");
                    yield format!("❌ **Chart generation failed** `{}`\n\n{e}\n", e.code());
                    return;
                }
            };

            if let Some(err) = response.failure.as_error() {
                yield format!("❌ **Chart generation failed** `{}`\n\n{}\n", err.code, err.message);
                return;
            }
            let Some(spec) = response.vega_spec.filter(|s| !s.is_null()) else {
                yield "❌ Unexpected chart response: no chart specification returned\n".to_string();
                return;
            };

            yield format!("```json\n{spec}\n```\n");
            yield format!("[Open in Vega Editor]({})\n", render_chart_link(&spec));
            yield "\n<details><summary>Standalone HTML viewer (click to expand)</summary>\n\n".to_string();
            yield format!("```html\n{}\n```\n", render_standalone_viewer(&spec, CHART_TITLE));
            yield "</details>\n".to_string();
            yield "_Save the HTML block above as `chart.html` and open it in a browser for an interactive chart._\n".to_string();
            yield "_Tip: the Vega Editor link opens the chart already filled in, no copy/paste needed._".to_string();
        };

        cancellable(turn, cancel)
    }
}

fn cancellable<S>(turn: S, cancel: CancellationToken) -> FragmentStream
where
    S: Stream<Item = String> + Send + 'static,
{
    Box::pin(turn.take_until(cancel.cancelled_owned()))
}

/// Error fragment for a transport failure, carrying its machine-readable code.
pub fn render_api_error(error: &ApiError) -> String {
    format!("\n❌ Error `{}`: {error}\n", error.code())
}

fn explanation_fragments(
    upstream: Arc<dyn Upstream>,
    via: ExplainVia,
    question: String,
    thread_id: Option<String>,
) -> FragmentStream {
    Box::pin(stream! {
        match via {
            ExplainVia::Stream(query_id) => {
                info!(target: "wren::turn", query_id = %query_id, "Streaming explanation");
                let mut frames = match upstream.stream_explanation(&query_id).await {
                    Ok(frames) => frames,
                    Err(e) => {
                        yield format!("\n❌ Explanation failed: {e}\n");
                        return;
                    }
                };
                while let Some(frame) = frames.next().await {
                    match frame {
                        Ok(frame) => {
                            if let Some(message) = frame.message.filter(|m| !m.is_empty()) {
                                yield message;
                            }
                            if frame.done {
                                break;
                            }
                        }
                        Err(e) => {
                            yield format!("\n❌ Explanation failed: {e}\n");
                            break;
                        }
                    }
                }
            }
            ExplainVia::Ask => {
                info!(target: "wren::turn", "No explanation id, falling back to ask");
                match upstream.ask(QuestionRequest::new(question, thread_id)).await {
                    Ok(response) => {
                        let text = response
                            .explanation
                            .as_deref()
                            .or(response.summary.as_deref())
                            .filter(|t| !t.trim().is_empty());
                        if let Some(text) = text {
                            yield clean_escapes(text);
                        } else if let Some(err) = response.failure.as_error() {
                            yield format!("\n❌ Error `{}`: {}\n", err.code, err.message);
                        } else {
                            yield NO_EXPLANATION_NOTE.to_string();
                        }
                    }
                    Err(e) => {
                        yield render_api_error(&e);
                    }
                }
            }
        }
    })
}

fn result_fragments(
    upstream: Arc<dyn Upstream>,
    sql: String,
    thread_id: Option<String>,
    settings: TurnSettings,
) -> FragmentStream {
    Box::pin(stream! {
        yield RESULTS_HEADING.to_string();
        match upstream.run_sql(RunSqlRequest { sql, thread_id }).await {
            Err(e) => {
                yield format!("❌ SQL execution error: {e}\n");
            }
            Ok(result) => {
                if let Some(err) = result.failure.as_error() {
                    yield format!("❌ SQL execution error: {}\n", err.message);
                } else if result.records.is_empty() {
                    yield NO_DATA_RETURNED.to_string();
                } else {
                    let table = render_table(&result.records, &result.columns, settings.max_rows);
                    for chunk in chunk_text(&table, settings.chunk_size) {
                        yield chunk.to_string();
                    }
                    yield "\n".to_string();
                }
            }
        }
    })
}
