use tracing::{debug, warn};

use crate::api::types::{ContentBlock, ErrorData, Phase, StateData, StreamEvent};
use crate::format::title_case;

use super::effect::Effect;
use super::state::{TurnPhase, TurnState};

/// What the runtime does once the reasoning stream is closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStep {
    /// Execution was reported upstream; fetch and render the rows.
    Execute { sql: String },
    /// SQL was shown but the upstream never reported executing it.
    NotExecuted,
    /// No SQL and no explanation; ask the non-streaming endpoint why.
    ResolveWithoutSql,
    /// Nothing left to do.
    Stop,
}

/// Apply one reasoning-stream event to the turn.
pub fn reduce(state: &mut TurnState, event: StreamEvent) -> Vec<Effect> {
    if state.phase.is_terminal() {
        debug!(target: "wren::turn", ?event, "Ignoring event after terminal phase");
        return Vec::new();
    }
    if state.phase == TurnPhase::Start {
        state.phase = TurnPhase::StreamingReasoning;
    }

    match event {
        StreamEvent::MessageStart => vec![Effect::Emit("- message_start\n".to_string())],
        StreamEvent::State { data } => handle_state(state, data),
        StreamEvent::ContentBlockStart { content_block } => handle_block_start(&content_block),
        StreamEvent::ContentBlockDelta { delta } => {
            let text = delta.text();
            if text.is_empty() {
                Vec::new()
            } else {
                vec![Effect::Emit(text.to_string())]
            }
        }
        StreamEvent::ContentBlockStop => vec![Effect::Emit("\n".to_string())],
        StreamEvent::Error { data } => handle_error(state, &data),
        StreamEvent::MessageStop { data } => {
            let mut effects = capture_thread_id(state, data.thread_id);
            effects.push(Effect::Emit("- message_stop\n".to_string()));
            effects.push(Effect::Finish);
            effects
        }
        StreamEvent::Raw(_) => Vec::new(),
    }
}

/// Decide the follow-up once the reasoning stream has ended.
pub fn next_step(state: &TurnState) -> NextStep {
    match &state.phase {
        TurnPhase::ResultsReady { sql } => NextStep::Execute { sql: sql.clone() },
        TurnPhase::SqlReady { .. } | TurnPhase::Executing { .. } => NextStep::NotExecuted,
        TurnPhase::Start | TurnPhase::StreamingReasoning | TurnPhase::GeneratingSql => {
            NextStep::ResolveWithoutSql
        }
        TurnPhase::ExplainingNonSql | TurnPhase::Done | TurnPhase::Failed => NextStep::Stop,
    }
}

fn capture_thread_id(state: &mut TurnState, thread_id: Option<String>) -> Vec<Effect> {
    match thread_id.filter(|t| !t.is_empty()) {
        Some(thread_id) if state.thread_id.is_none() => {
            state.thread_id = Some(thread_id.clone());
            vec![Effect::CaptureThreadId(thread_id)]
        }
        _ => Vec::new(),
    }
}

fn handle_state(state: &mut TurnState, data: StateData) -> Vec<Effect> {
    let mut effects = Vec::new();
    if let Some(name) = data.state.as_deref().filter(|s| !s.is_empty()) {
        effects.push(Effect::Emit(format!("- {name}\n")));
    }

    let phase = data.phase();
    effects.extend(capture_thread_id(state, data.thread_id));

    if let Some(rephrased) = data.rephrased_question.filter(|q| !q.is_empty()) {
        effects.push(Effect::Emit(format!("  - rephrased: {rephrased}\n")));
        state.rephrased_question = Some(rephrased);
    }
    if let Some(tables) = data.retrieved_tables.filter(|t| !t.is_empty()) {
        effects.push(Effect::Emit(format!("  - tables: {}\n", tables.join(", "))));
    }

    match phase {
        Some(Phase::SqlGenerationStart) => {
            if state.phase.sql().is_none() {
                state.phase = TurnPhase::GeneratingSql;
            }
        }
        Some(Phase::SqlGenerationSuccess) => {
            if let Some(sql) = data.sql.filter(|s| !s.trim().is_empty()) {
                effects.push(Effect::Emit("\n### 🔍 SQL Query (generated)\n".to_string()));
                effects.push(Effect::Emit(format!("```sql\n{sql}\n```\n")));
                state.phase = TurnPhase::SqlReady { sql };
            }
        }
        Some(Phase::SqlExecutionStart) => {
            if let TurnPhase::SqlReady { sql } = &state.phase {
                state.phase = TurnPhase::Executing { sql: sql.clone() };
            }
        }
        Some(Phase::SqlExecutionEnd) => match &state.phase {
            TurnPhase::SqlReady { sql } | TurnPhase::Executing { sql } => {
                state.phase = TurnPhase::ResultsReady { sql: sql.clone() };
            }
            TurnPhase::ResultsReady { .. } => {}
            _ => warn!(target: "wren::turn", "sql_execution_end without generated SQL"),
        },
        Some(Phase::SqlGenerationFailed | Phase::Other(_)) | None => {}
    }

    effects
}

fn handle_block_start(block: &ContentBlock) -> Vec<Effect> {
    if block.block_type.as_deref() != Some("text") {
        return Vec::new();
    }
    let name = block
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .unwrap_or("content");
    // Leading blank line ends the preceding progress list.
    vec![Effect::Emit(format!("\n\n### 🧾 {}\n\n", title_case(name)))]
}

fn handle_error(state: &mut TurnState, data: &ErrorData) -> Vec<Effect> {
    let error = data.to_upstream_error();
    if error.is_non_sql() {
        state.phase = TurnPhase::ExplainingNonSql;
        return match error.explanation_query_id.filter(|id| !id.is_empty()) {
            Some(query_id) => vec![Effect::OpenExplanation(query_id)],
            None => vec![Effect::FallbackExplain],
        };
    }

    state.phase = TurnPhase::Failed;
    vec![
        Effect::Emit(format!("\n❌ Error `{}`: {}\n", error.code, error.message)),
        Effect::Finish,
    ]
}
