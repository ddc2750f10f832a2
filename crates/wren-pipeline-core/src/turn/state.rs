#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnPhase {
    Start,
    StreamingReasoning,
    GeneratingSql,
    /// SQL was generated and shown; execution not reported yet.
    SqlReady { sql: String },
    Executing { sql: String },
    /// Upstream reported `sql_execution_end` for this SQL.
    ResultsReady { sql: String },
    ExplainingNonSql,
    Done,
    Failed,
}

impl TurnPhase {
    pub fn sql(&self) -> Option<&str> {
        match self {
            TurnPhase::SqlReady { sql }
            | TurnPhase::Executing { sql }
            | TurnPhase::ResultsReady { sql } => Some(sql),
            _ => None,
        }
    }

    /// No further reasoning events can change the outcome.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TurnPhase::ExplainingNonSql | TurnPhase::Done | TurnPhase::Failed
        )
    }
}

/// State of one question turn while its reasoning stream is consumed.
#[derive(Debug, Clone)]
pub struct TurnState {
    pub phase: TurnPhase,
    /// Thread id known for the session; set at most once.
    pub thread_id: Option<String>,
    pub question: String,
    /// The upstream's rephrasing of the question, when it sent one.
    pub rephrased_question: Option<String>,
}

impl TurnState {
    pub fn new(question: impl Into<String>, thread_id: Option<String>) -> Self {
        Self {
            phase: TurnPhase::Start,
            thread_id,
            question: question.into(),
            rephrased_question: None,
        }
    }

    /// Question to remember for follow-up chart requests.
    pub fn effective_question(&self) -> &str {
        self.rephrased_question
            .as_deref()
            .filter(|q| !q.trim().is_empty())
            .unwrap_or(&self.question)
    }
}
