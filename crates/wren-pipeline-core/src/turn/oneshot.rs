//! Non-streaming turn: one ask call, then execution, rendered as one document.

use tracing::{info, warn};

use crate::api::Upstream;
use crate::api::types::{QuestionRequest, RunSqlRequest, SqlQuestionRequest};
use crate::format::{format_count, render_table};
use crate::session::{SessionId, SessionRegistry, TurnRecord};

/// Answer `question` with `/api/v1/ask` followed by `/api/v1/run_sql`.
///
/// Never fails: every error becomes part of the returned markdown.
pub async fn answer_once(
    upstream: &dyn Upstream,
    sessions: &SessionRegistry,
    session_id: &SessionId,
    question: &str,
    max_rows: usize,
) -> String {
    let thread_id = sessions.get(session_id);
    info!(target: "wren::oneshot", session_id = %session_id, "Asking question");

    let ask = match upstream
        .ask(QuestionRequest::new(question, thread_id.clone()))
        .await
    {
        Ok(ask) => ask,
        Err(e) => return database_error(&format!("Failed to ask question: {e}")),
    };

    if let Some(err) = ask.failure.as_error() {
        return database_error(&err.message);
    }

    let thread_id = match (thread_id, ask.thread_id.clone()) {
        (Some(known), _) => Some(known),
        (None, Some(new)) if !new.is_empty() => {
            sessions.set(session_id, &new);
            Some(new)
        }
        (None, _) => None,
    };

    let mut parts = Vec::new();

    let Some(sql) = ask.sql.clone().filter(|s| !s.trim().is_empty()) else {
        if let Some(summary) = ask.summary.as_deref().filter(|s| !s.trim().is_empty()) {
            parts.push(format!("## 📊 Summary\n\n{summary}"));
        }
        parts.push(
            "## ⚠️ No SQL Query Generated\n\n*The question could not be converted to a SQL query.*"
                .to_string(),
        );
        return parts.join("\n\n");
    };

    let summary = match ask.summary.clone().filter(|s| !s.trim().is_empty()) {
        Some(summary) => Some(summary),
        None => fetch_summary(upstream, question, &sql, thread_id.clone()).await,
    };
    if let Some(summary) = summary {
        parts.push(format!("## 📊 Summary\n\n{summary}"));
    }
    parts.push(format!("## 🔍 SQL Query\n\n```sql\n{sql}\n```"));

    sessions.record_turn(
        session_id,
        TurnRecord {
            question: Some(question.to_string()),
            sql: Some(sql.clone()),
        },
    );

    match upstream.run_sql(RunSqlRequest { sql, thread_id }).await {
        Err(e) => parts.push(format!(
            "## ❌ SQL Execution Error\n\nFailed to execute SQL: {e}"
        )),
        Ok(result) => {
            if let Some(err) = result.failure.as_error() {
                parts.push(format!("## ❌ SQL Execution Error\n\n{}", err.message));
            } else if result.records.is_empty() || result.columns.is_empty() {
                parts.push("## 📋 Results\n\n*No data returned from the query.*".to_string());
            } else {
                parts.push(format!(
                    "## 📋 Results ({} rows)\n\n{}",
                    format_count(result.total_rows()),
                    render_table(&result.records, &result.columns, max_rows)
                ));
            }
        }
    }

    parts.join("\n\n")
}

async fn fetch_summary(
    upstream: &dyn Upstream,
    question: &str,
    sql: &str,
    thread_id: Option<String>,
) -> Option<String> {
    let request = SqlQuestionRequest {
        question: question.to_string(),
        sql: sql.to_string(),
        thread_id,
    };
    match upstream.generate_summary(request).await {
        Ok(response) => response.summary.filter(|s| !s.trim().is_empty()),
        Err(e) => {
            warn!(target: "wren::oneshot", error = %e, "Summary generation failed");
            None
        }
    }
}

fn database_error(message: &str) -> String {
    format!(
        "## ❌ Database Query Error\n\n**Error:** {message}\n\n*This usually means the database schema hasn't been indexed yet or the question doesn't match available data. Please try a different question or check if the database is properly set up.*"
    )
}
