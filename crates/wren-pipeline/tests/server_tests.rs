use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use wren_pipeline::server::{self, MODEL_ID};
use wren_pipeline_core::api::types::{StopData, StreamEvent};
use wren_pipeline_core::session::{SessionId, SessionRegistryConfig};
use wren_pipeline_core::test_utils::{
    Call, ScriptedUpstream, phase, query_result, sql_generated,
};
use wren_pipeline_core::{Pipeline, PipelineConfig};

const SQL: &str = "SELECT region, SUM(sales) AS sales FROM orders GROUP BY region";

fn scripted() -> Arc<ScriptedUpstream> {
    Arc::new(
        ScriptedUpstream::new()
            .with_reasoning(vec![
                StreamEvent::MessageStart,
                sql_generated(SQL),
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
                ],
                &["region", "sales"],
            )),
    )
}

async fn serve(upstream: Arc<ScriptedUpstream>) -> (String, Arc<Pipeline>) {
    let pipeline = Arc::new(
        Pipeline::with_upstream(
            PipelineConfig::new("http://wren-ui:3000").with_model_name("Sales DB"),
            upstream,
        )
        .unwrap(),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = server::router(Arc::clone(&pipeline));
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{addr}"), pipeline)
}

fn completion_body(text: &str, stream: bool) -> Value {
    json!({
        "model": MODEL_ID,
        "stream": stream,
        "messages": [{"role": "user", "content": text}],
        "metadata": {"chat_id": "chat-1"}
    })
}

#[tokio::test]
async fn test_health_and_models() {
    let (base_url, _) = serve(scripted()).await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{base_url}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["pipeline"], "Sales DB");

    let models: Value = client
        .get(format!("{base_url}/v1/models"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(models["data"][0]["id"], MODEL_ID);
    assert_eq!(models["data"][0]["name"], "Sales DB");
}

#[tokio::test]
async fn test_non_streaming_completion() {
    let upstream = scripted();
    let (base_url, pipeline) = serve(Arc::clone(&upstream)).await;

    let response: Value = reqwest::Client::new()
        .post(format!("{base_url}/v1/chat/completions"))
        .json(&completion_body("sales by region", false))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(response["object"], "chat.completion");
    let content = response["choices"][0]["message"]["content"].as_str().unwrap();
    assert!(content.contains("| EU | 1,200 |"));
    assert!(content.contains("Show chart"));
    assert_eq!(
        pipeline.sessions().get(&SessionId::from("chat-1")).as_deref(),
        Some("thread-1")
    );
    assert!(matches!(upstream.calls()[1], Call::RunSql(_)));
}

#[tokio::test]
async fn test_streaming_completion_relays_fragments() {
    let (base_url, _) = serve(scripted()).await;

    let response = reqwest::Client::new()
        .post(format!("{base_url}/v1/chat/completions"))
        .json(&completion_body("sales by region", true))
        .send()
        .await
        .unwrap();
    assert!(
        response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );
    let body = response.text().await.unwrap();

    let data: Vec<&str> = body
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .collect();
    assert_eq!(data.last(), Some(&"[DONE]"));

    let chunks: Vec<Value> = data[..data.len() - 1]
        .iter()
        .map(|d| serde_json::from_str(d).unwrap())
        .collect();
    assert_eq!(chunks[0]["choices"][0]["delta"]["role"], "assistant");
    assert_eq!(chunks.last().unwrap()["choices"][0]["finish_reason"], "stop");
    assert!(chunks.iter().all(|c| c["object"] == "chat.completion.chunk"));

    let text: String = chunks
        .iter()
        .filter_map(|c| c["choices"][0]["delta"]["content"].as_str())
        .collect();
    assert!(text.starts_with("- message_start\n"));
    assert!(text.contains(&format!("```sql\n{SQL}\n```")));
    assert!(text.contains("| US | 3,400 |"));
}

#[tokio::test]
async fn test_chart_without_history_over_http() {
    let upstream = scripted();
    let (base_url, _) = serve(Arc::clone(&upstream)).await;

    let response: Value = reqwest::Client::new()
        .post(format!("{base_url}/v1/chat/completions"))
        .json(&completion_body("Show chart", false))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let content = response["choices"][0]["message"]["content"].as_str().unwrap();
    assert!(content.contains("No SQL query found"));
    assert_eq!(upstream.call_count(), 0);
}

#[tokio::test]
async fn test_missing_user_message_is_rejected() {
    let (base_url, _) = serve(scripted()).await;

    let response = reqwest::Client::new()
        .post(format!("{base_url}/v1/chat/completions"))
        .json(&json!({"messages": [{"role": "system", "content": "hi"}]}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_evictor_drops_idle_sessions() {
    let pipeline = Pipeline::with_upstream(
        PipelineConfig::new("http://wren-ui:3000").with_session(
            SessionRegistryConfig::default().with_idle_timeout(Duration::from_millis(20)),
        ),
        scripted(),
    )
    .unwrap();
    pipeline.sessions().set(&SessionId::from("old"), "thread-old");

    let cancel = CancellationToken::new();
    let handle = server::spawn_evictor(
        Arc::clone(pipeline.sessions()),
        Duration::from_millis(10),
        cancel.clone(),
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();
    handle.await.unwrap();

    assert!(pipeline.sessions().is_empty());
}
