//! OpenAI-compatible HTTP surface the chat host connects to.

pub mod openai;

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::StreamExt;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wren_pipeline_core::Pipeline;
use wren_pipeline_core::session::SessionRegistry;
use wren_pipeline_core::turn::FragmentStream;

use openai::{ChatCompletion, ChatCompletionChunk, ChatCompletionRequest, ChunkHeader};

/// Model id advertised on `/v1/models`.
pub const MODEL_ID: &str = "wren-pipeline";

const STREAM_BUFFER: usize = 32;

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
}

pub fn router(pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/models", get(models))
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(AppState { pipeline })
}

/// Periodically drop sessions idle past the registry's timeout until `cancel` fires.
pub fn spawn_evictor(
    sessions: Arc<SessionRegistry>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let evicted = sessions.evict_idle();
                    if evicted > 0 {
                        info!(target: "wren::server", evicted, remaining = sessions.len(), "Evicted idle sessions");
                    }
                }
            }
        }
    })
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "pipeline": state.pipeline.name(),
        "sessions": state.pipeline.sessions().len(),
    }))
}

async fn models(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "object": "list",
        "data": [{
            "id": MODEL_ID,
            "object": "model",
            "name": state.pipeline.name(),
            "owned_by": "wren-ui",
        }]
    }))
}

async fn chat_completions(
    State(state): State<AppState>,
    Json(request): Json<ChatCompletionRequest>,
) -> Response {
    let Some(message) = request.last_user_message() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"message": "No user message in request"}})),
        )
            .into_response();
    };

    let header = ChunkHeader {
        id: format!("chatcmpl-{}", uuid::Uuid::new_v4()),
        created: chrono::Utc::now().timestamp(),
        model: request.model.clone().unwrap_or_else(|| MODEL_ID.to_string()),
    };
    let body = request.session_body();
    let history = request.history();

    if !request.stream {
        let text = state
            .pipeline
            .pipe(&message, &header.model, &history, &body)
            .await
            .collect()
            .await;
        return Json(ChatCompletion::new(header.id, header.created, header.model, text))
            .into_response();
    }

    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(STREAM_BUFFER);
    let cancel = CancellationToken::new();
    let pipeline = Arc::clone(&state.pipeline);

    tokio::spawn(async move {
        let output = pipeline
            .pipe_with_cancel(&message, &header.model, &history, &body, cancel.clone())
            .await;
        relay(&header, output.into_stream(), &tx, &cancel).await;
    });

    Sse::new(ReceiverStream::new(rx))
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// Forward turn fragments as completion chunks until the turn ends or the
/// client goes away. A departed client cancels the turn, even while it is
/// waiting on Wren-UI.
async fn relay(
    header: &ChunkHeader,
    mut fragments: FragmentStream,
    tx: &mpsc::Sender<Result<Event, Infallible>>,
    cancel: &CancellationToken,
) {
    if tx.send(Ok(chunk_event(&header.role()))).await.is_err() {
        cancel.cancel();
        return;
    }
    loop {
        let fragment = tokio::select! {
            () = tx.closed() => {
                debug!(target: "wren::server", id = %header.id, "Client disconnected");
                cancel.cancel();
                return;
            }
            next = fragments.next() => match next {
                Some(fragment) => fragment,
                None => break,
            },
        };
        if fragment.is_empty() {
            continue;
        }
        if let Err(e) = tx.send(Ok(chunk_event(&header.content(fragment)))).await {
            debug!(target: "wren::server", id = %header.id, "Client disconnected: {}", e);
            cancel.cancel();
            return;
        }
    }

    let _ = tx.send(Ok(chunk_event(&header.stop()))).await;
    let _ = tx.send(Ok(Event::default().data("[DONE]"))).await;
}

fn chunk_event(chunk: &ChatCompletionChunk) -> Event {
    match serde_json::to_string(chunk) {
        Ok(data) => Event::default().data(data),
        Err(e) => {
            warn!(target: "wren::server", error = %e, "Could not serialize chunk");
            Event::default().comment("unserializable chunk")
        }
    }
}
