//! Local stand-in for Wren-UI used by the integration tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use tokio::net::TcpListener;
use wren_pipeline_core::PipelineConfig;
use wren_pipeline_core::api::RetryPolicy;

/// Serve `router` on an ephemeral loopback port and return its base URL.
pub async fn spawn(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// Base URL nothing listens on.
pub async fn closed_port() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// Configuration with millisecond retry delays.
pub fn fast_config(base_url: &str) -> PipelineConfig {
    PipelineConfig::new(base_url)
        .with_retry(
            RetryPolicy::new(3)
                .with_base_delay(Duration::from_millis(1))
                .with_transient_delay(Duration::from_millis(1)),
        )
        .with_read_timeout(Duration::from_secs(5))
}

/// An event-stream body with one `data:` frame per entry.
pub fn sse(frames: &[&str]) -> Response {
    let body: String = frames
        .iter()
        .map(|frame| format!("data: {frame}\n\n"))
        .collect();
    ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

pub fn json_frames(frames: &[Value]) -> Response {
    let frames: Vec<String> = frames.iter().map(Value::to_string).collect();
    let refs: Vec<&str> = frames.iter().map(String::as_str).collect();
    sse(&refs)
}

/// Records the path and JSON body of every request a handler sees.
#[derive(Clone, Default)]
pub struct Recorder {
    calls: Arc<Mutex<Vec<(String, Value)>>>,
}

impl Recorder {
    pub fn record(&self, path: &str, body: Value) {
        self.calls.lock().unwrap().push((path.to_string(), body));
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.calls().into_iter().map(|(path, _)| path).collect()
    }

    pub fn count(&self, path: &str) -> usize {
        self.paths().iter().filter(|p| p.as_str() == path).count()
    }
}
