use eventsource_stream::Eventsource;
use futures_core::Stream;
use futures_util::StreamExt;
use std::pin::Pin;
use tokio_util::bytes::Bytes;
use tracing::trace;

use crate::api::error::{ApiError, SseParseError};
use crate::api::types::{ExplanationFrame, StreamEvent};

/// One framed server-sent event. Only `data` carries Wren-UI payloads; the
/// event name is kept for logging.
#[derive(Debug, Clone)]
pub struct SseEvent {
    pub event_type: Option<String>,
    pub data: String,
}

pub type SseStream = Pin<Box<dyn Stream<Item = Result<SseEvent, ApiError>> + Send>>;
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, ApiError>> + Send>>;
pub type ExplanationStream = Pin<Box<dyn Stream<Item = Result<ExplanationFrame, ApiError>> + Send>>;

/// Frame a response body into SSE events. Comment lines (keep-alives) never
/// surface; transport and UTF-8 failures become [`ApiError::Stream`].
pub fn parse_sse_stream<S, E>(byte_stream: S) -> SseStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + 'static,
{
    let frames = byte_stream
        .map(|chunk| chunk.map_err(|e| std::io::Error::other(e.to_string())))
        .eventsource()
        .map(|frame| match frame {
            Ok(event) => Ok(SseEvent {
                event_type: (!event.event.is_empty()).then_some(event.event),
                data: event.data,
            }),
            Err(e) => Err(ApiError::Stream(SseParseError::from(e))),
        });

    Box::pin(frames)
}

/// Decode Wren-UI reasoning frames. Blank frames are dropped; malformed ones
/// pass through as [`StreamEvent::Raw`] so a single bad frame never ends the stream.
pub fn decode_events(sse_stream: SseStream) -> EventStream {
    Box::pin(sse_stream.filter_map(|result| async move {
        match result {
            Ok(event) => {
                let decoded = StreamEvent::decode(&event.data);
                if let Some(StreamEvent::Raw(raw)) = &decoded {
                    trace!(target: "wren::sse", raw = %raw, "Undecodable frame passed through");
                }
                decoded.map(Ok)
            }
            Err(e) => Some(Err(e)),
        }
    }))
}

/// Decode explanation frames; frames without `message`/`done` are dropped.
pub fn decode_explanation(sse_stream: SseStream) -> ExplanationStream {
    Box::pin(sse_stream.filter_map(|result| async move {
        match result {
            Ok(event) => ExplanationFrame::decode(&event.data).map(Ok),
            Err(e) => Some(Err(e)),
        }
    }))
}
