//! From SSE byte chunks to [`ProviderStreamEvent`]s.
//!
//! [`event_stream`] owns the loop: it splits bytes into records, hands each
//! record to the format's [`Reducer`], and stops after the first terminal
//! event. Reducers are plain state machines with no I/O, so they can be
//! driven directly in tests.

pub mod delta;
pub mod tool_calls;
pub mod typed;

use std::time::Duration;

use futures::{Stream, StreamExt};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub use delta::DeltaReducer;
pub use tool_calls::{ToolCallAccumulator, ToolCallSet};
pub use typed::TypedReducer;

use crate::config::StreamFormat;
use crate::error::{ClassifiedError, ErrorKind, Result};
use crate::sse::{RecordSplitter, SseRecord};
use crate::types::{ProviderEventStream, ProviderStreamEvent, StreamTextResult};

/// Per-format state machine from records to events.
///
/// Once a reducer has returned a terminal event it returns nothing more.
pub trait Reducer: Send {
    fn on_record(&mut self, record: &SseRecord) -> Vec<ProviderStreamEvent>;

    /// The body ended. Returns the terminal event if none was sent yet.
    fn on_end(&mut self) -> Vec<ProviderStreamEvent>;
}

pub fn reducer_for(format: StreamFormat) -> Box<dyn Reducer> {
    match format {
        StreamFormat::DeltaJson => Box::new(DeltaReducer::new()),
        StreamFormat::TypedEvent => Box::new(TypedReducer::new()),
    }
}

/// Reducer for a request body. A delta-JSON request that did not ask for
/// usage finishes on the `finish_reason` chunk.
pub fn reducer_for_request(format: StreamFormat, body: &Value) -> Box<dyn Reducer> {
    match format {
        StreamFormat::DeltaJson => Box::new(
            DeltaReducer::new().awaiting_usage(DeltaReducer::requests_usage(body)),
        ),
        StreamFormat::TypedEvent => Box::new(TypedReducer::new()),
    }
}

enum Step<B> {
    Chunk(B),
    Failed(ClassifiedError),
    Ended,
    Cancelled,
    Idle(Duration),
}

/// Turn a byte-chunk stream into provider events.
///
/// The result yields exactly one terminal event unless the consumer drops
/// it first. Cancelling `cancel` ends it with a `Cancelled` error at the
/// next event boundary. With `idle_timeout`, a gap between chunks longer
/// than the limit ends it with `StreamInterrupted`.
pub fn event_stream<S, B>(
    chunks: S,
    format: StreamFormat,
    cancel: CancellationToken,
    idle_timeout: Option<Duration>,
) -> ProviderEventStream
where
    S: Stream<Item = Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    event_stream_with(chunks, format, reducer_for(format), cancel, idle_timeout)
}

/// Like [`event_stream`], driving a caller-chosen reducer.
pub fn event_stream_with<S, B>(
    chunks: S,
    format: StreamFormat,
    mut reducer: Box<dyn Reducer>,
    cancel: CancellationToken,
    idle_timeout: Option<Duration>,
) -> ProviderEventStream
where
    S: Stream<Item = Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut splitter = RecordSplitter::new();
        futures::pin_mut!(chunks);

        loop {
            let next = async {
                match idle_timeout {
                    Some(limit) => tokio::time::timeout(limit, chunks.next())
                        .await
                        .map_err(|_| limit),
                    None => Ok(chunks.next().await),
                }
            };
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => Step::Cancelled,
                next = next => match next {
                    Ok(Some(Ok(bytes))) => Step::Chunk(bytes),
                    Ok(Some(Err(e))) => Step::Failed(e),
                    Ok(None) => Step::Ended,
                    Err(limit) => Step::Idle(limit),
                },
            };

            let mut ended = false;
            let events = match step {
                Step::Chunk(bytes) => {
                    let mut events = Vec::new();
                    for record in splitter.push(bytes.as_ref()) {
                        events.extend(reducer.on_record(&record));
                    }
                    events
                }
                Step::Failed(e) => vec![ProviderStreamEvent::Error(e)],
                Step::Ended => {
                    ended = true;
                    match splitter.finish() {
                        Ok(()) => reducer.on_end(),
                        Err(e) => vec![ProviderStreamEvent::Error(e)],
                    }
                }
                Step::Cancelled => {
                    debug!(%format, "Stream cancelled by caller");
                    vec![ProviderStreamEvent::Error(ClassifiedError::cancelled())]
                }
                Step::Idle(limit) => {
                    debug!(%format, idle_ms = limit.as_millis() as u64, "Stream idle timeout");
                    vec![ProviderStreamEvent::Error(ClassifiedError::new(
                        ErrorKind::StreamInterrupted,
                        format!("no data received for {}ms", limit.as_millis()),
                    ))]
                }
            };

            for event in events {
                if cancel.is_cancelled() && !matches!(&event, ProviderStreamEvent::Error(e) if e.is_cancelled()) {
                    yield ProviderStreamEvent::Error(ClassifiedError::cancelled());
                    return;
                }
                let terminal = event.is_terminal();
                if terminal {
                    debug!(%format, failed = event.as_error().is_some(), "Stream finished");
                }
                yield event;
                if terminal {
                    return;
                }
            }
            if ended {
                return;
            }
        }
    };
    Box::pin(stream)
}

/// Drain a stream into its accumulated text, reasoning, tool calls and
/// usage. A terminal error is returned as `Err`.
pub async fn collect_stream(mut stream: ProviderEventStream) -> Result<StreamTextResult> {
    let mut result = StreamTextResult::default();
    while let Some(event) = stream.next().await {
        match event {
            ProviderStreamEvent::TextDelta { text } => result.text.push_str(&text),
            ProviderStreamEvent::ReasoningDelta { text } => result.reasoning.push_str(&text),
            ProviderStreamEvent::ToolCall(call) => result.tool_calls.push(call),
            ProviderStreamEvent::ToolCallStart { .. } | ProviderStreamEvent::ToolCallDelta { .. } => {}
            ProviderStreamEvent::Finish { reason, usage } => {
                result.finish_reason = Some(reason);
                result.usage = usage;
                return Ok(result);
            }
            ProviderStreamEvent::Error(e) => return Err(e),
        }
    }
    Err(ClassifiedError::new(
        ErrorKind::StreamInterrupted,
        "stream ended without a terminal event",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FinishReason;
    use futures::channel::mpsc;
    use pretty_assertions::assert_eq;

    const DELTA_BODY: &str = concat!(
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"Hel\"}}]}\n\n",
        ": keep-alive\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"}}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"function\":{\"name\":\"lookup\",\"arguments\":\"{\\\"q\\\":\"}}]}}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"\\\"é\\\"}\"}}]}}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"tool_calls\"}]}\n\n",
        "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":5,\"completion_tokens\":7,\"total_tokens\":12}}\n\n",
        "data: [DONE]\n\n",
    );

    const TYPED_BODY: &str = concat!(
        "event: message_start\r\ndata: {\"type\":\"message_start\",\"message\":{\"usage\":{\"input_tokens\":3,\"output_tokens\":1}}}\r\n\r\n",
        "event: content_block_start\r\ndata: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\r\n\r\n",
        "event: content_block_delta\r\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Bonjour\"}}\r\n\r\n",
        "event: content_block_stop\r\ndata: {\"type\":\"content_block_stop\",\"index\":0}\r\n\r\n",
        "event: message_delta\r\ndata: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":4}}\r\n\r\n",
        "event: message_stop\r\ndata: {\"type\":\"message_stop\"}\r\n\r\n",
    );

    fn chunked(body: &'static str, size: usize) -> Vec<Result<Vec<u8>>> {
        body.as_bytes().chunks(size).map(|c| Ok(c.to_vec())).collect()
    }

    async fn run(chunks: Vec<Result<Vec<u8>>>, format: StreamFormat) -> Vec<String> {
        event_stream(futures::stream::iter(chunks), format, CancellationToken::new(), None)
            .map(|e| format!("{e:?}"))
            .collect()
            .await
    }

    #[tokio::test]
    async fn delta_events_do_not_depend_on_chunking() {
        let whole = run(chunked(DELTA_BODY, DELTA_BODY.len()), StreamFormat::DeltaJson).await;
        for size in [1, 2, 7, 64] {
            let split = run(chunked(DELTA_BODY, size), StreamFormat::DeltaJson).await;
            assert_eq!(split, whole, "chunk size {size}");
        }
    }

    #[tokio::test]
    async fn typed_events_do_not_depend_on_chunking() {
        let whole = run(chunked(TYPED_BODY, TYPED_BODY.len()), StreamFormat::TypedEvent).await;
        for size in [1, 3, 17] {
            let split = run(chunked(TYPED_BODY, size), StreamFormat::TypedEvent).await;
            assert_eq!(split, whole, "chunk size {size}");
        }
    }

    #[tokio::test]
    async fn collect_delta_stream() {
        let stream = event_stream(
            futures::stream::iter(chunked(DELTA_BODY, 5)),
            StreamFormat::DeltaJson,
            CancellationToken::new(),
            None,
        );
        let result = collect_stream(stream).await.unwrap();
        assert_eq!(result.text, "Hello");
        assert_eq!(result.tool_calls.len(), 1);
        assert_eq!(result.tool_calls[0].arguments, serde_json::json!({"q": "é"}));
        assert_eq!(result.finish_reason, Some(FinishReason::ToolCalls));
        assert_eq!(result.usage.total_tokens, 12);
    }

    #[tokio::test]
    async fn collect_typed_stream() {
        let stream = event_stream(
            futures::stream::iter(chunked(TYPED_BODY, 11)),
            StreamFormat::TypedEvent,
            CancellationToken::new(),
            None,
        );
        let result = collect_stream(stream).await.unwrap();
        assert_eq!(result.text, "Bonjour");
        assert_eq!(result.finish_reason, Some(FinishReason::Stop));
        assert_eq!(result.usage.input_tokens, 3);
        assert_eq!(result.usage.output_tokens, 4);
    }

    #[tokio::test]
    async fn transport_error_is_terminal() {
        let chunks: Vec<Result<Vec<u8>>> = vec![
            Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n\n".to_vec()),
            Err(ClassifiedError::new(ErrorKind::StreamInterrupted, "connection reset")),
            Ok(b"data: [DONE]\n\n".to_vec()),
        ];
        let events: Vec<_> = event_stream(
            futures::stream::iter(chunks),
            StreamFormat::DeltaJson,
            CancellationToken::new(),
            None,
        )
        .collect()
        .await;
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1].as_error().map(|e| e.kind()),
            Some(ErrorKind::StreamInterrupted)
        );
    }

    #[tokio::test]
    async fn truncated_body_is_stream_error() {
        let events: Vec<_> = event_stream(
            futures::stream::iter(vec![Ok::<_, ClassifiedError>(b"data: {\"choices\":[".to_vec())]),
            StreamFormat::DeltaJson,
            CancellationToken::new(),
            None,
        )
        .collect()
        .await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_error().map(|e| e.kind()), Some(ErrorKind::StreamError));
    }

    #[tokio::test]
    async fn nothing_follows_the_terminal_event() {
        let body = "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}],\"usage\":{\"prompt_tokens\":1}}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n\n";
        let events = run(vec![Ok(body.as_bytes().to_vec())], StreamFormat::DeltaJson).await;
        assert_eq!(events.len(), 1);
        assert!(events[0].starts_with("Finish"));
    }

    #[tokio::test]
    async fn cancellation_ends_stream_with_cancelled() {
        let (tx, rx) = mpsc::unbounded::<Result<Vec<u8>>>();
        let cancel = CancellationToken::new();
        let mut stream = event_stream(rx, StreamFormat::DeltaJson, cancel.clone(), None);

        tx.unbounded_send(Ok(b"data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\n".to_vec()))
            .unwrap();
        let first = stream.next().await.unwrap();
        assert_eq!(first.as_text_delta(), Some("hi"));

        cancel.cancel();
        let last = stream.next().await.unwrap();
        assert!(last.as_error().is_some_and(ClassifiedError::is_cancelled));
        assert!(stream.next().await.is_none());
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timeout_interrupts_a_silent_stream() {
        let (tx, rx) = mpsc::unbounded::<Result<Vec<u8>>>();
        let events: Vec<_> = event_stream(
            rx,
            StreamFormat::TypedEvent,
            CancellationToken::new(),
            Some(Duration::from_secs(5)),
        )
        .collect()
        .await;
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].as_error().map(|e| e.kind()),
            Some(ErrorKind::StreamInterrupted)
        );
        drop(tx);
    }

    #[tokio::test]
    async fn collect_without_terminal_is_interrupted() {
        let stream: ProviderEventStream = Box::pin(futures::stream::iter(vec![
            ProviderStreamEvent::TextDelta { text: "a".into() },
        ]));
        let err = collect_stream(stream).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StreamInterrupted);
    }
}
