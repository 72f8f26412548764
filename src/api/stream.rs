//! SSE relay for streamed chat answers.
//!
//! A spawned producer drains the model stream into a bounded channel; the
//! response body reads from the other end. Each relay has its own child of
//! the server's shutdown token, cancelled by a drop guard that lives inside
//! the response stream, so a client disconnect or a server shutdown stops
//! the producer.
//!
//! ```text
//! id: 1          event: message   data: <trimmed delta>
//! ...
//! event: done    data: [DONE]            normal end
//! event: error   data: <cause>           provider failure, then end
//! ```

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::{
    http::HeaderMap,
    response::sse::{Event, KeepAlive, KeepAliveStream, Sse},
};
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::AppState;
use super::common::ApiError;
use crate::llm::{ChatMessage, ChatStream};

const CHANNEL_CAPACITY: usize = 32;
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);
const LAST_EVENT_ID: &str = "last-event-id";

/// Open the model stream and return the SSE response over it. Failing to
/// open the stream is reported as a normal JSON error.
pub(super) async fn relay(
    state: &AppState,
    headers: &HeaderMap,
    messages: &[ChatMessage],
    request_id: Uuid,
) -> Result<Sse<KeepAliveStream<RelayStream>>, ApiError> {
    if let Some(last_id) = headers.get(LAST_EVENT_ID).and_then(|v| v.to_str().ok()) {
        info!(%request_id, last_event_id = %last_id, "client reconnected");
    }

    let upstream = state.llm.stream(messages).await?;

    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let cancel = state.shutdown.child_token();
    tokio::spawn(pump(upstream, tx, cancel.clone(), state.shutdown.clone(), request_id));

    let events = RelayStream { events: ReceiverStream::new(rx), _cancel_on_drop: cancel.drop_guard() };

    Ok(Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL)))
}

/// Response body of a relay. Dropping it cancels the producer.
pub(super) struct RelayStream {
    events: ReceiverStream<Result<Event, Infallible>>,
    _cancel_on_drop: DropGuard,
}

impl Stream for RelayStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

async fn pump(
    mut upstream: ChatStream,
    tx: mpsc::Sender<Result<Event, Infallible>>,
    cancel: CancellationToken,
    shutdown: CancellationToken,
    request_id: Uuid,
) {
    let mut next_id: u64 = 0;
    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => {
                if shutdown.is_cancelled() {
                    info!(%request_id, "stream stopped by shutdown");
                } else {
                    info!(%request_id, "client disconnected");
                }
                return;
            }
            item = upstream.next() => item,
        };

        let event = match item {
            Some(Ok(delta)) => {
                let text = delta.trim();
                if text.is_empty() {
                    continue;
                }
                next_id += 1;
                debug!(%request_id, id = next_id, content = %text, "sse message");
                Event::default().id(next_id.to_string()).event("message").data(sse_safe(text))
            }
            Some(Err(e)) => {
                warn!(%request_id, error = %e, "stream failed");
                let _ = tx.send(Ok(Event::default().event("error").data(sse_safe(&e.to_string())))).await;
                return;
            }
            None => {
                info!(%request_id, events = next_id, "stream completed");
                let _ = tx.send(Ok(Event::default().event("done").data("[DONE]"))).await;
                return;
            }
        };

        if tx.send(Ok(event)).await.is_err() {
            info!(%request_id, "client disconnected");
            return;
        }
    }
}

/// SSE data lines cannot carry carriage returns.
fn sse_safe(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}
