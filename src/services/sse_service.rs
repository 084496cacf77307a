use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError};

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::{
    dto::sse::{Handshake, ServerEvent},
    state::{SessionKey, SharedState},
};

/// Subscribe to the upcoming-events announcement feed.
pub fn subscribe_upcoming(state: &SharedState) -> broadcast::Receiver<ServerEvent> {
    state.rooms().upcoming().subscribe()
}

/// Subscribe to one event room as a spectator.
pub fn subscribe_room(state: &SharedState, key: &SessionKey) -> broadcast::Receiver<ServerEvent> {
    state.rooms().room(key).subscribe()
}

/// Handshake event sent first on every SSE stream.
pub fn handshake_event(state: &SharedState, stream: &str) -> Option<ServerEvent> {
    let payload = Handshake {
        stream: stream.to_string(),
        message: format!("subscribed to {stream}"),
        degraded: state.is_degraded(),
    };
    ServerEvent::json("handshake".to_string(), &payload).ok()
}

/// Convert a broadcast receiver into an SSE response, forwarding events until
/// the client disconnects. `first` is emitted before any broadcast event.
pub fn to_sse_stream(
    mut receiver: broadcast::Receiver<ServerEvent>,
    first: Option<ServerEvent>,
    label: String,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // The bounded channel decouples the broadcast fan-out from the client's
    // consumption rate.
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        if let Some(payload) = first {
            if tx.send(Ok(to_axum_event(payload))).await.is_err() {
                return;
            }
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            if tx.send(Ok(to_axum_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        // A slow client misses lagged frames but stays
                        // connected.
                        Err(RecvError::Lagged(_)) => continue,
                    }
                }
            }
        }

        tracing::info!(stream = %label, "SSE stream disconnected");
    });

    // Axum drops the receiver half on client disconnect, which closes tx
    // and stops the forwarder.
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_axum_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}
