use std::{collections::HashMap, time::Duration};

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt, stream::SplitStream};
use serde::Serialize;
use tokio::{
    sync::{
        broadcast::{self, error::RecvError},
        mpsc,
    },
    task::JoinHandle,
};
use tracing::{info, warn};

use crate::{
    dto::{
        quiz::LeaderboardResponse,
        sse::ServerEvent,
        ws::{AnswerResult, ClientMessage, ErrorMessage, IdentifyAck, JoinAck},
    },
    error::ServiceError,
    services::{
        quiz_service,
        session_driver::{self, JoinOutcome},
    },
    state::{SessionKey, SharedState},
};

const IDENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Identity established by the `identify` handshake.
struct Identity {
    user_id: String,
    display_name: String,
}

/// Handle the full lifecycle of one participant WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we
    // await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let Some(identity) = await_identification(&state, &mut receiver, &outbound_tx).await else {
        finalize(writer_task, outbound_tx).await;
        return;
    };

    info!(user = %identity.user_id, "participant connected");
    send_envelope(
        &outbound_tx,
        "identify-ack",
        &IdentifyAck {
            user_id: identity.user_id.clone(),
            display_name: identity.display_name.clone(),
            status: "identified".into(),
        },
    );

    let mut connection = Connection {
        state,
        identity,
        outbound: outbound_tx.clone(),
        rooms: HashMap::new(),
        upcoming: None,
    };

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(inbound) => connection.dispatch(inbound).await,
                Err(err) => {
                    send_error(&outbound_tx, format!("invalid message: {err}"));
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(user = %connection.identity.user_id, error = %err, "websocket error");
                break;
            }
        }
    }

    connection.teardown().await;
    finalize(writer_task, outbound_tx).await;
}

/// Per-connection bookkeeping: which rooms this socket is forwarding.
struct Connection {
    state: SharedState,
    identity: Identity,
    outbound: mpsc::UnboundedSender<Message>,
    rooms: HashMap<SessionKey, JoinHandle<()>>,
    upcoming: Option<JoinHandle<()>>,
}

impl Connection {
    async fn dispatch(&mut self, inbound: ClientMessage) {
        match inbound {
            ClientMessage::Identify { .. } => {
                warn!(user = %self.identity.user_id, "ignoring duplicate identify message");
            }
            ClientMessage::JoinUpcomingEvents => {
                if self.upcoming.is_none() {
                    let receiver = self.state.rooms().upcoming().subscribe();
                    self.upcoming = Some(spawn_forwarder(receiver, self.outbound.clone()));
                }
            }
            ClientMessage::LeaveUpcomingEvents => {
                if let Some(handle) = self.upcoming.take() {
                    handle.abort();
                }
            }
            ClientMessage::JoinEvent { quiz_id, event_id } => {
                let key = SessionKey { quiz_id, event_id };
                match session_driver::join_event(
                    &self.state,
                    &self.identity.user_id,
                    &self.identity.display_name,
                    &key,
                )
                .await
                {
                    Ok(outcome) => {
                        self.subscribe_room(&key);
                        self.send_join_ack(&key, outcome);
                    }
                    Err(err) => self.send_service_error(err),
                }
            }
            ClientMessage::LeaveEvent { quiz_id, event_id } => {
                let key = SessionKey { quiz_id, event_id };
                self.leave_room(&key).await;
            }
            ClientMessage::SubmitAnswer(submit) => {
                match session_driver::submit_answer(
                    &self.state,
                    &self.identity.user_id,
                    &self.identity.display_name,
                    submit,
                )
                .await
                {
                    Ok(result) => self.send_answer_result(result),
                    Err(err) => self.send_service_error(err),
                }
            }
            ClientMessage::GetLeaderboard { quiz_id, event_id } => {
                match quiz_service::event_by_id(&self.state, event_id).await {
                    Ok(event) if event.quiz_id == quiz_id => {
                        let response = LeaderboardResponse {
                            event_id,
                            entries: quiz_service::build_leaderboard(&event.participants),
                        };
                        send_envelope(&self.outbound, "leaderboard", &response);
                    }
                    Ok(_) => send_error(
                        &self.outbound,
                        format!("event {event_id} not found in quiz {quiz_id}"),
                    ),
                    Err(err) => self.send_service_error(err),
                }
            }
            ClientMessage::Unknown => {
                send_error(&self.outbound, "unknown message type".into());
            }
        }
    }

    fn subscribe_room(&mut self, key: &SessionKey) {
        if self.rooms.contains_key(key) {
            return;
        }
        let receiver = self.state.rooms().room(key).subscribe();
        self.rooms
            .insert(key.clone(), spawn_forwarder(receiver, self.outbound.clone()));
    }

    async fn leave_room(&mut self, key: &SessionKey) {
        if let Some(handle) = self.rooms.remove(key) {
            handle.abort();
        }
        session_driver::leave_event(&self.state, &self.identity.user_id, key).await;
    }

    fn send_join_ack(&self, key: &SessionKey, outcome: JoinOutcome) {
        let ack = match outcome {
            JoinOutcome::Waiting => JoinAck {
                event_id: key.event_id,
                status: "waiting".into(),
                participant_count: None,
                question: None,
                elapsed_ms: None,
            },
            JoinOutcome::Joined {
                in_flight,
                participant_count,
            } => {
                let (question, elapsed_ms) = match in_flight {
                    Some(in_flight) => (Some(in_flight.question), Some(in_flight.elapsed_ms)),
                    None => (None, None),
                };
                JoinAck {
                    event_id: key.event_id,
                    status: "joined".into(),
                    participant_count: Some(participant_count),
                    question,
                    elapsed_ms,
                }
            }
        };
        send_envelope(&self.outbound, "joined", &ack);
    }

    fn send_answer_result(&self, result: AnswerResult) {
        send_envelope(&self.outbound, "answer-result", &result);
    }

    fn send_service_error(&self, err: ServiceError) {
        match &err {
            ServiceError::Unavailable(_) | ServiceError::Degraded => {
                warn!(user = %self.identity.user_id, error = %err, "storage failure on websocket operation");
                send_error(&self.outbound, "service temporarily unavailable".into());
            }
            _ => send_error(&self.outbound, err.to_string()),
        }
    }

    async fn teardown(&mut self) {
        if let Some(handle) = self.upcoming.take() {
            handle.abort();
        }
        let rooms: Vec<SessionKey> = self.rooms.keys().cloned().collect();
        for key in rooms {
            self.leave_room(&key).await;
        }
        info!(user = %self.identity.user_id, "participant disconnected");
    }
}

/// Wait for the `identify` handshake and validate the user against the
/// directory. Any other first message, an unknown user, or a timeout closes
/// the connection.
async fn await_identification(
    state: &SharedState,
    receiver: &mut SplitStream<WebSocket>,
    outbound: &mpsc::UnboundedSender<Message>,
) -> Option<Identity> {
    let text = match tokio::time::timeout(IDENT_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => return None,
        Ok(Some(Ok(_))) => {
            let _ = outbound.send(Message::Close(None));
            return None;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error");
            return None;
        }
        Ok(None) | Err(_) => {
            warn!("websocket identification timed out");
            let _ = outbound.send(Message::Close(None));
            return None;
        }
    };

    let user_id = match serde_json::from_str::<ClientMessage>(&text) {
        Ok(ClientMessage::Identify { user_id }) => user_id,
        Ok(_) => {
            warn!("first websocket message was not identify");
            send_error(outbound, "expected identify message".into());
            let _ = outbound.send(Message::Close(None));
            return None;
        }
        Err(err) => {
            warn!(error = %err, "failed to parse identify message");
            let _ = outbound.send(Message::Close(None));
            return None;
        }
    };

    let store = match state.require_store().await {
        Ok(store) => store,
        Err(_) => {
            send_error(outbound, "service temporarily unavailable".into());
            let _ = outbound.send(Message::Close(None));
            return None;
        }
    };
    match store.find_user(user_id.clone()).await {
        Ok(Some(user)) => Some(Identity {
            user_id: user.id,
            display_name: user.display_name,
        }),
        Ok(None) => {
            warn!(user = %user_id, "unknown user at identification");
            send_error(outbound, format!("unknown user {user_id}"));
            let _ = outbound.send(Message::Close(None));
            None
        }
        Err(err) => {
            warn!(error = %err, "user lookup failed at identification");
            let _ = outbound.send(Message::Close(None));
            None
        }
    }
}

/// Forward room broadcasts onto the socket's writer channel as `{type, data}`
/// frames, until either side goes away.
fn spawn_forwarder(
    mut receiver: broadcast::Receiver<ServerEvent>,
    outbound: mpsc::UnboundedSender<Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(payload) => {
                    let Some(frame) = room_frame(&payload) else {
                        continue;
                    };
                    if outbound.send(Message::Text(frame.into())).is_err() {
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "websocket forwarder lagged behind room broadcasts");
                    continue;
                }
            }
        }
    })
}

fn room_frame(payload: &ServerEvent) -> Option<String> {
    let data: serde_json::Value = serde_json::from_str(&payload.data).ok()?;
    let frame = serde_json::json!({
        "type": payload.event.clone().unwrap_or_else(|| "message".into()),
        "data": data,
    });
    Some(frame.to_string())
}

fn send_envelope<T: Serialize>(outbound: &mpsc::UnboundedSender<Message>, name: &str, payload: &T) {
    let data = match serde_json::to_value(payload) {
        Ok(data) => data,
        Err(err) => {
            warn!(event = name, error = %err, "failed to serialize websocket payload");
            return;
        }
    };
    let frame = serde_json::json!({ "type": name, "data": data });
    let _ = outbound.send(Message::Text(frame.to_string().into()));
}

fn send_error(outbound: &mpsc::UnboundedSender<Message>, message: String) {
    if let Ok(payload) = serde_json::to_string(&ErrorMessage::new(message)) {
        let _ = outbound.send(Message::Text(payload.into()));
    }
}

/// Close the writer channel and wait for the writer task to drain.
async fn finalize(writer_task: JoinHandle<()>, outbound: mpsc::UnboundedSender<Message>) {
    drop(outbound);
    let _ = writer_task.await;
}
