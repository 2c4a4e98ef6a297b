use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tracing::{debug, info, warn};

use super::envelope::Envelope;
use super::registry::{OUTBOUND_QUEUE_CAPACITY, Registry};
use super::types::{ClientId, OutboundMessage, RoomKey};
use crate::notify::NotifyHandle;

const PING_INTERVAL: Duration = Duration::from_secs(30);
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// One client's connection lifecycle: join, relay, guaranteed leave.
///
/// Sessions never hold references to each other; all cross-session traffic
/// goes through the registry.
pub(crate) struct Session {
    registry: Arc<Registry>,
    notify: Option<NotifyHandle>,
    room: RoomKey,
    addr: SocketAddr,
    state: SessionState,
}

impl Session {
    pub fn new(
        registry: Arc<Registry>,
        notify: Option<NotifyHandle>,
        room: RoomKey,
        addr: SocketAddr,
    ) -> Self {
        Self {
            registry,
            notify,
            room,
            addr,
            state: SessionState::Connecting,
        }
    }

    /// Drive the connection from accepted handshake to teardown. Returns once
    /// the registry no longer knows this client, whatever ended the loop.
    pub async fn run(mut self, ws_stream: WebSocketStream<TcpStream>) {
        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        let (tx, mut rx) = mpsc::channel::<OutboundMessage>(OUTBOUND_QUEUE_CAPACITY);
        let (ctrl_tx, mut ctrl_rx) = mpsc::unbounded_channel::<Message>();

        let send_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(msg) = rx.recv() => {
                        if ws_tx.send(Message::Text(msg.into_inner())).await.is_err() {
                            break;
                        }
                    }
                    Some(ctrl_msg) = ctrl_rx.recv() => {
                        if ws_tx.send(ctrl_msg).await.is_err() {
                            break;
                        }
                    }
                    else => break,
                }
            }
        });

        let outcome = self.registry.join(&self.room, tx.clone());
        let client_id = outcome.client_id;
        self.transition(SessionState::Open, client_id);

        // The joining client learns its identity; existing members learn of
        // the arrival.
        if tx.try_send(Envelope::id(client_id).to_wire()).is_err() {
            warn!("Could not queue id message for {}", client_id);
        }
        self.registry
            .broadcast(&self.room, client_id, &Envelope::new_peer(client_id));

        if outcome.first_member {
            if let Some(notify) = &self.notify {
                notify.room_occupied(&self.room);
            }
        }

        self.relay_loop(&mut ws_rx, &ctrl_tx, client_id).await;

        // Every exit from the loop converges here, so leave runs exactly once.
        self.transition(SessionState::Closing, client_id);
        if self.registry.leave(&self.room, client_id) {
            self.registry
                .broadcast(&self.room, client_id, &Envelope::peer_left(client_id));
        }
        send_task.abort();
        self.transition(SessionState::Closed, client_id);
        info!("WebSocket disconnected: {}", self.addr);
    }

    async fn relay_loop(
        &self,
        ws_rx: &mut SplitStream<WebSocketStream<TcpStream>>,
        ctrl_tx: &mpsc::UnboundedSender<Message>,
        client_id: ClientId,
    ) {
        let mut ping_interval = tokio::time::interval(PING_INTERVAL);
        let mut waiting_for_pong = false;
        let mut pong_deadline: Option<tokio::time::Instant> = None;

        loop {
            let pong_timeout = async {
                match pong_deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                _ = ping_interval.tick() => {
                    if waiting_for_pong {
                        warn!("No Pong received, disconnecting {}", self.addr);
                        break;
                    }
                    if ctrl_tx.send(Message::Ping(Bytes::new())).is_err() {
                        break;
                    }
                    waiting_for_pong = true;
                    pong_deadline = Some(tokio::time::Instant::now() + PONG_TIMEOUT);
                    debug!("Ping sent to {}", self.addr);
                }

                _ = pong_timeout => {
                    warn!("Pong timeout, disconnecting {}", self.addr);
                    break;
                }

                msg = ws_rx.next() => {
                    let msg = match msg {
                        Some(Ok(m)) => m,
                        Some(Err(e)) => {
                            warn!("WebSocket error from {}: {}", self.addr, e);
                            break;
                        }
                        None => break,
                    };

                    match msg {
                        Message::Text(text) => {
                            self.handle_frame(&text, client_id);
                        }
                        Message::Pong(_) => {
                            waiting_for_pong = false;
                            pong_deadline = None;
                            debug!("Pong received from {}", self.addr);
                        }
                        Message::Close(_) => {
                            info!("Close received from {}", self.addr);
                            break;
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// One inbound frame. A frame that does not decode costs only itself;
    /// the session only ends when the transport does.
    fn handle_frame(&self, text: &str, client_id: ClientId) {
        let envelope: Envelope = match serde_json::from_str(text) {
            Ok(env) => env,
            Err(e) => {
                warn!("Discarding malformed message from {}: {}", client_id, e);
                return;
            }
        };

        match envelope {
            Envelope::Control(_) => {
                debug!("Ignoring relay control frame from {}", client_id);
            }
            Envelope::Signal(mut signal) => {
                signal.fill_from(client_id);
                let target = signal.target();
                let envelope = Envelope::Signal(signal);
                match target {
                    Some(target) => self.registry.send_to(&self.room, target, &envelope),
                    None => self.registry.broadcast(&self.room, client_id, &envelope),
                }
            }
        }
    }

    fn transition(&mut self, next: SessionState, client_id: ClientId) {
        debug!(
            "Session {} in room {}: {:?} -> {:?}",
            client_id, self.room, self.state, next
        );
        self.state = next;
    }
}
