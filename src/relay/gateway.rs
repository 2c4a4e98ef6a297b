use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{error, info};

use super::registry::Registry;
use super::session::Session;
use super::types::RoomKey;
use crate::notify::NotifyHandle;

pub const DEFAULT_RELAY_PORT: u16 = 8000;

/// Transport entry point: accepts WebSocket upgrades at `/ws/{room}` and
/// spawns one session per connection.
pub struct Gateway {
    listener: TcpListener,
    registry: Arc<Registry>,
    notify: Option<NotifyHandle>,
}

impl Gateway {
    /// Bind the relay to the address. The registry is shared so callers can
    /// observe live membership.
    pub async fn bind(
        addr: &str,
        registry: Arc<Registry>,
        notify: Option<NotifyHandle>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Signaling relay listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            registry,
            notify,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) -> std::io::Result<()> {
        loop {
            let (stream, addr) = self.listener.accept().await?;
            let registry = self.registry.clone();
            let notify = self.notify.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, registry, notify).await {
                    error!("Connection error from {}: {}", addr, e);
                }
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    registry: Arc<Registry>,
    notify: Option<NotifyHandle>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut room: Option<RoomKey> = None;
    let ws_stream =
        tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
            match room_key_from_path(req.uri().path()) {
                Some(key) => {
                    room = Some(key);
                    Ok(resp)
                }
                None => {
                    let mut reject =
                        ErrorResponse::new(Some("expected /ws/{room}".to_string()));
                    *reject.status_mut() = StatusCode::NOT_FOUND;
                    Err(reject)
                }
            }
        })
        .await?;

    let Some(room) = room else {
        return Err("handshake accepted without a room key".into());
    };
    info!("WebSocket connection from {} to room {}", addr, room);

    Session::new(registry, notify, room, addr).run(ws_stream).await;
    Ok(())
}

/// Extract the room key from a `/ws/{room}` upgrade path.
fn room_key_from_path(path: &str) -> Option<RoomKey> {
    let key = path.strip_prefix("/ws/")?;
    if key.is_empty() || key.contains('/') {
        return None;
    }
    Some(RoomKey::from(key))
}
