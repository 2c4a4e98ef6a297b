//! Outbound voice-call notification, fired when a room gets its first
//! participant.
//!
//! The relay only enqueues a room key; a worker task owns the HTTP call.
//! Nothing on this path can slow down or fail session establishment.

use std::collections::HashMap;
use std::env;

use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::relay::RoomKey;

const NOTIFY_QUEUE_CAPACITY: usize = 32;
const DEFAULT_SENDER: &str = "di-di.ru";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("no contact configured for room: {0}")]
    NoContact(String),

    #[error("notification call failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Credentials and endpoint for the SMS Agent voice-call API.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    pub login: String,
    pub password: String,
    pub api_url: String,
    pub sender: String,
}

impl NotifyConfig {
    /// Read from `AGENT_LOGIN` / `AGENT_PASSWORD` / `SMS_AGENT_API_URL`.
    /// Missing credentials disable the hook entirely.
    pub fn from_env() -> Option<Self> {
        Some(Self {
            login: env::var("AGENT_LOGIN").ok()?,
            password: env::var("AGENT_PASSWORD").ok()?,
            api_url: env::var("SMS_AGENT_API_URL").ok()?,
            sender: env::var("HUDDLE_CALL_SENDER").unwrap_or_else(|_| DEFAULT_SENDER.to_string()),
        })
    }
}

/// Parse a `name=phone,name=phone` contact list.
pub fn parse_contacts(raw: &str) -> HashMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let (name, phone) = pair.split_once('=')?;
            let (name, phone) = (name.trim(), phone.trim());
            if name.is_empty() || phone.is_empty() {
                return None;
            }
            Some((name.to_string(), phone.to_string()))
        })
        .collect()
}

/// Places voice calls through the SMS Agent API.
pub struct VoiceCallNotifier {
    config: NotifyConfig,
    contacts: HashMap<String, String>,
    client: reqwest::Client,
}

impl VoiceCallNotifier {
    pub fn new(config: NotifyConfig, contacts: HashMap<String, String>) -> Self {
        Self {
            config,
            contacts,
            client: reqwest::Client::new(),
        }
    }

    /// Place one call inviting the room's contact to join.
    pub async fn notify(&self, room: &RoomKey) -> Result<(), NotifyError> {
        let phone = self
            .contacts
            .get(room.as_str())
            .ok_or_else(|| NotifyError::NoContact(room.to_string()))?;

        let text = format!("{}, join the voice room!", room);
        let payload = call_payload(&self.config, phone, &text);

        let response = self
            .client
            .post(&self.config.api_url)
            .json(&payload)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        info!("Voice call for room {} dispatched: {} {}", room, status, body);
        Ok(())
    }
}

fn call_payload(config: &NotifyConfig, phone: &str, text: &str) -> serde_json::Value {
    json!({
        "login": config.login,
        "pass": config.password,
        "type": "voice_lo",
        "sender": config.sender,
        "text": text,
        "payload": [{"phone": phone}],
    })
}

/// Handle held by the relay. Cheap to clone, never blocks.
#[derive(Clone)]
pub struct NotifyHandle {
    tx: async_channel::Sender<RoomKey>,
}

impl NotifyHandle {
    /// Queue a call for a room that just got its first participant. When the
    /// queue is full the notification is dropped, not the connection.
    pub fn room_occupied(&self, room: &RoomKey) {
        if self.tx.try_send(room.clone()).is_err() {
            warn!("Notification queue full, skipping call for room {}", room);
        }
    }
}

/// Spawn the worker that drains the queue and places the calls.
pub fn spawn_notifier(notifier: VoiceCallNotifier) -> NotifyHandle {
    let (tx, rx) = async_channel::bounded::<RoomKey>(NOTIFY_QUEUE_CAPACITY);
    tokio::spawn(async move {
        while let Ok(room) = rx.recv().await {
            match notifier.notify(&room).await {
                Ok(()) => {}
                Err(NotifyError::NoContact(_)) => {
                    debug!("No contact for room {}, skipping call", room);
                }
                Err(e) => warn!("Voice call for room {} failed: {}", room, e),
            }
        }
    });
    NotifyHandle { tx }
}
