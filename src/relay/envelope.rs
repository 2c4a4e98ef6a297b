use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::types::{ClientId, OutboundMessage};

/// Relay-originated control events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlEvent {
    /// Sent to a client right after it joins, carrying its own identity
    #[serde(rename = "id")]
    Id { id: ClientId },

    /// Broadcast to existing members when a new client joins
    #[serde(rename = "new-peer")]
    NewPeer { id: ClientId },

    /// Broadcast to remaining members when a client disconnects
    #[serde(rename = "peer-left")]
    PeerLeft { id: ClientId },
}

/// Client-originated signaling payload (SDP offers, ICE candidates, ...).
///
/// Only `to` and `from` are meaningful to the relay; everything else,
/// including `type`, lands in the flattened map and is forwarded untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<ClientId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ClientId>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl SignalPayload {
    /// Unicast target, if `to` is present and non-empty.
    /// An empty `to` routes like an absent one: broadcast.
    pub fn target(&self) -> Option<ClientId> {
        match self.to {
            Some(to) if !to.is_empty() => Some(to),
            _ => None,
        }
    }

    /// Default `from` to the relay-assigned sender identity when the client
    /// omitted it. A client-supplied `from` is kept in the payload but is
    /// never used for routing.
    pub fn fill_from(&mut self, sender: ClientId) {
        if self.from.is_none() {
            self.from = Some(sender);
        }
    }
}

/// One wire message: either a relay control event or an opaque client signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Envelope {
    Control(ControlEvent),
    Signal(SignalPayload),
}

impl Envelope {
    pub fn id(id: ClientId) -> Self {
        Envelope::Control(ControlEvent::Id { id })
    }

    pub fn new_peer(id: ClientId) -> Self {
        Envelope::Control(ControlEvent::NewPeer { id })
    }

    pub fn peer_left(id: ClientId) -> Self {
        Envelope::Control(ControlEvent::PeerLeft { id })
    }

    /// Serialize for the wire. Relay-built envelopes always serialize.
    pub fn to_wire(&self) -> OutboundMessage {
        let json =
            serde_json::to_string(self).expect("envelope serialization should never fail");
        OutboundMessage::from(json)
    }
}
