use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio_tungstenite::tungstenite::Utf8Bytes;

const CLIENT_ID_LEN: usize = 23;
const HEX_CHARS: &[u8] = b"0123456789abcdef";

/// Process-wide join sequence. Folded into every generated [`ClientId`] so an
/// identity can never repeat within one process, no matter how the RNG rolls.
static NEXT_CLIENT_SEQ: AtomicU32 = AtomicU32::new(0);

/// Client identity: 23-byte fixed array ("client_" + 16 hex).
///
/// Assigned at join time, valid for exactly one connection's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId {
    bytes: [u8; CLIENT_ID_LEN],
    len: u8,
}

impl ClientId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; CLIENT_ID_LEN];
        bytes[..7].copy_from_slice(b"client_");

        let mut rng = rand::rng();
        let entropy: u32 = rng.random();
        let seq = NEXT_CLIENT_SEQ.fetch_add(1, Ordering::Relaxed);
        let value = ((entropy as u64) << 32) | u64::from(seq);

        for i in 0..16 {
            let nibble = ((value >> (60 - i * 4)) & 0xF) as usize;
            bytes[7 + i] = HEX_CHARS[nibble];
        }
        Self {
            bytes,
            len: CLIENT_ID_LEN as u8,
        }
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ClientId {
    fn from(s: &str) -> Self {
        let mut bytes = [0u8; CLIENT_ID_LEN];
        let src = s.as_bytes();
        let len = src.len().min(CLIENT_ID_LEN);
        bytes[..len].copy_from_slice(&src[..len]);
        Self {
            bytes,
            len: len as u8,
        }
    }
}

impl Serialize for ClientId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ClientId {
    // Owned String here: ClientId is deserialized through flattened and
    // untagged contexts, where borrowed &str is not available.
    //
    // Over-length input is an error, never a truncation: a truncated id
    // could collide with a real member's id and route a message meant for
    // nobody.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s.len() > CLIENT_ID_LEN {
            return Err(serde::de::Error::invalid_length(
                s.len(),
                &"a client id of at most 23 bytes",
            ));
        }
        Ok(ClientId::from(s.as_str()))
    }
}

/// Room key: the client-supplied path segment naming a live room.
///
/// Not validated and not persisted; a room exists only while it has members.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomKey(String);

impl RoomKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RoomKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Serialize for RoomKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RoomKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(RoomKey(s))
    }
}

/// Wrapper for outbound WebSocket messages using tungstenite's Utf8Bytes.
#[derive(Debug, Clone)]
pub struct OutboundMessage(Utf8Bytes);

impl OutboundMessage {
    /// Create a new outbound message from any string type
    pub fn new(s: impl Into<Utf8Bytes>) -> Self {
        Self(s.into())
    }

    /// Get the inner Utf8Bytes for tungstenite Message::Text
    pub fn into_inner(self) -> Utf8Bytes {
        self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<String> for OutboundMessage {
    fn from(s: String) -> Self {
        Self(Utf8Bytes::from(s))
    }
}
