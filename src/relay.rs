//! Room-scoped WebSocket relay for P2P signaling

mod envelope;
mod gateway;
mod registry;
mod session;
mod types;

pub use envelope::{ControlEvent, Envelope, SignalPayload};
pub use gateway::{DEFAULT_RELAY_PORT, Gateway};
pub use registry::{JoinOutcome, OUTBOUND_QUEUE_CAPACITY, PeerSender, Registry};
pub use types::{ClientId, OutboundMessage, RoomKey};
