use std::collections::HashMap;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::envelope::Envelope;
use super::types::{ClientId, OutboundMessage, RoomKey};

/// Capacity of each connection's outbound queue. A peer that stalls long
/// enough to fill it starts losing messages instead of growing the queue.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Sending half of a connection's outbound queue. The session owns the
/// receiving half; the registry only ever requests sends through this.
pub type PeerSender = mpsc::Sender<OutboundMessage>;

#[derive(Default)]
struct Room {
    members: HashMap<ClientId, PeerSender>,
}

/// Outcome of a join: the fresh identity, plus whether it took the room from
/// empty to non-empty (the trigger for the first-participant notification).
#[derive(Debug, Clone, Copy)]
pub struct JoinOutcome {
    pub client_id: ClientId,
    pub first_member: bool,
}

/// Authoritative store of live room membership.
///
/// Rooms live in a sharded map: operations on one room are linearized by its
/// shard lock, and unrelated rooms do not contend on a global lock. Rooms are
/// created on first join and deleted in the same critical section that
/// removes the last member, so an empty room is never observable.
#[derive(Default)]
pub struct Registry {
    rooms: DashMap<RoomKey, Room>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room under a fresh identity, creating the room
    /// if it does not exist yet.
    pub fn join(&self, key: &RoomKey, tx: PeerSender) -> JoinOutcome {
        let client_id = ClientId::generate();
        let mut room = self.rooms.entry(key.clone()).or_default();
        let first_member = room.members.is_empty();
        room.members.insert(client_id, tx);
        info!(
            "Client {} joined room {} ({} members)",
            client_id,
            key,
            room.members.len()
        );
        JoinOutcome {
            client_id,
            first_member,
        }
    }

    /// Remove the member if present; a repeat leave is a no-op. Returns
    /// whether the client was still a member.
    pub fn leave(&self, key: &RoomKey, client_id: ClientId) -> bool {
        let Entry::Occupied(mut room) = self.rooms.entry(key.clone()) else {
            return false;
        };
        let removed = room.get_mut().members.remove(&client_id).is_some();
        if removed {
            info!(
                "Client {} left room {} ({} members remain)",
                client_id,
                key,
                room.get().members.len()
            );
        }
        if room.get().members.is_empty() {
            room.remove();
            info!("Room {} removed (empty)", key);
        }
        removed
    }

    /// Deliver to one named member. An unknown room or target is a silent
    /// drop: the peer may have disconnected after the sender chose it.
    pub fn send_to(&self, key: &RoomKey, target: ClientId, envelope: &Envelope) {
        let Some(room) = self.rooms.get(key) else {
            return;
        };
        let Some(tx) = room.members.get(&target) else {
            debug!("Dropping message for {}: not in room {}", target, key);
            return;
        };
        deliver(tx, target, envelope.to_wire());
    }

    /// Deliver to every member except the sender. Each delivery is attempted
    /// independently; one failed peer never stops the rest of the batch.
    pub fn broadcast(&self, key: &RoomKey, sender: ClientId, envelope: &Envelope) {
        let Some(room) = self.rooms.get(key) else {
            return;
        };
        let wire = envelope.to_wire();
        for (peer, tx) in &room.members {
            if *peer == sender {
                continue;
            }
            deliver(tx, *peer, wire.clone());
        }
    }

    /// Membership at call time; empty if the room does not exist.
    pub fn snapshot(&self, key: &RoomKey) -> Vec<ClientId> {
        self.rooms
            .get(key)
            .map(|room| room.members.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn contains_room(&self, key: &RoomKey) -> bool {
        self.rooms.contains_key(key)
    }
}

/// One delivery attempt. A full queue or an already torn-down peer costs a
/// log line, never an error for the caller.
fn deliver(tx: &PeerSender, peer: ClientId, wire: OutboundMessage) {
    use mpsc::error::TrySendError;

    match tx.try_send(wire) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            warn!("Outbound queue full, dropping message for {}", peer);
        }
        Err(TrySendError::Closed(_)) => {
            debug!("Failed to deliver to {}: connection gone", peer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::Receiver;

    fn peer() -> (PeerSender, Receiver<OutboundMessage>) {
        mpsc::channel(OUTBOUND_QUEUE_CAPACITY)
    }

    fn chat() -> Envelope {
        serde_json::from_str(r#"{"type":"chat","text":"hi"}"#).unwrap()
    }

    fn drain(rx: &mut Receiver<OutboundMessage>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg.as_str().to_string());
        }
        out
    }

    #[test]
    fn join_creates_room_with_fresh_identity() {
        let registry = Registry::new();
        let key = RoomKey::from("r1");
        let (tx, _rx) = peer();

        assert!(!registry.contains_room(&key));
        let outcome = registry.join(&key, tx);
        assert!(outcome.first_member);
        assert!(registry.contains_room(&key));
        assert_eq!(registry.snapshot(&key), vec![outcome.client_id]);
    }

    #[test]
    fn second_join_is_not_first_member() {
        let registry = Registry::new();
        let key = RoomKey::from("r1");
        let (tx_a, _rx_a) = peer();
        let (tx_b, _rx_b) = peer();

        let a = registry.join(&key, tx_a);
        let b = registry.join(&key, tx_b);
        assert!(a.first_member);
        assert!(!b.first_member);
        assert_ne!(a.client_id, b.client_id);
        assert_eq!(registry.snapshot(&key).len(), 2);
    }

    #[test]
    fn room_exists_iff_it_has_members() {
        let registry = Registry::new();
        let key = RoomKey::from("r1");
        let (tx_a, _rx_a) = peer();
        let (tx_b, _rx_b) = peer();

        let a = registry.join(&key, tx_a);
        assert_eq!(registry.contains_room(&key), !registry.snapshot(&key).is_empty());

        let b = registry.join(&key, tx_b);
        assert_eq!(registry.contains_room(&key), !registry.snapshot(&key).is_empty());

        registry.leave(&key, a.client_id);
        assert_eq!(registry.contains_room(&key), !registry.snapshot(&key).is_empty());

        registry.leave(&key, b.client_id);
        assert!(!registry.contains_room(&key));
        assert!(registry.snapshot(&key).is_empty());
    }

    #[test]
    fn last_leave_deletes_the_room() {
        let registry = Registry::new();
        let key = RoomKey::from("r1");
        let (tx, _rx) = peer();

        let outcome = registry.join(&key, tx);
        assert!(registry.leave(&key, outcome.client_id));
        assert!(!registry.contains_room(&key));
    }

    #[test]
    fn leave_is_idempotent() {
        let registry = Registry::new();
        let key = RoomKey::from("r1");
        let (tx_a, _rx_a) = peer();
        let (tx_b, _rx_b) = peer();

        let a = registry.join(&key, tx_a);
        let _b = registry.join(&key, tx_b);

        assert!(registry.leave(&key, a.client_id));
        assert!(!registry.leave(&key, a.client_id));
        assert!(!registry.leave(&RoomKey::from("no-such-room"), a.client_id));
    }

    #[test]
    fn unicast_reaches_only_the_target() {
        let registry = Registry::new();
        let key = RoomKey::from("r1");
        let (tx_a, mut rx_a) = peer();
        let (tx_b, mut rx_b) = peer();
        let (tx_c, mut rx_c) = peer();

        let a = registry.join(&key, tx_a);
        let b = registry.join(&key, tx_b);
        let _c = registry.join(&key, tx_c);

        registry.send_to(&key, b.client_id, &chat());
        assert_eq!(drain(&mut rx_b).len(), 1);
        assert!(drain(&mut rx_a).is_empty());
        assert!(drain(&mut rx_c).is_empty());

        // Self-addressed unicast also works: targeting is by identity only.
        registry.send_to(&key, a.client_id, &chat());
        assert_eq!(drain(&mut rx_a).len(), 1);
    }

    #[test]
    fn unicast_to_departed_identity_is_a_noop() {
        let registry = Registry::new();
        let key = RoomKey::from("r1");
        let (tx_a, mut rx_a) = peer();
        let (tx_b, _rx_b) = peer();

        let _a = registry.join(&key, tx_a);
        let b = registry.join(&key, tx_b);
        registry.leave(&key, b.client_id);

        registry.send_to(&key, b.client_id, &chat());
        registry.send_to(&RoomKey::from("no-such-room"), b.client_id, &chat());
        assert!(drain(&mut rx_a).is_empty());
    }

    #[test]
    fn broadcast_excludes_sender_and_reaches_everyone_once() {
        let registry = Registry::new();
        let key = RoomKey::from("r1");
        let (tx_a, mut rx_a) = peer();
        let (tx_b, mut rx_b) = peer();
        let (tx_c, mut rx_c) = peer();

        let a = registry.join(&key, tx_a);
        let _b = registry.join(&key, tx_b);
        let _c = registry.join(&key, tx_c);

        registry.broadcast(&key, a.client_id, &chat());
        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(drain(&mut rx_b).len(), 1);
        assert_eq!(drain(&mut rx_c).len(), 1);
    }

    #[test]
    fn broadcast_to_missing_room_is_a_noop() {
        let registry = Registry::new();
        registry.broadcast(&RoomKey::from("r1"), ClientId::generate(), &chat());
    }

    #[test]
    fn dead_peer_does_not_break_the_batch() {
        let registry = Registry::new();
        let key = RoomKey::from("r1");
        let (tx_a, mut rx_a) = peer();
        let (tx_b, rx_b) = peer();
        let (tx_c, mut rx_c) = peer();

        let a = registry.join(&key, tx_a);
        let _b = registry.join(&key, tx_b);
        let _c = registry.join(&key, tx_c);

        // B's session is gone but it has not left the room yet.
        drop(rx_b);

        registry.broadcast(&key, a.client_id, &chat());
        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(drain(&mut rx_c).len(), 1);
    }

    #[test]
    fn full_queue_drops_only_for_the_stalled_peer() {
        let registry = Registry::new();
        let key = RoomKey::from("r1");
        let (tx_sender, _rx_sender) = peer();
        let (tx_stalled, mut rx_stalled) = mpsc::channel(1);
        let (tx_healthy, mut rx_healthy) = peer();

        let sender = registry.join(&key, tx_sender);
        let _stalled = registry.join(&key, tx_stalled.clone());
        let _healthy = registry.join(&key, tx_healthy);

        // Fill the stalled peer's queue.
        tx_stalled
            .try_send(OutboundMessage::from(String::from("backlog")))
            .unwrap();

        registry.broadcast(&key, sender.client_id, &chat());

        assert_eq!(drain(&mut rx_stalled), vec!["backlog".to_string()]);
        assert_eq!(drain(&mut rx_healthy).len(), 1);
    }

    #[test]
    fn snapshot_tracks_membership_changes() {
        let registry = Registry::new();
        let key = RoomKey::from("r1");
        let (tx_a, _rx_a) = peer();
        let (tx_b, _rx_b) = peer();

        let a = registry.join(&key, tx_a);
        let b = registry.join(&key, tx_b);

        let members = registry.snapshot(&key);
        assert!(members.contains(&a.client_id));
        assert!(members.contains(&b.client_id));

        registry.leave(&key, b.client_id);
        assert_eq!(registry.snapshot(&key), vec![a.client_id]);
    }
}
