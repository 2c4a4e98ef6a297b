//! In-memory store of room names.
//!
//! This is a plain CRUD record, independent of the live relay: creating a
//! record does not open a room, and the relay never writes live membership
//! back here.

use std::sync::Mutex;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("room name already exists: {0}")]
    NameTaken(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomRecord {
    pub id: u64,
    pub name: String,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    records: Vec<RoomRecord>,
}

/// Create/list interface over room names.
#[derive(Default)]
pub struct RoomDirectory {
    inner: Mutex<Inner>,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a room name. Names are unique; ids are sequential from 1.
    pub fn create(&self, name: &str) -> Result<RoomRecord, DirectoryError> {
        let mut inner = self.inner.lock().expect("directory lock poisoned");
        if inner.records.iter().any(|record| record.name == name) {
            return Err(DirectoryError::NameTaken(name.to_string()));
        }
        inner.next_id += 1;
        let record = RoomRecord {
            id: inner.next_id,
            name: name.to_string(),
        };
        inner.records.push(record.clone());
        info!("Room name registered: {} (id {})", record.name, record.id);
        Ok(record)
    }

    /// All registered names, in creation order.
    pub fn list(&self) -> Vec<RoomRecord> {
        self.inner
            .lock()
            .expect("directory lock poisoned")
            .records
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_assigns_sequential_ids() {
        let directory = RoomDirectory::new();
        let first = directory.create("standup").unwrap();
        let second = directory.create("family").unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let directory = RoomDirectory::new();
        directory.create("standup").unwrap();
        let err = directory.create("standup").unwrap_err();
        assert!(matches!(err, DirectoryError::NameTaken(name) if name == "standup"));
        assert_eq!(directory.list().len(), 1);
    }

    #[test]
    fn list_preserves_creation_order() {
        let directory = RoomDirectory::new();
        directory.create("a").unwrap();
        directory.create("b").unwrap();
        directory.create("c").unwrap();
        let names: Vec<String> = directory.list().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn record_serializes_to_id_and_name() {
        let directory = RoomDirectory::new();
        let record = directory.create("standup").unwrap();
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"id":1,"name":"standup"}"#);
    }
}
