use std::{
    collections::BTreeMap,
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::mpsc::UnboundedSender;

pub type SessionId = u64;

/// Routing entry for one registered session.
///
/// Carries the display name and a queue handle to the session's writer task.
/// The directory never owns the connection: dropping an entry only drops a
/// sender clone, and the session's own task tears down the socket.
#[derive(Clone)]
pub struct SessionHandle {
    pub id: SessionId,
    pub name: String,
    pub outbound: UnboundedSender<String>,
}

/// The live set of registered chat sessions.
///
/// A session appears here iff its registration completed and it has not yet
/// begun closing. Membership changes and snapshots contend on one lock, so a
/// fan-out never observes a half-added or half-removed session. The map is a
/// `BTreeMap` keyed by session id, giving deterministic join-order iteration.
pub struct SessionDirectory {
    sessions: Mutex<BTreeMap<SessionId, SessionHandle>>,
    next_id: AtomicU64,
}

impl SessionDirectory {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a session under a fresh id and returns its handle.
    pub fn add(&self, name: String, outbound: UnboundedSender<String>) -> SessionHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = SessionHandle { id, name, outbound };
        self.sessions.lock().unwrap().insert(id, handle.clone());
        handle
    }

    pub fn remove(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions.lock().unwrap().remove(&id)
    }

    /// Stable copy of the current membership in join order.
    pub fn snapshot(&self) -> Vec<SessionHandle> {
        self.sessions.lock().unwrap().values().cloned().collect()
    }

    /// First session whose name matches case-insensitively, in join order.
    ///
    /// Duplicate names are permitted, so later holders of the same name are
    /// never matched.
    pub fn find_by_name(&self, name: &str) -> Option<SessionHandle> {
        self.sessions
            .lock()
            .unwrap()
            .values()
            .find(|handle| handle.name.eq_ignore_ascii_case(name))
            .cloned()
    }
}

impl Default for SessionDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn register(directory: &SessionDirectory, name: &str) -> SessionHandle {
        let (tx, _rx) = mpsc::unbounded_channel();
        directory.add(name.to_string(), tx)
    }

    #[test]
    fn snapshot_tracks_membership() {
        let directory = SessionDirectory::new();
        assert!(directory.snapshot().is_empty());

        let alice = register(&directory, "alice");
        let bob = register(&directory, "bob");
        assert_eq!(directory.snapshot().len(), 2);

        directory.remove(alice.id);
        let names: Vec<String> = directory
            .snapshot()
            .into_iter()
            .map(|handle| handle.name)
            .collect();
        assert_eq!(names, vec!["bob"]);

        directory.remove(bob.id);
        assert!(directory.snapshot().is_empty());
    }

    #[test]
    fn snapshot_preserves_join_order() {
        let directory = SessionDirectory::new();
        register(&directory, "carol");
        register(&directory, "alice");
        register(&directory, "bob");

        let names: Vec<String> = directory
            .snapshot()
            .into_iter()
            .map(|handle| handle.name)
            .collect();
        assert_eq!(names, vec!["carol", "alice", "bob"]);
    }

    #[test]
    fn find_by_name_is_case_insensitive() {
        let directory = SessionDirectory::new();
        let alice = register(&directory, "Alice");

        let found = directory.find_by_name("alice").expect("should match");
        assert_eq!(found.id, alice.id);
        assert!(directory.find_by_name("ghost").is_none());
    }

    #[test]
    fn duplicate_names_resolve_to_first_joiner() {
        let directory = SessionDirectory::new();
        let first = register(&directory, "dup");
        let _second = register(&directory, "dup");

        let found = directory.find_by_name("DUP").expect("should match");
        assert_eq!(found.id, first.id);
    }

    #[test]
    fn remove_returns_the_handle_once() {
        let directory = SessionDirectory::new();
        let alice = register(&directory, "alice");

        let removed = directory.remove(alice.id).expect("first removal");
        assert_eq!(removed.name, "alice");
        assert!(directory.remove(alice.id).is_none());
    }
}
