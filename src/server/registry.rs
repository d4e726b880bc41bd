use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use dashmap::DashMap;

pub type SessionId = u64;

/// Live sessions keyed by id.
///
/// The listener registers a session before spawning it and the session task
/// removes its own entry once the connection is gone.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionInfo>,
    next_id: AtomicU64,
}

#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub peer: SocketAddr,
    pub connected_at: Instant,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn register(&self, peer: SocketAddr) -> SessionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.sessions.insert(
            id,
            SessionInfo {
                peer,
                connected_at: Instant::now(),
            },
        );
        id
    }

    pub fn remove(&self, id: SessionId) -> Option<SessionInfo> {
        self.sessions.remove(&id).map(|(_, info)| info)
    }

    pub fn get(&self, id: SessionId) -> Option<SessionInfo> {
        self.sessions.get(&id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn ids_are_unique_and_entries_removable() {
        let registry = SessionRegistry::new();
        let first = registry.register(peer(4000));
        let second = registry.register(peer(4001));

        assert_ne!(first, second);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(second).unwrap().peer, peer(4001));

        let removed = registry.remove(first).unwrap();
        assert_eq!(removed.peer, peer(4000));
        assert!(!registry.contains(first));
        assert!(registry.remove(first).is_none());
        assert_eq!(registry.len(), 1);
    }
}
