//! Live connection registry
//!
//! Tracks every connection between registration (handshake complete)
//! and teardown. Shutdown drains the registry so each connection can be
//! torn down through the normal idempotent path.

use std::sync::Arc;

use dashmap::DashMap;
use types::ids::ConnectionId;

use crate::connection::Connection;

pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    pub fn register(&self, connection: Arc<Connection>) {
        self.connections.insert(connection.id(), connection);
    }

    pub fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.remove(&id).map(|(_, conn)| conn)
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(&id).map(|entry| Arc::clone(&entry))
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Remove and return every live connection, for shutdown teardown.
    pub fn drain(&self) -> Vec<Arc<Connection>> {
        let ids: Vec<ConnectionId> = self.connections.iter().map(|e| *e.key()).collect();
        ids.into_iter()
            .filter_map(|id| self.remove(id))
            .collect()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
