use std::collections::HashMap;

use uuid::Uuid;

pub type UserId = Uuid;
pub type ConnectionId = Uuid;

/// Maps each online user to their single live connection.
///
/// `H` is whatever the owner needs to reach the connection (a send queue in
/// the dispatcher, `()` in tests). Keys are exactly the users considered
/// online.
#[derive(Debug)]
pub struct ConnectionRegistry<H> {
    entries: HashMap<UserId, (ConnectionId, H)>,
}

impl<H> Default for ConnectionRegistry<H> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<H> ConnectionRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unconditional upsert. Returns the connection that was superseded, if
    /// any. The superseded connection is not told.
    pub fn register(&mut self, user_id: UserId, conn_id: ConnectionId, handle: H) -> Option<ConnectionId> {
        self.entries
            .insert(user_id, (conn_id, handle))
            .map(|(old, _)| old)
    }

    /// Remove `user_id` only if it is still owned by `conn_id`.
    /// A disconnect for a superseded connection is a no-op.
    pub fn unregister(&mut self, user_id: UserId, conn_id: ConnectionId) -> bool {
        match self.entries.get(&user_id) {
            Some((stored, _)) if *stored == conn_id => {
                self.entries.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    pub fn lookup(&self, user_id: UserId) -> Option<ConnectionId> {
        self.entries.get(&user_id).map(|(conn_id, _)| *conn_id)
    }

    pub fn handle(&self, user_id: UserId) -> Option<(ConnectionId, &H)> {
        self.entries.get(&user_id).map(|(conn_id, h)| (*conn_id, h))
    }

    /// Snapshot of online users, in no particular order.
    pub fn list_online(&self) -> Vec<UserId> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
