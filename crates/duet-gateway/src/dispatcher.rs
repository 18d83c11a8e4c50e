use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use duet_types::events::GatewayEvent;

use crate::presence::PresenceBroadcaster;
use crate::registry::{ConnectionId, ConnectionRegistry, UserId};

const BROADCAST_CAPACITY: usize = 1024;

/// Per-connection queue for directed events.
pub type DirectedSender = mpsc::UnboundedSender<GatewayEvent>;
pub type DirectedReceiver = mpsc::UnboundedReceiver<GatewayEvent>;

/// Outcome of a directed delivery attempt. Informational only: callers log
/// it, nobody retries.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Recipient has no registered connection.
    Offline,
    /// Queued on the recipient's connection.
    Sent(ConnectionId),
    /// Recipient was registered but the connection was already gone.
    Dropped(ConnectionId),
}

/// Owns the connection registry and routes events to connections.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Online users: user_id -> (conn_id, directed sender)
    registry: RwLock<ConnectionRegistry<DirectedSender>>,

    /// Everyone-receives channel for presence snapshots
    presence: PresenceBroadcaster,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                registry: RwLock::new(ConnectionRegistry::new()),
                presence: PresenceBroadcaster::new(BROADCAST_CAPACITY),
            }),
        }
    }

    /// Subscribe to events sent to every connection.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.presence.subscribe()
    }

    /// Register a new connection for `user_id`, replacing any older one, and
    /// publish the new online set. Returns the connection id and its directed
    /// receiver.
    pub async fn register(&self, user_id: UserId) -> (ConnectionId, DirectedReceiver) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        // Publish while still holding the lock so snapshots go out in the
        // same order as the mutations that produced them.
        let mut registry = self.inner.registry.write().await;
        if let Some(old) = registry.register(user_id, conn_id, tx) {
            info!("User {} reconnected, connection {} superseded by {}", user_id, old, conn_id);
        }
        self.inner.presence.publish(registry.list_online());

        (conn_id, rx)
    }

    /// Remove `user_id` if `conn_id` still owns it and publish the new online
    /// set. Returns false (and publishes nothing) for a stale disconnect.
    pub async fn unregister(&self, user_id: UserId, conn_id: ConnectionId) -> bool {
        let mut registry = self.inner.registry.write().await;
        if !registry.unregister(user_id, conn_id) {
            debug!("Ignoring disconnect of superseded connection {} for {}", conn_id, user_id);
            return false;
        }
        self.inner.presence.publish(registry.list_online());
        true
    }

    pub async fn lookup(&self, user_id: UserId) -> Option<ConnectionId> {
        self.inner.registry.read().await.lookup(user_id)
    }

    /// Users with a registered connection, in no particular order.
    pub async fn online_users(&self) -> Vec<UserId> {
        self.inner.registry.read().await.list_online()
    }

    /// Send `event` to the recipient's connection only, if they are online.
    /// Best effort: never blocks on the client and never retries.
    pub async fn deliver(&self, recipient: UserId, event: GatewayEvent) -> Delivery {
        let registry = self.inner.registry.read().await;
        let Some((conn_id, tx)) = registry.handle(recipient) else {
            return Delivery::Offline;
        };

        let name = event.name();
        match tx.send(event) {
            Ok(()) => {
                debug!("Delivered {} to {} on connection {}", name, recipient, conn_id);
                Delivery::Sent(conn_id)
            }
            Err(_) => {
                // The socket task has exited but its disconnect has not been
                // processed yet.
                warn!("Dropped {} for {}: connection {} already closed", name, recipient, conn_id);
                Delivery::Dropped(conn_id)
            }
        }
    }
}
