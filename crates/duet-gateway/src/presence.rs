use tokio::sync::broadcast;
use tracing::{debug, warn};

use duet_types::events::GatewayEvent;

use crate::registry::UserId;

/// Fan-out channel for events every connection receives.
///
/// Each connection drains its own receiver, so publishing never waits on a
/// slow client. A client that falls more than `capacity` events behind
/// skips the missed ones.
#[derive(Clone)]
pub struct PresenceBroadcaster {
    tx: broadcast::Sender<GatewayEvent>,
}

impl PresenceBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.tx.subscribe()
    }

    /// Publish a full `getOnlineUser` snapshot. Returns how many connections
    /// it was queued for.
    pub fn publish(&self, online: Vec<UserId>) -> usize {
        let count = online.len();
        match self.tx.send(GatewayEvent::OnlineUsers(online)) {
            Ok(receivers) => {
                debug!("Presence snapshot ({} online) queued for {} connections", count, receivers);
                receivers
            }
            // No connections are listening; nothing to do.
            Err(_) => 0,
        }
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Pull the next broadcast event, skipping over any the receiver lagged past.
/// Returns `None` once the broadcaster is gone.
pub async fn next_event(rx: &mut broadcast::Receiver<GatewayEvent>) -> Option<GatewayEvent> {
    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Broadcast receiver lagged by {} messages", n);
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn publish_reaches_every_subscriber() {
        let presence = PresenceBroadcaster::new(16);
        let mut a = presence.subscribe();
        let mut b = presence.subscribe();
        let user = Uuid::new_v4();

        assert_eq!(presence.publish(vec![user]), 2);

        let expected = GatewayEvent::OnlineUsers(vec![user]);
        assert_eq!(next_event(&mut a).await, Some(expected.clone()));
        assert_eq!(next_event(&mut b).await, Some(expected));
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let presence = PresenceBroadcaster::new(4);
        assert_eq!(presence.publish(vec![]), 0);
        assert_eq!(presence.receiver_count(), 0);
    }

    #[tokio::test]
    async fn lagged_receiver_resumes_with_latest() {
        let presence = PresenceBroadcaster::new(2);
        let mut rx = presence.subscribe();

        let users: Vec<UserId> = (0..5).map(|_| Uuid::new_v4()).collect();
        for i in 0..users.len() {
            presence.publish(users[..=i].to_vec());
        }

        // Oldest snapshots were overwritten; the receiver picks up the
        // surviving tail instead of erroring out.
        assert_eq!(
            next_event(&mut rx).await,
            Some(GatewayEvent::OnlineUsers(users[..4].to_vec()))
        );
        assert_eq!(
            next_event(&mut rx).await,
            Some(GatewayEvent::OnlineUsers(users.clone()))
        );
    }
}
