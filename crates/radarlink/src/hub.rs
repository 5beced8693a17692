//! Broadcast hub for connected display clients.
//!
//! Every live sample is pushed to all clients connected at that moment.
//! There is no replay: a client only sees samples broadcast after it joins.
//! Delivery is fire-and-forget; a client that falls behind the channel
//! capacity skips ahead instead of holding up the others.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::sample::Sample;

/// Name of the single real-time event type.
pub const RADAR_EVENT: &str = "radar-data";

/// Opaque identifier of one display client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client-{:04x}", self.0)
    }
}

/// Wire form of a broadcast sample.
#[derive(Debug, Clone, Serialize)]
pub struct RadarEvent<'a> {
    /// Always [`RADAR_EVENT`].
    pub event: &'static str,
    /// The sample, as `{angle, distance, fecha_hora}`.
    pub data: &'a Sample,
}

impl<'a> RadarEvent<'a> {
    /// Wrap a sample.
    #[must_use]
    pub fn new(data: &'a Sample) -> Self {
        Self {
            event: RADAR_EVENT,
            data,
        }
    }

    /// Serialize to the JSON text sent to clients.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Fan-out of samples to connected clients.
#[derive(Debug)]
pub struct BroadcastHub {
    tx: broadcast::Sender<Sample>,
    clients: Mutex<HashSet<SessionId>>,
    next_id: AtomicU64,
}

impl BroadcastHub {
    /// Create a hub whose clients may lag at most `capacity` samples.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            clients: Mutex::new(HashSet::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new client.
    pub fn connect(&self) -> Subscription {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let rx = self.tx.subscribe();
        self.lock_clients().insert(id);
        info!(client = %id, "display client connected");
        Subscription { id, rx }
    }

    /// Forget a client. Unknown or already removed ids are ignored.
    pub fn disconnect(&self, id: SessionId) {
        if self.lock_clients().remove(&id) {
            info!(client = %id, "display client disconnected");
        }
    }

    /// Send `sample` to every connected client and return how many
    /// subscriptions it reached.
    pub fn broadcast(&self, sample: &Sample) -> usize {
        // An error only means nobody is listening.
        let reached = self.tx.send(sample.clone()).unwrap_or(0);
        debug!(reached, angle = sample.angle, distance = sample.distance, "broadcast sample");
        reached
    }

    /// Number of connected clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.lock_clients().len()
    }

    /// Whether `id` is currently connected.
    #[must_use]
    pub fn is_connected(&self, id: SessionId) -> bool {
        self.lock_clients().contains(&id)
    }

    fn lock_clients(&self) -> std::sync::MutexGuard<'_, HashSet<SessionId>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One client's view of the hub.
#[derive(Debug)]
pub struct Subscription {
    id: SessionId,
    rx: broadcast::Receiver<Sample>,
}

impl Subscription {
    /// The session id assigned on connect.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Wait for the next sample. Returns `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<Sample> {
        loop {
            match self.rx.recv().await {
                Ok(sample) => return Some(sample),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(client = %self.id, skipped, "display client lagging, skipped samples");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next sample if one is already waiting.
    #[cfg(test)]
    pub(crate) fn try_recv(&mut self) -> Option<Sample> {
        loop {
            match self.rx.try_recv() {
                Ok(sample) => return Some(sample),
                Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample(angle: i32) -> Sample {
        Sample::at(angle, 100, Utc.with_ymd_and_hms(2025, 1, 16, 14, 32, 16).unwrap())
    }

    #[test]
    fn test_connect_and_disconnect() {
        let hub = BroadcastHub::new(8);
        let a = hub.connect();
        let b = hub.connect();
        assert_ne!(a.id(), b.id());
        assert_eq!(hub.client_count(), 2);

        hub.disconnect(a.id());
        assert!(!hub.is_connected(a.id()));
        assert!(hub.is_connected(b.id()));

        hub.disconnect(a.id());
        assert_eq!(hub.client_count(), 1);
    }

    #[test]
    fn test_broadcast_without_clients() {
        let hub = BroadcastHub::new(8);
        assert_eq!(hub.broadcast(&sample(1)), 0);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_clients_in_order() {
        let hub = BroadcastHub::new(8);
        let mut a = hub.connect();
        let mut b = hub.connect();

        assert_eq!(hub.broadcast(&sample(10)), 2);
        assert_eq!(hub.broadcast(&sample(20)), 2);

        for sub in [&mut a, &mut b] {
            assert_eq!(sub.recv().await.map(|s| s.angle), Some(10));
            assert_eq!(sub.recv().await.map(|s| s.angle), Some(20));
        }
    }

    #[tokio::test]
    async fn test_late_joiner_gets_no_backfill() {
        let hub = BroadcastHub::new(8);
        let _early = hub.connect();
        hub.broadcast(&sample(1));

        let mut late = hub.connect();
        assert!(late.try_recv().is_none());

        hub.broadcast(&sample(2));
        assert_eq!(late.recv().await.map(|s| s.angle), Some(2));
    }

    #[tokio::test]
    async fn test_slow_client_does_not_block_others() {
        let hub = BroadcastHub::new(2);
        let mut slow = hub.connect();
        let mut fast = hub.connect();

        for angle in 0..5 {
            hub.broadcast(&sample(angle));
            assert_eq!(fast.recv().await.map(|s| s.angle), Some(angle));
        }

        // The slow client skipped ahead to the newest retained samples.
        assert_eq!(slow.recv().await.map(|s| s.angle), Some(3));
        assert_eq!(slow.recv().await.map(|s| s.angle), Some(4));
    }

    #[tokio::test]
    async fn test_recv_ends_when_hub_dropped() {
        let hub = BroadcastHub::new(2);
        let mut sub = hub.connect();
        drop(hub);
        assert!(sub.recv().await.is_none());
    }

    #[test]
    fn test_radar_event_json() {
        let s = sample(127);
        let json: serde_json::Value =
            serde_json::from_str(&RadarEvent::new(&s).to_json().unwrap()).unwrap();
        assert_eq!(json["event"], "radar-data");
        assert_eq!(json["data"]["angle"], 127);
        assert_eq!(json["data"]["distance"], 100);
        assert_eq!(json["data"]["fecha_hora"], "2025-01-16T14:32:16.000Z");
    }

    #[test]
    fn test_session_id_display() {
        let hub = BroadcastHub::new(1);
        let sub = hub.connect();
        assert!(sub.id().to_string().starts_with("client-"));
    }
}
