//! Live-sample fan-out: every decoded sample goes to the history log and to
//! the connected display clients.

use std::sync::Arc;

use tracing::warn;

use crate::hub::BroadcastHub;
use crate::sample::Sample;
use crate::store::StoreHandle;

/// What happened to one dispatched sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// The sample was queued for the history log.
    pub persisted: bool,
    /// Number of client subscriptions reached.
    pub clients: usize,
}

/// Forwards live samples to persistence and broadcast.
///
/// The two sinks are independent: a failing log never stops the broadcast
/// and vice versa.
#[derive(Debug, Clone)]
pub struct Relay {
    store: StoreHandle,
    hub: Arc<BroadcastHub>,
}

impl Relay {
    /// Create a relay over the given sinks.
    #[must_use]
    pub fn new(store: StoreHandle, hub: Arc<BroadcastHub>) -> Self {
        Self { store, hub }
    }

    /// Persist and broadcast one sample.
    pub fn dispatch(&self, sample: &Sample) -> Delivery {
        let persisted = match self.store.append(sample.clone()) {
            Ok(()) => true,
            Err(e) => {
                warn!(angle = sample.angle, distance = sample.distance, "sample not logged: {e}");
                false
            }
        };
        let clients = self.hub.broadcast(sample);
        Delivery { persisted, clients }
    }
}
