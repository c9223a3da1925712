//! Pool state notifier — per-case fan-out of committed pool snapshots.
//!
//! A registry of `tokio::sync::broadcast` channels keyed by case id.
//! Delivery is at-least-once and best-effort: a subscriber that lags far
//! enough to miss an update recovers by re-reading the store. Publishes
//! happen after commit, so the per-case event order follows the commit
//! order; nothing here can roll a wager back.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::RwLock;
use tracing::debug;

use crate::types::PoolSnapshot;

/// Buffered events per case channel before slow subscribers start lagging.
const CHANNEL_CAPACITY: usize = 64;

/// Cheap-to-clone handle over the subscriber registry.
#[derive(Clone, Default)]
pub struct PoolNotifier {
    channels: Arc<RwLock<HashMap<i64, broadcast::Sender<PoolSnapshot>>>>,
}

impl PoolNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to pool changes for one case. The channel is created
    /// lazily on first interest.
    pub async fn subscribe(&self, case_id: i64) -> broadcast::Receiver<PoolSnapshot> {
        {
            let channels = self.channels.read().await;
            if let Some(tx) = channels.get(&case_id) {
                return tx.subscribe();
            }
        }

        let mut channels = self.channels.write().await;
        channels
            .entry(case_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Deliver a committed snapshot to every current subscriber of its case.
    /// Returns the number of subscribers reached. A case nobody watches is
    /// not an error.
    pub async fn publish(&self, snapshot: PoolSnapshot) -> usize {
        let case_id = snapshot.case_id;
        let mut channels = self.channels.write().await;

        let Some(tx) = channels.get(&case_id) else {
            debug!(case_id, "No subscribers for pool update");
            return 0;
        };

        match tx.send(snapshot) {
            Ok(n) => {
                debug!(case_id, subscribers = n, "Pool update published");
                n
            }
            Err(_) => {
                // All receivers dropped; prune the dead channel.
                channels.remove(&case_id);
                debug!(case_id, "Pruned channel with no remaining subscribers");
                0
            }
        }
    }

    /// Number of live subscribers for a case.
    pub async fn subscriber_count(&self, case_id: i64) -> usize {
        let channels = self.channels.read().await;
        channels.get(&case_id).map_or(0, |tx| tx.receiver_count())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
