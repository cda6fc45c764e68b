//! Traits for depth/color frame sources

use std::sync::Arc;

use super::frame::SyncedPair;

/// Callback receiving every synchronized pair, invoked on the producer's thread
pub type PairListener = Arc<dyn Fn(&SyncedPair) + Send + Sync>;

/// Anything that publishes synchronized depth/color pairs
pub trait FrameSource: Send + Sync {
    /// Subscribe under `id`; delivery is synchronous and unqueued
    fn register_synced_pair_listener(&self, id: &str, listener: PairListener);

    /// Unsubscribe `id`. Returns false if nothing was registered under it.
    fn unregister_synced_pair_listener(&self, id: &str) -> bool;
}
