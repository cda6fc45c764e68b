//! Depth/color frame pair synchronizer
//!
//! The camera reports, per capture instant, one optional frame from each
//! stream plus a dropped flag for each side. Only complete instants become
//! a [`SyncedPair`]; everything else is discarded and counted.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, trace};

use super::frame::{CaptureFrame, SyncedPair, Timestamp};
use super::traits::{FrameSource, PairListener};
use crate::utils::listeners::ListenerRegistry;

/// Everything the hardware reported for one capture instant
#[derive(Debug, Clone, Default)]
pub struct CaptureTick {
    pub depth: Option<CaptureFrame>,
    pub color: Option<CaptureFrame>,
    pub depth_dropped: bool,
    pub color_dropped: bool,
    pub timestamp: Timestamp,
}

impl CaptureTick {
    pub fn complete(depth: CaptureFrame, color: CaptureFrame, timestamp: Timestamp) -> Self {
        Self {
            depth: Some(depth),
            color: Some(color),
            depth_dropped: false,
            color_dropped: false,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Depth,
    Color,
    Both,
    /// No drop was reported but a frame is missing
    Incomplete,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::Depth => write!(f, "depth dropped"),
            DropReason::Color => write!(f, "color dropped"),
            DropReason::Both => write!(f, "depth and color dropped"),
            DropReason::Incomplete => write!(f, "incomplete pair"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Emitted { listeners: usize },
    Discarded(DropReason),
}

pub struct FramePairSynchronizer {
    listeners: ListenerRegistry<PairListener>,
    ticks_emitted: AtomicU64,
    ticks_discarded: AtomicU64,
}

impl FramePairSynchronizer {
    pub fn new() -> Self {
        Self {
            listeners: ListenerRegistry::new("FramePairSynchronizer"),
            ticks_emitted: AtomicU64::new(0),
            ticks_discarded: AtomicU64::new(0),
        }
    }

    /// Handle one capture instant, emitting a pair to every listener if it is complete
    pub fn on_tick(&self, tick: CaptureTick) -> TickOutcome {
        let reason = match (tick.depth_dropped, tick.color_dropped) {
            (true, true) => Some(DropReason::Both),
            (true, false) => Some(DropReason::Depth),
            (false, true) => Some(DropReason::Color),
            (false, false) => None,
        };
        if let Some(reason) = reason {
            return self.discard(tick.timestamp, reason);
        }

        let (Some(depth), Some(color)) = (tick.depth, tick.color) else {
            return self.discard(tick.timestamp, DropReason::Incomplete);
        };

        let pair = SyncedPair {
            depth,
            color,
            timestamp: tick.timestamp,
        };

        let listeners = self.listeners.snapshot();
        for listener in &listeners {
            listener(&pair);
        }

        self.ticks_emitted.fetch_add(1, Ordering::Relaxed);
        trace!(
            "FramePairSynchronizer: emitted pair at {} to {} listeners",
            pair.timestamp,
            listeners.len()
        );
        TickOutcome::Emitted {
            listeners: listeners.len(),
        }
    }

    fn discard(&self, timestamp: Timestamp, reason: DropReason) -> TickOutcome {
        self.ticks_discarded.fetch_add(1, Ordering::Relaxed);
        debug!("FramePairSynchronizer: discarded tick at {} ({})", timestamp, reason);
        TickOutcome::Discarded(reason)
    }

    pub fn ticks_emitted(&self) -> u64 {
        self.ticks_emitted.load(Ordering::Relaxed)
    }

    pub fn ticks_discarded(&self) -> u64 {
        self.ticks_discarded.load(Ordering::Relaxed)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Default for FramePairSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for FramePairSynchronizer {
    fn register_synced_pair_listener(&self, id: &str, listener: PairListener) {
        self.listeners.register(id, listener);
    }

    fn unregister_synced_pair_listener(&self, id: &str) -> bool {
        self.listeners.unregister(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::{Geometry, PixelFormat};
    use crate::capture::pixel_buffer::PixelBuffer;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use std::thread;

    fn frame(format: PixelFormat, nanos: i64) -> CaptureFrame {
        CaptureFrame::new(
            PixelBuffer::new(Geometry::packed(4, 4, format)),
            Timestamp::from_nanos(nanos),
        )
    }

    fn tick(nanos: i64, depth_dropped: bool, color_dropped: bool) -> CaptureTick {
        CaptureTick {
            depth: Some(frame(PixelFormat::DepthFloat16, nanos)),
            color: Some(frame(PixelFormat::Bgra32, nanos)),
            depth_dropped,
            color_dropped,
            timestamp: Timestamp::from_nanos(nanos),
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<i64>>>, PairListener) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listener: PairListener = Arc::new(move |pair: &SyncedPair| {
            sink.lock().push(pair.timestamp.nanos);
        });
        (seen, listener)
    }

    #[test]
    fn test_complete_tick_emits_once() {
        let sync = FramePairSynchronizer::new();
        let (seen, listener) = recorder();
        sync.register_synced_pair_listener("a", listener);

        assert_eq!(sync.on_tick(tick(10, false, false)), TickOutcome::Emitted { listeners: 1 });
        assert_eq!(*seen.lock(), vec![10]);
        assert_eq!(sync.ticks_emitted(), 1);
    }

    #[test]
    fn test_dropped_ticks_emit_nothing() {
        let sync = FramePairSynchronizer::new();
        let (seen, listener) = recorder();
        sync.register_synced_pair_listener("a", listener);

        assert_eq!(sync.on_tick(tick(1, true, false)), TickOutcome::Discarded(DropReason::Depth));
        assert_eq!(sync.on_tick(tick(2, false, true)), TickOutcome::Discarded(DropReason::Color));
        assert_eq!(sync.on_tick(tick(3, true, true)), TickOutcome::Discarded(DropReason::Both));
        assert!(seen.lock().is_empty());
        assert_eq!(sync.ticks_discarded(), 3);
    }

    #[test]
    fn test_missing_frame_is_discarded() {
        let sync = FramePairSynchronizer::new();
        let (seen, listener) = recorder();
        sync.register_synced_pair_listener("a", listener);

        let mut partial = tick(5, false, false);
        partial.color = None;
        assert_eq!(sync.on_tick(partial), TickOutcome::Discarded(DropReason::Incomplete));
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_listeners_called_in_registration_order() {
        let sync = FramePairSynchronizer::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for id in ["first", "second", "third"] {
            let order = order.clone();
            sync.register_synced_pair_listener(
                id,
                Arc::new(move |_: &SyncedPair| order.lock().push(id)),
            );
        }

        sync.on_tick(tick(1, false, false));
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_unknown_listener_removal_keeps_others() {
        let sync = FramePairSynchronizer::new();
        let (seen, listener) = recorder();
        sync.register_synced_pair_listener("a", listener);

        assert!(!sync.unregister_synced_pair_listener("nope"));
        sync.on_tick(tick(7, false, false));
        assert_eq!(*seen.lock(), vec![7]);
    }

    #[test]
    fn test_listener_can_unregister_itself() {
        let sync = Arc::new(FramePairSynchronizer::new());
        let calls = Arc::new(AtomicU64::new(0));

        let weak = Arc::downgrade(&sync);
        let counter = calls.clone();
        sync.register_synced_pair_listener(
            "once",
            Arc::new(move |_: &SyncedPair| {
                counter.fetch_add(1, Ordering::Relaxed);
                if let Some(sync) = weak.upgrade() {
                    sync.unregister_synced_pair_listener("once");
                }
            }),
        );

        sync.on_tick(tick(1, false, false));
        sync.on_tick(tick(2, false, false));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(sync.listener_count(), 0);
    }

    #[test]
    fn test_registry_changes_during_notification() {
        let sync = FramePairSynchronizer::new();
        let (steady, listener) = recorder();
        sync.register_synced_pair_listener("steady", listener);

        let flaky_calls = Arc::new(AtomicU64::new(0));
        let done = AtomicBool::new(false);
        thread::scope(|s| {
            s.spawn(|| {
                for i in 0..2000 {
                    sync.on_tick(tick(i, false, false));
                }
                done.store(true, Ordering::Release);
            });
            s.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    let calls = flaky_calls.clone();
                    sync.register_synced_pair_listener(
                        "flaky",
                        Arc::new(move |_: &SyncedPair| {
                            calls.fetch_add(1, Ordering::Relaxed);
                        }),
                    );
                    thread::yield_now();
                    assert!(sync.unregister_synced_pair_listener("flaky"));

                    // an in-flight notification may still reach it once
                    let after_unregister = flaky_calls.load(Ordering::Relaxed);
                    for _ in 0..50 {
                        thread::yield_now();
                    }
                    assert!(flaky_calls.load(Ordering::Relaxed) - after_unregister <= 1);
                }
            });
        });

        assert_eq!(*steady.lock(), (0..2000).collect::<Vec<i64>>());
        assert_eq!(sync.ticks_emitted(), 2000);
        assert_eq!(sync.listener_count(), 1);
    }
}
