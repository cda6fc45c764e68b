//! Depth/color frame capture
//!
//! Frame and pixel buffer types, the pair synchronizer, and a synthetic
//! camera that drives it without hardware.

pub mod frame;
pub mod pixel_buffer;
pub mod sync;
pub mod synthetic;
pub mod traits;

pub use frame::{CaptureFrame, FourCc, Geometry, PixelFormat, SyncedPair, Timestamp};
pub use pixel_buffer::PixelBuffer;
pub use sync::{CaptureTick, DropReason, FramePairSynchronizer, TickOutcome};
pub use synthetic::{SyntheticCamera, SyntheticCameraConfig};
pub use traits::{FrameSource, PairListener};
