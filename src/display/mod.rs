//! Display-side helpers for reconstructed buffers

pub mod remap;

pub use remap::{LinearRemap, RemapOutcome, remap_in_place};
