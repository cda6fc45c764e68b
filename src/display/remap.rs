//! Linear pixel-value remapping for visualization

use half::f16;
use log::{debug, warn};

use crate::capture::frame::{FourCc, PixelFormat};
use crate::capture::pixel_buffer::PixelBuffer;

/// `v' = v * scale + offset`, mapping `[min, max]` onto `[target_min, target_max]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearRemap {
    pub scale: f32,
    pub offset: f32,
}

impl LinearRemap {
    pub fn new(min_range: f32, max_range: f32, target_min: f32, target_max: f32) -> Self {
        let scale = (target_max - target_min) / (max_range - min_range);
        Self {
            scale,
            offset: target_min - min_range * scale,
        }
    }

    pub fn apply(&self, value: f32) -> f32 {
        value * self.scale + self.offset
    }

    fn is_degenerate(&self) -> bool {
        !self.scale.is_finite() || !self.offset.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemapOutcome {
    Applied { samples: usize },
    Unsupported(FourCc),
    DegenerateRange,
}

enum Sample {
    U8,
    U16,
    F16,
}

/// Remap every sample of `buffer` in place, row by row; row padding is left alone
pub fn remap_in_place(buffer: &PixelBuffer, remap: LinearRemap) -> RemapOutcome {
    let geometry = buffer.geometry();
    let Some(format) = geometry.format() else {
        warn!("remap: unsupported pixel format {}", geometry.pixel_format);
        return RemapOutcome::Unsupported(geometry.pixel_format);
    };
    let sample = match format {
        PixelFormat::OneComponent8 | PixelFormat::Bgra32 => Sample::U8,
        PixelFormat::OneComponent16 => Sample::U16,
        PixelFormat::DepthFloat16 | PixelFormat::DisparityFloat16 => Sample::F16,
        PixelFormat::DepthFloat32 => {
            warn!("remap: unsupported pixel format {}", format);
            return RemapOutcome::Unsupported(geometry.pixel_format);
        }
    };
    if remap.is_degenerate() {
        debug!("remap: degenerate range, buffer untouched");
        return RemapOutcome::DegenerateRange;
    }

    let stride = geometry.bytes_per_row as usize;
    let used = (geometry.width as usize * format.bytes_per_pixel()).min(stride);
    if stride == 0 || used == 0 {
        return RemapOutcome::Applied { samples: 0 };
    }

    let mut samples = 0;
    let mut pixels = buffer.write();
    for row in pixels.chunks_exact_mut(stride) {
        let row = &mut row[..used];
        match sample {
            Sample::U8 => {
                for v in row.iter_mut() {
                    *v = remap.apply(*v as f32).clamp(0.0, u8::MAX as f32) as u8;
                }
                samples += row.len();
            }
            Sample::U16 => {
                for v in row.chunks_exact_mut(2) {
                    let raw = u16::from_le_bytes([v[0], v[1]]);
                    let mapped = remap.apply(raw as f32).clamp(0.0, u16::MAX as f32) as u16;
                    v.copy_from_slice(&mapped.to_le_bytes());
                }
                samples += row.len() / 2;
            }
            Sample::F16 => {
                for v in row.chunks_exact_mut(2) {
                    let raw = f16::from_le_bytes([v[0], v[1]]).to_f32();
                    v.copy_from_slice(&f16::from_f32(remap.apply(raw)).to_le_bytes());
                }
                samples += row.len() / 2;
            }
        }
    }
    RemapOutcome::Applied { samples }
}
