//! Frame and geometry types shared by the capture, encoder and decoder sides

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::pixel_buffer::PixelBuffer;

/// Four-character code packed into a `u32`, first character in the high byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc(pub u32);

impl FourCc {
    pub const fn from_bytes(code: &[u8; 4]) -> Self {
        Self(
            (code[0] as u32) << 24
                | (code[1] as u32) << 16
                | (code[2] as u32) << 8
                | code[3] as u32,
        )
    }

    pub const fn to_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.to_bytes();
        if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            write!(f, "'{}'", String::from_utf8_lossy(&bytes))
        } else {
            write!(f, "0x{:08x}", self.0)
        }
    }
}

impl From<u32> for FourCc {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Pixel formats the crate knows how to interpret.
///
/// Anything else still travels over the wire untouched, it just can't be
/// remapped or synthesized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Bgra32,
    OneComponent8,
    OneComponent16,
    DepthFloat16,
    DepthFloat32,
    DisparityFloat16,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 6] = [
        PixelFormat::Bgra32,
        PixelFormat::OneComponent8,
        PixelFormat::OneComponent16,
        PixelFormat::DepthFloat16,
        PixelFormat::DepthFloat32,
        PixelFormat::DisparityFloat16,
    ];

    pub const fn fourcc(self) -> FourCc {
        match self {
            PixelFormat::Bgra32 => FourCc::from_bytes(b"BGRA"),
            PixelFormat::OneComponent8 => FourCc::from_bytes(b"L008"),
            PixelFormat::OneComponent16 => FourCc::from_bytes(b"L016"),
            PixelFormat::DepthFloat16 => FourCc::from_bytes(b"hdep"),
            PixelFormat::DepthFloat32 => FourCc::from_bytes(b"fdep"),
            PixelFormat::DisparityFloat16 => FourCc::from_bytes(b"hdis"),
        }
    }

    pub fn from_fourcc(code: FourCc) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.fourcc() == code)
    }

    /// Size of one pixel in bytes
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgra32 => 4,
            PixelFormat::OneComponent8 => 1,
            PixelFormat::OneComponent16
            | PixelFormat::DepthFloat16
            | PixelFormat::DisparityFloat16 => 2,
            PixelFormat::DepthFloat32 => 4,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PixelFormat::Bgra32 => "32-bit BGRA",
            PixelFormat::OneComponent8 => "8-bit single component",
            PixelFormat::OneComponent16 => "16-bit single component",
            PixelFormat::DepthFloat16 => "16-bit float depth",
            PixelFormat::DepthFloat32 => "32-bit float depth",
            PixelFormat::DisparityFloat16 => "16-bit float disparity",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.fourcc())
    }
}

/// Shape of a pixel buffer: everything needed to interpret its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    pub pixel_format: FourCc,
    pub bytes_per_row: u32,
}

impl Geometry {
    pub fn new(width: u32, height: u32, pixel_format: FourCc, bytes_per_row: u32) -> Self {
        Self {
            width,
            height,
            pixel_format,
            bytes_per_row,
        }
    }

    /// Tightly packed geometry for a known format
    pub fn packed(width: u32, height: u32, format: PixelFormat) -> Self {
        let bytes_per_row = width as usize * format.bytes_per_pixel();
        Self::new(width, height, format.fourcc(), bytes_per_row as u32)
    }

    /// Number of payload bytes: `bytes_per_row * height`
    pub fn payload_len(&self) -> usize {
        self.bytes_per_row as usize * self.height as usize
    }

    pub fn format(&self) -> Option<PixelFormat> {
        PixelFormat::from_fourcc(self.pixel_format)
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} {} stride {}",
            self.width, self.height, self.pixel_format, self.bytes_per_row
        )
    }
}

/// Hardware capture clock time, in nanoseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    pub nanos: i64,
}

impl Timestamp {
    pub fn from_nanos(nanos: i64) -> Self {
        Self { nanos }
    }

    pub fn from_duration(duration: Duration) -> Self {
        Self {
            nanos: duration.as_nanos() as i64,
        }
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_nanos(self.nanos.max(0) as u64)
    }

    /// Absolute difference between two timestamps
    pub fn diff(&self, other: Timestamp) -> Duration {
        Duration::from_nanos(self.nanos.abs_diff(other.nanos))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.nanos)
    }
}

/// One frame from a capture stream.
///
/// Cloning is cheap: the pixel memory is shared.
#[derive(Clone)]
pub struct CaptureFrame {
    pub pixels: Arc<PixelBuffer>,
    pub capture_time: Timestamp,
}

impl CaptureFrame {
    pub fn new(pixels: PixelBuffer, capture_time: Timestamp) -> Self {
        Self {
            pixels: Arc::new(pixels),
            capture_time,
        }
    }

    pub fn geometry(&self) -> Geometry {
        self.pixels.geometry()
    }
}

impl fmt::Debug for CaptureFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureFrame")
            .field("geometry", &self.geometry())
            .field("capture_time", &self.capture_time)
            .finish()
    }
}

/// Depth and color captured at the same instant
#[derive(Debug, Clone)]
pub struct SyncedPair {
    pub depth: CaptureFrame,
    pub color: CaptureFrame,
    pub timestamp: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_packing() {
        let code = FourCc::from_bytes(b"BGRA");
        assert_eq!(code.raw(), 0x4247_5241);
        assert_eq!(code.to_bytes(), *b"BGRA");
        assert_eq!(code.to_string(), "'BGRA'");
        assert_eq!(FourCc(1).to_string(), "0x00000001");
    }

    #[test]
    fn test_pixel_format_lookup() {
        for format in PixelFormat::ALL {
            assert_eq!(PixelFormat::from_fourcc(format.fourcc()), Some(format));
        }
        assert_eq!(PixelFormat::from_fourcc(FourCc(1)), None);
    }

    #[test]
    fn test_geometry_payload_len() {
        let geometry = Geometry::new(256, 192, FourCc(1), 1024);
        assert_eq!(geometry.payload_len(), 196_608);

        let packed = Geometry::packed(256, 192, PixelFormat::DepthFloat16);
        assert_eq!(packed.bytes_per_row, 512);
        assert_eq!(packed.format(), Some(PixelFormat::DepthFloat16));
    }

    #[test]
    fn test_timestamp_diff() {
        let a = Timestamp::from_nanos(1_000);
        let b = Timestamp::from_nanos(4_000);
        assert_eq!(a.diff(b), Duration::from_nanos(3_000));
        assert_eq!(b.diff(a), Duration::from_nanos(3_000));
    }
}
