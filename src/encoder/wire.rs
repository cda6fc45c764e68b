//! Wire layout of a depth message
//!
//! ```text
//! offset 0:  i32 width
//! offset 4:  i32 height
//! offset 8:  u32 pixel format (four-character code)
//! offset 12: i32 bytes per row
//! offset 16: bytes_per_row * height bytes of raw pixels
//! ```
//!
//! Everything is little-endian. There is no length field: the receiver
//! derives the payload length from the header and checks it against the
//! message length.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::EncodeError;
use crate::capture::frame::{CaptureFrame, FourCc, Geometry};
use crate::decoder::DecodeError;

pub const HEADER_LEN: usize = 16;

/// Header fields exactly as they appear on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireHeader {
    pub width: i32,
    pub height: i32,
    pub pixel_format: u32,
    pub bytes_per_row: i32,
}

impl WireHeader {
    pub fn from_geometry(geometry: &Geometry) -> Result<Self, EncodeError> {
        let field = |name: &'static str, value: u32| {
            i32::try_from(value).map_err(|_| EncodeError::GeometryOverflow { field: name, value })
        };
        Ok(Self {
            width: field("width", geometry.width)?,
            height: field("height", geometry.height)?,
            pixel_format: geometry.pixel_format.raw(),
            bytes_per_row: field("bytes_per_row", geometry.bytes_per_row)?,
        })
    }

    pub fn put(&self, buf: &mut impl BufMut) {
        buf.put_i32_le(self.width);
        buf.put_i32_le(self.height);
        buf.put_u32_le(self.pixel_format);
        buf.put_i32_le(self.bytes_per_row);
    }

    pub fn parse(message: &[u8]) -> Result<Self, DecodeError> {
        if message.len() < HEADER_LEN {
            return Err(DecodeError::TruncatedHeader {
                actual: message.len(),
            });
        }
        let mut cursor = &message[..HEADER_LEN];
        Ok(Self {
            width: cursor.get_i32_le(),
            height: cursor.get_i32_le(),
            pixel_format: cursor.get_u32_le(),
            bytes_per_row: cursor.get_i32_le(),
        })
    }

    pub fn geometry(&self) -> Result<Geometry, DecodeError> {
        let field = |name: &'static str, value: i32| {
            u32::try_from(value).map_err(|_| DecodeError::InvalidGeometry { field: name, value })
        };
        Ok(Geometry::new(
            field("width", self.width)?,
            field("height", self.height)?,
            FourCc(self.pixel_format),
            field("bytes_per_row", self.bytes_per_row)?,
        ))
    }
}

/// Serialize a frame: header followed by the pixel bytes, row padding included.
///
/// The source buffer is read under a non-blocking shared lock held only for
/// the copy.
pub fn encode_frame(frame: &CaptureFrame) -> Result<Bytes, EncodeError> {
    let geometry = frame.geometry();
    let header = WireHeader::from_geometry(&geometry)?;
    let payload_len = geometry.payload_len();

    let pixels = frame
        .pixels
        .try_read()
        .ok_or(EncodeError::SourceUnavailable)?;

    let mut message = BytesMut::with_capacity(HEADER_LEN + payload_len);
    header.put(&mut message);
    message.put_slice(&pixels[..payload_len]);
    Ok(message.freeze())
}

/// Split a decompressed message into its geometry and payload, checking the length.
pub fn decode_message(message: &[u8]) -> Result<(Geometry, &[u8]), DecodeError> {
    let header = WireHeader::parse(message)?;
    let geometry = header.geometry()?;

    let payload = &message[HEADER_LEN..];
    let expected = geometry.payload_len();
    if payload.len() != expected {
        return Err(DecodeError::LengthMismatch {
            expected,
            actual: payload.len(),
        });
    }
    Ok((geometry, payload))
}
