use std::path::Path;

use crate::foundation::core::Frame;
use crate::foundation::error::{SeqError, SeqResult};
use crate::source::{FrameHeader, FrameSource};

/// Fixed part of the Koala `.bin` header:
/// `version:u8 endian:u8 header_size:i32 width:i32 height:i32 px_size:f32 hconv:f32 unit_code:u8`.
pub const KOALA_HEADER_LEN: usize = 23;

/// Reader for Koala float phase files (`*_phase.bin`).
#[derive(Clone, Copy, Debug, Default)]
pub struct KoalaBinSource;

impl KoalaBinSource {
    pub fn new() -> Self {
        Self
    }

    /// Decode a Koala `.bin` image held in memory. `path` is only used for error context.
    pub fn decode_bytes(path: &Path, bytes: &[u8]) -> SeqResult<(Frame, FrameHeader)> {
        if bytes.len() < KOALA_HEADER_LEN {
            return Err(SeqError::decode(
                path,
                format!(
                    "file is {} bytes, shorter than the {KOALA_HEADER_LEN}-byte header",
                    bytes.len()
                ),
            ));
        }

        let big_endian = match bytes[1] {
            0 => false,
            1 => true,
            other => {
                return Err(SeqError::decode(
                    path,
                    format!("unknown endianness flag {other}"),
                ));
            }
        };
        let word = |at: usize| -> [u8; 4] { [bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]] };
        let i32_at = |at| {
            if big_endian {
                i32::from_be_bytes(word(at))
            } else {
                i32::from_le_bytes(word(at))
            }
        };
        let f32_at = |at| {
            if big_endian {
                f32::from_be_bytes(word(at))
            } else {
                f32::from_le_bytes(word(at))
            }
        };

        let header_size = i32_at(2);
        let width = i32_at(6);
        let height = i32_at(10);
        if width <= 0 || height <= 0 {
            return Err(SeqError::decode(
                path,
                format!("invalid frame dimensions {width}x{height}"),
            ));
        }
        let header_size = usize::try_from(header_size)
            .ok()
            .filter(|&n| n >= KOALA_HEADER_LEN)
            .ok_or_else(|| SeqError::decode(path, format!("invalid header size {header_size}")))?;

        let header = FrameHeader {
            width: width as u32,
            height: height as u32,
            pixel_size: f32_at(14),
            height_conversion: f32_at(18),
            unit_code: bytes[22],
        };

        let count = header.width as usize * header.height as usize;
        let payload = bytes
            .get(header_size..)
            .filter(|p| p.len() >= count * 4)
            .ok_or_else(|| {
                SeqError::decode(
                    path,
                    format!(
                        "truncated sample data: expected {count} samples after {header_size} header bytes"
                    ),
                )
            })?;

        let data = payload[..count * 4]
            .chunks_exact(4)
            .map(|c| {
                let b = [c[0], c[1], c[2], c[3]];
                if big_endian {
                    f32::from_be_bytes(b)
                } else {
                    f32::from_le_bytes(b)
                }
            })
            .collect();

        let frame = Frame {
            width: header.width,
            height: header.height,
            data,
        };
        Ok((frame, header))
    }
}

impl FrameSource for KoalaBinSource {
    #[tracing::instrument(level = "trace", skip(self))]
    fn decode(&self, path: &Path) -> SeqResult<(Frame, FrameHeader)> {
        let bytes = std::fs::read(path)
            .map_err(|e| SeqError::decode(path, format!("cannot read frame file: {e}")))?;
        Self::decode_bytes(path, &bytes)
    }
}
