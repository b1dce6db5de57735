use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};

use crate::foundation::core::AcquisitionMetadata;

/// Fixed-size header of a bnr sequence container.
///
/// Layout (every field 4 bytes, little-endian, no padding):
/// `frame_count:i32 width:i32 height:i32 pixel_size:f32 wavelength_nm:f32 n1:f32 n2:f32`,
/// followed by `frame_count` `f32` timestamps and `frame_count × height × width` `f32` samples,
/// row-major and frame-major. There is no magic number or version field.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BnrHeader {
    pub frame_count: i32,
    pub width: i32,
    pub height: i32,
    pub metadata: AcquisitionMetadata,
}

impl BnrHeader {
    pub const SIZE: usize = 7 * 4;

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.to_bytes())
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let m = &self.metadata;
        let words = [
            self.frame_count.to_le_bytes(),
            self.width.to_le_bytes(),
            self.height.to_le_bytes(),
            m.pixel_size.to_le_bytes(),
            m.wavelength_nm.to_le_bytes(),
            m.refractive_index_1.to_le_bytes(),
            m.refractive_index_2.to_le_bytes(),
        ];
        let mut out = [0u8; Self::SIZE];
        for (dst, word) in out.chunks_exact_mut(4).zip(words) {
            dst.copy_from_slice(&word);
        }
        out
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut buf = [0u8; Self::SIZE];
        r.read_exact(&mut buf)?;
        let word = |i: usize| [buf[i * 4], buf[i * 4 + 1], buf[i * 4 + 2], buf[i * 4 + 3]];
        Ok(Self {
            frame_count: i32::from_le_bytes(word(0)),
            width: i32::from_le_bytes(word(1)),
            height: i32::from_le_bytes(word(2)),
            metadata: AcquisitionMetadata {
                pixel_size: f32::from_le_bytes(word(3)),
                wavelength_nm: f32::from_le_bytes(word(4)),
                refractive_index_1: f32::from_le_bytes(word(5)),
                refractive_index_2: f32::from_le_bytes(word(6)),
            },
        })
    }

    /// Samples per frame, `None` if a dimension is negative or the product overflows.
    pub fn frame_len(&self) -> Option<usize> {
        let w = usize::try_from(self.width).ok()?;
        let h = usize::try_from(self.height).ok()?;
        w.checked_mul(h)
    }

    /// Total file size implied by the header.
    pub fn expected_file_len(&self) -> Option<u64> {
        let n = u64::try_from(self.frame_count).ok()?;
        let per_frame = self.frame_len()? as u64;
        let samples = n.checked_mul(per_frame)?.checked_add(n)?;
        samples.checked_mul(4)?.checked_add(Self::SIZE as u64)
    }
}

/// Write `samples` as consecutive little-endian `f32` words.
pub(crate) fn write_f32s<W: Write>(w: &mut W, samples: &[f32], scratch: &mut Vec<u8>) -> io::Result<()> {
    scratch.clear();
    scratch.reserve(samples.len() * 4);
    for v in samples {
        scratch.extend_from_slice(&v.to_le_bytes());
    }
    w.write_all(scratch)
}

/// Fill `out` from consecutive little-endian `f32` words.
pub(crate) fn read_f32s<R: Read>(r: &mut R, out: &mut [f32], scratch: &mut Vec<u8>) -> io::Result<()> {
    scratch.resize(out.len() * 4, 0);
    r.read_exact(scratch)?;
    for (dst, c) in out.iter_mut().zip(scratch.chunks_exact(4)) {
        *dst = f32::from_le_bytes([c[0], c[1], c[2], c[3]]);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_field_order_is_fixed() {
        let h = BnrHeader {
            frame_count: 3,
            width: 2,
            height: 5,
            metadata: AcquisitionMetadata {
                pixel_size: 1.152e-6,
                wavelength_nm: 665.8,
                refractive_index_1: 1.0,
                refractive_index_2: 2.0,
            },
        };
        let bytes = h.to_bytes();
        assert_eq!(&bytes[0..4], &3i32.to_le_bytes());
        assert_eq!(&bytes[8..12], &5i32.to_le_bytes());
        assert_eq!(&bytes[12..16], &1.152e-6f32.to_le_bytes());
        assert_eq!(&bytes[24..28], &2.0f32.to_le_bytes());
        assert_eq!(h.expected_file_len(), Some(28 + 3 * 4 + 3 * 10 * 4));
    }

    #[test]
    fn negative_dimensions_have_no_frame_len() {
        let h = BnrHeader {
            frame_count: 1,
            width: -2,
            height: 2,
            metadata: AcquisitionMetadata::default(),
        };
        assert_eq!(h.frame_len(), None);
        assert_eq!(h.expected_file_len(), None);
    }

    #[test]
    fn short_header_is_eof() {
        let mut r: &[u8] = &[0u8; 10];
        let err = BnrHeader::read_from(&mut r).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
