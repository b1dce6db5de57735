use std::path::Path;

use anyhow::Context as _;

use crate::foundation::core::Frame;
use crate::foundation::error::SeqResult;
use crate::foundation::fs::ensure_parent_dir;

/// Map a phase frame onto 8-bit gray, stretching `[min, max]` to `[0, 255]`.
///
/// A constant frame maps to mid-gray; non-finite samples map to black.
pub fn to_gray8(frame: &Frame) -> image::GrayImage {
    let finite = frame.data.iter().copied().filter(|v| v.is_finite());
    let (lo, hi) = finite.fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let span = hi - lo;

    let pixels = frame
        .data
        .iter()
        .map(|&v| {
            if !v.is_finite() {
                0
            } else if span > 0.0 {
                (((v - lo) / span) * 255.0).round() as u8
            } else {
                128
            }
        })
        .collect();

    image::GrayImage::from_raw(frame.width, frame.height, pixels)
        .unwrap_or_else(|| image::GrayImage::new(frame.width, frame.height))
}

/// Write `frame` as a normalized grayscale PNG.
pub fn write_preview_png(frame: &Frame, out: &Path) -> SeqResult<()> {
    ensure_parent_dir(out)?;
    to_gray8(frame)
        .save_with_format(out, image::ImageFormat::Png)
        .with_context(|| format!("write png '{}'", out.display()))?;
    Ok(())
}
