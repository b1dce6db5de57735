use serde::{Deserialize, Serialize};

/// One decoded phase map: `width × height` single-precision samples in row-major order.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl Frame {
    /// Wrap row-major samples, checking that the buffer matches the dimensions.
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> Option<Self> {
        let expected = (width as usize).checked_mul(height as usize)?;
        (data.len() == expected).then_some(Self {
            width,
            height,
            data,
        })
    }

    /// Build a frame from nested rows. Returns `None` for ragged input.
    pub fn from_rows(rows: &[&[f32]]) -> Option<Self> {
        let height = rows.len();
        let width = rows.first().map_or(0, |r| r.len());
        if rows.iter().any(|r| r.len() != width) {
            return None;
        }
        let data = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Self::new(width as u32, height as u32, data)
    }

    pub fn row(&self, y: u32) -> &[f32] {
        let w = self.width as usize;
        let start = y as usize * w;
        &self.data[start..start + w]
    }

    /// `(min, max)` over all samples, `None` for an empty frame.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        min_max(&self.data)
    }
}

pub(crate) fn min_max(samples: &[f32]) -> Option<(f32, f32)> {
    let mut it = samples.iter().copied();
    let first = it.next()?;
    Some(it.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
}

/// Scalar acquisition parameters carried alongside a sequence and written into the container header.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionMetadata {
    /// Pixel size in meters.
    pub pixel_size: f32,
    /// Illumination wavelength in nanometers.
    pub wavelength_nm: f32,
    pub refractive_index_1: f32,
    pub refractive_index_2: f32,
}

impl Default for AcquisitionMetadata {
    fn default() -> Self {
        Self {
            pixel_size: 1.152_030_7e-6,
            wavelength_nm: 665.8,
            refractive_index_1: 1.0,
            refractive_index_2: 2.0,
        }
    }
}

/// Receiver of per-frame progress in percent (0..=100).
///
/// Stages report `round(100 * index / total)` after each frame and `0` once done.
pub trait ProgressSink {
    fn progress(&mut self, percent: u8);
}

impl<F: FnMut(u8)> ProgressSink for F {
    fn progress(&mut self, percent: u8) {
        self(percent)
    }
}

/// Progress sink that drops every update.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn progress(&mut self, _percent: u8) {}
}

pub(crate) fn percent_of(index: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((index as f64 * 100.0 / total as f64).round() as u32).min(100) as u8
}
