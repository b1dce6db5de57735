use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::container::format::BnrHeader;
use crate::container::reader::BnrReader;
use crate::foundation::core::Frame;
use crate::foundation::error::{SeqError, SeqResult};

/// Largest magnitude a phase sample (radians) may plausibly reach. Exceeding it on either side,
/// exclusively, flags the container.
pub const PHASE_LIMIT: f32 = 100.0;

/// How much of a container the range check reads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// Only frame 0.
    #[default]
    FirstFrame,
    /// Every frame, aggregating min/max across the sequence.
    Full,
}

/// A container whose scanned samples leave `[-PHASE_LIMIT, PHASE_LIMIT]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RangeViolation {
    pub path: PathBuf,
    pub min: f32,
    pub max: f32,
}

/// Result of checking one container.
#[derive(Clone, Debug, PartialEq)]
pub struct ContainerCheck {
    pub header: BnrHeader,
    /// Frame 0 as reconstructed from the container.
    pub first_frame: Frame,
    pub min: f32,
    pub max: f32,
    pub frames_scanned: usize,
    pub violation: Option<RangeViolation>,
}

impl ContainerCheck {
    pub fn is_ok(&self) -> bool {
        self.violation.is_none()
    }
}

fn out_of_range(min: f32, max: f32) -> bool {
    min < -PHASE_LIMIT || max > PHASE_LIMIT
}

/// Re-open the container at `path` and check its sample range.
///
/// The header is decoded, the timestamp block skipped, and frame 0 reconstructed row by row. With
/// [`ScanMode::Full`] the remaining frames are streamed as well. An out-of-range result is
/// reported in [`ContainerCheck::violation`]; only unreadable or truncated files are errors.
#[tracing::instrument(skip(path), fields(container = %path.display()))]
pub fn validate_container(path: &Path, mode: ScanMode) -> SeqResult<ContainerCheck> {
    let mut reader = BnrReader::open(path)?;
    let header = *reader.header();
    reader.skip_timestamps()?;

    let first_frame = reader
        .next_frame()?
        .ok_or_else(|| SeqError::decode(path, "container holds no frames"))?;
    let (mut min, mut max) = first_frame
        .min_max()
        .ok_or_else(|| SeqError::decode(path, "first frame is empty"))?;
    let mut frames_scanned = 1;

    if mode == ScanMode::Full {
        while let Some(frame) = reader.next_frame()? {
            if let Some((lo, hi)) = frame.min_max() {
                min = min.min(lo);
                max = max.max(hi);
            }
            frames_scanned += 1;
        }
    }

    let violation = out_of_range(min, max).then(|| RangeViolation {
        path: path.to_path_buf(),
        min,
        max,
    });
    if violation.is_some() {
        tracing::warn!(min, max, "phase samples outside the expected range");
    } else {
        tracing::debug!(min, max, frames_scanned, "container range ok");
    }

    Ok(ContainerCheck {
        header,
        first_frame,
        min,
        max,
        frames_scanned,
        violation,
    })
}
