//! Per-frame phase file decoding.
//!
//! [`FrameSource`] is the seam to whatever reads a single phase-map file. The crate ships
//! [`KoalaBinSource`] for the Koala `.bin` layout; tests and other callers can plug their own.

pub mod koala;

use std::path::{Path, PathBuf};

use crate::foundation::core::Frame;
use crate::foundation::error::{IoResultExt as _, SeqResult};

pub use koala::KoalaBinSource;

/// Header metadata of one source frame file.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameHeader {
    pub width: u32,
    pub height: u32,
    /// Pixel size in meters.
    pub pixel_size: f32,
    /// Height conversion factor stored by the acquisition software.
    pub height_conversion: f32,
    pub unit_code: u8,
}

/// Decoder for one phase-map file.
///
/// Failures surface as [`crate::SeqError::Decode`] carrying the offending path.
pub trait FrameSource {
    fn decode(&self, path: &Path) -> SeqResult<(Frame, FrameHeader)>;
}

impl<S: FrameSource + ?Sized> FrameSource for &S {
    fn decode(&self, path: &Path) -> SeqResult<(Frame, FrameHeader)> {
        (**self).decode(path)
    }
}

/// List the `.bin` frame files of `dir` in acquisition order.
///
/// Acquisition order is the lexicographic order of file names (zero-padded frame indices), which
/// is independent of the order the OS returns directory entries in.
pub fn list_phase_frames(dir: &Path) -> SeqResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).at_path(dir)? {
        let entry = entry.at_path(dir)?;
        let path = entry.path();
        let is_bin = path.extension().is_some_and(|ext| ext == "bin");
        if is_bin && entry.file_type().at_path(&path)?.is_file() {
            files.push(path);
        }
    }
    sort_by_file_name(&mut files);
    Ok(files)
}

/// Sort frame paths by file name only, the ordering acquisition software encodes in the names.
pub fn sort_by_file_name(paths: &mut [PathBuf]) {
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
}
