use std::path::{Path, PathBuf};

use crate::foundation::core::{ProgressSink, percent_of};
use crate::foundation::error::{SeqError, SeqResult};
use crate::source::{FrameHeader, FrameSource};
use crate::stack::StackWriter;

/// Options for [`compose_stack`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ComposeOpts {
    /// Replace an existing destination instead of failing.
    pub overwrite: bool,
}

/// Outcome of a compose run.
#[derive(Clone, Debug)]
pub struct ComposeStats {
    pub pages: usize,
    pub width: u32,
    pub height: u32,
    /// Header of the first frame file; carries the acquisition pixel size.
    pub first_header: FrameHeader,
}

/// Merge already ordered frame files into a multi-page stack at `dest`.
///
/// Frames are decoded and written one at a time. Input files are left in place.
#[tracing::instrument(skip(source, frames, dest, progress), fields(frames = frames.len(), dest = %dest.display()))]
pub fn compose_stack(
    source: &dyn FrameSource,
    frames: &[PathBuf],
    dest: &Path,
    opts: ComposeOpts,
    progress: &mut dyn ProgressSink,
) -> SeqResult<ComposeStats> {
    let Some(first_path) = frames.first() else {
        return Err(SeqError::decode(dest, "no frame files to compose"));
    };

    let mut writer = StackWriter::create(dest, opts.overwrite)?;
    let mut first_header = None;
    let total = frames.len();

    for (i, path) in frames.iter().enumerate() {
        let (frame, header) = source.decode(path)?;
        let first = *first_header.get_or_insert(header);
        if (frame.width, frame.height) != (first.width, first.height) {
            return Err(SeqError::decode(
                path,
                format!(
                    "frame is {}x{}, sequence started at {}x{} ('{}')",
                    frame.width,
                    frame.height,
                    first.width,
                    first.height,
                    first_path.display()
                ),
            ));
        }
        writer.push(&frame)?;
        progress.progress(percent_of(i, total));
    }
    progress.progress(0);

    let pages = writer.finish();
    let first_header = first_header.ok_or_else(|| SeqError::decode(first_path, "no frame decoded"))?;
    tracing::info!(pages, "composed stack");

    Ok(ComposeStats {
        pages,
        width: first_header.width,
        height: first_header.height,
        first_header,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::foundation::core::{Frame, NoProgress};
    use crate::stack::StackReader;

    struct MapSource(HashMap<PathBuf, Frame>);

    impl FrameSource for MapSource {
        fn decode(&self, path: &Path) -> SeqResult<(Frame, FrameHeader)> {
            let frame = self
                .0
                .get(path)
                .cloned()
                .ok_or_else(|| SeqError::decode(path, "unknown frame"))?;
            let header = FrameHeader {
                width: frame.width,
                height: frame.height,
                pixel_size: 1.5e-6,
                height_conversion: 1.0,
                unit_code: 1,
            };
            Ok((frame, header))
        }
    }

    fn source(n: usize) -> (MapSource, Vec<PathBuf>) {
        let mut map = HashMap::new();
        let mut paths = Vec::new();
        for i in 0..n {
            let p = PathBuf::from(format!("{i:05}_phase.bin"));
            map.insert(p.clone(), Frame::new(2, 1, vec![i as f32, -(i as f32)]).unwrap());
            paths.push(p);
        }
        (MapSource(map), paths)
    }

    #[test]
    fn progress_tracks_index_and_resets() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("w_phase.tif");
        let (src, paths) = source(4);

        let mut seen = Vec::new();
        let stats = compose_stack(
            &src,
            &paths,
            &dest,
            ComposeOpts::default(),
            &mut |p: u8| seen.push(p),
        )
        .unwrap();

        assert_eq!(stats.pages, 4);
        assert_eq!(stats.first_header.pixel_size, 1.5e-6);
        assert_eq!(seen, vec![0, 25, 50, 75, 0]);
        assert_eq!(StackReader::count_pages(&dest).unwrap(), 4);
    }

    #[test]
    fn undecodable_frame_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("w_phase.tif");
        let (src, mut paths) = source(2);
        paths.push(PathBuf::from("00002_phase.bin"));

        let err = compose_stack(&src, &paths, &dest, ComposeOpts::default(), &mut NoProgress)
            .unwrap_err();
        assert!(matches!(err, SeqError::Decode { ref path, .. } if path.ends_with("00002_phase.bin")));
    }

    #[test]
    fn stale_destination_requires_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("w_phase.tif");
        std::fs::write(&dest, b"stale").unwrap();
        let (src, paths) = source(1);

        assert!(compose_stack(&src, &paths, &dest, ComposeOpts::default(), &mut NoProgress).is_err());
        compose_stack(
            &src,
            &paths,
            &dest,
            ComposeOpts { overwrite: true },
            &mut NoProgress,
        )
        .unwrap();
        assert_eq!(StackReader::count_pages(&dest).unwrap(), 1);
    }

    #[test]
    fn empty_frame_list_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = compose_stack(
            &MapSource(HashMap::new()),
            &[],
            &dir.path().join("x.tif"),
            ComposeOpts::default(),
            &mut NoProgress,
        )
        .unwrap_err();
        assert!(matches!(err, SeqError::Decode { .. }));
    }
}
