use std::fs::File;
use std::io::{BufWriter, Write as _};
use std::path::Path;

use crate::container::format::{BnrHeader, write_f32s};
use crate::container::timestamps::read_timestamps;
use crate::foundation::core::{AcquisitionMetadata, ProgressSink, percent_of};
use crate::foundation::error::{IoResultExt as _, SeqError, SeqResult};
use crate::foundation::fs::prepare_destination;
use crate::stack::StackReader;

/// Options for [`encode_sequence`].
#[derive(Clone, Copy, Debug, Default)]
pub struct EncodeOpts {
    /// Replace an existing destination instead of failing.
    pub overwrite: bool,
}

/// Summary of a written container.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EncodeStats {
    pub header: BnrHeader,
    pub bytes_written: u64,
}

/// Encode the aligned stack at `stack` with the times from `timestamps` into a bnr container at
/// `dest`.
///
/// The timestamp count must equal the stack's page count; a mismatch is rejected as a parse error
/// at line 0 (the table as a whole) before `dest` is touched. A failure after `dest` was created
/// removes the partial container. The source stack is left in place.
#[tracing::instrument(skip_all, fields(stack = %stack.display(), dest = %dest.display()))]
pub fn encode_sequence(
    stack: &Path,
    timestamps: &Path,
    metadata: &AcquisitionMetadata,
    dest: &Path,
    opts: EncodeOpts,
    progress: &mut dyn ProgressSink,
) -> SeqResult<EncodeStats> {
    let times = read_timestamps(timestamps)?;

    let mut reader = StackReader::open(stack)?;
    let (width, height) = reader.dimensions();
    let pages = StackReader::count_pages(stack)?;
    if pages != times.len() {
        return Err(SeqError::parse(
            timestamps,
            0,
            format!(
                "timestamp table has {} rows but stack '{}' has {pages} pages",
                times.len(),
                stack.display()
            ),
        ));
    }

    let to_i32 = |v: usize, what: &str| {
        i32::try_from(v).map_err(|_| SeqError::validation(format!("{what} {v} does not fit the container header")))
    };
    let header = BnrHeader {
        frame_count: to_i32(times.len(), "frame count")?,
        width: to_i32(width as usize, "width")?,
        height: to_i32(height as usize, "height")?,
        metadata: *metadata,
    };

    prepare_destination(dest, opts.overwrite)?;
    if let Err(e) = write_container(&mut reader, stack, &header, &times, dest, progress) {
        if let Err(rm) = std::fs::remove_file(dest) {
            tracing::warn!(path = %dest.display(), error = %rm, "could not remove partial container");
        }
        return Err(e);
    }

    let bytes_written = header.expected_file_len().unwrap_or_default();
    tracing::info!(frames = times.len(), width, height, bytes = bytes_written, "encoded container");
    Ok(EncodeStats {
        header,
        bytes_written,
    })
}

/// Stream header, times and pages into a freshly created `dest`.
fn write_container(
    reader: &mut StackReader,
    stack: &Path,
    header: &BnrHeader,
    times: &[f32],
    dest: &Path,
    progress: &mut dyn ProgressSink,
) -> SeqResult<()> {
    let file = File::create(dest).at_path(dest)?;
    let mut out = BufWriter::new(file);
    let mut scratch = Vec::new();

    header.write_to(&mut out).at_path(dest)?;
    write_f32s(&mut out, times, &mut scratch).at_path(dest)?;

    let total = times.len();
    let mut written = 0usize;
    while let Some(frame) = reader.next_page()? {
        if written == total {
            return Err(SeqError::decode(stack, "stack grew while it was being encoded"));
        }
        write_f32s(&mut out, &frame.data, &mut scratch).at_path(dest)?;
        progress.progress(percent_of(written, total));
        written += 1;
    }
    progress.progress(0);

    if written != total {
        return Err(SeqError::decode(
            stack,
            format!("expected {total} pages, read {written}"),
        ));
    }
    out.flush().at_path(dest)
}
