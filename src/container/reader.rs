use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use crate::container::format::{BnrHeader, read_f32s};
use crate::foundation::core::Frame;
use crate::foundation::error::{SeqError, SeqResult};

/// Sequential reader over a bnr container: header, then timestamps, then frames.
pub struct BnrReader {
    path: PathBuf,
    inner: BufReader<File>,
    header: BnrHeader,
    frame_len: usize,
    timestamps_consumed: bool,
    frames_read: usize,
    scratch: Vec<u8>,
}

impl BnrReader {
    /// Open `path` and decode its header.
    pub fn open(path: &Path) -> SeqResult<Self> {
        let file = File::open(path)
            .map_err(|e| SeqError::decode(path, format!("cannot open container: {e}")))?;
        let file_len = file.metadata().map_err(|e| SeqError::io(path, e))?.len();
        let mut inner = BufReader::new(file);
        let header = BnrHeader::read_from(&mut inner).map_err(|e| eof_or(path, e, "header"))?;
        if header.frame_count < 0 {
            return Err(SeqError::decode(
                path,
                format!("negative frame count {}", header.frame_count),
            ));
        }
        let frame_len = header.frame_len().ok_or_else(|| {
            SeqError::decode(
                path,
                format!("invalid frame dimensions {}x{}", header.width, header.height),
            )
        })?;
        match header.expected_file_len() {
            Some(expected) if expected <= file_len => {}
            Some(expected) => {
                return Err(SeqError::decode(
                    path,
                    format!("container truncated: header implies {expected} bytes, file has {file_len}"),
                ));
            }
            None => {
                return Err(SeqError::decode(
                    path,
                    format!(
                        "header size {}x{}x{} overflows",
                        header.frame_count, header.width, header.height
                    ),
                ));
            }
        }
        Ok(Self {
            path: path.to_path_buf(),
            inner,
            header,
            frame_len,
            timestamps_consumed: false,
            frames_read: 0,
            scratch: Vec::new(),
        })
    }

    pub fn header(&self) -> &BnrHeader {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decode the timestamp block. Must be called before the first frame, at most once.
    pub fn read_timestamps(&mut self) -> SeqResult<Vec<f32>> {
        self.expect_timestamps_next()?;
        let mut times = vec![0f32; self.header.frame_count as usize];
        read_f32s(&mut self.inner, &mut times, &mut self.scratch)
            .map_err(|e| eof_or(&self.path, e, "timestamps"))?;
        self.timestamps_consumed = true;
        Ok(times)
    }

    /// Step over the timestamp block without interpreting it.
    pub fn skip_timestamps(&mut self) -> SeqResult<()> {
        self.expect_timestamps_next()?;
        let n = self.header.frame_count as u64 * 4;
        let skipped = io::copy(&mut (&mut self.inner).take(n), &mut io::sink())
            .map_err(|e| eof_or(&self.path, e, "timestamps"))?;
        if skipped != n {
            return Err(SeqError::decode(&self.path, "container truncated in timestamps"));
        }
        self.timestamps_consumed = true;
        Ok(())
    }

    /// Reconstruct the next frame row by row, or `None` after `frame_count` frames.
    pub fn next_frame(&mut self) -> SeqResult<Option<Frame>> {
        if !self.timestamps_consumed {
            self.skip_timestamps()?;
        }
        if self.frames_read >= self.header.frame_count as usize {
            return Ok(None);
        }

        let w = self.header.width as usize;
        let mut data = vec![0f32; self.frame_len];
        if w > 0 {
            for row in data.chunks_exact_mut(w) {
                read_f32s(&mut self.inner, row, &mut self.scratch).map_err(|e| {
                    eof_or(&self.path, e, &format!("frame {}", self.frames_read))
                })?;
            }
        }
        self.frames_read += 1;
        Ok(Some(Frame {
            width: self.header.width as u32,
            height: self.header.height as u32,
            data,
        }))
    }

    fn expect_timestamps_next(&self) -> SeqResult<()> {
        if self.timestamps_consumed {
            return Err(SeqError::validation(format!(
                "timestamps of '{}' were already consumed",
                self.path.display()
            )));
        }
        Ok(())
    }
}

fn eof_or(path: &Path, e: io::Error, what: &str) -> SeqError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        SeqError::decode(path, format!("container truncated in {what}"))
    } else {
        SeqError::io(path, e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::AcquisitionMetadata;

    fn container(frames: i32, samples: &[f32]) -> Vec<u8> {
        let header = BnrHeader {
            frame_count: frames,
            width: 2,
            height: 1,
            metadata: AcquisitionMetadata::default(),
        };
        let mut bytes = header.to_bytes().to_vec();
        for t in 0..frames {
            bytes.extend_from_slice(&(t as f32).to_le_bytes());
        }
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn frames_follow_the_timestamp_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.bnr");
        std::fs::write(&path, container(2, &[1.0, 2.0, 3.0, 4.0])).unwrap();

        let mut r = BnrReader::open(&path).unwrap();
        assert_eq!(r.next_frame().unwrap().unwrap().data, vec![1.0, 2.0]);
        assert_eq!(r.next_frame().unwrap().unwrap().data, vec![3.0, 4.0]);
        assert!(r.next_frame().unwrap().is_none());
        assert!(r.read_timestamps().is_err());
    }

    #[test]
    fn truncated_frame_is_rejected_at_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.bnr");
        std::fs::write(&path, container(2, &[1.0, 2.0, 3.0])).unwrap();

        let err = BnrReader::open(&path).err().unwrap();
        assert!(matches!(err, SeqError::Decode { .. }), "{err}");
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn huge_dimensions_are_a_decode_error() {
        let header = BnrHeader {
            frame_count: 1,
            width: i32::MAX,
            height: i32::MAX,
            metadata: AcquisitionMetadata::default(),
        };
        let mut bytes = header.to_bytes().to_vec();
        bytes.extend_from_slice(&0f32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 64]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.bnr");
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(BnrReader::open(&path), Err(SeqError::Decode { .. })));
        let err = crate::container::validate_container(&path, crate::container::ScanMode::FirstFrame)
            .unwrap_err();
        assert!(matches!(err, SeqError::Decode { .. }), "{err}");
    }

    #[test]
    fn short_header_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.bnr");
        std::fs::write(&path, [0u8; 10]).unwrap();
        assert!(matches!(BnrReader::open(&path), Err(SeqError::Decode { .. })));
    }
}
