//! Multi-page 32-bit float TIFF stacks, read and written one page at a time.
//!
//! This is the interchange format with the external registration tool: the compositor writes one
//! page per frame and the encoder streams the aligned stack back page by page, so at most one frame
//! is held in memory on either side.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tiff::TiffError;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{TiffEncoder, colortype};

use crate::foundation::core::Frame;
use crate::foundation::error::{SeqError, SeqResult};
use crate::foundation::fs::prepare_destination;

fn write_err(path: &Path, e: TiffError) -> SeqError {
    match e {
        TiffError::IoError(io) => SeqError::io(path, io),
        other => SeqError::validation(format!(
            "cannot write stack '{}': {other}",
            path.display()
        )),
    }
}

fn read_err(path: &Path, e: TiffError) -> SeqError {
    SeqError::decode(path, format!("tiff: {e}"))
}

/// Appends frames as pages of a fresh multi-page TIFF.
pub struct StackWriter {
    path: PathBuf,
    encoder: TiffEncoder<File>,
    dims: Option<(u32, u32)>,
    pages: usize,
}

impl StackWriter {
    /// Create the stack at `path`. An existing file is removed first when `overwrite` is set,
    /// otherwise it is an error.
    pub fn create(path: &Path, overwrite: bool) -> SeqResult<Self> {
        prepare_destination(path, overwrite)?;
        let file = File::create(path).map_err(|e| SeqError::io(path, e))?;
        let encoder = TiffEncoder::new(file).map_err(|e| write_err(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            encoder,
            dims: None,
            pages: 0,
        })
    }

    /// Write `frame` as the next page. All pages must share the first page's dimensions.
    pub fn push(&mut self, frame: &Frame) -> SeqResult<()> {
        let dims = (frame.width, frame.height);
        match self.dims {
            None => self.dims = Some(dims),
            Some(expected) if expected != dims => {
                return Err(SeqError::validation(format!(
                    "stack '{}' page {} is {}x{}, expected {}x{}",
                    self.path.display(),
                    self.pages,
                    dims.0,
                    dims.1,
                    expected.0,
                    expected.1
                )));
            }
            Some(_) => {}
        }

        self.encoder
            .write_image::<colortype::Gray32Float>(frame.width, frame.height, &frame.data)
            .map_err(|e| write_err(&self.path, e))?;
        self.pages += 1;
        Ok(())
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Close the stack and return the number of pages written.
    pub fn finish(self) -> usize {
        self.pages
    }
}

/// Sequential page reader over a multi-page TIFF.
pub struct StackReader {
    path: PathBuf,
    decoder: Decoder<BufReader<File>>,
    width: u32,
    height: u32,
    next_index: usize,
    exhausted: bool,
}

impl StackReader {
    /// Open a stack and read the dimensions of its first page.
    ///
    /// A file without any readable page is a decode error.
    pub fn open(path: &Path) -> SeqResult<Self> {
        let file = File::open(path)
            .map_err(|e| SeqError::decode(path, format!("cannot open stack: {e}")))?;
        let mut decoder = Decoder::new(BufReader::new(file))
            .map_err(|e| read_err(path, e))?
            .with_limits(Limits::unlimited());
        let (width, height) = decoder.dimensions().map_err(|e| read_err(path, e))?;
        if width == 0 || height == 0 {
            return Err(SeqError::decode(path, "stack has an empty first page"));
        }
        Ok(Self {
            path: path.to_path_buf(),
            decoder,
            width,
            height,
            next_index: 0,
            exhausted: false,
        })
    }

    /// `(width, height)` of the first page.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decode the next page, or `None` after the last one.
    pub fn next_page(&mut self) -> SeqResult<Option<Frame>> {
        if self.exhausted {
            return Ok(None);
        }
        let index = self.next_index;
        let (w, h) = self.decoder.dimensions().map_err(|e| read_err(&self.path, e))?;
        if (w, h) != (self.width, self.height) {
            return Err(SeqError::decode(
                &self.path,
                format!(
                    "page {index} is {w}x{h}, expected {}x{}",
                    self.width, self.height
                ),
            ));
        }

        let image = self
            .decoder
            .read_image()
            .map_err(|e| read_err(&self.path, e))?;
        let data = samples_to_f32(image)
            .ok_or_else(|| SeqError::decode(&self.path, format!("page {index}: unsupported sample format")))?;
        let frame = Frame::new(w, h, data).ok_or_else(|| {
            SeqError::decode(&self.path, format!("page {index}: sample count does not match {w}x{h}"))
        })?;

        self.next_index += 1;
        if self.decoder.more_images() {
            self.decoder
                .next_image()
                .map_err(|e| read_err(&self.path, e))?;
        } else {
            self.exhausted = true;
        }
        Ok(Some(frame))
    }

    /// Count the pages of the stack at `path` by walking its directory chain without decoding
    /// sample data.
    pub fn count_pages(path: &Path) -> SeqResult<usize> {
        let reader = Self::open(path)?;
        let mut decoder = reader.decoder;
        let mut count = 1;
        while decoder.more_images() {
            decoder.next_image().map_err(|e| read_err(path, e))?;
            count += 1;
        }
        Ok(count)
    }
}

fn samples_to_f32(image: DecodingResult) -> Option<Vec<f32>> {
    Some(match image {
        DecodingResult::F32(v) => v,
        DecodingResult::F64(v) => v.into_iter().map(|x| x as f32).collect(),
        DecodingResult::U8(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::U16(v) => v.into_iter().map(f32::from).collect(),
        DecodingResult::I16(v) => v.into_iter().map(f32::from).collect(),
        _ => return None,
    })
}
