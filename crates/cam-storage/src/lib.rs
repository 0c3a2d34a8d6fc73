//! Frame persistence.
//!
//! One [`SessionWriter`] serves a whole capture session. Per-frame
//! layouts (`Tiff`, `BigTiff`, `Raw`) open a fresh file for every
//! frame, named `{prefix}{index:03}.{ext}`; the `TiffStack` layout
//! opens one multi-page file at the first frame and appends a page per
//! write. Pixel data is 16-bit grayscale, little-endian on the wire.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use cam_core::StorageType;
use thiserror::Error;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray16;
use tiff::encoder::TiffEncoder;
use tracing::{debug, info};

/// Storage failures.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// TIFF encode/decode error.
    #[error(transparent)]
    Tiff(#[from] tiff::TiffError),
    /// Layout reserved but not implemented.
    #[error("storage type {0:?} is not supported")]
    Unsupported(StorageType),
    /// Frame byte size does not match the session geometry.
    #[error("frame is {got} bytes, geometry {width}x{height} needs {need}")]
    GeometryMismatch {
        /// Bytes supplied.
        got: usize,
        /// Frame width in pixels.
        width: u32,
        /// Frame height in pixels.
        height: u32,
        /// Bytes the geometry requires.
        need: usize,
    },
    /// Stack decode produced a sample format other than 16-bit.
    #[error("unexpected sample format in {0}")]
    BadSampleFormat(PathBuf),
}

/// Per-frame file name: `{prefix}{index:03}.{ext}`.
///
/// The index pads to three digits and widens beyond 999.
#[must_use]
pub fn sequence_file_name(prefix: &str, index: u32, ext: &str) -> String {
    format!("{prefix}{index:03}.{ext}")
}

fn pixels_from_le(data: &[u8], width: u32, height: u32) -> Result<Vec<u16>, StorageError> {
    let need = width as usize * height as usize * 2;
    if data.len() != need {
        return Err(StorageError::GeometryMismatch {
            got: data.len(),
            width,
            height,
            need,
        });
    }
    Ok(data
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect())
}

/// Write one grayscale frame as a single-image TIFF.
pub fn write_tiff_frame(
    path: &Path,
    width: u32,
    height: u32,
    data: &[u8],
) -> Result<(), StorageError> {
    let pixels = pixels_from_le(data, width, height)?;
    let file = BufWriter::new(File::create(path)?);
    let mut encoder = TiffEncoder::new(file)?;
    encoder.write_image::<Gray16>(width, height, &pixels)?;
    Ok(())
}

/// Write one grayscale frame as a BigTIFF (64-bit offsets).
pub fn write_big_tiff_frame(
    path: &Path,
    width: u32,
    height: u32,
    data: &[u8],
) -> Result<(), StorageError> {
    let pixels = pixels_from_le(data, width, height)?;
    let file = BufWriter::new(File::create(path)?);
    let mut encoder = TiffEncoder::new_big(file)?;
    encoder.write_image::<Gray16>(width, height, &pixels)?;
    Ok(())
}

/// Dump one frame's bytes as a flat binary file.
pub fn write_raw_frame(path: &Path, data: &[u8]) -> Result<(), StorageError> {
    let mut file = BufWriter::new(File::create(path)?);
    file.write_all(data)?;
    file.flush()?;
    Ok(())
}

/// Multi-page TIFF receiving one page per frame, opened once per
/// session.
pub struct TiffStackFile {
    encoder: TiffEncoder<BufWriter<File>>,
    path: PathBuf,
    pages: usize,
}

impl TiffStackFile {
    /// Create the stack file.
    pub fn create(path: &Path) -> Result<Self, StorageError> {
        let file = BufWriter::new(File::create(path)?);
        let encoder = TiffEncoder::new(file)?;
        info!(path = %path.display(), "opened tiff stack");
        Ok(Self {
            encoder,
            path: path.to_path_buf(),
            pages: 0,
        })
    }

    /// Append one frame as the next page.
    pub fn append_frame(
        &mut self,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> Result<(), StorageError> {
        let pixels = pixels_from_le(data, width, height)?;
        self.encoder.write_image::<Gray16>(width, height, &pixels)?;
        self.pages += 1;
        Ok(())
    }

    /// Pages written so far.
    #[must_use]
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Path the stack lives at.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read every page of a (possibly multi-page) grayscale TIFF back as
/// little-endian byte buffers, in page order.
pub fn read_tiff_stack(path: &Path) -> Result<Vec<Vec<u8>>, StorageError> {
    let file = File::open(path)?;
    let mut decoder = Decoder::new(file)?;
    let mut frames = Vec::new();
    loop {
        match decoder.read_image()? {
            DecodingResult::U16(pixels) => {
                let mut bytes = Vec::with_capacity(pixels.len() * 2);
                for px in pixels {
                    bytes.extend_from_slice(&px.to_le_bytes());
                }
                frames.push(bytes);
            }
            _ => return Err(StorageError::BadSampleFormat(path.to_path_buf())),
        }
        if !decoder.more_images() {
            break;
        }
        decoder.next_image()?;
    }
    Ok(frames)
}

/// One session's storage endpoint, dispatching on the configured
/// layout.
///
/// Per-frame layouts touch the filesystem only inside
/// [`write_frame`](SessionWriter::write_frame); the stack layout opens
/// its file lazily at the first frame so an aborted session with zero
/// frames leaves no empty file behind.
pub struct SessionWriter {
    dir: PathBuf,
    prefix: String,
    storage: StorageType,
    width: u32,
    height: u32,
    stack: Option<TiffStackFile>,
    frames_written: usize,
}

impl SessionWriter {
    /// Configure a writer for one session. Rejects the reserved `Prd`
    /// layout up front.
    pub fn new(
        dir: &Path,
        prefix: &str,
        storage: StorageType,
        width: u32,
        height: u32,
    ) -> Result<Self, StorageError> {
        if storage == StorageType::Prd {
            return Err(StorageError::Unsupported(StorageType::Prd));
        }
        Ok(Self {
            dir: dir.to_path_buf(),
            prefix: prefix.to_string(),
            storage,
            width,
            height,
            stack: None,
            frames_written: 0,
        })
    }

    /// Persist one frame under sequence number `index`.
    pub fn write_frame(&mut self, index: u32, data: &[u8]) -> Result<(), StorageError> {
        if self.frames_written == 0 {
            std::fs::create_dir_all(&self.dir)?;
        }
        match self.storage {
            StorageType::TiffStack => {
                if self.stack.is_none() {
                    let name = sequence_file_name(&self.prefix, 0, self.storage.extension());
                    self.stack = Some(TiffStackFile::create(&self.dir.join(name))?);
                }
                if let Some(stack) = self.stack.as_mut() {
                    stack.append_frame(self.width, self.height, data)?;
                }
            }
            StorageType::Tiff => {
                let name = sequence_file_name(&self.prefix, index, self.storage.extension());
                write_tiff_frame(&self.dir.join(name), self.width, self.height, data)?;
            }
            StorageType::BigTiff => {
                let name = sequence_file_name(&self.prefix, index, self.storage.extension());
                write_big_tiff_frame(&self.dir.join(name), self.width, self.height, data)?;
            }
            StorageType::Raw => {
                let name = sequence_file_name(&self.prefix, index, self.storage.extension());
                write_raw_frame(&self.dir.join(name), data)?;
            }
            StorageType::Prd => return Err(StorageError::Unsupported(StorageType::Prd)),
        }
        self.frames_written += 1;
        debug!(index, frames = self.frames_written, "frame written");
        Ok(())
    }

    /// Frames persisted so far.
    #[must_use]
    pub fn frames_written(&self) -> usize {
        self.frames_written
    }

    /// Finish the session, closing a stack file if one is open.
    pub fn close(&mut self) {
        if let Some(stack) = self.stack.take() {
            info!(path = %stack.path().display(), pages = stack.pages(), "closed tiff stack");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_frame(width: u32, height: u32, seed: u16) -> Vec<u8> {
        let mut data = Vec::with_capacity((width * height * 2) as usize);
        for y in 0..height {
            for x in 0..width {
                let px = ((x + y) as u16).wrapping_add(seed) % 4096;
                data.extend_from_slice(&px.to_le_bytes());
            }
        }
        data
    }

    #[test]
    fn sequence_names_zero_pad() {
        assert_eq!(sequence_file_name("scan_", 0, "tiff"), "scan_000.tiff");
        assert_eq!(sequence_file_name("scan_", 42, "tiff"), "scan_042.tiff");
        assert_eq!(sequence_file_name("x", 1234, "raw"), "x1234.raw");
    }

    #[test]
    fn tiff_frame_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.tiff");
        let data = gradient_frame(32, 16, 7);

        write_tiff_frame(&path, 32, 16, &data).unwrap();
        let back = read_tiff_stack(&path).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0], data);
    }

    #[test]
    fn big_tiff_frame_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.tiff");
        let data = gradient_frame(16, 16, 3);

        write_big_tiff_frame(&path, 16, 16, &data).unwrap();
        let back = read_tiff_stack(&path).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0], data);
    }

    #[test]
    fn geometry_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.tiff");
        let err = write_tiff_frame(&path, 8, 8, &[0u8; 10]).unwrap_err();
        assert!(matches!(err, StorageError::GeometryMismatch { need: 128, .. }));
    }

    #[test]
    fn stack_roundtrip_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let frames: Vec<Vec<u8>> = (0..5).map(|i| gradient_frame(24, 24, i * 100)).collect();

        let mut writer =
            SessionWriter::new(dir.path(), "stack_", StorageType::TiffStack, 24, 24).unwrap();
        for (i, frame) in frames.iter().enumerate() {
            writer.write_frame(i as u32, frame).unwrap();
        }
        writer.close();

        let path = dir.path().join("stack_000.tiff");
        let back = read_tiff_stack(&path).unwrap();
        assert_eq!(back.len(), frames.len());
        for (got, want) in back.iter().zip(&frames) {
            assert_eq!(got, want);
        }
    }

    #[test]
    fn per_frame_layout_names_files_by_index() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("session");
        let mut writer = SessionWriter::new(&out, "img_", StorageType::Tiff, 8, 8).unwrap();

        for i in 0..3u32 {
            writer.write_frame(i, &gradient_frame(8, 8, i as u16)).unwrap();
        }
        assert!(out.join("img_000.tiff").exists());
        assert!(out.join("img_001.tiff").exists());
        assert!(out.join("img_002.tiff").exists());
        assert_eq!(writer.frames_written(), 3);
    }

    #[test]
    fn raw_layout_dumps_exact_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SessionWriter::new(dir.path(), "r_", StorageType::Raw, 8, 8).unwrap();
        let data = gradient_frame(8, 8, 1);
        writer.write_frame(0, &data).unwrap();

        let back = std::fs::read(dir.path().join("r_000.raw")).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn prd_layout_rejected_up_front() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            SessionWriter::new(dir.path(), "p_", StorageType::Prd, 8, 8),
            Err(StorageError::Unsupported(StorageType::Prd))
        ));
    }

    #[test]
    fn no_directory_created_before_first_frame() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("never");
        let _writer = SessionWriter::new(&out, "x_", StorageType::Tiff, 8, 8).unwrap();
        assert!(!out.exists());
    }
}
