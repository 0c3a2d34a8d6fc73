//! Frame data model.
//!
//! A [`Frame`] is one ring-buffer slot's logical view plus an optional
//! owned deep-copy buffer and the per-frame metadata snapshot
//! ([`FrameInfo`]). Frames are pre-constructed and recycled through a
//! pool; the acquisition engine serializes all mutation per frame
//! instance, while the metadata snapshot keeps its own short lock so
//! `info()`/`set_info()` are safe from any thread.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::ring::{RingError, SlotRef};

/// Per-frame metadata captured at end-of-frame time.
///
/// Immutable snapshot; copied into a [`Frame`] when the driver reports
/// the frame, never updated afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInfo {
    /// Driver-assigned frame sequence number, monotonically increasing
    /// within one session (1-based; 0 means "no frame").
    pub frame_nr: u32,
    /// Begin-of-frame timestamp, driver ticks.
    pub timestamp_bof: u64,
    /// End-of-frame timestamp, driver ticks.
    pub timestamp_eof: u64,
    /// Sensor readout time in microseconds.
    pub readout_time_us: u32,
    /// Exposure time for this frame in milliseconds.
    pub exp_time_ms: u32,
    /// Per-channel white-balance scale factors (R, G, B).
    pub wb_scale: [f32; 3],
}

impl Default for FrameInfo {
    fn default() -> Self {
        Self {
            frame_nr: 0,
            timestamp_bof: 0,
            timestamp_eof: 0,
            readout_time_us: 0,
            exp_time_ms: 0,
            wb_scale: [1.0, 1.0, 1.0],
        }
    }
}

/// Errors from frame data handling.
#[derive(Debug, Error)]
pub enum FrameError {
    /// `copy_data` was called with no source location recorded.
    #[error("no source slot set")]
    NoSource,
    /// The source slot was reused before the copy happened.
    #[error(transparent)]
    Ring(#[from] RingError),
    /// Attempt to fill a frame with a wrongly sized buffer.
    #[error("data size mismatch: got {got} bytes, frame holds {expected}")]
    SizeMismatch {
        /// Bytes supplied.
        got: usize,
        /// Bytes the frame buffer holds.
        expected: usize,
    },
    /// Operation requires a deep-copy buffer but the frame is shallow.
    #[error("frame has no owned buffer (shallow mode)")]
    NoBuffer,
}

/// Bulk memory copy strategy.
///
/// Frames route their deep copies through this seam so the engine can
/// plug in the partitioned parallel copy from the executor crate while
/// core stays dependency-free.
pub trait BulkCopier: Send + Sync {
    /// Copy `src` into `dst`. Both slices have equal length.
    fn copy(&self, src: &[u8], dst: &mut [u8]);
}

/// Single-threaded fallback copier.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialCopier;

impl BulkCopier for SerialCopier {
    fn copy(&self, src: &[u8], dst: &mut [u8]) {
        dst.copy_from_slice(src);
    }
}

/// Minimal frame capability contract.
///
/// The engine, writers and pool are written against this trait so tests
/// can substitute instrumented frames; [`Frame`] is the one production
/// implementation.
pub trait SensorFrame: Send + 'static {
    /// Construct a frame of `frame_bytes` bytes.
    ///
    /// `deep_copy` selects whether the frame owns a stable buffer or
    /// only ever records the driver-side slot handle.
    fn with_layout(frame_bytes: usize, deep_copy: bool, copier: Arc<dyn BulkCopier>) -> Self;

    /// Record the driver-side source location of this frame's pixels.
    fn set_source(&mut self, src: SlotRef);

    /// Materialize the pixel data.
    ///
    /// Deep mode: copies from the source slot into the owned buffer
    /// (fails if the slot was reused). Shallow mode: a no-op; the data
    /// stays addressable only through the slot handle.
    fn copy_data(&mut self) -> Result<(), FrameError>;

    /// The owned pixel buffer. Only meaningful after a successful
    /// [`copy_data`](Self::copy_data) (or [`fill_data`](Self::fill_data)).
    fn data(&self) -> &[u8];

    /// Overwrite the owned buffer with `bytes`, bypassing the source
    /// slot. Used for injected test data.
    fn fill_data(&mut self, bytes: &[u8]) -> Result<(), FrameError>;

    /// Snapshot of the frame metadata. Internally locked.
    fn info(&self) -> FrameInfo;

    /// Replace the frame metadata. Internally locked.
    fn set_info(&self, info: FrameInfo);

    /// Duplicate another frame's pixels and metadata without aliasing
    /// the same storage. `deep` copies the pixel bytes; shallow only
    /// transfers the slot handle and metadata.
    fn copy_from(&mut self, other: &Self, deep: bool) -> Result<(), FrameError>;

    /// Clear per-capture state for pool reuse. Keeps the buffer.
    fn reset(&mut self);
}

/// One frame: optional owned buffer + driver slot reference + metadata.
pub struct Frame {
    frame_bytes: usize,
    deep_copy: bool,
    data: Vec<u8>,
    source: Option<SlotRef>,
    /// True once `data` holds a materialized copy for this capture.
    copied: bool,
    info: Mutex<FrameInfo>,
    copier: Arc<dyn BulkCopier>,
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("frame_bytes", &self.frame_bytes)
            .field("deep_copy", &self.deep_copy)
            .field("copied", &self.copied)
            .field("info", &self.info())
            .finish()
    }
}

impl Frame {
    /// Construct a frame; allocates the deep-copy buffer up front so
    /// the capture path never allocates.
    #[must_use]
    pub fn new(frame_bytes: usize, deep_copy: bool, copier: Arc<dyn BulkCopier>) -> Self {
        let data = if deep_copy {
            vec![0u8; frame_bytes]
        } else {
            Vec::new()
        };
        Self {
            frame_bytes,
            deep_copy,
            data,
            source: None,
            copied: false,
            info: Mutex::new(FrameInfo::default()),
            copier,
        }
    }

    /// Byte size this frame was laid out for.
    #[must_use]
    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    /// Whether this frame owns a stable buffer.
    #[must_use]
    pub fn is_deep_copy(&self) -> bool {
        self.deep_copy
    }

    /// The recorded driver-side source, if any.
    #[must_use]
    pub fn source(&self) -> Option<&SlotRef> {
        self.source.as_ref()
    }

    /// Pixel data as 16-bit little-endian values.
    ///
    /// Returns `None` for an odd-length or unmaterialized buffer.
    #[must_use]
    pub fn as_u16_pixels(&self) -> Option<Vec<u16>> {
        let data = self.data();
        if data.is_empty() || data.len() % 2 != 0 {
            return None;
        }
        Some(
            data.chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect(),
        )
    }

    /// Run `f` over the driver-side slot bytes without copying.
    ///
    /// Shallow access path; fails if the slot was already reused, which
    /// is exactly the "pointer outlived one processing cycle" misuse the
    /// handle design exists to catch.
    pub fn with_source_data<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Result<R, FrameError> {
        let src = self.source.as_ref().ok_or(FrameError::NoSource)?;
        Ok(src.ring.with_slot(src.handle, f)?)
    }
}

impl SensorFrame for Frame {
    fn with_layout(frame_bytes: usize, deep_copy: bool, copier: Arc<dyn BulkCopier>) -> Self {
        Self::new(frame_bytes, deep_copy, copier)
    }

    fn set_source(&mut self, src: SlotRef) {
        self.source = Some(src);
        self.copied = false;
    }

    fn copy_data(&mut self) -> Result<(), FrameError> {
        if !self.deep_copy {
            // Shallow frames keep aliasing the slot; nothing to do.
            return Ok(());
        }
        let src = self.source.clone().ok_or(FrameError::NoSource)?;
        src.ring.with_slot(src.handle, |bytes| {
            let n = bytes.len().min(self.data.len());
            self.copier.copy(&bytes[..n], &mut self.data[..n]);
        })?;
        self.copied = true;
        Ok(())
    }

    fn data(&self) -> &[u8] {
        if self.copied {
            &self.data
        } else {
            &[]
        }
    }

    fn fill_data(&mut self, bytes: &[u8]) -> Result<(), FrameError> {
        if !self.deep_copy {
            return Err(FrameError::NoBuffer);
        }
        if bytes.len() != self.data.len() {
            return Err(FrameError::SizeMismatch {
                got: bytes.len(),
                expected: self.data.len(),
            });
        }
        self.data.copy_from_slice(bytes);
        self.copied = true;
        Ok(())
    }

    fn info(&self) -> FrameInfo {
        *self.info.lock()
    }

    fn set_info(&self, info: FrameInfo) {
        *self.info.lock() = info;
    }

    fn copy_from(&mut self, other: &Self, deep: bool) -> Result<(), FrameError> {
        self.source = other.source.clone();
        if deep {
            if !self.deep_copy {
                return Err(FrameError::NoBuffer);
            }
            let src = other.data();
            if src.is_empty() {
                // Other frame never materialized; pull from its slot.
                self.copy_data()?;
            } else {
                if src.len() != self.data.len() {
                    return Err(FrameError::SizeMismatch {
                        got: src.len(),
                        expected: self.data.len(),
                    });
                }
                self.copier.copy(src, &mut self.data);
                self.copied = true;
            }
        }
        self.set_info(other.info());
        Ok(())
    }

    fn reset(&mut self) {
        self.source = None;
        self.copied = false;
        *self.info.lock() = FrameInfo::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::SlotRing;

    fn ring_with_frame(bytes: &[u8]) -> SlotRef {
        let ring = Arc::new(SlotRing::new(2, bytes.len()));
        let handle = ring.write_slot(0, bytes).unwrap();
        SlotRef { ring, handle }
    }

    #[test]
    fn deep_copy_materializes_data() {
        let src = ring_with_frame(&[9, 8, 7, 6]);
        let mut frame = Frame::new(4, true, Arc::new(SerialCopier));

        assert!(frame.data().is_empty());
        frame.set_source(src);
        frame.copy_data().unwrap();
        assert_eq!(frame.data(), &[9, 8, 7, 6]);
    }

    #[test]
    fn copy_without_source_fails() {
        let mut frame = Frame::new(4, true, Arc::new(SerialCopier));
        assert!(matches!(frame.copy_data(), Err(FrameError::NoSource)));
    }

    #[test]
    fn stale_source_is_an_error_not_garbage() {
        let ring = Arc::new(SlotRing::new(1, 4));
        let handle = ring.write_slot(0, &[1; 4]).unwrap();
        let mut frame = Frame::new(4, true, Arc::new(SerialCopier));
        frame.set_source(SlotRef {
            ring: Arc::clone(&ring),
            handle,
        });

        // Driver wraps around and reuses the slot before the copy.
        let _ = ring.write_slot(0, &[2; 4]).unwrap();

        assert!(matches!(frame.copy_data(), Err(FrameError::Ring(_))));
        assert!(frame.data().is_empty());
    }

    #[test]
    fn shallow_frame_reads_through_slot() {
        let src = ring_with_frame(&[5, 5, 5, 5]);
        let mut frame = Frame::new(4, false, Arc::new(SerialCopier));
        frame.set_source(src);
        frame.copy_data().unwrap();

        // No owned buffer, but slot access works while the slot lives.
        assert!(frame.data().is_empty());
        let sum: u32 = frame
            .with_source_data(|b| b.iter().map(|&v| u32::from(v)).sum())
            .unwrap();
        assert_eq!(sum, 20);
    }

    #[test]
    fn copy_from_duplicates_without_aliasing() {
        let src = ring_with_frame(&[1, 2, 3, 4]);
        let mut a = Frame::new(4, true, Arc::new(SerialCopier));
        a.set_source(src);
        a.copy_data().unwrap();
        a.set_info(FrameInfo {
            frame_nr: 7,
            ..FrameInfo::default()
        });

        let mut b = Frame::new(4, true, Arc::new(SerialCopier));
        b.copy_from(&a, true).unwrap();

        assert_eq!(b.data(), &[1, 2, 3, 4]);
        assert_eq!(b.info().frame_nr, 7);

        // Mutating the original must not show through the copy.
        a.fill_data(&[9, 9, 9, 9]).unwrap();
        assert_eq!(b.data(), &[1, 2, 3, 4]);
    }

    #[test]
    fn fill_data_validates_size() {
        let mut frame = Frame::new(4, true, Arc::new(SerialCopier));
        assert!(matches!(
            frame.fill_data(&[0u8; 2]),
            Err(FrameError::SizeMismatch { got: 2, expected: 4 })
        ));
        frame.fill_data(&[1u8; 4]).unwrap();
        assert_eq!(frame.data(), &[1u8; 4]);
    }

    #[test]
    fn reset_clears_capture_state() {
        let src = ring_with_frame(&[1, 2, 3, 4]);
        let mut frame = Frame::new(4, true, Arc::new(SerialCopier));
        frame.set_source(src);
        frame.copy_data().unwrap();
        frame.set_info(FrameInfo {
            frame_nr: 3,
            ..FrameInfo::default()
        });

        frame.reset();
        assert!(frame.data().is_empty());
        assert!(frame.source().is_none());
        assert_eq!(frame.info().frame_nr, 0);
    }

    #[test]
    fn u16_pixel_view() {
        let src = ring_with_frame(&[0x01, 0x00, 0xff, 0x7f]);
        let mut frame = Frame::new(4, true, Arc::new(SerialCopier));
        frame.set_source(src);
        frame.copy_data().unwrap();
        assert_eq!(frame.as_u16_pixels().unwrap(), vec![1, 0x7fff]);
    }
}
