//! Partitioned bulk memory copy.
//!
//! Deep-copying an 8 MB frame single-threaded eats a visible slice of
//! the frame period; splitting the copy across the executor's workers
//! keeps the callback path fast. [`ParCopier`] plugs into the frame
//! data model through the [`BulkCopier`] seam.

use std::sync::Arc;

use cam_core::BulkCopier;
use tracing::warn;

use crate::exec::{chunk_range, ParExec, ParTask};

/// Copies below this size are not worth the dispatch round trip.
const PAR_COPY_MIN_BYTES: usize = 64 * 1024;

struct CopyTask {
    src: *const u8,
    dst: *mut u8,
    len: usize,
}

// SAFETY: partitions write disjoint chunk_range slices of dst; src is
// read-only; the submitting thread blocks on the barrier, so nothing
// else touches either buffer while the task runs.
unsafe impl Sync for CopyTask {}

impl ParTask for CopyTask {
    fn run(&self, part: usize, parts: usize) {
        let range = chunk_range(self.len, part, parts);
        // SAFETY: range is in-bounds for both buffers (equal length)
        // and unique to this partition.
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.src.add(range.start),
                self.dst.add(range.start),
                range.len(),
            );
        }
    }
}

/// [`BulkCopier`] that partitions large copies across a [`ParExec`].
pub struct ParCopier {
    exec: Arc<ParExec>,
}

impl ParCopier {
    /// Copy through `exec`'s workers.
    #[must_use]
    pub fn new(exec: Arc<ParExec>) -> Self {
        Self { exec }
    }
}

impl BulkCopier for ParCopier {
    fn copy(&self, src: &[u8], dst: &mut [u8]) {
        let len = src.len().min(dst.len());
        if len < PAR_COPY_MIN_BYTES || self.exec.thread_count() < 2 {
            dst[..len].copy_from_slice(&src[..len]);
            return;
        }
        let task = CopyTask {
            src: src.as_ptr(),
            dst: dst.as_mut_ptr(),
            len,
        };
        if let Err(err) = self.exec.run(&task) {
            // The copy partitions cannot panic; this means the executor
            // itself is gone. Fall back so the frame is not lost.
            warn!(%err, "parallel copy unavailable, copying serially");
            dst[..len].copy_from_slice(&src[..len]);
        }
    }
}
