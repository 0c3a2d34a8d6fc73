//! Per-frame pixel processing tasks.
//!
//! Display pipeline: [`FrameStatsTask`] finds the frame's intensity
//! range, [`build_lut16`] turns that range into a 16-to-8 bit stretch
//! table, [`ApplyLut16Task`] maps the pixels through it for preview.

use parking_lot::Mutex;

use crate::exec::{chunk_range, ParTask};

/// Intensity statistics of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    /// Smallest pixel value.
    pub min: u16,
    /// Largest pixel value.
    pub max: u16,
    /// Sum of all pixel values.
    pub sum: u64,
    /// Pixels inspected.
    pub count: usize,
}

impl FrameStats {
    /// Mean pixel value, 0 for an empty frame.
    #[must_use]
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum as f64 / self.count as f64
        }
    }

    fn empty() -> Self {
        Self {
            min: u16::MAX,
            max: 0,
            sum: 0,
            count: 0,
        }
    }

    fn merge(&mut self, other: &Self) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.sum += other.sum;
        self.count += other.count;
    }
}

/// Min/max/sum over a 16-bit pixel buffer, one partial per partition.
pub struct FrameStatsTask<'a> {
    pixels: &'a [u16],
    partials: Vec<Mutex<FrameStats>>,
}

impl<'a> FrameStatsTask<'a> {
    /// Prepare a stats pass over `pixels` split into `parts` partitions.
    #[must_use]
    pub fn new(pixels: &'a [u16], parts: usize) -> Self {
        let partials = (0..parts.max(1))
            .map(|_| Mutex::new(FrameStats::empty()))
            .collect();
        Self { pixels, partials }
    }

    /// Combine the per-partition partials. Call after the executor run.
    #[must_use]
    pub fn finish(&self) -> FrameStats {
        let mut total = FrameStats::empty();
        for partial in &self.partials {
            total.merge(&partial.lock());
        }
        if total.count == 0 {
            total.min = 0;
        }
        total
    }
}

impl ParTask for FrameStatsTask<'_> {
    fn run(&self, part: usize, parts: usize) {
        let range = chunk_range(self.pixels.len(), part, parts);
        let mut local = FrameStats::empty();
        for &px in &self.pixels[range] {
            local.min = local.min.min(px);
            local.max = local.max.max(px);
            local.sum += u64::from(px);
            local.count += 1;
        }
        if let Some(slot) = self.partials.get(part) {
            *slot.lock() = local;
        }
    }
}

/// Linear 16-to-8 bit stretch table over `[low, high]`.
///
/// Values below `low` map to 0, above `high` to 255. A degenerate range
/// maps `low` itself to 0 and everything above it to 255.
#[must_use]
pub fn build_lut16(low: u16, high: u16) -> Vec<u8> {
    let mut lut = vec![0u8; usize::from(u16::MAX) + 1];
    let low = low.min(high);
    let span = u32::from(high - low);
    for (value, out) in lut.iter_mut().enumerate() {
        let value = value as u32;
        *out = if value <= u32::from(low) {
            0
        } else if value >= u32::from(high) {
            255
        } else {
            (((value - u32::from(low)) * 255) / span) as u8
        };
    }
    lut
}

/// Map 16-bit pixels through a LUT into an 8-bit preview buffer.
///
/// Partitions write disjoint ranges of the destination, so the task
/// carries a raw destination pointer rather than fighting the borrow
/// checker over a shared `&mut`.
pub struct ApplyLut16Task<'a> {
    pixels: &'a [u16],
    lut: &'a [u8],
    dst: *mut u8,
    dst_len: usize,
}

// SAFETY: each partition writes only its own chunk_range of dst and the
// submitting thread does not touch dst until the barrier completes.
unsafe impl Sync for ApplyLut16Task<'_> {}

impl<'a> ApplyLut16Task<'a> {
    /// Prepare a LUT pass. `dst` must hold one byte per pixel and `lut`
    /// must have 65536 entries.
    #[must_use]
    pub fn new(pixels: &'a [u16], lut: &'a [u8], dst: &'a mut [u8]) -> Self {
        assert_eq!(dst.len(), pixels.len(), "one output byte per pixel");
        assert_eq!(lut.len(), usize::from(u16::MAX) + 1, "full 16-bit LUT");
        Self {
            pixels,
            lut,
            dst: dst.as_mut_ptr(),
            dst_len: dst.len(),
        }
    }
}

impl ParTask for ApplyLut16Task<'_> {
    fn run(&self, part: usize, parts: usize) {
        let range = chunk_range(self.dst_len, part, parts);
        for i in range {
            // SAFETY: i is within dst_len and no other partition
            // receives this index from chunk_range.
            unsafe {
                *self.dst.add(i) = self.lut[usize::from(self.pixels[i])];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ParExec;

    #[test]
    fn stats_over_known_pixels() {
        let pixels: Vec<u16> = (0..1000).map(|i| (i % 507) as u16).collect();
        let exec = ParExec::new(3);
        let task = FrameStatsTask::new(&pixels, exec.thread_count());
        exec.run(&task).unwrap();
        let stats = task.finish();

        let expect_min = *pixels.iter().min().unwrap();
        let expect_max = *pixels.iter().max().unwrap();
        let expect_sum: u64 = pixels.iter().map(|&p| u64::from(p)).sum();
        assert_eq!(stats.min, expect_min);
        assert_eq!(stats.max, expect_max);
        assert_eq!(stats.sum, expect_sum);
        assert_eq!(stats.count, pixels.len());
    }

    #[test]
    fn stats_empty_frame() {
        let exec = ParExec::new(2);
        let task = FrameStatsTask::new(&[], exec.thread_count());
        exec.run(&task).unwrap();
        let stats = task.finish();
        assert_eq!(stats.min, 0);
        assert_eq!(stats.max, 0);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.mean(), 0.0);
    }

    #[test]
    fn lut_endpoints_and_midpoint() {
        let lut = build_lut16(100, 300);
        assert_eq!(lut[0], 0);
        assert_eq!(lut[100], 0);
        assert_eq!(lut[300], 255);
        assert_eq!(lut[65535], 255);
        assert_eq!(lut[200], ((100u32 * 255) / 200) as u8);
    }

    #[test]
    fn lut_degenerate_range() {
        let lut = build_lut16(500, 500);
        assert_eq!(lut[499], 0);
        // The at-or-below branch wins at the collapsed endpoint.
        assert_eq!(lut[500], 0);
        assert_eq!(lut[501], 255);
        assert_eq!(lut[65535], 255);
    }

    #[test]
    fn apply_lut_matches_serial() {
        let pixels: Vec<u16> = (0..4097).map(|i| (i * 13 % 4096) as u16).collect();
        let lut = build_lut16(0, 4095);
        let expect: Vec<u8> = pixels.iter().map(|&p| lut[usize::from(p)]).collect();

        let exec = ParExec::new(4);
        let mut dst = vec![0u8; pixels.len()];
        let task = ApplyLut16Task::new(&pixels, &lut, &mut dst);
        exec.run(&task).unwrap();
        assert_eq!(dst, expect);
    }
}
