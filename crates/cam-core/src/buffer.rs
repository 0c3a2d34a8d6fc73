//! Ring-buffer sizing arithmetic.
//!
//! The driver's circular buffer is allocated once per session. Its byte
//! size is `slot_count * frame_bytes` plus a fixed 16-byte pad (a
//! long-standing driver quirk: the hardware occasionally writes a few
//! bytes past the last slot), rounded up to the allocation page size.
//! A request for zero slots means "as many as the driver can address".

/// Fixed pad appended to every ring-buffer allocation.
pub const BUFFER_PAD_BYTES: usize = 16;

/// Allocation granularity when no platform page size is known.
pub const DEFAULT_PAGE_BYTES: usize = 4096;

/// Widest buffer byte size the driver API can address. The API carries
/// sizes in a signed 32-bit field, so only half the u32 range is usable.
pub const MAX_ADDRESSABLE_BYTES: u32 = u32::MAX >> 1;

/// Default cap on frame-pool growth, independent of what the driver
/// could address. Tunable through engine configuration.
pub const DEFAULT_POOL_CEILING: usize = 1000;

/// Round `bytes` up to the next multiple of `page` (power of two).
#[must_use]
pub fn page_round_up(bytes: usize, page: usize) -> usize {
    debug_assert!(page.is_power_of_two());
    (bytes + page - 1) & !(page - 1)
}

/// Largest slot count whose total byte size stays addressable.
///
/// Returns 0 when a single frame already exceeds the addressable range.
#[must_use]
pub fn max_buffer_count(frame_bytes: usize) -> u32 {
    if frame_bytes == 0 {
        return 0;
    }
    u32::try_from(MAX_ADDRESSABLE_BYTES as usize / frame_bytes).unwrap_or(u32::MAX)
}

/// Effective slot count for a session request.
///
/// Zero requests the maximum; any other request is clamped to it.
#[must_use]
pub fn effective_buffer_count(requested: u32, frame_bytes: usize) -> u32 {
    let max = max_buffer_count(frame_bytes);
    if requested == 0 {
        max
    } else {
        requested.min(max)
    }
}

/// Bytes to allocate for `slot_count` slots of `frame_bytes` each,
/// padded and page-aligned.
#[must_use]
pub fn ring_buffer_bytes(slot_count: u32, frame_bytes: usize) -> usize {
    let raw = slot_count as usize * frame_bytes + BUFFER_PAD_BYTES;
    page_round_up(raw, DEFAULT_PAGE_BYTES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_round_up_boundaries() {
        assert_eq!(page_round_up(0, 4096), 0);
        assert_eq!(page_round_up(1, 4096), 4096);
        assert_eq!(page_round_up(4096, 4096), 4096);
        assert_eq!(page_round_up(4097, 4096), 8192);
    }

    #[test]
    fn ring_size_includes_pad() {
        // 4 slots * 1000 bytes + 16 = 4016, rounds up within one page.
        assert_eq!(ring_buffer_bytes(4, 1000), 4096);
        // 4 slots * 1024 bytes + 16 = 4112, the pad pushes past a page.
        assert_eq!(ring_buffer_bytes(4, 1024), 8192);
        // Exactly one page once padded.
        assert_eq!(ring_buffer_bytes(2, 2040), 4096);
    }

    #[test]
    fn zero_request_derives_maximum() {
        let frame_bytes = 8 * 1024 * 1024;
        let count = effective_buffer_count(0, frame_bytes);
        assert_eq!(count, max_buffer_count(frame_bytes));
        // The derived count must stay addressable.
        assert!(count as usize * frame_bytes <= MAX_ADDRESSABLE_BYTES as usize);
        // And one more slot must not fit.
        assert!((count as usize + 1) * frame_bytes > MAX_ADDRESSABLE_BYTES as usize);
    }

    #[test]
    fn oversized_request_clamped() {
        let frame_bytes = 1024 * 1024;
        let max = max_buffer_count(frame_bytes);
        assert_eq!(effective_buffer_count(max + 100, frame_bytes), max);
        assert_eq!(effective_buffer_count(4, frame_bytes), 4);
    }

    #[test]
    fn giant_frame_yields_zero_slots() {
        assert_eq!(max_buffer_count(usize::MAX), 0);
        assert_eq!(max_buffer_count(0), 0);
    }
}
