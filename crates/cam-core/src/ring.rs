//! Generation-checked ring-slot store.
//!
//! The hardware driver streams frames into a circular buffer and hands
//! out the *location* of the newest frame. Identifying that location by
//! raw address invites pointer arithmetic against memory the driver is
//! about to reuse; instead, slots are addressed by `(index, generation)`
//! handles. Every write to a slot bumps its generation, so a reader
//! holding a stale handle gets [`RingError::StaleSlot`] rather than the
//! next frame's bytes.

use parking_lot::Mutex;
use thiserror::Error;

/// Errors from slot access.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RingError {
    /// The slot index is outside the ring.
    #[error("slot index {0} out of range")]
    BadIndex(usize),
    /// The slot was overwritten since the handle was issued.
    #[error("slot {index} reused (handle generation {held}, current {current})")]
    StaleSlot {
        /// Slot index the handle referred to.
        index: usize,
        /// Generation recorded in the handle.
        held: u64,
        /// Generation currently stored in the slot.
        current: u64,
    },
}

/// Stable identifier for one write into one ring slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotHandle {
    /// Slot index within the ring.
    pub index: usize,
    /// Generation of the slot at hand-out time.
    pub generation: u64,
}

struct Slot {
    generation: u64,
    bytes: Vec<u8>,
}

/// Fixed-size ring of frame slots with per-slot generation counters.
///
/// Writers (the driver's DMA stand-in) advance slots round-robin;
/// readers validate their handle's generation on every access.
pub struct SlotRing {
    slots: Vec<Mutex<Slot>>,
    slot_bytes: usize,
}

impl SlotRing {
    /// Allocate a ring of `slot_count` slots of `slot_bytes` each.
    #[must_use]
    pub fn new(slot_count: usize, slot_bytes: usize) -> Self {
        assert!(slot_count > 0, "ring must have at least one slot");
        assert!(slot_bytes > 0, "slot size must be non-zero");
        let slots = (0..slot_count)
            .map(|_| {
                Mutex::new(Slot {
                    generation: 0,
                    bytes: vec![0u8; slot_bytes],
                })
            })
            .collect();
        Self { slots, slot_bytes }
    }

    /// Number of slots in the ring.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Byte size of each slot.
    #[must_use]
    pub fn slot_bytes(&self) -> usize {
        self.slot_bytes
    }

    /// Overwrite a slot with `src`, bumping its generation.
    ///
    /// Returns the handle under which the new contents can be read.
    /// `src` longer than the slot is truncated; shorter fills the head.
    pub fn write_slot(&self, index: usize, src: &[u8]) -> Result<SlotHandle, RingError> {
        let slot = self.slots.get(index).ok_or(RingError::BadIndex(index))?;
        let mut slot = slot.lock();
        slot.generation += 1;
        let n = src.len().min(slot.bytes.len());
        slot.bytes[..n].copy_from_slice(&src[..n]);
        Ok(SlotHandle {
            index,
            generation: slot.generation,
        })
    }

    /// Run `f` over the slot's bytes if the handle is still current.
    pub fn with_slot<R>(
        &self,
        handle: SlotHandle,
        f: impl FnOnce(&[u8]) -> R,
    ) -> Result<R, RingError> {
        let slot = self
            .slots
            .get(handle.index)
            .ok_or(RingError::BadIndex(handle.index))?;
        let slot = slot.lock();
        if slot.generation != handle.generation {
            return Err(RingError::StaleSlot {
                index: handle.index,
                held: handle.generation,
                current: slot.generation,
            });
        }
        Ok(f(&slot.bytes))
    }

    /// Copy the slot's bytes into `dst` if the handle is still current.
    pub fn read_slot(&self, handle: SlotHandle, dst: &mut [u8]) -> Result<(), RingError> {
        self.with_slot(handle, |bytes| {
            let n = bytes.len().min(dst.len());
            dst[..n].copy_from_slice(&bytes[..n]);
        })
    }
}

/// Shared reference to one slot of one ring: what a frame records as
/// its driver-side source location.
#[derive(Clone)]
pub struct SlotRef {
    /// The ring the slot lives in.
    pub ring: std::sync::Arc<SlotRing>,
    /// The slot and generation this reference points at.
    pub handle: SlotHandle,
}

impl std::fmt::Debug for SlotRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotRef")
            .field("handle", &self.handle)
            .finish()
    }
}
