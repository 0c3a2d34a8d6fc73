//! Core types and traits for the camera acquisition pipeline.
//!
//! This crate defines the frame data model ([`data::Frame`],
//! [`data::FrameInfo`]), the exposure session settings
//! ([`settings::ExpSettings`]), the camera driver capability surface
//! ([`driver::CameraDriver`]), the generation-checked ring-slot store
//! shared between drivers and frames ([`ring::SlotRing`]), and the ring
//! buffer sizing arithmetic ([`buffer`]).
//!
//! Nothing here spawns threads; the acquisition engine and drivers
//! build the concurrent pipeline on top of these types.

pub mod buffer;
pub mod data;
pub mod driver;
pub mod ring;
pub mod settings;

pub use data::{BulkCopier, Frame, FrameError, FrameInfo, SensorFrame, SerialCopier};
pub use driver::{CameraDriver, DriverError, EofHandler};
pub use ring::{RingError, SlotHandle, SlotRef, SlotRing};
pub use settings::{
    AcqMode, CaptureRegion, ExpOutMode, ExpSettings, SpeedTableEntry, StorageType, TrigMode,
};
