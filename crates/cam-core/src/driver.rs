//! Camera driver capability surface.
//!
//! The acquisition engine is generic over [`CameraDriver`] so it runs
//! identically against real hardware and against the in-process mock
//! used by the test suite. Every operation can fail; failures carry the
//! driver's own error text and typically abort the session.

use std::sync::Arc;

use thiserror::Error;

use crate::data::{FrameInfo, SensorFrame};
use crate::ring::SlotRef;
use crate::settings::{ExpSettings, SpeedTableEntry};

/// Driver-level failures.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The device is already open (or opened by another handle).
    #[error("camera {0} already open")]
    AlreadyOpen(String),
    /// The device is not open.
    #[error("camera not open")]
    NotOpen,
    /// `setup_exp` called while the camera is streaming.
    #[error("camera is imaging, cannot reconfigure")]
    Imaging,
    /// The settings cannot be applied to this device.
    #[error("invalid exposure settings: {0}")]
    InvalidSettings(String),
    /// The requested buffer count cannot be addressed by the driver.
    #[error("buffer space exhausted: {0}")]
    BufferSpace(String),
    /// `start_exp` without a prior successful `setup_exp`.
    #[error("exposure not configured")]
    NotConfigured,
    /// Catch-all for device-reported faults.
    #[error("driver fault: {0}")]
    Fault(String),
}

/// End-of-frame notification.
///
/// Invoked from a driver-owned thread once per captured frame, with the
/// frame's metadata and the ring-slot handle its pixels live in. The
/// handle is only guaranteed readable until the driver reuses the slot;
/// implementations must copy promptly or tolerate a stale-slot error.
pub type EofHandler = Arc<dyn Fn(FrameInfo, SlotRef) + Send + Sync>;

/// Capability contract every camera driver implements.
///
/// `Frame` is the concrete frame type the driver fills in
/// [`get_latest_frame`](CameraDriver::get_latest_frame); production
/// code uses [`crate::data::Frame`], tests may substitute their own.
pub trait CameraDriver: Send + 'static {
    /// Frame type this driver materializes data into.
    type Frame: SensorFrame;

    /// Exclusive-open the physical device.
    fn open(&mut self) -> Result<(), DriverError>;

    /// Release the device.
    fn close(&mut self) -> Result<(), DriverError>;

    /// True between a successful `open` and `close`.
    fn is_open(&self) -> bool;

    /// Configure region, speed and exposure for the next session.
    ///
    /// Fails with [`DriverError::Imaging`] while streaming.
    fn setup_exp(&mut self, settings: &ExpSettings) -> Result<(), DriverError>;

    /// Register the EOF callback and begin streaming into the ring
    /// buffer sized during `setup_exp`.
    fn start_exp(&mut self, handler: EofHandler) -> Result<(), DriverError>;

    /// Abort streaming and deregister the callback.
    fn stop_exp(&mut self) -> Result<(), DriverError>;

    /// True while the driver is streaming frames.
    fn is_imaging(&self) -> bool;

    /// Byte size of one frame under the configured settings.
    fn frame_bytes(&self) -> usize;

    /// Copy the driver-side latest frame into `frame`.
    fn get_latest_frame(&self, frame: &mut Self::Frame) -> Result<(), DriverError>;

    /// Per-frame exposure time in milliseconds. Variable-exposure modes
    /// report different values per frame number.
    fn get_frame_exp_time(&self, frame_nr: u32) -> u32;

    /// The camera's readout speed table.
    fn speed_table(&self) -> &[SpeedTableEntry];
}
