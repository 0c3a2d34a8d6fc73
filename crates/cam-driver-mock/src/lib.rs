//! Mock camera driver.
//!
//! Implements [`cam_core::CameraDriver`] entirely in-process: a
//! producer thread streams synthetic frames into a generation-checked
//! slot ring and fires the EOF callback exactly the way a hardware
//! driver does, including configurable dropped frames for exercising
//! the lost-frame detector.

pub mod mock_camera;
pub mod pattern;

pub use mock_camera::{MockCamera, MockCameraConfig};
pub use pattern::{gradient_pattern, gradient_pattern_u16};
