//! Acquisition engine for high-rate camera capture.
//!
//! Coordinates three thread roles around one camera driver: the
//! driver's EOF callback thread (producer), a dedicated writer thread
//! (consumer, storage + preview routing), and a persistent worker pool
//! for per-frame pixel work. Frames flow through a bounded queue with
//! drop-newest backpressure; a lost-frame detector runs on both sides
//! of the queue.

pub mod config;
pub mod engine;
pub mod lost_frames;

pub use config::EngineConfig;
pub use engine::{AcqState, AcquisitionEngine, EngineError};
pub use lost_frames::LostFrameDetector;
