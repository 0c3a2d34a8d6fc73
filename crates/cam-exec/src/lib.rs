//! Fixed-size parallel task executor for per-frame pixel work.
//!
//! Per-frame processing (statistics, lookup-table application, bulk
//! copies) must finish inside one frame period, so the work is split
//! across a small pool of persistent worker threads instead of paying
//! thread spawn cost per frame.
//!
//! [`ParExec::run`] dispatches one [`ParTask`] to every worker and
//! blocks until all partitions have executed exactly once. A panic
//! inside a partition is caught and reported as
//! [`ExecError::WorkerPanicked`] after the barrier completes, so a
//! failing task never wedges the executor.

pub mod copy;
pub mod exec;
pub mod tasks;

pub use copy::ParCopier;
pub use exec::{chunk_range, ExecError, ParExec, ParTask};
pub use tasks::{build_lut16, ApplyLut16Task, FrameStats, FrameStatsTask};
