//! The acquisition engine.
//!
//! Owns the capture session lifecycle: receives EOF callbacks from the
//! driver thread, enqueues frames onto a bounded queue, and runs a
//! background writer thread that classifies each frame by the current
//! mode and routes it to storage and to the "latest frame" preview
//! slot.
//!
//! Ownership of a frame moves callback -> queue -> writer -> pool ->
//! next callback, single-owner at every step, so no frame buffer is
//! ever mutated by two threads at once.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use cam_core::{
    BulkCopier, CameraDriver, DriverError, EofHandler, ExpSettings, FrameInfo, SensorFrame,
    SlotRef,
};
use cam_exec::{build_lut16, ApplyLut16Task, FrameStats, FrameStatsTask, ParCopier, ParExec};
use cam_pool::FramePool;
use cam_storage::SessionWriter;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::lost_frames::LostFrameDetector;

/// Engine-level failures.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Underlying driver call failed.
    #[error(transparent)]
    Driver(#[from] DriverError),
    /// `start` without a prior successful `setup_exp`.
    #[error("no exposure configured")]
    NotConfigured,
    /// `start(true)` while a capture is already running.
    #[error("capture already in progress")]
    AlreadyCapturing,
    /// `setup_exp` while a session is running.
    #[error("session is running, stop it first")]
    Running,
}

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcqState {
    /// No session running.
    Stopped,
    /// Streaming for preview only, nothing saved.
    LiveScan,
    /// Streaming with frames routed to storage.
    Capture,
}

/// Per-session context shared with the writer thread.
struct Session<F> {
    settings: ExpSettings,
    frame_bytes: usize,
    width: u32,
    height: u32,
    pool: Arc<FramePool<F>>,
}

struct Inner<D: CameraDriver> {
    config: EngineConfig,
    driver: Mutex<D>,
    state: Mutex<AcqState>,
    session: Mutex<Option<Arc<Session<D::Frame>>>>,
    queue_tx: Mutex<Option<Sender<D::Frame>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    abort: AtomicBool,
    /// Set once the driver stop request for this session was issued,
    /// either by `stop()` or by the callback reaching the target count.
    stop_requested: AtomicBool,
    captured: AtomicU32,
    written: AtomicU32,
    queue_dropped: AtomicU64,
    copy_failures: AtomicU64,
    write_failures: AtomicU64,
    stalled: AtomicBool,
    /// Counts frames the driver never reported.
    cb_lost: Mutex<LostFrameDetector>,
    /// Additionally counts frames lost between callback and writer
    /// (queue overflow); always >= the callback-side total.
    wr_lost: Mutex<LostFrameDetector>,
    latest: Mutex<Option<D::Frame>>,
    test_data: Mutex<Option<Vec<u8>>>,
    copier: Arc<dyn BulkCopier>,
    exec: Arc<ParExec>,
}

/// Capture session coordinator over one camera driver.
pub struct AcquisitionEngine<D: CameraDriver> {
    inner: Arc<Inner<D>>,
}

impl<D: CameraDriver> AcquisitionEngine<D> {
    /// Build an engine over `driver`. Worker threads for pixel work and
    /// bulk copies are spawned here and live as long as the engine.
    #[must_use]
    pub fn new(driver: D, config: EngineConfig) -> Self {
        let exec = Arc::new(ParExec::new(config.copy_threads));
        let copier: Arc<dyn BulkCopier> = Arc::new(ParCopier::new(Arc::clone(&exec)));
        Self {
            inner: Arc::new(Inner {
                config,
                driver: Mutex::new(driver),
                state: Mutex::new(AcqState::Stopped),
                session: Mutex::new(None),
                queue_tx: Mutex::new(None),
                writer: Mutex::new(None),
                abort: AtomicBool::new(false),
                stop_requested: AtomicBool::new(false),
                captured: AtomicU32::new(0),
                written: AtomicU32::new(0),
                queue_dropped: AtomicU64::new(0),
                copy_failures: AtomicU64::new(0),
                write_failures: AtomicU64::new(0),
                stalled: AtomicBool::new(false),
                cb_lost: Mutex::new(LostFrameDetector::new()),
                wr_lost: Mutex::new(LostFrameDetector::new()),
                latest: Mutex::new(None),
                test_data: Mutex::new(None),
                copier,
                exec,
            }),
        }
    }

    /// Run `f` against the driver, e.g. to open the camera or inspect
    /// its speed table.
    pub fn with_driver<R>(&self, f: impl FnOnce(&mut D) -> R) -> R {
        f(&mut self.inner.driver.lock())
    }

    /// Configure the next session. Rejected while a session runs.
    pub fn setup_exp(&self, settings: &ExpSettings) -> Result<(), EngineError> {
        if *self.inner.state.lock() != AcqState::Stopped {
            return Err(EngineError::Running);
        }
        let frame_bytes = {
            let mut driver = self.inner.driver.lock();
            driver.setup_exp(settings)?;
            driver.frame_bytes()
        };

        let copier = Arc::clone(&self.inner.copier);
        let pool = Arc::new(FramePool::new(
            self.inner.config.pool_initial,
            self.inner.config.pool_ceiling,
            move || D::Frame::with_layout(frame_bytes, true, Arc::clone(&copier)),
        ));

        *self.inner.session.lock() = Some(Arc::new(Session {
            settings: settings.clone(),
            frame_bytes,
            width: settings.region.width() as u32,
            height: settings.region.height() as u32,
            pool,
        }));

        self.inner.captured.store(0, Ordering::SeqCst);
        self.inner.written.store(0, Ordering::SeqCst);
        self.inner.queue_dropped.store(0, Ordering::SeqCst);
        self.inner.copy_failures.store(0, Ordering::SeqCst);
        self.inner.write_failures.store(0, Ordering::SeqCst);
        self.inner.stalled.store(false, Ordering::SeqCst);
        self.inner.cb_lost.lock().reset();
        self.inner.wr_lost.lock().reset();
        *self.inner.latest.lock() = None;

        info!(frame_bytes, "exposure configured");
        Ok(())
    }

    /// Begin streaming, or upgrade a running preview to a capture.
    ///
    /// From `Stopped` this spawns the writer thread and starts the
    /// driver; `save` selects `LiveScan` or `Capture`. From `LiveScan`
    /// with `save` the session upgrades to `Capture` in place, without
    /// restarting the driver or the writer thread. A second capture
    /// request while one runs is rejected.
    pub fn start(&self, save: bool) -> Result<(), EngineError> {
        let mut state = self.inner.state.lock();
        match *state {
            AcqState::Capture => Err(EngineError::AlreadyCapturing),
            AcqState::LiveScan => {
                if save {
                    info!("upgrading live scan to capture in place");
                    *state = AcqState::Capture;
                }
                Ok(())
            }
            AcqState::Stopped => {
                let session = self
                    .inner
                    .session
                    .lock()
                    .clone()
                    .ok_or(EngineError::NotConfigured)?;

                let (tx, rx) = bounded::<D::Frame>(self.inner.config.queue_capacity);
                *self.inner.queue_tx.lock() = Some(tx);
                self.inner.abort.store(false, Ordering::SeqCst);
                self.inner.stop_requested.store(false, Ordering::SeqCst);

                let handler: EofHandler = {
                    let inner = Arc::clone(&self.inner);
                    let session = Arc::clone(&session);
                    Arc::new(move |info, slot| inner.on_eof(&session, info, slot))
                };
                if let Err(err) = self.inner.driver.lock().start_exp(handler) {
                    self.inner.queue_tx.lock().take();
                    return Err(err.into());
                }

                let writer = {
                    let inner = Arc::clone(&self.inner);
                    let session = Arc::clone(&session);
                    std::thread::Builder::new()
                        .name("frame-writer".to_string())
                        .spawn(move || inner.writer_loop(&session, &rx))
                        .map_err(|e| DriverError::Fault(format!("spawn writer: {e}")))?
                };
                *self.inner.writer.lock() = Some(writer);

                *state = if save {
                    AcqState::Capture
                } else {
                    AcqState::LiveScan
                };
                info!(state = ?*state, "acquisition started");
                Ok(())
            }
        }
    }

    /// Request a cooperative stop: abort flag, driver stop, queue
    /// disconnect. Never interrupts an in-progress disk write; call
    /// [`wait_for_stop`](Self::wait_for_stop) to guarantee termination.
    pub fn stop(&self) {
        self.inner.abort.store(true, Ordering::SeqCst);
        self.inner.stop_requested.store(true, Ordering::SeqCst);
        {
            let mut driver = self.inner.driver.lock();
            if driver.is_open() {
                if let Err(err) = driver.stop_exp() {
                    warn!(%err, "driver stop failed");
                }
            }
        }
        // Disconnecting the queue wakes the writer once it has drained
        // the remaining frames.
        self.inner.queue_tx.lock().take();
    }

    /// Block until the writer thread has exited, then reset the frame
    /// counters and lost-frame detectors so a following `start` begins
    /// a fresh session.
    ///
    /// For an unbounded session call [`stop`](Self::stop) first; a
    /// bounded capture ends on its own once the target frame number is
    /// reached.
    pub fn wait_for_stop(&self) {
        let handle = self.inner.writer.lock().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        // Completes a driver stop that was deferred because it was
        // requested from the callback thread.
        {
            let mut driver = self.inner.driver.lock();
            if driver.is_open() && self.inner.stop_requested.load(Ordering::SeqCst) {
                let _ = driver.stop_exp();
            }
        }
        self.inner.captured.store(0, Ordering::SeqCst);
        self.inner.written.store(0, Ordering::SeqCst);
        self.inner.cb_lost.lock().reset();
        self.inner.wr_lost.lock().reset();
        *self.inner.state.lock() = AcqState::Stopped;
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> AcqState {
        *self.inner.state.lock()
    }

    /// EOF callbacks received this session.
    #[must_use]
    pub fn frames_captured(&self) -> u32 {
        self.inner.captured.load(Ordering::SeqCst)
    }

    /// Frames persisted this session.
    #[must_use]
    pub fn frames_written(&self) -> u32 {
        self.inner.written.load(Ordering::SeqCst)
    }

    /// Frames the driver never reported (callback-side detector).
    #[must_use]
    pub fn lost_frames_callback(&self) -> u64 {
        self.inner.cb_lost.lock().total_lost()
    }

    /// Frames missing at the writer (driver losses plus queue drops).
    #[must_use]
    pub fn lost_frames_writer(&self) -> u64 {
        self.inner.wr_lost.lock().total_lost()
    }

    /// Frames dropped because the queue was full.
    #[must_use]
    pub fn queue_dropped(&self) -> u64 {
        self.inner.queue_dropped.load(Ordering::SeqCst)
    }

    /// Frames whose ring slot was reused before the deep copy.
    #[must_use]
    pub fn copy_failures(&self) -> u64 {
        self.inner.copy_failures.load(Ordering::SeqCst)
    }

    /// Failed storage writes.
    #[must_use]
    pub fn write_failures(&self) -> u64 {
        self.inner.write_failures.load(Ordering::SeqCst)
    }

    /// True once the writer has seen `stall_threshold` consecutive
    /// timeouts without a frame. Cleared by the next `setup_exp`.
    #[must_use]
    pub fn is_stalled(&self) -> bool {
        self.inner.stalled.load(Ordering::SeqCst)
    }

    /// Replace captured pixel data with `bytes` before storage; `None`
    /// restores normal operation.
    pub fn set_test_data(&self, bytes: Option<Vec<u8>>) {
        *self.inner.test_data.lock() = bytes;
    }

    /// Run `f` over the most recently processed frame, if any.
    pub fn with_latest_frame<R>(&self, f: impl FnOnce(&D::Frame) -> R) -> Option<R> {
        self.inner.latest.lock().as_ref().map(f)
    }

    /// Intensity statistics of the latest frame, computed across the
    /// engine's worker threads.
    #[must_use]
    pub fn latest_frame_stats(&self) -> Option<FrameStats> {
        let pixels = self.with_latest_frame(|f| pixels_le(f.data()))??;
        let task = FrameStatsTask::new(&pixels, self.inner.exec.thread_count());
        self.inner.exec.run(&task).ok()?;
        Some(task.finish())
    }

    /// 8-bit preview of the latest frame, contrast-stretched over its
    /// own intensity range.
    #[must_use]
    pub fn latest_preview(&self) -> Option<Vec<u8>> {
        let pixels = self.with_latest_frame(|f| pixels_le(f.data()))??;
        let task = FrameStatsTask::new(&pixels, self.inner.exec.thread_count());
        self.inner.exec.run(&task).ok()?;
        let stats = task.finish();

        let lut = build_lut16(stats.min, stats.max);
        let mut dst = vec![0u8; pixels.len()];
        let task = ApplyLut16Task::new(&pixels, &lut, &mut dst);
        self.inner.exec.run(&task).ok()?;
        Some(dst)
    }
}

fn pixels_le(data: &[u8]) -> Option<Vec<u16>> {
    if data.is_empty() || data.len() % 2 != 0 {
        return None;
    }
    Some(
        data.chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect(),
    )
}

impl<D: CameraDriver> Inner<D> {
    /// EOF callback body, running on the driver's thread. Must never
    /// block: the frame is handed to the bounded queue with try_send
    /// and the newest frame is dropped when the writer cannot keep up.
    fn on_eof(&self, session: &Arc<Session<D::Frame>>, info: FrameInfo, slot: SlotRef) {
        if *self.state.lock() == AcqState::Stopped {
            return;
        }
        if info.frame_nr == 0 {
            error!("callback with invalid frame number 0, ignoring");
            return;
        }
        self.cb_lost.lock().check(info.frame_nr);
        self.captured.fetch_add(1, Ordering::SeqCst);

        let mut frame = session.pool.acquire();
        frame.set_source(slot);
        frame.set_info(info);

        let sent = match self.queue_tx.lock().as_ref() {
            Some(tx) => match tx.try_send(frame) {
                Ok(()) => true,
                Err(TrySendError::Full(frame)) => {
                    warn!(frame_nr = info.frame_nr, "frame queue full, dropping newest");
                    self.queue_dropped.fetch_add(1, Ordering::SeqCst);
                    session.pool.release(frame);
                    true
                }
                Err(TrySendError::Disconnected(frame)) => {
                    session.pool.release(frame);
                    false
                }
            },
            None => false,
        };

        let target = session.settings.frame_count;
        if sent
            && target != 0
            && info.frame_nr >= target
            && *self.state.lock() == AcqState::Capture
            && !self.stop_requested.swap(true, Ordering::SeqCst)
        {
            info!(frame_nr = info.frame_nr, target, "target reached, stopping driver");
            // try_lock: a caller holding the driver lock is stopping
            // already and may be joining this very thread; it (or
            // wait_for_stop) finishes the stop request.
            match self.driver.try_lock() {
                Some(mut driver) => {
                    if let Err(err) = driver.stop_exp() {
                        warn!(%err, "driver stop after target failed");
                    }
                }
                None => debug!("driver busy, stop completed by the stopping caller"),
            }
            self.queue_tx.lock().take();
        }
    }

    fn writer_loop(&self, session: &Arc<Session<D::Frame>>, rx: &Receiver<D::Frame>) {
        let timeout = Duration::from_millis(self.config.writer_timeout_ms);
        let mut storage: Option<SessionWriter> = None;
        let mut storage_failed = false;
        let mut stall_count = 0u32;

        info!("writer thread started");
        loop {
            match rx.recv_timeout(timeout) {
                Ok(mut frame) => {
                    // An explicit stop discards the queued backlog
                    // instead of writing it out.
                    if self.abort.load(Ordering::SeqCst) {
                        frame.reset();
                        session.pool.release(frame);
                        break;
                    }
                    stall_count = 0;
                    self.process_frame(session, frame, &mut storage, &mut storage_failed);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if self.abort.load(Ordering::SeqCst) {
                        break;
                    }
                    stall_count += 1;
                    warn!(stall_count, "no frame within writer timeout");
                    if stall_count >= self.config.stall_threshold
                        && !self.stalled.swap(true, Ordering::SeqCst)
                    {
                        error!(
                            timeouts = stall_count,
                            "acquisition stalled, frames are not arriving"
                        );
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if let Some(mut writer) = storage.take() {
            writer.close();
        }
        *self.state.lock() = AcqState::Stopped;
        info!(
            written = self.written.load(Ordering::SeqCst),
            "writer thread exiting"
        );
    }

    fn process_frame(
        &self,
        session: &Arc<Session<D::Frame>>,
        mut frame: D::Frame,
        storage: &mut Option<SessionWriter>,
        storage_failed: &mut bool,
    ) {
        let info = frame.info();
        self.wr_lost.lock().check(info.frame_nr);
        let state = *self.state.lock();

        let injected = if state == AcqState::Capture {
            self.test_data.lock().clone()
        } else {
            None
        };
        let materialized = match injected {
            Some(bytes) => frame.fill_data(&bytes).is_ok(),
            None => match frame.copy_data() {
                Ok(()) => true,
                Err(err) => {
                    warn!(
                        frame_nr = info.frame_nr,
                        %err,
                        "slot reused before copy, frame dropped"
                    );
                    self.copy_failures.fetch_add(1, Ordering::SeqCst);
                    false
                }
            },
        };
        if !materialized {
            frame.reset();
            session.pool.release(frame);
            return;
        }

        {
            let mut latest = self.latest.lock();
            let slot = latest.get_or_insert_with(|| {
                D::Frame::with_layout(session.frame_bytes, true, Arc::clone(&self.copier))
            });
            if let Err(err) = slot.copy_from(&frame, true) {
                warn!(%err, "latest-frame update failed");
            }
        }

        if state == AcqState::Capture {
            if storage.is_none() && !*storage_failed {
                match SessionWriter::new(
                    std::path::Path::new(&session.settings.file_dir),
                    &session.settings.file_prefix,
                    session.settings.storage_type,
                    session.width,
                    session.height,
                ) {
                    Ok(writer) => *storage = Some(writer),
                    Err(err) => {
                        error!(%err, "cannot open storage, frames will not be saved");
                        *storage_failed = true;
                        self.write_failures.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }
            if let Some(writer) = storage.as_mut() {
                let index = self.written.load(Ordering::SeqCst);
                match writer.write_frame(index, frame.data()) {
                    Ok(()) => {
                        self.written.fetch_add(1, Ordering::SeqCst);
                        debug!(frame_nr = info.frame_nr, index, "frame saved");
                    }
                    Err(err) => {
                        // Best-effort persistence: log and move on.
                        error!(frame_nr = info.frame_nr, %err, "frame write failed");
                        self.write_failures.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }
        }

        session.pool.ensure_size(3);
        frame.reset();
        session.pool.release(frame);
    }
}

impl<D: CameraDriver> Drop for AcquisitionEngine<D> {
    fn drop(&mut self) {
        self.stop();
        self.wait_for_stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cam_core::{AcqMode, CaptureRegion, StorageType, TrigMode};
    use cam_driver_mock::{MockCamera, MockCameraConfig};

    fn fast_config() -> EngineConfig {
        EngineConfig {
            writer_timeout_ms: 50,
            ..EngineConfig::default()
        }
    }

    fn live_settings() -> ExpSettings {
        ExpSettings {
            acq_mode: AcqMode::LiveScan,
            file_dir: String::new(),
            file_prefix: "f_".to_string(),
            region: CaptureRegion::full(16, 16),
            storage_type: StorageType::Tiff,
            spd_table_index: 0,
            exp_time_ms: 1,
            trig_mode: TrigMode::Internal,
            exp_out_mode: cam_core::ExpOutMode::FirstRow,
            frame_count: 0,
            buffer_count: 4,
            wb_scale: [1.0, 1.0, 1.0],
        }
    }

    fn engine() -> AcquisitionEngine<MockCamera> {
        let cam = MockCamera::new(MockCameraConfig {
            frame_interval_ms: 1,
            ..MockCameraConfig::default()
        });
        let engine = AcquisitionEngine::new(cam, fast_config());
        engine.with_driver(|d| d.open()).unwrap();
        engine
    }

    #[test]
    fn start_requires_setup() {
        let engine = engine();
        assert!(matches!(engine.start(false), Err(EngineError::NotConfigured)));
    }

    #[test]
    fn stopped_to_live_scan() {
        let engine = engine();
        engine.setup_exp(&live_settings()).unwrap();
        engine.start(false).unwrap();
        assert_eq!(engine.state(), AcqState::LiveScan);
        engine.stop();
        engine.wait_for_stop();
        assert_eq!(engine.state(), AcqState::Stopped);
    }

    #[test]
    fn live_scan_upgrades_to_capture_in_place() {
        let engine = engine();
        let dir = tempfile::tempdir().unwrap();
        let mut settings = live_settings();
        settings.file_dir = dir.path().display().to_string();
        engine.setup_exp(&settings).unwrap();

        engine.start(false).unwrap();
        assert_eq!(engine.state(), AcqState::LiveScan);
        engine.start(true).unwrap();
        assert_eq!(engine.state(), AcqState::Capture);

        // A second capture request is rejected.
        assert!(matches!(engine.start(true), Err(EngineError::AlreadyCapturing)));
        engine.stop();
        engine.wait_for_stop();
    }

    #[test]
    fn start_false_while_live_is_a_no_op() {
        let engine = engine();
        engine.setup_exp(&live_settings()).unwrap();
        engine.start(false).unwrap();
        engine.start(false).unwrap();
        assert_eq!(engine.state(), AcqState::LiveScan);
        engine.stop();
        engine.wait_for_stop();
    }

    #[test]
    fn setup_rejected_while_running() {
        let engine = engine();
        engine.setup_exp(&live_settings()).unwrap();
        engine.start(false).unwrap();
        assert!(matches!(
            engine.setup_exp(&live_settings()),
            Err(EngineError::Running)
        ));
        engine.stop();
        engine.wait_for_stop();
    }

    #[test]
    fn wait_for_stop_resets_captured_count() {
        let engine = engine();
        engine.setup_exp(&live_settings()).unwrap();
        engine.start(false).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        engine.stop();
        engine.wait_for_stop();
        assert_eq!(engine.frames_captured(), 0);
    }

    #[test]
    fn stop_discards_queued_backlog() {
        let engine = engine();
        let dir = tempfile::tempdir().unwrap();
        let mut settings = live_settings();
        settings.file_dir = dir.path().display().to_string();
        settings.storage_type = StorageType::Raw;
        engine.setup_exp(&settings).unwrap();
        engine.set_test_data(Some(vec![0x55; 16 * 16 * 2]));

        // Five frames already queued when the abort flag lands.
        let session = engine.inner.session.lock().clone().unwrap();
        let (tx, rx) = bounded(8);
        for frame_nr in 1..=5 {
            let mut frame = session.pool.acquire();
            frame.set_info(FrameInfo {
                frame_nr,
                timestamp_bof: 0,
                timestamp_eof: 0,
                readout_time_us: 0,
                exp_time_ms: 1,
                wb_scale: [1.0, 1.0, 1.0],
            });
            tx.send(frame).unwrap();
        }
        drop(tx);

        *engine.inner.state.lock() = AcqState::Capture;
        engine.inner.abort.store(true, Ordering::SeqCst);
        engine.inner.writer_loop(&session, &rx);

        // Nothing from the backlog reaches storage.
        assert_eq!(engine.frames_written(), 0);
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
        assert_eq!(engine.state(), AcqState::Stopped);
    }

    #[test]
    fn live_scan_updates_latest_without_writing() {
        let engine = engine();
        engine.setup_exp(&live_settings()).unwrap();
        engine.start(false).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while engine.with_latest_frame(|_| ()).is_none() {
            assert!(std::time::Instant::now() < deadline, "no frame arrived");
            std::thread::sleep(Duration::from_millis(2));
        }
        engine.stop();
        engine.wait_for_stop();

        assert_eq!(engine.frames_written(), 0);
        let nr = engine.with_latest_frame(|f| f.info().frame_nr).unwrap();
        assert!(nr >= 1);
    }

    #[test]
    fn preview_and_stats_from_latest_frame() {
        let engine = engine();
        engine.setup_exp(&live_settings()).unwrap();
        engine.start(false).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while engine.with_latest_frame(|_| ()).is_none() {
            assert!(std::time::Instant::now() < deadline, "no frame arrived");
            std::thread::sleep(Duration::from_millis(2));
        }
        engine.stop();
        engine.wait_for_stop();

        let stats = engine.latest_frame_stats().unwrap();
        // Mock gradient pattern floors at 100.
        assert!(stats.min >= 100);
        assert!(stats.max >= stats.min);
        assert_eq!(stats.count, 16 * 16);

        let preview = engine.latest_preview().unwrap();
        assert_eq!(preview.len(), 16 * 16);
        assert!(preview.contains(&0));
        assert!(preview.contains(&255));
    }
}
