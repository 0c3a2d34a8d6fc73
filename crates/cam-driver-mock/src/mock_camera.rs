//! The mock camera itself.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};
use std::time::Duration;

use cam_core::buffer::{effective_buffer_count, ring_buffer_bytes};
use cam_core::{
    CameraDriver, DriverError, EofHandler, ExpSettings, Frame, FrameInfo, SensorFrame, SlotHandle,
    SlotRef, SlotRing, SpeedTableEntry,
};
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Configuration for the mock camera.
#[derive(Debug, Clone, Deserialize)]
pub struct MockCameraConfig {
    /// Sensor width in pixels (default: 1920).
    #[serde(default = "default_sensor_width")]
    pub sensor_width: u16,

    /// Sensor height in pixels (default: 1080).
    #[serde(default = "default_sensor_height")]
    pub sensor_height: u16,

    /// Milliseconds between produced frames (default: 10).
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,

    /// Frame numbers to produce but never report, simulating lost EOF
    /// interrupts (default: none).
    #[serde(default)]
    pub dropped_frames: Vec<u32>,

    /// Cap on allocated ring slots regardless of what the sizing
    /// arithmetic derives (default: 64).
    #[serde(default = "default_max_ring_slots")]
    pub max_ring_slots: u32,
}

fn default_sensor_width() -> u16 {
    1920
}
fn default_sensor_height() -> u16 {
    1080
}
fn default_frame_interval_ms() -> u64 {
    10
}
fn default_max_ring_slots() -> u32 {
    64
}

impl Default for MockCameraConfig {
    fn default() -> Self {
        Self {
            sensor_width: 1920,
            sensor_height: 1080,
            frame_interval_ms: 10,
            dropped_frames: Vec::new(),
            max_ring_slots: 64,
        }
    }
}

/// In-process camera: one producer thread, a slot ring, an EOF callback.
pub struct MockCamera {
    name: String,
    config: MockCameraConfig,
    open: bool,
    settings: Option<ExpSettings>,
    frame_bytes: usize,
    ring: Option<Arc<SlotRing>>,
    imaging: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    producer: Option<JoinHandle<()>>,
    producer_thread: Arc<Mutex<Option<ThreadId>>>,
    latest: Arc<Mutex<Option<(SlotHandle, FrameInfo)>>>,
    speed_table: Vec<SpeedTableEntry>,
}

impl MockCamera {
    /// Build a camera with the given configuration.
    #[must_use]
    pub fn new(config: MockCameraConfig) -> Self {
        let speed_table = vec![
            SpeedTableEntry {
                port: 0,
                speed_index: 0,
                bit_depth: 12,
                pix_time_ns: 10,
                gains: vec![1, 2],
                label: "Mock 100 MHz 12-bit".to_string(),
            },
            SpeedTableEntry {
                port: 0,
                speed_index: 1,
                bit_depth: 16,
                pix_time_ns: 20,
                gains: vec![1],
                label: "Mock 50 MHz 16-bit".to_string(),
            },
        ];
        Self {
            name: "mock0".to_string(),
            config,
            open: false,
            settings: None,
            frame_bytes: 0,
            ring: None,
            imaging: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(AtomicBool::new(false)),
            producer: None,
            producer_thread: Arc::new(Mutex::new(None)),
            latest: Arc::new(Mutex::new(None)),
            speed_table,
        }
    }

    /// The slot ring allocated by the last `setup_exp`.
    #[must_use]
    pub fn ring(&self) -> Option<&Arc<SlotRing>> {
        self.ring.as_ref()
    }

    fn join_producer(&mut self) {
        if let Some(handle) = self.producer.take() {
            let producer_id = *self.producer_thread.lock();
            if producer_id == Some(std::thread::current().id()) {
                // Called from inside the EOF callback. The producer
                // exits on its own once the stop flag is seen; joining
                // here would be a self-join. Leave the handle for the
                // next stop/close from another thread.
                self.producer = Some(handle);
                return;
            }
            let _ = handle.join();
            self.imaging.store(false, Ordering::SeqCst);
        }
    }
}

impl CameraDriver for MockCamera {
    type Frame = Frame;

    fn open(&mut self) -> Result<(), DriverError> {
        if self.open {
            return Err(DriverError::AlreadyOpen(self.name.clone()));
        }
        self.open = true;
        info!(camera = %self.name, "mock camera opened");
        Ok(())
    }

    fn close(&mut self) -> Result<(), DriverError> {
        if !self.open {
            return Err(DriverError::NotOpen);
        }
        self.stop.store(true, Ordering::SeqCst);
        self.join_producer();
        self.open = false;
        self.ring = None;
        self.settings = None;
        info!(camera = %self.name, "mock camera closed");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn setup_exp(&mut self, settings: &ExpSettings) -> Result<(), DriverError> {
        if !self.open {
            return Err(DriverError::NotOpen);
        }
        if self.is_imaging() {
            return Err(DriverError::Imaging);
        }
        if settings.spd_table_index >= self.speed_table.len() {
            return Err(DriverError::InvalidSettings(format!(
                "speed index {} out of range",
                settings.spd_table_index
            )));
        }
        let region = settings.region;
        if region.s2 >= self.config.sensor_width
            || region.p2 >= self.config.sensor_height
            || region.s1 > region.s2
            || region.p1 > region.p2
        {
            return Err(DriverError::InvalidSettings(format!(
                "region {region:?} does not fit {}x{} sensor",
                self.config.sensor_width, self.config.sensor_height
            )));
        }

        let frame_bytes = region.pixel_count() * 2;
        let slot_count = effective_buffer_count(settings.buffer_count, frame_bytes);
        if slot_count == 0 {
            return Err(DriverError::BufferSpace(format!(
                "frame of {frame_bytes} bytes exceeds addressable range"
            )));
        }
        let slot_count = slot_count.min(self.config.max_ring_slots);

        debug!(
            frame_bytes,
            slot_count,
            ring_bytes = ring_buffer_bytes(slot_count, frame_bytes),
            "mock exposure configured"
        );

        self.frame_bytes = frame_bytes;
        self.ring = Some(Arc::new(SlotRing::new(slot_count as usize, frame_bytes)));
        self.settings = Some(settings.clone());
        *self.latest.lock() = None;
        Ok(())
    }

    fn start_exp(&mut self, handler: EofHandler) -> Result<(), DriverError> {
        if !self.open {
            return Err(DriverError::NotOpen);
        }
        if self.is_imaging() {
            return Err(DriverError::Imaging);
        }
        let settings = self.settings.clone().ok_or(DriverError::NotConfigured)?;
        let ring = Arc::clone(self.ring.as_ref().ok_or(DriverError::NotConfigured)?);

        self.stop.store(false, Ordering::SeqCst);
        self.imaging.store(true, Ordering::SeqCst);

        let stop = Arc::clone(&self.stop);
        let imaging = Arc::clone(&self.imaging);
        let latest = Arc::clone(&self.latest);
        let producer_thread = Arc::clone(&self.producer_thread);
        let dropped: HashSet<u32> = self.config.dropped_frames.iter().copied().collect();
        let interval = Duration::from_millis(self.config.frame_interval_ms);
        let width = settings.region.width() as u32;
        let height = settings.region.height() as u32;

        let handle = std::thread::Builder::new()
            .name("mock-eof".to_string())
            .spawn(move || {
                *producer_thread.lock() = Some(std::thread::current().id());
                produce_frames(
                    &ring, &stop, &latest, &handler, &settings, &dropped, interval, width, height,
                );
                imaging.store(false, Ordering::SeqCst);
            })
            .map_err(|e| DriverError::Fault(format!("failed to spawn producer: {e}")))?;
        self.producer = Some(handle);
        info!(camera = %self.name, "mock streaming started");
        Ok(())
    }

    fn stop_exp(&mut self) -> Result<(), DriverError> {
        if !self.open {
            return Err(DriverError::NotOpen);
        }
        self.stop.store(true, Ordering::SeqCst);
        self.join_producer();
        Ok(())
    }

    fn is_imaging(&self) -> bool {
        self.imaging.load(Ordering::SeqCst)
    }

    fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    fn get_latest_frame(&self, frame: &mut Frame) -> Result<(), DriverError> {
        let ring = self.ring.as_ref().ok_or(DriverError::NotConfigured)?;
        let latest = *self.latest.lock();
        let (handle, info) =
            latest.ok_or_else(|| DriverError::Fault("no frame produced yet".to_string()))?;
        frame.set_source(SlotRef {
            ring: Arc::clone(ring),
            handle,
        });
        frame
            .copy_data()
            .map_err(|e| DriverError::Fault(e.to_string()))?;
        frame.set_info(info);
        Ok(())
    }

    fn get_frame_exp_time(&self, _frame_nr: u32) -> u32 {
        // Constant-exposure camera; variable-exposure modes would look
        // the number up per frame.
        self.settings.as_ref().map_or(0, |s| s.exp_time_ms)
    }

    fn speed_table(&self) -> &[SpeedTableEntry] {
        &self.speed_table
    }
}

impl Drop for MockCamera {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.join_producer();
    }
}

#[allow(clippy::too_many_arguments)]
fn produce_frames(
    ring: &Arc<SlotRing>,
    stop: &AtomicBool,
    latest: &Mutex<Option<(SlotHandle, FrameInfo)>>,
    handler: &EofHandler,
    settings: &ExpSettings,
    dropped: &HashSet<u32>,
    interval: Duration,
    width: u32,
    height: u32,
) {
    let interval_us = interval.as_micros() as u64;
    let mut slot = 0usize;
    let mut frame_nr = 1u32;

    while !stop.load(Ordering::SeqCst) {
        if settings.frame_count != 0 && frame_nr > settings.frame_count {
            break;
        }
        std::thread::sleep(interval);
        if stop.load(Ordering::SeqCst) {
            break;
        }

        let bytes = crate::pattern::gradient_pattern(width, height, frame_nr);
        let handle = match ring.write_slot(slot, &bytes) {
            Ok(handle) => handle,
            Err(err) => {
                warn!(%err, slot, "ring write failed, stopping producer");
                break;
            }
        };
        slot = (slot + 1) % ring.slot_count();

        let timestamp_bof = u64::from(frame_nr) * interval_us;
        let info = FrameInfo {
            frame_nr,
            timestamp_bof,
            timestamp_eof: timestamp_bof + interval_us / 2,
            readout_time_us: (interval_us / 2) as u32,
            exp_time_ms: settings.exp_time_ms,
            wb_scale: settings.wb_scale,
        };
        *latest.lock() = Some((handle, info));

        if dropped.contains(&frame_nr) {
            debug!(frame_nr, "dropping frame without EOF notification");
        } else {
            (**handler)(
                info,
                SlotRef {
                    ring: Arc::clone(ring),
                    handle,
                },
            );
        }
        frame_nr += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cam_core::{AcqMode, CaptureRegion, SerialCopier};
    use std::time::Instant;

    fn settings(frame_count: u32) -> ExpSettings {
        ExpSettings {
            acq_mode: AcqMode::LiveScan,
            file_dir: String::new(),
            file_prefix: "f_".to_string(),
            region: CaptureRegion::full(16, 16),
            storage_type: cam_core::StorageType::Tiff,
            spd_table_index: 0,
            exp_time_ms: 5,
            trig_mode: cam_core::TrigMode::Internal,
            exp_out_mode: cam_core::ExpOutMode::FirstRow,
            frame_count,
            buffer_count: 4,
            wb_scale: [1.0, 1.0, 1.0],
        }
    }

    fn wait_until_idle(cam: &MockCamera) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while cam.is_imaging() {
            assert!(Instant::now() < deadline, "producer never finished");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn open_is_exclusive() {
        let mut cam = MockCamera::new(MockCameraConfig::default());
        cam.open().unwrap();
        assert!(matches!(cam.open(), Err(DriverError::AlreadyOpen(_))));
        cam.close().unwrap();
        assert!(matches!(cam.close(), Err(DriverError::NotOpen)));
    }

    #[test]
    fn setup_computes_frame_geometry() {
        let mut cam = MockCamera::new(MockCameraConfig::default());
        cam.open().unwrap();
        cam.setup_exp(&settings(0)).unwrap();
        assert_eq!(cam.frame_bytes(), 16 * 16 * 2);
        assert_eq!(cam.ring().unwrap().slot_count(), 4);
    }

    #[test]
    fn setup_rejects_bad_region() {
        let mut cam = MockCamera::new(MockCameraConfig {
            sensor_width: 8,
            sensor_height: 8,
            ..MockCameraConfig::default()
        });
        cam.open().unwrap();
        let err = cam.setup_exp(&settings(0)).unwrap_err();
        assert!(matches!(err, DriverError::InvalidSettings(_)));
    }

    #[test]
    fn start_requires_setup() {
        let mut cam = MockCamera::new(MockCameraConfig::default());
        cam.open().unwrap();
        let handler: EofHandler = Arc::new(|_, _| {});
        assert!(matches!(
            cam.start_exp(handler),
            Err(DriverError::NotConfigured)
        ));
    }

    #[test]
    fn streams_all_frames_except_dropped() {
        let mut cam = MockCamera::new(MockCameraConfig {
            frame_interval_ms: 1,
            dropped_frames: vec![3],
            ..MockCameraConfig::default()
        });
        cam.open().unwrap();
        cam.setup_exp(&settings(6)).unwrap();

        let (tx, rx) = crossbeam_channel::unbounded::<u32>();
        let handler: EofHandler = Arc::new(move |info, _slot| {
            let _ = tx.send(info.frame_nr);
        });
        cam.start_exp(handler).unwrap();
        wait_until_idle(&cam);
        cam.stop_exp().unwrap();

        let seen: Vec<u32> = rx.try_iter().collect();
        assert_eq!(seen, vec![1, 2, 4, 5, 6]);
    }

    #[test]
    fn latest_frame_holds_newest_pattern() {
        let mut cam = MockCamera::new(MockCameraConfig {
            frame_interval_ms: 1,
            ..MockCameraConfig::default()
        });
        cam.open().unwrap();
        cam.setup_exp(&settings(3)).unwrap();
        cam.start_exp(Arc::new(|_, _| {})).unwrap();
        wait_until_idle(&cam);
        cam.stop_exp().unwrap();

        let mut frame = Frame::new(cam.frame_bytes(), true, Arc::new(SerialCopier));
        cam.get_latest_frame(&mut frame).unwrap();
        assert_eq!(frame.info().frame_nr, 3);
        let expect = crate::pattern::gradient_pattern(16, 16, 3);
        assert_eq!(frame.data(), expect.as_slice());
    }

    #[test]
    fn setup_while_imaging_rejected() {
        let mut cam = MockCamera::new(MockCameraConfig {
            frame_interval_ms: 5,
            ..MockCameraConfig::default()
        });
        cam.open().unwrap();
        cam.setup_exp(&settings(0)).unwrap();
        cam.start_exp(Arc::new(|_, _| {})).unwrap();
        assert!(matches!(
            cam.setup_exp(&settings(0)),
            Err(DriverError::Imaging)
        ));
        cam.stop_exp().unwrap();
        assert!(!cam.is_imaging());
    }
}
