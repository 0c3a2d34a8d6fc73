//! Exposure session settings.
//!
//! An [`ExpSettings`] is built once by the caller, validated by the
//! driver's `setup_exp`, and read-only to the engine afterwards.
//! Settings are plain serde types so sessions can be described in TOML.

use serde::{Deserialize, Serialize};

/// Acquisition mode for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcqMode {
    /// Continuous preview, nothing written to disk.
    LiveScan,
    /// Continuous capture with every frame written to disk.
    SnapSequence,
    /// Continuous capture until the caller stops it.
    SnapCircBuffer,
    /// Time-lapse variant of [`AcqMode::SnapSequence`].
    SnapTimeLapse,
    /// Time-lapse preview without storage.
    LiveTimeLapse,
}

impl AcqMode {
    /// Whether this mode streams frames to storage.
    #[must_use]
    pub fn saves_to_disk(self) -> bool {
        !matches!(self, AcqMode::LiveScan | AcqMode::LiveTimeLapse)
    }
}

/// On-disk layout for saved frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    /// One TIFF file per frame.
    Tiff,
    /// One multi-page TIFF per session.
    TiffStack,
    /// One BigTIFF file per frame (64-bit offsets).
    BigTiff,
    /// One flat binary file per frame.
    Raw,
    /// Vendor raw-data passthrough. Reserved, not implemented.
    Prd,
}

impl StorageType {
    /// File extension used for this layout.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            StorageType::Tiff | StorageType::TiffStack | StorageType::BigTiff => "tiff",
            StorageType::Raw | StorageType::Prd => "raw",
        }
    }

    /// Whether one file serves the whole session.
    #[must_use]
    pub fn is_stack(self) -> bool {
        matches!(self, StorageType::TiffStack)
    }
}

/// Sensor region of interest with per-axis binning.
///
/// Coordinates are inclusive sensor pixel indices, pre-binning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRegion {
    /// First column.
    pub s1: u16,
    /// Last column (inclusive).
    pub s2: u16,
    /// Horizontal binning factor.
    #[serde(default = "default_bin")]
    pub sbin: u16,
    /// First row.
    pub p1: u16,
    /// Last row (inclusive).
    pub p2: u16,
    /// Vertical binning factor.
    #[serde(default = "default_bin")]
    pub pbin: u16,
}

fn default_bin() -> u16 {
    1
}

impl CaptureRegion {
    /// Full-sensor region for a `width` x `height` sensor, unbinned.
    #[must_use]
    pub fn full(width: u16, height: u16) -> Self {
        Self {
            s1: 0,
            s2: width.saturating_sub(1),
            sbin: 1,
            p1: 0,
            p2: height.saturating_sub(1),
            pbin: 1,
        }
    }

    /// Binned output width in pixels.
    #[must_use]
    pub fn width(&self) -> usize {
        let span = usize::from(self.s2.saturating_sub(self.s1)) + 1;
        span / usize::from(self.sbin.max(1))
    }

    /// Binned output height in pixels.
    #[must_use]
    pub fn height(&self) -> usize {
        let span = usize::from(self.p2.saturating_sub(self.p1)) + 1;
        span / usize::from(self.pbin.max(1))
    }

    /// Binned output pixel count.
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.width() * self.height()
    }
}

/// One row of a camera's readout speed table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedTableEntry {
    /// Readout port index.
    pub port: u32,
    /// Speed index within the port.
    pub speed_index: u16,
    /// Pixel bit depth at this speed.
    pub bit_depth: u16,
    /// Pixel clock period in nanoseconds.
    pub pix_time_ns: u16,
    /// Available gain indices at this speed.
    pub gains: Vec<u16>,
    /// Human-readable label.
    pub label: String,
}

/// Hardware trigger mode requested for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrigMode {
    /// Free-running internal timing.
    Internal,
    /// One hardware trigger starts the whole sequence.
    TrigFirst,
    /// Each frame waits for its own edge.
    Edge,
}

/// Exposure-output signal mode (what the camera drives on its sync pin).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpOutMode {
    /// High while the first row is exposing.
    FirstRow,
    /// High while any row is exposing.
    AnyRow,
    /// High while all rows are exposing simultaneously.
    AllRows,
}

/// Complete description of one capture session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpSettings {
    /// Acquisition mode.
    pub acq_mode: AcqMode,
    /// Output directory for saved frames.
    #[serde(default)]
    pub file_dir: String,
    /// File name prefix; per-frame files append a zero-padded index.
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    /// Sensor region and binning.
    pub region: CaptureRegion,
    /// On-disk layout when saving.
    #[serde(default = "default_storage_type")]
    pub storage_type: StorageType,
    /// Index into the camera's speed table.
    #[serde(default)]
    pub spd_table_index: usize,
    /// Exposure time per frame in milliseconds.
    pub exp_time_ms: u32,
    /// Trigger mode.
    #[serde(default = "default_trig_mode")]
    pub trig_mode: TrigMode,
    /// Exposure-output mode.
    #[serde(default = "default_exp_out_mode")]
    pub exp_out_mode: ExpOutMode,
    /// Frames to capture; 0 means unbounded (until stopped).
    #[serde(default)]
    pub frame_count: u32,
    /// Requested ring-buffer slot count; 0 derives the maximum that
    /// fits the driver's addressable range.
    #[serde(default = "default_buffer_count")]
    pub buffer_count: u32,
    /// White-balance scale factors (R, G, B) recorded into frame
    /// metadata for color cameras.
    #[serde(default = "default_wb_scale")]
    pub wb_scale: [f32; 3],
}

fn default_file_prefix() -> String {
    "frame_".to_string()
}

fn default_storage_type() -> StorageType {
    StorageType::Tiff
}

fn default_trig_mode() -> TrigMode {
    TrigMode::Internal
}

fn default_exp_out_mode() -> ExpOutMode {
    ExpOutMode::FirstRow
}

fn default_buffer_count() -> u32 {
    16
}

fn default_wb_scale() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

impl ExpSettings {
    /// Parse settings from a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}
