//! Hardware-level value types exchanged between a camera plugin and the
//! control layer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Region of interest on the sensor.
///
/// A zero-sized ROI is inactive and means "full frame".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Roi {
    /// X offset (pixels)
    pub x: u32,
    /// Y offset (pixels)
    pub y: u32,
    /// Width (pixels)
    pub width: u32,
    /// Height (pixels)
    pub height: u32,
}

impl Roi {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Full-frame ROI for a detector of the given size.
    pub fn full(size: Size) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    pub fn is_active(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl fmt::Display for Roi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{},{}>-<{}x{}>", self.x, self.y, self.width, self.height)
    }
}

/// Hardware binning factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bin {
    pub x: u32,
    pub y: u32,
}

impl Bin {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    pub fn is_one(&self) -> bool {
        self.x == 1 && self.y == 1
    }
}

impl Default for Bin {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

/// Trigger modes understood by the control layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrigMode {
    IntTrig,
    IntTrigMult,
    ExtTrigSingle,
    ExtTrigMult,
    ExtGate,
    ExtStartStop,
    ExtTrigReadout,
}

impl TrigMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrigMode::IntTrig => "IntTrig",
            TrigMode::IntTrigMult => "IntTrigMult",
            TrigMode::ExtTrigSingle => "ExtTrigSingle",
            TrigMode::ExtTrigMult => "ExtTrigMult",
            TrigMode::ExtGate => "ExtGate",
            TrigMode::ExtStartStop => "ExtStartStop",
            TrigMode::ExtTrigReadout => "ExtTrigReadout",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "IntTrig" => Some(TrigMode::IntTrig),
            "IntTrigMult" => Some(TrigMode::IntTrigMult),
            "ExtTrigSingle" => Some(TrigMode::ExtTrigSingle),
            "ExtTrigMult" => Some(TrigMode::ExtTrigMult),
            "ExtGate" => Some(TrigMode::ExtGate),
            "ExtStartStop" => Some(TrigMode::ExtStartStop),
            "ExtTrigReadout" => Some(TrigMode::ExtTrigReadout),
            _ => None,
        }
    }
}

/// Pixel depth of the frames delivered by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageType {
    Bpp8,
    Bpp10,
    Bpp12,
    Bpp16,
}

impl ImageType {
    /// Bytes used to store one pixel.
    pub fn depth(&self) -> usize {
        match self {
            ImageType::Bpp8 => 1,
            ImageType::Bpp10 | ImageType::Bpp12 | ImageType::Bpp16 => 2,
        }
    }
}

/// Pixel layouts a video-capable camera can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VideoMode {
    Y8,
    Y16,
    BayerRg8,
    BayerBg8,
    BayerRg16,
    BayerBg16,
    Rgb24,
    Bgr24,
    Rgb32,
    Bgr32,
    Yuv411Packed,
    Yuv422Packed,
    Yuv444Packed,
}

/// Automatic gain control requested by the video layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutoGainMode {
    Off,
    On,
}

/// Acquisition-level status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcqStatus {
    AcqReady,
    AcqRunning,
    AcqFault,
}

/// Detector-level status bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DetStatus(u32);

impl DetStatus {
    pub const IDLE: DetStatus = DetStatus(0);
    pub const FAULT: DetStatus = DetStatus(1 << 0);
    pub const WAIT_FOR_TRIGGER: DetStatus = DetStatus(1 << 1);
    pub const SHUTTER_OPEN: DetStatus = DetStatus(1 << 2);
    pub const EXPOSURE: DetStatus = DetStatus(1 << 3);
    pub const SHUTTER_CLOSE: DetStatus = DetStatus(1 << 4);
    pub const CHARGE_SHIFT: DetStatus = DetStatus(1 << 5);
    pub const READOUT: DetStatus = DetStatus(1 << 6);
    pub const LATENCY: DetStatus = DetStatus(1 << 7);

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: DetStatus) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for DetStatus {
    type Output = DetStatus;

    fn bitor(self, rhs: DetStatus) -> DetStatus {
        DetStatus(self.0 | rhs.0)
    }
}

/// Combined status reported by a hardware interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HwStatus {
    pub acq: AcqStatus,
    pub det: DetStatus,
    /// Detector bits the plugin actually reports.
    pub det_mask: DetStatus,
}

impl Default for HwStatus {
    fn default() -> Self {
        Self {
            acq: AcqStatus::AcqReady,
            det: DetStatus::IDLE,
            det_mask: DetStatus::IDLE,
        }
    }
}

/// Reset depth requested by the control layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetLevel {
    SoftReset,
    HardReset,
}

/// Exposure/latency limits in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidRanges {
    pub min_exp_time: f64,
    pub max_exp_time: f64,
    pub min_lat_time: f64,
    pub max_lat_time: f64,
}

/// Capability kinds an interface can advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HwCapType {
    DetInfo,
    Sync,
    Roi,
    Bin,
    Video,
}

/// Bookkeeping attached to each delivered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HwFrameInfo {
    /// Frame index since the last `prepare_acq`.
    pub acq_frame_nb: u64,
    /// True when the frame stands in for a missed one.
    pub blank: bool,
}

/// Frame delivered by a camera plugin.
#[derive(Debug, Clone)]
pub struct Frame {
    pub info: HwFrameInfo,
    pub size: Size,
    pub image_type: ImageType,
    pub data: Vec<u8>,
}

impl Frame {
    /// Zero-filled frame used in place of a missed one.
    pub fn blank(acq_frame_nb: u64, size: Size, image_type: ImageType) -> Self {
        let len = size.width as usize * size.height as usize * image_type.depth();
        Self {
            info: HwFrameInfo {
                acq_frame_nb,
                blank: true,
            },
            size,
            image_type,
            data: vec![0; len],
        }
    }
}
