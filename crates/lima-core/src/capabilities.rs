//! Capability traits implemented by camera plugins.
//!
//! A plugin exposes one [`HwInterface`] that advertises its capabilities as a
//! list of control objects ([`HwCap`]). Each control object covers one concern
//! of the detector:
//!
//! - [`DetInfoCtrl`] - static detector description and image type
//! - [`SyncCtrl`] - trigger mode, exposure, latency, frame count
//! - [`RoiCtrl`] / [`BinCtrl`] - sensor geometry
//! - [`VideoCtrl`] - live mode, pixel layouts and gain for video cameras
//!
//! All traits are async and object-safe (`#[async_trait]`), so the control
//! layer only ever holds `Arc<dyn ...>` handles.
//!
//! Device-specific extras that do not fit a control object are reached
//! through [`Parameterized`] (named observable parameters) and
//! [`Commandable`] (ad-hoc commands with JSON arguments).

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::hw::{
    AutoGainMode, Bin, HwCapType, HwStatus, ImageType, ResetLevel, Roi, Size, TrigMode,
    ValidRanges, VideoMode,
};
use crate::observable::ParameterSet;

/// Capability: detector description.
#[async_trait]
pub trait DetInfoCtrl: Send + Sync {
    async fn max_image_size(&self) -> Result<Size>;
    async fn detector_image_size(&self) -> Result<Size>;
    async fn def_image_type(&self) -> Result<ImageType>;
    async fn curr_image_type(&self) -> Result<ImageType>;
    async fn set_curr_image_type(&self, image_type: ImageType) -> Result<()>;
    /// Pixel pitch (x, y) in metres.
    async fn pixel_size(&self) -> Result<(f64, f64)>;
    async fn detector_type(&self) -> Result<String>;
    async fn detector_model(&self) -> Result<String>;
}

/// Capability: synchronisation.
///
/// # Contract
/// - Times are in seconds
/// - `set_trig_mode` must reject modes for which `check_trig_mode` is false
/// - `nb_hw_frames == 0` means acquire until stopped
#[async_trait]
pub trait SyncCtrl: Send + Sync {
    fn check_trig_mode(&self, mode: TrigMode) -> bool;
    async fn set_trig_mode(&self, mode: TrigMode) -> Result<()>;
    async fn trig_mode(&self) -> Result<TrigMode>;
    async fn set_exp_time(&self, seconds: f64) -> Result<()>;
    async fn exp_time(&self) -> Result<f64>;
    async fn set_lat_time(&self, seconds: f64) -> Result<()>;
    async fn lat_time(&self) -> Result<f64>;
    async fn set_nb_hw_frames(&self, nb_frames: u64) -> Result<()>;
    async fn nb_hw_frames(&self) -> Result<u64>;
    async fn valid_ranges(&self) -> Result<ValidRanges>;
}

/// Capability: region of interest.
#[async_trait]
pub trait RoiCtrl: Send + Sync {
    /// ROI the hardware would actually apply for `requested`.
    async fn check_roi(&self, requested: Roi) -> Result<Roi>;
    async fn set_roi(&self, roi: Roi) -> Result<()>;
    async fn roi(&self) -> Result<Roi>;
}

/// Capability: hardware binning.
#[async_trait]
pub trait BinCtrl: Send + Sync {
    async fn set_bin(&self, bin: Bin) -> Result<()>;
    async fn bin(&self) -> Result<Bin>;
    /// Binning the hardware would actually apply for `requested`.
    async fn check_bin(&self, requested: Bin) -> Result<Bin>;
}

/// Capability: video (live) mode.
#[async_trait]
pub trait VideoCtrl: Send + Sync {
    async fn supported_video_modes(&self) -> Result<Vec<VideoMode>>;
    async fn video_mode(&self) -> Result<VideoMode>;
    async fn set_video_mode(&self, mode: VideoMode) -> Result<()>;
    async fn set_live(&self, live: bool) -> Result<()>;
    async fn is_live(&self) -> Result<bool>;
    /// Normalised gain in `[0, 1]`.
    async fn gain(&self) -> Result<f64>;
    async fn set_gain(&self, gain: f64) -> Result<()>;
    async fn check_bin(&self, requested: Bin) -> Result<Bin>;
    async fn check_roi(&self, requested: Roi) -> Result<Roi>;
    async fn check_auto_gain_mode(&self, mode: AutoGainMode) -> Result<bool>;
    async fn set_hw_auto_gain_mode(&self, mode: AutoGainMode) -> Result<()>;
}

/// One advertised capability.
#[derive(Clone)]
pub enum HwCap {
    DetInfo(Arc<dyn DetInfoCtrl>),
    Sync(Arc<dyn SyncCtrl>),
    Roi(Arc<dyn RoiCtrl>),
    Bin(Arc<dyn BinCtrl>),
    Video(Arc<dyn VideoCtrl>),
}

impl HwCap {
    pub fn kind(&self) -> HwCapType {
        match self {
            HwCap::DetInfo(_) => HwCapType::DetInfo,
            HwCap::Sync(_) => HwCapType::Sync,
            HwCap::Roi(_) => HwCapType::Roi,
            HwCap::Bin(_) => HwCapType::Bin,
            HwCap::Video(_) => HwCapType::Video,
        }
    }
}

impl std::fmt::Debug for HwCap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HwCap({:?})", self.kind())
    }
}

/// Entry point of a camera plugin.
///
/// # Contract
/// - `prepare_acq` is called before every `start_acq`
/// - `reset` stops any running acquisition and clears a fault
/// - `status` never blocks on a running acquisition
#[async_trait]
pub trait HwInterface: Send + Sync {
    fn cap_list(&self) -> Vec<HwCap>;
    async fn reset(&self, level: ResetLevel) -> Result<()>;
    async fn prepare_acq(&self) -> Result<()>;
    async fn start_acq(&self) -> Result<()>;
    async fn stop_acq(&self) -> Result<()>;
    async fn status(&self) -> Result<HwStatus>;
    async fn nb_hw_acquired_frames(&self) -> Result<u64>;
}

/// Capability: named parameters.
pub trait Parameterized: Send + Sync {
    /// Get device's parameter registry
    fn parameters(&self) -> &ParameterSet;
}

/// Capability: device-specific commands.
#[async_trait]
pub trait Commandable: Send + Sync {
    /// Execute a specialized command
    ///
    /// # Arguments
    /// * `command` - Command identifier
    /// * `args` - Command arguments as JSON
    ///
    /// # Returns
    /// - Ok(JSON value) with results
    /// - Err if command unknown or execution failed
    async fn execute_command(
        &self,
        command: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value>;
}
