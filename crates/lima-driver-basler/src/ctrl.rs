//! Control objects exposing a [`Camera`] through the Lima capability traits.

use crate::camera::Camera;
use anyhow::Result;
use async_trait::async_trait;
use lima_core::capabilities::{BinCtrl, DetInfoCtrl, RoiCtrl, SyncCtrl, VideoCtrl};
use lima_core::hw::{
    AutoGainMode, Bin, ImageType, Roi, Size, TrigMode, ValidRanges, VideoMode,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct DetInfoCtrlObj {
    cam: Arc<Camera>,
}

impl DetInfoCtrlObj {
    pub fn new(cam: Arc<Camera>) -> Self {
        Self { cam }
    }
}

#[async_trait]
impl DetInfoCtrl for DetInfoCtrlObj {
    async fn max_image_size(&self) -> Result<Size> {
        self.cam.detector_image_size().await
    }

    async fn detector_image_size(&self) -> Result<Size> {
        self.cam.detector_image_size().await
    }

    async fn def_image_type(&self) -> Result<ImageType> {
        self.cam.image_type().await
    }

    async fn curr_image_type(&self) -> Result<ImageType> {
        self.cam.image_type().await
    }

    async fn set_curr_image_type(&self, image_type: ImageType) -> Result<()> {
        self.cam.set_image_type(image_type).await
    }

    async fn pixel_size(&self) -> Result<(f64, f64)> {
        Ok(self.cam.pixel_size())
    }

    async fn detector_type(&self) -> Result<String> {
        Ok(self.cam.detector_type())
    }

    async fn detector_model(&self) -> Result<String> {
        Ok(self.cam.detector_model())
    }
}

pub struct SyncCtrlObj {
    cam: Arc<Camera>,
}

impl SyncCtrlObj {
    pub fn new(cam: Arc<Camera>) -> Self {
        Self { cam }
    }
}

#[async_trait]
impl SyncCtrl for SyncCtrlObj {
    fn check_trig_mode(&self, mode: TrigMode) -> bool {
        Camera::check_trig_mode(mode)
    }

    async fn set_trig_mode(&self, mode: TrigMode) -> Result<()> {
        self.cam.set_trig_mode(mode).await
    }

    async fn trig_mode(&self) -> Result<TrigMode> {
        self.cam.trig_mode().await
    }

    async fn set_exp_time(&self, seconds: f64) -> Result<()> {
        self.cam.set_exp_time(seconds).await
    }

    async fn exp_time(&self) -> Result<f64> {
        self.cam.exp_time().await
    }

    async fn set_lat_time(&self, seconds: f64) -> Result<()> {
        self.cam.set_lat_time(seconds);
        Ok(())
    }

    async fn lat_time(&self) -> Result<f64> {
        Ok(self.cam.lat_time())
    }

    async fn set_nb_hw_frames(&self, nb_frames: u64) -> Result<()> {
        self.cam.set_nb_frames(nb_frames);
        Ok(())
    }

    async fn nb_hw_frames(&self) -> Result<u64> {
        Ok(self.cam.nb_frames())
    }

    async fn valid_ranges(&self) -> Result<ValidRanges> {
        let (min_exp_time, max_exp_time) = self.cam.exp_time_range().await?;
        let (min_lat_time, max_lat_time) = self.cam.lat_time_range();
        Ok(ValidRanges {
            min_exp_time,
            max_exp_time,
            min_lat_time,
            max_lat_time,
        })
    }
}

pub struct RoiCtrlObj {
    cam: Arc<Camera>,
}

impl RoiCtrlObj {
    pub fn new(cam: Arc<Camera>) -> Self {
        Self { cam }
    }
}

#[async_trait]
impl RoiCtrl for RoiCtrlObj {
    async fn check_roi(&self, requested: Roi) -> Result<Roi> {
        Ok(self.cam.check_roi(requested))
    }

    async fn set_roi(&self, roi: Roi) -> Result<()> {
        let checked = self.cam.check_roi(roi);
        self.cam.set_roi(checked).await
    }

    async fn roi(&self) -> Result<Roi> {
        self.cam.roi().await
    }
}

pub struct BinCtrlObj {
    cam: Arc<Camera>,
}

impl BinCtrlObj {
    pub fn new(cam: Arc<Camera>) -> Self {
        Self { cam }
    }
}

#[async_trait]
impl BinCtrl for BinCtrlObj {
    async fn set_bin(&self, bin: Bin) -> Result<()> {
        self.cam.set_bin(bin).await
    }

    async fn bin(&self) -> Result<Bin> {
        self.cam.bin().await
    }

    async fn check_bin(&self, requested: Bin) -> Result<Bin> {
        self.cam.check_bin(requested).await
    }
}

/// Live mode and pixel layout for colour (or forced video) cameras.
pub struct VideoCtrlObj {
    cam: Arc<Camera>,
    live: AtomicBool,
}

impl VideoCtrlObj {
    pub fn new(cam: Arc<Camera>) -> Self {
        Self {
            cam,
            live: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl VideoCtrl for VideoCtrlObj {
    async fn supported_video_modes(&self) -> Result<Vec<VideoMode>> {
        self.cam.supported_video_modes().await
    }

    async fn video_mode(&self) -> Result<VideoMode> {
        self.cam.video_mode().await
    }

    async fn set_video_mode(&self, mode: VideoMode) -> Result<()> {
        self.cam.set_video_mode(mode).await
    }

    async fn set_live(&self, live: bool) -> Result<()> {
        if live {
            self.cam.set_nb_frames(0);
            self.cam.prepare_acq().await?;
            self.cam.start_acq().await?;
        } else {
            self.cam.stop_acq().await?;
        }
        self.live.store(live, Ordering::SeqCst);
        Ok(())
    }

    async fn is_live(&self) -> Result<bool> {
        Ok(self.live.load(Ordering::SeqCst))
    }

    async fn gain(&self) -> Result<f64> {
        self.cam.gain().current().await
    }

    async fn set_gain(&self, gain: f64) -> Result<()> {
        self.cam.gain().set(gain).await
    }

    async fn check_bin(&self, _requested: Bin) -> Result<Bin> {
        Ok(Bin::default())
    }

    async fn check_roi(&self, _requested: Roi) -> Result<Roi> {
        Ok(Roi::full(self.cam.detector_image_size().await?))
    }

    async fn check_auto_gain_mode(&self, mode: AutoGainMode) -> Result<bool> {
        match mode {
            AutoGainMode::Off => Ok(true),
            AutoGainMode::On => Ok(self.cam.has_auto_gain().await),
        }
    }

    async fn set_hw_auto_gain_mode(&self, mode: AutoGainMode) -> Result<()> {
        self.cam.autogain().set(mode == AutoGainMode::On).await
    }
}
