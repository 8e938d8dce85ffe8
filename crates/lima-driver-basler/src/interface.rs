//! Lima hardware interface for a Basler camera.

use crate::camera::Camera;
use crate::components::acquisition::CameraStatus;
use crate::ctrl::{BinCtrlObj, DetInfoCtrlObj, RoiCtrlObj, SyncCtrlObj, VideoCtrlObj};
use anyhow::Result;
use async_trait::async_trait;
use lima_core::capabilities::{HwCap, HwInterface};
use lima_core::hw::{AcqStatus, DetStatus, HwStatus, ResetLevel};
use std::sync::Arc;

/// Map a camera status onto the acquisition/detector status pair.
pub fn hw_status(status: CameraStatus) -> HwStatus {
    let (acq, det) = match status {
        CameraStatus::Ready => (AcqStatus::AcqReady, DetStatus::IDLE),
        CameraStatus::Exposure => (AcqStatus::AcqRunning, DetStatus::EXPOSURE),
        CameraStatus::Readout => (AcqStatus::AcqRunning, DetStatus::READOUT),
        CameraStatus::Latency => (AcqStatus::AcqRunning, DetStatus::LATENCY),
        CameraStatus::Fault => (AcqStatus::AcqFault, DetStatus::FAULT),
    };
    HwStatus {
        acq,
        det,
        det_mask: DetStatus::EXPOSURE | DetStatus::READOUT | DetStatus::LATENCY,
    }
}

pub struct Interface {
    cam: Arc<Camera>,
    det_info: Arc<DetInfoCtrlObj>,
    sync: Arc<SyncCtrlObj>,
    roi: Arc<RoiCtrlObj>,
    bin: Arc<BinCtrlObj>,
    video: Option<Arc<VideoCtrlObj>>,
    force_video_mode: bool,
}

impl std::fmt::Debug for Interface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interface")
            .field("cam", &self.cam)
            .field("video", &self.video.is_some())
            .field("force_video_mode", &self.force_video_mode)
            .finish()
    }
}

impl Interface {
    /// Video control is published for colour cameras, or for any camera
    /// when `force_video_mode` is set.
    pub fn new(cam: Arc<Camera>, force_video_mode: bool) -> Self {
        let video = (force_video_mode || cam.is_color())
            .then(|| Arc::new(VideoCtrlObj::new(cam.clone())));
        tracing::debug!(
            force_video_mode,
            video = video.is_some(),
            "Basler interface created"
        );
        Self {
            det_info: Arc::new(DetInfoCtrlObj::new(cam.clone())),
            sync: Arc::new(SyncCtrlObj::new(cam.clone())),
            roi: Arc::new(RoiCtrlObj::new(cam.clone())),
            bin: Arc::new(BinCtrlObj::new(cam.clone())),
            video,
            cam,
            force_video_mode,
        }
    }

    pub fn camera(&self) -> &Arc<Camera> {
        &self.cam
    }

    pub fn force_video_mode(&self) -> bool {
        self.force_video_mode
    }

    pub fn set_blank_image_for_missed(&self, enabled: bool) {
        self.cam.set_blank_image_for_missed(enabled);
    }

    pub fn blank_image_for_missed(&self) -> bool {
        self.cam.blank_image_for_missed()
    }
}

#[async_trait]
impl HwInterface for Interface {
    fn cap_list(&self) -> Vec<HwCap> {
        let mut caps = vec![
            HwCap::DetInfo(self.det_info.clone()),
            HwCap::Sync(self.sync.clone()),
            HwCap::Roi(self.roi.clone()),
            HwCap::Bin(self.bin.clone()),
        ];
        if let Some(video) = &self.video {
            caps.push(HwCap::Video(video.clone()));
        }
        caps
    }

    async fn reset(&self, level: ResetLevel) -> Result<()> {
        tracing::debug!(?level, "reset");
        self.cam.reset().await
    }

    async fn prepare_acq(&self) -> Result<()> {
        self.cam.prepare_acq().await
    }

    async fn start_acq(&self) -> Result<()> {
        self.cam.start_acq().await
    }

    async fn stop_acq(&self) -> Result<()> {
        self.cam.stop_acq().await
    }

    async fn status(&self) -> Result<HwStatus> {
        Ok(hw_status(self.cam.status()))
    }

    async fn nb_hw_acquired_frames(&self) -> Result<u64> {
        Ok(self.cam.nb_hw_acquired_frames())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let ready = hw_status(CameraStatus::Ready);
        assert_eq!(ready.acq, AcqStatus::AcqReady);
        assert_eq!(ready.det, DetStatus::IDLE);

        let readout = hw_status(CameraStatus::Readout);
        assert_eq!(readout.acq, AcqStatus::AcqRunning);
        assert!(readout.det.contains(DetStatus::READOUT));

        let fault = hw_status(CameraStatus::Fault);
        assert_eq!(fault.acq, AcqStatus::AcqFault);
        assert!(fault.det.contains(DetStatus::FAULT));
        assert!(!fault.det_mask.contains(DetStatus::FAULT));
        assert!(fault.det_mask.contains(DetStatus::LATENCY));
    }
}
