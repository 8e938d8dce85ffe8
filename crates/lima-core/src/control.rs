//! Control object wrapping a plugin's hardware interface.
//!
//! `CtControl` is what the device server hands out: it owns a shared
//! reference to the [`HwInterface`] and resolves capability handles from the
//! interface's cap list once, at construction.

use anyhow::{anyhow, Result};
use std::sync::Arc;

use crate::capabilities::{BinCtrl, DetInfoCtrl, HwCap, HwInterface, RoiCtrl, SyncCtrl, VideoCtrl};
use crate::hw::{HwCapType, HwStatus, ResetLevel};

/// Control handle over a hardware interface.
#[derive(Clone)]
pub struct CtControl {
    hw: Arc<dyn HwInterface>,
    caps: Vec<HwCap>,
}

impl std::fmt::Debug for CtControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CtControl")
            .field("caps", &self.cap_types())
            .finish_non_exhaustive()
    }
}

impl CtControl {
    pub fn new(hw: Arc<dyn HwInterface>) -> Self {
        let caps = hw.cap_list();
        tracing::debug!(caps = ?caps, "control object created");
        Self { hw, caps }
    }

    /// The wrapped interface.
    pub fn hw_interface(&self) -> &Arc<dyn HwInterface> {
        &self.hw
    }

    /// True when both handles wrap the same interface object.
    pub fn same_interface(&self, other: &CtControl) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.hw), Arc::as_ptr(&other.hw))
    }

    pub fn cap_types(&self) -> Vec<HwCapType> {
        self.caps.iter().map(HwCap::kind).collect()
    }

    pub fn has_cap(&self, kind: HwCapType) -> bool {
        self.caps.iter().any(|c| c.kind() == kind)
    }

    pub fn det_info(&self) -> Result<Arc<dyn DetInfoCtrl>> {
        self.caps
            .iter()
            .find_map(|c| match c {
                HwCap::DetInfo(ctrl) => Some(ctrl.clone()),
                _ => None,
            })
            .ok_or_else(|| anyhow!("Interface has no det_info capability"))
    }

    pub fn sync(&self) -> Result<Arc<dyn SyncCtrl>> {
        self.caps
            .iter()
            .find_map(|c| match c {
                HwCap::Sync(ctrl) => Some(ctrl.clone()),
                _ => None,
            })
            .ok_or_else(|| anyhow!("Interface has no sync capability"))
    }

    pub fn roi(&self) -> Result<Arc<dyn RoiCtrl>> {
        self.caps
            .iter()
            .find_map(|c| match c {
                HwCap::Roi(ctrl) => Some(ctrl.clone()),
                _ => None,
            })
            .ok_or_else(|| anyhow!("Interface has no roi capability"))
    }

    pub fn bin(&self) -> Result<Arc<dyn BinCtrl>> {
        self.caps
            .iter()
            .find_map(|c| match c {
                HwCap::Bin(ctrl) => Some(ctrl.clone()),
                _ => None,
            })
            .ok_or_else(|| anyhow!("Interface has no bin capability"))
    }

    /// Video capability, absent on plain monochrome setups.
    pub fn video(&self) -> Option<Arc<dyn VideoCtrl>> {
        self.caps.iter().find_map(|c| match c {
            HwCap::Video(ctrl) => Some(ctrl.clone()),
            _ => None,
        })
    }

    /// Prepare then start an acquisition of `nb_frames` frames (0 = until stopped).
    pub async fn acquire(&self, nb_frames: u64) -> Result<()> {
        self.sync()?.set_nb_hw_frames(nb_frames).await?;
        self.hw.prepare_acq().await?;
        self.hw.start_acq().await
    }

    pub async fn prepare_acq(&self) -> Result<()> {
        self.hw.prepare_acq().await
    }

    pub async fn start_acq(&self) -> Result<()> {
        self.hw.start_acq().await
    }

    pub async fn stop_acq(&self) -> Result<()> {
        self.hw.stop_acq().await
    }

    pub async fn reset(&self) -> Result<()> {
        self.hw.reset(ResetLevel::SoftReset).await
    }

    pub async fn status(&self) -> Result<HwStatus> {
        self.hw.status().await
    }

    pub async fn nb_hw_acquired_frames(&self) -> Result<u64> {
        self.hw.nb_hw_acquired_frames().await
    }
}
