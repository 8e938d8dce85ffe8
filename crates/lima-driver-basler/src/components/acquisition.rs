//! Basler Acquisition Logic
//!
//! Grab loop, camera status and buffer statistics.
//!
//! One grab task runs per started acquisition. Each iteration waits for the
//! next stream-grabber result with a timeout:
//!
//! | result | effect |
//! |--------|--------|
//! | grabbed | status `Readout`, frame published, counter incremented |
//! | failed, blank images enabled | zero-filled frame published in its place |
//! | failed, live (`nb_frames == 0`) | ignored |
//! | failed, snap | status `Fault`, loop ends |
//! | timeout | status `Fault`, loop ends |
//!
//! On exit the grabber is finished, `AcquisitionStop` executed and the status
//! returns to `Ready` unless a fault was recorded.

use crate::components::connection::{BaslerConnection, GrabResult, StreamGrabber};
use crate::components::features::nodes;
use anyhow::{bail, Result};
use lima_core::hw::{Frame, HwFrameInfo, ImageType, Size};
use lima_core::parameter::Parameter;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;

/// Camera-level acquisition status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraStatus {
    Ready,
    Exposure,
    Readout,
    Latency,
    Fault,
}

/// Per-acquisition grab parameters, fixed at start.
#[derive(Debug, Clone, Copy)]
pub struct GrabSettings {
    pub size: Size,
    pub image_type: ImageType,
    pub nb_frames: u64,
    pub timeout: Duration,
}

struct GrabTask {
    handle: JoinHandle<()>,
    stop_tx: Option<oneshot::Sender<()>>,
}

/// State shared between the camera and its grab task.
pub struct AcquisitionState {
    status: parking_lot::Mutex<CameraStatus>,
    blank_image_for_missed: AtomicBool,
    total_buffers: AtomicU64,
    failed_buffers: AtomicU64,
}

impl AcquisitionState {
    fn new() -> Self {
        Self {
            status: parking_lot::Mutex::new(CameraStatus::Ready),
            blank_image_for_missed: AtomicBool::new(false),
            total_buffers: AtomicU64::new(0),
            failed_buffers: AtomicU64::new(0),
        }
    }

    pub fn status(&self) -> CameraStatus {
        *self.status.lock()
    }

    /// Buffers retrieved from the grabber, failed ones included.
    pub fn total_buffer_count(&self) -> u64 {
        self.total_buffers.load(Ordering::SeqCst)
    }

    pub fn failed_buffer_count(&self) -> u64 {
        self.failed_buffers.load(Ordering::SeqCst)
    }

    /// Update the status. `Fault` is kept unless `force` is set.
    pub fn set_status(&self, status: CameraStatus, force: bool) {
        let mut current = self.status.lock();
        if force || *current != CameraStatus::Fault {
            *current = status;
        }
    }
}

pub struct BaslerAcquisition {
    pub streaming: Parameter<bool>,
    pub frame_count: Arc<AtomicU64>,
    pub frame_tx: broadcast::Sender<Arc<Frame>>,
    state: Arc<AcquisitionState>,
    poll_handle: Arc<Mutex<Option<GrabTask>>>,
}

impl Default for BaslerAcquisition {
    fn default() -> Self {
        Self::new()
    }
}

impl BaslerAcquisition {
    pub fn new() -> Self {
        let (frame_tx, _) = broadcast::channel(16);
        Self {
            streaming: Parameter::new("streaming", false)
                .with_description("Grab task running")
                .read_only(),
            frame_count: Arc::new(AtomicU64::new(0)),
            frame_tx,
            state: Arc::new(AcquisitionState::new()),
            poll_handle: Arc::new(Mutex::new(None)),
        }
    }

    pub fn state(&self) -> &Arc<AcquisitionState> {
        &self.state
    }

    pub fn status(&self) -> CameraStatus {
        self.state.status()
    }

    pub fn set_status(&self, status: CameraStatus, force: bool) {
        self.state.set_status(status, force);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Frame>> {
        self.frame_tx.subscribe()
    }

    pub fn set_blank_image_for_missed(&self, enabled: bool) {
        self.state.blank_image_for_missed.store(enabled, Ordering::SeqCst);
    }

    pub fn blank_image_for_missed(&self) -> bool {
        self.state.blank_image_for_missed.load(Ordering::SeqCst)
    }

    pub fn total_buffer_count(&self) -> u64 {
        self.state.total_buffer_count()
    }

    pub fn failed_buffer_count(&self) -> u64 {
        self.state.failed_buffer_count()
    }

    /// Frames delivered since the last `reset_frame_count`.
    pub fn acquired_frames(&self) -> u64 {
        self.frame_count.load(Ordering::SeqCst)
    }

    pub fn reset_frame_count(&self) {
        self.frame_count.store(0, Ordering::SeqCst);
    }

    /// True while a grab task is alive.
    pub async fn is_running(&self) -> bool {
        self.poll_handle
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Spawn the grab task over an already opened stream grabber.
    ///
    /// The caller must have executed `AcquisitionStart` on the device.
    pub async fn start_stream(
        &self,
        connection: Arc<Mutex<BaslerConnection>>,
        grabber: Box<dyn StreamGrabber>,
        settings: GrabSettings,
    ) -> Result<()> {
        let mut slot = self.poll_handle.lock().await;
        if slot.as_ref().is_some_and(|task| !task.handle.is_finished()) {
            bail!("Acquisition already running");
        }

        self.streaming.update_from_hardware(true).await;
        // a new run clears a fault left by the previous one
        self.state.set_status(CameraStatus::Exposure, true);

        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(grab_loop(
            connection,
            grabber,
            settings,
            self.state.clone(),
            self.frame_count.clone(),
            self.frame_tx.clone(),
            self.streaming.clone(),
            stop_rx,
        ));
        *slot = Some(GrabTask {
            handle,
            stop_tx: Some(stop_tx),
        });
        tracing::debug!(nb_frames = settings.nb_frames, "grab task started");
        Ok(())
    }

    /// Stop the grab task and wait for it to exit.
    pub async fn stop_stream(&self) -> Result<()> {
        let task = self.poll_handle.lock().await.take();
        if let Some(mut task) = task {
            if let Some(stop_tx) = task.stop_tx.take() {
                // the task may already be gone
                let _ = stop_tx.send(());
            }
            if let Err(e) = task.handle.await {
                tracing::error!("Grab task ended abnormally: {}", e);
            }
        }
        self.streaming.update_from_hardware(false).await;
        self.state.set_status(CameraStatus::Ready, false);
        Ok(())
    }
}

impl Drop for BaslerAcquisition {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.poll_handle.try_lock() {
            if let Some(task) = slot.take() {
                task.handle.abort();
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn grab_loop(
    connection: Arc<Mutex<BaslerConnection>>,
    mut grabber: Box<dyn StreamGrabber>,
    settings: GrabSettings,
    state: Arc<AcquisitionState>,
    frame_count: Arc<AtomicU64>,
    frame_tx: broadcast::Sender<Arc<Frame>>,
    streaming: Parameter<bool>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let live = settings.nb_frames == 0;

    loop {
        let acquired = frame_count.load(Ordering::SeqCst);
        if !live && acquired >= settings.nb_frames {
            break;
        }

        state.set_status(CameraStatus::Exposure, false);
        let result = tokio::select! {
            result = grabber.retrieve(settings.timeout) => result,
            _ = &mut stop_rx => break,
        };

        match result {
            Ok(Some(GrabResult::Grabbed { data })) => {
                state.total_buffers.fetch_add(1, Ordering::SeqCst);
                state.set_status(CameraStatus::Readout, false);
                tracing::trace!("image#{} acquired !", acquired);
                let frame = Frame {
                    info: HwFrameInfo {
                        acq_frame_nb: acquired,
                        blank: false,
                    },
                    size: settings.size,
                    image_type: settings.image_type,
                    data,
                };
                let _ = frame_tx.send(Arc::new(frame));
                frame_count.fetch_add(1, Ordering::SeqCst);
            }
            Ok(Some(GrabResult::Failed {
                error_code,
                description,
            })) => {
                state.total_buffers.fetch_add(1, Ordering::SeqCst);
                state.failed_buffers.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(
                    "No image acquired! Error code : 0x{:x} Error description : {}",
                    error_code,
                    description
                );

                if state.blank_image_for_missed.load(Ordering::SeqCst) {
                    let frame = Frame::blank(acquired, settings.size, settings.image_type);
                    let _ = frame_tx.send(Arc::new(frame));
                    frame_count.fetch_add(1, Ordering::SeqCst);
                } else if !live {
                    tracing::error!("Missed frame #{} in snap mode, stopping", acquired);
                    state.set_status(CameraStatus::Fault, false);
                    break;
                }
            }
            Ok(None) => {
                tracing::error!("Timeout occurred!");
                state.set_status(CameraStatus::Fault, false);
                break;
            }
            Err(e) => {
                tracing::error!("Stream grabber error! {}", e);
                state.set_status(CameraStatus::Fault, false);
                break;
            }
        }
    }

    grabber.finish();
    {
        let mut conn = connection.lock().await;
        if let Err(e) = conn.device_mut().execute(nodes::ACQUISITION_STOP) {
            tracing::warn!("AcquisitionStop failed: {}", e);
        }
    }
    streaming.update_from_hardware(false).await;
    state.set_status(CameraStatus::Ready, false);
    tracing::debug!(
        frames = frame_count.load(Ordering::SeqCst),
        "grab task finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_is_sticky_unless_forced() {
        let state = AcquisitionState::new();
        state.set_status(CameraStatus::Fault, false);
        state.set_status(CameraStatus::Ready, false);
        assert_eq!(state.status(), CameraStatus::Fault);
        state.set_status(CameraStatus::Ready, true);
        assert_eq!(state.status(), CameraStatus::Ready);
    }

    #[tokio::test]
    async fn stop_without_task_is_noop() {
        let acq = BaslerAcquisition::new();
        acq.stop_stream().await.unwrap();
        assert!(!acq.is_running().await);
        assert_eq!(acq.status(), CameraStatus::Ready);
    }
}
