//! Acquisition-object holder.
//!
//! One holder owns at most one camera/interface pair for the lifetime of the
//! server. The first [`AcquisitionHolder::get_control`] call builds it; every
//! later call reuses it and only applies `blank_image_for_missed`.

use crate::config::DeviceProperties;
use crate::identity::resolve_camera_id;
use anyhow::Result;
use lima_core::control::CtControl;
use lima_driver_basler::{Camera, Interface, TransportLayer};
use std::sync::Arc;
use tokio::sync::OnceCell;

pub struct AcquisitionHolder {
    transport: Arc<dyn TransportLayer>,
    instance_name: String,
    interface: OnceCell<Arc<Interface>>,
}

impl std::fmt::Debug for AcquisitionHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionHolder")
            .field("instance_name", &self.instance_name)
            .field("initialized", &self.interface.initialized())
            .finish_non_exhaustive()
    }
}

impl AcquisitionHolder {
    pub fn new(transport: Arc<dyn TransportLayer>, instance_name: impl Into<String>) -> Self {
        Self {
            transport,
            instance_name: instance_name.into(),
            interface: OnceCell::new(),
        }
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    /// Cached interface, if the first `get_control` call succeeded.
    pub fn interface(&self) -> Option<Arc<Interface>> {
        self.interface.get().cloned()
    }

    /// Cached camera, if any.
    pub fn camera(&self) -> Option<Arc<Camera>> {
        self.interface.get().map(|i| i.camera().clone())
    }

    /// Control object over the cached interface, building it on first use.
    ///
    /// Concurrent first calls construct a single camera. A failed build
    /// leaves the holder empty, so a later call retries.
    pub async fn get_control(&self, props: &DeviceProperties) -> Result<CtControl> {
        let interface = self
            .interface
            .get_or_try_init(|| self.build(props))
            .await?
            .clone();

        if let Some(enabled) = props.blank_image_for_missed {
            interface.set_blank_image_for_missed(enabled);
        }

        Ok(CtControl::new(interface))
    }

    async fn build(&self, props: &DeviceProperties) -> Result<Arc<Interface>> {
        let identity = resolve_camera_id(props, &self.instance_name);

        let camera = Camera::open(
            self.transport.clone(),
            &identity.camera_id,
            props.packet_size,
        )
        .await?;
        camera.set_inter_packet_delay(props.inter_packet_delay).await?;
        camera
            .set_frame_transmission_delay(props.frame_transmission_delay)
            .await?;

        let interface = Interface::new(Arc::new(camera), props.force_video_mode);
        tracing::info!(
            camera_id = %identity.camera_id,
            force_video_mode = props.force_video_mode,
            "Basler acquisition objects created"
        );
        Ok(Arc::new(interface))
    }
}
