//! Basler GigE Camera Plugin
//!
//! Component layout:
//! - Connection: transport layer, device lookup, runtime lifetime
//! - Features: GenICam node access
//! - Acquisition: grab task, status, buffer statistics
//! - Simulated: in-memory transport used without camera hardware
//!
//! On top of the components, [`Camera`] is the device object, the control
//! objects in [`ctrl`] adapt it to the Lima capability traits and
//! [`Interface`] publishes them as a `HwInterface`.

pub mod camera;
pub mod components;
pub mod ctrl;
pub mod interface;

pub use crate::camera::Camera;
pub use crate::components::acquisition::CameraStatus;
pub use crate::components::connection::{
    runtime_ref_count, BaslerConnection, CameraId, DeviceInfo, GigeDevice, GrabResult,
    StreamGrabber, TransportLayer,
};
pub use crate::components::features::{BaslerFeatures, LineSource, TestImage};
pub use crate::components::simulated::{SimulatedCameraSpec, SimulatedDevice, SimulatedTransport};
pub use crate::interface::Interface;
