//! # Basler Tango device server
//!
//! Exposes a Basler GigE camera, driven through the Lima plugin in
//! `lima-driver-basler`, as a device of the `Basler` Tango class.
//!
//! ## Crate Structure
//!
//! - **`config`**: Figment-based loading of server settings and device
//!   properties, with strict coercion of the string-typed Tango properties.
//! - **`identity`**: resolves the camera identity (`sn://`, `ip://`,
//!   `uname://` or a raw id) from the device properties.
//! - **`factory`**: [`factory::AcquisitionHolder`], which builds the camera
//!   and interface once and hands out control objects over them.
//! - **`device`**: the class declarations, the device and its attribute
//!   dispatch table.
//! - **`logging`**: `tracing-subscriber` setup.

pub mod config;
pub mod device;
pub mod factory;
pub mod identity;
pub mod logging;

pub use config::{ConfigError, DeviceProperties, ServerConfig};
pub use device::{
    tango_class_and_device, AttrValue, BaslerDevice, BaslerDeviceClass, DevState,
    ParameterSnapshot,
};
pub use factory::AcquisitionHolder;
pub use identity::{resolve_camera_id, IdentitySource, ResolvedIdentity};
