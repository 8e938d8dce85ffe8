//! Camera identity resolution.
//!
//! The device class accepts four identity properties. They are meant to be
//! mutually exclusive; when several are set, the first one in
//! [`IdentitySource`] declaration order is used and the others are ignored.

use crate::config::DeviceProperties;
use serde::Serialize;
use std::fmt;

/// Which property produced the camera identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    CameraId,
    SerialNumber,
    IpAddress,
    UserName,
    /// No property set; the server instance name is used as user name.
    InstanceName,
}

impl fmt::Display for IdentitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IdentitySource::CameraId => "camera_id",
            IdentitySource::SerialNumber => "serial_number",
            IdentitySource::IpAddress => "cam_ip_address",
            IdentitySource::UserName => "user_name",
            IdentitySource::InstanceName => "instance name",
        };
        f.write_str(name)
    }
}

/// Camera identity string handed to the plugin, with its origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedIdentity {
    pub camera_id: String,
    pub source: IdentitySource,
}

/// Build the camera identity from the device properties.
///
/// `camera_id` is used verbatim, the others are prefixed with `sn://`,
/// `ip://` or `uname://`. Without any of them the server instance name is
/// taken as the camera user name.
pub fn resolve_camera_id(props: &DeviceProperties, instance_name: &str) -> ResolvedIdentity {
    let (camera_id, source) = if let Some(id) = &props.camera_id {
        (id.clone(), IdentitySource::CameraId)
    } else if let Some(serial) = &props.serial_number {
        (format!("sn://{serial}"), IdentitySource::SerialNumber)
    } else if let Some(ip) = &props.cam_ip_address {
        (format!("ip://{ip}"), IdentitySource::IpAddress)
    } else if let Some(name) = &props.user_name {
        (format!("uname://{name}"), IdentitySource::UserName)
    } else {
        (format!("uname://{instance_name}"), IdentitySource::InstanceName)
    };

    tracing::info!(%camera_id, %source, "basler camera identity resolved");
    ResolvedIdentity { camera_id, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn props() -> DeviceProperties {
        DeviceProperties::default()
    }

    #[test]
    fn each_source_alone() {
        let p = DeviceProperties {
            camera_id: Some("0815-0000".into()),
            ..props()
        };
        let id = resolve_camera_id(&p, "cam1");
        assert_eq!(id.camera_id, "0815-0000");
        assert_eq!(id.source, IdentitySource::CameraId);

        let p = DeviceProperties {
            serial_number: Some("21234567".into()),
            ..props()
        };
        assert_eq!(resolve_camera_id(&p, "cam1").camera_id, "sn://21234567");

        let p = DeviceProperties {
            cam_ip_address: Some("192.168.1.10".into()),
            ..props()
        };
        assert_eq!(resolve_camera_id(&p, "cam1").camera_id, "ip://192.168.1.10");

        let p = DeviceProperties {
            user_name: Some("bench".into()),
            ..props()
        };
        assert_eq!(resolve_camera_id(&p, "cam1").camera_id, "uname://bench");
    }

    #[test]
    fn falls_back_to_instance_name() {
        let id = resolve_camera_id(&props(), "id00_basler");
        assert_eq!(id.camera_id, "uname://id00_basler");
        assert_eq!(id.source, IdentitySource::InstanceName);
    }

    #[test]
    fn precedence_is_silent() {
        let p = DeviceProperties {
            user_name: Some("bench".into()),
            cam_ip_address: Some("10.0.0.2".into()),
            serial_number: Some("42".into()),
            ..props()
        };
        let id = resolve_camera_id(&p, "cam1");
        assert_eq!(id.camera_id, "sn://42");
        assert_eq!(id.source, IdentitySource::SerialNumber);

        let p = DeviceProperties {
            user_name: Some("bench".into()),
            cam_ip_address: Some("10.0.0.2".into()),
            ..props()
        };
        assert_eq!(resolve_camera_id(&p, "cam1").source, IdentitySource::IpAddress);
    }

    #[test]
    #[traced_test]
    fn resolution_is_logged_with_source() {
        let p = DeviceProperties {
            user_name: Some("bench".into()),
            ..props()
        };
        resolve_camera_id(&p, "cam1");
        assert!(logs_contain("basler camera identity resolved"));
        assert!(logs_contain("uname://bench"));
        assert!(logs_contain("user_name"));
    }
}
