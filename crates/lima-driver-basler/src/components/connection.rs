//! Basler Connection Management
//!
//! Transport-layer abstraction, device lookup and runtime lifetime.
//!
//! ## Runtime Reference Counting
//!
//! The GigE transport runtime is process-global: it is initialised when the
//! first camera connection opens and terminated when the last one closes.
//! [`BaslerConnection`] takes a reference on open and releases it on drop.
//!
//! ## Camera identity
//!
//! Identities use the scheme prefixes accepted by the plugin:
//!
//! | identity | matched against |
//! |----------|-----------------|
//! | `sn://<serial>` | serial number |
//! | `ip://<host>` | IPv4 address (DNS names resolved first) |
//! | `uname://<name>` | user-defined device name |
//! | anything else | full name, then serial number, then IP address |

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lima_core::error::LimaError;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Number of open connections holding the transport runtime.
static RUNTIME_REF_COUNT: AtomicU32 = AtomicU32::new(0);

/// Makes increment + initialise and decrement + terminate atomic.
static RUNTIME_INIT_MUTEX: Mutex<()> = Mutex::new(());

/// Description of an enumerated GigE device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub vendor_name: String,
    pub model_name: String,
    pub serial_number: String,
    pub ip_address: String,
    pub user_defined_name: String,
    pub full_name: String,
}

/// Outcome of one buffer retrieved from the stream grabber.
#[derive(Debug, Clone, PartialEq)]
pub enum GrabResult {
    Grabbed { data: Vec<u8> },
    Failed { error_code: u32, description: String },
}

/// Stream grabber of an open device.
#[async_trait]
pub trait StreamGrabber: Send {
    /// Wait for the next buffer. `Ok(None)` means the timeout elapsed.
    async fn retrieve(&mut self, timeout: Duration) -> Result<Option<GrabResult>>;

    /// Cancel pending buffers and release grab resources.
    fn finish(&mut self);
}

/// Feature-node access to one camera (GenICam style).
///
/// Node names follow the Basler GigE SFNC names (`Width`, `GevSCPD`, ...).
pub trait GigeDevice: Send {
    fn open(&mut self) -> Result<()>;
    fn close(&mut self);
    fn is_open(&self) -> bool;

    /// False when the node does not exist on this model.
    fn is_available(&self, node: &str) -> bool;

    fn get_int(&self, node: &str) -> Result<i64>;
    fn set_int(&mut self, node: &str, value: i64) -> Result<()>;
    fn int_range(&self, node: &str) -> Result<(i64, i64)>;

    fn get_float(&self, node: &str) -> Result<f64>;
    fn set_float(&mut self, node: &str, value: f64) -> Result<()>;
    fn float_range(&self, node: &str) -> Result<(f64, f64)>;

    fn get_bool(&self, node: &str) -> Result<bool>;
    fn set_bool(&mut self, node: &str, value: bool) -> Result<()>;

    fn get_enum(&self, node: &str) -> Result<String>;
    fn set_enum(&mut self, node: &str, value: &str) -> Result<()>;
    /// Entries currently available for an enumeration node.
    fn enum_entries(&self, node: &str) -> Result<Vec<String>>;

    fn execute(&mut self, node: &str) -> Result<()>;

    /// Open the stream grabber with `nb_buffers` queued buffers.
    fn open_stream(&mut self, nb_buffers: usize) -> Result<Box<dyn StreamGrabber>>;
}

/// GigE transport layer: device enumeration and creation.
pub trait TransportLayer: Send + Sync {
    fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>>;
    fn create_device(&self, info: &DeviceInfo) -> Result<Box<dyn GigeDevice>>;
}

/// Parsed camera identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraId {
    Serial(String),
    Ip(String),
    UserName(String),
    Raw(String),
}

impl CameraId {
    pub fn parse(camera_id: &str) -> Self {
        if let Some(serial) = camera_id.strip_prefix("sn://") {
            CameraId::Serial(serial.to_string())
        } else if let Some(ip) = camera_id.strip_prefix("ip://") {
            CameraId::Ip(ip.to_string())
        } else if let Some(name) = camera_id.strip_prefix("uname://") {
            CameraId::UserName(name.to_string())
        } else {
            CameraId::Raw(camera_id.to_string())
        }
    }
}

/// Resolve a host name or dotted address to an IPv4 address string.
pub fn resolve_ip(host: &str) -> Result<String> {
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Ok(ip.to_string());
    }
    let resolved = (host, 0)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| {
            addrs.find_map(|addr| match addr {
                SocketAddr::V4(v4) => Some(v4.ip().to_string()),
                SocketAddr::V6(_) => None,
            })
        });
    resolved.ok_or_else(|| LimaError::Hardware(format!("Can not found ip for host {}", host)).into())
}

/// Pick the enumerated device matching `camera_id`.
pub fn find_device(devices: &[DeviceInfo], camera_id: &str) -> Result<DeviceInfo> {
    if devices.is_empty() {
        tracing::error!("No camera present!");
        return Err(LimaError::NoCameraPresent.into());
    }

    let found = match CameraId::parse(camera_id) {
        CameraId::Serial(serial) => devices.iter().find(|d| d.serial_number == serial),
        CameraId::Ip(host) => {
            let ip = resolve_ip(&host)?;
            devices.iter().find(|d| d.ip_address == ip)
        }
        CameraId::UserName(name) => devices.iter().find(|d| d.user_defined_name == name),
        CameraId::Raw(id) => devices
            .iter()
            .find(|d| d.full_name == id)
            .or_else(|| devices.iter().find(|d| d.serial_number == id))
            .or_else(|| {
                // a bare id may also be a dotted address or a DNS name
                let ip = resolve_ip(&id).ok()?;
                devices.iter().find(|d| d.ip_address == ip)
            }),
    };

    for device in devices {
        tracing::trace!(
            ip = %device.ip_address,
            serial = %device.serial_number,
            "enumerated camera"
        );
    }

    found.cloned().ok_or_else(|| {
        tracing::error!("Camera {} not found.", camera_id);
        LimaError::CameraNotFound(camera_id.to_string()).into()
    })
}

/// Current number of connections holding the runtime.
pub fn runtime_ref_count() -> u32 {
    RUNTIME_REF_COUNT.load(Ordering::SeqCst)
}

fn acquire_runtime() {
    let _guard = match RUNTIME_INIT_MUTEX.lock() {
        Ok(g) => g,
        Err(poisoned) => {
            tracing::warn!("Runtime init mutex poisoned during acquire - recovering");
            poisoned.into_inner()
        }
    };
    let prev = RUNTIME_REF_COUNT.fetch_add(1, Ordering::SeqCst);
    if prev == 0 {
        tracing::info!("GigE transport runtime initialized (ref count: 1)");
    } else {
        tracing::debug!("GigE transport runtime already initialized (ref count: {})", prev + 1);
    }
}

fn release_runtime() {
    let _guard = match RUNTIME_INIT_MUTEX.lock() {
        Ok(g) => g,
        Err(poisoned) => {
            tracing::warn!("Runtime init mutex poisoned during release - recovering");
            poisoned.into_inner()
        }
    };
    let prev = RUNTIME_REF_COUNT.fetch_sub(1, Ordering::SeqCst);
    if prev == 1 {
        tracing::info!("GigE transport runtime terminated (last connection closed)");
    } else {
        tracing::debug!("GigE transport runtime still in use (ref count: {})", prev - 1);
    }
}

/// Open connection to one camera.
pub struct BaslerConnection {
    device: Box<dyn GigeDevice>,
    info: DeviceInfo,
}

impl std::fmt::Debug for BaslerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaslerConnection")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl BaslerConnection {
    /// Enumerate, look up and open the camera named by `camera_id`.
    ///
    /// Blocking: lookup may resolve DNS names.
    pub fn open(transport: &dyn TransportLayer, camera_id: &str) -> Result<Self> {
        acquire_runtime();
        match Self::open_inner(transport, camera_id) {
            Ok(conn) => Ok(conn),
            Err(e) => {
                release_runtime();
                Err(e)
            }
        }
    }

    fn open_inner(transport: &dyn TransportLayer, camera_id: &str) -> Result<Self> {
        let devices = transport.enumerate_devices()?;
        let info = find_device(&devices, camera_id)?;
        tracing::debug!(
            vendor = %info.vendor_name,
            model = %info.model_name,
            "creating camera object attached to {}",
            camera_id
        );

        let mut device = transport.create_device(&info)?;
        device
            .open()
            .map_err(|e| anyhow!("Unable to get the camera from transport_layer! ({})", e))?;

        Ok(Self { device, info })
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn device(&self) -> &dyn GigeDevice {
        self.device.as_ref()
    }

    pub fn device_mut(&mut self) -> &mut dyn GigeDevice {
        self.device.as_mut()
    }
}

impl Drop for BaslerConnection {
    fn drop(&mut self) {
        tracing::debug!("Close camera {}", self.info.full_name);
        self.device.close();
        release_runtime();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(serial: &str, ip: &str, uname: &str) -> DeviceInfo {
        DeviceInfo {
            vendor_name: "Basler".into(),
            model_name: "acA1300-30gm".into(),
            serial_number: serial.into(),
            ip_address: ip.into(),
            user_defined_name: uname.into(),
            full_name: format!("Basler acA1300-30gm#{}", serial),
        }
    }

    #[test]
    fn parse_scheme_prefixes() {
        assert_eq!(CameraId::parse("sn://2150"), CameraId::Serial("2150".into()));
        assert_eq!(CameraId::parse("ip://10.0.0.2"), CameraId::Ip("10.0.0.2".into()));
        assert_eq!(CameraId::parse("uname://cam1"), CameraId::UserName("cam1".into()));
        assert_eq!(CameraId::parse("cam1"), CameraId::Raw("cam1".into()));
    }

    #[test]
    fn find_by_each_scheme() {
        let devices = vec![
            device("1001", "192.168.1.10", "left"),
            device("1002", "192.168.1.11", "right"),
        ];
        assert_eq!(find_device(&devices, "sn://1002").unwrap().ip_address, "192.168.1.11");
        assert_eq!(find_device(&devices, "ip://192.168.1.10").unwrap().serial_number, "1001");
        assert_eq!(find_device(&devices, "uname://right").unwrap().serial_number, "1002");
        assert_eq!(find_device(&devices, "1001").unwrap().user_defined_name, "left");
        assert_eq!(
            find_device(&devices, "Basler acA1300-30gm#1002").unwrap().serial_number,
            "1002"
        );
    }

    #[test]
    fn bare_id_resolves_host_name() {
        let devices = vec![
            device("1001", "192.168.1.10", "left"),
            device("1002", "127.0.0.1", "bench"),
        ];
        assert_eq!(find_device(&devices, "localhost").unwrap().serial_number, "1002");
        assert_eq!(find_device(&devices, "192.168.1.10").unwrap().serial_number, "1001");
    }

    #[test]
    fn lookup_errors() {
        let err = find_device(&[], "sn://1").unwrap_err();
        assert_eq!(err.downcast_ref::<LimaError>(), Some(&LimaError::NoCameraPresent));

        let devices = vec![device("1001", "192.168.1.10", "left")];
        let err = find_device(&devices, "uname://nobody").unwrap_err();
        assert_eq!(err.to_string(), "Camera not found!");
    }

    #[test]
    fn resolve_literal_ip() {
        assert_eq!(resolve_ip("10.1.2.3").unwrap(), "10.1.2.3");
        assert_eq!(resolve_ip("localhost").unwrap(), "127.0.0.1");
    }
}
