//! Simulated GigE transport.
//!
//! Node-map level simulation of Basler GigE cameras, used when no transport
//! library is installed and by the test suites. Three model families are
//! modelled from the model name:
//!
//! - `acA...m` (ACE mono): absolute exposure, temperature sensor, binning
//! - `acA...c` (ACE colour): Bayer/RGB/YUV formats, no binning
//! - anything else (Scout style): raw/base exposure, no temperature
//!
//! Fault injection: `missed_frames` lists frame indices delivered as failed
//! buffers, `stall_after` stops frame delivery after that many frames so the
//! acquisition loop hits its timeout.

use crate::components::connection::{
    DeviceInfo, GigeDevice, GrabResult, StreamGrabber, TransportLayer,
};
use crate::components::features::nodes;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lima_core::error::LimaError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Error code reported for incompletely grabbed buffers.
pub const INCOMPLETE_BUFFER_ERROR: u32 = 0xE100_0014;

/// Description of one simulated camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedCameraSpec {
    pub model_name: String,
    pub serial_number: String,
    pub ip_address: String,
    #[serde(default)]
    pub user_defined_name: String,
    /// Frame indices delivered as failed buffers.
    #[serde(default)]
    pub missed_frames: Vec<u64>,
    /// Stop delivering frames after this many.
    #[serde(default)]
    pub stall_after: Option<u64>,
}

impl SimulatedCameraSpec {
    pub fn new(model_name: &str, serial_number: &str, ip_address: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            serial_number: serial_number.to_string(),
            ip_address: ip_address.to_string(),
            user_defined_name: String::new(),
            missed_frames: Vec::new(),
            stall_after: None,
        }
    }

    /// ACE monochrome camera, 1296x966.
    pub fn ace_mono(serial_number: &str, ip_address: &str) -> Self {
        Self::new("acA1300-30gm", serial_number, ip_address)
    }

    /// ACE colour camera, 1296x966.
    pub fn ace_color(serial_number: &str, ip_address: &str) -> Self {
        Self::new("acA1300-30gc", serial_number, ip_address)
    }

    /// Scout monochrome camera, 659x494.
    pub fn scout(serial_number: &str, ip_address: &str) -> Self {
        Self::new("scA640-70gm", serial_number, ip_address)
    }

    pub fn with_user_name(mut self, name: &str) -> Self {
        self.user_defined_name = name.to_string();
        self
    }

    pub fn with_missed_frames(mut self, frames: Vec<u64>) -> Self {
        self.missed_frames = frames;
        self
    }

    pub fn with_stall_after(mut self, frames: u64) -> Self {
        self.stall_after = Some(frames);
        self
    }

    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            vendor_name: "Basler".to_string(),
            model_name: self.model_name.clone(),
            serial_number: self.serial_number.clone(),
            ip_address: self.ip_address.clone(),
            user_defined_name: self.user_defined_name.clone(),
            full_name: format!("Basler {}#{}", self.model_name, self.serial_number),
        }
    }
}

/// Transport layer serving simulated cameras.
#[derive(Debug, Default)]
pub struct SimulatedTransport {
    cameras: Vec<SimulatedCameraSpec>,
    devices_created: AtomicUsize,
}

impl SimulatedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_camera(mut self, spec: SimulatedCameraSpec) -> Self {
        self.cameras.push(spec);
        self
    }

    pub fn from_specs(cameras: Vec<SimulatedCameraSpec>) -> Self {
        Self {
            cameras,
            devices_created: AtomicUsize::new(0),
        }
    }

    /// Number of device objects created so far.
    pub fn devices_created(&self) -> usize {
        self.devices_created.load(Ordering::SeqCst)
    }
}

impl TransportLayer for SimulatedTransport {
    fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok(self.cameras.iter().map(SimulatedCameraSpec::device_info).collect())
    }

    fn create_device(&self, info: &DeviceInfo) -> Result<Box<dyn GigeDevice>> {
        let spec = self
            .cameras
            .iter()
            .find(|c| c.serial_number == info.serial_number)
            .ok_or_else(|| anyhow!("No simulated camera with serial {}", info.serial_number))?;
        self.devices_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimulatedDevice::new(spec.clone())))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModelFamily {
    AceMono,
    AceColor,
    Scout,
}

impl ModelFamily {
    fn from_model(model_name: &str) -> Self {
        if model_name.starts_with("acA") {
            if model_name.ends_with('c') {
                ModelFamily::AceColor
            } else {
                ModelFamily::AceMono
            }
        } else {
            ModelFamily::Scout
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Int { value: i64, min: i64, max: i64, writable: bool },
    Float { value: f64, min: f64, max: f64, writable: bool },
    Enum { value: String, entries: Vec<String> },
    Bool(bool),
    Command,
}

fn int(value: i64, min: i64, max: i64) -> Node {
    Node::Int { value, min, max, writable: true }
}

fn int_ro(value: i64) -> Node {
    Node::Int { value, min: value, max: value, writable: false }
}

fn float(value: f64, min: f64, max: f64) -> Node {
    Node::Float { value, min, max, writable: true }
}

fn enumeration(value: &str, entries: &[&str]) -> Node {
    Node::Enum {
        value: value.to_string(),
        entries: entries.iter().map(|e| e.to_string()).collect(),
    }
}

/// Bytes per pixel delivered for a pixel format.
fn bytes_per_pixel(format: &str) -> usize {
    match format {
        "Mono8" | "BayerRG8" | "BayerBG8" => 1,
        "RGB8Packed" | "BGR8Packed" | "YUV444Packed" => 3,
        "RGBA8Packed" | "BGRA8Packed" => 4,
        _ => 2,
    }
}

fn pixel_size_entry(format: &str) -> &'static str {
    match format {
        "Mono8" | "BayerRG8" | "BayerBG8" => "Bpp8",
        "Mono12Packed" => "Bpp12",
        "RGB8Packed" | "BGR8Packed" | "YUV444Packed" => "Bpp24",
        "RGBA8Packed" | "BGRA8Packed" => "Bpp32",
        _ => "Bpp16",
    }
}

/// Node-map simulation of one camera.
#[derive(Debug)]
pub struct SimulatedDevice {
    spec: SimulatedCameraSpec,
    family: ModelFamily,
    nodes: HashMap<&'static str, Node>,
    /// `LineSource` value per `LineSelector` entry.
    line_sources: HashMap<String, String>,
    open: bool,
    grabbing: bool,
}

impl SimulatedDevice {
    pub fn new(spec: SimulatedCameraSpec) -> Self {
        let family = ModelFamily::from_model(&spec.model_name);
        let (width, height) = match family {
            ModelFamily::AceMono | ModelFamily::AceColor => (1296, 966),
            ModelFamily::Scout => (659, 494),
        };

        let mut map: HashMap<&'static str, Node> = HashMap::new();
        map.insert(nodes::WIDTH_MAX, int_ro(width));
        map.insert(nodes::HEIGHT_MAX, int_ro(height));
        map.insert(nodes::WIDTH, int(width, 1, width));
        map.insert(nodes::HEIGHT, int(height, 1, height));
        map.insert(nodes::OFFSET_X, int(0, 0, 0));
        map.insert(nodes::OFFSET_Y, int(0, 0, 0));

        let formats: &[&str] = match family {
            ModelFamily::AceMono => &["Mono8", "Mono12", "Mono12Packed"],
            ModelFamily::AceColor => &[
                "Mono8",
                "BayerBG8",
                "BayerBG12",
                "RGB8Packed",
                "YUV422Packed",
            ],
            ModelFamily::Scout => &["Mono8", "Mono16"],
        };
        map.insert(nodes::PIXEL_FORMAT, enumeration("Mono8", formats));
        map.insert(nodes::PAYLOAD_SIZE, int_ro(0));
        map.insert(nodes::PIXEL_SIZE, enumeration("Bpp8", &["Bpp8", "Bpp12", "Bpp16", "Bpp24", "Bpp32"]));

        if family == ModelFamily::AceMono {
            map.insert(nodes::BINNING_H, int(1, 1, 4));
            map.insert(nodes::BINNING_V, int(1, 1, 4));
            map.insert(nodes::TEMPERATURE_ABS, Node::Float {
                value: 38.5,
                min: -40.0,
                max: 120.0,
                writable: false,
            });
        }
        if family == ModelFamily::Scout {
            map.insert(nodes::BINNING_H, int(1, 1, 2));
            map.insert(nodes::BINNING_V, int(1, 1, 2));
        }

        map.insert(nodes::TRIGGER_SELECTOR, enumeration("AcquisitionStart", &["AcquisitionStart", "FrameStart"]));
        map.insert(nodes::TRIGGER_MODE, enumeration("Off", &["Off", "On"]));
        map.insert(nodes::EXPOSURE_MODE, enumeration("Timed", &["Timed", "TriggerWidth"]));
        map.insert(nodes::EXPOSURE_AUTO, enumeration("Continuous", &["Off", "Once", "Continuous"]));
        map.insert(nodes::ACQUISITION_MODE, enumeration("SingleFrame", &["SingleFrame", "MultiFrame", "Continuous"]));
        map.insert(nodes::ACQUISITION_FRAME_RATE_ENABLE, Node::Bool(false));
        map.insert(nodes::ACQUISITION_START, Node::Command);
        map.insert(nodes::ACQUISITION_STOP, Node::Command);

        match family {
            ModelFamily::AceMono | ModelFamily::AceColor => {
                map.insert(nodes::EXPOSURE_TIME_ABS, float(1000.0, 35.0, 999_985.0));
            }
            ModelFamily::Scout => {
                map.insert(nodes::EXPOSURE_TIME_RAW, int(20, 1, 4095));
                map.insert(nodes::EXPOSURE_TIME_BASE_ABS, float(50.0, 0.001, 1e9));
                // derived from raw * base
                map.insert(nodes::EXPOSURE_TIME_ABS, Node::Float {
                    value: 1000.0,
                    min: 0.0,
                    max: f64::MAX,
                    writable: false,
                });
            }
        }
        map.insert(nodes::RESULTING_FRAME_RATE_ABS, Node::Float {
            value: 0.0,
            min: 0.0,
            max: f64::MAX,
            writable: false,
        });

        map.insert(nodes::GEV_SCPS_PACKET_SIZE, int(1500, 220, 16404));
        map.insert(nodes::GEV_SCPD, int(0, 0, 65535));
        map.insert(nodes::GEV_SCFTD, int(0, 0, 0x7FFF_FFFF));

        map.insert(nodes::TEST_IMAGE_SELECTOR, enumeration(
            "Off",
            &[
                "Off",
                "Testimage1",
                "Testimage2",
                "Testimage3",
                "Testimage4",
                "Testimage5",
                "Testimage6",
                "Testimage7",
            ],
        ));
        map.insert(nodes::LINE_SELECTOR, enumeration("Out1", &["Line1", "Out1", "Out2"]));
        map.insert(nodes::LINE_SOURCE, enumeration(
            "Off",
            &[
                "Off",
                "ExposureActive",
                "FrameTriggerWait",
                "LineTriggerWait",
                "Timer1Active",
                "UserOutput",
                "AcquisitionTriggerWait",
            ],
        ));

        let (gain_min, gain_max) = match family {
            ModelFamily::Scout => (136, 542),
            _ => (0, 360),
        };
        map.insert(nodes::GAIN_RAW, int(gain_min, gain_min, gain_max));
        if family != ModelFamily::Scout {
            map.insert(nodes::GAIN_AUTO, enumeration("Off", &["Off", "Once", "Continuous"]));
        }

        let mut device = Self {
            spec,
            family,
            nodes: map,
            line_sources: HashMap::new(),
            open: false,
            grabbing: false,
        };
        device.refresh_derived();
        device
    }

    fn node(&self, name: &str) -> Result<&Node> {
        self.nodes
            .get(name)
            .ok_or_else(|| LimaError::hardware(format!("Node {} not available", name)).into())
    }

    fn node_mut(&mut self, name: &str) -> Result<&mut Node> {
        self.nodes
            .get_mut(name)
            .ok_or_else(|| LimaError::hardware(format!("Node {} not available", name)).into())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(LimaError::hardware("Device is not open").into())
        }
    }

    fn raw_int(&self, name: &str) -> i64 {
        match self.nodes.get(name) {
            Some(Node::Int { value, .. }) => *value,
            _ => 0,
        }
    }

    fn raw_float(&self, name: &str) -> f64 {
        match self.nodes.get(name) {
            Some(Node::Float { value, .. }) => *value,
            _ => 0.0,
        }
    }

    fn raw_enum(&self, name: &str) -> String {
        match self.nodes.get(name) {
            Some(Node::Enum { value, .. }) => value.clone(),
            _ => String::new(),
        }
    }

    fn store_int(&mut self, name: &str, new_value: i64) {
        if let Some(Node::Int { value, .. }) = self.nodes.get_mut(name) {
            *value = new_value;
        }
    }

    fn store_float(&mut self, name: &str, new_value: f64) {
        if let Some(Node::Float { value, .. }) = self.nodes.get_mut(name) {
            *value = new_value;
        }
    }

    fn store_enum(&mut self, name: &str, new_value: &str) {
        if let Some(Node::Enum { value, .. }) = self.nodes.get_mut(name) {
            *value = new_value.to_string();
        }
    }

    /// Recompute nodes whose value depends on other nodes.
    fn refresh_derived(&mut self) {
        let format = self.raw_enum(nodes::PIXEL_FORMAT);
        self.store_enum(nodes::PIXEL_SIZE, pixel_size_entry(&format));

        let payload = self.raw_int(nodes::WIDTH) * self.raw_int(nodes::HEIGHT) * bytes_per_pixel(&format) as i64;
        self.store_int(nodes::PAYLOAD_SIZE, payload);

        if self.family == ModelFamily::Scout {
            let exposure = self.raw_int(nodes::EXPOSURE_TIME_RAW) as f64 * self.raw_float(nodes::EXPOSURE_TIME_BASE_ABS);
            self.store_float(nodes::EXPOSURE_TIME_ABS, exposure);
        }

        // 10 us line readout
        let readout_us = self.raw_int(nodes::HEIGHT) as f64 * 10.0;
        let period_us = self.raw_float(nodes::EXPOSURE_TIME_ABS) + readout_us;
        if period_us > 0.0 {
            self.store_float(nodes::RESULTING_FRAME_RATE_ABS, 1e6 / period_us);
        }
    }

    /// Range of the sensor window nodes, which depend on each other.
    fn window_range(&self, name: &str) -> Option<(i64, i64)> {
        let width_max = self.raw_int(nodes::WIDTH_MAX);
        let height_max = self.raw_int(nodes::HEIGHT_MAX);
        match name {
            nodes::WIDTH => Some((1, width_max - self.raw_int(nodes::OFFSET_X))),
            nodes::HEIGHT => Some((1, height_max - self.raw_int(nodes::OFFSET_Y))),
            nodes::OFFSET_X => Some((0, width_max - self.raw_int(nodes::WIDTH))),
            nodes::OFFSET_Y => Some((0, height_max - self.raw_int(nodes::HEIGHT))),
            _ => None,
        }
    }

    fn is_locked_while_grabbing(name: &str) -> bool {
        matches!(
            name,
            nodes::WIDTH
                | nodes::HEIGHT
                | nodes::OFFSET_X
                | nodes::OFFSET_Y
                | nodes::PIXEL_FORMAT
                | nodes::BINNING_H
                | nodes::BINNING_V
                | nodes::GEV_SCPS_PACKET_SIZE
        )
    }

    fn check_writable(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        if self.grabbing && Self::is_locked_while_grabbing(name) {
            return Err(LimaError::hardware(format!("Node {} is locked while grabbing", name)).into());
        }
        Ok(())
    }
}

impl GigeDevice for SimulatedDevice {
    fn open(&mut self) -> Result<()> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.grabbing = false;
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn is_available(&self, node: &str) -> bool {
        self.nodes.contains_key(node)
    }

    fn get_int(&self, node: &str) -> Result<i64> {
        self.ensure_open()?;
        match self.node(node)? {
            Node::Int { value, .. } => Ok(*value),
            _ => Err(anyhow!("Node {} is not an integer", node)),
        }
    }

    fn set_int(&mut self, node: &str, value: i64) -> Result<()> {
        self.check_writable(node)?;
        let (min, max) = self.int_range(node)?;
        match self.node_mut(node)? {
            Node::Int { writable: false, .. } => {
                return Err(LimaError::hardware(format!("Node {} is read only", node)).into())
            }
            Node::Int { value: current, .. } => {
                if value < min || value > max {
                    return Err(LimaError::hardware(format!(
                        "Value {} out of range [{}, {}] for node {}",
                        value, min, max, node
                    ))
                    .into());
                }
                *current = value;
            }
            _ => return Err(anyhow!("Node {} is not an integer", node)),
        }
        self.refresh_derived();
        Ok(())
    }

    fn int_range(&self, node: &str) -> Result<(i64, i64)> {
        self.ensure_open()?;
        if let Some(range) = self.window_range(node) {
            return Ok(range);
        }
        match self.node(node)? {
            Node::Int { min, max, .. } => Ok((*min, *max)),
            _ => Err(anyhow!("Node {} is not an integer", node)),
        }
    }

    fn get_float(&self, node: &str) -> Result<f64> {
        self.ensure_open()?;
        match self.node(node)? {
            Node::Float { value, .. } => Ok(*value),
            _ => Err(anyhow!("Node {} is not a float", node)),
        }
    }

    fn set_float(&mut self, node: &str, value: f64) -> Result<()> {
        self.check_writable(node)?;
        match self.node_mut(node)? {
            Node::Float { writable: false, .. } => {
                return Err(LimaError::hardware(format!("Node {} is read only", node)).into())
            }
            Node::Float { value: current, min, max, .. } => {
                if value < *min || value > *max {
                    return Err(LimaError::hardware(format!(
                        "Value {} out of range [{}, {}] for node {}",
                        value, min, max, node
                    ))
                    .into());
                }
                *current = value;
            }
            _ => return Err(anyhow!("Node {} is not a float", node)),
        }
        self.refresh_derived();
        Ok(())
    }

    fn float_range(&self, node: &str) -> Result<(f64, f64)> {
        self.ensure_open()?;
        match self.node(node)? {
            Node::Float { min, max, .. } => Ok((*min, *max)),
            _ => Err(anyhow!("Node {} is not a float", node)),
        }
    }

    fn get_bool(&self, node: &str) -> Result<bool> {
        self.ensure_open()?;
        match self.node(node)? {
            Node::Bool(value) => Ok(*value),
            _ => Err(anyhow!("Node {} is not a boolean", node)),
        }
    }

    fn set_bool(&mut self, node: &str, value: bool) -> Result<()> {
        self.check_writable(node)?;
        match self.node_mut(node)? {
            Node::Bool(current) => {
                *current = value;
                Ok(())
            }
            _ => Err(anyhow!("Node {} is not a boolean", node)),
        }
    }

    fn get_enum(&self, node: &str) -> Result<String> {
        self.ensure_open()?;
        if node == nodes::LINE_SOURCE {
            let selector = self.raw_enum(nodes::LINE_SELECTOR);
            return Ok(self
                .line_sources
                .get(&selector)
                .cloned()
                .unwrap_or_else(|| "Off".to_string()));
        }
        match self.node(node)? {
            Node::Enum { value, .. } => Ok(value.clone()),
            _ => Err(anyhow!("Node {} is not an enumeration", node)),
        }
    }

    fn set_enum(&mut self, node: &str, value: &str) -> Result<()> {
        self.check_writable(node)?;
        match self.node_mut(node)? {
            Node::Enum { value: current, entries } => {
                if !entries.iter().any(|e| e == value) {
                    return Err(LimaError::hardware(format!(
                        "Entry {} not available for node {}",
                        value, node
                    ))
                    .into());
                }
                *current = value.to_string();
            }
            _ => return Err(anyhow!("Node {} is not an enumeration", node)),
        }
        if node == nodes::LINE_SOURCE {
            let selector = self.raw_enum(nodes::LINE_SELECTOR);
            self.line_sources.insert(selector, value.to_string());
        }
        self.refresh_derived();
        Ok(())
    }

    fn enum_entries(&self, node: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        match self.node(node)? {
            Node::Enum { entries, .. } => Ok(entries.clone()),
            _ => Err(anyhow!("Node {} is not an enumeration", node)),
        }
    }

    fn execute(&mut self, node: &str) -> Result<()> {
        self.ensure_open()?;
        match self.node(node)? {
            Node::Command => {}
            _ => return Err(anyhow!("Node {} is not a command", node)),
        }
        match node {
            nodes::ACQUISITION_START => self.grabbing = true,
            nodes::ACQUISITION_STOP => self.grabbing = false,
            _ => {}
        }
        Ok(())
    }

    fn open_stream(&mut self, nb_buffers: usize) -> Result<Box<dyn StreamGrabber>> {
        self.ensure_open()?;
        let payload = usize::try_from(self.raw_int(nodes::PAYLOAD_SIZE))
            .map_err(|_| anyhow!("Invalid payload size"))?;
        let exposure_us = self.raw_float(nodes::EXPOSURE_TIME_ABS).max(0.0);
        tracing::debug!(payload, nb_buffers, "simulated stream grabber opened");
        Ok(Box::new(SimulatedStream {
            payload,
            exposure: Duration::from_secs_f64(exposure_us * 1e-6),
            next_frame: 0,
            missed: self.spec.missed_frames.iter().copied().collect(),
            stall_after: self.spec.stall_after,
            finished: false,
        }))
    }
}

struct SimulatedStream {
    payload: usize,
    exposure: Duration,
    next_frame: u64,
    missed: HashSet<u64>,
    stall_after: Option<u64>,
    finished: bool,
}

#[async_trait]
impl StreamGrabber for SimulatedStream {
    async fn retrieve(&mut self, timeout: Duration) -> Result<Option<GrabResult>> {
        if self.finished {
            return Err(LimaError::hardware("Stream grabber is closed").into());
        }
        let stalled = self.stall_after.is_some_and(|n| self.next_frame >= n);
        if stalled || self.exposure > timeout {
            tokio::time::sleep(timeout).await;
            return Ok(None);
        }
        tokio::time::sleep(self.exposure).await;

        let index = self.next_frame;
        self.next_frame += 1;
        if self.missed.contains(&index) {
            return Ok(Some(GrabResult::Failed {
                error_code: INCOMPLETE_BUFFER_ERROR,
                description: "The buffer was incompletely grabbed".to_string(),
            }));
        }

        let data = (0..self.payload)
            .map(|i| ((i as u64 + index) % 256) as u8)
            .collect();
        Ok(Some(GrabResult::Grabbed { data }))
    }

    fn finish(&mut self) {
        self.finished = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(spec: SimulatedCameraSpec) -> SimulatedDevice {
        let mut device = SimulatedDevice::new(spec);
        device.open().unwrap();
        device
    }

    #[test]
    fn window_ranges_follow_offsets() {
        let mut device = open(SimulatedCameraSpec::ace_mono("1", "10.0.0.1"));
        device.set_int(nodes::WIDTH, 200).unwrap();
        assert_eq!(device.int_range(nodes::OFFSET_X).unwrap(), (0, 1096));
        assert!(device.set_int(nodes::OFFSET_X, 1200).is_err());
        device.set_int(nodes::OFFSET_X, 1000).unwrap();
        assert_eq!(device.int_range(nodes::WIDTH).unwrap(), (1, 296));
    }

    #[test]
    fn scout_exposure_derives_from_raw_and_base() {
        let mut device = open(SimulatedCameraSpec::scout("2", "10.0.0.2"));
        device.set_float(nodes::EXPOSURE_TIME_BASE_ABS, 100.0).unwrap();
        device.set_int(nodes::EXPOSURE_TIME_RAW, 30).unwrap();
        assert_eq!(device.get_float(nodes::EXPOSURE_TIME_ABS).unwrap(), 3000.0);
        assert!(device.set_float(nodes::EXPOSURE_TIME_ABS, 10.0).is_err());
        assert!(!device.is_available(nodes::TEMPERATURE_ABS));
    }

    #[test]
    fn line_source_is_per_selector() {
        let mut device = open(SimulatedCameraSpec::ace_mono("1", "10.0.0.1"));
        device.set_enum(nodes::LINE_SELECTOR, "Out1").unwrap();
        device.set_enum(nodes::LINE_SOURCE, "UserOutput").unwrap();
        device.set_enum(nodes::LINE_SELECTOR, "Out2").unwrap();
        assert_eq!(device.get_enum(nodes::LINE_SOURCE).unwrap(), "Off");
        device.set_enum(nodes::LINE_SELECTOR, "Out1").unwrap();
        assert_eq!(device.get_enum(nodes::LINE_SOURCE).unwrap(), "UserOutput");
    }

    #[test]
    fn geometry_locked_while_grabbing() {
        let mut device = open(SimulatedCameraSpec::ace_mono("1", "10.0.0.1"));
        device.execute(nodes::ACQUISITION_START).unwrap();
        assert!(device.set_int(nodes::WIDTH, 100).is_err());
        device.execute(nodes::ACQUISITION_STOP).unwrap();
        assert!(device.set_int(nodes::WIDTH, 100).is_ok());
    }

    #[tokio::test]
    async fn stream_injects_missed_frames_and_stalls() {
        let mut device = open(
            SimulatedCameraSpec::ace_mono("1", "10.0.0.1")
                .with_missed_frames(vec![1])
                .with_stall_after(2),
        );
        device.set_float(nodes::EXPOSURE_TIME_ABS, 100.0).unwrap();
        let mut stream = device.open_stream(16).unwrap();
        let timeout = Duration::from_millis(50);

        assert!(matches!(
            stream.retrieve(timeout).await.unwrap(),
            Some(GrabResult::Grabbed { .. })
        ));
        assert!(matches!(
            stream.retrieve(timeout).await.unwrap(),
            Some(GrabResult::Failed { .. })
        ));
        assert!(stream.retrieve(timeout).await.unwrap().is_none());
    }
}
