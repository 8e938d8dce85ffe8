//! Tango device class and device for Basler cameras.
//!
//! [`BaslerDeviceClass`] carries the declarations the middleware registers:
//! device properties, the `getAttrStringValueList` command and the
//! camera-specific attributes. [`BaslerDevice`] serves attribute reads and
//! writes through an [`AttributeTable`] that binds each attribute name to a
//! typed accessor on the cached [`Camera`].

use crate::config::DeviceProperties;
use crate::factory::AcquisitionHolder;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use lima_core::capabilities::{Commandable, Parameterized};
use lima_core::control::CtControl;
use lima_core::observable::ObservableMetadata;
use lima_core::LimaError;
use lima_driver_basler::{Camera, LineSource, TestImage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Tango class name.
pub const CLASS_NAME: &str = "Basler";

/// Command returning the legal tokens of an enumerated attribute.
pub const GET_ATTR_STRING_VALUE_LIST: &str = "getAttrStringValueList";

/// Device property names, in declaration order.
pub const PROPERTY_NAMES: [&str; 9] = [
    "camera_id",
    "cam_ip_address",
    "serial_number",
    "user_name",
    "inter_packet_delay",
    "frame_transmission_delay",
    "packet_size",
    "force_video_mode",
    "blank_image_for_missed",
];

// =============================================================================
// Declarations
// =============================================================================

/// Tango data types used by the class declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TangoType {
    DevString,
    DevLong,
    DevDouble,
    DevBoolean,
    DevVarStringArray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttrAccess {
    Read,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DevState {
    On,
    Off,
    Fault,
}

impl fmt::Display for DevState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DevState::On => "ON",
            DevState::Off => "OFF",
            DevState::Fault => "FAULT",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyDescriptor {
    pub name: &'static str,
    pub data_type: TangoType,
    pub description: &'static str,
    pub default: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandDescriptor {
    pub name: &'static str,
    pub in_type: TangoType,
    pub in_description: &'static str,
    pub out_type: TangoType,
    pub out_description: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeDescriptor {
    pub name: &'static str,
    pub data_type: TangoType,
    pub access: AttrAccess,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub enum_labels: Vec<String>,
}

/// Declarations registered with the middleware for the Basler class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BaslerDeviceClass {
    pub name: &'static str,
    pub device_properties: Vec<PropertyDescriptor>,
    pub commands: Vec<CommandDescriptor>,
    pub attributes: Vec<AttributeDescriptor>,
}

impl Default for BaslerDeviceClass {
    fn default() -> Self {
        Self::new()
    }
}

impl BaslerDeviceClass {
    pub fn new() -> Self {
        use serde_json::json;
        fn prop(
            name: &'static str,
            data_type: TangoType,
            description: &'static str,
            default: Option<serde_json::Value>,
        ) -> PropertyDescriptor {
            PropertyDescriptor {
                name,
                data_type,
                description,
                default,
            }
        }

        let device_properties = vec![
            prop("camera_id", TangoType::DevString, "Camera ID", None),
            prop("cam_ip_address", TangoType::DevString, "Camera ip address", None),
            prop("serial_number", TangoType::DevString, "Camera serial number", None),
            prop("user_name", TangoType::DevString, "Camera user name", None),
            prop("inter_packet_delay", TangoType::DevLong, "Inter Packet Delay", Some(json!(0))),
            prop(
                "frame_transmission_delay",
                TangoType::DevLong,
                "Frame Transmission Delay",
                Some(json!(0)),
            ),
            prop(
                "packet_size",
                TangoType::DevLong,
                "Network packet size (MTU)",
                Some(json!(8000)),
            ),
            prop(
                "force_video_mode",
                TangoType::DevString,
                "For colour camera, force video mode to get RGB images",
                Some(json!("false")),
            ),
            prop(
                "blank_image_for_missed",
                TangoType::DevString,
                "Return a blank image for missed frames",
                Some(json!("false")),
            ),
        ];

        let commands = vec![CommandDescriptor {
            name: GET_ATTR_STRING_VALUE_LIST,
            in_type: TangoType::DevString,
            in_description: "Attribute name",
            out_type: TangoType::DevVarStringArray,
            out_description: "Authorized String value list",
        }];

        Self {
            name: CLASS_NAME,
            device_properties,
            commands,
            attributes: AttributeTable::declarations(),
        }
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.device_properties.iter().find(|p| p.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

// =============================================================================
// Attribute values and dispatch
// =============================================================================

/// Scalar attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Boolean(bool),
    Long(i64),
    Double(f64),
    String(String),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Boolean(v) => write!(f, "{v}"),
            AttrValue::Long(v) => write!(f, "{v}"),
            AttrValue::Double(v) => write!(f, "{v}"),
            AttrValue::String(v) => f.write_str(v),
        }
    }
}

impl AttrValue {
    /// Parse text input for an attribute of type `data_type`.
    pub fn parse(data_type: TangoType, text: &str) -> Result<Self> {
        let invalid = || LimaError::InvalidValue(format!("'{text}' is not a valid {data_type:?}"));
        Ok(match data_type {
            TangoType::DevBoolean => match text {
                "true" => AttrValue::Boolean(true),
                "false" => AttrValue::Boolean(false),
                _ => return Err(invalid().into()),
            },
            TangoType::DevLong => AttrValue::Long(text.trim().parse().map_err(|_| invalid())?),
            TangoType::DevDouble => AttrValue::Double(text.trim().parse().map_err(|_| invalid())?),
            TangoType::DevString => AttrValue::String(text.to_string()),
            TangoType::DevVarStringArray => return Err(invalid().into()),
        })
    }

    fn into_long(self, attr: &str) -> Result<i64> {
        match self {
            AttrValue::Long(v) => Ok(v),
            other => Err(type_mismatch(attr, "DevLong", &other)),
        }
    }

    fn into_double(self, attr: &str) -> Result<f64> {
        match self {
            AttrValue::Double(v) => Ok(v),
            AttrValue::Long(v) => Ok(v as f64),
            other => Err(type_mismatch(attr, "DevDouble", &other)),
        }
    }

    fn into_bool(self, attr: &str) -> Result<bool> {
        match self {
            AttrValue::Boolean(v) => Ok(v),
            other => Err(type_mismatch(attr, "DevBoolean", &other)),
        }
    }

    fn into_string(self, attr: &str) -> Result<String> {
        match self {
            AttrValue::String(v) => Ok(v),
            other => Err(type_mismatch(attr, "DevString", &other)),
        }
    }
}

fn type_mismatch(attr: &str, expected: &str, got: &AttrValue) -> anyhow::Error {
    LimaError::InvalidValue(format!("{attr}: expected {expected}, got {got:?}")).into()
}

type Getter = fn(Arc<Camera>) -> BoxFuture<'static, Result<AttrValue>>;
type Setter = fn(Arc<Camera>, AttrValue) -> BoxFuture<'static, Result<()>>;

struct AttributeEntry {
    descriptor: AttributeDescriptor,
    getter: Getter,
    setter: Option<Setter>,
}

/// Attribute name to camera accessor mapping.
pub struct AttributeTable {
    entries: BTreeMap<&'static str, AttributeEntry>,
    order: Vec<&'static str>,
}

impl fmt::Debug for AttributeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeTable")
            .field("attributes", &self.order)
            .finish()
    }
}

impl AttributeTable {
    pub fn new() -> Self {
        let mut table = Self {
            entries: BTreeMap::new(),
            order: Vec::new(),
        };

        // Acquisition statistics
        table.read_only("statistics_total_buffer_count", TangoType::DevLong, None, |cam| {
            Box::pin(async move {
                Ok(AttrValue::Long(cam.statistics_total_buffer_count().current().await?))
            })
        });
        table.read_only("statistics_failed_buffer_count", TangoType::DevLong, None, |cam| {
            Box::pin(async move {
                Ok(AttrValue::Long(cam.statistics_failed_buffer_count().current().await?))
            })
        });

        // Enumerated features
        table.enumerated(
            "test_image_selector",
            TestImage::all_choices(),
            |cam| {
                Box::pin(async move {
                    Ok(AttrValue::String(cam.test_image_selector().current().await?))
                })
            },
            |cam, value| {
                Box::pin(async move {
                    let token = value.into_string("test_image_selector")?;
                    cam.test_image_selector().set(token).await
                })
            },
        );
        table.enumerated(
            "output1_line_source",
            LineSource::all_choices(),
            |cam| {
                Box::pin(async move {
                    Ok(AttrValue::String(cam.output1_line_source().current().await?))
                })
            },
            |cam, value| {
                Box::pin(async move {
                    let token = value.into_string("output1_line_source")?;
                    cam.output1_line_source().set(token).await
                })
            },
        );

        // Monitoring
        table.read_only("temperature", TangoType::DevDouble, Some("°C"), |cam| {
            Box::pin(async move { Ok(AttrValue::Double(cam.temperature().current().await?)) })
        });

        // GigE transport
        table.read_write(
            "packet_size",
            TangoType::DevLong,
            Some("bytes"),
            |cam| Box::pin(async move { Ok(AttrValue::Long(cam.packet_size().current().await?)) }),
            |cam, value| {
                Box::pin(async move {
                    let v = value.into_long("packet_size")?;
                    cam.packet_size().set(v).await
                })
            },
        );
        table.read_write(
            "inter_packet_delay",
            TangoType::DevLong,
            Some("ticks"),
            |cam| {
                Box::pin(async move {
                    Ok(AttrValue::Long(cam.inter_packet_delay().current().await?))
                })
            },
            |cam, value| {
                Box::pin(async move {
                    let v = value.into_long("inter_packet_delay")?;
                    cam.set_inter_packet_delay(v).await
                })
            },
        );
        table.read_write(
            "frame_transmission_delay",
            TangoType::DevLong,
            Some("ticks"),
            |cam| {
                Box::pin(async move {
                    Ok(AttrValue::Long(cam.frame_transmission_delay().current().await?))
                })
            },
            |cam, value| {
                Box::pin(async move {
                    let v = value.into_long("frame_transmission_delay")?;
                    cam.set_frame_transmission_delay(v).await
                })
            },
        );

        // Image
        table.read_only("frame_rate", TangoType::DevDouble, Some("Hz"), |cam| {
            Box::pin(async move { Ok(AttrValue::Double(cam.frame_rate().current().await?)) })
        });
        table.read_write(
            "gain",
            TangoType::DevDouble,
            None,
            |cam| Box::pin(async move { Ok(AttrValue::Double(cam.gain().current().await?)) }),
            |cam, value| {
                Box::pin(async move {
                    let v = value.into_double("gain")?;
                    cam.gain().set(v).await
                })
            },
        );
        table.read_write(
            "autogain",
            TangoType::DevBoolean,
            None,
            |cam| Box::pin(async move { Ok(AttrValue::Boolean(cam.autogain().current().await?)) }),
            |cam, value| {
                Box::pin(async move {
                    let v = value.into_bool("autogain")?;
                    cam.autogain().set(v).await
                })
            },
        );

        table
    }

    /// Attribute declarations, in publication order.
    pub fn declarations() -> Vec<AttributeDescriptor> {
        let table = Self::new();
        table
            .order
            .iter()
            .filter_map(|name| table.entries.get(name))
            .map(|e| e.descriptor.clone())
            .collect()
    }

    fn insert(&mut self, descriptor: AttributeDescriptor, getter: Getter, setter: Option<Setter>) {
        let name = descriptor.name;
        self.order.push(name);
        self.entries.insert(
            name,
            AttributeEntry {
                descriptor,
                getter,
                setter,
            },
        );
    }

    fn read_only(
        &mut self,
        name: &'static str,
        data_type: TangoType,
        unit: Option<&'static str>,
        getter: Getter,
    ) {
        self.insert(
            AttributeDescriptor {
                name,
                data_type,
                access: AttrAccess::Read,
                unit,
                enum_labels: Vec::new(),
            },
            getter,
            None,
        );
    }

    fn read_write(
        &mut self,
        name: &'static str,
        data_type: TangoType,
        unit: Option<&'static str>,
        getter: Getter,
        setter: Setter,
    ) {
        self.insert(
            AttributeDescriptor {
                name,
                data_type,
                access: AttrAccess::ReadWrite,
                unit,
                enum_labels: Vec::new(),
            },
            getter,
            Some(setter),
        );
    }

    fn enumerated(
        &mut self,
        name: &'static str,
        labels: Vec<String>,
        getter: Getter,
        setter: Setter,
    ) {
        self.insert(
            AttributeDescriptor {
                name,
                data_type: TangoType::DevString,
                access: AttrAccess::ReadWrite,
                unit: None,
                enum_labels: labels,
            },
            getter,
            Some(setter),
        );
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.order.iter().copied()
    }

    pub fn descriptor(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.entries.get(name).map(|e| &e.descriptor)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub async fn read(&self, camera: &Arc<Camera>, name: &str) -> Result<AttrValue> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| LimaError::UnknownAttribute(name.to_string()))?;
        (entry.getter)(camera.clone()).await
    }

    pub async fn write(&self, camera: &Arc<Camera>, name: &str, value: AttrValue) -> Result<()> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| LimaError::UnknownAttribute(name.to_string()))?;
        let setter = entry
            .setter
            .ok_or_else(|| LimaError::ReadOnlyAttribute(name.to_string()))?;
        tracing::debug!(attribute = name, %value, "write attribute");
        setter(camera.clone(), value).await
    }
}

impl Default for AttributeTable {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Device
// =============================================================================

/// Last known value and metadata of one camera parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterSnapshot {
    pub value: serde_json::Value,
    #[serde(flatten)]
    pub metadata: ObservableMetadata,
}

/// One Basler device served by the device server.
pub struct BaslerDevice {
    name: String,
    state: DevState,
    properties: DeviceProperties,
    control: CtControl,
    camera: Arc<Camera>,
    attributes: AttributeTable,
}

impl fmt::Debug for BaslerDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaslerDevice")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("camera", &self.camera)
            .finish_non_exhaustive()
    }
}

impl BaslerDevice {
    /// Create the device, building the acquisition objects on first use.
    pub async fn new(
        name: impl Into<String>,
        properties: DeviceProperties,
        holder: Arc<AcquisitionHolder>,
    ) -> Result<Self> {
        let name = name.into();
        let control = holder.get_control(&properties).await?;
        let camera = holder
            .camera()
            .ok_or_else(|| anyhow!("Acquisition holder has no camera after initialisation"))?;

        tracing::info!(device = %name, camera = camera.camera_id(), "Basler device initialised");
        Ok(Self {
            name,
            state: DevState::On,
            properties,
            control,
            camera,
            attributes: AttributeTable::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> DevState {
        self.state
    }

    pub fn set_state(&mut self, state: DevState) {
        tracing::debug!(device = %self.name, %state, "state change");
        self.state = state;
    }

    pub fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    pub fn control(&self) -> &CtControl {
        &self.control
    }

    pub fn camera(&self) -> &Arc<Camera> {
        &self.camera
    }

    pub fn attributes(&self) -> &AttributeTable {
        &self.attributes
    }

    /// Legal tokens of an enumerated attribute; empty otherwise, unknown
    /// names included.
    pub fn get_attr_string_value_list(&self, attr_name: &str) -> Vec<String> {
        self.attributes
            .descriptor(attr_name)
            .map(|d| d.enum_labels.clone())
            .unwrap_or_default()
    }

    pub async fn read_attribute(&self, name: &str) -> Result<AttrValue> {
        self.attributes.read(&self.camera, name).await
    }

    pub async fn write_attribute(&self, name: &str, value: AttrValue) -> Result<()> {
        self.attributes.write(&self.camera, name, value).await
    }

    /// Camera parameter registry in name order. Values are the last ones
    /// seen; the hardware is not read.
    pub fn parameter_snapshot(&self) -> Result<BTreeMap<String, ParameterSnapshot>> {
        self.camera
            .parameters()
            .iter()
            .map(|(name, param)| {
                let snapshot = ParameterSnapshot {
                    value: param.get_json()?,
                    metadata: param.metadata(),
                };
                Ok((name.to_string(), snapshot))
            })
            .collect()
    }
}

#[async_trait]
impl Commandable for BaslerDevice {
    async fn execute_command(
        &self,
        command: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value> {
        match command {
            GET_ATTR_STRING_VALUE_LIST => {
                let attr_name = args.as_str().ok_or_else(|| {
                    LimaError::InvalidValue(format!(
                        "{GET_ATTR_STRING_VALUE_LIST} expects an attribute name"
                    ))
                })?;
                Ok(serde_json::json!(self.get_attr_string_value_list(attr_name)))
            }
            other => Err(LimaError::NotSupported(format!("command '{other}'")).into()),
        }
    }
}

/// Device constructor registered alongside the class.
pub type DeviceConstructor =
    fn(String, DeviceProperties, Arc<AcquisitionHolder>) -> BoxFuture<'static, Result<BaslerDevice>>;

/// Class descriptor and device constructor for middleware registration.
pub fn tango_class_and_device() -> (BaslerDeviceClass, DeviceConstructor) {
    let construct: DeviceConstructor = |name, properties, holder| {
        Box::pin(BaslerDevice::new(name, properties, holder))
    };
    (BaslerDeviceClass::new(), construct)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_table_matches_declarations() {
        let class = BaslerDeviceClass::new();
        let names: Vec<_> = class.device_properties.iter().map(|p| p.name).collect();
        assert_eq!(names, PROPERTY_NAMES);

        let packet = class.property("packet_size").unwrap();
        assert_eq!(packet.data_type, TangoType::DevLong);
        assert_eq!(packet.default, Some(serde_json::json!(8000)));
        assert_eq!(class.property("camera_id").unwrap().default, None);
        assert_eq!(
            class.property("force_video_mode").unwrap().default,
            Some(serde_json::json!("false"))
        );
    }

    #[test]
    fn single_command_declared() {
        let class = BaslerDeviceClass::new();
        assert_eq!(class.commands.len(), 1);
        let cmd = &class.commands[0];
        assert_eq!(cmd.name, "getAttrStringValueList");
        assert_eq!(cmd.in_type, TangoType::DevString);
        assert_eq!(cmd.out_type, TangoType::DevVarStringArray);
    }

    #[test]
    fn attribute_declarations() {
        let class = BaslerDeviceClass::new();
        assert_eq!(class.attributes.len(), 11);
        assert_eq!(class.attributes[0].name, "statistics_total_buffer_count");

        let temp = class.attribute("temperature").unwrap();
        assert_eq!(temp.access, AttrAccess::Read);
        assert_eq!(temp.data_type, TangoType::DevDouble);

        let tis = class.attribute("test_image_selector").unwrap();
        assert_eq!(tis.access, AttrAccess::ReadWrite);
        assert_eq!(tis.enum_labels.len(), 8);
        assert_eq!(class.attribute("output1_line_source").unwrap().enum_labels.len(), 7);
    }

    #[test]
    fn class_serializes_to_json() {
        let json = serde_json::to_value(BaslerDeviceClass::new()).unwrap();
        assert_eq!(json["name"], "Basler");
        assert_eq!(json["commands"][0]["out_type"], "DevVarStringArray");
        assert_eq!(json["attributes"][0]["access"], "READ");
    }

    #[test]
    fn attr_value_parsing() {
        assert_eq!(
            AttrValue::parse(TangoType::DevLong, "1500").unwrap(),
            AttrValue::Long(1500)
        );
        assert_eq!(
            AttrValue::parse(TangoType::DevBoolean, "true").unwrap(),
            AttrValue::Boolean(true)
        );
        assert!(AttrValue::parse(TangoType::DevBoolean, "yes").is_err());
        assert!(AttrValue::parse(TangoType::DevDouble, "warm").is_err());
    }
}
