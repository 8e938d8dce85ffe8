//! Basler device behaviour
//!
//! - Construction state and registration entry point
//! - getAttrStringValueList and attribute dispatch
//! - Parameter registry snapshot
//! - Configuration file loading with tempfile

#![allow(clippy::unwrap_used, clippy::expect_used)]

use basler_tango::config::ServerConfig;
use basler_tango::device::GET_ATTR_STRING_VALUE_LIST;
use basler_tango::{
    tango_class_and_device, AcquisitionHolder, AttrValue, BaslerDevice, DevState,
    DeviceProperties,
};
use lima_core::capabilities::{Commandable, Parameterized};
use lima_core::LimaError;
use lima_driver_basler::{SimulatedCameraSpec, SimulatedTransport, TransportLayer};
use std::io::Write;
use std::sync::Arc;

fn holder(spec: SimulatedCameraSpec) -> Arc<AcquisitionHolder> {
    let transport: Arc<dyn TransportLayer> = Arc::new(SimulatedTransport::new().with_camera(spec));
    Arc::new(AcquisitionHolder::new(transport, "id00_basler"))
}

async fn ace_device() -> BaslerDevice {
    let props = DeviceProperties {
        serial_number: Some("21000001".into()),
        ..DeviceProperties::default()
    };
    BaslerDevice::new(
        "id00/basler/1",
        props,
        holder(SimulatedCameraSpec::ace_mono("21000001", "192.168.10.5")),
    )
    .await
    .unwrap()
}

fn lima_error(err: &anyhow::Error) -> Option<&LimaError> {
    err.downcast_ref::<LimaError>()
}

#[tokio::test]
async fn device_starts_on() {
    let device = ace_device().await;
    assert_eq!(device.state(), DevState::On);
    assert_eq!(device.name(), "id00/basler/1");
    assert_eq!(device.camera().camera_id(), "sn://21000001");
}

#[tokio::test]
async fn registration_entry_point_builds_device() {
    let (class, construct) = tango_class_and_device();
    assert_eq!(class.name, "Basler");

    let device = construct(
        "id00/basler/2".to_string(),
        DeviceProperties::default(),
        holder(
            SimulatedCameraSpec::scout("22000001", "192.168.10.7").with_user_name("id00_basler"),
        ),
    )
    .await
    .unwrap();
    assert_eq!(device.camera().camera_id(), "uname://id00_basler");
}

#[tokio::test]
async fn string_value_lists() {
    let device = ace_device().await;

    let tokens = device.get_attr_string_value_list("test_image_selector");
    assert_eq!(tokens.len(), 8);
    assert_eq!(tokens[0], "TESTIMAGE_OFF");
    assert_eq!(tokens[7], "TESTIMAGE_7");

    let tokens = device.get_attr_string_value_list("output1_line_source");
    assert_eq!(tokens.len(), 7);
    assert!(tokens.contains(&"EXPOSURE_ACTIVE".to_string()));

    assert!(device.get_attr_string_value_list("temperature").is_empty());
    assert!(device.get_attr_string_value_list("no_such_attr").is_empty());

    let json = device
        .execute_command(GET_ATTR_STRING_VALUE_LIST, serde_json::json!("output1_line_source"))
        .await
        .unwrap();
    assert_eq!(json.as_array().unwrap().len(), 7);
    assert!(device.execute_command("Snap", serde_json::Value::Null).await.is_err());
}

#[tokio::test]
async fn enumerated_attributes_round_trip() {
    let device = ace_device().await;

    device
        .write_attribute("test_image_selector", AttrValue::String("TESTIMAGE_3".into()))
        .await
        .unwrap();
    assert_eq!(
        device.read_attribute("test_image_selector").await.unwrap(),
        AttrValue::String("TESTIMAGE_3".into())
    );

    device
        .write_attribute("output1_line_source", AttrValue::String("USER_OUTPUT".into()))
        .await
        .unwrap();
    assert_eq!(
        device.read_attribute("output1_line_source").await.unwrap(),
        AttrValue::String("USER_OUTPUT".into())
    );

    assert!(device
        .write_attribute("test_image_selector", AttrValue::String("TESTIMAGE_9".into()))
        .await
        .is_err());
}

#[tokio::test]
async fn numeric_attributes() {
    let device = ace_device().await;

    assert_eq!(
        device.read_attribute("temperature").await.unwrap(),
        AttrValue::Double(38.5)
    );
    assert_eq!(
        device.read_attribute("statistics_total_buffer_count").await.unwrap(),
        AttrValue::Long(0)
    );

    device
        .write_attribute("inter_packet_delay", AttrValue::Long(500))
        .await
        .unwrap();
    assert_eq!(
        device.read_attribute("inter_packet_delay").await.unwrap(),
        AttrValue::Long(500)
    );

    device.write_attribute("gain", AttrValue::Double(0.5)).await.unwrap();
    let gain = device.read_attribute("gain").await.unwrap();
    assert!(matches!(gain, AttrValue::Double(g) if (g - 0.5).abs() < 0.01));

    device
        .write_attribute("autogain", AttrValue::Boolean(true))
        .await
        .unwrap();
    assert_eq!(
        device.read_attribute("autogain").await.unwrap(),
        AttrValue::Boolean(true)
    );
}

#[tokio::test]
async fn parameter_snapshot_follows_writes() {
    let device = ace_device().await;
    device
        .write_attribute("inter_packet_delay", AttrValue::Long(750))
        .await
        .unwrap();

    let snapshot = device.parameter_snapshot().unwrap();
    assert_eq!(snapshot.len(), device.camera().parameters().len());

    let delay = &snapshot["inter_packet_delay"];
    assert_eq!(delay.value, serde_json::json!(750));
    assert_eq!(delay.metadata.units.as_deref(), Some("ticks"));
    assert!(!delay.metadata.read_only);
    assert!(snapshot["temperature"].metadata.read_only);
    assert_eq!(
        snapshot["output1_line_source"].metadata.enum_values.len(),
        7
    );

    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["inter_packet_delay"]["value"], 750);
    assert_eq!(json["inter_packet_delay"]["name"], "inter_packet_delay");
}

#[tokio::test]
async fn dispatch_errors() {
    let device = ace_device().await;

    let err = device.read_attribute("exposure_mode").await.unwrap_err();
    assert!(matches!(lima_error(&err), Some(LimaError::UnknownAttribute(_))));

    let err = device
        .write_attribute("temperature", AttrValue::Double(20.0))
        .await
        .unwrap_err();
    assert!(matches!(lima_error(&err), Some(LimaError::ReadOnlyAttribute(_))));

    let err = device
        .write_attribute("packet_size", AttrValue::String("jumbo".into()))
        .await
        .unwrap_err();
    assert!(matches!(lima_error(&err), Some(LimaError::InvalidValue(_))));
}

#[tokio::test]
async fn statistics_follow_acquisition() {
    let device = ace_device().await;
    let control = device.control();

    control.acquire(3).await.unwrap();
    for _ in 0..400 {
        if control.nb_hw_acquired_frames().await.unwrap() == 3 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    assert_eq!(
        device.read_attribute("statistics_total_buffer_count").await.unwrap(),
        AttrValue::Long(3)
    );
    assert_eq!(
        device.read_attribute("statistics_failed_buffer_count").await.unwrap(),
        AttrValue::Long(0)
    );
    control.stop_acq().await.unwrap();
}

#[test]
fn config_file_loading() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
[server]
instance_name = "id00_basler"
log_level = "debug"

[device]
serial_number = "21000001"
packet_size = 1500
force_video_mode = "true"
blank_image_for_missed = false

[[simulation.cameras]]
model_name = "acA1300-30gm"
serial_number = "21000001"
ip_address = "192.168.10.5"
"#
    )
    .unwrap();

    let config = ServerConfig::load_from(file.path()).unwrap();
    config.validate().unwrap();
    assert_eq!(config.server.instance_name, "id00_basler");
    assert_eq!(config.server.log_format, "pretty");
    assert_eq!(config.device.packet_size, 1500);
    assert!(config.device.force_video_mode);
    assert_eq!(config.device.blank_image_for_missed, Some(false));
    assert_eq!(config.device.inter_packet_delay, 0);
    assert_eq!(config.simulation.cameras.len(), 1);
}

#[test]
fn config_file_rejects_loose_booleans() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "[device]\nforce_video_mode = \"yes\"").unwrap();
    assert!(ServerConfig::load_from(file.path()).is_err());
}
