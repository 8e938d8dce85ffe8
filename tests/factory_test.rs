//! Acquisition holder behaviour against the simulated transport
//!
//! - Identity resolution through the device properties
//! - Single construction across repeated and concurrent calls
//! - Late application of `blank_image_for_missed`
//! - Configuration errors for malformed boolean flags

#![allow(clippy::unwrap_used, clippy::expect_used)]

use basler_tango::{AcquisitionHolder, DeviceProperties};
use lima_core::hw::HwCapType;
use lima_core::LimaError;
use lima_driver_basler::{SimulatedCameraSpec, SimulatedTransport, TransportLayer};
use std::sync::Arc;

fn bench() -> Arc<SimulatedTransport> {
    Arc::new(
        SimulatedTransport::new()
            .with_camera(
                SimulatedCameraSpec::ace_mono("21000001", "192.168.10.5").with_user_name("bench"),
            )
            .with_camera(
                SimulatedCameraSpec::ace_color("21000002", "192.168.10.6")
                    .with_user_name("id00_basler"),
            ),
    )
}

fn holder(transport: &Arc<SimulatedTransport>) -> AcquisitionHolder {
    let dyn_transport: Arc<dyn TransportLayer> = transport.clone();
    AcquisitionHolder::new(dyn_transport, "id00_basler")
}

#[tokio::test]
async fn builds_once_and_reuses_interface() {
    let transport = bench();
    let holder = holder(&transport);

    let first = DeviceProperties {
        serial_number: Some("21000001".into()),
        ..DeviceProperties::default()
    };
    let ctrl_a = holder.get_control(&first).await.unwrap();

    // later configuration values are ignored
    let second = DeviceProperties {
        serial_number: Some("21000002".into()),
        packet_size: 1500,
        ..DeviceProperties::default()
    };
    let ctrl_b = holder.get_control(&second).await.unwrap();

    assert!(ctrl_a.same_interface(&ctrl_b));
    assert_eq!(transport.devices_created(), 1);
    assert_eq!(holder.camera().unwrap().device_info().serial_number, "21000001");
}

#[tokio::test]
async fn concurrent_first_calls_construct_one_camera() {
    let transport = bench();
    let holder = Arc::new(holder(&transport));
    let props = DeviceProperties {
        user_name: Some("bench".into()),
        ..DeviceProperties::default()
    };

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let holder = holder.clone();
            let props = props.clone();
            tokio::spawn(async move { holder.get_control(&props).await.unwrap() })
        })
        .collect();

    let mut controls = Vec::new();
    for handle in handles {
        controls.push(handle.await.unwrap());
    }

    assert_eq!(transport.devices_created(), 1);
    assert!(controls.windows(2).all(|w| w[0].same_interface(&w[1])));
}

#[tokio::test]
async fn instance_name_is_fallback_identity() {
    let transport = bench();
    let holder = holder(&transport);

    holder.get_control(&DeviceProperties::default()).await.unwrap();
    let camera = holder.camera().unwrap();
    assert_eq!(camera.camera_id(), "uname://id00_basler");
    assert_eq!(camera.device_info().serial_number, "21000002");
}

#[tokio::test]
async fn delays_and_packet_size_applied_on_build() {
    let transport = bench();
    let holder = holder(&transport);
    let props = DeviceProperties::from_properties([
        ("cam_ip_address", "192.168.10.5"),
        ("packet_size", "1500"),
        ("inter_packet_delay", "300"),
        ("frame_transmission_delay", "1200"),
    ])
    .unwrap();

    holder.get_control(&props).await.unwrap();
    let camera = holder.camera().unwrap();
    assert_eq!(camera.packet_size().current().await.unwrap(), 1500);
    assert_eq!(camera.inter_packet_delay().current().await.unwrap(), 300);
    assert_eq!(camera.frame_transmission_delay().current().await.unwrap(), 1200);
}

#[tokio::test]
async fn force_video_mode_publishes_video_capability() {
    let props = |force: &str| {
        DeviceProperties::from_properties([
            ("serial_number", "21000001"),
            ("force_video_mode", force),
        ])
    };

    let transport = bench();
    let ctrl = holder(&transport)
        .get_control(&props("true").unwrap())
        .await
        .unwrap();
    assert!(ctrl.has_cap(HwCapType::Video));

    let transport = bench();
    let ctrl = holder(&transport)
        .get_control(&props("false").unwrap())
        .await
        .unwrap();
    assert!(!ctrl.has_cap(HwCapType::Video));

    assert!(props("TRUE").is_err());
}

#[tokio::test]
async fn blank_image_flag_reaches_cached_interface() {
    let transport = bench();
    let holder = holder(&transport);
    let mut props = DeviceProperties {
        serial_number: Some("21000001".into()),
        ..DeviceProperties::default()
    };

    holder.get_control(&props).await.unwrap();
    let interface = holder.interface().unwrap();
    assert!(!interface.blank_image_for_missed());

    props.blank_image_for_missed = Some(true);
    holder.get_control(&props).await.unwrap();
    assert!(interface.blank_image_for_missed());
    assert_eq!(transport.devices_created(), 1);

    // absent flag leaves the current setting alone
    props.blank_image_for_missed = None;
    holder.get_control(&props).await.unwrap();
    assert!(interface.blank_image_for_missed());
}

#[tokio::test]
async fn failed_build_leaves_holder_empty() {
    let transport = bench();
    let holder = holder(&transport);

    let missing = DeviceProperties {
        serial_number: Some("99999999".into()),
        ..DeviceProperties::default()
    };
    let err = holder.get_control(&missing).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<LimaError>(),
        Some(LimaError::CameraNotFound(_))
    ));
    assert!(holder.interface().is_none());

    let present = DeviceProperties {
        serial_number: Some("21000001".into()),
        ..DeviceProperties::default()
    };
    holder.get_control(&present).await.unwrap();
    assert!(holder.interface().is_some());
}
