//! Transport runtime reference counting.
//!
//! Kept in its own test binary: the count is process-global.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use lima_driver_basler::{runtime_ref_count, Camera, SimulatedCameraSpec, SimulatedTransport, TransportLayer};
use serial_test::serial;
use std::sync::Arc;

fn two_cameras() -> Arc<dyn TransportLayer> {
    Arc::new(
        SimulatedTransport::new()
            .with_camera(SimulatedCameraSpec::ace_mono("100", "10.1.0.1"))
            .with_camera(SimulatedCameraSpec::scout("200", "10.1.0.2")),
    )
}

#[tokio::test]
#[serial]
async fn runtime_held_while_cameras_open() {
    let transport = two_cameras();
    let before = runtime_ref_count();

    let first = Camera::open(transport.clone(), "sn://100", 8000).await.unwrap();
    assert_eq!(runtime_ref_count(), before + 1);
    let second = Camera::open(transport, "sn://200", 8000).await.unwrap();
    assert_eq!(runtime_ref_count(), before + 2);

    drop(first);
    assert_eq!(runtime_ref_count(), before + 1);
    drop(second);
    assert_eq!(runtime_ref_count(), before);
}

#[tokio::test]
#[serial]
async fn failed_open_releases_runtime() {
    let before = runtime_ref_count();
    assert!(Camera::open(two_cameras(), "sn://999", 8000).await.is_err());
    assert_eq!(runtime_ref_count(), before);
}
