//! Parameter<T> - observable values bound to camera hardware
//!
//! `Parameter<T>` composes an [`Observable<T>`] with optional asynchronous
//! hardware hooks:
//!
//! ```text
//! param.set(value)
//!   1. validate (range / choices / read-only)
//!   2. hardware writer, if connected
//!   3. store + notify subscribers
//! ```
//!
//! Read-only camera values (temperature, buffer statistics) connect only a
//! reader and are refreshed with [`Parameter::read_from_hardware`].
//!
//! ```rust,ignore
//! let mut packet_size = Parameter::new("packet_size", 8000_i64)
//!     .with_unit("bytes");
//! packet_size.connect_to_hardware_write(move |val| {
//!     let device = device.clone();
//!     Box::pin(async move { device.lock().await.set_int("GevSCPSPacketSize", val) })
//! });
//! packet_size.set(1500).await?;
//! ```

use anyhow::Result;
use futures::future::BoxFuture;
use serde::Serialize;
use std::fmt::Debug;
use std::sync::Arc;

use crate::error::LimaError;
use crate::observable::{Observable, ObservableMetadata, ParameterBase};

type HardwareWriter<T> = Arc<dyn Fn(T) -> BoxFuture<'static, Result<(), LimaError>> + Send + Sync>;
type HardwareReader<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, LimaError>> + Send + Sync>;

/// Observable value with hardware write/read callbacks.
#[derive(Clone)]
pub struct Parameter<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    inner: Observable<T>,
    hardware_writer: Option<HardwareWriter<T>>,
    hardware_reader: Option<HardwareReader<T>>,
}

impl<T> std::fmt::Debug for Parameter<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parameter")
            .field("name", &self.inner.name())
            .field("value", &self.inner.get())
            .field("has_writer", &self.hardware_writer.is_some())
            .field("has_reader", &self.hardware_reader.is_some())
            .finish()
    }
}

impl<T> Parameter<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    /// Create a parameter with an initial value and no hardware hooks.
    pub fn new(name: impl Into<String>, initial: T) -> Self {
        Self {
            inner: Observable::new(name, initial),
            hardware_writer: None,
            hardware_reader: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.inner = self.inner.with_description(description);
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.inner = self.inner.with_units(unit);
        self
    }

    pub fn with_dtype(mut self, dtype: impl Into<String>) -> Self {
        self.inner = self.inner.with_dtype(dtype);
        self
    }

    pub fn read_only(mut self) -> Self {
        self.inner = self.inner.read_only();
        self
    }

    pub fn connect_to_hardware_write(
        &mut self,
        writer: impl Fn(T) -> BoxFuture<'static, Result<(), LimaError>> + Send + Sync + 'static,
    ) {
        self.hardware_writer = Some(Arc::new(writer));
    }

    pub fn connect_to_hardware_read(
        &mut self,
        reader: impl Fn() -> BoxFuture<'static, Result<T, LimaError>> + Send + Sync + 'static,
    ) {
        self.hardware_reader = Some(Arc::new(reader));
    }

    /// Last known value. Does not touch the hardware.
    pub fn get(&self) -> T {
        self.inner.get()
    }

    /// Validate, write to hardware, store, notify.
    ///
    /// Nothing is stored when validation or the hardware write fails.
    pub async fn set(&self, value: T) -> Result<()> {
        self.inner.validate(&value)?;

        if let Some(writer) = &self.hardware_writer {
            writer(value.clone()).await?;
        }

        self.inner.set_unchecked(value);
        Ok(())
    }

    /// Refresh the stored value from the hardware reader and return it.
    pub async fn read_from_hardware(&self) -> Result<T> {
        let reader = self
            .hardware_reader
            .as_ref()
            .ok_or(LimaError::ParameterNoHardwareReader)?;

        let value = reader().await?;
        // hardware is the source of truth, skip validation
        self.inner.set_unchecked(value.clone());
        Ok(value)
    }

    /// Store a value observed elsewhere (e.g. by the acquisition task).
    pub async fn update_from_hardware(&self, value: T) {
        self.inner.set_unchecked(value);
    }

    /// Reader if connected, otherwise the last known value.
    pub async fn current(&self) -> Result<T> {
        if self.hardware_reader.is_some() {
            self.read_from_hardware().await
        } else {
            Ok(self.get())
        }
    }

    pub fn name(&self) -> String {
        self.inner.name()
    }

    pub fn metadata(&self) -> ObservableMetadata {
        self.inner.metadata()
    }
}

impl Parameter<String> {
    /// Token list validation, published as `enum_values`.
    pub fn with_choices_introspectable(mut self, choices: Vec<String>) -> Self {
        self.inner = self.inner.with_choices_introspectable(choices);
        self
    }

    /// Legal tokens, empty for free-form strings.
    pub fn choices(&self) -> Vec<String> {
        self.inner.metadata().enum_values
    }
}

impl Parameter<f64> {
    pub fn with_range_introspectable(mut self, min: f64, max: f64) -> Self {
        self.inner = self.inner.with_range_introspectable(min, max);
        self
    }
}

impl Parameter<i64> {
    pub fn with_range_introspectable(mut self, min: i64, max: i64) -> Self {
        self.inner = self.inner.with_range_introspectable(min, max);
        self
    }
}

impl<T> ParameterBase for Parameter<T>
where
    T: Clone + Send + Sync + PartialEq + Debug + Serialize + 'static,
{
    fn name(&self) -> String {
        self.inner.name()
    }

    fn get_json(&self) -> Result<serde_json::Value> {
        self.inner.get_json()
    }

    fn metadata(&self) -> ObservableMetadata {
        self.inner.metadata()
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    #[tokio::test]
    async fn set_writes_hardware_before_storing() {
        let written = Arc::new(AtomicI64::new(0));
        let mut param = Parameter::new("packet_size", 8000_i64);
        param.connect_to_hardware_write({
            let written = written.clone();
            move |val| {
                let written = written.clone();
                Box::pin(async move {
                    written.store(val, Ordering::SeqCst);
                    Ok(())
                })
            }
        });

        param.set(1500).await.unwrap();
        assert_eq!(written.load(Ordering::SeqCst), 1500);
        assert_eq!(param.get(), 1500);
    }

    #[tokio::test]
    async fn failed_hardware_write_keeps_old_value() {
        let mut param = Parameter::new("frame_transmission_delay", 0_i64);
        param.connect_to_hardware_write(|_| {
            Box::pin(async { Err(LimaError::hardware("node not writable")) })
        });

        assert!(param.set(10).await.is_err());
        assert_eq!(param.get(), 0);
    }

    #[tokio::test]
    async fn validation_runs_before_hardware() {
        let calls = Arc::new(AtomicI64::new(0));
        let mut param = Parameter::new("line_source", "OFF".to_string())
            .with_choices_introspectable(vec!["OFF".into(), "USER_OUTPUT".into()]);
        param.connect_to_hardware_write({
            let calls = calls.clone();
            move |_| {
                let calls = calls.clone();
                Box::pin(async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }
        });

        assert!(param.set("TIMER".into()).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(param.choices().len(), 2);
    }

    #[tokio::test]
    async fn read_from_hardware_refreshes_read_only_value() {
        let mut param = Parameter::new("temperature", 0.0).read_only();
        param.connect_to_hardware_read(|| Box::pin(async { Ok(41.5) }));

        assert!(param.set(10.0).await.is_err());
        assert_eq!(param.read_from_hardware().await.unwrap(), 41.5);
        assert_eq!(param.get(), 41.5);
    }

    #[tokio::test]
    async fn missing_reader_is_reported() {
        let param = Parameter::new("gain", 0.0);
        let err = param.read_from_hardware().await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<LimaError>(),
            Some(&LimaError::ParameterNoHardwareReader)
        );
        assert_eq!(param.current().await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn parameter_set_exposes_json_values() {
        use crate::observable::ParameterSet;

        let temperature = Parameter::new("temperature", 38.5)
            .with_unit("°C")
            .read_only();
        let packet_size = Parameter::new("packet_size", 8000_i64).with_dtype("int");

        let mut params = ParameterSet::new();
        params.register(temperature);
        params.register(packet_size.clone());
        packet_size.set(1500).await.unwrap();

        assert_eq!(params.names(), vec!["packet_size", "temperature"]);
        let values: Vec<_> = params
            .iter()
            .map(|(name, p)| (name, p.get_json().unwrap()))
            .collect();
        assert_eq!(
            values,
            vec![
                ("packet_size", serde_json::json!(1500)),
                ("temperature", serde_json::json!(38.5)),
            ]
        );
        let (_, temp) = params.iter().last().unwrap();
        assert!(temp.metadata().read_only);
        assert_eq!(temp.metadata().units.as_deref(), Some("°C"));
    }
}
