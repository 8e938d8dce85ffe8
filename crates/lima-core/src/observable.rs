//! Observable values
//!
//! Reactive values built on `tokio::sync::watch` so that several consumers
//! (the device server, a logging task, tests) can follow a camera setting
//! without polling the hardware.
//!
//! # Example
//!
//! ```rust,ignore
//! let packet_size = Observable::new("packet_size", 8000_i64)
//!     .with_units("bytes")
//!     .with_range_introspectable(220, 16404);
//!
//! let mut rx = packet_size.subscribe();
//! packet_size.set(1500)?;
//! rx.changed().await?;
//! ```
//!
//! Constraint metadata (`dtype`, `min_value`, `max_value`, `enum_values`) is
//! kept next to the validator so that descriptors handed to the control
//! system always agree with what `set()` accepts.

use anyhow::{anyhow, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// Validator callback type.
pub type Validator<T> = Arc<dyn Fn(&T) -> Result<()> + Send + Sync>;

/// Metadata and validator shared by every clone of an [`Observable`].
///
/// `parking_lot::RwLock` keeps metadata reads synchronous and poison-free.
struct ObservableSharedState<T> {
    metadata: ObservableMetadata,
    validator: Option<Validator<T>>,
}

// =============================================================================
// ParameterBase Trait - Generic Parameter Access
// =============================================================================

/// Type-erased access to a registered value.
pub trait ParameterBase: Send + Sync {
    /// Parameter name
    fn name(&self) -> String;

    /// Last known value as JSON
    fn get_json(&self) -> Result<serde_json::Value>;

    /// Metadata snapshot
    fn metadata(&self) -> ObservableMetadata;
}

// =============================================================================
// Observable<T>
// =============================================================================

/// A thread-safe value with change notifications.
pub struct Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    sender: watch::Sender<T>,
    shared: Arc<RwLock<ObservableSharedState<T>>>,
}

impl<T: Clone + Send + Sync + 'static> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.shared.read();
        f.debug_struct("Observable")
            .field("metadata", &shared.metadata)
            .field("has_validator", &shared.validator.is_some())
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + Sync + 'static> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            shared: self.shared.clone(),
        }
    }
}

/// Descriptive and constraint metadata for an observable value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservableMetadata {
    /// Name, unique within its owner.
    pub name: String,

    /// Human-readable description.
    pub description: Option<String>,

    /// Physical units (e.g. "s", "°C", "bytes").
    pub units: Option<String>,

    /// Read-only values reject `set()`.
    pub read_only: bool,

    /// Data type hint: "float", "int", "bool", "string" or "enum".
    #[serde(default)]
    pub dtype: String,

    /// Lower bound for numeric values.
    #[serde(default)]
    pub min_value: Option<f64>,

    /// Upper bound for numeric values.
    #[serde(default)]
    pub max_value: Option<f64>,

    /// Legal tokens for enumerated values. Non-empty implies `dtype == "enum"`.
    #[serde(default)]
    pub enum_values: Vec<String>,
}

impl<T> Observable<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new observable with an initial value.
    pub fn new(name: impl Into<String>, initial_value: T) -> Self {
        let (sender, _) = watch::channel(initial_value);
        Self {
            sender,
            shared: Arc::new(RwLock::new(ObservableSharedState {
                metadata: ObservableMetadata {
                    name: name.into(),
                    ..Default::default()
                },
                validator: None,
            })),
        }
    }

    /// Add a description.
    pub fn with_description(self, description: impl Into<String>) -> Self {
        self.shared.write().metadata.description = Some(description.into());
        self
    }

    /// Add units.
    pub fn with_units(self, units: impl Into<String>) -> Self {
        self.shared.write().metadata.units = Some(units.into());
        self
    }

    /// Override the dtype hint.
    pub fn with_dtype(self, dtype: impl Into<String>) -> Self {
        self.shared.write().metadata.dtype = dtype.into();
        self
    }

    /// Mark as read-only.
    pub fn read_only(self) -> Self {
        self.shared.write().metadata.read_only = true;
        self
    }

    /// Current value (clone).
    pub fn get(&self) -> T {
        self.sender.borrow().clone()
    }

    /// Name.
    pub fn name(&self) -> String {
        self.shared.read().metadata.name.clone()
    }

    /// Metadata snapshot.
    pub fn metadata(&self) -> ObservableMetadata {
        self.shared.read().metadata.clone()
    }

    /// Validate a value without storing it.
    ///
    /// Fails when the value is read-only or the validator rejects it.
    pub fn validate(&self, value: &T) -> Result<()> {
        let guard = self.shared.read();
        if guard.metadata.read_only {
            return Err(anyhow!("Parameter '{}' is read-only", guard.metadata.name));
        }
        if let Some(validator) = &guard.validator {
            validator(value)?;
        }
        Ok(())
    }

    /// Validate and store a value, notifying subscribers.
    pub fn set(&self, value: T) -> Result<()> {
        self.validate(&value)?;
        self.sender.send_replace(value);
        Ok(())
    }

    /// Store a value reported by the hardware, bypassing validation.
    pub(crate) fn set_unchecked(&self, value: T) {
        self.sender.send_replace(value);
    }

    /// Subscribe to changes.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.sender.subscribe()
    }
}

impl Observable<f64> {
    /// Range validation that also publishes the bounds in the metadata.
    ///
    /// Non-finite values are always rejected.
    pub fn with_range_introspectable(self, min: f64, max: f64) -> Self {
        {
            let mut guard = self.shared.write();
            guard.metadata.min_value = Some(min);
            guard.metadata.max_value = Some(max);
            guard.metadata.dtype = "float".to_string();
            guard.validator = Some(Arc::new(move |value: &f64| {
                if !value.is_finite() {
                    return Err(anyhow!("Value must be finite, got {:?}", value));
                }
                if *value < min || *value > max {
                    Err(anyhow!(
                        "Value {:?} out of range [{:?}, {:?}]",
                        value,
                        min,
                        max
                    ))
                } else {
                    Ok(())
                }
            }));
        }
        self
    }
}

impl Observable<i64> {
    /// Range validation that also publishes the bounds in the metadata.
    pub fn with_range_introspectable(self, min: i64, max: i64) -> Self {
        {
            let mut guard = self.shared.write();
            guard.metadata.min_value = Some(min as f64);
            guard.metadata.max_value = Some(max as f64);
            guard.metadata.dtype = "int".to_string();
            guard.validator = Some(Arc::new(move |value: &i64| {
                if *value < min || *value > max {
                    Err(anyhow!(
                        "Value {:?} out of range [{:?}, {:?}]",
                        value,
                        min,
                        max
                    ))
                } else {
                    Ok(())
                }
            }));
        }
        self
    }
}

impl Observable<String> {
    /// Restrict to a fixed token list and publish it as `enum_values`.
    pub fn with_choices_introspectable(self, choices: Vec<String>) -> Self {
        {
            let mut guard = self.shared.write();
            guard.metadata.enum_values.clone_from(&choices);
            guard.metadata.dtype = "enum".to_string();
            guard.validator = Some(Arc::new(move |value: &String| {
                if choices.iter().any(|c| c == value) {
                    Ok(())
                } else {
                    Err(anyhow!("Value {:?} not in choices {:?}", value, choices))
                }
            }));
        }
        self
    }
}

impl<T> Observable<T>
where
    T: Clone + Send + Sync + Serialize + 'static,
{
    /// Current value as JSON.
    pub fn get_json(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self.get())
            .map_err(|e| anyhow!("Failed to serialize parameter '{}': {}", self.name(), e))
    }
}

// =============================================================================
// ParameterSet - Collection of Observables
// =============================================================================

/// Named collection of parameters owned by a device.
#[derive(Default)]
pub struct ParameterSet {
    parameters: std::collections::BTreeMap<String, Box<dyn ParameterBase>>,
}

impl std::fmt::Debug for ParameterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterSet")
            .field("names", &self.names())
            .finish()
    }
}

impl ParameterSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parameter under its own name.
    pub fn register<P>(&mut self, parameter: P)
    where
        P: ParameterBase + 'static,
    {
        let name = parameter.name();
        self.parameters.insert(name, Box::new(parameter));
    }

    /// Iterate in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn ParameterBase)> {
        self.parameters
            .iter()
            .map(|(name, param)| (name.as_str(), param.as_ref()))
    }

    /// Sorted parameter names.
    pub fn names(&self) -> Vec<&str> {
        self.parameters.keys().map(|s| s.as_str()).collect()
    }

    /// Number of registered parameters.
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_observable_basic() {
        let obs = Observable::new("packet_size", 8000_i64);
        assert_eq!(obs.get(), 8000);
        assert_eq!(obs.name(), "packet_size");

        obs.set(1500).unwrap();
        assert_eq!(obs.get(), 1500);
    }

    #[test]
    fn test_observable_read_only() {
        let obs = Observable::new("model", "acA1300-30gm".to_string()).read_only();

        assert!(obs.set("scA640".to_string()).is_err());
        assert_eq!(obs.get(), "acA1300-30gm");
    }

    #[test]
    fn test_introspectable_range_publishes_bounds() {
        let obs = Observable::new("exposure", 0.01).with_range_introspectable(1e-6, 1.0);
        let meta = obs.metadata();

        assert_eq!(meta.dtype, "float");
        assert_eq!(meta.min_value, Some(1e-6));
        assert_eq!(meta.max_value, Some(1.0));
        assert!(obs.set(f64::NAN).is_err());
    }

    #[test]
    fn test_choices_publish_enum_values() {
        let obs = Observable::new("mode", "OFF".to_string())
            .with_choices_introspectable(vec!["OFF".into(), "ON".into()]);

        assert_eq!(obs.metadata().dtype, "enum");
        assert_eq!(obs.metadata().enum_values, vec!["OFF", "ON"]);
        assert!(obs.set("ON".into()).is_ok());
        assert!(obs.set("MAYBE".into()).is_err());
    }

    #[tokio::test]
    async fn test_observable_subscription() {
        let obs = Observable::new("value", 0_i64);
        let mut rx = obs.subscribe();
        assert_eq!(*rx.borrow(), 0);

        obs.set(42).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 42);
    }
}
