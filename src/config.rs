//! Device-server configuration using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (`config/basler.toml` by default)
//! 2. environment variables prefixed with `LIMA_BASLER_` (`__` separates
//!    nesting, e.g. `LIMA_BASLER_DEVICE__PACKET_SIZE=1500`)
//!
//! The `[device]` table carries the Tango device properties. Hosts that hand
//! properties over as untyped strings go through
//! [`DeviceProperties::from_properties`], which applies the same coercion.
//!
//! # Example
//! ```no_run
//! use basler_tango::config::ServerConfig;
//!
//! let config = ServerConfig::load_from("config/basler.toml")?;
//! config.validate()?;
//! println!("Instance: {}", config.server.instance_name);
//! # Ok::<(), basler_tango::config::ConfigError>(())
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use lima_driver_basler::SimulatedCameraSpec;
use serde::{de, Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "LIMA_BASLER_";

/// Configuration loading failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(Box::new(err))
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server process settings
    #[serde(default)]
    pub server: ServerSection,
    /// Tango device properties
    #[serde(default)]
    pub device: DeviceProperties,
    /// Cameras exposed by the simulated transport
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Server process settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// Device-server instance name, used as fallback camera user name
    #[serde(default = "default_instance_name")]
    pub instance_name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

/// Device properties of the Basler device class.
///
/// At most one of the four identity properties is expected; when several
/// are present the first in `camera_id`, `serial_number`, `cam_ip_address`,
/// `user_name` order wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProperties {
    #[serde(default, deserialize_with = "opt_string")]
    pub camera_id: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub cam_ip_address: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub serial_number: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub user_name: Option<String>,
    /// GevSCPD, in timestamp ticks
    #[serde(default, deserialize_with = "int_or_string")]
    pub inter_packet_delay: i64,
    /// GevSCFTD, in timestamp ticks
    #[serde(default, deserialize_with = "int_or_string")]
    pub frame_transmission_delay: i64,
    /// Network packet size (MTU); 0 keeps the camera setting
    #[serde(default = "default_packet_size", deserialize_with = "int_or_string")]
    pub packet_size: i64,
    /// Publish the video capability even on monochrome cameras
    #[serde(default, deserialize_with = "strict_bool")]
    pub force_video_mode: bool,
    /// Only applied when present
    #[serde(default, deserialize_with = "strict_opt_bool")]
    pub blank_image_for_missed: Option<bool>,
}

impl Default for DeviceProperties {
    fn default() -> Self {
        Self {
            camera_id: None,
            cam_ip_address: None,
            serial_number: None,
            user_name: None,
            inter_packet_delay: 0,
            frame_transmission_delay: 0,
            packet_size: default_packet_size(),
            force_video_mode: false,
            blank_image_for_missed: None,
        }
    }
}

/// Simulated GigE transport contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub cameras: Vec<SimulatedCameraSpec>,
}

// Default value functions
fn default_instance_name() -> String {
    "basler".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_packet_size() -> i64 {
    8000
}

/// Parse a boolean flag. Only `true` and `false` are accepted.
pub fn parse_bool_flag(name: &str, value: &str) -> Result<bool, String> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(format!(
            "{name}: expected 'true' or 'false', got '{other}'"
        )),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolOrString {
    Bool(bool),
    Str(String),
}

impl BoolOrString {
    fn into_bool<E: de::Error>(self) -> Result<bool, E> {
        match self {
            BoolOrString::Bool(b) => Ok(b),
            BoolOrString::Str(s) => parse_bool_flag("flag", &s).map_err(E::custom),
        }
    }
}

fn strict_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    BoolOrString::deserialize(deserializer)?.into_bool()
}

fn strict_opt_bool<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<bool>, D::Error> {
    Option::<BoolOrString>::deserialize(deserializer)?
        .map(BoolOrString::into_bool)
        .transpose()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IntOrString {
    Int(i64),
    Str(String),
}

// Environment values like `21234567` arrive as numbers
fn opt_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(
        Option::<IntOrString>::deserialize(deserializer)?.map(|v| match v {
            IntOrString::Int(i) => i.to_string(),
            IntOrString::Str(s) => s,
        }),
    )
}

fn int_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match IntOrString::deserialize(deserializer)? {
        IntOrString::Int(v) => Ok(v),
        IntOrString::Str(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("expected an integer, got '{s}'"))),
    }
}

impl ServerConfig {
    /// Load configuration from `config/basler.toml` and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config/basler.toml")
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.server.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.server.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.server.log_format.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.server.log_format,
                valid_formats.join(", ")
            )));
        }

        if self.server.instance_name.is_empty() {
            return Err(ConfigError::Invalid(
                "instance_name cannot be empty".to_string(),
            ));
        }

        self.device.validate().map_err(ConfigError::Invalid)
    }
}

impl DeviceProperties {
    /// Build properties from Tango-style string pairs.
    ///
    /// Unknown keys are rejected, as are non-integer numbers and boolean
    /// flags other than `true`/`false`.
    pub fn from_properties<I, K, V>(pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: BTreeMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        if let Some(unknown) = map
            .keys()
            .find(|k| !crate::device::PROPERTY_NAMES.contains(&k.as_str()))
        {
            return Err(ConfigError::Invalid(format!(
                "Unknown device property '{unknown}'"
            )));
        }

        let props: DeviceProperties = Figment::from(Serialized::defaults(map)).extract()?;
        props.validate().map_err(ConfigError::Invalid)?;
        Ok(props)
    }

    /// Properties as Tango-style strings. Unset identity properties are omitted.
    pub fn to_properties(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        let identity = [
            ("camera_id", &self.camera_id),
            ("cam_ip_address", &self.cam_ip_address),
            ("serial_number", &self.serial_number),
            ("user_name", &self.user_name),
        ];
        for (name, value) in identity {
            if let Some(v) = value {
                map.insert(name.to_string(), v.clone());
            }
        }
        map.insert("inter_packet_delay".into(), self.inter_packet_delay.to_string());
        map.insert(
            "frame_transmission_delay".into(),
            self.frame_transmission_delay.to_string(),
        );
        map.insert("packet_size".into(), self.packet_size.to_string());
        map.insert("force_video_mode".into(), self.force_video_mode.to_string());
        if let Some(blank) = self.blank_image_for_missed {
            map.insert("blank_image_for_missed".into(), blank.to_string());
        }
        map
    }

    /// Apply string overrides on top of these properties.
    pub fn with_overrides<I, K, V>(&self, pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = self.to_properties();
        map.extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        Self::from_properties(map)
    }

    /// Check numeric ranges.
    pub fn validate(&self) -> Result<(), String> {
        if self.packet_size < 0 {
            return Err(format!("packet_size must be >= 0, got {}", self.packet_size));
        }
        if self.inter_packet_delay < 0 {
            return Err(format!(
                "inter_packet_delay must be >= 0, got {}",
                self.inter_packet_delay
            ));
        }
        if self.frame_transmission_delay < 0 {
            return Err(format!(
                "frame_transmission_delay must be >= 0, got {}",
                self.frame_transmission_delay
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_property_table() {
        let props = DeviceProperties::default();
        assert_eq!(props.packet_size, 8000);
        assert_eq!(props.inter_packet_delay, 0);
        assert_eq!(props.frame_transmission_delay, 0);
        assert!(!props.force_video_mode);
        assert_eq!(props.blank_image_for_missed, None);
    }

    #[test]
    fn string_properties_are_coerced() {
        let props = DeviceProperties::from_properties([
            ("serial_number", "21234567"),
            ("packet_size", "1500"),
            ("inter_packet_delay", "250"),
            ("force_video_mode", "true"),
            ("blank_image_for_missed", "false"),
        ])
        .unwrap();

        assert_eq!(props.serial_number.as_deref(), Some("21234567"));
        assert_eq!(props.packet_size, 1500);
        assert_eq!(props.inter_packet_delay, 250);
        assert!(props.force_video_mode);
        assert_eq!(props.blank_image_for_missed, Some(false));
    }

    #[test]
    fn bool_flags_are_strict() {
        for bad in ["True", "yes", "1", ""] {
            let err = DeviceProperties::from_properties([("force_video_mode", bad)]);
            assert!(err.is_err(), "'{bad}' should be rejected");
        }
        assert!(DeviceProperties::from_properties([("blank_image_for_missed", "on")]).is_err());
    }

    #[test]
    fn bad_numbers_and_keys_rejected() {
        assert!(DeviceProperties::from_properties([("packet_size", "jumbo")]).is_err());
        assert!(DeviceProperties::from_properties([("packet_size", "-1")]).is_err());
        assert!(DeviceProperties::from_properties([("mtu", "9000")]).is_err());
    }

    #[test]
    fn overrides_keep_unrelated_properties() {
        let base = DeviceProperties {
            user_name: Some("bench".into()),
            packet_size: 1500,
            ..DeviceProperties::default()
        };
        let merged = base
            .with_overrides([("blank_image_for_missed", "true"), ("packet_size", "9000")])
            .unwrap();

        assert_eq!(merged.user_name.as_deref(), Some("bench"));
        assert_eq!(merged.packet_size, 9000);
        assert_eq!(merged.blank_image_for_missed, Some(true));
        assert_eq!(base.with_overrides(Vec::<(String, String)>::new()).unwrap(), base);
    }

    #[test]
    fn validate_rejects_bad_log_level() {
        let mut config = ServerConfig::default();
        config.server.log_level = "verbose".into();
        assert!(config.validate().is_err());

        config.server.log_level = "debug".into();
        config.server.log_format = "xml".into();
        assert!(config.validate().is_err());

        config.server.log_format = "json".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_bool_flag_message_names_property() {
        let err = parse_bool_flag("force_video_mode", "maybe").unwrap_err();
        assert!(err.contains("force_video_mode"));
        assert!(err.contains("maybe"));
    }
}
