//! Error types shared by camera plugins and the device server.
//!
//! `LimaError` is the single typed error of the hardware layer. Plugins
//! return `anyhow::Result` and wrap a `LimaError` inside it, so callers that
//! care about the category can `downcast_ref::<LimaError>()` while everything
//! else just propagates with `?`.
//!
//! ## Categories
//!
//! - **`Configuration`**: a configuration value that parses but is not
//!   acceptable (e.g. a boolean flag spelled `"yes"`).
//! - **`InvalidValue`** / **`NotSupported`**: a request the hardware layer
//!   refuses (unsupported trigger mode, unknown video mode).
//! - **`Hardware`**: anything reported by the camera transport itself.
//! - **`NoCameraPresent`** / **`CameraNotFound`**: device lookup failures.
//! - **`UnknownAttribute`** / **`ReadOnlyAttribute`**: attribute dispatch
//!   failures raised by the device server.

use thiserror::Error;

/// Convenience alias for results using the hardware error type.
pub type LimaResult<T> = std::result::Result<T, LimaError>;

/// Primary error type for the hardware layer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LimaError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Hardware error: {0}")]
    Hardware(String),

    #[error("No camera present!")]
    NoCameraPresent,

    #[error("Camera not found!")]
    CameraNotFound(String),

    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    #[error("Attribute '{0}' is read-only")]
    ReadOnlyAttribute(String),

    #[error("Parameter has no hardware reader")]
    ParameterNoHardwareReader,
}

impl LimaError {
    /// Build a hardware error from anything displayable.
    pub fn hardware(message: impl std::fmt::Display) -> Self {
        LimaError::Hardware(message.to_string())
    }

    /// True for errors caused by the caller's configuration rather than the device.
    pub fn is_configuration(&self) -> bool {
        matches!(self, LimaError::Configuration(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_errors_keep_plugin_wording() {
        assert_eq!(LimaError::NoCameraPresent.to_string(), "No camera present!");
        assert_eq!(
            LimaError::CameraNotFound("sn://123".into()).to_string(),
            "Camera not found!"
        );
    }

    #[test]
    fn downcast_through_anyhow() {
        let err: anyhow::Error = LimaError::Configuration("bad flag".into()).into();
        let inner = err.downcast_ref::<LimaError>();
        assert!(matches!(inner, Some(e) if e.is_configuration()));
    }
}
