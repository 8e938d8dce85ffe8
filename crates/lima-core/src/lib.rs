//! `lima-core`
//!
//! Hardware-interface vocabulary shared by Lima camera plugins and the
//! device server that exposes them.
//!
//! ## Layers
//!
//! - **Plugin**: implements [`capabilities::HwInterface`] and the control
//!   object traits for one camera family
//! - **Control**: [`control::CtControl`] wraps a plugin interface and is the
//!   handle given to the device server
//! - **Device server**: publishes plugin parameters as named attributes
//!
//! ## Key Types
//!
//! - [`error::LimaError`]: typed error carried inside `anyhow::Error`
//! - [`parameter::Parameter`]: observable value bound to hardware callbacks
//! - [`hw::Roi`], [`hw::Bin`], [`hw::TrigMode`], [`hw::HwStatus`]: values
//!   exchanged with the hardware

pub use anyhow::{anyhow, Result};

pub mod capabilities;
pub mod control;
pub mod error;
pub mod hw;
pub mod observable;
pub mod parameter;

pub use error::{LimaError, LimaResult};
