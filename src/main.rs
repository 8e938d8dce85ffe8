//! CLI entry point for the Basler device server.
//!
//! Builds the acquisition objects for one server instance on the simulated
//! GigE transport and runs a single request against the device.
//!
//! # Usage
//!
//! ```bash
//! basler-ds id00_basler --config config/basler.toml describe
//! basler-ds id00_basler -p serial_number=21234567 read temperature
//! basler-ds id00_basler write test_image_selector TESTIMAGE_2
//! basler-ds id00_basler values output1_line_source
//! basler-ds id00_basler params
//! basler-ds id00_basler -p blank_image_for_missed=true acquire 10
//! ```

use anyhow::{anyhow, Context, Result};
use basler_tango::{
    config::ServerConfig, logging, tango_class_and_device, AcquisitionHolder, AttrValue,
};
use clap::{Parser, Subcommand};
use lima_core::capabilities::Commandable;
use lima_driver_basler::{SimulatedCameraSpec, SimulatedTransport};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "basler-ds")]
#[command(about = "Tango device server for Basler GigE cameras", long_about = None)]
struct Cli {
    /// Device-server instance name
    instance: String,

    /// Configuration file
    #[arg(long, default_value = "config/basler.toml")]
    config: PathBuf,

    /// Device property override (repeatable), e.g. -p packet_size=1500
    #[arg(short = 'p', long = "property", value_parser = parse_key_val)]
    properties: Vec<(String, String)>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the class declarations as JSON
    Describe,
    /// Read an attribute
    Read { attribute: String },
    /// Write an attribute
    Write { attribute: String, value: String },
    /// List the legal values of an enumerated attribute
    Values { attribute: String },
    /// Print the camera parameters with their metadata as JSON
    Params,
    /// Acquire frames and print acquisition statistics
    Acquire {
        nb_frames: u64,
        /// Give up after this many seconds
        #[arg(long, default_value = "30")]
        timeout_secs: u64,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{s}'"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ServerConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config.server.instance_name = cli.instance.clone();
    config.device = config.device.with_overrides(cli.properties.clone())?;
    config.validate()?;
    logging::init_from_config(&config).map_err(|e| anyhow!(e))?;

    let (class, construct) = tango_class_and_device();
    if let Commands::Describe = cli.command {
        println!("{}", serde_json::to_string_pretty(&class)?);
        return Ok(());
    }

    let cameras = if config.simulation.cameras.is_empty() {
        tracing::warn!("No simulated cameras configured, using a default ACE camera");
        vec![SimulatedCameraSpec::ace_mono("21234567", "192.168.10.2")
            .with_user_name(&config.server.instance_name)]
    } else {
        config.simulation.cameras.clone()
    };
    let transport = Arc::new(SimulatedTransport::from_specs(cameras));
    let holder = Arc::new(AcquisitionHolder::new(
        transport,
        config.server.instance_name.clone(),
    ));

    let device_name = format!("{}/{}/1", class.name, config.server.instance_name);
    let device = construct(device_name, config.device.clone(), holder).await?;
    tracing::info!(device = device.name(), state = %device.state(), "device ready");

    match cli.command {
        Commands::Describe => {}
        Commands::Read { attribute } => {
            let value = device.read_attribute(&attribute).await?;
            println!("{attribute} = {value}");
        }
        Commands::Write { attribute, value } => {
            let descriptor = class
                .attribute(&attribute)
                .ok_or_else(|| anyhow!("Unknown attribute: {attribute}"))?;
            let parsed = AttrValue::parse(descriptor.data_type, &value)?;
            device.write_attribute(&attribute, parsed).await?;
            let readback = device.read_attribute(&attribute).await?;
            println!("{attribute} = {readback}");
        }
        Commands::Values { attribute } => {
            let values = device
                .execute_command(
                    basler_tango::device::GET_ATTR_STRING_VALUE_LIST,
                    serde_json::Value::String(attribute),
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&values)?);
        }
        Commands::Params => {
            let snapshot = device.parameter_snapshot()?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Commands::Acquire {
            nb_frames,
            timeout_secs,
        } => {
            let control = device.control();
            control.acquire(nb_frames).await?;

            let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout_secs);
            loop {
                let status = control.status().await?;
                if status.acq != lima_core::hw::AcqStatus::AcqRunning {
                    break;
                }
                if tokio::time::Instant::now() >= deadline {
                    control.stop_acq().await?;
                    break;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }

            let status = control.status().await?;
            println!("status: {:?}", status.acq);
            println!("frames: {}", control.nb_hw_acquired_frames().await?);
            for attr in ["statistics_total_buffer_count", "statistics_failed_buffer_count"] {
                println!("{attr}: {}", device.read_attribute(attr).await?);
            }
        }
    }

    Ok(())
}
