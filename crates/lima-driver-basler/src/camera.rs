//! Basler camera.
//!
//! `Camera` owns the connection to one GigE camera and its grab task, and
//! publishes the Basler specific features as [`Parameter`]s:
//!
//! | parameter | node | access |
//! |-----------|------|--------|
//! | `packet_size` | GevSCPSPacketSize | rw |
//! | `inter_packet_delay` | GevSCPD | rw |
//! | `frame_transmission_delay` | GevSCFTD | rw |
//! | `test_image_selector` | TestImageSelector | rw |
//! | `output1_line_source` | LineSource (Out1) | rw |
//! | `gain` | GainRaw, normalised | rw |
//! | `autogain` | GainAuto | rw |
//! | `temperature` | TemperatureAbs | ro |
//! | `frame_rate` | ResultingFrameRateAbs | ro |
//! | `statistics_total_buffer_count` | grab task | ro |
//! | `statistics_failed_buffer_count` | grab task | ro |

use crate::components::acquisition::{BaslerAcquisition, CameraStatus, GrabSettings};
use crate::components::connection::{BaslerConnection, DeviceInfo, GigeDevice, TransportLayer};
use crate::components::features::{
    nodes, BaslerFeatures, LineSource, TestImage, INIT_PIXEL_FORMATS, PIXEL_SIZE_M,
};
use anyhow::{anyhow, Result};
use lima_core::capabilities::Parameterized;
use lima_core::error::LimaError;
use lima_core::hw::{Bin, Frame, ImageType, Roi, Size, TrigMode, VideoMode};
use lima_core::observable::ParameterSet;
use lima_core::parameter::Parameter;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};

/// Buffers queued on the stream grabber.
const NB_BUFFERS: usize = 16;

/// Extra formats tried on colour cameras after the monochrome ones.
const COLOR_PIXEL_FORMATS: [&str; 3] = ["BayerRG8", "BayerBG8", "RGB8Packed"];

fn into_lima_error(e: anyhow::Error) -> LimaError {
    match e.downcast::<LimaError>() {
        Ok(lima) => lima,
        Err(other) => LimaError::Hardware(other.to_string()),
    }
}

fn connect_device_reader<T>(
    param: &mut Parameter<T>,
    connection: &Arc<Mutex<BaslerConnection>>,
    read: fn(&mut dyn GigeDevice) -> Result<T>,
) where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    let connection = connection.clone();
    param.connect_to_hardware_read(move || {
        let connection = connection.clone();
        Box::pin(async move {
            let mut conn = connection.lock().await;
            read(conn.device_mut()).map_err(into_lima_error)
        })
    });
}

fn connect_device_writer<T>(
    param: &mut Parameter<T>,
    connection: &Arc<Mutex<BaslerConnection>>,
    write: fn(&mut dyn GigeDevice, T) -> Result<()>,
) where
    T: Clone + Send + Sync + PartialEq + Debug + 'static,
{
    let connection = connection.clone();
    let name = param.name();
    param.connect_to_hardware_write(move |value| {
        let connection = connection.clone();
        let name = name.clone();
        Box::pin(async move {
            tracing::debug!("{} <- {:?}", name, value);
            let mut conn = connection.lock().await;
            write(conn.device_mut(), value).map_err(into_lima_error)
        })
    });
}

/// Basler camera attached through a transport layer.
pub struct Camera {
    camera_id: String,
    info: DeviceInfo,
    is_color: bool,

    // acquisition drops before connection so the grab task is gone first
    acquisition: BaslerAcquisition,
    connection: Arc<Mutex<BaslerConnection>>,

    nb_frames: AtomicU64,
    timeout: parking_lot::Mutex<Option<Duration>>,

    // GigE transport
    packet_size: Parameter<i64>,
    inter_packet_delay: Parameter<i64>,
    frame_transmission_delay: Parameter<i64>,

    // Image and I/O
    test_image_selector: Parameter<String>,
    output1_line_source: Parameter<String>,
    gain: Parameter<f64>,
    autogain: Parameter<bool>,

    // Monitoring
    temperature: Parameter<f64>,
    frame_rate: Parameter<f64>,
    statistics_total_buffer_count: Parameter<i64>,
    statistics_failed_buffer_count: Parameter<i64>,

    params: ParameterSet,
}

impl Debug for Camera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Camera")
            .field("camera_id", &self.camera_id)
            .field("model", &self.info.model_name)
            .field("is_color", &self.is_color)
            .finish_non_exhaustive()
    }
}

impl Camera {
    /// Open the camera named by `camera_id` and bring it to a known state.
    ///
    /// `packet_size <= 0` keeps the camera's current packet size.
    pub async fn open(
        transport: Arc<dyn TransportLayer>,
        camera_id: &str,
        packet_size: i64,
    ) -> Result<Self> {
        tracing::info!("Opening Basler camera {}", camera_id);

        let id = camera_id.to_string();
        let mut connection = tokio::task::spawn_blocking(move || {
            BaslerConnection::open(transport.as_ref(), &id)
        })
        .await
        .map_err(|e| anyhow!("Camera open task failed: {}", e))??;

        let info = connection.info().clone();
        let is_color = Self::initialize(connection.device_mut(), packet_size)?;
        tracing::info!(
            vendor = %info.vendor_name,
            model = %info.model_name,
            color = is_color,
            "Camera {} ready",
            camera_id
        );

        let connection = Arc::new(Mutex::new(connection));
        let acquisition = BaslerAcquisition::new();

        let initial_packet_size = {
            let conn = connection.lock().await;
            BaslerFeatures::packet_size(conn.device())?
        };

        // GigE transport
        let mut packet_size = Parameter::new("packet_size", initial_packet_size)
            .with_description("Network packet size (MTU)")
            .with_unit("bytes")
            .with_dtype("int");
        connect_device_reader(&mut packet_size, &connection, |d| BaslerFeatures::packet_size(d));
        connect_device_writer(&mut packet_size, &connection, BaslerFeatures::set_packet_size);

        let mut inter_packet_delay = Parameter::new("inter_packet_delay", 0_i64)
            .with_description("Inter Packet Delay")
            .with_unit("ticks")
            .with_dtype("int");
        connect_device_reader(&mut inter_packet_delay, &connection, |d| {
            BaslerFeatures::inter_packet_delay(d)
        });
        connect_device_writer(
            &mut inter_packet_delay,
            &connection,
            BaslerFeatures::set_inter_packet_delay,
        );

        let mut frame_transmission_delay = Parameter::new("frame_transmission_delay", 0_i64)
            .with_description("Frame Transmission Delay")
            .with_unit("ticks")
            .with_dtype("int");
        connect_device_reader(&mut frame_transmission_delay, &connection, |d| {
            BaslerFeatures::frame_transmission_delay(d)
        });
        connect_device_writer(
            &mut frame_transmission_delay,
            &connection,
            BaslerFeatures::set_frame_transmission_delay,
        );

        // Image and I/O
        let mut test_image_selector =
            Parameter::new("test_image_selector", TestImage::Off.as_str().to_string())
                .with_description("Test image generator")
                .with_choices_introspectable(TestImage::all_choices());
        connect_device_reader(&mut test_image_selector, &connection, |d| {
            BaslerFeatures::test_image(d).map(|t| t.as_str().to_string())
        });
        connect_device_writer(&mut test_image_selector, &connection, |d, token| {
            let image = TestImage::from_str(&token)
                .ok_or_else(|| LimaError::InvalidValue(format!("Unknown test image {}", token)))?;
            BaslerFeatures::set_test_image(d, image)
        });

        let mut output1_line_source =
            Parameter::new("output1_line_source", LineSource::Off.as_str().to_string())
                .with_description("Signal routed to output line 1")
                .with_choices_introspectable(LineSource::all_choices());
        connect_device_reader(&mut output1_line_source, &connection, |d| {
            BaslerFeatures::output1_line_source(d).map(|l| l.as_str().to_string())
        });
        connect_device_writer(&mut output1_line_source, &connection, |d, token| {
            let source = LineSource::from_str(&token)
                .ok_or_else(|| LimaError::InvalidValue(format!("Unknown line source {}", token)))?;
            BaslerFeatures::set_output1_line_source(d, source)
        });

        let mut gain = Parameter::new("gain", 0.0)
            .with_description("Normalised gain")
            .with_range_introspectable(0.0, 1.0);
        connect_device_reader(&mut gain, &connection, |d| BaslerFeatures::gain(d));
        connect_device_writer(&mut gain, &connection, BaslerFeatures::set_gain);

        let mut autogain = Parameter::new("autogain", false)
            .with_description("Automatic gain control");
        connect_device_reader(&mut autogain, &connection, |d| BaslerFeatures::auto_gain(d));
        connect_device_writer(&mut autogain, &connection, BaslerFeatures::set_auto_gain);

        // Monitoring
        let mut temperature = Parameter::new("temperature", 0.0)
            .with_description("Core temperature")
            .with_unit("°C")
            .read_only();
        connect_device_reader(&mut temperature, &connection, |d| BaslerFeatures::temperature(d));

        let mut frame_rate = Parameter::new("frame_rate", 0.0)
            .with_description("Resulting frame rate")
            .with_unit("Hz")
            .read_only();
        connect_device_reader(&mut frame_rate, &connection, |d| BaslerFeatures::frame_rate(d));

        let mut statistics_total_buffer_count =
            Parameter::new("statistics_total_buffer_count", 0_i64)
                .with_description("Total buffers retrieved")
                .read_only();
        {
            let state = acquisition.state().clone();
            statistics_total_buffer_count.connect_to_hardware_read(move || {
                let count = state.total_buffer_count();
                Box::pin(async move { Ok(i64::try_from(count).unwrap_or(i64::MAX)) })
            });
        }

        let mut statistics_failed_buffer_count =
            Parameter::new("statistics_failed_buffer_count", 0_i64)
                .with_description("Failed buffers")
                .read_only();
        {
            let state = acquisition.state().clone();
            statistics_failed_buffer_count.connect_to_hardware_read(move || {
                let count = state.failed_buffer_count();
                Box::pin(async move { Ok(i64::try_from(count).unwrap_or(i64::MAX)) })
            });
        }

        let mut params = ParameterSet::new();
        params.register(packet_size.clone());
        params.register(inter_packet_delay.clone());
        params.register(frame_transmission_delay.clone());
        params.register(test_image_selector.clone());
        params.register(output1_line_source.clone());
        params.register(gain.clone());
        params.register(autogain.clone());
        params.register(temperature.clone());
        params.register(frame_rate.clone());
        params.register(statistics_total_buffer_count.clone());
        params.register(statistics_failed_buffer_count.clone());
        params.register(acquisition.streaming.clone());

        Ok(Self {
            camera_id: camera_id.to_string(),
            info,
            is_color,
            acquisition,
            connection,
            nb_frames: AtomicU64::new(1),
            timeout: parking_lot::Mutex::new(None),
            packet_size,
            inter_packet_delay,
            frame_transmission_delay,
            test_image_selector,
            output1_line_source,
            gain,
            autogain,
            temperature,
            frame_rate,
            statistics_total_buffer_count,
            statistics_failed_buffer_count,
            params,
        })
    }

    /// Initial node-map setup. Returns whether the camera is a colour model.
    fn initialize(device: &mut dyn GigeDevice, packet_size: i64) -> Result<bool> {
        if packet_size > 0 {
            BaslerFeatures::set_packet_size(device, packet_size)?;
        }

        let is_color = BaslerFeatures::is_color(device)?;
        let mut candidates: Vec<&str> = INIT_PIXEL_FORMATS.to_vec();
        if is_color {
            candidates.extend(COLOR_PIXEL_FORMATS);
        }
        if BaslerFeatures::select_pixel_format(device, &candidates)?.is_none() {
            tracing::error!("Unable to set PixelFormat for the camera!");
            return Err(LimaError::Hardware("Unable to set PixelFormat for the camera!".into()).into());
        }

        BaslerFeatures::apply_roi(device, Roi::default())?;
        BaslerFeatures::set_bin(device, Bin::default())?;
        BaslerFeatures::configure_acquisition_defaults(device)?;
        Ok(is_color)
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn is_color(&self) -> bool {
        self.is_color
    }

    // =========================================================================
    // Detector information
    // =========================================================================

    /// Vendor name.
    pub fn detector_type(&self) -> String {
        self.info.vendor_name.clone()
    }

    pub fn detector_model(&self) -> String {
        self.info.model_name.clone()
    }

    pub async fn detector_image_size(&self) -> Result<Size> {
        let conn = self.connection.lock().await;
        BaslerFeatures::max_image_size(conn.device())
    }

    /// Pixel pitch (x, y) in metres.
    pub fn pixel_size(&self) -> (f64, f64) {
        (PIXEL_SIZE_M, PIXEL_SIZE_M)
    }

    pub async fn image_type(&self) -> Result<ImageType> {
        let conn = self.connection.lock().await;
        BaslerFeatures::image_type(conn.device())
    }

    pub async fn set_image_type(&self, image_type: ImageType) -> Result<()> {
        let mut conn = self.connection.lock().await;
        BaslerFeatures::set_image_type(conn.device_mut(), image_type)
    }

    // =========================================================================
    // Synchronisation
    // =========================================================================

    pub fn check_trig_mode(mode: TrigMode) -> bool {
        matches!(
            mode,
            TrigMode::IntTrig | TrigMode::ExtTrigSingle | TrigMode::ExtGate
        )
    }

    pub async fn set_trig_mode(&self, mode: TrigMode) -> Result<()> {
        if !Self::check_trig_mode(mode) {
            return Err(LimaError::InvalidValue(format!(
                "Invalid trigger mode {}",
                mode.as_str()
            ))
            .into());
        }
        let mut conn = self.connection.lock().await;
        BaslerFeatures::apply_trig_mode(conn.device_mut(), mode)?;
        tracing::debug!("Trigger mode set to {}", mode.as_str());
        Ok(())
    }

    pub async fn trig_mode(&self) -> Result<TrigMode> {
        let conn = self.connection.lock().await;
        let device = conn.device();
        if device.get_enum(nodes::TRIGGER_MODE)? == "Off" {
            return Ok(TrigMode::IntTrig);
        }
        if device.get_enum(nodes::EXPOSURE_MODE)? == "TriggerWidth" {
            Ok(TrigMode::ExtGate)
        } else {
            Ok(TrigMode::ExtTrigSingle)
        }
    }

    pub async fn set_exp_time(&self, seconds: f64) -> Result<()> {
        let mut conn = self.connection.lock().await;
        BaslerFeatures::set_exposure(conn.device_mut(), &self.info.model_name, seconds)?;
        tracing::debug!("Exposure time set to {} s", seconds);
        Ok(())
    }

    pub async fn exp_time(&self) -> Result<f64> {
        let conn = self.connection.lock().await;
        BaslerFeatures::exposure(conn.device())
    }

    /// Exposure limits in seconds.
    pub async fn exp_time_range(&self) -> Result<(f64, f64)> {
        let conn = self.connection.lock().await;
        BaslerFeatures::exposure_range(conn.device(), &self.info.model_name)
    }

    /// Latency is not programmable; the value is ignored.
    pub fn set_lat_time(&self, seconds: f64) {
        tracing::trace!("Ignoring latency time {}", seconds);
    }

    pub fn lat_time(&self) -> f64 {
        0.0
    }

    pub fn lat_time_range(&self) -> (f64, f64) {
        (0.0, 0.0)
    }

    /// Frames to acquire, 0 meaning until stopped.
    pub fn set_nb_frames(&self, nb_frames: u64) {
        self.nb_frames.store(nb_frames, Ordering::SeqCst);
    }

    pub fn nb_frames(&self) -> u64 {
        self.nb_frames.load(Ordering::SeqCst)
    }

    pub fn nb_hw_acquired_frames(&self) -> u64 {
        self.acquisition.acquired_frames()
    }

    /// Override the per-frame grab timeout. `None` restores `exp_time + 1 s`.
    pub fn set_timeout(&self, timeout: Option<Duration>) {
        *self.timeout.lock() = timeout;
    }

    pub fn timeout(&self) -> Option<Duration> {
        *self.timeout.lock()
    }

    // =========================================================================
    // Geometry
    // =========================================================================

    pub fn check_roi(&self, requested: Roi) -> Roi {
        requested
    }

    /// Apply `roi`, restoring the previous window if any step fails.
    pub async fn set_roi(&self, roi: Roi) -> Result<()> {
        let mut conn = self.connection.lock().await;
        let device = conn.device_mut();
        let current = BaslerFeatures::roi(device)?;
        if roi == current {
            return Ok(());
        }

        if let Err(e) = BaslerFeatures::apply_roi(device, roi) {
            tracing::error!("Failed to set ROI {}: {}", roi, e);
            if let Err(rollback) = BaslerFeatures::apply_roi(device, current) {
                tracing::error!("Failed to restore ROI {}: {}", current, rollback);
            }
            return Err(e);
        }
        tracing::debug!("ROI set to {}", roi);
        Ok(())
    }

    pub async fn roi(&self) -> Result<Roi> {
        let conn = self.connection.lock().await;
        BaslerFeatures::roi(conn.device())
    }

    pub async fn check_bin(&self, requested: Bin) -> Result<Bin> {
        let conn = self.connection.lock().await;
        BaslerFeatures::check_bin(conn.device(), requested)
    }

    pub async fn set_bin(&self, bin: Bin) -> Result<()> {
        let mut conn = self.connection.lock().await;
        BaslerFeatures::set_bin(conn.device_mut(), bin)
    }

    pub async fn bin(&self) -> Result<Bin> {
        let conn = self.connection.lock().await;
        BaslerFeatures::bin(conn.device())
    }

    // =========================================================================
    // Acquisition
    // =========================================================================

    pub fn status(&self) -> CameraStatus {
        self.acquisition.status()
    }

    pub fn set_status(&self, status: CameraStatus, force: bool) {
        self.acquisition.set_status(status, force);
    }

    pub async fn prepare_acq(&self) -> Result<()> {
        self.acquisition.reset_frame_count();
        Ok(())
    }

    pub async fn start_acq(&self) -> Result<()> {
        if self.acquisition.is_running().await {
            return Err(anyhow!("Acquisition already running"));
        }
        self.acquisition.reset_frame_count();

        let (grabber, size, image_type, exp_time) = {
            let mut conn = self.connection.lock().await;
            let device = conn.device_mut();
            let roi = BaslerFeatures::roi(device)?;
            let image_type = BaslerFeatures::image_type(device)?;
            let exp_time = BaslerFeatures::exposure(device)?;
            let grabber = device.open_stream(NB_BUFFERS)?;
            device.execute(nodes::ACQUISITION_START)?;
            (grabber, roi.size(), image_type, exp_time)
        };

        let timeout = self
            .timeout()
            .unwrap_or_else(|| Duration::from_secs_f64((exp_time + 1.0).floor()));
        let settings = GrabSettings {
            size,
            image_type,
            nb_frames: self.nb_frames(),
            timeout,
        };
        tracing::info!(
            nb_frames = settings.nb_frames,
            timeout_ms = timeout.as_millis() as u64,
            "Starting acquisition on {}",
            self.camera_id
        );
        self.acquisition
            .start_stream(self.connection.clone(), grabber, settings)
            .await
    }

    pub async fn stop_acq(&self) -> Result<()> {
        self.acquisition.stop_stream().await
    }

    /// Stop any acquisition and clear a fault.
    pub async fn reset(&self) -> Result<()> {
        self.stop_acq().await?;
        self.set_status(CameraStatus::Ready, true);
        Ok(())
    }

    pub fn subscribe_frames(&self) -> broadcast::Receiver<Arc<Frame>> {
        self.acquisition.subscribe()
    }

    pub fn set_blank_image_for_missed(&self, enabled: bool) {
        tracing::debug!("blank_image_for_missed <- {}", enabled);
        self.acquisition.set_blank_image_for_missed(enabled);
    }

    pub fn blank_image_for_missed(&self) -> bool {
        self.acquisition.blank_image_for_missed()
    }

    // =========================================================================
    // Video
    // =========================================================================

    pub async fn supported_video_modes(&self) -> Result<Vec<VideoMode>> {
        let conn = self.connection.lock().await;
        BaslerFeatures::supported_video_modes(conn.device())
    }

    pub async fn video_mode(&self) -> Result<VideoMode> {
        let conn = self.connection.lock().await;
        BaslerFeatures::video_mode(conn.device())
    }

    pub async fn set_video_mode(&self, mode: VideoMode) -> Result<()> {
        let mut conn = self.connection.lock().await;
        BaslerFeatures::set_video_mode(conn.device_mut(), mode)
    }

    pub async fn has_auto_gain(&self) -> bool {
        let conn = self.connection.lock().await;
        BaslerFeatures::has_auto_gain(conn.device())
    }

    // =========================================================================
    // Basler features
    // =========================================================================

    pub fn packet_size(&self) -> &Parameter<i64> {
        &self.packet_size
    }

    pub fn inter_packet_delay(&self) -> &Parameter<i64> {
        &self.inter_packet_delay
    }

    pub fn frame_transmission_delay(&self) -> &Parameter<i64> {
        &self.frame_transmission_delay
    }

    pub fn test_image_selector(&self) -> &Parameter<String> {
        &self.test_image_selector
    }

    pub fn output1_line_source(&self) -> &Parameter<String> {
        &self.output1_line_source
    }

    pub fn gain(&self) -> &Parameter<f64> {
        &self.gain
    }

    pub fn autogain(&self) -> &Parameter<bool> {
        &self.autogain
    }

    pub fn temperature(&self) -> &Parameter<f64> {
        &self.temperature
    }

    pub fn frame_rate(&self) -> &Parameter<f64> {
        &self.frame_rate
    }

    pub fn statistics_total_buffer_count(&self) -> &Parameter<i64> {
        &self.statistics_total_buffer_count
    }

    pub fn statistics_failed_buffer_count(&self) -> &Parameter<i64> {
        &self.statistics_failed_buffer_count
    }

    pub async fn set_inter_packet_delay(&self, ticks: i64) -> Result<()> {
        self.inter_packet_delay.set(ticks).await
    }

    pub async fn set_frame_transmission_delay(&self, ticks: i64) -> Result<()> {
        self.frame_transmission_delay.set(ticks).await
    }
}

impl Parameterized for Camera {
    fn parameters(&self) -> &ParameterSet {
        &self.params
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        if self.acquisition.streaming.get() {
            tracing::warn!(
                "Camera {} dropped while acquiring. Call stop_acq() first; \
                 the grab task is aborted.",
                self.camera_id
            );
        }
    }
}
