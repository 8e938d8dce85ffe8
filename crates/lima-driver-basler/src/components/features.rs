//! Basler Feature Control
//!
//! GenICam node access for the camera features the plugin exposes:
//! - **Transport**: packet size, inter-packet delay, frame transmission delay
//! - **Image**: pixel formats, image type, test image, ROI, binning
//! - **Timing**: exposure (raw/base or absolute depending on model), trigger modes
//! - **Analog**: gain (normalised) and automatic gain
//! - **I/O**: source of output line 1
//! - **Monitoring**: sensor temperature, resulting frame rate

use crate::components::connection::GigeDevice;
use anyhow::Result;
use lima_core::error::LimaError;
use lima_core::hw::{Bin, ImageType, Roi, Size, TrigMode, VideoMode};

// =============================================================================
// Node names
// =============================================================================

pub mod nodes {
    pub const WIDTH: &str = "Width";
    pub const HEIGHT: &str = "Height";
    pub const WIDTH_MAX: &str = "WidthMax";
    pub const HEIGHT_MAX: &str = "HeightMax";
    pub const OFFSET_X: &str = "OffsetX";
    pub const OFFSET_Y: &str = "OffsetY";
    pub const BINNING_H: &str = "BinningHorizontal";
    pub const BINNING_V: &str = "BinningVertical";
    pub const PIXEL_FORMAT: &str = "PixelFormat";
    pub const PIXEL_SIZE: &str = "PixelSize";
    pub const PAYLOAD_SIZE: &str = "PayloadSize";

    pub const TRIGGER_SELECTOR: &str = "TriggerSelector";
    pub const TRIGGER_MODE: &str = "TriggerMode";
    pub const EXPOSURE_MODE: &str = "ExposureMode";
    pub const EXPOSURE_AUTO: &str = "ExposureAuto";
    pub const ACQUISITION_MODE: &str = "AcquisitionMode";
    pub const ACQUISITION_FRAME_RATE_ENABLE: &str = "AcquisitionFrameRateEnable";
    pub const ACQUISITION_START: &str = "AcquisitionStart";
    pub const ACQUISITION_STOP: &str = "AcquisitionStop";

    pub const EXPOSURE_TIME_ABS: &str = "ExposureTimeAbs";
    pub const EXPOSURE_TIME_RAW: &str = "ExposureTimeRaw";
    pub const EXPOSURE_TIME_BASE_ABS: &str = "ExposureTimeBaseAbs";
    pub const RESULTING_FRAME_RATE_ABS: &str = "ResultingFrameRateAbs";

    pub const GEV_SCPS_PACKET_SIZE: &str = "GevSCPSPacketSize";
    pub const GEV_SCPD: &str = "GevSCPD";
    pub const GEV_SCFTD: &str = "GevSCFTD";

    pub const TEST_IMAGE_SELECTOR: &str = "TestImageSelector";
    pub const LINE_SELECTOR: &str = "LineSelector";
    pub const LINE_SOURCE: &str = "LineSource";
    pub const TEMPERATURE_ABS: &str = "TemperatureAbs";
    pub const GAIN_RAW: &str = "GainRaw";
    pub const GAIN_AUTO: &str = "GainAuto";
}

/// Pixel formats tried, in order, when the camera is opened.
pub const INIT_PIXEL_FORMATS: [&str; 3] = ["Mono16", "Mono12", "Mono8"];

/// Pixel pitch reported for every model (metres).
pub const PIXEL_SIZE_M: f64 = 55e-6;

/// Exposure time base used on models driven through raw/base registers (us).
const EXPOSURE_TIME_BASE_US: f64 = 100.0;

// =============================================================================
// Enumerated attributes
// =============================================================================

/// Test image generator selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestImage {
    Off,
    Image1,
    Image2,
    Image3,
    Image4,
    Image5,
    Image6,
    Image7,
}

impl TestImage {
    const ALL: [TestImage; 8] = [
        TestImage::Off,
        TestImage::Image1,
        TestImage::Image2,
        TestImage::Image3,
        TestImage::Image4,
        TestImage::Image5,
        TestImage::Image6,
        TestImage::Image7,
    ];

    /// Attribute token.
    pub fn as_str(&self) -> &'static str {
        match self {
            TestImage::Off => "TESTIMAGE_OFF",
            TestImage::Image1 => "TESTIMAGE_1",
            TestImage::Image2 => "TESTIMAGE_2",
            TestImage::Image3 => "TESTIMAGE_3",
            TestImage::Image4 => "TESTIMAGE_4",
            TestImage::Image5 => "TESTIMAGE_5",
            TestImage::Image6 => "TESTIMAGE_6",
            TestImage::Image7 => "TESTIMAGE_7",
        }
    }

    /// `TestImageSelector` entry.
    pub fn node_value(&self) -> &'static str {
        match self {
            TestImage::Off => "Off",
            TestImage::Image1 => "Testimage1",
            TestImage::Image2 => "Testimage2",
            TestImage::Image3 => "Testimage3",
            TestImage::Image4 => "Testimage4",
            TestImage::Image5 => "Testimage5",
            TestImage::Image6 => "Testimage6",
            TestImage::Image7 => "Testimage7",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    pub fn from_node(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.node_value() == value)
    }

    pub fn all_choices() -> Vec<String> {
        Self::ALL.iter().map(|t| t.as_str().to_string()).collect()
    }
}

/// Signal routed to output line 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSource {
    Off,
    ExposureActive,
    FrameTriggerWait,
    LineTriggerWait,
    TimerActive,
    UserOutput,
    AcquisitionTriggerWait,
}

impl LineSource {
    const ALL: [LineSource; 7] = [
        LineSource::Off,
        LineSource::ExposureActive,
        LineSource::FrameTriggerWait,
        LineSource::LineTriggerWait,
        LineSource::TimerActive,
        LineSource::UserOutput,
        LineSource::AcquisitionTriggerWait,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LineSource::Off => "OFF",
            LineSource::ExposureActive => "EXPOSURE_ACTIVE",
            LineSource::FrameTriggerWait => "FRAME_TRIGGER_WAIT",
            LineSource::LineTriggerWait => "LINE_TRIGGER_WAIT",
            LineSource::TimerActive => "TIMER_ACTIVE",
            LineSource::UserOutput => "USER_OUTPUT",
            LineSource::AcquisitionTriggerWait => "ACQUISITION_TRIGGER_WAIT",
        }
    }

    /// `LineSource` entry.
    pub fn node_value(&self) -> &'static str {
        match self {
            LineSource::Off => "Off",
            LineSource::ExposureActive => "ExposureActive",
            LineSource::FrameTriggerWait => "FrameTriggerWait",
            LineSource::LineTriggerWait => "LineTriggerWait",
            LineSource::TimerActive => "Timer1Active",
            LineSource::UserOutput => "UserOutput",
            LineSource::AcquisitionTriggerWait => "AcquisitionTriggerWait",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.as_str() == s)
    }

    pub fn from_node(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.node_value() == value)
    }

    pub fn all_choices() -> Vec<String> {
        Self::ALL.iter().map(|l| l.as_str().to_string()).collect()
    }
}

// =============================================================================
// Pixel formats <-> video modes
// =============================================================================

/// Pixel format entries in preference order, with the video mode each maps to.
const FORMAT_VIDEO_MODES: [(&str, VideoMode); 16] = [
    ("BayerRG16", VideoMode::BayerRg16),
    ("BayerBG16", VideoMode::BayerBg16),
    ("BayerRG12", VideoMode::BayerRg16),
    ("BayerBG12", VideoMode::BayerBg16),
    ("BayerRG8", VideoMode::BayerRg8),
    ("BayerBG8", VideoMode::BayerBg8),
    ("RGB8Packed", VideoMode::Rgb24),
    ("BGR8Packed", VideoMode::Bgr24),
    ("RGBA8Packed", VideoMode::Rgb32),
    ("BGRA8Packed", VideoMode::Bgr32),
    ("YUV411Packed", VideoMode::Yuv411Packed),
    ("YUV422Packed", VideoMode::Yuv422Packed),
    ("YUV444Packed", VideoMode::Yuv444Packed),
    ("Mono16", VideoMode::Y16),
    ("Mono12", VideoMode::Y16),
    ("Mono8", VideoMode::Y8),
];

/// Video mode delivered by a pixel format.
pub fn video_mode_for_format(format: &str) -> Result<VideoMode> {
    let mode = match format {
        "Mono8" => VideoMode::Y8,
        "Mono10" | "Mono12" | "Mono16" => VideoMode::Y16,
        "BayerRG8" => VideoMode::BayerRg8,
        "BayerBG8" => VideoMode::BayerBg8,
        "BayerRG10" | "BayerRG12" | "BayerRG16" => VideoMode::BayerRg16,
        "BayerBG10" | "BayerBG12" | "BayerBG16" => VideoMode::BayerBg16,
        "RGB8Packed" => VideoMode::Rgb24,
        "BGR8Packed" => VideoMode::Bgr24,
        "RGBA8Packed" => VideoMode::Rgb32,
        "BGRA8Packed" => VideoMode::Bgr32,
        "YUV411Packed" => VideoMode::Yuv411Packed,
        "YUV422Packed" => VideoMode::Yuv422Packed,
        "YUV444Packed" => VideoMode::Yuv444Packed,
        other => {
            return Err(LimaError::NotSupported(format!(
                "Pixel type not supported yet: {}",
                other
            ))
            .into())
        }
    };
    Ok(mode)
}

/// Pixel formats able to deliver `mode`, most precise first.
pub fn formats_for_video_mode(mode: VideoMode) -> &'static [&'static str] {
    match mode {
        VideoMode::Y8 => &["Mono8"],
        VideoMode::Y16 => &["Mono16", "Mono12", "Mono10"],
        VideoMode::BayerRg8 => &["BayerRG8"],
        VideoMode::BayerBg8 => &["BayerBG8"],
        VideoMode::BayerRg16 => &["BayerRG16", "BayerRG12", "BayerRG10"],
        VideoMode::BayerBg16 => &["BayerBG16", "BayerBG12", "BayerBG10"],
        VideoMode::Rgb24 => &["RGB8Packed"],
        VideoMode::Bgr24 => &["BGR8Packed"],
        VideoMode::Rgb32 => &["RGBA8Packed"],
        VideoMode::Bgr32 => &["BGRA8Packed"],
        VideoMode::Yuv411Packed => &["YUV411Packed"],
        VideoMode::Yuv422Packed => &["YUV422Packed"],
        VideoMode::Yuv444Packed => &["YUV444Packed"],
    }
}

fn is_color_format(format: &str) -> bool {
    format.starts_with("Bayer")
        || format.starts_with("RGB")
        || format.starts_with("BGR")
        || format.starts_with("YUV")
}

// =============================================================================
// Node helpers
// =============================================================================

/// Stateless helpers over a device's node map.
pub struct BaslerFeatures;

impl BaslerFeatures {
    fn to_i64(value: u32) -> i64 {
        i64::from(value)
    }

    fn to_u32(node: &str, value: i64) -> Result<u32> {
        u32::try_from(value)
            .map_err(|_| LimaError::hardware(format!("{} out of range: {}", node, value)).into())
    }

    /// Set an enumeration node if the model has it, ignoring it otherwise.
    pub fn set_enum_if_available(device: &mut dyn GigeDevice, node: &str, value: &str) -> Result<()> {
        if device.is_available(node) {
            device.set_enum(node, value)?;
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Sensor geometry
    // ---------------------------------------------------------------------

    pub fn max_image_size(device: &dyn GigeDevice) -> Result<Size> {
        let width = Self::to_u32(nodes::WIDTH_MAX, device.get_int(nodes::WIDTH_MAX)?)?;
        let height = Self::to_u32(nodes::HEIGHT_MAX, device.get_int(nodes::HEIGHT_MAX)?)?;
        Ok(Size::new(width, height))
    }

    pub fn roi(device: &dyn GigeDevice) -> Result<Roi> {
        Ok(Roi::new(
            Self::to_u32(nodes::OFFSET_X, device.get_int(nodes::OFFSET_X)?)?,
            Self::to_u32(nodes::OFFSET_Y, device.get_int(nodes::OFFSET_Y)?)?,
            Self::to_u32(nodes::WIDTH, device.get_int(nodes::WIDTH)?)?,
            Self::to_u32(nodes::HEIGHT, device.get_int(nodes::HEIGHT)?)?,
        ))
    }

    /// Reset the sensor window to full size, then apply `roi` when active.
    ///
    /// Offsets go to their minimum first so that the width/height maxima
    /// cover the whole sensor.
    pub fn apply_roi(device: &mut dyn GigeDevice, roi: Roi) -> Result<()> {
        let (min_x, _) = device.int_range(nodes::OFFSET_X)?;
        device.set_int(nodes::OFFSET_X, min_x)?;
        let (min_y, _) = device.int_range(nodes::OFFSET_Y)?;
        device.set_int(nodes::OFFSET_Y, min_y)?;
        let (_, max_w) = device.int_range(nodes::WIDTH)?;
        device.set_int(nodes::WIDTH, max_w)?;
        let (_, max_h) = device.int_range(nodes::HEIGHT)?;
        device.set_int(nodes::HEIGHT, max_h)?;

        if roi.is_active() {
            device.set_int(nodes::WIDTH, Self::to_i64(roi.width))?;
            device.set_int(nodes::HEIGHT, Self::to_i64(roi.height))?;
            device.set_int(nodes::OFFSET_X, Self::to_i64(roi.x))?;
            device.set_int(nodes::OFFSET_Y, Self::to_i64(roi.y))?;
        }
        Ok(())
    }

    pub fn bin(device: &dyn GigeDevice) -> Result<Bin> {
        if !device.is_available(nodes::BINNING_H) {
            return Ok(Bin::default());
        }
        Ok(Bin::new(
            Self::to_u32(nodes::BINNING_H, device.get_int(nodes::BINNING_H)?)?,
            Self::to_u32(nodes::BINNING_V, device.get_int(nodes::BINNING_V)?)?,
        ))
    }

    pub fn set_bin(device: &mut dyn GigeDevice, bin: Bin) -> Result<()> {
        if !device.is_available(nodes::BINNING_H) {
            if bin.is_one() {
                return Ok(());
            }
            return Err(LimaError::NotSupported("Binning not available on this camera".into()).into());
        }
        device.set_int(nodes::BINNING_H, Self::to_i64(bin.x))?;
        device.set_int(nodes::BINNING_V, Self::to_i64(bin.y))?;
        Ok(())
    }

    /// Clamp a requested binning into the supported range.
    pub fn check_bin(device: &dyn GigeDevice, requested: Bin) -> Result<Bin> {
        if !device.is_available(nodes::BINNING_H) {
            return Ok(Bin::default());
        }
        let (min_h, max_h) = device.int_range(nodes::BINNING_H)?;
        let (min_v, max_v) = device.int_range(nodes::BINNING_V)?;
        Ok(Bin::new(
            Self::to_u32(nodes::BINNING_H, Self::to_i64(requested.x).clamp(min_h, max_h))?,
            Self::to_u32(nodes::BINNING_V, Self::to_i64(requested.y).clamp(min_v, max_v))?,
        ))
    }

    // ---------------------------------------------------------------------
    // Pixel format and image type
    // ---------------------------------------------------------------------

    /// Select the first pixel format of `candidates` the camera offers.
    ///
    /// Returns the selected format, or `None` if none is available.
    pub fn select_pixel_format(
        device: &mut dyn GigeDevice,
        candidates: &[&str],
    ) -> Result<Option<String>> {
        let available = device.enum_entries(nodes::PIXEL_FORMAT)?;
        for candidate in candidates {
            if available.iter().any(|f| f == candidate) {
                device.set_enum(nodes::PIXEL_FORMAT, candidate)?;
                tracing::debug!("PixelFormat set to {}", candidate);
                return Ok(Some((*candidate).to_string()));
            }
        }
        Ok(None)
    }

    /// Image type derived from the `PixelSize` node.
    pub fn image_type(device: &dyn GigeDevice) -> Result<ImageType> {
        let pixel_size = device.get_enum(nodes::PIXEL_SIZE)?;
        Ok(match pixel_size.as_str() {
            "Bpp8" => ImageType::Bpp8,
            "Bpp12" => ImageType::Bpp12,
            "Bpp16" => ImageType::Bpp16,
            _ => ImageType::Bpp10,
        })
    }

    pub fn set_image_type(device: &mut dyn GigeDevice, image_type: ImageType) -> Result<()> {
        let format = match image_type {
            ImageType::Bpp8 => "Mono8",
            ImageType::Bpp12 | ImageType::Bpp16 => "Mono16",
            ImageType::Bpp10 => {
                return Err(
                    LimaError::NotSupported("Cannot change the format of the camera !".into()).into(),
                )
            }
        };
        device.set_enum(nodes::PIXEL_FORMAT, format)
    }

    /// True when the camera offers any colour pixel format.
    pub fn is_color(device: &dyn GigeDevice) -> Result<bool> {
        Ok(device
            .enum_entries(nodes::PIXEL_FORMAT)?
            .iter()
            .any(|f| is_color_format(f)))
    }

    /// Video modes reachable from the available pixel formats.
    pub fn supported_video_modes(device: &dyn GigeDevice) -> Result<Vec<VideoMode>> {
        let available = device.enum_entries(nodes::PIXEL_FORMAT)?;
        let mut modes = Vec::new();
        for (format, mode) in FORMAT_VIDEO_MODES {
            if available.iter().any(|f| f == format) && !modes.contains(&mode) {
                modes.push(mode);
            }
        }
        Ok(modes)
    }

    pub fn video_mode(device: &dyn GigeDevice) -> Result<VideoMode> {
        video_mode_for_format(&device.get_enum(nodes::PIXEL_FORMAT)?)
    }

    pub fn set_video_mode(device: &mut dyn GigeDevice, mode: VideoMode) -> Result<()> {
        match Self::select_pixel_format(device, formats_for_video_mode(mode))? {
            Some(_) => Ok(()),
            None => Err(LimaError::NotSupported(format!(
                "Camera doesn't support video mode {:?}",
                mode
            ))
            .into()),
        }
    }

    // ---------------------------------------------------------------------
    // Exposure and triggering
    // ---------------------------------------------------------------------

    /// ACE models ("acA...") expose an absolute exposure node.
    pub fn has_absolute_exposure(model_name: &str) -> bool {
        model_name.starts_with("acA")
    }

    pub fn set_exposure(device: &mut dyn GigeDevice, model_name: &str, seconds: f64) -> Result<()> {
        if Self::has_absolute_exposure(model_name) {
            device.set_float(nodes::EXPOSURE_TIME_ABS, seconds * 1e6)
        } else {
            device.set_float(nodes::EXPOSURE_TIME_BASE_ABS, EXPOSURE_TIME_BASE_US)?;
            // one raw step per 50 s, the base absorbs the rest
            let raw = (seconds / 50.0).ceil().max(1.0);
            device.set_int(nodes::EXPOSURE_TIME_RAW, raw as i64)?;
            let raw = device.get_int(nodes::EXPOSURE_TIME_RAW)? as f64;
            device.set_float(nodes::EXPOSURE_TIME_BASE_ABS, seconds * 1e6 / raw)
        }
    }

    pub fn exposure(device: &dyn GigeDevice) -> Result<f64> {
        Ok(device.get_float(nodes::EXPOSURE_TIME_ABS)? * 1e-6)
    }

    /// Exposure limits in seconds.
    pub fn exposure_range(device: &dyn GigeDevice, model_name: &str) -> Result<(f64, f64)> {
        if Self::has_absolute_exposure(model_name) {
            let (min, max) = device.float_range(nodes::EXPOSURE_TIME_ABS)?;
            Ok((min * 1e-6, max * 1e-6))
        } else {
            Ok((1e-6, 1e9))
        }
    }

    pub fn apply_trig_mode(device: &mut dyn GigeDevice, mode: TrigMode) -> Result<()> {
        match mode {
            TrigMode::IntTrig => {
                device.set_enum(nodes::TRIGGER_MODE, "Off")?;
                device.set_enum(nodes::EXPOSURE_MODE, "Timed")?;
            }
            TrigMode::ExtGate => {
                device.set_enum(nodes::TRIGGER_MODE, "On")?;
                device.set_bool(nodes::ACQUISITION_FRAME_RATE_ENABLE, false)?;
                device.set_enum(nodes::EXPOSURE_MODE, "TriggerWidth")?;
            }
            TrigMode::ExtTrigSingle => {
                device.set_enum(nodes::TRIGGER_MODE, "On")?;
                device.set_bool(nodes::ACQUISITION_FRAME_RATE_ENABLE, false)?;
                device.set_enum(nodes::EXPOSURE_MODE, "Timed")?;
            }
            other => {
                return Err(LimaError::NotSupported(format!(
                    "Trigger mode {} not supported",
                    other.as_str()
                ))
                .into())
            }
        }
        Ok(())
    }

    /// Prepare the node map for continuous, manually exposed acquisition.
    pub fn configure_acquisition_defaults(device: &mut dyn GigeDevice) -> Result<()> {
        Self::set_enum_if_available(device, nodes::TRIGGER_SELECTOR, "AcquisitionStart")?;
        device.set_enum(nodes::ACQUISITION_MODE, "Continuous")?;
        Self::set_enum_if_available(device, nodes::EXPOSURE_AUTO, "Off")?;
        Ok(())
    }

    pub fn frame_rate(device: &dyn GigeDevice) -> Result<f64> {
        device.get_float(nodes::RESULTING_FRAME_RATE_ABS)
    }

    // ---------------------------------------------------------------------
    // GigE transport
    // ---------------------------------------------------------------------

    pub fn packet_size(device: &dyn GigeDevice) -> Result<i64> {
        device.get_int(nodes::GEV_SCPS_PACKET_SIZE)
    }

    pub fn set_packet_size(device: &mut dyn GigeDevice, bytes: i64) -> Result<()> {
        device.set_int(nodes::GEV_SCPS_PACKET_SIZE, bytes)
    }

    pub fn inter_packet_delay(device: &dyn GigeDevice) -> Result<i64> {
        device.get_int(nodes::GEV_SCPD)
    }

    pub fn set_inter_packet_delay(device: &mut dyn GigeDevice, ticks: i64) -> Result<()> {
        device.set_int(nodes::GEV_SCPD, ticks)
    }

    pub fn frame_transmission_delay(device: &dyn GigeDevice) -> Result<i64> {
        device.get_int(nodes::GEV_SCFTD)
    }

    pub fn set_frame_transmission_delay(device: &mut dyn GigeDevice, ticks: i64) -> Result<()> {
        device.set_int(nodes::GEV_SCFTD, ticks)
    }

    // ---------------------------------------------------------------------
    // Test image, output line
    // ---------------------------------------------------------------------

    pub fn test_image(device: &dyn GigeDevice) -> Result<TestImage> {
        let value = device.get_enum(nodes::TEST_IMAGE_SELECTOR)?;
        TestImage::from_node(&value)
            .ok_or_else(|| LimaError::hardware(format!("Unknown test image entry {}", value)).into())
    }

    pub fn set_test_image(device: &mut dyn GigeDevice, image: TestImage) -> Result<()> {
        device.set_enum(nodes::TEST_IMAGE_SELECTOR, image.node_value())
    }

    pub fn output1_line_source(device: &mut dyn GigeDevice) -> Result<LineSource> {
        device.set_enum(nodes::LINE_SELECTOR, "Out1")?;
        let value = device.get_enum(nodes::LINE_SOURCE)?;
        LineSource::from_node(&value)
            .ok_or_else(|| LimaError::hardware(format!("Unknown line source entry {}", value)).into())
    }

    pub fn set_output1_line_source(device: &mut dyn GigeDevice, source: LineSource) -> Result<()> {
        device.set_enum(nodes::LINE_SELECTOR, "Out1")?;
        device.set_enum(nodes::LINE_SOURCE, source.node_value())
    }

    // ---------------------------------------------------------------------
    // Monitoring and gain
    // ---------------------------------------------------------------------

    pub fn temperature(device: &dyn GigeDevice) -> Result<f64> {
        if !device.is_available(nodes::TEMPERATURE_ABS) {
            return Err(LimaError::NotSupported("Temperature not available on this camera".into()).into());
        }
        device.get_float(nodes::TEMPERATURE_ABS)
    }

    /// Gain normalised to `[0, 1]` over the `GainRaw` range.
    pub fn gain(device: &dyn GigeDevice) -> Result<f64> {
        let (min, max) = device.int_range(nodes::GAIN_RAW)?;
        let raw = device.get_int(nodes::GAIN_RAW)?;
        if max <= min {
            return Ok(0.0);
        }
        Ok((raw - min) as f64 / (max - min) as f64)
    }

    pub fn set_gain(device: &mut dyn GigeDevice, gain: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&gain) {
            return Err(LimaError::InvalidValue(format!("Gain {} outside [0, 1]", gain)).into());
        }
        let (min, max) = device.int_range(nodes::GAIN_RAW)?;
        let raw = min + ((max - min) as f64 * gain).round() as i64;
        device.set_int(nodes::GAIN_RAW, raw)
    }

    pub fn has_auto_gain(device: &dyn GigeDevice) -> bool {
        device.is_available(nodes::GAIN_AUTO)
    }

    pub fn auto_gain(device: &dyn GigeDevice) -> Result<bool> {
        if !Self::has_auto_gain(device) {
            return Ok(false);
        }
        Ok(device.get_enum(nodes::GAIN_AUTO)? != "Off")
    }

    pub fn set_auto_gain(device: &mut dyn GigeDevice, on: bool) -> Result<()> {
        if !Self::has_auto_gain(device) {
            return Err(LimaError::NotSupported("Auto gain not available on this camera".into()).into());
        }
        device.set_enum(nodes::GAIN_AUTO, if on { "Continuous" } else { "Off" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_tokens_map_to_nodes() {
        assert_eq!(TestImage::from_str("TESTIMAGE_3"), Some(TestImage::Image3));
        assert_eq!(TestImage::Image3.node_value(), "Testimage3");
        assert_eq!(TestImage::from_node("Off"), Some(TestImage::Off));
        assert_eq!(TestImage::all_choices().len(), 8);
        assert_eq!(TestImage::from_str("TESTIMAGE_9"), None);
    }

    #[test]
    fn line_source_tokens_map_to_nodes() {
        assert_eq!(LineSource::from_str("TIMER_ACTIVE").unwrap().node_value(), "Timer1Active");
        assert_eq!(
            LineSource::from_node("AcquisitionTriggerWait"),
            Some(LineSource::AcquisitionTriggerWait)
        );
        assert_eq!(LineSource::all_choices()[0], "OFF");
    }

    #[test]
    fn video_mode_mapping() {
        assert_eq!(video_mode_for_format("Mono12").unwrap(), VideoMode::Y16);
        assert_eq!(video_mode_for_format("BayerBG12").unwrap(), VideoMode::BayerBg16);
        assert!(video_mode_for_format("Mono12Packed").is_err());
        assert_eq!(formats_for_video_mode(VideoMode::Y16)[0], "Mono16");
    }

    #[test]
    fn model_exposure_kind() {
        assert!(BaslerFeatures::has_absolute_exposure("acA1300-30gm"));
        assert!(!BaslerFeatures::has_absolute_exposure("scA640-70gm"));
    }
}
