mod error;
mod expressions;

pub use error::PipelineError;
pub use expressions::{EyeExpressions, FaceExpressions};

use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Number of consecutive frames stacked into one eye tensor.
pub const FRAMES_FOR_INFERENCE: usize = 4;
/// Raw channels produced by the eye model (pitch, yaw, lid per eye).
pub const EYE_RAW_EXPRESSIONS: usize = 6;
/// Raw channels produced by the face model.
pub const FACE_RAW_EXPRESSIONS: usize = 45;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Camera {
    #[default]
    Face,
    Left,
    Right,
}

/// Which pipeline produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modality {
    Face,
    Eye,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorType {
    #[default]
    Gray8,
    Rgb24,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionOfInterest {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Default for RegionOfInterest {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            width: 640,
            height: 480,
        }
    }
}

impl RegionOfInterest {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Per-camera geometric and photometric settings, read by the transformer on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub camera: Camera,
    pub roi: RegionOfInterest,
    pub rotation_radians: f32,
    pub use_horizontal_flip: bool,
    pub use_vertical_flip: bool,
    pub use_red_channel: bool,
    pub brightness: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            camera: Camera::Face,
            roi: RegionOfInterest::default(),
            rotation_radians: 0.0,
            use_horizontal_flip: false,
            use_vertical_flip: false,
            use_red_channel: true,
            brightness: 1.0,
        }
    }
}

impl CameraSettings {
    pub fn new(camera: Camera, roi: RegionOfInterest) -> Self {
        Self {
            camera,
            roi,
            ..Default::default()
        }
    }
}

/// Capture backend family, selected from the camera address or set explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaptureKind {
    /// OS camera API (V4L2 on Linux).
    #[serde(alias = "OpenCv", alias = "V4l")]
    Generic,
    /// MJPEG over HTTP.
    #[serde(alias = "Ip", alias = "Mjpeg")]
    IpCamera,
    /// Vive Facial Tracker style UVC device that needs vendor activation.
    #[serde(alias = "VFT")]
    Vft,
    /// Babble board over USB serial.
    Serial,
}

impl CaptureKind {
    pub fn detect(address: &str) -> Self {
        let lowered = address.to_ascii_lowercase();
        if lowered.starts_with("com") || lowered.starts_with("/dev/tty") || lowered.starts_with("/dev/cu") {
            Self::Serial
        } else if lowered.starts_with("http://")
            || lowered.starts_with("https://")
            || lowered.ends_with(".local")
            || lowered.ends_with(".local/")
        {
            Self::IpCamera
        } else {
            Self::Generic
        }
    }
}

/// A camera or stream that yields frames on demand.
///
/// `get_frame` may be polled faster than the device produces frames; it returns the
/// most recent completed frame, or `None` if the source has never been ready.
pub trait VideoSource: Send {
    fn start(&mut self) -> bool;
    fn stop(&mut self) -> bool;
    fn get_frame(&mut self, color: ColorType) -> Option<DynamicImage>;

    /// The device failed while streaming and will not produce frames again until the
    /// source is stopped and rebuilt.
    fn failure(&self) -> Option<String> {
        None
    }
}

/// Converts a decoded frame to the requested color layout.
pub fn convert_color(image: DynamicImage, color: ColorType) -> DynamicImage {
    match color {
        ColorType::Gray8 => match image {
            DynamicImage::ImageLuma8(_) => image,
            other => DynamicImage::ImageLuma8(other.to_luma8()),
        },
        ColorType::Rgb24 => match image {
            DynamicImage::ImageRgb8(_) => image,
            other => DynamicImage::ImageRgb8(other.to_rgb8()),
        },
    }
}
