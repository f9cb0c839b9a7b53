use api::{Camera, CameraSettings, CaptureKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    /// Device path, serial port or URL. Empty disables the slot.
    pub address: String,
    pub settings: CameraSettings,
    /// Overrides detection from the address.
    #[serde(default)]
    pub capture_kind: Option<CaptureKind>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            settings: CameraSettings::default(),
            capture_kind: None,
        }
    }
}

impl CameraConfig {
    pub fn for_camera(camera: Camera) -> Self {
        Self {
            settings: CameraSettings {
                camera,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.address.trim().is_empty()
    }

    pub fn kind(&self) -> CaptureKind {
        self.capture_kind
            .unwrap_or_else(|| CaptureKind::detect(&self.address))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FilterConfig {
    pub enabled: bool,
    #[serde(default = "default_min_cutoff")]
    pub min_cutoff: f32,
    #[serde(default = "default_speed_coefficient", alias = "beta")]
    pub speed_coefficient: f32,
}

fn default_min_cutoff() -> f32 {
    1.0
}

fn default_speed_coefficient() -> f32 {
    0.5
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_cutoff: default_min_cutoff(),
            speed_coefficient: default_speed_coefficient(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OscConfig {
    #[serde(default = "default_osc_address")]
    pub address: String,
    #[serde(default = "default_in_port")]
    pub in_port: u16,
    #[serde(default = "default_out_port")]
    pub out_port: u16,
    /// Prepended to every parameter address.
    pub prefix: String,
}

fn default_osc_address() -> String {
    "127.0.0.1".to_string()
}

fn default_in_port() -> u16 {
    8889
}

fn default_out_port() -> u16 {
    8888
}

impl Default for OscConfig {
    fn default() -> Self {
        Self {
            address: default_osc_address(),
            in_port: default_in_port(),
            out_port: default_out_port(),
            prefix: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BabbleConfig {
    pub face: CameraConfig,
    pub left_eye: CameraConfig,
    pub right_eye: CameraConfig,

    #[serde(default = "default_face_model")]
    pub face_model: String,
    #[serde(default = "default_eye_model")]
    pub eye_model: String,
    #[serde(default = "default_use_gpu")]
    pub use_gpu: bool,

    pub filter: FilterConfig,
    pub stabilize_eyes: bool,
    #[serde(default = "default_detect_corruption")]
    pub detect_corruption: bool,

    pub osc: OscConfig,

    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_dispatch_interval_ms")]
    pub dispatch_interval_ms: u64,

    #[serde(default = "default_calibration_path")]
    pub calibration_path: String,
}

fn default_face_model() -> String {
    "faceModel.onnx".to_string()
}

fn default_eye_model() -> String {
    "eyeModel.onnx".to_string()
}

fn default_use_gpu() -> bool {
    true
}

fn default_detect_corruption() -> bool {
    true
}

fn default_tick_interval_ms() -> u64 {
    10
}

fn default_dispatch_interval_ms() -> u64 {
    10
}

fn default_calibration_path() -> String {
    "calibration.json".to_string()
}

impl Default for BabbleConfig {
    fn default() -> Self {
        Self {
            face: CameraConfig::for_camera(Camera::Face),
            left_eye: CameraConfig::for_camera(Camera::Left),
            right_eye: CameraConfig::for_camera(Camera::Right),
            face_model: default_face_model(),
            eye_model: default_eye_model(),
            use_gpu: default_use_gpu(),
            filter: FilterConfig::default(),
            stabilize_eyes: false,
            detect_corruption: default_detect_corruption(),
            osc: OscConfig::default(),
            tick_interval_ms: default_tick_interval_ms(),
            dispatch_interval_ms: default_dispatch_interval_ms(),
            calibration_path: default_calibration_path(),
        }
    }
}

impl BabbleConfig {
    /// One wide camera serves both eyes when both slots point at the same device.
    pub fn eyes_share_camera(&self) -> bool {
        self.left_eye.is_enabled() && self.left_eye.address == self.right_eye.address
    }

    pub fn eyes_enabled(&self) -> bool {
        self.left_eye.is_enabled() || self.right_eye.is_enabled()
    }
}
