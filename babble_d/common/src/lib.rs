pub use api::{
    Camera, CameraSettings, CaptureKind, ColorType, EyeExpressions, FaceExpressions, Modality,
    PipelineError, RegionOfInterest, VideoSource,
};

mod calibration;
pub mod calibration_manager;
pub mod compositor;
mod config;
mod corruption;
mod euro_filter;
mod fusion;
pub mod transform;

pub use calibration::{default_channels, CalibrationData, CalibrationParameter};
pub use calibration_manager::CalibrationManager;
pub use compositor::{FrameCompositor, FrameData, StereoFrame};
pub use config::{BabbleConfig, CameraConfig, FilterConfig, OscConfig};
pub use corruption::CorruptionDetector;
pub use euro_filter::{EuroFilter, OneEuroFilter};
pub use fusion::EyeFusion;
pub use transform::{DualImageTransformer, ImageTransformer};
