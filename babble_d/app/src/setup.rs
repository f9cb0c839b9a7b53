use crate::capture::create_capture;
use crate::inference::OrtInferenceRunner;
use crate::pipeline::{ProcessingPipeline, SourceFactory};
use crate::sources::{DualCameraSource, MirroredSource};
use anyhow::{Context, Result};
use api::VideoSource;
use common::{BabbleConfig, CameraConfig, CorruptionDetector};
use log::{error, info, warn};
use std::fs;
use std::path::Path;

pub fn load_config(path: &Path) -> Result<BabbleConfig> {
    if path.exists() {
        info!("Loading config from {:?}", path);
        let file = fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let config = serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse {:?}", path))?;
        Ok(config)
    } else {
        info!("Config not found. Creating default at {:?}", path);
        let config = BabbleConfig::default();
        let file = fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, &config)?;
        Ok(config)
    }
}

pub fn capture_for(camera: &CameraConfig) -> Box<dyn VideoSource> {
    Box::new(create_capture(camera.kind(), camera.address.trim()))
}

/// Returns `None` when the face camera slot is empty.
pub fn face_source_factory(config: &BabbleConfig) -> Option<SourceFactory> {
    if !config.face.is_enabled() {
        return None;
    }
    let camera = config.face.clone();
    Some(Box::new(move || Some(capture_for(&camera))))
}

/// Picks the eye rig from the configured addresses: one shared wide camera, two
/// cameras stitched together, or a single camera duplicated for both eyes.
pub fn eye_source_factory(config: &BabbleConfig) -> Option<SourceFactory> {
    if !config.eyes_enabled() {
        return None;
    }
    let left = config.left_eye.clone();
    let right = config.right_eye.clone();

    if config.eyes_share_camera() {
        info!("Eyes share camera {}", left.address);
        return Some(Box::new(move || Some(capture_for(&left))));
    }

    match (left.is_enabled(), right.is_enabled()) {
        (true, true) => {
            info!("Eye cameras: left {}, right {}", left.address, right.address);
            Some(Box::new(move || {
                Some(Box::new(DualCameraSource::new(capture_for(&left), capture_for(&right)))
                    as Box<dyn VideoSource>)
            }))
        }
        (true, false) | (false, true) => {
            let only = if left.is_enabled() { left } else { right };
            warn!("Only one eye camera configured ({}), mirroring it", only.address);
            Some(Box::new(move || {
                Some(Box::new(MirroredSource::new(capture_for(&only))) as Box<dyn VideoSource>)
            }))
        }
        (false, false) => None,
    }
}

/// Wires a pipeline from `config`. A modality whose model fails to load stays idle.
pub fn build_pipeline(config: &BabbleConfig) -> ProcessingPipeline {
    let mut pipeline = ProcessingPipeline::new(config.filter.clone());
    pipeline.set_stabilize_eyes(config.stabilize_eyes);
    pipeline.set_corruption_detector(config.detect_corruption.then(CorruptionDetector::default));
    pipeline.set_face_settings(config.face.settings);
    pipeline.set_eye_settings(config.left_eye.settings, config.right_eye.settings);

    if let Some(factory) = face_source_factory(config) {
        match OrtInferenceRunner::setup(&config.face_model, config.use_gpu) {
            Ok(runner) => {
                pipeline.set_face_runner(Box::new(runner));
                pipeline.set_face_source_factory(factory);
            }
            Err(e) => error!("Face tracking disabled: {:#}", e),
        }
    } else {
        info!("No face camera configured");
    }

    if let Some(factory) = eye_source_factory(config) {
        match OrtInferenceRunner::setup(&config.eye_model, config.use_gpu) {
            Ok(runner) => {
                pipeline.set_eye_runner(Box::new(runner));
                pipeline.set_eye_source_factory(factory);
            }
            Err(e) => error!("Eye tracking disabled: {:#}", e),
        }
    } else {
        info!("No eye cameras configured");
    }

    pipeline
}
