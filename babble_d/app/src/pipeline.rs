use crate::inference::InferenceRunner;
use api::{Camera, CameraSettings, ColorType, Modality, PipelineError, VideoSource};
use common::compositor::gray_to_tensor;
use common::{
    CorruptionDetector, DualImageTransformer, EyeFusion, FilterConfig, FrameCompositor,
    ImageTransformer, OneEuroFilter,
};
use image::{DynamicImage, GrayImage};
use log::{debug, error, info, trace, warn};
use std::time::{Duration, Instant};

/// Builds a fresh source after the previous one was dropped.
pub type SourceFactory = Box<dyn FnMut() -> Option<Box<dyn VideoSource>> + Send>;

type RawFrameListener = Box<dyn FnMut(Camera, &DynamicImage) + Send>;
type TransformedFrameListener = Box<dyn FnMut(Camera, &GrayImage) + Send>;
type FilteredListener = Box<dyn FnMut(Modality, &[f32]) + Send>;
type ErrorListener = Box<dyn FnMut(Modality, &PipelineError) + Send>;

const REACQUIRE_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Default)]
struct Listeners {
    raw_frame: Vec<RawFrameListener>,
    transformed_frame: Vec<TransformedFrameListener>,
    filtered: Vec<FilteredListener>,
    error: Vec<ErrorListener>,
}

impl Listeners {
    fn raw_frame(&mut self, camera: Camera, frame: &DynamicImage) {
        for listener in &mut self.raw_frame {
            listener(camera, frame);
        }
    }

    fn transformed_frame(&mut self, camera: Camera, frame: &GrayImage) {
        for listener in &mut self.transformed_frame {
            listener(camera, frame);
        }
    }

    fn filtered(&mut self, modality: Modality, values: &[f32]) {
        for listener in &mut self.filtered {
            listener(modality, values);
        }
    }

    fn error(&mut self, modality: Modality, err: &PipelineError) {
        for listener in &mut self.error {
            listener(modality, err);
        }
    }
}

/// A video source that can be dropped on failure and lazily re-acquired.
#[derive(Default)]
struct SourceSlot {
    source: Option<Box<dyn VideoSource>>,
    factory: Option<SourceFactory>,
    next_attempt: Option<Instant>,
}

impl SourceSlot {
    fn set(&mut self, mut source: Box<dyn VideoSource>) {
        self.release();
        if source.start() {
            self.source = Some(source);
        } else {
            warn!("Video source failed to start");
        }
    }

    fn acquire(&mut self, modality: Modality) -> Option<&mut Box<dyn VideoSource>> {
        if self.source.is_none() {
            let now = Instant::now();
            if self.next_attempt.is_some_and(|at| now < at) {
                return None;
            }
            let factory = self.factory.as_mut()?;
            self.next_attempt = Some(now + REACQUIRE_INTERVAL);

            let mut source = factory()?;
            if !source.start() {
                debug!("{:?} source did not start, retrying in {:?}", modality, REACQUIRE_INTERVAL);
                return None;
            }
            info!("{:?} source acquired", modality);
            self.source = Some(source);
        }
        self.source.as_mut()
    }

    fn release(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.stop();
        }
    }
}

/// Lazily sized to the first output the runner produces.
struct FilterSlot {
    filter: Option<OneEuroFilter>,
}

impl FilterSlot {
    fn apply(&mut self, config: &FilterConfig, t: f64, values: Vec<f32>) -> Vec<f32> {
        if !config.enabled {
            return values;
        }
        match &mut self.filter {
            Some(filter) if filter.len() == values.len() => filter.filter(t, &values),
            _ => {
                self.filter = Some(OneEuroFilter::new(
                    &values,
                    config.min_cutoff,
                    config.speed_coefficient,
                ));
                values
            }
        }
    }
}

/// Color frames are only worth fetching when a transformer reads the red channel.
fn frame_color(settings: &[&CameraSettings]) -> ColorType {
    if settings.iter().any(|s| s.use_red_channel) {
        ColorType::Rgb24
    } else {
        ColorType::Gray8
    }
}

/// A source whose device died is an error, even though it simply has no frame to give.
fn next_frame(source: &mut dyn VideoSource, color: ColorType) -> Result<Option<DynamicImage>, PipelineError> {
    if let Some(reason) = source.failure() {
        return Err(PipelineError::Capture(reason));
    }
    Ok(source.get_frame(color))
}

fn inference_error(err: anyhow::Error) -> PipelineError {
    match err.downcast::<PipelineError>() {
        Ok(pipeline_error) => pipeline_error,
        Err(other) => PipelineError::Inference(format!("{:#}", other)),
    }
}

/// Results of one tick. `None` means that modality produced nothing this tick.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickOutput {
    pub face: Option<Vec<f32>>,
    pub eye: Option<Vec<f32>>,
}

/// Face and eye processing, ticked from one thread.
pub struct ProcessingPipeline {
    filter_config: FilterConfig,
    started: Instant,
    listeners: Listeners,

    face_source: SourceSlot,
    face_transformer: ImageTransformer,
    face_runner: Option<Box<dyn InferenceRunner>>,
    face_filter: FilterSlot,

    eye_source: SourceSlot,
    eye_transformer: DualImageTransformer,
    eye_runner: Option<Box<dyn InferenceRunner>>,
    eye_filter: FilterSlot,
    compositor: FrameCompositor,
    fusion: EyeFusion,
    corruption: Option<CorruptionDetector>,
}

impl ProcessingPipeline {
    pub fn new(filter_config: FilterConfig) -> Self {
        Self {
            filter_config,
            started: Instant::now(),
            listeners: Listeners::default(),
            face_source: SourceSlot::default(),
            face_transformer: ImageTransformer::default(),
            face_runner: None,
            face_filter: FilterSlot { filter: None },
            eye_source: SourceSlot::default(),
            eye_transformer: DualImageTransformer::default(),
            eye_runner: None,
            eye_filter: FilterSlot { filter: None },
            compositor: FrameCompositor::new(),
            fusion: EyeFusion::default(),
            corruption: None,
        }
    }

    pub fn on_raw_frame(&mut self, listener: impl FnMut(Camera, &DynamicImage) + Send + 'static) {
        self.listeners.raw_frame.push(Box::new(listener));
    }

    pub fn on_transformed_frame(&mut self, listener: impl FnMut(Camera, &GrayImage) + Send + 'static) {
        self.listeners.transformed_frame.push(Box::new(listener));
    }

    pub fn on_filtered(&mut self, listener: impl FnMut(Modality, &[f32]) + Send + 'static) {
        self.listeners.filtered.push(Box::new(listener));
    }

    pub fn on_error(&mut self, listener: impl FnMut(Modality, &PipelineError) + Send + 'static) {
        self.listeners.error.push(Box::new(listener));
    }

    /// Starts `source` and uses it for the face until it fails.
    pub fn set_face_source(&mut self, source: Box<dyn VideoSource>) {
        self.face_source.set(source);
    }

    pub fn set_face_source_factory(&mut self, factory: SourceFactory) {
        self.face_source.factory = Some(factory);
        self.face_source.next_attempt = None;
    }

    pub fn set_face_runner(&mut self, runner: Box<dyn InferenceRunner>) {
        self.face_transformer.target_size = runner.input_size();
        self.face_runner = Some(runner);
        self.face_filter.filter = None;
    }

    pub fn set_face_settings(&mut self, settings: CameraSettings) {
        self.face_transformer.settings = settings;
    }

    pub fn set_eye_source(&mut self, source: Box<dyn VideoSource>) {
        self.eye_source.set(source);
        self.compositor.clear();
    }

    pub fn set_eye_source_factory(&mut self, factory: SourceFactory) {
        self.eye_source.factory = Some(factory);
        self.eye_source.next_attempt = None;
    }

    pub fn set_eye_runner(&mut self, runner: Box<dyn InferenceRunner>) {
        self.eye_transformer.set_target_size(runner.input_size());
        self.eye_runner = Some(runner);
        self.eye_filter.filter = None;
        self.compositor.clear();
    }

    pub fn set_eye_settings(&mut self, left: CameraSettings, right: CameraSettings) {
        self.eye_transformer.left.settings = left;
        self.eye_transformer.right.settings = right;
    }

    pub fn set_stabilize_eyes(&mut self, stabilize: bool) {
        self.fusion = EyeFusion::new(stabilize);
    }

    pub fn set_corruption_detector(&mut self, detector: Option<CorruptionDetector>) {
        self.corruption = detector;
    }

    pub fn set_filter_config(&mut self, config: FilterConfig) {
        self.filter_config = config;
        self.face_filter.filter = None;
        self.eye_filter.filter = None;
    }

    pub fn has_face_source(&self) -> bool {
        self.face_source.source.is_some()
    }

    pub fn has_eye_source(&self) -> bool {
        self.eye_source.source.is_some()
    }

    /// Frames currently held for temporal stacking.
    pub fn queued_eye_frames(&self) -> usize {
        self.compositor.len()
    }

    fn timestamp(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Runs both modalities once. A failure in one never reaches the other.
    pub fn tick(&mut self) -> TickOutput {
        TickOutput {
            face: self.run_face(),
            eye: self.run_eye(),
        }
    }

    pub fn run_face(&mut self) -> Option<Vec<f32>> {
        match self.face_step() {
            Ok(values) => values,
            Err(e) => {
                self.fail(Modality::Face, e);
                None
            }
        }
    }

    pub fn run_eye(&mut self) -> Option<Vec<f32>> {
        match self.eye_step() {
            Ok(values) => values,
            Err(e) => {
                self.fail(Modality::Eye, e);
                None
            }
        }
    }

    fn fail(&mut self, modality: Modality, err: PipelineError) {
        error!("{:?} pipeline failed, dropping its source: {}", modality, err);
        match modality {
            Modality::Face => self.face_source.release(),
            Modality::Eye => {
                self.eye_source.release();
                self.compositor.clear();
            }
        }
        self.listeners.error(modality, &err);
    }

    fn face_step(&mut self) -> Result<Option<Vec<f32>>, PipelineError> {
        if self.face_runner.is_none() {
            return Ok(None);
        }
        let color = frame_color(&[&self.face_transformer.settings]);
        let Some(source) = self.face_source.acquire(Modality::Face) else {
            return Ok(None);
        };
        let Some(frame) = next_frame(source.as_mut(), color)? else {
            return Ok(None);
        };
        self.listeners.raw_frame(Camera::Face, &frame);

        let Some(transformed) = self.face_transformer.apply(&frame) else {
            trace!("Empty face frame, skipping tick");
            return Ok(None);
        };
        self.listeners.transformed_frame(Camera::Face, &transformed);

        let Some(runner) = self.face_runner.as_mut() else {
            return Ok(None);
        };
        let raw = runner.run(gray_to_tensor(&transformed)).map_err(inference_error)?;

        let t = self.timestamp();
        let filtered = self.face_filter.apply(&self.filter_config, t, raw);
        self.listeners.filtered(Modality::Face, &filtered);
        Ok(Some(filtered))
    }

    fn eye_step(&mut self) -> Result<Option<Vec<f32>>, PipelineError> {
        if self.eye_runner.is_none() {
            return Ok(None);
        }
        let color = frame_color(&[
            &self.eye_transformer.left.settings,
            &self.eye_transformer.right.settings,
        ]);
        let Some(source) = self.eye_source.acquire(Modality::Eye) else {
            return Ok(None);
        };
        let Some(frame) = next_frame(source.as_mut(), color)? else {
            return Ok(None);
        };
        // Both eyes arrive as one stitched frame.
        self.listeners.raw_frame(Camera::Left, &frame);

        if let Some(detector) = self.corruption.as_mut() {
            let (corrupted, metric, threshold) = detector.check(&frame.to_luma8());
            if corrupted {
                debug!("Dropping corrupted eye frame ({:.4} > {:.4})", metric, threshold);
                return Ok(None);
            }
        }

        let Some(stereo) = self.eye_transformer.apply(&frame) else {
            trace!("Empty eye frame, skipping tick");
            return Ok(None);
        };
        self.listeners.transformed_frame(Camera::Left, &stereo.left);
        self.listeners.transformed_frame(Camera::Right, &stereo.right);

        let Some(data) = self.compositor.push(stereo)? else {
            return Ok(None);
        };

        let Some(runner) = self.eye_runner.as_mut() else {
            return Ok(None);
        };
        let raw = runner.run(data.tensor).map_err(inference_error)?;

        let t = self.timestamp();
        let mut values = self.eye_filter.apply(&self.filter_config, t, raw);
        if !self.fusion.fuse(&mut values) {
            warn!("Eye model returned {} values, expected at least 6", values.len());
            return Ok(None);
        }
        self.listeners.filtered(Modality::Eye, &values);
        Ok(Some(values))
    }

    /// Stops and drops both sources.
    pub fn stop(&mut self) {
        self.face_source.release();
        self.eye_source.release();
        self.compositor.clear();
    }
}

impl Drop for ProcessingPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
