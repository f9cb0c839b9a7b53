use crate::transform::equalize_histogram;
use api::{PipelineError, FRAMES_FOR_INFERENCE};
use image::GrayImage;
use ndarray::Array4;
use std::collections::VecDeque;
use std::time::Instant;

/// A transformed eye pair: storage channel 0 is the left eye, channel 1 the right.
#[derive(Debug, Clone, PartialEq)]
pub struct StereoFrame {
    pub left: GrayImage,
    pub right: GrayImage,
}

impl StereoFrame {
    pub fn dimensions(&self) -> (u32, u32) {
        self.left.dimensions()
    }

    fn channel(&self, index: usize) -> &GrayImage {
        if index == 0 {
            &self.left
        } else {
            &self.right
        }
    }
}

/// A model input handed from the compositor to the inference runner.
#[derive(Debug, Clone)]
pub struct FrameData {
    pub tensor: Array4<f32>,
    pub timestamp: Instant,
}

/// Keeps the last `FRAMES_FOR_INFERENCE` eye pairs and stacks them into an
/// `[1, 2 * FRAMES_FOR_INFERENCE, H, W]` tensor.
#[derive(Debug, Default)]
pub struct FrameCompositor {
    queue: VecDeque<StereoFrame>,
}

impl FrameCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Equalizes and enqueues `frame`. Returns `Ok(None)` until enough frames are queued.
    pub fn push(&mut self, frame: StereoFrame) -> Result<Option<FrameData>, PipelineError> {
        self.queue.push_back(StereoFrame {
            left: equalize_histogram(&frame.left),
            right: equalize_histogram(&frame.right),
        });

        if self.queue.len() < FRAMES_FOR_INFERENCE {
            return Ok(None);
        }
        while self.queue.len() > FRAMES_FOR_INFERENCE {
            self.queue.pop_front();
        }

        let tensor = stack_frames(self.queue.make_contiguous())?;
        Ok(Some(FrameData {
            tensor,
            timestamp: Instant::now(),
        }))
    }
}

/// Writes each frame's two channels into consecutive tensor channel pairs, oldest frame
/// first. Within a pair the order is (channel 1, channel 0), which is what the eye model
/// was trained on.
pub fn stack_frames(frames: &[StereoFrame]) -> Result<Array4<f32>, PipelineError> {
    if frames.len() != FRAMES_FOR_INFERENCE {
        return Err(PipelineError::TensorShape(format!(
            "expected {} frames, got {}",
            FRAMES_FOR_INFERENCE,
            frames.len()
        )));
    }

    let (width, height) = frames[0].dimensions();
    for (i, frame) in frames.iter().enumerate() {
        if frame.left.dimensions() != (width, height) || frame.right.dimensions() != (width, height) {
            return Err(PipelineError::TensorShape(format!(
                "frame {} is {:?}/{:?}, expected {}x{}",
                i,
                frame.left.dimensions(),
                frame.right.dimensions(),
                width,
                height
            )));
        }
    }

    let channels = 2 * FRAMES_FOR_INFERENCE;
    let mut tensor = Array4::<f32>::zeros((1, channels, height as usize, width as usize));
    for (i, frame) in frames.iter().enumerate() {
        for (slot, source) in [(i * 2, 1), (i * 2 + 1, 0)] {
            let image = frame.channel(source);
            for (x, y, pixel) in image.enumerate_pixels() {
                tensor[[0, slot, y as usize, x as usize]] = pixel[0] as f32 / 255.0;
            }
        }
    }
    Ok(tensor)
}

/// `[1, 1, H, W]` tensor with pixels scaled to `[0, 1]`, as the face model expects.
pub fn gray_to_tensor(image: &GrayImage) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 1, height as usize, width as usize));
    for (x, y, pixel) in image.enumerate_pixels() {
        tensor[[0, 0, y as usize, x as usize]] = pixel[0] as f32 / 255.0;
    }
    tensor
}
