use api::{convert_color, ColorType, VideoSource};
use image::{imageops, DynamicImage, GrayImage, RgbImage};
use log::{debug, warn};

/// Two physical eye cameras presented as one side-by-side source, so the eye
/// pipeline can treat every rig as a single wide frame split down the middle.
pub struct DualCameraSource {
    left: Box<dyn VideoSource>,
    right: Box<dyn VideoSource>,
    last_left: Option<DynamicImage>,
    last_right: Option<DynamicImage>,
}

impl DualCameraSource {
    pub fn new(left: Box<dyn VideoSource>, right: Box<dyn VideoSource>) -> Self {
        Self {
            left,
            right,
            last_left: None,
            last_right: None,
        }
    }
}

/// Places `left` and `right` next to each other, scaling `right` to `left`'s size.
pub fn stitch(left: &DynamicImage, right: &DynamicImage, color: ColorType) -> DynamicImage {
    let (width, height) = (left.width(), left.height());
    let right = if right.width() != width || right.height() != height {
        right.resize_exact(width, height, imageops::FilterType::Triangle)
    } else {
        right.clone()
    };

    match color {
        ColorType::Gray8 => {
            let mut canvas = GrayImage::new(width * 2, height);
            imageops::replace(&mut canvas, &left.to_luma8(), 0, 0);
            imageops::replace(&mut canvas, &right.to_luma8(), width as i64, 0);
            DynamicImage::ImageLuma8(canvas)
        }
        ColorType::Rgb24 => {
            let mut canvas = RgbImage::new(width * 2, height);
            imageops::replace(&mut canvas, &left.to_rgb8(), 0, 0);
            imageops::replace(&mut canvas, &right.to_rgb8(), width as i64, 0);
            DynamicImage::ImageRgb8(canvas)
        }
    }
}

impl VideoSource for DualCameraSource {
    fn start(&mut self) -> bool {
        let left = self.left.start();
        let right = self.right.start();
        if left != right {
            warn!("Only one eye camera started (left: {}, right: {})", left, right);
        }
        left || right
    }

    fn stop(&mut self) -> bool {
        let left = self.left.stop();
        let right = self.right.stop();
        self.last_left = None;
        self.last_right = None;
        left || right
    }

    fn get_frame(&mut self, color: ColorType) -> Option<DynamicImage> {
        if let Some(frame) = self.left.get_frame(color) {
            self.last_left = Some(frame);
        }
        if let Some(frame) = self.right.get_frame(color) {
            self.last_right = Some(frame);
        }

        match (&self.last_left, &self.last_right) {
            (Some(left), Some(right)) => Some(stitch(left, right, color)),
            (Some(only), None) | (None, Some(only)) => {
                debug!("One eye camera has no frame yet, duplicating the other");
                Some(stitch(only, only, color))
            }
            (None, None) => None,
        }
    }

    /// The pair is rebuilt as a whole, so a dead camera on either side fails it.
    fn failure(&self) -> Option<String> {
        self.left
            .failure()
            .map(|reason| format!("left eye {}", reason))
            .or_else(|| self.right.failure().map(|reason| format!("right eye {}", reason)))
    }
}

/// One eye camera standing in for both eyes.
pub struct MirroredSource {
    inner: Box<dyn VideoSource>,
}

impl MirroredSource {
    pub fn new(inner: Box<dyn VideoSource>) -> Self {
        Self { inner }
    }
}

impl VideoSource for MirroredSource {
    fn start(&mut self) -> bool {
        self.inner.start()
    }

    fn stop(&mut self) -> bool {
        self.inner.stop()
    }

    fn get_frame(&mut self, color: ColorType) -> Option<DynamicImage> {
        let frame = convert_color(self.inner.get_frame(color)?, color);
        Some(stitch(&frame, &frame, color))
    }

    fn failure(&self) -> Option<String> {
        self.inner.failure()
    }
}
