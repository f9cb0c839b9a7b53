use crate::compositor::StereoFrame;
use api::{CameraSettings, RegionOfInterest};
use glam::{DAffine2, DVec2};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};

pub const DEFAULT_TARGET_SIZE: (u32, u32) = (224, 224);

/// Crops, rotates, flips, resizes and equalizes one camera's frame.
#[derive(Debug, Clone)]
pub struct ImageTransformer {
    pub settings: CameraSettings,
    pub target_size: (u32, u32),
}

impl Default for ImageTransformer {
    fn default() -> Self {
        Self {
            settings: CameraSettings::default(),
            target_size: DEFAULT_TARGET_SIZE,
        }
    }
}

impl ImageTransformer {
    pub fn new(settings: CameraSettings, target_size: (u32, u32)) -> Self {
        Self {
            settings,
            target_size,
        }
    }

    /// Returns `None` for empty frames or a zero target size; the caller skips the tick.
    pub fn apply(&self, image: &DynamicImage) -> Option<GrayImage> {
        let (width, height) = (image.width(), image.height());
        let (target_w, target_h) = self.target_size;
        if width == 0 || height == 0 || target_w == 0 || target_h == 0 {
            return None;
        }

        let (x, y, w, h) = effective_roi(&self.settings.roi, width, height);
        let cropped = image.crop_imm(x, y, w, h);

        let mut gray = if cropped.color().channel_count() >= 2 && self.settings.use_red_channel {
            let rgb = cropped.to_rgb8();
            GrayImage::from_fn(w, h, |px, py| Luma([rgb.get_pixel(px, py)[0]]))
        } else {
            cropped.to_luma8()
        };

        let brightness = self.settings.brightness;
        if brightness != 1.0 && brightness.is_finite() {
            for pixel in gray.pixels_mut() {
                pixel[0] = (pixel[0] as f32 * brightness).round().clamp(0.0, 255.0) as u8;
            }
        }

        let resized = if self.needs_warp() {
            let matrix = self.affine_matrix(w, h);
            warp_affine(&gray, &matrix, self.target_size)
        } else {
            imageops::resize(&gray, target_w, target_h, FilterType::Triangle)
        };

        Some(equalize_histogram(&resized))
    }

    fn needs_warp(&self) -> bool {
        self.settings.rotation_radians != 0.0
            || self.settings.use_horizontal_flip
            || self.settings.use_vertical_flip
    }

    /// Forward map from a `src_w x src_h` crop into the target frame. Rotation is about the
    /// center, scaled by `1/(|cos|+|sin|)` so the rotated crop stays inside the output, and
    /// a flip negates the matching axis scale.
    pub fn affine_matrix(&self, src_w: u32, src_h: u32) -> DAffine2 {
        let angle = self.settings.rotation_radians as f64;
        let (sin, cos) = angle.sin_cos();
        let scale = 1.0 / (cos.abs() + sin.abs());
        let hscale = if self.settings.use_horizontal_flip { -scale } else { scale };
        let vscale = if self.settings.use_vertical_flip { -scale } else { scale };

        let tw = self.target_size.0 as f64;
        let th = self.target_size.1 as f64;
        let sw = src_w as f64;
        let sh = src_h as f64;

        let m0 = tw / sw * cos * hscale;
        let m1 = th / sh * sin * hscale;
        let m2 = (tw - (tw * cos + th * sin) * hscale) * 0.5;
        let m3 = -tw / sw * sin * vscale;
        let m4 = th / sh * cos * vscale;
        let m5 = (th + (tw * sin - th * cos) * vscale) * 0.5;

        DAffine2::from_cols_array(&[m0, m3, m1, m4, m2, m5])
    }
}

/// The ROI falls back to the whole frame when it is out of bounds, non-positive, or
/// spans the full width or height.
pub fn effective_roi(roi: &RegionOfInterest, width: u32, height: u32) -> (u32, u32, u32, u32) {
    let max_w = width as i64;
    let max_h = height as i64;
    let (x, y, w, h) = (roi.x as i64, roi.y as i64, roi.width as i64, roi.height as i64);

    if x < 0
        || y < 0
        || w <= 0
        || h <= 0
        || x + w > max_w
        || y + h > max_h
        || w == max_w
        || h == max_h
    {
        return (0, 0, width, height);
    }

    (x as u32, y as u32, w as u32, h as u32)
}

/// Samples `src` through the inverse of `matrix` with bilinear interpolation. Pixels
/// that fall outside the source are black.
pub fn warp_affine(src: &GrayImage, matrix: &DAffine2, size: (u32, u32)) -> GrayImage {
    let inverse = matrix.inverse();
    let mut out = GrayImage::new(size.0, size.1);
    if !inverse.is_finite() {
        return out;
    }

    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let p = inverse.transform_point2(DVec2::new(x as f64, y as f64));
        pixel[0] = sample_bilinear(src, p.x, p.y);
    }
    out
}

fn sample_bilinear(src: &GrayImage, x: f64, y: f64) -> u8 {
    let (w, h) = (src.width() as i64, src.height() as i64);
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let at = |px: i64, py: i64| -> f64 {
        if px < 0 || py < 0 || px >= w || py >= h {
            0.0
        } else {
            src.get_pixel(px as u32, py as u32)[0] as f64
        }
    };

    let top = at(x0, y0) * (1.0 - fx) + at(x0 + 1, y0) * fx;
    let bottom = at(x0, y0 + 1) * (1.0 - fx) + at(x0 + 1, y0 + 1) * fx;
    (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8
}

/// Spreads the cumulative histogram across the full 0..=255 range. A frame with a single
/// intensity is returned unchanged.
pub fn equalize_histogram(image: &GrayImage) -> GrayImage {
    let mut hist = [0u64; 256];
    for pixel in image.pixels() {
        hist[pixel[0] as usize] += 1;
    }

    let total = image.width() as u64 * image.height() as u64;
    let Some(first) = hist.iter().position(|&count| count != 0) else {
        return image.clone();
    };
    if hist[first] == total {
        return image.clone();
    }

    let scale = 255.0 / (total - hist[first]) as f64;
    let mut lut = [0u8; 256];
    let mut sum = 0u64;
    for i in first + 1..256 {
        sum += hist[i];
        lut[i] = (sum as f64 * scale).round().clamp(0.0, 255.0) as u8;
    }

    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        pixel[0] = lut[pixel[0] as usize];
    }
    out
}

/// Serves both eyes from one wide frame: the left half goes to `left`, the right half to
/// `right`, each with its own settings.
#[derive(Debug, Clone, Default)]
pub struct DualImageTransformer {
    pub left: ImageTransformer,
    pub right: ImageTransformer,
}

impl DualImageTransformer {
    pub fn new(left: ImageTransformer, right: ImageTransformer) -> Self {
        Self { left, right }
    }

    pub fn set_target_size(&mut self, size: (u32, u32)) {
        self.left.target_size = size;
        self.right.target_size = size;
    }

    pub fn apply(&self, image: &DynamicImage) -> Option<StereoFrame> {
        let half = image.width() / 2;
        if half == 0 || image.height() == 0 {
            return None;
        }

        let left = image.crop_imm(0, 0, half, image.height());
        let right = image.crop_imm(half, 0, half, image.height());

        Some(StereoFrame {
            left: self.left.apply(&left)?,
            right: self.right.apply(&right)?,
        })
    }
}
