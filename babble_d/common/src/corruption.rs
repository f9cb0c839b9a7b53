use image::GrayImage;
use std::collections::VecDeque;

pub const DEFAULT_THRESHOLD: f64 = 0.022669;
const ADAPTATION_WINDOW: usize = 100;
const MIN_SAMPLES: usize = 20;

/// Flags frames with torn or striped rows, which show up as erratic jumps between
/// consecutive row means.
#[derive(Debug, Clone)]
pub struct CorruptionDetector {
    base_threshold: f64,
    current_threshold: f64,
    adaptive: bool,
    recent: VecDeque<f64>,
}

impl Default for CorruptionDetector {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, true)
    }
}

impl CorruptionDetector {
    pub fn new(threshold: f64, adaptive: bool) -> Self {
        Self {
            base_threshold: threshold,
            current_threshold: threshold,
            adaptive,
            recent: VecDeque::with_capacity(ADAPTATION_WINDOW + 1),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.current_threshold
    }

    /// Standard deviation of the differences between consecutive row means of the
    /// frame normalized to `[0, 1]`.
    pub fn row_pattern_metric(image: &GrayImage) -> f64 {
        let (width, height) = image.dimensions();
        if height <= 1 || width == 0 {
            return 0.0;
        }

        let row_means: Vec<f64> = image
            .rows()
            .map(|row| row.map(|p| p[0] as f64 / 255.0).sum::<f64>() / width as f64)
            .collect();

        let diffs: Vec<f64> = row_means.windows(2).map(|w| w[1] - w[0]).collect();
        let mean = diffs.iter().sum::<f64>() / diffs.len() as f64;
        let variance = diffs.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / diffs.len() as f64;
        variance.sqrt()
    }

    fn update_threshold(&mut self, value: f64) {
        if !self.adaptive {
            return;
        }

        self.recent.push_back(value);
        if self.recent.len() > ADAPTATION_WINDOW {
            self.recent.pop_front();
        }
        if self.recent.len() < MIN_SAMPLES {
            return;
        }

        let mut values: Vec<f64> = self.recent.iter().copied().collect();
        values.sort_by(f64::total_cmp);
        let median = values[values.len() / 2];

        let mut deviations: Vec<f64> = values.iter().map(|v| (v - median).abs()).collect();
        deviations.sort_by(f64::total_cmp);
        let mad = deviations[deviations.len() / 2];

        self.current_threshold =
            (median + 3.0 * mad).clamp(self.base_threshold * 0.5, self.base_threshold * 3.0);
    }

    /// Returns `(is_corrupted, metric, threshold_used)`.
    pub fn check(&mut self, image: &GrayImage) -> (bool, f64, f64) {
        let metric = Self::row_pattern_metric(image);
        self.update_threshold(metric);
        (metric > self.current_threshold, metric, self.current_threshold)
    }
}
