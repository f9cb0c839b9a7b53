use api::{EyeExpressions, FaceExpressions};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maps an observed `[lower, upper]` range onto the `[min, max]` output bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParameter {
    pub lower: f32,
    pub upper: f32,
    pub min: f32,
    pub max: f32,
}

impl Default for CalibrationParameter {
    fn default() -> Self {
        Self::unit()
    }
}

impl CalibrationParameter {
    pub fn new(lower: f32, upper: f32, min: f32, max: f32) -> Self {
        Self {
            lower,
            upper,
            min,
            max,
        }
    }

    /// `(0, 1, 0, 1)`, used by blendshape channels.
    pub fn unit() -> Self {
        Self::new(0.0, 1.0, 0.0, 1.0)
    }

    /// `(-1, 1, -1, 1)`, used by the four gaze channels.
    pub fn gaze() -> Self {
        Self::new(-1.0, 1.0, -1.0, 1.0)
    }

    pub fn is_finite(&self) -> bool {
        self.lower.is_finite() && self.upper.is_finite() && self.min.is_finite() && self.max.is_finite()
    }

    /// Linear remap clamped into `[min, max]`. A collapsed input range acts as a step at `lower`.
    pub fn remap(&self, raw: f32) -> f32 {
        let (lo, hi) = if self.min <= self.max {
            (self.min, self.max)
        } else {
            (self.max, self.min)
        };

        if raw.is_nan() {
            return lo;
        }

        let span = self.upper - self.lower;
        let out = if span == 0.0 {
            if raw < self.lower {
                self.min
            } else {
                self.max
            }
        } else {
            self.min + (raw - self.lower) * (self.max - self.min) / span
        };

        out.clamp(lo, hi)
    }
}

/// Ordered `(name, default range)` list for every eye and face channel.
pub fn default_channels() -> Vec<(String, CalibrationParameter)> {
    let eye = EyeExpressions::ALL.iter().map(|&e| {
        let param = if e.is_gaze() {
            CalibrationParameter::gaze()
        } else {
            CalibrationParameter::unit()
        };
        (e.name(), param)
    });
    let face = FaceExpressions::ALL
        .iter()
        .map(|&f| (f.name(), CalibrationParameter::unit()));

    eye.chain(face).collect()
}

/// Persisted form: channel name to range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalibrationData {
    pub channels: BTreeMap<String, CalibrationParameter>,
}
