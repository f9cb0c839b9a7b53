use api::EYE_RAW_EXPRESSIONS;

/// Combines the raw per-eye model output into the canonical eye vector.
///
/// Input, per eye: `[pitch, yaw, lid]` in `[0, 1]`, left eye first. Output:
/// `[right_yaw_corrected, eye_y, right_lid, left_yaw_corrected, eye_y, left_lid]`.
/// The left/right swap in the output matches the mirrored camera rig and is relied on
/// by the parameter map.
#[derive(Debug, Clone, Copy, Default)]
pub struct EyeFusion {
    pub stabilize: bool,
}

impl EyeFusion {
    pub fn new(stabilize: bool) -> Self {
        Self { stabilize }
    }

    /// Rewrites `expressions` in place. Returns false, leaving the input untouched, when
    /// fewer than six channels are present.
    pub fn fuse(&self, expressions: &mut Vec<f32>) -> bool {
        if expressions.len() < EYE_RAW_EXPRESSIONS {
            return false;
        }

        let mut left_pitch = expressions[0] * 2.0 - 1.0;
        let mut left_yaw = expressions[1] * 2.0 - 1.0;
        let left_lid = 1.0 - expressions[2];

        let mut right_pitch = expressions[3] * 2.0 - 1.0;
        let mut right_yaw = expressions[4] * 2.0 - 1.0;
        let right_lid = 1.0 - expressions[5];

        if self.stabilize {
            // Never diverge past parallel.
            let convergence = ((left_yaw - right_yaw) / 2.0).max(0.0);
            let pitch = (left_pitch + right_pitch) / 2.0;
            let yaw = (left_yaw + right_yaw) / 2.0;

            left_pitch = pitch;
            right_pitch = pitch;
            left_yaw = yaw + convergence;
            right_yaw = yaw - convergence;
        }

        let lid_sum = left_lid + right_lid;
        let eye_y = if lid_sum == 0.0 {
            (left_pitch + right_pitch) / 2.0
        } else {
            (left_pitch * left_lid + right_pitch * right_lid) / lid_sum
        };

        let left_yaw_corrected = right_yaw * (1.0 - left_lid) + left_yaw * left_lid;
        let right_yaw_corrected = left_yaw * (1.0 - right_lid) + right_yaw * right_lid;

        *expressions = vec![
            right_yaw_corrected,
            eye_y,
            right_lid,
            left_yaw_corrected,
            eye_y,
            left_lid,
        ];
        true
    }
}
