use std::f32::consts::PI;

#[derive(Debug, Clone, Copy)]
pub struct EuroFilter {
    min_cutoff: f32,
    beta: f32,
    d_cutoff: f32,
    x_prev: f32,
    dx_prev: f32,
    t_prev: f64,
}

impl Default for EuroFilter {
    fn default() -> Self {
        Self {
            min_cutoff: 1.0,
            beta: 0.5,
            d_cutoff: 1.0,
            x_prev: 0.0,
            dx_prev: 0.0,
            t_prev: 0.0,
        }
    }
}

impl EuroFilter {
    pub fn new(x0: f32, min_cutoff: f32, beta: f32) -> Self {
        Self {
            min_cutoff,
            beta,
            x_prev: x0,
            ..Default::default()
        }
    }

    fn alpha(dt: f32, cutoff: f32) -> f32 {
        let tau = 1.0 / (2.0 * PI * cutoff);
        1.0 / (1.0 + tau / dt)
    }

    fn low_pass(hat_x_prev: &mut f32, x: f32, alpha: f32) -> f32 {
        let hat_x = alpha * x + (1.0 - alpha) * *hat_x_prev;
        *hat_x_prev = hat_x;
        hat_x
    }

    /// Filters sample `x` taken at time `t` (seconds). Non-increasing timestamps and NaN
    /// samples leave the state untouched and return the previous output.
    pub fn filter(&mut self, t: f64, x: f32) -> f32 {
        if x.is_nan() {
            return self.x_prev;
        }

        let dt = (t - self.t_prev) as f32;
        if dt <= 0.0 || !dt.is_finite() {
            return self.x_prev;
        }
        self.t_prev = t;

        let dx = (x - self.x_prev) / dt;
        let edx = Self::low_pass(&mut self.dx_prev, dx, Self::alpha(dt, self.d_cutoff));
        let cutoff = self.min_cutoff + self.beta * edx.abs();

        Self::low_pass(&mut self.x_prev, x, Self::alpha(dt, cutoff))
    }

    pub fn value(&self) -> f32 {
        self.x_prev
    }
}

/// Vector One Euro filter. The channel count is fixed by the initial values.
#[derive(Debug, Clone)]
pub struct OneEuroFilter {
    channels: Vec<EuroFilter>,
}

impl OneEuroFilter {
    pub fn new(initial: &[f32], min_cutoff: f32, beta: f32) -> Self {
        Self {
            channels: initial
                .iter()
                .map(|&x0| EuroFilter::new(x0, min_cutoff, beta))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Filters each channel independently. Values beyond the filter's channel count
    /// are passed through untouched.
    pub fn filter(&mut self, t: f64, x: &[f32]) -> Vec<f32> {
        x.iter()
            .enumerate()
            .map(|(i, &v)| match self.channels.get_mut(i) {
                Some(channel) => channel.filter(t, v),
                None => v,
            })
            .collect()
    }
}
