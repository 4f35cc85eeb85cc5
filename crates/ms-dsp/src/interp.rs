//! 1-D interpolation
//!
//! Akima cubic interpolation for the pitch curve and linear resampling for
//! mel rows and per-sample gain curves. Akima's weighted-slope scheme stays
//! close to the data near outliers where a global spline would ring.

use crate::error::{DspError, DspResult};

/// Akima cubic interpolator over strictly increasing knots.
pub struct AkimaSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    /// Per-interval cubic coefficients: y = y[i] + b dx + c dx^2 + d dx^3
    b: Vec<f64>,
    c: Vec<f64>,
    d: Vec<f64>,
}

impl AkimaSpline {
    /// Build from knots. Requires `n >= 2` and strictly increasing `x`.
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> DspResult<Self> {
        let n = x.len();
        if n < 2 || y.len() != n {
            return Err(DspError::InvalidArgument(format!(
                "akima needs >= 2 matching knots, got {} x {}",
                n,
                y.len()
            )));
        }
        for i in 1..n {
            if x[i] <= x[i - 1] {
                return Err(DspError::InvalidArgument(format!(
                    "akima knots must be strictly increasing at index {i}"
                )));
            }
        }

        // Interval slopes, extended by two on each side
        let intervals = n - 1;
        let mut m = vec![0.0f64; intervals + 4];
        for i in 0..intervals {
            m[i + 2] = (y[i + 1] - y[i]) / (x[i + 1] - x[i]);
        }
        m[1] = 2.0 * m[2] - m[3.min(intervals + 1)];
        m[0] = 2.0 * m[1] - m[2];
        m[intervals + 2] = 2.0 * m[intervals + 1] - m[intervals];
        m[intervals + 3] = 2.0 * m[intervals + 2] - m[intervals + 1];

        // Knot derivatives from the Akima weighted average
        let mut t = vec![0.0f64; n];
        for (i, ti) in t.iter_mut().enumerate() {
            let w1 = (m[i + 3] - m[i + 2]).abs();
            let w2 = (m[i + 1] - m[i]).abs();
            *ti = if w1 < 1e-15 && w2 < 1e-15 {
                (m[i + 1] + m[i + 2]) / 2.0
            } else {
                (w1 * m[i + 1] + w2 * m[i + 2]) / (w1 + w2)
            };
        }

        let mut b = vec![0.0f64; intervals];
        let mut c = vec![0.0f64; intervals];
        let mut d = vec![0.0f64; intervals];
        for i in 0..intervals {
            let dx = x[i + 1] - x[i];
            let slope = m[i + 2];
            b[i] = t[i];
            c[i] = (3.0 * slope - 2.0 * t[i] - t[i + 1]) / dx;
            d[i] = (t[i] + t[i + 1] - 2.0 * slope) / (dx * dx);
        }

        Ok(Self { x, y, b, c, d })
    }

    /// Evaluate at `xi`. Outside the knot range the nearest edge polynomial
    /// extrapolates.
    pub fn eval(&self, xi: f64) -> f64 {
        let n = self.x.len();
        let idx = self
            .x
            .partition_point(|&v| v <= xi)
            .saturating_sub(1)
            .min(n - 2);
        let dx = xi - self.x[idx];
        self.y[idx] + dx * (self.b[idx] + dx * (self.c[idx] + dx * self.d[idx]))
    }

    /// Evaluate at many points.
    pub fn eval_many(&self, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|&v| self.eval(v)).collect()
    }
}

/// Linear interpolation of `(xs, ys)` at `xi`, clamping to the edges.
/// `xs` must be sorted ascending.
pub fn lerp_at(xs: &[f64], ys: &[f32], xi: f64) -> f32 {
    debug_assert_eq!(xs.len(), ys.len());
    if xs.is_empty() {
        return 0.0;
    }
    if xi <= xs[0] {
        return ys[0];
    }
    if xi >= xs[xs.len() - 1] {
        return ys[ys.len() - 1];
    }
    let idx = xs.partition_point(|&v| v <= xi) - 1;
    let idx = idx.min(xs.len() - 2);
    let span = xs[idx + 1] - xs[idx];
    if span.abs() < f64::EPSILON {
        return ys[idx];
    }
    let frac = ((xi - xs[idx]) / span) as f32;
    ys[idx] + frac * (ys[idx + 1] - ys[idx])
}

/// Linearly resample `(xs, ys)` onto each point of `targets`.
pub fn lerp_many(xs: &[f64], ys: &[f32], targets: &[f64]) -> Vec<f32> {
    targets.iter().map(|&t| lerp_at(xs, ys, t)).collect()
}
