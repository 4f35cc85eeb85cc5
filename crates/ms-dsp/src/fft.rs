//! FFT core
//!
//! In-place complex FFT over split real/imag f32 buffers. Power-of-two
//! sizes run an iterative radix-2 Cooley-Tukey over a cached plan
//! (bit-reversal permutation + per-stage twiddle tables); every other size
//! goes through Bluestein's chirp transform, whose convolution kernel is
//! itself precomputed with the radix-2 path.
//!
//! Plans are process-wide, memoized by size, and immutable after
//! construction. Bluestein scratch buffers are pooled per plan so
//! concurrent callers never allocate in the hot path.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};

use crate::error::{DspError, DspResult};

// ============ Plan ============

/// Per-stage twiddle table for the radix-2 butterflies.
struct Stage {
    twiddle_re: Vec<f32>,
    twiddle_im: Vec<f32>,
}

/// Scratch buffers for one Bluestein invocation.
struct Workspace {
    re: Vec<f32>,
    im: Vec<f32>,
}

/// Precomputed chirp tables and convolution kernel for a non-power-of-two
/// size, convolved at length `m = next_pow2(2n - 1)`.
struct BluesteinPlan {
    m: usize,
    /// Forward chirp `exp(-i pi k^2 / n)`, length n
    chirp_re: Vec<f32>,
    chirp_im: Vec<f32>,
    /// FFT_m of the wrapped conjugate-chirp kernel
    kernel_re: Vec<f32>,
    kernel_im: Vec<f32>,
    /// Pooled scratch, one entry per active call
    workspaces: Mutex<Vec<Workspace>>,
}

/// Immutable transform plan for a fixed size.
pub struct FftPlan {
    n: usize,
    /// Bit-reversal permutation (power-of-two sizes only)
    bitrev: Vec<u32>,
    stages: Vec<Stage>,
    bluestein: Option<BluesteinPlan>,
}

static PLANS: Lazy<RwLock<HashMap<usize, Arc<FftPlan>>>> = Lazy::new(|| RwLock::new(HashMap::new()));

/// Fetch (or build) the process-wide plan for size `n`.
pub fn plan_for(n: usize) -> Arc<FftPlan> {
    if let Some(plan) = PLANS.read().get(&n) {
        return Arc::clone(plan);
    }

    // Built outside the lock: a Bluestein build recursively fetches the
    // plan for its convolution length.
    log::debug!("building FFT plan for n={n}");
    let plan = Arc::new(FftPlan::build(n));

    let mut map = PLANS.write();
    Arc::clone(map.entry(n).or_insert(plan))
}

impl FftPlan {
    fn build(n: usize) -> Self {
        if n.is_power_of_two() {
            let levels = n.trailing_zeros();
            let mut bitrev = vec![0u32; n];
            for (i, slot) in bitrev.iter_mut().enumerate() {
                *slot = (i as u32).reverse_bits() >> (32 - levels.max(1));
            }
            if n == 1 {
                bitrev[0] = 0;
            }

            let mut stages = Vec::with_capacity(levels as usize);
            let mut len = 2;
            while len <= n {
                let half = len / 2;
                let mut twiddle_re = Vec::with_capacity(half);
                let mut twiddle_im = Vec::with_capacity(half);
                for j in 0..half {
                    let angle = -2.0 * PI * j as f64 / len as f64;
                    twiddle_re.push(angle.cos() as f32);
                    twiddle_im.push(angle.sin() as f32);
                }
                stages.push(Stage {
                    twiddle_re,
                    twiddle_im,
                });
                len <<= 1;
            }

            Self {
                n,
                bitrev,
                stages,
                bluestein: None,
            }
        } else {
            Self {
                n,
                bitrev: Vec::new(),
                stages: Vec::new(),
                bluestein: Some(BluesteinPlan::build(n)),
            }
        }
    }
}

impl BluesteinPlan {
    fn build(n: usize) -> Self {
        let m = (2 * n - 1).next_power_of_two();

        // k^2 mod 2n keeps the chirp angle small for exact trigonometry
        let modulus = 2 * n as u64;
        let angle_of = |k: usize| -> f64 {
            let k = k as u64;
            let sq = (k * k) % modulus;
            PI * sq as f64 / n as f64
        };

        let mut chirp_re = Vec::with_capacity(n);
        let mut chirp_im = Vec::with_capacity(n);
        for k in 0..n {
            let a = angle_of(k);
            chirp_re.push(a.cos() as f32);
            chirp_im.push((-a.sin()) as f32);
        }

        // Kernel: conjugate chirp at wrapped offsets, then transformed
        let mut kernel_re = vec![0.0f32; m];
        let mut kernel_im = vec![0.0f32; m];
        for k in 0..n {
            let a = angle_of(k);
            let re = a.cos() as f32;
            let im = a.sin() as f32;
            kernel_re[k] = re;
            kernel_im[k] = im;
            if k != 0 {
                kernel_re[m - k] = re;
                kernel_im[m - k] = im;
            }
        }

        let inner = plan_for(m);
        radix2(&inner, &mut kernel_re, &mut kernel_im, false);

        Self {
            m,
            chirp_re,
            chirp_im,
            kernel_re,
            kernel_im,
            workspaces: Mutex::new(Vec::new()),
        }
    }

    fn acquire(&self) -> Workspace {
        self.workspaces.lock().pop().unwrap_or_else(|| Workspace {
            re: vec![0.0; self.m],
            im: vec![0.0; self.m],
        })
    }

    fn release(&self, ws: Workspace) {
        self.workspaces.lock().push(ws);
    }
}

// ============ Transform ============

/// In-place (inverse-)DFT of `real`/`imag`. The inverse applies `1/N`.
pub fn fft(real: &mut [f32], imag: &mut [f32], inverse: bool) -> DspResult<()> {
    if real.len() != imag.len() {
        return Err(DspError::InvalidArgument(format!(
            "fft buffer length mismatch: {} vs {}",
            real.len(),
            imag.len()
        )));
    }
    let n = real.len();
    if n == 0 {
        return Err(DspError::InvalidArgument("fft of empty buffer".into()));
    }
    if n == 1 {
        return Ok(());
    }

    let plan = plan_for(n);
    if plan.bluestein.is_none() {
        radix2(&plan, real, imag, inverse);
    } else if inverse {
        // ifft(x) = conj(fft(conj(x))) / n
        for v in imag.iter_mut() {
            *v = -*v;
        }
        bluestein(&plan, real, imag);
        let scale = 1.0 / n as f32;
        for i in 0..n {
            real[i] *= scale;
            imag[i] = -imag[i] * scale;
        }
    } else {
        bluestein(&plan, real, imag);
    }
    Ok(())
}

fn radix2(plan: &FftPlan, re: &mut [f32], im: &mut [f32], inverse: bool) {
    let n = plan.n;

    for i in 0..n {
        let j = plan.bitrev[i] as usize;
        if j > i {
            re.swap(i, j);
            im.swap(i, j);
        }
    }

    let mut len = 2;
    for stage in &plan.stages {
        let half = len / 2;
        let mut start = 0;
        while start < n {
            for j in 0..half {
                let wr = stage.twiddle_re[j];
                let wi = if inverse {
                    -stage.twiddle_im[j]
                } else {
                    stage.twiddle_im[j]
                };
                let a = start + j;
                let b = a + half;
                let tr = re[b] * wr - im[b] * wi;
                let ti = re[b] * wi + im[b] * wr;
                re[b] = re[a] - tr;
                im[b] = im[a] - ti;
                re[a] += tr;
                im[a] += ti;
            }
            start += len;
        }
        len <<= 1;
    }

    if inverse {
        let scale = 1.0 / n as f32;
        for i in 0..n {
            re[i] *= scale;
            im[i] *= scale;
        }
    }
}

fn bluestein(plan: &FftPlan, re: &mut [f32], im: &mut [f32]) {
    let n = plan.n;
    let bs = plan.bluestein.as_ref().expect("bluestein plan");
    let m = bs.m;
    let inner = plan_for(m);

    let mut ws = bs.acquire();
    ws.re[..m].fill(0.0);
    ws.im[..m].fill(0.0);

    // Chirp-premultiplied input, zero padded to m
    for k in 0..n {
        let cr = bs.chirp_re[k];
        let ci = bs.chirp_im[k];
        ws.re[k] = re[k] * cr - im[k] * ci;
        ws.im[k] = re[k] * ci + im[k] * cr;
    }

    radix2(&inner, &mut ws.re, &mut ws.im, false);

    for k in 0..m {
        let ar = ws.re[k];
        let ai = ws.im[k];
        let br = bs.kernel_re[k];
        let bi = bs.kernel_im[k];
        ws.re[k] = ar * br - ai * bi;
        ws.im[k] = ar * bi + ai * br;
    }

    radix2(&inner, &mut ws.re, &mut ws.im, true);

    for k in 0..n {
        let cr = bs.chirp_re[k];
        let ci = bs.chirp_im[k];
        re[k] = ws.re[k] * cr - ws.im[k] * ci;
        im[k] = ws.re[k] * ci + ws.im[k] * cr;
    }

    bs.release(ws);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lcg(seed: &mut u64) -> f32 {
        *seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((*seed >> 33) as f32 / (1u64 << 31) as f32) - 0.5
    }

    fn naive_dft(re: &[f32], im: &[f32]) -> (Vec<f32>, Vec<f32>) {
        let n = re.len();
        let mut out_re = vec![0.0f32; n];
        let mut out_im = vec![0.0f32; n];
        for k in 0..n {
            let mut acc_re = 0.0f64;
            let mut acc_im = 0.0f64;
            for t in 0..n {
                let angle = -2.0 * PI * (k * t % n) as f64 / n as f64;
                let (s, c) = angle.sin_cos();
                acc_re += re[t] as f64 * c - im[t] as f64 * s;
                acc_im += re[t] as f64 * s + im[t] as f64 * c;
            }
            out_re[k] = acc_re as f32;
            out_im[k] = acc_im as f32;
        }
        (out_re, out_im)
    }

    #[test]
    fn roundtrip_power_of_two_sizes() {
        let mut seed = 7u64;
        let mut n = 2usize;
        while n <= 4096 {
            let orig_re: Vec<f32> = (0..n).map(|_| lcg(&mut seed)).collect();
            let orig_im: Vec<f32> = (0..n).map(|_| lcg(&mut seed)).collect();
            let mut re = orig_re.clone();
            let mut im = orig_im.clone();

            fft(&mut re, &mut im, false).unwrap();
            fft(&mut re, &mut im, true).unwrap();

            for i in 0..n {
                assert!(
                    (re[i] - orig_re[i]).abs() < 1e-4,
                    "n={n} i={i}: {} vs {}",
                    re[i],
                    orig_re[i]
                );
                assert!((im[i] - orig_im[i]).abs() < 1e-4);
            }
            n *= 2;
        }
    }

    #[test]
    fn bluestein_matches_naive_dft() {
        let mut seed = 42u64;
        for &n in &[3usize, 5, 7, 1025, 2047] {
            let re: Vec<f32> = (0..n).map(|_| lcg(&mut seed)).collect();
            let im: Vec<f32> = (0..n).map(|_| lcg(&mut seed)).collect();
            let (want_re, want_im) = naive_dft(&re, &im);

            let mut got_re = re.clone();
            let mut got_im = im.clone();
            fft(&mut got_re, &mut got_im, false).unwrap();

            for k in 0..n {
                assert!(
                    (got_re[k] - want_re[k]).abs() < 1e-3,
                    "n={n} k={k}: {} vs {}",
                    got_re[k],
                    want_re[k]
                );
                assert!((got_im[k] - want_im[k]).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn bluestein_roundtrip() {
        let mut seed = 11u64;
        for &n in &[3usize, 129, 1000] {
            let orig_re: Vec<f32> = (0..n).map(|_| lcg(&mut seed)).collect();
            let orig_im: Vec<f32> = (0..n).map(|_| lcg(&mut seed)).collect();
            let mut re = orig_re.clone();
            let mut im = orig_im.clone();

            fft(&mut re, &mut im, false).unwrap();
            fft(&mut re, &mut im, true).unwrap();

            for i in 0..n {
                assert!((re[i] - orig_re[i]).abs() < 1e-3);
                assert!((im[i] - orig_im[i]).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn size_one_is_noop() {
        let mut re = vec![3.5f32];
        let mut im = vec![-1.25f32];
        fft(&mut re, &mut im, false).unwrap();
        assert_eq!(re[0], 3.5);
        assert_eq!(im[0], -1.25);
    }

    #[test]
    fn mismatched_buffers_rejected() {
        let mut re = vec![0.0f32; 4];
        let mut im = vec![0.0f32; 5];
        assert!(fft(&mut re, &mut im, false).is_err());
    }

    #[test]
    fn dc_component() {
        let mut re = vec![1.0f32; 8];
        let mut im = vec![0.0f32; 8];
        fft(&mut re, &mut im, false).unwrap();
        assert!((re[0] - 8.0).abs() < 1e-5);
        for k in 1..8 {
            assert!(re[k].abs() < 1e-5);
            assert!(im[k].abs() < 1e-5);
        }
    }

    #[test]
    fn plans_are_shared() {
        let a = plan_for(256);
        let b = plan_for(256);
        assert!(Arc::ptr_eq(&a, &b));
    }
}
