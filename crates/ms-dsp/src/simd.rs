//! Runtime SIMD dispatch
//!
//! Detection happens once; kernels pick the widest available path and fall
//! back to scalar code. Only the handful of f32 loops that dominate the
//! spectrogram path are dispatched here: magnitude, complex multiply, and
//! in-place scaling.

use std::sync::OnceLock;

/// Detected SIMD capability level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SimdLevel {
    /// No SIMD, scalar fallback
    Scalar = 0,
    /// AVX2 + FMA (256-bit, 8 f32s)
    Avx2 = 1,
    /// ARM NEON (128-bit, 4 f32s)
    Neon = 2,
}

impl SimdLevel {
    /// SIMD width in f32 elements
    pub const fn width(self) -> usize {
        match self {
            SimdLevel::Scalar => 1,
            SimdLevel::Neon => 4,
            SimdLevel::Avx2 => 8,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            SimdLevel::Scalar => "Scalar",
            SimdLevel::Avx2 => "AVX2",
            SimdLevel::Neon => "NEON",
        }
    }
}

static DETECTED_SIMD_LEVEL: OnceLock<SimdLevel> = OnceLock::new();

/// Detect the best available SIMD level (cached after first call).
pub fn simd_level() -> SimdLevel {
    *DETECTED_SIMD_LEVEL.get_or_init(|| {
        #[cfg(target_arch = "x86_64")]
        {
            if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
                return SimdLevel::Avx2;
            }
            SimdLevel::Scalar
        }

        #[cfg(target_arch = "aarch64")]
        {
            // NEON is baseline on aarch64
            SimdLevel::Neon
        }

        #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
        {
            SimdLevel::Scalar
        }
    })
}

// ============ Magnitude ============

/// `out[i] = sqrt(re[i]^2 + im[i]^2)`
pub fn magnitude(re: &[f32], im: &[f32], out: &mut [f32]) {
    debug_assert_eq!(re.len(), im.len());
    debug_assert_eq!(re.len(), out.len());

    #[cfg(target_arch = "x86_64")]
    if simd_level() == SimdLevel::Avx2 {
        // Safety: AVX2 presence verified by the dispatch level
        unsafe { magnitude_avx2(re, im, out) };
        return;
    }

    magnitude_scalar(re, im, out);
}

fn magnitude_scalar(re: &[f32], im: &[f32], out: &mut [f32]) {
    for i in 0..out.len() {
        out[i] = (re[i] * re[i] + im[i] * im[i]).sqrt();
    }
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2", enable = "fma")]
unsafe fn magnitude_avx2(re: &[f32], im: &[f32], out: &mut [f32]) {
    use std::arch::x86_64::*;

    let n = out.len();
    let chunks = n / 8;
    for c in 0..chunks {
        let i = c * 8;
        let r = _mm256_loadu_ps(re.as_ptr().add(i));
        let m = _mm256_loadu_ps(im.as_ptr().add(i));
        let sq = _mm256_fmadd_ps(r, r, _mm256_mul_ps(m, m));
        _mm256_storeu_ps(out.as_mut_ptr().add(i), _mm256_sqrt_ps(sq));
    }
    for i in chunks * 8..n {
        out[i] = (re[i] * re[i] + im[i] * im[i]).sqrt();
    }
}

// ============ Complex multiply ============

/// In-place complex multiply: `(a_re + j a_im) *= (b_re + j b_im)`
pub fn complex_mul_in_place(a_re: &mut [f32], a_im: &mut [f32], b_re: &[f32], b_im: &[f32]) {
    debug_assert_eq!(a_re.len(), a_im.len());
    debug_assert_eq!(a_re.len(), b_re.len());
    debug_assert_eq!(a_re.len(), b_im.len());

    #[cfg(target_arch = "x86_64")]
    if simd_level() == SimdLevel::Avx2 {
        // Safety: AVX2 presence verified by the dispatch level
        unsafe { complex_mul_avx2(a_re, a_im, b_re, b_im) };
        return;
    }

    complex_mul_scalar(a_re, a_im, b_re, b_im);
}

fn complex_mul_scalar(a_re: &mut [f32], a_im: &mut [f32], b_re: &[f32], b_im: &[f32]) {
    for i in 0..a_re.len() {
        let re = a_re[i] * b_re[i] - a_im[i] * b_im[i];
        let im = a_re[i] * b_im[i] + a_im[i] * b_re[i];
        a_re[i] = re;
        a_im[i] = im;
    }
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2", enable = "fma")]
unsafe fn complex_mul_avx2(a_re: &mut [f32], a_im: &mut [f32], b_re: &[f32], b_im: &[f32]) {
    use std::arch::x86_64::*;

    let n = a_re.len();
    let chunks = n / 8;
    for c in 0..chunks {
        let i = c * 8;
        let ar = _mm256_loadu_ps(a_re.as_ptr().add(i));
        let ai = _mm256_loadu_ps(a_im.as_ptr().add(i));
        let br = _mm256_loadu_ps(b_re.as_ptr().add(i));
        let bi = _mm256_loadu_ps(b_im.as_ptr().add(i));
        let re = _mm256_fmsub_ps(ar, br, _mm256_mul_ps(ai, bi));
        let im = _mm256_fmadd_ps(ar, bi, _mm256_mul_ps(ai, br));
        _mm256_storeu_ps(a_re.as_mut_ptr().add(i), re);
        _mm256_storeu_ps(a_im.as_mut_ptr().add(i), im);
    }
    for i in chunks * 8..n {
        let re = a_re[i] * b_re[i] - a_im[i] * b_im[i];
        let im = a_re[i] * b_im[i] + a_im[i] * b_re[i];
        a_re[i] = re;
        a_im[i] = im;
    }
}

// ============ Scale ============

/// `buf[i] *= k`
pub fn scale_in_place(buf: &mut [f32], k: f32) {
    // Tight enough for the autovectorizer on every target
    for v in buf.iter_mut() {
        *v *= k;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magnitude_matches_scalar() {
        let re: Vec<f32> = (0..37).map(|i| (i as f32 * 0.3).sin()).collect();
        let im: Vec<f32> = (0..37).map(|i| (i as f32 * 0.7).cos()).collect();
        let mut out = vec![0.0f32; 37];
        let mut expect = vec![0.0f32; 37];
        magnitude(&re, &im, &mut out);
        magnitude_scalar(&re, &im, &mut expect);
        for i in 0..37 {
            assert!((out[i] - expect[i]).abs() < 1e-6);
        }
    }

    #[test]
    fn complex_mul_matches_scalar() {
        let n = 41;
        let mut ar: Vec<f32> = (0..n).map(|i| (i as f32 * 0.11).sin()).collect();
        let mut ai: Vec<f32> = (0..n).map(|i| (i as f32 * 0.23).cos()).collect();
        let br: Vec<f32> = (0..n).map(|i| (i as f32 * 0.31).sin()).collect();
        let bi: Vec<f32> = (0..n).map(|i| (i as f32 * 0.43).cos()).collect();

        let mut er = ar.clone();
        let mut ei = ai.clone();
        complex_mul_scalar(&mut er, &mut ei, &br, &bi);
        complex_mul_in_place(&mut ar, &mut ai, &br, &bi);

        for i in 0..n {
            assert!((ar[i] - er[i]).abs() < 1e-5);
            assert!((ai[i] - ei[i]).abs() < 1e-5);
        }
    }

    #[test]
    fn detection_is_stable() {
        assert_eq!(simd_level(), simd_level());
        assert!(simd_level().width() >= 1);
    }
}
