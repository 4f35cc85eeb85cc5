//! Pitch-aware mel analyzer
//!
//! Produces a mel spectrogram whose implicit pitch axis is shifted while
//! the spectral envelope stays put: the analysis window and FFT length are
//! scaled by the shift factor, then the bin axis is rescaled back to the
//! nominal bin count before the mel projection. A fractional shift makes
//! the FFT length non-power-of-two, which rides the Bluestein path.

use ms_dsp::stft::{reflect_pad, stft};
use ms_dsp::window::hann;
use ms_dsp::{simd, DspError, DspResult, FloatMatrix};

use crate::filterbank::mel_filter_bank;

/// Mel spectrogram analyzer with key-shift support.
#[derive(Debug, Clone)]
pub struct MelAnalyzer {
    pub sample_rate: u32,
    pub n_fft: usize,
    pub win_size: usize,
    pub hop_size: usize,
    pub num_mels: usize,
    pub f_min: f64,
    pub f_max: f64,
}

impl MelAnalyzer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sample_rate: u32,
        n_fft: usize,
        win_size: usize,
        hop_size: usize,
        num_mels: usize,
        f_min: f64,
        f_max: f64,
    ) -> Self {
        Self {
            sample_rate,
            n_fft,
            win_size,
            hop_size,
            num_mels,
            f_min,
            f_max,
        }
    }

    /// Extract a `num_mels x frames` spectrogram.
    ///
    /// `key_shift` is in semitones (gender flag / 100); `speed` scales the
    /// hop for time-stretched analysis.
    pub fn extract(&self, samples: &[f32], key_shift: f64, speed: f64) -> DspResult<FloatMatrix> {
        if samples.is_empty() {
            return Err(DspError::InvalidArgument("empty input signal".into()));
        }

        let factor = 2f64.powf(key_shift / 12.0);
        let n_fft_new = ((self.n_fft as f64 * factor).round() as usize).max(2);
        let win_new = ((self.win_size as f64 * factor).round() as usize).max(1);
        let hop_new = ((self.hop_size as f64 * speed).round() as usize).max(1);

        let overlap = win_new.saturating_sub(hop_new);
        let padded = reflect_pad(samples, overlap / 2, overlap.div_ceil(2));

        let window = hann(win_new);
        let spec = stft(&padded, n_fft_new, hop_new, win_new, &window, false)?;

        let mut magnitude = vec![0.0f32; spec.re.len()];
        simd::magnitude(&spec.re, &spec.im, &mut magnitude);
        let magnitude = FloatMatrix::from_vec(magnitude, spec.bins, spec.frames)?;

        let target_bins = self.n_fft / 2 + 1;
        let rescaled = if (factor - 1.0).abs() < f64::EPSILON && magnitude.rows() == target_bins {
            magnitude
        } else {
            rescale_bins(&magnitude, target_bins, factor)
        };

        let bank = mel_filter_bank(
            self.num_mels,
            self.n_fft,
            self.sample_rate,
            self.f_min,
            self.f_max,
        );
        bank.matmul(&rescaled)
    }
}

/// Rescale the bin axis to `target_bins` rows: target row `r` reads the
/// source at position `r / factor` with linear interpolation. Targets that
/// land past the last source bin stay zero.
fn rescale_bins(src: &FloatMatrix, target_bins: usize, factor: f64) -> FloatMatrix {
    let mut out = FloatMatrix::zeros(target_bins, src.cols());
    let last = src.rows() as f64 - 1.0;

    for r in 0..target_bins {
        let pos = r as f64 / factor;
        if pos > last {
            continue;
        }
        let i0 = pos.floor() as usize;
        let frac = (pos - i0 as f64) as f32;
        let out_row = out.row_mut(r);
        if frac < 1e-7 || i0 + 1 >= src.rows() {
            out_row.copy_from_slice(src.row(i0));
        } else {
            let lo = src.row(i0);
            let hi = src.row(i0 + 1);
            for (o, (&a, &b)) in out_row.iter_mut().zip(lo.iter().zip(hi)) {
                *o = a + frac * (b - a);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filterbank::mel_edges;

    fn sine(freq: f32, sr: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.4 * (2.0 * std::f32::consts::PI * freq * i as f32 / sr as f32).sin())
            .collect()
    }

    fn analyzer() -> MelAnalyzer {
        MelAnalyzer::new(44100, 2048, 2048, 128, 128, 40.0, 16000.0)
    }

    #[test]
    fn output_shape() {
        let mel = analyzer().extract(&sine(440.0, 44100, 8192), 0.0, 1.0).unwrap();
        assert_eq!(mel.rows(), 128);
        assert!(mel.cols() > 0);
    }

    #[test]
    fn sine_energy_lands_on_the_right_mel() {
        let mel = analyzer().extract(&sine(440.0, 44100, 16384), 0.0, 1.0).unwrap();

        // Average energy per mel channel over all frames
        let mid = mel.cols() / 2;
        let mut best = 0usize;
        let mut best_v = f32::MIN;
        for r in 0..mel.rows() {
            let v = mel.get(r, mid);
            if v > best_v {
                best_v = v;
                best = r;
            }
        }

        let centers = mel_edges(128, 40.0, 16000.0);
        let center_hz = centers[best + 1];
        assert!(
            (center_hz - 440.0).abs() / 440.0 < 0.15,
            "peak mel centered at {center_hz} Hz"
        );
    }

    #[test]
    fn key_shift_moves_the_peak() {
        // A positive shift scales the analysis grid, so the apparent
        // frequency axis stretches and energy lands on higher mels
        let signal = sine(440.0, 44100, 16384);
        let base = analyzer().extract(&signal, 0.0, 1.0).unwrap();
        let shifted = analyzer().extract(&signal, 3.0, 1.0).unwrap();

        let argmax = |m: &FloatMatrix| {
            let mid = m.cols() / 2;
            (0..m.rows())
                .max_by(|&a, &b| m.get(a, mid).partial_cmp(&m.get(b, mid)).unwrap())
                .unwrap()
        };

        assert!(
            argmax(&shifted) > argmax(&base),
            "upward key shift should move energy to higher mels"
        );
    }

    #[test]
    fn speed_changes_frame_count() {
        let signal = sine(440.0, 44100, 32768);
        let normal = analyzer().extract(&signal, 0.0, 1.0).unwrap();
        let fast = analyzer().extract(&signal, 0.0, 2.0).unwrap();
        assert!(fast.cols() < normal.cols());
    }

    #[test]
    fn empty_input_rejected() {
        assert!(analyzer().extract(&[], 0.0, 1.0).is_err());
    }

    #[test]
    fn rescale_identity_when_factor_is_one() {
        let mut src = FloatMatrix::zeros(5, 3);
        for r in 0..5 {
            for c in 0..3 {
                src.set(r, c, (r * 3 + c) as f32);
            }
        }
        let out = rescale_bins(&src, 5, 1.0);
        assert_eq!(out, src);
    }

    #[test]
    fn rescale_zero_fills_out_of_range_rows() {
        let mut src = FloatMatrix::zeros(4, 2);
        for r in 0..4 {
            src.set(r, 0, 1.0);
            src.set(r, 1, 1.0);
        }
        // factor 2: target rows 0..=6 read source 0..=3, rows 7+ stay zero
        let out = rescale_bins(&src, 10, 2.0);
        assert!(out.get(6, 0) > 0.0);
        assert_eq!(out.get(7, 0), 0.0);
        assert_eq!(out.get(9, 1), 0.0);
    }
}
