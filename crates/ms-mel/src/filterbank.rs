//! Slaney mel filter bank
//!
//! Area-normalized triangular filters on the Slaney mel scale, built once
//! per parameter set and shared process-wide. Rows are mel channels,
//! columns are FFT bins.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use ms_dsp::FloatMatrix;

/// Slaney log segment: `ln(6.4) / 27`.
const LOG_STEP: f64 = 0.068_751_777_420_949_12;

/// Linear segment slope breakpoint.
const MIN_LOG_HZ: f64 = 1000.0;

/// Mel value at the breakpoint.
const MIN_LOG_MEL: f64 = 15.0;

/// Hz per mel below the breakpoint: `200 / 3`.
const LINEAR_HZ_PER_MEL: f64 = 200.0 / 3.0;

/// Hz to Slaney mel.
pub fn hz_to_mel(hz: f64) -> f64 {
    if hz < MIN_LOG_HZ {
        hz / LINEAR_HZ_PER_MEL
    } else {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / LOG_STEP
    }
}

/// Slaney mel to Hz.
pub fn mel_to_hz(mel: f64) -> f64 {
    if mel < MIN_LOG_MEL {
        mel * LINEAR_HZ_PER_MEL
    } else {
        MIN_LOG_HZ * (LOG_STEP * (mel - MIN_LOG_MEL)).exp()
    }
}

/// Triangle edge frequencies for `n_mels` filters between `f_min` and
/// `f_max`: `n_mels + 2` points evenly spaced on the mel axis.
pub fn mel_edges(n_mels: usize, f_min: f64, f_max: f64) -> Vec<f64> {
    let lo = hz_to_mel(f_min);
    let hi = hz_to_mel(f_max);
    (0..n_mels + 2)
        .map(|i| mel_to_hz(lo + (hi - lo) * i as f64 / (n_mels + 1) as f64))
        .collect()
}

#[derive(Hash, PartialEq, Eq, Clone, Copy)]
struct BankKey {
    n_mels: usize,
    n_fft: usize,
    sample_rate: u32,
    f_min_bits: u64,
    f_max_bits: u64,
}

static BANKS: Lazy<RwLock<HashMap<BankKey, Arc<FloatMatrix>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Build (or fetch) the `n_mels x (n_fft / 2 + 1)` filter bank.
///
/// `f_min` is clamped to `[0, sr/2]` and `f_max` to `[f_min + 1, sr/2]`.
pub fn mel_filter_bank(
    n_mels: usize,
    n_fft: usize,
    sample_rate: u32,
    f_min: f64,
    f_max: f64,
) -> Arc<FloatMatrix> {
    let nyquist = sample_rate as f64 / 2.0;
    let f_min = f_min.clamp(0.0, nyquist);
    let f_max = f_max.clamp(f_min + 1.0, nyquist);

    let key = BankKey {
        n_mels,
        n_fft,
        sample_rate,
        f_min_bits: f_min.to_bits(),
        f_max_bits: f_max.to_bits(),
    };

    if let Some(bank) = BANKS.read().get(&key) {
        return Arc::clone(bank);
    }

    log::debug!("building mel filter bank: {n_mels} mels, n_fft={n_fft}, {f_min:.0}-{f_max:.0} Hz");
    let bank = Arc::new(build(n_mels, n_fft, sample_rate, f_min, f_max));

    let mut map = BANKS.write();
    Arc::clone(map.entry(key).or_insert(bank))
}

fn build(n_mels: usize, n_fft: usize, sample_rate: u32, f_min: f64, f_max: f64) -> FloatMatrix {
    let bins = n_fft / 2 + 1;
    let edges = mel_edges(n_mels, f_min, f_max);
    let hz_per_bin = sample_rate as f64 / n_fft as f64;

    let mut bank = FloatMatrix::zeros(n_mels, bins);
    for m in 0..n_mels {
        let lower = edges[m];
        let center = edges[m + 1];
        let upper = edges[m + 2];
        let norm = 2.0 / (upper - lower);

        let row = bank.row_mut(m);
        for (bin, w) in row.iter_mut().enumerate() {
            let hz = bin as f64 * hz_per_bin;
            let tri = if hz >= lower && hz <= center {
                (hz - lower) / (center - lower)
            } else if hz > center && hz <= upper {
                (upper - hz) / (upper - center)
            } else {
                0.0
            };
            *w = (norm * tri).max(0.0) as f32;
        }
    }
    bank
}
