//! DSP integration tests
//!
//! Complete signal flow across the transform stack:
//! - FFT correctness through the public entry point for mixed sizes
//! - STFT analysis/resynthesis at several hop/window geometries
//! - Magnitude + matrix projection consistency
//! - Signal integrity (no NaN/Inf) through the post chain
//! - Plan sharing under concurrent use

use ms_dsp::effects;
use ms_dsp::fft::fft;
use ms_dsp::interp::{lerp_many, AkimaSpline};
use ms_dsp::simd;
use ms_dsp::stft::{istft, stft};
use ms_dsp::window::hann;
use ms_dsp::FloatMatrix;

const SAMPLE_RATE: f64 = 44100.0;

fn generate_sine(samples: usize, freq: f64) -> Vec<f32> {
    (0..samples)
        .map(|i| {
            let t = i as f64 / SAMPLE_RATE;
            (2.0 * std::f64::consts::PI * freq * t).sin() as f32
        })
        .collect()
}

fn generate_noise(samples: usize) -> Vec<f32> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    (0..samples)
        .map(|i| {
            let mut hasher = DefaultHasher::new();
            i.hash(&mut hasher);
            let h = hasher.finish();
            ((h as f64 / u64::MAX as f64) * 2.0 - 1.0) as f32
        })
        .collect()
}

fn is_valid_signal(signal: &[f32]) -> bool {
    signal.iter().all(|&x| x.is_finite())
}

// ============ Transform stack ============

#[test]
fn test_fft_energy_conservation() {
    // Parseval: sum |x|^2 == sum |X|^2 / N
    for &n in &[256usize, 1024, 1000, 777] {
        let signal = generate_noise(n);
        let time_energy: f64 = signal.iter().map(|&v| (v as f64).powi(2)).sum();

        let mut re = signal.clone();
        let mut im = vec![0.0f32; n];
        fft(&mut re, &mut im, false).unwrap();

        let freq_energy: f64 = re
            .iter()
            .zip(&im)
            .map(|(&r, &i)| (r as f64).powi(2) + (i as f64).powi(2))
            .sum::<f64>()
            / n as f64;

        let rel = (time_energy - freq_energy).abs() / time_energy;
        assert!(rel < 1e-3, "n={n}: energy drift {rel}");
    }
}

#[test]
fn test_stft_istft_multiple_geometries() {
    let signal = generate_sine(16384, 523.25);

    for &(n_fft, hop) in &[(512usize, 128usize), (1024, 256), (2048, 512)] {
        let window = hann(n_fft);
        let spec = stft(&signal, n_fft, hop, n_fft, &window, true).unwrap();
        let rebuilt = istft(
            &spec.re,
            &spec.im,
            spec.bins,
            spec.frames,
            n_fft,
            hop,
            n_fft,
            &window,
            true,
            signal.len(),
        )
        .unwrap();

        assert_eq!(rebuilt.len(), signal.len());
        assert!(is_valid_signal(&rebuilt));

        let lo = n_fft;
        let hi = signal.len() - n_fft;
        let mut err = 0.0f64;
        for i in lo..hi {
            let d = (rebuilt[i] - signal[i]) as f64;
            err += d * d;
        }
        let rms = (err / (hi - lo) as f64).sqrt();
        assert!(rms < 1e-3, "n_fft={n_fft} hop={hop}: rms {rms}");
    }
}

#[test]
fn test_spectral_peak_lands_on_the_right_bin() {
    let n_fft = 2048;
    let freq = 1000.0;
    let signal = generate_sine(8192, freq);
    let window = hann(n_fft);

    let spec = stft(&signal, n_fft, 512, n_fft, &window, true).unwrap();

    let mut magnitude = vec![0.0f32; spec.re.len()];
    simd::magnitude(&spec.re, &spec.im, &mut magnitude);
    let mag = FloatMatrix::from_vec(magnitude, spec.bins, spec.frames).unwrap();

    let mid = mag.cols() / 2;
    let peak_bin = (0..mag.rows())
        .max_by(|&a, &b| mag.get(a, mid).partial_cmp(&mag.get(b, mid)).unwrap())
        .unwrap();

    let bin_hz = SAMPLE_RATE / n_fft as f64;
    let peak_hz = peak_bin as f64 * bin_hz;
    assert!(
        (peak_hz - freq).abs() <= bin_hz,
        "peak at {peak_hz} Hz, wanted {freq}"
    );
}

#[test]
fn test_projection_matches_per_bin_sum() {
    // A one-hot projection row must pick out exactly its source bin
    let bins = 64;
    let frames = 10;
    let mut mag = FloatMatrix::zeros(bins, frames);
    for b in 0..bins {
        for f in 0..frames {
            mag.set(b, f, (b * frames + f) as f32);
        }
    }

    let mut projection = FloatMatrix::zeros(3, bins);
    projection.set(0, 5, 1.0);
    projection.set(1, 20, 0.5);
    projection.set(2, 63, 2.0);

    let out = projection.matmul(&mag).unwrap();
    for f in 0..frames {
        assert_eq!(out.get(0, f), mag.get(5, f));
        assert_eq!(out.get(1, f), 0.5 * mag.get(20, f));
        assert_eq!(out.get(2, f), 2.0 * mag.get(63, f));
    }
}

// ============ Curve resampling ============

#[test]
fn test_akima_and_linear_agree_on_straight_lines() {
    let xs: Vec<f64> = (0..20).map(|i| i as f64 * 0.1).collect();
    let ys_f64: Vec<f64> = xs.iter().map(|&x| 3.0 * x - 1.0).collect();
    let ys_f32: Vec<f32> = ys_f64.iter().map(|&v| v as f32).collect();

    let spline = AkimaSpline::new(xs.clone(), ys_f64).unwrap();
    let targets: Vec<f64> = (0..37).map(|i| i as f64 * 0.05).collect();

    let cubic = spline.eval_many(&targets);
    let linear = lerp_many(&xs, &ys_f32, &targets);

    for (i, (&c, &l)) in cubic.iter().zip(&linear).enumerate() {
        assert!(
            (c as f32 - l).abs() < 1e-4,
            "target {i}: akima {c} vs linear {l}"
        );
    }
}

// ============ Post chain integrity ============

#[test]
fn test_post_chain_signal_integrity() {
    let mut signal = generate_sine(44100, 440.0);
    for v in signal.iter_mut() {
        *v *= 1.3;
    }

    effects::growl(&mut signal, 60, 44100);
    effects::loudness_normalize(&mut signal, 80);
    effects::peak_limit(&mut signal, 0.9);

    assert!(is_valid_signal(&signal));
    assert!(effects::peak(&signal) <= 0.9 + 1e-6);
}

#[test]
fn test_post_chain_on_noise_bursts() {
    let mut signal = generate_noise(22050);
    // A hard click on top of noise
    signal[5000] = 4.0;

    effects::loudness_normalize(&mut signal, 100);
    effects::peak_limit(&mut signal, 0.9);

    assert!(is_valid_signal(&signal));
    assert!(effects::peak(&signal) <= 0.9 + 1e-6);
}

// ============ Concurrency ============

#[test]
fn test_fft_plans_shared_across_threads() {
    let handles: Vec<_> = (0..4)
        .map(|t| {
            std::thread::spawn(move || {
                let n = 1024;
                let signal = generate_sine(n, 220.0 * (t + 1) as f64);
                let mut re = signal.clone();
                let mut im = vec![0.0f32; n];
                fft(&mut re, &mut im, false).unwrap();
                fft(&mut re, &mut im, true).unwrap();
                for i in 0..n {
                    assert!((re[i] - signal[i]).abs() < 1e-4);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_bluestein_workspaces_under_contention() {
    let handles: Vec<_> = (0..4)
        .map(|_| {
            std::thread::spawn(|| {
                let n = 1000;
                let signal = generate_noise(n);
                let mut re = signal.clone();
                let mut im = vec![0.0f32; n];
                fft(&mut re, &mut im, false).unwrap();
                fft(&mut re, &mut im, true).unwrap();
                for i in 0..n {
                    assert!((re[i] - signal[i]).abs() < 1e-3);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}
