//! Post-effect DSP
//!
//! The render tail: pitch-linked amplitude modulation, growl, RMS loudness
//! normalization, and peak limiting, plus the tension pre-emphasis applied
//! to the voiced stream during feature extraction.

use std::f64::consts::PI;

use crate::interp::lerp_many;
use crate::simd;

/// RMS target for loudness normalization, about -16 dB.
pub const LOUDNESS_TARGET_RMS: f32 = 0.158_489_32;

/// Post-normalization peak ceiling, about -1 dB.
pub const LOUDNESS_PEAK_CEILING: f32 = 0.891_250_9;

/// Growl band modulation depth at full strength.
const GROWL_DEPTH: f64 = 0.15;

/// Growl highpass corner in Hz.
const GROWL_CORNER_HZ: f64 = 400.0;

/// Growl LFO rate in Hz.
const GROWL_LFO_HZ: f64 = 80.0;

/// Largest absolute sample value.
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, &v| acc.max(v.abs()))
}

/// Root-mean-square level.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&v| (v as f64) * (v as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// Pitch-linked amplitude modulation (the `A` flag).
///
/// Gain per mel frame follows the symmetric derivative of the MIDI-space
/// pitch; rising pitch pushes gain up, falling pitch pulls it down. The
/// per-frame gains are linearly interpolated onto the sample span
/// `[new_start, new_end]` and multiplied in.
pub fn amplitude_from_pitch(
    samples: &mut [f32],
    midi: &[f64],
    frame_times: &[f64],
    new_start: f64,
    new_end: f64,
    depth: i32,
) {
    let n = midi.len();
    if n < 2 || frame_times.len() != n || samples.is_empty() {
        return;
    }
    let depth = depth.clamp(-100, 100) as f64;
    if depth == 0.0 {
        return;
    }

    let mut derivative = vec![0.0f64; n];
    derivative[0] = (midi[1] - midi[0]) / (frame_times[1] - frame_times[0]);
    for i in 1..n - 1 {
        let dt = frame_times[i + 1] - frame_times[i - 1];
        if dt.abs() > 1e-12 {
            derivative[i] = (midi[i + 1] - midi[i - 1]) / dt;
        }
    }
    derivative[n - 1] = (midi[n - 1] - midi[n - 2]) / (frame_times[n - 1] - frame_times[n - 2]);

    let gains: Vec<f32> = derivative
        .iter()
        .map(|&d| 5.0f64.powf(1e-4 * depth * d) as f32)
        .collect();

    let span = new_end - new_start;
    let count = samples.len();
    let times: Vec<f64> = (0..count)
        .map(|i| new_start + span * i as f64 / count as f64)
        .collect();
    let per_sample = lerp_many(frame_times, &gains, &times);

    for (sample, gain) in samples.iter_mut().zip(&per_sample) {
        *sample *= gain;
    }
}

/// Growl (the `HG` flag): a square LFO modulating the highpassed band.
///
/// The low band passes through untouched; only content above the corner
/// gets the 80 Hz tremolo, which reads as a rough subharmonic.
pub fn growl(samples: &mut [f32], strength: i32, sample_rate: u32) {
    let strength = strength.clamp(0, 100);
    if strength == 0 || samples.is_empty() {
        return;
    }

    let dt = 1.0 / sample_rate as f64;
    let rc = 1.0 / (2.0 * PI * GROWL_CORNER_HZ);
    let alpha = rc / (rc + dt);
    let depth = GROWL_DEPTH * strength as f64 / 100.0;

    let mut hp = 0.0f64;
    let mut prev_in = samples[0] as f64;
    for (i, sample) in samples.iter_mut().enumerate() {
        let x = *sample as f64;
        hp = alpha * (hp + x - prev_in);
        prev_in = x;

        let t = i as f64 * dt;
        let lfo = (2.0 * PI * GROWL_LFO_HZ * t).sin().signum();
        let band = hp * (1.0 + depth * lfo);
        *sample = ((x - hp) + band) as f32;
    }
}

/// RMS loudness normalization (the `P` flag).
///
/// Blends between unity and full normalization toward the target RMS,
/// then enforces the post-normalization peak ceiling.
pub fn loudness_normalize(samples: &mut [f32], blend: i32) {
    let blend = blend.clamp(0, 100);
    if blend == 0 || samples.is_empty() {
        return;
    }

    let level = rms(samples);
    if level < 1e-8 {
        return;
    }

    let gain = 1.0 + (LOUDNESS_TARGET_RMS / level - 1.0) * blend as f32 / 100.0;
    simd::scale_in_place(samples, gain);

    let new_peak = peak(samples);
    if new_peak > LOUDNESS_PEAK_CEILING {
        simd::scale_in_place(samples, LOUDNESS_PEAK_CEILING / new_peak);
    }
}

/// Hard peak limit: rescale so no sample exceeds `limit`.
pub fn peak_limit(samples: &mut [f32], limit: f32) {
    let p = peak(samples);
    if p > limit && p > 1e-8 {
        simd::scale_in_place(samples, limit / p);
    }
}

/// Tension pre-emphasis on the voiced stream (the `Ht` flag).
///
/// One-pole approximation of a spectral tilt:
/// `out[i] = v[i] + blend * (v[i] - 0.95 * v[i-1])` with
/// `blend = clamp(tension_scale / 2, -1, 1)`.
pub fn pre_emphasis_tension(voiced: &mut [f32], tension_scale: f32) {
    if voiced.is_empty() {
        return;
    }
    let blend = (tension_scale / 2.0).clamp(-1.0, 1.0);
    let mut prev = voiced[0];
    for v in voiced.iter_mut().skip(1) {
        let current = *v;
        *v = current + blend * (current - 0.95 * prev);
        prev = current;
    }
}
