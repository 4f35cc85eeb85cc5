//! Mono WAV reading and writing
//!
//! Sources are decoded with hound, downmixed to mono by channel average,
//! and linearly resampled to the requested rate. Output is always 16-bit
//! PCM mono with samples clipped to the int16 range.

use std::path::Path;

use crate::error::{FileError, FileResult};

/// Read a WAV file as mono f32 at `target_rate`.
pub fn read_mono<P: AsRef<Path>>(path: P, target_rate: u32) -> FileResult<Vec<f32>> {
    let mut reader = hound::WavReader::open(path.as_ref())?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(FileError::UnsupportedFormat("zero channels".into()));
    }

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .map(|s| s.unwrap_or(0.0))
            .collect(),
        (hound::SampleFormat::Int, bits) if bits <= 32 => {
            let max_value = (1i64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.unwrap_or(0) as f32 / max_value)
                .collect()
        }
        (format, bits) => {
            return Err(FileError::UnsupportedFormat(format!(
                "{format:?} at {bits} bits"
            )))
        }
    };

    let frames = interleaved.len() / channels;
    let mut mono = Vec::with_capacity(frames);
    if channels == 1 {
        mono = interleaved;
    } else {
        for frame in interleaved.chunks_exact(channels) {
            mono.push(frame.iter().sum::<f32>() / channels as f32);
        }
    }

    if spec.sample_rate != target_rate {
        log::debug!(
            "resampling {} Hz -> {} Hz ({} samples)",
            spec.sample_rate,
            target_rate,
            mono.len()
        );
        mono = resample_linear(&mono, spec.sample_rate, target_rate);
    }

    Ok(mono)
}

/// Write mono samples as 16-bit PCM.
pub fn write_mono_16<P: AsRef<Path>>(path: P, samples: &[f32], sample_rate: u32) -> FileResult<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path.as_ref(), spec)?;
    for &sample in samples {
        let v = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        writer.write_sample(v)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Linear resampling between arbitrary rates.
fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if samples.is_empty() || from_rate == to_rate {
        return samples.to_vec();
    }
    let ratio = to_rate as f64 / from_rate as f64;
    let new_len = (samples.len() as f64 * ratio).round() as usize;
    let mut out = Vec::with_capacity(new_len);
    for i in 0..new_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos.floor() as usize;
        let frac = (src_pos - idx as f64) as f32;
        let value = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else if idx < samples.len() {
            samples[idx]
        } else {
            0.0
        };
        out.push(value);
    }
    out
}
