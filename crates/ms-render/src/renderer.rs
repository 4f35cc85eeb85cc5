//! Render orchestrator
//!
//! Drives one request end to end: feature extraction (cached), the
//! non-uniform time-stretch schedule over mel frames, the Akima pitch
//! curve, vocoder synthesis, and the post-effect chain. All time axis
//! arithmetic is in seconds, f64; sample data stays f32.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use ms_core::{midi_to_hz, CancelToken, Flags, RenderRequest, SamplerConfig};
use ms_dsp::effects;
use ms_dsp::interp::lerp_many;
use ms_dsp::{AkimaSpline, FloatMatrix};
use ms_file::feature_cache::should_bypass;
use ms_file::{wav, FeatureCache};
use ms_mel::MelAnalyzer;
use ms_ml::SynthesisBackend;

use crate::error::{RenderError, RenderResult};
use crate::stats::RenderStats;

/// Floor applied before the log compression of mel magnitudes.
const MEL_EPS: f32 = 1e-5;

/// Input peak above which features are pre-scaled to 0.5.
const PRESCALE_PEAK: f32 = 0.5;

/// The render pipeline, shared across worker permits.
pub struct Renderer {
    config: SamplerConfig,
    backend: Arc<dyn SynthesisBackend>,
    cache: FeatureCache,
    analyzer: MelAnalyzer,
}

impl Renderer {
    pub fn new(config: SamplerConfig, backend: Arc<dyn SynthesisBackend>) -> Self {
        let cache = match &config.cache_path {
            Some(dir) => FeatureCache::in_directory(dir.clone()),
            None => FeatureCache::beside_source(),
        };
        let analyzer = MelAnalyzer::new(
            config.sample_rate,
            config.n_fft,
            config.win_size,
            config.origin_hop_size,
            config.num_mels,
            config.mel_f_min,
            config.mel_f_max,
        );
        Self {
            config,
            backend,
            cache,
            analyzer,
        }
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Render one request to its output path.
    pub fn render(&self, req: &RenderRequest, cancel: &CancelToken) -> RenderResult<RenderStats> {
        let total_start = Instant::now();
        let mut stats = RenderStats::default();

        let mut flags = req.flags;
        flags.clamp();

        if !req.input_path.exists() {
            return Err(RenderError::NotFound(req.input_path.clone()));
        }

        checkpoint(cancel)?;

        let feature_start = Instant::now();
        let (mel_origin, scale) = self.features(&req.input_path, &flags, cancel, &mut stats)?;
        stats.feature_ms = feature_start.elapsed().as_secs_f64() * 1000.0;

        if is_null_output(&req.output_path) {
            log::debug!("null output path, feature extraction only");
            stats.total_ms = total_start.elapsed().as_secs_f64() * 1000.0;
            return Ok(stats);
        }

        checkpoint(cancel)?;
        let synth_start = Instant::now();

        let sr = self.config.sample_rate as f64;
        let thop_origin = self.config.origin_hop_size as f64 / sr;
        let thop = self.config.hop_size as f64 / sr;

        let n_frames = mel_origin.cols();
        if n_frames == 0 {
            return Err(RenderError::InvalidArgument("empty mel spectrogram".into()));
        }
        let t_area_origin: Vec<f64> = (0..n_frames)
            .map(|i| i as f64 * thop_origin + thop_origin / 2.0)
            .collect();
        let total_time = t_area_origin[n_frames - 1] + thop_origin / 2.0;

        let vel = 2f64.powf(1.0 - req.velocity / 100.0);
        let start = req.offset_ms / 1000.0;
        let cutoff_sec = req.cutoff_ms / 1000.0;
        let end = if req.cutoff_ms < 0.0 {
            start - cutoff_sec
        } else {
            total_time - cutoff_sec
        };
        let con = start + req.consonant_ms / 1000.0;
        let length_req = req.length_ms / 1000.0;
        let mut stretch_length = end - con;

        // Loop mode: reflect-extend the [con, end] window far enough to
        // cover the requested length, keeping the consonant prefix as is.
        let loop_mode = self.config.loop_mode || flags.loop_mel;
        let (mel_work, t_area, total_time) = if loop_mode {
            let left = (((con + thop_origin / 2.0) / thop_origin) as usize).min(n_frames);
            let right = (((end + thop_origin / 2.0) / thop_origin) as usize).clamp(left, n_frames);
            if right == left {
                log::warn!("loop window is empty, falling back to plain stretch");
                (mel_origin, t_area_origin, total_time)
            } else {
                let pad = (length_req / thop_origin) as usize + 1;
                let looped = loop_extend(&mel_origin, left, right, pad);
                stretch_length = pad as f64 * thop_origin;

                let cols = looped.cols();
                let t_area: Vec<f64> = (0..cols)
                    .map(|i| i as f64 * thop_origin + thop_origin / 2.0)
                    .collect();
                let total = t_area[cols - 1] + thop_origin / 2.0;
                (looped, t_area, total)
            }
        } else {
            (mel_origin, t_area_origin, total_time)
        };

        let scaling_ratio = if stretch_length < length_req && stretch_length > 1e-8 {
            length_req / stretch_length
        } else {
            1.0
        };

        let raw_frames = (con * vel + (total_time - con) * scaling_ratio) / thop;
        let stretched_n_frames = if raw_frames.is_finite() && raw_frames > 0.0 {
            raw_frames.floor() as usize + 1
        } else {
            1
        };

        let fill = self.config.fill as f64;
        let start_left = ((start * vel + thop / 2.0) / thop).floor();
        let cut_left_frames = (start_left - fill).max(0.0);
        let end_right =
            stretched_n_frames as f64 - ((length_req + con * vel + thop / 2.0) / thop).floor();
        let cut_right_frames = (end_right - fill).max(0.0);

        let keep_end = stretched_n_frames.saturating_sub(cut_right_frames as usize);
        let cut_left = (cut_left_frames as usize).min(keep_end);
        if cut_left >= keep_end {
            return Err(RenderError::InvalidArgument(
                "no frames left to render after trimming".into(),
            ));
        }

        // Warp each kept frame time back to source time
        let t_last = t_area[t_area.len() - 1];
        let warped: Vec<f64> = (cut_left..keep_end)
            .map(|i| {
                let t = i as f64 * thop + thop / 2.0;
                let src = if t < vel * con {
                    t / vel
                } else {
                    con + (t - vel * con) / scaling_ratio
                };
                src.clamp(0.0, t_last)
            })
            .collect();

        checkpoint(cancel)?;

        // Per-row linear resample of the mel matrix onto the warped axis
        let render_frames = warped.len();
        let mut mel_render = FloatMatrix::zeros(mel_work.rows(), render_frames);
        for r in 0..mel_work.rows() {
            let resampled = lerp_many(&t_area, mel_work.row(r), &warped);
            mel_render.row_mut(r).copy_from_slice(&resampled);
        }

        // Pitch curve: bend knots at sequencer ticks, Akima onto frame times
        let start_sec = start * vel - cut_left_frames * thop;
        let end_sec = length_req + con * vel - cut_left_frames * thop;
        let tempo = if req.tempo_bpm > 0.0 { req.tempo_bpm } else { 120.0 };
        let base_midi = req.pitch_midi as f64 + flags.t as f64 / 100.0;

        let frame_times: Vec<f64> = (0..render_frames).map(|k| k as f64 * thop).collect();
        let bend = &req.pitch_bend_cents;
        let midi_curve: Vec<f64> = if bend.len() >= 2 {
            let knots_x: Vec<f64> = (0..bend.len())
                .map(|i| 60.0 * i as f64 / (tempo * 96.0) + start_sec)
                .collect();
            let knots_y: Vec<f64> = bend.iter().map(|&c| base_midi + c / 100.0).collect();
            AkimaSpline::new(knots_x, knots_y)?.eval_many(&frame_times)
        } else {
            let v = base_midi + bend.first().copied().unwrap_or(0.0) / 100.0;
            vec![v; render_frames]
        };
        let f0: Vec<f32> = midi_curve.iter().map(|&m| midi_to_hz(m) as f32).collect();

        checkpoint(cancel)?;

        let wav_con = self.backend.spec_to_wav(&mel_render, &f0)?;
        stats.synthesis_ms = synth_start.elapsed().as_secs_f64() * 1000.0;

        checkpoint(cancel)?;
        let post_start = Instant::now();

        let cut_start = ((start_sec * sr).floor().max(0.0) as usize).min(wav_con.len());
        let cut_end = ((end_sec * sr).floor().max(0.0) as usize).min(wav_con.len());
        let mut render = wav_con[cut_start..cut_start.max(cut_end)].to_vec();

        if flags.a != 0 {
            effects::amplitude_from_pitch(
                &mut render,
                &midi_curve,
                &frame_times,
                start_sec,
                end_sec,
                flags.a,
            );
        }

        if scale != 1.0 && scale > 0.0 {
            ms_dsp::simd::scale_in_place(&mut render, 1.0 / scale);
        }

        if flags.hg > 0 {
            effects::growl(&mut render, flags.hg, self.config.sample_rate);
        }

        if self.config.wave_norm && flags.p > 0 {
            effects::loudness_normalize(&mut render, flags.p);
        }

        effects::peak_limit(&mut render, self.config.peak_limit);

        let volume = (req.volume_pct / 100.0) as f32;
        if (volume - 1.0).abs() > 1e-6 {
            ms_dsp::simd::scale_in_place(&mut render, volume);
        }

        stats.output_samples = render.len();
        wav::write_mono_16(&req.output_path, &render, self.config.sample_rate)?;

        stats.post_ms = post_start.elapsed().as_secs_f64() * 1000.0;
        stats.total_ms = total_start.elapsed().as_secs_f64() * 1000.0;
        stats.log();
        Ok(stats)
    }

    /// Load or compute the log-mel features and their pre-scale factor.
    fn features(
        &self,
        source: &Path,
        flags: &Flags,
        cancel: &CancelToken,
        stats: &mut RenderStats,
    ) -> RenderResult<(FloatMatrix, f32)> {
        let signature = flags.signature();

        if !should_bypass(flags.force_regen) {
            if let Some((mel, scale)) = self.cache.load_mel(source, &signature) {
                log::debug!("mel cache hit for {} [{signature}]", source.display());
                stats.cache_hit = true;
                return Ok((mel, scale));
            }
        }

        let mut wave = wav::read_mono(source, self.config.sample_rate)?;
        if wave.is_empty() {
            return Err(RenderError::InvalidArgument("input audio is empty".into()));
        }
        stats.input_samples = wave.len();

        checkpoint(cancel)?;

        if flags.needs_separation() {
            if self.backend.has_separator() {
                let separated = match self.cache.load_separated(source, wave.len()) {
                    Some(cached) => cached,
                    None => {
                        let separated = self.backend.separate_harmonic(&wave);
                        if let Err(e) = self.cache.save_separated(source, &separated) {
                            log::warn!("failed to save separator cache: {e}");
                        }
                        separated
                    }
                };
                wave = mix_separated(&wave, &separated, flags);
            } else {
                log::warn!("flags request harmonic separation but no separator model is loaded");
            }
        }

        checkpoint(cancel)?;

        let peak = effects::peak(&wave);
        let scale = if peak >= PRESCALE_PEAK {
            let s = PRESCALE_PEAK / peak;
            ms_dsp::simd::scale_in_place(&mut wave, s);
            s
        } else {
            1.0
        };

        let key_shift = flags.g as f64 / 100.0;
        let mut mel = self.analyzer.extract(&wave, key_shift, 1.0)?;
        mel.map_in_place(|v| v.max(MEL_EPS).ln());

        checkpoint(cancel)?;

        if let Err(e) = self.cache.save_mel(source, &signature, &mel, scale) {
            log::warn!("failed to save mel cache: {e}");
        }

        Ok((mel, scale))
    }
}

/// Mix harmonic and breath components per the Hb/Hv/Ht flags.
fn mix_separated(original: &[f32], separated: &[f32], flags: &Flags) -> Vec<f32> {
    let hb = flags.hb.clamp(0, 500) as f32 / 100.0;
    let hv = flags.hv.clamp(0, 150) as f32 / 100.0;

    if flags.ht == 0 {
        original
            .iter()
            .zip(separated)
            .map(|(&w, &s)| hb * (w - s) + hv * s)
            .collect()
    } else {
        let mut voiced: Vec<f32> = separated.iter().map(|&s| hv * s).collect();
        effects::pre_emphasis_tension(&mut voiced, -(flags.ht as f32) / 50.0);
        original
            .iter()
            .zip(separated)
            .zip(&voiced)
            .map(|((&w, &s), &v)| hb * (w - s) + v)
            .collect()
    }
}

/// Reflect-extend the `[left, right)` column window of `mel` by `pad`
/// columns and prepend the `[0, left)` prefix.
fn loop_extend(mel: &FloatMatrix, left: usize, right: usize, pad: usize) -> FloatMatrix {
    let len = right - left;
    let total = left + len + pad;
    let mut out = FloatMatrix::zeros(mel.rows(), total);

    for r in 0..mel.rows() {
        let src = mel.row(r);
        let dst = out.row_mut(r);
        dst[..left].copy_from_slice(&src[..left]);
        for j in 0..len + pad {
            dst[left + j] = src[left + reflect_col(j, len)];
        }
    }
    out
}

/// Bounce reflection over `[0, len)`.
fn reflect_col(idx: usize, len: usize) -> usize {
    if len <= 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    let i = idx % period;
    if i < len {
        i
    } else {
        period - i
    }
}

fn is_null_output(path: &Path) -> bool {
    let name = path.to_string_lossy();
    name.eq_ignore_ascii_case("nul") || name == "/dev/null"
}

fn checkpoint(cancel: &CancelToken) -> RenderResult<()> {
    if cancel.is_cancelled() {
        Err(RenderError::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflect_col_bounces() {
        // len 4 -> period 6: 0 1 2 3 2 1 0 1 2 3 ...
        let want = [0, 1, 2, 3, 2, 1, 0, 1, 2, 3];
        for (i, &w) in want.iter().enumerate() {
            assert_eq!(reflect_col(i, 4), w, "idx {i}");
        }
    }

    #[test]
    fn reflect_col_degenerate() {
        assert_eq!(reflect_col(5, 1), 0);
        assert_eq!(reflect_col(0, 0), 0);
    }

    #[test]
    fn loop_extend_keeps_prefix_and_reflects() {
        let mut mel = FloatMatrix::zeros(1, 5);
        for c in 0..5 {
            mel.set(0, c, c as f32);
        }
        // prefix [0, 2), loop window [2, 5) = {2, 3, 4}, pad 4
        let out = loop_extend(&mel, 2, 5, 4);
        assert_eq!(out.cols(), 2 + 3 + 4);
        let row: Vec<f32> = out.row(0).to_vec();
        assert_eq!(row, vec![0.0, 1.0, 2.0, 3.0, 4.0, 3.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn null_output_detection() {
        assert!(is_null_output(Path::new("nul")));
        assert!(is_null_output(Path::new("NUL")));
        assert!(is_null_output(Path::new("/dev/null")));
        assert!(!is_null_output(Path::new("out.wav")));
    }

    #[test]
    fn mix_without_tension_blends_components() {
        let original = vec![1.0f32, 1.0, 1.0];
        let separated = vec![0.25f32, 0.25, 0.25];
        let mut flags = Flags::default();
        flags.hb = 200;
        flags.hv = 50;
        let mixed = mix_separated(&original, &separated, &flags);
        // 2.0 * 0.75 + 0.5 * 0.25
        for v in mixed {
            assert!((v - 1.625).abs() < 1e-6);
        }
    }

    #[test]
    fn mix_with_tension_uses_pre_emphasis() {
        let original: Vec<f32> = (0..64).map(|i| (i as f32 * 0.4).sin()).collect();
        let separated: Vec<f32> = original.iter().map(|v| v * 0.5).collect();
        let mut flags = Flags::default();
        flags.ht = 50;
        let with_tension = mix_separated(&original, &separated, &flags);

        flags.ht = 0;
        let without = mix_separated(&original, &separated, &flags);
        assert_ne!(with_tension, without);
    }
}
