//! Sampler configuration
//!
//! Loaded from a JSON file keyed by a top-level `Sampler` section. The
//! search order is an env var override, then candidates in the working
//! directory; a missing file falls back to defaults so the server can
//! start without any on-disk configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{CoreError, CoreResult};

/// Env var pointing at an explicit config file
pub const CONFIG_ENV: &str = "MELSAMPLER_CONFIG";

/// Default config file name searched in the working directory
pub const CONFIG_FILE: &str = "melsampler.config.json";

#[derive(Debug, Clone, Deserialize)]
struct ConfigFile {
    #[serde(rename = "Sampler", default)]
    sampler: SamplerConfig,
}

/// Runtime configuration for the sampler
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct SamplerConfig {
    /// HTTP listen port
    pub port: u16,
    /// Optional directory for feature cache files (default: next to source)
    pub cache_path: Option<PathBuf>,
    /// Render worker permits
    pub max_workers: usize,
    /// Output / analysis sample rate
    pub sample_rate: u32,
    /// Vocoder hop size in samples
    pub hop_size: usize,
    /// Feature-extraction hop size in samples
    pub origin_hop_size: usize,
    /// FFT size for mel analysis
    pub n_fft: usize,
    /// Analysis window length
    pub win_size: usize,
    /// Mel channels
    pub num_mels: usize,
    /// Mel filter bank lower edge in Hz
    pub mel_f_min: f64,
    /// Mel filter bank upper edge in Hz
    pub mel_f_max: f64,
    /// Frames of headroom kept on each side when trimming
    pub fill: usize,
    /// Output peak ceiling
    pub peak_limit: f32,
    /// Enable loudness normalization (P flag)
    pub wave_norm: bool,
    /// Force loop mode for every render
    pub loop_mode: bool,
    /// Path to the vocoder ONNX model
    pub vocoder_config: Option<PathBuf>,
    /// Path to the harmonic/noise separator ONNX model
    pub hn_sep_config: Option<PathBuf>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            port: 8572,
            cache_path: None,
            max_workers: 2,
            sample_rate: 44100,
            hop_size: 512,
            origin_hop_size: 128,
            n_fft: 2048,
            win_size: 2048,
            num_mels: 128,
            mel_f_min: 40.0,
            mel_f_max: 16000.0,
            fill: 8,
            peak_limit: 0.9,
            wave_norm: true,
            loop_mode: false,
            vocoder_config: None,
            hn_sep_config: None,
        }
    }
}

impl SamplerConfig {
    /// Load configuration from the default search path.
    pub fn load() -> CoreResult<Self> {
        if let Ok(p) = std::env::var(CONFIG_ENV) {
            return Self::load_from_path(Path::new(&p));
        }

        let candidate = std::env::current_dir()?.join(CONFIG_FILE);
        if candidate.exists() {
            return Self::load_from_path(&candidate);
        }

        log::warn!("{CONFIG_FILE} not found, using built-in defaults");
        Ok(Self::default())
    }

    /// Load configuration from an explicit path.
    pub fn load_from_path(path: &Path) -> CoreResult<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("failed to read {}: {e}", path.display())))?;
        let file: ConfigFile = serde_json::from_str(&raw)
            .map_err(|e| CoreError::Config(format!("invalid {}: {e}", path.display())))?;
        let cfg = file.sampler;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> CoreResult<()> {
        if self.sample_rate == 0 {
            return Err(CoreError::Config("SampleRate must be positive".into()));
        }
        if self.hop_size == 0 || self.origin_hop_size == 0 {
            return Err(CoreError::Config("hop sizes must be positive".into()));
        }
        if !self.n_fft.is_power_of_two() || self.n_fft < 2 {
            return Err(CoreError::Config("NFft must be a power of two >= 2".into()));
        }
        if self.win_size > self.n_fft {
            return Err(CoreError::Config("WinSize must not exceed NFft".into()));
        }
        if self.num_mels == 0 {
            return Err(CoreError::Config("NumMels must be positive".into()));
        }
        Ok(())
    }
}
