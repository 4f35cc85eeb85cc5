//! ms-mel: mel filter bank and pitch-aware spectrogram analysis

pub mod analyzer;
pub mod filterbank;

pub use analyzer::MelAnalyzer;
pub use filterbank::{hz_to_mel, mel_filter_bank, mel_to_hz};
