//! MelSampler - neural-vocoder UTAU resampler
//!
//! Launcher entry point: loads the config, brings up the inference
//! backend, and either serves the resample RPC or performs a one-shot
//! render when invoked with the classic UTAU argument list.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use ms_core::{parse_args, CancelToken, SamplerConfig};
use ms_ml::{HarmonicSeparator, MlError, MlResult, SynthesisBackend, TractBackend, Vocoder};
use ms_render::Renderer;
use ms_server::AppState;

/// Stand-in backend while no vocoder model is configured. The server
/// stays up and reports itself as initializing.
struct UnavailableBackend;

impl SynthesisBackend for UnavailableBackend {
    fn spec_to_wav(&self, _mel: &ms_dsp::FloatMatrix, _f0: &[f32]) -> MlResult<Vec<f32>> {
        Err(MlError::ModelNotFound {
            path: "<vocoder not configured>".into(),
        })
    }

    fn separate_harmonic(&self, samples: &[f32]) -> Vec<f32> {
        samples.to_vec()
    }

    fn has_separator(&self) -> bool {
        false
    }
}

fn load_backend(config: &SamplerConfig) -> Option<Arc<dyn SynthesisBackend>> {
    let vocoder_path = config.vocoder_config.as_ref()?;
    let vocoder = match Vocoder::load(vocoder_path) {
        Ok(v) => v,
        Err(e) => {
            log::error!("failed to load vocoder: {e}");
            return None;
        }
    };

    let separator = config.hn_sep_config.as_ref().and_then(|path| {
        match HarmonicSeparator::load(path) {
            Ok(s) => Some(s),
            Err(e) => {
                log::warn!("failed to load separator, breath flags will be inactive: {e}");
                None
            }
        }
    });

    Some(Arc::new(TractBackend::new(vocoder, separator)))
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();

    let mut config_path: Option<PathBuf> = None;
    if args.first().map(String::as_str) == Some("--config") {
        args.remove(0);
        if args.is_empty() {
            eprintln!("--config requires a path");
            std::process::exit(2);
        }
        config_path = Some(PathBuf::from(args.remove(0)));
    }

    let config = match config_path {
        Some(path) => SamplerConfig::load_from_path(&path),
        None => SamplerConfig::load(),
    };
    let config = match config {
        Ok(c) => c,
        Err(e) => {
            eprintln!("config error: {e}");
            std::process::exit(2);
        }
    };

    // The classic resampler convention: 12 or 13 positional arguments
    // means a single render, no server.
    if args.len() >= 12 {
        run_once(config, &args);
        return;
    }

    run_server(config).await;
}

fn run_once(config: SamplerConfig, args: &[String]) {
    let request = match parse_args(args) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    let backend = match load_backend(&config) {
        Some(b) => b,
        None => {
            eprintln!("no vocoder model configured (set Sampler.VocoderConfig)");
            std::process::exit(1);
        }
    };

    let renderer = Renderer::new(config, backend);
    match renderer.render(&request, &CancelToken::new()) {
        Ok(stats) => {
            log::info!(
                "rendered {} samples in {:.1} ms",
                stats.output_samples,
                stats.total_ms
            );
        }
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}

async fn run_server(config: SamplerConfig) {
    let port = config.port;
    let max_workers = config.max_workers;

    let (backend, ready) = match load_backend(&config) {
        Some(backend) => (backend, true),
        None => {
            log::warn!("starting without a vocoder model; reporting 'Server Initializing'");
            (
                Arc::new(UnavailableBackend) as Arc<dyn SynthesisBackend>,
                false,
            )
        }
    };

    let renderer = Arc::new(Renderer::new(config, backend));
    let state = AppState::new(renderer, max_workers, Arc::new(AtomicBool::new(ready)));

    if let Err(e) = ms_server::run_server(state, port).await {
        log::error!("server terminated: {e}");
        std::process::exit(1);
    }
}
