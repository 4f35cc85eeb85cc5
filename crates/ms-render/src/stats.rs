//! Per-render timing breakdown

/// Timing and outcome statistics for one render.
#[derive(Debug, Clone, Default)]
pub struct RenderStats {
    pub total_ms: f64,
    pub feature_ms: f64,
    pub synthesis_ms: f64,
    pub post_ms: f64,
    pub input_samples: usize,
    pub output_samples: usize,
    pub cache_hit: bool,
}

impl RenderStats {
    pub fn log(&self) {
        log::debug!(
            "render done: total={:.1}ms feature={:.1}ms synth={:.1}ms post={:.1}ms in={} out={} cache_hit={}",
            self.total_ms,
            self.feature_ms,
            self.synthesis_ms,
            self.post_ms,
            self.input_samples,
            self.output_samples,
            self.cache_hit
        );
    }
}
