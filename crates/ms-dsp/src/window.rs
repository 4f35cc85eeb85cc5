//! Analysis windows
//!
//! Periodic Hann windows, cached process-wide by length. The analyzer hits
//! a new length for every distinct formant shift, so windows are built once
//! and shared.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

static WINDOWS: Lazy<RwLock<HashMap<usize, Arc<Vec<f32>>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Periodic Hann window of the given length: `0.5 - 0.5 cos(2 pi i / len)`.
/// Length 1 collapses to `[1.0]`.
pub fn hann(len: usize) -> Arc<Vec<f32>> {
    if let Some(w) = WINDOWS.read().get(&len) {
        return Arc::clone(w);
    }

    let window: Vec<f32> = if len == 1 {
        vec![1.0]
    } else {
        (0..len)
            .map(|i| (0.5 - 0.5 * (2.0 * PI * i as f64 / len as f64).cos()) as f32)
            .collect()
    };
    let window = Arc::new(window);

    let mut map = WINDOWS.write();
    Arc::clone(map.entry(len).or_insert(window))
}
