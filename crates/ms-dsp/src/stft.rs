//! STFT engine
//!
//! Windowed framing with a forward transform for arbitrary frame lengths
//! and an overlap-add inverse. The forward path parallelizes across frames
//! once the frame count justifies the dispatch; the inverse is sequential
//! because overlap-add accumulates into shared positions.

use rayon::prelude::*;

use crate::error::{DspError, DspResult};
use crate::fft;

/// Frame count at which forward frames are dispatched to the thread pool.
const PARALLEL_FRAMES: usize = 32;

/// One-sided complex spectrogram, row-major `bins x frames`.
pub struct Spectrogram {
    pub re: Vec<f32>,
    pub im: Vec<f32>,
    pub bins: usize,
    pub frames: usize,
}

impl Spectrogram {
    pub fn zeros(bins: usize, frames: usize) -> Self {
        Self {
            re: vec![0.0; bins * frames],
            im: vec![0.0; bins * frames],
            bins,
            frames,
        }
    }
}

/// Reflect an index into `[0, len)` by bouncing off both boundaries.
/// Length-1 arrays collapse to index 0.
#[inline]
fn reflect_index(idx: isize, len: usize) -> usize {
    if len <= 1 {
        return 0;
    }
    let period = 2 * (len as isize - 1);
    let mut i = idx.rem_euclid(period);
    if i >= len as isize {
        i = period - i;
    }
    i as usize
}

/// Reflect-pad a signal on both sides.
pub fn reflect_pad(signal: &[f32], left: usize, right: usize) -> Vec<f32> {
    let len = signal.len();
    let mut padded = Vec::with_capacity(left + len + right);
    for i in 0..left {
        let idx = left as isize - i as isize;
        padded.push(signal[reflect_index(idx, len)]);
    }
    padded.extend_from_slice(signal);
    for i in 0..right {
        let idx = len as isize - 2 - i as isize;
        padded.push(signal[reflect_index(idx, len)]);
    }
    padded
}

fn validate_window(n_fft: usize, win_len: usize, window: &[f32]) -> DspResult<()> {
    if win_len > n_fft {
        return Err(DspError::InvalidArgument(format!(
            "window length {win_len} exceeds FFT size {n_fft}"
        )));
    }
    if window.len() < win_len {
        return Err(DspError::InvalidArgument(format!(
            "window buffer holds {} samples, need {win_len}",
            window.len()
        )));
    }
    Ok(())
}

/// Forward STFT.
///
/// When `center` is set the signal is reflect-padded by `n_fft / 2` on each
/// side first. Output is one-sided (`n_fft / 2 + 1` bins), row-major
/// `bins x frames`.
pub fn stft(
    signal: &[f32],
    n_fft: usize,
    hop: usize,
    win_len: usize,
    window: &[f32],
    center: bool,
) -> DspResult<Spectrogram> {
    if n_fft < 2 {
        return Err(DspError::InvalidArgument(format!("invalid FFT size {n_fft}")));
    }
    if signal.is_empty() {
        return Err(DspError::InvalidArgument("stft of empty signal".into()));
    }
    validate_window(n_fft, win_len, window)?;

    let padded;
    let input: &[f32] = if center {
        padded = reflect_pad(signal, n_fft / 2, n_fft / 2);
        &padded
    } else {
        signal
    };

    let hop = hop.max(1);
    let frames = if input.len() >= n_fft {
        1 + (input.len() - n_fft) / hop
    } else {
        1
    };
    let bins = n_fft / 2 + 1;

    let mut out = Spectrogram::zeros(bins, frames);

    let compute_frame = |scratch: &mut (Vec<f32>, Vec<f32>), frame: usize| {
        let (re, im) = scratch;
        re.fill(0.0);
        im.fill(0.0);
        let start = frame * hop;
        let take = win_len.min(input.len().saturating_sub(start));
        for i in 0..take {
            re[i] = input[start + i] * window[i];
        }
        // Plan exists after the first frame; per-frame error is impossible
        // once the size is validated above.
        let _ = fft::fft(re, im, false);
    };

    if frames >= PARALLEL_FRAMES && num_cpus::get() > 1 {
        let columns: Vec<(Vec<f32>, Vec<f32>)> = (0..frames)
            .into_par_iter()
            .map_init(
                || (vec![0.0f32; n_fft], vec![0.0f32; n_fft]),
                |scratch, frame| {
                    compute_frame(scratch, frame);
                    (scratch.0[..bins].to_vec(), scratch.1[..bins].to_vec())
                },
            )
            .collect();
        for (frame, (col_re, col_im)) in columns.into_iter().enumerate() {
            for bin in 0..bins {
                out.re[bin * frames + frame] = col_re[bin];
                out.im[bin * frames + frame] = col_im[bin];
            }
        }
    } else {
        let mut scratch = (vec![0.0f32; n_fft], vec![0.0f32; n_fft]);
        for frame in 0..frames {
            compute_frame(&mut scratch, frame);
            for bin in 0..bins {
                out.re[bin * frames + frame] = scratch.0[bin];
                out.im[bin * frames + frame] = scratch.1[bin];
            }
        }
    }

    Ok(out)
}

/// Inverse STFT with overlap-add.
///
/// The one-sided spectrum is mirrored into the conjugate upper half before
/// each inverse transform. When `expected_len` is positive the result is
/// truncated or zero-extended to exactly that length.
#[allow(clippy::too_many_arguments)]
pub fn istft(
    re: &[f32],
    im: &[f32],
    bins: usize,
    frames: usize,
    n_fft: usize,
    hop: usize,
    win_len: usize,
    window: &[f32],
    center: bool,
    expected_len: usize,
) -> DspResult<Vec<f32>> {
    if !n_fft.is_power_of_two() || n_fft < 2 {
        return Err(DspError::InvalidArgument(format!("invalid FFT size {n_fft}")));
    }
    if bins != n_fft / 2 + 1 {
        return Err(DspError::InvalidArgument(format!(
            "bin count {bins} does not match FFT size {n_fft}"
        )));
    }
    if re.len() != im.len() || re.len() != bins * frames {
        return Err(DspError::InvalidArgument(format!(
            "spectrogram buffers hold {} samples, expected {}",
            re.len(),
            bins * frames
        )));
    }
    validate_window(n_fft, win_len, window)?;

    let hop = hop.max(1);
    let full_len = (frames.saturating_sub(1)) * hop + n_fft;
    let mut output = vec![0.0f32; full_len];
    let mut window_sum_sq = vec![0.0f32; full_len];

    let mut buf_re = vec![0.0f32; n_fft];
    let mut buf_im = vec![0.0f32; n_fft];

    for frame in 0..frames {
        for bin in 0..bins {
            buf_re[bin] = re[bin * frames + frame];
            buf_im[bin] = im[bin * frames + frame];
        }
        for bin in bins..n_fft {
            let src = n_fft - bin;
            buf_re[bin] = buf_re[src];
            buf_im[bin] = -buf_im[src];
        }

        fft::fft(&mut buf_re, &mut buf_im, true)?;

        let start = frame * hop;
        for i in 0..win_len {
            output[start + i] += buf_re[i] * window[i];
            window_sum_sq[start + i] += window[i] * window[i];
        }
    }

    for (sample, wss) in output.iter_mut().zip(&window_sum_sq) {
        if *wss > 1e-8 {
            *sample /= wss;
        }
    }

    if center {
        let trim = n_fft / 2;
        let end = full_len.saturating_sub(trim);
        output.drain(..trim.min(output.len()));
        output.truncate(end.saturating_sub(trim));
    }

    if expected_len > 0 {
        output.resize(expected_len, 0.0);
    }

    Ok(output)
}
