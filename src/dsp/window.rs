//! Analysis window and framing helpers.

use std::f32::consts::PI;

use crate::config::PadMode;

/// Periodic Hann window of `size` samples (DFT-even, so shifted copies sum flat).
pub fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / size as f32).cos()))
        .collect()
}

/// Hann window of `win_size` centred inside a zeroed frame of `n_fft` samples.
pub fn centered_window(win_size: usize, n_fft: usize) -> Vec<f32> {
    let mut frame = vec![0.0f32; n_fft];
    let offset = (n_fft - win_size) / 2;
    frame[offset..offset + win_size].copy_from_slice(&hann_window(win_size));
    frame
}

/// Extends `signal` by `pad` samples on both sides.
///
/// Reflect mode mirrors around the edge sample without repeating it and folds
/// again when `pad` exceeds the signal length.
pub fn pad_signal(signal: &[f32], pad: usize, mode: PadMode) -> Vec<f32> {
    let n = signal.len();
    let mut padded = Vec::with_capacity(n + 2 * pad);
    match mode {
        PadMode::Constant => {
            padded.resize(pad, 0.0);
            padded.extend_from_slice(signal);
            padded.resize(n + 2 * pad, 0.0);
        }
        PadMode::Reflect => {
            for i in 0..n + 2 * pad {
                let j = i as isize - pad as isize;
                padded.push(signal[reflect_index(j, n)]);
            }
        }
    }
    padded
}

fn reflect_index(j: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n as isize - 1);
    let m = j.rem_euclid(period);
    if m < n as isize {
        m as usize
    } else {
        (period - m) as usize
    }
}

/// Sum of squared, hop-shifted windows across `num_frames` frames.
pub fn window_sumsquare(window: &[f32], num_frames: usize, hop_size: usize) -> Vec<f32> {
    let n_fft = window.len();
    let mut sum = vec![0.0f32; n_fft + hop_size * num_frames.saturating_sub(1)];
    for frame in 0..num_frames {
        let start = frame * hop_size;
        for (s, w) in sum[start..start + n_fft].iter_mut().zip(window) {
            *s += w * w;
        }
    }
    sum
}
