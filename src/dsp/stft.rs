//! Short-time Fourier transform with centred framing and overlap-add inversion.

use ndarray::Array2;
use rayon::prelude::*;
use rustfft::num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

use super::window::{centered_window, pad_signal, window_sumsquare};
use crate::config::{AudioParams, PadMode};
use crate::error::{PipelineError, Result};

/// Overlap-sum values at or below this are left undivided during inversion.
pub const MIN_OVERLAP_SUM: f32 = 1e-8;

/// Planned forward/inverse transforms for one (n_fft, hop, window) setup.
///
/// Spectrograms are laid out as (frequency bin, time frame). Frame `t` is
/// centred on sample `t * hop_size` of the unpadded signal.
#[derive(Clone)]
pub struct Stft {
    n_fft: usize,
    hop_size: usize,
    pad_mode: PadMode,
    window: Vec<f32>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}

impl Stft {
    pub fn new(n_fft: usize, hop_size: usize, win_size: usize, pad_mode: PadMode) -> Result<Self> {
        if n_fft < 2 {
            return Err(PipelineError::invalid("n_fft", format!("{} is too small", n_fft)));
        }
        if win_size == 0 || win_size > n_fft {
            return Err(PipelineError::invalid(
                "win_size",
                format!("{} must be in 1..={}", win_size, n_fft),
            ));
        }
        if hop_size == 0 {
            return Err(PipelineError::invalid("hop_size", "must be positive"));
        }

        let mut planner = FftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(n_fft);
        let inverse = planner.plan_fft_inverse(n_fft);

        Ok(Self {
            n_fft,
            hop_size,
            pad_mode,
            window: centered_window(win_size, n_fft),
            forward,
            inverse,
        })
    }

    pub fn from_params(params: &AudioParams) -> Result<Self> {
        params.validate()?;
        Self::new(params.n_fft, params.hop_size, params.win_size, params.pad_mode)
    }

    pub fn n_fft(&self) -> usize {
        self.n_fft
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    pub fn num_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    pub fn num_frames(&self, num_samples: usize) -> usize {
        1 + num_samples / self.hop_size
    }

    /// Length of the waveform [`Stft::inverse`] produces from `num_frames` frames.
    pub fn signal_len(&self, num_frames: usize) -> usize {
        self.hop_size * num_frames.saturating_sub(1)
    }

    pub fn forward(&self, signal: &[f32]) -> Result<Array2<Complex32>> {
        if signal.is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        let n_fft = self.n_fft;
        let bins = self.num_bins();
        let num_frames = self.num_frames(signal.len());
        let padded = pad_signal(signal, n_fft / 2, self.pad_mode);

        let frames: Vec<Vec<Complex32>> = (0..num_frames)
            .into_par_iter()
            .map(|t| {
                let start = t * self.hop_size;
                let mut buffer: Vec<Complex32> = padded[start..start + n_fft]
                    .iter()
                    .zip(self.window.iter())
                    .map(|(&s, &w)| Complex32::new(s * w, 0.0))
                    .collect();
                self.forward.process(&mut buffer);
                buffer.truncate(bins);
                buffer
            })
            .collect();

        let mut spec = Array2::from_elem((bins, num_frames), Complex32::new(0.0, 0.0));
        for (t, frame) in frames.into_iter().enumerate() {
            spec.column_mut(t)
                .iter_mut()
                .zip(frame)
                .for_each(|(dst, c)| *dst = c);
        }
        Ok(spec)
    }

    /// Overlap-add synthesis normalised by the summed squared window.
    pub fn inverse(&self, spec: &Array2<Complex32>) -> Result<Vec<f32>> {
        let (bins, num_frames) = spec.dim();
        if bins != self.num_bins() {
            return Err(PipelineError::DimensionMismatch {
                what: "frequency bins",
                expected: self.num_bins(),
                got: bins,
            });
        }
        if num_frames == 0 {
            return Err(PipelineError::EmptyInput);
        }

        let n_fft = self.n_fft;
        let scale = 1.0 / n_fft as f32;

        let frames: Vec<Vec<f32>> = (0..num_frames)
            .into_par_iter()
            .map(|t| {
                let mut buffer = vec![Complex32::new(0.0, 0.0); n_fft];
                for (dst, &c) in buffer.iter_mut().zip(spec.column(t).iter()) {
                    *dst = c;
                }
                // Hermitian completion so the inverse transform is real
                buffer[0].im = 0.0;
                if n_fft % 2 == 0 {
                    buffer[n_fft / 2].im = 0.0;
                }
                for k in 1..bins {
                    if n_fft - k >= bins {
                        buffer[n_fft - k] = buffer[k].conj();
                    }
                }
                self.inverse.process(&mut buffer);
                buffer
                    .iter()
                    .zip(self.window.iter())
                    .map(|(c, &w)| c.re * scale * w)
                    .collect()
            })
            .collect();

        let mut output = vec![0.0f32; n_fft + self.hop_size * (num_frames - 1)];
        for (t, frame) in frames.iter().enumerate() {
            let start = t * self.hop_size;
            for (y, &x) in output[start..start + n_fft].iter_mut().zip(frame) {
                *y += x;
            }
        }

        let overlap = window_sumsquare(&self.window, num_frames, self.hop_size);
        for (y, &s) in output.iter_mut().zip(overlap.iter()) {
            if s > MIN_OVERLAP_SUM {
                *y /= s;
            }
        }

        let pad = n_fft / 2;
        let len = self.signal_len(num_frames);
        output.truncate(pad + len);
        Ok(output.split_off(pad))
    }
}

pub fn magnitude(spec: &Array2<Complex32>) -> Array2<f32> {
    spec.mapv(|c| c.norm())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_signal(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = i as f32 / 16000.0;
                0.6 * (2.0 * std::f32::consts::PI * 220.0 * t).sin()
                    + 0.3 * (2.0 * std::f32::consts::PI * 1375.0 * t).sin()
            })
            .collect()
    }

    #[test]
    fn rejects_bad_geometry() {
        assert!(Stft::new(512, 128, 1024, PadMode::Reflect).is_err());
        assert!(Stft::new(512, 0, 256, PadMode::Reflect).is_err());
        assert!(Stft::new(1, 1, 1, PadMode::Reflect).is_err());
        assert!(Stft::new(512, 128, 512, PadMode::Reflect).is_ok());
    }

    #[test]
    fn forward_shape() {
        let stft = Stft::new(512, 128, 400, PadMode::Reflect).unwrap();
        let spec = stft.forward(&test_signal(1000)).unwrap();
        assert_eq!(spec.dim(), (257, 1 + 1000 / 128));
    }

    #[test]
    fn forward_rejects_empty() {
        let stft = Stft::new(512, 128, 400, PadMode::Reflect).unwrap();
        assert!(matches!(stft.forward(&[]), Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn inverse_reconstructs_signal() {
        for mode in [PadMode::Reflect, PadMode::Constant] {
            let stft = Stft::new(512, 128, 512, mode).unwrap();
            let signal = test_signal(128 * 40);
            let spec = stft.forward(&signal).unwrap();
            let restored = stft.inverse(&spec).unwrap();
            assert_eq!(restored.len(), signal.len());
            for (i, (a, b)) in signal.iter().zip(restored.iter()).enumerate() {
                assert!((a - b).abs() < 1e-3, "sample {} ({:?}): {} vs {}", i, mode, a, b);
            }
        }
    }

    #[test]
    fn inverse_with_short_window_inside_frame() {
        let stft = Stft::new(2048, 300, 1200, PadMode::Reflect).unwrap();
        let signal = test_signal(300 * 30);
        let restored = stft.inverse(&stft.forward(&signal).unwrap()).unwrap();
        for (a, b) in signal.iter().zip(restored.iter()) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn sparse_overlap_leaves_gaps_finite() {
        // hop exceeds the window, so each frame is followed by samples no window covers
        let stft = Stft::new(512, 384, 256, PadMode::Reflect).unwrap();
        let signal = test_signal(384 * 10);
        let restored = stft.inverse(&stft.forward(&signal).unwrap()).unwrap();
        assert_eq!(restored.len(), signal.len());
        assert!(restored.iter().all(|s| s.is_finite() && s.abs() < 2.0));
        assert!(restored[900..1000].iter().all(|&s| s == 0.0));
        assert!((restored[1152] - signal[1152]).abs() < 1e-3);
    }

    #[test]
    fn inverse_rejects_wrong_bin_count() {
        let stft = Stft::new(512, 128, 512, PadMode::Reflect).unwrap();
        let spec = Array2::from_elem((100, 4), Complex32::new(0.0, 0.0));
        assert!(matches!(
            stft.inverse(&spec),
            Err(PipelineError::DimensionMismatch { expected: 257, got: 100, .. })
        ));
    }

    #[test]
    fn sine_peaks_at_its_bin() {
        let stft = Stft::new(1024, 256, 1024, PadMode::Reflect).unwrap();
        // 16000 / 1024 * 64 = 1000 Hz lands exactly on bin 64
        let signal: Vec<f32> = (0..16000)
            .map(|i| (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / 16000.0).sin())
            .collect();
        let mag = magnitude(&stft.forward(&signal).unwrap());
        let column = mag.column(mag.ncols() / 2);
        let peak = column
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |best, (k, &m)| if m > best.1 { (k, m) } else { best })
            .0;
        assert_eq!(peak, 64);
    }
}
