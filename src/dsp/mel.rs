//! Slaney-style mel filterbank and its least-squares inverse.
//!
//! The filterbank is built once per configuration and never mutated, so a
//! single instance can be shared by reference across threads.

use ndarray::Array2;

use crate::config::AudioParams;
use crate::error::{PipelineError, Result};

/// Lower bound applied to linear magnitudes recovered from mel bins.
pub const MIN_MAGNITUDE: f32 = 1e-10;

const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;
// ln(6.4) / 27
const LOGSTEP: f64 = 0.068_751_777_420_949_12;

/// Hz to mel: linear below 1 kHz, logarithmic above.
pub fn hz_to_mel(freq: f64) -> f64 {
    if freq < MIN_LOG_HZ {
        freq / F_SP
    } else {
        MIN_LOG_MEL + (freq / MIN_LOG_HZ).ln() / LOGSTEP
    }
}

pub fn mel_to_hz(mel: f64) -> f64 {
    if mel < MIN_LOG_MEL {
        mel * F_SP
    } else {
        MIN_LOG_HZ * ((mel - MIN_LOG_MEL) * LOGSTEP).exp()
    }
}

pub struct MelFilterbank {
    /// (num_mels, n_fft / 2 + 1)
    basis: Array2<f32>,
    /// (n_fft / 2 + 1, num_mels)
    inverse: Array2<f32>,
}

impl MelFilterbank {
    pub fn new(sample_rate: u32, n_fft: usize, num_mels: usize, fmin: f32, fmax: f32) -> Result<Self> {
        let nyquist = sample_rate as f32 / 2.0;
        if num_mels == 0 {
            return Err(PipelineError::invalid("num_mels", "must be positive"));
        }
        if !(fmin >= 0.0 && fmax > fmin && fmax <= nyquist) {
            return Err(PipelineError::invalid(
                "fmax",
                format!("filter range {}..{} Hz must lie within 0..{} Hz", fmin, fmax, nyquist),
            ));
        }

        let basis = build_basis(sample_rate, n_fft, num_mels, fmin as f64, fmax as f64);
        if let Some(row) = basis.rows().into_iter().position(|r| r.iter().all(|&w| w == 0.0)) {
            return Err(PipelineError::DegenerateFilterbank { row });
        }
        let inverse = pseudo_inverse(&basis)?;

        log::debug!(
            "Built mel filterbank: {} mels x {} bins, {:.0}-{:.0} Hz",
            num_mels,
            basis.ncols(),
            fmin,
            fmax
        );

        Ok(Self { basis, inverse })
    }

    pub fn from_params(params: &AudioParams) -> Result<Self> {
        Self::new(params.sample_rate, params.n_fft, params.num_mels, params.fmin, params.fmax)
    }

    pub fn num_mels(&self) -> usize {
        self.basis.nrows()
    }

    pub fn num_freq(&self) -> usize {
        self.basis.ncols()
    }

    pub fn basis(&self) -> &Array2<f32> {
        &self.basis
    }

    pub fn pseudo_inverse(&self) -> &Array2<f32> {
        &self.inverse
    }

    /// Linear (bin, frame) magnitudes to (mel, frame).
    pub fn project(&self, linear: &Array2<f32>) -> Result<Array2<f32>> {
        if linear.nrows() != self.num_freq() {
            return Err(PipelineError::DimensionMismatch {
                what: "linear frequency bins",
                expected: self.num_freq(),
                got: linear.nrows(),
            });
        }
        Ok(self.basis.dot(linear))
    }

    /// Best-effort (mel, frame) to (bin, frame) magnitudes, floored at [`MIN_MAGNITUDE`].
    pub fn invert(&self, mel: &Array2<f32>) -> Result<Array2<f32>> {
        if mel.nrows() != self.num_mels() {
            return Err(PipelineError::DimensionMismatch {
                what: "mel bins",
                expected: self.num_mels(),
                got: mel.nrows(),
            });
        }
        let mut linear = self.inverse.dot(mel);
        linear.mapv_inplace(|v| v.max(MIN_MAGNITUDE));
        Ok(linear)
    }
}

fn build_basis(sample_rate: u32, n_fft: usize, num_mels: usize, fmin: f64, fmax: f64) -> Array2<f32> {
    let num_freq = n_fft / 2 + 1;
    let fft_freqs: Vec<f64> = (0..num_freq)
        .map(|k| k as f64 * sample_rate as f64 / n_fft as f64)
        .collect();

    let mel_min = hz_to_mel(fmin);
    let mel_max = hz_to_mel(fmax);
    let edges: Vec<f64> = (0..num_mels + 2)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f64 / (num_mels + 1) as f64))
        .collect();

    let mut basis = Array2::<f32>::zeros((num_mels, num_freq));
    for m in 0..num_mels {
        let (lower, center, upper) = (edges[m], edges[m + 1], edges[m + 2]);
        // area normalisation
        let enorm = 2.0 / (upper - lower);
        for (k, &f) in fft_freqs.iter().enumerate() {
            let rising = (f - lower) / (center - lower);
            let falling = (upper - f) / (upper - center);
            let weight = rising.min(falling).max(0.0);
            basis[[m, k]] = (weight * enorm) as f32;
        }
    }
    basis
}

/// Moore-Penrose inverse of a full-row-rank matrix: `Bᵀ (B Bᵀ)⁻¹`.
///
/// Solved through a Cholesky factorisation of the Gram matrix in f64.
fn pseudo_inverse(basis: &Array2<f32>) -> Result<Array2<f32>> {
    let b = basis.mapv(|v| v as f64);
    let (rows, cols) = b.dim();
    let gram = b.dot(&b.t());

    let mut chol = Array2::<f64>::zeros((rows, rows));
    for j in 0..rows {
        let mut diag = gram[[j, j]];
        for p in 0..j {
            diag -= chol[[j, p]] * chol[[j, p]];
        }
        if !(diag > gram[[j, j]] * 1e-10) {
            return Err(PipelineError::DegenerateFilterbank { row: j });
        }
        let diag = diag.sqrt();
        chol[[j, j]] = diag;
        for i in j + 1..rows {
            let mut v = gram[[i, j]];
            for p in 0..j {
                v -= chol[[i, p]] * chol[[j, p]];
            }
            chol[[i, j]] = v / diag;
        }
    }

    // Solve (L Lᵀ) X = B one column at a time; the pseudo-inverse is Xᵀ.
    let mut inverse = Array2::<f32>::zeros((cols, rows));
    let mut y = vec![0.0f64; rows];
    for c in 0..cols {
        for i in 0..rows {
            let mut v = b[[i, c]];
            for p in 0..i {
                v -= chol[[i, p]] * y[p];
            }
            y[i] = v / chol[[i, i]];
        }
        for i in (0..rows).rev() {
            let mut v = y[i];
            for p in i + 1..rows {
                v -= chol[[p, i]] * y[p];
            }
            y[i] = v / chol[[i, i]];
        }
        for (i, &x) in y.iter().enumerate() {
            inverse[[c, i]] = x as f32;
        }
    }
    Ok(inverse)
}
