//! Griffin-Lim phase reconstruction.
//!
//! Alternates between imposing the target magnitude on the current phase
//! estimate and projecting back onto the set of consistent spectrograms
//! through an ISTFT/STFT round trip.

use ndarray::{Array2, Zip};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use rustfft::num_complex::Complex32;
use std::f32::consts::TAU;
use std::ops::ControlFlow;

use super::stft::{magnitude, Stft};
use crate::error::{PipelineError, Result};

/// Starting phase for the first synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseInit {
    /// Uniform phase in `[0, 2π)` from a PCG32 stream.
    Random { seed: u64 },
    /// Every bin starts at phase zero.
    Zero,
}

pub struct GriffinLim<'a> {
    stft: &'a Stft,
    iters: usize,
    init: PhaseInit,
}

impl<'a> GriffinLim<'a> {
    /// `iters` below one is raised to one.
    pub fn new(stft: &'a Stft, iters: usize) -> Self {
        Self {
            stft,
            iters: iters.max(1),
            init: PhaseInit::Random { seed: 0 },
        }
    }

    pub fn with_phase_init(mut self, init: PhaseInit) -> Self {
        self.init = init;
        self
    }

    pub fn iters(&self) -> usize {
        self.iters
    }

    pub fn reconstruct(&self, target: &Array2<f32>) -> Result<Vec<f32>> {
        self.reconstruct_with(target, |_, _| ControlFlow::Continue(()))
    }

    /// Runs the iterations, calling `on_iter(completed, total)` after each one.
    ///
    /// Returning `Break` stops early; the waveform synthesized by the last
    /// completed iteration is returned.
    pub fn reconstruct_with<F>(&self, target: &Array2<f32>, mut on_iter: F) -> Result<Vec<f32>>
    where
        F: FnMut(usize, usize) -> ControlFlow<()>,
    {
        let (bins, frames) = target.dim();
        if bins != self.stft.num_bins() {
            return Err(PipelineError::DimensionMismatch {
                what: "frequency bins",
                expected: self.stft.num_bins(),
                got: bins,
            });
        }
        if frames < 2 {
            return Err(PipelineError::InsufficientFrames { got: frames, min: 2 });
        }
        if let Some(index) = target.iter().position(|v| !v.is_finite()) {
            return Err(PipelineError::NonFiniteInput { index });
        }

        let target = target.mapv(f32::abs);
        let mut phase = self.initial_phase(bins, frames);
        let mut signal = self.stft.inverse(&combine(&target, &phase))?;

        for i in 0..self.iters {
            let estimate = self.stft.forward(&signal)?;
            phase = estimate.mapv(unit_phase);
            signal = self.stft.inverse(&combine(&target, &phase))?;

            let completed = i + 1;
            if on_iter(completed, self.iters).is_break() && completed < self.iters {
                log::warn!("Griffin-Lim stopped after {}/{} iterations", completed, self.iters);
                break;
            }
        }

        if log::log_enabled!(log::Level::Debug) {
            let achieved = magnitude(&self.stft.forward(&signal)?);
            log::debug!(
                "Griffin-Lim: {} frames, spectral convergence {:.4}",
                frames,
                spectral_convergence(&target, &achieved)
            );
        }

        Ok(signal)
    }

    fn initial_phase(&self, bins: usize, frames: usize) -> Array2<Complex32> {
        match self.init {
            PhaseInit::Zero => Array2::from_elem((bins, frames), Complex32::new(1.0, 0.0)),
            PhaseInit::Random { seed } => {
                let mut rng = Pcg32::seed_from_u64(seed);
                Array2::from_shape_fn((bins, frames), |_| {
                    Complex32::from_polar(1.0, rng.gen::<f32>() * TAU)
                })
            }
        }
    }
}

fn unit_phase(c: Complex32) -> Complex32 {
    let norm = c.norm();
    if norm > 0.0 {
        c / norm
    } else {
        Complex32::new(1.0, 0.0)
    }
}

fn combine(target: &Array2<f32>, phase: &Array2<Complex32>) -> Array2<Complex32> {
    Zip::from(target)
        .and(phase)
        .map_collect(|&m, &p| p * m)
}

/// `‖target − estimate‖ / ‖target‖` over all bins and frames.
pub fn spectral_convergence(target: &Array2<f32>, estimate: &Array2<f32>) -> f32 {
    let diff: f32 = Zip::from(target)
        .and(estimate)
        .fold(0.0, |acc, &a, &b| acc + (a - b) * (a - b));
    let norm: f32 = target.iter().map(|v| v * v).sum();
    (diff / norm.max(f32::MIN_POSITIVE)).sqrt()
}
