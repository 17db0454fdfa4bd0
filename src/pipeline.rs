//! Waveform <-> normalized mel spectrogram.
//!
//! Forward: pre-emphasis, STFT magnitude, mel projection, dB, normalization.
//! Inverse: denormalization, dB to magnitude, mel pseudo-inverse, power,
//! Griffin-Lim, de-emphasis. Both directions are pure functions of their input
//! and the [`AudioParams`] the pipeline was built from.

use ndarray::{Array2, ArrayView2};
use std::ops::ControlFlow;
use std::sync::Arc;

use crate::config::AudioParams;
use crate::dsp::emphasis::{deemphasis, preemphasis};
use crate::dsp::griffin_lim::{GriffinLim, PhaseInit};
use crate::dsp::mel::MelFilterbank;
use crate::dsp::normalize::{Normalizer, RangeAnomaly};
use crate::dsp::stft::{magnitude, Stft};
use crate::error::{PipelineError, Result};

/// Output of the forward path, laid out as (frequency bin, time frame).
#[derive(Debug, Clone)]
pub struct MelAnalysis {
    pub spectrogram: Array2<f32>,
    /// Set when normalization ran without clipping and produced out-of-range values.
    pub anomaly: Option<RangeAnomaly>,
}

impl MelAnalysis {
    pub fn num_bins(&self) -> usize {
        self.spectrogram.nrows()
    }

    pub fn num_frames(&self) -> usize {
        self.spectrogram.ncols()
    }

    /// Rejects the analysis if any value fell outside the normalized range.
    pub fn strict(self) -> Result<Array2<f32>> {
        match self.anomaly {
            Some(anomaly) => Err(PipelineError::OutOfRange(anomaly)),
            None => Ok(self.spectrogram),
        }
    }
}

pub struct MelPipeline {
    params: AudioParams,
    stft: Stft,
    mel: Arc<MelFilterbank>,
    normalizer: Normalizer,
}

impl MelPipeline {
    pub fn new(params: AudioParams) -> Result<Self> {
        params.validate()?;
        let mel = Arc::new(MelFilterbank::from_params(&params)?);
        Self::with_filterbank(params, mel)
    }

    /// Reuses an existing filterbank, which must match `params`.
    pub fn with_filterbank(params: AudioParams, mel: Arc<MelFilterbank>) -> Result<Self> {
        params.validate()?;
        if mel.num_mels() != params.num_mels {
            return Err(PipelineError::DimensionMismatch {
                what: "filterbank mel bins",
                expected: params.num_mels,
                got: mel.num_mels(),
            });
        }
        if mel.num_freq() != params.num_freq() {
            return Err(PipelineError::DimensionMismatch {
                what: "filterbank frequency bins",
                expected: params.num_freq(),
                got: mel.num_freq(),
            });
        }

        let stft = Stft::from_params(&params)?;
        let normalizer = Normalizer::from_params(&params);
        Ok(Self {
            params,
            stft,
            mel,
            normalizer,
        })
    }

    /// Same configuration with a different Griffin-Lim seed, sharing the filterbank.
    pub fn with_seed(&self, seed: u64) -> Self {
        Self {
            params: AudioParams {
                griffin_lim_seed: seed,
                ..self.params.clone()
            },
            stft: self.stft.clone(),
            mel: Arc::clone(&self.mel),
            normalizer: self.normalizer,
        }
    }

    pub fn params(&self) -> &AudioParams {
        &self.params
    }

    pub fn sample_rate(&self) -> u32 {
        self.params.sample_rate
    }

    pub fn filterbank(&self) -> &Arc<MelFilterbank> {
        &self.mel
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Frames produced for a waveform of `num_samples`: `1 + num_samples / hop_size`.
    pub fn num_frames(&self, num_samples: usize) -> usize {
        self.stft.num_frames(num_samples)
    }

    /// Waveform to (num_mels, frames) spectrogram in dB or normalized units.
    pub fn analyze(&self, wav: &[f32]) -> Result<MelAnalysis> {
        let linear = self.linear_magnitude(wav)?;
        let mel = self.mel.project(&linear)?;
        Ok(self.encode(mel))
    }

    /// Waveform to (n_fft / 2 + 1, frames) spectrogram without the mel projection.
    pub fn analyze_linear(&self, wav: &[f32]) -> Result<MelAnalysis> {
        let linear = self.linear_magnitude(wav)?;
        Ok(self.encode(linear))
    }

    pub fn synthesize(&self, mel: ArrayView2<'_, f32>) -> Result<Vec<f32>> {
        self.synthesize_with(mel, |_, _| ControlFlow::Continue(()))
    }

    /// Like [`MelPipeline::synthesize`], reporting each Griffin-Lim iteration to `on_iter`.
    pub fn synthesize_with<F>(&self, mel: ArrayView2<'_, f32>, on_iter: F) -> Result<Vec<f32>>
    where
        F: FnMut(usize, usize) -> ControlFlow<()>,
    {
        let mel = self.decode(mel, "mel bins", self.params.num_mels)?;
        let linear = self.mel.invert(&mel)?;
        self.reconstruct(linear, on_iter)
    }

    pub fn synthesize_linear(&self, spec: ArrayView2<'_, f32>) -> Result<Vec<f32>> {
        self.synthesize_linear_with(spec, |_, _| ControlFlow::Continue(()))
    }

    pub fn synthesize_linear_with<F>(&self, spec: ArrayView2<'_, f32>, on_iter: F) -> Result<Vec<f32>>
    where
        F: FnMut(usize, usize) -> ControlFlow<()>,
    {
        let linear = self.decode(spec, "linear frequency bins", self.params.num_freq())?;
        self.reconstruct(linear, on_iter)
    }

    fn linear_magnitude(&self, wav: &[f32]) -> Result<Array2<f32>> {
        if wav.is_empty() {
            return Err(PipelineError::EmptyInput);
        }
        if let Some(index) = wav.iter().position(|s| !s.is_finite()) {
            return Err(PipelineError::NonFiniteInput { index });
        }

        let spec = if self.params.preemphasize {
            self.stft.forward(&preemphasis(wav, self.params.preemphasis))?
        } else {
            self.stft.forward(wav)?
        };

        log::debug!(
            "STFT: {} samples -> {} bins x {} frames",
            wav.len(),
            spec.nrows(),
            spec.ncols()
        );
        Ok(magnitude(&spec))
    }

    fn encode(&self, magnitude: Array2<f32>) -> MelAnalysis {
        let mut spectrogram = magnitude.mapv(|m| self.normalizer.amp_to_db(m));
        let anomaly = if self.params.signal_normalization {
            self.normalizer.normalize(&mut spectrogram)
        } else {
            None
        };
        if let Some(ref anomaly) = anomaly {
            log::warn!("Normalization without clipping: {}", anomaly);
        }
        MelAnalysis {
            spectrogram,
            anomaly,
        }
    }

    /// Stored values back to linear magnitudes.
    fn decode(&self, values: ArrayView2<'_, f32>, what: &'static str, rows: usize) -> Result<Array2<f32>> {
        if values.nrows() != rows {
            return Err(PipelineError::DimensionMismatch {
                what,
                expected: rows,
                got: values.nrows(),
            });
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(PipelineError::NonFiniteInput { index });
        }

        let db = if self.params.signal_normalization {
            if !self.params.allow_clipping_in_normalization {
                if let Some(anomaly) = self.normalizer.check_range(values) {
                    log::warn!("Denormalizing out-of-range input: {}", anomaly);
                }
            }
            self.normalizer.denormalize(values)
        } else {
            values.to_owned()
        };
        Ok(db.mapv(|v| self.normalizer.db_to_amp(v)))
    }

    fn reconstruct<F>(&self, mut linear: Array2<f32>, on_iter: F) -> Result<Vec<f32>>
    where
        F: FnMut(usize, usize) -> ControlFlow<()>,
    {
        let power = self.params.power;
        linear.mapv_inplace(|v| v.powf(power));

        let wav = GriffinLim::new(&self.stft, self.params.griffin_lim_iters)
            .with_phase_init(PhaseInit::Random {
                seed: self.params.griffin_lim_seed,
            })
            .reconstruct_with(&linear, on_iter)?;

        log::debug!("Synthesized {} samples from {} frames", wav.len(), linear.ncols());

        if self.params.preemphasize {
            Ok(deemphasis(&wav, self.params.preemphasis))
        } else {
            Ok(wav)
        }
    }
}
