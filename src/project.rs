//! Contract between a front end and a vocoder back end.
//!
//! A front end loads a source waveform, asks the vocoder for spectrograms to
//! show, and later asks it to vocode. Spectrograms crossing this boundary are
//! in (time, frequency) order; the pipeline itself works in (frequency, time).

use ndarray::Array2;
use std::ops::ControlFlow;

use crate::dsp::normalize::RangeAnomaly;
use crate::error::{PipelineError, Result};
use crate::pipeline::MelPipeline;

/// A spectrogram to show, or nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SpecDisplay {
    #[default]
    Empty,
    /// (time frame, frequency bin)
    Spectrogram(Array2<f32>),
}

impl SpecDisplay {
    /// Transposes a (frequency, time) spectrogram for display.
    pub fn from_frequency_major(spec: &Array2<f32>) -> Self {
        SpecDisplay::Spectrogram(spec.t().as_standard_layout().into_owned())
    }

    pub fn as_array(&self) -> Option<&Array2<f32>> {
        match self {
            SpecDisplay::Empty => None,
            SpecDisplay::Spectrogram(spec) => Some(spec),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, SpecDisplay::Empty)
    }
}

/// Result of loading a source waveform.
#[derive(Debug, Clone, Default)]
pub struct SourceOutput {
    pub spec: SpecDisplay,
    /// Set when the source analysis produced values outside the normalized range.
    pub anomaly: Option<RangeAnomaly>,
    /// Griffin-Lim rendition of the source, when the comparison is enabled.
    /// Drawn with the next seed, so it is a second reconstruction rather than
    /// a copy of what [`Vocoder::vocode_action`] returns.
    pub gl_wav: Option<Vec<f32>>,
    pub gl_spec: SpecDisplay,
}

#[derive(Debug, Clone)]
pub struct VocodeOutput {
    pub wav: Vec<f32>,
    pub spec: SpecDisplay,
}

pub trait Vocoder {
    /// Rate of every waveform passed in or returned.
    fn sample_rate(&self) -> u32;

    fn source_action(&mut self, wav: &[f32]) -> Result<SourceOutput>;

    fn vocode_action(&mut self) -> Result<VocodeOutput>;
}

/// Vocoder that inverts mel spectrograms with Griffin-Lim.
pub struct GriffinLimProject {
    pipeline: MelPipeline,
    source_spec: Option<Array2<f32>>,
    comparison: Option<MelPipeline>,
}

impl GriffinLimProject {
    pub fn new(pipeline: MelPipeline) -> Self {
        Self {
            pipeline,
            source_spec: None,
            comparison: None,
        }
    }

    /// Also synthesize and re-analyze the source inside [`Vocoder::source_action`].
    pub fn with_comparison(mut self, compare: bool) -> Self {
        self.comparison = compare.then(|| {
            let seed = self.pipeline.params().griffin_lim_seed.wrapping_add(1);
            self.pipeline.with_seed(seed)
        });
        self
    }

    pub fn pipeline(&self) -> &MelPipeline {
        &self.pipeline
    }

    /// Cached source spectrogram in (mel, frame) order.
    pub fn source_spec(&self) -> Option<&Array2<f32>> {
        self.source_spec.as_ref()
    }

    /// Like [`Vocoder::vocode_action`], reporting each Griffin-Lim iteration to `on_iter`.
    pub fn vocode_with<F>(&self, on_iter: F) -> Result<VocodeOutput>
    where
        F: FnMut(usize, usize) -> ControlFlow<()>,
    {
        let source = self.source_spec.as_ref().ok_or(PipelineError::MissingSource)?;
        let (wav, spec) = resynthesize(&self.pipeline, source, on_iter)?;
        Ok(VocodeOutput { wav, spec })
    }
}

fn resynthesize<F>(pipeline: &MelPipeline, spec: &Array2<f32>, on_iter: F) -> Result<(Vec<f32>, SpecDisplay)>
where
    F: FnMut(usize, usize) -> ControlFlow<()>,
{
    let wav = pipeline.synthesize_with(spec.view(), on_iter)?;
    let reanalyzed = pipeline.analyze(&wav)?;
    Ok((wav, SpecDisplay::from_frequency_major(&reanalyzed.spectrogram)))
}

impl Vocoder for GriffinLimProject {
    fn sample_rate(&self) -> u32 {
        self.pipeline.sample_rate()
    }

    fn source_action(&mut self, wav: &[f32]) -> Result<SourceOutput> {
        let analysis = self.pipeline.analyze(wav)?;
        let spec = SpecDisplay::from_frequency_major(&analysis.spectrogram);

        let (gl_wav, gl_spec) = match &self.comparison {
            Some(pipeline) => {
                let (wav, spec) =
                    resynthesize(pipeline, &analysis.spectrogram, |_, _| ControlFlow::Continue(()))?;
                (Some(wav), spec)
            }
            None => (None, SpecDisplay::Empty),
        };

        self.source_spec = Some(analysis.spectrogram);
        Ok(SourceOutput {
            spec,
            anomaly: analysis.anomaly,
            gl_wav,
            gl_spec,
        })
    }

    fn vocode_action(&mut self) -> Result<VocodeOutput> {
        self.vocode_with(|_, _| ControlFlow::Continue(()))
    }
}
