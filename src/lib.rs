//! Mel-spectrogram analysis and Griffin-Lim synthesis.
//!
//! [`pipeline::MelPipeline`] turns a waveform into a normalized mel
//! spectrogram and back. [`project::Vocoder`] is the interface a front end
//! drives; [`project::GriffinLimProject`] implements it on top of the pipeline.

pub mod audio;
pub mod config;
pub mod dsp;
pub mod error;
pub mod pipeline;
pub mod project;

pub use config::AudioParams;
pub use error::{PipelineError, Result};
pub use pipeline::{MelAnalysis, MelPipeline};
pub use project::{GriffinLimProject, SpecDisplay, Vocoder};
