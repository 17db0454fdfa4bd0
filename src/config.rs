use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};

/// Top-level layout of `voicebox.toml`.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub audio: AudioParams,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    /// 16 writes integer PCM, 32 writes IEEE float.
    #[serde(default = "default_bits_per_sample")]
    pub bits_per_sample: u16,
}

/// How the signal is extended by `n_fft / 2` samples on each side before framing.
///
/// `Reflect` is the default and matches the reference analysis this pipeline
/// reproduces. `Constant` zero-pads both edges, the reading where the final
/// partial frame is filled with zeros.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PadMode {
    Reflect,
    Constant,
}

/// Signal-processing parameters shared by the forward and inverse paths.
///
/// Analysis and synthesis of the same signal must use identical values.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AudioParams {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_n_fft")]
    pub n_fft: usize,
    #[serde(default = "default_num_mels")]
    pub num_mels: usize,
    #[serde(default = "default_hop_size")]
    pub hop_size: usize,
    #[serde(default = "default_win_size")]
    pub win_size: usize,
    #[serde(default = "default_fmin")]
    pub fmin: f32,
    #[serde(default = "default_fmax")]
    pub fmax: f32,
    #[serde(default = "default_min_level_db")]
    pub min_level_db: f32,
    #[serde(default = "default_ref_level_db")]
    pub ref_level_db: f32,
    #[serde(default = "default_max_abs_value")]
    pub max_abs_value: f32,
    #[serde(default = "default_preemphasis")]
    pub preemphasis: f32,
    #[serde(default = "default_true")]
    pub preemphasize: bool,
    #[serde(default = "default_true")]
    pub symmetric_mels: bool,
    #[serde(default = "default_true")]
    pub signal_normalization: bool,
    #[serde(default = "default_true")]
    pub allow_clipping_in_normalization: bool,
    /// Exponent applied to the linear magnitude before Griffin-Lim.
    #[serde(default = "default_power")]
    pub power: f32,
    #[serde(default = "default_griffin_lim_iters")]
    pub griffin_lim_iters: usize,
    #[serde(default = "default_griffin_lim_seed")]
    pub griffin_lim_seed: u64,
    #[serde(default = "default_pad_mode")]
    pub pad_mode: PadMode,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            bits_per_sample: default_bits_per_sample(),
        }
    }
}

impl Default for AudioParams {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            n_fft: default_n_fft(),
            num_mels: default_num_mels(),
            hop_size: default_hop_size(),
            win_size: default_win_size(),
            fmin: default_fmin(),
            fmax: default_fmax(),
            min_level_db: default_min_level_db(),
            ref_level_db: default_ref_level_db(),
            max_abs_value: default_max_abs_value(),
            preemphasis: default_preemphasis(),
            preemphasize: default_true(),
            symmetric_mels: default_true(),
            signal_normalization: default_true(),
            allow_clipping_in_normalization: default_true(),
            power: default_power(),
            griffin_lim_iters: default_griffin_lim_iters(),
            griffin_lim_seed: default_griffin_lim_seed(),
            pad_mode: default_pad_mode(),
        }
    }
}

fn default_bits_per_sample() -> u16 { 16 }
fn default_sample_rate() -> u32 { 24000 }
fn default_n_fft() -> usize { 2048 }
fn default_num_mels() -> usize { 80 }
fn default_hop_size() -> usize { 300 }
fn default_win_size() -> usize { 1200 }
fn default_fmin() -> f32 { 0.0 }
fn default_fmax() -> f32 { 12000.0 }
fn default_min_level_db() -> f32 { -100.0 }
fn default_ref_level_db() -> f32 { 20.0 }
fn default_max_abs_value() -> f32 { 4.0 }
fn default_preemphasis() -> f32 { 0.97 }
fn default_true() -> bool { true }
fn default_power() -> f32 { 1.2 }
fn default_griffin_lim_iters() -> usize { 100 }
fn default_griffin_lim_seed() -> u64 { 0 }
fn default_pad_mode() -> PadMode { PadMode::Reflect }

impl AudioParams {
    /// Number of non-redundant frequency bins produced by the STFT.
    pub fn num_freq(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Rejects parameter combinations that would only fail mid-computation.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(PipelineError::invalid("sample_rate", "must be positive"));
        }
        if self.n_fft < 2 {
            return Err(PipelineError::invalid("n_fft", format!("{} is too small", self.n_fft)));
        }
        if self.win_size == 0 || self.win_size > self.n_fft {
            return Err(PipelineError::invalid(
                "win_size",
                format!("{} must be in 1..={}", self.win_size, self.n_fft),
            ));
        }
        if self.hop_size == 0 || self.hop_size >= self.win_size {
            return Err(PipelineError::invalid(
                "hop_size",
                format!("{} must be positive and below win_size {}", self.hop_size, self.win_size),
            ));
        }
        if self.num_mels == 0 {
            return Err(PipelineError::invalid("num_mels", "must be positive"));
        }
        let nyquist = self.sample_rate as f32 / 2.0;
        if !(self.fmin >= 0.0) {
            return Err(PipelineError::invalid("fmin", format!("{} is negative", self.fmin)));
        }
        if !(self.fmax > self.fmin) {
            return Err(PipelineError::invalid(
                "fmax",
                format!("{} must exceed fmin {}", self.fmax, self.fmin),
            ));
        }
        if self.fmax > nyquist {
            return Err(PipelineError::invalid(
                "fmax",
                format!("{} Hz is beyond the Nyquist frequency {} Hz", self.fmax, nyquist),
            ));
        }
        if !(self.min_level_db < 0.0) {
            return Err(PipelineError::invalid("min_level_db", "must be negative"));
        }
        if !self.ref_level_db.is_finite() {
            return Err(PipelineError::invalid("ref_level_db", "must be finite"));
        }
        if !(self.max_abs_value > 0.0) || !self.max_abs_value.is_finite() {
            return Err(PipelineError::invalid("max_abs_value", "must be positive"));
        }
        if self.preemphasize && !(0.0..1.0).contains(&self.preemphasis) {
            return Err(PipelineError::invalid(
                "preemphasis",
                format!("{} must be in [0, 1)", self.preemphasis),
            ));
        }
        if !(self.power > 0.0) || !self.power.is_finite() {
            return Err(PipelineError::invalid("power", "must be positive"));
        }
        if self.griffin_lim_iters < 1 {
            return Err(PipelineError::invalid("griffin_lim_iters", "at least one iteration is required"));
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Finds a config file: `./voicebox.toml`, then the XDG-style path, then the platform config dir.
pub fn discover_config() -> Option<PathBuf> {
    let local = PathBuf::from("voicebox.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("voicebox").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("voicebox").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        AudioParams::default().validate().unwrap();
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [audio]
            griffin_lim_iters = 30
            pad_mode = "constant"

            [output]
            bits_per_sample = 32
            "#,
        )
        .unwrap();
        assert_eq!(cfg.audio.griffin_lim_iters, 30);
        assert_eq!(cfg.audio.pad_mode, PadMode::Constant);
        assert_eq!(cfg.audio.sample_rate, 24000);
        assert_eq!(cfg.audio.num_mels, 80);
        assert_eq!(cfg.output.bits_per_sample, 32);
    }

    #[test]
    fn rejects_fmax_beyond_nyquist() {
        let params = AudioParams { fmax: 13000.0, ..Default::default() };
        match params.validate() {
            Err(PipelineError::InvalidParameter { name, .. }) => assert_eq!(name, "fmax"),
            other => panic!("expected fmax rejection, got {:?}", other),
        }
    }

    #[test]
    fn rejects_hop_not_below_window() {
        let params = AudioParams { hop_size: 1200, ..Default::default() };
        assert!(params.validate().is_err());
        let params = AudioParams { hop_size: 0, ..Default::default() };
        assert!(params.validate().is_err());
    }

    #[test]
    fn rejects_zero_iterations_and_bad_levels() {
        let params = AudioParams { griffin_lim_iters: 0, ..Default::default() };
        assert!(params.validate().is_err());
        let params = AudioParams { min_level_db: 0.0, ..Default::default() };
        assert!(params.validate().is_err());
        let params = AudioParams { win_size: 4096, ..Default::default() };
        assert!(params.validate().is_err());
        let params = AudioParams { power: 0.0, ..Default::default() };
        assert!(params.validate().is_err());
    }

    #[test]
    fn preemphasis_coefficient_ignored_when_disabled() {
        let params = AudioParams { preemphasis: 1.5, preemphasize: false, ..Default::default() };
        assert!(params.validate().is_ok());
    }

    #[test]
    fn params_serialize_back_to_toml() {
        let text = toml::to_string(&Config::default()).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.audio, AudioParams::default());
    }
}
