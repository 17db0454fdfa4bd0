mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::ops::ControlFlow;
use std::path::Path;

use cli::Cli;
use voicebox::audio::{decode, wav};
use voicebox::config::{self, Config};
use voicebox::{GriffinLimProject, MelPipeline, PipelineError, SpecDisplay, Vocoder};

/// JSON layout written by `--spec-out`.
#[derive(Serialize)]
struct SpectrogramDump {
    sample_rate: u32,
    hop_size: usize,
    num_frames: usize,
    num_bins: usize,
    /// One row per frame
    data: Vec<Vec<f32>>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    // Explicit --config path, or auto-detect voicebox.toml / global config
    let mut cfg = match cli.config.clone().or_else(config::discover_config) {
        Some(path) => {
            let cfg = config::load_config(&path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            log::info!("Loaded config from {}", path.display());
            cfg
        }
        None => Config::default(),
    };
    apply_overrides(&cli, &mut cfg);

    if cli.print_config {
        print!("{}", toml::to_string(&cfg).context("Failed to serialize config")?);
        return Ok(());
    }

    let input = cli.input.as_ref().context("Input audio file is required")?;
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }

    log::info!("voicebox - Griffin-Lim vocoder");
    log::info!("Input: {}", input.display());
    log::info!("Output: {}", cli.output.display());

    let pipeline = MelPipeline::new(cfg.audio.clone()).context("Invalid audio configuration")?;
    let sample_rate = pipeline.sample_rate();
    let iters = pipeline.params().griffin_lim_iters;
    log::info!(
        "Pipeline: {}Hz, n_fft={}, hop={}, win={}, {} mels, {} Griffin-Lim iterations",
        sample_rate,
        cfg.audio.n_fft,
        cfg.audio.hop_size,
        cfg.audio.win_size,
        cfg.audio.num_mels,
        iters
    );

    // 1. Decode at the pipeline rate
    let samples = decode::decode_audio(input, sample_rate)?;

    // 2. Analyze, plus the optional Griffin-Lim comparison on a second seed
    let mut project = GriffinLimProject::new(pipeline).with_comparison(cli.gl_output.is_some());
    if cli.gl_output.is_some() {
        log::info!("Rendering Griffin-Lim comparison...");
    }
    let source = project.source_action(&samples)?;
    if let Some(mel) = project.source_spec() {
        log::info!("Mel spectrogram: {} mels x {} frames", mel.nrows(), mel.ncols());
    }
    if cli.strict {
        if let Some(anomaly) = source.anomaly {
            return Err(PipelineError::OutOfRange(anomaly).into());
        }
    }

    if let Some(ref path) = cli.spec_out {
        write_spec_json(path, &source.spec, sample_rate, cfg.audio.hop_size)?;
    }
    if let (Some(gl_path), Some(gl_wav)) = (&cli.gl_output, &source.gl_wav) {
        wav::write_wav(gl_path, gl_wav, sample_rate, cfg.output.bits_per_sample)?;
    }

    // 3. Vocode
    let pb = ProgressBar::new(iters as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} iterations ({eta} remaining)")
            .context("Invalid progress bar template")?
            .progress_chars("=>-"),
    );
    let vocoded = project.vocode_with(|completed, _| {
        pb.set_position(completed as u64);
        ControlFlow::Continue(())
    })?;
    pb.finish_with_message("Vocoding complete");

    wav::write_wav(&cli.output, &vocoded.wav, sample_rate, cfg.output.bits_per_sample)?;

    log::info!("Done! Output: {}", cli.output.display());
    Ok(())
}

/// Command-line flags win over file values.
fn apply_overrides(cli: &Cli, cfg: &mut Config) {
    if let Some(iters) = cli.iters {
        cfg.audio.griffin_lim_iters = iters;
    }
    if let Some(power) = cli.power {
        cfg.audio.power = power;
    }
    if let Some(seed) = cli.seed {
        cfg.audio.griffin_lim_seed = seed;
    }
    if cli.no_normalize {
        cfg.audio.signal_normalization = false;
    }
    if cli.no_clip {
        cfg.audio.allow_clipping_in_normalization = false;
    }
}

fn write_spec_json(path: &Path, display: &SpecDisplay, sample_rate: u32, hop_size: usize) -> Result<()> {
    let Some(spec) = display.as_array() else {
        log::warn!("No spectrogram to write");
        return Ok(());
    };
    let data = spec.rows().into_iter().map(|row| row.to_vec()).collect();
    let dump = SpectrogramDump {
        sample_rate,
        hop_size,
        num_frames: spec.nrows(),
        num_bins: spec.ncols(),
        data,
    };
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer(std::io::BufWriter::new(file), &dump)
        .context("Failed to write spectrogram JSON")?;
    log::info!("Wrote spectrogram to {}", path.display());
    Ok(())
}
