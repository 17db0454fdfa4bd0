use anyhow::{Context, Result};
use std::path::Path;

/// Writes mono samples as 16-bit PCM or 32-bit float WAV.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32, bits_per_sample: u16) -> Result<()> {
    let sample_format = match bits_per_sample {
        16 => hound::SampleFormat::Int,
        32 => hound::SampleFormat::Float,
        other => anyhow::bail!("Unsupported bits per sample: {} (use 16 or 32)", other),
    };
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample,
        sample_format,
    };

    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    let clipped = samples.iter().filter(|s| s.abs() > 1.0).count();
    if clipped > 0 {
        log::warn!("{} sample(s) exceed full scale and will be clipped", clipped);
    }

    for &s in samples {
        let s = s.clamp(-1.0, 1.0);
        match sample_format {
            hound::SampleFormat::Int => writer.write_sample((s * i16::MAX as f32).round() as i16)?,
            hound::SampleFormat::Float => writer.write_sample(s)?,
        }
    }
    writer.finalize().context("Failed to finalize WAV file")?;

    log::info!("Wrote {} samples to {}", samples.len(), path.display());
    Ok(())
}
