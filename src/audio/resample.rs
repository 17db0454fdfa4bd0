use anyhow::{Context, Result};
use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

/// Resamples mono audio from `from_rate` to `to_rate` with a windowed-sinc filter.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    if from_rate == 0 || to_rate == 0 {
        anyhow::bail!("Invalid sample rate conversion: {} -> {}", from_rate, to_rate);
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / from_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, samples.len(), 1)
        .context("Failed to create resampler")?;

    let input = vec![samples.to_vec()];
    let output = resampler
        .process(&input, None)
        .context("Resampling failed")?;

    log::info!("Resampled {}Hz -> {}Hz", from_rate, to_rate);
    Ok(output.into_iter().next().unwrap_or_default())
}
