use ndarray::Array2;
use std::f32::consts::TAU;

use voicebox::config::PadMode;
use voicebox::dsp::griffin_lim::{spectral_convergence, GriffinLim, PhaseInit};
use voicebox::dsp::stft::{magnitude, Stft};
use voicebox::{AudioParams, MelPipeline};

const SAMPLE_RATE: f32 = 16000.0;
const LEN: usize = 4000;
const SEEDS: [u64; 3] = [0, 1, 2];

fn signals() -> Vec<Vec<f32>> {
    let two_tone = (0..LEN)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE;
            0.5 * (TAU * 440.0 * t).sin() + 0.25 * (TAU * 1320.0 * t).sin()
        })
        .collect();
    let chirp = (0..LEN)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE;
            0.4 * (TAU * (200.0 + 1500.0 * t) * t).sin()
        })
        .collect();
    let tremolo = (0..LEN)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE;
            0.5 * (0.6 + 0.4 * (TAU * 3.0 * t).sin()) * (TAU * 700.0 * t).sin()
        })
        .collect();
    vec![two_tone, chirp, tremolo]
}

fn mean(values: &[f32]) -> f32 {
    values.iter().sum::<f32>() / values.len() as f32
}

#[test]
fn spectral_error_falls_with_iterations() {
    let stft = Stft::new(512, 128, 512, PadMode::Reflect).unwrap();
    let targets: Vec<Array2<f32>> = signals()
        .iter()
        .map(|wav| magnitude(&stft.forward(wav).unwrap()))
        .collect();

    let average_error = |iters: usize| {
        let mut errors = Vec::new();
        for target in &targets {
            for seed in SEEDS {
                let wav = GriffinLim::new(&stft, iters)
                    .with_phase_init(PhaseInit::Random { seed })
                    .reconstruct(target)
                    .unwrap();
                let achieved = magnitude(&stft.forward(&wav).unwrap());
                errors.push(spectral_convergence(target, &achieved));
            }
        }
        mean(&errors)
    };

    let e1 = average_error(1);
    let e10 = average_error(10);
    let e100 = average_error(100);
    assert!(e10 < e1, "10 iterations: {} vs 1 iteration: {}", e10, e1);
    assert!(e100 < e10, "100 iterations: {} vs 10 iterations: {}", e100, e10);
}

#[test]
fn reanalyzed_mel_error_falls_with_iterations() {
    let base = AudioParams {
        sample_rate: 16000,
        n_fft: 512,
        num_mels: 40,
        hop_size: 128,
        win_size: 512,
        fmax: 8000.0,
        ..AudioParams::default()
    };
    let reference = MelPipeline::new(base.clone()).unwrap();
    let targets: Vec<Array2<f32>> = signals()
        .iter()
        .map(|wav| reference.analyze(wav).unwrap().spectrogram)
        .collect();

    let average_error = |iters: usize| {
        let mut errors = Vec::new();
        for seed in SEEDS {
            let pipeline = MelPipeline::with_filterbank(
                AudioParams {
                    griffin_lim_iters: iters,
                    griffin_lim_seed: seed,
                    ..base.clone()
                },
                reference.filterbank().clone(),
            )
            .unwrap();
            for target in &targets {
                let wav = pipeline.synthesize(target.view()).unwrap();
                let again = pipeline.analyze(&wav).unwrap().spectrogram;
                let diff = (&again - target).mapv(f32::abs);
                errors.push(diff.mean().unwrap_or(0.0));
            }
        }
        mean(&errors)
    };

    let e1 = average_error(1);
    let e100 = average_error(100);
    assert!(e100 < e1, "100 iterations: {} vs 1 iteration: {}", e100, e1);
}
