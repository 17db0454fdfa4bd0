//! Loads an audio file as mono samples at the pipeline's sample rate.

use anyhow::{Context, Result};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::resample::resample;

/// An opened file positioned on its first audio track.
struct TrackReader {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
}

impl TrackReader {
    fn open(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open audio file: {}", path.display()))?;
        let stream = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }
        let format = symphonia::default::get_probe()
            .format(&hint, stream, &FormatOptions::default(), &MetadataOptions::default())
            .with_context(|| format!("Unrecognised audio format: {}", path.display()))?
            .format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .context("No audio tracks found")?;
        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.context("Unknown sample rate")?;
        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .context("Failed to create audio decoder")?;

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
        })
    }

    /// Decodes the remaining packets of the track, averaging channels per frame.
    fn read_mono(&mut self) -> Result<Vec<f32>> {
        let mut mono = Vec::new();
        let mut buffer: Option<SampleBuffer<f32>> = None;

        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(e).context("Failed to read audio packet"),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(err)) => {
                    log::debug!("Skipping undecodable packet: {}", err);
                    continue;
                }
                Err(e) => return Err(e).context("Failed to decode audio packet"),
            };

            let spec = *decoded.spec();
            let channels = spec.channels.count().max(1);
            let buf = buffer.get_or_insert_with(|| SampleBuffer::new(decoded.capacity() as u64, spec));
            buf.copy_interleaved_ref(decoded);
            downmix(buf.samples(), channels, &mut mono);
        }

        Ok(mono)
    }
}

/// Appends the per-frame channel average of `interleaved` to `out`.
pub(crate) fn downmix(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels == 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    let scale = 1.0 / channels as f32;
    out.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() * scale),
    );
}

/// Decodes `path` to mono and resamples it to `target_rate`.
///
/// Files that decode to zero samples are rejected here rather than surfacing
/// later as an empty-input pipeline error.
pub fn decode_audio(path: &Path, target_rate: u32) -> Result<Vec<f32>> {
    let mut reader = TrackReader::open(path)?;
    let native = reader.read_mono()?;
    if native.is_empty() {
        anyhow::bail!("{} contains no audio samples", path.display());
    }

    log::info!(
        "Decoded {}: {} samples at {}Hz ({:.1}s)",
        path.display(),
        native.len(),
        reader.sample_rate,
        native.len() as f32 / reader.sample_rate as f32
    );

    resample(&native, reader.sample_rate, target_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_pcm16(path: &Path, channels: u16, sample_rate: u32, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn downmix_averages_frames() {
        let mut out = Vec::new();
        downmix(&[1.0, 0.0, 0.5, -0.5, 0.2, 0.4], 2, &mut out);
        assert_eq!(out.len(), 3);
        assert!((out[0] - 0.5).abs() < 1e-6);
        assert!(out[1].abs() < 1e-6);
        assert!((out[2] - 0.3).abs() < 1e-6);

        downmix(&[0.7], 1, &mut out);
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn stereo_file_is_downmixed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let frames: Vec<i16> = (0..200).flat_map(|_| [16384, 0]).collect();
        write_pcm16(&path, 2, 24000, &frames);

        let mono = decode_audio(&path, 24000).unwrap();
        assert_eq!(mono.len(), 200);
        assert!(mono.iter().all(|&s| (s - 0.25).abs() < 1e-3), "first sample {}", mono[0]);
    }

    #[test]
    fn file_is_brought_to_the_target_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("low.wav");
        let samples: Vec<i16> = (0..1600)
            .map(|i| ((i as f32 * 0.05).sin() * 8000.0) as i16)
            .collect();
        write_pcm16(&path, 1, 16000, &samples);

        let out = decode_audio(&path, 24000).unwrap();
        assert!(out.len().abs_diff(2400) <= 256, "got {} samples", out.len());
    }

    #[test]
    fn empty_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        write_pcm16(&path, 1, 24000, &[]);
        assert!(decode_audio(&path, 24000).is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(decode_audio(&dir.path().join("absent.wav"), 24000).is_err());
    }
}
