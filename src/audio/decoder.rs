use crate::types::AudioData;
use anyhow::{Context, Result};
use std::path::Path;
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Decodes the first audio track of `path` into mono f32 samples.
pub fn decode_audio<P: AsRef<Path>>(path: P) -> Result<AudioData> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("Failed to probe audio format")?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("No audio tracks found in file")?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .context("Sample rate not specified in audio file")?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Failed to create decoder")?;

    let mut samples = Vec::new();
    let mut skipped_packets = 0usize;
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(err) => return Err(err).context("Failed to read packet"),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => downmix_into(&decoded, &mut samples),
            Err(SymphoniaError::DecodeError(reason)) => {
                skipped_packets += 1;
                warn!(%reason, "skipping undecodable packet");
            }
            Err(err) => return Err(err).context("Failed to decode audio packet"),
        }
    }

    debug!(
        path = %path.display(),
        sample_rate,
        samples = samples.len(),
        skipped_packets,
        "decoded audio"
    );
    Ok(AudioData {
        samples,
        sample_rate,
    })
}

/// Averages all channels of `buffer` and appends the result to `out`.
fn downmix_into(buffer: &AudioBufferRef, out: &mut Vec<f32>) {
    let mut converted: AudioBuffer<f32> = buffer.make_equivalent();
    buffer.convert(&mut converted);

    let channels = converted.spec().channels.count();
    let frames = converted.frames();
    if channels == 1 {
        out.extend_from_slice(converted.chan(0));
        return;
    }
    out.reserve(frames);
    for frame in 0..frames {
        let sum: f32 = (0..channels).map(|ch| converted.chan(ch)[frame]).sum();
        out.push(sum / channels as f32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};
    use tempfile::tempdir;

    #[test]
    fn stereo_wav_is_averaged_to_mono() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for _ in 0..400 {
            writer.write_sample(16_384i16).unwrap();
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let audio = decode_audio(&path).unwrap();
        assert_eq!(audio.sample_rate, 8_000);
        assert_eq!(audio.samples.len(), 400);
        assert!(audio.samples.iter().all(|&s| (s - 0.25).abs() < 1e-3));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(decode_audio("/nonexistent/clip.wav").is_err());
    }
}
