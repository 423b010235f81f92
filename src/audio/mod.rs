pub mod decoder;
pub mod resample;
pub mod trim;

use std::path::Path;

use anyhow::{ensure, Result};
use tracing::info;

use crate::types::AudioData;

/// Decodes `path`, cuts it to the requested window and resamples it to
/// `target_rate`.
pub fn load_clip(
    path: &Path,
    start_seconds: Option<f64>,
    end_seconds: Option<f64>,
    target_rate: u32,
) -> Result<AudioData> {
    let decoded = decoder::decode_audio(path)?;
    let trimmed = if start_seconds.is_some() || end_seconds.is_some() {
        trim::trim_segment(&decoded, start_seconds, end_seconds)
    } else {
        decoded
    };
    ensure!(
        !trimmed.samples.is_empty(),
        "No audio samples in {} for the requested range",
        path.display()
    );
    let audio = resample::resample_to(trimmed, target_rate)?;
    info!(
        path = %path.display(),
        sample_rate = audio.sample_rate,
        seconds = audio.duration_secs(),
        "audio loaded"
    );
    Ok(audio)
}
