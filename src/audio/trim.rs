use crate::types::AudioData;

/// Cuts `audio` down to `[start, end)` seconds. Bounds past the end of the
/// clip are clamped, so the result may be empty.
pub fn trim_segment(audio: &AudioData, start_seconds: Option<f64>, end_seconds: Option<f64>) -> AudioData {
    let sr = audio.sample_rate as f64;
    let total = audio.samples.len();

    let start = start_seconds
        .map_or(0, |s| (s * sr).floor().max(0.0) as usize)
        .min(total);
    let end = end_seconds
        .map_or(total, |e| (e * sr).ceil().max(start as f64) as usize)
        .clamp(start, total);

    AudioData {
        samples: audio.samples[start..end].to_vec(),
        sample_rate: audio.sample_rate,
    }
}
