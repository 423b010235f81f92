use aus::analysis;
use aus::analysis::mel::MelFilterbank;
use aus::spectrum;
use aus::WindowType;
use ndarray::{Array2, ArrayView1};

use super::Transform;
use crate::error::{PipelineError, Result};
use crate::params::{ParamValue, Params};
use crate::types::{FeatureArray, StageData};

pub(crate) const DEFAULT_SAMPLE_RATE: u32 = 22_050;
const DEFAULT_N_FFT: usize = 2048;
const DEFAULT_HOP_LENGTH: usize = 512;
const DEFAULT_N_MELS: usize = 128;

const ARGUMENTS: &[&str] = &["sample_rate", "n_fft", "hop_length", "n_mels", "fmin", "fmax"];

/// Power mel spectrogram of a single waveform, laid out as `(n_mels, frames)`.
#[derive(Debug, Clone, PartialEq)]
pub struct MelSpectrogram {
    pub sample_rate: u32,
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mels: usize,
    pub fmin: f64,
    /// Upper filterbank edge; `None` uses the Nyquist frequency.
    pub fmax: Option<f64>,
}

impl Default for MelSpectrogram {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            n_fft: DEFAULT_N_FFT,
            hop_length: DEFAULT_HOP_LENGTH,
            n_mels: DEFAULT_N_MELS,
            fmin: 0.0,
            fmax: None,
        }
    }
}

impl MelSpectrogram {
    pub const NAME: &'static str = "mel_spectrogram";

    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ..Self::default()
        }
    }

    pub fn with_n_fft(mut self, n_fft: usize) -> Self {
        self.n_fft = n_fft;
        self
    }

    pub fn with_hop_length(mut self, hop_length: usize) -> Self {
        self.hop_length = hop_length;
        self
    }

    pub fn with_n_mels(mut self, n_mels: usize) -> Self {
        self.n_mels = n_mels;
        self
    }

    pub fn with_frequency_range(mut self, fmin: f64, fmax: Option<f64>) -> Self {
        self.fmin = fmin;
        self.fmax = fmax;
        self
    }

    fn nyquist(&self) -> f64 {
        self.sample_rate as f64 / 2.0
    }

    fn upper_frequency(&self) -> f64 {
        self.fmax.unwrap_or_else(|| self.nyquist())
    }

    /// Computes the mel spectrogram of `signal`.
    pub fn compute(&self, signal: ArrayView1<f32>) -> Result<Array2<f32>> {
        self.validate()?;
        if signal.len() < self.n_fft {
            return Err(PipelineError::shape(
                Self::NAME,
                format!("a signal of at least {} samples (n_fft)", self.n_fft),
                format!("{} samples", signal.len()),
            ));
        }

        let audio_f64: Vec<f64> = signal.iter().map(|&s| s as f64).collect();
        let stft = spectrum::rstft(&audio_f64, self.n_fft, self.hop_length, WindowType::Hanning);
        let (magnitude, _) = spectrum::complex_to_polar_rstft(&stft);
        let power = analysis::make_power_spectrogram(&magnitude);

        let freqs = spectrum::rfftfreq(self.n_fft, self.sample_rate);
        let filterbank = MelFilterbank::new(
            self.fmin,
            self.upper_frequency(),
            self.n_mels,
            &freqs,
            true,
        );
        let mel = analysis::mel::make_mel_spectrogram(&power, &filterbank);
        bands_by_frames(&mel, self.n_mels)
    }
}

/// Converts frame-major filterbank output into a `(bands, frames)` matrix.
fn bands_by_frames(mel: &[Vec<f64>], n_mels: usize) -> Result<Array2<f32>> {
    if mel.is_empty() {
        return Err(PipelineError::shape(
            MelSpectrogram::NAME,
            "at least one analysis frame",
            "no frames",
        ));
    }
    if let Some((frame, row)) = mel.iter().enumerate().find(|(_, row)| row.len() != n_mels) {
        return Err(PipelineError::shape(
            MelSpectrogram::NAME,
            format!("{n_mels} mel bands per frame"),
            format!("{} bands in frame {frame}", row.len()),
        ));
    }
    Ok(Array2::from_shape_fn((n_mels, mel.len()), |(band, frame)| {
        mel[frame][band] as f32
    }))
}

impl Transform for MelSpectrogram {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn accepted_arguments(&self) -> &'static [&'static str] {
        ARGUMENTS
    }

    fn arguments(&self) -> Params {
        let mut arguments = Params::new();
        arguments.insert("sample_rate".into(), self.sample_rate.into());
        arguments.insert("n_fft".into(), self.n_fft.into());
        arguments.insert("hop_length".into(), self.hop_length.into());
        arguments.insert("n_mels".into(), self.n_mels.into());
        arguments.insert("fmin".into(), self.fmin.into());
        arguments.insert("fmax".into(), self.fmax.into());
        arguments
    }

    fn assign(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "sample_rate" => self.sample_rate = value.as_u32(name)?,
            "n_fft" => self.n_fft = value.as_usize(name)?,
            "hop_length" => self.hop_length = value.as_usize(name)?,
            "n_mels" => self.n_mels = value.as_usize(name)?,
            "fmin" => self.fmin = value.as_f64(name)?,
            "fmax" => self.fmax = value.as_optional_f64(name)?,
            other => return Err(PipelineError::argument_mismatch(Self::NAME, other, ARGUMENTS)),
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(PipelineError::invalid("sample_rate", "must be positive"));
        }
        if self.n_fft == 0 {
            return Err(PipelineError::invalid("n_fft", "must be positive"));
        }
        if self.hop_length == 0 {
            return Err(PipelineError::invalid("hop_length", "must be positive"));
        }
        if self.n_mels == 0 {
            return Err(PipelineError::invalid("n_mels", "must be positive"));
        }
        if !self.fmin.is_finite() || self.fmin < 0.0 {
            return Err(PipelineError::invalid("fmin", "must be a non-negative frequency"));
        }
        let upper = self.upper_frequency();
        if !upper.is_finite() || upper <= self.fmin || upper > self.nyquist() {
            return Err(PipelineError::invalid(
                "fmax",
                format!(
                    "must lie in ({}, {}] Hz, got {}",
                    self.fmin,
                    self.nyquist(),
                    upper
                ),
            ));
        }
        Ok(())
    }

    fn apply(&self, input: StageData) -> Result<StageData> {
        let signal = input.into_one(Self::NAME)?.into_signal(Self::NAME)?;
        let mel = self.compute(signal.view())?;
        Ok(StageData::One(FeatureArray::Matrix(mel)))
    }

    fn box_clone(&self) -> Box<dyn Transform> {
        Box::new(self.clone())
    }
}
