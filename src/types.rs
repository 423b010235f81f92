//! Core types flowing through the feature pipeline

use ndarray::{Array1, Array2};

use crate::error::{PipelineError, Result};

/// Raw audio data representation (mono, f32 samples)
#[derive(Debug, Clone)]
pub struct AudioData {
    /// Audio samples, normalized to [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate in Hz (e.g., 22050)
    pub sample_rate: u32,
}

impl AudioData {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// A numeric buffer handed between stages: a waveform or a 2-D feature matrix.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureArray {
    Signal(Array1<f32>),
    Matrix(Array2<f32>),
}

impl FeatureArray {
    pub fn shape(&self) -> Vec<usize> {
        match self {
            FeatureArray::Signal(signal) => vec![signal.len()],
            FeatureArray::Matrix(matrix) => matrix.shape().to_vec(),
        }
    }

    /// Short human-readable description used in shape errors and logs.
    pub fn describe(&self) -> String {
        match self {
            FeatureArray::Signal(signal) => format!("signal of {} samples", signal.len()),
            FeatureArray::Matrix(matrix) => {
                format!("matrix of shape ({}, {})", matrix.nrows(), matrix.ncols())
            }
        }
    }

    pub fn into_matrix(self, context: &str) -> Result<Array2<f32>> {
        match self {
            FeatureArray::Matrix(matrix) => Ok(matrix),
            other => Err(PipelineError::shape(context, "a 2-D matrix", other.describe())),
        }
    }

    pub fn into_signal(self, context: &str) -> Result<Array1<f32>> {
        match self {
            FeatureArray::Signal(signal) => Ok(signal),
            other => Err(PipelineError::shape(context, "a 1-D signal", other.describe())),
        }
    }
}

impl From<Array1<f32>> for FeatureArray {
    fn from(signal: Array1<f32>) -> Self {
        FeatureArray::Signal(signal)
    }
}

impl From<Array2<f32>> for FeatureArray {
    fn from(matrix: Array2<f32>) -> Self {
        FeatureArray::Matrix(matrix)
    }
}

impl From<AudioData> for FeatureArray {
    fn from(audio: AudioData) -> Self {
        FeatureArray::Signal(Array1::from_vec(audio.samples))
    }
}

/// Input or output of a stage: one array, or an ordered sequence of arrays.
#[derive(Debug, Clone, PartialEq)]
pub enum StageData {
    One(FeatureArray),
    Many(Vec<FeatureArray>),
}

impl StageData {
    /// Wraps a collection of waveforms, the usual input of the first stage.
    pub fn signals<I>(signals: I) -> Self
    where
        I: IntoIterator<Item = Vec<f32>>,
    {
        StageData::Many(
            signals
                .into_iter()
                .map(|samples| FeatureArray::Signal(Array1::from_vec(samples)))
                .collect(),
        )
    }

    pub fn describe(&self) -> String {
        match self {
            StageData::One(array) => array.describe(),
            StageData::Many(items) => match items.first() {
                Some(first) => format!("sequence of {} items (first: {})", items.len(), first.describe()),
                None => "empty sequence".to_string(),
            },
        }
    }

    pub fn into_one(self, context: &str) -> Result<FeatureArray> {
        match self {
            StageData::One(array) => Ok(array),
            other => Err(PipelineError::shape(context, "a single array", other.describe())),
        }
    }

    pub fn into_many(self, context: &str) -> Result<Vec<FeatureArray>> {
        match self {
            StageData::Many(items) => Ok(items),
            other => Err(PipelineError::shape(context, "a sequence of arrays", other.describe())),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            StageData::One(_) => 1,
            StageData::Many(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, StageData::Many(items) if items.is_empty())
    }
}

impl From<FeatureArray> for StageData {
    fn from(array: FeatureArray) -> Self {
        StageData::One(array)
    }
}

impl From<Vec<FeatureArray>> for StageData {
    fn from(items: Vec<FeatureArray>) -> Self {
        StageData::Many(items)
    }
}

impl From<Array2<f32>> for StageData {
    fn from(matrix: Array2<f32>) -> Self {
        StageData::One(FeatureArray::Matrix(matrix))
    }
}

impl From<AudioData> for StageData {
    fn from(audio: AudioData) -> Self {
        StageData::Many(vec![audio.into()])
    }
}
