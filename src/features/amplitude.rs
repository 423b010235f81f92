use ndarray::{Array, Dimension};

use super::Transform;
use crate::error::{PipelineError, Result};
use crate::params::{ParamValue, Params};
use crate::types::{FeatureArray, StageData};

const ARGUMENTS: &[&str] = &["reference", "amin", "top_db"];

/// Reference power that maps to 0 dB.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reference {
    /// The peak value of each input array.
    Max,
    Value(f32),
}

/// Power-to-decibel conversion: `10 * log10(max(amin, S) / max(amin, ref))`,
/// optionally floored at `top_db` below the peak.
#[derive(Debug, Clone, PartialEq)]
pub struct LogAmplitude {
    pub reference: Reference,
    pub amin: f32,
    pub top_db: Option<f32>,
}

impl Default for LogAmplitude {
    fn default() -> Self {
        Self {
            reference: Reference::Max,
            amin: 1e-10,
            top_db: Some(80.0),
        }
    }
}

impl LogAmplitude {
    pub const NAME: &'static str = "log_amplitude";

    pub fn with_reference(mut self, reference: Reference) -> Self {
        self.reference = reference;
        self
    }

    pub fn with_top_db(mut self, top_db: Option<f32>) -> Self {
        self.top_db = top_db;
        self
    }

    pub fn to_db<D: Dimension>(&self, power: &Array<f32, D>) -> Array<f32, D> {
        if power.is_empty() {
            return power.clone();
        }
        let reference = match self.reference {
            Reference::Max => power.iter().fold(0.0_f32, |peak, v| peak.max(v.abs())),
            Reference::Value(value) => value,
        };
        let offset = 10.0 * reference.max(self.amin).log10();
        let mut db = power.mapv(|v| 10.0 * v.abs().max(self.amin).log10() - offset);
        if let Some(top_db) = self.top_db {
            let peak = db.iter().fold(f32::NEG_INFINITY, |peak, v| peak.max(*v));
            let floor = peak - top_db;
            db.mapv_inplace(|v| v.max(floor));
        }
        db
    }
}

impl Transform for LogAmplitude {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn accepted_arguments(&self) -> &'static [&'static str] {
        ARGUMENTS
    }

    fn arguments(&self) -> Params {
        let reference = match self.reference {
            Reference::Max => ParamValue::Text("max".into()),
            Reference::Value(value) => value.into(),
        };
        let mut arguments = Params::new();
        arguments.insert("reference".into(), reference);
        arguments.insert("amin".into(), self.amin.into());
        arguments.insert("top_db".into(), self.top_db.into());
        arguments
    }

    fn assign(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "reference" => {
                self.reference = match value {
                    ParamValue::Text(text) if text == "max" => Reference::Max,
                    ParamValue::Text(text) => {
                        return Err(PipelineError::invalid(
                            name,
                            format!("expected \"max\" or a number, got \"{text}\""),
                        ))
                    }
                    other => Reference::Value(other.as_f64(name)? as f32),
                }
            }
            "amin" => self.amin = value.as_f64(name)? as f32,
            "top_db" => self.top_db = value.as_optional_f64(name)?.map(|v| v as f32),
            other => return Err(PipelineError::argument_mismatch(Self::NAME, other, ARGUMENTS)),
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.amin.is_nan() || self.amin <= 0.0 {
            return Err(PipelineError::invalid("amin", "must be strictly positive"));
        }
        if let Reference::Value(value) = self.reference {
            if value.is_nan() || value <= 0.0 {
                return Err(PipelineError::invalid("reference", "must be strictly positive"));
            }
        }
        if let Some(top_db) = self.top_db {
            if top_db.is_nan() || top_db < 0.0 {
                return Err(PipelineError::invalid("top_db", "must be non-negative"));
            }
        }
        Ok(())
    }

    fn apply(&self, input: StageData) -> Result<StageData> {
        let output = match input.into_one(Self::NAME)? {
            FeatureArray::Signal(signal) => FeatureArray::Signal(self.to_db(&signal)),
            FeatureArray::Matrix(matrix) => FeatureArray::Matrix(self.to_db(&matrix)),
        };
        Ok(StageData::One(output))
    }

    fn box_clone(&self) -> Box<dyn Transform> {
        Box::new(self.clone())
    }
}
