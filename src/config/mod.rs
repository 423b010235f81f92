//! JSON pipeline specifications.

use std::fs;
use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::cluster::{Estimator, MiniBatchKMeans};
use crate::features::{LogAmplitude, MelSpectrogram, Transpose, VerticalStack};
use crate::params::{params, ParamValue, Params};
use crate::pipeline::{FunctionStage, Pipeline};

const DEFAULT_ESTIMATOR_NAME: &str = "kmeans";

/// One transform stage as written in a pipeline spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepSpec {
    pub name: String,
    pub function: String,
    #[serde(default, alias = "iterate")]
    pub per_item: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub parallel: bool,
    #[serde(default)]
    pub arguments: Params,
}

impl StepSpec {
    fn build(&self) -> crate::Result<FunctionStage> {
        FunctionStage::from_arguments(&self.function, self.per_item, &self.arguments)
            .map(|stage| stage.with_parallelism(self.parallel))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EstimatorSpec {
    #[serde(default = "default_estimator_name")]
    pub name: String,
    #[serde(default)]
    pub arguments: Params,
}

impl Default for EstimatorSpec {
    fn default() -> Self {
        Self {
            name: default_estimator_name(),
            arguments: Params::new(),
        }
    }
}

/// Serializable description of a pipeline ending in [`MiniBatchKMeans`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineSpec {
    #[serde(default)]
    pub steps: Vec<StepSpec>,
    #[serde(default)]
    pub estimator: EstimatorSpec,
}

impl PipelineSpec {
    /// Mel spectrogram, log scaling and transpose per clip, then row-wise
    /// stacking of all clips' frames into one k-means input.
    pub fn mel_kmeans(sample_rate: u32, n_clusters: usize) -> Self {
        let mel = FunctionStage::per_item(MelSpectrogram::new(sample_rate));
        let log = FunctionStage::per_item(LogAmplitude::default());
        let transpose = FunctionStage::per_item(Transpose);
        let stack = FunctionStage::whole(VerticalStack);
        Self {
            steps: vec![
                step_spec("mel", &mel),
                step_spec("log", &log),
                step_spec("transpose", &transpose),
                step_spec("stack", &stack),
            ],
            estimator: EstimatorSpec {
                name: default_estimator_name(),
                arguments: params([("n_clusters", n_clusters)]),
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.steps.is_empty(),
            "Pipeline must contain at least one transform step"
        );
        for (idx, step) in self.steps.iter().enumerate() {
            ensure!(
                !step.name.trim().is_empty(),
                "Pipeline step {} must have a name",
                idx
            );
            ensure!(
                !step.function.trim().is_empty(),
                "Pipeline step {} ({}) must name a function",
                idx,
                step.name
            );
        }
        Ok(())
    }

    /// Resolves every step and the estimator, failing on the first argument
    /// a function does not accept.
    pub fn build(&self) -> crate::Result<Pipeline<MiniBatchKMeans>> {
        let steps = self.build_steps()?;
        let mut estimator = MiniBatchKMeans::default();
        estimator.set_params(&self.estimator.arguments)?;
        Pipeline::new(steps, self.estimator.name.clone(), estimator)
    }

    pub(crate) fn build_steps(&self) -> crate::Result<Vec<(String, FunctionStage)>> {
        self.steps
            .iter()
            .map(|step| Ok((step.name.clone(), step.build()?)))
            .collect()
    }

    /// Captures the current configuration of `pipeline`; learned state is not included.
    pub fn from_pipeline(pipeline: &Pipeline<MiniBatchKMeans>) -> Self {
        Self {
            steps: pipeline
                .steps()
                .map(|(name, stage)| step_spec(name, stage))
                .collect(),
            estimator: EstimatorSpec {
                name: pipeline.estimator_name().to_string(),
                arguments: pipeline.estimator().get_params(),
            },
        }
    }

    /// Sample rate the first mel spectrogram step expects, if there is one.
    pub fn input_sample_rate(&self) -> Result<Option<u32>> {
        let Some(step) = self
            .steps
            .iter()
            .find(|step| step.function == MelSpectrogram::NAME)
        else {
            return Ok(None);
        };
        match step.arguments.get("sample_rate") {
            Some(value) => {
                let rate = value
                    .as_u32("sample_rate")
                    .with_context(|| format!("Invalid sample_rate in step {}", step.name))?;
                Ok(Some(rate))
            }
            None => Ok(Some(MelSpectrogram::default().sample_rate)),
        }
    }
}

fn step_spec(name: &str, stage: &FunctionStage) -> StepSpec {
    StepSpec {
        name: name.to_string(),
        function: stage.function_name().to_string(),
        per_item: stage.is_per_item(),
        parallel: stage.is_parallel(),
        arguments: stage.arguments(),
    }
}

fn default_estimator_name() -> String {
    DEFAULT_ESTIMATOR_NAME.to_string()
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Loads a spec from a file or inline JSON. With neither, falls back to
/// [`PipelineSpec::mel_kmeans`] at `default_sample_rate`.
pub fn load_spec(
    path: Option<&Path>,
    json: Option<&str>,
    default_sample_rate: u32,
) -> Result<PipelineSpec> {
    let spec = if let Some(p) = path {
        let data = fs::read_to_string(p)
            .with_context(|| format!("Failed to read pipeline file {:?}", p))?;
        parse_spec(&data)?
    } else if let Some(raw) = json {
        parse_spec(raw)?
    } else {
        PipelineSpec::mel_kmeans(default_sample_rate, 8)
    };
    spec.validate().context("Pipeline validation failed")?;
    Ok(spec)
}

pub fn parse_spec(raw: &str) -> Result<PipelineSpec> {
    let spec: PipelineSpec = serde_json::from_str(raw).context("Failed to parse pipeline JSON")?;
    Ok(spec)
}

/// Overrides spec arguments with `step__argument=value` assignments, as
/// given on the command line.
pub fn apply_overrides(spec: &PipelineSpec, overrides: &[String]) -> Result<PipelineSpec> {
    if overrides.is_empty() {
        return Ok(spec.clone());
    }
    let mut pipeline = spec.build().context("Failed to build pipeline")?;
    let mut updates = Params::new();
    for raw in overrides {
        let (key, value) = raw
            .split_once('=')
            .with_context(|| format!("Override '{}' must look like step__argument=value", raw))?;
        updates.insert(key.trim().to_string(), parse_override_value(value.trim()));
    }
    pipeline
        .set_params(&updates)
        .context("Failed to apply parameter overrides")?;
    Ok(PipelineSpec::from_pipeline(&pipeline))
}

fn parse_override_value(raw: &str) -> ParamValue {
    serde_json::from_str(raw).unwrap_or_else(|_| ParamValue::Text(raw.to_string()))
}
