//! Sequential pipeline driver: named stateless stages followed by a
//! trainable estimator.
//!
//! ```
//! use audiocluster::cluster::MiniBatchKMeans;
//! use audiocluster::features::{LogAmplitude, MelSpectrogram, Transpose, VerticalStack};
//! use audiocluster::pipeline::{FunctionStage, Pipeline};
//!
//! let pipeline = Pipeline::builder()
//!     .step("mel", FunctionStage::per_item(MelSpectrogram::new(22_050)))
//!     .step("log", FunctionStage::per_item(LogAmplitude::default()))
//!     .step("transpose", FunctionStage::per_item(Transpose))
//!     .step("stack", FunctionStage::whole(VerticalStack))
//!     .estimator("kmeans", MiniBatchKMeans::new(8))
//!     .unwrap();
//! assert_eq!(pipeline.len(), 4);
//! ```

pub mod stage;

use std::collections::BTreeMap;

use ndarray::Array2;
use tracing::debug;

pub use stage::{FunctionStage, PER_ITEM};

use crate::cluster::Estimator;
use crate::error::{PipelineError, Result};
use crate::params::{ParamValue, Params};
use crate::types::StageData;

/// Separates the step name from the argument name in nested parameter keys.
pub const SEPARATOR: &str = "__";

#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    steps: Vec<(String, FunctionStage)>,
}

impl PipelineBuilder {
    pub fn step(mut self, name: impl Into<String>, stage: FunctionStage) -> Self {
        self.steps.push((name.into(), stage));
        self
    }

    /// Terminates the pipeline with a trainable estimator.
    pub fn estimator<E: Estimator>(self, name: impl Into<String>, estimator: E) -> Result<Pipeline<E>> {
        Pipeline::new(self.steps, name, estimator)
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline<E> {
    steps: Vec<(String, FunctionStage)>,
    estimator_name: String,
    estimator: E,
}

impl Pipeline<()> {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }
}

impl<E: Estimator> Pipeline<E> {
    pub fn new(
        steps: Vec<(String, FunctionStage)>,
        estimator_name: impl Into<String>,
        estimator: E,
    ) -> Result<Self> {
        let estimator_name = estimator_name.into();
        let mut seen: Vec<&str> = Vec::with_capacity(steps.len() + 1);
        for name in steps
            .iter()
            .map(|(name, _)| name.as_str())
            .chain(std::iter::once(estimator_name.as_str()))
        {
            check_step_name(name)?;
            if seen.contains(&name) {
                return Err(PipelineError::InvalidPipeline(format!(
                    "step name `{name}` is used more than once"
                )));
            }
            seen.push(name);
        }
        Ok(Self {
            steps,
            estimator_name,
            estimator,
        })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> impl Iterator<Item = (&str, &FunctionStage)> {
        self.steps.iter().map(|(name, stage)| (name.as_str(), stage))
    }

    pub fn named_step(&self, name: &str) -> Option<&FunctionStage> {
        self.steps
            .iter()
            .find(|(step, _)| step == name)
            .map(|(_, stage)| stage)
    }

    pub fn estimator_name(&self) -> &str {
        &self.estimator_name
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    /// Runs every stage and returns the matrix the estimator would see.
    pub fn transform(&self, input: StageData) -> Result<Array2<f32>> {
        let mut data = input;
        for (name, stage) in &self.steps {
            data = stage.transform_stage(data)?;
            debug!(step = %name, function = stage.function_name(), output = %data.describe(), "stage applied");
        }
        data.into_one(&self.estimator_name)?
            .into_matrix(&self.estimator_name)
    }

    pub fn fit(&mut self, input: StageData) -> Result<()> {
        let features = self.transform(input)?;
        self.estimator.fit(features.view())
    }

    pub fn predict(&self, input: StageData) -> Result<Vec<usize>> {
        let features = self.transform(input)?;
        self.estimator.predict(features.view())
    }

    pub fn fit_predict(&mut self, input: StageData) -> Result<Vec<usize>> {
        let features = self.transform(input)?;
        self.estimator.fit(features.view())?;
        self.estimator.predict(features.view())
    }

    /// Every stage and estimator argument, keyed `<step>__<argument>`.
    pub fn get_params(&self) -> Params {
        let mut params = Params::new();
        for (name, stage) in &self.steps {
            for (argument, value) in stage.get_params() {
                params.insert(nested_key(name, &argument), value);
            }
        }
        for (argument, value) in self.estimator.get_params() {
            params.insert(nested_key(&self.estimator_name, &argument), value);
        }
        params
    }

    pub fn set_param(&mut self, key: &str, value: ParamValue) -> Result<()> {
        let mut single = Params::new();
        single.insert(key.to_string(), value);
        self.set_params(&single)
    }

    /// Routes `<step>__<argument>` keys to their stage. Nothing changes unless
    /// every update succeeds.
    pub fn set_params(&mut self, params: &Params) -> Result<()> {
        let mut grouped: BTreeMap<&str, Params> = BTreeMap::new();
        for (key, value) in params {
            let (step, argument) = key.split_once(SEPARATOR).ok_or_else(|| {
                PipelineError::invalid(key.as_str(), "expected a `<step>__<argument>` key")
            })?;
            grouped
                .entry(step)
                .or_default()
                .insert(argument.to_string(), value.clone());
        }

        let mut updated_steps = self.steps.clone();
        let mut estimator_params = None;
        for (step, arguments) in grouped {
            if step == self.estimator_name {
                estimator_params = Some(arguments);
                continue;
            }
            let (_, stage) = updated_steps
                .iter_mut()
                .find(|(name, _)| name == step)
                .ok_or_else(|| PipelineError::UnknownStep(step.to_string()))?;
            stage.set_params(&arguments)?;
        }
        if let Some(arguments) = estimator_params {
            self.estimator.set_params(&arguments)?;
        }
        self.steps = updated_steps;
        Ok(())
    }
}

impl<E> Pipeline<E> {
    /// Consumes the pipeline, handing back its estimator.
    pub fn into_estimator(self) -> E {
        self.estimator
    }
}

fn nested_key(step: &str, argument: &str) -> String {
    format!("{step}{SEPARATOR}{argument}")
}

fn check_step_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(PipelineError::InvalidPipeline("step names must not be empty".into()));
    }
    if name.contains(SEPARATOR) {
        return Err(PipelineError::InvalidPipeline(format!(
            "step name `{name}` must not contain `{SEPARATOR}`"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MiniBatchKMeans;
    use crate::features::{LogAmplitude, Transpose, VerticalStack};
    use crate::params::params;
    use crate::types::FeatureArray;
    use ndarray::array;

    fn matrix_pipeline() -> Pipeline<MiniBatchKMeans> {
        Pipeline::builder()
            .step("transpose", FunctionStage::per_item(Transpose))
            .step("stack", FunctionStage::whole(VerticalStack))
            .estimator("kmeans", MiniBatchKMeans::new(2))
            .unwrap()
    }

    fn columns() -> StageData {
        StageData::Many(vec![
            FeatureArray::Matrix(array![[0.0, 0.1, 10.0], [0.0, 0.2, 10.0]]),
            FeatureArray::Matrix(array![[9.9, 0.05], [10.1, 0.0]]),
        ])
    }

    #[test]
    fn transform_threads_data_through_every_stage() {
        let features = matrix_pipeline().transform(columns()).unwrap();
        assert_eq!(features.dim(), (5, 2));
        assert_eq!(features.row(2).to_vec(), vec![10.0, 10.0]);
    }

    #[test]
    fn fit_predict_labels_every_row() {
        let mut pipeline = matrix_pipeline();
        let labels = pipeline.fit_predict(columns()).unwrap();
        assert_eq!(labels.len(), 5);
        assert!(labels.iter().all(|&label| label < 2));
        assert_eq!(labels[0], labels[1]);
        assert_ne!(labels[0], labels[2]);
    }

    #[test]
    fn predict_before_fit_is_not_fitted() {
        let err = matrix_pipeline().predict(columns()).unwrap_err();
        assert!(matches!(err, PipelineError::NotFitted { .. }));
    }

    #[test]
    fn first_failing_stage_aborts() {
        let pipeline = matrix_pipeline();
        // A lone matrix is not a sequence, so the per-item transpose rejects it.
        let err = pipeline
            .transform(StageData::One(FeatureArray::Matrix(array![[1.0]])))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Shape { ref context, .. } if context == "transpose"));
    }

    #[test]
    fn params_are_nested_by_step_name() {
        let pipeline = Pipeline::builder()
            .step("log", FunctionStage::per_item(LogAmplitude::default()))
            .estimator("kmeans", MiniBatchKMeans::new(3))
            .unwrap();
        let params = pipeline.get_params();
        assert_eq!(params["log__top_db"], ParamValue::Float(80.0));
        assert_eq!(params["log__per_item"], ParamValue::Bool(true));
        assert_eq!(params["kmeans__n_clusters"], ParamValue::Int(3));
    }

    #[test]
    fn set_params_routes_to_stage_and_estimator() {
        let mut pipeline = Pipeline::builder()
            .step("log", FunctionStage::per_item(LogAmplitude::default()))
            .estimator("kmeans", MiniBatchKMeans::new(3))
            .unwrap();
        pipeline
            .set_params(&params([
                ("log__top_db", ParamValue::Float(60.0)),
                ("kmeans__n_clusters", ParamValue::Int(5)),
            ]))
            .unwrap();
        assert_eq!(pipeline.get_params()["log__top_db"], ParamValue::Float(60.0));
        assert_eq!(pipeline.estimator().n_clusters(), 5);
    }

    #[test]
    fn unknown_step_leaves_pipeline_unchanged() {
        let mut pipeline = matrix_pipeline();
        let before = pipeline.get_params();
        let err = pipeline
            .set_params(&params([
                ("kmeans__n_clusters", ParamValue::Int(4)),
                ("mel__n_fft", ParamValue::Int(1024)),
            ]))
            .unwrap_err();
        assert_eq!(err, PipelineError::UnknownStep("mel".into()));
        assert_eq!(pipeline.get_params(), before);
    }

    #[test]
    fn key_without_separator_is_invalid() {
        let mut pipeline = matrix_pipeline();
        let err = pipeline.set_param("n_clusters", ParamValue::Int(4)).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidParameter { .. }));
    }

    #[test]
    fn params_round_trip_with_largest_seed() {
        let mut pipeline = Pipeline::builder()
            .step("log", FunctionStage::per_item(LogAmplitude::default()))
            .estimator("kmeans", MiniBatchKMeans::new(3).with_seed(1 << 63))
            .unwrap();
        let params = pipeline.get_params();
        pipeline.set_params(&params).unwrap();
        assert_eq!(pipeline.get_params(), params);
        assert_eq!(params["kmeans__seed"], ParamValue::UInt(1 << 63));
    }

    #[test]
    fn duplicate_step_names_are_rejected() {
        let err = Pipeline::builder()
            .step("t", FunctionStage::per_item(Transpose))
            .step("t", FunctionStage::whole(VerticalStack))
            .estimator("kmeans", MiniBatchKMeans::new(2))
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidPipeline(_)));
    }

    #[test]
    fn step_names_cannot_contain_separator() {
        let err = Pipeline::builder()
            .step("mel__log", FunctionStage::per_item(Transpose))
            .estimator("kmeans", MiniBatchKMeans::new(2))
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidPipeline(_)));
    }
}
