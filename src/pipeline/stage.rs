//! Adapter that turns a feature transform into a pipeline stage.

use rayon::prelude::*;

use crate::error::Result;
use crate::features::{transform_from_arguments, Transform};
use crate::params::{ParamValue, Params};
use crate::types::{FeatureArray, StageData};

/// Name under which [`FunctionStage::get_params`] reports the per-item flag.
pub const PER_ITEM: &str = "per_item";

/// A stateless pipeline stage: one transform, its bound arguments, and
/// whether it runs once per item or once on the whole input.
#[derive(Debug, Clone)]
pub struct FunctionStage {
    transform: Box<dyn Transform>,
    per_item: bool,
    parallel: bool,
}

impl FunctionStage {
    /// Applies `transform` once to the whole input.
    pub fn whole(transform: impl Transform + 'static) -> Self {
        Self {
            transform: Box::new(transform),
            per_item: false,
            parallel: false,
        }
    }

    /// Applies `transform` independently to every item of a sequence.
    pub fn per_item(transform: impl Transform + 'static) -> Self {
        Self {
            transform: Box::new(transform),
            per_item: true,
            parallel: false,
        }
    }

    /// Resolves `function` by name and binds `arguments`; any argument outside
    /// the function's signature fails with `ArgumentMismatch`.
    pub fn from_arguments(function: &str, per_item: bool, arguments: &Params) -> Result<Self> {
        Ok(Self {
            transform: transform_from_arguments(function, arguments)?,
            per_item,
            parallel: false,
        })
    }

    /// Runs per-item invocations on the rayon pool. Output order is unchanged.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn function_name(&self) -> &'static str {
        self.transform.name()
    }

    pub fn is_per_item(&self) -> bool {
        self.per_item
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// Bound arguments only, without the per-item flag.
    pub fn arguments(&self) -> Params {
        self.transform.arguments()
    }

    pub fn transform_stage(&self, input: StageData) -> Result<StageData> {
        if !self.per_item {
            return self.transform.apply(input);
        }
        let items = input.into_many(self.transform.name())?;
        let outputs = if self.parallel {
            items
                .into_par_iter()
                .map(|item| self.apply_item(item))
                .collect::<Result<Vec<_>>>()?
        } else {
            items
                .into_iter()
                .map(|item| self.apply_item(item))
                .collect::<Result<Vec<_>>>()?
        };
        Ok(StageData::Many(outputs))
    }

    fn apply_item(&self, item: FeatureArray) -> Result<FeatureArray> {
        self.transform
            .apply(StageData::One(item))?
            .into_one(self.transform.name())
    }

    pub fn get_params(&self) -> Params {
        let mut params = self.transform.arguments();
        params.insert(PER_ITEM.to_string(), ParamValue::Bool(self.per_item));
        params
    }

    pub fn set_param(&mut self, name: &str, value: ParamValue) -> Result<()> {
        let mut single = Params::new();
        single.insert(name.to_string(), value);
        self.set_params(&single)
    }

    /// Updates several arguments at once. On error the stage is left untouched.
    pub fn set_params(&mut self, params: &Params) -> Result<()> {
        let mut transform = self.transform.clone();
        let mut per_item = self.per_item;
        for (name, value) in params {
            if name == PER_ITEM {
                per_item = value.as_bool(name)?;
            } else {
                transform.assign(name, value)?;
            }
        }
        transform.validate()?;
        self.transform = transform;
        self.per_item = per_item;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::features::{LogAmplitude, Transpose, VerticalStack};
    use crate::params::params;
    use ndarray::array;

    fn matrices() -> Vec<FeatureArray> {
        vec![
            FeatureArray::Matrix(array![[1.0, 2.0], [3.0, 4.0]]),
            FeatureArray::Matrix(array![[5.0, 6.0, 7.0]]),
        ]
    }

    #[test]
    fn per_item_preserves_order() {
        let stage = FunctionStage::per_item(Transpose);
        let output = stage.transform_stage(StageData::Many(matrices())).unwrap();
        let items = output.into_many("test").unwrap();
        assert_eq!(items[0], FeatureArray::Matrix(array![[1.0, 3.0], [2.0, 4.0]]));
        assert_eq!(items[1], FeatureArray::Matrix(array![[5.0], [6.0], [7.0]]));
    }

    #[test]
    fn per_item_on_empty_sequence_is_empty() {
        let stage = FunctionStage::per_item(LogAmplitude::default());
        let output = stage.transform_stage(StageData::Many(Vec::new())).unwrap();
        assert!(output.is_empty());
    }

    #[test]
    fn per_item_requires_a_sequence() {
        let stage = FunctionStage::per_item(Transpose);
        let err = stage
            .transform_stage(StageData::One(FeatureArray::Matrix(array![[1.0]])))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Shape { .. }));
    }

    #[test]
    fn whole_mode_passes_collection_as_one_argument() {
        let stage = FunctionStage::whole(VerticalStack);
        let err = stage.transform_stage(StageData::Many(matrices())).unwrap_err();
        // The whole sequence reached vstack, which rejects the ragged widths.
        assert!(matches!(err, PipelineError::Shape { ref context, .. } if context == "vstack"));
    }

    #[test]
    fn parallel_matches_sequential() {
        let input = StageData::Many(
            (0..16)
                .map(|i| FeatureArray::Matrix(array![[i as f32 + 1.0, 0.5], [2.0, 4.0]]))
                .collect(),
        );
        let sequential = FunctionStage::per_item(LogAmplitude::default());
        let parallel = sequential.clone().with_parallelism(true);
        assert_eq!(
            sequential.transform_stage(input.clone()).unwrap(),
            parallel.transform_stage(input).unwrap()
        );
    }

    #[test]
    fn get_params_reports_arguments_and_mode() {
        let stage = FunctionStage::per_item(LogAmplitude::default());
        let params = stage.get_params();
        assert_eq!(params[PER_ITEM], ParamValue::Bool(true));
        assert_eq!(params["reference"], ParamValue::Text("max".into()));
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn failed_set_params_leaves_stage_untouched() {
        let mut stage = FunctionStage::per_item(LogAmplitude::default());
        let before = stage.get_params();
        let err = stage
            .set_params(&params([
                ("top_db", ParamValue::from(40.0)),
                ("n_mels", ParamValue::from(64usize)),
            ]))
            .unwrap_err();
        assert!(matches!(err, PipelineError::ArgumentMismatch { .. }));
        assert_eq!(stage.get_params(), before);
    }

    #[test]
    fn set_param_switches_mode() {
        let mut stage = FunctionStage::whole(Transpose);
        stage.set_param(PER_ITEM, ParamValue::Bool(true)).unwrap();
        assert!(stage.is_per_item());
    }
}
