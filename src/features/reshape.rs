use ndarray::{concatenate, Array2, ArrayView2, Axis};

use super::Transform;
use crate::error::{PipelineError, Result};
use crate::params::{ParamValue, Params};
use crate::types::{FeatureArray, StageData};

/// Swaps the axes of a matrix; signals pass through unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Transpose;

impl Transpose {
    pub const NAME: &'static str = "transpose";
}

impl Transform for Transpose {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn accepted_arguments(&self) -> &'static [&'static str] {
        &[]
    }

    fn arguments(&self) -> Params {
        Params::new()
    }

    fn assign(&mut self, name: &str, _value: &ParamValue) -> Result<()> {
        Err(PipelineError::argument_mismatch(Self::NAME, name, &[]))
    }

    fn validate(&self) -> Result<()> {
        Ok(())
    }

    fn apply(&self, input: StageData) -> Result<StageData> {
        let output = match input.into_one(Self::NAME)? {
            FeatureArray::Matrix(matrix) => FeatureArray::Matrix(matrix.reversed_axes()),
            signal @ FeatureArray::Signal(_) => signal,
        };
        Ok(StageData::One(output))
    }

    fn box_clone(&self) -> Box<dyn Transform> {
        Box::new(*self)
    }
}

/// Stacks a sequence of matrices row-wise into one matrix.
///
/// Every item must have the same number of columns; signals count as
/// single-row matrices.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VerticalStack;

impl VerticalStack {
    pub const NAME: &'static str = "vstack";

    pub fn stack(items: &[FeatureArray]) -> Result<Array2<f32>> {
        let views: Vec<ArrayView2<f32>> = items.iter().map(as_rows).collect();
        let Some(first) = views.first() else {
            return Err(PipelineError::shape(
                Self::NAME,
                "at least one array",
                "empty sequence",
            ));
        };
        let columns = first.ncols();
        if let Some((index, view)) = views.iter().enumerate().find(|(_, v)| v.ncols() != columns) {
            return Err(PipelineError::shape(
                Self::NAME,
                format!("{columns} columns in every item"),
                format!("{} columns in item {index}", view.ncols()),
            ));
        }
        concatenate(Axis(0), &views)
            .map_err(|err| PipelineError::shape(Self::NAME, "stackable arrays", err.to_string()))
    }
}

fn as_rows(item: &FeatureArray) -> ArrayView2<'_, f32> {
    match item {
        FeatureArray::Matrix(matrix) => matrix.view(),
        FeatureArray::Signal(signal) => signal.view().insert_axis(Axis(0)),
    }
}

impl Transform for VerticalStack {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn accepted_arguments(&self) -> &'static [&'static str] {
        &[]
    }

    fn arguments(&self) -> Params {
        Params::new()
    }

    fn assign(&mut self, name: &str, _value: &ParamValue) -> Result<()> {
        Err(PipelineError::argument_mismatch(Self::NAME, name, &[]))
    }

    fn validate(&self) -> Result<()> {
        Ok(())
    }

    fn apply(&self, input: StageData) -> Result<StageData> {
        let stacked = match input {
            StageData::One(item) => Self::stack(std::slice::from_ref(&item))?,
            StageData::Many(items) => Self::stack(&items)?,
        };
        Ok(StageData::One(FeatureArray::Matrix(stacked)))
    }

    fn box_clone(&self) -> Box<dyn Transform> {
        Box::new(*self)
    }
}
