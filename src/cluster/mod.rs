//! Trainable terminal stages.

mod kmeans;

use std::fmt::Debug;

use ndarray::ArrayView2;

pub use kmeans::MiniBatchKMeans;

use crate::error::Result;
use crate::params::{ParamValue, Params};

/// The fit/predict contract of a pipeline's final stage.
///
/// Rows of the input matrix are samples, columns are features.
pub trait Estimator: Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// Learns parameters from `data`, replacing anything learned before.
    fn fit(&mut self, data: ArrayView2<f32>) -> Result<()>;

    /// Maps every row of `data` to a label. Fails with `NotFitted` before `fit`.
    fn predict(&self, data: ArrayView2<f32>) -> Result<Vec<usize>>;

    fn is_fitted(&self) -> bool;

    fn get_params(&self) -> Params;

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()>;

    fn set_params(&mut self, params: &Params) -> Result<()> {
        for (name, value) in params {
            self.set_param(name, value)?;
        }
        Ok(())
    }
}
