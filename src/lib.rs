//! Function-to-stage adapters for audio feature pipelines ending in
//! mini-batch k-means clustering.

pub mod audio;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod error;
pub mod features;
pub mod model;
pub mod params;
pub mod pipeline;
pub mod types;

pub use error::{PipelineError, Result};
pub use params::{ParamValue, Params};
pub use pipeline::{FunctionStage, Pipeline};
