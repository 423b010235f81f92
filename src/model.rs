//! Persisted pipelines: configuration plus learned centroids.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cluster::{Estimator, MiniBatchKMeans};
use crate::config::PipelineSpec;
use crate::error::PipelineError;
use crate::pipeline::Pipeline;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedModel {
    pub pipeline: PipelineSpec,
    /// One row per cluster.
    pub centroids: Vec<Vec<f32>>,
    #[serde(default)]
    pub inertia: Option<f64>,
}

impl SavedModel {
    pub fn from_pipeline(pipeline: &Pipeline<MiniBatchKMeans>) -> crate::Result<Self> {
        let estimator = pipeline.estimator();
        let centroids = estimator.centroids().ok_or_else(|| PipelineError::NotFitted {
            estimator: estimator.name().to_string(),
        })?;
        Ok(Self {
            pipeline: PipelineSpec::from_pipeline(pipeline),
            centroids: centroids.rows().into_iter().map(|row| row.to_vec()).collect(),
            inertia: estimator.inertia(),
        })
    }

    /// Rebuilds a fitted pipeline ready for `predict`.
    pub fn into_pipeline(self) -> crate::Result<Pipeline<MiniBatchKMeans>> {
        let steps = self.pipeline.build_steps()?;
        let mut estimator = MiniBatchKMeans::default();
        estimator.set_params(&self.pipeline.estimator.arguments)?;
        let estimator = estimator.with_centroids(centroid_matrix(&self.centroids)?, self.inertia)?;
        Pipeline::new(steps, self.pipeline.estimator.name, estimator)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create model directory {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize model")?;
        fs::write(path, json).with_context(|| format!("Failed to write model to {:?}", path))?;
        info!(path = %path.display(), clusters = self.centroids.len(), "model saved");
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read model file {:?}", path))?;
        let model: SavedModel =
            serde_json::from_str(&data).with_context(|| format!("Failed to parse model {:?}", path))?;
        Ok(model)
    }
}

fn centroid_matrix(rows: &[Vec<f32>]) -> crate::Result<Array2<f32>> {
    let n_features = rows.first().map_or(0, Vec::len);
    if let Some((index, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != n_features) {
        return Err(PipelineError::shape(
            "centroids",
            format!("{n_features} values in every row"),
            format!("{} values in row {index}", row.len()),
        ));
    }
    let flat: Vec<f32> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), n_features), flat).map_err(|err| {
        PipelineError::shape("centroids", "a rectangular matrix", err.to_string())
    })
}
