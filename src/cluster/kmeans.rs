use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use super::Estimator;
use crate::error::{PipelineError, Result};
use crate::params::{ParamValue, Params};

const ARGUMENTS: &[&str] = &[
    "n_clusters",
    "batch_size",
    "max_iter",
    "tol",
    "max_no_improvement",
    "seed",
];

#[derive(Debug, Clone, PartialEq)]
struct Hyperparameters {
    n_clusters: usize,
    batch_size: usize,
    /// Passes over the training set, measured in samples drawn.
    max_iter: usize,
    /// Centroid shift threshold, relative to the mean feature variance.
    tol: f64,
    /// Batches without smoothed-inertia improvement before stopping.
    max_no_improvement: Option<usize>,
    seed: u64,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            n_clusters: 8,
            batch_size: 1024,
            max_iter: 100,
            tol: 0.0,
            max_no_improvement: Some(10),
            seed: 0,
        }
    }
}

impl Hyperparameters {
    fn assign(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "n_clusters" => self.n_clusters = value.as_usize(name)?,
            "batch_size" => self.batch_size = value.as_usize(name)?,
            "max_iter" => self.max_iter = value.as_usize(name)?,
            "tol" => self.tol = value.as_f64(name)?,
            "max_no_improvement" => self.max_no_improvement = value.as_optional_usize(name)?,
            "seed" => self.seed = value.as_u64(name)?,
            other => {
                return Err(PipelineError::argument_mismatch(
                    MiniBatchKMeans::NAME,
                    other,
                    ARGUMENTS,
                ))
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.n_clusters == 0 {
            return Err(PipelineError::invalid("n_clusters", "must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(PipelineError::invalid("batch_size", "must be at least 1"));
        }
        if self.max_iter == 0 {
            return Err(PipelineError::invalid("max_iter", "must be at least 1"));
        }
        if !self.tol.is_finite() || self.tol < 0.0 {
            return Err(PipelineError::invalid("tol", "must be a non-negative number"));
        }
        if self.max_no_improvement == Some(0) {
            return Err(PipelineError::invalid(
                "max_no_improvement",
                "must be at least 1, or null to disable",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct FittedState {
    centroids: Array2<f32>,
    /// Samples absorbed by each centroid so far; drives the per-centroid learning rate.
    counts: Vec<f64>,
    inertia: Option<f64>,
    steps: usize,
}

/// K-means clustering trained on random mini-batches.
///
/// Centroids start from a k-means++ seeding of a random subset, then move
/// towards each batch's members with a learning rate of `1 / count`.
/// Training is deterministic for a given `seed`.
#[derive(Debug, Clone)]
pub struct MiniBatchKMeans {
    config: Hyperparameters,
    state: Option<FittedState>,
    rng: StdRng,
}

impl Default for MiniBatchKMeans {
    fn default() -> Self {
        Self::from_config(Hyperparameters::default())
    }
}

impl MiniBatchKMeans {
    pub const NAME: &'static str = "mini_batch_kmeans";

    pub fn new(n_clusters: usize) -> Self {
        Self::from_config(Hyperparameters {
            n_clusters,
            ..Hyperparameters::default()
        })
    }

    fn from_config(config: Hyperparameters) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            state: None,
            rng,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.config.batch_size = batch_size;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.config.max_iter = max_iter;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.config.tol = tol;
        self
    }

    pub fn with_max_no_improvement(mut self, patience: Option<usize>) -> Self {
        self.config.max_no_improvement = patience;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Attaches previously learned centroids, making the estimator fitted.
    pub fn with_centroids(mut self, centroids: Array2<f32>, inertia: Option<f64>) -> Result<Self> {
        self.config.validate()?;
        if centroids.nrows() != self.config.n_clusters || centroids.ncols() == 0 {
            return Err(PipelineError::shape(
                "centroids",
                format!("a ({}, n_features) matrix", self.config.n_clusters),
                format!("({}, {})", centroids.nrows(), centroids.ncols()),
            ));
        }
        if centroids.iter().any(|v| !v.is_finite()) {
            return Err(PipelineError::invalid("centroids", "contain non-finite values"));
        }
        self.state = Some(FittedState {
            counts: vec![0.0; centroids.nrows()],
            centroids,
            inertia,
            steps: 0,
        });
        Ok(self)
    }

    pub fn n_clusters(&self) -> usize {
        self.config.n_clusters
    }

    /// Learned centroids, one row per cluster.
    pub fn centroids(&self) -> Option<ArrayView2<'_, f32>> {
        self.state.as_ref().map(|state| state.centroids.view())
    }

    /// Sum of squared distances from the training rows to their centroid.
    pub fn inertia(&self) -> Option<f64> {
        self.state.as_ref().and_then(|state| state.inertia)
    }

    /// Mini-batch updates performed since the last `fit`.
    pub fn n_steps(&self) -> usize {
        self.state.as_ref().map_or(0, |state| state.steps)
    }

    /// Updates the centroids with a single batch, seeding them first if needed.
    pub fn partial_fit(&mut self, batch: ArrayView2<f32>) -> Result<()> {
        self.config.validate()?;
        check_finite(batch)?;
        if batch.nrows() == 0 {
            return Err(PipelineError::shape("partial_fit", "at least one row", "0 rows"));
        }
        match &self.state {
            Some(state) => check_columns(batch, state.centroids.ncols())?,
            None => self.check_training_rows(batch)?,
        }
        let mut state = match self.state.take() {
            Some(state) => state,
            None => FittedState {
                centroids: kmeans_plus_plus(batch, self.config.n_clusters, &mut self.rng),
                counts: vec![0.0; self.config.n_clusters],
                inertia: None,
                steps: 0,
            },
        };
        minibatch_step(&mut state.centroids, &mut state.counts, batch);
        state.steps += 1;
        state.inertia = Some(total_inertia(batch, state.centroids.view()));
        self.state = Some(state);
        Ok(())
    }

    fn check_training_rows(&self, data: ArrayView2<f32>) -> Result<()> {
        if data.ncols() == 0 {
            return Err(PipelineError::shape(Self::NAME, "at least one feature column", "0 columns"));
        }
        if data.nrows() < self.config.n_clusters {
            return Err(PipelineError::shape(
                Self::NAME,
                format!("at least {} rows (n_clusters)", self.config.n_clusters),
                format!("{} rows", data.nrows()),
            ));
        }
        Ok(())
    }

    /// Shift threshold in absolute units: `tol` times the mean feature variance.
    fn absolute_tolerance(&self, data: ArrayView2<f32>) -> f64 {
        if self.config.tol == 0.0 {
            return 0.0;
        }
        let variances = data.mapv(|v| v as f64).var_axis(Axis(0), 0.0);
        variances.mean().unwrap_or(0.0) * self.config.tol
    }
}

impl Estimator for MiniBatchKMeans {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn fit(&mut self, data: ArrayView2<f32>) -> Result<()> {
        self.config.validate()?;
        check_finite(data)?;
        self.check_training_rows(data)?;

        let n_samples = data.nrows();
        let k = self.config.n_clusters;
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        let init_size = self
            .config
            .batch_size
            .saturating_mul(3)
            .max(k.saturating_mul(3))
            .min(n_samples);
        let init_rows = index::sample(&mut rng, n_samples, init_size).into_vec();
        let init_data = data.select(Axis(0), &init_rows);
        let mut centroids = kmeans_plus_plus(init_data.view(), k, &mut rng);
        let mut counts = vec![0.0_f64; k];

        let batch_size = self.config.batch_size.min(n_samples);
        let max_steps = self
            .config
            .max_iter
            .saturating_mul(n_samples)
            .div_ceil(batch_size)
            .max(1);
        let tolerance = self.absolute_tolerance(data);
        let alpha = (2.0 * batch_size as f64 / (n_samples as f64 + 1.0)).min(1.0);

        let mut smoothed_inertia: Option<f64> = None;
        let mut best_inertia = f64::INFINITY;
        let mut stale_batches = 0usize;
        let mut steps = 0usize;

        for step in 0..max_steps {
            let rows: Vec<usize> = (0..batch_size).map(|_| rng.gen_range(0..n_samples)).collect();
            let batch = data.select(Axis(0), &rows);
            let update = minibatch_step(&mut centroids, &mut counts, batch.view());
            steps = step + 1;

            if tolerance > 0.0 && update.squared_shift <= tolerance {
                debug!(step, shift = update.squared_shift, "centroids converged");
                break;
            }

            let batch_inertia = update.inertia / batch_size as f64;
            let smoothed = match smoothed_inertia {
                Some(previous) => previous * (1.0 - alpha) + batch_inertia * alpha,
                None => batch_inertia,
            };
            smoothed_inertia = Some(smoothed);

            if let Some(patience) = self.config.max_no_improvement {
                if smoothed < best_inertia {
                    best_inertia = smoothed;
                    stale_batches = 0;
                } else {
                    stale_batches += 1;
                    if stale_batches >= patience {
                        debug!(step, smoothed, "no inertia improvement; stopping early");
                        break;
                    }
                }
            }
        }

        let inertia = total_inertia(data, centroids.view());
        info!(
            clusters = k,
            samples = n_samples,
            features = data.ncols(),
            steps,
            inertia,
            "mini-batch k-means fitted"
        );
        self.rng = rng;
        self.state = Some(FittedState {
            centroids,
            counts,
            inertia: Some(inertia),
            steps,
        });
        Ok(())
    }

    fn predict(&self, data: ArrayView2<f32>) -> Result<Vec<usize>> {
        let state = self.state.as_ref().ok_or_else(|| PipelineError::NotFitted {
            estimator: Self::NAME.to_string(),
        })?;
        check_columns(data, state.centroids.ncols())?;
        Ok(data
            .rows()
            .into_iter()
            .map(|row| nearest_centroid(row, state.centroids.view()).0)
            .collect())
    }

    fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    fn get_params(&self) -> Params {
        let mut params = Params::new();
        params.insert("n_clusters".into(), self.config.n_clusters.into());
        params.insert("batch_size".into(), self.config.batch_size.into());
        params.insert("max_iter".into(), self.config.max_iter.into());
        params.insert("tol".into(), self.config.tol.into());
        params.insert(
            "max_no_improvement".into(),
            self.config.max_no_improvement.into(),
        );
        params.insert("seed".into(), self.config.seed.into());
        params
    }

    fn set_param(&mut self, name: &str, value: &ParamValue) -> Result<()> {
        let mut single = Params::new();
        single.insert(name.to_string(), value.clone());
        self.set_params(&single)
    }

    /// Applies all updates or none. Learned centroids are discarded only when
    /// a hyperparameter actually changes.
    fn set_params(&mut self, params: &Params) -> Result<()> {
        let mut config = self.config.clone();
        for (name, value) in params {
            config.assign(name, value)?;
        }
        config.validate()?;
        if config != self.config {
            *self = Self::from_config(config);
        }
        Ok(())
    }
}

struct StepUpdate {
    inertia: f64,
    squared_shift: f64,
}

/// Moves each centroid towards the mean of its batch members, weighted by how
/// many samples it has already absorbed.
fn minibatch_step(
    centroids: &mut Array2<f32>,
    counts: &mut [f64],
    batch: ArrayView2<f32>,
) -> StepUpdate {
    let k = centroids.nrows();
    let mut sums = Array2::<f64>::zeros((k, centroids.ncols()));
    let mut members = vec![0.0_f64; k];
    let mut inertia = 0.0;

    for row in batch.rows() {
        let (label, distance) = nearest_centroid(row, centroids.view());
        inertia += distance as f64;
        members[label] += 1.0;
        let mut sum = sums.row_mut(label);
        sum.zip_mut_with(&row, |acc, &v| *acc += v as f64);
    }

    let mut squared_shift = 0.0;
    for cluster in 0..k {
        if members[cluster] == 0.0 {
            continue;
        }
        let total = counts[cluster] + members[cluster];
        let mut centroid = centroids.row_mut(cluster);
        for (value, sum) in centroid.iter_mut().zip(sums.row(cluster).iter()) {
            let updated = ((*value as f64) * counts[cluster] + sum) / total;
            squared_shift += (updated - *value as f64).powi(2);
            *value = updated as f32;
        }
        counts[cluster] = total;
    }

    StepUpdate {
        inertia,
        squared_shift,
    }
}

/// k-means++ seeding: the first centroid is uniform, later ones are drawn
/// with probability proportional to the squared distance to the closest
/// centroid chosen so far.
fn kmeans_plus_plus(data: ArrayView2<f32>, k: usize, rng: &mut StdRng) -> Array2<f32> {
    let n_samples = data.nrows();
    let mut centroids = Array2::zeros((k, data.ncols()));
    let first = rng.gen_range(0..n_samples);
    centroids.row_mut(0).assign(&data.row(first));
    let mut closest: Vec<f64> = data
        .rows()
        .into_iter()
        .map(|row| squared_distance(row, centroids.row(0)) as f64)
        .collect();

    for cluster in 1..k {
        let total: f64 = closest.iter().sum();
        let chosen = if total <= 0.0 {
            // Every sample already coincides with a centroid.
            rng.gen_range(0..n_samples)
        } else {
            let threshold = rng.gen::<f64>() * total;
            let mut cumulative = 0.0;
            closest
                .iter()
                .position(|&d| {
                    cumulative += d;
                    cumulative >= threshold
                })
                .unwrap_or(n_samples - 1)
        };
        centroids.row_mut(cluster).assign(&data.row(chosen));
        let centroid = centroids.row(cluster);
        for (distance, row) in closest.iter_mut().zip(data.rows()) {
            *distance = distance.min(squared_distance(row, centroid) as f64);
        }
    }
    centroids
}

fn nearest_centroid(row: ArrayView1<f32>, centroids: ArrayView2<f32>) -> (usize, f32) {
    let mut best = (0, f32::INFINITY);
    for (index, centroid) in centroids.rows().into_iter().enumerate() {
        let distance = squared_distance(row, centroid);
        if distance < best.1 {
            best = (index, distance);
        }
    }
    best
}

fn squared_distance(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn total_inertia(data: ArrayView2<f32>, centroids: ArrayView2<f32>) -> f64 {
    data.rows()
        .into_iter()
        .map(|row| nearest_centroid(row, centroids).1 as f64)
        .sum()
}

fn check_columns(data: ArrayView2<f32>, expected: usize) -> Result<()> {
    if data.ncols() != expected {
        return Err(PipelineError::shape(
            MiniBatchKMeans::NAME,
            format!("{expected} feature columns"),
            format!("{} columns", data.ncols()),
        ));
    }
    Ok(())
}

fn check_finite(data: ArrayView2<f32>) -> Result<()> {
    if data.iter().any(|v| !v.is_finite()) {
        return Err(PipelineError::invalid("data", "contains NaN or infinite values"));
    }
    Ok(())
}
