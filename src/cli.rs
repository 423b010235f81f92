use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "audiocluster", version)]
#[command(about = "Cluster audio frames with a mel spectrogram + mini-batch k-means pipeline", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fit the pipeline on one or more audio files and save the model.
    Fit(FitArgs),
    /// Label every frame of an audio file with a saved model.
    Predict(PredictArgs),
    /// Print the flattened `step__argument` parameters of a pipeline.
    Params(ParamsArgs),
}

/// Where the pipeline definition comes from. Without either flag the
/// default mel spectrogram + k-means layout is used.
#[derive(Args, Debug, Clone, Default)]
pub struct PipelineSource {
    /// Path to a JSON pipeline specification
    #[arg(long, value_name = "PATH", conflicts_with = "pipeline_json")]
    pub pipeline_file: Option<PathBuf>,

    /// Inline JSON pipeline specification
    #[arg(long, value_name = "JSON")]
    pub pipeline_json: Option<String>,

    /// Override a parameter, e.g. `--set mel__n_mels=64` (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct TrimArgs {
    /// Optional trim start time (seconds or HH:MM:SS.mmm)
    #[arg(long, value_name = "TIME")]
    pub start: Option<String>,

    /// Optional trim end time (seconds or HH:MM:SS.mmm)
    #[arg(long, value_name = "TIME")]
    pub end: Option<String>,
}

impl TrimArgs {
    pub fn range(&self) -> Result<(Option<f64>, Option<f64>)> {
        let start = parse_optional_time(self.start.as_deref(), "start")?;
        let end = parse_optional_time(self.end.as_deref(), "end")?;
        if let (Some(s), Some(e)) = (start, end) {
            ensure!(e > s, "End time must be greater than start time");
        }
        Ok((start, end))
    }
}

#[derive(Args, Debug, Clone)]
pub struct FitArgs {
    /// Input audio files (MP3, OGG, FLAC, WAV, ...); each becomes one item
    #[arg(value_name = "INPUT", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Where to write the fitted model JSON
    #[arg(long, value_name = "PATH")]
    pub model: PathBuf,

    #[command(flatten)]
    pub pipeline: PipelineSource,

    #[command(flatten)]
    pub trim: TrimArgs,

    /// Also print the training labels
    #[arg(long)]
    pub print_labels: bool,
}

#[derive(Args, Debug, Clone)]
pub struct PredictArgs {
    /// Input audio file
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Fitted model produced by `fit`
    #[arg(long, value_name = "PATH")]
    pub model: PathBuf,

    #[command(flatten)]
    pub trim: TrimArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ParamsArgs {
    #[command(flatten)]
    pub pipeline: PipelineSource,
}

pub fn parse_optional_time(value: Option<&str>, label: &str) -> Result<Option<f64>> {
    value
        .map(|raw| {
            parse_time_to_seconds(raw).with_context(|| format!("Invalid {} time '{}'", label, raw))
        })
        .transpose()
}

pub fn parse_time_to_seconds(raw: &str) -> Result<f64> {
    if raw.contains(':') {
        return parse_hms_time(raw);
    }
    let seconds: f64 = raw
        .parse()
        .with_context(|| format!("Failed to parse seconds value '{}'", raw))?;
    ensure!(
        seconds.is_finite() && seconds >= 0.0,
        "Time values must be non-negative"
    );
    Ok(seconds)
}

fn parse_hms_time(raw: &str) -> Result<f64> {
    let parts: Vec<&str> = raw.split(':').collect();
    ensure!(
        (2..=3).contains(&parts.len()),
        "Time format must be MM:SS or HH:MM:SS"
    );

    let mut total = 0.0;
    for (part, unit) in parts.iter().rev().zip(["seconds", "minutes", "hours"]) {
        let value: f64 = part
            .parse()
            .with_context(|| format!("Invalid {} component '{}'", unit, part))?;
        ensure!(value >= 0.0, "{} must be non-negative", unit);
        let scale = match unit {
            "seconds" => 1.0,
            "minutes" => 60.0,
            _ => 3600.0,
        };
        total += value * scale;
    }
    Ok(total)
}
