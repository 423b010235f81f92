use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use audiocluster::audio::load_clip;
use audiocluster::cli::{Cli, Command, FitArgs, ParamsArgs, PipelineSource, PredictArgs};
use audiocluster::config::{apply_overrides, load_spec, PipelineSpec};
use audiocluster::features::MelSpectrogram;
use audiocluster::model::SavedModel;
use audiocluster::types::StageData;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Fit(args) => run_fit(args),
        Command::Predict(args) => run_predict(args),
        Command::Params(args) => run_params(args),
    }
}

fn resolve_spec(source: &PipelineSource) -> Result<PipelineSpec> {
    let spec = load_spec(
        source.pipeline_file.as_deref(),
        source.pipeline_json.as_deref(),
        MelSpectrogram::default().sample_rate,
    )
    .context("Failed to load pipeline specification")?;
    apply_overrides(&spec, &source.overrides)
}

fn target_rate(spec: &PipelineSpec) -> Result<u32> {
    Ok(spec
        .input_sample_rate()?
        .unwrap_or(MelSpectrogram::default().sample_rate))
}

fn run_fit(args: FitArgs) -> Result<()> {
    let spec = resolve_spec(&args.pipeline)?;
    let mut pipeline = spec.build().context("Failed to build pipeline")?;
    let sample_rate = target_rate(&spec)?;
    let (start, end) = args.trim.range()?;

    let clips = args
        .inputs
        .iter()
        .map(|path| load_clip(path, start, end, sample_rate))
        .collect::<Result<Vec<_>>>()?;
    info!(
        clips = clips.len(),
        steps = pipeline.len(),
        sample_rate,
        "fitting pipeline"
    );

    let data = StageData::signals(clips.into_iter().map(|clip| clip.samples));
    let labels = pipeline.fit_predict(data).context("Failed to fit pipeline")?;

    let model = SavedModel::from_pipeline(&pipeline)?;
    model.save(&args.model)?;

    let mut summary = json!({
        "model": args.model.display().to_string(),
        "frames": labels.len(),
        "clusters": model.centroids.len(),
        "inertia": model.inertia,
    });
    if args.print_labels {
        summary["labels"] = json!(labels);
    }
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    let model = SavedModel::load(&args.model)?;
    let sample_rate = target_rate(&model.pipeline)?;
    let pipeline = model
        .into_pipeline()
        .context("Failed to restore pipeline from model")?;
    let (start, end) = args.trim.range()?;

    let audio = load_clip(&args.input, start, end, sample_rate)?;
    let labels = pipeline
        .predict(StageData::from(audio))
        .context("Failed to predict labels")?;

    let output = json!({ "frames": labels.len(), "labels": labels });
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

fn run_params(args: ParamsArgs) -> Result<()> {
    let spec = resolve_spec(&args.pipeline)?;
    let pipeline = spec.build().context("Failed to build pipeline")?;
    println!("{}", serde_json::to_string_pretty(&pipeline.get_params())?);
    Ok(())
}
