use std::f32::consts::PI;

use audiocluster::cluster::{Estimator, MiniBatchKMeans};
use audiocluster::config::PipelineSpec;
use audiocluster::features::{LogAmplitude, MelSpectrogram, Transpose, VerticalStack};
use audiocluster::model::SavedModel;
use audiocluster::pipeline::{FunctionStage, Pipeline};
use audiocluster::types::{AudioData, FeatureArray, StageData};
use tempfile::tempdir;

const SAMPLE_RATE: u32 = 22_050;

/// Alternating tone sections with a little deterministic noise, so frames
/// fall into several distinct spectral groups.
fn synthetic_clip(offset_seconds: f32, seconds: f32) -> AudioData {
    let tones = [220.0_f32, 660.0, 1_760.0, 4_400.0];
    let len = (SAMPLE_RATE as f32 * seconds) as usize;
    let mut state = 0x2545_f491_u32;
    let samples = (0..len)
        .map(|i| {
            let t = offset_seconds + i as f32 / SAMPLE_RATE as f32;
            let tone = tones[(t / 0.5) as usize % tones.len()];
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let noise = (state as f32 / u32::MAX as f32 - 0.5) * 0.01;
            (2.0 * PI * tone * t).sin() * 0.4 + noise
        })
        .collect();
    AudioData {
        samples,
        sample_rate: SAMPLE_RATE,
    }
}

fn canonical_pipeline() -> Pipeline<MiniBatchKMeans> {
    Pipeline::builder()
        .step("mel", FunctionStage::per_item(MelSpectrogram::new(SAMPLE_RATE)))
        .step("log", FunctionStage::per_item(LogAmplitude::default()))
        .step("transpose", FunctionStage::per_item(Transpose))
        .step("stack", FunctionStage::whole(VerticalStack))
        .estimator("kmeans", MiniBatchKMeans::new(8))
        .expect("valid pipeline")
}

fn mel_frames(pipeline: &Pipeline<MiniBatchKMeans>, audio: &AudioData) -> usize {
    let mel = pipeline.named_step("mel").expect("mel step");
    let output = mel
        .transform_stage(StageData::from(audio.clone()))
        .expect("mel stage")
        .into_many("mel")
        .expect("sequence");
    match &output[0] {
        FeatureArray::Matrix(spectrogram) => {
            assert_eq!(spectrogram.nrows(), 128);
            spectrogram.ncols()
        }
        other => panic!("unexpected mel output {}", other.describe()),
    }
}

#[test]
fn canonical_pipeline_fits_and_labels_every_frame() {
    let training = synthetic_clip(0.0, 20.0);
    let mut pipeline = canonical_pipeline();
    pipeline
        .fit(StageData::from(training.clone()))
        .expect("fit succeeds");

    let centroids = pipeline.estimator().centroids().expect("fitted centroids");
    assert_eq!(centroids.dim(), (8, 128));

    let labels = pipeline
        .predict(StageData::from(training.clone()))
        .expect("predict succeeds");
    assert_eq!(labels.len(), mel_frames(&pipeline, &training));
    assert!(labels.iter().all(|&label| label < 8));

    let unseen = synthetic_clip(25.0, 5.0);
    let unseen_labels = pipeline
        .predict(StageData::from(unseen.clone()))
        .expect("predict unseen segment");
    assert_eq!(unseen_labels.len(), mel_frames(&pipeline, &unseen));
    assert!(unseen_labels.iter().all(|&label| label < 8));
}

#[test]
fn transform_output_feeds_estimator_rows() {
    let pipeline = canonical_pipeline();
    let clips = vec![synthetic_clip(0.0, 2.0), synthetic_clip(3.0, 1.0)];
    let expected_rows: usize = clips.iter().map(|clip| mel_frames(&pipeline, clip)).sum();

    let features = pipeline
        .transform(StageData::signals(clips.into_iter().map(|clip| clip.samples)))
        .expect("transform succeeds");
    assert_eq!(features.dim(), (expected_rows, 128));
    assert!(features.iter().all(|v| v.is_finite()));
}

#[test]
fn saved_model_predicts_identical_labels() {
    let mut pipeline = PipelineSpec::mel_kmeans(SAMPLE_RATE, 4)
        .build()
        .expect("spec builds");
    let training = synthetic_clip(0.0, 6.0);
    pipeline.fit(StageData::from(training)).expect("fit succeeds");

    let probe = synthetic_clip(7.0, 3.0);
    let expected = pipeline.predict(StageData::from(probe.clone())).unwrap();

    let dir = tempdir().unwrap();
    let path = dir.path().join("model.json");
    SavedModel::from_pipeline(&pipeline)
        .unwrap()
        .save(&path)
        .unwrap();
    let restored = SavedModel::load(&path).unwrap().into_pipeline().unwrap();

    assert!(restored.estimator().is_fitted());
    assert_eq!(restored.predict(StageData::from(probe)).unwrap(), expected);
}

#[test]
fn same_seed_reproduces_labels() {
    let training = synthetic_clip(0.0, 4.0);
    let mut first = canonical_pipeline();
    let mut second = canonical_pipeline();
    let a = first.fit_predict(StageData::from(training.clone())).unwrap();
    let b = second.fit_predict(StageData::from(training)).unwrap();
    assert_eq!(a, b);
}
