use std::str::FromStr;

use matchscan_classifier::{
    ClassifierConfig, ClassifierError, ClassifierSession, TimelineDetector,
};
use matchscan_decoder::{Backend, Configuration, FrameError};
use matchscan_types::LabelSet;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::pipeline::{Pipeline, PipelineError, ScanReport};
use crate::progress::ProgressEvent;
use crate::report::{ImageReporter, OutputError, Reporter, TimelineReporter, render_report};
use crate::settings::{ConfigError, EffectiveSettings};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("no video name given; pass one as the first argument")]
    MissingVideo,
    #[error("no detector configured; pass --detections <FILE> or set it in the config file")]
    MissingDetector,
    #[error("failed to open video: {0}")]
    Open(#[source] FrameError),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Output(#[from] OutputError),
}

/// A finished scan and the label set its labels index into.
pub struct ScanOutcome {
    pub report: ScanReport,
    pub labels: LabelSet,
}

/// Builds the decoder configuration: environment first, then settings.
pub fn decoder_configuration(settings: &EffectiveSettings) -> Result<Configuration, AppError> {
    let mut config = Configuration::from_env().map_err(AppError::Open)?;
    if let Some(name) = settings.backend.as_deref() {
        config.backend = Backend::from_str(name).map_err(AppError::Open)?;
    }
    let video = settings.video_path().ok_or(AppError::MissingVideo)?;
    config.input = Some(video);
    if !Configuration::available_backends().contains(&config.backend) {
        return Err(AppError::Open(FrameError::unsupported(config.backend.as_str())));
    }
    Ok(config)
}

/// Runs one scan end to end on the calling thread and renders the text and
/// image reports. Blocks on decoding and classification.
pub fn execute(
    settings: &EffectiveSettings,
    progress: Option<mpsc::Sender<ProgressEvent>>,
) -> Result<ScanOutcome, AppError> {
    let pipeline = Pipeline::new(settings.scan)?;
    let decoder = decoder_configuration(settings)?;

    let detections = settings
        .detections
        .as_deref()
        .ok_or(AppError::MissingDetector)?;
    let detector = TimelineDetector::load(detections)?;
    let classifier_config =
        ClassifierConfig::with_label_names(settings.labels.iter().cloned(), settings.confidence_floor)?;
    let labels = classifier_config.labels.clone();
    let mut session = ClassifierSession::open(Box::new(detector), classifier_config);

    let mut source = decoder.create_source().map_err(AppError::Open)?;
    info!(
        backend = source.backend_name(),
        input = ?decoder.input,
        detector = session.backend_name(),
        "scan started"
    );

    let mut images = if settings.save_frames {
        Some(ImageReporter::new(&settings.output_dir)?)
    } else {
        None
    };

    let report = {
        let images = &mut images;
        pipeline.run(&mut source, &mut session, |event| {
            if let Some(tx) = progress.as_ref() {
                let sent = tx.blocking_send(ProgressEvent {
                    samples: event.sample.sample_index as u64 + 1,
                    expected: event.expected_samples as u64,
                    frame_index: event.sample.frame_index,
                    detected: event.sample.label.is_some(),
                });
                if sent.is_err() {
                    debug!(frame = event.sample.frame_index, "progress receiver closed");
                }
            }
            if let Some(reporter) = images.as_mut() {
                if let Err(err) =
                    reporter.save_sample(event.frame, event.sample.frame_index, event.sample.bbox)
                {
                    warn!(frame = event.sample.frame_index, error = %err, "failed to save sampled frame");
                }
            }
        })?
    };
    drop(progress);

    let mut timeline = settings.display.then(TimelineReporter::stdout);
    let mut reporters: Vec<&mut dyn Reporter> = Vec::new();
    if let Some(reporter) = timeline.as_mut() {
        reporters.push(reporter);
    }
    if let Some(reporter) = images.as_mut() {
        reporters.push(reporter);
    }
    render_report(&mut source, &report, &labels, &mut reporters)?;
    if let Some(reporter) = images.as_ref() {
        debug!(written = reporter.written(), dir = %reporter.directory().display(), "saved frames");
    }

    session.close()?;
    Ok(ScanOutcome { report, labels })
}
