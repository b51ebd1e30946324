use matchscan_classifier::{Classification, Classifier, ClassifierError};
use matchscan_decoder::{FrameSource, read_frame_at};
use matchscan_types::{DetectionSample, Frame, FrameError, FrameIndex, Label, SampleIndex};
use thiserror::Error;
use tracing::{debug, warn};

/// The raw, per-stride detection record of one sweep.
///
/// Built append-only by [`HistoryRecorder`] and immutable afterwards.
#[derive(Debug, Clone)]
pub struct History {
    samples: Vec<DetectionSample>,
    step_size: u64,
    total_frames: u64,
    complete: bool,
}

impl History {
    /// Number of samples a complete sweep produces: `ceil(total / step)`.
    pub fn expected_len(total_frames: u64, step_size: u64) -> usize {
        if step_size == 0 {
            return 0;
        }
        total_frames.div_ceil(step_size) as usize
    }

    pub fn samples(&self) -> &[DetectionSample] {
        &self.samples
    }

    pub fn labels(&self) -> Vec<Option<Label>> {
        self.samples.iter().map(|sample| sample.label).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn step_size(&self) -> u64 {
        self.step_size
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// False when the sweep was aborted before the last stride step.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn frame_of(&self, sample: SampleIndex) -> FrameIndex {
        sample as u64 * self.step_size
    }
}

pub struct HistoryRecorder {
    step_size: u64,
    total_frames: u64,
    samples: Vec<DetectionSample>,
}

impl HistoryRecorder {
    pub fn new(step_size: u64, total_frames: u64) -> Result<Self, SweepError> {
        if step_size == 0 {
            return Err(SweepError::InvalidStepSize);
        }
        let capacity = History::expected_len(total_frames, step_size);
        Ok(Self {
            step_size,
            total_frames,
            samples: Vec::with_capacity(capacity),
        })
    }

    /// Frame the next recorded sample belongs to, or `None` once the sweep
    /// has covered the whole video.
    pub fn next_frame(&self) -> Option<FrameIndex> {
        let frame = self.samples.len() as u64 * self.step_size;
        (frame < self.total_frames).then_some(frame)
    }

    /// Appends the outcome for the next stride step.
    pub fn record(&mut self, outcome: Option<Classification>) -> &DetectionSample {
        let sample_index = self.samples.len();
        let frame_index = sample_index as u64 * self.step_size;
        let sample = match outcome {
            Some(found) => DetectionSample {
                sample_index,
                frame_index,
                label: Some(found.label),
                bbox: Some(found.bbox),
                confidence: found.confidence,
            },
            None => DetectionSample::missing(sample_index, frame_index),
        };
        self.samples.push(sample);
        &self.samples[sample_index]
    }

    pub fn finish(self) -> History {
        let complete =
            self.samples.len() == History::expected_len(self.total_frames, self.step_size);
        History {
            samples: self.samples,
            step_size: self.step_size,
            total_frames: self.total_frames,
            complete,
        }
    }
}

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("step size must be at least one frame")]
    InvalidStepSize,
    #[error("classifier failed at frame {frame}: {source}")]
    Classifier {
        frame: FrameIndex,
        #[source]
        source: ClassifierError,
    },
}

/// What the sweep observer sees after each recorded sample.
pub struct SweepEvent<'a> {
    pub frame: &'a Frame,
    pub sample: &'a DetectionSample,
    pub expected_samples: usize,
}

pub struct SweepOutcome {
    pub history: History,
    /// Decode failure that cut the sweep short, if any.
    pub failure: Option<FrameError>,
}

/// Samples every `step_size`-th frame of `[0, total_frames)` in order.
///
/// A seek or read failure stops the sweep; the samples recorded so far are
/// kept and the failure is returned alongside them.
pub fn sweep<S, C, F>(
    source: &mut S,
    classifier: &mut C,
    step_size: u64,
    total_frames: u64,
    mut observer: F,
) -> Result<SweepOutcome, SweepError>
where
    S: FrameSource + ?Sized,
    C: Classifier + ?Sized,
    F: FnMut(SweepEvent<'_>),
{
    let mut recorder = HistoryRecorder::new(step_size, total_frames)?;
    let expected_samples = History::expected_len(total_frames, step_size);
    let mut failure = None;

    while let Some(frame_index) = recorder.next_frame() {
        let frame = match read_frame_at(source, frame_index) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(frame = frame_index, error = %err, "sweep aborted by decode failure");
                failure = Some(err);
                break;
            }
        };
        let outcome = classifier
            .classify(&frame)
            .map_err(|source| SweepError::Classifier {
                frame: frame_index,
                source,
            })?;
        let sample = recorder.record(outcome);
        observer(SweepEvent {
            frame: &frame,
            sample,
            expected_samples,
        });
    }

    let history = recorder.finish();
    debug!(
        samples = history.len(),
        expected = expected_samples,
        complete = history.is_complete(),
        "sweep finished"
    );
    Ok(SweepOutcome { history, failure })
}

#[cfg(test)]
mod tests {
    use matchscan_classifier::{ClassifierConfig, ClassifierSession, TimelineDetector, TimelineWindow};
    use matchscan_decoder::backends::synthetic::SyntheticSource;

    use super::*;

    fn session(windows: Vec<TimelineWindow>) -> ClassifierSession {
        let detector = TimelineDetector::new(windows).unwrap();
        ClassifierSession::open(Box::new(detector), ClassifierConfig::default())
    }

    #[test]
    fn expected_len_rounds_up() {
        assert_eq!(History::expected_len(600, 60), 10);
        assert_eq!(History::expected_len(601, 60), 11);
        assert_eq!(History::expected_len(59, 60), 1);
        assert_eq!(History::expected_len(0, 60), 0);
    }

    #[test]
    fn sweep_records_one_sample_per_step() {
        let mut source = SyntheticSource::with_total_frames(600);
        let mut classifier = session(vec![TimelineWindow::new("battlefield", 120, 300)]);
        let mut observed = 0;
        let outcome = sweep(&mut source, &mut classifier, 60, 600, |_| observed += 1).unwrap();
        let history = outcome.history;

        assert!(outcome.failure.is_none());
        assert_eq!(history.len(), 10);
        assert_eq!(observed, 10);
        assert!(history.is_complete());
        let labelled: Vec<bool> = history.labels().iter().map(Option::is_some).collect();
        assert_eq!(
            labelled,
            vec![false, false, true, true, true, false, false, false, false, false]
        );
        assert_eq!(history.samples()[3].frame_index, 180);
    }

    #[test]
    fn missing_detection_maps_to_empty_sample() {
        let mut source = SyntheticSource::with_total_frames(120);
        let mut classifier = session(Vec::new());
        let outcome = sweep(&mut source, &mut classifier, 60, 120, |_| {}).unwrap();
        let sample = &outcome.history.samples()[1];
        assert_eq!(sample.label, None);
        assert_eq!(sample.bbox, None);
        assert_eq!(sample.confidence, 0.0);
    }

    #[test]
    fn decode_failure_keeps_committed_samples() {
        let mut source = SyntheticSource::with_total_frames(600).with_failure_at(240);
        let mut classifier = session(Vec::new());
        let outcome = sweep(&mut source, &mut classifier, 60, 600, |_| {}).unwrap();
        assert!(outcome.failure.is_some());
        assert_eq!(outcome.history.len(), 4);
        assert!(!outcome.history.is_complete());
    }

    #[test]
    fn unknown_label_aborts_the_sweep() {
        let mut source = SyntheticSource::with_total_frames(600);
        let mut classifier = session(vec![TimelineWindow::new("hyrule", 0, 600)]);
        let result = sweep(&mut source, &mut classifier, 60, 600, |_| {});
        assert!(matches!(
            result,
            Err(SweepError::Classifier {
                frame: 0,
                source: ClassifierError::UnknownLabel { .. }
            })
        ));
    }

    #[test]
    fn zero_step_is_rejected() {
        assert!(matches!(
            HistoryRecorder::new(0, 600),
            Err(SweepError::InvalidStepSize)
        ));
    }
}
