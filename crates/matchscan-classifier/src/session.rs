use matchscan_types::{BoundingBox, Frame, Label, LabelSet};
use tracing::{debug, warn};

use crate::config::ClassifierConfig;
use crate::{ClassifierError, DetectorBackend, RawDetection};

/// The single strongest detection on a frame, mapped into the label set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub label: Label,
    pub bbox: BoundingBox,
    pub confidence: f32,
}

/// Per-frame top-1 classification.
///
/// `Ok(None)` means nothing qualified; it is an expected outcome, never an
/// error.
pub trait Classifier {
    fn classify(&mut self, frame: &Frame) -> Result<Option<Classification>, ClassifierError>;
}

impl<C: Classifier + ?Sized> Classifier for &mut C {
    fn classify(&mut self, frame: &Frame) -> Result<Option<Classification>, ClassifierError> {
        (**self).classify(frame)
    }
}

/// A detector backend held open for the duration of one run.
///
/// The backend is closed by [`ClassifierSession::close`] or, on any other
/// exit path, when the session is dropped.
pub struct ClassifierSession {
    backend: Box<dyn DetectorBackend>,
    config: ClassifierConfig,
    invocations: u64,
    closed: bool,
}

impl ClassifierSession {
    pub fn open(backend: Box<dyn DetectorBackend>, config: ClassifierConfig) -> Self {
        debug!(
            backend = backend.name(),
            labels = config.labels.len(),
            floor = config.confidence_floor,
            "classifier session opened"
        );
        Self {
            backend,
            config,
            invocations: 0,
            closed: false,
        }
    }

    pub fn labels(&self) -> &LabelSet {
        &self.config.labels
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Number of model invocations made through this session.
    pub fn invocations(&self) -> u64 {
        self.invocations
    }

    pub fn close(mut self) -> Result<(), ClassifierError> {
        self.closed = true;
        debug!(
            backend = self.backend.name(),
            invocations = self.invocations,
            "classifier session closed"
        );
        self.backend.close()
    }
}

impl Classifier for ClassifierSession {
    fn classify(&mut self, frame: &Frame) -> Result<Option<Classification>, ClassifierError> {
        self.invocations += 1;
        let detections = self.backend.detect(frame)?;
        select_top(detections, &self.config)
    }
}

impl Drop for ClassifierSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(err) = self.backend.close() {
            warn!(backend = self.backend.name(), error = %err, "failed to close classifier");
        }
    }
}

fn select_top(
    detections: Vec<RawDetection>,
    config: &ClassifierConfig,
) -> Result<Option<Classification>, ClassifierError> {
    let mut best: Option<RawDetection> = None;
    for detection in detections {
        if !detection.confidence.is_finite() {
            return Err(ClassifierError::InvalidConfidence {
                label: detection.label,
            });
        }
        if detection.confidence < config.confidence_floor {
            continue;
        }
        let stronger = best
            .as_ref()
            .is_none_or(|current| detection.confidence > current.confidence);
        if stronger {
            best = Some(detection);
        }
    }

    let Some(best) = best else {
        return Ok(None);
    };
    let label = config
        .labels
        .lookup(&best.label)
        .ok_or(ClassifierError::UnknownLabel { label: best.label })?;
    Ok(Some(Classification {
        label,
        bbox: best.bbox,
        confidence: best.confidence.clamp(0.0, 1.0),
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct FixedDetector {
        detections: Vec<RawDetection>,
        closes: Arc<AtomicUsize>,
    }

    impl DetectorBackend for FixedDetector {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn detect(&mut self, _frame: &Frame) -> Result<Vec<RawDetection>, ClassifierError> {
            Ok(self.detections.clone())
        }

        fn close(&mut self) -> Result<(), ClassifierError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn detection(label: &str, confidence: f32) -> RawDetection {
        RawDetection {
            label: label.to_string(),
            bbox: BoundingBox::from_corners(10, 20, 110, 220),
            confidence,
        }
    }

    fn session(detections: Vec<RawDetection>) -> (ClassifierSession, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        let backend = FixedDetector {
            detections,
            closes: Arc::clone(&closes),
        };
        (
            ClassifierSession::open(Box::new(backend), ClassifierConfig::default()),
            closes,
        )
    }

    fn frame() -> Frame {
        Frame::from_owned(2, 2, 2, None, vec![0; 4]).unwrap()
    }

    #[test]
    fn picks_the_most_confident_detection() {
        let (mut session, _) = session(vec![
            detection("battlefield", 0.4),
            detection("yoshis", 0.9),
            detection("pokemon", 0.6),
        ]);
        let result = session.classify(&frame()).unwrap().unwrap();
        assert_eq!(session.labels().name(result.label), Some("yoshis"));
        assert_eq!(result.confidence, 0.9);
        assert_eq!(session.invocations(), 1);
    }

    #[test]
    fn detections_below_floor_are_ignored() {
        let (mut session, _) = session(vec![detection("battlefield", 0.1)]);
        assert!(session.classify(&frame()).unwrap().is_none());
    }

    #[test]
    fn unknown_label_is_a_hard_failure() {
        let (mut session, _) = session(vec![detection("hyrule", 0.8)]);
        match session.classify(&frame()) {
            Err(ClassifierError::UnknownLabel { label }) => assert_eq!(label, "hyrule"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn unknown_label_below_floor_is_not_inspected() {
        let (mut session, _) = session(vec![detection("hyrule", 0.1)]);
        assert!(session.classify(&frame()).unwrap().is_none());
    }

    #[test]
    fn close_releases_backend_once() {
        let (session, closes) = session(Vec::new());
        session.close().unwrap();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_releases_backend_on_early_exit() {
        let (session, closes) = session(Vec::new());
        drop(session);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }
}
