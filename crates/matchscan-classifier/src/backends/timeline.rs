use std::fs;
use std::path::Path;

use matchscan_types::{BoundingBox, Frame, FrameIndex};
use serde::Deserialize;

use crate::{ClassifierError, DetectorBackend, RawDetection};

const BACKEND_NAME: &str = "timeline";
const DEFAULT_CONFIDENCE: f32 = 0.9;

/// A label that is visible on frames `[start, end)`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TimelineWindow {
    pub label: String,
    pub start: FrameIndex,
    pub end: FrameIndex,
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

impl TimelineWindow {
    pub fn new(label: impl Into<String>, start: FrameIndex, end: FrameIndex) -> Self {
        Self {
            label: label.into(),
            start,
            end,
            bbox: None,
            confidence: DEFAULT_CONFIDENCE,
        }
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    fn covers(&self, frame: FrameIndex) -> bool {
        (self.start..self.end).contains(&frame)
    }
}

fn default_confidence() -> f32 {
    DEFAULT_CONFIDENCE
}

#[derive(Debug, Deserialize)]
struct TimelineFile {
    windows: Vec<TimelineWindow>,
}

/// Replays recorded detections keyed by absolute frame index.
///
/// Useful for re-running the cleaning and refinement stages against the
/// output of an offline model run, and as a deterministic classifier in
/// tests.
#[derive(Debug, Clone)]
pub struct TimelineDetector {
    windows: Vec<TimelineWindow>,
}

impl TimelineDetector {
    pub fn new(windows: Vec<TimelineWindow>) -> Result<Self, ClassifierError> {
        for window in &windows {
            if window.start >= window.end {
                return Err(ClassifierError::InvalidTimeline(format!(
                    "window for '{}' has start {} not before end {}",
                    window.label, window.start, window.end
                )));
            }
        }
        Ok(Self { windows })
    }

    pub fn from_json(contents: &str) -> Result<Self, ClassifierError> {
        let file: TimelineFile = serde_json::from_str(contents)?;
        Self::new(file.windows)
    }

    pub fn load(path: &Path) -> Result<Self, ClassifierError> {
        let contents = fs::read_to_string(path).map_err(|source| ClassifierError::TimelineIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&contents)
    }

    pub fn windows(&self) -> &[TimelineWindow] {
        &self.windows
    }
}

impl DetectorBackend for TimelineDetector {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>, ClassifierError> {
        let index = frame.frame_index().ok_or(ClassifierError::MissingFrameIndex {
            backend: BACKEND_NAME,
        })?;
        let full_frame =
            BoundingBox::from_corners(0, 0, frame.width() as i32, frame.height() as i32);
        Ok(self
            .windows
            .iter()
            .filter(|window| window.covers(index))
            .map(|window| RawDetection {
                label: window.label.clone(),
                bbox: window.bbox.unwrap_or(full_frame),
                confidence: window.confidence,
            })
            .collect())
    }
}
