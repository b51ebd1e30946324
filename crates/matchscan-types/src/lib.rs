//! Shared domain models for the matchscan workspace.
//!
//! This crate centralizes the lightweight data structures exchanged between
//! the decoder, classifier and pipeline crates. Keep it backend-agnostic so
//! every crate can depend on it without pulling in native decoders or model
//! runtimes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Absolute frame number in the source video.
pub type FrameIndex = u64;

/// Position in the strided sample sequence; `frame = sample * step_size`.
pub type SampleIndex = usize;

pub type FrameResult<T> = Result<T, FrameError>;

/// A decoded luma plane.
#[derive(Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    stride: usize,
    frame_index: Option<FrameIndex>,
    timestamp: Option<Duration>,
    data: Arc<[u8]>,
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("timestamp", &self.timestamp)
            .field("bytes", &self.data.len())
            .field("frame_index", &self.frame_index)
            .finish()
    }
}

impl Frame {
    pub fn from_owned(
        width: u32,
        height: u32,
        stride: usize,
        timestamp: Option<Duration>,
        data: Vec<u8>,
    ) -> FrameResult<Self> {
        let required =
            stride
                .checked_mul(height as usize)
                .ok_or_else(|| FrameError::InvalidFrame {
                    reason: "calculated plane length overflowed".into(),
                })?;
        if data.len() < required {
            return Err(FrameError::InvalidFrame {
                reason: format!(
                    "insufficient plane bytes: got {} expected at least {}",
                    data.len(),
                    required
                ),
            });
        }
        if (width as usize) > stride {
            return Err(FrameError::InvalidFrame {
                reason: format!("width {width} exceeds stride {stride}"),
            });
        }
        Ok(Self {
            width,
            height,
            stride,
            timestamp,
            data: Arc::from(data.into_boxed_slice()),
            frame_index: None,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn timestamp(&self) -> Option<Duration> {
        self.timestamp
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn frame_index(&self) -> Option<FrameIndex> {
        self.frame_index
    }

    pub fn with_frame_index(mut self, index: Option<FrameIndex>) -> Self {
        self.frame_index = index;
        self
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("backend {backend} is not supported in this build")]
    Unsupported { backend: &'static str },

    #[error("{backend} backend failed: {message}")]
    BackendFailure {
        backend: &'static str,
        message: String,
    },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("invalid frame: {reason}")]
    InvalidFrame { reason: String },

    #[error("frame {frame} is outside the video (total {total})")]
    OutOfRange { frame: FrameIndex, total: u64 },

    #[error("stream ended before frame {frame}")]
    EndOfStream { frame: FrameIndex },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    pub fn unsupported(backend: &'static str) -> Self {
        Self::Unsupported { backend }
    }

    pub fn backend_failure(backend: &'static str, message: impl Into<String>) -> Self {
        Self::BackendFailure {
            backend,
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned box given by its top-left and bottom-right corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub top_left: Point,
    pub bottom_right: Point,
}

impl BoundingBox {
    pub fn new(top_left: Point, bottom_right: Point) -> Self {
        Self {
            top_left,
            bottom_right,
        }
    }

    pub fn from_corners(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self::new(Point::new(x0, y0), Point::new(x1, y1))
    }

    pub fn width(&self) -> i32 {
        self.bottom_right.x - self.top_left.x
    }

    pub fn height(&self) -> i32 {
        self.bottom_right.y - self.top_left.y
    }
}

/// Index of a label inside a [`LabelSet`].
///
/// "No detection" is never a `Label`; it is `Option::<Label>::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Label(u16);

impl Label {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index form `#N`. A `Label` does not know its name; resolve it through the
/// owning [`LabelSet`] where one is at hand.
impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The fixed, ordered set of labels a classifier may emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
    names: Vec<String>,
}

impl LabelSet {
    pub fn new<I, S>(names: I) -> Result<Self, LabelSetError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut collected: Vec<String> = Vec::new();
        for name in names {
            let name = name.into();
            let trimmed = name.trim();
            if trimmed.is_empty() {
                return Err(LabelSetError::EmptyName);
            }
            if collected.iter().any(|existing| existing == trimmed) {
                return Err(LabelSetError::Duplicate {
                    name: trimmed.to_string(),
                });
            }
            collected.push(trimmed.to_string());
        }
        if collected.is_empty() {
            return Err(LabelSetError::Empty);
        }
        if collected.len() > u16::MAX as usize {
            return Err(LabelSetError::TooMany {
                count: collected.len(),
            });
        }
        Ok(Self { names: collected })
    }

    pub fn lookup(&self, name: &str) -> Option<Label> {
        self.names
            .iter()
            .position(|candidate| candidate == name)
            .map(|index| Label(index as u16))
    }

    pub fn label(&self, index: usize) -> Option<Label> {
        (index < self.names.len()).then_some(Label(index as u16))
    }

    pub fn name(&self, label: Label) -> Option<&str> {
        self.names.get(label.index()).map(String::as_str)
    }

    pub fn contains(&self, label: Label) -> bool {
        label.index() < self.names.len()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Label, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(index, name)| (Label(index as u16), name.as_str()))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LabelSetError {
    #[error("label set must contain at least one label")]
    Empty,
    #[error("label names must not be blank")]
    EmptyName,
    #[error("label '{name}' appears more than once")]
    Duplicate { name: String },
    #[error("label set holds {count} labels, more than the supported maximum")]
    TooMany { count: usize },
}

/// One classifier outcome per stride step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionSample {
    pub sample_index: SampleIndex,
    pub frame_index: FrameIndex,
    pub label: Option<Label>,
    pub bbox: Option<BoundingBox>,
    pub confidence: f32,
}

impl DetectionSample {
    pub fn missing(sample_index: SampleIndex, frame_index: FrameIndex) -> Self {
        Self {
            sample_index,
            frame_index,
            label: None,
            bbox: None,
            confidence: 0.0,
        }
    }
}

/// A maximal run of one label in the cleaned history, in sample units.
///
/// `start` and `end` are both inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub start: SampleIndex,
    pub end: SampleIndex,
    pub label: Label,
}

impl Segment {
    pub fn sample_count(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn contains(&self, sample: SampleIndex) -> bool {
        (self.start..=self.end).contains(&sample)
    }
}

/// A segment whose boundaries were narrowed to single frames.
///
/// `end_frame` is the last frame on which the label is present.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RefinedSegment {
    pub start_frame: FrameIndex,
    pub end_frame: FrameIndex,
    pub label: Label,
    pub bbox: Option<BoundingBox>,
}

impl RefinedSegment {
    pub fn end_exclusive(&self) -> FrameIndex {
        self.end_frame + 1
    }

    pub fn frame_count(&self) -> u64 {
        self.end_exclusive() - self.start_frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stages() -> LabelSet {
        LabelSet::new(["battlefield", "dreamland", "finaldest"]).unwrap()
    }

    #[test]
    fn label_set_lookup_round_trips_names() {
        let labels = stages();
        let dreamland = labels.lookup("dreamland").unwrap();
        assert_eq!(dreamland.index(), 1);
        assert_eq!(labels.name(dreamland), Some("dreamland"));
        assert!(labels.lookup("yoshis").is_none());
    }

    #[test]
    fn label_set_rejects_duplicates_and_blanks() {
        assert_eq!(
            LabelSet::new(["a", "a"]),
            Err(LabelSetError::Duplicate { name: "a".into() })
        );
        assert_eq!(LabelSet::new(["a", " "]), Err(LabelSetError::EmptyName));
        assert_eq!(
            LabelSet::new(Vec::<String>::new()),
            Err(LabelSetError::Empty)
        );
    }

    #[test]
    fn frame_requires_enough_bytes() {
        assert!(Frame::from_owned(4, 2, 4, None, vec![0; 7]).is_err());
        let frame = Frame::from_owned(4, 2, 4, Some(Duration::from_millis(10)), vec![0; 8])
            .unwrap()
            .with_frame_index(Some(42));
        assert_eq!(frame.frame_index(), Some(42));
        assert_eq!(frame.data().len(), 8);
    }

    #[test]
    fn refined_segment_reports_exclusive_end() {
        let labels = stages();
        let segment = RefinedSegment {
            start_frame: 1000,
            end_frame: 4999,
            label: labels.lookup("battlefield").unwrap(),
            bbox: None,
        };
        assert_eq!(segment.end_exclusive(), 5000);
        assert_eq!(segment.frame_count(), 4000);
    }

    #[test]
    fn label_displays_its_index() {
        let labels = stages();
        let finaldest = labels.lookup("finaldest").unwrap();
        assert_eq!(finaldest.to_string(), "#2");
        assert_eq!(labels.name(finaldest), Some("finaldest"));
    }

    #[test]
    fn label_serializes_as_index() {
        let labels = stages();
        let label = labels.lookup("finaldest").unwrap();
        assert_eq!(serde_json::to_string(&label).unwrap(), "2");
    }
}
