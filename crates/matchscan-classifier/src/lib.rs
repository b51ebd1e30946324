pub mod backends;

mod config;
mod session;

pub use backends::timeline::{TimelineDetector, TimelineWindow};
pub use config::{ClassifierConfig, DEFAULT_CONFIDENCE_FLOOR, DEFAULT_LABELS};
pub use session::{Classification, Classifier, ClassifierSession};

use matchscan_types::{BoundingBox, Frame};
use thiserror::Error;

/// One raw detection as reported by a model backend, before top-1 selection.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub label: String,
    pub bbox: BoundingBox,
    pub confidence: f32,
}

/// The external object-detection model.
///
/// Backends report every detection they find; [`ClassifierSession`] applies
/// the confidence floor, picks the strongest one and validates its label.
pub trait DetectorBackend: Send {
    fn name(&self) -> &'static str;

    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>, ClassifierError>;

    /// Releases model resources. Called exactly once per session.
    fn close(&mut self) -> Result<(), ClassifierError> {
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("{backend} detector failed: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },
    #[error("detector returned label '{label}' which is not in the configured label set")]
    UnknownLabel { label: String },
    #[error("detector returned a non-finite confidence for label '{label}'")]
    InvalidConfidence { label: String },
    #[error("frame carries no frame index; the {backend} detector needs one")]
    MissingFrameIndex { backend: &'static str },
    #[error("failed to read detection timeline {path}: {source}")]
    TimelineIo {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse detection timeline: {0}")]
    TimelineParse(#[from] serde_json::Error),
    #[error("invalid detection timeline: {0}")]
    InvalidTimeline(String),
    #[error("invalid classifier configuration: {0}")]
    Configuration(String),
}

impl ClassifierError {
    pub fn backend(backend: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            backend,
            message: message.into(),
        }
    }
}
