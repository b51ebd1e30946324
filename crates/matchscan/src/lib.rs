//! Stage segmentation for recorded match videos.
//!
//! A video is sampled every `step_size` frames and each sample is classified.
//! The resulting history is cleaned, split into per-label segments and the
//! segment boundaries are refined to single frames with a handful of extra
//! classifier queries around each boundary.

pub mod app;
pub mod cli;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod settings;
pub mod stage;

pub use pipeline::{Pipeline, PipelineError, ScanConfig, ScanReport};
pub use stage::bbox::{BoxPolicy, aggregate_boxes};
pub use stage::gap_fill::fill_gaps;
pub use stage::history::{History, HistoryRecorder, SweepError, SweepEvent, SweepOutcome, sweep};
pub use stage::noise::{NoiseFilter, NoisePolicy, filter_noise};
pub use stage::refine::{
    BoundaryRefiner, RefineError, RefineSettings, RefineStats, RefineStrategy,
};
pub use stage::segments::extract_segments;
