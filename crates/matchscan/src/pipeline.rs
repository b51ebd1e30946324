use std::time::{Duration, Instant};

use matchscan_classifier::Classifier;
use matchscan_decoder::FrameSource;
use matchscan_types::{BoundingBox, FrameError, Label, RefinedSegment, Segment};
use thiserror::Error;
use tracing::{info, warn};

use crate::stage::bbox::{BoxPolicy, aggregate_boxes};
use crate::stage::gap_fill::fill_gaps;
use crate::stage::history::{History, SweepError, SweepEvent, sweep};
use crate::stage::noise::{DEFAULT_MIN_MATCH_DURATION, NoiseFilter, NoisePolicy};
use crate::stage::refine::{BoundaryRefiner, RefineError, RefineSettings, RefineStats};
use crate::stage::segments::extract_segments;

pub const DEFAULT_STEP_SIZE: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanConfig {
    pub step_size: u64,
    /// Shortest labelled run, in frames, that survives noise filtering.
    pub min_match_duration: u64,
    pub noise_policy: NoisePolicy,
    pub box_policy: BoxPolicy,
    pub refine: RefineSettings,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            step_size: DEFAULT_STEP_SIZE,
            min_match_duration: DEFAULT_MIN_MATCH_DURATION,
            noise_policy: NoisePolicy::default(),
            box_policy: BoxPolicy::default(),
            refine: RefineSettings::default(),
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.step_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "step size must be at least one frame".into(),
            ));
        }
        if self.refine.votes == 0 {
            return Err(PipelineError::InvalidConfig(
                "votes must be at least one".into(),
            ));
        }
        if self.refine.max_probes == Some(0) {
            return Err(PipelineError::InvalidConfig(
                "max probes must be at least one".into(),
            ));
        }
        Ok(())
    }

    /// Gap filling followed by noise filtering.
    pub fn clean(&self, labels: &[Option<Label>]) -> Vec<Option<Label>> {
        let filled = fill_gaps(labels);
        NoiseFilter::new(self.min_match_duration, self.step_size, self.noise_policy).apply(&filled)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid scan configuration: {0}")]
    InvalidConfig(String),
    #[error("the {backend} source does not report a frame count")]
    UnknownLength { backend: &'static str },
    #[error(transparent)]
    Sweep(#[from] SweepError),
    #[error(transparent)]
    Refine(#[from] RefineError),
}

/// Everything one run produced, read-only for reporters.
#[derive(Debug)]
pub struct ScanReport {
    pub history: History,
    pub cleaned: Vec<Option<Label>>,
    pub segments: Vec<Segment>,
    /// Representative box per entry of `segments`.
    pub boxes: Vec<Option<BoundingBox>>,
    /// Empty when the sweep was incomplete.
    pub refined: Vec<RefinedSegment>,
    pub sweep_failure: Option<FrameError>,
    pub sweep_elapsed: Duration,
    /// Sampled frames per wall-clock second during the sweep.
    pub average_fps: f64,
    pub refine_stats: RefineStats,
}

impl ScanReport {
    pub fn is_complete(&self) -> bool {
        self.sweep_failure.is_none() && self.history.is_complete()
    }
}

pub struct Pipeline {
    config: ScanConfig,
}

impl Pipeline {
    pub fn new(config: ScanConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Sweeps the source, cleans the history, extracts segments and refines
    /// their boundaries.
    ///
    /// A decode failure during the sweep is not an error here: the report
    /// carries the partial history and the failure, and refinement is
    /// skipped.
    pub fn run<S, C, F>(
        &self,
        source: &mut S,
        classifier: &mut C,
        observer: F,
    ) -> Result<ScanReport, PipelineError>
    where
        S: FrameSource + ?Sized,
        C: Classifier + ?Sized,
        F: FnMut(SweepEvent<'_>),
    {
        let config = &self.config;
        let total_frames = source
            .metadata()
            .calculate_total_frames()
            .ok_or(PipelineError::UnknownLength {
                backend: source.backend_name(),
            })?;

        let started = Instant::now();
        let outcome = sweep(
            &mut *source,
            &mut *classifier,
            config.step_size,
            total_frames,
            observer,
        )?;
        let sweep_elapsed = started.elapsed();
        let history = outcome.history;
        let average_fps = if sweep_elapsed.as_secs_f64() > 0.0 {
            history.len() as f64 / sweep_elapsed.as_secs_f64()
        } else {
            0.0
        };
        info!(
            samples = history.len(),
            total_frames,
            step = config.step_size,
            elapsed_ms = sweep_elapsed.as_millis() as u64,
            average_fps,
            "sweep finished"
        );

        let cleaned = config.clean(&history.labels());
        let segments = extract_segments(&cleaned);
        let boxes = aggregate_boxes(history.samples(), &segments, config.box_policy);
        info!(segments = segments.len(), "segments extracted");

        let mut refine_stats = RefineStats::default();
        let refined = if outcome.failure.is_none() && history.is_complete() {
            let mut refiner = BoundaryRefiner::new(
                source,
                classifier,
                config.step_size,
                total_frames,
                config.refine,
            )?;
            let refined = refiner.refine_all(&segments, &boxes)?;
            refine_stats = refiner.stats();
            info!(
                boundaries = refine_stats.boundaries,
                probes = refine_stats.probes,
                invocations = refine_stats.invocations,
                unconverged = refine_stats.unconverged,
                strategy = %config.refine.strategy,
                "boundaries refined"
            );
            refined
        } else {
            warn!(
                samples = history.len(),
                expected = History::expected_len(total_frames, config.step_size),
                "sweep incomplete; skipping boundary refinement"
            );
            Vec::new()
        };

        Ok(ScanReport {
            history,
            cleaned,
            segments,
            boxes,
            refined,
            sweep_failure: outcome.failure,
            sweep_elapsed,
            average_fps,
            refine_stats,
        })
    }
}
