use std::fmt;
use std::str::FromStr;

use matchscan_classifier::{Classifier, ClassifierError};
use matchscan_decoder::{FrameSource, read_frame_at};
use matchscan_types::{BoundingBox, FrameIndex, Label, RefinedSegment, Segment};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_VOTES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefineStrategy {
    /// Binary search over the stride window. Assumes the classifier does
    /// not flicker inside the window.
    #[default]
    Bisection,
    /// Probe every frame of the window in order.
    Linear,
}

impl RefineStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefineStrategy::Bisection => "bisection",
            RefineStrategy::Linear => "linear",
        }
    }
}

impl fmt::Display for RefineStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefineStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bisection" | "bisect" | "binary" => Ok(RefineStrategy::Bisection),
            "linear" | "scan" => Ok(RefineStrategy::Linear),
            other => Err(format!(
                "unknown refine strategy '{other}' (expected bisection or linear)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefineSettings {
    pub strategy: RefineStrategy,
    /// Classifier calls per probed frame; the answer needs a strict majority.
    pub votes: u32,
    /// Bisection probe cap per boundary. `None` derives it from the step.
    pub max_probes: Option<u32>,
}

impl Default for RefineSettings {
    fn default() -> Self {
        Self {
            strategy: RefineStrategy::default(),
            votes: DEFAULT_VOTES,
            max_probes: None,
        }
    }
}

impl RefineSettings {
    /// `ceil(log2(step)) + 2` unless overridden.
    pub fn probe_budget(&self, step_size: u64) -> u32 {
        self.max_probes.unwrap_or_else(|| {
            let bits = step_size.max(1).next_power_of_two().trailing_zeros();
            bits + 2
        })
    }
}

/// Per-boundary accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoundaryStats {
    pub probes: u32,
    pub invocations: u64,
    pub converged: bool,
}

/// Totals over every refined boundary of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RefineStats {
    pub boundaries: u64,
    pub probes: u64,
    pub invocations: u64,
    pub unconverged: u64,
}

impl RefineStats {
    fn absorb(&mut self, boundary: &BoundaryStats) {
        self.boundaries += 1;
        self.probes += u64::from(boundary.probes);
        self.invocations += boundary.invocations;
        if !boundary.converged {
            self.unconverged += 1;
        }
    }
}

#[derive(Debug, Error)]
pub enum RefineError {
    #[error("invalid refine settings: {0}")]
    InvalidSettings(String),
    #[error("classifier failed while refining frame {frame}: {source}")]
    Classifier {
        frame: FrameIndex,
        #[source]
        source: ClassifierError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Probe {
    Present,
    Absent,
    /// No answer reached a strict majority.
    Unstable,
    /// The frame could not be decoded.
    Unavailable,
}

/// Narrows stride-resolution segment boundaries to single frames.
///
/// Holds the decode cursor and the classifier exclusively; segments are
/// refined one after another, so seeks never interleave.
pub struct BoundaryRefiner<'a, S: ?Sized, C: ?Sized> {
    source: &'a mut S,
    classifier: &'a mut C,
    step_size: u64,
    total_frames: u64,
    settings: RefineSettings,
    stats: RefineStats,
}

impl<'a, S, C> BoundaryRefiner<'a, S, C>
where
    S: FrameSource + ?Sized,
    C: Classifier + ?Sized,
{
    pub fn new(
        source: &'a mut S,
        classifier: &'a mut C,
        step_size: u64,
        total_frames: u64,
        settings: RefineSettings,
    ) -> Result<Self, RefineError> {
        if step_size == 0 {
            return Err(RefineError::InvalidSettings(
                "step size must be at least one frame".into(),
            ));
        }
        if settings.votes == 0 {
            return Err(RefineError::InvalidSettings(
                "votes must be at least one".into(),
            ));
        }
        Ok(Self {
            source,
            classifier,
            step_size,
            total_frames,
            settings,
            stats: RefineStats::default(),
        })
    }

    pub fn stats(&self) -> RefineStats {
        self.stats
    }

    pub fn refine_all(
        &mut self,
        segments: &[Segment],
        boxes: &[Option<BoundingBox>],
    ) -> Result<Vec<RefinedSegment>, RefineError> {
        segments
            .iter()
            .enumerate()
            .map(|(index, segment)| self.refine(segment, boxes.get(index).copied().flatten()))
            .collect()
    }

    pub fn refine(
        &mut self,
        segment: &Segment,
        bbox: Option<BoundingBox>,
    ) -> Result<RefinedSegment, RefineError> {
        let (start_frame, start_stats) = self.refine_start(segment)?;
        let (end_frame, end_stats) = self.refine_end(segment)?;
        self.stats.absorb(&start_stats);
        self.stats.absorb(&end_stats);
        debug!(
            label = %segment.label,
            coarse_start = segment.start,
            coarse_end = segment.end,
            start_frame,
            end_frame,
            start_probes = start_stats.probes,
            end_probes = end_stats.probes,
            "refined segment"
        );
        Ok(RefinedSegment {
            start_frame,
            end_frame,
            label: segment.label,
            bbox,
        })
    }

    /// First frame of the segment, searched in `((s-1)*step, s*step]`.
    fn refine_start(&mut self, segment: &Segment) -> Result<(FrameIndex, BoundaryStats), RefineError> {
        let present = segment.start as u64 * self.step_size;
        if segment.start == 0 {
            return Ok((
                0,
                BoundaryStats {
                    converged: true,
                    ..BoundaryStats::default()
                },
            ));
        }
        let absent = present - self.step_size;
        match self.settings.strategy {
            RefineStrategy::Bisection => self.bisect(segment.label, present, absent, Edge::Start),
            RefineStrategy::Linear => self.scan_start(segment.label, absent, present),
        }
    }

    /// Last frame of the segment, searched in `[e*step, min((e+1)*step, total))`.
    fn refine_end(&mut self, segment: &Segment) -> Result<(FrameIndex, BoundaryStats), RefineError> {
        let present = segment.end as u64 * self.step_size;
        let absent = (present + self.step_size).min(self.total_frames.max(present + 1));
        match self.settings.strategy {
            RefineStrategy::Bisection => self.bisect(segment.label, present, absent, Edge::End),
            RefineStrategy::Linear => self.scan_end(segment.label, present, absent),
        }
    }

    /// Keeps `present` on a frame showing the label and `absent` on one that
    /// does not, halving the gap until they touch. Stops early at the probe
    /// cap or on an unreliable probe; the present side is reported either way.
    fn bisect(
        &mut self,
        label: Label,
        mut present: FrameIndex,
        mut absent: FrameIndex,
        edge: Edge,
    ) -> Result<(FrameIndex, BoundaryStats), RefineError> {
        let budget = self.settings.probe_budget(self.step_size);
        let mut stats = BoundaryStats::default();

        while present.abs_diff(absent) > 1 {
            if stats.probes >= budget {
                warn!(%label, ?edge, present, absent, budget, "refinement hit its probe cap");
                break;
            }
            let mid = present.min(absent) + present.abs_diff(absent) / 2;
            match self.probe(label, mid, &mut stats)? {
                Probe::Present => present = mid,
                Probe::Absent => absent = mid,
                Probe::Unstable | Probe::Unavailable => {
                    warn!(%label, ?edge, frame = mid, present, "refinement stopped on an unreliable frame");
                    break;
                }
            }
        }

        stats.converged = present.abs_diff(absent) <= 1;
        Ok((present, stats))
    }

    fn scan_start(
        &mut self,
        label: Label,
        absent: FrameIndex,
        present: FrameIndex,
    ) -> Result<(FrameIndex, BoundaryStats), RefineError> {
        let mut stats = BoundaryStats {
            converged: true,
            ..BoundaryStats::default()
        };
        for frame in absent + 1..present {
            match self.probe(label, frame, &mut stats)? {
                Probe::Present => return Ok((frame, stats)),
                Probe::Absent => {}
                Probe::Unstable | Probe::Unavailable => stats.converged = false,
            }
        }
        Ok((present, stats))
    }

    fn scan_end(
        &mut self,
        label: Label,
        present: FrameIndex,
        absent: FrameIndex,
    ) -> Result<(FrameIndex, BoundaryStats), RefineError> {
        let mut stats = BoundaryStats {
            converged: true,
            ..BoundaryStats::default()
        };
        for frame in present + 1..absent {
            match self.probe(label, frame, &mut stats)? {
                Probe::Absent => return Ok((frame - 1, stats)),
                Probe::Present => {}
                Probe::Unstable | Probe::Unavailable => stats.converged = false,
            }
        }
        Ok((absent - 1, stats))
    }

    /// Reads `frame` once and classifies it up to `votes` times.
    fn probe(
        &mut self,
        label: Label,
        frame: FrameIndex,
        stats: &mut BoundaryStats,
    ) -> Result<Probe, RefineError> {
        stats.probes += 1;
        let image = match read_frame_at(&mut *self.source, frame) {
            Ok(image) => image,
            Err(err) => {
                warn!(frame, error = %err, "failed to read frame during refinement");
                return Ok(Probe::Unavailable);
            }
        };

        let majority = self.settings.votes / 2 + 1;
        let (mut present, mut absent) = (0u32, 0u32);
        for _ in 0..self.settings.votes {
            stats.invocations += 1;
            let result = self
                .classifier
                .classify(&image)
                .map_err(|source| RefineError::Classifier { frame, source })?;
            if result.is_some_and(|found| found.label == label) {
                present += 1;
            } else {
                absent += 1;
            }
            if present >= majority {
                return Ok(Probe::Present);
            }
            if absent >= majority {
                return Ok(Probe::Absent);
            }
        }
        debug!(frame, present, absent, "no majority across repeated queries");
        Ok(Probe::Unstable)
    }
}

#[derive(Debug, Clone, Copy)]
enum Edge {
    Start,
    End,
}
