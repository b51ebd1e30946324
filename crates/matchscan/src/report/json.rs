use std::path::PathBuf;

use matchscan_types::{BoundingBox, FrameIndex, LabelSet, SampleIndex};
use serde::Serialize;
use tokio::fs;

use super::OutputError;
use crate::pipeline::ScanReport;
use crate::stage::refine::RefineStats;

pub const HISTORY_FILENAME: &str = "history.json";
pub const SEGMENTS_FILENAME: &str = "segments.json";

#[derive(Debug, Serialize)]
pub struct HistoryRecord<'a> {
    pub sample_index: SampleIndex,
    pub frame_index: FrameIndex,
    pub label: Option<&'a str>,
    pub cleaned_label: Option<&'a str>,
    pub bbox: Option<BoundingBox>,
    pub confidence: f32,
}

#[derive(Debug, Serialize)]
pub struct SegmentRecord<'a> {
    pub label: &'a str,
    pub start_sample: SampleIndex,
    pub end_sample: SampleIndex,
    pub start_frame: FrameIndex,
    /// Inclusive.
    pub end_frame: FrameIndex,
    pub refined: bool,
    pub bbox: Option<BoundingBox>,
}

#[derive(Debug, Serialize)]
pub struct SegmentsDocument<'a> {
    pub complete: bool,
    pub step_size: u64,
    pub total_frames: u64,
    pub sweep_failure: Option<String>,
    pub refine: RefineStats,
    pub segments: Vec<SegmentRecord<'a>>,
}

/// Writes `history.json` and `segments.json` into one directory.
pub struct JsonReporter {
    directory: PathBuf,
    pretty: bool,
}

impl JsonReporter {
    pub fn new(directory: impl Into<PathBuf>, pretty: bool) -> Self {
        Self {
            directory: directory.into(),
            pretty,
        }
    }

    pub async fn write(&self, report: &ScanReport, labels: &LabelSet) -> Result<(), OutputError> {
        fs::create_dir_all(&self.directory)
            .await
            .map_err(|source| OutputError::io(&self.directory, source))?;
        write_json(
            self.directory.join(HISTORY_FILENAME),
            &history_records(report, labels),
            self.pretty,
        )
        .await?;
        write_json(
            self.directory.join(SEGMENTS_FILENAME),
            &segments_document(report, labels),
            self.pretty,
        )
        .await
    }
}

pub fn history_records<'a>(report: &ScanReport, labels: &'a LabelSet) -> Vec<HistoryRecord<'a>> {
    report
        .history
        .samples()
        .iter()
        .enumerate()
        .map(|(index, sample)| HistoryRecord {
            sample_index: sample.sample_index,
            frame_index: sample.frame_index,
            label: sample.label.and_then(|label| labels.name(label)),
            cleaned_label: report
                .cleaned
                .get(index)
                .copied()
                .flatten()
                .and_then(|label| labels.name(label)),
            bbox: sample.bbox,
            confidence: sample.confidence,
        })
        .collect()
}

/// Refined boundaries when refinement ran, stride-resolution ones otherwise.
pub fn segments_document<'a>(report: &ScanReport, labels: &'a LabelSet) -> SegmentsDocument<'a> {
    let step = report.history.step_size();
    let last_frame = report.history.total_frames().saturating_sub(1);
    let refined = report.refined.len() == report.segments.len() && !report.refined.is_empty();
    let segments = report
        .segments
        .iter()
        .enumerate()
        .map(|(index, segment)| {
            let (start_frame, end_frame, bbox) = match report.refined.get(index) {
                Some(fine) if refined => (fine.start_frame, fine.end_frame, fine.bbox),
                _ => (
                    segment.start as u64 * step,
                    ((segment.end as u64 + 1) * step - 1).min(last_frame),
                    report.boxes.get(index).copied().flatten(),
                ),
            };
            SegmentRecord {
                label: labels.name(segment.label).unwrap_or("?"),
                start_sample: segment.start,
                end_sample: segment.end,
                start_frame,
                end_frame,
                refined,
                bbox,
            }
        })
        .collect();

    SegmentsDocument {
        complete: report.is_complete(),
        step_size: step,
        total_frames: report.history.total_frames(),
        sweep_failure: report.sweep_failure.as_ref().map(ToString::to_string),
        refine: report.refine_stats,
        segments,
    }
}

async fn write_json<T>(path: PathBuf, data: &T, pretty: bool) -> Result<(), OutputError>
where
    T: Serialize + ?Sized,
{
    let encoded = if pretty {
        serde_json::to_vec_pretty(data)?
    } else {
        serde_json::to_vec(data)?
    };
    fs::write(&path, encoded)
        .await
        .map_err(|source| OutputError::io(path, source))
}
