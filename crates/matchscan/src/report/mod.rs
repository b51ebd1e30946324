pub mod error;
pub mod image;
pub mod json;
pub mod timeline;

use matchscan_decoder::{FrameSource, read_frame_at};
use matchscan_types::{BoundingBox, Frame, FrameIndex, Label, LabelSet};
use tracing::warn;

use crate::pipeline::ScanReport;
use crate::stage::history::History;

pub use error::OutputError;
pub use image::ImageReporter;
pub use json::JsonReporter;
pub use timeline::TimelineReporter;

/// Read-only consumer of a finished scan.
pub trait Reporter {
    fn render_history(
        &mut self,
        history: &History,
        cleaned: &[Option<Label>],
        labels: &LabelSet,
    ) -> Result<(), OutputError>;

    fn render_boundary(
        &mut self,
        frame: &Frame,
        bbox: Option<BoundingBox>,
        label: &str,
        frame_index: FrameIndex,
    ) -> Result<(), OutputError>;

    /// Called once after history and boundaries were rendered.
    fn render_segments(&mut self, _report: &ScanReport, _labels: &LabelSet) -> Result<(), OutputError> {
        Ok(())
    }
}

/// Drives every reporter over `report`, reading the first and last frame of
/// each segment from `source` for boundary rendering. Unrefined runs fall
/// back to the sampled frames at the coarse boundaries.
///
/// Boundary frames that cannot be read are skipped.
pub fn render_report<S>(
    source: &mut S,
    report: &ScanReport,
    labels: &LabelSet,
    reporters: &mut [&mut dyn Reporter],
) -> Result<(), OutputError>
where
    S: FrameSource + ?Sized,
{
    if reporters.is_empty() {
        return Ok(());
    }
    for reporter in reporters.iter_mut() {
        reporter.render_history(&report.history, &report.cleaned, labels)?;
    }

    for (label, bbox, frame_index) in boundary_frames(report) {
        let name = labels.name(label).unwrap_or("?");
        let frame = match read_frame_at(&mut *source, frame_index) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(frame = frame_index, error = %err, "skipping unreadable boundary frame");
                continue;
            }
        };
        for reporter in reporters.iter_mut() {
            reporter.render_boundary(&frame, bbox, name, frame_index)?;
        }
    }

    for reporter in reporters.iter_mut() {
        reporter.render_segments(report, labels)?;
    }
    Ok(())
}

/// Refined boundaries when refinement ran, otherwise the sampled frames at
/// each coarse segment boundary.
fn boundary_frames(report: &ScanReport) -> Vec<(Label, Option<BoundingBox>, FrameIndex)> {
    if !report.refined.is_empty() {
        return report
            .refined
            .iter()
            .flat_map(|segment| {
                [segment.start_frame, segment.end_frame]
                    .map(|frame| (segment.label, segment.bbox, frame))
            })
            .collect();
    }
    let step = report.history.step_size();
    report
        .segments
        .iter()
        .enumerate()
        .flat_map(|(index, segment)| {
            let bbox = report.boxes.get(index).copied().flatten();
            [segment.start, segment.end].map(|sample| (segment.label, bbox, sample as u64 * step))
        })
        .collect()
}
