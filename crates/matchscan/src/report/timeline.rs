use std::io::{self, Write};

use matchscan_types::{BoundingBox, Frame, FrameIndex, Label, LabelSet};

use super::{OutputError, Reporter};
use crate::pipeline::ScanReport;
use crate::stage::history::History;

const ROW_WIDTH: usize = 100;
const GLYPHS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const EMPTY_GLYPH: char = '.';

/// Text plot of the raw and cleaned label sequences, one glyph per sample.
pub struct TimelineReporter<W: Write> {
    out: W,
}

impl TimelineReporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TimelineReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, line: std::fmt::Arguments<'_>) -> Result<(), OutputError> {
        writeln!(self.out, "{line}").map_err(|source| OutputError::io("<timeline>", source))
    }
}

fn glyph(label: Option<Label>) -> char {
    match label {
        None => EMPTY_GLYPH,
        Some(label) => GLYPHS
            .get(label.index())
            .map(|&byte| byte as char)
            .unwrap_or('#'),
    }
}

fn render_row(labels: &[Option<Label>]) -> String {
    labels.iter().map(|&label| glyph(label)).collect()
}

fn describe_box(bbox: Option<BoundingBox>) -> String {
    match bbox {
        Some(bbox) => format!(
            "({},{})-({},{})",
            bbox.top_left.x, bbox.top_left.y, bbox.bottom_right.x, bbox.bottom_right.y
        ),
        None => "-".to_string(),
    }
}

impl<W: Write> Reporter for TimelineReporter<W> {
    fn render_history(
        &mut self,
        history: &History,
        cleaned: &[Option<Label>],
        labels: &LabelSet,
    ) -> Result<(), OutputError> {
        let legend: Vec<String> = labels
            .iter()
            .map(|(label, name)| format!("{}={name}", glyph(Some(label))))
            .collect();
        self.emit(format_args!(
            "history: {} samples, step {} frames{}",
            history.len(),
            history.step_size(),
            if history.is_complete() { "" } else { " (incomplete)" }
        ))?;
        self.emit(format_args!("legend: {} {EMPTY_GLYPH}=none", legend.join(" ")))?;

        let raw = history.labels();
        for (row, start) in (0..raw.len()).step_by(ROW_WIDTH).enumerate() {
            let end = (start + ROW_WIDTH).min(raw.len());
            let cleaned_end = end.min(cleaned.len());
            let cleaned_start = start.min(cleaned_end);
            if row > 0 {
                self.emit(format_args!(""))?;
            }
            self.emit(format_args!("raw     {start:>6} {}", render_row(&raw[start..end])))?;
            self.emit(format_args!(
                "cleaned {start:>6} {}",
                render_row(&cleaned[cleaned_start..cleaned_end])
            ))?;
        }
        Ok(())
    }

    fn render_boundary(
        &mut self,
        _frame: &Frame,
        bbox: Option<BoundingBox>,
        label: &str,
        frame_index: FrameIndex,
    ) -> Result<(), OutputError> {
        self.emit(format_args!(
            "boundary {label} @ frame {frame_index} bbox {}",
            describe_box(bbox)
        ))
    }

    fn render_segments(&mut self, report: &ScanReport, labels: &LabelSet) -> Result<(), OutputError> {
        self.emit(format_args!("segments: {}", report.segments.len()))?;
        let step = report.history.step_size();
        for (index, segment) in report.segments.iter().enumerate() {
            let name = labels.name(segment.label).unwrap_or("?");
            match report.refined.get(index) {
                Some(fine) => self.emit(format_args!(
                    "  {name:<12} frames {:>8}..{:<8} samples {}..={} bbox {}",
                    fine.start_frame,
                    fine.end_exclusive(),
                    segment.start,
                    segment.end,
                    describe_box(fine.bbox)
                ))?,
                None => self.emit(format_args!(
                    "  {name:<12} frames ~{:>7}..~{:<7} samples {}..={} bbox {} (coarse)",
                    segment.start as u64 * step,
                    (segment.end as u64 + 1) * step,
                    segment.start,
                    segment.end,
                    describe_box(report.boxes.get(index).copied().flatten())
                ))?,
            }
        }
        self.emit(format_args!(
            "sweep: {:.2}s at {:.1} samples/s; refinement: {} probes, {} classifier calls, {} unconverged",
            report.sweep_elapsed.as_secs_f64(),
            report.average_fps,
            report.refine_stats.probes,
            report.refine_stats.invocations,
            report.refine_stats.unconverged
        ))?;
        self.out
            .flush()
            .map_err(|source| OutputError::io("<timeline>", source))
    }
}
