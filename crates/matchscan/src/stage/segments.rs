use matchscan_types::{Label, Segment};

use super::label_runs;

/// Emits one segment per maximal labelled run, ordered by start sample.
pub fn extract_segments(labels: &[Option<Label>]) -> Vec<Segment> {
    label_runs(labels)
        .into_iter()
        .filter_map(|run| {
            run.label.map(|label| Segment {
                start: run.start,
                end: run.end() - 1,
                label,
            })
        })
        .collect()
}
