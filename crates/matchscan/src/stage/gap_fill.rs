use matchscan_types::Label;

use super::label_runs;

/// Relabels every `NONE` run bounded on both sides by the same label.
///
/// Runs touching either end of the sequence, or sitting between two
/// different labels, stay `NONE`.
pub fn fill_gaps(labels: &[Option<Label>]) -> Vec<Option<Label>> {
    let mut filled = labels.to_vec();
    let runs = label_runs(labels);
    for window in runs.windows(3) {
        let [before, gap, after] = window else {
            continue;
        };
        if gap.label.is_some() || before.label != after.label {
            continue;
        }
        filled[gap.start..gap.end()].fill(before.label);
    }
    filled
}
