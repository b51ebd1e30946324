pub mod bbox;
pub mod gap_fill;
pub mod history;
pub mod noise;
pub mod refine;
pub mod segments;

use matchscan_types::{Label, SampleIndex};

/// A maximal run of one value in a label sequence, `NONE` runs included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LabelRun {
    pub start: SampleIndex,
    pub len: usize,
    pub label: Option<Label>,
}

impl LabelRun {
    /// Exclusive end sample.
    pub fn end(&self) -> SampleIndex {
        self.start + self.len
    }
}

pub(crate) fn label_runs(labels: &[Option<Label>]) -> Vec<LabelRun> {
    let mut runs: Vec<LabelRun> = Vec::new();
    for (index, &label) in labels.iter().enumerate() {
        match runs.last_mut() {
            Some(run) if run.label == label => run.len += 1,
            _ => runs.push(LabelRun {
                start: index,
                len: 1,
                label,
            }),
        }
    }
    runs
}


#[cfg(test)]
mod tests {
    use super::fixtures::seq;
    use super::*;

    #[test]
    fn runs_cover_the_sequence() {
        let runs = label_runs(&seq("AA..B"));
        assert_eq!(runs.len(), 3);
        assert_eq!((runs[0].start, runs[0].len), (0, 2));
        assert_eq!((runs[1].start, runs[1].end()), (2, 4));
        assert_eq!(runs[1].label, None);
        assert!(label_runs(&[]).is_empty());
    }
}
