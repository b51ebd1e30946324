use std::fmt;
use std::str::FromStr;

use matchscan_types::Label;
use serde::{Deserialize, Serialize};

use super::{LabelRun, label_runs};

/// Default minimum match duration: 30 seconds at 60 fps.
pub const DEFAULT_MIN_MATCH_DURATION: u64 = 1800;

/// What happens to a labelled run shorter than the minimum match duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoisePolicy {
    /// Reset the run to `NONE`.
    #[default]
    Drop,
    /// Give the run the label of its longer neighbour, provided that
    /// neighbour is a labelled run that meets the minimum itself.
    Merge,
}

impl NoisePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoisePolicy::Drop => "drop",
            NoisePolicy::Merge => "merge",
        }
    }
}

impl fmt::Display for NoisePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoisePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop" | "suppress" => Ok(NoisePolicy::Drop),
            "merge" => Ok(NoisePolicy::Merge),
            other => Err(format!("unknown noise policy '{other}' (expected drop or merge)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoiseFilter {
    pub min_match_duration: u64,
    pub step_size: u64,
    pub policy: NoisePolicy,
}

impl NoiseFilter {
    pub fn new(min_match_duration: u64, step_size: u64, policy: NoisePolicy) -> Self {
        Self {
            min_match_duration,
            step_size,
            policy,
        }
    }

    fn is_short(&self, run: &LabelRun) -> bool {
        (run.len as u64).saturating_mul(self.step_size) < self.min_match_duration
    }

    fn qualifies(&self, run: Option<&LabelRun>) -> Option<LabelRun> {
        run.filter(|run| run.label.is_some() && !self.is_short(run))
            .copied()
    }

    /// Applies the policy to every short labelled run.
    ///
    /// Decisions are taken against the runs of the input, so a merge never
    /// cascades into a neighbouring short run.
    pub fn apply(&self, labels: &[Option<Label>]) -> Vec<Option<Label>> {
        let runs = label_runs(labels);
        let mut cleaned = labels.to_vec();
        for (position, run) in runs.iter().enumerate() {
            if run.label.is_none() || !self.is_short(run) {
                continue;
            }
            let replacement = match self.policy {
                NoisePolicy::Drop => None,
                NoisePolicy::Merge => {
                    let before = position
                        .checked_sub(1)
                        .and_then(|index| self.qualifies(runs.get(index)));
                    let after = self.qualifies(runs.get(position + 1));
                    match (before, after) {
                        (Some(before), Some(after)) if after.len > before.len => after.label,
                        (Some(before), _) => before.label,
                        (None, Some(after)) => after.label,
                        (None, None) => None,
                    }
                }
            };
            cleaned[run.start..run.end()].fill(replacement);
        }
        cleaned
    }
}

/// Convenience wrapper over [`NoiseFilter::apply`].
pub fn filter_noise(
    labels: &[Option<Label>],
    min_match_duration: u64,
    step_size: u64,
    policy: NoisePolicy,
) -> Vec<Option<Label>> {
    NoiseFilter::new(min_match_duration, step_size, policy).apply(labels)
}
