use matchscan_types::{LabelSet, LabelSetError};

use crate::ClassifierError;

/// Stage labels the bundled model was trained on.
pub const DEFAULT_LABELS: &[&str] = &[
    "battlefield",
    "dreamland",
    "finaldest",
    "fountain",
    "pokemon",
    "yoshis",
];

/// Detections below this confidence are treated as no detection.
pub const DEFAULT_CONFIDENCE_FLOOR: f32 = 0.25;

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub labels: LabelSet,
    pub confidence_floor: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            labels: default_label_set(),
            confidence_floor: DEFAULT_CONFIDENCE_FLOOR,
        }
    }
}

impl ClassifierConfig {
    pub fn new(labels: LabelSet, confidence_floor: f32) -> Result<Self, ClassifierError> {
        if !confidence_floor.is_finite() || !(0.0..=1.0).contains(&confidence_floor) {
            return Err(ClassifierError::Configuration(format!(
                "confidence floor {confidence_floor} must lie within [0, 1]"
            )));
        }
        Ok(Self {
            labels,
            confidence_floor,
        })
    }

    pub fn with_label_names<I, S>(names: I, confidence_floor: f32) -> Result<Self, ClassifierError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels = LabelSet::new(names)
            .map_err(|err: LabelSetError| ClassifierError::Configuration(err.to_string()))?;
        Self::new(labels, confidence_floor)
    }
}

fn default_label_set() -> LabelSet {
    match LabelSet::new(DEFAULT_LABELS.iter().copied()) {
        Ok(labels) => labels,
        Err(err) => unreachable!("built-in label list is invalid: {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_stage_labels() {
        let config = ClassifierConfig::default();
        assert_eq!(config.labels.len(), 6);
        assert!(config.labels.lookup("yoshis").is_some());
        assert_eq!(config.confidence_floor, DEFAULT_CONFIDENCE_FLOOR);
    }

    #[test]
    fn confidence_floor_must_be_a_probability() {
        assert!(ClassifierConfig::with_label_names(["a"], 1.5).is_err());
        assert!(ClassifierConfig::with_label_names(["a"], f32::NAN).is_err());
        assert!(ClassifierConfig::with_label_names(["a"], 0.0).is_ok());
    }
}
