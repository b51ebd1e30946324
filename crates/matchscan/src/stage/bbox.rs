use std::fmt;
use std::str::FromStr;

use matchscan_types::{BoundingBox, DetectionSample, Point, Segment};
use serde::{Deserialize, Serialize};

/// How a segment's per-sample boxes collapse into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoxPolicy {
    /// Coordinate-wise mean, rounded to the nearest pixel.
    #[default]
    Average,
    /// Box of the most confident sample; the earliest wins ties.
    HighestConfidence,
}

impl BoxPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoxPolicy::Average => "average",
            BoxPolicy::HighestConfidence => "highest-confidence",
        }
    }
}

impl fmt::Display for BoxPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BoxPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "average" | "avg" | "mean" => Ok(BoxPolicy::Average),
            "highest-confidence" | "highest_confidence" | "max" => {
                Ok(BoxPolicy::HighestConfidence)
            }
            other => Err(format!(
                "unknown bbox policy '{other}' (expected average or highest-confidence)"
            )),
        }
    }
}

/// One representative box per segment, aligned with `segments`.
///
/// Samples without a box are skipped; a segment without any box maps to
/// `None`.
pub fn aggregate_boxes(
    samples: &[DetectionSample],
    segments: &[Segment],
    policy: BoxPolicy,
) -> Vec<Option<BoundingBox>> {
    segments
        .iter()
        .map(|segment| {
            let end = (segment.end + 1).min(samples.len());
            let start = segment.start.min(end);
            let boxed = samples[start..end]
                .iter()
                .filter_map(|sample| sample.bbox.map(|bbox| (bbox, sample.confidence)));
            match policy {
                BoxPolicy::Average => average(boxed.map(|(bbox, _)| bbox)),
                BoxPolicy::HighestConfidence => boxed
                    .fold(None, |best: Option<(BoundingBox, f32)>, candidate| match best {
                        Some(current) if current.1 >= candidate.1 => Some(current),
                        _ => Some(candidate),
                    })
                    .map(|(bbox, _)| bbox),
            }
        })
        .collect()
}

fn average(boxes: impl Iterator<Item = BoundingBox>) -> Option<BoundingBox> {
    let mut count = 0i64;
    let mut sums = [0i64; 4];
    for bbox in boxes {
        count += 1;
        sums[0] += i64::from(bbox.top_left.x);
        sums[1] += i64::from(bbox.top_left.y);
        sums[2] += i64::from(bbox.bottom_right.x);
        sums[3] += i64::from(bbox.bottom_right.y);
    }
    if count == 0 {
        return None;
    }
    let mean = |sum: i64| (sum as f64 / count as f64).round() as i32;
    Some(BoundingBox::new(
        Point::new(mean(sums[0]), mean(sums[1])),
        Point::new(mean(sums[2]), mean(sums[3])),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::fixtures::label;

    fn sample(index: usize, bbox: Option<BoundingBox>, confidence: f32) -> DetectionSample {
        DetectionSample {
            sample_index: index,
            frame_index: index as u64 * 60,
            label: Some(label("A")),
            bbox,
            confidence,
        }
    }

    fn segment(start: usize, end: usize) -> Segment {
        Segment {
            start,
            end,
            label: label("A"),
        }
    }

    #[test]
    fn average_rounds_coordinates() {
        let samples = vec![
            sample(0, Some(BoundingBox::from_corners(0, 0, 100, 50)), 0.9),
            sample(1, Some(BoundingBox::from_corners(1, 3, 101, 53)), 0.5),
            sample(2, None, 0.0),
        ];
        let boxes = aggregate_boxes(&samples, &[segment(0, 2)], BoxPolicy::Average);
        assert_eq!(boxes, vec![Some(BoundingBox::from_corners(1, 2, 101, 52))]);
    }

    #[test]
    fn highest_confidence_picks_strongest_sample() {
        let samples = vec![
            sample(0, Some(BoundingBox::from_corners(0, 0, 10, 10)), 0.4),
            sample(1, Some(BoundingBox::from_corners(5, 5, 20, 20)), 0.8),
            sample(2, Some(BoundingBox::from_corners(9, 9, 30, 30)), 0.8),
        ];
        let boxes = aggregate_boxes(&samples, &[segment(0, 2)], BoxPolicy::HighestConfidence);
        assert_eq!(boxes, vec![Some(BoundingBox::from_corners(5, 5, 20, 20))]);
    }

    #[test]
    fn segment_without_boxes_has_none() {
        let samples = vec![sample(0, None, 0.0), sample(1, None, 0.0)];
        let boxes = aggregate_boxes(&samples, &[segment(0, 1)], BoxPolicy::Average);
        assert_eq!(boxes, vec![None]);
    }

    #[test]
    fn only_samples_inside_the_segment_count() {
        let samples = vec![
            sample(0, Some(BoundingBox::from_corners(100, 100, 200, 200)), 0.99),
            sample(1, Some(BoundingBox::from_corners(0, 0, 10, 10)), 0.3),
        ];
        let boxes = aggregate_boxes(&samples, &[segment(1, 1)], BoxPolicy::HighestConfidence);
        assert_eq!(boxes, vec![Some(BoundingBox::from_corners(0, 0, 10, 10))]);
    }
}
