use matchscan::{
    NoisePolicy, Pipeline, RefineSettings, RefineStrategy, ScanConfig, ScanReport,
};
use matchscan_classifier::{
    Classification, Classifier, ClassifierConfig, ClassifierError, ClassifierSession,
    TimelineDetector, TimelineWindow,
};
use matchscan_decoder::backends::synthetic::SyntheticSource;
use matchscan_types::{BoundingBox, Frame, FrameIndex, Label};

fn session(windows: Vec<TimelineWindow>) -> ClassifierSession {
    let detector = TimelineDetector::new(windows).unwrap();
    ClassifierSession::open(Box::new(detector), ClassifierConfig::default())
}

fn scan(
    source: &mut SyntheticSource,
    classifier: &mut impl Classifier,
    config: ScanConfig,
) -> ScanReport {
    Pipeline::new(config)
        .unwrap()
        .run(source, classifier, |_| {})
        .unwrap()
}

fn frames(report: &ScanReport) -> Vec<(FrameIndex, FrameIndex)> {
    report
        .refined
        .iter()
        .map(|segment| (segment.start_frame, segment.end_exclusive()))
        .collect()
}

#[test]
fn single_window_refines_to_exact_frames() {
    let mut source = SyntheticSource::with_total_frames(10_000);
    let mut classifier = session(vec![TimelineWindow::new("battlefield", 1000, 5000)]);
    let report = scan(&mut source, &mut classifier, ScanConfig::default());

    assert!(report.is_complete());
    assert_eq!(report.history.len(), 167);
    assert_eq!(report.segments.len(), 1);
    assert_eq!((report.segments[0].start, report.segments[0].end), (17, 83));
    assert_eq!(frames(&report), vec![(1000, 5000)]);
    assert_eq!(report.refined[0].end_frame, 4999);
    assert_eq!(
        classifier.labels().name(report.refined[0].label),
        Some("battlefield")
    );
}

#[test]
fn three_windows_yield_three_ordered_segments() {
    let mut source = SyntheticSource::with_total_frames(10_000);
    let mut classifier = session(vec![
        TimelineWindow::new("battlefield", 300, 2300),
        TimelineWindow::new("dreamland", 4200, 6100),
        TimelineWindow::new("yoshis", 8000, 9990),
    ]);
    let report = scan(&mut source, &mut classifier, ScanConfig::default());

    assert_eq!(
        frames(&report),
        vec![(300, 2300), (4200, 6100), (8000, 9990)]
    );
    let names: Vec<_> = report
        .refined
        .iter()
        .map(|segment| classifier.labels().name(segment.label).unwrap())
        .collect();
    assert_eq!(names, vec!["battlefield", "dreamland", "yoshis"]);
    for pair in report.refined.windows(2) {
        assert!(pair[0].end_exclusive() <= pair[1].start_frame);
    }
}

#[test]
fn noisy_detections_are_cleaned_before_segmentation() {
    let mut source = SyntheticSource::with_total_frames(10_000);
    let mut classifier = session(vec![
        TimelineWindow::new("pokemon", 1000, 2000),
        // Missed detections inside the match.
        TimelineWindow::new("pokemon", 2130, 5000),
        // Blips too short to be a match.
        TimelineWindow::new("fountain", 7000, 7100),
        TimelineWindow::new("yoshis", 8500, 8530),
    ]);
    let report = scan(&mut source, &mut classifier, ScanConfig::default());

    assert_eq!(report.segments.len(), 1);
    assert_eq!(frames(&report), vec![(1000, 5000)]);
    let raw_labelled = report.history.labels().iter().filter(|l| l.is_some()).count();
    let clean_labelled = report.cleaned.iter().filter(|l| l.is_some()).count();
    // Two filled gap samples in, three blip samples out.
    assert_eq!(raw_labelled, 68);
    assert_eq!(clean_labelled, 67);
}

#[test]
fn decode_failure_reports_partial_history() {
    let mut source = SyntheticSource::with_total_frames(10_000).with_failure_at(4800);
    let mut classifier = session(vec![TimelineWindow::new("battlefield", 1000, 5000)]);
    let report = scan(&mut source, &mut classifier, ScanConfig::default());

    assert!(!report.is_complete());
    assert!(report.sweep_failure.is_some());
    assert_eq!(report.history.len(), 80);
    assert_eq!(report.segments.len(), 1);
    assert_eq!((report.segments[0].start, report.segments[0].end), (17, 79));
    assert!(report.refined.is_empty());
    assert_eq!(report.refine_stats.boundaries, 0);
}

#[test]
fn unknown_label_is_a_hard_failure() {
    let mut source = SyntheticSource::with_total_frames(1000);
    let mut classifier = session(vec![TimelineWindow::new("hyrule", 0, 1000)]);
    let result = Pipeline::new(ScanConfig::default())
        .unwrap()
        .run(&mut source, &mut classifier, |_| {});
    assert!(result.is_err());
}

/// Answers truthfully on sampled frames; between them every third call is
/// inverted.
struct Flicker {
    start: FrameIndex,
    end: FrameIndex,
    label: Label,
    step: FrameIndex,
    calls: u64,
}

impl Classifier for Flicker {
    fn classify(&mut self, frame: &Frame) -> Result<Option<Classification>, ClassifierError> {
        let index = frame.frame_index().unwrap_or_default();
        let call = self.calls;
        self.calls += 1;
        let mut present = (self.start..self.end).contains(&index);
        if index % self.step != 0 && call % 3 == 2 {
            present = !present;
        }
        Ok(present.then(|| Classification {
            label: self.label,
            bbox: BoundingBox::from_corners(0, 0, 10, 10),
            confidence: 0.8,
        }))
    }
}

#[test]
fn majority_vote_absorbs_flicker() {
    let labels = ClassifierConfig::default().labels;
    let mut source = SyntheticSource::with_total_frames(10_000);
    let mut classifier = Flicker {
        start: 1000,
        end: 5000,
        label: labels.lookup("finaldest").unwrap(),
        step: 60,
        calls: 0,
    };
    let report = scan(&mut source, &mut classifier, ScanConfig::default());

    assert_eq!(frames(&report), vec![(1000, 5000)]);
    assert_eq!(report.refine_stats.unconverged, 0);
    assert!(report.refine_stats.invocations > report.refine_stats.probes);
}

#[test]
fn linear_strategy_matches_bisection_at_higher_cost() {
    let windows = vec![TimelineWindow::new("dreamland", 1000, 5000)];

    let mut source = SyntheticSource::with_total_frames(10_000);
    let mut classifier = session(windows.clone());
    let bisection = scan(&mut source, &mut classifier, ScanConfig::default());

    let mut source = SyntheticSource::with_total_frames(10_000);
    let mut classifier = session(windows);
    let linear = scan(
        &mut source,
        &mut classifier,
        ScanConfig {
            refine: RefineSettings {
                strategy: RefineStrategy::Linear,
                ..RefineSettings::default()
            },
            ..ScanConfig::default()
        },
    );

    assert_eq!(frames(&linear), frames(&bisection));
    assert!(linear.refine_stats.probes > bisection.refine_stats.probes);
}

#[test]
fn refinement_cost_is_logarithmic_in_step() {
    let mut source = SyntheticSource::with_total_frames(10_000);
    let mut classifier = session(vec![TimelineWindow::new("battlefield", 1000, 5000)]);
    let sweep_calls = 167;
    let report = scan(&mut source, &mut classifier, ScanConfig::default());

    let budget = u64::from(RefineSettings::default().probe_budget(60));
    assert_eq!(report.refine_stats.boundaries, 2);
    assert!(report.refine_stats.probes <= 2 * budget);
    // A deterministic classifier settles every probe after two agreeing votes.
    assert_eq!(report.refine_stats.invocations, 2 * report.refine_stats.probes);
    assert_eq!(
        classifier.invocations(),
        sweep_calls + report.refine_stats.invocations
    );
}

#[test]
fn merge_policy_absorbs_short_runs_into_neighbours() {
    let mut source = SyntheticSource::with_total_frames(10_000);
    let mut classifier = session(vec![
        TimelineWindow::new("battlefield", 1000, 3000),
        TimelineWindow::new("dreamland", 3000, 3100),
        TimelineWindow::new("battlefield", 3100, 6000),
    ]);
    let report = scan(
        &mut source,
        &mut classifier,
        ScanConfig {
            noise_policy: NoisePolicy::Merge,
            ..ScanConfig::default()
        },
    );
    assert_eq!(report.segments.len(), 1);
    assert_eq!(frames(&report), vec![(1000, 6000)]);
}

#[test]
fn observer_sees_every_sample() {
    let mut source = SyntheticSource::with_total_frames(600);
    let mut classifier = session(Vec::new());
    let mut seen = Vec::new();
    let report = Pipeline::new(ScanConfig::default())
        .unwrap()
        .run(&mut source, &mut classifier, |event| {
            seen.push((event.sample.frame_index, event.frame.frame_index()));
        })
        .unwrap();
    assert_eq!(report.history.len(), 10);
    assert_eq!(seen.len(), 10);
    assert_eq!(seen[3], (180, Some(180)));
    assert!(report.segments.is_empty());
}
