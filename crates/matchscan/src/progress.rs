use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

/// One recorded sample, as seen by the progress bar.
#[derive(Debug, Clone, Copy)]
pub struct ProgressEvent {
    pub samples: u64,
    pub expected: u64,
    pub frame_index: u64,
    pub detected: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressSummary {
    pub samples: u64,
    pub detected: u64,
    pub samples_per_second: f64,
}

pub const PROGRESS_CHANNEL_CAPACITY: usize = 256;

/// The length is set from the first event, once the source is open.
pub fn sweep_bar(hidden: bool) -> ProgressBar {
    if hidden {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(0);
    bar.set_style(bar_style());
    bar.set_prefix("sweep");
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

/// Consumes sweep events until the sender is dropped.
pub async fn drive_progress(
    progress: ProgressBar,
    mut rx: mpsc::Receiver<ProgressEvent>,
    started: Instant,
) -> ProgressSummary {
    let mut summary = ProgressSummary::default();

    while let Some(event) = rx.recv().await {
        summary.samples = event.samples;
        if event.detected {
            summary.detected += 1;
        }
        let length = event.expected.max(summary.samples);
        if progress.length() != Some(length) {
            progress.set_length(length);
        }
        progress.set_position(summary.samples);

        let elapsed = started.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            summary.samples_per_second = summary.samples as f64 / elapsed;
            progress.set_message(format!(
                "frame {} • {:.1} samples/s",
                event.frame_index, summary.samples_per_second
            ));
        }
    }

    summary
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{prefix:.bold} {bar:40.cyan/blue} {percent:>3.bold}% {pos:>5}/{len:<5} [{elapsed_precise:.dim}<{eta_precise:.dim}] {msg:.yellow}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▉▊▋▌▍▎▏ ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn summary_counts_detections() {
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(drive_progress(ProgressBar::hidden(), rx, Instant::now()));
        for (samples, detected) in [(1, false), (2, true), (3, true)] {
            tx.send(ProgressEvent {
                samples,
                expected: 10,
                frame_index: (samples - 1) * 60,
                detected,
            })
            .await
            .unwrap();
        }
        drop(tx);
        let summary = task.await.unwrap();
        assert_eq!(summary.samples, 3);
        assert_eq!(summary.detected, 2);
    }
}
