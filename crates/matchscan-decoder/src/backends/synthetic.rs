use std::time::Duration;

use crate::config::SyntheticOptions;
use crate::core::{Frame, FrameError, FrameIndex, FrameResult, FrameSource, VideoMetadata};

const BACKEND_NAME: &str = "synthetic";

/// Generates deterministic luma frames without touching the filesystem.
///
/// Every emitted frame carries its absolute index, so index-driven detectors
/// can replay a known timeline against it.
pub struct SyntheticSource {
    options: SyntheticOptions,
    cursor: FrameIndex,
    fail_at: Option<FrameIndex>,
    seeks: u64,
    reads: u64,
}

impl SyntheticSource {
    pub fn new(options: SyntheticOptions) -> Self {
        Self {
            options,
            cursor: 0,
            fail_at: None,
            seeks: 0,
            reads: 0,
        }
    }

    pub fn with_total_frames(total_frames: u64) -> Self {
        Self::new(SyntheticOptions {
            total_frames,
            ..SyntheticOptions::default()
        })
    }

    /// Makes every read of `frame` fail, simulating a corrupt region.
    pub fn with_failure_at(mut self, frame: FrameIndex) -> Self {
        self.fail_at = Some(frame);
        self
    }

    pub fn seek_count(&self) -> u64 {
        self.seeks
    }

    pub fn read_count(&self) -> u64 {
        self.reads
    }

    fn render(&self, index: FrameIndex) -> FrameResult<Frame> {
        let width = self.options.width.max(1);
        let height = self.options.height.max(1);
        let stride = width as usize;
        let mut buffer = vec![0u8; stride * height as usize];
        for (row, chunk) in buffer.chunks_mut(stride).enumerate() {
            let value = ((row as u64 + index) % 256) as u8;
            chunk.fill(value);
        }
        let timestamp = (self.options.fps > 0.0)
            .then(|| Duration::from_secs_f64(index as f64 / self.options.fps));
        Frame::from_owned(width, height, stride, timestamp, buffer)
            .map(|frame| frame.with_frame_index(Some(index)))
    }
}

impl FrameSource for SyntheticSource {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn metadata(&self) -> VideoMetadata {
        let fps = self.options.fps;
        VideoMetadata {
            duration: (fps > 0.0)
                .then(|| Duration::from_secs_f64(self.options.total_frames as f64 / fps)),
            fps: Some(fps),
            width: Some(self.options.width),
            height: Some(self.options.height),
            total_frames: Some(self.options.total_frames),
        }
    }

    fn seek(&mut self, frame: FrameIndex) -> FrameResult<()> {
        self.seeks += 1;
        if frame >= self.options.total_frames {
            return Err(FrameError::OutOfRange {
                frame,
                total: self.options.total_frames,
            });
        }
        self.cursor = frame;
        Ok(())
    }

    fn read(&mut self) -> FrameResult<Option<Frame>> {
        self.reads += 1;
        let index = self.cursor;
        if index >= self.options.total_frames {
            return Ok(None);
        }
        if self.fail_at == Some(index) {
            return Err(FrameError::backend_failure(
                BACKEND_NAME,
                format!("injected decode failure at frame {index}"),
            ));
        }
        let frame = self.render(index)?;
        self.cursor = index + 1;
        Ok(Some(frame))
    }
}
