use std::time::Duration;

pub use matchscan_types::{Frame, FrameError, FrameIndex, FrameResult};

pub type DynFrameSource = Box<dyn FrameSource>;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VideoMetadata {
    pub duration: Option<Duration>,
    pub fps: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub total_frames: Option<u64>,
}

impl VideoMetadata {
    pub fn calculate_total_frames(&self) -> Option<u64> {
        if let Some(total) = self.total_frames {
            return Some(total);
        }

        if let (Some(duration), Some(fps)) = (self.duration, self.fps) {
            let total = (duration.as_secs_f64() * fps).round();
            if total.is_finite() && total >= 0.0 {
                return Some(total as u64);
            }
        }

        None
    }
}

/// A seekable decode context with a single cursor.
///
/// `read` returns the frame under the cursor and advances it by one;
/// `Ok(None)` signals the end of the stream.
pub trait FrameSource: Send {
    fn backend_name(&self) -> &'static str;

    fn metadata(&self) -> VideoMetadata;

    fn seek(&mut self, frame: FrameIndex) -> FrameResult<()>;

    fn read(&mut self) -> FrameResult<Option<Frame>>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }

    fn metadata(&self) -> VideoMetadata {
        (**self).metadata()
    }

    fn seek(&mut self, frame: FrameIndex) -> FrameResult<()> {
        (**self).seek(frame)
    }

    fn read(&mut self) -> FrameResult<Option<Frame>> {
        (**self).read()
    }
}

/// Seeks to `frame` and reads it, treating end of stream as an error.
pub fn read_frame_at<S: FrameSource + ?Sized>(
    source: &mut S,
    frame: FrameIndex,
) -> FrameResult<Frame> {
    source.seek(frame)?;
    match source.read()? {
        Some(decoded) => Ok(match decoded.frame_index() {
            Some(_) => decoded,
            None => decoded.with_frame_index(Some(frame)),
        }),
        None => Err(FrameError::EndOfStream { frame }),
    }
}
