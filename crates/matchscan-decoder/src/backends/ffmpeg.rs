#![cfg(feature = "backend-ffmpeg")]

use std::path::{Path, PathBuf};
use std::time::Duration;

use ffmpeg::util::error::{EAGAIN, EWOULDBLOCK};
use ffmpeg_next as ffmpeg;
use tracing::{debug, trace};

use crate::core::{
    DynFrameSource, Frame, FrameError, FrameIndex, FrameResult, FrameSource, VideoMetadata,
};

const BACKEND_NAME: &str = "ffmpeg";
const AV_TIME_BASE: f64 = 1_000_000.0;

pub struct FfmpegSource {
    input: PathBuf,
    ictx: ffmpeg::format::context::Input,
    decoder: ffmpeg::decoder::Video,
    scaler: ffmpeg::software::scaling::context::Context,
    stream_index: usize,
    time_base: ffmpeg::Rational,
    fps: f64,
    metadata: VideoMetadata,
    cursor: FrameIndex,
    /// Frames decoded before this index are discarded after a seek.
    target: FrameIndex,
    eof_sent: bool,
}

impl FfmpegSource {
    pub fn open<P: AsRef<Path>>(path: P) -> FrameResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(FrameError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("input file {} does not exist", path.display()),
            )));
        }
        ffmpeg::init().map_err(backend_error)?;

        let ictx = ffmpeg::format::input(&path).map_err(backend_error)?;
        let input_stream = ictx
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| FrameError::backend_failure(BACKEND_NAME, "no video stream found"))?;
        let stream_index = input_stream.index();
        let time_base = input_stream.time_base();
        let rate = input_stream.avg_frame_rate();
        let fps = if rate.denominator() != 0 {
            f64::from(rate)
        } else {
            0.0
        };
        if fps <= 0.0 {
            return Err(FrameError::backend_failure(
                BACKEND_NAME,
                "video stream does not report a frame rate",
            ));
        }

        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .map_err(backend_error)?;
        let decoder = context.decoder().video().map_err(backend_error)?;

        let duration = (ictx.duration() > 0)
            .then(|| Duration::from_secs_f64(ictx.duration() as f64 / AV_TIME_BASE));
        let reported_frames = input_stream.frames();
        let metadata = VideoMetadata {
            duration,
            fps: Some(fps),
            width: Some(decoder.width()),
            height: Some(decoder.height()),
            total_frames: (reported_frames > 0).then_some(reported_frames as u64),
        };

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::format::pixel::Pixel::GRAY8,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::FAST_BILINEAR,
        )
        .map_err(backend_error)?;

        debug!(
            input = %path.display(),
            fps,
            total_frames = ?metadata.calculate_total_frames(),
            "opened ffmpeg source"
        );

        Ok(Self {
            input: path.to_path_buf(),
            ictx,
            decoder,
            scaler,
            stream_index,
            time_base,
            fps,
            metadata,
            cursor: 0,
            target: 0,
            eof_sent: false,
        })
    }

    fn frame_index_of(&self, pts: i64) -> FrameIndex {
        let seconds = pts as f64 * f64::from(self.time_base);
        (seconds * self.fps).round().max(0.0) as FrameIndex
    }

    fn receive(&mut self) -> FrameResult<Option<Frame>> {
        let mut decoded = ffmpeg::util::frame::Video::empty();
        loop {
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => {
                    let pts = decoded.timestamp().or_else(|| decoded.pts());
                    let index = pts.map(|pts| self.frame_index_of(pts));
                    if let Some(index) = index {
                        if index < self.target {
                            trace!(index, target = self.target, "dropping pre-roll frame");
                            continue;
                        }
                    }
                    let mut converted = ffmpeg::util::frame::Video::empty();
                    self.scaler
                        .run(&decoded, &mut converted)
                        .map_err(backend_error)?;
                    let timestamp = pts.map(|pts| {
                        Duration::from_secs_f64((pts as f64 * f64::from(self.time_base)).max(0.0))
                    });
                    return frame_from_converted(&converted, timestamp).map(Some);
                }
                Err(err) if is_retryable_error(&err) => return Ok(None),
                Err(ffmpeg::Error::Eof) => return Ok(None),
                Err(err) => return Err(backend_error(err)),
            }
        }
    }
}

impl FrameSource for FfmpegSource {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn metadata(&self) -> VideoMetadata {
        self.metadata
    }

    fn seek(&mut self, frame: FrameIndex) -> FrameResult<()> {
        if let Some(total) = self.metadata.calculate_total_frames() {
            if frame >= total {
                return Err(FrameError::OutOfRange { frame, total });
            }
        }
        if frame == self.cursor && !self.eof_sent {
            return Ok(());
        }
        let timestamp = (frame as f64 / self.fps * AV_TIME_BASE) as i64;
        self.ictx
            .seek(timestamp, ..=timestamp)
            .map_err(backend_error)?;
        self.decoder.flush();
        self.eof_sent = false;
        self.cursor = frame;
        self.target = frame;
        Ok(())
    }

    fn read(&mut self) -> FrameResult<Option<Frame>> {
        loop {
            if let Some(frame) = self.receive()? {
                let index = self.cursor;
                self.cursor += 1;
                self.target = self.cursor;
                return Ok(Some(frame.with_frame_index(Some(index))));
            }
            if self.eof_sent {
                return Ok(None);
            }

            let mut packet = ffmpeg::Packet::empty();
            match packet.read(&mut self.ictx) {
                Ok(()) => {
                    if packet.stream() != self.stream_index {
                        continue;
                    }
                    if let Err(err) = self.decoder.send_packet(&packet) {
                        if !is_retryable_error(&err) {
                            return Err(backend_error(err));
                        }
                    }
                }
                Err(ffmpeg::Error::Eof) => {
                    self.decoder.send_eof().map_err(backend_error)?;
                    self.eof_sent = true;
                }
                Err(err) => {
                    return Err(FrameError::backend_failure(
                        BACKEND_NAME,
                        format!("failed to read {}: {err}", self.input.display()),
                    ));
                }
            }
        }
    }
}

fn frame_from_converted(
    frame: &ffmpeg::util::frame::Video,
    timestamp: Option<Duration>,
) -> FrameResult<Frame> {
    let plane = frame.data(0);
    let stride = frame.stride(0);
    let width = frame.width();
    let height = frame.height();
    let mut buffer = Vec::with_capacity(stride * height as usize);
    for row in 0..height as usize {
        let offset = row * stride;
        buffer.extend_from_slice(&plane[offset..offset + stride]);
    }
    Frame::from_owned(width, height, stride, timestamp, buffer)
}

fn is_retryable_error(error: &ffmpeg::Error) -> bool {
    matches!(
        error,
        ffmpeg::Error::Other { errno }
            if *errno == EAGAIN || *errno == EWOULDBLOCK
    )
}

fn backend_error(err: ffmpeg::Error) -> FrameError {
    FrameError::backend_failure(BACKEND_NAME, err.to_string())
}

pub fn boxed_ffmpeg<P: AsRef<Path>>(path: P) -> FrameResult<DynFrameSource> {
    Ok(Box::new(FfmpegSource::open(path)?))
}
