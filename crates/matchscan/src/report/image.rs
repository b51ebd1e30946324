use std::fs;
use std::path::{Path, PathBuf};

use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use matchscan_types::{BoundingBox, Frame, FrameIndex, Label, LabelSet};
use tracing::debug;

use super::{OutputError, Reporter};
use crate::stage::history::History;

const BOX_COLOR: [u8; 3] = [255, 64, 64];

/// Writes frames as PNG files.
///
/// Boundary frames get the segment box drawn on top; sampled frames are
/// written as `frame0000060.png` and so on, with their detection box if any.
pub struct ImageReporter {
    directory: PathBuf,
    written: u64,
}

impl ImageReporter {
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self, OutputError> {
        let directory = directory.into();
        fs::create_dir_all(&directory).map_err(|source| OutputError::io(&directory, source))?;
        Ok(Self {
            directory,
            written: 0,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Saves one sampled frame with its detection box drawn.
    pub fn save_sample(
        &mut self,
        frame: &Frame,
        frame_index: FrameIndex,
        bbox: Option<BoundingBox>,
    ) -> Result<(), OutputError> {
        let path = self.directory.join(format!("frame{frame_index:07}.png"));
        write_png(frame, bbox, &path)?;
        self.written += 1;
        Ok(())
    }
}

impl Reporter for ImageReporter {
    fn render_history(
        &mut self,
        _history: &History,
        _cleaned: &[Option<Label>],
        _labels: &LabelSet,
    ) -> Result<(), OutputError> {
        Ok(())
    }

    fn render_boundary(
        &mut self,
        frame: &Frame,
        bbox: Option<BoundingBox>,
        label: &str,
        frame_index: FrameIndex,
    ) -> Result<(), OutputError> {
        let path = self
            .directory
            .join(format!("boundary{frame_index:07}_{}.png", sanitize(label)));
        write_png(frame, bbox, &path)?;
        self.written += 1;
        debug!(path = %path.display(), "wrote boundary frame");
        Ok(())
    }
}

fn write_png(frame: &Frame, bbox: Option<BoundingBox>, path: &Path) -> Result<(), OutputError> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    if width == 0 || height == 0 {
        return Ok(());
    }
    let stride = frame.stride();
    let data = frame.data();
    let required = stride
        .checked_mul(height)
        .ok_or_else(|| OutputError::Plane("stride overflow".into()))?;
    if data.len() < required {
        return Err(OutputError::Plane(format!(
            "got {} bytes, expected at least {required}",
            data.len()
        )));
    }

    let mut rgb = Vec::with_capacity(width * height * 3);
    for row in data.chunks(stride).take(height) {
        for &value in &row[..width] {
            rgb.extend_from_slice(&[value, value, value]);
        }
    }
    if let Some(rect) = bbox.and_then(|bbox| Rect::clip(bbox, width, height)) {
        draw_rectangle(&mut rgb, width, &rect);
    }

    let mut encoded = Vec::new();
    PngEncoder::new(&mut encoded)
        .write_image(&rgb, frame.width(), frame.height(), ColorType::Rgb8)
        .map_err(|source| OutputError::Encode {
            path: path.to_path_buf(),
            source,
        })?;
    fs::write(path, encoded).map_err(|source| OutputError::io(path, source))
}

/// Inclusive pixel rectangle clipped to the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Rect {
    x0: usize,
    y0: usize,
    x1: usize,
    y1: usize,
}

impl Rect {
    fn clip(bbox: BoundingBox, width: usize, height: usize) -> Option<Self> {
        let x0 = bbox.top_left.x.min(bbox.bottom_right.x).max(0) as usize;
        let y0 = bbox.top_left.y.min(bbox.bottom_right.y).max(0) as usize;
        let x1 = bbox.top_left.x.max(bbox.bottom_right.x);
        let y1 = bbox.top_left.y.max(bbox.bottom_right.y);
        if x1 < 0 || y1 < 0 || x0 >= width || y0 >= height {
            return None;
        }
        Some(Self {
            x0,
            y0,
            x1: (x1 as usize).min(width - 1),
            y1: (y1 as usize).min(height - 1),
        })
    }

    fn thickness(&self) -> usize {
        (self.x1 - self.x0).min(self.y1 - self.y0).clamp(1, 2)
    }
}

fn draw_rectangle(buffer: &mut [u8], width: usize, rect: &Rect) {
    let stride = width * 3;
    for offset in 0..rect.thickness() {
        let top = rect.y0 + offset;
        let bottom = rect.y1.saturating_sub(offset);
        for x in rect.x0..=rect.x1 {
            tint_pixel(buffer, stride, top, x);
            tint_pixel(buffer, stride, bottom, x);
        }
        let left = rect.x0 + offset;
        let right = rect.x1.saturating_sub(offset);
        for y in rect.y0..=rect.y1 {
            tint_pixel(buffer, stride, y, left);
            tint_pixel(buffer, stride, y, right);
        }
    }
}

fn tint_pixel(buffer: &mut [u8], stride: usize, y: usize, x: usize) {
    let idx = y * stride + x * 3;
    if let Some(pixel) = buffer.get_mut(idx..idx + 3) {
        pixel.copy_from_slice(&BOX_COLOR);
    }
}

fn sanitize(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32) -> Frame {
        Frame::from_owned(width, height, width as usize, None, vec![10; (width * height) as usize])
            .unwrap()
    }

    #[test]
    fn sampled_frames_use_zero_padded_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut reporter = ImageReporter::new(dir.path()).unwrap();
        reporter.save_sample(&frame(8, 4), 60, None).unwrap();
        assert!(dir.path().join("frame0000060.png").exists());
        assert_eq!(reporter.written(), 1);
    }

    #[test]
    fn detected_samples_show_their_box() {
        let dir = tempfile::tempdir().unwrap();
        let mut reporter = ImageReporter::new(dir.path()).unwrap();
        let bbox = BoundingBox::from_corners(2, 1, 12, 6);
        reporter.save_sample(&frame(16, 8), 120, Some(bbox)).unwrap();
        reporter.save_sample(&frame(16, 8), 180, None).unwrap();

        let boxed = image::open(dir.path().join("frame0000120.png")).unwrap().to_rgb8();
        assert_eq!(boxed.get_pixel(2, 1).0, BOX_COLOR);
        assert_eq!(boxed.get_pixel(12, 6).0, BOX_COLOR);
        assert_eq!(boxed.get_pixel(7, 4).0, [10, 10, 10]);

        let bare = image::open(dir.path().join("frame0000180.png")).unwrap().to_rgb8();
        assert_eq!(bare.get_pixel(2, 1).0, [10, 10, 10]);
    }

    #[test]
    fn boundary_frames_include_label() {
        let dir = tempfile::tempdir().unwrap();
        let mut reporter = ImageReporter::new(dir.path().join("nested")).unwrap();
        let bbox = BoundingBox::from_corners(1, 1, 6, 3);
        reporter
            .render_boundary(&frame(8, 4), Some(bbox), "final dest", 1000)
            .unwrap();
        assert!(reporter.directory().join("boundary0001000_final_dest.png").exists());
    }

    #[test]
    fn rectangles_are_clipped_to_the_frame() {
        let rect = Rect::clip(BoundingBox::from_corners(-5, 2, 50, 3), 8, 4).unwrap();
        assert_eq!(rect, Rect { x0: 0, y0: 2, x1: 7, y1: 3 });
        assert!(Rect::clip(BoundingBox::from_corners(9, 0, 12, 2), 8, 4).is_none());
    }

    #[test]
    fn drawing_tints_the_border() {
        let mut rgb = vec![0u8; 8 * 4 * 3];
        let rect = Rect { x0: 1, y0: 1, x1: 5, y1: 3 };
        draw_rectangle(&mut rgb, 8, &rect);
        let pixel = |x: usize, y: usize| &rgb[(y * 8 + x) * 3..(y * 8 + x) * 3 + 3];
        assert_eq!(pixel(1, 1), &BOX_COLOR);
        assert_eq!(pixel(5, 3), &BOX_COLOR);
        assert_eq!(pixel(0, 0), &[0, 0, 0]);
    }
}
