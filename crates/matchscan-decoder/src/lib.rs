pub mod backends;
pub mod config;
pub mod core;

pub use config::{Backend, Configuration, SyntheticOptions};
pub use core::{DynFrameSource, FrameSource, VideoMetadata, read_frame_at};
pub use matchscan_types::{Frame, FrameError, FrameIndex, FrameResult};
