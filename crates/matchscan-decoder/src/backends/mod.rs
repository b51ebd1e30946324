pub mod synthetic;

#[cfg(feature = "backend-ffmpeg")]
pub mod ffmpeg;
