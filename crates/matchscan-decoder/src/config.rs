use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::debug;

use crate::core::{DynFrameSource, FrameError, FrameResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Synthetic,
    Ffmpeg,
}

impl FromStr for Backend {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "synthetic" | "mock" => Ok(Backend::Synthetic),
            "ffmpeg" => Ok(Backend::Ffmpeg),
            other => Err(FrameError::configuration(format!(
                "unknown backend '{other}'"
            ))),
        }
    }
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Synthetic => "synthetic",
            Backend::Ffmpeg => "ffmpeg",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn compiled_backends() -> Vec<Backend> {
    let mut backends = Vec::new();
    #[cfg(feature = "backend-ffmpeg")]
    {
        backends.push(Backend::Ffmpeg);
    }
    backends.push(Backend::Synthetic);
    backends
}

/// Shape of the frames produced by the synthetic backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticOptions {
    pub total_frames: u64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

impl Default for SyntheticOptions {
    fn default() -> Self {
        Self {
            total_frames: 10_000,
            width: 64,
            height: 36,
            fps: 60.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Configuration {
    pub backend: Backend,
    pub input: Option<PathBuf>,
    pub synthetic: SyntheticOptions,
}

impl Default for Configuration {
    fn default() -> Self {
        let backend = compiled_backends()
            .into_iter()
            .next()
            .unwrap_or(Backend::Synthetic);
        Self {
            backend,
            input: None,
            synthetic: SyntheticOptions::default(),
        }
    }
}

impl Configuration {
    pub fn from_env() -> FrameResult<Self> {
        let mut config = Configuration::default();
        if let Ok(backend) = env::var("MATCHSCAN_BACKEND") {
            config.backend = Backend::from_str(&backend)?;
        }
        if let Ok(path) = env::var("MATCHSCAN_INPUT") {
            config.input = Some(PathBuf::from(path));
        }
        if let Ok(frames) = env::var("MATCHSCAN_SYNTHETIC_FRAMES") {
            let parsed: u64 = frames.parse().map_err(|_| {
                FrameError::configuration(format!(
                    "failed to parse MATCHSCAN_SYNTHETIC_FRAMES='{frames}' as a positive integer"
                ))
            })?;
            if parsed == 0 {
                return Err(FrameError::configuration(
                    "MATCHSCAN_SYNTHETIC_FRAMES must be greater than zero",
                ));
            }
            config.synthetic.total_frames = parsed;
        }
        Ok(config)
    }

    pub fn available_backends() -> Vec<Backend> {
        compiled_backends()
    }

    /// Opens a fresh decode context; each call yields an independent cursor.
    pub fn create_source(&self) -> FrameResult<DynFrameSource> {
        debug!(backend = self.backend.as_str(), input = ?self.input, "opening frame source");
        match self.backend {
            Backend::Synthetic => Ok(Box::new(
                crate::backends::synthetic::SyntheticSource::new(self.synthetic),
            )),
            Backend::Ffmpeg => {
                #[cfg(feature = "backend-ffmpeg")]
                {
                    let path = self.input.clone().ok_or_else(|| {
                        FrameError::configuration("ffmpeg backend requires an input path")
                    })?;
                    crate::backends::ffmpeg::boxed_ffmpeg(path)
                }
                #[cfg(not(feature = "backend-ffmpeg"))]
                {
                    Err(FrameError::unsupported("ffmpeg"))
                }
            }
        }
    }
}
