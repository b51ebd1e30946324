use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum OutputError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Encode {
        path: PathBuf,
        source: image::ImageError,
    },
    Json(serde_json::Error),
    Plane(String),
}

impl OutputError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        OutputError::Io {
            path: path.into(),
            source,
        }
    }
}

impl fmt::Display for OutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputError::Io { path, source } => {
                write!(f, "failed to write {}: {source}", path.display())
            }
            OutputError::Encode { path, source } => {
                write!(f, "failed to encode {}: {source}", path.display())
            }
            OutputError::Json(err) => write!(f, "JSON error: {err}"),
            OutputError::Plane(reason) => write!(f, "unusable frame plane: {reason}"),
        }
    }
}

impl std::error::Error for OutputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OutputError::Io { source, .. } => Some(source),
            OutputError::Encode { source, .. } => Some(source),
            OutputError::Json(err) => Some(err),
            OutputError::Plane(_) => None,
        }
    }
}

impl From<serde_json::Error> for OutputError {
    fn from(value: serde_json::Error) -> Self {
        OutputError::Json(value)
    }
}
