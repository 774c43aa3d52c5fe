use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the dataset tools.
///
/// Every variant that concerns a file carries its path so the binaries can
/// report exactly what failed before aborting the run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse JSON {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path}:{line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("unknown object category {id} in {path}")]
    UnknownCategory { path: PathBuf, id: i64 },

    #[error("threshold ladder must be strictly increasing positive values, got {0:?}")]
    InvalidThresholds(Vec<f64>),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("cannot fit {n_clusters} clusters to {n_samples} samples")]
    TooFewPoints { n_samples: usize, n_clusters: usize },

    #[error("failed to write image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Error::Json {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
