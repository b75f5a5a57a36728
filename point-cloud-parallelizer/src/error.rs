/// Error taxonomy for tiling, recovery and execution.
use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or missing configuration. Fatal before any tiling.
    #[error("configuration error: {0}")]
    Config(String),

    /// Degenerate extent or bounds that became invalid after a buffer operation.
    #[error("invalid extent: {0}")]
    InvalidExtent(String),

    /// Pipeline template that cannot be instantiated for a tile.
    #[error("malformed pipeline template: {0}")]
    MalformedTemplate(String),

    /// One pipeline failed. Its temp record is retained for the next run.
    #[error("pipeline for `{task}` failed: {message}")]
    Execution { task: String, message: String },

    /// The pool or the pipeline engine is unusable. Fatal.
    #[error("scheduler error: {0}")]
    Scheduler(String),

    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("LAS error: {0}")]
    Las(#[from] las::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Wrap an IO error with the path it happened on.
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Error::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Errors that stop the whole batch rather than a single tile.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Config(_) | Error::Scheduler(_) | Error::Io { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_tile_errors_are_not_fatal() {
        assert!(!Error::InvalidExtent("x".into()).is_fatal());
        assert!(!Error::MalformedTemplate("x".into()).is_fatal());
        assert!(
            !Error::Execution {
                task: "0_0".into(),
                message: "exit 1".into()
            }
            .is_fatal()
        );
    }

    #[test]
    fn global_errors_are_fatal() {
        assert!(Error::Config("missing input".into()).is_fatal());
        assert!(Error::Scheduler("no pdal".into()).is_fatal());
    }

    #[test]
    fn io_error_names_path() {
        let err = Error::io(
            Path::new("/tmp/records"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("/tmp/records"));
    }
}
