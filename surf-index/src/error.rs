use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid settings in {}: {source}", .path.display())]
    Settings {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("unable to encode or decode the store {}: {source}", .path.display())]
    Store {
        path: PathBuf,
        source: bincode::Error,
    },
    #[error("{}:{line}: `{token}` is not a number", .path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        token: String,
    },
    #[error("{}:{line}: expected {expected} values, found {found}", .path.display())]
    Ragged {
        path: PathBuf,
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("{} holds no values", .path.display())]
    Empty { path: PathBuf },
    #[error("duplicate key {key} in table {table}")]
    DuplicateKey { table: &'static str, key: String },
    #[error(transparent)]
    Configuration(#[from] color_surf::ConfigurationError),
    #[error(transparent)]
    Extraction(#[from] color_surf::Error),
}

impl IndexError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}
