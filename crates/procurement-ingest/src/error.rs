use std::path::PathBuf;

use procurement_core::KernelError;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("workbook error: {0}")]
    Workbook(#[from] calamine::Error),
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("worksheet not found: {0}")]
    NoWorksheet(String),
    #[error("header row not found: {0}")]
    HeaderNotFound(String),
    #[error("invalid source: {0}")]
    InvalidSource(String),
    #[error("manifest error: {0}")]
    Manifest(#[from] serde_yaml::Error),
    #[error("store error: {0}")]
    Store(String),
}

impl From<KernelError> for IngestError {
    fn from(err: KernelError) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<anyhow::Error> for IngestError {
    fn from(err: anyhow::Error) -> Self {
        Self::Store(format!("{err:#}"))
    }
}
