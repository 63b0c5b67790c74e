//! Error types shared across the ingestion pipeline.

use std::io;

/// Ingestion errors. Only `Enumeration` ever escapes a batch; the other
/// variants describe a single file and are logged where they occur.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Failed to list directory {path}: {source}")]
    Enumeration {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("{path} is not valid UTF-8 text")]
    Decode { path: String },
}

impl IngestError {
    pub fn path(&self) -> &str {
        match self {
            IngestError::Enumeration { path, .. }
            | IngestError::Read { path, .. }
            | IngestError::Decode { path } => path,
        }
    }
}
