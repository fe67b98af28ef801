use canary_core::CanaryError;
use thiserror::Error;

/// Errors produced while loading a catalog source.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed catalog {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid record #{index} in {path}: {reason}")]
    InvalidRecord {
        path: String,
        index: usize,
        reason: String,
    },
}

impl From<CatalogError> for CanaryError {
    fn from(e: CatalogError) -> Self {
        let path = match &e {
            CatalogError::Io { path, .. }
            | CatalogError::Parse { path, .. }
            | CatalogError::InvalidRecord { path, .. } => path.clone(),
        };
        CanaryError::CatalogLoad {
            path,
            reason: e.to_string(),
        }
    }
}
