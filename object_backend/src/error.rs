use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectBackendError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("operation not applicable to a {0:?}-tier backend")]
    NotApplicable(crate::Tier),
    #[error("backend has no presigning signer configured")]
    Unsupported,
    #[error("object store error: {0}")]
    Store(#[from] object_store::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("spill buffer error: {0}")]
    Spill(#[from] spillbuffer::SpillError),
    #[error("restore marker serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl ObjectBackendError {
    pub fn kind(&self) -> common::ErrorKind {
        match self {
            ObjectBackendError::NotFound(_) => common::ErrorKind::NotFound,
            ObjectBackendError::NotApplicable(_) => common::ErrorKind::InvalidArgument,
            ObjectBackendError::Unsupported => common::ErrorKind::InvalidArgument,
            ObjectBackendError::Store(object_store::Error::NotFound { .. }) => common::ErrorKind::NotFound,
            ObjectBackendError::Store(_) => common::ErrorKind::Unavailable,
            ObjectBackendError::Io(_) => common::ErrorKind::Unavailable,
            ObjectBackendError::Spill(e) => e.kind(),
            ObjectBackendError::Serde(_) => common::ErrorKind::IntegrityViolation,
        }
    }
}
