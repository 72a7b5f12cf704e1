//! Maps every crate-local error in the workspace down to an HTTP response,
//! via the shared `common::ErrorKind` vocabulary. `server` is the only
//! crate that knows about `StatusCode`; every other crate only ever
//! reports a `kind()`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::ErrorKind;

pub struct AppError {
    kind: ErrorKind,
    message: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    fn status(&self) -> StatusCode {
        match self.kind {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorKind::HashMismatch => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::IntegrityViolation => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::Closed => StatusCode::GONE,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::warn!(kind = self.kind.as_str(), message = %self.message, "request failed");
        (self.status(), self.message).into_response()
    }
}

macro_rules! from_kinded_error {
    ($err:ty) => {
        impl From<$err> for AppError {
            fn from(e: $err) -> Self {
                let kind = e.kind();
                AppError::new(kind, e.to_string())
            }
        }
    };
}

from_kinded_error!(sync_protocol::SyncProtocolError);
from_kinded_error!(store::MetadataStoreError);
from_kinded_error!(fs_graph::FsGraphError);
from_kinded_error!(id_translator::TranslateError);
from_kinded_error!(storage_manager::StorageManagerError);
from_kinded_error!(blockstore::BlockStoreError);
from_kinded_error!(object_backend::ObjectBackendError);
from_kinded_error!(token_store::TokenStoreError);
from_kinded_error!(chunker::ChunkerError);
