//! Request-scoped extractors that stand in for the external collaborators
//! kept out of the core: the auth middleware that resolves a caller to a
//! tenant, and the hostname the client actually dialed (used by
//! `resolve_storage_class`). Since HTTP auth middleware is an explicit
//! out-of-scope collaborator, this binary consumes whatever such a
//! collaborator would have already attached to the request — an
//! `x-tenant-id` header — rather than reimplementing token-based authn
//! itself.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;

/// The tenant the upstream auth middleware resolved the caller to.
pub struct TenantId(pub String);

impl<S> FromRequestParts<S> for TenantId
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-tenant-id")
            .and_then(|v| v.to_str().ok())
            .map(|v| TenantId(v.to_string()))
            .ok_or((StatusCode::BAD_REQUEST, "missing x-tenant-id header"))
    }
}

/// The `Host` header, used for storage-class hostname routing. Falls back
/// to `"default"` when absent (e.g. in tests issuing raw requests).
pub struct Hostname(pub String);

impl<S> FromRequestParts<S> for Hostname
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let host = parts
            .headers
            .get(axum::http::header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(':').next().unwrap_or(v).to_string())
            .unwrap_or_else(|| "default".to_string());
        Ok(Hostname(host))
    }
}
