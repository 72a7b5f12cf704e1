/// The error-kind vocabulary shared across every crate in the workspace.
///
/// Crate-local error enums (`thiserror`) stay concrete about *what* went
/// wrong; `kind()` projects that down to this small, stable set so that a
/// caller at the edge (the `server` crate's HTTP layer) can pick a status
/// code without matching on every concrete error type in the workspace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Object, fs-object, commit, token, or row absent.
    NotFound,
    /// Malformed ID, path, or request body.
    InvalidArgument,
    /// Computed digest disagrees with the declared ID under a SHA-256 assertion.
    HashMismatch,
    /// An FS-Object references a block that does not exist.
    IntegrityViolation,
    /// The parent commit is not an ancestor of the current head.
    Conflict,
    /// No healthy backend, database unreachable, or a transient object-store failure.
    Unavailable,
    /// Token missing, wrong kind, or expired.
    Forbidden,
    /// Operation attempted on a closed resource.
    Closed,
}

impl ErrorKind {
    /// A short machine-stable tag, handy for structured log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not-found",
            ErrorKind::InvalidArgument => "invalid-argument",
            ErrorKind::HashMismatch => "hash-mismatch",
            ErrorKind::IntegrityViolation => "integrity-violation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Closed => "closed",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
