use std::fmt;
use thiserror::Error;

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// A 64-hex-character SHA-256 content digest — the modern internal block
/// identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; 32]);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DigestError {
    #[error("digest must be exactly 64 hex characters, got {0}")]
    WrongLength(usize),
    #[error("digest contains non-hex characters")]
    NotHex,
}

impl Digest {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Digest(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn parse(s: &str) -> Result<Self, DigestError> {
        if s.len() != 64 {
            return Err(DigestError::WrongLength(s.len()));
        }
        if !is_hex(s) {
            return Err(DigestError::NotHex);
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| DigestError::NotHex)?;
        Ok(Digest(bytes))
    }

    /// A cheap "is this a 64-hex identifier" check without requiring a
    /// successful parse (used for request routing).
    pub fn looks_like(s: &str) -> bool {
        s.len() == 64 && is_hex(s)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

/// A 40-hex-character legacy block identifier, computed client-side by the
/// original Rabin-chunking protocol
/// Unlike [`Digest`] this is not required to be a valid hash of anything —
/// it is whatever the legacy client sent.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LegacyId(String);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LegacyIdError {
    #[error("legacy id must be exactly 40 hex characters, got {0}")]
    WrongLength(usize),
    #[error("legacy id contains non-hex characters")]
    NotHex,
}

impl LegacyId {
    pub fn parse(s: &str) -> Result<Self, LegacyIdError> {
        if s.len() != 40 {
            return Err(LegacyIdError::WrongLength(s.len()));
        }
        if !is_hex(s) {
            return Err(LegacyIdError::NotHex);
        }
        Ok(LegacyId(s.to_ascii_lowercase()))
    }

    pub fn looks_like(s: &str) -> bool {
        s.len() == 40 && is_hex(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LegacyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for LegacyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LegacyId({})", self.0)
    }
}

/// Either form an external block identifier can take on the wire.
pub enum ExternalId {
    Modern(Digest),
    Legacy(LegacyId),
}

impl ExternalId {
    /// Classify `s` by length and assertion: 64 hex chars (or an
    /// explicit `hash_type=sha256` assertion) means "modern", 40 hex chars
    /// means "legacy". Anything else is a caller error.
    pub fn classify(s: &str, asserts_sha256: bool) -> Result<Self, DigestError> {
        if asserts_sha256 || Digest::looks_like(s) {
            return Digest::parse(s).map(ExternalId::Modern);
        }
        match LegacyId::parse(s) {
            Ok(id) => Ok(ExternalId::Legacy(id)),
            Err(_) => Err(DigestError::WrongLength(s.len())),
        }
    }
}

/// Partition key for per-tenant tables
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct TenantId(pub String);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Partition key for per-library tables
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct LibraryId(pub String);

impl fmt::Display for LibraryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_roundtrips_through_hex() {
        let bytes = [7u8; 32];
        let d = Digest::from_bytes(bytes);
        let hex = d.to_hex();
        assert_eq!(hex.len(), 64);
        let parsed = Digest::parse(&hex).unwrap();
        assert_eq!(parsed, d);
    }

    #[test]
    fn digest_rejects_wrong_length() {
        assert_eq!(Digest::parse("abcd"), Err(DigestError::WrongLength(4)));
    }

    #[test]
    fn legacy_id_classification() {
        let legacy = "a".repeat(40);
        let modern = "b".repeat(64);
        assert!(matches!(
            ExternalId::classify(&legacy, false).unwrap(),
            ExternalId::Legacy(_)
        ));
        assert!(matches!(
            ExternalId::classify(&modern, false).unwrap(),
            ExternalId::Modern(_)
        ));
    }
}
