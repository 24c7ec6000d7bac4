//! WorkspaceId: Join key for one synchronized directory tree.
//!
//! A fixed-length token of ASCII letters and digits, minted by the server
//! the first time a client asks for a workspace.

use rand::Rng;
use rand::distr::Alphanumeric;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

/// Length of a workspace identifier on the wire and on disk.
pub const WORKSPACE_ID_LEN: usize = 128;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkspaceIdError {
    #[error("Invalid workspace ID length: expected {WORKSPACE_ID_LEN}, got {0}")]
    InvalidLength(usize),
    #[error("Invalid workspace ID: only ASCII letters and digits are allowed")]
    InvalidCharacter,
}

/// Identifier of a workspace.
///
/// # Examples
/// ```
/// use relay_core::WorkspaceId;
///
/// let id = WorkspaceId::generate();
/// assert_eq!(id.as_str().len(), 128);
///
/// let parsed: WorkspaceId = id.as_str().parse().unwrap();
/// assert_eq!(parsed, id);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkspaceId(String);

impl WorkspaceId {
    /// Generate a new random identifier.
    ///
    /// Uniqueness is probabilistic; callers that own a set of identifiers
    /// should check membership before adopting one.
    pub fn generate() -> Self {
        let id: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(WORKSPACE_ID_LEN)
            .map(char::from)
            .collect();
        Self(id)
    }

    /// Parse an identifier from its raw wire bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WorkspaceIdError> {
        let text = std::str::from_utf8(bytes).map_err(|_| WorkspaceIdError::InvalidCharacter)?;
        text.parse()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl Display for WorkspaceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for WorkspaceId {
    type Err = WorkspaceIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != WORKSPACE_ID_LEN {
            return Err(WorkspaceIdError::InvalidLength(s.len()));
        }
        if !s.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(WorkspaceIdError::InvalidCharacter);
        }
        Ok(Self(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_alphanumeric_and_fixed_length() {
        for _ in 0..100 {
            let id = WorkspaceId::generate();
            assert_eq!(id.as_str().len(), WORKSPACE_ID_LEN);
            assert!(id.as_str().bytes().all(|b| b.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn test_generate_differs() {
        assert_ne!(WorkspaceId::generate(), WorkspaceId::generate());
    }

    #[test]
    fn test_roundtrip() {
        let original = WorkspaceId::generate();
        let parsed: WorkspaceId = original.to_string().parse().unwrap();
        assert_eq!(original, parsed);

        let from_bytes = WorkspaceId::from_bytes(original.as_bytes()).unwrap();
        assert_eq!(original, from_bytes);
    }

    #[test]
    fn test_reject_wrong_length() {
        assert_eq!(
            "abc".parse::<WorkspaceId>(),
            Err(WorkspaceIdError::InvalidLength(3))
        );
        assert!("a".repeat(WORKSPACE_ID_LEN + 1).parse::<WorkspaceId>().is_err());
        assert!("".parse::<WorkspaceId>().is_err());
    }

    #[test]
    fn test_reject_non_alphanumeric() {
        let mut s = "a".repeat(WORKSPACE_ID_LEN - 1);
        s.push('/');
        assert_eq!(s.parse::<WorkspaceId>(), Err(WorkspaceIdError::InvalidCharacter));

        let mut bytes = vec![b'a'; WORKSPACE_ID_LEN];
        bytes[10] = 0xFF;
        assert!(WorkspaceId::from_bytes(&bytes).is_err());
    }
}
