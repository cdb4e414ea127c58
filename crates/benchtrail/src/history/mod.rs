//! Durable, race-safe accumulation of benchmark runs
//!
//! ```text
//!   load ──► HistoryDocument + RevisionToken
//!              │ append (in memory)
//!              ▼
//!   persist(doc, token) ──► ok: new token
//!                       └─► ConflictError: reload, re-append, retry
//! ```

mod backend;
mod document;
mod store;
pub mod wire;

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use backend::{FileBackend, MemoryBackend, Snapshot, StorageBackend};
pub use document::{
    AppendReceipt, BenchRecord, BenchmarkSeries, Finding, HistoryDocument, RunEntry, SeriesPoint,
    UnitChange,
};
pub use store::HistoryStore;
pub use wire::DocumentCodec;

/// Opaque marker of the stored state a reader observed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RevisionToken(String);

const ABSENT: &str = "absent";

impl RevisionToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Token of a store that holds no document yet
    pub fn absent() -> Self {
        Self(ABSENT.to_string())
    }

    /// Content-addressed token (hex SHA-256)
    pub fn of_content(content: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(content)))
    }

    pub fn is_absent(&self) -> bool {
        self.0 == ABSENT
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RevisionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short: String = self.0.chars().take(12).collect();
        write!(f, "{}", short)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_token_is_stable() {
        let a = RevisionToken::of_content(b"window.BENCHMARK_DATA = {}");
        let b = RevisionToken::of_content(b"window.BENCHMARK_DATA = {}");
        let c = RevisionToken::of_content(b"window.BENCHMARK_DATA = {} ");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 64);
        assert!(!a.is_absent());
    }

    #[test]
    fn test_display_shortens_hashes() {
        let token = RevisionToken::of_content(b"x");
        assert_eq!(token.to_string().len(), 12);
        assert_eq!(RevisionToken::absent().to_string(), "absent");
    }

    #[test]
    fn test_display_shortens_multibyte_tokens() {
        let token = RevisionToken::new("rév±ßion-ünïcode-token");
        assert_eq!(token.to_string(), "rév±ßion-ünï");
    }
}
