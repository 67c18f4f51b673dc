//! Request fingerprints shared by the cache tiers and the in-flight registry

use serde::{Deserialize, Serialize};
use std::fmt;

/// BLAKE3 digest of (normalized query, analysis-type hint, user id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn compute(query: &str, analysis_type: &str, user_id: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        // Length-prefix each component so ("ab", "c") and ("a", "bc") differ
        for part in [
            normalize_query(query),
            analysis_type.trim().to_lowercase(),
            user_id.trim().to_string(),
        ] {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        Self(hasher.finalize().to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0[..16.min(self.0.len())])
    }
}

/// Lowercase, trim and collapse inner whitespace
pub fn normalize_query(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Everything the cache tiers need to know about one request
#[derive(Debug, Clone)]
pub struct RequestKey {
    pub fingerprint: Fingerprint,
    /// Normalized query text, used by the pattern and similarity tiers
    pub normalized: String,
    /// Similarity matches never cross (hint, user) boundaries
    pub scope: String,
}

impl RequestKey {
    pub fn new(query: &str, analysis_type: &str, user_id: &str) -> Self {
        Self {
            fingerprint: Fingerprint::compute(query, analysis_type, user_id),
            normalized: normalize_query(query),
            scope: format!("{}\u{1f}{}", analysis_type.trim().to_lowercase(), user_id.trim()),
        }
    }
}
