//! Cache keys.

use crate::core::{PipelineRequest, UnitSpec};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Identifies a resource run through a specific chain.
///
/// Two requests share a key when their resource identifiers match and their
/// chains have the same identifiers and options in the same order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    /// The resource identifier including any query.
    pub resource_id: String,
    /// Hash of the chain's unit specs.
    pub chain_hash: String,
}

impl CacheKey {
    /// Creates a key from a resource and its chain.
    #[must_use]
    pub fn new(resource_id: impl Into<String>, chain: &[UnitSpec]) -> Self {
        Self {
            resource_id: resource_id.into(),
            chain_hash: hash_chain(chain),
        }
    }

    /// Creates the key for a request.
    #[must_use]
    pub fn for_request(request: &PipelineRequest) -> Self {
        Self::new(request.resource_id.clone(), &request.specs())
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.resource_id, self.chain_hash)
    }
}

/// Hashes the JSON-serialized unit specs, truncating the SHA-256 digest to
/// 16 bytes.
///
/// Identifiers may contain `!` or `?`, so the specs are hashed as structured
/// JSON, never as joined request strings.
#[must_use]
pub fn hash_chain(chain: &[UnitSpec]) -> String {
    let json = serde_json::to_vec(chain).unwrap_or_default();
    let digest = Sha256::digest(&json);
    hex::encode(&digest[..16])
}
