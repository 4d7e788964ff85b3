//! Idempotency-key claims.
//!
//! A client retrying `POST /runs` (or a worker-command POST) with the same
//! idempotency key and an identical body must get the original outcome; the
//! same key with a different body is a conflict. Bodies are compared by
//! SHA-256 fingerprint.

use dashmap::DashMap;
use sha2::{Digest, Sha256};

/// Result of claiming an idempotency key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyClaim {
    /// First use of the key; the caller proceeds and owns the stored id.
    Accepted,
    /// Same key, same body fingerprint: return the stored id unchanged.
    Replayed(String),
    /// Same key, different body fingerprint.
    Conflict,
}

/// Idempotency-key store.
pub trait IdempotencyStore: Send + Sync {
    /// Claim `key` for a request with the given body `fingerprint`,
    /// recording `id` as the assigned outcome on first use.
    fn claim(&self, key: &str, fingerprint: &str, id: &str) -> IdempotencyClaim;

    /// Release a claim whose operation failed, so a retry starts fresh.
    fn release(&self, key: &str);
}

/// SHA-256 fingerprint of a request body, hex-encoded.
#[must_use]
pub fn fingerprint(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    hex::encode(hasher.finalize())
}

/// In-memory idempotency store.
#[derive(Debug, Default)]
pub struct InMemoryIdempotencyStore {
    entries: DashMap<String, (String, String)>,
}

impl InMemoryIdempotencyStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdempotencyStore for InMemoryIdempotencyStore {
    fn claim(&self, key: &str, fingerprint: &str, id: &str) -> IdempotencyClaim {
        // entry() holds the shard lock across the check, making the claim
        // atomic under concurrent retries.
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| (fingerprint.to_string(), id.to_string()));
        let (stored_fingerprint, stored_id) = entry.value();
        if stored_id == id {
            return IdempotencyClaim::Accepted;
        }
        if stored_fingerprint == fingerprint {
            IdempotencyClaim::Replayed(stored_id.clone())
        } else {
            IdempotencyClaim::Conflict
        }
    }

    fn release(&self, key: &str) {
        self.entries.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn first_claim_accepted() {
        let store = InMemoryIdempotencyStore::new();
        let fp = fingerprint(b"body");
        assert_eq!(store.claim("k", &fp, "run-1"), IdempotencyClaim::Accepted);
    }

    #[test]
    fn same_body_replays_original_id() {
        let store = InMemoryIdempotencyStore::new();
        let fp = fingerprint(b"body");
        store.claim("k", &fp, "run-1");
        assert_eq!(
            store.claim("k", &fp, "run-2"),
            IdempotencyClaim::Replayed("run-1".into())
        );
    }

    #[test]
    fn different_body_conflicts() {
        let store = InMemoryIdempotencyStore::new();
        store.claim("k", &fingerprint(b"body-a"), "run-1");
        assert_eq!(
            store.claim("k", &fingerprint(b"body-b"), "run-2"),
            IdempotencyClaim::Conflict
        );
    }

    #[test]
    fn distinct_keys_are_independent() {
        let store = InMemoryIdempotencyStore::new();
        let fp = fingerprint(b"body");
        assert_eq!(store.claim("k1", &fp, "run-1"), IdempotencyClaim::Accepted);
        assert_eq!(store.claim("k2", &fp, "run-2"), IdempotencyClaim::Accepted);
    }

    #[test]
    fn release_frees_the_key() {
        let store = InMemoryIdempotencyStore::new();
        store.claim("k", &fingerprint(b"body-a"), "run-1");
        store.release("k");
        assert_eq!(
            store.claim("k", &fingerprint(b"body-b"), "run-2"),
            IdempotencyClaim::Accepted
        );
    }

    #[test]
    fn fingerprint_is_stable_and_discriminating() {
        assert_eq!(fingerprint(b"x"), fingerprint(b"x"));
        assert_ne!(fingerprint(b"x"), fingerprint(b"y"));
        assert_eq!(fingerprint(b"x").len(), 64);
    }
}
