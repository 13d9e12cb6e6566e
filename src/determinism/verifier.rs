//! Runtime Verifier
//!
//! Stores checkpoint hashes by sequence number and compares recorded state
//! against live state at replay time. Hashes are SHA-256 over a canonical
//! string rendering: stable field-wise serialization for data shapes, a
//! qualified-type-name fallback for opaque values.

use dashmap::DashMap;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::divergence::DivergenceKind;
use crate::sources::TypeShape;
use crate::timeline::now_ms;

/// A stored checkpoint: content hash plus creation timestamp.
#[derive(Debug, Clone)]
pub struct StoredCheckpoint {
    pub hash: Vec<u8>,
    pub timestamp_ms: i64,
}

/// Outcome of verifying live state against a stored checkpoint.
#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    pub is_valid: bool,
    pub divergence: DivergenceKind,
    pub message: String,
}

/// Checkpoint store and recorded-vs-live comparator.
#[derive(Default)]
pub struct RuntimeVerifier {
    checkpoints: DashMap<u64, StoredCheckpoint>,
}

impl RuntimeVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash the given state and store it as the checkpoint for `sequence_no`.
    /// Returns the hash.
    pub fn create_checkpoint(
        &self,
        sequence_no: u64,
        type_name: &str,
        shape: TypeShape,
        state: &Value,
    ) -> Vec<u8> {
        let hash = hash_state(type_name, shape, state);
        self.checkpoints.insert(
            sequence_no,
            StoredCheckpoint {
                hash: hash.clone(),
                timestamp_ms: now_ms(),
            },
        );
        hash
    }

    /// Store an externally recorded hash (rehydrating a recording).
    pub fn store_checkpoint(&self, sequence_no: u64, hash: Vec<u8>) {
        self.checkpoints.insert(
            sequence_no,
            StoredCheckpoint {
                hash,
                timestamp_ms: now_ms(),
            },
        );
    }

    pub fn contains(&self, sequence_no: u64) -> bool {
        self.checkpoints.contains_key(&sequence_no)
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    pub fn clear(&self) {
        self.checkpoints.clear();
    }

    /// Compare live state against the checkpoint stored for `sequence_no`.
    ///
    /// A missing checkpoint is a structural divergence; so are unequal
    /// hashes. Equal hashes verify cleanly.
    pub fn verify_against_checkpoint(
        &self,
        sequence_no: u64,
        type_name: &str,
        shape: TypeShape,
        live: &Value,
    ) -> VerificationOutcome {
        let stored = match self.checkpoints.get(&sequence_no) {
            Some(entry) => entry.hash.clone(),
            None => {
                return VerificationOutcome {
                    is_valid: false,
                    divergence: DivergenceKind::Structural,
                    message: format!("no checkpoint recorded for sequence {sequence_no}"),
                };
            }
        };

        let live_hash = hash_state(type_name, shape, live);
        if live_hash == stored {
            VerificationOutcome {
                is_valid: true,
                divergence: DivergenceKind::None,
                message: String::new(),
            }
        } else {
            VerificationOutcome {
                is_valid: false,
                divergence: DivergenceKind::Structural,
                message: format!(
                    "state hash mismatch at sequence {sequence_no}: recorded {} live {}",
                    hex::encode(&stored[..8.min(stored.len())]),
                    hex::encode(&live_hash[..8]),
                ),
            }
        }
    }
}

/// SHA-256 over the canonical rendering of a state value.
pub fn hash_state(type_name: &str, shape: TypeShape, state: &Value) -> Vec<u8> {
    let canonical = canonical_form(type_name, shape, state);
    Sha256::digest(canonical.as_bytes()).to_vec()
}

/// Canonical string rendering used for checkpoint hashing.
///
/// Data shapes get a stable field-wise serialization (object keys sorted at
/// every depth). Opaque shapes fall back to the qualified type name, which
/// classifies at most Conditional and is never replay-verified on content.
pub fn canonical_form(type_name: &str, shape: TypeShape, state: &Value) -> String {
    match shape {
        TypeShape::TaggedUnion | TypeShape::PureData => canonical_json(state),
        TypeShape::Opaque => format!("{type_name}@opaque"),
    }
}

fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    format!(
                        "{}:{}",
                        serde_json::to_string(k).unwrap_or_default(),
                        canonical_json(&map[k])
                    )
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", rendered.join(","))
        }
        other => other.to_string(),
    }
}

/// Deterministic capture monitor: re-invokes `capture_state` and compares
/// canonical hashes. Used by tests to enforce the side-effect-free contract
/// for Guaranteed and Verifiable sources.
pub fn capture_is_repeatable(source: &dyn crate::sources::StateSource) -> anyhow::Result<bool> {
    let descriptor = source.descriptor();
    let first = source.capture_state()?;
    let second = source.capture_state()?;
    let a = hash_state(&descriptor.type_name, descriptor.shape, &first);
    let b = hash_state(&descriptor.type_name, descriptor.shape, &second);
    Ok(a == b)
}
