//! Signatures identifying mergeable operations.
//!
//! Each signer feeds identity fields into SHA-256, separated by a zero byte.
//! Label maps are hashed in key order, so two operations built from the same
//! labels collide no matter how their maps were populated. Metric values
//! inside a check signature are likewise hashed in digest order.

use crate::core::{Operation, Result};
use crate::metrics::MetricValue;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

const SEPARATOR: [u8; 1] = [0];

/// Fixed-length hash key for a cache entry
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Signature([u8; 32]);

impl Signature {
    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    fn from_hasher(hasher: Sha256) -> Self {
        Signature(hasher.finalize().into())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", &hex::encode(self.0)[..16])
    }
}

/// Signature for the check cache.
///
/// Covers name, consumer, labels and the labels/currency of every metric
/// value, but not the measured amounts: checks that differ only in how much
/// quota they use share one cached verdict.
pub fn sign_check(op: &Operation) -> Result<Signature> {
    op.validate()?;

    let mut hasher = Sha256::new();
    hasher.update(op.operation_name.as_bytes());
    hasher.update(SEPARATOR);
    hasher.update(op.consumer_id.as_bytes());
    add_labels_to_hash(&mut hasher, &op.labels);

    let mut value_sets: Vec<_> = op.metric_value_sets.iter().collect();
    value_sets.sort_by(|a, b| a.metric_name.cmp(&b.metric_name));
    for value_set in value_sets {
        hasher.update(SEPARATOR);
        hasher.update(value_set.metric_name.as_bytes());
        let mut digests: Vec<Signature> =
            value_set.metric_values.iter().map(sign_metric_value).collect();
        digests.sort_unstable();
        for digest in &digests {
            hasher.update(digest.as_bytes());
        }
    }
    hasher.update(SEPARATOR);

    Ok(Signature::from_hasher(hasher))
}

/// Signature for the report cache: consumer, name and labels only.
pub fn sign_report(op: &Operation) -> Result<Signature> {
    op.validate()?;

    let mut hasher = Sha256::new();
    hasher.update(op.consumer_id.as_bytes());
    hasher.update(SEPARATOR);
    hasher.update(op.operation_name.as_bytes());
    add_labels_to_hash(&mut hasher, &op.labels);

    Ok(Signature::from_hasher(hasher))
}

/// Signature grouping metric values inside one operation
pub fn sign_metric_value(value: &MetricValue) -> Signature {
    let mut hasher = Sha256::new();
    add_metric_value_to_hash(&mut hasher, value);
    Signature::from_hasher(hasher)
}

fn add_metric_value_to_hash(hasher: &mut Sha256, value: &MetricValue) {
    add_labels_to_hash(hasher, &value.labels);
    if let Some(currency) = value.currency_code() {
        hasher.update(SEPARATOR);
        hasher.update(currency.as_bytes());
    }
}

fn add_labels_to_hash(hasher: &mut Sha256, labels: &HashMap<String, String>) {
    let mut keys: Vec<&String> = labels.keys().collect();
    keys.sort_unstable();
    for key in keys {
        hasher.update(SEPARATOR);
        hasher.update(key.as_bytes());
        hasher.update(SEPARATOR);
        hasher.update(labels[key].as_bytes());
    }
}
