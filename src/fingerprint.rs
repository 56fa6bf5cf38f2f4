//! Content-addressed value fingerprints
//!
//! A fingerprint is the lowercase hex SHA-256 digest of a value's tagged
//! content representation:
//!
//! ```text
//! TracedValue ──classify──▶ TaggedContent ──encode──▶ bytes ──sha256──▶ Fingerprint
//!
//!   Array      → (sum, mean, max, min, first, last)
//!   Sequence   → [child fingerprint, ...]            (position-sensitive)
//!   Tuple      → [child fingerprint, ...]            (distinct tag)
//!   Mapping    → [(key, child fingerprint), ...]     (sorted by key)
//!   Primitive  → (kind, literal)
//!   Opaque     → type name + serialized bytes
//!   Fallback   → (type name, text)                   (weakest guarantee)
//! ```
//!
//! Fingerprints are stable across runs for identical content. The only hard
//! failure is an empty array, whose statistics are undefined. Every other
//! internal problem degrades to the `Fallback` representation and is reported
//! through [`Fingerprinted::Degraded`].

use crate::value::{NdArray, OpaqueValue, TracedValue};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use thiserror::Error;

/// Length of the abbreviated fingerprint used in value node identifiers
pub const SHORT_LEN: usize = 12;

/// Errors that abort fingerprinting
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FingerprintError {
    #[error("cannot fingerprint an empty array (shape {shape:?})")]
    EmptyArray { shape: Vec<usize> },
}

/// Hex SHA-256 digest identifying a value's content
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Digest arbitrary bytes
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Fingerprint(hex::encode(Sha256::digest(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for labels and node identifiers
    pub fn short(&self) -> &str {
        &self.0[..SHORT_LEN.min(self.0.len())]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprinting outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fingerprinted {
    /// Computed from the value's full tagged content
    Exact(Fingerprint),
    /// The value, or something nested in it, fell back to type name plus text
    Degraded {
        fingerprint: Fingerprint,
        reason: String,
    },
}

impl Fingerprinted {
    pub fn fingerprint(&self) -> &Fingerprint {
        match self {
            Fingerprinted::Exact(fp) => fp,
            Fingerprinted::Degraded { fingerprint, .. } => fingerprint,
        }
    }

    pub fn into_fingerprint(self) -> Fingerprint {
        match self {
            Fingerprinted::Exact(fp) => fp,
            Fingerprinted::Degraded { fingerprint, .. } => fingerprint,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Fingerprinted::Degraded { .. })
    }

    pub fn degraded_reason(&self) -> Option<&str> {
        match self {
            Fingerprinted::Exact(_) => None,
            Fingerprinted::Degraded { reason, .. } => Some(reason),
        }
    }
}

/// Classified content of a value, ready for hashing
#[derive(Debug, Serialize)]
#[serde(tag = "tag", content = "content", rename_all = "snake_case")]
enum TaggedContent<'a> {
    /// sum, mean, max, min, first, last
    Array([String; 6]),
    Sequence(Vec<Fingerprint>),
    Tuple(Vec<Fingerprint>),
    Mapping(Vec<(&'a str, Fingerprint)>),
    Primitive { kind: &'static str, literal: String },
    Opaque { type_name: &'a str, bytes: &'a [u8] },
    Fallback { type_name: &'a str, text: String },
}

impl TaggedContent<'_> {
    /// Canonical bytes fed to SHA-256
    fn encode(&self) -> Result<Vec<u8>, String> {
        match self {
            // Raw bytes are hashed behind a tag/type prefix rather than
            // re-encoded, so large payloads are not inflated.
            TaggedContent::Opaque { type_name, bytes } => {
                let mut out = Vec::with_capacity(bytes.len() + type_name.len() + 8);
                out.extend_from_slice(b"opaque\0");
                out.extend_from_slice(type_name.as_bytes());
                out.push(0);
                out.extend_from_slice(bytes);
                Ok(out)
            }
            other => serde_json::to_vec(other).map_err(|e| e.to_string()),
        }
    }
}

/// Summary statistics of a non-empty array
fn array_stats(array: &NdArray) -> Result<[String; 6], FingerprintError> {
    let data = array.data();
    let (first, last) = match (data.first(), data.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => {
            return Err(FingerprintError::EmptyArray {
                shape: array.shape().to_vec(),
            })
        }
    };
    let sum: f64 = data.iter().sum();
    let mean = sum / data.len() as f64;
    let max = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = data.iter().copied().fold(f64::INFINITY, f64::min);
    Ok([sum, mean, max, min, first, last].map(|x| format!("{:?}", x)))
}

/// Hash tagged content, downgrading to the fallback form if encoding fails
fn digest(
    content: TaggedContent<'_>,
    value: &TracedValue,
    degraded: Option<String>,
) -> Fingerprinted {
    match content.encode() {
        Ok(bytes) => {
            let fingerprint = Fingerprint::of_bytes(&bytes);
            match degraded {
                None => Fingerprinted::Exact(fingerprint),
                Some(reason) => Fingerprinted::Degraded {
                    fingerprint,
                    reason,
                },
            }
        }
        Err(reason) => {
            tracing::warn!(
                "fingerprint encoding failed for {}: {}; using fallback",
                value.type_name(),
                reason
            );
            Fingerprinted::Degraded {
                fingerprint: fallback_fingerprint(value.type_name(), &value.to_string()),
                reason,
            }
        }
    }
}

/// Fingerprint of the fallback representation `type_name:text`
fn fallback_fingerprint(type_name: &str, text: &str) -> Fingerprint {
    Fingerprint::of_bytes(format!("{}:{}", type_name, text).as_bytes())
}

/// Runtime identity of a shared value instance
enum Instance {
    Array(Weak<NdArray>),
    Opaque(Weak<OpaqueValue>),
}

impl Instance {
    fn is(&self, value: &TracedValue) -> bool {
        match (self, value) {
            (Instance::Array(weak), TracedValue::Array(arc)) => {
                weak.upgrade().is_some_and(|live| Arc::ptr_eq(&live, arc))
            }
            (Instance::Opaque(weak), TracedValue::Opaque(arc)) => {
                weak.upgrade().is_some_and(|live| Arc::ptr_eq(&live, arc))
            }
            _ => false,
        }
    }
}

struct CacheEntry {
    instance: Instance,
    outcome: Fingerprinted,
}

/// Identity key for values that have a shared allocation
fn identity_key(value: &TracedValue) -> Option<(usize, Instance)> {
    match value {
        TracedValue::Array(arc) => Some((
            Arc::as_ptr(arc) as *const () as usize,
            Instance::Array(Arc::downgrade(arc)),
        )),
        TracedValue::Opaque(arc) => Some((
            Arc::as_ptr(arc) as *const () as usize,
            Instance::Opaque(Arc::downgrade(arc)),
        )),
        _ => None,
    }
}

/// Fingerprinter with a per-run identity cache
///
/// The cache maps the address of a shared array or opaque instance to its
/// fingerprint. An entry only counts as a hit while the very same instance is
/// still alive, so a reused address never returns a stale fingerprint.
#[derive(Default)]
pub struct Fingerprinter {
    cache: HashMap<usize, CacheEntry>,
    hits: u64,
}

impl fmt::Debug for Fingerprinter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fingerprinter")
            .field("cached", &self.cache.len())
            .field("hits", &self.hits)
            .finish()
    }
}

impl Fingerprinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fingerprint a value, recursing depth-first through containers
    ///
    /// # Errors
    ///
    /// [`FingerprintError::EmptyArray`] if the value is, or contains, an empty
    /// array.
    pub fn fingerprint(&mut self, value: &TracedValue) -> Result<Fingerprinted, FingerprintError> {
        let key = identity_key(value);
        if let Some((addr, _)) = &key {
            if let Some(entry) = self.cache.get(addr) {
                if entry.instance.is(value) {
                    self.hits += 1;
                    return Ok(entry.outcome.clone());
                }
            }
        }

        let outcome = self.compute(value)?;

        if let Some((addr, instance)) = key {
            self.cache.insert(
                addr,
                CacheEntry {
                    instance,
                    outcome: outcome.clone(),
                },
            );
        }
        Ok(outcome)
    }

    fn compute(&mut self, value: &TracedValue) -> Result<Fingerprinted, FingerprintError> {
        let mut degraded = None;
        let content = match value {
            TracedValue::Array(array) => TaggedContent::Array(array_stats(array)?),
            TracedValue::Sequence(items) => {
                TaggedContent::Sequence(self.children(items, &mut degraded)?)
            }
            TracedValue::Tuple(items) => TaggedContent::Tuple(self.children(items, &mut degraded)?),
            TracedValue::Mapping(entries) => {
                let mut items = Vec::with_capacity(entries.len());
                for (key, child) in entries {
                    let outcome = self.fingerprint(child)?;
                    note_degraded(&mut degraded, &outcome);
                    items.push((key.as_str(), outcome.into_fingerprint()));
                }
                // Duplicate keys are ordered by content as well.
                items.sort();
                TaggedContent::Mapping(items)
            }
            TracedValue::Primitive(p) => TaggedContent::Primitive {
                kind: p.kind(),
                literal: p.literal(),
            },
            TracedValue::Opaque(object) => match object.bytes() {
                Ok(bytes) => TaggedContent::Opaque {
                    type_name: object.type_name(),
                    bytes,
                },
                Err(reason) => {
                    degraded = Some(format!(
                        "{} is not serializable: {}",
                        object.type_name(),
                        reason
                    ));
                    TaggedContent::Fallback {
                        type_name: object.type_name(),
                        text: object.repr().to_string(),
                    }
                }
            },
        };
        Ok(digest(content, value, degraded))
    }

    fn children(
        &mut self,
        items: &[TracedValue],
        degraded: &mut Option<String>,
    ) -> Result<Vec<Fingerprint>, FingerprintError> {
        items
            .iter()
            .map(|item| {
                let outcome = self.fingerprint(item)?;
                note_degraded(degraded, &outcome);
                Ok(outcome.into_fingerprint())
            })
            .collect()
    }

    /// Number of live identity-cache entries
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Identity-cache hits since creation or the last clear
    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.hits = 0;
    }
}

fn note_degraded(degraded: &mut Option<String>, outcome: &Fingerprinted) {
    if degraded.is_none() {
        if let Some(reason) = outcome.degraded_reason() {
            *degraded = Some(reason.to_string());
        }
    }
}

/// Fingerprint a value without an identity cache
pub fn fingerprint(value: &TracedValue) -> Result<Fingerprint, FingerprintError> {
    Fingerprinter::new()
        .fingerprint(value)
        .map(Fingerprinted::into_fingerprint)
}
