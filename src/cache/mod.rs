//! Resolution Cache
//!
//! Keyed store of the last known `DateDecision` per media item. Writes are
//! last-writer-wins per key with one exception: an unresolved decision never
//! replaces a complete one.

pub mod persistence;

pub use persistence::SledResolutionCache;

use crate::decision::DateDecision;
use crate::error::CacheError;
use crate::types::{MediaKey, Provenance};
use parking_lot::RwLock;
use std::collections::HashMap;

/// What a `put` actually did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Written,
    /// The incoming decision was unresolved and a complete one was kept.
    RetainedComplete,
}

/// Resolution Cache interface
pub trait ResolutionCache: Send + Sync {
    fn get(&self, key: &MediaKey) -> Result<Option<DateDecision>, CacheError>;

    /// Store a decision. Must not downgrade a complete decision to unresolved.
    fn put(&self, decision: &DateDecision) -> Result<PutOutcome, CacheError>;

    fn list(&self) -> Result<Vec<DateDecision>, CacheError>;

    /// Rewrite every decision whose source is `from` to carry `to` instead.
    /// Returns the number of decisions rewritten.
    fn remap_source(&self, from: &Provenance, to: &Provenance) -> Result<usize, CacheError>;

    /// Decisions that still need operator attention
    fn list_unresolved(&self) -> Result<Vec<DateDecision>, CacheError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|decision| !decision.is_complete())
            .collect())
    }
}

/// Returns true when `incoming` may replace `existing`.
pub fn may_replace(existing: Option<&DateDecision>, incoming: &DateDecision) -> bool {
    match existing {
        Some(existing) => incoming.is_complete() || !existing.is_complete(),
        None => true,
    }
}

/// In-process cache, used by tests and by deployments without a cache path.
#[derive(Debug, Default)]
pub struct MemoryResolutionCache {
    decisions: RwLock<HashMap<MediaKey, DateDecision>>,
}

impl MemoryResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.decisions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.read().is_empty()
    }
}

impl ResolutionCache for MemoryResolutionCache {
    fn get(&self, key: &MediaKey) -> Result<Option<DateDecision>, CacheError> {
        Ok(self.decisions.read().get(key).cloned())
    }

    fn put(&self, decision: &DateDecision) -> Result<PutOutcome, CacheError> {
        let mut decisions = self.decisions.write();
        if !may_replace(decisions.get(&decision.key), decision) {
            return Ok(PutOutcome::RetainedComplete);
        }
        decisions.insert(decision.key.clone(), decision.clone());
        Ok(PutOutcome::Written)
    }

    fn list(&self) -> Result<Vec<DateDecision>, CacheError> {
        let mut all: Vec<DateDecision> = self.decisions.read().values().cloned().collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(all)
    }

    fn remap_source(&self, from: &Provenance, to: &Provenance) -> Result<usize, CacheError> {
        let mut decisions = self.decisions.write();
        let mut remapped = 0;
        for decision in decisions.values_mut() {
            if &decision.source == from {
                decision.source = to.clone();
                remapped += 1;
            }
        }
        Ok(remapped)
    }
}
