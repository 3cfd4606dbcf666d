//! Persistence layer for the Resolution Cache

use crate::cache::{may_replace, PutOutcome, ResolutionCache};
use crate::decision::DateDecision;
use crate::error::CacheError;
use crate::types::{MediaKey, Provenance};
use std::path::Path;
use tracing::debug;

/// Attempts at an atomic per-key update before reporting a write conflict
const MAX_SWAP_ATTEMPTS: usize = 8;

fn io_error(kind: std::io::ErrorKind, message: String) -> CacheError {
    CacheError::Io(std::io::Error::new(kind, message))
}

/// Sled-based implementation of ResolutionCache.
///
/// Each key is updated with compare-and-swap so a write is all-or-nothing and
/// the no-regress rule is checked against the value actually replaced.
pub struct SledResolutionCache {
    db: sled::Db,
}

impl SledResolutionCache {
    /// Open (or create) the cache database at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, CacheError> {
        let db = sled::open(path).map_err(|e| {
            io_error(
                std::io::ErrorKind::Other,
                format!("Failed to open sled database: {}", e),
            )
        })?;
        Ok(Self { db })
    }

    fn decode(bytes: &[u8]) -> Result<DateDecision, CacheError> {
        bincode::deserialize(bytes)
            .map_err(|e| CacheError::Serialization(format!("Failed to deserialize decision: {}", e)))
    }

    fn encode(decision: &DateDecision) -> Result<Vec<u8>, CacheError> {
        bincode::serialize(decision)
            .map_err(|e| CacheError::Serialization(format!("Failed to serialize decision: {}", e)))
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), CacheError> {
        self.db.flush().map_err(|e| {
            io_error(
                std::io::ErrorKind::Other,
                format!("Failed to flush database: {}", e),
            )
        })?;
        Ok(())
    }
}

impl ResolutionCache for SledResolutionCache {
    fn get(&self, key: &MediaKey) -> Result<Option<DateDecision>, CacheError> {
        match self.db.get(key.storage_key()).map_err(|e| {
            io_error(
                std::io::ErrorKind::Other,
                format!("Failed to get decision: {}", e),
            )
        })? {
            Some(value) => Ok(Some(Self::decode(&value)?)),
            None => Ok(None),
        }
    }

    fn put(&self, decision: &DateDecision) -> Result<PutOutcome, CacheError> {
        let storage_key = decision.key.storage_key();
        let encoded = Self::encode(decision)?;

        for attempt in 0..MAX_SWAP_ATTEMPTS {
            let current = self.db.get(&storage_key).map_err(|e| {
                io_error(
                    std::io::ErrorKind::Other,
                    format!("Failed to read decision: {}", e),
                )
            })?;
            let existing = current.as_deref().map(Self::decode).transpose()?;
            if !may_replace(existing.as_ref(), decision) {
                return Ok(PutOutcome::RetainedComplete);
            }

            let swapped = self
                .db
                .compare_and_swap(&storage_key, current, Some(encoded.clone()))
                .map_err(|e| {
                    io_error(
                        std::io::ErrorKind::Other,
                        format!("Failed to write decision: {}", e),
                    )
                })?;
            match swapped {
                Ok(()) => return Ok(PutOutcome::Written),
                Err(_) => {
                    debug!(key = %decision.key, attempt, "Lost cache write race, retrying");
                }
            }
        }

        Err(CacheError::WriteConflict(decision.key.to_string()))
    }

    fn list(&self) -> Result<Vec<DateDecision>, CacheError> {
        let mut decisions = Vec::new();
        for item in self.db.iter() {
            let (_, value) = item.map_err(|e| {
                io_error(
                    std::io::ErrorKind::Other,
                    format!("Failed to iterate cache: {}", e),
                )
            })?;
            decisions.push(Self::decode(&value)?);
        }
        Ok(decisions)
    }

    fn remap_source(&self, from: &Provenance, to: &Provenance) -> Result<usize, CacheError> {
        let snapshot = self.snapshot()?;
        self.remap_snapshot(snapshot, from, to)
    }
}

impl SledResolutionCache {
    fn snapshot(&self) -> Result<Vec<(sled::IVec, sled::IVec)>, CacheError> {
        self.db
            .iter()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                io_error(
                    std::io::ErrorKind::Other,
                    format!("Failed to iterate cache: {}", e),
                )
            })
    }

    /// Rewrite matching entries, each only if it still holds the bytes that
    /// were read. A key written since the snapshot keeps the newer value.
    fn remap_snapshot(
        &self,
        snapshot: Vec<(sled::IVec, sled::IVec)>,
        from: &Provenance,
        to: &Provenance,
    ) -> Result<usize, CacheError> {
        let mut remapped = 0;

        for (storage_key, bytes) in snapshot {
            let mut decision = Self::decode(&bytes)?;
            if &decision.source != from {
                continue;
            }
            decision.source = to.clone();
            let swapped = self
                .db
                .compare_and_swap(&storage_key, Some(bytes), Some(Self::encode(&decision)?))
                .map_err(|e| {
                    io_error(
                        std::io::ErrorKind::Other,
                        format!("Failed to remap decision: {}", e),
                    )
                })?;
            match swapped {
                Ok(()) => remapped += 1,
                Err(_) => {
                    debug!(key = %decision.key, "Decision changed during remap, skipped");
                }
            }
        }

        Ok(remapped)
    }
}
