//! Versioned slot for broadcasting serialized actor weights to rollout workers.
//!
//! ```text
//! Trainer                                  Worker thread
//! ┌──────────────────┐                     ┌──────────────────┐
//! │ actor.valid()    │                     │ ActorPolicy      │
//! │       ↓          │                     │       ↑          │
//! │ BinBytesRecorder │                     │ recorder.load()  │
//! │       ↓          │                     │       ↑          │
//! │   Vec<u8>  ─────────PolicySlot───────→ │ (version, bytes) │
//! └──────────────────┘                     └──────────────────┘
//! ```
//!
//! Workers remember the last version they loaded and only deserialize when
//! the published version moves past it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Thread-safe slot holding the latest actor weights.
pub struct PolicySlot {
    bytes: Mutex<Option<Arc<Vec<u8>>>>,
    version: AtomicU64,
}

impl PolicySlot {
    pub fn new() -> Self {
        Self {
            bytes: Mutex::new(None),
            version: AtomicU64::new(0),
        }
    }

    /// Current version (0 = nothing published yet).
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Publish new weights and return the new version.
    pub fn publish(&self, bytes: Vec<u8>) -> u64 {
        let mut guard = self.bytes.lock();
        *guard = Some(Arc::new(bytes));
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Latest weights and their version.
    pub fn latest(&self) -> Option<(u64, Arc<Vec<u8>>)> {
        let guard = self.bytes.lock();
        guard
            .as_ref()
            .map(|bytes| (self.version.load(Ordering::Acquire), Arc::clone(bytes)))
    }

    /// Weights newer than `seen`, if any.
    pub fn newer_than(&self, seen: u64) -> Option<(u64, Arc<Vec<u8>>)> {
        self.latest().filter(|(version, _)| *version > seen)
    }
}

impl Default for PolicySlot {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedPolicySlot = Arc<PolicySlot>;

pub fn policy_slot() -> SharedPolicySlot {
    Arc::new(PolicySlot::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_bumps_version() {
        let slot = PolicySlot::new();
        assert_eq!(slot.version(), 0);
        assert!(slot.latest().is_none());

        assert_eq!(slot.publish(vec![1, 2, 3]), 1);
        let (version, bytes) = slot.latest().unwrap();
        assert_eq!(version, 1);
        assert_eq!(bytes.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_newer_than() {
        let slot = policy_slot();
        slot.publish(vec![1]);
        assert!(slot.newer_than(0).is_some());
        assert!(slot.newer_than(1).is_none());

        let other = Arc::clone(&slot);
        other.publish(vec![2]);
        let (version, bytes) = slot.newer_than(1).unwrap();
        assert_eq!(version, 2);
        assert_eq!(bytes.as_slice(), &[2]);
    }
}
