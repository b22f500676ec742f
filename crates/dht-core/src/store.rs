//! Record store (C5): in-memory map from key to the most recent valid
//! record, admitted by timestamp.

use std::collections::HashMap;

use crate::id::Id;
use crate::message::Record;
use crate::{DhtError, Result};

pub struct RecordStore {
    entries: HashMap<Id, Record>,
}

impl RecordStore {
    pub fn new() -> Self {
        RecordStore {
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, key: &Id) -> Option<&Record> {
        self.entries.get(key)
    }

    /// Admit `record` under `key`. Signature verification is C9's job and
    /// must already have happened before this call (§4.4). The only rule
    /// enforced here is timestamp monotonicity: a record with a timestamp
    /// no newer than what's stored is rejected as `Stale`.
    pub fn set(&mut self, key: Id, record: Record) -> Result<()> {
        if let Some(existing) = self.entries.get(&key) {
            if existing.timestamp > record.timestamp {
                return Err(DhtError::Stale {
                    current_timestamp: existing.timestamp,
                });
            }
        }
        self.entries.insert(key, record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Id> {
        self.entries.keys()
    }

    /// Remove entries whose `expires` has passed `now`.
    pub fn expire(&mut self, now: u64) {
        let before = self.entries.len();
        self.entries.retain(|_, r| r.expires > now);
        let removed = before - self.entries.len();
        if removed > 0 {
            tracing::debug!(removed, "expired stale records from store");
        }
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::new()
    }
}
