//! In-memory backend for tests and single-process deployments.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use vantage_core::{
    CacheEntry, CacheEvent, CompanyIdentifier, DataCategory, LogError, StorageError, Timestamp,
    UsageRecord,
};

use crate::cache::{CacheBackend, CacheEventLog, CacheKey, CacheStats, EntryUpdate};
use crate::ledger::UsageLedger;

/// Cache rows, usage records and cache events held in process memory.
///
/// Cloning shares the underlying maps.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<RwLock<BTreeMap<CacheKey, CacheEntry>>>,
    usage: Arc<RwLock<Vec<UsageRecord>>>,
    events: Arc<RwLock<Vec<CacheEvent>>>,
    stats: Arc<RwLock<CacheStats>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every usage record appended so far, oldest first.
    pub fn usage_records(&self) -> Vec<UsageRecord> {
        self.usage.read().map(|u| u.clone()).unwrap_or_default()
    }

    /// Every cache event appended so far, oldest first.
    pub fn cache_events(&self) -> Vec<CacheEvent> {
        self.events.read().map(|e| e.clone()).unwrap_or_default()
    }

    fn record_lookup(&self, found: bool) {
        if let Ok(mut stats) = self.stats.write() {
            if found {
                stats.hits += 1;
            } else {
                stats.misses += 1;
            }
        }
    }

    fn record_evictions(&self, count: u64) {
        if count == 0 {
            return;
        }
        if let Ok(mut stats) = self.stats.write() {
            stats.evictions += count;
        }
    }
}

fn payload_size(entry: &CacheEntry) -> u64 {
    serde_json::to_vec(&entry.payload)
        .map(|b| b.len() as u64)
        .unwrap_or(0)
}

#[async_trait]
impl CacheBackend for InMemoryStore {
    async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StorageError> {
        let entries = self.entries.read().map_err(|_| StorageError::LockPoisoned)?;
        let found = entries.get(key).cloned();
        drop(entries);
        self.record_lookup(found.is_some());
        Ok(found)
    }

    async fn store(&self, entry: &CacheEntry) -> Result<(), StorageError> {
        let key = CacheKey::new(entry.identifier.clone(), entry.category);
        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
        entries.insert(key, entry.clone());
        Ok(())
    }

    async fn modify(
        &self,
        key: &CacheKey,
        update: EntryUpdate,
    ) -> Result<Option<CacheEntry>, StorageError> {
        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
        let current = entries.get(key).cloned();
        match update(current) {
            Some(next) => {
                entries.insert(key.clone(), next.clone());
                Ok(Some(next))
            }
            None => {
                entries.remove(key);
                Ok(None)
            }
        }
    }

    async fn remove(&self, key: &CacheKey) -> Result<bool, StorageError> {
        let removed = {
            let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
            entries.remove(key).is_some()
        };
        self.record_evictions(u64::from(removed));
        Ok(removed)
    }

    async fn remove_company(
        &self,
        identifier: &CompanyIdentifier,
        categories: &[DataCategory],
    ) -> Result<u64, StorageError> {
        let removed = {
            let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
            let before = entries.len();
            entries.retain(|key, _| {
                let same_company = key.identifier() == identifier;
                let selected = categories.is_empty() || categories.contains(&key.category());
                !(same_company && selected)
            });
            (before - entries.len()) as u64
        };
        self.record_evictions(removed);
        Ok(removed)
    }

    async fn scan(&self) -> Result<Vec<CacheEntry>, StorageError> {
        let entries = self.entries.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(entries.values().cloned().collect())
    }

    async fn stats(&self) -> Result<CacheStats, StorageError> {
        let entries = self.entries.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut stats = self
            .stats
            .read()
            .map(|s| s.clone())
            .map_err(|_| StorageError::LockPoisoned)?;
        stats.entry_count = entries.len() as u64;
        stats.memory_bytes = entries.values().map(payload_size).sum();
        Ok(stats)
    }
}

#[async_trait]
impl CacheEventLog for InMemoryStore {
    async fn record(&self, event: &CacheEvent) -> Result<(), LogError> {
        let mut events = self.events.write().map_err(|_| LogError::EventAppend {
            reason: "event log lock poisoned".to_string(),
        })?;
        events.push(event.clone());
        Ok(())
    }

    async fn events_since(&self, since: Timestamp) -> Result<Vec<CacheEvent>, StorageError> {
        let events = self.events.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(events.iter().filter(|e| e.at >= since).cloned().collect())
    }

    async fn prune_events_before(&self, cutoff: Timestamp) -> Result<u64, StorageError> {
        let mut events = self.events.write().map_err(|_| StorageError::LockPoisoned)?;
        let before = events.len();
        events.retain(|e| e.at >= cutoff);
        Ok((before - events.len()) as u64)
    }
}

#[async_trait]
impl UsageLedger for InMemoryStore {
    async fn append(&self, record: &UsageRecord) -> Result<(), LogError> {
        let mut usage = self.usage.write().map_err(|_| LogError::UsageAppend {
            reason: "usage log lock poisoned".to_string(),
        })?;
        usage.push(record.clone());
        Ok(())
    }

    async fn records_since(
        &self,
        user_id: &str,
        since: Timestamp,
    ) -> Result<Vec<UsageRecord>, StorageError> {
        let usage = self.usage.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(usage
            .iter()
            .filter(|r| r.user_id == user_id && r.created_at >= since)
            .cloned()
            .collect())
    }

    async fn prune_records_before(&self, cutoff: Timestamp) -> Result<u64, StorageError> {
        let mut usage = self.usage.write().map_err(|_| StorageError::LockPoisoned)?;
        let before = usage.len();
        usage.retain(|r| r.created_at >= cutoff);
        Ok((before - usage.len()) as u64)
    }
}
