//! LMDB-backed store for cache rows, usage records and cache events.
//!
//! Uses the heed crate (Rust bindings for LMDB). One environment holds three
//! named databases:
//!
//! - `cache_entries`: [`CacheKey`] -> JSON [`CacheEntry`]
//! - `usage_records`: `user_id 0xFF millis uuid` -> JSON [`UsageRecord`]
//! - `cache_events`: `millis uuid` -> JSON [`CacheEvent`]
//!
//! `millis` is the big-endian Unix time in milliseconds, so both logs are
//! ordered by time and "since" reads are range scans.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. `modify` runs its read and write inside
//! one write transaction, and LMDB serializes writers, so read-modify-write
//! on a row is atomic across threads and across processes sharing the
//! environment.

use std::ops::Bound;
use std::path::Path;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use uuid::Uuid;
use vantage_core::{
    CacheEntry, CacheEvent, CompanyIdentifier, DataCategory, LogError, StorageError, Timestamp,
    UsageRecord,
};

use crate::cache::{CacheBackend, CacheEventLog, CacheKey, CacheStats, EntryUpdate};
use crate::ledger::UsageLedger;

const ENTRIES_DB: &str = "cache_entries";
const USAGE_DB: &str = "usage_records";
const EVENTS_DB: &str = "cache_events";
const USER_SEPARATOR: u8 = 0xFF;
const TIME_KEY_LEN: usize = 8;
const UUID_LEN: usize = 16;

type ByteRange<'a> = (Bound<&'a [u8]>, Bound<&'a [u8]>);

/// Big-endian milliseconds; times before the epoch clamp to zero.
fn time_key(at: Timestamp) -> [u8; TIME_KEY_LEN] {
    u64::try_from(at.timestamp_millis()).unwrap_or(0).to_be_bytes()
}

/// The time component of a usage key.
fn usage_key_time(key: &[u8]) -> Option<[u8; TIME_KEY_LEN]> {
    let start = key.len().checked_sub(TIME_KEY_LEN + UUID_LEN)?;
    key.get(start..start + TIME_KEY_LEN)?.try_into().ok()
}

/// Error type for LMDB store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open a database within the environment.
    #[error("Failed to open database {name}: {reason}")]
    DbOpen { name: &'static str, reason: String },

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbStoreError> for StorageError {
    fn from(e: LmdbStoreError) -> Self {
        match e {
            LmdbStoreError::EnvOpen(reason) | LmdbStoreError::DbOpen { reason, .. } => {
                StorageError::Unavailable { reason }
            }
            LmdbStoreError::Deserialization(reason) => StorageError::Corrupt {
                key: "lmdb".to_string(),
                reason,
            },
            other => StorageError::TransactionFailed {
                reason: other.to_string(),
            },
        }
    }
}

fn txn_err(e: heed::Error) -> LmdbStoreError {
    LmdbStoreError::Transaction(e.to_string())
}

fn open_database(
    env: &Env,
    wtxn: &mut heed::RwTxn<'_>,
    name: &'static str,
) -> Result<Database<Bytes, Bytes>, LmdbStoreError> {
    env.create_database(wtxn, Some(name))
        .map_err(|e| LmdbStoreError::DbOpen {
            name,
            reason: e.to_string(),
        })
}

/// LMDB-backed store.
///
/// # Example
///
/// ```ignore
/// let store = Arc::new(LmdbStore::open("/var/lib/vantage/cache", 1024)?);
/// let cache = CacheStore::new(store.clone(), TtlConfig::default())
///     .with_event_log(store.clone());
/// let ledger = BudgetLedger::new(store, &VantageConfig::default());
/// ```
pub struct LmdbStore {
    env: Env,
    entries: Database<Bytes, Bytes>,
    usage: Database<Bytes, Bytes>,
    events: Database<Bytes, Bytes>,
    stats: Arc<RwLock<CacheStats>>,
}

impl LmdbStore {
    /// Open (or create) the store.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the environment in megabytes
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(3)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;
        let entries = open_database(&env, &mut wtxn, ENTRIES_DB)?;
        let usage = open_database(&env, &mut wtxn, USAGE_DB)?;
        let events = open_database(&env, &mut wtxn, EVENTS_DB)?;
        wtxn.commit().map_err(txn_err)?;

        Ok(Self {
            env,
            entries,
            usage,
            events,
            stats: Arc::new(RwLock::new(CacheStats::default())),
        })
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

    fn decode_entry(bytes: &[u8]) -> Result<CacheEntry, LmdbStoreError> {
        serde_json::from_slice(bytes).map_err(|e| LmdbStoreError::Deserialization(e.to_string()))
    }

    fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, LmdbStoreError> {
        serde_json::to_vec(value).map_err(|e| LmdbStoreError::Serialization(e.to_string()))
    }

    /// Collect keys in `db` starting with `prefix`.
    fn collect_keys_with_prefix(
        &self,
        db: Database<Bytes, Bytes>,
        prefix: &[u8],
    ) -> Result<Vec<Vec<u8>>, LmdbStoreError> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let mut keys = Vec::new();
        for result in db.prefix_iter(&rtxn, prefix).map_err(txn_err)? {
            let (key, _) = result.map_err(txn_err)?;
            keys.push(key.to_vec());
        }
        Ok(keys)
    }

    fn usage_key(record: &UsageRecord) -> Vec<u8> {
        let mut key = Self::user_prefix(&record.user_id);
        key.extend_from_slice(&time_key(record.created_at));
        key.extend_from_slice(record.id.as_bytes());
        key
    }

    fn event_key(event: &CacheEvent) -> Vec<u8> {
        let mut key = Vec::with_capacity(TIME_KEY_LEN + UUID_LEN);
        key.extend_from_slice(&time_key(event.at));
        key.extend_from_slice(Uuid::now_v7().as_bytes());
        key
    }

    fn user_prefix(user_id: &str) -> Vec<u8> {
        let mut prefix = Vec::with_capacity(user_id.len() + 1 + TIME_KEY_LEN + UUID_LEN);
        prefix.extend_from_slice(user_id.as_bytes());
        prefix.push(USER_SEPARATOR);
        prefix
    }
}

#[async_trait]
impl CacheBackend for LmdbStore {
    async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StorageError> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let found = match self.entries.get(&rtxn, &key.encode()).map_err(txn_err)? {
            Some(bytes) => Some(Self::decode_entry(bytes)?),
            None => None,
        };
        self.record_lookup(found.is_some());
        Ok(found)
    }

    async fn store(&self, entry: &CacheEntry) -> Result<(), StorageError> {
        let key = CacheKey::new(entry.identifier.clone(), entry.category).encode();
        let bytes = Self::encode(entry)?;

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.entries.put(&mut wtxn, &key, &bytes).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    async fn modify(
        &self,
        key: &CacheKey,
        update: EntryUpdate,
    ) -> Result<Option<CacheEntry>, StorageError> {
        let encoded = key.encode();
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;

        let current = match self.entries.get(&wtxn, &encoded).map_err(txn_err)? {
            Some(bytes) => Some(Self::decode_entry(bytes)?),
            None => None,
        };
        let existed = current.is_some();

        let next = update(current);
        match &next {
            Some(entry) => {
                let bytes = Self::encode(entry)?;
                self.entries
                    .put(&mut wtxn, &encoded, &bytes)
                    .map_err(txn_err)?;
            }
            None if existed => {
                self.entries.delete(&mut wtxn, &encoded).map_err(txn_err)?;
            }
            None => {}
        }

        wtxn.commit().map_err(txn_err)?;
        Ok(next)
    }

    async fn remove(&self, key: &CacheKey) -> Result<bool, StorageError> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let deleted = self
            .entries
            .delete(&mut wtxn, &key.encode())
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;

        self.record_evictions(u64::from(deleted));
        Ok(deleted)
    }

    async fn remove_company(
        &self,
        identifier: &CompanyIdentifier,
        categories: &[DataCategory],
    ) -> Result<u64, StorageError> {
        let prefix = CacheKey::company_prefix(identifier);
        let keys = self.collect_keys_with_prefix(self.entries, &prefix)?;

        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let mut deleted = 0u64;
        for key in &keys {
            let selected = categories.is_empty()
                || CacheKey::decode(key).is_some_and(|k| categories.contains(&k.category()));
            if selected && self.entries.delete(&mut wtxn, key).map_err(txn_err)? {
                deleted += 1;
            }
        }
        wtxn.commit().map_err(txn_err)?;

        self.record_evictions(deleted);
        Ok(deleted)
    }

    async fn scan(&self) -> Result<Vec<CacheEntry>, StorageError> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let mut rows = Vec::new();
        for result in self.entries.iter(&rtxn).map_err(txn_err)? {
            let (key, bytes) = result.map_err(txn_err)?;
            match Self::decode_entry(bytes) {
                Ok(entry) => rows.push(entry),
                Err(e) => {
                    tracing::warn!(
                        key = %String::from_utf8_lossy(key),
                        error = %e,
                        "Skipping undecodable cache row"
                    );
                }
            }
        }
        Ok(rows)
    }

    async fn stats(&self) -> Result<CacheStats, StorageError> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let mut entry_count = 0u64;
        let mut memory_bytes = 0u64;
        for result in self.entries.iter(&rtxn).map_err(txn_err)? {
            let (_, bytes) = result.map_err(txn_err)?;
            entry_count += 1;
            memory_bytes += bytes.len() as u64;
        }

        let mut stats = self
            .stats
            .read()
            .map(|s| s.clone())
            .map_err(|_| StorageError::LockPoisoned)?;
        stats.entry_count = entry_count;
        stats.memory_bytes = memory_bytes;
        Ok(stats)
    }
}

#[async_trait]
impl CacheEventLog for LmdbStore {
    async fn record(&self, event: &CacheEvent) -> Result<(), LogError> {
        let append = || -> Result<(), LmdbStoreError> {
            let bytes = Self::encode(event)?;
            let mut wtxn = self.env.write_txn().map_err(txn_err)?;
            self.events
                .put(&mut wtxn, &Self::event_key(event), &bytes)
                .map_err(txn_err)?;
            wtxn.commit().map_err(txn_err)
        };
        append().map_err(|e| LogError::EventAppend {
            reason: e.to_string(),
        })
    }

    async fn events_since(&self, since: Timestamp) -> Result<Vec<CacheEvent>, StorageError> {
        let start = time_key(since);
        let range: ByteRange<'_> = (Bound::Included(&start[..]), Bound::Unbounded);
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let mut events = Vec::new();
        for result in self.events.range(&rtxn, &range).map_err(txn_err)? {
            let (_, bytes) = result.map_err(txn_err)?;
            let event: CacheEvent = serde_json::from_slice(bytes)
                .map_err(|e| LmdbStoreError::Deserialization(e.to_string()))?;
            if event.at >= since {
                events.push(event);
            }
        }
        Ok(events)
    }

    async fn prune_events_before(&self, cutoff: Timestamp) -> Result<u64, StorageError> {
        let end = time_key(cutoff);
        let range: ByteRange<'_> = (Bound::Unbounded, Bound::Excluded(&end[..]));
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let removed = self.events.delete_range(&mut wtxn, &range).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(removed as u64)
    }
}

#[async_trait]
impl UsageLedger for LmdbStore {
    async fn append(&self, record: &UsageRecord) -> Result<(), LogError> {
        let append = || -> Result<(), LmdbStoreError> {
            let bytes = Self::encode(record)?;
            let mut wtxn = self.env.write_txn().map_err(txn_err)?;
            self.usage
                .put(&mut wtxn, &Self::usage_key(record), &bytes)
                .map_err(txn_err)?;
            wtxn.commit().map_err(txn_err)
        };
        append().map_err(|e| LogError::UsageAppend {
            reason: e.to_string(),
        })
    }

    async fn records_since(
        &self,
        user_id: &str,
        since: Timestamp,
    ) -> Result<Vec<UsageRecord>, StorageError> {
        let prefix = Self::user_prefix(user_id);
        let mut start = prefix.clone();
        start.extend_from_slice(&time_key(since));
        let range: ByteRange<'_> = (Bound::Included(start.as_slice()), Bound::Unbounded);

        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let mut records = Vec::new();
        for result in self.usage.range(&rtxn, &range).map_err(txn_err)? {
            let (key, bytes) = result.map_err(txn_err)?;
            if !key.starts_with(&prefix) {
                break;
            }
            let record: UsageRecord = serde_json::from_slice(bytes)
                .map_err(|e| LmdbStoreError::Deserialization(e.to_string()))?;
            if record.created_at >= since {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn prune_records_before(&self, cutoff: Timestamp) -> Result<u64, StorageError> {
        let end = time_key(cutoff);
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        // Keys group by user first, so expired records are spread across the
        // whole database.
        let mut expired = Vec::new();
        for result in self.usage.iter(&wtxn).map_err(txn_err)? {
            let (key, _) = result.map_err(txn_err)?;
            if usage_key_time(key).is_some_and(|at| at < end) {
                expired.push(key.to_vec());
            }
        }
        for key in &expired {
            self.usage.delete(&mut wtxn, key).map_err(txn_err)?;
        }
        wtxn.commit().map_err(txn_err)?;
        Ok(expired.len() as u64)
    }
}
