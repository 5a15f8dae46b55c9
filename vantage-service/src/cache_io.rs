//! Best-effort cache access shared by both services.
//!
//! Storage faults never fail a request: a failed read is a miss and a failed
//! write is logged and dropped.

use std::time::Duration;

use chrono::Utc;
use vantage_core::{
    to_chrono, CacheEntry, CompanyData, CompanyIdentifier, CompanyRef, DataCategory, DataType,
    Timestamp,
};
use vantage_storage::CacheStore;

/// A decoded cache row.
#[derive(Debug, Clone)]
pub(crate) struct CachedCompany {
    pub entry: CacheEntry,
    pub data: CompanyData,
    pub is_stale: bool,
    pub expires_in: Duration,
    /// Sections fetched before this instant are past the category TTL.
    pub fresh_since: Timestamp,
}

impl CachedCompany {
    /// Whether `data_type` can be served as fresh: the row and the section
    /// itself are both within the TTL.
    pub fn has_fresh(&self, data_type: DataType) -> bool {
        !self.is_stale && self.data.has_since(data_type, self.fresh_since)
    }

    /// Time until `data_type` expires, bounded by the row's own expiry.
    pub fn expires_in_for(&self, data_type: DataType) -> Duration {
        let section = self
            .data
            .section_fetched_at(data_type)
            .and_then(|at| (at - self.fresh_since).to_std().ok())
            .unwrap_or(Duration::ZERO);
        section.min(self.expires_in)
    }
}

fn fresh_cutoff(cache: &CacheStore, category: DataCategory) -> Timestamp {
    Utc::now() - to_chrono(cache.ttl_for(category))
}

/// Read and decode a row, treating storage and decode failures as a miss.
pub(crate) async fn read_cached(
    cache: &CacheStore,
    identifier: &CompanyIdentifier,
    category: DataCategory,
    include_expired: bool,
) -> Option<CachedCompany> {
    let read = match cache.get(identifier, category, include_expired).await {
        Ok(read) => read?,
        Err(e) => {
            tracing::warn!(
                identifier = %identifier,
                category = %category,
                error = %e,
                "Cache unavailable, treating as miss"
            );
            return None;
        }
    };

    let is_stale = read.is_stale();
    let expires_in = read.expires_in();
    let entry = read.into_value();
    match CompanyData::from_payload(&entry.payload) {
        Ok(data) => Some(CachedCompany {
            entry,
            data,
            is_stale,
            expires_in,
            fresh_since: fresh_cutoff(cache, category),
        }),
        Err(e) => {
            tracing::warn!(
                identifier = %identifier,
                category = %category,
                error = %e,
                "Undecodable cache payload, treating as miss"
            );
            None
        }
    }
}

/// Merge `fresh` into whatever the row already holds and upsert it.
///
/// Existing sections past the category TTL are dropped first; the upsert
/// resets the row's freshness clock and must not carry them forward.
pub(crate) async fn write_through(
    cache: &CacheStore,
    company: &CompanyRef,
    identifier: &CompanyIdentifier,
    category: DataCategory,
    fresh: CompanyData,
    source: &str,
) {
    let existing = match cache.peek(identifier, category).await {
        Ok(row) => row.and_then(|e| CompanyData::from_payload(&e.payload).ok()),
        Err(e) => {
            tracing::debug!(identifier = %identifier, error = %e, "Could not load row to merge into");
            None
        }
    };

    let merged = match existing {
        Some(mut current) => {
            let dropped = current.retain_sections_since(fresh_cutoff(cache, category));
            if dropped > 0 {
                tracing::debug!(
                    identifier = %identifier,
                    category = %category,
                    dropped,
                    "Dropped expired sections before merge"
                );
            }
            current.absorb(fresh);
            current
        }
        None => fresh,
    };

    if let Err(e) = cache
        .put(
            identifier,
            category,
            &company.name,
            merged.to_payload(),
            source,
            merged.confidence_score,
        )
        .await
    {
        tracing::warn!(
            identifier = %identifier,
            category = %category,
            error = %e,
            "Failed to cache fetched data"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vantage_core::{CompanyType, FundingData, ProfileData, TeamData, TtlConfig};
    use vantage_storage::InMemoryStore;

    fn cache() -> CacheStore {
        CacheStore::new(Arc::new(InMemoryStore::new()), TtlConfig::default())
    }

    #[tokio::test]
    async fn test_write_through_accumulates_sections() {
        let cache = cache();
        let company = CompanyRef::new("Acme").with_website("acme.io");
        let id = company.identifier();

        let mut first = CompanyData::new(id.clone(), "Acme", CompanyType::Private);
        first.profile = Some(ProfileData {
            founded_year: Some(2019),
            ..Default::default()
        });
        first.mark_fetched(DataType::Profile, Utc::now());
        write_through(&cache, &company, &id, DataCategory::Static, first, "tavily").await;

        let mut second = CompanyData::new(id.clone(), "Acme", CompanyType::Private);
        second.team = Some(TeamData::default());
        second.mark_fetched(DataType::Team, Utc::now());
        write_through(&cache, &company, &id, DataCategory::Static, second, "tavily").await;

        let cached = read_cached(&cache, &id, DataCategory::Static, false)
            .await
            .unwrap();
        assert!(!cached.is_stale);
        assert!(cached.data.has(DataType::Profile));
        assert!(cached.data.has(DataType::Team));
        assert_eq!(cached.data.section_count(), 2);
        assert_eq!(cached.entry.source, "tavily");
        assert!(cached.has_fresh(DataType::Profile));
        assert!(cached.has_fresh(DataType::Team));
    }

    #[tokio::test]
    async fn test_write_through_drops_expired_sections() {
        let cache = cache();
        let company = CompanyRef::new("Acme").with_website("acme.io");
        let id = company.identifier();

        let mut old = CompanyData::new(id.clone(), "Acme", CompanyType::Private);
        old.funding = Some(FundingData::default());
        old.mark_fetched(DataType::Funding, Utc::now() - chrono::Duration::days(45));
        cache
            .put(&id, DataCategory::Static, "Acme", old.to_payload(), "tavily", 0.5)
            .await
            .unwrap();

        let mut fresh = CompanyData::new(id.clone(), "Acme", CompanyType::Private);
        fresh.profile = Some(ProfileData::default());
        fresh.mark_fetched(DataType::Profile, Utc::now());
        write_through(&cache, &company, &id, DataCategory::Static, fresh, "tavily").await;

        let cached = read_cached(&cache, &id, DataCategory::Static, false)
            .await
            .unwrap();
        assert!(cached.has_fresh(DataType::Profile));
        assert!(!cached.data.has(DataType::Funding));
        assert!(!cached.has_fresh(DataType::Funding));
    }

    #[tokio::test]
    async fn test_old_section_in_fresh_row_is_not_fresh() {
        let cache = cache();
        let id = CompanyIdentifier::from_assigned("acme.io");

        // Row written just now, but the section inside it is 45 days old.
        let mut data = CompanyData::new(id.clone(), "Acme", CompanyType::Private);
        data.funding = Some(FundingData::default());
        data.mark_fetched(DataType::Funding, Utc::now() - chrono::Duration::days(45));
        cache
            .put(&id, DataCategory::Static, "Acme", data.to_payload(), "tavily", 0.5)
            .await
            .unwrap();

        let cached = read_cached(&cache, &id, DataCategory::Static, false)
            .await
            .unwrap();
        assert!(!cached.is_stale);
        assert!(cached.data.has(DataType::Funding));
        assert!(!cached.has_fresh(DataType::Funding));
        assert_eq!(cached.expires_in_for(DataType::Funding), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_a_miss() {
        let cache = cache();
        let id = CompanyIdentifier::from_assigned("acme.io");
        cache
            .put(&id, DataCategory::Live, "Acme", serde_json::json!([1, 2]), "openbb", 0.5)
            .await
            .unwrap();
        assert!(read_cached(&cache, &id, DataCategory::Live, true).await.is_none());
    }
}
