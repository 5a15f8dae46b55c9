//! Fetch orchestrator behaviour against mock providers and an in-memory store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use vantage_core::{AdvisoryLockConfig, BudgetLimit, CompanyRef, Timestamp};
use vantage_service::{CallFailure, CallKind, CompanyDataService, FetchOptions};
use vantage_test_utils::assertions::{assert_confidence_valid, assert_no_data, assert_ok};
use vantage_test_utils::fixtures::{
    chainlink, fast_config, mock_registry, private_company, registry_with, seed_cache,
};
use vantage_test_utils::{
    DataCategory, DataSource, DataType, ExternalService, FaultyStore, InMemoryStore,
    MockBehavior, MockCryptoProvider, MockEquityProvider, MockResearchProvider, VantageConfig,
};
use vantage_storage::CacheBackend;

fn service_over(
    store: Arc<InMemoryStore>,
    registry: vantage_test_utils::ProviderRegistry,
    config: VantageConfig,
) -> CompanyDataService {
    CompanyDataService::from_store(store, registry, config)
}

#[tokio::test]
async fn test_chainlink_profile_and_price_end_to_end() {
    let store = Arc::new(InMemoryStore::new());
    let (registry, research, crypto, equity) = mock_registry();
    let service = service_over(store, registry, fast_config());
    let company = chainlink();

    let result = service
        .fetch_company_data_parallel(&company, &[DataType::Profile, DataType::Price], FetchOptions::new())
        .await;
    assert_ok(&result);
    let result = result.unwrap();

    assert_eq!(result.metadata.source, DataSource::ApiParallel);
    assert_eq!(result.metadata.category, DataCategory::Mixed);
    assert_eq!(result.metadata.api_calls_made, 2);
    assert!(result.metadata.failures.is_empty());
    assert_eq!(research.log().count_of("profile"), 1);
    assert_eq!(crypto.log().count_of("lookup_token"), 1);
    assert_eq!(equity.call_count(), 0);

    assert!(result.data.has(DataType::Profile));
    assert!(result.data.has(DataType::Price));
    assert!((result.metadata.confidence_score - 0.5).abs() < 1e-9);

    let row = service
        .cache()
        .peek(&company.identifier(), DataCategory::Mixed)
        .await
        .unwrap()
        .expect("mixed row written");
    assert_eq!(row.source, "tavily+coingecko");
    assert!(row.parallel_fetch_lock.is_none());
}

#[tokio::test]
async fn test_concurrent_fetches_share_one_fan_out() {
    let store = Arc::new(InMemoryStore::new());
    let research = MockResearchProvider::new().with_delay(Duration::from_millis(50));
    let (registry, research, _, _) =
        registry_with(research, MockCryptoProvider::new(), MockEquityProvider::new());
    let service = service_over(store, registry, fast_config());
    let company = private_company("Acme Robotics");
    let types = [DataType::Profile, DataType::Funding];

    let (first, second) = tokio::join!(
        service.fetch_company_data_parallel(&company, &types, FetchOptions::new()),
        service.fetch_company_data_parallel(&company, &types, FetchOptions::new()),
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(research.call_count(), 2);
    let sources = [first.metadata.source, second.metadata.source];
    assert!(sources.contains(&DataSource::ApiParallel));
    assert!(sources.contains(&DataSource::Cache));
    assert_eq!(first.data.profile, second.data.profile);
}

#[tokio::test]
async fn test_fresh_cache_is_served_without_calls() {
    let store = Arc::new(InMemoryStore::new());
    let company = private_company("Acme Robotics");
    seed_cache(
        store.as_ref(),
        &company,
        DataCategory::Static,
        &[DataType::Profile],
        chrono::Duration::days(1),
    )
    .await;
    let (registry, research, _, _) = mock_registry();
    let service = service_over(store, registry, fast_config());

    let result = service
        .fetch_company_data_parallel(&company, &[DataType::Profile], FetchOptions::new())
        .await
        .unwrap();
    assert_eq!(result.metadata.source, DataSource::Cache);
    assert!(result.metadata.cached);
    assert_eq!(result.metadata.cost, 0.0);
    assert_eq!(research.call_count(), 0);

    let forced = service
        .fetch_company_data_parallel(
            &company,
            &[DataType::Profile],
            FetchOptions::new().force_refresh(true),
        )
        .await
        .unwrap();
    assert_eq!(forced.metadata.source, DataSource::ApiParallel);
    assert_eq!(research.call_count(), 1);
}

#[tokio::test]
async fn test_expired_section_in_refreshed_row_is_refetched() {
    let store = Arc::new(InMemoryStore::new());
    let company = private_company("Acme Robotics");
    seed_cache(
        store.as_ref(),
        &company,
        DataCategory::Static,
        &[DataType::Funding],
        chrono::Duration::days(45),
    )
    .await;
    let (registry, research, _, _) = mock_registry();
    let service = service_over(store.clone(), registry, fast_config());

    let profile = service
        .fetch_company_data_parallel(&company, &[DataType::Profile], FetchOptions::new())
        .await
        .unwrap();
    assert_eq!(profile.metadata.source, DataSource::ApiParallel);

    let funding = service
        .fetch_company_data_parallel(&company, &[DataType::Funding], FetchOptions::new())
        .await
        .unwrap();
    assert_eq!(funding.metadata.source, DataSource::ApiParallel);
    assert_eq!(research.call_count(), 2);

    let both = service
        .fetch_company_data_parallel(
            &company,
            &[DataType::Profile, DataType::Funding],
            FetchOptions::new(),
        )
        .await
        .unwrap();
    assert_eq!(both.metadata.source, DataSource::Cache);
    assert_eq!(research.call_count(), 2);
}

#[tokio::test]
async fn test_fresh_row_missing_a_section_is_refetched() {
    let store = Arc::new(InMemoryStore::new());
    let company = private_company("Acme Robotics");
    seed_cache(
        store.as_ref(),
        &company,
        DataCategory::Static,
        &[DataType::Profile],
        chrono::Duration::hours(1),
    )
    .await;
    let (registry, research, _, _) = mock_registry();
    let service = service_over(store, registry, fast_config());

    let result = service
        .fetch_company_data_parallel(
            &company,
            &[DataType::Profile, DataType::Team],
            FetchOptions::new(),
        )
        .await
        .unwrap();
    assert_eq!(result.metadata.source, DataSource::ApiParallel);
    assert_eq!(research.call_count(), 2);
}

#[tokio::test]
async fn test_partial_failure_keeps_successful_sections() {
    let crypto = MockCryptoProvider::new().with_behavior(MockBehavior::Hang);
    let (registry, _, _, _) =
        registry_with(MockResearchProvider::new(), crypto, MockEquityProvider::new());
    let service = service_over(Arc::new(InMemoryStore::new()), registry, fast_config());

    let result = service
        .fetch_company_data_parallel(&chainlink(), &[DataType::Profile, DataType::Price], FetchOptions::new())
        .await
        .unwrap();

    assert_eq!(result.metadata.source, DataSource::ApiParallel);
    assert!(result.data.has(DataType::Profile));
    assert!(!result.data.has(DataType::Price));
    assert!((result.metadata.confidence_score - 0.25).abs() < 1e-9);
    assert_eq!(result.metadata.failures.len(), 1);
    assert!(matches!(
        result.metadata.failures[0],
        CallFailure::Timeout {
            call: CallKind::CryptoToken,
            service: ExternalService::CoinGecko,
            ..
        }
    ));
}

#[tokio::test]
async fn test_merge_is_stable_across_completion_order() {
    let types = [DataType::Profile, DataType::Funding, DataType::Price];

    // Research answers last in the first run and first in the second.
    let slow_research = MockResearchProvider::new().with_delay(Duration::from_millis(40));
    let (registry_a, _, _, _) =
        registry_with(slow_research, MockCryptoProvider::new(), MockEquityProvider::new());
    let slow_crypto = MockCryptoProvider::new().with_delay(Duration::from_millis(40));
    let (registry_b, _, _, _) =
        registry_with(MockResearchProvider::new(), slow_crypto, MockEquityProvider::new());

    let a = service_over(Arc::new(InMemoryStore::new()), registry_a, fast_config())
        .fetch_company_data_parallel(&chainlink(), &types, FetchOptions::new())
        .await
        .unwrap();
    let b = service_over(Arc::new(InMemoryStore::new()), registry_b, fast_config())
        .fetch_company_data_parallel(&chainlink(), &types, FetchOptions::new())
        .await
        .unwrap();

    assert_eq!(a.data.profile, b.data.profile);
    assert_eq!(a.data.funding, b.data.funding);
    assert_eq!(a.data.price, b.data.price);
    assert_eq!(a.data.sources, b.data.sources);
    assert_eq!(a.data.confidence_score, b.data.confidence_score);
    assert!((a.data.confidence_score - 0.75).abs() < 1e-9);
}

#[tokio::test]
async fn test_one_failure_pattern_gives_one_payload() {
    let types = [DataType::Profile, DataType::Price];
    let run = || async {
        let research = MockResearchProvider::new().with_behavior(DataType::Profile, MockBehavior::Fail);
        let (registry, _, _, _) =
            registry_with(research, MockCryptoProvider::new(), MockEquityProvider::new());
        service_over(Arc::new(InMemoryStore::new()), registry, fast_config())
            .fetch_company_data_parallel(&chainlink(), &types, FetchOptions::new())
            .await
            .unwrap()
    };

    let first = run().await;
    let second = run().await;
    assert!(first.data.profile.is_none());
    assert_eq!(first.data.price, second.data.price);
    assert!((first.metadata.confidence_score - 0.25).abs() < 1e-9);
    assert_eq!(first.metadata.confidence_score, second.metadata.confidence_score);
}

#[tokio::test]
async fn test_public_company_merges_quote_and_fundamentals() {
    let (registry, _, crypto, equity) = mock_registry();
    let service = service_over(Arc::new(InMemoryStore::new()), registry, fast_config());
    let apple = vantage_test_utils::fixtures::apple();

    let result = service
        .fetch_company_data_parallel(&apple, &[DataType::Price, DataType::Metrics], FetchOptions::new())
        .await
        .unwrap();

    assert_eq!(crypto.call_count(), 0);
    assert_eq!(equity.log().count_of("get_price"), 1);
    assert_eq!(equity.log().count_of("get_fundamentals"), 1);
    let price = result.data.price.expect("price section");
    assert_eq!(price.current_price, Some(227.5));
    assert_eq!(price.pe_ratio, Some(34.1));
    assert_eq!(result.metadata.category, DataCategory::Live);
}

#[tokio::test]
async fn test_total_failure_without_cache_is_no_data() {
    let (registry, _, _, _) = registry_with(
        MockResearchProvider::failing(),
        MockCryptoProvider::new().with_behavior(MockBehavior::Fail),
        MockEquityProvider::new(),
    );
    let store = Arc::new(InMemoryStore::new());
    let service = service_over(store, registry, fast_config());
    let company = chainlink();

    let result = service
        .fetch_company_data_parallel(&company, &[DataType::Profile, DataType::Price], FetchOptions::new())
        .await;
    assert_no_data(&result);

    let row = service
        .cache()
        .peek(&company.identifier(), DataCategory::Mixed)
        .await
        .unwrap();
    assert!(row.is_none());
}

#[tokio::test]
async fn test_total_failure_serves_stale_fallback() {
    let store = Arc::new(InMemoryStore::new());
    let company = private_company("Acme Robotics");
    seed_cache(
        store.as_ref(),
        &company,
        DataCategory::Static,
        &[DataType::Profile],
        chrono::Duration::days(40),
    )
    .await;
    let (registry, research, _, _) = registry_with(
        MockResearchProvider::failing(),
        MockCryptoProvider::new(),
        MockEquityProvider::new(),
    );
    let service = service_over(store, registry, fast_config());

    let result = service
        .fetch_company_data_parallel(&company, &[DataType::Profile], FetchOptions::new())
        .await
        .unwrap();
    assert_eq!(research.call_count(), 1);
    assert_eq!(result.metadata.source, DataSource::CacheFallback);
    assert_eq!(result.metadata.failures.len(), 1);
    assert!((result.metadata.confidence_score - 0.3).abs() < 1e-9);
    assert_confidence_valid(result.metadata.confidence_score);
}

#[tokio::test]
async fn test_no_configured_provider_is_no_data() {
    let service = service_over(
        Arc::new(InMemoryStore::new()),
        vantage_test_utils::ProviderRegistry::new(),
        fast_config(),
    );
    let result = service
        .fetch_company_data_parallel(&private_company("Acme"), &[DataType::Team], FetchOptions::new())
        .await;
    assert_no_data(&result);
}

#[tokio::test]
async fn test_over_budget_service_is_skipped() {
    let config = fast_config().with_budget(ExternalService::Tavily, BudgetLimit::new(0, 5.0, 0.01));
    let (registry, research, crypto, _) = mock_registry();
    let service = service_over(Arc::new(InMemoryStore::new()), registry, config);

    let result = service
        .fetch_company_data_parallel(&chainlink(), &[DataType::Profile, DataType::Price], FetchOptions::new())
        .await
        .unwrap();

    assert_eq!(research.call_count(), 0);
    assert_eq!(crypto.call_count(), 1);
    assert_eq!(result.metadata.api_calls_made, 1);
    assert_eq!(
        result.metadata.failures,
        vec![CallFailure::OverBudget {
            call: CallKind::ResearchProfile,
            service: ExternalService::Tavily,
        }]
    );
}

#[tokio::test]
async fn test_attempted_calls_are_logged() {
    let store = Arc::new(InMemoryStore::new());
    let (registry, _, _, _) = mock_registry();
    let service = service_over(store, registry, fast_config());

    service
        .fetch_company_data_parallel(
            &chainlink(),
            &[DataType::Profile, DataType::Price],
            FetchOptions::new().for_user("analyst-7"),
        )
        .await
        .unwrap();

    let summary = service.budget().usage_summary(Some("analyst-7"), 1).await.unwrap();
    assert_eq!(summary.total_calls, 2);
    assert!((summary.total_cost - 0.012).abs() < 1e-9);
}

#[tokio::test]
async fn test_background_refresh_serves_stale_then_refreshes() {
    let store = Arc::new(InMemoryStore::new());
    let company = private_company("Acme Robotics");
    seed_cache(
        store.as_ref(),
        &company,
        DataCategory::Static,
        &[DataType::Profile],
        chrono::Duration::days(31),
    )
    .await;
    let (registry, research, _, _) = mock_registry();
    let service = service_over(store, registry, fast_config());

    let result = service
        .fetch_company_data_parallel(
            &company,
            &[DataType::Profile],
            FetchOptions::new().in_background(true),
        )
        .await
        .unwrap();
    assert_eq!(result.metadata.source, DataSource::CacheExpired);
    assert!(result.metadata.background_refresh);
    assert!((result.metadata.confidence_score - 0.4).abs() < 1e-9);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(research.call_count(), 1);

    let after = service
        .fetch_company_data_parallel(&company, &[DataType::Profile], FetchOptions::new())
        .await
        .unwrap();
    assert_eq!(after.metadata.source, DataSource::Cache);
    assert_eq!(research.call_count(), 1);
}

#[tokio::test]
async fn test_background_without_row_fetches_in_foreground() {
    let (registry, research, _, _) = mock_registry();
    let service = service_over(Arc::new(InMemoryStore::new()), registry, fast_config());

    let result = service
        .fetch_company_data_parallel(
            &private_company("Acme Robotics"),
            &[DataType::Profile],
            FetchOptions::new().in_background(true),
        )
        .await
        .unwrap();
    assert_eq!(result.metadata.source, DataSource::ApiParallel);
    assert!(!result.metadata.background_refresh);
    assert_eq!(research.call_count(), 1);
}

#[tokio::test]
async fn test_broken_storage_degrades_to_providers() {
    let store = Arc::new(FaultyStore::broken());
    let (registry, research, _, _) = mock_registry();
    let service = CompanyDataService::from_store(store, registry, fast_config());

    let result = service
        .fetch_company_data_parallel(&private_company("Acme Robotics"), &[DataType::Profile], FetchOptions::new())
        .await
        .unwrap();
    assert_eq!(result.metadata.source, DataSource::ApiParallel);
    assert!(result.data.has(DataType::Profile));
    assert_eq!(research.call_count(), 1);
}

#[tokio::test]
async fn test_rejects_empty_requests() {
    let (registry, _, _, _) = mock_registry();
    let service = service_over(Arc::new(InMemoryStore::new()), registry, fast_config());

    let no_types = service
        .fetch_company_data_parallel(&private_company("Acme"), &[], FetchOptions::new())
        .await;
    assert!(matches!(no_types, Err(vantage_test_utils::VantageError::Validation(_))));

    let blank = service
        .fetch_company_data_parallel(&CompanyRef::new("  ...  "), &[DataType::Profile], FetchOptions::new())
        .await;
    assert!(matches!(blank, Err(vantage_test_utils::VantageError::Validation(_))));
}

// ============================================================================
// ADVISORY LOCK
// ============================================================================

/// Seed an expired profile row carrying another writer's fetch marker.
async fn seed_marked_row(
    store: &InMemoryStore,
    company: &CompanyRef,
    marked_ago: chrono::Duration,
) -> Timestamp {
    let mut entry = seed_cache(
        store,
        company,
        DataCategory::Static,
        &[DataType::Profile],
        chrono::Duration::days(40),
    )
    .await;
    let marked_at = Utc::now() - marked_ago;
    entry.parallel_fetch_lock = Some(marked_at);
    store.store(&entry).await.unwrap();
    marked_at
}

#[tokio::test]
async fn test_marker_held_elsewhere_waits_then_fetches() {
    let store = Arc::new(InMemoryStore::new());
    let company = private_company("Acme Robotics");
    let marked_at = seed_marked_row(&store, &company, chrono::Duration::minutes(1)).await;
    let (registry, research, _, _) = mock_registry();
    let config = fast_config();
    let wait = config.advisory_lock.wait;
    let service = service_over(store, registry, config);

    let started = std::time::Instant::now();
    let result = service
        .fetch_company_data_parallel(&company, &[DataType::Profile], FetchOptions::new())
        .await
        .unwrap();
    assert!(started.elapsed() >= wait);
    assert_eq!(result.metadata.source, DataSource::ApiParallel);
    assert_eq!(research.call_count(), 1);

    // The other writer's marker is theirs to clear.
    let row = service
        .cache()
        .peek(&company.identifier(), DataCategory::Static)
        .await
        .unwrap()
        .expect("row kept");
    assert_eq!(row.parallel_fetch_lock, Some(marked_at));
    assert!(row.is_fresh(service.cache().ttl(), Utc::now()));
}

#[tokio::test]
async fn test_marker_held_elsewhere_rechecks_cache_after_wait() {
    let store = Arc::new(InMemoryStore::new());
    let company = private_company("Acme Robotics");
    seed_marked_row(&store, &company, chrono::Duration::seconds(10)).await;
    let (registry, research, _, _) = mock_registry();
    let config = fast_config().with_advisory_lock(AdvisoryLockConfig {
        window: Duration::from_secs(300),
        wait: Duration::from_millis(150),
    });
    let service = service_over(store.clone(), registry, config);

    // The other process lands its fetch while this one waits.
    let writer = {
        let store = store.clone();
        let company = company.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            seed_cache(
                store.as_ref(),
                &company,
                DataCategory::Static,
                &[DataType::Profile],
                chrono::Duration::zero(),
            )
            .await;
        })
    };

    let result = service
        .fetch_company_data_parallel(&company, &[DataType::Profile], FetchOptions::new())
        .await
        .unwrap();
    writer.await.unwrap();

    assert_eq!(result.metadata.source, DataSource::Cache);
    assert_eq!(result.metadata.api_calls_made, 0);
    assert_eq!(research.call_count(), 0);
}

#[tokio::test]
async fn test_expired_marker_is_taken_over() {
    let store = Arc::new(InMemoryStore::new());
    let company = private_company("Acme Robotics");
    seed_marked_row(&store, &company, chrono::Duration::minutes(6)).await;
    let (registry, research, _, _) = mock_registry();
    let service = service_over(store, registry, fast_config());

    service
        .fetch_company_data_parallel(&company, &[DataType::Profile], FetchOptions::new())
        .await
        .unwrap();
    assert_eq!(research.call_count(), 1);

    let row = service
        .cache()
        .peek(&company.identifier(), DataCategory::Static)
        .await
        .unwrap()
        .expect("row kept");
    assert!(row.parallel_fetch_lock.is_none());
}

#[tokio::test]
async fn test_cancelled_fetch_clears_its_marker() {
    let store = Arc::new(InMemoryStore::new());
    let company = private_company("Acme Robotics");
    seed_cache(
        store.as_ref(),
        &company,
        DataCategory::Static,
        &[DataType::Profile],
        chrono::Duration::days(40),
    )
    .await;
    let research = MockResearchProvider::new().with_delay(Duration::from_millis(150));
    let (registry, _, _, _) =
        registry_with(research, MockCryptoProvider::new(), MockEquityProvider::new());
    let service = service_over(store, registry, fast_config());

    let fetch = {
        let service = service.clone();
        let company = company.clone();
        tokio::spawn(async move {
            service
                .fetch_company_data_parallel(&company, &[DataType::Profile], FetchOptions::new())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(40)).await;

    let identifier = company.identifier();
    let during = service
        .cache()
        .peek(&identifier, DataCategory::Static)
        .await
        .unwrap()
        .expect("row kept");
    assert!(during.parallel_fetch_lock.is_some());

    fetch.abort();
    assert!(fetch.await.unwrap_err().is_cancelled());
    tokio::time::sleep(Duration::from_millis(30)).await;

    let after = service
        .cache()
        .peek(&identifier, DataCategory::Static)
        .await
        .unwrap()
        .expect("row kept");
    assert!(after.parallel_fetch_lock.is_none());
}
