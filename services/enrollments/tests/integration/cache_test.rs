use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use campus_domain::enrollment::EnrollmentOrigin;
use campus_enrollments::cache::{CachePolicy, CacheState, UnifiedViewCache};
use campus_enrollments::domain::types::NormalizedEnrollment;
use campus_enrollments::error::EnrollmentsError;
use campus_enrollments::usecase::invalidate::InvalidateOnWriteUseCase;
use campus_enrollments::usecase::unify::UnifyEnrollmentsUseCase;

use crate::helpers::{ANA, InMemoryStore, user_id};

type StoreCache = UnifiedViewCache<UnifyEnrollmentsUseCase<InMemoryStore>>;

fn cache_over(store: &InMemoryStore) -> StoreCache {
    UnifiedViewCache::new(
        UnifyEnrollmentsUseCase::new(store.clone()),
        CachePolicy::default(),
    )
}

fn migrate_ana_hotmart(store: &InMemoryStore) {
    let product = store.data.lock().unwrap().product_for("hotmart").id;
    store.insert_normalized(NormalizedEnrollment {
        id: Uuid::new_v4(),
        user_id: user_id(ANA),
        product_id: product,
        platform: "hotmart".into(),
        platform_user_id: Some("HM-1001".into()),
        status: "ACTIVE".into(),
        progress: 35.0,
        engagement: 44.0,
        enrolled_at: None,
        tags: vec![],
    });
}

// ── Reads ────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn should_scan_once_within_ttl() {
    let store = InMemoryStore::population();
    let cache = cache_over(&store);

    for _ in 0..5 {
        cache.get().await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
    }

    assert_eq!(store.passes(), 1);
    assert_eq!(cache.stats().unwrap().total, 7);
}

#[tokio::test]
async fn should_share_one_pass_between_concurrent_readers() {
    let store = InMemoryStore::population();
    let cache = Arc::new(cache_over(&store));

    let readers: Vec<_> = (0..16)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get().await })
        })
        .collect();
    let mut snapshots = Vec::new();
    for reader in readers {
        snapshots.push(reader.await.unwrap().unwrap());
    }

    assert_eq!(store.passes(), 1);
    assert!(snapshots.iter().all(|s| Arc::ptr_eq(s, &snapshots[0])));
}

// ── Writes ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_reflect_committed_write_on_next_read() {
    let store = InMemoryStore::population();
    let cache = Arc::new(cache_over(&store));
    let before = cache.get().await.unwrap();
    assert_eq!(before.stats.from_normalized, 2);

    let on_write = InvalidateOnWriteUseCase {
        port: cache.clone(),
    };
    on_write
        .execute(async {
            migrate_ana_hotmart(&store);
            Ok::<_, EnrollmentsError>(())
        })
        .await
        .unwrap();
    let after = cache.get().await.unwrap();

    assert_eq!(store.passes(), 2);
    assert_eq!(after.stats.from_normalized, 3);
    let ana: Vec<_> = after
        .enrollments
        .iter()
        .filter(|e| e.user_id == user_id(ANA))
        .collect();
    assert_eq!(ana.len(), 1);
    assert_eq!(ana[0].origin, EnrollmentOrigin::Normalized);
    assert_eq!(ana[0].progress_percentage, 35.0);
}

#[tokio::test]
async fn should_keep_view_when_write_fails() {
    let store = InMemoryStore::population();
    let cache = Arc::new(cache_over(&store));
    cache.get().await.unwrap();

    let on_write = InvalidateOnWriteUseCase {
        port: cache.clone(),
    };
    let result = on_write
        .execute(async { Err::<(), _>(EnrollmentsError::Internal(anyhow::anyhow!("conflict"))) })
        .await;

    assert!(result.is_err());
    assert_eq!(cache.state(), CacheState::Warm);
    assert_eq!(cache.counters().invalidations, 0);
    assert_eq!(store.passes(), 1);
}

// ── Failures ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_propagate_cold_failure_and_recover() {
    let store = InMemoryStore::population();
    store.set_failing(true);
    let cache = cache_over(&store);

    let err = cache.get().await.unwrap_err();
    assert_eq!(err.kind(), "REFRESH_FAILED");

    store.set_failing(false);
    let snapshot = cache.get().await.unwrap();

    assert_eq!(snapshot.stats.total, 7);
    assert_eq!(cache.counters().failures, 1);
}

#[tokio::test(start_paused = true)]
async fn should_retain_last_good_snapshot_after_failed_invalidation_refresh() {
    let store = InMemoryStore::population();
    let cache = cache_over(&store);
    let good = cache.get().await.unwrap();

    store.set_failing(true);
    cache.invalidate();
    assert!(cache.wait_for_refresh().await.is_err());

    assert!(Arc::ptr_eq(&good, &cache.snapshot().unwrap()));
    assert_eq!(cache.state(), CacheState::Empty);
    let err = cache.get().await.unwrap_err();
    assert_eq!(err.kind(), "REFRESH_FAILED");
    assert_eq!(store.passes(), 3);

    store.set_failing(false);
    let recovered = cache.get().await.unwrap();
    assert!(!Arc::ptr_eq(&good, &recovered));
    assert_eq!(cache.state(), CacheState::Warm);
}
