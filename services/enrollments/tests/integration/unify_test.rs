use std::collections::BTreeSet;
use std::sync::atomic::Ordering;

use chrono::{TimeZone, Utc};

use campus_domain::enrollment::{EnrollmentOrigin, EnrollmentStatus};
use campus_domain::platform::Platform;
use campus_enrollments::domain::types::{CanonicalEnrollment, EnrollmentStats};
use campus_enrollments::error::EnrollmentsError;
use campus_enrollments::usecase::unify::UnifyEnrollmentsUseCase;

use crate::helpers::{ANA, BRUNO, CARLA, DIEGO, InMemoryStore, StoreData, user_id};

fn find<'a>(
    enrollments: &'a [CanonicalEnrollment],
    user: &str,
    platform: Platform,
) -> &'a CanonicalEnrollment {
    let id = user_id(user);
    enrollments
        .iter()
        .find(|e| e.user_id == id && e.platform == platform)
        .unwrap_or_else(|| panic!("no {platform} enrollment for {user}"))
}

// ── Whole population ─────────────────────────────────────────────────────────

#[tokio::test]
async fn should_unify_population_without_double_counting() {
    let usecase = UnifyEnrollmentsUseCase::new(InMemoryStore::population());

    let (enrollments, report) = usecase.execute_with_report().await.unwrap();

    assert_eq!(enrollments.len(), 7);
    assert_eq!(report.legacy_users, 5);
    assert_eq!(report.normalized_records, 3);
    assert_eq!(report.emitted_normalized, 2);
    assert_eq!(report.emitted_legacy, 5);
    assert_eq!(report.suppressed_users, 1);
    assert_eq!(report.skipped_records, 1);
    assert_eq!(report.malformed_users, 1);
    assert!(report.missing_products.is_empty());

    let keys: BTreeSet<_> = enrollments
        .iter()
        .map(|e| (e.user_id, e.platform))
        .collect();
    assert_eq!(keys.len(), enrollments.len());
}

#[tokio::test]
async fn should_report_migration_stats_for_population() {
    let usecase = UnifyEnrollmentsUseCase::new(InMemoryStore::population());

    let enrollments = usecase.execute().await.unwrap();
    let stats = EnrollmentStats::from_enrollments(&enrollments);

    assert_eq!(stats.total, 7);
    assert_eq!(stats.from_legacy, 5);
    assert_eq!(stats.from_normalized, 2);
    assert_eq!(stats.active, 5);
    assert_eq!(stats.users, 3);
    assert_eq!(stats.by_platform[&Platform::Hotmart], 3);
    assert_eq!(stats.by_platform[&Platform::CursEduca], 3);
    assert_eq!(stats.by_platform[&Platform::Discord], 1);
    assert!((stats.migrated_ratio - 2.0 / 7.0).abs() < 1e-9);
}

#[tokio::test]
async fn should_emit_normalized_records_first_then_legacy_in_user_order() {
    let usecase = UnifyEnrollmentsUseCase::new(InMemoryStore::population());

    let enrollments = usecase.execute().await.unwrap();

    let order: Vec<_> = enrollments
        .iter()
        .map(|e| (e.user_id, e.platform, e.origin))
        .collect();
    assert_eq!(
        order,
        vec![
            (user_id(BRUNO), Platform::Hotmart, EnrollmentOrigin::Normalized),
            (user_id(BRUNO), Platform::CursEduca, EnrollmentOrigin::Normalized),
            (user_id(ANA), Platform::Hotmart, EnrollmentOrigin::Legacy),
            (user_id(ANA), Platform::CursEduca, EnrollmentOrigin::Legacy),
            (user_id(ANA), Platform::Discord, EnrollmentOrigin::Legacy),
            (user_id(DIEGO), Platform::Hotmart, EnrollmentOrigin::Legacy),
            (user_id(DIEGO), Platform::CursEduca, EnrollmentOrigin::Legacy),
        ]
    );
}

// ── Legacy synthesis ─────────────────────────────────────────────────────────

#[tokio::test]
async fn should_derive_legacy_fields_per_platform() {
    let usecase = UnifyEnrollmentsUseCase::new(InMemoryStore::population());
    let enrollments = usecase.execute().await.unwrap();

    let hotmart = find(&enrollments, ANA, Platform::Hotmart);
    assert_eq!(hotmart.platform_external_id, "HM-1001");
    assert!((hotmart.progress_percentage - 30.0).abs() < 1e-9);
    assert_eq!(hotmart.engagement_score, 42.0);
    assert_eq!(
        hotmart.enrolled_at,
        Utc.with_ymd_and_hms(2023, 2, 10, 9, 30, 0).unwrap()
    );
    assert_eq!(
        hotmart.id.as_str(),
        format!("legacy:hotmart:{}", user_id(ANA))
    );
    assert_eq!(hotmart.user_display_name, "Ana Souza");
    assert_eq!(hotmart.product.code, "DAB");
    assert!(hotmart.tags.is_empty());

    let curseduca = find(&enrollments, ANA, Platform::CursEduca);
    assert_eq!(curseduca.platform_external_id, "55012");
    assert_eq!(curseduca.progress_percentage, 50.0);
    assert_eq!(curseduca.engagement_score, 17.5);
    assert_eq!(curseduca.status, EnrollmentStatus::Active);
    assert_eq!(
        curseduca.enrolled_at,
        Utc.with_ymd_and_hms(2023, 3, 1, 0, 0, 0).unwrap()
    );

    let discord = find(&enrollments, ANA, Platform::Discord);
    assert_eq!(discord.platform_external_id, "DC-ana");
    assert_eq!(discord.progress_percentage, 0.0);
    assert_eq!(discord.engagement_score, 100.0);
    assert_eq!(
        discord.enrolled_at,
        Utc.with_ymd_and_hms(2022, 11, 2, 10, 0, 0).unwrap()
    );
}

#[tokio::test]
async fn should_default_fields_for_malformed_sub_object_and_apply_inactivity_rule() {
    let usecase = UnifyEnrollmentsUseCase::new(InMemoryStore::population());
    let enrollments = usecase.execute().await.unwrap();

    let hotmart = find(&enrollments, DIEGO, Platform::Hotmart);
    assert_eq!(hotmart.platform_external_id, "HM-4004");
    assert_eq!(hotmart.progress_percentage, 0.0);
    assert_eq!(hotmart.engagement_score, 0.0);
    assert_eq!(hotmart.status, EnrollmentStatus::Active);

    let curseduca = find(&enrollments, DIEGO, Platform::CursEduca);
    assert_eq!(curseduca.status, EnrollmentStatus::Inactive);
    assert_eq!(curseduca.progress_percentage, 12.0);
}

#[tokio::test]
async fn should_emit_nothing_for_user_without_platform_data() {
    let usecase = UnifyEnrollmentsUseCase::new(InMemoryStore::population());
    let enrollments = usecase.execute().await.unwrap();

    assert!(enrollments.iter().all(|e| e.user_id != user_id(CARLA)));
}

#[tokio::test]
async fn should_skip_platform_missing_product_definition_for_every_user() {
    let mut data = StoreData::population();
    data.products.retain(|p| p.platform != "discord");
    let usecase = UnifyEnrollmentsUseCase::new(InMemoryStore::new(data));

    let (enrollments, report) = usecase.execute_with_report().await.unwrap();

    assert!(enrollments.iter().all(|e| e.platform != Platform::Discord));
    assert_eq!(report.missing_products, BTreeSet::from([Platform::Discord]));
    assert_eq!(report.emitted_legacy, 4);
}

// ── Normalized records ───────────────────────────────────────────────────────

#[tokio::test]
async fn should_suppress_legacy_synthesis_for_migrated_user() {
    let usecase = UnifyEnrollmentsUseCase::new(InMemoryStore::population());
    let enrollments = usecase.execute().await.unwrap();

    let bruno: Vec<_> = enrollments
        .iter()
        .filter(|e| e.user_id == user_id(BRUNO))
        .collect();
    assert_eq!(bruno.len(), 2);
    assert!(bruno.iter().all(|e| e.origin == EnrollmentOrigin::Normalized));
    assert!(bruno.iter().all(|e| e.platform != Platform::Discord));
}

#[tokio::test]
async fn should_carry_normalized_row_as_stored() {
    let usecase = UnifyEnrollmentsUseCase::new(InMemoryStore::population());
    let enrollments = usecase.execute().await.unwrap();

    let hotmart = find(&enrollments, BRUNO, Platform::Hotmart);
    assert_eq!(hotmart.id.as_str(), "5e1d0c9b-0000-4000-8000-00000000b001");
    assert_eq!(hotmart.progress_percentage, 85.0);
    assert_eq!(hotmart.tags, vec!["alumni".to_owned(), "cohort-3".to_owned()]);

    let curseduca = find(&enrollments, BRUNO, Platform::CursEduca);
    assert_eq!(
        curseduca.status,
        EnrollmentStatus::Other("PENDING_REFUND".into())
    );
    assert_eq!(curseduca.platform_external_id, "CE-2002");
    assert_eq!(
        curseduca.enrolled_at,
        Utc.with_ymd_and_hms(2022, 12, 15, 8, 0, 0).unwrap()
    );
}

// ── Reads ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_be_idempotent_over_unchanged_data() {
    let usecase = UnifyEnrollmentsUseCase::new(InMemoryStore::population());

    let first = usecase.execute().await.unwrap();
    let second = usecase.execute().await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn should_issue_one_bulk_read_per_collection() {
    let store = InMemoryStore::population();
    let usecase = UnifyEnrollmentsUseCase::new(store.clone());

    usecase.execute().await.unwrap();

    assert_eq!(store.user_reads.load(Ordering::SeqCst), 1);
    assert_eq!(store.normalized_reads.load(Ordering::SeqCst), 1);
    assert_eq!(store.product_reads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn should_fail_pass_when_store_is_unavailable() {
    let store = InMemoryStore::population();
    store.set_failing(true);
    let usecase = UnifyEnrollmentsUseCase::new(store);

    let result = usecase.execute().await;

    assert!(
        matches!(result, Err(EnrollmentsError::Internal(_))),
        "expected Internal, got {result:?}"
    );
}
