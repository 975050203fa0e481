use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use campus_core::serde::to_rfc3339_ms;
use campus_domain::enrollment::{EnrollmentOrigin, EnrollmentStatus};
use campus_domain::id::{EnrollmentId, ProductId, UserId};
use campus_domain::platform::Platform;

/// Legacy (V1) user: one document per student with optional nested
/// per-platform sub-objects (`document["hotmart"]`, ...) and a few top-level
/// platform ids.
#[derive(Debug, Clone)]
pub struct LegacyUser {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub document: Value,
    pub created_at: DateTime<Utc>,
}

/// Normalized (V2) user-product row.
#[derive(Debug, Clone)]
pub struct NormalizedEnrollment {
    pub id: uuid::Uuid,
    pub user_id: UserId,
    pub product_id: ProductId,
    /// Stored platform name; parsed during unification.
    pub platform: String,
    pub platform_user_id: Option<String>,
    /// Stored status, propagated as-is.
    pub status: String,
    pub progress: f64,
    pub engagement: f64,
    pub enrolled_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
}

/// Product definition as stored.
#[derive(Debug, Clone)]
pub struct ProductDefinition {
    pub id: ProductId,
    pub name: String,
    pub code: String,
    pub platform: String,
}

/// Product a canonical enrollment points at.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRef {
    pub id: ProductId,
    pub name: String,
    pub code: String,
    pub platform: Platform,
}

impl ProductRef {
    pub fn new(product: &ProductDefinition, platform: Platform) -> Self {
        Self {
            id: product.id,
            name: product.name.clone(),
            code: product.code.clone(),
            platform,
        }
    }
}

/// One user's relationship to one product on one platform, unified from
/// either data shape. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalEnrollment {
    pub id: EnrollmentId,
    pub user_id: UserId,
    pub user_display_name: String,
    pub user_email: String,
    pub product: ProductRef,
    pub platform: Platform,
    pub platform_external_id: String,
    pub status: EnrollmentStatus,
    /// In `[0, 100]`.
    pub progress_percentage: f64,
    pub engagement_score: f64,
    /// Best-effort earliest known date; falls back to the user's creation date.
    #[serde(serialize_with = "to_rfc3339_ms")]
    pub enrolled_at: DateTime<Utc>,
    pub origin: EnrollmentOrigin,
    pub tags: Vec<String>,
}

/// Progress and engagement derived for one platform sub-object.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Metrics {
    pub progress: f64,
    pub engagement: f64,
}

/// Counters over one unified set. Dashboards use the origin split to report
/// migration progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentStats {
    pub total: usize,
    pub from_legacy: usize,
    pub from_normalized: usize,
    pub active: usize,
    /// Distinct users with at least one enrollment.
    pub users: usize,
    pub by_platform: BTreeMap<Platform, usize>,
    /// `from_normalized / total`, 0 for an empty set.
    pub migrated_ratio: f64,
}

impl EnrollmentStats {
    pub fn from_enrollments(enrollments: &[CanonicalEnrollment]) -> Self {
        let mut stats = Self {
            total: enrollments.len(),
            ..Self::default()
        };
        let mut users = HashSet::new();
        for enrollment in enrollments {
            match enrollment.origin {
                EnrollmentOrigin::Legacy => stats.from_legacy += 1,
                EnrollmentOrigin::Normalized => stats.from_normalized += 1,
            }
            if enrollment.status.is_active() {
                stats.active += 1;
            }
            *stats.by_platform.entry(enrollment.platform).or_default() += 1;
            users.insert(enrollment.user_id);
        }
        stats.users = users.len();
        if stats.total > 0 {
            stats.migrated_ratio = stats.from_normalized as f64 / stats.total as f64;
        }
        stats
    }
}
