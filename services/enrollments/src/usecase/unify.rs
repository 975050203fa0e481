use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use campus_domain::enrollment::{EnrollmentOrigin, EnrollmentStatus};
use campus_domain::id::{EnrollmentId, ProductId, UserId};
use campus_domain::platform::Platform;

use crate::domain::platform::{PLATFORM_MAPPINGS, PlatformMapping, bounded};
use crate::domain::repository::{EnrollmentSource, EnrollmentStore};
use crate::domain::types::{
    CanonicalEnrollment, LegacyUser, NormalizedEnrollment, ProductDefinition, ProductRef,
};
use crate::error::EnrollmentsError;

/// Why a single record was left out of a unification pass. Never surfaced to
/// callers; the record is skipped and logged.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("unknown platform {0:?}")]
    UnknownPlatform(String),
    #[error("user {0} not found")]
    UnknownUser(UserId),
    #[error("product {0} not found")]
    UnknownProduct(ProductId),
    #[error("no external id for platform {0}")]
    MissingExternalId(Platform),
    #[error("user document is a {0}, expected an object")]
    MalformedDocument(&'static str),
}

/// Counters for one unification pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifyReport {
    pub legacy_users: usize,
    pub normalized_records: usize,
    pub emitted_normalized: usize,
    pub emitted_legacy: usize,
    /// Legacy users skipped because they already have normalized records.
    pub suppressed_users: usize,
    pub skipped_records: usize,
    pub malformed_users: usize,
    /// Platforms whose legacy synthesis was skipped for lack of a product definition.
    pub missing_products: BTreeSet<Platform>,
}

// ── UnifyEnrollments ─────────────────────────────────────────────────────────

pub struct UnifyEnrollmentsUseCase<S: EnrollmentStore> {
    pub store: S,
    pub mappings: &'static [&'static dyn PlatformMapping],
}

impl<S: EnrollmentStore> UnifyEnrollmentsUseCase<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            mappings: PLATFORM_MAPPINGS,
        }
    }

    pub async fn execute(&self) -> Result<Vec<CanonicalEnrollment>, EnrollmentsError> {
        self.execute_with_report()
            .await
            .map(|(enrollments, _)| enrollments)
    }

    /// Two bulk reads plus the product list, then a pure in-memory merge.
    pub async fn execute_with_report(
        &self,
    ) -> Result<(Vec<CanonicalEnrollment>, UnifyReport), EnrollmentsError> {
        let (users, normalized, products) = tokio::try_join!(
            self.store.list_legacy_users(),
            self.store.list_normalized_records(),
            self.store.list_product_definitions(),
        )?;
        Ok(unify_collections(
            &users,
            &normalized,
            &products,
            self.mappings,
        ))
    }
}

impl<S: EnrollmentStore + 'static> EnrollmentSource for UnifyEnrollmentsUseCase<S> {
    async fn unify(&self) -> Result<Vec<CanonicalEnrollment>, EnrollmentsError> {
        let started = Instant::now();
        let (enrollments, report) = self.execute_with_report().await?;
        info!(
            legacy_users = report.legacy_users,
            normalized_records = report.normalized_records,
            emitted_normalized = report.emitted_normalized,
            emitted_legacy = report.emitted_legacy,
            suppressed_users = report.suppressed_users,
            skipped_records = report.skipped_records,
            malformed_users = report.malformed_users,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "unified enrollments"
        );
        Ok(enrollments)
    }
}

/// Merge already-loaded collections into canonical enrollments.
///
/// Output order: normalized records in input order, then legacy-derived
/// records by user then mapping order. Any user with at least one normalized
/// row gets no legacy-derived records at all.
pub fn unify_collections(
    users: &[LegacyUser],
    normalized: &[NormalizedEnrollment],
    products: &[ProductDefinition],
    mappings: &[&dyn PlatformMapping],
) -> (Vec<CanonicalEnrollment>, UnifyReport) {
    let mut report = UnifyReport {
        legacy_users: users.len(),
        normalized_records: normalized.len(),
        ..UnifyReport::default()
    };

    let users_by_id: HashMap<UserId, &LegacyUser> = users.iter().map(|u| (u.id, u)).collect();
    let normalized_users: HashSet<UserId> = normalized.iter().map(|r| r.user_id).collect();
    let products_by_id: HashMap<ProductId, &ProductDefinition> =
        products.iter().map(|p| (p.id, p)).collect();
    let mut products_by_platform: HashMap<Platform, &ProductDefinition> = HashMap::new();
    for product in products {
        match product.platform.parse::<Platform>() {
            Ok(platform) => {
                products_by_platform.entry(platform).or_insert(product);
            }
            Err(e) => debug!(product_id = %product.id, error = %e, "ignoring product"),
        }
    }

    let mut enrollments = Vec::with_capacity(normalized.len() + users.len());

    for record in normalized {
        match normalized_enrollment(record, &users_by_id, &products_by_id, mappings) {
            Ok(enrollment) => enrollments.push(enrollment),
            Err(e) => {
                report.skipped_records += 1;
                warn!(record_id = %record.id, error = %e, "skipping normalized record");
            }
        }
    }
    report.emitted_normalized = enrollments.len();

    let mut synthesizable = Vec::with_capacity(mappings.len());
    for mapping in mappings {
        let platform = mapping.platform();
        match products_by_platform.get(&platform) {
            Some(product) => synthesizable.push((*mapping, ProductRef::new(product, platform))),
            None => {
                report.missing_products.insert(platform);
                warn!(%platform, "no product definition for platform, skipping legacy synthesis");
            }
        }
    }

    for user in users {
        if normalized_users.contains(&user.id) {
            report.suppressed_users += 1;
            continue;
        }
        match legacy_enrollments(user, &synthesizable) {
            Ok(mut synthesized) => {
                report.emitted_legacy += synthesized.len();
                enrollments.append(&mut synthesized);
            }
            Err(e) => {
                report.malformed_users += 1;
                warn!(user_id = %user.id, error = %e, "skipping legacy user");
            }
        }
    }

    (enrollments, report)
}

fn normalized_enrollment(
    record: &NormalizedEnrollment,
    users: &HashMap<UserId, &LegacyUser>,
    products: &HashMap<ProductId, &ProductDefinition>,
    mappings: &[&dyn PlatformMapping],
) -> Result<CanonicalEnrollment, RecordError> {
    let platform: Platform = record
        .platform
        .parse()
        .map_err(|_| RecordError::UnknownPlatform(record.platform.clone()))?;
    let user = users
        .get(&record.user_id)
        .ok_or(RecordError::UnknownUser(record.user_id))?;
    let product = products
        .get(&record.product_id)
        .ok_or(RecordError::UnknownProduct(record.product_id))?;

    // Rows written before the platform id column existed borrow it from the legacy document.
    let external_id = record
        .platform_user_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
        .or_else(|| {
            mappings
                .iter()
                .find(|m| m.platform() == platform)
                .and_then(|m| m.resolve_external_id(&user.document))
        })
        .ok_or(RecordError::MissingExternalId(platform))?;

    let metrics = bounded(record.progress, record.engagement);
    Ok(CanonicalEnrollment {
        id: EnrollmentId::from(record.id),
        user_id: user.id,
        user_display_name: user.name.clone(),
        user_email: user.email.clone(),
        product: ProductRef::new(product, platform),
        platform,
        platform_external_id: external_id,
        status: EnrollmentStatus::from(record.status.as_str()),
        progress_percentage: metrics.progress,
        engagement_score: metrics.engagement,
        enrolled_at: record.enrolled_at.unwrap_or(user.created_at),
        origin: EnrollmentOrigin::Normalized,
        tags: record.tags.clone(),
    })
}

fn legacy_enrollments(
    user: &LegacyUser,
    synthesizable: &[(&dyn PlatformMapping, ProductRef)],
) -> Result<Vec<CanonicalEnrollment>, RecordError> {
    let document = &user.document;
    match document {
        serde_json::Value::Object(_) => {}
        serde_json::Value::Null => return Ok(Vec::new()),
        serde_json::Value::Array(_) => return Err(RecordError::MalformedDocument("array")),
        serde_json::Value::String(_) => return Err(RecordError::MalformedDocument("string")),
        serde_json::Value::Number(_) => return Err(RecordError::MalformedDocument("number")),
        serde_json::Value::Bool(_) => return Err(RecordError::MalformedDocument("bool")),
    }

    let mut out = Vec::new();
    for (mapping, product) in synthesizable {
        let platform = mapping.platform();
        let Some(external_id) = mapping.resolve_external_id(document) else {
            continue;
        };
        let sub = mapping.sub_object(document);
        let metrics = mapping.derive_metrics(sub);
        out.push(CanonicalEnrollment {
            id: EnrollmentId::synthesized(EnrollmentOrigin::Legacy, platform, user.id),
            user_id: user.id,
            user_display_name: user.name.clone(),
            user_email: user.email.clone(),
            product: product.clone(),
            platform,
            platform_external_id: external_id,
            status: mapping.derive_status(sub),
            progress_percentage: metrics.progress,
            engagement_score: metrics.engagement,
            enrolled_at: mapping.derive_enrolled_at(sub).unwrap_or(user.created_at),
            origin: EnrollmentOrigin::Legacy,
            tags: Vec::new(),
        });
    }
    Ok(out)
}
