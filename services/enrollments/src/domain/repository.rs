use std::future::Future;
use std::sync::Arc;

use crate::domain::types::{
    CanonicalEnrollment, LegacyUser, NormalizedEnrollment, ProductDefinition,
};
use crate::error::EnrollmentsError;

/// Read-only bulk access to the three collections the unification pass needs.
///
/// Every method returns the whole collection in one read; the engine never
/// issues per-user queries.
pub trait EnrollmentStore: Send + Sync {
    fn list_legacy_users(
        &self,
    ) -> impl Future<Output = Result<Vec<LegacyUser>, EnrollmentsError>> + Send;

    fn list_normalized_records(
        &self,
    ) -> impl Future<Output = Result<Vec<NormalizedEnrollment>, EnrollmentsError>> + Send;

    /// Product definitions in a stable order; the first one per platform wins.
    fn list_product_definitions(
        &self,
    ) -> impl Future<Output = Result<Vec<ProductDefinition>, EnrollmentsError>> + Send;
}

/// Produces the full unified enrollment set. The cache wraps one of these.
pub trait EnrollmentSource: Send + Sync + 'static {
    fn unify(
        &self,
    ) -> impl Future<Output = Result<Vec<CanonicalEnrollment>, EnrollmentsError>> + Send;
}

/// Hook every write path calls after mutating legacy users or normalized rows.
pub trait InvalidationPort: Send + Sync {
    fn invalidate(&self);
}

impl<T: InvalidationPort + ?Sized> InvalidationPort for Arc<T> {
    fn invalidate(&self) {
        (**self).invalidate()
    }
}
