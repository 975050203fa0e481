use std::sync::Arc;

use anyhow::Context as _;
use sea_orm::{Database, DatabaseConnection};
use tracing::{info, warn};

use crate::cache::{CachePolicy, EnrollmentSnapshot, UnifiedViewCache};
use crate::config::EnrollmentsConfig;
use crate::domain::repository::EnrollmentSource;
use crate::error::EnrollmentsError;
use crate::infra::db::DbEnrollmentStore;
use crate::usecase::invalidate::InvalidateOnWriteUseCase;
use crate::usecase::unify::UnifyEnrollmentsUseCase;

pub type DbUnifiedViewCache = UnifiedViewCache<UnifyEnrollmentsUseCase<DbEnrollmentStore>>;

/// Everything read and write paths share: the connection and the unified view.
#[derive(Clone)]
pub struct EnrollmentsApp {
    pub db: DatabaseConnection,
    pub cache: Arc<DbUnifiedViewCache>,
}

impl EnrollmentsApp {
    /// Connect, build the cache, then warm it and start keep-warm as configured.
    /// A failed warm-up is logged and left to the first reader to retry.
    pub async fn init(config: &EnrollmentsConfig) -> anyhow::Result<Self> {
        let db = Database::connect(&config.database_url)
            .await
            .context("connect to database")?;
        let usecase = UnifyEnrollmentsUseCase::new(DbEnrollmentStore { db: db.clone() });
        let cache = Arc::new(UnifiedViewCache::new(usecase, CachePolicy::from(config)));

        if config.cache_warm_on_start {
            warm(&cache).await;
        }
        cache.spawn_keep_warm(config.keep_warm_interval());

        Ok(Self { db, cache })
    }

    /// Read accessor every dashboard and report calls.
    pub async fn get_unified_enrollments(
        &self,
    ) -> Result<Arc<EnrollmentSnapshot>, EnrollmentsError> {
        self.cache.get().await
    }

    /// Called by write paths right after they mutate legacy users or
    /// normalized rows.
    pub fn invalidate_unified_enrollments(&self) {
        self.cache.invalidate();
    }

    /// Wraps a write so the unified view is invalidated once it succeeds.
    pub fn invalidate_on_write(&self) -> InvalidateOnWriteUseCase<Arc<DbUnifiedViewCache>> {
        InvalidateOnWriteUseCase {
            port: self.cache.clone(),
        }
    }

    pub async fn shutdown(&self) {
        self.cache.shutdown().await;
        if let Err(e) = self.db.clone().close().await {
            warn!(error = %e, "failed to close database connection");
        }
    }
}

async fn warm<E: EnrollmentSource>(cache: &UnifiedViewCache<E>) {
    match cache.warm_up().await {
        Ok(snapshot) => info!(
            total = snapshot.stats.total,
            migrated_ratio = snapshot.stats.migrated_ratio,
            "unified enrollments warmed"
        ),
        Err(e) => warn!(error = %e.root(), "warm-up failed, first read will retry"),
    }
}
