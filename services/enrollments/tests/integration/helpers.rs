use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use campus_domain::id::{ProductId, UserId};
use campus_enrollments::domain::repository::EnrollmentStore;
use campus_enrollments::domain::types::{LegacyUser, NormalizedEnrollment, ProductDefinition};
use campus_enrollments::error::EnrollmentsError;
use campus_testing::fixture::Fixture;

pub const POPULATION: &str = "fixtures/population.json";

pub fn user_id(suffix: &str) -> UserId {
    UserId(Uuid::parse_str(&format!("0b6f2f1a-0000-4000-8000-00000000{suffix}")).unwrap())
}

pub const ANA: &str = "a001";
pub const BRUNO: &str = "a002";
pub const CARLA: &str = "a003";
pub const DIEGO: &str = "a004";

// ── Fixture shapes ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FixtureUser {
    id: Uuid,
    name: String,
    email: String,
    created_at: DateTime<Utc>,
    document: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FixtureRow {
    id: Uuid,
    user_id: Uuid,
    product_id: Uuid,
    platform: String,
    platform_user_id: Option<String>,
    status: String,
    progress: f64,
    engagement: f64,
    #[serde(default)]
    enrolled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Deserialize)]
struct FixtureProduct {
    id: Uuid,
    name: String,
    code: String,
    platform: String,
}

#[derive(Deserialize)]
struct FixturePopulation {
    users: Vec<FixtureUser>,
    normalized: Vec<FixtureRow>,
    products: Vec<FixtureProduct>,
}

// ── StoreData ────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct StoreData {
    pub users: Vec<LegacyUser>,
    pub normalized: Vec<NormalizedEnrollment>,
    pub products: Vec<ProductDefinition>,
}

impl StoreData {
    pub fn population() -> Self {
        let population: FixturePopulation = Fixture::load_as(POPULATION);
        Self {
            users: population
                .users
                .into_iter()
                .map(|u| LegacyUser {
                    id: UserId(u.id),
                    name: u.name,
                    email: u.email,
                    document: u.document,
                    created_at: u.created_at,
                })
                .collect(),
            normalized: population
                .normalized
                .into_iter()
                .map(|r| NormalizedEnrollment {
                    id: r.id,
                    user_id: UserId(r.user_id),
                    product_id: ProductId(r.product_id),
                    platform: r.platform,
                    platform_user_id: r.platform_user_id,
                    status: r.status,
                    progress: r.progress,
                    engagement: r.engagement,
                    enrolled_at: r.enrolled_at,
                    tags: r.tags,
                })
                .collect(),
            products: population
                .products
                .into_iter()
                .map(|p| ProductDefinition {
                    id: ProductId(p.id),
                    name: p.name,
                    code: p.code,
                    platform: p.platform,
                })
                .collect(),
        }
    }

    pub fn product_for(&self, platform: &str) -> &ProductDefinition {
        self.products
            .iter()
            .find(|p| p.platform == platform)
            .unwrap()
    }
}

// ── InMemoryStore ────────────────────────────────────────────────────────────

/// Store backed by shared vectors; clones observe and mutate the same data.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    pub data: Arc<Mutex<StoreData>>,
    pub user_reads: Arc<AtomicUsize>,
    pub normalized_reads: Arc<AtomicUsize>,
    pub product_reads: Arc<AtomicUsize>,
    pub failing: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new(data: StoreData) -> Self {
        Self {
            data: Arc::new(Mutex::new(data)),
            ..Self::default()
        }
    }

    pub fn population() -> Self {
        Self::new(StoreData::population())
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of full unification passes served, counted on the user read.
    pub fn passes(&self) -> usize {
        self.user_reads.load(Ordering::SeqCst)
    }

    pub fn insert_normalized(&self, row: NormalizedEnrollment) {
        self.data.lock().unwrap().normalized.push(row);
    }

    fn check(&self) -> Result<(), EnrollmentsError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EnrollmentsError::Internal(anyhow::anyhow!(
                "connection refused"
            )));
        }
        Ok(())
    }
}

impl EnrollmentStore for InMemoryStore {
    async fn list_legacy_users(&self) -> Result<Vec<LegacyUser>, EnrollmentsError> {
        self.user_reads.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.data.lock().unwrap().users.clone())
    }

    async fn list_normalized_records(&self) -> Result<Vec<NormalizedEnrollment>, EnrollmentsError> {
        self.normalized_reads.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.data.lock().unwrap().normalized.clone())
    }

    async fn list_product_definitions(&self) -> Result<Vec<ProductDefinition>, EnrollmentsError> {
        self.product_reads.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.data.lock().unwrap().products.clone())
    }
}
