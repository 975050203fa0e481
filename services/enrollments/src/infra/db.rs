use anyhow::Context as _;
use sea_orm::{DatabaseConnection, EntityTrait, QueryOrder};
use serde_json::Value;
use tracing::debug;

use campus_domain::id::{ProductId, UserId};
use campus_enrollments_schema::{legacy_users, products, user_products};

use crate::domain::repository::EnrollmentStore;
use crate::domain::types::{LegacyUser, NormalizedEnrollment, ProductDefinition};
use crate::error::EnrollmentsError;

// ── Enrollment store ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbEnrollmentStore {
    pub db: DatabaseConnection,
}

impl EnrollmentStore for DbEnrollmentStore {
    async fn list_legacy_users(&self) -> Result<Vec<LegacyUser>, EnrollmentsError> {
        let models = legacy_users::Entity::find()
            .order_by_asc(legacy_users::Column::CreatedAt)
            .order_by_asc(legacy_users::Column::Id)
            .all(&self.db)
            .await
            .context("list legacy users")?;
        Ok(models.into_iter().map(legacy_user_from_model).collect())
    }

    async fn list_normalized_records(&self) -> Result<Vec<NormalizedEnrollment>, EnrollmentsError> {
        let models = user_products::Entity::find()
            .order_by_asc(user_products::Column::CreatedAt)
            .order_by_asc(user_products::Column::Id)
            .all(&self.db)
            .await
            .context("list user products")?;
        Ok(models.into_iter().map(normalized_from_model).collect())
    }

    async fn list_product_definitions(&self) -> Result<Vec<ProductDefinition>, EnrollmentsError> {
        let models = products::Entity::find()
            .order_by_asc(products::Column::CreatedAt)
            .order_by_asc(products::Column::Id)
            .all(&self.db)
            .await
            .context("list products")?;
        Ok(models.into_iter().map(product_from_model).collect())
    }
}

fn legacy_user_from_model(model: legacy_users::Model) -> LegacyUser {
    LegacyUser {
        id: UserId(model.id),
        name: model.name,
        email: model.email,
        document: model.document,
        created_at: model.created_at,
    }
}

fn normalized_from_model(model: user_products::Model) -> NormalizedEnrollment {
    let tags = tags_from_json(&model.tags);
    NormalizedEnrollment {
        id: model.id,
        user_id: UserId(model.user_id),
        product_id: ProductId(model.product_id),
        platform: model.platform,
        platform_user_id: model.platform_user_id,
        status: model.status,
        progress: model.progress,
        engagement: model.engagement,
        enrolled_at: model.enrolled_at,
        tags,
    }
}

fn product_from_model(model: products::Model) -> ProductDefinition {
    ProductDefinition {
        id: ProductId(model.id),
        name: model.name,
        code: model.code,
        platform: model.platform,
    }
}

/// Tags are written by several tools; anything other than an array of
/// strings is dropped rather than failing the row.
fn tags_from_json(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(tag) if !tag.trim().is_empty() => Some(tag.trim().to_owned()),
                _ => None,
            })
            .collect(),
        Value::Null => Vec::new(),
        other => {
            debug!(value = %other, "ignoring non-array tags");
            Vec::new()
        }
    }
}
