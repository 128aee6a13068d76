use crate::adapters::database::records::{ProductSummaryRecord, UserSummaryRecord};
use crate::domain::summary::{ProductSummary, UserSummary};
use crate::error::Result;
use sqlx::PgConnection;
use uuid::Uuid;

/// Read-only access to the user and product tables owned by other subsystems.
#[derive(Clone, Debug, Default)]
pub struct ProfileRepository {}

impl ProfileRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn, ids), fields(count = ids.len()))]
    pub(crate) async fn users_by_ids(&self, conn: &mut PgConnection, ids: &[Uuid]) -> Result<Vec<UserSummary>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let records = sqlx::query_as::<_, UserSummaryRecord>(
            "SELECT id, full_name, avatar_url, phone_number FROM users WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(conn)
        .await?;

        Ok(records.into_iter().map(Into::into).collect())
    }

    /// Products with their primary image, falling back to the oldest image.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn, ids), fields(count = ids.len()))]
    pub(crate) async fn products_by_ids(&self, conn: &mut PgConnection, ids: &[Uuid]) -> Result<Vec<ProductSummary>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let records = sqlx::query_as::<_, ProductSummaryRecord>(
            r#"
            SELECT p.id, p.name, p.price::float8 AS price, p.status, img.image_url AS primary_image_url
            FROM products p
            LEFT JOIN LATERAL (
                SELECT image_url FROM product_images
                WHERE product_id = p.id
                ORDER BY is_primary DESC, created_at ASC
                LIMIT 1
            ) img ON true
            WHERE p.id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(conn)
        .await?;

        Ok(records.into_iter().map(Into::into).collect())
    }
}
