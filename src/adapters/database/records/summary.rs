use crate::domain::summary::{ProductSummary, UserSummary};
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
pub struct UserSummaryRecord {
    pub(crate) id: Uuid,
    pub(crate) full_name: String,
    pub(crate) avatar_url: Option<String>,
    pub(crate) phone_number: Option<String>,
}

impl From<UserSummaryRecord> for UserSummary {
    fn from(record: UserSummaryRecord) -> Self {
        Self {
            id: record.id,
            full_name: record.full_name,
            avatar_url: record.avatar_url,
            phone_number: record.phone_number,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct ProductSummaryRecord {
    pub(crate) id: Uuid,
    pub(crate) name: String,
    pub(crate) price: f64,
    pub(crate) status: String,
    pub(crate) primary_image_url: Option<String>,
}

impl From<ProductSummaryRecord> for ProductSummary {
    fn from(record: ProductSummaryRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            price: record.price,
            status: record.status,
            primary_image_url: record.primary_image_url,
        }
    }
}
