use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub booking_id: Option<Uuid>,
    pub service_id: Option<Uuid>,
    pub name: String,
    pub bucket: String,
    pub path: String,
    pub url: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct DocumentQuery {
    pub booking_id: Option<Uuid>,
    pub service_id: Option<Uuid>,
}
