use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dispatch::OrderStatus;

/// API-facing view of an order record. Statuses are the closed
/// [`OrderStatus`] set; locations are snapshots taken at creation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub store_id: Uuid,
    pub rider_id: Option<Uuid>,
    pub status: OrderStatus,
    pub confirmed: bool,
    pub user_location: String,
    pub store_location: String,
    pub total_price: i64,
    pub actual_price: i64,
    pub delivery_price: i64,
    pub remark: Option<String>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
}
