use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    models::{Order, OrderItem},
    routes::params::Pagination,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct OrderItemInput {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    pub store_id: Uuid,
    pub items: Vec<OrderItemInput>,
    pub user_location: String,
    /// Promised delivery time.
    pub deadline: DateTime<Utc>,
    pub remark: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GrabOrderRequest {
    pub order_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CancelOrderRequest {
    pub order_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RiderUpdateStatusRequest {
    pub order_id: Uuid,
    /// One of `picked_up`, `delivering`, `completed`.
    pub target_status: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RiderHistoryQuery {
    #[serde(flatten)]
    pub pagination: Pagination,
    pub status: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MerchantUpdateRequest {
    pub id: Uuid,
    /// `confirmed` to open the order to riders, `cancelled` to cancel it.
    pub new_status: String,
    pub cancel_reason: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RiderEarnings {
    /// Sum of delivery fees over all completed orders.
    pub total_earnings: i64,
    pub completed_orders: i64,
    /// Subset of the above for orders ended since midnight UTC.
    pub today_earnings: i64,
    pub today_completed: i64,
}
