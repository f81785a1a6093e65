//! Order state machine and dispatch operations.
//!
//! Every write is a single conditional UPDATE whose filter encodes the
//! expected prior state; `rows_affected == 0` means the precondition did not
//! hold (lost race, wrong holder, illegal transition) and is reported as a
//! business failure. All state lives in the store; functions are generic over
//! the connection so they run against a pool, a transaction, or a test
//! database alike.

use std::collections::HashMap;
use std::fmt;

use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    db::DbPool,
    dto::orders::{
        CreateOrderRequest, MerchantUpdateRequest, OrderList, OrderWithItems, RiderEarnings,
        RiderHistoryQuery,
    },
    entity::{
        order_items::{ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems},
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders},
        products::{Column as ProdCol, Entity as Products},
        stores::{Column as StoreCol, Entity as Stores},
    },
    models::{Order, OrderItem},
    routes::params::Pagination,
};

pub const MSG_GRAB_FAILED: &str = "订单已被抢或不存在";
pub const MSG_CANCEL_FAILED: &str = "当前状态不可取消或订单不存在";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Available,
    Assigned,
    PickedUp,
    Delivering,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Available => "available",
            OrderStatus::Assigned => "assigned",
            OrderStatus::PickedUp => "picked_up",
            OrderStatus::Delivering => "delivering",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "available" => Some(OrderStatus::Available),
            "assigned" => Some(OrderStatus::Assigned),
            "picked_up" => Some(OrderStatus::PickedUp),
            "delivering" => Some(OrderStatus::Delivering),
            "completed" => Some(OrderStatus::Completed),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    /// Next state on the rider's forward path, if any.
    pub fn successor(self) -> Option<Self> {
        match self {
            OrderStatus::Available => Some(OrderStatus::Assigned),
            OrderStatus::Assigned => Some(OrderStatus::PickedUp),
            OrderStatus::PickedUp => Some(OrderStatus::Delivering),
            OrderStatus::Delivering => Some(OrderStatus::Completed),
            OrderStatus::Completed | OrderStatus::Cancelled => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcomes of dispatch operations. The first four variants are recoverable
/// business failures delivered in-band; `Db`/`Orm` are infrastructure faults
/// and the only ones that propagate as hard errors.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{0}")]
    PermissionDenied(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidTransition(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("database error")]
    Db(#[from] sqlx::Error),

    #[error("orm error")]
    Orm(#[from] DbErr),
}

impl DispatchError {
    /// Envelope code for recoverable failures; `None` for infrastructure
    /// faults, which must not be reported in-band.
    pub fn business_code(&self) -> Option<i32> {
        match self {
            DispatchError::InvalidInput(_) => Some(400),
            DispatchError::PermissionDenied(_) => Some(403),
            DispatchError::NotFound(_) => Some(404),
            DispatchError::InvalidTransition(_) => Some(409),
            DispatchError::Db(_) | DispatchError::Orm(_) => None,
        }
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// Create an order in `available` (unconfirmed, unassigned). Line items are
/// priced from the store's product list; locations are snapshotted here and
/// never updated afterwards.
pub async fn create_order<C>(
    conn: &C,
    customer_id: Uuid,
    req: CreateOrderRequest,
) -> DispatchResult<OrderWithItems>
where
    C: ConnectionTrait + TransactionTrait,
{
    if req.items.is_empty() {
        return Err(DispatchError::InvalidInput("order must contain at least one item".into()));
    }
    for item in &req.items {
        if item.quantity <= 0 {
            return Err(DispatchError::InvalidInput("item quantity must be positive".into()));
        }
    }

    let txn = conn.begin().await?;

    let store = Stores::find_by_id(req.store_id)
        .one(&txn)
        .await?
        .ok_or_else(|| DispatchError::NotFound("store not found".into()))?;

    let product_ids: Vec<Uuid> = req.items.iter().map(|i| i.product_id).collect();
    let prices: HashMap<Uuid, i64> = Products::find()
        .filter(ProdCol::Id.is_in(product_ids))
        .filter(ProdCol::StoreId.eq(req.store_id))
        .all(&txn)
        .await?
        .into_iter()
        .map(|p| (p.id, p.price))
        .collect();

    let mut total_price: i64 = 0;
    for item in &req.items {
        let price = prices.get(&item.product_id).ok_or_else(|| {
            DispatchError::InvalidInput(format!(
                "product {} is not sold by this store",
                item.product_id
            ))
        })?;
        total_price += price * i64::from(item.quantity);
    }

    let delivery_price = store.delivery_price;
    // Discounting is an external collaborator's concern; the actual price is
    // fixed here and frozen on completion.
    let actual_price = total_price + delivery_price;

    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(customer_id),
        store_id: Set(req.store_id),
        rider_id: Set(None),
        status: Set(OrderStatus::Available.as_str().to_owned()),
        confirmed: Set(false),
        user_location: Set(req.user_location),
        store_location: Set(store.location),
        total_price: Set(total_price),
        actual_price: Set(actual_price),
        delivery_price: Set(delivery_price),
        remark: Set(req.remark),
        cancel_reason: Set(None),
        created_at: NotSet,
        deadline: Set(req.deadline.into()),
        ended_at: Set(None),
    }
    .insert(&txn)
    .await?;

    let mut items: Vec<OrderItem> = Vec::with_capacity(req.items.len());
    for item in &req.items {
        let inserted = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(item.product_id),
            quantity: Set(item.quantity),
        }
        .insert(&txn)
        .await?;
        items.push(order_item_from_entity(inserted));
    }

    txn.commit().await?;

    Ok(OrderWithItems {
        order: order_from_entity(order)?,
        items,
    })
}

/// Grabbable feed: confirmed, unassigned orders, oldest first so waiting
/// riders see a fair queue.
pub async fn list_available_orders<C: ConnectionTrait>(
    conn: &C,
    pagination: &Pagination,
) -> DispatchResult<OrderList> {
    let (page, page_size, offset) = pagination.normalize();

    let finder = Orders::find()
        .filter(OrderCol::Status.eq(OrderStatus::Available.as_str()))
        .filter(OrderCol::Confirmed.eq(true))
        .order_by_asc(OrderCol::CreatedAt);

    let total = finder.clone().count(conn).await? as i64;

    let items = finder
        .limit(page_size as u64)
        .offset(offset as u64)
        .all(conn)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect::<DispatchResult<Vec<Order>>>()?;

    Ok(OrderList {
        items,
        page,
        page_size,
        total,
    })
}

/// Atomically claim an order for `rider_id`. The compare-and-swap succeeds
/// only while the order is `available`, merchant-confirmed and unassigned, so
/// at most one of any number of concurrent grabs can win; losers get the
/// ordinary "already grabbed" failure.
pub async fn grab_order<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    rider_id: Uuid,
) -> DispatchResult<Order> {
    let res = Orders::update_many()
        .col_expr(OrderCol::Status, Expr::value(OrderStatus::Assigned.as_str()))
        .col_expr(OrderCol::RiderId, Expr::value(rider_id))
        .filter(
            Condition::all()
                .add(OrderCol::Id.eq(order_id))
                .add(OrderCol::Status.eq(OrderStatus::Available.as_str()))
                .add(OrderCol::Confirmed.eq(true))
                .add(OrderCol::RiderId.is_null()),
        )
        .exec(conn)
        .await?;

    if res.rows_affected == 0 {
        return Err(DispatchError::InvalidTransition(MSG_GRAB_FAILED.into()));
    }

    fetch_order(conn, order_id).await
}

/// Release an assigned order back to the pool. Only the current holder may
/// cancel, and only from `assigned`; the second of two back-to-back cancels
/// fails because the order is no longer held.
pub async fn rider_cancel_order<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    rider_id: Uuid,
) -> DispatchResult<Order> {
    let res = Orders::update_many()
        .col_expr(OrderCol::Status, Expr::value(OrderStatus::Available.as_str()))
        .col_expr(OrderCol::RiderId, Expr::value(Option::<Uuid>::None))
        .filter(
            Condition::all()
                .add(OrderCol::Id.eq(order_id))
                .add(OrderCol::Status.eq(OrderStatus::Assigned.as_str()))
                .add(OrderCol::RiderId.eq(rider_id)),
        )
        .exec(conn)
        .await?;

    if res.rows_affected == 0 {
        return Err(DispatchError::InvalidTransition(MSG_CANCEL_FAILED.into()));
    }

    fetch_order(conn, order_id).await
}

/// Advance the order one step along `assigned -> picked_up -> delivering ->
/// completed`. The filter pins both the expected predecessor state and the
/// holding rider, so skips, regressions and non-holders all fail the same
/// way. Completion stamps `ended_at`; the actual price was fixed at creation
/// and is frozen from here on.
pub async fn rider_advance_status<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
    rider_id: Uuid,
    target: &str,
) -> DispatchResult<Order> {
    let target = OrderStatus::parse(target)
        .ok_or_else(|| DispatchError::InvalidInput(format!("unknown target status: {target}")))?;

    let expected = advance_precondition(target).ok_or_else(|| {
        DispatchError::InvalidTransition(format!("cannot advance an order to {target}"))
    })?;

    let mut update = Orders::update_many()
        .col_expr(OrderCol::Status, Expr::value(target.as_str()));
    if target == OrderStatus::Completed {
        update = update.col_expr(OrderCol::EndedAt, Expr::value(Utc::now()));
    }

    let res = update
        .filter(
            Condition::all()
                .add(OrderCol::Id.eq(order_id))
                .add(OrderCol::Status.eq(expected.as_str()))
                .add(OrderCol::RiderId.eq(rider_id)),
        )
        .exec(conn)
        .await?;

    if res.rows_affected == 0 {
        return Err(DispatchError::InvalidTransition(format!(
            "order is not in {expected} or is not held by this rider"
        )));
    }

    fetch_order(conn, order_id).await
}

/// Merchant-side update: `confirmed` opens an `available` order to riders,
/// `cancelled` terminates it from `available` or `assigned`, releasing any
/// rider and recording the reason. Ownership goes through the store record.
pub async fn merchant_update_order<C: ConnectionTrait>(
    conn: &C,
    merchant_id: Uuid,
    req: MerchantUpdateRequest,
) -> DispatchResult<Order> {
    let order = Orders::find_by_id(req.id)
        .one(conn)
        .await?
        .ok_or_else(|| DispatchError::NotFound("order not found".into()))?;

    let owned = Stores::find()
        .filter(StoreCol::Id.eq(order.store_id))
        .filter(StoreCol::MerchantId.eq(merchant_id))
        .one(conn)
        .await?;
    if owned.is_none() {
        return Err(DispatchError::NotFound(
            "order does not belong to this merchant".into(),
        ));
    }

    let res = match req.new_status.as_str() {
        "confirmed" => {
            Orders::update_many()
                .col_expr(OrderCol::Confirmed, Expr::value(true))
                .filter(
                    Condition::all()
                        .add(OrderCol::Id.eq(req.id))
                        .add(OrderCol::Status.eq(OrderStatus::Available.as_str()))
                        .add(OrderCol::Confirmed.eq(false)),
                )
                .exec(conn)
                .await?
        }
        "cancelled" => {
            Orders::update_many()
                .col_expr(OrderCol::Status, Expr::value(OrderStatus::Cancelled.as_str()))
                .col_expr(OrderCol::RiderId, Expr::value(Option::<Uuid>::None))
                .col_expr(OrderCol::CancelReason, Expr::value(req.cancel_reason.clone()))
                .col_expr(OrderCol::EndedAt, Expr::value(Utc::now()))
                .filter(
                    Condition::all().add(OrderCol::Id.eq(req.id)).add(
                        OrderCol::Status.is_in([
                            OrderStatus::Available.as_str(),
                            OrderStatus::Assigned.as_str(),
                        ]),
                    ),
                )
                .exec(conn)
                .await?
        }
        other => {
            return Err(DispatchError::InvalidTransition(format!(
                "unsupported target status: {other}"
            )));
        }
    };

    if res.rows_affected == 0 {
        return Err(DispatchError::InvalidTransition(
            "order cannot be updated in its current state".into(),
        ));
    }

    fetch_order(conn, req.id).await
}

/// Rider history, newest first, with optional status and creation-date
/// filters.
pub async fn rider_orders<C: ConnectionTrait>(
    conn: &C,
    rider_id: Uuid,
    query: &RiderHistoryQuery,
) -> DispatchResult<OrderList> {
    let (page, page_size, offset) = query.pagination.normalize();

    let mut condition = Condition::all().add(OrderCol::RiderId.eq(rider_id));
    if let Some(status) = query.status.as_deref().filter(|s| !s.is_empty()) {
        let status = OrderStatus::parse(status).ok_or_else(|| {
            DispatchError::InvalidInput(format!("unknown status filter: {status}"))
        })?;
        condition = condition.add(OrderCol::Status.eq(status.as_str()));
    }
    if let Some(from) = query.date_from {
        condition = condition.add(OrderCol::CreatedAt.gte(from));
    }
    if let Some(to) = query.date_to {
        condition = condition.add(OrderCol::CreatedAt.lte(to));
    }

    let finder = Orders::find()
        .filter(condition)
        .order_by_desc(OrderCol::CreatedAt);

    let total = finder.clone().count(conn).await? as i64;

    let items = finder
        .limit(page_size as u64)
        .offset(offset as u64)
        .all(conn)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect::<DispatchResult<Vec<Order>>>()?;

    Ok(OrderList {
        items,
        page,
        page_size,
        total,
    })
}

/// Delivery-fee rollup over the rider's completed orders, plus the subset
/// ended since midnight UTC. Reads the same rows the state machine writes, so
/// an order counts exactly when it is `completed` with `ended_at` set.
pub async fn rider_earnings(pool: &DbPool, rider_id: Uuid) -> DispatchResult<RiderEarnings> {
    let (total_earnings, completed_orders): (i64, i64) = sqlx::query_as(
        "SELECT COALESCE(SUM(delivery_price), 0)::BIGINT, COUNT(*) \
         FROM orders WHERE rider_id = $1 AND status = $2",
    )
    .bind(rider_id)
    .bind(OrderStatus::Completed.as_str())
    .fetch_one(pool)
    .await?;

    let (today_earnings, today_completed): (i64, i64) = sqlx::query_as(
        "SELECT COALESCE(SUM(delivery_price), 0)::BIGINT, COUNT(*) \
         FROM orders WHERE rider_id = $1 AND status = $2 \
         AND ended_at IS NOT NULL AND ended_at >= date_trunc('day', now())",
    )
    .bind(rider_id)
    .bind(OrderStatus::Completed.as_str())
    .fetch_one(pool)
    .await?;

    Ok(RiderEarnings {
        total_earnings,
        completed_orders,
        today_earnings,
        today_completed,
    })
}

/// All orders of the caller's stores, newest first.
pub async fn merchant_orders<C: ConnectionTrait>(
    conn: &C,
    merchant_id: Uuid,
    pagination: &Pagination,
) -> DispatchResult<OrderList> {
    let (page, page_size, offset) = pagination.normalize();

    let store_ids: Vec<Uuid> = Stores::find()
        .filter(StoreCol::MerchantId.eq(merchant_id))
        .all(conn)
        .await?
        .into_iter()
        .map(|s| s.id)
        .collect();

    if store_ids.is_empty() {
        return Ok(OrderList {
            items: Vec::new(),
            page,
            page_size,
            total: 0,
        });
    }

    let finder = Orders::find()
        .filter(OrderCol::StoreId.is_in(store_ids))
        .order_by_desc(OrderCol::CreatedAt);

    let total = finder.clone().count(conn).await? as i64;

    let items = finder
        .limit(page_size as u64)
        .offset(offset as u64)
        .all(conn)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect::<DispatchResult<Vec<Order>>>()?;

    Ok(OrderList {
        items,
        page,
        page_size,
        total,
    })
}

/// The customer's own orders, newest first.
pub async fn customer_orders<C: ConnectionTrait>(
    conn: &C,
    customer_id: Uuid,
    pagination: &Pagination,
) -> DispatchResult<OrderList> {
    let (page, page_size, offset) = pagination.normalize();

    let finder = Orders::find()
        .filter(OrderCol::UserId.eq(customer_id))
        .order_by_desc(OrderCol::CreatedAt);

    let total = finder.clone().count(conn).await? as i64;

    let items = finder
        .limit(page_size as u64)
        .offset(offset as u64)
        .all(conn)
        .await?
        .into_iter()
        .map(order_from_entity)
        .collect::<DispatchResult<Vec<Order>>>()?;

    Ok(OrderList {
        items,
        page,
        page_size,
        total,
    })
}

pub async fn order_items<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> DispatchResult<Vec<OrderItem>> {
    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order_id))
        .all(conn)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect();
    Ok(items)
}

async fn fetch_order<C: ConnectionTrait>(conn: &C, order_id: Uuid) -> DispatchResult<Order> {
    let order = Orders::find_by_id(order_id)
        .one(conn)
        .await?
        .ok_or_else(|| DispatchError::NotFound("order not found".into()))?;
    order_from_entity(order)
}

// Which state an order must currently be in for the rider to move it to
// `target`. `None` marks targets the rider path can never move to.
fn advance_precondition(target: OrderStatus) -> Option<OrderStatus> {
    match target {
        OrderStatus::PickedUp => Some(OrderStatus::Assigned),
        OrderStatus::Delivering => Some(OrderStatus::PickedUp),
        OrderStatus::Completed => Some(OrderStatus::Delivering),
        OrderStatus::Available | OrderStatus::Assigned | OrderStatus::Cancelled => None,
    }
}

pub(crate) fn order_from_entity(model: crate::entity::orders::Model) -> DispatchResult<Order> {
    let status = OrderStatus::parse(&model.status).ok_or_else(|| {
        DispatchError::Orm(DbErr::Custom(format!(
            "unknown order status in storage: {}",
            model.status
        )))
    })?;
    Ok(Order {
        id: model.id,
        user_id: model.user_id,
        store_id: model.store_id,
        rider_id: model.rider_id,
        status,
        confirmed: model.confirmed,
        user_location: model.user_location,
        store_location: model.store_location,
        total_price: model.total_price,
        actual_price: model.actual_price,
        delivery_price: model.delivery_price,
        remark: model.remark,
        cancel_reason: model.cancel_reason,
        created_at: model.created_at.with_timezone(&Utc),
        deadline: model.deadline.with_timezone(&Utc),
        ended_at: model.ended_at.map(|dt| dt.with_timezone(&Utc)),
    })
}

pub(crate) fn order_item_from_entity(model: crate::entity::order_items::Model) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        product_id: model.product_id,
        quantity: model.quantity,
    }
}
