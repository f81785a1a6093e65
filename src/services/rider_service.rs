use crate::{
    audit::log_audit,
    dispatch,
    dto::orders::{
        CancelOrderRequest, GrabOrderRequest, OrderList, RiderEarnings, RiderHistoryQuery,
        RiderUpdateStatusRequest,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::Order,
    permission::{Operation, authorize},
    response::ApiResponse,
    routes::params::Pagination,
    services::{business_failure, reply},
    state::AppState,
};

pub async fn list_available(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<OrderList>> {
    if let Err(err) = authorize(user, Operation::ListAvailableOrders) {
        return business_failure(err);
    }
    reply(
        dispatch::list_available_orders(&state.orm, &pagination).await,
        "Ok",
    )
}

pub async fn grab_order(
    state: &AppState,
    user: &AuthUser,
    payload: GrabOrderRequest,
) -> AppResult<ApiResponse<Order>> {
    if let Err(err) = authorize(user, Operation::GrabOrder) {
        return business_failure(err);
    }

    match dispatch::grab_order(&state.orm, payload.order_id, user.user_id).await {
        Ok(order) => {
            audit(state, user, "order_grabbed", order.id).await;
            Ok(ApiResponse::success("Order grabbed", order))
        }
        Err(err) => business_failure(err),
    }
}

pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    payload: CancelOrderRequest,
) -> AppResult<ApiResponse<Order>> {
    if let Err(err) = authorize(user, Operation::RiderCancelOrder) {
        return business_failure(err);
    }

    match dispatch::rider_cancel_order(&state.orm, payload.order_id, user.user_id).await {
        Ok(order) => {
            audit(state, user, "order_released", order.id).await;
            Ok(ApiResponse::success("Order released", order))
        }
        Err(err) => business_failure(err),
    }
}

pub async fn update_status(
    state: &AppState,
    user: &AuthUser,
    payload: RiderUpdateStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    if let Err(err) = authorize(user, Operation::RiderAdvanceStatus) {
        return business_failure(err);
    }

    match dispatch::rider_advance_status(
        &state.orm,
        payload.order_id,
        user.user_id,
        &payload.target_status,
    )
    .await
    {
        Ok(order) => {
            audit(state, user, "order_status_advanced", order.id).await;
            Ok(ApiResponse::success("Order updated", order))
        }
        Err(err) => business_failure(err),
    }
}

pub async fn history(
    state: &AppState,
    user: &AuthUser,
    query: RiderHistoryQuery,
) -> AppResult<ApiResponse<OrderList>> {
    if let Err(err) = authorize(user, Operation::RiderHistory) {
        return business_failure(err);
    }
    reply(dispatch::rider_orders(&state.orm, user.user_id, &query).await, "Ok")
}

pub async fn earnings(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<RiderEarnings>> {
    if let Err(err) = authorize(user, Operation::RiderEarnings) {
        return business_failure(err);
    }
    reply(dispatch::rider_earnings(&state.pool, user.user_id).await, "Ok")
}

async fn audit(state: &AppState, user: &AuthUser, action: &str, order_id: uuid::Uuid) {
    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        action,
        Some("orders"),
        Some(serde_json::json!({ "order_id": order_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }
}
