use crate::{
    audit::log_audit,
    dispatch,
    dto::orders::{CreateOrderRequest, OrderList, OrderWithItems},
    error::AppResult,
    middleware::auth::AuthUser,
    permission::{Operation, authorize},
    response::ApiResponse,
    routes::params::Pagination,
    services::{business_failure, reply},
    state::AppState,
};

pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    if let Err(err) = authorize(user, Operation::CreateOrder) {
        return business_failure(err);
    }

    match dispatch::create_order(&state.orm, user.user_id, payload).await {
        Ok(created) => {
            if let Err(err) = log_audit(
                &state.pool,
                Some(user.user_id),
                "order_created",
                Some("orders"),
                Some(serde_json::json!({ "order_id": created.order.id })),
            )
            .await
            {
                tracing::warn!(error = %err, "audit log failed");
            }
            Ok(ApiResponse::success("Order created", created))
        }
        Err(err) => business_failure(err),
    }
}

pub async fn history(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<OrderList>> {
    if let Err(err) = authorize(user, Operation::CustomerHistory) {
        return business_failure(err);
    }
    reply(
        dispatch::customer_orders(&state.orm, user.user_id, &pagination).await,
        "Ok",
    )
}
