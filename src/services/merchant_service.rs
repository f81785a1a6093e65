use crate::{
    audit::log_audit,
    dispatch,
    dto::orders::{MerchantUpdateRequest, OrderList},
    error::AppResult,
    middleware::auth::AuthUser,
    models::Order,
    permission::{Operation, authorize},
    response::ApiResponse,
    routes::params::Pagination,
    services::{business_failure, reply},
    state::AppState,
};

pub async fn update_order(
    state: &AppState,
    user: &AuthUser,
    payload: MerchantUpdateRequest,
) -> AppResult<ApiResponse<Order>> {
    if let Err(err) = authorize(user, Operation::MerchantUpdateOrder) {
        return business_failure(err);
    }

    let new_status = payload.new_status.clone();
    match dispatch::merchant_update_order(&state.orm, user.user_id, payload).await {
        Ok(order) => {
            if let Err(err) = log_audit(
                &state.pool,
                Some(user.user_id),
                "order_merchant_updated",
                Some("orders"),
                Some(serde_json::json!({ "order_id": order.id, "new_status": new_status })),
            )
            .await
            {
                tracing::warn!(error = %err, "audit log failed");
            }
            Ok(ApiResponse::success("Order updated", order))
        }
        Err(err) => business_failure(err),
    }
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<OrderList>> {
    if let Err(err) = authorize(user, Operation::MerchantOrders) {
        return business_failure(err);
    }
    reply(
        dispatch::merchant_orders(&state.orm, user.user_id, &pagination).await,
        "Ok",
    )
}
