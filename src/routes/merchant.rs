use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{get, put},
};

use crate::{
    dto::orders::{MerchantUpdateRequest, OrderList},
    error::AppResult,
    middleware::auth::AuthUser,
    models::Order,
    response::ApiResponse,
    routes::params::Pagination,
    services::merchant_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/merchant-update", put(merchant_update))
        .route("/merchant-orders", get(merchant_orders))
}

#[utoipa::path(
    put,
    path = "/orders/merchant-update",
    request_body = MerchantUpdateRequest,
    responses(
        (status = 200, description = "Confirm or cancel an order of the caller's store", body = ApiResponse<Order>),
        (status = 500, description = "Internal Server Error"),
    ),
    security(("bearer_auth" = [])),
    tag = "Merchant"
)]
pub async fn merchant_update(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<MerchantUpdateRequest>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let resp = merchant_service::update_order(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/orders/merchant-orders",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("page_size" = Option<i64>, Query, description = "Items per page, default 20")
    ),
    responses(
        (status = 200, description = "Orders of the caller's stores, newest first", body = ApiResponse<OrderList>),
    ),
    security(("bearer_auth" = [])),
    tag = "Merchant"
)]
pub async fn merchant_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    let resp = merchant_service::list_orders(&state, &user, pagination).await?;
    Ok(Json(resp))
}
