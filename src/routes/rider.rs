use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{get, post, put},
};

use crate::{
    dto::orders::{
        CancelOrderRequest, GrabOrderRequest, OrderList, RiderEarnings, RiderHistoryQuery,
        RiderUpdateStatusRequest,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::Order,
    response::ApiResponse,
    routes::params::Pagination,
    services::rider_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/available", get(list_available))
        .route("/grab", put(grab_order))
        .route("/cancel", put(cancel_order))
        .route("/rider-update-status", post(update_status))
        .route("/rider-history-query", post(history_query))
        .route("/rider-earnings", get(earnings))
}

#[utoipa::path(
    get,
    path = "/orders/available",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("page_size" = Option<i64>, Query, description = "Items per page, default 20")
    ),
    responses(
        (status = 200, description = "Confirmed unassigned orders, oldest first", body = ApiResponse<OrderList>),
        (status = 500, description = "Internal Server Error"),
    ),
    security(("bearer_auth" = [])),
    tag = "Rider"
)]
pub async fn list_available(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    let resp = rider_service::list_available(&state, &user, pagination).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/orders/grab",
    request_body = GrabOrderRequest,
    responses(
        (status = 200, description = "Claim an order; envelope code 409 when the order was already grabbed", body = ApiResponse<Order>),
        (status = 500, description = "Internal Server Error"),
    ),
    security(("bearer_auth" = [])),
    tag = "Rider"
)]
pub async fn grab_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<GrabOrderRequest>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let resp = rider_service::grab_order(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/orders/cancel",
    request_body = CancelOrderRequest,
    responses(
        (status = 200, description = "Release a held order back to the pool", body = ApiResponse<Order>),
        (status = 500, description = "Internal Server Error"),
    ),
    security(("bearer_auth" = [])),
    tag = "Rider"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CancelOrderRequest>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let resp = rider_service::cancel_order(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/orders/rider-update-status",
    request_body = RiderUpdateStatusRequest,
    responses(
        (status = 200, description = "Advance the order one step along the delivery path", body = ApiResponse<Order>),
        (status = 500, description = "Internal Server Error"),
    ),
    security(("bearer_auth" = [])),
    tag = "Rider"
)]
pub async fn update_status(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<RiderUpdateStatusRequest>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let resp = rider_service::update_status(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/orders/rider-history-query",
    request_body = RiderHistoryQuery,
    responses(
        (status = 200, description = "Filtered rider history, newest first", body = ApiResponse<OrderList>),
        (status = 500, description = "Internal Server Error"),
    ),
    security(("bearer_auth" = [])),
    tag = "Rider"
)]
pub async fn history_query(
    State(state): State<AppState>,
    user: AuthUser,
    Json(query): Json<RiderHistoryQuery>,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    let resp = rider_service::history(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/orders/rider-earnings",
    responses(
        (status = 200, description = "Delivery-fee rollup over completed orders", body = ApiResponse<RiderEarnings>),
        (status = 500, description = "Internal Server Error"),
    ),
    security(("bearer_auth" = [])),
    tag = "Rider"
)]
pub async fn earnings(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<RiderEarnings>>> {
    let resp = rider_service::earnings(&state, &user).await?;
    Ok(Json(resp))
}
