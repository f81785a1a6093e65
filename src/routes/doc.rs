use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dispatch::OrderStatus,
    dto::orders::{
        CancelOrderRequest, CreateOrderRequest, GrabOrderRequest, MerchantUpdateRequest,
        OrderItemInput, OrderList, OrderWithItems, RiderEarnings, RiderHistoryQuery,
        RiderUpdateStatusRequest,
    },
    models::{Order, OrderItem},
    response::ApiResponse,
    routes::{customer, health, merchant, params, rider},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        rider::list_available,
        rider::grab_order,
        rider::cancel_order,
        rider::update_status,
        rider::history_query,
        rider::earnings,
        merchant::merchant_update,
        merchant::merchant_orders,
        customer::create_order,
        customer::history
    ),
    components(
        schemas(
            Order,
            OrderItem,
            OrderStatus,
            OrderItemInput,
            CreateOrderRequest,
            GrabOrderRequest,
            CancelOrderRequest,
            RiderUpdateStatusRequest,
            RiderHistoryQuery,
            MerchantUpdateRequest,
            OrderList,
            OrderWithItems,
            RiderEarnings,
            params::Pagination,
            ApiResponse<Order>,
            ApiResponse<OrderList>,
            ApiResponse<OrderWithItems>,
            ApiResponse<RiderEarnings>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Rider", description = "Rider dispatch endpoints"),
        (name = "Merchant", description = "Merchant order endpoints"),
        (name = "Customer", description = "Customer order endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
