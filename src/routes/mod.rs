use axum::Router;

use crate::state::AppState;

pub mod customer;
pub mod doc;
pub mod health;
pub mod merchant;
pub mod params;
pub mod rider;

// Build the API router without binding state; it is provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new().nest(
        "/orders",
        rider::router()
            .merge(merchant::router())
            .merge(customer::router()),
    )
}
