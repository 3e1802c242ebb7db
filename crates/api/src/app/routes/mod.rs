use axum::Router;

pub mod categories;
pub mod orders;
pub mod products;
pub mod system;

/// Router for all storefront endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/orders", orders::router())
        .nest("/products", products::router())
        .nest("/categories", categories::router())
}
