use axum::{routing::post, Router};

pub mod catalog;
pub mod firms;
pub mod orders;
pub mod scoring;
pub mod system;

/// Router for all tenant-scoped endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", axum::routing::get(system::whoami))
        .route("/score", post(scoring::compute_score))
        .nest("/products", catalog::router())
        .nest("/firms", firms::router())
        .nest("/orders", orders::router())
}
