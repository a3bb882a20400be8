use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use depot_pricing::LeadCategory;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

/// Pure scoring endpoint used by the onboarding flow.
pub async fn compute_score(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::ScoreRequest>,
) -> axum::response::Response {
    let category: LeadCategory = match body.category.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_category",
                "category must be one of: A, B, C, D",
            );
        }
    };

    let score = services.scorer().score(category, &body.tags);

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "category": category.to_string(),
            "score": score,
        })),
    )
        .into_response()
}
