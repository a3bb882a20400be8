use axum::{http::StatusCode, response::IntoResponse, Extension, Json};

use crate::context::{ActorContext, TenantContext};

pub async fn health() -> axum::response::Response {
    (StatusCode::OK, Json(serde_json::json!({"status": "ok"}))).into_response()
}

pub async fn whoami(
    Extension(tenant): Extension<TenantContext>,
    Extension(actor): Extension<ActorContext>,
) -> axum::response::Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "tenant_id": tenant.tenant_id().to_string(),
            "user_id": actor.user_id().to_string(),
        })),
    )
        .into_response()
}
