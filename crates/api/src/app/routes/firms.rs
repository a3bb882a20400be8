use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use depot_core::{AggregateId, Rate};
use depot_firms::{
    ActivateFirm, DeactivateFirm, Firm, FirmCommand, FirmId, NetDays, RegisterProspect,
    SetSpecialDiscount,
};
use depot_pricing::LeadCategory;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_firm))
        .route("/:id", get(get_firm))
        .route("/:id/activate", post(activate_firm))
        .route("/:id/deactivate", post(deactivate_firm))
        .route("/:id/discount", post(set_discount))
}

fn parse_firm_id(id: &str) -> Result<FirmId, axum::response::Response> {
    id.parse::<AggregateId>()
        .map(FirmId::new)
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid firm id"))
}

fn dispatch_firm(
    services: &AppServices,
    tenant: &TenantContext,
    firm_id: FirmId,
    command: FirmCommand,
) -> axum::response::Response {
    match services.dispatch::<Firm>(
        tenant.tenant_id(),
        firm_id.0,
        "firms.firm",
        command,
        |_, id| Firm::empty(FirmId::new(id)),
    ) {
        Ok(committed) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "id": firm_id.to_string(),
                "events_committed": committed.len(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

/// Register a prospective buyer.
///
/// The lead category and tags are scored here, once, and the resulting
/// priority score is captured on the firm record.
pub async fn register_firm(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::RegisterFirmRequest>,
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

    let priority_score = services.scorer().score(category, &body.tags);
    let firm_id = FirmId::new(AggregateId::new());

    let command = FirmCommand::RegisterProspect(RegisterProspect {
        tenant_id: tenant.tenant_id(),
        firm_id,
        name: body.name,
        contact: body.contact,
        priority_score,
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Firm>(
        tenant.tenant_id(),
        firm_id.0,
        "firms.firm",
        command,
        |_, id| Firm::empty(FirmId::new(id)),
    ) {
        Ok(_) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "id": firm_id.to_string(),
                "priority_score": priority_score,
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn activate_firm(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ActivateFirmRequest>,
) -> axum::response::Response {
    let firm_id = match parse_firm_id(&id) {
        Ok(v) => v,
        Err(response) => return response,
    };
    let class = match errors::parse_firm_class(&body.class) {
        Ok(v) => v,
        Err(response) => return response,
    };

    dispatch_firm(
        &services,
        &tenant,
        firm_id,
        FirmCommand::ActivateFirm(ActivateFirm {
            tenant_id: tenant.tenant_id(),
            firm_id,
            class,
            payment_terms: body.payment_terms_days.map(NetDays),
            occurred_at: Utc::now(),
        }),
    )
}

pub async fn deactivate_firm(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::DeactivateFirmRequest>,
) -> axum::response::Response {
    let firm_id = match parse_firm_id(&id) {
        Ok(v) => v,
        Err(response) => return response,
    };

    dispatch_firm(
        &services,
        &tenant,
        firm_id,
        FirmCommand::DeactivateFirm(DeactivateFirm {
            tenant_id: tenant.tenant_id(),
            firm_id,
            reason: body.reason,
            occurred_at: Utc::now(),
        }),
    )
}

/// Set or clear the per-firm special discount.
///
/// The 0–100 range is enforced here, at the record boundary, exactly once.
pub async fn set_discount(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::SetDiscountRequest>,
) -> axum::response::Response {
    let firm_id = match parse_firm_id(&id) {
        Ok(v) => v,
        Err(response) => return response,
    };

    let discount = match body.percent {
        Some(percent) => match Rate::from_percent(percent) {
            Ok(rate) => Some(rate),
            Err(e) => {
                return errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "invalid_discount",
                    e.to_string(),
                );
            }
        },
        None => None,
    };

    dispatch_firm(
        &services,
        &tenant,
        firm_id,
        FirmCommand::SetSpecialDiscount(SetSpecialDiscount {
            tenant_id: tenant.tenant_id(),
            firm_id,
            discount,
            occurred_at: Utc::now(),
        }),
    )
}

pub async fn get_firm(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    use depot_infra::lookup::{FirmDirectory, LookupError};

    let firm_id = match parse_firm_id(&id) {
        Ok(v) => v,
        Err(response) => return response,
    };

    match services.lookup().get_firm(tenant.tenant_id(), firm_id).await {
        Ok(record) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "id": firm_id.to_string(),
                "class": record.class,
                "status": record.status,
                "special_discount_bps": record.special_discount.map(Rate::as_bps),
            })),
        )
            .into_response(),
        Err(LookupError::NotFound) => {
            errors::json_error(StatusCode::NOT_FOUND, "not_found", "firm not found")
        }
        Err(LookupError::Store(msg)) => {
            errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg)
        }
    }
}
