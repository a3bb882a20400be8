use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use depot_firms::FirmClass;
use depot_infra::command_dispatcher::DispatchError;
use depot_infra::placement::PlaceOrderError;
use depot_orders::OrderSource;

pub fn dispatch_error_to_response(err: DispatchError) -> axum::response::Response {
    match err {
        DispatchError::Concurrency(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        DispatchError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DispatchError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        DispatchError::Unauthorized => json_error(StatusCode::FORBIDDEN, "unauthorized", "unauthorized"),
        DispatchError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "not found"),
        DispatchError::Deserialize(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "deserialize_error", msg)
        }
        DispatchError::Store(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            format!("{e:?}"),
        ),
        DispatchError::Publish(msg) => json_error(StatusCode::BAD_GATEWAY, "publish_error", msg),
        DispatchError::TenantIsolation(msg) => json_error(StatusCode::FORBIDDEN, "tenant_isolation", msg),
    }
}

/// Map a placement failure to a structured response.
///
/// Where a specific product caused the failure its id is included, so the
/// order form can highlight the offending line instead of failing opaquely.
pub fn place_order_error_to_response(err: PlaceOrderError) -> axum::response::Response {
    let message = err.to_string();
    let (status, code, product_id) = match err {
        PlaceOrderError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input", None),
        PlaceOrderError::BuyerNotFound { .. } => (StatusCode::NOT_FOUND, "buyer_not_found", None),
        PlaceOrderError::BuyerInactive { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "buyer_inactive", None)
        }
        PlaceOrderError::InvalidBuyerClass { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "invalid_buyer_class", None)
        }
        PlaceOrderError::ProductNotFound { product_id } => {
            (StatusCode::NOT_FOUND, "product_not_found", Some(product_id))
        }
        PlaceOrderError::ProductNotSellable { product_id } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "product_not_sellable",
            Some(product_id),
        ),
        PlaceOrderError::PriceUnavailable { product_id, .. } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "price_unavailable",
            Some(product_id),
        ),
        PlaceOrderError::InsufficientStock { product_id, .. } => {
            (StatusCode::CONFLICT, "insufficient_stock", Some(product_id))
        }
        PlaceOrderError::Persistence(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "persistence_failure", None)
        }
        PlaceOrderError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None),
    };

    let mut body = json!({
        "error": code,
        "message": message,
    });
    if let Some(product_id) = product_id {
        body["product_id"] = json!(product_id.to_string());
    }

    (status, axum::Json(body)).into_response()
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn parse_firm_class(s: &str) -> Result<FirmClass, axum::response::Response> {
    match s.to_lowercase().as_str() {
        "customer" => Ok(FirmClass::Customer),
        "dealer" => Ok(FirmClass::Dealer),
        _ => Err(json_error(
            StatusCode::BAD_REQUEST,
            "invalid_firm_class",
            "class must be one of: customer, dealer",
        )),
    }
}

pub fn parse_order_source(s: &str) -> Result<OrderSource, axum::response::Response> {
    match s.to_lowercase().as_str() {
        "internal" => Ok(OrderSource::Internal),
        "portal" => Ok(OrderSource::Portal),
        _ => Err(json_error(
            StatusCode::BAD_REQUEST,
            "invalid_order_source",
            "source must be one of: internal, portal",
        )),
    }
}
