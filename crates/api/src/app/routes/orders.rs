use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use depot_catalog::ProductId;
use depot_core::{AggregateId, Money};
use depot_firms::FirmId;
use depot_infra::placement::{LineRequest, PlaceOrderRequest};
use depot_orders::{CancelOrder, MarkFulfilled, Order, OrderCommand, OrderId, OrderSource};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{ActorContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(place_order).get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/fulfill", post(fulfill_order))
        .route("/:id/cancel", post(cancel_order))
}

fn parse_order_id(id: &str) -> Result<OrderId, axum::response::Response> {
    id.parse::<AggregateId>()
        .map(OrderId::new)
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid order id"))
}

/// The primary operation: place an order all-or-nothing.
pub async fn place_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<dto::PlaceOrderHttpRequest>,
) -> axum::response::Response {
    let buyer_id = match body.buyer_id.parse::<AggregateId>() {
        Ok(id) => FirmId::new(id),
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid buyer id");
        }
    };

    let source = match body.source.as_deref() {
        Some(raw) => match errors::parse_order_source(raw) {
            Ok(v) => v,
            Err(response) => return response,
        },
        None => OrderSource::Internal,
    };

    let mut lines = Vec::with_capacity(body.lines.len());
    for line in body.lines {
        let product_id = match line.product_id.parse::<AggregateId>() {
            Ok(id) => ProductId::new(id),
            Err(_) => {
                return errors::json_error(
                    StatusCode::BAD_REQUEST,
                    "invalid_id",
                    "invalid product id",
                );
            }
        };
        lines.push(LineRequest {
            product_id,
            quantity: line.quantity,
            unit_price_override: line.unit_price_override_cents.map(Money::from_cents),
        });
    }

    let request = PlaceOrderRequest {
        buyer_id,
        creator_id: actor.user_id(),
        source,
        delivery_address: body.delivery_address,
        lines,
    };

    match services.engine().place_order(tenant.tenant_id(), request).await {
        Ok(placed) => (StatusCode::CREATED, Json(placed)).into_response(),
        Err(e) => errors::place_order_error_to_response(e),
    }
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    let orders = services.order_book().list(tenant.tenant_id());
    (StatusCode::OK, Json(orders)).into_response()
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(response) => return response,
    };

    match services.order_book().get(tenant.tenant_id(), &order_id) {
        Some(model) => (StatusCode::OK, Json(model)).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "order not found"),
    }
}

pub async fn fulfill_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(response) => return response,
    };

    let command = OrderCommand::MarkFulfilled(MarkFulfilled {
        tenant_id: tenant.tenant_id(),
        order_id,
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Order>(
        tenant.tenant_id(),
        order_id.0,
        "orders.order",
        command,
        |_, id| Order::empty(OrderId::new(id)),
    ) {
        Ok(committed) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "id": order_id.to_string(),
                "events_committed": committed.len(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn cancel_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::CancelOrderRequest>,
) -> axum::response::Response {
    let order_id = match parse_order_id(&id) {
        Ok(v) => v,
        Err(response) => return response,
    };

    let command = OrderCommand::CancelOrder(CancelOrder {
        tenant_id: tenant.tenant_id(),
        order_id,
        reason: body.reason,
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Order>(
        tenant.tenant_id(),
        order_id.0,
        "orders.order",
        command,
        |_, id| Order::empty(OrderId::new(id)),
    ) {
        Ok(committed) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "id": order_id.to_string(),
                "events_committed": committed.len(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
