use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use depot_catalog::{
    ActivateProduct, CreateProduct, DiscontinueProduct, PriceCard, Product, ProductCommand,
    ProductId, ReceiveStock, SetPrices,
};
use depot_core::{AggregateId, Money};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::TenantContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_product).get(list_products))
        .route("/low-stock", get(list_low_stock))
        .route("/:id", get(get_product))
        .route("/:id/activate", post(activate_product))
        .route("/:id/discontinue", post(discontinue_product))
        .route("/:id/prices", post(set_prices))
        .route("/:id/stock", post(receive_stock))
}

fn price_card(
    customer: Option<i64>,
    dealer: Option<i64>,
    unit_cost: Option<i64>,
) -> PriceCard {
    PriceCard {
        customer: customer.map(Money::from_cents),
        dealer: dealer.map(Money::from_cents),
        unit_cost: unit_cost.map(Money::from_cents),
    }
}

fn parse_product_id(id: &str) -> Result<ProductId, axum::response::Response> {
    id.parse::<AggregateId>()
        .map(ProductId::new)
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid product id"))
}

fn dispatch_product(
    services: &AppServices,
    tenant: &TenantContext,
    product_id: ProductId,
    command: ProductCommand,
) -> axum::response::Response {
    match services.dispatch::<Product>(
        tenant.tenant_id(),
        product_id.0,
        "catalog.product",
        command,
        |_, id| Product::empty(ProductId::new(id)),
    ) {
        Ok(committed) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "id": product_id.to_string(),
                "events_committed": committed.len(),
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Json(body): Json<dto::CreateProductRequest>,
) -> axum::response::Response {
    let product_id = ProductId::new(AggregateId::new());

    let command = ProductCommand::CreateProduct(CreateProduct {
        tenant_id: tenant.tenant_id(),
        product_id,
        sku: body.sku,
        name: body.name,
        prices: price_card(
            body.customer_price_cents,
            body.dealer_price_cents,
            body.unit_cost_cents,
        ),
        reorder_threshold: body.reorder_threshold.unwrap_or(0),
        occurred_at: Utc::now(),
    });

    match services.dispatch::<Product>(
        tenant.tenant_id(),
        product_id.0,
        "catalog.product",
        command,
        |_, id| Product::empty(ProductId::new(id)),
    ) {
        Ok(_) => (
            StatusCode::CREATED,
            Json(serde_json::json!({"id": product_id.to_string()})),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn activate_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let product_id = match parse_product_id(&id) {
        Ok(v) => v,
        Err(response) => return response,
    };

    dispatch_product(
        &services,
        &tenant,
        product_id,
        ProductCommand::ActivateProduct(ActivateProduct {
            tenant_id: tenant.tenant_id(),
            product_id,
            occurred_at: Utc::now(),
        }),
    )
}

pub async fn discontinue_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let product_id = match parse_product_id(&id) {
        Ok(v) => v,
        Err(response) => return response,
    };

    dispatch_product(
        &services,
        &tenant,
        product_id,
        ProductCommand::DiscontinueProduct(DiscontinueProduct {
            tenant_id: tenant.tenant_id(),
            product_id,
            occurred_at: Utc::now(),
        }),
    )
}

pub async fn set_prices(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::SetPricesRequest>,
) -> axum::response::Response {
    let product_id = match parse_product_id(&id) {
        Ok(v) => v,
        Err(response) => return response,
    };

    dispatch_product(
        &services,
        &tenant,
        product_id,
        ProductCommand::SetPrices(SetPrices {
            tenant_id: tenant.tenant_id(),
            product_id,
            prices: price_card(
                body.customer_price_cents,
                body.dealer_price_cents,
                body.unit_cost_cents,
            ),
            occurred_at: Utc::now(),
        }),
    )
}

pub async fn receive_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReceiveStockRequest>,
) -> axum::response::Response {
    let product_id = match parse_product_id(&id) {
        Ok(v) => v,
        Err(response) => return response,
    };

    dispatch_product(
        &services,
        &tenant,
        product_id,
        ProductCommand::ReceiveStock(ReceiveStock {
            tenant_id: tenant.tenant_id(),
            product_id,
            quantity: body.quantity,
            occurred_at: Utc::now(),
        }),
    )
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    let products = services.stock_levels().list(tenant.tenant_id());
    (StatusCode::OK, Json(products)).into_response()
}

pub async fn list_low_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    let products = services
        .stock_levels()
        .list_below_threshold(tenant.tenant_id());
    (StatusCode::OK, Json(products)).into_response()
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let product_id = match parse_product_id(&id) {
        Ok(v) => v,
        Err(response) => return response,
    };

    match services.stock_levels().get(tenant.tenant_id(), &product_id) {
        Some(model) => (StatusCode::OK, Json(model)).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "product not found"),
    }
}
