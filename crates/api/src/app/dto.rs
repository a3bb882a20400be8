use serde::Deserialize;

use depot_firms::ContactInfo;

// -------------------------
// Request DTOs
// -------------------------
// All monetary fields are integer cents; rates are whole percentages.

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub sku: String,
    pub name: String,
    pub customer_price_cents: Option<i64>,
    pub dealer_price_cents: Option<i64>,
    pub unit_cost_cents: Option<i64>,
    pub reorder_threshold: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SetPricesRequest {
    pub customer_price_cents: Option<i64>,
    pub dealer_price_cents: Option<i64>,
    pub unit_cost_cents: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ReceiveStockRequest {
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct RegisterFirmRequest {
    pub name: String,
    /// Lead category (A–D); scored together with `tags` at registration.
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub contact: Option<ContactInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ActivateFirmRequest {
    pub class: String,
    pub payment_terms_days: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct DeactivateFirmRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetDiscountRequest {
    /// 0–100; `null` clears the per-firm override.
    pub percent: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct PlaceOrderLineRequest {
    pub product_id: String,
    pub quantity: i64,
    pub unit_price_override_cents: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PlaceOrderHttpRequest {
    pub buyer_id: String,
    /// "internal" | "portal"; defaults to internal (back-office entry).
    pub source: Option<String>,
    pub delivery_address: String,
    pub lines: Vec<PlaceOrderLineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct CancelOrderRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScoreRequest {
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
}
