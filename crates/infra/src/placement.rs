//! Order Transaction Manager: the placement engine.
//!
//! `place_order` wraps pricing, stock reservation, and order persistence in
//! one compensated transaction: an order is either durably committed together
//! with all of its stock decrements, or it leaves no trace. The flow per
//! invocation is strictly sequential:
//!
//! ```text
//! Validating → Pricing → Reserving → Persisting → Committed
//!                  │          │            │
//!                  └──────────┴────────────┴──→ RollingBack → Failed
//! ```
//!
//! Rollback rides on the ledger's reservation guards, so it also runs if the
//! calling task is cancelled mid-flight.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{info, warn};

use depot_catalog::ProductId;
use depot_core::{AggregateId, Money, Rate, TenantId, UserId};
use depot_events::{EventBus, EventEnvelope};
use depot_firms::{FirmClass, FirmId, FirmStatus};
use depot_orders::{Order, OrderCommand, OrderId, OrderLine, OrderSource, PlaceOrder, PricedLine};
use depot_pricing::{resolve_price, PriceError};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;
use crate::lookup::{CatalogStore, FirmDirectory, LookupError};
use crate::stock_ledger::{LedgerError, StockLedger};

/// Engine-level configuration, injected at construction.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlacementConfig {
    pub vat_rate: Rate,
}

impl PlacementConfig {
    pub fn new(vat_rate: Rate) -> Self {
        Self { vat_rate }
    }
}

/// One requested order line.
///
/// `unit_price_override` is the privileged manual-price-entry path: it
/// bypasses price resolution but flows through reservation and persistence
/// exactly like a resolved line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRequest {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price_override: Option<Money>,
}

/// A complete order placement request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceOrderRequest {
    pub buyer_id: FirmId,
    pub creator_id: UserId,
    pub source: OrderSource,
    pub delivery_address: String,
    pub lines: Vec<LineRequest>,
}

/// The materialized result of a committed placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlacedOrder {
    pub order_id: OrderId,
    pub net_total: Money,
    pub gross_total: Money,
    pub vat_rate: Rate,
    pub lines: Vec<OrderLine>,
}

/// Terminal errors of a `place_order` call.
///
/// No automatic retry happens inside the engine; callers inspect the kind.
/// Where a specific product caused the failure it is named, so the caller can
/// point at the offending line.
#[derive(Debug, Error)]
pub enum PlaceOrderError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("buyer {buyer_id} not found")]
    BuyerNotFound { buyer_id: FirmId },

    #[error("buyer {buyer_id} is not active (status: {status:?})")]
    BuyerInactive { buyer_id: FirmId, status: FirmStatus },

    #[error("buyer {buyer_id} has no valid class assigned")]
    InvalidBuyerClass { buyer_id: FirmId },

    #[error("product {product_id} not found")]
    ProductNotFound { product_id: ProductId },

    #[error("product {product_id} cannot be sold")]
    ProductNotSellable { product_id: ProductId },

    #[error("no {class:?} price available for product {product_id}")]
    PriceUnavailable {
        product_id: ProductId,
        class: FirmClass,
    },

    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: i64,
        available: i64,
    },

    #[error("order persistence failed: {0}")]
    Persistence(String),

    #[error("internal failure: {0}")]
    Internal(String),
}

/// Durable order persistence seam (the only write besides the stock ledger).
#[async_trait]
pub trait OrderWriter: Send + Sync {
    /// Persist the order header and all lines as a single atomic unit.
    async fn persist(&self, command: PlaceOrder) -> Result<(), PersistError>;
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("persistence conflict: {0}")]
    Conflict(String),

    #[error("persistence failure: {0}")]
    Store(String),
}

/// Event-store-backed order writer.
///
/// One dispatch appends the `OrderPlaced` header and every `OrderLineAdded`
/// in a single batch, which is what makes the order visible all-or-nothing.
pub struct EventSourcedOrders<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
}

impl<S, B> EventSourcedOrders<S, B> {
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl<S, B> OrderWriter for EventSourcedOrders<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    async fn persist(&self, command: PlaceOrder) -> Result<(), PersistError> {
        let tenant_id = command.tenant_id;
        let order_id = command.order_id;

        let result = self.dispatcher.dispatch::<Order>(
            tenant_id,
            order_id.0,
            "orders.order",
            OrderCommand::PlaceOrder(command),
            |_, id| Order::empty(OrderId::new(id)),
        );

        match result {
            Ok(_) => Ok(()),
            // The append succeeded; the order is durable. Publication is
            // at-least-once and read models rebuild, so this is not a
            // failure of the transaction.
            Err(DispatchError::Publish(msg)) => {
                warn!(order_id = %order_id, error = %msg, "order event publication failed after append");
                Ok(())
            }
            Err(DispatchError::Concurrency(msg)) => Err(PersistError::Conflict(msg)),
            Err(e) => Err(PersistError::Store(format!("{e:?}"))),
        }
    }
}

/// The order placement engine.
pub struct PlacementEngine<S, B>
where
    S: EventStore + Clone,
    B: EventBus<EventEnvelope<JsonValue>> + Clone,
{
    catalog: Arc<dyn CatalogStore>,
    firms: Arc<dyn FirmDirectory>,
    writer: Arc<dyn OrderWriter>,
    ledger: StockLedger<S, B>,
    config: PlacementConfig,
}

impl<S, B> PlacementEngine<S, B>
where
    S: EventStore + Clone,
    B: EventBus<EventEnvelope<JsonValue>> + Clone,
{
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        firms: Arc<dyn FirmDirectory>,
        writer: Arc<dyn OrderWriter>,
        ledger: StockLedger<S, B>,
        config: PlacementConfig,
    ) -> Self {
        Self {
            catalog,
            firms,
            writer,
            ledger,
            config,
        }
    }

    /// Place an order: price, reserve, persist, all-or-nothing.
    pub async fn place_order(
        &self,
        tenant_id: TenantId,
        request: PlaceOrderRequest,
    ) -> Result<PlacedOrder, PlaceOrderError> {
        // Validating: reject bad input before any side effect.
        validate_request(&request)?;

        // Pricing: resolve the buyer, then every line.
        let buyer = self.load_buyer(tenant_id, request.buyer_id).await?;
        let priced = self.price_lines(tenant_id, &buyer, &request).await?;
        let (lines, net_total) = materialize_lines(&priced)?;
        let gross_total = net_total
            .checked_add(net_total.portion(self.config.vat_rate))
            .ok_or_else(|| PlaceOrderError::InvalidInput("order total overflow".to_string()))?;

        // Reserving: take guards line by line; any failure (or cancellation)
        // drops the guards already taken and releases their stock.
        let mut reservations = Vec::with_capacity(priced.len());
        for line in &priced {
            let reservation = self
                .ledger
                .reserve(tenant_id, line.product_id, line.quantity)
                .map_err(PlaceOrderError::from)?;
            reservations.push(reservation);
        }

        // Persisting: one atomic append of header + lines.
        let order_id = OrderId::new(AggregateId::new());
        let command = PlaceOrder {
            tenant_id,
            order_id,
            buyer_id: request.buyer_id,
            creator_id: request.creator_id,
            source: request.source,
            delivery_address: request.delivery_address.clone(),
            vat_rate: self.config.vat_rate,
            lines: priced,
            occurred_at: Utc::now(),
        };
        self.writer.persist(command).await.map_err(|e| match e {
            PersistError::Conflict(msg) | PersistError::Store(msg) => {
                PlaceOrderError::Persistence(msg)
            }
        })?;

        // Committed: disarm the guards, the decrements stand.
        for reservation in reservations {
            reservation.commit();
        }

        info!(
            order_id = %order_id,
            buyer_id = %request.buyer_id,
            lines = lines.len(),
            net_total = %net_total,
            gross_total = %gross_total,
            "order committed"
        );

        Ok(PlacedOrder {
            order_id,
            net_total,
            gross_total,
            vat_rate: self.config.vat_rate,
            lines,
        })
    }

    async fn load_buyer(
        &self,
        tenant_id: TenantId,
        buyer_id: FirmId,
    ) -> Result<crate::lookup::FirmRecord, PlaceOrderError> {
        let firm = self
            .firms
            .get_firm(tenant_id, buyer_id)
            .await
            .map_err(|e| match e {
                LookupError::NotFound => PlaceOrderError::BuyerNotFound { buyer_id },
                LookupError::Store(msg) => PlaceOrderError::Internal(msg),
            })?;

        if firm.status != FirmStatus::Active {
            return Err(PlaceOrderError::BuyerInactive {
                buyer_id,
                status: firm.status,
            });
        }

        Ok(firm)
    }

    async fn price_lines(
        &self,
        tenant_id: TenantId,
        buyer: &crate::lookup::FirmRecord,
        request: &PlaceOrderRequest,
    ) -> Result<Vec<PricedLine>, PlaceOrderError> {
        let terms = buyer.buyer_terms();

        let mut priced = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            let priced_line = match line.unit_price_override {
                // Manual price entry: no resolution, no discount.
                Some(unit_price) => PricedLine {
                    product_id: line.product_id,
                    quantity: line.quantity,
                    unit_price,
                    discount: Rate::ZERO,
                },
                None => {
                    let product = self
                        .catalog
                        .get_product(tenant_id, line.product_id)
                        .await
                        .map_err(|e| match e {
                            LookupError::NotFound => PlaceOrderError::ProductNotFound {
                                product_id: line.product_id,
                            },
                            LookupError::Store(msg) => PlaceOrderError::Internal(msg),
                        })?;

                    let resolved = resolve_price(&terms, &product.prices, line.quantity)
                        .map_err(|e| match e {
                            PriceError::InvalidBuyerClass => PlaceOrderError::InvalidBuyerClass {
                                buyer_id: buyer.firm_id,
                            },
                            PriceError::PriceUnavailable { class } => {
                                PlaceOrderError::PriceUnavailable {
                                    product_id: line.product_id,
                                    class,
                                }
                            }
                        })?;

                    PricedLine {
                        product_id: line.product_id,
                        quantity: line.quantity,
                        unit_price: resolved.unit_price,
                        discount: resolved.discount,
                    }
                }
            };
            priced.push(priced_line);
        }

        Ok(priced)
    }
}

fn validate_request(request: &PlaceOrderRequest) -> Result<(), PlaceOrderError> {
    if request.delivery_address.trim().is_empty() {
        return Err(PlaceOrderError::InvalidInput(
            "delivery address cannot be empty".to_string(),
        ));
    }
    if request.lines.is_empty() {
        return Err(PlaceOrderError::InvalidInput(
            "order must contain at least one line".to_string(),
        ));
    }
    for line in &request.lines {
        if line.quantity <= 0 {
            return Err(PlaceOrderError::InvalidInput(format!(
                "quantity must be positive for product {}",
                line.product_id
            )));
        }
        if let Some(price) = line.unit_price_override {
            if price.is_negative() {
                return Err(PlaceOrderError::InvalidInput(format!(
                    "price override cannot be negative for product {}",
                    line.product_id
                )));
            }
        }
    }
    Ok(())
}

/// Compute the persisted line shapes and the exact net total.
fn materialize_lines(priced: &[PricedLine]) -> Result<(Vec<OrderLine>, Money), PlaceOrderError> {
    let mut lines = Vec::with_capacity(priced.len());
    let mut net_total = Money::ZERO;

    for (idx, line) in priced.iter().enumerate() {
        let line_net = line
            .net_total()
            .ok_or_else(|| PlaceOrderError::InvalidInput("order line total overflow".to_string()))?;
        net_total = net_total
            .checked_add(line_net)
            .ok_or_else(|| PlaceOrderError::InvalidInput("order total overflow".to_string()))?;

        lines.push(OrderLine {
            line_no: (idx as u32) + 1,
            product_id: line.product_id,
            quantity: line.quantity,
            unit_price: line.unit_price,
            discount: line.discount,
            net_total: line_net,
        });
    }

    Ok((lines, net_total))
}

impl From<LedgerError> for PlaceOrderError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::ProductNotFound { product_id } => {
                PlaceOrderError::ProductNotFound { product_id }
            }
            LedgerError::ProductNotSellable { product_id } => {
                PlaceOrderError::ProductNotSellable { product_id }
            }
            LedgerError::InsufficientStock {
                product_id,
                requested,
                available,
            } => PlaceOrderError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            LedgerError::InvalidQuantity(q) => {
                PlaceOrderError::InvalidInput(format!("quantity must be positive, got {q}"))
            }
            LedgerError::Contention { .. } | LedgerError::Store(_) => {
                PlaceOrderError::Internal(value.to_string())
            }
        }
    }
}
