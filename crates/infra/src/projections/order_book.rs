use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

use depot_catalog::ProductId;
use depot_core::{AggregateId, Money, Rate, TenantId};
use depot_events::EventEnvelope;
use depot_firms::FirmId;
use depot_orders::{OrderEvent, OrderId, OrderSource, OrderStatus};

use crate::read_model::TenantStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderLineReadModel {
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: Money,
    pub discount: Rate,
    pub net_total: Money,
}

/// Queryable order read model: header + lines as placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderReadModel {
    pub order_id: OrderId,
    pub buyer_id: FirmId,
    pub status: OrderStatus,
    pub source: OrderSource,
    pub delivery_address: String,
    pub vat_rate: Rate,
    pub net_total: Money,
    pub gross_total: Money,
    pub placed_at: DateTime<Utc>,
    pub lines: Vec<OrderLineReadModel>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    tenant_id: TenantId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum OrderBookProjectionError {
    #[error("failed to deserialize order event: {0}")]
    Deserialize(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Order book projection (back-office order list/detail screens).
#[derive(Debug)]
pub struct OrderBookProjection<S>
where
    S: TenantStore<OrderId, OrderReadModel>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> OrderBookProjection<S>
where
    S: TenantStore<OrderId, OrderReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, tenant_id: TenantId, order_id: &OrderId) -> Option<OrderReadModel> {
        self.store.get(tenant_id, order_id)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<OrderReadModel> {
        self.store.list(tenant_id)
    }

    /// Apply a published envelope into the projection (idempotent).
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), OrderBookProjectionError> {
        let tenant_id = envelope.tenant_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let mut cursors = match self.cursors.write() {
            Ok(cursors) => cursors,
            Err(_) => return Ok(()),
        };
        let key = CursorKey {
            tenant_id,
            aggregate_id,
        };
        let last = *cursors.get(&key).unwrap_or(&0);

        if seq == 0 {
            return Err(OrderBookProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(());
        }
        if last != 0 && seq != last + 1 {
            return Err(OrderBookProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let event: OrderEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| OrderBookProjectionError::Deserialize(e.to_string()))?;

        let (event_tenant, order_id) = match &event {
            OrderEvent::OrderPlaced(e) => (e.tenant_id, e.order_id),
            OrderEvent::OrderLineAdded(e) => (e.tenant_id, e.order_id),
            OrderEvent::OrderFulfilled(e) => (e.tenant_id, e.order_id),
            OrderEvent::OrderCancelled(e) => (e.tenant_id, e.order_id),
        };

        if event_tenant != tenant_id {
            return Err(OrderBookProjectionError::TenantIsolation(
                "event tenant_id does not match envelope tenant_id".to_string(),
            ));
        }
        if order_id.0 != aggregate_id {
            return Err(OrderBookProjectionError::TenantIsolation(
                "event order_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match event {
            OrderEvent::OrderPlaced(e) => {
                self.store.upsert(
                    tenant_id,
                    order_id,
                    OrderReadModel {
                        order_id,
                        buyer_id: e.buyer_id,
                        status: OrderStatus::Pending,
                        source: e.source,
                        delivery_address: e.delivery_address,
                        vat_rate: e.vat_rate,
                        net_total: e.net_total,
                        gross_total: e.gross_total,
                        placed_at: e.occurred_at,
                        lines: Vec::new(),
                    },
                );
            }
            OrderEvent::OrderLineAdded(e) => {
                if let Some(mut model) = self.store.get(tenant_id, &order_id) {
                    model.lines.push(OrderLineReadModel {
                        line_no: e.line_no,
                        product_id: e.product_id,
                        quantity: e.quantity,
                        unit_price: e.unit_price,
                        discount: e.discount,
                        net_total: e.net_total,
                    });
                    self.store.upsert(tenant_id, order_id, model);
                }
            }
            OrderEvent::OrderFulfilled(_) => {
                if let Some(mut model) = self.store.get(tenant_id, &order_id) {
                    model.status = OrderStatus::Fulfilled;
                    self.store.upsert(tenant_id, order_id, model);
                }
            }
            OrderEvent::OrderCancelled(_) => {
                if let Some(mut model) = self.store.get(tenant_id, &order_id) {
                    model.status = OrderStatus::Cancelled;
                    self.store.upsert(tenant_id, order_id, model);
                }
            }
        }

        cursors.insert(key, seq);
        Ok(())
    }
}
